//! Ethernet port mode, uplink forwarding and reapply handlers.

use repeatr_core::{ModeChange, Router};

use crate::cli::{ModeArgs, ModeCommand, UplinkArgs, UplinkCommand};
use crate::error::CliError;
use crate::output::{self, OutputOpts};

use super::bridge_mode;

fn change_detail(c: &ModeChange) -> String {
    let mode = if c.switched() {
        format!("Mode:       {} -> {}", c.previous, c.current)
    } else {
        format!("Mode:       {} (unchanged)", c.current)
    };
    [
        mode,
        format!(
            "Uplink:     {}",
            if c.uplink_forwarding { "forwarding" } else { "blocked" }
        ),
        format!(
            "Firewall:   {} ({})",
            c.fingerprint,
            if c.rules_applied { "loaded" } else { "already active" }
        ),
    ]
    .join("\n")
}

fn print_change(change: &ModeChange, out: &OutputOpts) {
    let rendered = output::render_single(out.format, change, change_detail, |c| {
        c.current.to_string()
    });
    output::print_output(&rendered, out.quiet);
}

pub async fn handle(router: &Router, args: &ModeArgs, out: &OutputOpts) -> Result<(), CliError> {
    match args.command {
        ModeCommand::Get => {
            let status = router.status().await?;
            output::print_output(&status.bridge_mode.to_string(), out.quiet);
            Ok(())
        }
        ModeCommand::Set { mode } => {
            let change = router.request_mode_change(bridge_mode(mode)).await?;
            print_change(&change, out);
            Ok(())
        }
    }
}

pub async fn reapply(router: &Router, out: &OutputOpts) -> Result<(), CliError> {
    let change = router.request_reapply().await?;
    print_change(&change, out);
    Ok(())
}

pub async fn uplink(router: &Router, args: &UplinkArgs, out: &OutputOpts) -> Result<(), CliError> {
    let enabled = matches!(args.command, UplinkCommand::Enable);
    let change = router.set_uplink_forwarding(enabled).await?;
    print_change(&change, out);
    Ok(())
}

#[cfg(test)]
mod tests {
    use repeatr_core::BridgeMode;

    use super::*;

    #[test]
    fn detail_reports_switch_and_reload() {
        let change = ModeChange {
            previous: BridgeMode::Client,
            current: BridgeMode::Bridged,
            uplink_forwarding: true,
            rules_applied: true,
            fingerprint: "0123456789abcdef".into(),
        };
        let text = change_detail(&change);
        assert!(text.contains("client -> bridged"));
        assert!(text.contains("0123456789abcdef (loaded)"));
    }

    #[test]
    fn detail_reports_noop() {
        let change = ModeChange {
            previous: BridgeMode::Client,
            current: BridgeMode::Client,
            uplink_forwarding: false,
            rules_applied: false,
            fingerprint: "0123456789abcdef".into(),
        };
        let text = change_detail(&change);
        assert!(text.contains("client (unchanged)"));
        assert!(text.contains("blocked"));
        assert!(text.contains("already active"));
    }
}
