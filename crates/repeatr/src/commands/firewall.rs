//! Firewall preview handler.

use repeatr_core::{FirewallRuleSet, InterfaceMap, RuleLine, Router, generate};
use tabled::Tabled;

use crate::cli::{FirewallArgs, FirewallCommand, FirewallShowArgs, OutputFormat};
use crate::error::CliError;
use crate::output::{self, OutputOpts};

use super::bridge_mode;

// ── Rule table row ──────────────────────────────────────────────────

#[derive(Tabled)]
struct RuleRow {
    #[tabled(rename = "Table")]
    table: String,
    #[tabled(rename = "Chain")]
    chain: String,
    #[tabled(rename = "Rule")]
    spec: String,
}

fn rule_row(r: &RuleLine) -> RuleRow {
    RuleRow {
        table: r.table.clone(),
        chain: r.chain.clone(),
        spec: r.spec.clone(),
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(router: &Router, args: &FirewallArgs, out: &OutputOpts) -> Result<(), CliError> {
    match args.command {
        FirewallCommand::Show(ref show) => {
            let rule_set = preview(router, show).await?;
            let rendered = if show.rules {
                output::render_list(out.format, &rule_set.rules(), rule_row, |r| {
                    format!("-t {} -A {} {}", r.table, r.chain, r.spec)
                })
            } else if out.format == OutputFormat::Table {
                rule_set.text().trim_end().to_string()
            } else {
                output::render_single(out.format, &rule_set, |r| r.text().to_string(), |r| {
                    r.fingerprint().to_string()
                })
            };
            output::print_output(&rendered, out.quiet);
            Ok(())
        }
    }
}

/// Explicit interface names skip adapter discovery entirely; mode and
/// forwarding fall back to what is persisted.
async fn preview(router: &Router, args: &FirewallShowArgs) -> Result<FirewallRuleSet, CliError> {
    if args.uplink.is_none() && args.mode.is_none() && !args.no_forwarding {
        return Ok(router.firewall_preview().await?);
    }

    let interfaces = match (&args.uplink, &args.ap) {
        (Some(uplink), Some(ap)) => InterfaceMap {
            uplink: uplink.clone(),
            access_point: ap.clone(),
        },
        _ => router.interfaces().await?,
    };

    let store = router.store();
    let mode = match args.mode {
        Some(mode) => bridge_mode(mode),
        None => store
            .load_bridge_mode()
            .await?
            .unwrap_or(router.config().default_bridge_mode),
    };
    let forwarding = !args.no_forwarding && store.load_uplink_forwarding().await?.unwrap_or(true);

    let topology = router.config().topology(&interfaces, mode, forwarding);
    tracing::debug!(?topology, "rendering firewall preview");
    Ok(generate(&topology))
}
