//! Status handler: persisted state only, safe to run any time.

use repeatr_core::{Router, RouterStatus};

use crate::error::CliError;
use crate::output::{self, OutputOpts};

use super::adapters::binding_table;
use super::boot::report_detail;

fn status_detail(s: &RouterStatus, color: bool) -> String {
    let mut lines = Vec::new();
    match s.role_binding {
        Some(ref binding) => lines.push(binding_table(binding)),
        None => lines.push("Binding:  none (run: repeatr bind)".into()),
    }
    lines.push(format!("Mode:     {}", s.bridge_mode));
    lines.push(format!(
        "Uplink:   {}",
        if s.uplink_forwarding { "forwarding" } else { "blocked" }
    ));
    lines.push(format!(
        "Firewall: {}",
        s.firewall_fingerprint.as_deref().unwrap_or("not loaded")
    ));
    match s.boot {
        Some(ref report) => lines.push(report_detail(report, color)),
        None => lines.push("Boot:     never".into()),
    }
    lines.join("\n")
}

pub async fn handle(router: &Router, out: &OutputOpts) -> Result<(), CliError> {
    let status = router.status().await?;
    let rendered = output::render_single(
        out.format,
        &status,
        |s| status_detail(s, out.color),
        |s| {
            s.boot
                .as_ref()
                .map_or("never", |r| r.outcome.label())
                .to_string()
        },
    );
    output::print_output(&rendered, out.quiet);
    Ok(())
}
