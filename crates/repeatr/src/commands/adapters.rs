//! Adapter classification and role binding handlers.

use repeatr_core::{
    BindOutcome, ClassifiedAdapters, LogicalRole, PhysicalAdapter, RoleBinding, Router,
};
use tabled::Tabled;

use crate::cli::OutputFormat;
use crate::error::CliError;
use crate::output::{self, OutputOpts};

// ── Adapter table row ───────────────────────────────────────────────

#[derive(Tabled)]
struct AdapterRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "MAC")]
    mac: String,
    #[tabled(rename = "Bus")]
    bus: String,
}

fn adapter_row(a: &PhysicalAdapter) -> AdapterRow {
    AdapterRow {
        name: a.current_name.clone(),
        mac: a.mac_address.to_string(),
        bus: a.bus_origin.to_string(),
    }
}

fn classified_detail(c: &ClassifiedAdapters) -> String {
    [
        format!("Removable: {} ({})", c.removable.current_name, c.removable.mac_address),
        format!("Onboard:   {} ({})", c.onboard.current_name, c.onboard.mac_address),
    ]
    .join("\n")
}

// ── Binding table row ───────────────────────────────────────────────

#[derive(Tabled)]
struct BindingRow {
    #[tabled(rename = "Role")]
    role: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "MAC")]
    mac: String,
}

pub(crate) fn binding_table(binding: &RoleBinding) -> String {
    let mut rows: Vec<BindingRow> = binding
        .entries()
        .map(|(mac, entry)| BindingRow {
            role: entry.role.to_string(),
            name: entry.logical_name.clone(),
            mac: mac.to_string(),
        })
        .collect();
    // uplink first
    rows.sort_by_key(|r| r.role != LogicalRole::Uplink.to_string());
    output::render_table(&rows)
}

fn bound_detail(outcome: &BindOutcome) -> String {
    let note = if outcome.changed {
        "binding written"
    } else {
        "binding unchanged"
    };
    format!("{}\n{note}", binding_table(&outcome.binding))
}

// ── Handlers ────────────────────────────────────────────────────────

/// List adapters, then classify them. Classification errors still show
/// what was found.
pub async fn classify(router: &Router, out: &OutputOpts) -> Result<(), CliError> {
    let adapters = router.adapters().await?;
    let classified = repeatr_core::classify(&adapters);

    let rendered = match (&classified, out.format) {
        (Ok(c), OutputFormat::Table) => format!(
            "{}\n{}",
            output::render_list(out.format, &adapters, adapter_row, |a| a.current_name.clone()),
            classified_detail(c)
        ),
        (Ok(c), format) => output::render_single(format, c, classified_detail, |found| {
            format!("{}\n{}", found.removable.current_name, found.onboard.current_name)
        }),
        (Err(_), format) => {
            output::render_list(format, &adapters, adapter_row, |a| a.current_name.clone())
        }
    };
    output::print_output(&rendered, out.quiet);

    classified.map(|_| ()).map_err(CliError::from)
}

pub async fn bind(router: &Router, out: &OutputOpts) -> Result<(), CliError> {
    let outcome = router.classify_and_bind().await?;
    let rendered = output::render_single(out.format, &outcome, bound_detail, |o| {
        o.binding
            .entries()
            .map(|(mac, entry)| format!("{} {mac}", entry.logical_name))
            .collect::<Vec<_>>()
            .join("\n")
    });
    output::print_output(&rendered, out.quiet);
    Ok(())
}
