//! Boot handler and the unit report shared with `status`.

use std::time::Duration;

use repeatr_core::{BootOutcome, BootReport, Router, UnitStatus};
use tabled::Tabled;
use tracing::{info, warn};

use crate::cli::BootArgs;
use crate::error::CliError;
use crate::output::{self, OutputOpts, paint_state};

// ── Unit table row ──────────────────────────────────────────────────

#[derive(Tabled)]
struct UnitRow {
    #[tabled(rename = "Unit")]
    name: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Attempts")]
    attempts: u32,
    #[tabled(rename = "Detail")]
    detail: String,
}

impl From<&UnitStatus> for UnitRow {
    fn from(u: &UnitStatus) -> Self {
        Self {
            name: u.name.clone(),
            state: u.state.to_string(),
            attempts: u.attempts,
            detail: u.detail.clone().unwrap_or_default(),
        }
    }
}

pub(crate) fn outcome_line(outcome: &BootOutcome, color: bool) -> String {
    let label = paint_state(outcome.label(), color);
    match outcome {
        BootOutcome::Ready | BootOutcome::Aborted => format!("Boot: {label}"),
        BootOutcome::Degraded { units } => format!("Boot: {label} ({} not ready)", units.join(", ")),
        BootOutcome::Failed { unit, reason } => format!("Boot: {label} at {unit}: {reason}"),
    }
}

pub(crate) fn report_detail(report: &BootReport, color: bool) -> String {
    let rows: Vec<UnitRow> = report.units.iter().map(UnitRow::from).collect();
    let elapsed = report.finished_at - report.started_at;
    format!(
        "{}\n{} in {}.{:03}s",
        output::render_table(&rows),
        outcome_line(&report.outcome, color),
        elapsed.num_seconds(),
        elapsed.num_milliseconds().rem_euclid(1000),
    )
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(router: &Router, args: &BootArgs, out: &OutputOpts) -> Result<(), CliError> {
    let on_signal = router.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, aborting boot");
            on_signal.abort();
        }
    });

    if let Some(secs) = args.deadline {
        let on_deadline = router.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            warn!(deadline_secs = secs, "boot deadline reached, aborting");
            on_deadline.abort();
        });
    }

    let report = router.boot().await?;
    let rendered = output::render_single(
        out.format,
        &report,
        |r| report_detail(r, out.color),
        |r| r.outcome.label().to_string(),
    );
    output::print_output(&rendered, out.quiet);

    match report.outcome {
        BootOutcome::Ready => {
            info!("router is up");
            Ok(())
        }
        BootOutcome::Degraded { units } => {
            warn!(units = ?units, "router is up without some units");
            // Unbounded uplink retries keep the command alive until the
            // uplink associates or the boot is interrupted.
            if let Some(last) = router.finish_boot().await? {
                info!(outcome = last.outcome.label(), "background retries finished");
                if !out.quiet {
                    eprintln!("{}", outcome_line(&last.outcome, out.color));
                }
            }
            Ok(())
        }
        BootOutcome::Failed { unit, reason } => Err(CliError::BootFailed { unit, reason }),
        BootOutcome::Aborted => Err(CliError::Aborted),
    }
}
