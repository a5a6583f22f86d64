//! Command dispatch: bridges CLI args -> router calls -> output formatting.

pub mod adapters;
pub mod boot;
pub mod config_cmd;
pub mod firewall;
pub mod mode;
pub mod status;

use repeatr_core::{BridgeMode, Router};

use crate::cli::{Command, ModeArg};
use crate::error::CliError;
use crate::output::OutputOpts;

/// Dispatch a router-bound command to the appropriate handler.
pub async fn dispatch(cmd: Command, router: &Router, out: &OutputOpts) -> Result<(), CliError> {
    match cmd {
        Command::Boot(args) => boot::handle(router, &args, out).await,
        Command::Classify => adapters::classify(router, out).await,
        Command::Bind => adapters::bind(router, out).await,
        Command::Mode(args) => mode::handle(router, &args, out).await,
        Command::Reapply => mode::reapply(router, out).await,
        Command::Uplink(args) => mode::uplink(router, &args, out).await,
        Command::Status => status::handle(router, out).await,
        Command::Firewall(args) => firewall::handle(router, &args, out).await,
        Command::Config(_) | Command::Completions(_) => Err(CliError::Internal(
            "config and completions are handled before dispatch".into(),
        )),
    }
}

pub(crate) fn bridge_mode(arg: ModeArg) -> BridgeMode {
    match arg {
        ModeArg::Client => BridgeMode::Client,
        ModeArg::Bridged => BridgeMode::Bridged,
    }
}
