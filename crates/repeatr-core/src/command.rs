// ── Command API ──
//
// Runtime requests from outside the boot path. The router routes each
// variant to the bridge controller or the binder.

use serde::{Deserialize, Serialize};

use crate::binding::BindOutcome;
use crate::bridge::ModeChange;
use crate::model::BridgeMode;

/// All state-changing requests a running router accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "kebab-case")]
pub enum Command {
    /// Re-derive the role binding from the current adapters.
    Rebind,
    SetBridgeMode { mode: BridgeMode },
    /// Re-assert addressing, daemon configuration and firewall for the
    /// persisted mode.
    Reapply,
    SetUplinkForwarding { enabled: bool },
}

/// Result of a [`Command`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandResult {
    Bound(BindOutcome),
    Mode(ModeChange),
}
