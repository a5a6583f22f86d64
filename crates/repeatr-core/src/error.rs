// ── Core error types ──
//
// Every failure the orchestrator can surface. Classification errors are
// terminal and need an operator hardware change; unit errors carry the unit
// name so status output can point at the broken step.

use std::path::PathBuf;

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Classification errors ────────────────────────────────────────
    #[error("Need two wireless adapters, found {found}")]
    InsufficientAdapters { found: usize },

    #[error(
        "Cannot tell uplink from access-point radio: {removable} removable and {onboard} onboard adapter(s)"
    )]
    AmbiguousTopology { removable: usize, onboard: usize },

    // ── Unit errors ──────────────────────────────────────────────────
    #[error("Device {device} not ready after {attempts} attempt(s)")]
    DeviceNotReady { device: String, attempts: u32 },

    #[error("Uplink {interface} failed to associate after {attempts} attempt(s): {reason}")]
    AssociationFailed {
        interface: String,
        attempts: u32,
        reason: String,
    },

    #[error("Unit {unit} failed: {reason}")]
    UnitFailed { unit: String, reason: String },

    #[error("Invalid unit graph: {reason}")]
    InvalidUnitGraph { reason: String },

    #[error("Orchestration aborted")]
    Aborted,

    // ── Mode / firewall errors ───────────────────────────────────────
    #[error("Failed to apply firewall rule set: {reason}")]
    RuleApplyFailed { reason: String },

    #[error("Another boot or mode change is in progress")]
    LockContention,

    // ── Host errors ──────────────────────────────────────────────────
    #[error("Host command `{command}` failed: {reason}")]
    Host { command: String, reason: String },

    #[error("Cannot access {path}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("State file {path} is corrupt: {reason}")]
    CorruptState { path: PathBuf, reason: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub(crate) fn host(command: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Host {
            command: command.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Persistence {
            path: path.into(),
            source,
        }
    }

    /// Whether the error needs operator intervention (hardware or config)
    /// rather than a retry.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::InsufficientAdapters { .. }
                | Self::AmbiguousTopology { .. }
                | Self::InvalidUnitGraph { .. }
                | Self::Config { .. }
                | Self::CorruptState { .. }
        )
    }
}
