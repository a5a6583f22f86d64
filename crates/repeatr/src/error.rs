//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use repeatr_config::ConfigError;
use repeatr_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const HARDWARE: i32 = 3;
    pub const BOOT_FAILED: i32 = 4;
    pub const CONFLICT: i32 = 5;
    pub const FIREWALL: i32 = 6;
    pub const STATE: i32 = 7;
    pub const ABORTED: i32 = 130;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Hardware ─────────────────────────────────────────────────────

    #[error("Need two wireless adapters, found {found}")]
    #[diagnostic(
        code(repeatr::insufficient_adapters),
        help(
            "Plug in the USB radio and check that both show up.\n\
             Try: repeatr classify"
        )
    )]
    InsufficientAdapters { found: usize },

    #[error("Cannot tell the radios apart: {removable} removable, {onboard} onboard")]
    #[diagnostic(
        code(repeatr::ambiguous_topology),
        help("Exactly one USB radio and one onboard radio are supported.")
    )]
    AmbiguousTopology { removable: usize, onboard: usize },

    #[error("Device {device} not ready after {attempts} attempt(s)")]
    #[diagnostic(
        code(repeatr::device_not_ready),
        help("The radio may have been unplugged. Re-run: repeatr bind")
    )]
    DeviceNotReady { device: String, attempts: u32 },

    // ── Boot ─────────────────────────────────────────────────────────

    #[error("Boot failed at {unit}: {reason}")]
    #[diagnostic(
        code(repeatr::boot_failed),
        help("Run: repeatr status  to see which units started")
    )]
    BootFailed { unit: String, reason: String },

    #[error("Aborted")]
    #[diagnostic(code(repeatr::aborted))]
    Aborted,

    // ── Mode / firewall ──────────────────────────────────────────────

    #[error("Another boot or mode change is in progress")]
    #[diagnostic(code(repeatr::busy), help("Wait for it to finish and try again."))]
    Busy,

    #[error("Firewall rules could not be loaded: {reason}")]
    #[diagnostic(
        code(repeatr::firewall),
        help(
            "The previous rule set was restored.\n\
             Inspect the generated rules with: repeatr firewall show"
        )
    )]
    FirewallFailed { reason: String },

    // ── Host ─────────────────────────────────────────────────────────

    #[error("`{command}` failed: {reason}")]
    #[diagnostic(code(repeatr::host))]
    HostCommand { command: String, reason: String },

    // ── State ────────────────────────────────────────────────────────

    #[error("State file {path}: {reason}")]
    #[diagnostic(
        code(repeatr::state),
        help("Check permissions on the state directory, or pass --state-dir.")
    )]
    State { path: String, reason: String },

    // ── Validation / configuration ───────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(repeatr::validation))]
    Validation { field: String, reason: String },

    #[error("No access point passphrase configured")]
    #[diagnostic(
        code(repeatr::no_passphrase),
        help(
            "Set access_point.passphrase or access_point.passphrase_env in {path}\n\
             Or run: repeatr config init"
        )
    )]
    NoPassphrase { path: String },

    #[error(transparent)]
    #[diagnostic(code(repeatr::config))]
    Config(Box<figment::Error>),

    // ── IO / internal ────────────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    #[diagnostic(code(repeatr::internal))]
    Internal(String),
}

impl From<figment::Error> for CliError {
    fn from(err: figment::Error) -> Self {
        Self::Config(Box::new(err))
    }
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::InsufficientAdapters { .. }
            | Self::AmbiguousTopology { .. }
            | Self::DeviceNotReady { .. } => exit_code::HARDWARE,
            Self::BootFailed { .. } => exit_code::BOOT_FAILED,
            Self::Aborted => exit_code::ABORTED,
            Self::Busy => exit_code::CONFLICT,
            Self::FirewallFailed { .. } => exit_code::FIREWALL,
            Self::State { .. } => exit_code::STATE,
            Self::Validation { .. } | Self::NoPassphrase { .. } | Self::Config(_) => {
                exit_code::USAGE
            }
            Self::HostCommand { .. } | Self::Io(_) | Self::Internal(_) => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InsufficientAdapters { found } => CliError::InsufficientAdapters { found },

            CoreError::AmbiguousTopology { removable, onboard } => {
                CliError::AmbiguousTopology { removable, onboard }
            }

            CoreError::DeviceNotReady { device, attempts } => {
                CliError::DeviceNotReady { device, attempts }
            }

            CoreError::AssociationFailed {
                interface,
                attempts: _,
                reason,
            } => CliError::HostCommand {
                command: format!("associate {interface}"),
                reason,
            },

            CoreError::UnitFailed { unit, reason } => CliError::BootFailed { unit, reason },

            CoreError::Aborted => CliError::Aborted,

            CoreError::RuleApplyFailed { reason } => CliError::FirewallFailed { reason },

            CoreError::LockContention => CliError::Busy,

            CoreError::Host { command, reason } => CliError::HostCommand { command, reason },

            CoreError::Persistence { path, source } => CliError::State {
                path: path.display().to_string(),
                reason: source.to_string(),
            },

            CoreError::CorruptState { path, reason } => CliError::State {
                path: path.display().to_string(),
                reason,
            },

            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },

            CoreError::InvalidUnitGraph { reason } => CliError::Internal(reason),

            CoreError::Internal(message) => CliError::Internal(message),
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl CliError {
    /// Convert a config error, naming the file it came from.
    pub fn from_config(err: ConfigError, path: &std::path::Path) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::NoPassphrase => CliError::NoPassphrase {
                path: path.display().to_string(),
            },
            ConfigError::Serialization(e) => CliError::Internal(e.to_string()),
            ConfigError::Figment(e) => CliError::Config(e),
            ConfigError::Io(e) => CliError::Io(e),
        }
    }
}
