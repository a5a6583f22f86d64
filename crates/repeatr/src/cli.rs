//! Clap derive structures for the `repeatr` CLI.
//!
//! Defines the complete command tree, global flags, and shared types.
//! Only clap and clap_complete may be used here: build.rs includes this file.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// repeatr -- bring up a two-radio Wi-Fi repeater and keep it consistent
#[derive(Debug, Parser)]
#[command(
    name = "repeatr",
    version,
    about = "Boot and control a two-radio Wi-Fi repeater",
    long_about = "Binds the removable and onboard radios to stable uplink and access-point\n\
        roles, brings the access point up in dependency order, and keeps the\n\
        Ethernet port mode and the firewall in step.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Configuration file
    #[arg(long, short = 'c', env = "REPEATR_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// State directory (overrides the config file)
    #[arg(long, env = "REPEATR_STATE_DIR", global = true)]
    pub state_dir: Option<PathBuf>,

    /// Output format (defaults to the config file's choice)
    #[arg(long, short = 'o', env = "REPEATR_OUTPUT", global = true)]
    pub output: Option<OutputFormat>,

    /// When to use color output
    #[arg(long, global = true)]
    pub color: Option<ColorMode>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    /// Routed segment of its own, NAT'd behind the uplink
    Client,
    /// Joined to the access point's segment through the bridge
    Bridged,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Bind roles and bring the router up
    Boot(BootArgs),

    /// Show how the wireless adapters classify
    Classify,

    /// Re-derive and persist the role binding
    Bind,

    /// Show or change the Ethernet port mode
    Mode(ModeArgs),

    /// Re-assert addressing, daemon config and firewall for the current mode
    Reapply,

    /// Allow or block forwarding through the uplink
    Uplink(UplinkArgs),

    /// Show persisted binding, mode, firewall and last boot
    Status,

    /// Inspect the generated firewall rule set
    #[command(alias = "fw")]
    Firewall(FirewallArgs),

    /// Manage the configuration file
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Boot ─────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct BootArgs {
    /// Abort the boot after this many seconds
    #[arg(long)]
    pub deadline: Option<u64>,
}

// ── Mode ─────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ModeArgs {
    #[command(subcommand)]
    pub command: ModeCommand,
}

#[derive(Debug, Subcommand)]
pub enum ModeCommand {
    /// Print the persisted mode
    Get,

    /// Switch the Ethernet port
    Set {
        #[arg(value_enum)]
        mode: ModeArg,
    },
}

// ── Uplink ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct UplinkArgs {
    #[command(subcommand)]
    pub command: UplinkCommand,
}

#[derive(Debug, Subcommand)]
pub enum UplinkCommand {
    /// Let LAN traffic leave through the uplink
    Enable,
    /// Keep LAN traffic local
    Disable,
}

// ── Firewall ─────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct FirewallArgs {
    #[command(subcommand)]
    pub command: FirewallCommand,
}

#[derive(Debug, Subcommand)]
pub enum FirewallCommand {
    /// Render the rule set for the current or a hypothetical topology
    Show(FirewallShowArgs),
}

#[derive(Debug, Args)]
pub struct FirewallShowArgs {
    /// Uplink interface name (skips adapter discovery)
    #[arg(long, requires = "ap")]
    pub uplink: Option<String>,

    /// Access point interface name (skips adapter discovery)
    #[arg(long, requires = "uplink")]
    pub ap: Option<String>,

    /// Port mode to render for instead of the persisted one
    #[arg(long, value_enum)]
    pub mode: Option<ModeArg>,

    /// Render with uplink forwarding disabled
    #[arg(long)]
    pub no_forwarding: bool,

    /// List individual rules instead of the restore text
    #[arg(long)]
    pub rules: bool,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Interactive setup wizard
    Init,

    /// Print the effective configuration
    Show,

    /// Check the configuration without touching the system
    Validate,

    /// Print the configuration file path
    Path,
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: clap_complete::Shell,
}
