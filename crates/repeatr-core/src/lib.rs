//! Role binding, boot orchestration, bridge mode and firewall generation
//! for a two-radio travel router.
//!
//! - **[`Router`]**: facade over everything below. [`Router::boot`] classifies
//!   the radios, persists the role binding, runs the standard unit graph and
//!   loads the firewall. Runtime requests ([`Command`]) change the Ethernet
//!   port mode, toggle uplink forwarding or re-apply configuration.
//!
//! - **[`classify`] / [`RoleBinder`]**: split wireless adapters into removable
//!   and onboard and bind them to the `uplink` and `access-point` roles by
//!   hardware address.
//!
//! - **[`Orchestrator`]**: generic DAG scheduler with readiness gates, retry
//!   policies and fatal/degradable failure handling. [`standard_plan`] builds
//!   the six boot units.
//!
//! - **[`BridgeController`]**: client/bridged state machine with rollback.
//!
//! - **[`firewall`]**: pure `iptables-restore` generation plus an applier that
//!   replaces whole tables and restores the previous set on failure.
//!
//! All machine access goes through the [`Host`] trait; [`SystemHost`] drives
//! the usual Linux tools.

pub mod binding;
pub mod bridge;
pub mod classify;
pub mod command;
pub mod config;
pub mod error;
pub mod firewall;
pub mod host;
pub mod model;
pub mod orchestrator;
pub mod router;
pub mod services;
pub mod store;
pub mod units;

// ── Primary re-exports ──────────────────────────────────────────────
pub use binding::{BindOutcome, RoleBinder, resolve};
pub use bridge::{BridgeController, ModeChange};
pub use classify::{ClassifiedAdapters, classify};
pub use command::{Command, CommandResult};
pub use config::{AccessPointConfig, Band, DaemonConfig, DhcpConfig, EthernetConfig, RouterConfig, TimingConfig};
pub use error::CoreError;
pub use firewall::{FirewallApplier, FirewallRuleSet, RuleLine, generate};
pub use host::{Host, SystemHost};
pub use orchestrator::{
    Background, BootOutcome, BootReport, BootRun, Criticality, Orchestrator, Readiness,
    RetryPolicy, Transition, Unit, UnitSpec, UnitState, UnitStatus,
};
pub use router::{Router, RouterStatus, StatusSnapshot};
pub use store::StateStore;
pub use units::standard_plan;

// Re-export model types at the crate root for ergonomics.
pub use model::{
    AssignmentPolicy, BindingEntry, BridgeMode, BusOrigin, InterfaceMap, LogicalRole, MacAddress,
    PhysicalAdapter, RoleBinding, Topology,
};
