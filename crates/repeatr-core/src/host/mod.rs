//! The seam between orchestration logic and the machine it runs on.
//!
//! Everything that touches the kernel, a daemon or a file outside the state
//! directory goes through [`Host`]. [`SystemHost`] drives the usual Linux
//! tools (`ip`, `iw`, `rfkill`, `nmcli`, `systemctl`, `iptables-restore`);
//! tests use the in-memory mock.

use std::path::Path;

use async_trait::async_trait;
use ipnet::Ipv4Net;

use crate::error::CoreError;
use crate::model::PhysicalAdapter;

mod system;

#[cfg(test)]
pub(crate) mod mock;

pub use system::SystemHost;

/// Operations the router needs from the host.
///
/// Mutating calls must be idempotent: adding an address that is already
/// present, creating a bridge that exists or enslaving an interface that is
/// already a member all succeed.
#[async_trait]
pub trait Host: Send + Sync {
    // ── Discovery ────────────────────────────────────────────────────

    /// Enumerate wireless adapters with their bus origin.
    async fn wireless_adapters(&self) -> Result<Vec<PhysicalAdapter>, CoreError>;

    /// Whether a network device node exists.
    async fn link_exists(&self, interface: &str) -> bool;

    /// Whether `address` (with prefix) is assigned to `interface`.
    async fn has_address(&self, interface: &str, address: Ipv4Net) -> bool;

    // ── Regulatory / radio ───────────────────────────────────────────

    async fn set_regulatory_domain(&self, country: &str) -> Result<(), CoreError>;

    /// Currently active regulatory domain, if one is set.
    async fn regulatory_domain(&self) -> Result<Option<String>, CoreError>;

    /// Clear soft rfkill blocks on wireless radios.
    async fn unblock_radios(&self) -> Result<(), CoreError>;

    // ── Links and addressing ─────────────────────────────────────────

    async fn set_link_up(&self, interface: &str) -> Result<(), CoreError>;

    async fn flush_addresses(&self, interface: &str) -> Result<(), CoreError>;

    async fn add_address(&self, interface: &str, address: Ipv4Net) -> Result<(), CoreError>;

    async fn create_bridge(&self, bridge: &str) -> Result<(), CoreError>;

    async fn delete_bridge(&self, bridge: &str) -> Result<(), CoreError>;

    /// Enslave `interface` to `bridge`, or release it when `bridge` is `None`.
    async fn set_master(&self, interface: &str, bridge: Option<&str>) -> Result<(), CoreError>;

    // ── Uplink ───────────────────────────────────────────────────────

    /// Ask the network manager to associate the uplink with its saved network.
    async fn associate_uplink(&self, interface: &str) -> Result<(), CoreError>;

    async fn uplink_associated(&self, interface: &str) -> bool;

    // ── Daemons and files ────────────────────────────────────────────

    async fn write_file(&self, path: &Path, contents: &str) -> Result<(), CoreError>;

    async fn restart_service(&self, service: &str) -> Result<(), CoreError>;

    async fn service_active(&self, service: &str) -> bool;

    // ── Packet filter ────────────────────────────────────────────────

    async fn set_ip_forwarding(&self, enabled: bool) -> Result<(), CoreError>;

    /// Replace the `nat` and `filter` tables with `rules`
    /// (`iptables-restore` format) in one transaction.
    async fn restore_firewall(&self, rules: &str) -> Result<(), CoreError>;
}
