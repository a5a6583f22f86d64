// ── Topology snapshot ──
//
// Derived on demand from the binding, the persisted bridge mode and the
// static configuration. Never written to disk.

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};

use super::mode::BridgeMode;

/// Everything the firewall generator needs to know about the router's shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    /// Resolved kernel name of the uplink adapter.
    pub uplink: String,
    /// Resolved kernel name of the access-point adapter.
    pub access_point: String,
    /// The Ethernet port.
    pub ethernet: String,
    /// Bridge device used in bridged mode.
    pub bridge: String,
    pub ap_subnet: Ipv4Net,
    /// Routed segment behind the Ethernet port in client mode.
    pub ethernet_subnet: Ipv4Net,
    pub bridge_mode: BridgeMode,
    /// Whether LAN traffic may leave through the uplink at all.
    pub uplink_forwarding: bool,
}

impl Topology {
    /// Interface that carries the access-point subnet: the radio itself in
    /// client mode, the bridge in bridged mode.
    pub fn lan_interface(&self) -> &str {
        match self.bridge_mode {
            BridgeMode::Client => &self.access_point,
            BridgeMode::Bridged => &self.bridge,
        }
    }
}
