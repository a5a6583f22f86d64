// ── Runtime router configuration ──
//
// These types describe *what* the router should look like once it is up.
// They are supplied by the config crate (or a test) and are read-only for
// the whole lifetime of a `Router`; the core never reads config files.

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;

use ipnet::Ipv4Net;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::model::{AssignmentPolicy, BridgeMode, InterfaceMap, Topology};
use crate::orchestrator::RetryPolicy;

/// Radio band for the access point.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
pub enum Band {
    #[default]
    #[serde(rename = "2.4")]
    #[strum(serialize = "2.4")]
    Ghz2_4,
    #[serde(rename = "5")]
    #[strum(serialize = "5")]
    Ghz5,
}

impl Band {
    /// hostapd `hw_mode` value.
    pub fn hw_mode(self) -> &'static str {
        match self {
            Self::Ghz2_4 => "g",
            Self::Ghz5 => "a",
        }
    }

    pub fn accepts_channel(self, channel: u8) -> bool {
        match self {
            Self::Ghz2_4 => (1..=14).contains(&channel),
            Self::Ghz5 => (36..=177).contains(&channel),
        }
    }
}

/// Access point broadcast settings.
#[derive(Debug, Clone)]
pub struct AccessPointConfig {
    pub ssid: String,
    pub passphrase: SecretString,
    pub band: Band,
    pub channel: u8,
    /// Suppress the SSID in beacons.
    pub hidden: bool,
    /// Router address and prefix on the AP segment (e.g. `192.168.50.1/24`).
    pub address: Ipv4Net,
}

/// DHCP/DNS daemon settings for the AP segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhcpConfig {
    pub range_start: Ipv4Addr,
    pub range_end: Ipv4Addr,
    /// dnsmasq lease time, e.g. `12h`.
    pub lease_time: String,
    /// DNS listener port; 0 leaves DNS to another resolver on the host.
    pub dns_port: u16,
    pub domain: String,
}

/// The Ethernet port and its client-mode address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EthernetConfig {
    pub interface: String,
    /// Router address on the routed Ethernet segment (client mode only).
    pub address: Ipv4Net,
}

/// Where daemon configuration lands and which units run them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonConfig {
    pub hostapd_conf: PathBuf,
    pub dnsmasq_conf: PathBuf,
    pub hostapd_service: String,
    pub dnsmasq_service: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            hostapd_conf: "/etc/hostapd/hostapd.conf".into(),
            dnsmasq_conf: "/etc/dnsmasq.d/repeatr.conf".into(),
            hostapd_service: "hostapd".into(),
            dnsmasq_service: "dnsmasq".into(),
        }
    }
}

/// Readiness polling and retry tuning for the boot units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimingConfig {
    /// How long each unit's readiness predicate is polled after a start.
    pub readiness_polls: u32,
    pub readiness_interval: Duration,
    /// Bounded wait for the AP device node before static addressing.
    pub device_wait: RetryPolicy,
    /// Retry policy for uplink association.
    pub uplink_retry: RetryPolicy,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            readiness_polls: 10,
            readiness_interval: Duration::from_millis(500),
            device_wait: RetryPolicy::bounded(20, Duration::from_millis(500)),
            uplink_retry: RetryPolicy::bounded(5, Duration::from_secs(10)),
        }
    }
}

/// Complete startup parameters for a router.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Directory holding the persisted binding, bridge mode and status.
    pub state_dir: PathBuf,
    /// ISO 3166-1 alpha-2 country code for the regulatory domain.
    pub regulatory_domain: String,
    pub assignment: AssignmentPolicy,
    /// Logical name recorded for the uplink adapter.
    pub uplink_name: String,
    /// Logical name recorded for the access-point adapter.
    pub access_point_name: String,
    pub bridge_interface: String,
    /// Mode used when nothing has been persisted yet.
    pub default_bridge_mode: BridgeMode,
    pub access_point: AccessPointConfig,
    pub dhcp: DhcpConfig,
    pub ethernet: EthernetConfig,
    pub daemons: DaemonConfig,
    pub timing: TimingConfig,
}

impl RouterConfig {
    pub fn ap_subnet(&self) -> Ipv4Net {
        self.access_point.address.trunc()
    }

    pub fn ethernet_subnet(&self) -> Ipv4Net {
        self.ethernet.address.trunc()
    }

    /// The AP lease range shifted onto the Ethernet subnet and clamped to
    /// its host addresses. `None` when the subnet has no room for leases.
    pub fn ethernet_dhcp_range(&self) -> Option<(Ipv4Addr, Ipv4Addr)> {
        let ap_network = u32::from(self.ap_subnet().network());
        let eth = self.ethernet_subnet();
        let network = u32::from(eth.network());
        let first = network.checked_add(1)?;
        let last = u32::from(eth.broadcast()).checked_sub(1)?;
        if first > last {
            return None;
        }

        let shift = |addr: Ipv4Addr| {
            let offset = u32::from(addr).saturating_sub(ap_network);
            network.saturating_add(offset).clamp(first, last)
        };
        let start = shift(self.dhcp.range_start);
        let end = shift(self.dhcp.range_end);
        (start <= end).then(|| (Ipv4Addr::from(start), Ipv4Addr::from(end)))
    }

    /// Snapshot of the router's shape for the given interfaces and mode.
    pub fn topology(
        &self,
        interfaces: &InterfaceMap,
        bridge_mode: BridgeMode,
        uplink_forwarding: bool,
    ) -> Topology {
        Topology {
            uplink: interfaces.uplink.clone(),
            access_point: interfaces.access_point.clone(),
            ethernet: self.ethernet.interface.clone(),
            bridge: self.bridge_interface.clone(),
            ap_subnet: self.ap_subnet(),
            ethernet_subnet: self.ethernet_subnet(),
            bridge_mode,
            uplink_forwarding,
        }
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            state_dir: "/var/lib/repeatr".into(),
            regulatory_domain: "DE".into(),
            assignment: AssignmentPolicy::default(),
            uplink_name: "wan".into(),
            access_point_name: "ap".into(),
            bridge_interface: "br0".into(),
            default_bridge_mode: BridgeMode::default(),
            access_point: AccessPointConfig {
                ssid: "repeatr".into(),
                passphrase: SecretString::from("change-me-now".to_string()),
                band: Band::default(),
                channel: 6,
                hidden: false,
                address: prefixed(Ipv4Addr::new(192, 168, 50, 1), 24),
            },
            dhcp: DhcpConfig {
                range_start: Ipv4Addr::new(192, 168, 50, 10),
                range_end: Ipv4Addr::new(192, 168, 50, 200),
                lease_time: "12h".into(),
                dns_port: 0,
                domain: "lan".into(),
            },
            ethernet: EthernetConfig {
                interface: "eth0".into(),
                address: prefixed(Ipv4Addr::new(192, 168, 51, 1), 24),
            },
            daemons: DaemonConfig::default(),
            timing: TimingConfig::default(),
        }
    }
}

fn prefixed(addr: Ipv4Addr, prefix: u8) -> Ipv4Net {
    Ipv4Net::new(addr, prefix).unwrap_or_else(|_| Ipv4Net::from(addr))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subnets_are_truncated() {
        let cfg = RouterConfig::default();
        assert_eq!(cfg.ap_subnet().to_string(), "192.168.50.0/24");
        assert_eq!(cfg.ethernet_subnet().to_string(), "192.168.51.0/24");
    }

    #[test]
    fn ethernet_range_mirrors_the_access_point_range() {
        let cfg = RouterConfig::default();
        assert_eq!(
            cfg.ethernet_dhcp_range(),
            Some((Ipv4Addr::new(192, 168, 51, 10), Ipv4Addr::new(192, 168, 51, 200)))
        );
    }

    #[test]
    fn ethernet_range_is_clamped_to_small_subnets() {
        let mut cfg = RouterConfig::default();
        cfg.ethernet.address = prefixed(Ipv4Addr::new(10, 0, 0, 1), 28);
        assert_eq!(
            cfg.ethernet_dhcp_range(),
            Some((Ipv4Addr::new(10, 0, 0, 10), Ipv4Addr::new(10, 0, 0, 14)))
        );

        cfg.ethernet.address = prefixed(Ipv4Addr::new(10, 0, 0, 1), 32);
        assert_eq!(cfg.ethernet_dhcp_range(), None);
    }

    #[test]
    fn band_channel_ranges() {
        assert!(Band::Ghz2_4.accepts_channel(6));
        assert!(!Band::Ghz2_4.accepts_channel(36));
        assert!(Band::Ghz5.accepts_channel(36));
        assert_eq!(Band::Ghz5.hw_mode(), "a");
    }
}
