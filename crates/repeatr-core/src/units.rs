// ── Standard boot units ──
//
// The six steps that take a bound pair of radios to a serving access point:
//
//   regulatory-domain
//   ├─ ap-interface-prep ── static-ip-assignment ─┬─ beaconing
//   └─ uplink-association ────────────────────────┴─ dhcp-dns

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::bridge::apply_addressing;
use crate::config::RouterConfig;
use crate::error::CoreError;
use crate::host::Host;
use crate::model::Topology;
use crate::orchestrator::{Readiness, RetryPolicy, Unit, UnitSpec};
use crate::services::{render_dnsmasq, render_hostapd};

pub const REGULATORY_DOMAIN: &str = "regulatory-domain";
pub const AP_INTERFACE_PREP: &str = "ap-interface-prep";
pub const STATIC_IP_ASSIGNMENT: &str = "static-ip-assignment";
pub const UPLINK_ASSOCIATION: &str = "uplink-association";
pub const BEACONING: &str = "beaconing";
pub const DHCP_DNS: &str = "dhcp-dns";

/// Build the standard unit graph for `topology`.
pub fn standard_plan(
    host: &Arc<dyn Host>,
    config: &Arc<RouterConfig>,
    topology: &Topology,
) -> Vec<UnitSpec> {
    let timing = &config.timing;
    let readiness = Readiness {
        polls: timing.readiness_polls,
        interval: timing.readiness_interval,
    };
    let topology = Arc::new(topology.clone());

    vec![
        UnitSpec::new(
            REGULATORY_DOMAIN,
            Arc::new(RegulatoryDomain {
                host: Arc::clone(host),
                country: config.regulatory_domain.clone(),
            }),
        )
        .readiness(readiness),
        UnitSpec::new(
            AP_INTERFACE_PREP,
            Arc::new(ApInterfacePrep {
                host: Arc::clone(host),
                interface: topology.access_point.clone(),
            }),
        )
        .after([REGULATORY_DOMAIN])
        .readiness(readiness),
        UnitSpec::new(
            STATIC_IP_ASSIGNMENT,
            Arc::new(StaticIpAssignment {
                host: Arc::clone(host),
                config: Arc::clone(config),
                topology: Arc::clone(&topology),
                device_wait: timing.device_wait,
            }),
        )
        .after([AP_INTERFACE_PREP])
        .readiness(readiness),
        UnitSpec::new(
            UPLINK_ASSOCIATION,
            Arc::new(UplinkAssociation {
                host: Arc::clone(host),
                interface: topology.uplink.clone(),
                attempts: AtomicU32::new(0),
            }),
        )
        .after([REGULATORY_DOMAIN])
        .retry(timing.uplink_retry)
        .readiness(readiness)
        .degradable(),
        UnitSpec::new(
            BEACONING,
            Arc::new(Beaconing {
                host: Arc::clone(host),
                config: Arc::clone(config),
                topology: Arc::clone(&topology),
            }),
        )
        .after([STATIC_IP_ASSIGNMENT, UPLINK_ASSOCIATION])
        .readiness(readiness),
        UnitSpec::new(
            DHCP_DNS,
            Arc::new(DhcpDns {
                host: Arc::clone(host),
                config: Arc::clone(config),
                topology,
            }),
        )
        .after([STATIC_IP_ASSIGNMENT, UPLINK_ASSOCIATION])
        .readiness(readiness),
    ]
}

// ── regulatory-domain ───────────────────────────────────────────────

struct RegulatoryDomain {
    host: Arc<dyn Host>,
    country: String,
}

#[async_trait]
impl Unit for RegulatoryDomain {
    async fn start(&self, _cancel: &CancellationToken) -> Result<(), CoreError> {
        self.host.set_regulatory_domain(&self.country).await
    }

    async fn is_ready(&self) -> bool {
        matches!(
            self.host.regulatory_domain().await,
            Ok(Some(active)) if active.eq_ignore_ascii_case(&self.country)
        )
    }
}

// ── ap-interface-prep ───────────────────────────────────────────────

struct ApInterfacePrep {
    host: Arc<dyn Host>,
    interface: String,
}

#[async_trait]
impl Unit for ApInterfacePrep {
    async fn start(&self, _cancel: &CancellationToken) -> Result<(), CoreError> {
        self.host.unblock_radios().await?;
        // The device node may still be settling; addressing waits for it.
        if self.host.link_exists(&self.interface).await {
            self.host.set_link_up(&self.interface).await?;
        }
        Ok(())
    }

    async fn is_ready(&self) -> bool {
        true
    }
}

// ── static-ip-assignment ────────────────────────────────────────────

struct StaticIpAssignment {
    host: Arc<dyn Host>,
    config: Arc<RouterConfig>,
    topology: Arc<Topology>,
    device_wait: RetryPolicy,
}

impl StaticIpAssignment {
    async fn wait_for_device(&self, cancel: &CancellationToken) -> Result<(), CoreError> {
        let device = &self.topology.access_point;
        let mut polls = 0u32;
        loop {
            polls = polls.saturating_add(1);
            if self.host.link_exists(device).await {
                return Ok(());
            }
            if !self.device_wait.allows_retry_after(polls) {
                return Err(CoreError::DeviceNotReady {
                    device: device.clone(),
                    attempts: polls,
                });
            }
            debug!(device = %device, polls, "waiting for device node");
            tokio::select! {
                () = cancel.cancelled() => return Err(CoreError::Aborted),
                () = tokio::time::sleep(self.device_wait.interval) => {}
            }
        }
    }
}

#[async_trait]
impl Unit for StaticIpAssignment {
    async fn start(&self, cancel: &CancellationToken) -> Result<(), CoreError> {
        self.wait_for_device(cancel).await?;
        apply_addressing(self.host.as_ref(), &self.config, &self.topology).await
    }

    async fn is_ready(&self) -> bool {
        self.host
            .has_address(self.topology.lan_interface(), self.config.access_point.address)
            .await
    }
}

// ── uplink-association ──────────────────────────────────────────────

struct UplinkAssociation {
    host: Arc<dyn Host>,
    interface: String,
    attempts: AtomicU32,
}

#[async_trait]
impl Unit for UplinkAssociation {
    async fn start(&self, _cancel: &CancellationToken) -> Result<(), CoreError> {
        let attempts = self.attempts.fetch_add(1, Ordering::Relaxed).saturating_add(1);
        self.host
            .associate_uplink(&self.interface)
            .await
            .map_err(|e| CoreError::AssociationFailed {
                interface: self.interface.clone(),
                attempts,
                reason: e.to_string(),
            })
    }

    async fn is_ready(&self) -> bool {
        self.host.uplink_associated(&self.interface).await
    }
}

// ── beaconing ───────────────────────────────────────────────────────

struct Beaconing {
    host: Arc<dyn Host>,
    config: Arc<RouterConfig>,
    topology: Arc<Topology>,
}

#[async_trait]
impl Unit for Beaconing {
    async fn start(&self, _cancel: &CancellationToken) -> Result<(), CoreError> {
        let daemons = &self.config.daemons;
        self.host
            .write_file(&daemons.hostapd_conf, &render_hostapd(&self.config, &self.topology))
            .await?;
        self.host.restart_service(&daemons.hostapd_service).await
    }

    async fn is_ready(&self) -> bool {
        self.host
            .service_active(&self.config.daemons.hostapd_service)
            .await
    }
}

// ── dhcp-dns ────────────────────────────────────────────────────────

struct DhcpDns {
    host: Arc<dyn Host>,
    config: Arc<RouterConfig>,
    topology: Arc<Topology>,
}

#[async_trait]
impl Unit for DhcpDns {
    async fn start(&self, _cancel: &CancellationToken) -> Result<(), CoreError> {
        let daemons = &self.config.daemons;
        self.host
            .write_file(&daemons.dnsmasq_conf, &render_dnsmasq(&self.config, &self.topology))
            .await?;
        self.host.restart_service(&daemons.dnsmasq_service).await
    }

    async fn is_ready(&self) -> bool {
        self.host
            .service_active(&self.config.daemons.dnsmasq_service)
            .await
    }
}
