// ── Bridge mode controller ──
//
// Two-state machine for the Ethernet port. Every change runs under the
// state directory's mode lock, taken without waiting: a second caller, in
// this process or another, gets `LockContention` instead of queueing behind
// the first. A failed switch is rolled back to the previous mode before the
// original error is returned.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::RouterConfig;
use crate::error::CoreError;
use crate::firewall::{FirewallApplier, generate};
use crate::host::Host;
use crate::model::{BridgeMode, InterfaceMap, Topology};
use crate::services::{render_dnsmasq, render_hostapd};
use crate::store::StateStore;

/// What a mode request did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeChange {
    pub previous: BridgeMode,
    pub current: BridgeMode,
    pub uplink_forwarding: bool,
    /// Whether the kernel rule set was replaced.
    pub rules_applied: bool,
    pub fingerprint: String,
}

impl ModeChange {
    pub fn switched(&self) -> bool {
        self.previous != self.current
    }
}

pub struct BridgeController {
    host: Arc<dyn Host>,
    config: Arc<RouterConfig>,
    store: StateStore,
    firewall: Arc<FirewallApplier>,
}

impl BridgeController {
    pub fn new(
        host: Arc<dyn Host>,
        config: Arc<RouterConfig>,
        store: StateStore,
        firewall: Arc<FirewallApplier>,
    ) -> Self {
        Self {
            host,
            config,
            store,
            firewall,
        }
    }

    /// Persisted mode, or the configured default when none is stored.
    pub async fn current_mode(&self) -> Result<BridgeMode, CoreError> {
        Ok(self
            .store
            .load_bridge_mode()
            .await?
            .unwrap_or(self.config.default_bridge_mode))
    }

    pub async fn uplink_forwarding(&self) -> Result<bool, CoreError> {
        Ok(self.store.load_uplink_forwarding().await?.unwrap_or(true))
    }

    /// Move the Ethernet port to `target`.
    ///
    /// Requesting the active mode re-asserts addressing and only reloads
    /// the firewall when the active rule set differs.
    pub async fn set_mode(
        &self,
        interfaces: &InterfaceMap,
        target: BridgeMode,
    ) -> Result<ModeChange, CoreError> {
        let mut lock = self.store.mode_lock().await?;
        let _held = lock.try_acquire()?;

        let current = self.current_mode().await?;
        let forwarding = self.uplink_forwarding().await?;
        let to = self.config.topology(interfaces, target, forwarding);

        if target == current {
            debug!(mode = %target, "mode unchanged, reconciling");
            apply_addressing(self.host.as_ref(), &self.config, &to).await?;
            let rules = generate(&to);
            let fingerprint = rules.fingerprint().to_string();
            let rules_applied = self.firewall.apply_if_changed(rules).await?;
            return Ok(ModeChange {
                previous: current,
                current: target,
                uplink_forwarding: forwarding,
                rules_applied,
                fingerprint,
            });
        }

        let from = self.config.topology(interfaces, current, forwarding);
        info!(from = %current, to = %target, "switching bridge mode");

        match self.switch(&from, &to).await {
            Ok(fingerprint) => {
                info!(mode = %target, %fingerprint, "bridge mode switched");
                Ok(ModeChange {
                    previous: current,
                    current: target,
                    uplink_forwarding: forwarding,
                    rules_applied: true,
                    fingerprint,
                })
            }
            Err(e) => {
                warn!(error = %e, "mode switch failed, rolling back to {current}");
                self.rollback(&to, &from).await;
                Err(e)
            }
        }
    }

    /// Re-assert everything for the persisted mode: addressing, daemon
    /// configuration and the full rule set.
    pub async fn reapply(&self, interfaces: &InterfaceMap) -> Result<ModeChange, CoreError> {
        let mut lock = self.store.mode_lock().await?;
        let _held = lock.try_acquire()?;

        let mode = self.current_mode().await?;
        let forwarding = self.uplink_forwarding().await?;
        let topology = self.config.topology(interfaces, mode, forwarding);

        apply_addressing(self.host.as_ref(), &self.config, &topology).await?;
        refresh_daemons(self.host.as_ref(), &self.config, &topology).await?;
        let rules = generate(&topology);
        let fingerprint = rules.fingerprint().to_string();
        self.firewall.apply(rules).await?;

        info!(%mode, "configuration re-applied");
        Ok(ModeChange {
            previous: mode,
            current: mode,
            uplink_forwarding: forwarding,
            rules_applied: true,
            fingerprint,
        })
    }

    /// Allow or stop LAN traffic leaving through the uplink.
    pub async fn set_uplink_forwarding(
        &self,
        interfaces: &InterfaceMap,
        enabled: bool,
    ) -> Result<ModeChange, CoreError> {
        let mut lock = self.store.mode_lock().await?;
        let _held = lock.try_acquire()?;

        let mode = self.current_mode().await?;
        let previous = self.uplink_forwarding().await?;
        let rules = generate(&self.config.topology(interfaces, mode, enabled));
        let fingerprint = rules.fingerprint().to_string();

        self.store.save_uplink_forwarding(enabled).await?;
        let rules_applied = match self.firewall.apply_if_changed(rules).await {
            Ok(applied) => applied,
            Err(e) => {
                if let Err(restore) = self.store.save_uplink_forwarding(previous).await {
                    warn!(error = %restore, "failed to restore uplink forwarding flag");
                }
                return Err(e);
            }
        };

        info!(enabled, "uplink forwarding updated");
        Ok(ModeChange {
            previous: mode,
            current: mode,
            uplink_forwarding: enabled,
            rules_applied,
            fingerprint,
        })
    }

    async fn switch(&self, from: &Topology, to: &Topology) -> Result<String, CoreError> {
        let host = self.host.as_ref();
        teardown_addressing(host, from).await?;
        apply_addressing(host, &self.config, to).await?;
        refresh_daemons(host, &self.config, to).await?;
        self.store.save_bridge_mode(to.bridge_mode).await?;

        let rules = generate(to);
        let fingerprint = rules.fingerprint().to_string();
        self.firewall.apply(rules).await?;
        Ok(fingerprint)
    }

    /// Best effort: every step runs even if an earlier one fails.
    async fn rollback(&self, attempted: &Topology, previous: &Topology) {
        let host = self.host.as_ref();
        let steps = [
            ("teardown", teardown_addressing(host, attempted).await),
            (
                "addressing",
                apply_addressing(host, &self.config, previous).await,
            ),
            (
                "daemons",
                refresh_daemons(host, &self.config, previous).await,
            ),
            (
                "persist",
                self.store.save_bridge_mode(previous.bridge_mode).await,
            ),
            (
                "firewall",
                self.firewall
                    .apply_if_changed(generate(previous))
                    .await
                    .map(drop),
            ),
        ];
        for (step, result) in steps {
            if let Err(e) = result {
                warn!(step, error = %e, "rollback step failed");
            }
        }
    }
}

// ── Addressing ──────────────────────────────────────────────────────

/// Bring addressing and bridge membership in line with `topology`.
///
/// Idempotent. A missing Ethernet port is skipped with a warning so the
/// access point still comes up on boards without one.
pub(crate) async fn apply_addressing(
    host: &dyn Host,
    config: &RouterConfig,
    topology: &Topology,
) -> Result<(), CoreError> {
    let ap = topology.access_point.as_str();
    let eth = topology.ethernet.as_str();
    let eth_present = host.link_exists(eth).await;
    if !eth_present {
        warn!(interface = eth, "ethernet port not present, skipping");
    }

    match topology.bridge_mode {
        BridgeMode::Client => {
            host.set_link_up(ap).await?;
            host.add_address(ap, config.access_point.address).await?;
            if eth_present {
                host.set_link_up(eth).await?;
                host.add_address(eth, config.ethernet.address).await?;
            }
        }
        BridgeMode::Bridged => {
            let bridge = topology.bridge.as_str();
            host.create_bridge(bridge).await?;
            host.set_link_up(bridge).await?;

            host.flush_addresses(ap).await?;
            host.set_master(ap, Some(bridge)).await?;
            host.set_link_up(ap).await?;
            if eth_present {
                host.flush_addresses(eth).await?;
                host.set_master(eth, Some(bridge)).await?;
                host.set_link_up(eth).await?;
            }
            host.add_address(bridge, config.access_point.address).await?;
        }
    }
    Ok(())
}

/// Undo what `apply_addressing` did for `topology`.
pub(crate) async fn teardown_addressing(
    host: &dyn Host,
    topology: &Topology,
) -> Result<(), CoreError> {
    let ap = topology.access_point.as_str();
    let eth = topology.ethernet.as_str();
    let eth_present = host.link_exists(eth).await;

    match topology.bridge_mode {
        BridgeMode::Client => {
            host.flush_addresses(ap).await?;
            if eth_present {
                host.flush_addresses(eth).await?;
            }
        }
        BridgeMode::Bridged => {
            host.set_master(ap, None).await?;
            if eth_present {
                host.set_master(eth, None).await?;
            }
            host.delete_bridge(&topology.bridge).await?;
        }
    }
    Ok(())
}

/// Rewrite hostapd and dnsmasq configuration for `topology` and restart
/// both daemons.
pub(crate) async fn refresh_daemons(
    host: &dyn Host,
    config: &RouterConfig,
    topology: &Topology,
) -> Result<(), CoreError> {
    let daemons = &config.daemons;
    host.write_file(&daemons.hostapd_conf, &render_hostapd(config, topology))
        .await?;
    host.write_file(&daemons.dnsmasq_conf, &render_dnsmasq(config, topology))
        .await?;
    host.restart_service(&daemons.hostapd_service).await?;
    host.restart_service(&daemons.dnsmasq_service).await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::host::mock::MockHost;
    use pretty_assertions::assert_eq;

    struct Fixture {
        host: Arc<MockHost>,
        controller: Arc<BridgeController>,
        firewall: Arc<FirewallApplier>,
        config: Arc<RouterConfig>,
        store: StateStore,
        _dir: tempfile::TempDir,
    }

    fn interfaces() -> InterfaceMap {
        InterfaceMap {
            uplink: "wlan0".into(),
            access_point: "wlan1".into(),
        }
    }

    async fn cold_start_client(host: &Arc<MockHost>, config: &RouterConfig) -> String {
        let topology = config.topology(&interfaces(), BridgeMode::Client, true);
        apply_addressing(host.as_ref(), config, &topology).await.unwrap();
        generate(&topology).text().to_string()
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let host = Arc::new(MockHost::with_links(&["wlan0", "wlan1", "eth0"]));
        let config = Arc::new(RouterConfig {
            state_dir: dir.path().to_path_buf(),
            ..RouterConfig::default()
        });
        let store = StateStore::new(dir.path());
        let firewall = Arc::new(FirewallApplier::new(host.clone()));
        let controller = Arc::new(BridgeController::new(
            host.clone(),
            config.clone(),
            store.clone(),
            firewall.clone(),
        ));

        // Router state after a Client-mode boot.
        store.save_bridge_mode(BridgeMode::Client).await.unwrap();
        let text = cold_start_client(&host, &config).await;
        let topology = config.topology(&interfaces(), BridgeMode::Client, true);
        firewall.apply(generate(&topology)).await.unwrap();
        assert_eq!(host.firewall().unwrap(), text);

        Fixture {
            host,
            controller,
            firewall,
            config,
            store,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn switch_to_bridged_enslaves_ports() {
        let f = fixture().await;
        let change = f
            .controller
            .set_mode(&interfaces(), BridgeMode::Bridged)
            .await
            .unwrap();

        assert!(change.switched());
        assert_eq!(f.host.master_of("wlan1").as_deref(), Some("br0"));
        assert_eq!(f.host.master_of("eth0").as_deref(), Some("br0"));
        assert!(f.host.addresses_of("wlan1").is_empty());
        assert!(f.host.addresses_of("eth0").is_empty());
        assert!(f.host.addresses_of("br0").contains(&f.config.access_point.address));
        assert_eq!(
            f.store.load_bridge_mode().await.unwrap(),
            Some(BridgeMode::Bridged)
        );

        let state = f.host.state();
        let dnsmasq = &state.files[&f.config.daemons.dnsmasq_conf];
        assert!(dnsmasq.contains("interface=br0\n"));
        let hostapd = &state.files[&f.config.daemons.hostapd_conf];
        assert!(hostapd.contains("bridge=br0\n"));
        assert_eq!(state.restarts, vec!["hostapd", "dnsmasq"]);
    }

    #[tokio::test]
    async fn round_trip_matches_cold_start_client() {
        let f = fixture().await;
        f.controller
            .set_mode(&interfaces(), BridgeMode::Bridged)
            .await
            .unwrap();
        f.controller
            .set_mode(&interfaces(), BridgeMode::Client)
            .await
            .unwrap();

        let fresh = Arc::new(MockHost::with_links(&["wlan0", "wlan1", "eth0"]));
        let cold_rules = cold_start_client(&fresh, &f.config).await;

        assert_eq!(f.host.firewall().unwrap(), cold_rules);
        assert_eq!(f.host.addresses_of("wlan1"), fresh.addresses_of("wlan1"));
        assert_eq!(f.host.addresses_of("eth0"), fresh.addresses_of("eth0"));
        assert!(f.host.master_of("wlan1").is_none());
        assert!(f.host.master_of("eth0").is_none());
        assert!(!f.host.state().bridges.contains("br0"));
    }

    #[tokio::test]
    async fn same_mode_skips_unchanged_rules() {
        let f = fixture().await;
        let before = f.host.state().firewall_history.len();
        let change = f
            .controller
            .set_mode(&interfaces(), BridgeMode::Client)
            .await
            .unwrap();

        assert!(!change.switched());
        assert!(!change.rules_applied);
        assert_eq!(f.host.state().firewall_history.len(), before);
        assert!(f.host.state().restarts.is_empty());
    }

    #[tokio::test]
    async fn failed_firewall_rolls_back_to_previous_mode() {
        let f = fixture().await;
        let client_rules = f.host.firewall().unwrap();
        let client_fingerprint = f.firewall.active_fingerprint();
        f.host.fail("restore_firewall");

        let err = f
            .controller
            .set_mode(&interfaces(), BridgeMode::Bridged)
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::RuleApplyFailed { .. }));
        assert_eq!(
            f.store.load_bridge_mode().await.unwrap(),
            Some(BridgeMode::Client)
        );
        assert_eq!(f.host.firewall().unwrap(), client_rules);
        assert_eq!(f.firewall.active_fingerprint(), client_fingerprint);
        assert!(f.host.master_of("wlan1").is_none());
        assert!(!f.host.state().bridges.contains("br0"));
        assert!(f.host.addresses_of("wlan1").contains(&f.config.access_point.address));
        assert!(f.host.addresses_of("eth0").contains(&f.config.ethernet.address));
        let dnsmasq = f.host.state().files[&f.config.daemons.dnsmasq_conf].clone();
        assert!(dnsmasq.contains("interface=wlan1\n"));
    }

    #[tokio::test]
    async fn concurrent_change_is_rejected() {
        let f = fixture().await;
        let gate = f.host.gate("create_bridge");

        let first = {
            let controller = f.controller.clone();
            tokio::spawn(async move {
                controller.set_mode(&interfaces(), BridgeMode::Bridged).await
            })
        };
        while !f.host.called("create_bridge") {
            tokio::task::yield_now().await;
        }

        let second = f
            .controller
            .set_mode(&interfaces(), BridgeMode::Client)
            .await;
        assert!(matches!(second, Err(CoreError::LockContention)));

        gate.notify_one();
        assert!(first.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn lock_held_elsewhere_rejects_every_change() {
        let f = fixture().await;
        // Another process holding the state directory's lock.
        let mut other = f.store.mode_lock().await.unwrap();
        let _held = other.try_acquire().unwrap();

        assert!(matches!(
            f.controller.set_mode(&interfaces(), BridgeMode::Bridged).await,
            Err(CoreError::LockContention)
        ));
        assert!(matches!(
            f.controller.reapply(&interfaces()).await,
            Err(CoreError::LockContention)
        ));
        assert!(matches!(
            f.controller.set_uplink_forwarding(&interfaces(), false).await,
            Err(CoreError::LockContention)
        ));

        assert!(!f.host.called("create_bridge"));
        assert_eq!(
            f.store.load_bridge_mode().await.unwrap(),
            Some(BridgeMode::Client)
        );
        assert_eq!(f.store.load_uplink_forwarding().await.unwrap(), None);
    }

    #[tokio::test]
    async fn disabling_uplink_forwarding_drops_masquerade() {
        let f = fixture().await;
        let change = f
            .controller
            .set_uplink_forwarding(&interfaces(), false)
            .await
            .unwrap();

        assert!(change.rules_applied);
        assert!(!f.host.firewall().unwrap().contains("MASQUERADE"));
        assert_eq!(f.store.load_uplink_forwarding().await.unwrap(), Some(false));

        // The flag survives a later mode switch.
        f.controller
            .set_mode(&interfaces(), BridgeMode::Bridged)
            .await
            .unwrap();
        assert!(!f.host.firewall().unwrap().contains("MASQUERADE"));
    }

    #[tokio::test]
    async fn reapply_rewrites_daemons_and_rules() {
        let f = fixture().await;
        let before = f.host.state().firewall_history.len();
        f.controller.reapply(&interfaces()).await.unwrap();

        let state = f.host.state();
        assert_eq!(state.firewall_history.len(), before + 1);
        assert_eq!(state.restarts, vec!["hostapd", "dnsmasq"]);
        assert!(state.files.contains_key(&f.config.daemons.hostapd_conf));
    }
}
