// ── In-memory host for tests ──
//
// Models just enough kernel state (links, addresses, bridge membership,
// daemons, the packet filter) to check what the orchestration logic did.
// Failures and slow operations are injected per operation name.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use ipnet::Ipv4Net;
use rand::Rng;
use tokio::sync::Notify;

use super::Host;
use crate::error::CoreError;
use crate::model::PhysicalAdapter;

#[derive(Debug, Default)]
pub(crate) struct MockState {
    pub adapters: Vec<PhysicalAdapter>,
    pub links: BTreeSet<String>,
    pub up: BTreeSet<String>,
    pub addresses: BTreeMap<String, BTreeSet<Ipv4Net>>,
    pub masters: BTreeMap<String, String>,
    pub bridges: BTreeSet<String>,
    pub regdomain: Option<String>,
    pub radios_unblocked: bool,
    pub associated: BTreeSet<String>,
    /// Uplink association fails while this is false.
    pub uplink_reachable: bool,
    pub services: BTreeSet<String>,
    pub restarts: Vec<String>,
    pub files: BTreeMap<PathBuf, String>,
    pub forwarding: bool,
    pub firewall: Option<String>,
    pub firewall_history: Vec<String>,
    /// Links that appear after being polled this many times.
    pub late_links: BTreeMap<String, u32>,
    /// Operation names that fail until removed.
    pub failing: BTreeSet<String>,
    /// Upper bound for a random per-operation delay.
    pub max_delay: Option<Duration>,
    /// Operations that park until their gate is notified.
    pub gates: BTreeMap<String, Arc<Notify>>,
    pub calls: Vec<String>,
}

#[derive(Debug, Default)]
pub(crate) struct MockHost {
    state: Mutex<MockState>,
}

impl MockHost {
    /// Host with the given links present and a reachable uplink.
    pub fn with_links(links: &[&str]) -> Self {
        let host = Self::default();
        {
            let mut state = host.state();
            state.links = links.iter().map(ToString::to_string).collect();
            state.uplink_reachable = true;
        }
        host
    }

    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub fn fail(&self, operation: &str) {
        self.state().failing.insert(operation.to_string());
    }

    /// Park the next call to `operation` until the returned gate is notified.
    pub fn gate(&self, operation: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.state()
            .gates
            .insert(operation.to_string(), Arc::clone(&gate));
        gate
    }

    pub fn called(&self, operation: &str) -> bool {
        self.state().calls.iter().any(|call| call == operation)
    }

    pub fn heal(&self, operation: &str) {
        self.state().failing.remove(operation);
    }

    pub fn addresses_of(&self, interface: &str) -> BTreeSet<Ipv4Net> {
        self.state()
            .addresses
            .get(interface)
            .cloned()
            .unwrap_or_default()
    }

    pub fn master_of(&self, interface: &str) -> Option<String> {
        self.state().masters.get(interface).cloned()
    }

    pub fn firewall(&self) -> Option<String> {
        self.state().firewall.clone()
    }

    async fn enter(&self, operation: &str) -> Result<(), CoreError> {
        let (delay, gate) = {
            let mut state = self.state();
            state.calls.push(operation.to_string());
            (state.max_delay, state.gates.remove(operation))
        };
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if let Some(max) = delay {
            let millis = u64::try_from(max.as_millis()).unwrap_or(u64::MAX).max(1);
            let pause = rand::thread_rng().gen_range(0..=millis);
            tokio::time::sleep(Duration::from_millis(pause)).await;
        }
        if self.state().failing.contains(operation) {
            return Err(CoreError::host(operation, "injected failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl Host for MockHost {
    async fn wireless_adapters(&self) -> Result<Vec<PhysicalAdapter>, CoreError> {
        self.enter("wireless_adapters").await?;
        Ok(self.state().adapters.clone())
    }

    async fn link_exists(&self, interface: &str) -> bool {
        if self.enter("link_exists").await.is_err() {
            return false;
        }
        let mut state = self.state();
        if let Some(remaining) = state.late_links.get_mut(interface) {
            if *remaining == 0 {
                state.late_links.remove(interface);
                state.links.insert(interface.to_string());
            } else {
                *remaining -= 1;
            }
        }
        state.links.contains(interface)
    }

    async fn has_address(&self, interface: &str, address: Ipv4Net) -> bool {
        self.state()
            .addresses
            .get(interface)
            .is_some_and(|set| set.contains(&address))
    }

    async fn set_regulatory_domain(&self, country: &str) -> Result<(), CoreError> {
        self.enter("set_regulatory_domain").await?;
        self.state().regdomain = Some(country.to_string());
        Ok(())
    }

    async fn regulatory_domain(&self) -> Result<Option<String>, CoreError> {
        self.enter("regulatory_domain").await?;
        Ok(self.state().regdomain.clone())
    }

    async fn unblock_radios(&self) -> Result<(), CoreError> {
        self.enter("unblock_radios").await?;
        self.state().radios_unblocked = true;
        Ok(())
    }

    async fn set_link_up(&self, interface: &str) -> Result<(), CoreError> {
        self.enter("set_link_up").await?;
        let mut state = self.state();
        if !state.links.contains(interface) {
            return Err(CoreError::host("set_link_up", format!("no device {interface}")));
        }
        state.up.insert(interface.to_string());
        Ok(())
    }

    async fn flush_addresses(&self, interface: &str) -> Result<(), CoreError> {
        self.enter("flush_addresses").await?;
        self.state().addresses.remove(interface);
        Ok(())
    }

    async fn add_address(&self, interface: &str, address: Ipv4Net) -> Result<(), CoreError> {
        self.enter("add_address").await?;
        let mut state = self.state();
        if !state.links.contains(interface) {
            return Err(CoreError::host("add_address", format!("no device {interface}")));
        }
        state
            .addresses
            .entry(interface.to_string())
            .or_default()
            .insert(address);
        Ok(())
    }

    async fn create_bridge(&self, bridge: &str) -> Result<(), CoreError> {
        self.enter("create_bridge").await?;
        let mut state = self.state();
        state.bridges.insert(bridge.to_string());
        state.links.insert(bridge.to_string());
        Ok(())
    }

    async fn delete_bridge(&self, bridge: &str) -> Result<(), CoreError> {
        self.enter("delete_bridge").await?;
        let mut state = self.state();
        state.bridges.remove(bridge);
        state.links.remove(bridge);
        state.up.remove(bridge);
        state.addresses.remove(bridge);
        state.masters.retain(|_, master| master != bridge);
        Ok(())
    }

    async fn set_master(&self, interface: &str, bridge: Option<&str>) -> Result<(), CoreError> {
        self.enter("set_master").await?;
        let mut state = self.state();
        match bridge {
            Some(bridge) => {
                if !state.bridges.contains(bridge) {
                    return Err(CoreError::host("set_master", format!("no bridge {bridge}")));
                }
                state.masters.insert(interface.to_string(), bridge.to_string());
            }
            None => {
                state.masters.remove(interface);
            }
        }
        Ok(())
    }

    async fn associate_uplink(&self, interface: &str) -> Result<(), CoreError> {
        self.enter("associate_uplink").await?;
        let mut state = self.state();
        if !state.uplink_reachable {
            return Err(CoreError::host("associate_uplink", "no network in range"));
        }
        state.associated.insert(interface.to_string());
        Ok(())
    }

    async fn uplink_associated(&self, interface: &str) -> bool {
        self.state().associated.contains(interface)
    }

    async fn write_file(&self, path: &Path, contents: &str) -> Result<(), CoreError> {
        self.enter("write_file").await?;
        self.state()
            .files
            .insert(path.to_path_buf(), contents.to_string());
        Ok(())
    }

    async fn restart_service(&self, service: &str) -> Result<(), CoreError> {
        self.enter("restart_service").await?;
        let mut state = self.state();
        state.restarts.push(service.to_string());
        state.services.insert(service.to_string());
        Ok(())
    }

    async fn service_active(&self, service: &str) -> bool {
        self.state().services.contains(service)
    }

    async fn set_ip_forwarding(&self, enabled: bool) -> Result<(), CoreError> {
        self.enter("set_ip_forwarding").await?;
        self.state().forwarding = enabled;
        Ok(())
    }

    async fn restore_firewall(&self, rules: &str) -> Result<(), CoreError> {
        self.enter("restore_firewall").await?;
        let mut state = self.state();
        state.firewall = Some(rules.to_string());
        state.firewall_history.push(rules.to_string());
        Ok(())
    }
}
