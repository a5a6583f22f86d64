// ── Router facade ──
//
// Ties the pieces together: classification and binding, the boot run, the
// bridge controller and the firewall. This is the only type the CLI talks
// to.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OnceCell};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::binding::{BindOutcome, RoleBinder, resolve};
use crate::bridge::{BridgeController, ModeChange};
use crate::classify::{ClassifiedAdapters, classify};
use crate::command::{Command, CommandResult};
use crate::config::RouterConfig;
use crate::error::CoreError;
use crate::firewall::{FirewallApplier, FirewallRuleSet, generate};
use crate::host::Host;
use crate::model::{BridgeMode, InterfaceMap, PhysicalAdapter, RoleBinding, Topology};
use crate::orchestrator::{Background, BootReport, Orchestrator};
use crate::store::StateStore;
use crate::units::standard_plan;

// ── Status ──────────────────────────────────────────────────────────

/// What `status.json` holds between invocations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boot: Option<BootReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firewall_fingerprint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Everything an operator wants to see at a glance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterStatus {
    pub role_binding: Option<RoleBinding>,
    pub bridge_mode: BridgeMode,
    pub uplink_forwarding: bool,
    pub firewall_fingerprint: Option<String>,
    pub boot: Option<BootReport>,
}

// ── Router ──────────────────────────────────────────────────────────

/// Cheaply cloneable handle to one router.
#[derive(Clone)]
pub struct Router {
    inner: Arc<RouterInner>,
}

struct RouterInner {
    config: Arc<RouterConfig>,
    host: Arc<dyn Host>,
    store: StateStore,
    binder: RoleBinder,
    firewall: Arc<FirewallApplier>,
    bridge: BridgeController,
    cancel: CancellationToken,
    /// Kernel names resolved from the binding, once per process.
    interfaces: Mutex<Option<InterfaceMap>>,
    /// Whether the active rule set has been recovered from `status.json`.
    seeded: OnceCell<()>,
    /// Units of the last boot that are still retrying.
    background: Mutex<Option<Background>>,
}

impl Router {
    pub fn new(config: RouterConfig, host: Arc<dyn Host>) -> Self {
        let config = Arc::new(config);
        let store = StateStore::new(&config.state_dir);
        let binder = RoleBinder::new(
            store.clone(),
            config.assignment,
            &config.uplink_name,
            &config.access_point_name,
        );
        let firewall = Arc::new(FirewallApplier::new(Arc::clone(&host)));
        let bridge = BridgeController::new(
            Arc::clone(&host),
            Arc::clone(&config),
            store.clone(),
            Arc::clone(&firewall),
        );

        Self {
            inner: Arc::new(RouterInner {
                config,
                host,
                store,
                binder,
                firewall,
                bridge,
                cancel: CancellationToken::new(),
                interfaces: Mutex::new(None),
                seeded: OnceCell::new(),
                background: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &StateStore {
        &self.inner.store
    }

    /// Stop a running boot: no new units start and in-flight waits end.
    /// Daemons that already started keep running.
    pub fn abort(&self) {
        info!("abort requested");
        self.inner.cancel.cancel();
    }

    // ── Classification and binding ───────────────────────────────

    pub async fn adapters(&self) -> Result<Vec<PhysicalAdapter>, CoreError> {
        self.inner.host.wireless_adapters().await
    }

    pub async fn classify(&self) -> Result<ClassifiedAdapters, CoreError> {
        classify(&self.adapters().await?)
    }

    /// Classify the current adapters, persist the binding and resolve the
    /// kernel names for this process.
    pub async fn classify_and_bind(&self) -> Result<BindOutcome, CoreError> {
        let adapters = self.adapters().await?;
        let outcome = self.inner.binder.bind(&classify(&adapters)?).await?;
        let interfaces = resolve(&outcome.binding, &adapters)?;
        debug!(uplink = %interfaces.uplink, access_point = %interfaces.access_point, "resolved interfaces");
        *self.inner.interfaces.lock().await = Some(interfaces);
        Ok(outcome)
    }

    /// Kernel names for the bound adapters. Binds first when nothing is
    /// persisted yet.
    pub async fn interfaces(&self) -> Result<InterfaceMap, CoreError> {
        if let Some(cached) = self.inner.interfaces.lock().await.clone() {
            return Ok(cached);
        }

        let Some(binding) = self.inner.store.load_binding().await? else {
            self.classify_and_bind().await?;
            return self
                .inner
                .interfaces
                .lock()
                .await
                .clone()
                .ok_or_else(|| CoreError::Internal("binding did not resolve interfaces".into()));
        };

        let interfaces = resolve(&binding, &self.adapters().await?)?;
        *self.inner.interfaces.lock().await = Some(interfaces.clone());
        Ok(interfaces)
    }

    pub async fn topology(&self) -> Result<Topology, CoreError> {
        let interfaces = self.interfaces().await?;
        let mode = self.inner.bridge.current_mode().await?;
        let forwarding = self.inner.bridge.uplink_forwarding().await?;
        Ok(self.inner.config.topology(&interfaces, mode, forwarding))
    }

    // ── Boot ─────────────────────────────────────────────────────

    /// Bind, run the standard units and, if the router is functional,
    /// load the firewall. The report is persisted either way.
    ///
    /// The mode lock is held from the mode read through the firewall load,
    /// so a concurrent mode request gets `LockContention` instead of being
    /// overwritten by a stale topology.
    pub async fn boot(&self) -> Result<BootReport, CoreError> {
        if self.inner.cancel.is_cancelled() {
            return Err(CoreError::Aborted);
        }

        let mut lock = self.inner.store.mode_lock().await?;
        let _held = lock.try_acquire()?;

        let bound = self.classify_and_bind().await?;
        if bound.changed {
            info!("role binding updated");
        }

        if self.inner.store.load_bridge_mode().await?.is_none() {
            self.inner
                .store
                .save_bridge_mode(self.inner.config.default_bridge_mode)
                .await?;
        }
        let topology = self.topology().await?;
        info!(mode = %topology.bridge_mode, uplink = %topology.uplink, access_point = %topology.access_point, "booting");

        let plan = standard_plan(&self.inner.host, &self.inner.config, &topology);
        let run = Orchestrator::new(plan)?
            .start(self.inner.cancel.clone())
            .await;
        let report = run.report;

        let firewall = if report.outcome.is_functional() {
            self.inner.firewall.apply(generate(&topology)).await
        } else {
            Ok(())
        };

        self.persist_status(Some(report.clone())).await?;
        if !run.background.is_empty() {
            info!("uplink retries continue after boot");
            *self.inner.background.lock().await = Some(run.background);
        }
        firewall?;
        Ok(report)
    }

    /// Wait for units that were still retrying when [`boot`](Self::boot)
    /// returned, then persist the final report. `None` when nothing was
    /// left running.
    pub async fn finish_boot(&self) -> Result<Option<BootReport>, CoreError> {
        let Some(background) = self.inner.background.lock().await.take() else {
            return Ok(None);
        };
        let report = background.finish().await;
        self.persist_status(Some(report.clone())).await?;
        Ok(Some(report))
    }

    // ── Runtime requests ─────────────────────────────────────────

    pub async fn request_mode_change(&self, mode: BridgeMode) -> Result<ModeChange, CoreError> {
        let interfaces = self.interfaces().await?;
        self.seed_firewall().await;
        let change = self.inner.bridge.set_mode(&interfaces, mode).await?;
        self.persist_status(None).await?;
        Ok(change)
    }

    pub async fn request_reapply(&self) -> Result<ModeChange, CoreError> {
        let interfaces = self.interfaces().await?;
        let change = self.inner.bridge.reapply(&interfaces).await?;
        self.persist_status(None).await?;
        Ok(change)
    }

    pub async fn set_uplink_forwarding(&self, enabled: bool) -> Result<ModeChange, CoreError> {
        let interfaces = self.interfaces().await?;
        self.seed_firewall().await;
        let change = self
            .inner
            .bridge
            .set_uplink_forwarding(&interfaces, enabled)
            .await?;
        self.persist_status(None).await?;
        Ok(change)
    }

    /// Route a [`Command`] to the component that handles it.
    pub async fn execute(&self, command: Command) -> Result<CommandResult, CoreError> {
        debug!(?command, "executing command");
        match command {
            Command::Rebind => Ok(CommandResult::Bound(self.classify_and_bind().await?)),
            Command::SetBridgeMode { mode } => {
                Ok(CommandResult::Mode(self.request_mode_change(mode).await?))
            }
            Command::Reapply => Ok(CommandResult::Mode(self.request_reapply().await?)),
            Command::SetUplinkForwarding { enabled } => {
                Ok(CommandResult::Mode(self.set_uplink_forwarding(enabled).await?))
            }
        }
    }

    // ── Observation ──────────────────────────────────────────────

    /// Persisted state only; never touches the hardware.
    pub async fn status(&self) -> Result<RouterStatus, CoreError> {
        let store = &self.inner.store;
        let snapshot = store
            .load_status::<StatusSnapshot>()
            .await?
            .unwrap_or_default();
        let firewall_fingerprint = self
            .inner
            .firewall
            .active_fingerprint()
            .or(snapshot.firewall_fingerprint);

        Ok(RouterStatus {
            role_binding: store.load_binding().await?,
            bridge_mode: self.inner.bridge.current_mode().await?,
            uplink_forwarding: self.inner.bridge.uplink_forwarding().await?,
            firewall_fingerprint,
            boot: snapshot.boot,
        })
    }

    /// The rule set the current topology calls for, without applying it.
    pub async fn firewall_preview(&self) -> Result<FirewallRuleSet, CoreError> {
        Ok(generate(&self.topology().await?))
    }

    // ── Internals ────────────────────────────────────────────────

    /// Recover the active rule set recorded by an earlier process, so an
    /// unchanged rule set is not reloaded needlessly.
    async fn seed_firewall(&self) {
        self.inner
            .seeded
            .get_or_init(|| async {
                if self.inner.firewall.active().is_some() {
                    return;
                }
                let recorded = match self.inner.store.load_status::<StatusSnapshot>().await {
                    Ok(Some(snapshot)) => snapshot.firewall_fingerprint,
                    Ok(None) => None,
                    Err(e) => {
                        warn!(error = %e, "ignoring unreadable status snapshot");
                        None
                    }
                };
                let Some(recorded) = recorded else { return };
                if let Ok(topology) = self.topology().await {
                    let rules = generate(&topology);
                    if rules.fingerprint() == recorded {
                        debug!(fingerprint = %recorded, "recovered active rule set");
                        self.inner.firewall.assume_active(rules);
                    }
                }
            })
            .await;
    }

    async fn persist_status(&self, boot: Option<BootReport>) -> Result<(), CoreError> {
        let store = &self.inner.store;
        let mut snapshot = match store.load_status::<StatusSnapshot>().await {
            Ok(snapshot) => snapshot.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "replacing unreadable status snapshot");
                StatusSnapshot::default()
            }
        };
        if boot.is_some() {
            snapshot.boot = boot;
        }
        if let Some(fingerprint) = self.inner.firewall.active_fingerprint() {
            snapshot.firewall_fingerprint = Some(fingerprint);
        }
        snapshot.updated_at = Some(Utc::now());
        store.save_status(&snapshot).await
    }
}
