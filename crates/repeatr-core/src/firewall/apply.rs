use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::FirewallRuleSet;
use crate::error::CoreError;
use crate::host::Host;

/// Loads rule sets into the kernel, one at a time, with rollback.
///
/// The active rule set is readable lock-free; applies are serialized.
pub struct FirewallApplier {
    host: Arc<dyn Host>,
    active: ArcSwapOption<FirewallRuleSet>,
    apply_lock: Mutex<()>,
}

impl FirewallApplier {
    pub fn new(host: Arc<dyn Host>) -> Self {
        Self {
            host,
            active: ArcSwapOption::empty(),
            apply_lock: Mutex::new(()),
        }
    }

    /// The rule set last applied successfully.
    pub fn active(&self) -> Option<Arc<FirewallRuleSet>> {
        self.active.load_full()
    }

    pub fn active_fingerprint(&self) -> Option<String> {
        self.active
            .load()
            .as_ref()
            .map(|rules| rules.fingerprint().to_string())
    }

    /// Record `rule_set` as already loaded (e.g. by a previous process)
    /// without touching the kernel.
    pub fn assume_active(&self, rule_set: FirewallRuleSet) {
        self.active.store(Some(Arc::new(rule_set)));
    }

    /// Apply `rule_set` unless it is already active. Returns whether the
    /// kernel tables were replaced.
    pub async fn apply_if_changed(&self, rule_set: FirewallRuleSet) -> Result<bool, CoreError> {
        if self.active_fingerprint().as_deref() == Some(rule_set.fingerprint()) {
            debug!(fingerprint = rule_set.fingerprint(), "rule set already active");
            return Ok(false);
        }
        self.apply(rule_set).await?;
        Ok(true)
    }

    /// Replace the `nat` and `filter` tables with `rule_set`.
    ///
    /// On failure the previously active rule set is loaded again and
    /// `RuleApplyFailed` is returned.
    pub async fn apply(&self, rule_set: FirewallRuleSet) -> Result<(), CoreError> {
        let _guard = self.apply_lock.lock().await;

        if let Err(e) = self.host.set_ip_forwarding(true).await {
            return Err(CoreError::RuleApplyFailed {
                reason: e.to_string(),
            });
        }

        match self.host.restore_firewall(rule_set.text()).await {
            Ok(()) => {
                info!(
                    fingerprint = rule_set.fingerprint(),
                    mode = %rule_set.topology().bridge_mode,
                    "firewall rule set applied"
                );
                self.active.store(Some(Arc::new(rule_set)));
                Ok(())
            }
            Err(e) => {
                if let Some(previous) = self.active.load_full() {
                    match self.host.restore_firewall(previous.text()).await {
                        Ok(()) => warn!(
                            fingerprint = previous.fingerprint(),
                            "restored previous rule set"
                        ),
                        Err(restore) => warn!(
                            error = %restore,
                            "failed to restore previous rule set"
                        ),
                    }
                }
                Err(CoreError::RuleApplyFailed {
                    reason: e.to_string(),
                })
            }
        }
    }
}
