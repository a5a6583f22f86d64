// ── Persistent role binding ──
//
// The binding is re-derived from classifier output on every boot and only
// written when it differs from what is on disk. Kernel names are looked up
// fresh through `resolve`; they are never stored.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::classify::ClassifiedAdapters;
use crate::error::CoreError;
use crate::model::{
    AssignmentPolicy, InterfaceMap, LogicalRole, PhysicalAdapter, RoleBinding,
};
use crate::store::StateStore;

/// Result of a bind call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindOutcome {
    pub binding: RoleBinding,
    /// `false` when the persisted binding already matched.
    pub changed: bool,
}

/// Derives and persists the hardware-address -> role mapping.
#[derive(Debug, Clone)]
pub struct RoleBinder {
    store: StateStore,
    policy: AssignmentPolicy,
    uplink_name: String,
    access_point_name: String,
}

impl RoleBinder {
    pub fn new(
        store: StateStore,
        policy: AssignmentPolicy,
        uplink_name: impl Into<String>,
        access_point_name: impl Into<String>,
    ) -> Self {
        Self {
            store,
            policy,
            uplink_name: uplink_name.into(),
            access_point_name: access_point_name.into(),
        }
    }

    /// The binding the classifier output implies, without touching disk.
    pub fn derive(&self, classified: &ClassifiedAdapters) -> Result<RoleBinding, CoreError> {
        let (uplink, access_point) = match self.policy {
            AssignmentPolicy::RemovableUplink => (&classified.removable, &classified.onboard),
            AssignmentPolicy::OnboardUplink => (&classified.onboard, &classified.removable),
        };
        RoleBinding::new(
            uplink.mac_address.clone(),
            &self.uplink_name,
            access_point.mac_address.clone(),
            &self.access_point_name,
        )
        .ok_or_else(|| CoreError::AmbiguousTopology {
            removable: 1,
            onboard: 1,
        })
    }

    /// Persist the binding for `classified`.
    ///
    /// Writing the same hardware twice leaves the file untouched. New
    /// hardware in either role replaces the stored binding.
    pub async fn bind(&self, classified: &ClassifiedAdapters) -> Result<BindOutcome, CoreError> {
        let binding = self.derive(classified)?;

        let existing = match self.store.load_binding().await {
            Ok(existing) => existing,
            Err(e @ CoreError::CorruptState { .. }) => {
                warn!(error = %e, "discarding unreadable role binding");
                None
            }
            Err(e) => return Err(e),
        };

        if existing.as_ref() == Some(&binding) {
            return Ok(BindOutcome {
                binding,
                changed: false,
            });
        }

        if existing.is_some() {
            info!("adapter hardware changed, replacing role binding");
        }
        self.store.save_binding(&binding).await?;
        info!(
            uplink = ?binding.mac_for(LogicalRole::Uplink).map(ToString::to_string),
            access_point = ?binding.mac_for(LogicalRole::AccessPoint).map(ToString::to_string),
            "role binding persisted"
        );
        Ok(BindOutcome {
            binding,
            changed: true,
        })
    }
}

/// Map the bound roles to the kernel names the adapters carry right now.
pub fn resolve(
    binding: &RoleBinding,
    adapters: &[PhysicalAdapter],
) -> Result<InterfaceMap, CoreError> {
    let find = |role: LogicalRole| -> Result<String, CoreError> {
        let mac = binding.mac_for(role).ok_or_else(|| CoreError::CorruptState {
            path: "role-binding.json".into(),
            reason: format!("no adapter bound to {role}"),
        })?;
        adapters
            .iter()
            .find(|adapter| &adapter.mac_address == mac)
            .map(|adapter| adapter.current_name.clone())
            .ok_or_else(|| CoreError::DeviceNotReady {
                device: format!(
                    "{} ({mac})",
                    binding.logical_name(role).unwrap_or("unnamed")
                ),
                attempts: 1,
            })
    };

    Ok(InterfaceMap {
        uplink: find(LogicalRole::Uplink)?,
        access_point: find(LogicalRole::AccessPoint)?,
    })
}
