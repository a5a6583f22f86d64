// ── Logical roles and the persisted binding ──

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::adapter::MacAddress;

/// The two jobs a wireless adapter can be given.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum LogicalRole {
    Uplink,
    AccessPoint,
}

/// Which bus origin gets the uplink role.
///
/// The default treats the removable radio as the operator-supplied uplink
/// and keeps the onboard radio as the permanent access point.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum AssignmentPolicy {
    #[default]
    RemovableUplink,
    OnboardUplink,
}

/// One persisted entry: a hardware address and what it is called.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingEntry {
    pub role: LogicalRole,
    pub logical_name: String,
}

/// Hardware address -> logical name mapping. Exactly one entry per role.
///
/// Backed by a `BTreeMap` so the serialized form is byte-stable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleBinding {
    entries: BTreeMap<MacAddress, BindingEntry>,
}

impl RoleBinding {
    /// Build a binding from the uplink and access-point adapters.
    ///
    /// Returns `None` when both roles point at the same hardware address.
    pub fn new(
        uplink: MacAddress,
        uplink_name: impl Into<String>,
        access_point: MacAddress,
        access_point_name: impl Into<String>,
    ) -> Option<Self> {
        if uplink == access_point {
            return None;
        }
        let mut entries = BTreeMap::new();
        entries.insert(
            uplink,
            BindingEntry {
                role: LogicalRole::Uplink,
                logical_name: uplink_name.into(),
            },
        );
        entries.insert(
            access_point,
            BindingEntry {
                role: LogicalRole::AccessPoint,
                logical_name: access_point_name.into(),
            },
        );
        Some(Self { entries })
    }

    /// Hardware address bound to a role.
    pub fn mac_for(&self, role: LogicalRole) -> Option<&MacAddress> {
        self.entries
            .iter()
            .find(|(_, entry)| entry.role == role)
            .map(|(mac, _)| mac)
    }

    /// Logical name bound to a role.
    pub fn logical_name(&self, role: LogicalRole) -> Option<&str> {
        self.entries
            .values()
            .find(|entry| entry.role == role)
            .map(|entry| entry.logical_name.as_str())
    }

    pub fn role_of(&self, mac: &MacAddress) -> Option<LogicalRole> {
        self.entries.get(mac).map(|entry| entry.role)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&MacAddress, &BindingEntry)> {
        self.entries.iter()
    }

    /// A binding loaded from disk must hold exactly one adapter per role.
    pub fn is_well_formed(&self) -> bool {
        self.entries.len() == 2
            && self.mac_for(LogicalRole::Uplink).is_some()
            && self.mac_for(LogicalRole::AccessPoint).is_some()
    }
}

/// Current kernel names for the bound adapters, resolved by hardware address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceMap {
    pub uplink: String,
    pub access_point: String,
}
