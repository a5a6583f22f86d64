// ── Ethernet port mode ──

use serde::{Deserialize, Serialize};

/// How the Ethernet port participates in the router.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum BridgeMode {
    /// Routed, NAT'd segment of its own behind the uplink.
    #[default]
    Client,
    /// Member of the access point's layer-2 segment via the bridge device.
    Bridged,
}

impl BridgeMode {
    pub fn other(self) -> Self {
        match self {
            Self::Client => Self::Bridged,
            Self::Bridged => Self::Client,
        }
    }
}
