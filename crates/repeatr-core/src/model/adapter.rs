// ── Physical adapter identity ──
//
// MacAddress is the only stable key for a radio. Kernel names move around
// between boots and hotplug events, so nothing durable is keyed by them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

// ── MacAddress ──────────────────────────────────────────────────────

/// MAC address, normalized to lowercase colon-separated format (aa:bb:cc:dd:ee:ff).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddress(String);

impl MacAddress {
    /// Parse a MAC address from any common format.
    /// Accepts colon-separated, dash-separated, or bare hex.
    pub fn parse(raw: impl AsRef<str>) -> Result<Self, CoreError> {
        let raw = raw.as_ref().trim();
        let hex: String = raw
            .chars()
            .filter(|c| *c != ':' && *c != '-')
            .map(|c| c.to_ascii_lowercase())
            .collect();

        if hex.len() != 12 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(CoreError::Config {
                message: format!("invalid MAC address: {raw}"),
            });
        }

        let octets: Vec<&str> = (0..6).filter_map(|i| hex.get(i * 2..i * 2 + 2)).collect();
        Ok(Self(octets.join(":")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MacAddress {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for MacAddress {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<MacAddress> for String {
    fn from(mac: MacAddress) -> Self {
        mac.0
    }
}

// ── BusOrigin ───────────────────────────────────────────────────────

/// Where an adapter hangs off the system bus.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BusOrigin {
    /// Device path traverses a USB bus.
    Removable,
    /// Built into the board (SDIO, PCIe, platform bus).
    Onboard,
}

// ── PhysicalAdapter ─────────────────────────────────────────────────

/// A wireless adapter as discovered at classification time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhysicalAdapter {
    pub mac_address: MacAddress,
    pub bus_origin: BusOrigin,
    /// Kernel-assigned name at discovery time. Volatile.
    pub current_name: String,
}

impl PhysicalAdapter {
    pub fn new(mac_address: MacAddress, bus_origin: BusOrigin, current_name: impl Into<String>) -> Self {
        Self {
            mac_address,
            bus_origin,
            current_name: current_name.into(),
        }
    }
}

/// Decide the bus origin from a canonical sysfs device path.
///
/// `/sys/devices/platform/soc/.../usb1/1-1/1-1.3/1-1.3:1.0` is removable,
/// `/sys/devices/platform/soc/fe300000.mmcnr/mmc_host/mmc1/...` is onboard.
pub fn bus_origin_from_device_path(path: &str) -> BusOrigin {
    let on_usb = path.split('/').any(|segment| {
        segment
            .strip_prefix("usb")
            .is_some_and(|bus| !bus.is_empty() && bus.chars().all(|c| c.is_ascii_digit()))
    });
    if on_usb {
        BusOrigin::Removable
    } else {
        BusOrigin::Onboard
    }
}
