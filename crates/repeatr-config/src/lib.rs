//! Configuration for repeatr.
//!
//! One TOML file (`/etc/repeatr/config.toml` unless `REPEATR_CONFIG` points
//! elsewhere), layered under `REPEATR_*` environment overrides, validated and
//! translated to `repeatr_core::RouterConfig`. The CLI adds `GlobalOpts`-aware
//! overrides on top.

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use ipnet::Ipv4Net;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use repeatr_core::{
    AccessPointConfig, AssignmentPolicy, Band, BridgeMode, DaemonConfig, DhcpConfig,
    EthernetConfig, RetryPolicy, RouterConfig, TimingConfig,
};

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/repeatr/config.toml";

/// Environment variable overriding [`DEFAULT_CONFIG_PATH`].
pub const CONFIG_PATH_ENV: &str = "REPEATR_CONFIG";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no access point passphrase configured")]
    NoPassphrase,

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Where the role binding, bridge mode and status snapshot live.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    /// ISO 3166-1 alpha-2 country code.
    #[serde(default = "default_regulatory_domain")]
    pub regulatory_domain: String,

    /// Which radio becomes the uplink.
    #[serde(default)]
    pub assignment: AssignmentPolicy,

    /// Ethernet port mode used until one is persisted.
    #[serde(default)]
    pub default_bridge_mode: BridgeMode,

    /// CLI presentation defaults.
    #[serde(default)]
    pub defaults: Defaults,

    #[serde(default)]
    pub roles: Roles,

    #[serde(default)]
    pub access_point: AccessPoint,

    #[serde(default)]
    pub dhcp: Dhcp,

    #[serde(default)]
    pub ethernet: Ethernet,

    #[serde(default)]
    pub daemons: Daemons,

    #[serde(default)]
    pub timing: Timing,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            regulatory_domain: default_regulatory_domain(),
            assignment: AssignmentPolicy::default(),
            default_bridge_mode: BridgeMode::default(),
            defaults: Defaults::default(),
            roles: Roles::default(),
            access_point: AccessPoint::default(),
            dhcp: Dhcp::default(),
            ethernet: Ethernet::default(),
            daemons: Daemons::default(),
            timing: Timing::default(),
        }
    }
}

fn default_state_dir() -> PathBuf {
    "/var/lib/repeatr".into()
}
fn default_regulatory_domain() -> String {
    "DE".into()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}

/// Logical names recorded in the role binding.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Roles {
    #[serde(default = "default_uplink_name")]
    pub uplink_name: String,

    #[serde(default = "default_access_point_name")]
    pub access_point_name: String,
}

impl Default for Roles {
    fn default() -> Self {
        Self {
            uplink_name: default_uplink_name(),
            access_point_name: default_access_point_name(),
        }
    }
}

fn default_uplink_name() -> String {
    "wan".into()
}
fn default_access_point_name() -> String {
    "ap".into()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AccessPoint {
    #[serde(default = "default_ssid")]
    pub ssid: String,

    /// WPA2 passphrase (plaintext; prefer `passphrase_env`).
    pub passphrase: Option<String>,

    /// Environment variable holding the passphrase.
    pub passphrase_env: Option<String>,

    #[serde(default)]
    pub band: Band,

    #[serde(default = "default_channel")]
    pub channel: u8,

    #[serde(default)]
    pub hidden: bool,

    /// Router address and prefix on the access-point segment.
    #[serde(default = "default_ap_address")]
    pub address: Ipv4Net,
}

impl Default for AccessPoint {
    fn default() -> Self {
        Self {
            ssid: default_ssid(),
            passphrase: None,
            passphrase_env: None,
            band: Band::default(),
            channel: default_channel(),
            hidden: false,
            address: default_ap_address(),
        }
    }
}

fn default_ssid() -> String {
    "repeatr".into()
}
fn default_channel() -> u8 {
    6
}
fn default_ap_address() -> Ipv4Net {
    prefixed(Ipv4Addr::new(192, 168, 50, 1), 24)
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Dhcp {
    #[serde(default = "default_range_start")]
    pub range_start: Ipv4Addr,

    #[serde(default = "default_range_end")]
    pub range_end: Ipv4Addr,

    #[serde(default = "default_lease_time")]
    pub lease_time: String,

    /// DNS listener port; 0 disables dnsmasq's resolver.
    #[serde(default)]
    pub dns_port: u16,

    #[serde(default = "default_domain")]
    pub domain: String,
}

impl Default for Dhcp {
    fn default() -> Self {
        Self {
            range_start: default_range_start(),
            range_end: default_range_end(),
            lease_time: default_lease_time(),
            dns_port: 0,
            domain: default_domain(),
        }
    }
}

fn default_range_start() -> Ipv4Addr {
    Ipv4Addr::new(192, 168, 50, 10)
}
fn default_range_end() -> Ipv4Addr {
    Ipv4Addr::new(192, 168, 50, 200)
}
fn default_lease_time() -> String {
    "12h".into()
}
fn default_domain() -> String {
    "lan".into()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Ethernet {
    #[serde(default = "default_ethernet_interface")]
    pub interface: String,

    /// Router address on the Ethernet segment in client mode.
    #[serde(default = "default_ethernet_address")]
    pub address: Ipv4Net,

    /// Bridge device created in bridged mode.
    #[serde(default = "default_bridge")]
    pub bridge: String,
}

impl Default for Ethernet {
    fn default() -> Self {
        Self {
            interface: default_ethernet_interface(),
            address: default_ethernet_address(),
            bridge: default_bridge(),
        }
    }
}

fn default_ethernet_interface() -> String {
    "eth0".into()
}
fn default_ethernet_address() -> Ipv4Net {
    prefixed(Ipv4Addr::new(192, 168, 51, 1), 24)
}

fn prefixed(addr: Ipv4Addr, prefix: u8) -> Ipv4Net {
    Ipv4Net::new(addr, prefix).unwrap_or_else(|_| Ipv4Net::from(addr))
}
fn default_bridge() -> String {
    "br0".into()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Daemons {
    #[serde(default = "default_hostapd_conf")]
    pub hostapd_conf: PathBuf,

    #[serde(default = "default_dnsmasq_conf")]
    pub dnsmasq_conf: PathBuf,

    #[serde(default = "default_hostapd_service")]
    pub hostapd_service: String,

    #[serde(default = "default_dnsmasq_service")]
    pub dnsmasq_service: String,
}

impl Default for Daemons {
    fn default() -> Self {
        let core = DaemonConfig::default();
        Self {
            hostapd_conf: core.hostapd_conf,
            dnsmasq_conf: core.dnsmasq_conf,
            hostapd_service: core.hostapd_service,
            dnsmasq_service: core.dnsmasq_service,
        }
    }
}

fn default_hostapd_conf() -> PathBuf {
    DaemonConfig::default().hostapd_conf
}
fn default_dnsmasq_conf() -> PathBuf {
    DaemonConfig::default().dnsmasq_conf
}
fn default_hostapd_service() -> String {
    DaemonConfig::default().hostapd_service
}
fn default_dnsmasq_service() -> String {
    DaemonConfig::default().dnsmasq_service
}

/// Boot timing. Durations are whole milliseconds or seconds.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Timing {
    #[serde(default = "default_readiness_polls")]
    pub readiness_polls: u32,

    #[serde(default = "default_readiness_interval_ms")]
    pub readiness_interval_ms: u64,

    /// Polls for the access-point device node before addressing gives up.
    #[serde(default = "default_device_wait_attempts")]
    pub device_wait_attempts: u32,

    #[serde(default = "default_device_wait_interval_ms")]
    pub device_wait_interval_ms: u64,

    /// Uplink association attempts; 0 retries until aborted.
    #[serde(default = "default_uplink_attempts")]
    pub uplink_attempts: u32,

    #[serde(default = "default_uplink_interval_secs")]
    pub uplink_interval_secs: u64,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            readiness_polls: default_readiness_polls(),
            readiness_interval_ms: default_readiness_interval_ms(),
            device_wait_attempts: default_device_wait_attempts(),
            device_wait_interval_ms: default_device_wait_interval_ms(),
            uplink_attempts: default_uplink_attempts(),
            uplink_interval_secs: default_uplink_interval_secs(),
        }
    }
}

fn default_readiness_polls() -> u32 {
    10
}
fn default_readiness_interval_ms() -> u64 {
    500
}
fn default_device_wait_attempts() -> u32 {
    20
}
fn default_device_wait_interval_ms() -> u64 {
    500
}
fn default_uplink_attempts() -> u32 {
    5
}
fn default_uplink_interval_secs() -> u64 {
    10
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path: `REPEATR_CONFIG` or the system default.
pub fn config_path() -> PathBuf {
    std::env::var_os(CONFIG_PATH_ENV)
        .filter(|p| !p.is_empty())
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from)
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the default path + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load the full Config from `path` + environment. A missing file yields
/// the defaults.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("REPEATR_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write it to `path`.
pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve the access point passphrase: named env var first, then the
/// plaintext value in the file.
pub fn resolve_passphrase(ap: &AccessPoint) -> Result<SecretString, ConfigError> {
    if let Some(ref env_name) = ap.passphrase_env {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(SecretString::from(val));
        }
    }

    if let Some(ref passphrase) = ap.passphrase {
        return Ok(SecretString::from(passphrase.clone()));
    }

    Err(ConfigError::NoPassphrase)
}

// ── Validation ──────────────────────────────────────────────────────

impl Config {
    /// Check everything that does not need the passphrase.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let country = &self.regulatory_domain;
        if country.len() != 2 || !country.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(invalid(
                "regulatory_domain",
                format!("expected a two-letter country code, got '{country}'"),
            ));
        }

        if self.roles.uplink_name.is_empty() || self.roles.access_point_name.is_empty() {
            return Err(invalid("roles", "logical names must not be empty"));
        }
        if self.roles.uplink_name == self.roles.access_point_name {
            return Err(invalid("roles", "uplink and access point need distinct names"));
        }

        let ap = &self.access_point;
        if ap.ssid.is_empty() || ap.ssid.len() > 32 {
            return Err(invalid("access_point.ssid", "must be 1-32 bytes"));
        }
        if !ap.band.accepts_channel(ap.channel) {
            return Err(invalid(
                "access_point.channel",
                format!("channel {} is not in the {} GHz band", ap.channel, ap.band),
            ));
        }
        if let Some(ref passphrase) = ap.passphrase {
            check_passphrase(passphrase)?;
        }

        let subnet = ap.address.trunc();
        let dhcp = &self.dhcp;
        for (field, addr) in [
            ("dhcp.range_start", dhcp.range_start),
            ("dhcp.range_end", dhcp.range_end),
        ] {
            if !subnet.contains(&addr) {
                return Err(invalid(field, format!("{addr} is outside {subnet}")));
            }
            if addr == ap.address.addr() {
                return Err(invalid(field, "range includes the router address"));
            }
        }
        if dhcp.range_start > dhcp.range_end {
            return Err(invalid("dhcp", "range_start is after range_end"));
        }
        if !valid_lease_time(&dhcp.lease_time) {
            return Err(invalid(
                "dhcp.lease_time",
                format!("expected e.g. '12h', '30m' or 'infinite', got '{}'", dhcp.lease_time),
            ));
        }

        let ethernet = &self.ethernet;
        if ethernet.interface.is_empty() || ethernet.bridge.is_empty() {
            return Err(invalid("ethernet", "interface names must not be empty"));
        }
        let eth_subnet = ethernet.address.trunc();
        if eth_subnet.contains(&subnet.network()) || subnet.contains(&eth_subnet.network()) {
            return Err(invalid(
                "ethernet.address",
                format!("{eth_subnet} overlaps the access point subnet {subnet}"),
            ));
        }

        if self.timing.readiness_polls == 0 || self.timing.device_wait_attempts == 0 {
            return Err(invalid("timing", "poll counts must be at least 1"));
        }
        Ok(())
    }
}

fn check_passphrase(passphrase: &str) -> Result<(), ConfigError> {
    if (8..=63).contains(&passphrase.len()) {
        Ok(())
    } else {
        Err(invalid(
            "access_point.passphrase",
            "WPA2 passphrases are 8-63 characters",
        ))
    }
}

fn valid_lease_time(lease: &str) -> bool {
    if lease == "infinite" {
        return true;
    }
    let digits = lease.trim_end_matches(['s', 'm', 'h', 'd', 'w']);
    !digits.is_empty()
        && lease.len() - digits.len() <= 1
        && digits.chars().all(|c| c.is_ascii_digit())
}

// ── Translation ─────────────────────────────────────────────────────

/// Validate `cfg` and build the runtime configuration.
pub fn to_router_config(cfg: &Config) -> Result<RouterConfig, ConfigError> {
    cfg.validate()?;

    let passphrase = resolve_passphrase(&cfg.access_point)?;
    check_passphrase(passphrase.expose_secret())?;

    let ap = &cfg.access_point;
    let timing = &cfg.timing;
    let uplink_retry = if timing.uplink_attempts == 0 {
        RetryPolicy::unbounded(Duration::from_secs(timing.uplink_interval_secs))
    } else {
        RetryPolicy::bounded(
            timing.uplink_attempts,
            Duration::from_secs(timing.uplink_interval_secs),
        )
    };

    Ok(RouterConfig {
        state_dir: cfg.state_dir.clone(),
        regulatory_domain: cfg.regulatory_domain.to_ascii_uppercase(),
        assignment: cfg.assignment,
        uplink_name: cfg.roles.uplink_name.clone(),
        access_point_name: cfg.roles.access_point_name.clone(),
        bridge_interface: cfg.ethernet.bridge.clone(),
        default_bridge_mode: cfg.default_bridge_mode,
        access_point: AccessPointConfig {
            ssid: ap.ssid.clone(),
            passphrase,
            band: ap.band,
            channel: ap.channel,
            hidden: ap.hidden,
            address: ap.address,
        },
        dhcp: DhcpConfig {
            range_start: cfg.dhcp.range_start,
            range_end: cfg.dhcp.range_end,
            lease_time: cfg.dhcp.lease_time.clone(),
            dns_port: cfg.dhcp.dns_port,
            domain: cfg.dhcp.domain.clone(),
        },
        ethernet: EthernetConfig {
            interface: cfg.ethernet.interface.clone(),
            address: cfg.ethernet.address,
        },
        daemons: DaemonConfig {
            hostapd_conf: cfg.daemons.hostapd_conf.clone(),
            dnsmasq_conf: cfg.daemons.dnsmasq_conf.clone(),
            hostapd_service: cfg.daemons.hostapd_service.clone(),
            dnsmasq_service: cfg.daemons.dnsmasq_service.clone(),
        },
        timing: TimingConfig {
            readiness_polls: timing.readiness_polls,
            readiness_interval: Duration::from_millis(timing.readiness_interval_ms),
            device_wait: RetryPolicy::bounded(
                timing.device_wait_attempts,
                Duration::from_millis(timing.device_wait_interval_ms),
            ),
            uplink_retry,
        },
    })
}
