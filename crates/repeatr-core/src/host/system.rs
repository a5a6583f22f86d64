// ── Linux host implementation ──
//
// Shells out to the standard networking tools and reads sysfs directly for
// discovery. Every command's stderr is folded into the error so status
// output can show what the kernel actually complained about.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use ipnet::Ipv4Net;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, trace};

use super::Host;
use crate::error::CoreError;
use crate::model::{MacAddress, PhysicalAdapter, bus_origin_from_device_path};

const IP_FORWARD: &str = "/proc/sys/net/ipv4/ip_forward";

/// [`Host`] backed by the running Linux system.
#[derive(Debug, Clone)]
pub struct SystemHost {
    sysfs_root: PathBuf,
}

impl Default for SystemHost {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemHost {
    pub fn new() -> Self {
        Self {
            sysfs_root: PathBuf::from("/sys"),
        }
    }

    /// Read adapters from an alternate sysfs tree.
    pub fn with_sysfs_root(root: impl Into<PathBuf>) -> Self {
        Self {
            sysfs_root: root.into(),
        }
    }

    fn net_class(&self) -> PathBuf {
        self.sysfs_root.join("class").join("net")
    }

    async fn run(&self, program: &str, args: &[&str]) -> Result<String, CoreError> {
        let rendered = render_command(program, args);
        trace!(command = %rendered, "running host command");

        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| CoreError::host(&rendered, e.to_string()))?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(CoreError::host(
                rendered,
                failure_reason(output.status.code(), &output.stderr),
            ))
        }
    }

    async fn succeeds(&self, program: &str, args: &[&str]) -> bool {
        self.run(program, args).await.is_ok()
    }

    async fn read_adapter(&self, entry: &Path, name: String) -> Result<Option<PhysicalAdapter>, CoreError> {
        let wireless = tokio::fs::try_exists(entry.join("wireless"))
            .await
            .unwrap_or(false)
            || tokio::fs::try_exists(entry.join("phy80211"))
                .await
                .unwrap_or(false);
        if !wireless {
            return Ok(None);
        }

        // Virtual interfaces (monitor vifs, p2p devices) have no device link.
        let Ok(device) = tokio::fs::canonicalize(entry.join("device")).await else {
            debug!(interface = %name, "skipping wireless interface without a device link");
            return Ok(None);
        };

        let address_path = entry.join("address");
        let raw = tokio::fs::read_to_string(&address_path)
            .await
            .map_err(|e| CoreError::persistence(&address_path, e))?;
        let mac = MacAddress::parse(raw.trim())?;
        let origin = bus_origin_from_device_path(&device.to_string_lossy());

        debug!(interface = %name, %mac, %origin, "discovered wireless adapter");
        Ok(Some(PhysicalAdapter::new(mac, origin, name)))
    }
}

#[async_trait]
impl Host for SystemHost {
    async fn wireless_adapters(&self) -> Result<Vec<PhysicalAdapter>, CoreError> {
        let class = self.net_class();
        let mut dir = tokio::fs::read_dir(&class)
            .await
            .map_err(|e| CoreError::persistence(&class, e))?;

        let mut adapters = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| CoreError::persistence(&class, e))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(adapter) = self.read_adapter(&entry.path(), name).await? {
                adapters.push(adapter);
            }
        }
        adapters.sort_by(|a, b| a.current_name.cmp(&b.current_name));
        Ok(adapters)
    }

    async fn link_exists(&self, interface: &str) -> bool {
        tokio::fs::try_exists(self.net_class().join(interface))
            .await
            .unwrap_or(false)
    }

    async fn has_address(&self, interface: &str, address: Ipv4Net) -> bool {
        match self
            .run("ip", &["-4", "-o", "addr", "show", "dev", interface])
            .await
        {
            Ok(out) => parse_inet_addresses(&out).contains(&address),
            Err(_) => false,
        }
    }

    async fn set_regulatory_domain(&self, country: &str) -> Result<(), CoreError> {
        self.run("iw", &["reg", "set", country]).await.map(drop)
    }

    async fn regulatory_domain(&self) -> Result<Option<String>, CoreError> {
        let out = self.run("iw", &["reg", "get"]).await?;
        Ok(parse_reg_country(&out))
    }

    async fn unblock_radios(&self) -> Result<(), CoreError> {
        self.run("rfkill", &["unblock", "wlan"]).await.map(drop)
    }

    async fn set_link_up(&self, interface: &str) -> Result<(), CoreError> {
        self.run("ip", &["link", "set", "dev", interface, "up"])
            .await
            .map(drop)
    }

    async fn flush_addresses(&self, interface: &str) -> Result<(), CoreError> {
        self.run("ip", &["addr", "flush", "dev", interface])
            .await
            .map(drop)
    }

    async fn add_address(&self, interface: &str, address: Ipv4Net) -> Result<(), CoreError> {
        let cidr = address.to_string();
        self.run("ip", &["addr", "replace", &cidr, "dev", interface])
            .await
            .map(drop)
    }

    async fn create_bridge(&self, bridge: &str) -> Result<(), CoreError> {
        if self.link_exists(bridge).await {
            return Ok(());
        }
        self.run("ip", &["link", "add", "name", bridge, "type", "bridge"])
            .await
            .map(drop)
    }

    async fn delete_bridge(&self, bridge: &str) -> Result<(), CoreError> {
        if !self.link_exists(bridge).await {
            return Ok(());
        }
        self.run("ip", &["link", "del", "dev", bridge]).await.map(drop)
    }

    async fn set_master(&self, interface: &str, bridge: Option<&str>) -> Result<(), CoreError> {
        match bridge {
            Some(bridge) => self
                .run("ip", &["link", "set", "dev", interface, "master", bridge])
                .await
                .map(drop),
            None => self
                .run("ip", &["link", "set", "dev", interface, "nomaster"])
                .await
                .map(drop),
        }
    }

    async fn associate_uplink(&self, interface: &str) -> Result<(), CoreError> {
        self.run("nmcli", &["device", "connect", interface])
            .await
            .map(drop)
    }

    async fn uplink_associated(&self, interface: &str) -> bool {
        match self
            .run("nmcli", &["-t", "-f", "DEVICE,STATE", "device", "status"])
            .await
        {
            Ok(out) => device_connected(&out, interface),
            Err(_) => false,
        }
    }

    async fn write_file(&self, path: &Path, contents: &str) -> Result<(), CoreError> {
        crate::store::write_atomic(path, contents.as_bytes()).await
    }

    async fn restart_service(&self, service: &str) -> Result<(), CoreError> {
        self.run("systemctl", &["restart", service]).await.map(drop)
    }

    async fn service_active(&self, service: &str) -> bool {
        self.succeeds("systemctl", &["is-active", "--quiet", service])
            .await
    }

    async fn set_ip_forwarding(&self, enabled: bool) -> Result<(), CoreError> {
        let value = if enabled { "1\n" } else { "0\n" };
        tokio::fs::write(IP_FORWARD, value)
            .await
            .map_err(|e| CoreError::persistence(IP_FORWARD, e))
    }

    async fn restore_firewall(&self, rules: &str) -> Result<(), CoreError> {
        let mut child = Command::new("iptables-restore")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| CoreError::host("iptables-restore", e.to_string()))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(rules.as_bytes())
                .await
                .map_err(|e| CoreError::host("iptables-restore", e.to_string()))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| CoreError::host("iptables-restore", e.to_string()))?;
        if output.status.success() {
            Ok(())
        } else {
            Err(CoreError::host(
                "iptables-restore",
                failure_reason(output.status.code(), &output.stderr),
            ))
        }
    }
}

// ── Output parsing ───────────────────────────────────────────────────

fn render_command(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}

fn failure_reason(code: Option<i32>, stderr: &[u8]) -> String {
    let stderr = String::from_utf8_lossy(stderr);
    let stderr = stderr.trim();
    match (code, stderr.is_empty()) {
        (Some(code), true) => format!("exit status {code}"),
        (Some(code), false) => format!("exit status {code}: {stderr}"),
        (None, _) => "terminated by signal".into(),
    }
}

/// Addresses from `ip -4 -o addr show` output.
fn parse_inet_addresses(output: &str) -> Vec<Ipv4Net> {
    output
        .lines()
        .filter_map(|line| {
            let mut words = line.split_whitespace();
            words.find(|w| *w == "inet")?;
            words.next()?.parse().ok()
        })
        .collect()
}

/// Country code from `iw reg get` (first `country XX:` line is the global domain).
fn parse_reg_country(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let rest = line.trim().strip_prefix("country ")?;
        let code = rest.split(':').next()?.trim();
        (code.len() == 2 && code != "00").then(|| code.to_ascii_uppercase())
    })
}

/// `nmcli -t -f DEVICE,STATE device status` reports `wlan0:connected`.
fn device_connected(output: &str, interface: &str) -> bool {
    output.lines().any(|line| {
        line.split_once(':')
            .is_some_and(|(dev, state)| dev == interface && state.trim() == "connected")
    })
}
