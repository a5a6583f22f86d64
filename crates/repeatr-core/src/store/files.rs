use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::lock::ModeLock;
use crate::error::CoreError;
use crate::model::{BridgeMode, RoleBinding};

const BINDING_FILE: &str = "role-binding.json";
const BRIDGE_MODE_FILE: &str = "bridge-mode";
const UPLINK_FORWARDING_FILE: &str = "uplink-forwarding";
const STATUS_FILE: &str = "status.json";
const MODE_LOCK_FILE: &str = "mode.lock";

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Write `contents` to `path` through a sibling temp file and a rename.
pub async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), CoreError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| CoreError::persistence(parent, e))?;
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    // Unique per writer so concurrent writers never share a temp file.
    let seq = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp = path.with_file_name(format!(".{file_name}.{}.{seq}.tmp", std::process::id()));

    tokio::fs::write(&tmp, contents)
        .await
        .map_err(|e| CoreError::persistence(&tmp, e))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| CoreError::persistence(path, e))
}

async fn read_optional(path: &Path) -> Result<Option<String>, CoreError> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(CoreError::persistence(path, e)),
    }
}

/// File-backed store for the role binding, bridge mode, uplink forwarding
/// flag and the last boot status.
#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn binding_path(&self) -> PathBuf {
        self.dir.join(BINDING_FILE)
    }

    pub fn bridge_mode_path(&self) -> PathBuf {
        self.dir.join(BRIDGE_MODE_FILE)
    }

    /// Open the lock that serializes mode changes, reapplies and boots
    /// across processes.
    pub async fn mode_lock(&self) -> Result<ModeLock, CoreError> {
        ModeLock::open(&self.dir.join(MODE_LOCK_FILE)).await
    }

    // ── Role binding ─────────────────────────────────────────────────

    pub async fn load_binding(&self) -> Result<Option<RoleBinding>, CoreError> {
        let path = self.binding_path();
        let Some(binding) = self.load_json::<RoleBinding>(&path).await? else {
            return Ok(None);
        };
        if !binding.is_well_formed() {
            return Err(CoreError::CorruptState {
                path,
                reason: "binding must hold exactly one uplink and one access point".into(),
            });
        }
        Ok(Some(binding))
    }

    pub async fn save_binding(&self, binding: &RoleBinding) -> Result<(), CoreError> {
        self.save_json(&self.binding_path(), binding).await
    }

    // ── Bridge mode ──────────────────────────────────────────────────

    pub async fn load_bridge_mode(&self) -> Result<Option<BridgeMode>, CoreError> {
        let path = self.bridge_mode_path();
        let Some(raw) = read_optional(&path).await? else {
            return Ok(None);
        };
        raw.trim()
            .parse()
            .map(Some)
            .map_err(|_| CoreError::CorruptState {
                path,
                reason: format!("unknown bridge mode '{}'", raw.trim()),
            })
    }

    pub async fn save_bridge_mode(&self, mode: BridgeMode) -> Result<(), CoreError> {
        debug!(%mode, "persisting bridge mode");
        write_atomic(&self.bridge_mode_path(), format!("{mode}\n").as_bytes()).await
    }

    // ── Uplink forwarding ────────────────────────────────────────────

    pub async fn load_uplink_forwarding(&self) -> Result<Option<bool>, CoreError> {
        let path = self.dir.join(UPLINK_FORWARDING_FILE);
        let Some(raw) = read_optional(&path).await? else {
            return Ok(None);
        };
        match raw.trim() {
            "1" => Ok(Some(true)),
            "0" => Ok(Some(false)),
            other => Err(CoreError::CorruptState {
                path,
                reason: format!("expected 1 or 0, got '{other}'"),
            }),
        }
    }

    pub async fn save_uplink_forwarding(&self, enabled: bool) -> Result<(), CoreError> {
        let value = if enabled { "1\n" } else { "0\n" };
        write_atomic(&self.dir.join(UPLINK_FORWARDING_FILE), value.as_bytes()).await
    }

    // ── Boot status ──────────────────────────────────────────────────

    pub async fn load_status<T: DeserializeOwned>(&self) -> Result<Option<T>, CoreError> {
        self.load_json(&self.dir.join(STATUS_FILE)).await
    }

    pub async fn save_status<T: Serialize + Sync>(&self, status: &T) -> Result<(), CoreError> {
        self.save_json(&self.dir.join(STATUS_FILE), status).await
    }

    // ── Helpers ──────────────────────────────────────────────────────

    async fn load_json<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>, CoreError> {
        let Some(raw) = read_optional(path).await? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| CoreError::CorruptState {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
    }

    async fn save_json<T: Serialize + Sync>(&self, path: &Path, value: &T) -> Result<(), CoreError> {
        let mut body = serde_json::to_string_pretty(value)
            .map_err(|e| CoreError::Internal(format!("serializing {}: {e}", path.display())))?;
        body.push('\n');
        write_atomic(path, body.as_bytes()).await
    }
}
