use crate::catalog::CatalogKind;
use crate::error::SnapshotError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, warn};

pub const DEFAULT_VOLUME: u8 = 100;
pub const MAX_VOLUME: u8 = 100;

/// On-disk mirror of the session: what was playing, how loud, and whether it
/// was running when last written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub current_channel_key: Option<String>,
    pub volume: u8,
    pub channel_type: CatalogKind,
    pub is_running: bool,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            current_channel_key: None,
            volume: DEFAULT_VOLUME,
            channel_type: CatalogKind::Radio,
            is_running: false,
        }
    }
}

impl Snapshot {
    /// Position of the stored key in `selection`, or 0 when the key is absent
    /// from the catalog the snapshot is being restored into.
    pub fn index_in(&self, selection: &[String]) -> usize {
        self.current_channel_key
            .as_deref()
            .and_then(|key| selection.iter().position(|k| k == key))
            .unwrap_or(0)
    }
}

/// Tolerant shape of the file as written by any past version.  Every field is
/// optional and loosely typed; `Snapshot::from` applies the defaults.
#[derive(Debug, Default, Deserialize)]
struct StoredSnapshot {
    #[serde(default)]
    current_channel_key: Option<serde_json::Value>,
    #[serde(default)]
    volume: Option<serde_json::Value>,
    #[serde(default)]
    channel_type: Option<serde_json::Value>,
    #[serde(default)]
    is_running: Option<serde_json::Value>,
}

impl From<StoredSnapshot> for Snapshot {
    fn from(stored: StoredSnapshot) -> Self {
        let volume = stored
            .volume
            .as_ref()
            .and_then(serde_json::Value::as_i64)
            .map(|v| v.clamp(0, i64::from(MAX_VOLUME)) as u8)
            .unwrap_or(DEFAULT_VOLUME);
        let current_channel_key = stored
            .current_channel_key
            .as_ref()
            .and_then(serde_json::Value::as_str)
            .map(str::to_owned);
        let channel_type = stored
            .channel_type
            .as_ref()
            .and_then(serde_json::Value::as_str);
        Self {
            current_channel_key,
            volume,
            channel_type: CatalogKind::from_stored(channel_type),
            is_running: stored
                .is_running
                .as_ref()
                .and_then(serde_json::Value::as_bool)
                .unwrap_or(false),
        }
    }
}

/// Reads and writes the single snapshot file.  No locking: one daemon owns it.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Best-effort load: a missing file and a broken file both yield `None`.
    pub fn load(&self) -> Option<Snapshot> {
        match self.try_load() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Ignoring snapshot: {}", e);
                None
            }
        }
    }

    pub fn try_load(&self) -> Result<Option<Snapshot>, SnapshotError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(SnapshotError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        let stored: StoredSnapshot =
            serde_json::from_str(&content).map_err(|source| SnapshotError::Parse {
                path: self.path.clone(),
                source,
            })?;
        Ok(Some(stored.into()))
    }

    /// Best-effort save: failures are logged and otherwise ignored so a
    /// playback operation is never aborted by persistence.
    pub fn save(&self, snapshot: &Snapshot) {
        if let Err(e) = self.try_save(snapshot) {
            warn!("Snapshot not saved: {}", e);
        }
    }

    pub fn try_save(&self, snapshot: &Snapshot) -> Result<(), SnapshotError> {
        let io_err = |source| SnapshotError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(io_err)?;
            }
        }

        let json = serde_json::to_string_pretty(snapshot).map_err(|source| SnapshotError::Serialize {
            path: self.path.clone(),
            source,
        })?;
        std::fs::write(&self.path, json).map_err(io_err)?;
        debug!(
            "Snapshot saved: key={:?} volume={} type={} running={}",
            snapshot.current_channel_key, snapshot.volume, snapshot.channel_type, snapshot.is_running
        );
        Ok(())
    }
}
