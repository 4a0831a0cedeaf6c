use super::SecureStorage;
use crate::error::{Error, Result};
use std::collections::{BTreeMap, HashMap};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

/// Keychain backed by a JSON file (`<root>/<app>/keychain.json`).
///
/// Stored in clear; on unix the file is created owner-only (0600).
#[derive(Debug)]
pub struct FileKeychain {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileKeychain {
    pub fn open(app: &str) -> Result<Self> {
        Self::open_at(super::data_root().join(app).join("keychain.json"))
    }

    pub fn open_at(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .map_err(|e| Error::Storage(format!("keychain read: {e}")))?;
            serde_json::from_str(&raw)
                .map_err(|e| Error::Storage(format!("keychain json: {e}")))?
        } else {
            BTreeMap::new()
        };
        Ok(Self { path, entries: Mutex::new(entries) })
    }

    pub fn path(&self) -> &Path { &self.path }

    /// Write to a sibling temp file created owner-only, fsync, then rename over
    /// the keychain so a crash leaves either the old or the new file.
    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        let io = |what: &str, e: std::io::Error| Error::Storage(format!("keychain {what}: {e}"));
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| io("mkdir", e))?;
        }
        let raw = serde_json::to_vec_pretty(entries)
            .map_err(|e| Error::Storage(format!("keychain json: {e}")))?;

        let tmp = self.temp_path();
        match std::fs::remove_file(&tmp) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(io("stale temp", e)),
        }
        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&tmp).map_err(|e| io("create", e))?;
        file.write_all(&raw).and_then(|()| file.sync_all()).map_err(|e| io("write", e))?;
        drop(file);
        std::fs::rename(&tmp, &self.path).map_err(|e| io("rename", e))
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn mutate(&self, f: impl FnOnce(&mut BTreeMap<String, String>) -> bool) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        let mut next = entries.clone();
        if !f(&mut next) {
            return false;
        }
        match self.flush(&next) {
            Ok(()) => {
                *entries = next;
                true
            }
            Err(e) => {
                warn!(error = %e, "keychain flush failed");
                false
            }
        }
    }
}

impl SecureStorage for FileKeychain {
    fn store(&self, key: &str, value: &str) -> bool {
        self.mutate(|entries| {
            entries.insert(key.to_string(), value.to_string());
            true
        })
    }

    fn retrieve(&self, key: &str) -> Option<String> {
        self.entries.lock().unwrap_or_else(|p| p.into_inner()).get(key).cloned()
    }

    fn remove(&self, key: &str) -> bool {
        self.mutate(|entries| entries.remove(key).is_some())
    }
}

/// In-process keychain.
#[derive(Debug, Default)]
pub struct MemoryKeychain {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryKeychain {
    pub fn new() -> Self { Self::default() }
}

impl SecureStorage for MemoryKeychain {
    fn store(&self, key: &str, value: &str) -> bool {
        self.entries.lock().unwrap_or_else(|p| p.into_inner()).insert(key.to_string(), value.to_string());
        true
    }

    fn retrieve(&self, key: &str) -> Option<String> {
        self.entries.lock().unwrap_or_else(|p| p.into_inner()).get(key).cloned()
    }

    fn remove(&self, key: &str) -> bool {
        self.entries.lock().unwrap_or_else(|p| p.into_inner()).remove(key).is_some()
    }
}
