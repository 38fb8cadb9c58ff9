//! File-backed store of license key records.
//!
//! The whole key set lives in memory and is mirrored to a JSON snapshot
//! (`{"keys": [...]}`) after every mutation. Snapshots are written to a
//! sibling `.tmp` file, flushed, then renamed over the live file, so a crash
//! mid-write leaves the previous snapshot intact. The file is read only once,
//! at startup.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, error, info};

use crate::errors::{ServiceError, ServiceResult};
use crate::license_key::{Features, DEFAULT_MAX_PLAYERS, DEFAULT_SERVER_NAME};

fn default_server_name() -> String {
    DEFAULT_SERVER_NAME.to_string()
}

fn default_max_players() -> u32 {
    DEFAULT_MAX_PLAYERS
}

/// Parse a caller-supplied expiry.
///
/// Accepts RFC 3339, a bare date (midnight UTC) or a date-time without zone
/// (taken as UTC). An empty string means "no expiry".
pub fn parse_expiry(value: &str) -> ServiceResult<Option<DateTime<Utc>>> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(Some(dt.with_timezone(&Utc)));
    }

    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S") {
        return Ok(Some(dt.and_utc()));
    }

    if let Some(dt) = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    {
        return Ok(Some(dt.and_utc()));
    }

    Err(ServiceError::InvalidParameter(format!(
        "invalid expiresAt '{value}' (expected ISO 8601, e.g. '2025-12-31T23:59:59Z' or '2025-12-31')"
    )))
}

/// Stored expiries go through [`parse_expiry`], so hand-edited bare dates load.
fn deserialize_expiry<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(value) => parse_expiry(&value).map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}

/// A registered license key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseKey {
    pub key: String,
    #[serde(default = "default_server_name")]
    pub server_name: String,
    #[serde(default = "default_max_players")]
    pub max_players: u32,
    #[serde(default)]
    pub features: Features,
    /// `None` means the key never expires.
    #[serde(default, deserialize_with = "deserialize_expiry")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Set once at registration. Key files produced by the generator call it `generated`.
    #[serde(default = "Utc::now", alias = "generated")]
    pub registered: DateTime<Utc>,
}

impl LicenseKey {
    /// Whether the key has expired as of `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires| expires < now)
    }
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    keys: Vec<&'a LicenseKey>,
}

#[derive(Deserialize)]
struct Snapshot {
    #[serde(default)]
    keys: Vec<LicenseKey>,
}

/// Authoritative mapping from key string to [`LicenseKey`].
///
/// Listing order is insertion order; overwriting a key keeps its position.
/// All mutations are serialised by one lock, which is also held across the
/// snapshot write so the file always reflects a complete in-memory state.
#[derive(Debug)]
pub struct KeyStore {
    path: PathBuf,
    keys: Mutex<IndexMap<String, LicenseKey>>,
}

impl KeyStore {
    /// Open the store backed by `path`.
    ///
    /// A missing file is not an error: the store starts empty. A file that
    /// exists but cannot be parsed is.
    pub fn load(path: impl Into<PathBuf>) -> ServiceResult<Self> {
        let path = path.into();
        let mut keys = IndexMap::new();

        if path.exists() {
            let data = fs::read_to_string(&path).map_err(|e| {
                ServiceError::Storage(format!("failed to read {}: {e}", path.display()))
            })?;
            let snapshot: Snapshot = serde_json::from_str(&data).map_err(|e| {
                ServiceError::Storage(format!("failed to parse {}: {e}", path.display()))
            })?;
            for record in snapshot.keys {
                keys.insert(record.key.clone(), record);
            }
            info!("Loaded {} keys from {}", keys.len(), path.display());
        } else {
            debug!("No key file at {}, starting empty", path.display());
        }

        Ok(Self {
            path,
            keys: Mutex::new(keys),
        })
    }

    /// Path of the backing snapshot.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> ServiceResult<MutexGuard<'_, IndexMap<String, LicenseKey>>> {
        self.keys
            .lock()
            .map_err(|_| ServiceError::Internal("failed to acquire key store lock".into()))
    }

    /// Insert or overwrite the record keyed by `record.key`.
    ///
    /// Overwrite is the contract: there is no "already exists" failure and
    /// nothing from the previous record survives. If the snapshot cannot be
    /// written the in-memory change is rolled back and the error returned.
    pub fn put(&self, record: LicenseKey) -> ServiceResult<()> {
        let mut keys = self.lock()?;
        let key = record.key.clone();
        let previous = keys.insert(key.clone(), record);

        if let Err(e) = self.persist(&keys) {
            match previous {
                Some(old) => {
                    keys.insert(key, old);
                }
                None => {
                    keys.shift_remove(&key);
                }
            }
            return Err(e);
        }

        Ok(())
    }

    /// Look up a record.
    pub fn get(&self, key: &str) -> ServiceResult<Option<LicenseKey>> {
        Ok(self.lock()?.get(key).cloned())
    }

    /// Remove a record, returning whether it existed.
    ///
    /// On a failed snapshot write the record is restored at its old position.
    pub fn remove(&self, key: &str) -> ServiceResult<bool> {
        let mut keys = self.lock()?;
        let Some((index, removed_key, removed)) = keys.shift_remove_full(key) else {
            return Ok(false);
        };

        if let Err(e) = self.persist(&keys) {
            keys.shift_insert(index, removed_key, removed);
            return Err(e);
        }

        Ok(true)
    }

    /// Every record, in insertion order.
    pub fn list(&self) -> ServiceResult<Vec<LicenseKey>> {
        Ok(self.lock()?.values().cloned().collect())
    }

    /// Number of registered keys.
    pub fn len(&self) -> ServiceResult<usize> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> ServiceResult<bool> {
        Ok(self.len()? == 0)
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "keys.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn persist(&self, keys: &IndexMap<String, LicenseKey>) -> ServiceResult<()> {
        let snapshot = SnapshotRef {
            keys: keys.values().collect(),
        };
        let json = serde_json::to_vec_pretty(&snapshot)?;
        let tmp = self.temp_path();

        let write = || -> std::io::Result<()> {
            let mut file = File::create(&tmp)?;
            file.write_all(&json)?;
            file.sync_all()?;
            fs::rename(&tmp, &self.path)
        };

        write().map_err(|e| {
            error!("Failed to write key snapshot {}: {e}", self.path.display());
            let _ = fs::remove_file(&tmp);
            ServiceError::Storage(format!("failed to write {}: {e}", self.path.display()))
        })
    }
}
