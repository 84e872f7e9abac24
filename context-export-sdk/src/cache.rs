//! Disk-backed response cache for idempotent requests.
//!
//! Layout under the cache directory:
//!
//! - `index.json`: fingerprint -> `{timestamp, url, method}`
//! - `<fingerprint>.json`: `{timestamp, payload}` for one response body
//!
//! Entries expire lazily: an entry older than the TTL is evicted when it is
//! read. When the index is full the entry with the oldest timestamp is evicted
//! before a new one is inserted. The cache is an optimization only, so every
//! failure is logged and treated as a miss.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use context_export_core::CacheConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};

const INDEX_FILE: &str = "index.json";

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    /// Seconds since the Unix epoch
    timestamp: f64,
    url: String,
    method: String,
}

#[derive(Serialize, Deserialize)]
struct CachedPayload {
    timestamp: f64,
    payload: Value,
}

pub struct RequestCache {
    dir: PathBuf,
    ttl: Duration,
    max_size: usize,
    index: Mutex<HashMap<String, IndexEntry>>,
}

impl RequestCache {
    /// Open (or create) the cache directory and load its index.
    pub fn open(config: &CacheConfig) -> Self {
        if let Err(e) = fs::create_dir_all(&config.cache_dir) {
            warn!(dir = %config.cache_dir.display(), error = %e, "Failed to create cache directory");
        }

        let index = load_index(&config.cache_dir.join(INDEX_FILE));
        debug!(
            dir = %config.cache_dir.display(),
            entries = index.len(),
            "Opened request cache"
        );

        Self {
            dir: config.cache_dir.clone(),
            ttl: config.ttl,
            max_size: config.max_size,
            index: Mutex::new(index),
        }
    }

    /// Stable key for a request. Parameter order does not matter.
    pub fn fingerprint(method: &str, url: &str, params: &[(String, String)]) -> String {
        let mut key = format!("{}:{}", method.to_ascii_uppercase(), url);
        if !params.is_empty() {
            // Repeated keys are kept; only the pair order is normalised
            let mut sorted = params.to_vec();
            sorted.sort();
            if let Ok(params) = serde_json::to_string(&sorted) {
                key.push(':');
                key.push_str(&params);
            }
        }

        hex::encode(Sha256::digest(key.as_bytes()))
    }

    /// Cached payload for the request, if present and fresh.
    pub fn get(&self, method: &str, url: &str, params: &[(String, String)]) -> Option<Value> {
        let fingerprint = Self::fingerprint(method, url, params);
        let mut index = self.lock();

        let entry = index.get(&fingerprint)?;
        if now_secs() - entry.timestamp >= self.ttl.as_secs_f64() {
            debug!(%url, "Cache entry expired");
            self.evict(&mut index, &fingerprint);
            return None;
        }

        match self.read_payload(&fingerprint) {
            Ok(payload) => {
                debug!(%url, "Cache hit");
                Some(payload)
            }
            Err(e) => {
                warn!(%url, error = %e, "Corrupt cache entry, evicting");
                self.evict(&mut index, &fingerprint);
                None
            }
        }
    }

    /// Store a payload for the request.
    pub fn set(&self, method: &str, url: &str, payload: &Value, params: &[(String, String)]) {
        let fingerprint = Self::fingerprint(method, url, params);
        let mut index = self.lock();

        if !index.contains_key(&fingerprint) && index.len() >= self.max_size {
            let oldest = index
                .iter()
                .min_by(|a, b| a.1.timestamp.total_cmp(&b.1.timestamp))
                .map(|(key, _)| key.clone());
            if let Some(oldest) = oldest {
                debug!(fingerprint = %oldest, "Cache full, evicting oldest entry");
                self.evict(&mut index, &oldest);
            }
        }

        let timestamp = now_secs();
        if let Err(e) = self.write_payload(&fingerprint, timestamp, payload) {
            warn!(%url, error = %e, "Failed to write cache entry");
            return;
        }

        index.insert(
            fingerprint,
            IndexEntry {
                timestamp,
                url: url.to_string(),
                method: method.to_ascii_uppercase(),
            },
        );
        self.persist_index(&index);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Drop every entry and its payload file
    pub fn clear(&self) {
        let mut index = self.lock();
        for fingerprint in index.keys() {
            remove_quietly(&self.payload_path(fingerprint));
        }
        index.clear();
        self.persist_index(&index);
    }

    /// Evict every expired entry now instead of on read. Returns the count.
    pub fn purge_expired(&self) -> usize {
        let mut index = self.lock();
        let ttl = self.ttl.as_secs_f64();
        let now = now_secs();

        let expired: Vec<String> = index
            .iter()
            .filter(|(_, entry)| now - entry.timestamp >= ttl)
            .map(|(key, _)| key.clone())
            .collect();

        for fingerprint in &expired {
            index.remove(fingerprint);
            remove_quietly(&self.payload_path(fingerprint));
        }
        if !expired.is_empty() {
            self.persist_index(&index);
        }
        expired.len()
    }

    fn evict(&self, index: &mut HashMap<String, IndexEntry>, fingerprint: &str) {
        index.remove(fingerprint);
        remove_quietly(&self.payload_path(fingerprint));
        self.persist_index(index);
    }

    fn payload_path(&self, fingerprint: &str) -> PathBuf {
        self.dir.join(format!("{fingerprint}.json"))
    }

    fn read_payload(&self, fingerprint: &str) -> Result<Value, CacheError> {
        let bytes = fs::read(self.payload_path(fingerprint))?;
        let cached: CachedPayload = serde_json::from_slice(&bytes)?;
        Ok(cached.payload)
    }

    fn write_payload(&self, fingerprint: &str, timestamp: f64, payload: &Value) -> Result<(), CacheError> {
        let bytes = serde_json::to_vec(&CachedPayload {
            timestamp,
            payload: payload.clone(),
        })?;
        fs::write(self.payload_path(fingerprint), bytes)?;
        Ok(())
    }

    fn persist_index(&self, index: &HashMap<String, IndexEntry>) {
        if let Err(e) = write_atomic(&self.dir.join(INDEX_FILE), index) {
            warn!(dir = %self.dir.display(), error = %e, "Failed to persist cache index");
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, IndexEntry>> {
        self.index.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn load_index(path: &Path) -> HashMap<String, IndexEntry> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return HashMap::new(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read cache index, starting empty");
            return HashMap::new();
        }
    };

    serde_json::from_slice(&bytes).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "Corrupt cache index, starting empty");
        HashMap::new()
    })
}

/// Write via a temp file and rename so a crash never leaves a torn index
fn write_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), CacheError> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, serde_json::to_vec(value)?)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            debug!(path = %path.display(), error = %e, "Failed to remove cache file");
        }
    }
}

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}
