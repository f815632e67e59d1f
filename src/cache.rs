use std::fs;
use std::time::{Duration, SystemTime};

use camino::Utf8PathBuf;
use directories::BaseDirs;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::error::MasstError;
use crate::fs_util::write_bytes_atomic;

/// On-disk store of raw search responses keyed by the full query string.
#[derive(Debug, Clone)]
pub struct ResponseCache {
    root: Utf8PathBuf,
    expire_after: Duration,
}

impl ResponseCache {
    pub fn new(expire_after: Duration) -> Result<Self, MasstError> {
        let root = BaseDirs::new()
            .and_then(|dirs| {
                Utf8PathBuf::from_path_buf(dirs.home_dir().join(".cache").join("masst-tree")).ok()
            })
            .ok_or_else(|| {
                MasstError::Filesystem("unable to resolve cache directory".to_string())
            })?;
        Ok(Self { root, expire_after })
    }

    pub fn new_with_root(root: Utf8PathBuf, expire_after: Duration) -> Self {
        Self { root, expire_after }
    }

    pub fn entry_path(&self, key: &str) -> Utf8PathBuf {
        self.root.join("responses").join(format!("{}.json", cache_file_name(key)))
    }

    /// Returns the cached response if present and younger than the expiry.
    /// Unreadable or corrupt entries count as a miss.
    pub fn get(&self, key: &str) -> Option<Value> {
        let path = self.entry_path(key);
        let modified = fs::metadata(path.as_std_path())
            .and_then(|meta| meta.modified())
            .ok()?;
        let age = SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO);
        if age > self.expire_after {
            debug!(path = %path, "cached response expired");
            return None;
        }
        let content = fs::read_to_string(path.as_std_path()).ok()?;
        match serde_json::from_str(&content) {
            Ok(value) => Some(value),
            Err(err) => {
                debug!(path = %path, error = %err, "ignoring corrupt cache entry");
                None
            }
        }
    }

    pub fn put(&self, key: &str, value: &Value) -> Result<(), MasstError> {
        let path = self.entry_path(key);
        let content =
            serde_json::to_vec(value).map_err(|err| MasstError::Serialize(err.to_string()))?;
        write_bytes_atomic(&path, &content)
    }
}

/// Query strings carry `:`, `/` and `&`; keep the name readable and append a
/// stable checksum so distinct queries never share a file.
fn cache_file_name(key: &str) -> String {
    let unsafe_chars = Regex::new(r"[^-a-zA-Z0-9_.]+").expect("static regex");
    let readable = unsafe_chars.replace_all(key, "_");
    let readable = readable.chars().take(120).collect::<String>();
    let digest = blake3::hash(key.as_bytes()).to_hex();
    format!("{readable}-{}", &digest[..16])
}
