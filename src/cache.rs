//! Persistent answer cache keyed by a composite fingerprint.
//!
//! The fingerprint covers every parameter that can change an answer:
//! query text, active sources, retrieval/generation settings, the user
//! corpus fingerprint (`doc_hash`) and the retrieval method. Entries
//! never expire; adding or removing documents changes `doc_hash` and
//! silently invalidates stale answers.
//!
//! The store is a single JSON object file. A missing or corrupt store
//! behaves as a cache miss, never as a failure.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::Result;

/// Everything that affects an answer, in one hashable record.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Fingerprint {
    pub query: String,
    /// Active source names, in requested retrieval order (order
    /// changes the assembled context, so it changes the key).
    pub sources: Vec<String>,
    pub top_k: usize,
    pub max_length: usize,
    pub temperature: f32,
    pub do_sample: bool,
    /// Hash over the ordered `doc_name` sequence of the user corpus.
    pub doc_hash: String,
    /// Retrieval method name ("rag" or "hyde").
    pub method: String,
}

impl Fingerprint {
    /// Canonical storage key: SHA-256 over the sorted-field JSON
    /// encoding (serde_json object keys are ordered, so field order in
    /// this struct never leaks into the key).
    pub fn cache_key(&self) -> Result<String> {
        let canonical = serde_json::to_value(self)?.to_string();
        Ok(sha256_hex(canonical.as_bytes()))
    }
}

/// SHA-256 digest as lowercase hex.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// File-backed key/value store of generated answers.
pub struct AnswerCache {
    path: PathBuf,
}

impl AnswerCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Look up a cached answer. Any read or parse failure is a miss.
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<String> {
        let key = match fingerprint.cache_key() {
            Ok(key) => key,
            Err(err) => {
                warn!("Failed to fingerprint cache lookup: {}", err);
                return None;
            }
        };
        let hit = self.read_store().remove(&key);
        if hit.is_some() {
            debug!("Answer cache hit for method '{}'", fingerprint.method);
        }
        hit
    }

    /// Store an answer under the fingerprint's key.
    pub fn set(&self, fingerprint: &Fingerprint, answer: &str) -> Result<()> {
        let key = fingerprint.cache_key()?;
        let mut store = self.read_store();
        store.insert(key, answer.to_string());

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let serialized = serde_json::to_string(&store)?;
        std::fs::write(&self.path, serialized)?;
        Ok(())
    }

    /// Delete the entire persisted store; absence is not an error.
    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn read_store(&self) -> HashMap<String, String> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(_) => return HashMap::new(),
        };
        match serde_json::from_str(&raw) {
            Ok(store) => store,
            Err(err) => {
                warn!(
                    "Answer cache at {} is corrupt ({}), treating as empty",
                    self.path.display(),
                    err
                );
                HashMap::new()
            }
        }
    }
}
