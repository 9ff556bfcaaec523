// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Key-value storage for security state.
//!
//! Every mutable table (users, revoked tokens, rate-limit trackers, policies)
//! sits behind [`Store`]. [`MemoryStore`] is the default; [`JsonFileStore`]
//! keeps a table in a JSON document for deployments that want state to
//! survive restarts.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::authn::RateLimitTracker;
use crate::error::StoreResult;
use crate::model::User;
use crate::policy::Policy;
use crate::token::RevokedToken;

// =============================================================================
// Store Trait
// =============================================================================

/// A string-keyed table.
///
/// Implementations must be safe to share across tasks. Individual calls are
/// atomic; read-modify-write sequences need external coordination.
pub trait Store<V>: Send + Sync {
    /// Returns the value for `key`.
    fn get(&self, key: &str) -> StoreResult<Option<V>>;

    /// Inserts or replaces the value for `key`.
    fn set(&self, key: &str, value: V) -> StoreResult<()>;

    /// Removes `key`, returning `true` if it was present.
    fn delete(&self, key: &str) -> StoreResult<bool>;

    /// Returns all entries.
    fn list(&self) -> StoreResult<Vec<(String, V)>>;

    /// Removes all entries.
    fn clear(&self) -> StoreResult<()>;

    /// Returns the number of entries.
    fn len(&self) -> StoreResult<usize> {
        Ok(self.list()?.len())
    }

    /// Returns `true` if the table is empty.
    fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }
}

// =============================================================================
// MemoryStore
// =============================================================================

/// Process-local table backed by a concurrent map.
#[derive(Debug)]
pub struct MemoryStore<V> {
    entries: DashMap<String, V>,
}

impl<V> MemoryStore<V> {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl<V> Default for MemoryStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Store<V> for MemoryStore<V>
where
    V: Clone + Send + Sync,
{
    fn get(&self, key: &str) -> StoreResult<Option<V>> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    fn set(&self, key: &str, value: V) -> StoreResult<()> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&self, key: &str) -> StoreResult<bool> {
        Ok(self.entries.remove(key).is_some())
    }

    fn list(&self) -> StoreResult<Vec<(String, V)>> {
        Ok(self
            .entries
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect())
    }

    fn clear(&self) -> StoreResult<()> {
        self.entries.clear();
        Ok(())
    }

    fn len(&self) -> StoreResult<usize> {
        Ok(self.entries.len())
    }
}

// =============================================================================
// JsonFileStore
// =============================================================================

/// Table persisted as a single JSON object, rewritten on every mutation.
///
/// Writes go to a sibling temporary file that is renamed over the target, so
/// a crash leaves either the old or the new document. A failed write rolls the
/// in-memory change back.
#[derive(Debug)]
pub struct JsonFileStore<V> {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, V>>,
}

impl<V> JsonFileStore<V>
where
    V: Serialize + DeserializeOwned + Clone + Send + Sync,
{
    /// Opens the table at `path`, loading existing content if present.
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let entries = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            if raw.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&raw)?
            }
        } else {
            BTreeMap::new()
        };

        tracing::debug!(path = %path.display(), entries = entries.len(), "Opened JSON store");

        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    /// Returns the backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &BTreeMap<String, V>) -> StoreResult<()> {
        let json = serde_json::to_vec_pretty(entries)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl<V> Store<V> for JsonFileStore<V>
where
    V: Serialize + DeserializeOwned + Clone + Send + Sync,
{
    fn get(&self, key: &str) -> StoreResult<Option<V>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: V) -> StoreResult<()> {
        let mut entries = self.entries.write();
        let previous = entries.insert(key.to_string(), value);

        if let Err(e) = self.persist(&entries) {
            match previous {
                Some(previous) => entries.insert(key.to_string(), previous),
                None => entries.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    fn delete(&self, key: &str) -> StoreResult<bool> {
        let mut entries = self.entries.write();
        let Some(previous) = entries.remove(key) else {
            return Ok(false);
        };

        if let Err(e) = self.persist(&entries) {
            entries.insert(key.to_string(), previous);
            return Err(e);
        }
        Ok(true)
    }

    fn list(&self) -> StoreResult<Vec<(String, V)>> {
        Ok(self
            .entries
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn clear(&self) -> StoreResult<()> {
        let mut entries = self.entries.write();
        let previous = std::mem::take(&mut *entries);

        if let Err(e) = self.persist(&entries) {
            *entries = previous;
            return Err(e);
        }
        Ok(())
    }

    fn len(&self) -> StoreResult<usize> {
        Ok(self.entries.read().len())
    }
}

// =============================================================================
// Stores
// =============================================================================

/// The four tables the security context needs.
#[derive(Clone)]
pub struct Stores {
    /// Users keyed by user ID.
    pub users: Arc<dyn Store<User>>,
    /// Revoked tokens keyed by jti.
    pub revoked_tokens: Arc<dyn Store<RevokedToken>>,
    /// Rate-limit trackers keyed by username.
    pub rate_limits: Arc<dyn Store<RateLimitTracker>>,
    /// ABAC policies keyed by policy ID.
    pub policies: Arc<dyn Store<Policy>>,
}

impl Stores {
    /// Creates process-local tables.
    pub fn in_memory() -> Self {
        Self {
            users: Arc::new(MemoryStore::new()),
            revoked_tokens: Arc::new(MemoryStore::new()),
            rate_limits: Arc::new(MemoryStore::new()),
            policies: Arc::new(MemoryStore::new()),
        }
    }

    /// Opens JSON-backed tables under `directory`.
    pub fn json(directory: impl AsRef<Path>) -> StoreResult<Self> {
        let dir = directory.as_ref();
        Ok(Self {
            users: Arc::new(JsonFileStore::open(dir.join("users.json"))?),
            revoked_tokens: Arc::new(JsonFileStore::open(dir.join("revoked_tokens.json"))?),
            rate_limits: Arc::new(JsonFileStore::open(dir.join("rate_limits.json"))?),
            policies: Arc::new(JsonFileStore::open(dir.join("policies.json"))?),
        })
    }

    /// Empties every table.
    pub fn clear_all(&self) -> StoreResult<()> {
        self.users.clear()?;
        self.revoked_tokens.clear()?;
        self.rate_limits.clear()?;
        self.policies.clear()?;
        Ok(())
    }
}

impl std::fmt::Debug for Stores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stores").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn exercise(store: &dyn Store<u32>) {
        assert!(store.is_empty().unwrap());
        store.set("a", 1).unwrap();
        store.set("b", 2).unwrap();
        store.set("a", 3).unwrap();

        assert_eq!(store.get("a").unwrap(), Some(3));
        assert_eq!(store.get("missing").unwrap(), None);
        assert_eq!(store.len().unwrap(), 2);

        assert!(store.delete("b").unwrap());
        assert!(!store.delete("b").unwrap());

        let mut listed = store.list().unwrap();
        listed.sort();
        assert_eq!(listed, vec![("a".to_string(), 3)]);

        store.clear().unwrap();
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_memory_store() {
        exercise(&MemoryStore::new());
    }

    #[test]
    fn test_json_store() {
        let dir = tempdir().unwrap();
        exercise(&JsonFileStore::open(dir.path().join("table.json")).unwrap());
    }

    #[test]
    fn test_json_store_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("table.json");

        {
            let store = JsonFileStore::<String>::open(&path).unwrap();
            store.set("k1", "v1".to_string()).unwrap();
            store.set("k2", "v2".to_string()).unwrap();
            store.delete("k1").unwrap();
        }

        let reopened = JsonFileStore::<String>::open(&path).unwrap();
        assert_eq!(reopened.get("k2").unwrap().as_deref(), Some("v2"));
        assert_eq!(reopened.get("k1").unwrap(), None);
        assert_eq!(reopened.path(), path.as_path());
    }

    #[test]
    fn test_json_store_rejects_corrupt_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("table.json");
        fs::write(&path, "{ not json").unwrap();

        assert!(JsonFileStore::<String>::open(&path).is_err());
    }
}
