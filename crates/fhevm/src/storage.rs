// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use crate::error::{FhevmError, Result};

/// String key-value store the signature cache lives in
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: String) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| FhevmError::Storage("store lock poisoned".to_string()))
    }
}

impl KeyValueStore for InMemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: String) -> Result<()> {
        self.lock()?.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }
}

/// Persistent store on a sled tree, survives restarts
#[derive(Clone)]
pub struct SledStore {
    db: sled::Db,
}

impl SledStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    /// Store that lives only as long as the process
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }
}

impl KeyValueStore for SledStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.db
            .get(key)?
            .map(|raw| {
                String::from_utf8(raw.to_vec())
                    .map_err(|e| FhevmError::Storage(format!("entry {key} is not utf-8: {e}")))
            })
            .transpose()
    }

    fn set(&self, key: &str, value: String) -> Result<()> {
        self.db.insert(key, value.into_bytes())?;
        self.db.flush()?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.db.remove(key)?;
        self.db.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tempfile::tempdir;

    #[test]
    fn test_in_memory_store() -> Result<()> {
        let store = InMemoryStore::new();
        assert_eq!(store.get("a")?, None);
        store.set("a", "1".to_string())?;
        assert_eq!(store.get("a")?, Some("1".to_string()));
        store.remove("a")?;
        assert!(store.is_empty());
        Ok(())
    }

    #[test]
    fn test_sled_store_persists() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("signatures");
        {
            let store = SledStore::open(&path)?;
            store.set("key", "value".to_string())?;
        }
        let store = SledStore::open(&path)?;
        assert_eq!(store.get("key")?, Some("value".to_string()));
        store.remove("key")?;
        assert_eq!(store.get("key")?, None);
        Ok(())
    }
}
