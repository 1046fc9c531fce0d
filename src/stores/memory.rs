//! An ordered in-memory store backed by [`std::collections::BTreeMap`].
//!
//! ## Configuration Format
//!
//! ``` toml
//! store = "memory"
//! ```
//!
//! Writes inside a transaction are staged and only become visible to other handles when the
//! transaction ends. The store has no durability, so sync modes and flushes are no-ops.

use crate::stores::{Registry, StoreOpt};
use crate::*;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

type BaseMap = BTreeMap<Box<[u8]>, Box<[u8]>>;

/// A handle to the in-memory map. Clones share the same map, which lets a caller keep looking at
/// the content after handing a handle to the benchmark.
#[derive(Clone, Default)]
pub struct MemoryStore {
    map: Arc<Mutex<BaseMap>>,
    staged: Option<BaseMap>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_store(_opt: &StoreOpt) -> Result<Box<dyn Store>> {
        Ok(Box::new(Self::new()))
    }

    /// Number of committed keys.
    pub fn len(&self) -> usize {
        self.map.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The committed value of a key.
    pub fn get(&self, key: &[u8]) -> Option<Box<[u8]>> {
        self.map.lock().get(key).cloned()
    }
}

impl Store for MemoryStore {
    fn write(&mut self, key: &[u8], value: &[u8]) -> Result<usize> {
        match self.staged {
            Some(ref mut staged) => staged.insert(key.into(), value.into()),
            None => self.map.lock().insert(key.into(), value.into()),
        };
        Ok(key.len() + value.len())
    }

    fn read(&mut self, key: &[u8]) -> Result<Option<usize>> {
        if let Some(v) = self.staged.as_ref().and_then(|s| s.get(key)) {
            return Ok(Some(v.len()));
        }
        Ok(self.map.lock().get(key).map(|v| v.len()))
    }

    fn begin_transaction(&mut self) -> Result<()> {
        if self.staged.is_some() {
            return Err(Error::backend(
                "memory begin transaction",
                "cannot start a transaction within a transaction",
            ));
        }
        self.staged = Some(BaseMap::new());
        Ok(())
    }

    fn end_transaction(&mut self) -> Result<()> {
        let staged = self.staged.take().ok_or_else(|| {
            Error::backend(
                "memory end transaction",
                "cannot commit - no transaction is active",
            )
        })?;
        self.map.lock().extend(staged);
        Ok(())
    }
}

inventory::submit! {
    Registry::new("memory", MemoryStore::new_store)
}
