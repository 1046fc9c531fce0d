//! A store that does nothing. It measures the overhead of the benchmark itself.
//!
//! ## Configuration Format
//!
//! ``` toml
//! store = "null"
//! ```

use crate::stores::{Registry, StoreOpt};
use crate::*;

/// Accepts every write and never finds a key.
#[derive(Clone, Default)]
pub struct NullStore;

impl NullStore {
    pub fn new() -> Self {
        Self
    }

    pub fn new_store(_opt: &StoreOpt) -> Result<Box<dyn Store>> {
        Ok(Box::new(Self::new()))
    }
}

impl Store for NullStore {
    fn write(&mut self, key: &[u8], value: &[u8]) -> Result<usize> {
        Ok(key.len() + value.len())
    }

    fn read(&mut self, _key: &[u8]) -> Result<Option<usize>> {
        Ok(None)
    }

    fn begin_transaction(&mut self) -> Result<()> {
        Ok(())
    }

    fn end_transaction(&mut self) -> Result<()> {
        Ok(())
    }
}

inventory::submit! {
    Registry::new("null", NullStore::new_store)
}
