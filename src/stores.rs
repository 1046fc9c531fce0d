//! Adapters for built-in and external key-value stores.
//!
//! ## Built-in Stores
//!
//! - `memory`: an ordered in-memory map, see [`memory`].
//! - `null`: a store that does nothing, see [`null`].
//! - `sqlite` (feature `sqlite`): a SQLite database file, see `sqlite`.
//! - `rocksdb` (feature `rocksdb`): a RocksDB database directory, see `rocksdb`.
//!
//! ## Configuration Format
//!
//! The store is chosen with the `store` option. The remaining store options are shared by all
//! stores and each store picks the ones it understands:
//!
//! ```toml
//! store = "sqlite"
//! db = "/tmp/"
//! use_existing_db = false
//! page_size = 4096
//! num_pages = 4096
//! wal_enabled = true
//! checkpoint_granularity = 1024
//! mmap_size_mb = 4
//! # extension = "path/to/extension.so"
//! ```
//!
//! ## Registering New Stores
//!
//! When users would like to register new key-value stores from their own crate, they first
//! implement [`Store`] for it. Then, they need to create a constructor function with a signature
//! of `fn(&StoreOpt) -> Result<Box<dyn Store>>`.
//!
//! The final step is to register the store's constructor (along with its name) using
//! [`inventory`]. A minimal example would be: `inventory::submit! { Registry::new("name",
//! constructor_fn) };`.
//!
//! The source code of all built-in stores provide good examples on this process.

use crate::*;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Options handed to a store's constructor.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct StoreOpt {
    /// Name of the registered store.
    #[serde(rename = "store")]
    pub name: String,

    /// Directory in which database files are created.
    pub db: String,

    /// Do not remove the database left behind by an earlier run, and skip the prefill.
    pub use_existing_db: bool,

    /// Page size in bytes.
    pub page_size: usize,

    /// Number of pages in the page cache.
    pub num_pages: usize,

    /// Use a write-ahead log.
    pub wal_enabled: bool,

    /// Number of log pages between automatic checkpoints.
    pub checkpoint_granularity: usize,

    /// Size of the memory-mapped I/O region, in MB.
    pub mmap_size_mb: usize,

    /// An extension library to load into the store.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
}

impl Default for StoreOpt {
    fn default() -> Self {
        Self {
            name: "memory".to_string(),
            db: "./".to_string(),
            use_existing_db: false,
            page_size: 4096,
            num_pages: 4096,
            wal_enabled: true,
            checkpoint_granularity: 1024,
            mmap_size_mb: 4,
            extension: None,
        }
    }
}

/// The centralized registry that maps the name of a store to its constructor function.
///
/// A user-defined store can use the [`inventory::submit!`] macro to register their own stores to
/// be used in the benchmark framework.
pub struct Registry<'a> {
    pub(crate) name: &'a str,
    constructor: fn(&StoreOpt) -> Result<Box<dyn Store>>,
}

impl<'a> Registry<'a> {
    pub const fn new(name: &'a str, constructor: fn(&StoreOpt) -> Result<Box<dyn Store>>) -> Self {
        Self { name, constructor }
    }
}

inventory::collect!(Registry<'static>);

/// Names of all registered stores, sorted.
pub fn registered() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = inventory::iter::<Registry>
        .into_iter()
        .map(|r| r.name)
        .collect();
    names.sort_unstable();
    names
}

/// Create the store named in `opt`.
pub fn open(opt: &StoreOpt) -> Result<Box<dyn Store>> {
    let mut registered: HashMap<&'static str, fn(&StoreOpt) -> Result<Box<dyn Store>>> =
        HashMap::new();
    for r in inventory::iter::<Registry> {
        debug!("Adding supported store: {}", r.name);
        assert!(registered.insert(r.name, r.constructor).is_none()); // no existing name
    }
    let f = registered
        .get(opt.name.as_str())
        .ok_or_else(|| Error::config(format!("store {} not found in registry", opt.name)))?;
    debug!("Opening store {} with {:?}", opt.name, opt);
    f(opt)
}

pub mod memory;
pub mod null;
#[cfg(feature = "rocksdb")]
pub mod rocksdb;
#[cfg(feature = "sqlite")]
pub mod sqlite;
