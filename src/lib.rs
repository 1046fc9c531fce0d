#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! A latency and throughput benchmark for key-value storage backends.
//!
//! `dbbench` runs a sequence of named workload **phases** (sequential or random fills, reads,
//! and mixed read/write) against a store, one operation at a time, and reports the time per
//! operation, the throughput and, optionally, a latency histogram for every phase.
//!
//! A few key design choices include:
//!
//! - Keys are 16-byte, zero-padded decimal strings, so lexical and numeric order agree. Values
//!   are windows of a precomputed pool with a tunable compression ratio.
//! - Latency is measured between the completions of consecutive operations, so transaction
//!   bracketing and key/value generation are part of what is measured, exactly like a client of
//!   the store would observe.
//! - Every error reported by a store is fatal. Timings taken from a store in an unknown state are
//!   not worth reporting.
//!
//! Users can benchmark their own stores by implementing [`Store`], registering a constructor
//! with [`inventory`] (see [`mod@stores`]), and calling [`cmdline()`] from their `main`.
//!
//! More detailed usage could be found in the module-level rustdocs:
//!
//! - [`mod@bench`] for the benchmark names and the configuration format.
//! - [`mod@stores`] for the built-in stores.
//! - [`cmdline()`] for the usage of the command line interface.

/// How durable a store should make each write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncMode {
    /// Hand the data to the operating system and move on.
    Off,
    /// Sync at the critical moments, e.g. when a write-ahead log is checkpointed.
    Normal,
    /// Sync every write before returning.
    Full,
}

/// A key-value store under test.
///
/// Calls are made from a single thread, one at a time. Any error is treated as fatal by the
/// benchmark.
pub trait Store {
    /// Insert a key-value pair or blindly replace the value of an existing key. Returns the
    /// number of bytes handed to the store.
    fn write(&mut self, key: &[u8], value: &[u8]) -> Result<usize>;

    /// Look up a key. Returns the length of the value if the key exists.
    fn read(&mut self, key: &[u8]) -> Result<Option<usize>>;

    /// Open a transaction that covers the following operations.
    fn begin_transaction(&mut self) -> Result<()>;

    /// Commit the transaction opened by [`Store::begin_transaction`].
    fn end_transaction(&mut self) -> Result<()>;

    /// Change the durability of subsequent writes.
    fn set_sync(&mut self, _mode: SyncMode) -> Result<()> {
        Ok(())
    }

    /// Flush buffered state to stable storage (e.g. checkpoint a write-ahead log).
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    /// Release the store.
    fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

pub mod bench;
mod cmdline;
mod error;
pub mod histogram;
pub mod report;
pub mod stores;
pub mod workload;

pub use cmdline::cmdline;
pub use error::{Error, Result};

pub extern crate inventory;
