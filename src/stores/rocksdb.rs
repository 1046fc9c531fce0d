//! Adapter implementation of [`rocksdb`].
//!
//! ## Configuration Format
//!
//! ``` toml
//! store = "rocksdb"
//! db = "..."               # the data directory is created under this path
//! use_existing_db = false
//! wal_enabled = true       # disable to skip the write-ahead log
//! ```
//!
//! A transaction is buffered in a [`WriteBatch`] and written atomically when it ends. Reads do
//! not see the writes of the batch that is still open.

use crate::stores::{Registry, StoreOpt};
use crate::*;
use log::debug;
use rocksdb::{Options, WriteBatch, WriteOptions, DB};
use std::path::Path;

const DIR_NAME: &str = "dbbench_rocksdb";

pub struct RocksDB {
    db: DB,
    wopts: WriteOptions,
    batch: Option<WriteBatch>,
}

impl RocksDB {
    pub fn new(opt: &StoreOpt) -> Result<Self> {
        let path = Path::new(&opt.db).join(DIR_NAME);
        if !opt.use_existing_db && path.exists() {
            debug!("Removing {:?}", path);
            DB::destroy(&Options::default(), &path)
                .map_err(|e| Error::backend("rocksdb destroy", e))?;
        }
        let mut options = Options::default();
        options.create_if_missing(true);
        let db = DB::open(&options, &path).map_err(|e| Error::backend("rocksdb open", e))?;
        let mut wopts = WriteOptions::default();
        wopts.disable_wal(!opt.wal_enabled);
        Ok(Self {
            db,
            wopts,
            batch: None,
        })
    }

    pub fn new_store(opt: &StoreOpt) -> Result<Box<dyn Store>> {
        Ok(Box::new(Self::new(opt)?))
    }
}

impl Store for RocksDB {
    fn write(&mut self, key: &[u8], value: &[u8]) -> Result<usize> {
        match self.batch {
            Some(ref mut batch) => batch.put(key, value),
            None => self
                .db
                .put_opt(key, value, &self.wopts)
                .map_err(|e| Error::backend("rocksdb put", e))?,
        }
        Ok(key.len() + value.len())
    }

    fn read(&mut self, key: &[u8]) -> Result<Option<usize>> {
        let v = self
            .db
            .get_pinned(key)
            .map_err(|e| Error::backend("rocksdb get", e))?;
        Ok(v.map(|v| v.len()))
    }

    fn begin_transaction(&mut self) -> Result<()> {
        if self.batch.is_some() {
            return Err(Error::backend(
                "rocksdb begin transaction",
                "a write batch is already open",
            ));
        }
        self.batch = Some(WriteBatch::default());
        Ok(())
    }

    fn end_transaction(&mut self) -> Result<()> {
        let batch = self.batch.take().ok_or_else(|| {
            Error::backend("rocksdb end transaction", "no write batch is open")
        })?;
        self.db
            .write_opt(batch, &self.wopts)
            .map_err(|e| Error::backend("rocksdb write batch", e))
    }

    fn set_sync(&mut self, mode: SyncMode) -> Result<()> {
        self.wopts.set_sync(mode == SyncMode::Full);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.db
            .flush()
            .map_err(|e| Error::backend("rocksdb flush", e))
    }
}

inventory::submit! {
    Registry::new("rocksdb", RocksDB::new_store)
}
