//! Adapter implementation of SQLite, via [`rusqlite`].
//!
//! ## Configuration Format
//!
//! ``` toml
//! store = "sqlite"
//! db = "..."                     # directory of the database file
//! use_existing_db = false        # keep the database of an earlier run
//! page_size = 4096
//! num_pages = 4096               # cache_size in pages
//! wal_enabled = true             # journal_mode WAL instead of OFF
//! checkpoint_granularity = 1024  # wal_autocheckpoint in pages
//! mmap_size_mb = 4
//! # extension = "..."            # loadable extension, e.g. a custom VFS
//! ```
//!
//! Data lives in a single table `test (key blob, value blob, PRIMARY KEY (key))` in
//! `<db>/dbbench_sqlite3.db`. The connection runs in exclusive locking mode.

use crate::stores::{Registry, StoreOpt};
use crate::*;
use log::debug;
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection};
use std::fmt::Display;
use std::fs;
use std::path::Path;

const FILE_PREFIX: &str = "dbbench_sqlite3";

const STMT_BEGIN: &str = "BEGIN TRANSACTION";
const STMT_END: &str = "END TRANSACTION";
const STMT_READ: &str = "SELECT value FROM test WHERE key = ?1";
const STMT_REPLACE: &str = "REPLACE INTO test (key, value) VALUES (?1, ?2)";

fn sqlite_err(context: &'static str) -> impl Fn(rusqlite::Error) -> Error {
    move |e| Error::backend(context, e)
}

/// Run a pragma and drain whatever rows it returns (some pragmas echo their new value).
fn set_pragma(conn: &Connection, pragma: &str, value: impl Display) -> Result<()> {
    let sql = format!("PRAGMA {} = {}", pragma, value);
    debug!("sqlite: {}", sql);
    run_pragma(conn, &sql)
}

fn run_pragma(conn: &Connection, sql: &str) -> Result<()> {
    let mut stmt = conn.prepare(sql).map_err(sqlite_err("sqlite3 pragma"))?;
    let mut rows = stmt.query([]).map_err(sqlite_err("sqlite3 pragma"))?;
    while rows.next().map_err(sqlite_err("sqlite3 pragma"))?.is_some() {}
    Ok(())
}

/// Remove database files left behind by earlier runs.
fn remove_old_files(dir: &Path) -> Result<()> {
    let entries = fs::read_dir(dir).map_err(|e| Error::backend("read db directory", e))?;
    for entry in entries {
        let entry = entry.map_err(|e| Error::backend("read db directory", e))?;
        if entry.file_name().to_string_lossy().starts_with(FILE_PREFIX) {
            debug!("Removing {:?}", entry.path());
            fs::remove_file(entry.path()).map_err(|e| Error::backend("remove old database", e))?;
        }
    }
    Ok(())
}

/// Load an extension through a throwaway connection. Extensions of interest register
/// process-wide objects (e.g. a VFS), so they stay active for the real connection.
fn load_extension(path: &str) -> Result<()> {
    let tmp = Connection::open_in_memory().map_err(sqlite_err("open"))?;
    // SAFETY: loading native code is what the user asked for with `extension`.
    unsafe {
        tmp.load_extension_enable()
            .map_err(sqlite_err("enable extension"))?;
        tmp.load_extension(path, None::<&str>)
            .map_err(sqlite_err("load extension"))?;
    }
    tmp.close().map_err(|(_, e)| Error::backend("close", e))
}

pub struct Sqlite {
    conn: Connection,
    wal_enabled: bool,
}

impl Sqlite {
    pub fn new(opt: &StoreOpt) -> Result<Self> {
        let dir = Path::new(&opt.db);
        if !opt.use_existing_db {
            remove_old_files(dir)?;
        }
        if let Some(ref extension) = opt.extension {
            load_extension(extension)?;
        }

        let path = dir.join(format!("{}.db", FILE_PREFIX));
        let conn = Connection::open(&path).map_err(sqlite_err("sqlite3 open"))?;

        set_pragma(&conn, "mmap_size", opt.mmap_size_mb * 1024 * 1024)?;
        set_pragma(&conn, "cache_size", opt.num_pages)?;
        if opt.page_size != 1024 {
            set_pragma(&conn, "page_size", opt.page_size)?;
        }
        if opt.wal_enabled {
            set_pragma(&conn, "journal_mode", "WAL")?;
            set_pragma(&conn, "wal_autocheckpoint", opt.checkpoint_granularity)?;
        } else {
            set_pragma(&conn, "journal_mode", "OFF")?;
        }
        set_pragma(&conn, "locking_mode", "EXCLUSIVE")?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS test (key blob, value blob, PRIMARY KEY (key))",
        )
        .map_err(sqlite_err("sqlite3 create table"))?;

        Ok(Self {
            conn,
            wal_enabled: opt.wal_enabled,
        })
    }

    pub fn new_store(opt: &StoreOpt) -> Result<Box<dyn Store>> {
        Ok(Box::new(Self::new(opt)?))
    }

    fn run_once(&mut self, sql: &'static str) -> Result<()> {
        self.conn
            .prepare_cached(sql)
            .and_then(|mut stmt| stmt.execute([]))
            .map_err(sqlite_err("sqlite3 step"))?;
        Ok(())
    }
}

impl Store for Sqlite {
    fn write(&mut self, key: &[u8], value: &[u8]) -> Result<usize> {
        let mut stmt = self
            .conn
            .prepare_cached(STMT_REPLACE)
            .map_err(sqlite_err("sqlite3 prepare"))?;
        stmt.execute(params![key, value])
            .map_err(sqlite_err("sqlite3 step"))?;
        Ok(key.len() + value.len())
    }

    fn read(&mut self, key: &[u8]) -> Result<Option<usize>> {
        let mut stmt = self
            .conn
            .prepare_cached(STMT_READ)
            .map_err(sqlite_err("sqlite3 prepare"))?;
        let mut rows = stmt.query([key]).map_err(sqlite_err("sqlite3 step"))?;
        let mut found = None;
        while let Some(row) = rows.next().map_err(sqlite_err("sqlite3 step"))? {
            let len = match row.get_ref(0).map_err(sqlite_err("sqlite3 column"))? {
                ValueRef::Blob(b) => b.len(),
                ValueRef::Text(t) => t.len(),
                _ => 0,
            };
            found = Some(len);
        }
        Ok(found)
    }

    fn begin_transaction(&mut self) -> Result<()> {
        self.run_once(STMT_BEGIN)
    }

    fn end_transaction(&mut self) -> Result<()> {
        self.run_once(STMT_END)
    }

    fn set_sync(&mut self, mode: SyncMode) -> Result<()> {
        let value = match mode {
            SyncMode::Off => "OFF",
            SyncMode::Normal => "NORMAL",
            SyncMode::Full => "FULL",
        };
        set_pragma(&self.conn, "synchronous", value)
    }

    fn flush(&mut self) -> Result<()> {
        if self.wal_enabled {
            run_pragma(&self.conn, "PRAGMA wal_checkpoint(FULL)")?;
        }
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<()> {
        self.conn
            .close()
            .map_err(|(_, e)| Error::backend("sqlite3 close", e))
    }
}

inventory::submit! {
    Registry::new("sqlite", Sqlite::new_store)
}
