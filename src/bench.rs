//! The core benchmark functionality.
//!
//! A benchmark run consists of a sequence of **phases**, each named by a short identifier. The
//! phases are run one after another against the same store, in the order they are listed.
//!
//! ## Benchmark Names
//!
//! A phase name is decomposed into facets:
//!
//! - A verb prefix that selects the operation mix: `fill` (writes only), `read` (reads only), or
//!   `rw` (each operation is a write with probability `write_percent`, otherwise a read).
//! - The rest of the name selects the key order: if it starts with `seq`, keys are visited in
//!   ascending order, otherwise they are drawn uniformly at random from `[0, num_keys)`.
//! - A trailing `sync` requests durable writes.
//! - A trailing `batch` groups `batch_size` operations per transaction instead of one.
//!
//! For example, `fillseq`, `fillrandsync`, `fillseqbatch`, `readrandom`, `readseq` and `rwseqsync`
//! are all valid names. Unknown names are skipped with a warning, and empty names are ignored.
//!
//! Write and mixed phases run `num_ops` operations, read phases run `reads` operations (`num_ops`
//! if not given). Unless `use_existing_db` is set, the whole key space is loaded once before the
//! first phase. The load is not measured.
//!
//! ## Configuration Format
//!
//! Options are layered: built-in defaults, then an optional TOML file, then environment variables
//! prefixed with `DBBENCH_` (e.g. `DBBENCH_NUM_KEYS=1000`), then command line flags. A
//! configuration file sets any subset of the options in [`BenchOpt`], with the store options of
//! [`StoreOpt`] at the same level:
//!
//! ```toml
//! benchmarks = "fillseq,readrandom,rwrandom"
//! histogram = true
//! num_keys = 100000
//! value_size = 100
//! write_percent = 20
//!
//! store = "sqlite"
//! db = "/tmp/"
//! ```
//!
//! The output of each phase is documented in [`mod@crate::report`].

use crate::histogram::Histogram;
use crate::report::PhaseReport;
use crate::stores::{self, StoreOpt};
use crate::workload::{format_key, KeyGenerator, KeyOrder, ValuePool, DEFAULT_SEED, MAX_KEYS};
use crate::*;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use log::{debug, warn};
use quanta::{Clock, Instant};
use serde::{Deserialize, Serialize};
use std::fs::read_to_string;

/// Operations slower than this are logged, in microseconds.
const LONG_OP_MICROS: f64 = 20000.0;

// {{{ benchopt

/// The configuration of a benchmark run.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct BenchOpt {
    /// Comma-separated list of phase names.
    pub benchmarks: String,

    /// Record a latency histogram for each phase.
    ///
    /// Default: false.
    pub histogram: bool,

    /// Print the latency of every operation.
    ///
    /// Default: false.
    pub raw: bool,

    /// The fraction of its size a generated value compresses to, within `[0, 1]`.
    ///
    /// Default: 0.5.
    pub compression_ratio: f64,

    /// Size of the key space. Random keys are drawn from `[0, num_keys)`.
    ///
    /// Default: 50000.
    pub num_keys: usize,

    /// Number of operations in write and mixed phases.
    ///
    /// Default: 50000.
    pub num_ops: usize,

    /// Number of operations in read phases. Falls back to `num_ops`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reads: Option<usize>,

    /// Size of each value in bytes.
    ///
    /// Default: 100.
    pub value_size: usize,

    /// Bracket batches with transactions.
    ///
    /// Default: true.
    pub transaction: bool,

    /// Exclude the cost of opening a transaction from the latency of the operation that follows.
    ///
    /// Default: false.
    pub benchmark_single_op: bool,

    /// Percentage of writes in mixed phases.
    ///
    /// Default: 50.
    pub write_percent: u8,

    /// Operations per transaction in `batch` phases and during the initial load.
    ///
    /// Default: 1024.
    pub batch_size: usize,

    /// The store under test. This section is flattened, so that store options sit next to the
    /// benchmark options.
    #[serde(flatten)]
    pub store: StoreOpt,
}

impl Default for BenchOpt {
    fn default() -> Self {
        Self {
            benchmarks: [
                "fillseq",
                "fillseqsync",
                "fillseqbatch",
                "fillrandom",
                "fillrandsync",
                "fillrandbatch",
                "readrandom",
                "readseq",
                "rwrandom",
                "rwrandsync",
                "rwseq",
                "rwseqsync",
            ]
            .join(","),
            histogram: false,
            raw: false,
            compression_ratio: 0.5,
            num_keys: 50000,
            num_ops: 50000,
            reads: None,
            value_size: 100,
            transaction: true,
            benchmark_single_op: false,
            write_percent: 50,
            batch_size: 1024,
            store: StoreOpt::default(),
        }
    }
}

impl BenchOpt {
    /// Check that the options describe a runnable benchmark.
    pub fn sanity(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.compression_ratio) {
            return Err(Error::config(format!(
                "compression_ratio should be within [0, 1], got {}",
                self.compression_ratio
            )));
        }
        if self.write_percent > 100 {
            return Err(Error::config(format!(
                "write_percent should be at most 100, got {}",
                self.write_percent
            )));
        }
        if self.batch_size == 0 {
            return Err(Error::config("batch_size should be positive"));
        }
        if self.num_keys == 0 {
            return Err(Error::config("num_keys should be positive"));
        }
        // keys are rendered with a fixed number of digits
        for (name, n) in [
            ("num_keys", self.num_keys),
            ("num_ops", self.num_ops),
            ("reads", self.reads()),
        ] {
            if n as u64 > MAX_KEYS {
                return Err(Error::config(format!(
                    "{} should be at most {}, got {}",
                    name, MAX_KEYS, n
                )));
            }
        }
        Ok(())
    }

    /// Number of operations in a read phase.
    pub fn reads(&self) -> usize {
        self.reads.unwrap_or(self.num_ops)
    }

    fn figment() -> Figment {
        Figment::from(Serialized::defaults(Self::default()))
    }

    fn extract(figment: Figment) -> Result<Self> {
        let opt: Self = figment.extract()?;
        opt.sanity()?;
        debug!("Benchmark options: {:?}", opt);
        Ok(opt)
    }

    /// Options from a TOML string on top of the defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Self::extract(Self::figment().merge(Toml::string(text)))
    }

    /// Options from all layers: defaults, the TOML file at `file` if given, environment
    /// variables prefixed with `DBBENCH_`, and finally `overrides`, whose fields are the options
    /// set explicitly by the user.
    pub fn load(file: Option<&str>, overrides: impl Serialize) -> Result<Self> {
        let mut figment = Self::figment();
        if let Some(path) = file {
            let text = read_to_string(path)
                .map_err(|e| Error::config(format!("cannot read {}: {}", path, e)))?;
            figment = figment.merge(Toml::string(&text));
        }
        let figment = figment
            .merge(Env::prefixed("DBBENCH_"))
            .merge(Serialized::defaults(overrides));
        Self::extract(figment)
    }
}

// }}} benchopt

// {{{ phase

/// The operation mix of a phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PhaseKind {
    Fill,
    Read,
    ReadWrite,
}

/// The immutable parameters of one phase, derived from its name and the options.
#[derive(Clone, Debug, PartialEq)]
pub struct Phase {
    pub name: String,
    pub kind: PhaseKind,
    pub order: KeyOrder,
    /// Number of operations.
    pub entries: usize,
    pub value_size: usize,
    /// Operations per batch, 1 unless the name ends with `batch`.
    pub batch_size: usize,
    /// The name ends with `sync`.
    pub sync: bool,
    pub write_percent: u8,
    /// Each batch is bracketed with a transaction.
    pub transaction: bool,
}

impl Phase {
    /// Parse a phase name. Returns `None` if the verb is unknown.
    pub fn parse(name: &str, opt: &BenchOpt) -> Option<Self> {
        let (kind, rest) = if let Some(rest) = name.strip_prefix("fill") {
            (PhaseKind::Fill, rest)
        } else if let Some(rest) = name.strip_prefix("rw") {
            (PhaseKind::ReadWrite, rest)
        } else if let Some(rest) = name.strip_prefix("read") {
            (PhaseKind::Read, rest)
        } else {
            return None;
        };
        let order = if rest.starts_with("seq") {
            KeyOrder::Sequential
        } else {
            KeyOrder::Random
        };
        let batch_size = if name.ends_with("batch") {
            opt.batch_size
        } else {
            1
        };
        let (entries, transaction) = match kind {
            // a transaction around a single read only adds overhead
            PhaseKind::Read => (opt.reads(), opt.transaction && batch_size > 1),
            _ => (opt.num_ops, opt.transaction),
        };
        Some(Self {
            name: name.to_string(),
            kind,
            order,
            entries,
            value_size: opt.value_size,
            batch_size,
            sync: name.ends_with("sync"),
            write_percent: opt.write_percent,
            transaction,
        })
    }

    /// The durability requested from the store for this phase, if the phase writes.
    pub fn sync_mode(&self, wal_enabled: bool) -> Option<SyncMode> {
        match self.kind {
            PhaseKind::Fill if wal_enabled || self.sync => Some(SyncMode::Normal),
            PhaseKind::Fill => Some(SyncMode::Off),
            PhaseKind::ReadWrite if self.sync => Some(SyncMode::Full),
            PhaseKind::ReadWrite => Some(SyncMode::Off),
            PhaseKind::Read => None,
        }
    }

    /// Number of operations in the batch starting at `iter`. The last batch may be short.
    fn batch_len(&self, iter: usize) -> usize {
        self.batch_size.min(self.entries.saturating_sub(iter))
    }
}

// }}} phase

// {{{ bencher

/// The counters of the running phase.
#[derive(Clone, Debug)]
pub struct RunState {
    pub start: Instant,
    pub last_op_finish: Instant,
    /// Key and value bytes written.
    pub bytes: u64,
    /// Completed operations.
    pub done: u64,
    /// Reads that found their key.
    pub found: u64,
    pub message: String,
}

impl RunState {
    fn new(now: Instant) -> Self {
        Self {
            start: now,
            last_op_finish: now,
            bytes: 0,
            done: 0,
            found: 0,
            message: String::new(),
        }
    }
}

/// Where a [`Bencher`] is in its life cycle. Closing consumes the bencher.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Opened,
    Prefilled,
    Running,
    Stopped,
}

/// Drives phases against a store and measures them.
pub struct Bencher {
    opt: BenchOpt,
    store: Box<dyn Store>,
    clock: Clock,
    keys: KeyGenerator,
    values: ValuePool,
    hist: Histogram,
    raw: Vec<f64>,
    state: RunState,
    stage: Stage,
}

impl Bencher {
    /// Open the store named in `opt` and measure with the system's monotonic clock.
    pub fn open(opt: BenchOpt) -> Result<Self> {
        let store = stores::open(&opt.store)?;
        Self::with_store(opt, store, Clock::new())
    }

    /// Measure an already opened store with the given clock.
    pub fn with_store(opt: BenchOpt, store: Box<dyn Store>, clock: Clock) -> Result<Self> {
        opt.sanity()?;
        let keys = KeyGenerator::new(DEFAULT_SEED);
        let values = ValuePool::new(opt.compression_ratio, opt.value_size, DEFAULT_SEED);
        let state = RunState::new(clock.now());
        Ok(Self {
            opt,
            store,
            clock,
            keys,
            values,
            hist: Histogram::new(),
            raw: Vec::new(),
            state,
            stage: Stage::Opened,
        })
    }

    pub fn opt(&self) -> &BenchOpt {
        &self.opt
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn histogram(&self) -> &Histogram {
        &self.hist
    }

    /// Load every key of `[0, num_keys)` in ascending order, unless an existing database is
    /// reused. Nothing is measured.
    pub fn prefill(&mut self) -> Result<()> {
        if self.opt.store.use_existing_db {
            debug!("Reusing existing database, no prefill");
            self.stage = Stage::Prefilled;
            return Ok(());
        }
        debug!("Prefilling {} keys", self.opt.num_keys);
        let n = self.opt.num_keys;
        for iter in (0..n).step_by(self.opt.batch_size) {
            if self.opt.transaction {
                self.store.begin_transaction()?;
            }
            for k in iter..n.min(iter + self.opt.batch_size) {
                let value = self.values.generate(self.opt.value_size);
                self.store.write(&format_key(k as u64), value)?;
            }
            if self.opt.transaction {
                self.store.end_transaction()?;
            }
        }
        self.store.flush()?;
        self.stage = Stage::Prefilled;
        Ok(())
    }

    /// Reset the counters, the histogram and the raw samples, and start the phase clock.
    pub fn start(&mut self) {
        self.state = RunState::new(self.clock.now());
        self.hist.clear();
        self.raw.clear();
        self.stage = Stage::Running;
    }

    /// Account for one finished operation. The latency of an operation is the time since the
    /// previous one finished, or since the phase started for the first one.
    pub fn record_completion(&mut self) {
        if self.opt.histogram || self.opt.raw {
            let now = self.clock.now();
            let micros = now.duration_since(self.state.last_op_finish).as_nanos() as f64 / 1e3;
            if self.opt.histogram {
                self.hist.add(micros);
                if micros > LONG_OP_MICROS {
                    debug!("long op: {:.1} micros", micros);
                }
            }
            if self.opt.raw {
                self.raw.push(micros);
            }
            self.state.last_op_finish = now;
        }
        self.state.done += 1;
    }

    fn write_one(&mut self, phase: &Phase, iter: usize, j: usize) -> Result<()> {
        let key = self.keys.next(phase.order, iter, j, self.opt.num_keys);
        let value = self.values.generate(phase.value_size);
        self.state.bytes += self.store.write(&key, value)? as u64;
        self.record_completion();
        Ok(())
    }

    fn read_one(&mut self, phase: &Phase, iter: usize, j: usize) -> Result<()> {
        let key = self.keys.next(phase.order, iter, j, self.opt.num_keys);
        if self.store.read(&key)?.is_some() {
            self.state.found += 1;
        }
        self.record_completion();
        Ok(())
    }

    /// Write the batch of `phase` that starts at `iter`.
    pub fn write_batch(&mut self, iter: usize, phase: &Phase) -> Result<()> {
        for j in 0..phase.batch_len(iter) {
            self.write_one(phase, iter, j)?;
        }
        Ok(())
    }

    /// Read the batch of `phase` that starts at `iter`. Reads add nothing to the byte count.
    pub fn read_batch(&mut self, iter: usize, phase: &Phase) -> Result<()> {
        for j in 0..phase.batch_len(iter) {
            self.read_one(phase, iter, j)?;
        }
        Ok(())
    }

    /// Run the batch of `phase` that starts at `iter`, choosing between a write and a read for
    /// every item.
    pub fn mixed_batch(&mut self, iter: usize, phase: &Phase) -> Result<()> {
        for j in 0..phase.batch_len(iter) {
            if self.keys.uniform(100) < phase.write_percent as usize {
                self.write_one(phase, iter, j)?;
            } else {
                self.read_one(phase, iter, j)?;
            }
        }
        Ok(())
    }

    /// Run a whole phase and return its report.
    pub fn run_phase(&mut self, phase: &Phase) -> Result<PhaseReport> {
        if let Some(mode) = phase.sync_mode(self.opt.store.wal_enabled) {
            self.store.set_sync(mode)?;
        }
        self.start();
        if phase.kind != PhaseKind::Read && phase.entries != self.opt.num_keys {
            self.state.message = format!("({} ops)", phase.entries);
        }

        for iter in (0..phase.entries).step_by(phase.batch_size) {
            if phase.transaction {
                self.store.begin_transaction()?;
                if self.opt.benchmark_single_op {
                    self.state.last_op_finish = self.clock.now();
                }
            }
            match phase.kind {
                PhaseKind::Fill => self.write_batch(iter, phase)?,
                PhaseKind::Read => self.read_batch(iter, phase)?,
                PhaseKind::ReadWrite => self.mixed_batch(iter, phase)?,
            }
            if phase.transaction {
                self.store.end_transaction()?;
            }
        }

        if phase.kind == PhaseKind::Read {
            self.state.message = format!("({} of {} found)", self.state.found, phase.entries);
        }
        self.store.flush()?;
        Ok(self.stop(&phase.name))
    }

    /// Finish the running phase and build its report.
    pub(crate) fn stop(&mut self, name: &str) -> PhaseReport {
        debug_assert_eq!(self.stage, Stage::Running);
        let elapsed = self.clock.now().duration_since(self.state.start);
        let bytes = self.state.bytes;
        let throughput =
            (bytes > 0).then(|| bytes as f64 / 1048576.0 / elapsed.as_secs_f64().max(1e-9));
        let message = match throughput {
            Some(t) if self.state.message.is_empty() => format!("{:6.1} MB/s", t),
            Some(t) => format!("{:6.1} MB/s {}", t, self.state.message),
            None => self.state.message.clone(),
        };
        self.stage = Stage::Stopped;
        PhaseReport {
            name: name.to_string(),
            elapsed,
            ops: self.state.done,
            bytes,
            found: self.state.found,
            throughput,
            message,
            histogram: self.opt.histogram.then(|| self.hist.clone()),
            raw: self.opt.raw.then(|| std::mem::take(&mut self.raw)),
        }
    }

    /// Prefill, then run every phase listed in `benchmarks`, handing each report to `on_report`.
    pub fn run(&mut self, mut on_report: impl FnMut(&PhaseReport)) -> Result<()> {
        self.prefill()?;
        let benchmarks = self.opt.benchmarks.clone();
        for name in benchmarks.split(',').map(str::trim) {
            if name.is_empty() {
                continue;
            }
            let Some(phase) = Phase::parse(name, &self.opt) else {
                warn!("unknown benchmark '{}'", name);
                continue;
            };
            debug!("Running phase {:?}", phase);
            let report = self.run_phase(&phase)?;
            on_report(&report);
        }
        Ok(())
    }

    /// Close the store.
    pub fn close(self) -> Result<()> {
        self.store.close()
    }
}

// }}} bencher

// {{{ tests

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::memory::MemoryStore;
    use quanta::Mock;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Debug, Default)]
    struct Calls {
        writes: u64,
        reads: u64,
        begins: u64,
        ends: u64,
        flushes: u64,
        syncs: Vec<SyncMode>,
    }

    /// Always succeeds, counts calls, and advances the mock clock by a fixed cost per call.
    struct StubStore {
        calls: Rc<RefCell<Calls>>,
        mock: Arc<Mock>,
        op_cost: Duration,
        txn_cost: Duration,
        fail_writes: bool,
    }

    impl Store for StubStore {
        fn write(&mut self, key: &[u8], value: &[u8]) -> Result<usize> {
            if self.fail_writes {
                return Err(Error::backend("stub write", "disk on fire"));
            }
            self.calls.borrow_mut().writes += 1;
            self.mock.increment(self.op_cost);
            Ok(key.len() + value.len())
        }

        fn read(&mut self, _key: &[u8]) -> Result<Option<usize>> {
            let mut calls = self.calls.borrow_mut();
            calls.reads += 1;
            self.mock.increment(self.op_cost);
            // every other read hits
            Ok((calls.reads % 2 == 0).then_some(100))
        }

        fn begin_transaction(&mut self) -> Result<()> {
            self.calls.borrow_mut().begins += 1;
            self.mock.increment(self.txn_cost);
            Ok(())
        }

        fn end_transaction(&mut self) -> Result<()> {
            self.calls.borrow_mut().ends += 1;
            Ok(())
        }

        fn set_sync(&mut self, mode: SyncMode) -> Result<()> {
            self.calls.borrow_mut().syncs.push(mode);
            Ok(())
        }

        fn flush(&mut self) -> Result<()> {
            self.calls.borrow_mut().flushes += 1;
            Ok(())
        }
    }

    fn small_opt() -> BenchOpt {
        BenchOpt {
            num_keys: 1000,
            num_ops: 1000,
            histogram: true,
            ..Default::default()
        }
    }

    fn stub_bencher(opt: BenchOpt) -> (Bencher, Rc<RefCell<Calls>>) {
        stub_bencher_with(opt, Duration::from_micros(5), Duration::ZERO, false)
    }

    fn stub_bencher_with(
        opt: BenchOpt,
        op_cost: Duration,
        txn_cost: Duration,
        fail_writes: bool,
    ) -> (Bencher, Rc<RefCell<Calls>>) {
        let (clock, mock) = Clock::mock();
        let calls = Rc::new(RefCell::new(Calls::default()));
        let store = StubStore {
            calls: calls.clone(),
            mock,
            op_cost,
            txn_cost,
            fail_writes,
        };
        (Bencher::with_store(opt, Box::new(store), clock).unwrap(), calls)
    }

    fn run(bencher: &mut Bencher, name: &str) -> PhaseReport {
        let phase = Phase::parse(name, bencher.opt()).unwrap();
        bencher.run_phase(&phase).unwrap()
    }

    #[test]
    fn fillseq_records_every_completion() {
        let (mut bencher, calls) = stub_bencher(small_opt());
        let report = run(&mut bencher, "fillseq");
        assert_eq!(report.ops, 1000);
        assert!(report.bytes >= 1000 * 100);
        assert_eq!(report.bytes, 1000 * (16 + 100));
        assert_eq!(report.histogram.as_ref().unwrap().count(), 1000);
        let calls = calls.borrow();
        assert_eq!(calls.writes, 1000);
        assert_eq!(calls.reads, 0);
        // batch size 1, one transaction per write
        assert_eq!(calls.begins, 1000);
        assert_eq!(calls.ends, 1000);
        assert_eq!(calls.flushes, 1);
        assert_eq!(bencher.stage(), Stage::Stopped);
    }

    #[test]
    fn rw_write_percent_bounds() {
        let opt = BenchOpt {
            write_percent: 0,
            ..small_opt()
        };
        let (mut bencher, calls) = stub_bencher(opt);
        let report = run(&mut bencher, "rwrandom");
        assert_eq!(report.ops, 1000);
        assert_eq!(calls.borrow().writes, 0);
        assert_eq!(calls.borrow().reads, 1000);
        assert!(report.throughput.is_none());

        let opt = BenchOpt {
            write_percent: 100,
            ..small_opt()
        };
        let (mut bencher, calls) = stub_bencher(opt);
        run(&mut bencher, "rwseq");
        assert_eq!(calls.borrow().writes, 1000);
        assert_eq!(calls.borrow().reads, 0);
    }

    #[test]
    fn rw_mixes_reads_and_writes() {
        let (mut bencher, calls) = stub_bencher(small_opt());
        let report = run(&mut bencher, "rwrandom");
        let calls = calls.borrow();
        assert_eq!(calls.writes + calls.reads, 1000);
        assert!(calls.writes > 300 && calls.writes < 700);
        assert_eq!(report.bytes, calls.writes * 116);
    }

    #[test]
    fn read_phase_has_no_throughput() {
        let (mut bencher, calls) = stub_bencher(small_opt());
        let report = run(&mut bencher, "readrandom");
        assert_eq!(report.bytes, 0);
        assert!(report.throughput.is_none());
        assert_eq!(report.found, 500);
        assert_eq!(report.message, "(500 of 1000 found)");
        // no batch token, so no transactions around single reads
        assert_eq!(calls.borrow().begins, 0);
        assert!(calls.borrow().syncs.is_empty());
    }

    #[test]
    fn reads_override() {
        let opt = BenchOpt {
            reads: Some(10),
            ..small_opt()
        };
        let (mut bencher, calls) = stub_bencher(opt);
        let report = run(&mut bencher, "readseq");
        assert_eq!(report.ops, 10);
        assert_eq!(calls.borrow().reads, 10);
    }

    #[test]
    fn throughput_is_prepended() {
        let opt = BenchOpt {
            num_ops: 500,
            ..small_opt()
        };
        let (mut bencher, _) = stub_bencher(opt);
        let report = run(&mut bencher, "fillrandom");
        // 500 writes of 116 bytes, 5us each
        let expected = 500.0 * 116.0 / 1048576.0 / 0.0025;
        let t = report.throughput.unwrap();
        assert!((t - expected).abs() < 1e-6);
        assert_eq!(report.message, format!("{:6.1} MB/s (500 ops)", expected));
        assert_eq!(report.elapsed, Duration::from_micros(2500));
    }

    #[test]
    fn phase_names() {
        let opt = BenchOpt::default();

        let p = Phase::parse("fillseq", &opt).unwrap();
        assert_eq!(p.kind, PhaseKind::Fill);
        assert_eq!(p.order, KeyOrder::Sequential);
        assert_eq!(p.batch_size, 1);
        assert!(!p.sync);
        assert!(p.transaction);

        let p = Phase::parse("fillrandsync", &opt).unwrap();
        assert_eq!(p.order, KeyOrder::Random);
        assert!(p.sync);

        let p = Phase::parse("fillseqbatch", &opt).unwrap();
        assert_eq!(p.batch_size, 1024);

        let p = Phase::parse("readrandom", &opt).unwrap();
        assert_eq!(p.kind, PhaseKind::Read);
        assert_eq!(p.order, KeyOrder::Random);
        assert!(!p.transaction);

        let p = Phase::parse("readseqbatch", &opt).unwrap();
        assert!(p.transaction);

        let p = Phase::parse("rwseqsync", &opt).unwrap();
        assert_eq!(p.kind, PhaseKind::ReadWrite);
        assert_eq!(p.order, KeyOrder::Sequential);
        assert!(p.sync);

        assert_eq!(Phase::parse("fill", &opt).unwrap().order, KeyOrder::Random);
        assert!(Phase::parse("scanseq", &opt).is_none());
        assert!(Phase::parse("", &opt).is_none());
    }

    #[test]
    fn sync_modes() {
        let opt = BenchOpt::default();
        let mode = |name: &str, wal: bool| Phase::parse(name, &opt).unwrap().sync_mode(wal);
        assert_eq!(mode("fillseq", true), Some(SyncMode::Normal));
        assert_eq!(mode("fillseq", false), Some(SyncMode::Off));
        assert_eq!(mode("fillseqsync", false), Some(SyncMode::Normal));
        assert_eq!(mode("rwseq", true), Some(SyncMode::Off));
        assert_eq!(mode("rwseqsync", true), Some(SyncMode::Full));
        assert_eq!(mode("readseq", true), None);
    }

    #[test]
    fn batches_are_bracketed_and_clipped() {
        let opt = BenchOpt {
            num_ops: 2500,
            batch_size: 1000,
            ..small_opt()
        };
        let (mut bencher, calls) = stub_bencher(opt);
        let report = run(&mut bencher, "fillseqbatch");
        assert_eq!(report.ops, 2500);
        let calls = calls.borrow();
        assert_eq!(calls.writes, 2500);
        assert_eq!(calls.begins, 3);
        assert_eq!(calls.ends, 3);
    }

    #[test]
    fn no_transaction() {
        let opt = BenchOpt {
            transaction: false,
            ..small_opt()
        };
        let (mut bencher, calls) = stub_bencher(opt);
        run(&mut bencher, "fillseqbatch");
        assert_eq!(calls.borrow().begins, 0);
        assert_eq!(calls.borrow().ends, 0);
    }

    #[test]
    fn inter_operation_latency() {
        let opt = BenchOpt {
            num_ops: 100,
            batch_size: 10,
            ..small_opt()
        };
        let (mut bencher, _) = stub_bencher_with(
            opt.clone(),
            Duration::from_micros(5),
            Duration::from_micros(100),
            false,
        );
        let report = run(&mut bencher, "fillseqbatch");
        let h = report.histogram.unwrap();
        assert_eq!(h.count(), 100);
        assert_eq!(h.min(), 5.0);
        // the first write of each batch carries the cost of opening the transaction
        assert_eq!(h.max(), 105.0);
        assert_eq!(h.sum(), 100.0 * 5.0 + 10.0 * 100.0);

        let opt = BenchOpt {
            benchmark_single_op: true,
            ..opt
        };
        let (mut bencher, _) = stub_bencher_with(
            opt,
            Duration::from_micros(5),
            Duration::from_micros(100),
            false,
        );
        let report = run(&mut bencher, "fillseqbatch");
        let h = report.histogram.unwrap();
        assert_eq!(h.max(), 5.0);
        assert_eq!(h.average(), 5.0);
        assert_eq!(h.standard_deviation(), 0.0);
    }

    #[test]
    fn raw_samples() {
        let opt = BenchOpt {
            num_ops: 20,
            histogram: false,
            raw: true,
            ..small_opt()
        };
        let (mut bencher, _) = stub_bencher(opt);
        let report = run(&mut bencher, "fillrandom");
        assert!(report.histogram.is_none());
        assert_eq!(report.raw.unwrap(), vec![5.0; 20]);
    }

    #[test]
    fn no_instrumentation_still_counts() {
        let opt = BenchOpt {
            histogram: false,
            ..small_opt()
        };
        let (mut bencher, _) = stub_bencher(opt);
        let report = run(&mut bencher, "fillseq");
        assert_eq!(report.ops, 1000);
        assert!(report.histogram.is_none());
        assert!(report.raw.is_none());
        assert!(bencher.histogram().is_empty());
    }

    #[test]
    fn phases_start_from_scratch() {
        let (mut bencher, _) = stub_bencher(small_opt());
        run(&mut bencher, "fillseq");
        let report = run(&mut bencher, "readseq");
        assert_eq!(report.ops, 1000);
        assert_eq!(report.histogram.unwrap().count(), 1000);
        assert_eq!(bencher.state().bytes, 0);
    }

    #[test]
    fn prefill_loads_key_space() {
        let opt = BenchOpt {
            num_keys: 2500,
            batch_size: 1000,
            ..small_opt()
        };
        let (mut bencher, calls) = stub_bencher(opt);
        bencher.prefill().unwrap();
        assert_eq!(bencher.stage(), Stage::Prefilled);
        assert_eq!(calls.borrow().writes, 2500);
        assert_eq!(calls.borrow().begins, 3);
        assert_eq!(bencher.state().done, 0);

        let mut opt = small_opt();
        opt.store.use_existing_db = true;
        let (mut bencher, calls) = stub_bencher(opt);
        bencher.prefill().unwrap();
        assert_eq!(calls.borrow().writes, 0);
    }

    #[test]
    fn unknown_names_are_skipped() {
        let opt = BenchOpt {
            benchmarks: "nosuchphase,,fillseq, readseq".to_string(),
            num_keys: 10,
            num_ops: 10,
            ..Default::default()
        };
        let (mut bencher, _) = stub_bencher(opt);
        let mut names = Vec::new();
        bencher.run(|r| names.push(r.name.clone())).unwrap();
        assert_eq!(names, vec!["fillseq", "readseq"]);
    }

    #[test]
    fn backend_errors_are_fatal() {
        let (mut bencher, _) =
            stub_bencher_with(small_opt(), Duration::ZERO, Duration::ZERO, true);
        let phase = Phase::parse("fillseq", bencher.opt()).unwrap();
        assert!(matches!(
            bencher.run_phase(&phase),
            Err(Error::Backend { .. })
        ));
    }

    #[test]
    fn end_to_end_memory() {
        let _ = env_logger::try_init();
        let opt = BenchOpt {
            benchmarks: "fillseq,fillrandbatch,readrandom,readseq,rwrandom,rwseqsync".to_string(),
            num_keys: 500,
            num_ops: 500,
            batch_size: 64,
            histogram: true,
            ..Default::default()
        };
        let store = MemoryStore::new();
        let observer = store.clone();
        let mut bencher = Bencher::with_store(opt, Box::new(store), Clock::new()).unwrap();
        let mut reports = Vec::new();
        bencher.run(|r| reports.push(r.clone())).unwrap();
        assert_eq!(reports.len(), 6);
        // the prefill loaded every key, so every read hits
        assert_eq!(reports[2].found, 500);
        assert_eq!(reports[3].message, "(500 of 500 found)");
        assert_eq!(observer.len(), 500);
        assert_eq!(
            observer.get(&format_key(499)).map(|v| v.len()),
            Some(100)
        );
        for r in reports.iter() {
            assert_eq!(r.ops, 500);
            assert_eq!(r.histogram.as_ref().unwrap().count(), 500);
        }
        bencher.close().unwrap();
    }

    #[test]
    fn invalid_options_are_errors_not_panics() {
        let opt = BenchOpt {
            batch_size: 0,
            ..small_opt()
        };
        let store = crate::stores::null::NullStore::new();
        assert!(matches!(
            Bencher::with_store(opt, Box::new(store), Clock::new()),
            Err(Error::Config(_))
        ));

        let opt = BenchOpt {
            compression_ratio: -0.5,
            ..small_opt()
        };
        assert!(matches!(Bencher::open(opt), Err(Error::Config(_))));
    }

    #[test]
    fn largest_key_space_is_accepted() {
        let opt = BenchOpt {
            num_keys: MAX_KEYS as usize,
            num_ops: MAX_KEYS as usize,
            ..Default::default()
        };
        assert!(opt.sanity().is_ok());
        assert_eq!(format_key(MAX_KEYS - 1), *b"9999999999999999");
    }

    #[test]
    fn open_registered_store() {
        let opt = BenchOpt {
            benchmarks: "fillseq".to_string(),
            num_keys: 10,
            num_ops: 10,
            ..Default::default()
        };
        let mut bencher = Bencher::open(opt).unwrap();
        assert_eq!(bencher.stage(), Stage::Opened);
        bencher.run(|r| assert_eq!(r.ops, 10)).unwrap();
        bencher.close().unwrap();
    }

    const DEFAULT_PRESET: &str =
        include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/presets/default.toml"));

    const SQLITE_PRESET: &str =
        include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/presets/sqlite.toml"));

    #[test]
    fn default_preset_matches_defaults() {
        assert_eq!(
            BenchOpt::from_toml_str(DEFAULT_PRESET).unwrap(),
            BenchOpt::default()
        );
    }

    #[test]
    fn sqlite_preset() {
        let opt = BenchOpt::from_toml_str(SQLITE_PRESET).unwrap();
        assert_eq!(opt.store.name, "sqlite");
        assert_eq!(opt.store.db, "/tmp/");
        assert!(opt.histogram);
        assert_eq!(opt.reads(), opt.num_ops);
    }

    #[test]
    fn rocksdb_preset() {
        const OPT: &str =
            include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/presets/rocksdb.toml"));
        let opt = BenchOpt::from_toml_str(OPT).unwrap();
        assert_eq!(opt.store.name, "rocksdb");
        assert_eq!(opt.batch_size, 1000);
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let opt = BenchOpt::from_toml_str(
            r#"
            benchmarks = "fillseq"
            reads = 7
            wal_enabled = false
            "#,
        )
        .unwrap();
        assert_eq!(opt.benchmarks, "fillseq");
        assert_eq!(opt.reads(), 7);
        assert!(!opt.store.wal_enabled);
        assert_eq!(opt.num_keys, 50000);
        assert_eq!(opt.store.page_size, 4096);
    }

    #[test]
    fn overrides_win() {
        #[derive(Serialize)]
        struct Flags {
            num_keys: usize,
            store: &'static str,
        }
        let opt = BenchOpt::load(
            None,
            Flags {
                num_keys: 42,
                store: "null",
            },
        )
        .unwrap();
        assert_eq!(opt.num_keys, 42);
        assert_eq!(opt.store.name, "null");
        assert_eq!(opt.value_size, 100);
    }

    #[test]
    fn config_file_is_layered() {
        let tmp_dir = tempfile::tempdir().unwrap();
        let path = tmp_dir.path().join("bench.toml");
        std::fs::write(&path, "num_keys = 10\nnum_ops = 20\n").unwrap();
        #[derive(Serialize)]
        struct Flags {
            num_ops: usize,
        }
        let opt = BenchOpt::load(Some(path.to_str().unwrap()), Flags { num_ops: 30 }).unwrap();
        assert_eq!(opt.num_keys, 10);
        assert_eq!(opt.num_ops, 30);

        let missing = tmp_dir.path().join("missing.toml");
        assert!(matches!(
            BenchOpt::load(Some(missing.to_str().unwrap()), Flags { num_ops: 1 }),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn invalid_options() {
        for text in [
            "compression_ratio = 1.5",
            "write_percent = 101",
            "batch_size = 0",
            "num_keys = 0",
            "num_keys = 10000000000000001",
            "num_ops = 10000000000000001",
            "reads = 10000000000000001",
        ] {
            assert!(
                matches!(BenchOpt::from_toml_str(text), Err(Error::Config(_))),
                "{} should be rejected",
                text
            );
        }
    }

    #[test]
    fn malformed_config() {
        assert!(matches!(
            BenchOpt::from_toml_str("num_keys = \"many\""),
            Err(Error::Config(_))
        ));
    }
}

// }}} tests
