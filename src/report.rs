//! Rendering of benchmark results.
//!
//! ## Output Format
//!
//! All output is plain text. Before the first phase, a header describing the machine and the
//! workload is printed to stderr. After each phase, a summary line is printed to stderr:
//!
//! ```txt
//! fillseq      :       3.210 micros/op;   36.1 MB/s (100000 ops)
//! ```
//!
//! The general format is `<name> : <us> micros/op; [<t> MB/s] [<annotation>]`, where `<us>` is the
//! wall time of the phase divided by the number of operations, `<t>` is the amount of key and
//! value bytes written per second (absent for phases that only read), and the annotation carries
//! extra facts such as the real number of operations or how many reads found their key.
//!
//! When `histogram` is enabled, the summary is followed by the latency histogram of the phase:
//!
//! ```txt
//! Microseconds per op:
//! Count: 1000  Average: 3.2100  StdDev: 1.05
//! Min: 1.0000  Median: 2.8710  Max: 43.0000
//! 50th: 2.8710  90th: 4.5000  99th: 9.3000
//! ------------------------------------------------------
//! [       2,       3 )     524  52.400%  52.400% ##########
//! [       3,       4 )     301  30.100%  82.500% ######
//! ...
//! ```
//!
//! Each bucket row shows the bucket range, the number of operations in it, their share of all
//! operations, the cumulative share, and a bar of hash marks (20 marks for 100%).
//!
//! When `raw` is enabled, the latency of every operation is printed to stdout, one value in
//! microseconds per line.

use crate::bench::BenchOpt;
use crate::histogram::{bucket_left, Histogram, BUCKET_LIMITS};
use crate::workload::KEY_LEN;
use std::fmt;
use std::fs::read_to_string;
use std::io::Write;
use std::time::Duration;

const DIVIDER: &str = "------------------------------------------------------";

/// The results of one finished phase.
#[derive(Clone, Debug)]
pub struct PhaseReport {
    /// Name of the phase, as given in the benchmark list.
    pub name: String,
    /// Wall time from the start of the phase to its end.
    pub elapsed: Duration,
    /// Number of completed operations.
    pub ops: u64,
    /// Key and value bytes written.
    pub bytes: u64,
    /// Reads that found their key.
    pub found: u64,
    /// Write throughput in MB/s, if anything was written.
    pub throughput: Option<f64>,
    /// Free-form annotation, including the throughput when present.
    pub message: String,
    /// Latency histogram in microseconds, if recorded.
    pub histogram: Option<Histogram>,
    /// Latency of every operation in microseconds, if recorded.
    pub raw: Option<Vec<f64>>,
}

impl PhaseReport {
    /// Wall time per operation in microseconds. A phase without operations counts as one.
    pub fn micros_per_op(&self) -> f64 {
        self.elapsed.as_secs_f64() * 1e6 / self.ops.max(1) as f64
    }
}

/// The one-line summary of a phase.
pub fn summary_line(report: &PhaseReport) -> String {
    format!(
        "{:<12} : {:11.3} micros/op;{}{}",
        report.name,
        report.micros_per_op(),
        if report.message.is_empty() { "" } else { " " },
        report.message,
    )
}

/// Bucket-by-bucket rendering of a histogram, see the module documentation for the format.
pub fn format_histogram(h: &Histogram) -> String {
    let mut r = String::new();
    r.push_str(&format!(
        "Count: {}  Average: {:.4}  StdDev: {:.2}\n",
        h.count(),
        h.average(),
        h.standard_deviation()
    ));
    r.push_str(&format!(
        "Min: {:.4}  Median: {:.4}  Max: {:.4}\n",
        if h.is_empty() { 0.0 } else { h.min() },
        h.median(),
        h.max()
    ));
    r.push_str(&format!(
        "50th: {:.4}  90th: {:.4}  99th: {:.4}\n",
        h.percentile(50.0),
        h.percentile(90.0),
        h.percentile(99.0)
    ));
    r.push_str(DIVIDER);
    r.push('\n');

    let count = h.count() as f64;
    let mult = 100.0 / count;
    let mut sum = 0u64;
    for (b, &n) in h.buckets().iter().enumerate() {
        if n == 0 {
            continue;
        }
        sum += n;
        let marks = (20.0 * n as f64 / count).round() as usize;
        r.push_str(&format!(
            "[ {:7.0}, {:7.0} ) {:7} {:7.3}% {:7.3}% {}\n",
            bucket_left(b),
            BUCKET_LIMITS[b],
            n,
            mult * n as f64,
            mult * sum as f64,
            "#".repeat(marks)
        ));
    }
    r
}

impl fmt::Display for Histogram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_histogram(self))
    }
}

/// Raw latencies, one per line.
pub fn format_raw(raw: &[f64]) -> String {
    let mut r = String::with_capacity(raw.len() * 8);
    for us in raw {
        r.push_str(&format!("{:.3}\n", us));
    }
    r
}

/// Print a phase report: the summary and the histogram to stderr, the raw latencies to stdout.
pub fn print(report: &PhaseReport) {
    eprintln!("{}", summary_line(report));
    if let Some(ref raw) = report.raw {
        print!("{}", format_raw(raw));
    }
    if let Some(ref h) = report.histogram {
        eprintln!("Microseconds per op:\n{}", format_histogram(h));
    }
    let _ = std::io::stdout().flush();
    let _ = std::io::stderr().flush();
}

/// CPU description extracted from the content of `/proc/cpuinfo`.
#[derive(Debug, Default, PartialEq)]
pub struct CpuInfo {
    pub count: usize,
    pub model: String,
    pub cache: String,
}

pub fn parse_cpuinfo(text: &str) -> CpuInfo {
    let mut info = CpuInfo::default();
    for line in text.lines() {
        let Some((key, val)) = line.split_once(':') else {
            continue;
        };
        match key.trim() {
            "model name" => {
                info.count += 1;
                info.model = val.trim().to_string();
            }
            "cache size" => info.cache = val.trim().to_string(),
            _ => {}
        }
    }
    info
}

/// The header printed before the first phase.
pub fn header(opt: &BenchOpt) -> String {
    let mut r = String::new();
    r.push_str(&format!(
        "dbbench:    version {}\n",
        env!("CARGO_PKG_VERSION")
    ));
    r.push_str(&format!("Store:      {}\n", opt.store.name));
    if let Ok(text) = read_to_string("/proc/cpuinfo") {
        let cpu = parse_cpuinfo(&text);
        r.push_str(&format!("CPU:        {} * {}\n", cpu.count, cpu.model));
        r.push_str(&format!("CPUCache:   {}\n", cpu.cache));
    }
    r.push_str(&format!("Keys:       {} bytes each\n", KEY_LEN));
    r.push_str(&format!("Values:     {} bytes each\n", opt.value_size));
    r.push_str(&format!("Entries:    {}\n", opt.num_keys));
    r.push_str(&format!(
        "RawSize:    {:.1} MB (estimated)\n",
        ((KEY_LEN + opt.value_size) * opt.num_keys) as f64 / 1048576.0
    ));
    if cfg!(debug_assertions) {
        r.push_str("WARNING: Assertions are enabled; benchmarks unnecessarily slow\n");
    }
    r.push_str(DIVIDER);
    r.push('\n');
    r
}
