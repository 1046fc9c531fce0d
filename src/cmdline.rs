use crate::bench::{BenchOpt, Bencher};
use crate::report;
use crate::stores::registered;
use crate::*;
use clap::error::ErrorKind;
use clap::ValueHint::{DirPath, FilePath};
use clap::Parser;
use log::debug;
use serde::Serialize;

fn parse_flag(s: &str) -> std::result::Result<bool, String> {
    match s {
        "0" | "false" => Ok(false),
        "1" | "true" => Ok(true),
        _ => Err(format!("expected 0 or 1, got '{}'", s)),
    }
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// Every option left unset keeps the value of the lower layers (file, environment, defaults), so
/// the fields are serialized only when given.
#[derive(Parser, Serialize, Debug)]
#[command(version, about)]
struct Cli {
    #[arg(long, value_hint = FilePath)]
    #[arg(help = "Path to a TOML config file")]
    #[serde(skip)]
    config: Option<String>,

    #[arg(long)]
    #[arg(help = "List all registered key-value stores and exit")]
    #[serde(skip)]
    list: bool,

    #[arg(long = "print_config")]
    #[arg(help = "Print the effective configuration as TOML and exit")]
    #[serde(skip)]
    print_config: bool,

    #[arg(long, value_name = "BENCH,...")]
    #[arg(help = "Comma-separated list of phases, e.g. fillseq,readrandom")]
    #[serde(skip_serializing_if = "Option::is_none")]
    benchmarks: Option<String>,

    #[arg(long, value_parser = parse_flag, value_name = "{0,1}")]
    #[arg(help = "Record a latency histogram")]
    #[serde(skip_serializing_if = "Option::is_none")]
    histogram: Option<bool>,

    #[arg(long, value_parser = parse_flag, value_name = "{0,1}")]
    #[arg(help = "Print the latency of every operation to stdout")]
    #[serde(skip_serializing_if = "Option::is_none")]
    raw: Option<bool>,

    #[arg(long = "compression_ratio")]
    #[arg(help = "Compression ratio of generated values, within [0, 1]")]
    #[serde(skip_serializing_if = "Option::is_none")]
    compression_ratio: Option<f64>,

    #[arg(long = "use_existing_db", value_parser = parse_flag, value_name = "{0,1}")]
    #[arg(help = "Keep the database of an earlier run and skip the initial load")]
    #[serde(skip_serializing_if = "Option::is_none")]
    use_existing_db: Option<bool>,

    #[arg(long = "num_keys")]
    #[arg(help = "Number of keys")]
    #[serde(skip_serializing_if = "Option::is_none")]
    num_keys: Option<usize>,

    #[arg(long = "num_ops")]
    #[arg(help = "Number of operations in write and mixed phases")]
    #[serde(skip_serializing_if = "Option::is_none")]
    num_ops: Option<usize>,

    #[arg(long)]
    #[arg(help = "Number of operations in read phases")]
    #[serde(skip_serializing_if = "Option::is_none")]
    reads: Option<usize>,

    #[arg(long = "value_size")]
    #[arg(help = "Value size in bytes")]
    #[serde(skip_serializing_if = "Option::is_none")]
    value_size: Option<usize>,

    #[arg(long = "no_transaction")]
    #[arg(help = "Do not bracket batches with transactions")]
    #[serde(skip)]
    no_transaction: bool,

    #[arg(long = "benchmark_single_op")]
    #[arg(help = "Measure individual operations, not transactions")]
    #[serde(skip_serializing_if = "is_false")]
    benchmark_single_op: bool,

    #[arg(long = "page_size")]
    #[arg(help = "Page size in bytes")]
    #[serde(skip_serializing_if = "Option::is_none")]
    page_size: Option<usize>,

    #[arg(long = "num_pages")]
    #[arg(help = "Number of pages in the page cache")]
    #[serde(skip_serializing_if = "Option::is_none")]
    num_pages: Option<usize>,

    #[arg(long = "WAL_enabled", value_parser = parse_flag, value_name = "{0,1}")]
    #[arg(help = "Enable the write-ahead log")]
    #[serde(skip_serializing_if = "Option::is_none")]
    wal_enabled: Option<bool>,

    #[arg(long = "checkpoint_granularity")]
    #[arg(help = "Write-ahead log pages between checkpoints")]
    #[serde(skip_serializing_if = "Option::is_none")]
    checkpoint_granularity: Option<usize>,

    #[arg(long = "write_percent")]
    #[arg(help = "Percentage of writes in rw phases")]
    #[serde(skip_serializing_if = "Option::is_none")]
    write_percent: Option<u8>,

    #[arg(long = "mmap_size_mb")]
    #[arg(help = "Size of the memory region for mmap I/O, in MB")]
    #[serde(skip_serializing_if = "Option::is_none")]
    mmap_size_mb: Option<usize>,

    #[arg(long = "batch_size")]
    #[arg(help = "Operations per transaction in batch phases")]
    #[serde(skip_serializing_if = "Option::is_none")]
    batch_size: Option<usize>,

    #[arg(long, value_hint = DirPath)]
    #[arg(help = "Directory in which databases are created")]
    #[serde(skip_serializing_if = "Option::is_none")]
    db: Option<String>,

    #[arg(long, value_hint = FilePath)]
    #[arg(help = "Extension to load into the store")]
    #[serde(skip_serializing_if = "Option::is_none")]
    extension: Option<String>,

    #[arg(long)]
    #[arg(help = "Name of the registered store to benchmark")]
    #[serde(skip_serializing_if = "Option::is_none")]
    store: Option<String>,
}

/// The options given on the command line, as the top configuration layer.
#[derive(Serialize)]
struct Overrides<'a> {
    #[serde(flatten)]
    cli: &'a Cli,

    #[serde(skip_serializing_if = "Option::is_none")]
    transaction: Option<bool>,
}

impl<'a> From<&'a Cli> for Overrides<'a> {
    fn from(cli: &'a Cli) -> Self {
        Self {
            cli,
            transaction: cli.no_transaction.then_some(false),
        }
    }
}

fn load(cli: &Cli) -> Result<BenchOpt> {
    BenchOpt::load(cli.config.as_deref(), Overrides::from(cli))
}

fn bench_cli(cli: &Cli) -> Result<()> {
    let opt = load(cli)?;
    if cli.print_config {
        let text = toml::to_string_pretty(&opt).map_err(|e| Error::config(e.to_string()))?;
        print!("{}", text);
        return Ok(());
    }
    eprint!("{}", report::header(&opt));
    let mut bencher = Bencher::open(opt)?;
    bencher.run(report::print)?;
    bencher.close()
}

fn list_cli() {
    for name in registered() {
        println!("Registered store: {}", name);
    }
}

/// The default command line interface.
///
/// This function is public and can be called in a different crate. For example, one can integrate
/// their own key-value stores by registering the constructor function. Then, adding this function
/// will produce a benchmark binary that has the same usage as the one in this crate.
///
/// ## Usage
///
/// To get the usage of the command line interface, users can run:
///
/// ```bash
/// dbbench --help
/// ```
///
/// A typical run sets the phases, the store and the size of the workload:
///
/// ```bash
/// dbbench --store=sqlite --db=/tmp/ --benchmarks=fillseq,readrandom --num_keys=100000 --histogram=1
/// ```
///
/// Every option can also be given in a TOML file with `--config=<FILE>`, or as an environment
/// variable prefixed with `DBBENCH_`. Flags take precedence over environment variables, which take
/// precedence over the file. The format of the file and the benchmark names are documented in
/// [`mod@crate::bench`]. With `--print_config`, the effective configuration is printed in the same
/// format instead of running the benchmark.
///
/// `--list` prints the names of all registered stores.
///
/// The header and the phase summaries go to stderr, the raw latencies (`--raw=1`) go to stdout.
/// The process exits with status 1 on an invalid flag or any store error.
pub fn cmdline() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => match e.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => e.exit(),
            _ => {
                let _ = e.print();
                std::process::exit(1);
            }
        },
    };
    debug!("Starting dbbench with args: {:?}", cli);
    if cli.list {
        list_cli();
        return;
    }
    if let Err(e) = bench_cli(&cli) {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
