use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use seen_core::{
    classify, snapshot, FilterConfig, FilterMode, FlowKey, MultiHashBloomFilter, Outcome, Packet,
};

#[derive(Parser)]
#[command(name = "seen", about = "Packet de-duplication bloom filter")]
struct Cli {
    /// Debug-level logs on stderr
    #[arg(long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(ValueEnum, Clone, Copy)]
enum CliMode {
    Insert,
    Query,
}

impl From<CliMode> for FilterMode {
    fn from(m: CliMode) -> Self {
        match m {
            CliMode::Insert => FilterMode::Insert,
            CliMode::Query => FilterMode::Query,
        }
    }
}

#[derive(Subcommand)]
enum Cmd {
    /// Create an empty filter snapshot
    Init {
        #[arg(long)]
        snapshot: PathBuf,
        /// JSON file with num_entries / num_hashes
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        num_entries: Option<usize>,
        #[arg(long)]
        num_hashes: Option<usize>,
        /// Overwrite an existing snapshot
        #[arg(long, default_value_t = false)]
        force: bool,
    },

    Insert {
        #[arg(long)]
        snapshot: PathBuf,
        #[arg(long, value_name = "SPORT:DPORT", num_args = 1.., value_delimiter = ',', required = true)]
        key: Vec<String>,
    },

    Query {
        #[arg(long)]
        snapshot: PathBuf,
        #[arg(long, value_name = "SPORT:DPORT")]
        key: String,
    },

    /// Run insert or query, selected by --mode
    Apply {
        #[arg(long)]
        snapshot: PathBuf,
        #[arg(long, value_enum)]
        mode: CliMode,
        #[arg(long, value_name = "SPORT:DPORT")]
        key: String,
    },

    /// Classify newline-delimited JSON packets (stdin when --input is absent)
    Classify {
        #[arg(long)]
        snapshot: PathBuf,
        #[arg(long)]
        input: Option<PathBuf>,
    },

    Reset {
        #[arg(long)]
        snapshot: PathBuf,
    },

    /// OR other snapshots into this one
    Merge {
        #[arg(long)]
        snapshot: PathBuf,
        #[arg(long, value_name = "PATH", num_args = 1.., value_delimiter = ',', required = true)]
        from: Vec<PathBuf>,
    },

    /// Print the per-array indices of a key
    Indices {
        #[arg(long)]
        snapshot: PathBuf,
        #[arg(long, value_name = "SPORT:DPORT")]
        key: String,
    },

    Info {
        #[arg(long)]
        snapshot: PathBuf,
    },
}

fn init_tracing(verbose: bool) {
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .init();
}

fn parse_key(s: &str) -> Result<FlowKey> {
    s.parse::<FlowKey>().map_err(|e| anyhow!("{e}"))
}

fn open_filter(path: &Path) -> Result<MultiHashBloomFilter> {
    snapshot::load(path).with_context(|| format!("loading {}", path.display()))
}

fn store_filter(filter: &MultiHashBloomFilter, path: &Path) -> Result<()> {
    snapshot::save(filter, path).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

fn resolve_config(
    config: Option<&Path>,
    num_entries: Option<usize>,
    num_hashes: Option<usize>,
) -> Result<FilterConfig> {
    let mut cfg = match config {
        Some(p) => FilterConfig::load(p).with_context(|| format!("config {}", p.display()))?,
        None => FilterConfig::default(),
    };
    if let Some(n) = num_entries {
        cfg.num_entries = n;
    }
    if let Some(k) = num_hashes {
        cfg.num_hashes = k;
    }
    cfg.validate()?;
    Ok(cfg)
}

fn render_member(member: bool) -> &'static str {
    if member { "member" } else { "new" }
}

fn run_classify(filter: &mut MultiHashBloomFilter, input: Option<&Path>) -> Result<usize> {
    let reader: Box<dyn BufRead> = match input {
        Some(p) => Box::new(BufReader::new(
            File::open(p).with_context(|| format!("opening {}", p.display()))?,
        )),
        None => Box::new(BufReader::new(io::stdin())),
    };
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut n = 0usize;
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let packet = Packet::from_json(&line)
            .with_context(|| format!("line {}: invalid packet", lineno + 1))?;
        let c = classify(filter, &packet);
        writeln!(out, "{}", serde_json::to_string(&c)?)?;
        n += 1;
    }
    Ok(n)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match cli.cmd {
        Cmd::Init { snapshot, config, num_entries, num_hashes, force } => {
            if snapshot.exists() && !force {
                bail!("{} already exists (use --force)", snapshot.display());
            }
            let cfg = resolve_config(config.as_deref(), num_entries, num_hashes)?;
            let filter = MultiHashBloomFilter::new(cfg)?;
            store_filter(&filter, &snapshot)?;
            println!(
                "init: {} (k={}, n={})",
                snapshot.display(),
                cfg.num_hashes,
                cfg.num_entries
            );
        }
        Cmd::Insert { snapshot, key } => {
            let keys = key.iter().map(|k| parse_key(k)).collect::<Result<Vec<_>>>()?;
            let mut filter = open_filter(&snapshot)?;
            for k in &keys {
                filter.insert(k);
            }
            store_filter(&filter, &snapshot)?;
            println!("inserted: {}", keys.len());
        }
        Cmd::Query { snapshot, key } => {
            let k = parse_key(&key)?;
            let filter = open_filter(&snapshot)?;
            println!("{k}: {}", render_member(filter.query(&k)));
        }
        Cmd::Apply { snapshot, mode, key } => {
            let k = parse_key(&key)?;
            let mut filter = open_filter(&snapshot)?;
            match filter.apply(mode.into(), &k) {
                Outcome::Inserted => {
                    store_filter(&filter, &snapshot)?;
                    println!("{k}: inserted");
                }
                Outcome::Queried { member } => println!("{k}: {}", render_member(member)),
            }
        }
        Cmd::Classify { snapshot, input } => {
            let mut filter = open_filter(&snapshot)?;
            let before = filter.count_ones();
            // lines before a bad one were already applied and printed; keep them
            let res = run_classify(&mut filter, input.as_deref());
            if filter.count_ones() != before {
                store_filter(&filter, &snapshot)?;
            }
            let n = res?;
            tracing::info!(packets = n, "classify done");
        }
        Cmd::Reset { snapshot } => {
            let mut filter = open_filter(&snapshot)?;
            filter.reset();
            store_filter(&filter, &snapshot)?;
            println!("reset: {}", snapshot.display());
        }
        Cmd::Merge { snapshot, from } => {
            let mut filter = open_filter(&snapshot)?;
            for p in &from {
                let other = open_filter(p)?;
                filter
                    .merge(&other)
                    .with_context(|| format!("merging {}", p.display()))?;
            }
            store_filter(&filter, &snapshot)?;
            println!("merge: {} snapshot(s) into {}", from.len(), snapshot.display());
        }
        Cmd::Indices { snapshot, key } => {
            let k = parse_key(&key)?;
            let filter = open_filter(&snapshot)?;
            let idx = filter.compute_indices(&k);
            println!("{k}: {idx:?}");
        }
        Cmd::Info { snapshot } => {
            let filter = open_filter(&snapshot)?;
            println!("k: {}", filter.num_hashes());
            println!("n: {}", filter.num_entries());
            for (i, ones) in filter.ones_per_array().iter().enumerate() {
                println!("array[{i}]: {ones} set");
            }
            println!("fill: {:.4}", filter.fill_ratio());
            println!("fpr: {:.6}", filter.estimated_false_positive_rate());
        }
    }
    Ok(())
}
