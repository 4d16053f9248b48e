#[macro_use]
extern crate log;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};

use frag_finder::config::AnalysisConfig;
use frag_finder::index::{IndexMeta, ReadIndex, Weighting};
use frag_finder::io::reads::load_reads;
use frag_finder::io::tsv;
use frag_finder::peak::{PeakParams, Signal, DEFAULT_PERMUTATIONS, DEFAULT_SEED};
use frag_finder::pipeline::{spawn_batch, Event, INDEX_EXTENSION};
use frag_finder::store::SequenceStore;
use frag_finder::util::alphabet::{Alphabet, Ambiguity, DEFAULT_SYMBOLS};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[derive(Parser, Debug)]
#[command(
    name = "frag-finder",
    author,
    version,
    about = "Locate enriched RNA fragment peaks on reference RNAs",
    arg_required_else_help = true
)]
struct Cli {
    /// Increase log verbosity (repeatable)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,
    /// Prepend log entries with a timestamp (none, sec, ms, us, ns)
    #[arg(long, value_name = "GRANULARITY", default_value = "none", global = true)]
    timestamp: stderrlog::Timestamp,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build a read index (.rfx) from a sequencing file
    Index {
        /// Reads file (FASTA, FASTQ or `sequence<TAB>count`)
        reads: PathBuf,
        /// Output path (default: <reads>.rfx)
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[command(flatten)]
        alphabet: AlphabetArgs,
        #[arg(long, value_enum, default_value_t = WeightingArg::Multiplicity)]
        weighting: WeightingArg,
    },
    /// Map reads against the reference database and report peaks
    Run {
        /// Reference FASTA (e.g. miRNA precursors)
        #[arg(short = 'd', long = "db")]
        db: PathBuf,
        /// Reads files or .rfx indexes
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        /// Directory for the `<reads>(<db>).tsv` files
        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,
        #[command(flatten)]
        alphabet: AlphabetArgs,
        #[command(flatten)]
        opts: RunArgs,
    },
}

#[derive(Args, Debug)]
struct AlphabetArgs {
    /// Recognized symbols
    #[arg(long, default_value = "ACGTUN")]
    symbols: String,
    /// Keep U and T distinct
    #[arg(long)]
    no_fold_uracil: bool,
    /// Let N in a reference break every match
    #[arg(long)]
    n_barrier: bool,
}

impl AlphabetArgs {
    fn build(&self) -> Result<Alphabet> {
        let symbols = if self.symbols.is_empty() {
            DEFAULT_SYMBOLS
        } else {
            self.symbols.as_bytes()
        };
        let ambiguity = if self.n_barrier {
            Ambiguity::Barrier
        } else {
            Ambiguity::Literal
        };
        Ok(Alphabet::new(symbols, !self.no_fold_uracil, ambiguity)?)
    }
}

#[derive(Args, Debug)]
struct RunArgs {
    #[arg(long, default_value_t = 1)]
    min_height: u64,
    #[arg(long, default_value_t = 18)]
    min_distance: usize,
    /// Half-width of the local-maximum window
    #[arg(long, default_value_t = 1)]
    neighborhood: usize,
    /// Boundary expansion keeps positions >= fraction x apex height
    #[arg(long, default_value_t = 0.5)]
    expand_fraction: f64,
    /// Max positions added on each side of an apex
    #[arg(long, default_value_t = 10)]
    max_extension: usize,
    /// Expand without a positional limit
    #[arg(long, conflicts_with = "max_extension")]
    unlimited_extension: bool,
    #[arg(long, value_enum, default_value_t = SignalArg::Starts)]
    signal: SignalArg,
    /// Drop apexes whose prominence is below this many standard deviations of the signal
    #[arg(long, default_value_t = 0.85)]
    min_prominence_sd: f64,
    /// Keep every apex regardless of prominence
    #[arg(long, conflicts_with = "min_prominence_sd")]
    no_prominence: bool,
    /// Drop peaks below this RPM
    #[arg(long)]
    min_rpm: Option<f64>,
    #[arg(short = 'n', long, default_value_t = DEFAULT_PERMUTATIONS)]
    permutations: usize,
    #[arg(long, default_value_t = DEFAULT_SEED)]
    seed: u64,
    #[arg(long, value_enum, default_value_t = WeightingArg::Multiplicity)]
    weighting: WeightingArg,
    /// Worker threads (0 = all cores)
    #[arg(short = 't', long = "threads", default_value_t = 0)]
    threads: usize,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum WeightingArg {
    Multiplicity,
    Distinct,
}

impl From<WeightingArg> for Weighting {
    fn from(w: WeightingArg) -> Self {
        match w {
            WeightingArg::Multiplicity => Weighting::Multiplicity,
            WeightingArg::Distinct => Weighting::Distinct,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum SignalArg {
    Starts,
    Depth,
}

impl From<SignalArg> for Signal {
    fn from(s: SignalArg) -> Self {
        match s {
            SignalArg::Starts => Signal::Starts,
            SignalArg::Depth => Signal::Depth,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    stderrlog::new()
        .quiet(cli.quiet)
        .verbosity(2 + cli.verbose as usize)
        .timestamp(cli.timestamp)
        .init()
        .context("cannot initialize logging")?;

    match cli.command {
        Commands::Index {
            reads,
            output,
            alphabet,
            weighting,
        } => run_index(&reads, output, &alphabet, weighting.into()),
        Commands::Run {
            db,
            inputs,
            out_dir,
            alphabet,
            opts,
        } => {
            let config = AnalysisConfig {
                alphabet: alphabet.build()?,
                weighting: opts.weighting.into(),
                peak: PeakParams {
                    min_height: opts.min_height,
                    min_distance: opts.min_distance,
                    neighborhood: opts.neighborhood,
                    expand_fraction: opts.expand_fraction,
                    max_extension: (!opts.unlimited_extension).then_some(opts.max_extension),
                    min_prominence_sd: (!opts.no_prominence).then_some(opts.min_prominence_sd),
                    signal: opts.signal.into(),
                },
                min_rpm: opts.min_rpm,
                permutations: opts.permutations,
                seed: opts.seed,
                threads: opts.threads,
            };
            run_analysis(&db, inputs, &out_dir, config)
        }
    }
}

fn run_index(reads: &Path, output: Option<PathBuf>, alphabet: &AlphabetArgs, weighting: Weighting) -> Result<()> {
    let alphabet = alphabet.build()?;
    let set = load_reads(reads, &alphabet)
        .with_context(|| format!("cannot load reads from '{}'", reads.display()))?;

    info!("reads: {}", reads.display());
    info!("distinct: {}", set.len());
    info!("total: {}", set.total_reads());

    let mut index = ReadIndex::build(set, &alphabet, weighting)?;
    index.set_meta(IndexMeta {
        reads_file: Some(reads.display().to_string()),
        build_args: Some(std::env::args().collect::<Vec<_>>().join(" ")),
        build_timestamp: Some(chrono::Utc::now().to_rfc3339()),
        weighting,
    });

    let out_path = output.unwrap_or_else(|| reads.with_extension(INDEX_EXTENSION));
    let out_str = out_path.to_string_lossy();
    index
        .save_to_file(&out_str)
        .with_context(|| format!("cannot write index to '{}'", out_str))?;
    info!(
        "Read index saved: {} ({} automaton states)",
        out_str,
        index.automaton.n_states()
    );
    Ok(())
}

fn run_analysis(db: &Path, inputs: Vec<PathBuf>, out_dir: &Path, config: AnalysisConfig) -> Result<()> {
    config.validate()?;
    let references = SequenceStore::from_path(&config.alphabet, db)
        .with_context(|| format!("cannot load reference database '{}'", db.display()))?;
    info!(
        "{} references ({} bases) from {}",
        references.len(),
        references.total_bases(),
        db.display()
    );
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("cannot create output directory '{}'", out_dir.display()))?;

    let n_files = inputs.len();
    let handle = spawn_batch(references, inputs, config);
    for ev in handle.events().iter() {
        match ev {
            Event::FileStarted { file, path } => {
                info!("[{}/{}] {}", file + 1, n_files, path.display());
            }
            Event::IndexReady {
                distinct_reads,
                total_reads,
                states,
                ..
            } => debug!(
                "{} distinct reads, {} total, {} automaton states",
                distinct_reads, total_reads, states
            ),
            Event::ReferenceDone { done, total, .. } => {
                trace!("references done: {}/{}", done, total);
            }
            Event::FileFinished { .. } | Event::FileFailed { .. } => {}
        }
    }
    let reports = handle.join()?;

    let mut failed = 0usize;
    for report in reports {
        match report.result {
            Ok(rows) => {
                let out_path = out_dir.join(tsv::output_file_name(&report.path, db));
                let fh = std::fs::File::create(&out_path)
                    .with_context(|| format!("cannot create '{}'", out_path.display()))?;
                tsv::write_records(std::io::BufWriter::new(fh), &rows)
                    .with_context(|| format!("cannot write '{}'", out_path.display()))?;
                info!("{} peaks -> {}", rows.len(), out_path.display());
            }
            Err(_) => failed += 1,
        }
    }
    if failed > 0 {
        anyhow::bail!("{} of {} input file(s) failed", failed, n_files);
    }
    Ok(())
}
