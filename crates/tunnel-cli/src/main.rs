//! discretizer - tunnel discretization from the command line
//!
//! Reads a sphere-chain tunnel, discretizes it into oriented disks and
//! writes one disk per line.

use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::{LevelFilter, Metadata, Record};
use tunnel_discretizer::{
    discretize, discretize_cached, read_pdb_spheres, read_sphere_table, write_disks,
    DiscretizeSettings, JsonFileStore, Termination, Tunnel,
};

#[derive(Parser)]
#[command(name = "discretizer")]
#[command(about = "Discretize a sphere-chain tunnel into oriented disks", long_about = None)]
struct Cli {
    /// Tunnel file
    #[arg(short, long)]
    file: PathBuf,

    /// Input format
    #[arg(long, value_enum, default_value_t = InputFormat::Pdb)]
    format: InputFormat,

    /// Maximum spacing between consecutive disks (overrides the config file)
    #[arg(short, long)]
    delta: Option<f64>,

    /// TOML settings file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Seed for the enclosing-circle shuffle (overrides the config file)
    #[arg(long)]
    seed: Option<u64>,

    /// Directory for cached seed directions
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Copy, ValueEnum)]
enum InputFormat {
    /// PDB `ATOM` records, radius in the occupancy column
    Pdb,
    /// Plain `x y z r` rows
    Table,
}

struct StderrLogger;

static LOGGER: StderrLogger = StderrLogger;

impl log::Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("[{:<5} {}] {}", record.level(), record.target(), record.args());
        }
    }

    fn flush(&self) {}
}

fn init_logger(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}

fn load_settings(cli: &Cli) -> Result<DiscretizeSettings> {
    let mut settings = match &cli.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            DiscretizeSettings::from_toml_str(&text)
                .with_context(|| format!("invalid settings in {}", path.display()))?
        }
        None => DiscretizeSettings::default(),
    };
    if let Some(delta) = cli.delta {
        settings.delta = delta;
    }
    if let Some(seed) = cli.seed {
        settings.shuffle_seed = seed;
    }
    settings.validate()?;
    Ok(settings)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    let settings = load_settings(&cli)?;

    let input = File::open(&cli.file)
        .with_context(|| format!("failed to open {}", cli.file.display()))?;
    let spheres = match cli.format {
        InputFormat::Pdb => read_pdb_spheres(input)?,
        InputFormat::Table => read_sphere_table(input)?,
    };
    let tunnel = Tunnel::new(spheres)
        .with_context(|| format!("invalid tunnel in {}", cli.file.display()))?;
    eprintln!("Tunnel read ({} spheres).", tunnel.len());

    let result = match &cli.cache_dir {
        Some(dir) => discretize_cached(&tunnel, &settings, &JsonFileStore::new(dir))?,
        None => discretize(&tunnel, &settings)?,
    };

    let stats = &result.stats;
    eprintln!(
        "Discretized into {} disks (delta {}).",
        result.disks.len(),
        settings.delta
    );
    eprintln!(
        "  appended {}, replaced {}, sharp turns {}, repair iterations {}, retries {}, pivots {}",
        stats.appended,
        stats.replaced,
        stats.sharp_turns,
        stats.repair_iterations,
        stats.retries,
        stats.pivots
    );
    if let Termination::Aborted(e) = &result.termination {
        eprintln!("warning: stopped early, writing the partial chain: {e}");
    }

    match &cli.output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            write_disks(BufWriter::new(file), &result.disks)?;
            eprintln!("Wrote {}", path.display());
        }
        None => write_disks(io::stdout().lock(), &result.disks)?,
    }

    Ok(())
}
