//! Runs one Magnifier simulation over an input trace.
//!
//! CLI surface grounded on `original_source/simulations/simulation.py`'s
//! argparse block; `CliArgs`/`main` shape grounded on
//! `jonasbb-DNS-Applayer-DDoS-Protection`'s
//! `crates/netflow/src/bin/netflow-aggregate.rs`
//! (`color_eyre::install()?; env_logger::init();` plus a single
//! `clap::Parser` struct).

#![deny(unused_import_braces, unused_qualifications)]

use std::path::PathBuf;

use color_eyre::eyre::{bail, Context as _, ContextCompat as _, Result};
use magnifier_core::ip::Prefix;
use magnifier_core::mapper::IngressMapper;
use magnifier_core::store::WindowBoundary;
use magnifier_sim::csv_source::CsvPacketSource;
use magnifier_sim::driver::{IterationOutcome, SimulationDriver, SimulationDriverConfig};
use magnifier_sim::output::OutputWriter;

const VALID_BORDER_COUNTS: &[u16] = &[2, 4, 8, 16, 32, 64, 128, 256, 512, 1024];

/// Drive one Magnifier (or Everflow) simulation run over a packet trace and
/// write per-iteration accuracy metrics to a CSV file.
#[derive(Debug, clap::Parser)]
struct CliArgs {
    /// Path to the input trace CSV.
    #[clap(short = 'p', long, default_value = "simulation_input.csv")]
    pkts: PathBuf,

    /// Path to the output metrics CSV.
    #[clap(short = 'o', long, default_value = "test_run.csv")]
    outfile: PathBuf,

    /// Sampling frequency: one in every `frequency` packets per ingress.
    #[clap(short = 'f', long, default_value_t = 1024)]
    frequency: usize,

    /// Window duration in seconds, when packets-per-second windowing is
    /// not requested via `--pps`.
    #[clap(short = 'd', long, default_value_t = 30)]
    duration: u64,

    /// Fixed packet count per window; `-1` uses real-time windowing
    /// (`--duration`) instead.
    #[clap(short = 'P', long, default_value_t = -1)]
    pps: i64,

    /// Widest prefix length to search (original encoding: larger numbers
    /// are narrower matches). Converted to prefix-length space internally.
    #[clap(short = 's', long, default_value_t = 16)]
    start: u8,

    /// Narrowest prefix length to search.
    #[clap(short = 'e', long, default_value_t = 8)]
    end: u8,

    /// Number of iterations to run.
    #[clap(short = 'i', long, default_value_t = 20)]
    iteration: usize,

    /// 1 selects the Magnifier sampler, 0 the Everflow sampler.
    #[clap(short = 'm', long, default_value_t = 1)]
    magnifier: u8,

    /// Number of border (ingress) routers.
    #[clap(short = 'b', long, default_value_t = 4)]
    border: u16,

    /// Traffic mapping policy: 0 random, 1 persistent, 2 permutation.
    #[clap(short = 't', long, default_value_t = 1)]
    traffic: u8,

    /// Percentage of `/24`s shifted under the permutation policy.
    #[clap(short = 'a', long, default_value_t = -1)]
    amount: i64,

    /// File listing every `/24` prefix in the trace, one per line;
    /// required when `--traffic 2` (permutation) is selected.
    #[clap(long)]
    all_prefixes: Option<PathBuf>,

    /// Shard the sentinel search across threads (rayon), preserving
    /// bytewise-deterministic output.
    #[clap(long)]
    parallel_search: bool,

    /// PRNG seed; defaults to a fixed constant for reproducible runs.
    #[clap(long, default_value_t = 0)]
    seed: u64,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    env_logger::init();
    let args: CliArgs = clap::Parser::parse();

    check_args(&args)?;

    if !args.pkts.exists() {
        bail!("input trace {} does not exist", args.pkts.display());
    }

    let (s_start, s_end) = (32 - args.end, 32 - args.start);

    let mapper = match args.traffic {
        0 => None, // rnd_N columns are precomputed in the input file
        1 => None, // per_N columns are precomputed in the input file
        2 => {
            let path = args
                .all_prefixes
                .as_ref()
                .context("--all-prefixes is required for the permutation traffic policy")?;
            let prefixes = read_all_prefixes(path)?;
            let pct = if args.amount < 0 { 0.0 } else { args.amount as f64 };
            Some(IngressMapper::build_permuted(
                pct,
                &prefixes,
                args.border,
                args.seed,
            ))
        }
        other => bail!("unknown traffic policy {other}, expected 0, 1 or 2"),
    };

    let persistent_column = args.traffic != 0;
    let mut source = CsvPacketSource::open(&args.pkts, args.border, persistent_column)?;

    let boundary = if args.pps >= 0 {
        WindowBoundary::PacketCount(args.pps as usize)
    } else {
        WindowBoundary::Duration(args.duration as f64)
    };

    let config = SimulationDriverConfig {
        n_border: args.border,
        s_start,
        s_end,
        sample_frequency: args.frequency,
        boundary,
        seed: args.seed,
        magnifier_sampler: args.magnifier != 0,
        parallel_search: args.parallel_search,
    };
    let mut driver = SimulationDriver::new(config, mapper);
    let mut output = OutputWriter::create(&args.outfile)?;

    for i in 0..args.iteration {
        match driver.run_iteration(&mut source) {
            IterationOutcome::Terminated => {
                log::info!("input exhausted after {i} iterations");
                break;
            }
            IterationOutcome::Priming { iteration } => {
                log::info!("iteration {iteration}: priming history");
            }
            IterationOutcome::Scored {
                iteration,
                end_ts,
                sampling,
                sentinels_raw,
                sentinels_strict,
                variants,
            } => {
                log::info!("iteration {iteration}: scored {} variants", variants.len());
                output.record_iteration(end_ts, &sampling, &sentinels_raw, &sentinels_strict);
                for outcome in variants {
                    output.record_variant(outcome.variant, outcome.mirrored.len(), &outcome.invalidation);
                }
            }
        }
    }

    output.finish()?;
    Ok(())
}

fn check_args(args: &CliArgs) -> Result<()> {
    if args.start > args.end {
        bail!(
            "start ({}) must not be greater than end ({})",
            args.start,
            args.end
        );
    }
    if !VALID_BORDER_COUNTS.contains(&args.border) {
        bail!(
            "border router count {} is not one of {:?}",
            args.border,
            VALID_BORDER_COUNTS
        );
    }
    if args.traffic == 2 && args.all_prefixes.is_none() {
        bail!("--all-prefixes is required when --traffic 2 (permutation) is selected");
    }
    Ok(())
}

fn read_all_prefixes(path: &PathBuf) -> Result<Vec<Prefix>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading all-prefixes file {}", path.display()))?;
    let mut prefixes = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match line.parse::<ipnetwork::Ipv4Network>() {
            Ok(net) => match Prefix::try_from(net) {
                Ok(prefix) => prefixes.push(prefix),
                Err(err) => log::warn!("skipping invalid prefix line {line:?}: {err}"),
            },
            Err(err) => log::warn!("skipping malformed prefix line {line:?}: {err}"),
        }
    }
    Ok(prefixes)
}
