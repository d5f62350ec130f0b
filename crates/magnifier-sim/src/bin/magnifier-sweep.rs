//! Sweeps `magnifier-sim` over a grid of border-router counts and sampling
//! frequencies, writing one output file per combination.
//!
//! Grounded on `original_source/simulations/runner.py`, which sweeps
//! `n_border_routers`, `load_factor` and `sampling_frequencies` and shells
//! out to `simulation.py` once per combination. The parallel-dispatch
//! pattern (`rayon::prelude::*::par_iter` over independent child-process
//! runs) follows `crates/netflow/src/bin/netflow-aggregate.rs`.

#![deny(unused_import_braces, unused_qualifications)]

use std::path::PathBuf;
use std::process::Command;

use color_eyre::eyre::{bail, Result};
use rayon::prelude::*;

/// Run `magnifier-sim` once per `(border, frequency)` combination.
#[derive(Debug, clap::Parser)]
struct CliArgs {
    /// Path to the input trace CSV, forwarded to every run.
    #[clap(short = 'p', long)]
    pkts: PathBuf,

    /// Directory the per-combination output files are written into.
    #[clap(short = 'o', long)]
    out_dir: PathBuf,

    /// Border router counts to sweep.
    #[clap(short = 'b', long, value_delimiter = ',', default_value = "4,8,16")]
    border: Vec<u16>,

    /// Sampling frequencies to sweep.
    #[clap(short = 'f', long, value_delimiter = ',', default_value = "256,1024,4096")]
    frequency: Vec<usize>,

    /// Path to the `magnifier-sim` binary to invoke.
    #[clap(long, default_value = "magnifier-sim")]
    sim_binary: PathBuf,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    env_logger::init();
    let args: CliArgs = clap::Parser::parse();

    if !args.pkts.exists() {
        bail!("input trace {} does not exist", args.pkts.display());
    }
    std::fs::create_dir_all(&args.out_dir)?;

    let combinations: Vec<(u16, usize)> = args
        .border
        .iter()
        .flat_map(|&b| args.frequency.iter().map(move |&f| (b, f)))
        .collect();

    log::info!("running {} combinations", combinations.len());

    let results: Vec<Result<()>> = combinations
        .par_iter()
        .map(|&(border, frequency)| run_one(&args, border, frequency))
        .collect();

    let mut failures = 0;
    for result in results {
        if let Err(err) = result {
            log::warn!("sweep run failed: {err:?}");
            failures += 1;
        }
    }
    if failures > 0 {
        bail!("{failures} of {} sweep runs failed", combinations.len());
    }
    Ok(())
}

fn run_one(args: &CliArgs, border: u16, frequency: usize) -> Result<()> {
    let outfile = args
        .out_dir
        .join(format!("b_{border}_f_{frequency}.csv"));
    log::info!("b={border} f={frequency} -> {}", outfile.display());

    let status = Command::new(&args.sim_binary)
        .arg("-p")
        .arg(&args.pkts)
        .arg("-o")
        .arg(&outfile)
        .arg("-b")
        .arg(border.to_string())
        .arg("-f")
        .arg(frequency.to_string())
        .status()?;

    if !status.success() {
        bail!("magnifier-sim exited with {status} for b={border} f={frequency}");
    }
    Ok(())
}
