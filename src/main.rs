//! Command line driver: load a YAML run file, equilibrate, run the full
//! worm-algorithm move mixture and report acceptance statistics.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use worm_pimc::io::{self, IoError, SimParams};
use worm_pimc::{Lookup, McRng, MoveTable, Path, PrimitiveAction, Worm};

#[derive(Parser, Debug)]
#[command(version, about = "Worm-algorithm path integral Monte Carlo", long_about = None)]
struct Args {
    /// Run parameter file (YAML).
    #[arg(short, long, default_value = "sim.yml")]
    config: PathBuf,

    /// Override the seed from the parameter file.
    #[arg(long)]
    seed: Option<u64>,

    /// Override the number of measurement sweeps.
    #[arg(long)]
    sweeps: Option<u64>,

    /// Write the final path state to this JSON checkpoint.
    #[arg(long)]
    checkpoint: Option<PathBuf>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let params = match io::read_params(&args.config) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("failed to read {}: {e}", args.config.display());
            return ExitCode::FAILURE;
        }
    };

    let result = match params.dimension() {
        1 => run::<1>(&params, &args),
        2 => run::<2>(&params, &args),
        3 => run::<3>(&params, &args),
        d => Err(IoError::Dimension {
            expected: 3,
            found: d,
        }),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("run failed: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run<const D: usize>(params: &SimParams, args: &Args) -> Result<(), IoError> {
    let constants = params.constants();
    let cell = params.container::<D>()?;
    let mut rng = McRng::seed_from(args.seed.unwrap_or(params.seed));

    let worm = Worm::new(2.0 * constants.lambda * constants.tau * constants.worm_cost_max);
    let mut path = Path::<D>::with_random_particles(
        constants.num_slices,
        cell,
        worm,
        params.num_particles,
        &mut rng,
    );
    let mut lookup = Lookup::new(&path.cell, params.lookup_cell_side());
    let action = PrimitiveAction::<D, _, _>::new(
        params.external_potential::<D>(),
        params.interaction_potential::<D>(),
        constants.lambda,
        constants.tau,
    );
    let mut table = MoveTable::<D>::standard(&constants);

    println!("=== worm-pimc ===");
    println!("dimensions:        {D}");
    println!("time slices:       {}", constants.num_slices);
    println!("temperature:       {:.6}", constants.t);
    println!("chemical pot.:     {:.6}", constants.mu);
    println!("initial particles: {}", params.num_particles);
    println!();

    println!("equilibrating ({} sweeps)...", params.equilibrate);
    for _ in 0..params.equilibrate {
        table.sweep(&mut path, &action, &mut lookup, &constants, &mut rng);
    }

    let sweeps = args.sweeps.unwrap_or(params.sweeps);
    println!("measuring ({sweeps} sweeps)...");
    for _ in 0..sweeps {
        table.sweep(&mut path, &action, &mut lookup, &constants, &mut rng);
    }

    println!();
    println!("=== results ===");
    println!("total steps:       {}", table.steps);
    println!("acceptance:        {:.4}", table.acceptance_rate());
    println!("diagonal fraction: {:.4}", table.diagonal_fraction());
    println!("final beads:       {}", path.num_beads_on());
    println!("final particles:   {}", path.get_true_num_particles());
    println!();
    println!("{:<16} {:>12} {:>12} {:>10}", "move", "attempted", "accepted", "rate");
    for (name, stats) in table.stats() {
        println!(
            "{:<16} {:>12} {:>12} {:>10.4}",
            name,
            stats.attempted,
            stats.accepted,
            stats.acceptance_rate()
        );
    }

    if let Some(checkpoint) = &args.checkpoint {
        let file = std::fs::File::create(checkpoint)?;
        io::write_checkpoint(&path, std::io::BufWriter::new(file))?;
        println!("\ncheckpoint written to {}", checkpoint.display());
    }

    Ok(())
}
