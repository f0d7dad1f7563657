//! Crate-level scenario tests: sampling kernels, invariant preservation
//! under the full move mixture, exact rollback of rejected moves, worm
//! cycling, permutation sampling, the classical ideal gas and hard-wall
//! rejection.

use approx::assert_relative_eq;
use nalgebra::SVector;

use crate::action::PrimitiveAction;
use crate::cmc::{AveragingObserver, ClassicalMonteCarlo};
use crate::constants::SimConstants;
use crate::container::Container;
use crate::io;
use crate::lookup::Lookup;
use crate::moves::{
    new_free_particle_position, BisectionMove, CenterOfMassMove, CloseMove, Move, MoveContext,
    OpenMove, StagingMove, SwapHeadMove,
};
use crate::path::{Bead, Path};
use crate::potential::{GaussianRepulsion, HarmonicPotential, ZeroPotential};
use crate::random::McRng;
use crate::sim::MoveTable;
use crate::worm::Worm;

fn make_worm(constants: &SimConstants) -> Worm {
    Worm::new(2.0 * constants.lambda * constants.tau * constants.worm_cost_max)
}

/// Mean squared coordinate over every live bead.
fn mean_x_squared<const D: usize>(path: &Path<D>) -> f64 {
    let mut sum = 0.0;
    let mut count = 0;
    for slice in 0..path.num_slices {
        for b in path.beads_at_slice(slice) {
            sum += path.pos(b).norm_squared();
            count += 1;
        }
    }
    sum / count as f64
}

/// Permutation cycle lengths of a diagonal configuration, read off by
/// winding each slice-0 bead forward one full period.
fn cycle_lengths<const D: usize>(path: &Path<D>) -> Vec<usize> {
    assert!(path.worm.is_diagonal);
    let n = path.num_beads_at_slice(0);
    let mut seen = vec![false; n];
    let mut lengths = Vec::new();
    for start in 0..n {
        if seen[start] {
            continue;
        }
        let mut cycle = 0;
        let mut bead = Bead::new(0, start);
        loop {
            seen[bead.idx] = true;
            cycle += 1;
            bead = path
                .next_by(bead, path.num_slices)
                .expect("diagonal worldlines are closed");
            if bead.idx == start {
                break;
            }
        }
        lengths.push(cycle);
    }
    lengths
}

#[test]
fn free_particle_kernel_variance() {
    // The free kernel must sample a Gaussian of variance 2λτ per coordinate.
    let constants = SimConstants::new(1.0, 0.0, 0.5, 1.0, 1.0, 4, 2, 16, 1000.0f64.powi(3));
    let cell = Container::<3>::cube(1000.0, true);
    let mut path = Path::new(16, cell, make_worm(&constants));
    let center = path.add_bead(0, SVector::zeros());

    let mut rng = McRng::seed_from(101);
    let n = 1_000_000;
    let mut sum = [0.0f64; 3];
    let mut sum2 = [0.0f64; 3];
    for _ in 0..n {
        let pos = new_free_particle_position(&path, &constants, &mut rng, center);
        for i in 0..3 {
            sum[i] += pos[i];
            sum2[i] += pos[i] * pos[i];
        }
    }
    let expected = 2.0 * constants.lambda * constants.tau;
    for i in 0..3 {
        let mean = sum[i] / n as f64;
        let var = sum2[i] / n as f64 - mean * mean;
        assert_relative_eq!(var, expected, max_relative = 0.01);
    }
}

#[test]
fn full_mixture_preserves_invariants() {
    let constants = SimConstants::new(1.0, -0.5, 0.5, 1.0, 0.5, 4, 2, 16, 216.0);
    let cell = Container::<3>::cube(6.0, true);
    let mut rng = McRng::seed_from(202);
    let mut path =
        Path::<3>::with_random_particles(16, cell, make_worm(&constants), 3, &mut rng);
    let mut lookup = Lookup::new(&path.cell, 1.5);
    let action = PrimitiveAction::<3, _, _>::new(
        HarmonicPotential { spring: 0.2 },
        GaussianRepulsion {
            amplitude: 1.0,
            width: 0.5,
        },
        constants.lambda,
        constants.tau,
    );
    let mut table = MoveTable::<3>::standard(&constants);

    for step in 0..5000 {
        table.step(&mut path, &action, &mut lookup, &constants, &mut rng);
        if let Err(e) = path.consistent() {
            panic!("invariant violation after step {step}: {e}");
        }
    }
    assert!(table.total_attempted == 5000);
    assert!(table.total_accepted > 0, "mixture never accepted anything");
}

#[test]
fn rejected_moves_restore_state_exactly() {
    // A stiff external potential makes almost every proposal fail its
    // Metropolis test; every rejection must restore the path bit for bit.
    let constants = SimConstants::new(1.0, 0.0, 0.5, 2.0, 1.0, 4, 2, 16, 216.0);
    let cell = Container::<3>::cube(6.0, true);
    let mut rng = McRng::seed_from(303);
    let mut path =
        Path::<3>::with_random_particles(16, cell, make_worm(&constants), 2, &mut rng);
    let mut lookup = Lookup::new(&path.cell, 1.5);
    let action = PrimitiveAction::<3, _, _>::new(
        HarmonicPotential { spring: 1.0e6 },
        ZeroPotential,
        constants.lambda,
        constants.tau,
    );
    let mut table = MoveTable::<3>::standard(&constants);

    let mut rejections = 0;
    for _ in 0..2000 {
        let before = io::snapshot(&path);
        let accepted = table.step(&mut path, &action, &mut lookup, &constants, &mut rng);
        if !accepted {
            rejections += 1;
            assert_eq!(before, io::snapshot(&path), "rejection did not roll back");
        }
        path.consistent().unwrap();
    }
    assert!(rejections > 1000, "stiff potential should reject heavily");
}

#[test]
fn harmonic_oscillator_position_variance() {
    // One particle in a 1D harmonic well at low temperature: <x²> approaches
    // 1/(2ω)·coth(βω/2) ≈ 0.5 for ω = 1, β = 10.
    let constants = SimConstants::new(0.1, 0.0, 0.5, 0.8, 1.0, 16, 3, 64, 40.0);
    let cell = Container::<1>::cube(40.0, true);
    let mut rng = McRng::seed_from(404);
    let mut path = Path::<1>::with_random_particles(64, cell, make_worm(&constants), 1, &mut rng);
    let mut lookup = Lookup::new(&path.cell, 10.0);
    let action = PrimitiveAction::<1, _, _>::new(
        HarmonicPotential { spring: 1.0 },
        ZeroPotential,
        constants.lambda,
        constants.tau,
    );

    let mut staging = StagingMove::<1>::new(&constants);
    let mut com = CenterOfMassMove::<1>::new();

    // Equilibrate, then accumulate <x²> over sweeps.
    for _ in 0..5_000 {
        let mut ctx = MoveContext {
            path: &mut path,
            action: &action,
            lookup: &mut lookup,
            constants: &constants,
            rng: &mut rng,
        };
        staging.attempt(&mut ctx);
    }
    let mut sum = 0.0;
    let samples = 60_000;
    for step in 0..samples {
        let mut ctx = MoveContext {
            path: &mut path,
            action: &action,
            lookup: &mut lookup,
            constants: &constants,
            rng: &mut rng,
        };
        if step % 10 == 0 {
            com.attempt(&mut ctx);
        } else {
            staging.attempt(&mut ctx);
        }
        sum += mean_x_squared(&path);
    }
    let x2 = sum / samples as f64;
    assert!(
        (x2 - 0.5).abs() < 0.05,
        "<x²> = {x2}, expected about 0.5"
    );
}

#[test]
fn bisection_free_particle_accepts_everything() {
    // With no potential the bisection kernels sample the action exactly, so
    // every level test passes.
    let constants = SimConstants::new(1.0, 0.0, 0.5, 1.0, 1.0, 8, 4, 32, 27.0);
    let cell = Container::<3>::cube(3.0, true);
    let mut rng = McRng::seed_from(505);
    let mut path = Path::<3>::with_random_particles(32, cell, make_worm(&constants), 1, &mut rng);
    let mut lookup = Lookup::new(&path.cell, 1.0);
    let action =
        PrimitiveAction::<3, _, _>::new(ZeroPotential, ZeroPotential, constants.lambda, constants.tau);

    let mut bisection = BisectionMove::<3>::new(&constants);
    for _ in 0..2000 {
        let mut ctx = MoveContext {
            path: &mut path,
            action: &action,
            lookup: &mut lookup,
            constants: &constants,
            rng: &mut rng,
        };
        bisection.attempt(&mut ctx);
        path.consistent().unwrap();
    }
    let stats = bisection.stats();
    assert_eq!(stats.attempted, 2000);
    assert!(
        stats.acceptance_rate() > 0.99,
        "free-particle bisection acceptance {}",
        stats.acceptance_rate()
    );
}

#[test]
fn bisection_harmonic_acceptance_is_nontrivial() {
    let constants = SimConstants::new(0.5, 0.0, 0.5, 1.0, 1.0, 8, 3, 32, 1000.0);
    let cell = Container::<3>::cube(10.0, true);
    let mut rng = McRng::seed_from(506);
    let mut path = Path::<3>::with_random_particles(32, cell, make_worm(&constants), 1, &mut rng);
    let mut lookup = Lookup::new(&path.cell, 2.5);
    let action = PrimitiveAction::<3, _, _>::new(
        HarmonicPotential { spring: 1.0 },
        ZeroPotential,
        constants.lambda,
        constants.tau,
    );

    let mut bisection = BisectionMove::<3>::new(&constants);
    for _ in 0..4000 {
        let mut ctx = MoveContext {
            path: &mut path,
            action: &action,
            lookup: &mut lookup,
            constants: &constants,
            rng: &mut rng,
        };
        bisection.attempt(&mut ctx);
    }
    let rate = bisection.stats().acceptance_rate();
    assert!(
        rate > 0.2 && rate < 1.0,
        "harmonic bisection acceptance {rate} outside the plausible band"
    );
}

#[test]
fn open_close_cycle_returns_to_diagonal() {
    // Alternating open and close on free worldlines: the configuration must
    // spend almost all its time diagonal for a small worm constant, and end
    // diagonal with every invariant intact.
    let constants = SimConstants::new(1.0, 0.0, 0.5, 1.0, 0.05, 4, 2, 16, 512.0);
    let cell = Container::<3>::cube(8.0, true);
    let mut rng = McRng::seed_from(606);
    let mut path = Path::<3>::with_random_particles(16, cell, make_worm(&constants), 8, &mut rng);
    let mut lookup = Lookup::new(&path.cell, 2.0);
    let action =
        PrimitiveAction::<3, _, _>::new(ZeroPotential, ZeroPotential, constants.lambda, constants.tau);

    let mut open = OpenMove::<3>::new(3);
    let mut close = CloseMove::<3>::new(3);

    let mut diagonal_steps = 0;
    let steps = 20_000;
    for step in 0..steps {
        let diagonal = path.worm.is_diagonal;
        let mut ctx = MoveContext {
            path: &mut path,
            action: &action,
            lookup: &mut lookup,
            constants: &constants,
            rng: &mut rng,
        };
        if diagonal {
            open.attempt(&mut ctx);
        } else {
            close.attempt(&mut ctx);
        }
        if path.worm.is_diagonal {
            diagonal_steps += 1;
        }
        if step % 100 == 0 {
            path.consistent().unwrap();
        }
    }

    // Close out any remaining worm.
    let mut tries = 0;
    while !path.worm.is_diagonal {
        let mut ctx = MoveContext {
            path: &mut path,
            action: &action,
            lookup: &mut lookup,
            constants: &constants,
            rng: &mut rng,
        };
        close.attempt(&mut ctx);
        tries += 1;
        assert!(tries < 10_000, "close move cannot heal the worm");
    }
    path.consistent().unwrap();
    assert_eq!(path.num_beads_on(), 8 * 16);

    let fraction = diagonal_steps as f64 / steps as f64;
    assert!(
        fraction > 0.9,
        "diagonal fraction {fraction} too low for a small worm constant"
    );
    assert!(open.stats().accepted > 0, "open never fired");
    assert!(close.stats().accepted > 0, "close never fired");
}

#[test]
fn swap_moves_sample_permutations() {
    // Two free bosons close together: an open/swap-head/close mixture must
    // produce two-particle permutation cycles.
    let constants = SimConstants::new(0.5, 0.0, 0.5, 1.0, 0.5, 4, 2, 8, 64.0);
    let cell = Container::<3>::cube(4.0, true);
    let mut rng = McRng::seed_from(707);
    let mut path = Path::<3>::new(8, cell, make_worm(&constants));
    path.add_closed_worldline(SVector::from_column_slice(&[0.0, 0.0, 0.0]));
    path.add_closed_worldline(SVector::from_column_slice(&[0.6, 0.0, 0.0]));
    let mut lookup = Lookup::new(&path.cell, 2.0);
    let action =
        PrimitiveAction::<3, _, _>::new(ZeroPotential, ZeroPotential, constants.lambda, constants.tau);

    let mut open = OpenMove::<3>::new(3);
    let mut close = CloseMove::<3>::new(3);
    let mut swap = SwapHeadMove::<3>::new(3);

    let mut two_cycles = 0;
    let mut diagonal_samples = 0;
    for step in 0..40_000 {
        let diagonal = path.worm.is_diagonal;
        let mut ctx = MoveContext {
            path: &mut path,
            action: &action,
            lookup: &mut lookup,
            constants: &constants,
            rng: &mut rng,
        };
        if diagonal {
            open.attempt(&mut ctx);
        } else if ctx.rng.rand() < 0.5 {
            swap.attempt(&mut ctx);
        } else {
            close.attempt(&mut ctx);
        }

        if path.worm.is_diagonal {
            diagonal_samples += 1;
            if cycle_lengths(&path).contains(&2) {
                two_cycles += 1;
            }
        }
        if step % 200 == 0 {
            path.consistent().unwrap();
        }
    }

    assert!(diagonal_samples > 0);
    assert!(swap.stats().accepted > 0, "swap head never accepted");
    assert!(
        two_cycles > 0,
        "no permutation cycle observed in {diagonal_samples} diagonal samples"
    );
}

#[test]
fn classical_ideal_gas_density_matches_fugacity() {
    // Ideal gas at z = 1: the mean density must converge to z.
    let constants = SimConstants::new(
        1.0,
        0.0,
        1.0 / (4.0 * std::f64::consts::PI),
        1.0,
        1.0,
        4,
        2,
        8,
        8.0,
    );
    assert_relative_eq!(constants.db_wavelength, 1.0, epsilon = 1e-12);

    let cell = Container::<3>::cube(2.0, true);
    let mut rng = McRng::seed_from(808);
    let initial = (0..8).map(|_| cell.rand_position(&mut rng)).collect();
    let mut cmc =
        ClassicalMonteCarlo::<3, _, _>::new(ZeroPotential, ZeroPotential, cell, &constants, initial);

    // Warm up, then measure.
    let mut warmup = AveragingObserver::default();
    cmc.run(50_000, 0, &mut rng, &mut warmup);
    let mut observer = AveragingObserver::default();
    cmc.run(300_000, 10, &mut rng, &mut observer);

    let density = observer.mean_particles() / 8.0;
    assert!(
        (density - 1.0).abs() < 0.05,
        "ideal-gas density {density} should match unit fugacity"
    );
}

#[test]
fn center_of_mass_respects_hard_walls() {
    // A worldline near a hard wall: proposals that would leave the cell are
    // rejected outright and the state is untouched.
    let constants = SimConstants::new(1.0, 0.0, 0.5, 5.0, 1.0, 4, 2, 8, 10.0);
    let cell = Container::<1>::cube(10.0, false);
    let mut rng = McRng::seed_from(909);
    let mut path = Path::<1>::new(8, cell, make_worm(&constants));
    path.add_closed_worldline(SVector::from_column_slice(&[4.9]));
    let mut lookup = Lookup::new(&path.cell, 2.5);
    let action =
        PrimitiveAction::<1, _, _>::new(ZeroPotential, ZeroPotential, constants.lambda, constants.tau);

    let mut com = CenterOfMassMove::<1>::new();
    let mut rejections = 0;
    for _ in 0..10_000 {
        let before = io::snapshot(&path);
        let mut ctx = MoveContext {
            path: &mut path,
            action: &action,
            lookup: &mut lookup,
            constants: &constants,
            rng: &mut rng,
        };
        let accepted = com.attempt(&mut ctx);
        if accepted {
            for b in path.beads_at_slice(0) {
                assert!(path.cell.inside(&path.pos(b)));
            }
        } else {
            rejections += 1;
            assert_eq!(before, io::snapshot(&path));
        }
        path.consistent().unwrap();
    }
    assert!(rejections > 0, "wall should reject some displacements");
}

#[test]
fn checkpoint_round_trips_after_mixture() {
    let constants = SimConstants::new(1.0, -0.2, 0.5, 1.0, 0.5, 4, 2, 16, 216.0);
    let cell = Container::<3>::cube(6.0, true);
    let mut rng = McRng::seed_from(1010);
    let mut path =
        Path::<3>::with_random_particles(16, cell, make_worm(&constants), 3, &mut rng);
    let mut lookup = Lookup::new(&path.cell, 1.5);
    let action = PrimitiveAction::<3, _, _>::new(
        ZeroPotential,
        GaussianRepulsion {
            amplitude: 0.5,
            width: 0.5,
        },
        constants.lambda,
        constants.tau,
    );
    let mut table = MoveTable::<3>::standard(&constants);
    for _ in 0..3000 {
        table.step(&mut path, &action, &mut lookup, &constants, &mut rng);
    }
    path.consistent().unwrap();

    let mut buffer = Vec::new();
    io::write_checkpoint(&path, &mut buffer).unwrap();
    let cost_norm = 2.0 * constants.lambda * constants.tau * constants.worm_cost_max;
    let restored: Path<3> = io::read_checkpoint(buffer.as_slice(), cost_norm).unwrap();
    assert_eq!(io::snapshot(&path), io::snapshot(&restored));
}
