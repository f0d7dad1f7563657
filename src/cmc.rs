//! Classical grand canonical Monte Carlo: the degenerate single-slice case.
//!
//! Particles are bare positions with no imaginary-time structure.  Updates
//! displace one particle, inserts and deletes exchange particles with the
//! reservoir at fugacity z = exp(μ/T)/Λ^D.  The running energy accumulator
//! is validated against a full recompute on a fixed cadence.

use nalgebra::SVector;

use crate::constants::SimConstants;
use crate::container::Container;
use crate::moves::accept_probability;
use crate::potential::{ExternalPotential, InteractionPotential};
use crate::random::McRng;

/// Snapshot handed to the measurement observer.
#[derive(Clone, Copy, Debug)]
pub struct CmcSnapshot {
    pub step: u64,
    pub energy: f64,
    pub num_particles: usize,
    pub update_acceptance: f64,
    pub insert_acceptance: f64,
    pub delete_acceptance: f64,
}

/// Injected measurement sink; the sampler never touches stdout itself.
pub trait CmcObserver {
    fn measure(&mut self, snapshot: &CmcSnapshot);
}

/// An observer that accumulates the running means needed by the tests and
/// the binary.
#[derive(Default)]
pub struct AveragingObserver {
    pub samples: u64,
    pub sum_energy: f64,
    pub sum_particles: f64,
}

impl CmcObserver for AveragingObserver {
    fn measure(&mut self, snapshot: &CmcSnapshot) {
        self.samples += 1;
        self.sum_energy += snapshot.energy;
        self.sum_particles += snapshot.num_particles as f64;
    }
}

impl AveragingObserver {
    pub fn mean_energy(&self) -> f64 {
        if self.samples == 0 {
            0.0
        } else {
            self.sum_energy / self.samples as f64
        }
    }

    pub fn mean_particles(&self) -> f64 {
        if self.samples == 0 {
            0.0
        } else {
            self.sum_particles / self.samples as f64
        }
    }
}

pub struct ClassicalMonteCarlo<const D: usize, E, I> {
    external: E,
    interaction: I,
    pub cell: Container<D>,
    pub config: Vec<SVector<f64, D>>,
    /// Fugacity z = exp(μ/T)/Λ^D.
    pub z: f64,
    t: f64,
    update_delta: f64,
    energy: f64,
    steps: u64,
    check_interval: u64,
    num_update: u64,
    num_update_accept: u64,
    num_insert: u64,
    num_insert_accept: u64,
    num_delete: u64,
    num_delete_accept: u64,
}

impl<const D: usize, E, I> ClassicalMonteCarlo<D, E, I>
where
    E: ExternalPotential<D>,
    I: InteractionPotential<D>,
{
    pub fn new(
        external: E,
        interaction: I,
        cell: Container<D>,
        constants: &SimConstants,
        initial: Vec<SVector<f64, D>>,
    ) -> Self {
        let z = (constants.mu / constants.t).exp() / constants.db_wavelength.powi(D as i32);
        let mut cmc = ClassicalMonteCarlo {
            external,
            interaction,
            cell,
            config: initial,
            z,
            t: constants.t,
            update_delta: constants.delta,
            energy: 0.0,
            steps: 0,
            check_interval: 10_000,
            num_update: 0,
            num_update_accept: 0,
            num_insert: 0,
            num_insert_accept: 0,
            num_delete: 0,
            num_delete_accept: 0,
        };
        cmc.energy = cmc.total_energy();
        cmc
    }

    pub fn num_particles(&self) -> usize {
        self.config.len()
    }

    pub fn energy(&self) -> f64 {
        self.energy
    }

    /// Full O(N²) recompute of the configuration energy.
    pub fn total_energy(&self) -> f64 {
        let n = self.config.len();
        let mut energy = 0.0;
        for i in 0..n {
            energy += self.external.v(&self.config[i]);
            for j in i + 1..n {
                let mut sep = self.config[i] - self.config[j];
                self.cell.put_in_bc(&mut sep);
                energy += self.interaction.v(&sep);
            }
        }
        energy
    }

    /// Energy of particle `p` against the external field and all others.
    fn particle_energy(&self, p: usize, pos: &SVector<f64, D>) -> f64 {
        let mut energy = self.external.v(pos);
        for (j, other) in self.config.iter().enumerate() {
            if j != p {
                let mut sep = pos - other;
                self.cell.put_in_bc(&mut sep);
                energy += self.interaction.v(&sep);
            }
        }
        energy
    }

    /// Energy a particle at `pos` would add to the current configuration.
    fn insertion_energy(&self, pos: &SVector<f64, D>) -> f64 {
        let mut energy = self.external.v(pos);
        for other in &self.config {
            let mut sep = pos - other;
            self.cell.put_in_bc(&mut sep);
            energy += self.interaction.v(&sep);
        }
        energy
    }

    /// Single-particle displacement.
    pub fn update_move(&mut self, rng: &mut McRng) -> bool {
        if self.config.is_empty() {
            return false;
        }
        self.num_update += 1;

        let p = rng.rand_int(self.config.len() - 1);
        let old_pos = self.config[p];
        let old_e = self.particle_energy(p, &old_pos);

        let new_pos = self.cell.rand_update(rng, &old_pos, self.update_delta);
        if !self.cell.inside(&new_pos) {
            return false;
        }
        let new_e = self.particle_energy(p, &new_pos);

        if rng.rand() < accept_probability(-(new_e - old_e) / self.t) {
            self.config[p] = new_pos;
            self.energy += new_e - old_e;
            self.num_update_accept += 1;
            true
        } else {
            false
        }
    }

    /// Grand canonical insertion with weight zV/(N+1).
    pub fn insert_move(&mut self, rng: &mut McRng) -> bool {
        self.num_insert += 1;

        let pos = self.cell.rand_position(rng);
        let new_e = self.insertion_energy(&pos);
        let factor = self.z * self.cell.volume / (self.config.len() + 1) as f64;

        if rng.rand() < accept_probability(factor.ln() - new_e / self.t) {
            self.config.push(pos);
            self.energy += new_e;
            self.num_insert_accept += 1;
            true
        } else {
            false
        }
    }

    /// Grand canonical deletion with weight N/(zV).
    pub fn delete_move(&mut self, rng: &mut McRng) -> bool {
        if self.config.is_empty() {
            return false;
        }
        self.num_delete += 1;

        let p = rng.rand_int(self.config.len() - 1);
        let old_e = self.particle_energy(p, &self.config[p]);
        let factor = self.config.len() as f64 / (self.z * self.cell.volume);

        if rng.rand() < accept_probability(factor.ln() + old_e / self.t) {
            self.energy -= old_e;
            self.config.swap_remove(p);
            self.num_delete_accept += 1;
            true
        } else {
            false
        }
    }

    fn snapshot(&self) -> CmcSnapshot {
        let rate = |acc: u64, tot: u64| if tot == 0 { 0.0 } else { acc as f64 / tot as f64 };
        CmcSnapshot {
            step: self.steps,
            energy: self.energy,
            num_particles: self.config.len(),
            update_acceptance: rate(self.num_update_accept, self.num_update),
            insert_acceptance: rate(self.num_insert_accept, self.num_insert),
            delete_acceptance: rate(self.num_delete_accept, self.num_delete),
        }
    }

    /// Run `steps` of the equal-weight update/insert/delete mixture, calling
    /// the observer every `measure_interval` steps and validating the
    /// incremental energy accumulator on the check cadence.
    pub fn run(
        &mut self,
        steps: u64,
        measure_interval: u64,
        rng: &mut McRng,
        observer: &mut dyn CmcObserver,
    ) {
        for _ in 0..steps {
            self.steps += 1;
            let p = rng.rand();
            if p < 1.0 / 3.0 {
                self.update_move(rng);
            } else if p < 2.0 / 3.0 {
                self.insert_move(rng);
            } else {
                self.delete_move(rng);
            }

            if measure_interval > 0 && self.steps % measure_interval == 0 {
                let snapshot = self.snapshot();
                observer.measure(&snapshot);
            }

            if self.steps % self.check_interval == 0 {
                let recomputed = self.total_energy();
                let tolerance = 1e-8 * self.config.len().max(1) as f64;
                debug_assert!(
                    (self.energy - recomputed).abs() < tolerance,
                    "incremental energy {} drifted from recompute {}",
                    self.energy,
                    recomputed
                );
                self.energy = recomputed;
            }
        }
    }
}
