//! The action interface consumed by the moves, plus the primitive
//! approximation over an external + interaction potential pair.
//!
//! The bisection time-step shift is an explicit argument of
//! `shifted_potential_action`; there is no hidden shift state to restore on
//! move exit.

use crate::path::{Bead, Path};
use crate::potential::{ExternalPotential, InteractionPotential};

pub trait Action<const D: usize> {
    /// Whether the action decomposes into per-slice terms.  Local actions
    /// unlock the per-slice rejection sampling of the worm moves and the
    /// bisection move.
    fn local(&self) -> bool;

    /// Potential action of the worldline segment from `start` through `end`
    /// inclusive, following forward links.
    fn potential_action(&self, path: &Path<D>, start: Bead, end: Bead) -> f64;

    /// Per-bead potential action with the elementary time step.
    fn bare_potential_action(&self, path: &Path<D>, bead: Bead) -> f64;

    /// Per-bead potential action with the time step scaled by `shift`
    /// (bisection level spacing).
    fn shifted_potential_action(&self, path: &Path<D>, bead: Bead, shift: usize) -> f64;

    /// End-segment correction beyond the bare per-slice sum.  Zero for the
    /// primitive approximation.
    fn potential_action_correction(&self, _path: &Path<D>, _start: Bead, _end: Bead) -> f64 {
        0.0
    }

    /// Total kinetic (spring) action of the configuration.
    fn kinetic_action(&self, path: &Path<D>) -> f64;

    /// Free-particle density matrix linking beads `a` and `b` across `links`
    /// imaginary-time steps.
    fn rho0(&self, path: &Path<D>, a: Bead, b: Bead, links: usize) -> f64;

    /// Ensemble weight hook for canonical biasing; identity in the plain
    /// grand canonical ensemble.
    fn ensemble_weight(&self, _delta_links: i64) -> f64 {
        1.0
    }
}

/// Primitive approximation: S_pot = τ Σ_b [V_ext(r_b) + Σ_{b'≠b} V_int(r_b - r_b')],
/// pair terms taken at minimum image within each slice.
pub struct PrimitiveAction<const D: usize, E, I> {
    pub external: E,
    pub interaction: I,
    pub lambda: f64,
    pub tau: f64,
}

impl<const D: usize, E, I> PrimitiveAction<D, E, I>
where
    E: ExternalPotential<D>,
    I: InteractionPotential<D>,
{
    pub fn new(external: E, interaction: I, lambda: f64, tau: f64) -> Self {
        PrimitiveAction {
            external,
            interaction,
            lambda,
            tau,
        }
    }

    /// Bare potential energy of one bead: external part plus interactions
    /// with every other bead on its slice (each pair counted once per
    /// member, consistently across old/new evaluations).
    fn potential_energy(&self, path: &Path<D>, bead: Bead) -> f64 {
        let mut v = self.external.v(&path.pos(bead));
        for other in path.beads_at_slice(bead.slice) {
            if other != bead {
                let sep = path.get_separation(bead, other);
                v += self.interaction.v(&sep);
            }
        }
        v
    }
}

impl<const D: usize, E, I> Action<D> for PrimitiveAction<D, E, I>
where
    E: ExternalPotential<D>,
    I: InteractionPotential<D>,
{
    fn local(&self) -> bool {
        true
    }

    fn potential_action(&self, path: &Path<D>, start: Bead, end: Bead) -> f64 {
        let mut action = 0.0;
        let mut bead = start;
        let mut guard = path.num_beads_on();
        loop {
            action += self.bare_potential_action(path, bead);
            if bead == end {
                break;
            }
            match path.next(bead) {
                Some(nb) => bead = nb,
                None => {
                    debug_assert!(false, "segment does not reach its end bead");
                    break;
                }
            }
            guard -= 1;
            if guard == 0 {
                debug_assert!(false, "segment walk did not terminate");
                break;
            }
        }
        action
    }

    fn bare_potential_action(&self, path: &Path<D>, bead: Bead) -> f64 {
        self.tau * self.potential_energy(path, bead)
    }

    fn shifted_potential_action(&self, path: &Path<D>, bead: Bead, shift: usize) -> f64 {
        shift as f64 * self.tau * self.potential_energy(path, bead)
    }

    fn kinetic_action(&self, path: &Path<D>) -> f64 {
        let norm = 1.0 / (4.0 * self.lambda * self.tau);
        let mut action = 0.0;
        for slice in 0..path.num_slices {
            for bead in path.beads_at_slice(slice) {
                if let Some(nb) = path.next(bead) {
                    action += norm * path.get_separation(nb, bead).norm_squared();
                }
            }
        }
        action
    }

    fn rho0(&self, path: &Path<D>, a: Bead, b: Bead, links: usize) -> f64 {
        let span = 4.0 * self.lambda * self.tau * links as f64;
        let sep = path.get_separation(a, b);
        (std::f64::consts::PI * span).powf(-(D as f64) / 2.0) * (-sep.norm_squared() / span).exp()
    }
}
