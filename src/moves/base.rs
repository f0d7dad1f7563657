//! Shared move scaffolding: the capability trait, acceptance counters,
//! log-space Metropolis helpers and the three kinetic sampling kernels.

use nalgebra::SVector;

use crate::action::Action;
use crate::constants::{SimConstants, LBIG};
use crate::lookup::Lookup;
use crate::path::{Bead, Path};
use crate::random::McRng;

/// Which worm sector a move can fire in.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Ensemble {
    Diagonal,
    OffDiagonal,
    Any,
}

impl Ensemble {
    pub fn allows(self, is_diagonal: bool) -> bool {
        match self {
            Ensemble::Diagonal => is_diagonal,
            Ensemble::OffDiagonal => !is_diagonal,
            Ensemble::Any => true,
        }
    }
}

/// Everything a move borrows for the duration of one attempt.
pub struct MoveContext<'a, const D: usize> {
    pub path: &'a mut Path<D>,
    pub action: &'a dyn Action<D>,
    pub lookup: &'a mut Lookup<D>,
    pub constants: &'a SimConstants,
    pub rng: &'a mut McRng,
}

/// The move capability interface exposed to the scheduler.
pub trait Move<const D: usize> {
    fn name(&self) -> &'static str;

    fn operates_on(&self) -> Ensemble;

    /// Propose, test, and either commit or roll back.  Always leaves the
    /// path in a valid state; `false` covers both expected rejections and a
    /// failed Metropolis test.
    fn attempt(&mut self, ctx: &mut MoveContext<'_, D>) -> bool;

    fn stats(&self) -> &MoveStats;
}

/// Attempt/acceptance counters, broken down by bisection level where the
/// move has one.
#[derive(Clone, Debug)]
pub struct MoveStats {
    pub attempted: u64,
    pub accepted: u64,
    pub attempted_level: Vec<u64>,
    pub accepted_level: Vec<u64>,
}

impl MoveStats {
    pub fn new(max_level: usize) -> Self {
        MoveStats {
            attempted: 0,
            accepted: 0,
            attempted_level: vec![0; max_level + 1],
            accepted_level: vec![0; max_level + 1],
        }
    }

    pub fn attempt(&mut self, level: Option<usize>) {
        self.attempted += 1;
        if let Some(l) = level {
            if l < self.attempted_level.len() {
                self.attempted_level[l] += 1;
            }
        }
    }

    pub fn accept(&mut self, level: Option<usize>) {
        self.accepted += 1;
        if let Some(l) = level {
            if l < self.accepted_level.len() {
                self.accepted_level[l] += 1;
            }
        }
    }

    pub fn acceptance_rate(&self) -> f64 {
        if self.attempted == 0 {
            0.0
        } else {
            self.accepted as f64 / self.attempted as f64
        }
    }
}

/// Saturating acceptance probability for a log ratio, per the numerics
/// contract: never feeds `exp` anything that could produce inf or NaN.
#[inline]
pub fn accept_probability(log_ratio: f64) -> f64 {
    if log_ratio.is_nan() {
        debug_assert!(false, "NaN acceptance ratio");
        return 0.0;
    }
    if log_ratio >= 0.0 {
        1.0
    } else if log_ratio < -LBIG {
        0.0
    } else {
        log_ratio.exp()
    }
}

/// Number of bisection levels needed for a stage of `len` slices.
#[inline]
pub fn levels_for(len: usize) -> usize {
    len.next_power_of_two().trailing_zeros() as usize
}

/// Running state of the per-slice rejection sampling used by the worm moves
/// with a local action.  `delta` accumulates the signed action difference,
/// `log_pnorm` the product of per-slice acceptance factors, both in log
/// space.
pub struct RejectionChain {
    pub delta: f64,
    log_pnorm: f64,
}

impl RejectionChain {
    pub fn new() -> Self {
        RejectionChain {
            delta: 0.0,
            log_pnorm: 0.0,
        }
    }

    /// One intermediate single-slice test.  Returns false when the chain
    /// rejects; the caller then unwinds.
    pub fn step(&mut self, rng: &mut McRng) -> bool {
        let log_p = (-self.delta - self.log_pnorm).min(0.0);
        let p = accept_probability(log_p);
        if rng.rand() >= p {
            return false;
        }
        self.log_pnorm += log_p;
        true
    }

    /// The final acceptance test, `exp(-delta)/P_norm` uncapped.
    pub fn finish(&mut self, rng: &mut McRng) -> bool {
        rng.rand() < accept_probability(-self.delta - self.log_pnorm)
    }
}

/// A position sampled from the free-particle density matrix around a
/// neighboring bead: Gaussian of stddev sqrt(2λτ) per coordinate.
pub fn new_free_particle_position<const D: usize>(
    path: &Path<D>,
    constants: &SimConstants,
    rng: &mut McRng,
    neighbor: Bead,
) -> SVector<f64, D> {
    let sigma = (2.0 * constants.lambda * constants.tau).sqrt();
    let npos = path.pos(neighbor);
    let mut pos = SVector::from_fn(|i, _| rng.rand_norm(npos[i], sigma));
    path.cell.put_inside(&mut pos);
    pos
}

/// A staging position at step `k` of a stage of `stage_len` slices: the
/// interpolated midpoint toward the fixed endpoint, kicked by a Gaussian of
/// stddev sqrt(2λτ·(L-k-1)/(L-k)).  Exactly samples the kinetic density
/// matrix conditioned on the endpoints.
pub fn new_staging_position<const D: usize>(
    path: &Path<D>,
    constants: &SimConstants,
    rng: &mut McRng,
    neighbor: Bead,
    end: Bead,
    stage_len: usize,
    k: usize,
) -> SVector<f64, D> {
    let f1 = (stage_len - k - 1) as f64;
    let f2 = 1.0 / (stage_len - k) as f64;
    let sigma = (2.0 * constants.lambda * constants.tau).sqrt() * (f1 * f2).sqrt();

    let npos = path.pos(neighbor);
    let mut sep = path.pos(end) - npos;
    path.cell.put_in_bc(&mut sep);
    let mid = npos + sep * f2;

    let mut pos = SVector::from_fn(|i, _| rng.rand_norm(mid[i], sigma));
    path.cell.put_inside(&mut pos);
    pos
}

/// A bisection position for a bead whose stage neighbors sit `lshift` slices
/// away on either side: their midpoint kicked by a Gaussian of stddev
/// sqrt(λτ·lshift).
pub fn new_bisection_position<const D: usize>(
    path: &Path<D>,
    constants: &SimConstants,
    rng: &mut McRng,
    bead: Bead,
    lshift: usize,
) -> SVector<f64, D> {
    let sigma = (constants.lambda * constants.tau * lshift as f64).sqrt();

    let nbead = path
        .prev_by(bead, lshift)
        .expect("bisection stage has no backward neighbor");
    let fbead = path
        .next_by(bead, lshift)
        .expect("bisection stage has no forward neighbor");
    let mid = path.pos(nbead) + path.get_separation(fbead, nbead) * 0.5;

    let mut pos = SVector::from_fn(|i, _| rng.rand_norm(mid[i], sigma));
    path.cell.put_inside(&mut pos);
    pos
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensemble_tags() {
        assert!(Ensemble::Diagonal.allows(true));
        assert!(!Ensemble::Diagonal.allows(false));
        assert!(Ensemble::OffDiagonal.allows(false));
        assert!(Ensemble::Any.allows(true) && Ensemble::Any.allows(false));
    }

    #[test]
    fn acceptance_saturates() {
        assert_eq!(accept_probability(5.0), 1.0);
        assert_eq!(accept_probability(0.0), 1.0);
        assert_eq!(accept_probability(-1000.0), 0.0);
        let p = accept_probability(-1.0);
        assert!((p - (-1.0f64).exp()).abs() < 1e-15);
    }

    #[test]
    fn level_counting() {
        assert_eq!(levels_for(2), 1);
        assert_eq!(levels_for(4), 2);
        assert_eq!(levels_for(6), 3);
        assert_eq!(levels_for(8), 3);
        assert_eq!(levels_for(16), 4);
    }

    #[test]
    fn rejection_chain_accepts_zero_action() {
        let mut rng = McRng::seed_from(1);
        let mut chain = RejectionChain::new();
        for _ in 0..10 {
            assert!(chain.step(&mut rng));
        }
        assert!(chain.finish(&mut rng));
    }

    #[test]
    fn rejection_chain_rejects_huge_action() {
        let mut rng = McRng::seed_from(2);
        let mut chain = RejectionChain::new();
        chain.delta = 1000.0;
        assert!(!chain.step(&mut rng));
    }
}
