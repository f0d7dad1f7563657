//! Level-by-level bisection with Ceperley's telescoping early-reject tests.
//!
//! Only defined for local actions: each level compares the shifted action of
//! the beads proposed so far against the previous level's tally, so a doomed
//! stage is abandoned after touching only a few beads.

use nalgebra::SVector;

use crate::constants::SimConstants;
use crate::path::Bead;

use super::base::{
    accept_probability, new_bisection_position, Ensemble, Move, MoveContext, MoveStats,
};

pub struct BisectionMove<const D: usize> {
    stats: MoveStats,
    num_levels: usize,
    num_active: usize,
    include: Vec<bool>,
    original_pos: Vec<SVector<f64, D>>,
    new_pos: Vec<SVector<f64, D>>,
}

impl<const D: usize> BisectionMove<D> {
    pub fn new(constants: &SimConstants) -> Self {
        let num_levels = constants.b;
        let num_active = (1 << num_levels) - 1;
        BisectionMove {
            stats: MoveStats::new(num_levels),
            num_levels,
            num_active,
            include: vec![false; num_active],
            original_pos: vec![SVector::zeros(); num_active],
            new_pos: vec![SVector::zeros(); num_active],
        }
    }

    /// Restore every bead that has been proposed so far.
    fn undo(&self, ctx: &mut MoveContext<'_, D>, start: Bead) {
        let mut bead = start;
        for k in 0..self.num_active {
            bead = ctx.path.next(bead).expect("bisection stage is linked");
            if !self.include[k] {
                ctx.path.update_bead(bead, self.original_pos[k]);
            }
        }
    }
}

impl<const D: usize> Move<D> for BisectionMove<D> {
    fn name(&self) -> &'static str {
        "bisection"
    }

    fn operates_on(&self) -> Ensemble {
        Ensemble::Any
    }

    fn attempt(&mut self, ctx: &mut MoveContext<'_, D>) -> bool {
        if !ctx.action.local() {
            return false;
        }

        let slice = ctx.rng.rand_int(ctx.path.num_slices - 1);
        if ctx.path.num_beads_at_slice(slice) == 0 {
            return false;
        }
        let start = Bead::new(slice, ctx.rng.rand_int(ctx.path.num_beads_at_slice(slice) - 1));

        // The full 2^b stage must be live and clear of the worm head.
        let head = ctx.path.worm.head;
        let mut bead = start;
        for _ in 0..self.num_active + 1 {
            if Some(bead) == head {
                return false;
            }
            bead = match ctx.path.next(bead) {
                Some(nb) => nb,
                None => return false,
            };
        }
        let end = bead;

        self.stats.attempt(Some(self.num_levels));
        self.include.fill(true);

        let mut prev_delta = 0.0;
        for level in (1..=self.num_levels).rev() {
            let shift = 1usize << (level - 1);

            let mut old_action = 0.0;
            let mut new_action = 0.0;
            let mut bead = ctx
                .path
                .next_by(start, shift)
                .expect("bisection stage is linked");
            let mut k = 1;
            while bead != end {
                let n = k * shift - 1;
                if self.include[n] {
                    self.original_pos[n] = ctx.path.pos(bead);
                    old_action += ctx.action.shifted_potential_action(ctx.path, bead, shift);
                    self.new_pos[n] =
                        new_bisection_position(ctx.path, ctx.constants, ctx.rng, bead, shift);
                    ctx.path.update_bead(bead, self.new_pos[n]);
                    new_action += ctx.action.shifted_potential_action(ctx.path, bead, shift);
                    self.include[n] = false;
                } else if level == 1 {
                    // The finest level retallies every bead at the bare time
                    // step, swapping the old position back in for its half.
                    new_action += ctx.action.bare_potential_action(ctx.path, bead);
                    ctx.path.update_bead(bead, self.original_pos[n]);
                    old_action += ctx.action.bare_potential_action(ctx.path, bead);
                    ctx.path.update_bead(bead, self.new_pos[n]);
                }
                k += 1;
                bead = ctx
                    .path
                    .next_by(bead, shift)
                    .expect("bisection stage is linked");
            }

            let delta = new_action - old_action;
            if ctx.rng.rand() < accept_probability(-delta + prev_delta) {
                if level == 1 {
                    self.stats.accept(Some(self.num_levels));
                    return true;
                }
            } else {
                self.undo(ctx, start);
                return false;
            }
            prev_delta = delta;
        }

        // Unreachable for num_levels >= 1; a zero-level stage moves nothing.
        false
    }

    fn stats(&self) -> &MoveStats {
        &self.stats
    }
}
