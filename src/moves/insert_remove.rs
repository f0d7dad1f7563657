//! The insert/remove pair: materializing a fresh worm out of the vacuum and
//! deleting one whole.  These change the number of active worldlines and
//! carry the full grand canonical prefactor C·Mbar·M·V with the chemical
//! potential shift exp(±μτL).

use crate::path::Bead;

use super::base::{
    accept_probability, levels_for, new_free_particle_position, Ensemble, Move, MoveContext,
    MoveStats, RejectionChain,
};

/// Grows a new worm of even length at a random even slice and position.
pub struct InsertMove<const D: usize> {
    stats: MoveStats,
}

impl<const D: usize> InsertMove<D> {
    pub fn new(max_level: usize) -> Self {
        InsertMove {
            stats: MoveStats::new(max_level),
        }
    }

    fn keep(&mut self, ctx: &mut MoveContext<'_, D>, head: Bead, tail: Bead, level: usize) {
        self.stats.accept(Some(level));
        ctx.path.update_worm(head, tail);
        ctx.path.worm.is_diagonal = false;
    }

    /// Delete the partial worm, tail first.
    fn undo(&self, ctx: &mut MoveContext<'_, D>, tail: Bead) {
        let mut bead = Some(tail);
        while let Some(b) = bead {
            bead = ctx.path.del_bead_get_next(b);
        }
        ctx.path.worm.reset();
        ctx.path.worm.is_diagonal = true;
    }
}

impl<const D: usize> Move<D> for InsertMove<D> {
    fn name(&self) -> &'static str {
        "insert"
    }

    fn operates_on(&self) -> Ensemble {
        Ensemble::Diagonal
    }

    fn attempt(&mut self, ctx: &mut MoveContext<'_, D>) -> bool {
        if !ctx.path.worm.is_diagonal {
            return false;
        }
        let c = ctx.constants;
        let m = ctx.path.num_slices;

        let length = 2 * (1 + ctx.rng.rand_int(c.mbar / 2 - 1));
        let num_levels = levels_for(length);
        self.stats.attempt(Some(num_levels));

        let norm = c.c_worm * c.mbar as f64 * m as f64 * ctx.path.cell.volume
            * (c.attempt_prob("remove") / c.attempt_prob("insert"))
            * ctx.action.ensemble_weight(length as i64);
        let mu_shift = length as f64 * c.tau * c.mu;

        let slice = 2 * ctx.rng.rand_int(m / 2 - 1);
        let tail_pos = ctx.path.cell.rand_position(ctx.rng);
        let tail = ctx.path.add_bead(slice, tail_pos);
        ctx.path.worm.special2 = Some(tail);

        if ctx.action.local() {
            let action_shift = (norm.ln() + mu_shift) / length as f64;
            let mut chain = RejectionChain::new();

            chain.delta += ctx.action.bare_potential_action(ctx.path, tail) - 0.5 * action_shift;
            if !chain.step(ctx.rng) {
                self.undo(ctx, tail);
                return false;
            }

            let mut bead = tail;
            for _ in 1..length {
                let pos = new_free_particle_position(ctx.path, ctx.constants, ctx.rng, bead);
                bead = ctx.path.add_next_bead(bead, pos);
                chain.delta += ctx.action.bare_potential_action(ctx.path, bead) - action_shift;
                if !chain.step(ctx.rng) {
                    self.undo(ctx, tail);
                    return false;
                }
            }
            let head_pos = new_free_particle_position(ctx.path, ctx.constants, ctx.rng, bead);
            let head = ctx.path.add_next_bead(bead, head_pos);
            ctx.path.worm.special1 = Some(head);

            chain.delta += ctx.action.bare_potential_action(ctx.path, head) - 0.5 * action_shift;
            chain.delta += ctx.action.potential_action_correction(ctx.path, tail, head);

            if chain.finish(ctx.rng) {
                self.keep(ctx, head, tail, num_levels);
                true
            } else {
                self.undo(ctx, tail);
                false
            }
        } else {
            let mut bead = tail;
            for _ in 0..length {
                let pos = new_free_particle_position(ctx.path, ctx.constants, ctx.rng, bead);
                bead = ctx.path.add_next_bead(bead, pos);
            }
            let head = bead;
            ctx.path.worm.special1 = Some(head);

            let new_action = ctx.action.potential_action(ctx.path, tail, head);
            if ctx.rng.rand() < accept_probability(norm.ln() - new_action + mu_shift) {
                self.keep(ctx, head, tail, num_levels);
                true
            } else {
                self.undo(ctx, tail);
                false
            }
        }
    }

    fn stats(&self) -> &MoveStats {
        &self.stats
    }
}

/// Deletes the entire worm, restoring a diagonal configuration.  The exact
/// inverse of [`InsertMove`].
pub struct RemoveMove<const D: usize> {
    stats: MoveStats,
}

impl<const D: usize> RemoveMove<D> {
    pub fn new(max_level: usize) -> Self {
        RemoveMove {
            stats: MoveStats::new(max_level),
        }
    }

    fn keep(&mut self, ctx: &mut MoveContext<'_, D>, head: Bead, level: usize) {
        self.stats.accept(Some(level));
        let mut bead = Some(head);
        while let Some(b) = bead {
            bead = ctx.path.del_bead_get_prev(b);
        }
        ctx.path.worm.reset();
        ctx.path.worm.is_diagonal = true;
    }
}

impl<const D: usize> Move<D> for RemoveMove<D> {
    fn name(&self) -> &'static str {
        "remove"
    }

    fn operates_on(&self) -> Ensemble {
        Ensemble::OffDiagonal
    }

    fn attempt(&mut self, ctx: &mut MoveContext<'_, D>) -> bool {
        if ctx.path.worm.is_diagonal {
            return false;
        }
        let c = ctx.constants;
        let length = ctx.path.worm.length;
        if length < 1 || length > c.mbar || ctx.path.get_true_num_particles() < 1 {
            return false;
        }
        let (Some(head), Some(tail)) = (ctx.path.worm.head, ctx.path.worm.tail) else {
            return false;
        };

        let num_levels = levels_for(length);
        self.stats.attempt(Some(num_levels));

        let norm = 1.0
            / (c.c_worm * c.mbar as f64 * ctx.path.num_slices as f64 * ctx.path.cell.volume)
            * (c.attempt_prob("insert") / c.attempt_prob("remove"))
            * ctx.action.ensemble_weight(-(length as i64));
        let mu_shift = length as f64 * c.mu * c.tau;

        if ctx.action.local() {
            let action_shift = (-norm.ln() + mu_shift) / length as f64;
            let mut chain = RejectionChain::new();
            let mut factor = 0.5;
            let mut bead = head;
            loop {
                chain.delta -=
                    ctx.action.bare_potential_action(ctx.path, bead) - factor * action_shift;
                if !chain.step(ctx.rng) {
                    return false;
                }
                factor = 1.0;
                bead = ctx.path.prev(bead).expect("worm interior is linked");
                if bead == tail {
                    break;
                }
            }
            chain.delta -= ctx.action.bare_potential_action(ctx.path, tail) - 0.5 * action_shift;
            chain.delta -= ctx.action.potential_action_correction(ctx.path, tail, head);

            if chain.finish(ctx.rng) {
                self.keep(ctx, head, num_levels);
                true
            } else {
                false
            }
        } else {
            let old_action = ctx.action.potential_action(ctx.path, tail, head);
            if ctx.rng.rand() < accept_probability(norm.ln() + old_action - mu_shift) {
                self.keep(ctx, head, num_levels);
                true
            } else {
                false
            }
        }
    }

    fn stats(&self) -> &MoveStats {
        &self.stats
    }
}
