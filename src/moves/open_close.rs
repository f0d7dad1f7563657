//! The open/close pair: cutting a gap into a closed worldline and sewing it
//! back up.  These are the sector-changing moves that create and destroy the
//! worm, balanced against each other through the worm constant C, the free
//! propagator and the chemical-potential shift.

use crate::path::Bead;

use super::base::{
    accept_probability, levels_for, new_staging_position, Ensemble, Move, MoveContext, MoveStats,
    RejectionChain,
};

/// Removes an even-length stretch of beads between a proposed head and tail,
/// leaving an off-diagonal configuration.
pub struct OpenMove<const D: usize> {
    stats: MoveStats,
}

impl<const D: usize> OpenMove<D> {
    pub fn new(max_level: usize) -> Self {
        OpenMove {
            stats: MoveStats::new(max_level),
        }
    }

    fn keep(&mut self, ctx: &mut MoveContext<'_, D>, head: Bead, tail: Bead, level: usize) {
        self.stats.accept(Some(level));

        // Unlink and delete the gap beads.
        let mut bead = ctx.path.next(head);
        while let Some(b) = bead {
            if b == tail {
                break;
            }
            bead = ctx.path.del_bead_get_next(b);
        }

        ctx.path.update_worm(head, tail);
        ctx.path.worm.is_diagonal = false;
    }

    fn undo(&self, ctx: &mut MoveContext<'_, D>) {
        ctx.path.worm.reset();
        ctx.path.worm.is_diagonal = true;
    }
}

impl<const D: usize> Move<D> for OpenMove<D> {
    fn name(&self) -> &'static str {
        "open"
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

        // Even gap length, and head/tail pinned to even slices: required for
        // detailed balance against the staged close.
        let gap = 2 * (1 + ctx.rng.rand_int(c.mbar / 2 - 1));
        let num_levels = levels_for(gap);

        let slice = 2 * ctx.rng.rand_int(m / 2 - 1);
        if ctx.path.num_beads_at_slice(slice) == 0 {
            return false;
        }
        let head = Bead::new(slice, ctx.rng.rand_int(ctx.path.num_beads_at_slice(slice) - 1));
        let tail = match ctx.path.next_by(head, gap) {
            Some(b) => b,
            None => return false,
        };

        let sep = ctx.path.get_separation(head, tail);
        if ctx.path.worm.too_costly_sep(&sep, gap) {
            return false;
        }

        // Everything in the acceptance that is independent of the potential.
        let norm = c.c_worm * c.mbar as f64 * ctx.path.num_beads_on() as f64
            / ctx.action.rho0(ctx.path, head, tail, gap)
            * (c.attempt_prob("close") / c.attempt_prob("open"))
            * ctx.action.ensemble_weight(1 - gap as i64);
        let mu_shift = gap as f64 * c.mu * c.tau;

        self.stats.attempt(Some(num_levels));
        ctx.path.worm.special1 = Some(head);
        ctx.path.worm.special2 = Some(tail);

        if ctx.action.local() {
            // Per-slice rejection sampling over the beads to be removed; end
            // slices carry half the uniform action shift.
            let action_shift = (-norm.ln() + mu_shift) / gap as f64;
            let mut chain = RejectionChain::new();
            let mut factor = 0.5;
            let mut bead = head;
            loop {
                chain.delta -= ctx.action.bare_potential_action(ctx.path, bead) - factor * action_shift;
                if !chain.step(ctx.rng) {
                    self.undo(ctx);
                    return false;
                }
                factor = 1.0;
                bead = ctx.path.next(bead).expect("gap interior is linked");
                if bead == tail {
                    break;
                }
            }
            chain.delta -= ctx.action.bare_potential_action(ctx.path, tail) - 0.5 * action_shift;
            chain.delta -= ctx.action.potential_action_correction(ctx.path, head, tail);

            if chain.finish(ctx.rng) {
                self.keep(ctx, head, tail, num_levels);
                true
            } else {
                self.undo(ctx);
                false
            }
        } else {
            let old_action = ctx.action.potential_action(ctx.path, head, tail);
            if ctx.rng.rand() < accept_probability(norm.ln() + old_action - mu_shift) {
                self.keep(ctx, head, tail, num_levels);
                true
            } else {
                self.undo(ctx);
                false
            }
        }
    }

    fn stats(&self) -> &MoveStats {
        &self.stats
    }
}

/// Regrows the gap between head and tail by staging and restores a diagonal
/// configuration.  The exact inverse of [`OpenMove`].
pub struct CloseMove<const D: usize> {
    stats: MoveStats,
}

impl<const D: usize> CloseMove<D> {
    pub fn new(max_level: usize) -> Self {
        CloseMove {
            stats: MoveStats::new(max_level),
        }
    }

    fn keep(&mut self, ctx: &mut MoveContext<'_, D>, level: usize) {
        self.stats.accept(Some(level));
        ctx.path.worm.reset();
        ctx.path.worm.is_diagonal = true;
    }

    /// Delete whatever partial trajectory has been grown and reopen the gap.
    fn undo(&self, ctx: &mut MoveContext<'_, D>, head: Bead, tail: Bead) {
        let mut bead = ctx.path.next(head);
        while let Some(b) = bead {
            if b == tail {
                break;
            }
            bead = ctx.path.del_bead_get_next(b);
        }
        ctx.path.set_next(head, None);
        ctx.path.set_prev(tail, None);
        ctx.path.worm.is_diagonal = false;
    }
}

impl<const D: usize> Move<D> for CloseMove<D> {
    fn name(&self) -> &'static str {
        "close"
    }

    fn operates_on(&self) -> Ensemble {
        Ensemble::OffDiagonal
    }

    fn attempt(&mut self, ctx: &mut MoveContext<'_, D>) -> bool {
        if ctx.path.worm.is_diagonal {
            return false;
        }
        let c = ctx.constants;
        let gap = ctx.path.worm.gap;
        if gap == 0 || gap > c.mbar {
            return false;
        }
        let (Some(head), Some(tail)) = (ctx.path.worm.head, ctx.path.worm.tail) else {
            return false;
        };
        let sep = ctx.path.get_separation(head, tail);
        if ctx.path.worm.too_costly_sep(&sep, gap) {
            return false;
        }

        let num_levels = levels_for(gap);
        self.stats.attempt(Some(num_levels));

        let norm = ctx.action.rho0(ctx.path, head, tail, gap)
            / (c.c_worm * c.mbar as f64 * (ctx.path.num_beads_on() + gap - 1) as f64)
            * (c.attempt_prob("open") / c.attempt_prob("close"))
            * ctx.action.ensemble_weight(gap as i64 - 1);
        let mu_shift = gap as f64 * c.mu * c.tau;

        if ctx.action.local() {
            let action_shift = (norm.ln() + mu_shift) / gap as f64;
            let mut chain = RejectionChain::new();

            chain.delta += ctx.action.bare_potential_action(ctx.path, head) - 0.5 * action_shift;
            if !chain.step(ctx.rng) {
                self.undo(ctx, head, tail);
                return false;
            }

            let mut bead = head;
            for k in 0..gap - 1 {
                let pos =
                    new_staging_position(ctx.path, ctx.constants, ctx.rng, bead, tail, gap, k);
                bead = ctx.path.add_next_bead(bead, pos);
                chain.delta += ctx.action.bare_potential_action(ctx.path, bead) - action_shift;
                if !chain.step(ctx.rng) {
                    self.undo(ctx, head, tail);
                    return false;
                }
            }
            ctx.path.set_next(bead, Some(tail));
            ctx.path.set_prev(tail, Some(bead));

            chain.delta += ctx.action.bare_potential_action(ctx.path, tail) - 0.5 * action_shift;
            chain.delta += ctx.action.potential_action_correction(ctx.path, head, tail);

            if chain.finish(ctx.rng) {
                self.keep(ctx, num_levels);
                true
            } else {
                self.undo(ctx, head, tail);
                false
            }
        } else {
            let mut bead = head;
            for k in 0..gap - 1 {
                let pos =
                    new_staging_position(ctx.path, ctx.constants, ctx.rng, bead, tail, gap, k);
                bead = ctx.path.add_next_bead(bead, pos);
            }
            ctx.path.set_next(bead, Some(tail));
            ctx.path.set_prev(tail, Some(bead));

            let new_action = ctx.action.potential_action(ctx.path, head, tail);
            if ctx.rng.rand() < accept_probability(norm.ln() - new_action + mu_shift) {
                self.keep(ctx, num_levels);
                true
            } else {
                self.undo(ctx, head, tail);
                false
            }
        }
    }

    fn stats(&self) -> &MoveStats {
        &self.stats
    }
}
