//! Endpoint propagation: advancing or receding the worm head and tail in
//! imaginary time.  Advance-head and recede-tail grow the worm by sampling
//! new beads from the free-particle kernel; recede-head and advance-tail
//! shrink it by deleting beads.  Each direction is balanced against its
//! partner through the attempt-probability ratio and exp(±μτL).

use crate::path::Bead;

use super::base::{
    accept_probability, levels_for, new_free_particle_position, Ensemble, Move, MoveContext,
    MoveStats, RejectionChain,
};

/// Extends the worm head forward by an even number of slices.
pub struct AdvanceHeadMove<const D: usize> {
    stats: MoveStats,
}

impl<const D: usize> AdvanceHeadMove<D> {
    pub fn new(max_level: usize) -> Self {
        AdvanceHeadMove {
            stats: MoveStats::new(max_level),
        }
    }

    fn undo(&self, ctx: &mut MoveContext<'_, D>) {
        let old_head = ctx.path.worm.special1.expect("move holds the old head");
        ctx.path.worm.head = Some(old_head);

        let mut bead = ctx.path.next(old_head);
        while let Some(b) = bead {
            bead = ctx.path.del_bead_get_next(b);
        }
        ctx.path.set_next(old_head, None);

        ctx.path.worm.special1 = None;
        ctx.path.worm.is_diagonal = false;
    }
}

impl<const D: usize> Move<D> for AdvanceHeadMove<D> {
    fn name(&self) -> &'static str {
        "advance head"
    }

    fn operates_on(&self) -> Ensemble {
        Ensemble::OffDiagonal
    }

    fn attempt(&mut self, ctx: &mut MoveContext<'_, D>) -> bool {
        if ctx.path.worm.is_diagonal {
            return false;
        }
        let c = ctx.constants;

        let length = 2 * (1 + ctx.rng.rand_int(c.mbar / 2 - 1));
        let num_levels = levels_for(length);
        self.stats.attempt(Some(num_levels));

        let mu_shift = length as f64 * c.tau * c.mu;
        let norm = c.attempt_prob("recede head") / c.attempt_prob("advance head")
            * ctx.action.ensemble_weight(length as i64);

        // The old head becomes a special marker while the new trajectory is
        // grown past it.
        let old_head = ctx.path.worm.head.take().expect("off-diagonal worm has a head");
        ctx.path.worm.special1 = Some(old_head);

        if ctx.action.local() {
            let action_shift = (norm.ln() + mu_shift) / length as f64;
            let mut chain = RejectionChain::new();

            chain.delta +=
                ctx.action.bare_potential_action(ctx.path, old_head) - 0.5 * action_shift;
            if !chain.step(ctx.rng) {
                self.undo(ctx);
                return false;
            }

            let mut bead = old_head;
            for _ in 0..length - 1 {
                let pos = new_free_particle_position(ctx.path, ctx.constants, ctx.rng, bead);
                bead = ctx.path.add_next_bead(bead, pos);
                chain.delta += ctx.action.bare_potential_action(ctx.path, bead) - action_shift;
                if !chain.step(ctx.rng) {
                    self.undo(ctx);
                    return false;
                }
            }
            let pos = new_free_particle_position(ctx.path, ctx.constants, ctx.rng, bead);
            let head = ctx.path.add_next_bead(bead, pos);
            ctx.path.worm.head = Some(head);

            chain.delta += ctx.action.bare_potential_action(ctx.path, head) - 0.5 * action_shift;
            chain.delta += ctx.action.potential_action_correction(ctx.path, old_head, head);

            if chain.finish(ctx.rng) {
                self.stats.accept(Some(num_levels));
                let tail = ctx.path.worm.tail.expect("off-diagonal worm has a tail");
                ctx.path.update_worm(head, tail);
                ctx.path.worm.is_diagonal = false;
                true
            } else {
                self.undo(ctx);
                false
            }
        } else {
            let mut bead = old_head;
            for _ in 0..length {
                let pos = new_free_particle_position(ctx.path, ctx.constants, ctx.rng, bead);
                bead = ctx.path.add_next_bead(bead, pos);
            }
            let head = bead;
            ctx.path.worm.head = Some(head);

            let new_action = ctx.action.potential_action(ctx.path, old_head, head);
            if ctx.rng.rand() < accept_probability(norm.ln() - new_action + mu_shift) {
                self.stats.accept(Some(num_levels));
                let tail = ctx.path.worm.tail.expect("off-diagonal worm has a tail");
                ctx.path.update_worm(head, tail);
                ctx.path.worm.is_diagonal = false;
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

/// Retracts the worm head backward by deleting an even number of beads.
pub struct RecedeHeadMove<const D: usize> {
    stats: MoveStats,
}

impl<const D: usize> RecedeHeadMove<D> {
    pub fn new(max_level: usize) -> Self {
        RecedeHeadMove {
            stats: MoveStats::new(max_level),
        }
    }

    fn keep(&mut self, ctx: &mut MoveContext<'_, D>, new_head: Bead, level: usize) {
        self.stats.accept(Some(level));
        let mut bead = ctx.path.next(new_head);
        while let Some(b) = bead {
            bead = ctx.path.del_bead_get_next(b);
        }
        let tail = ctx.path.worm.tail.expect("off-diagonal worm has a tail");
        ctx.path.update_worm(new_head, tail);
        ctx.path.worm.is_diagonal = false;
    }
}

impl<const D: usize> Move<D> for RecedeHeadMove<D> {
    fn name(&self) -> &'static str {
        "recede head"
    }

    fn operates_on(&self) -> Ensemble {
        Ensemble::OffDiagonal
    }

    fn attempt(&mut self, ctx: &mut MoveContext<'_, D>) -> bool {
        if ctx.path.worm.is_diagonal {
            return false;
        }
        let c = ctx.constants;

        let length = 2 * (1 + ctx.rng.rand_int(c.mbar / 2 - 1));
        if length >= ctx.path.worm.length {
            return false;
        }
        let num_levels = levels_for(length);

        let head = ctx.path.worm.head.expect("off-diagonal worm has a head");
        let new_head = ctx
            .path
            .prev_by(head, length)
            .expect("worm is longer than the recession");

        let mu_shift = length as f64 * c.tau * c.mu;
        let norm = c.attempt_prob("advance head") / c.attempt_prob("recede head")
            * ctx.action.ensemble_weight(-(length as i64));

        self.stats.attempt(Some(num_levels));
        ctx.path.worm.special1 = Some(new_head);

        let accepted = if ctx.action.local() {
            let action_shift = (-norm.ln() + mu_shift) / length as f64;
            let mut chain = RejectionChain::new();
            let mut factor = 0.5;
            let mut bead = head;
            let mut ok = true;
            loop {
                chain.delta -=
                    ctx.action.bare_potential_action(ctx.path, bead) - factor * action_shift;
                if !chain.step(ctx.rng) {
                    ok = false;
                    break;
                }
                factor = 1.0;
                bead = ctx.path.prev(bead).expect("worm interior is linked");
                if bead == new_head {
                    break;
                }
            }
            if ok {
                chain.delta -=
                    ctx.action.bare_potential_action(ctx.path, new_head) - 0.5 * action_shift;
                chain.delta -= ctx.action.potential_action_correction(ctx.path, new_head, head);
                chain.finish(ctx.rng)
            } else {
                false
            }
        } else {
            let old_action = ctx.action.potential_action(ctx.path, new_head, head);
            ctx.rng.rand() < accept_probability(norm.ln() + old_action - mu_shift)
        };

        if accepted {
            self.keep(ctx, new_head, num_levels);
            true
        } else {
            ctx.path.worm.special1 = None;
            ctx.path.worm.is_diagonal = false;
            false
        }
    }

    fn stats(&self) -> &MoveStats {
        &self.stats
    }
}

/// Advances the worm tail forward by deleting an even number of beads,
/// shrinking the worm.
pub struct AdvanceTailMove<const D: usize> {
    stats: MoveStats,
}

impl<const D: usize> AdvanceTailMove<D> {
    pub fn new(max_level: usize) -> Self {
        AdvanceTailMove {
            stats: MoveStats::new(max_level),
        }
    }

    fn keep(&mut self, ctx: &mut MoveContext<'_, D>, new_tail: Bead, level: usize) {
        self.stats.accept(Some(level));
        let mut bead = ctx.path.prev(new_tail);
        while let Some(b) = bead {
            bead = ctx.path.del_bead_get_prev(b);
        }
        let head = ctx.path.worm.head.expect("off-diagonal worm has a head");
        ctx.path.update_worm(head, new_tail);
        ctx.path.worm.is_diagonal = false;
    }
}

impl<const D: usize> Move<D> for AdvanceTailMove<D> {
    fn name(&self) -> &'static str {
        "advance tail"
    }

    fn operates_on(&self) -> Ensemble {
        Ensemble::OffDiagonal
    }

    fn attempt(&mut self, ctx: &mut MoveContext<'_, D>) -> bool {
        if ctx.path.worm.is_diagonal {
            return false;
        }
        let c = ctx.constants;

        let length = 2 * (1 + ctx.rng.rand_int(c.mbar / 2 - 1));
        if length >= ctx.path.worm.length {
            return false;
        }
        let num_levels = levels_for(length);

        let tail = ctx.path.worm.tail.expect("off-diagonal worm has a tail");
        let new_tail = ctx
            .path
            .next_by(tail, length)
            .expect("worm is longer than the advancement");

        let mu_shift = length as f64 * c.tau * c.mu;
        let norm = c.attempt_prob("recede tail") / c.attempt_prob("advance tail")
            * ctx.action.ensemble_weight(-(length as i64));

        self.stats.attempt(Some(num_levels));
        ctx.path.worm.special1 = Some(new_tail);

        let accepted = if ctx.action.local() {
            let action_shift = (-norm.ln() + mu_shift) / length as f64;
            let mut chain = RejectionChain::new();
            let mut factor = 0.5;
            let mut bead = tail;
            let mut ok = true;
            loop {
                chain.delta -=
                    ctx.action.bare_potential_action(ctx.path, bead) - factor * action_shift;
                if !chain.step(ctx.rng) {
                    ok = false;
                    break;
                }
                factor = 1.0;
                bead = ctx.path.next(bead).expect("worm interior is linked");
                if bead == new_tail {
                    break;
                }
            }
            if ok {
                chain.delta -=
                    ctx.action.bare_potential_action(ctx.path, new_tail) - 0.5 * action_shift;
                chain.delta -= ctx.action.potential_action_correction(ctx.path, tail, new_tail);
                chain.finish(ctx.rng)
            } else {
                false
            }
        } else {
            let old_action = ctx.action.potential_action(ctx.path, tail, new_tail);
            ctx.rng.rand() < accept_probability(norm.ln() + old_action - mu_shift)
        };

        if accepted {
            self.keep(ctx, new_tail, num_levels);
            true
        } else {
            ctx.path.worm.special1 = None;
            ctx.path.worm.is_diagonal = false;
            false
        }
    }

    fn stats(&self) -> &MoveStats {
        &self.stats
    }
}

/// Recedes the worm tail backward by growing new beads, lengthening the
/// worm.
pub struct RecedeTailMove<const D: usize> {
    stats: MoveStats,
}

impl<const D: usize> RecedeTailMove<D> {
    pub fn new(max_level: usize) -> Self {
        RecedeTailMove {
            stats: MoveStats::new(max_level),
        }
    }

    fn undo(&self, ctx: &mut MoveContext<'_, D>) {
        let old_tail = ctx.path.worm.special1.expect("move holds the old tail");
        ctx.path.worm.tail = Some(old_tail);

        let mut bead = ctx.path.prev(old_tail);
        while let Some(b) = bead {
            bead = ctx.path.del_bead_get_prev(b);
        }
        ctx.path.set_prev(old_tail, None);

        ctx.path.worm.special1 = None;
        ctx.path.worm.is_diagonal = false;
    }
}

impl<const D: usize> Move<D> for RecedeTailMove<D> {
    fn name(&self) -> &'static str {
        "recede tail"
    }

    fn operates_on(&self) -> Ensemble {
        Ensemble::OffDiagonal
    }

    fn attempt(&mut self, ctx: &mut MoveContext<'_, D>) -> bool {
        if ctx.path.worm.is_diagonal {
            return false;
        }
        let c = ctx.constants;

        let length = 2 * (1 + ctx.rng.rand_int(c.mbar / 2 - 1));
        let num_levels = levels_for(length);
        self.stats.attempt(Some(num_levels));

        let mu_shift = length as f64 * c.tau * c.mu;
        let norm = c.attempt_prob("advance tail") / c.attempt_prob("recede tail")
            * ctx.action.ensemble_weight(length as i64);

        let old_tail = ctx.path.worm.tail.take().expect("off-diagonal worm has a tail");
        ctx.path.worm.special1 = Some(old_tail);

        if ctx.action.local() {
            let action_shift = (norm.ln() + mu_shift) / length as f64;
            let mut chain = RejectionChain::new();

            chain.delta +=
                ctx.action.bare_potential_action(ctx.path, old_tail) - 0.5 * action_shift;
            if !chain.step(ctx.rng) {
                self.undo(ctx);
                return false;
            }

            let mut bead = old_tail;
            for _ in 0..length - 1 {
                let pos = new_free_particle_position(ctx.path, ctx.constants, ctx.rng, bead);
                bead = ctx.path.add_prev_bead(bead, pos);
                chain.delta += ctx.action.bare_potential_action(ctx.path, bead) - action_shift;
                if !chain.step(ctx.rng) {
                    self.undo(ctx);
                    return false;
                }
            }
            let pos = new_free_particle_position(ctx.path, ctx.constants, ctx.rng, bead);
            let tail = ctx.path.add_prev_bead(bead, pos);
            ctx.path.worm.tail = Some(tail);

            chain.delta += ctx.action.bare_potential_action(ctx.path, tail) - 0.5 * action_shift;
            chain.delta += ctx.action.potential_action_correction(ctx.path, tail, old_tail);

            if chain.finish(ctx.rng) {
                self.stats.accept(Some(num_levels));
                let head = ctx.path.worm.head.expect("off-diagonal worm has a head");
                ctx.path.update_worm(head, tail);
                ctx.path.worm.is_diagonal = false;
                true
            } else {
                self.undo(ctx);
                false
            }
        } else {
            let mut bead = old_tail;
            for _ in 0..length {
                let pos = new_free_particle_position(ctx.path, ctx.constants, ctx.rng, bead);
                bead = ctx.path.add_prev_bead(bead, pos);
            }
            let tail = bead;
            ctx.path.worm.tail = Some(tail);

            let new_action = ctx.action.potential_action(ctx.path, tail, old_tail);
            if ctx.rng.rand() < accept_probability(norm.ln() - new_action + mu_shift) {
                self.stats.accept(Some(num_levels));
                let head = ctx.path.worm.head.expect("off-diagonal worm has a head");
                ctx.path.update_worm(head, tail);
                ctx.path.worm.is_diagonal = false;
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
