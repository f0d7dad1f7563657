//! Staging regeneration of a fixed-endpoint worldline segment.

use nalgebra::SVector;

use crate::constants::SimConstants;
use crate::path::Bead;

use super::base::{
    accept_probability, new_staging_position, Ensemble, Move, MoveContext, MoveStats,
};

/// Redraws the Mbar-1 interior beads of a randomly chosen stage from the
/// exact kinetic density matrix, so the Metropolis test only sees the change
/// in potential action.
pub struct StagingMove<const D: usize> {
    stats: MoveStats,
    original_pos: Vec<SVector<f64, D>>,
}

impl<const D: usize> StagingMove<D> {
    pub fn new(constants: &SimConstants) -> Self {
        StagingMove {
            stats: MoveStats::new(0),
            original_pos: Vec::with_capacity(constants.mbar - 1),
        }
    }
}

impl<const D: usize> Move<D> for StagingMove<D> {
    fn name(&self) -> &'static str {
        "staging"
    }

    fn operates_on(&self) -> Ensemble {
        Ensemble::Any
    }

    fn attempt(&mut self, ctx: &mut MoveContext<'_, D>) -> bool {
        let mbar = ctx.constants.mbar;

        // A bare worm is handled by the worm moves; staging across it would
        // spin forever looking for a closed stretch.
        if ctx.path.get_true_num_particles() == 0 {
            return false;
        }

        let slice = ctx.rng.rand_int(ctx.path.num_slices - 1);
        if ctx.path.num_beads_at_slice(slice) == 0 {
            return false;
        }
        let start = Bead::new(slice, ctx.rng.rand_int(ctx.path.num_beads_at_slice(slice) - 1));

        // The whole stage must be live and must not cross the worm head.
        let head = ctx.path.worm.head;
        let mut bead = start;
        for _ in 0..mbar {
            if Some(bead) == head {
                return false;
            }
            bead = match ctx.path.next(bead) {
                Some(nb) => nb,
                None => return false,
            };
        }
        let end = bead;
        let last_interior = ctx.path.prev(end).expect("stage interior is linked");

        self.stats.attempt(None);

        let old_action = ctx.action.potential_action(ctx.path, start, last_interior);

        self.original_pos.clear();
        let mut bead = start;
        for k in 0..mbar - 1 {
            bead = ctx.path.next(bead).expect("stage interior is linked");
            self.original_pos.push(ctx.path.pos(bead));
            let neighbor = ctx.path.prev(bead).expect("stage interior is linked");
            let pos = new_staging_position(ctx.path, ctx.constants, ctx.rng, neighbor, end, mbar, k);
            ctx.path.update_bead(bead, pos);
        }

        let new_action = ctx.action.potential_action(ctx.path, start, last_interior);

        if ctx.rng.rand() < accept_probability(-(new_action - old_action)) {
            self.stats.accept(None);
            true
        } else {
            let mut bead = start;
            for k in 0..mbar - 1 {
                bead = ctx.path.next(bead).expect("stage interior is linked");
                ctx.path.update_bead(bead, self.original_pos[k]);
            }
            false
        }
    }

    fn stats(&self) -> &MoveStats {
        &self.stats
    }
}
