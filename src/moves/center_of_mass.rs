//! Rigid displacement of a whole worldline.

use nalgebra::SVector;

use crate::path::Bead;

use super::base::{accept_probability, Ensemble, Move, MoveContext, MoveStats};

/// Shifts every bead of one worldline (or the whole worm) by a single random
/// vector drawn from [-Δ/2, Δ/2]^D.  The worldline is always entered from
/// slice 0.
pub struct CenterOfMassMove<const D: usize> {
    stats: MoveStats,
    beads: Vec<Bead>,
    original_pos: Vec<SVector<f64, D>>,
}

impl<const D: usize> CenterOfMassMove<D> {
    pub fn new() -> Self {
        CenterOfMassMove {
            stats: MoveStats::new(0),
            beads: Vec::new(),
            original_pos: Vec::new(),
        }
    }

    /// Collect the worldline through `start` (via forward links, inclusive of
    /// `end`) into the scratch list.  Returns false when the cycle is longer
    /// than one full wind of imaginary time.
    fn collect_worldline(&mut self, ctx: &MoveContext<'_, D>, start: Bead, end: Bead) -> bool {
        let m = ctx.path.num_slices;
        self.beads.clear();
        let mut bead = start;
        loop {
            self.beads.push(bead);
            if self.beads.len() > m {
                return false;
            }
            if bead == end {
                return true;
            }
            match ctx.path.next(bead) {
                Some(nb) => bead = nb,
                None => {
                    debug_assert!(false, "worldline broke before its end bead");
                    return false;
                }
            }
        }
    }
}

impl<const D: usize> Default for CenterOfMassMove<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const D: usize> Move<D> for CenterOfMassMove<D> {
    fn name(&self) -> &'static str {
        "center of mass"
    }

    fn operates_on(&self) -> Ensemble {
        Ensemble::Any
    }

    fn attempt(&mut self, ctx: &mut MoveContext<'_, D>) -> bool {
        if ctx.path.num_beads_at_slice(0) == 0 {
            return false;
        }
        let mut start = Bead::new(0, ctx.rng.rand_int(ctx.path.num_beads_at_slice(0) - 1));

        // A worm is displaced from tail to head; a closed cycle from the
        // start bead around to its predecessor.  Cycles winding more than
        // once around imaginary time are left to the other moves.
        let end;
        if !ctx.path.worm.is_diagonal && ctx.path.worm_found_bead(start) {
            if ctx.path.worm.length >= ctx.path.num_slices {
                return false;
            }
            start = ctx.path.worm.tail.expect("off-diagonal worm has a tail");
            end = ctx.path.worm.head.expect("off-diagonal worm has a head");
        } else {
            end = ctx.path.prev(start).expect("closed worldline has a predecessor");
        }
        if !self.collect_worldline(ctx, start, end) {
            return false;
        }

        self.stats.attempt(None);

        let shift: SVector<f64, D> =
            SVector::from_fn(|_, _| ctx.constants.delta * (ctx.rng.rand() - 0.5));

        // With hard walls anywhere, reject outright if the shift would carry
        // any bead out of the cell.
        if !ctx.path.cell.periodic.iter().all(|&p| p) {
            for &b in &self.beads {
                let mut pos = ctx.path.pos(b) + shift;
                ctx.path.cell.put_inside(&mut pos);
                if !ctx.path.cell.inside(&pos) {
                    return false;
                }
            }
        }

        let old_action = ctx.action.potential_action(ctx.path, start, end);

        self.original_pos.clear();
        for &b in &self.beads {
            self.original_pos.push(ctx.path.pos(b));
            let mut pos = ctx.path.pos(b) + shift;
            ctx.path.cell.put_inside(&mut pos);
            ctx.path.update_bead(b, pos);
        }

        let new_action = ctx.action.potential_action(ctx.path, start, end);

        if ctx.rng.rand() < accept_probability(-(new_action - old_action)) {
            self.stats.accept(None);
            true
        } else {
            for (&b, &pos) in self.beads.iter().zip(self.original_pos.iter()) {
                ctx.path.update_bead(b, pos);
            }
            false
        }
    }

    fn stats(&self) -> &MoveStats {
        &self.stats
    }
}
