//! Worm-endpoint swap moves: reattaching the head (or tail) onto another
//! worldline through an Mbar-slice staged bridge.  This is how boson
//! permutations are sampled without explicit cycle construction.
//!
//! Pivot selection follows the cumulative-ρ₀ scheme: candidates come from
//! the grid cells neighboring the endpoint at the shifted slice, each
//! weighted by the free propagator across the stage.

use nalgebra::SVector;

use crate::action::Action;
use crate::lookup::Lookup;
use crate::path::{Bead, Path};
use crate::random::McRng;

use super::base::{
    accept_probability, levels_for, new_staging_position, Ensemble, Move, MoveContext, MoveStats,
};

/// Cumulative pivot-selection table shared by both swap directions.
struct PivotTable {
    cumulant: Vec<f64>,
}

impl PivotTable {
    fn new() -> Self {
        PivotTable {
            cumulant: Vec::new(),
        }
    }

    /// Total free-propagator weight Σ ρ₀(bead, candidate, links) over the
    /// current candidate list, leaving the normalized cumulative
    /// distribution behind for pivot selection.
    fn compute_norm<const D: usize>(
        &mut self,
        path: &Path<D>,
        action: &dyn Action<D>,
        lookup: &Lookup<D>,
        bead: Bead,
        links: usize,
    ) -> f64 {
        self.cumulant.clear();
        let mut sigma = 0.0;
        for &candidate in &lookup.full_bead_list {
            sigma += action.rho0(path, bead, candidate, links);
            self.cumulant.push(sigma);
        }
        if sigma > 0.0 {
            for c in &mut self.cumulant {
                *c /= sigma;
            }
        }
        sigma
    }

    /// Binary search of a uniform deviate against the cumulative table.
    fn select_pivot<const D: usize>(&self, rng: &mut McRng, lookup: &Lookup<D>) -> Bead {
        let u = rng.rand();
        let index = self
            .cumulant
            .partition_point(|&c| c < u)
            .min(self.cumulant.len() - 1);
        lookup.full_bead_list[index]
    }
}

/// Reattach the worm head onto a neighboring worldline.
pub struct SwapHeadMove<const D: usize> {
    stats: MoveStats,
    table: PivotTable,
    original_pos: Vec<SVector<f64, D>>,
}

impl<const D: usize> SwapHeadMove<D> {
    pub fn new(max_level: usize) -> Self {
        SwapHeadMove {
            stats: MoveStats::new(max_level),
            table: PivotTable::new(),
            original_pos: Vec::new(),
        }
    }
}

impl<const D: usize> Move<D> for SwapHeadMove<D> {
    fn name(&self) -> &'static str {
        "swap head"
    }

    fn operates_on(&self) -> Ensemble {
        Ensemble::OffDiagonal
    }

    fn attempt(&mut self, ctx: &mut MoveContext<'_, D>) -> bool {
        if ctx.path.worm.is_diagonal {
            return false;
        }
        let c = ctx.constants;
        let m = ctx.path.num_slices;
        let swap_length = c.mbar;
        let num_levels = levels_for(swap_length);

        let head = ctx.path.worm.head.expect("off-diagonal worm has a head");
        let tail = ctx.path.worm.tail.expect("off-diagonal worm has a tail");

        // Candidate pivots in the neighborhood of the head, Mbar slices
        // ahead in imaginary time.
        let pivot_slice = (head.slice + swap_length) % m;
        ctx.lookup
            .update_full_interaction_list(ctx.path, head, pivot_slice);
        if ctx.lookup.full_num_beads() == 0 {
            return false;
        }

        let sigma_head =
            self.table
                .compute_norm(ctx.path, ctx.action, ctx.lookup, head, swap_length);
        if sigma_head <= 0.0 {
            return false;
        }
        let pivot = self.table.select_pivot(ctx.rng, ctx.lookup);

        // Walk back from the pivot to find the swap bead; meeting the tail
        // kills the move (the stage would cross the worm).
        let mut bead = pivot;
        for _ in 0..swap_length {
            if bead == tail {
                return false;
            }
            bead = match ctx.path.prev(bead) {
                Some(pb) => pb,
                None => return false,
            };
        }
        let swap = bead;
        if swap == tail || !ctx.lookup.grid_neighbors(ctx.path, pivot, swap) {
            return false;
        }

        self.stats.attempt(Some(num_levels));

        // The reverse move selects the pivot from the swap bead's
        // neighborhood; rebuild the list only when the two differ.
        if !ctx.lookup.grid_share(ctx.path, head, swap) {
            ctx.lookup
                .update_full_interaction_list(ctx.path, swap, pivot_slice);
        }
        let sigma_swap =
            self.table
                .compute_norm(ctx.path, ctx.action, ctx.lookup, swap, swap_length);
        if sigma_swap <= 0.0 {
            return false;
        }

        // Pre-Metropolis on the pivot-selection normalization alone.
        if ctx.rng.rand() >= (sigma_head / sigma_swap).min(1.0) {
            return false;
        }

        // Snapshot the interior of the stage to be regrown.
        self.original_pos.clear();
        let mut bead = ctx.path.next(swap).expect("stage interior is linked");
        while bead != pivot {
            self.original_pos.push(ctx.path.pos(bead));
            bead = ctx.path.next(bead).expect("stage interior is linked");
        }

        let old_action = ctx.action.potential_action(ctx.path, swap, pivot);

        // Relink now so the staged regrowth can walk forward across the old
        // head; links are restored verbatim on rejection.
        let next_swap = ctx.path.next(swap).expect("swap bead has a successor");
        ctx.path.set_next(head, Some(next_swap));
        ctx.path.set_next(swap, None);
        ctx.path.set_prev(next_swap, Some(head));

        ctx.path.worm.special1 = Some(head);
        ctx.path.worm.special2 = Some(pivot);
        ctx.path.worm.head = Some(swap);
        let old_head = head;

        let mut bead = ctx.path.next(old_head).expect("stage interior is linked");
        let mut k = 0;
        while bead != pivot {
            let neighbor = ctx.path.prev(bead).expect("stage interior is linked");
            let pos = new_staging_position(
                ctx.path,
                ctx.constants,
                ctx.rng,
                neighbor,
                pivot,
                swap_length,
                k,
            );
            ctx.path.update_bead(bead, pos);
            k += 1;
            bead = ctx.path.next(bead).expect("stage interior is linked");
        }

        let new_action = ctx.action.potential_action(ctx.path, old_head, pivot);

        if ctx.rng.rand() < accept_probability(-(new_action - old_action)) {
            self.stats.accept(Some(num_levels));
            ctx.path.update_worm(swap, tail);
            true
        } else {
            ctx.path.worm.head = Some(old_head);
            ctx.path.set_next(old_head, None);
            ctx.path.set_next(swap, Some(next_swap));
            ctx.path.set_prev(next_swap, Some(swap));

            let mut bead = ctx.path.next(swap).expect("stage interior is linked");
            let mut k = 0;
            while bead != pivot {
                ctx.path.update_bead(bead, self.original_pos[k]);
                k += 1;
                bead = ctx.path.next(bead).expect("stage interior is linked");
            }

            ctx.path.worm.special1 = None;
            ctx.path.worm.special2 = None;
            ctx.path.worm.is_diagonal = false;
            false
        }
    }

    fn stats(&self) -> &MoveStats {
        &self.stats
    }
}

/// Reattach the worm tail onto a neighboring worldline; the time-reversed
/// analogue of [`SwapHeadMove`].
pub struct SwapTailMove<const D: usize> {
    stats: MoveStats,
    table: PivotTable,
    original_pos: Vec<SVector<f64, D>>,
}

impl<const D: usize> SwapTailMove<D> {
    pub fn new(max_level: usize) -> Self {
        SwapTailMove {
            stats: MoveStats::new(max_level),
            table: PivotTable::new(),
            original_pos: Vec::new(),
        }
    }
}

impl<const D: usize> Move<D> for SwapTailMove<D> {
    fn name(&self) -> &'static str {
        "swap tail"
    }

    fn operates_on(&self) -> Ensemble {
        Ensemble::OffDiagonal
    }

    fn attempt(&mut self, ctx: &mut MoveContext<'_, D>) -> bool {
        if ctx.path.worm.is_diagonal {
            return false;
        }
        let c = ctx.constants;
        let m = ctx.path.num_slices;
        let swap_length = c.mbar;
        let num_levels = levels_for(swap_length);

        let head = ctx.path.worm.head.expect("off-diagonal worm has a head");
        let tail = ctx.path.worm.tail.expect("off-diagonal worm has a tail");

        // Candidate pivots Mbar slices behind the tail.
        let pivot_slice = (tail.slice + m - swap_length) % m;
        ctx.lookup
            .update_full_interaction_list(ctx.path, tail, pivot_slice);
        if ctx.lookup.full_num_beads() == 0 {
            return false;
        }

        let sigma_tail =
            self.table
                .compute_norm(ctx.path, ctx.action, ctx.lookup, tail, swap_length);
        if sigma_tail <= 0.0 {
            return false;
        }
        let pivot = self.table.select_pivot(ctx.rng, ctx.lookup);

        // Walk forward from the pivot; meeting the head kills the move.
        let mut bead = pivot;
        for _ in 0..swap_length {
            if bead == head {
                return false;
            }
            bead = match ctx.path.next(bead) {
                Some(nb) => nb,
                None => return false,
            };
        }
        let swap = bead;
        if swap == head || !ctx.lookup.grid_neighbors(ctx.path, pivot, swap) {
            return false;
        }

        self.stats.attempt(Some(num_levels));

        if !ctx.lookup.grid_share(ctx.path, tail, swap) {
            ctx.lookup
                .update_full_interaction_list(ctx.path, swap, pivot_slice);
        }
        let sigma_swap =
            self.table
                .compute_norm(ctx.path, ctx.action, ctx.lookup, swap, swap_length);
        if sigma_swap <= 0.0 {
            return false;
        }

        if ctx.rng.rand() >= (sigma_tail / sigma_swap).min(1.0) {
            return false;
        }

        // Snapshot the interior walking backward from the swap bead.
        self.original_pos.clear();
        let mut bead = ctx.path.prev(swap).expect("stage interior is linked");
        while bead != pivot {
            self.original_pos.push(ctx.path.pos(bead));
            bead = ctx.path.prev(bead).expect("stage interior is linked");
        }

        let old_action = ctx.action.potential_action(ctx.path, pivot, swap);

        let prev_swap = ctx.path.prev(swap).expect("swap bead has a predecessor");
        ctx.path.set_prev(tail, Some(prev_swap));
        ctx.path.set_prev(swap, None);
        ctx.path.set_next(prev_swap, Some(tail));

        ctx.path.worm.special1 = Some(tail);
        ctx.path.worm.special2 = Some(pivot);
        ctx.path.worm.tail = Some(swap);
        let old_tail = tail;

        let mut bead = ctx.path.prev(old_tail).expect("stage interior is linked");
        let mut k = 0;
        while bead != pivot {
            let neighbor = ctx.path.next(bead).expect("stage interior is linked");
            let pos = new_staging_position(
                ctx.path,
                ctx.constants,
                ctx.rng,
                neighbor,
                pivot,
                swap_length,
                k,
            );
            ctx.path.update_bead(bead, pos);
            k += 1;
            bead = ctx.path.prev(bead).expect("stage interior is linked");
        }

        let new_action = ctx.action.potential_action(ctx.path, pivot, old_tail);

        if ctx.rng.rand() < accept_probability(-(new_action - old_action)) {
            self.stats.accept(Some(num_levels));
            ctx.path.update_worm(head, swap);
            true
        } else {
            ctx.path.worm.tail = Some(old_tail);
            ctx.path.set_prev(old_tail, None);
            ctx.path.set_prev(swap, Some(prev_swap));
            ctx.path.set_next(prev_swap, Some(swap));

            let mut bead = ctx.path.prev(swap).expect("stage interior is linked");
            let mut k = 0;
            while bead != pivot {
                ctx.path.update_bead(bead, self.original_pos[k]);
                k += 1;
                bead = ctx.path.prev(bead).expect("stage interior is linked");
            }

            ctx.path.worm.special1 = None;
            ctx.path.worm.special2 = None;
            ctx.path.worm.is_diagonal = false;
            false
        }
    }

    fn stats(&self) -> &MoveStats {
        &self.stats
    }
}
