//! The sweep driver: weighted move selection with ensemble filtering.
//!
//! One step draws a single move from the table with probability proportional
//! to its attempt weight, restricted to moves whose ensemble tag matches the
//! current worm sector, and runs its attempt to completion.  The driver owns
//! the global attempt/accept tallies and the diagonal-fraction tracking.

use crate::action::Action;
use crate::constants::SimConstants;
use crate::lookup::Lookup;
use crate::moves::{
    AdvanceHeadMove, AdvanceTailMove, BisectionMove, CenterOfMassMove, CloseMove, InsertMove,
    Move, MoveContext, MoveStats, OpenMove, RecedeHeadMove, RecedeTailMove, RemoveMove,
    StagingMove, SwapHeadMove, SwapTailMove,
};
use crate::path::Path;
use crate::random::McRng;

pub struct MoveTable<const D: usize> {
    moves: Vec<Box<dyn Move<D>>>,
    weights: Vec<f64>,
    pub total_attempted: u64,
    pub total_accepted: u64,
    pub steps: u64,
    pub diagonal_steps: u64,
}

impl<const D: usize> MoveTable<D> {
    pub fn new() -> Self {
        MoveTable {
            moves: Vec::new(),
            weights: Vec::new(),
            total_attempted: 0,
            total_accepted: 0,
            steps: 0,
            diagonal_steps: 0,
        }
    }

    /// The full worm-algorithm move mixture, weighted by the constants'
    /// attempt-probability table.
    pub fn standard(constants: &SimConstants) -> Self {
        let max_level = crate::moves::levels_for(constants.mbar).max(constants.b);
        let mut table = MoveTable::new();
        table.push(Box::new(CenterOfMassMove::new()), constants);
        table.push(Box::new(StagingMove::new(constants)), constants);
        table.push(Box::new(BisectionMove::new(constants)), constants);
        table.push(Box::new(OpenMove::new(max_level)), constants);
        table.push(Box::new(CloseMove::new(max_level)), constants);
        table.push(Box::new(InsertMove::new(max_level)), constants);
        table.push(Box::new(RemoveMove::new(max_level)), constants);
        table.push(Box::new(AdvanceHeadMove::new(max_level)), constants);
        table.push(Box::new(RecedeHeadMove::new(max_level)), constants);
        table.push(Box::new(AdvanceTailMove::new(max_level)), constants);
        table.push(Box::new(RecedeTailMove::new(max_level)), constants);
        table.push(Box::new(SwapHeadMove::new(max_level)), constants);
        table.push(Box::new(SwapTailMove::new(max_level)), constants);
        table
    }

    pub fn push(&mut self, m: Box<dyn Move<D>>, constants: &SimConstants) {
        let weight = constants.attempt_prob(m.name());
        self.moves.push(m);
        self.weights.push(weight);
    }

    /// Draw and attempt one move.  Returns whether it was accepted.
    pub fn step(
        &mut self,
        path: &mut Path<D>,
        action: &dyn Action<D>,
        lookup: &mut Lookup<D>,
        constants: &SimConstants,
        rng: &mut McRng,
    ) -> bool {
        let diagonal = path.worm.is_diagonal;
        let eligible: f64 = self
            .moves
            .iter()
            .zip(&self.weights)
            .filter(|(m, _)| m.operates_on().allows(diagonal))
            .map(|(_, &w)| w)
            .sum();
        if eligible <= 0.0 {
            return false;
        }

        let mut draw = rng.rand() * eligible;
        let mut chosen = None;
        for (i, m) in self.moves.iter().enumerate() {
            if !m.operates_on().allows(diagonal) {
                continue;
            }
            draw -= self.weights[i];
            if draw < 0.0 {
                chosen = Some(i);
                break;
            }
        }
        let index = chosen.unwrap_or(self.moves.len() - 1);

        let mut ctx = MoveContext {
            path: &mut *path,
            action,
            lookup: &mut *lookup,
            constants,
            rng: &mut *rng,
        };
        let accepted = self.moves[index].attempt(&mut ctx);

        self.steps += 1;
        self.total_attempted += 1;
        if accepted {
            self.total_accepted += 1;
        }
        if path.worm.is_diagonal {
            self.diagonal_steps += 1;
        }
        accepted
    }

    /// A sweep is one step per bead currently in the configuration (at least
    /// one step even when empty).
    pub fn sweep(
        &mut self,
        path: &mut Path<D>,
        action: &dyn Action<D>,
        lookup: &mut Lookup<D>,
        constants: &SimConstants,
        rng: &mut McRng,
    ) {
        let n = path.num_beads_on().max(1);
        for _ in 0..n {
            self.step(path, action, lookup, constants, rng);
        }
    }

    pub fn acceptance_rate(&self) -> f64 {
        if self.total_attempted == 0 {
            0.0
        } else {
            self.total_accepted as f64 / self.total_attempted as f64
        }
    }

    /// Fraction of steps that ended in a diagonal configuration; the knob
    /// for tuning the worm constant.
    pub fn diagonal_fraction(&self) -> f64 {
        if self.steps == 0 {
            0.0
        } else {
            self.diagonal_steps as f64 / self.steps as f64
        }
    }

    /// Per-move statistics, in table order.
    pub fn stats(&self) -> impl Iterator<Item = (&'static str, &MoveStats)> {
        self.moves.iter().map(|m| (m.name(), m.stats()))
    }
}

impl<const D: usize> Default for MoveTable<D> {
    fn default() -> Self {
        Self::new()
    }
}
