//! Worm-algorithm path integral Monte Carlo for bosons in the grand
//! canonical ensemble.
//!
//! The crate centers on a linked-ring representation of imaginary-time
//! worldlines ([`path::Path`]) and the family of Metropolis updates that
//! mutate it ([`moves`]): diagonal updates (center of mass, staging,
//! bisection), the sector-changing worm updates (open/close,
//! insert/remove), endpoint propagation (advance/recede of head and tail)
//! and the permutation-sampling swap updates.  A classical single-slice
//! variant lives in [`cmc`].
//!
//! Reference: Boninsegni, Prokof'ev & Svistunov, "Worm algorithm and
//! diagrammatic Monte Carlo", Phys. Rev. E 74, 036701 (2006).

pub mod action;
pub mod cmc;
pub mod constants;
pub mod container;
pub mod io;
pub mod lookup;
pub mod moves;
pub mod path;
pub mod potential;
pub mod random;
pub mod sim;
pub mod worm;

pub use action::{Action, PrimitiveAction};
pub use cmc::{AveragingObserver, ClassicalMonteCarlo, CmcObserver, CmcSnapshot};
pub use constants::{SimConstants, LBIG};
pub use container::Container;
pub use lookup::Lookup;
pub use moves::{Ensemble, Move, MoveContext, MoveStats};
pub use path::{Bead, Path};
pub use potential::{
    DoubleWellPotential, ExternalPotential, GaussianRepulsion, HarmonicPotential,
    InteractionPotential, ZeroPotential,
};
pub use random::McRng;
pub use sim::MoveTable;
pub use worm::Worm;

#[cfg(test)]
mod tests;
