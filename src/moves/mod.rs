//! The Metropolis move families of the worm algorithm.

mod advance_recede;
mod base;
mod bisection;
mod center_of_mass;
mod insert_remove;
mod open_close;
mod staging;
mod swap;

pub use advance_recede::{AdvanceHeadMove, AdvanceTailMove, RecedeHeadMove, RecedeTailMove};
pub use base::{
    accept_probability, levels_for, new_bisection_position, new_free_particle_position,
    new_staging_position, Ensemble, Move, MoveContext, MoveStats, RejectionChain,
};
pub use bisection::BisectionMove;
pub use center_of_mass::CenterOfMassMove;
pub use insert_remove::{InsertMove, RemoveMove};
pub use open_close::{CloseMove, OpenMove};
pub use staging::StagingMove;
pub use swap::{SwapHeadMove, SwapTailMove};
