//! The five barrier algorithms, each with a plain variant and a typed
//! combining-reduction variant.

pub mod butterfly;
pub mod central;
pub mod dissemination;
pub mod tournament;
pub mod tree;

pub use butterfly::{ButterflyBarrier, ButterflyReduceBarrier};
pub use central::{CentralBarrier, CentralReduceBarrier};
pub use dissemination::{DisseminationBarrier, DisseminationReduceBarrier};
pub use tournament::{Role as TournamentRole, TournamentBarrier, TournamentReduceBarrier};
pub use tree::{TreeBarrier, TreeReduceBarrier};
