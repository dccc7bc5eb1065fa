//! # muster
//!
//! Spin-based barrier synchronization primitives for a fixed, pre-registered
//! set of peer worker threads that repeatedly rendezvous. Every barrier in
//! this crate assumes one pinned thread per party and busy-spins on shared
//! atomic words rather than parking, trading CPU cycles for minimum
//! wake-up latency.
//!
//! ## Module organization
//!
//! ### Foundation
//! - [`cc`] - bit manipulation primitives (power-of-two tests, `ffs`/`ctz`/`popcount`)
//! - [`pr`] - atomic primitives and memory barriers
//! - [`backoff`] - exponential backoff for contended spin loops
//!
//! ### Barrier building blocks
//! - [`error`] - construction-time argument validation (`BarrierError`)
//! - [`hook`] - the `Action` and `GenericHook` callback types shared by every algorithm
//! - [`reduce`] - the `ReduceOp` trait and the `Min`/`Max`/`Sum` combiners
//! - [`poison`] - advisory cooperative cancellation for hung episodes
//! - [`diagnostics`] - optional `tracing` spans around episode boundaries
//!
//! ### Algorithms
//! - [`algorithms::central`] - shared-counter barrier with sense reversal
//! - [`algorithms::dissemination`] - `ceil(log2 n)` rounds of pairwise flag exchange
//! - [`algorithms::butterfly`] - `log2 n` rounds of XOR-partner flag exchange
//! - [`algorithms::tournament`] - single-elimination arrival tree, any `n >= 2`
//! - [`algorithms::tree`] - asymmetric static arrival tree rooted at party 0
//!
//! Each algorithm ships a plain variant (`*Barrier::wait(id)`) and a typed
//! combining-reduction variant (`*ReduceBarrier::wait_value(id, value)`)
//! generic over `i32`/`i64`/`f32`/`f64` and a [`reduce::ReduceOp`] marker type.

#![no_std]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![allow(clippy::module_inception)]

extern crate alloc;

/// Compiler compatibility and bit manipulation primitives.
pub mod cc;

/// Atomic primitives and memory barriers.
pub mod pr;

/// Exponential backoff for contention management.
pub mod backoff;

/// Construction-time error taxonomy for barrier algorithms.
pub mod error;

/// Callback types shared by every barrier algorithm.
pub mod hook;

/// Associative binary reduction operators over numeric scalars.
pub mod reduce;

/// Cooperative cancellation for hung episodes.
pub mod poison;

/// Optional `tracing` instrumentation around episode boundaries.
pub mod diagnostics;

/// The five barrier algorithms, each with a plain variant and a typed
/// combining-reduction variant.
pub mod algorithms;

pub use algorithms::{
    ButterflyBarrier, ButterflyReduceBarrier, CentralBarrier, CentralReduceBarrier,
    DisseminationBarrier, DisseminationReduceBarrier, TournamentBarrier, TournamentReduceBarrier,
    TournamentRole, TreeBarrier, TreeReduceBarrier,
};
pub use error::BarrierError;
pub use hook::{Action, GenericHook};
pub use reduce::{Max, Min, ReduceOp, Sum};
