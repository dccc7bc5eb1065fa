//! Callback types shared by every barrier algorithm.

use alloc::boxed::Box;

/// A zero-argument callable invoked exactly once per tripped episode.
pub type Action = Box<dyn Fn() + Send + Sync>;

/// A side-effecting binary combine over two party ids.
///
/// Invoked as `reduce(dst, src)`: `dst` combines its own application state
/// with `src`'s, mutating only the state owned by `dst`. `src` must not be
/// mutated.
pub type GenericHook = Box<dyn Fn(usize, usize) + Send + Sync>;
