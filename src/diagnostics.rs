//! Optional `tracing` spans around episode boundaries.
//!
//! Compiled to nothing unless the `tracing` feature is enabled, so the
//! spin-hot-path pays zero cost by default.

/// Emit a trace-level span marking an episode's release point.
#[cfg(feature = "tracing")]
#[inline]
pub(crate) fn episode_released(algorithm: &'static str, n: usize) {
    tracing::trace!(algorithm, n, "barrier episode released");
}

#[cfg(not(feature = "tracing"))]
#[inline]
pub(crate) fn episode_released(_algorithm: &'static str, _n: usize) {}
