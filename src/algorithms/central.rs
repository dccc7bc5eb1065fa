//! Central (shared-counter) barrier.
//!
//! The simplest algorithm: every party increments one shared counter and
//! spins on one shared sense flag. O(1) atomic operations per party, but
//! the counter is a single multi-writer hotspot, so this algorithm scales
//! worse under contention than the tree-shaped ones.

use alloc::vec::Vec;
use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::backoff::Backoff;
use crate::error::{check_n, BarrierError};
use crate::hook::{Action, GenericHook};
use crate::poison::Poison;
use crate::reduce::ReduceOp;

const ALGORITHM: &str = "central";

/// A central barrier with no combining: every party just rendezvous.
pub struct CentralBarrier {
    n: usize,
    counter: AtomicUsize,
    go: AtomicBool,
    action: Option<Action>,
    generic_hook: Option<GenericHook>,
    poisoned: Poison,
}

impl core::fmt::Debug for CentralBarrier {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CentralBarrier")
            .field("n", &self.n)
            .field("counter", &self.counter)
            .field("go", &self.go)
            .field("action", &self.action.is_some())
            .field("generic_hook", &self.generic_hook.is_some())
            .field("poisoned", &self.poisoned)
            .finish()
    }
}

// SAFETY: `action`/`generic_hook` are `Send + Sync` by their own type; all
// other fields are atomics.
unsafe impl Sync for CentralBarrier {}

impl CentralBarrier {
    /// Create a barrier for `n` parties with no action or reduction hook.
    pub fn new(n: usize) -> Result<Self, BarrierError> {
        Self::with_hooks(n, None, None)
    }

    /// Create a barrier for `n` parties that runs `action` once per episode.
    pub fn with_action(n: usize, action: Action) -> Result<Self, BarrierError> {
        Self::with_hooks(n, Some(action), None)
    }

    /// Create a barrier with an optional action and an optional generic
    /// reduction hook invoked as `reduce(0, i)` for `i` in `1..n` on the
    /// releasing party, in id order.
    pub fn with_hooks(
        n: usize,
        action: Option<Action>,
        generic_hook: Option<GenericHook>,
    ) -> Result<Self, BarrierError> {
        check_n(n)?;
        Ok(Self {
            n,
            counter: AtomicUsize::new(0),
            go: AtomicBool::new(false),
            action,
            generic_hook,
            poisoned: Poison::new(),
        })
    }

    /// Number of parties this barrier was constructed for.
    #[inline]
    pub fn n(&self) -> usize {
        self.n
    }

    /// Unstick every party currently spinning on this barrier.
    ///
    /// Advisory only: see [`crate::poison`] for the contract this does and
    /// does not make.
    #[inline]
    pub fn poison(&self) {
        self.poisoned.poison();
    }

    /// Whether [`Self::poison`] has been called on this barrier.
    #[inline]
    pub fn is_poisoned(&self) -> bool {
        self.poisoned.is_poisoned()
    }

    /// Block until all `n` parties have called `wait` for this episode.
    ///
    /// # Panics
    ///
    /// Panics (debug builds only) if `id >= n()`.
    pub fn wait(&self, id: usize) {
        debug_assert!(id < self.n, "party id {id} out of range for n={}", self.n);
        let local_go = self.go.load(Ordering::Acquire);
        let arrived = self.counter.fetch_add(1, Ordering::SeqCst) + 1;

        if arrived == self.n {
            self.counter.store(0, Ordering::SeqCst);
            if let Some(hook) = &self.generic_hook {
                for i in 1..self.n {
                    hook(0, i);
                }
            }
            if let Some(action) = &self.action {
                action();
            }
            crate::diagnostics::episode_released(ALGORITHM, self.n);
            self.go.store(!local_go, Ordering::Release);
        } else {
            let mut backoff = Backoff::new();
            while self.go.load(Ordering::Acquire) == local_go {
                if self.poisoned.check() {
                    return;
                }
                backoff.spin();
            }
        }
    }
}

/// A central barrier augmented with a typed combining reduction.
///
/// Each party contributes a value of type `T`; the releasing party folds
/// every contribution into a single result (left-fold, id order) and every
/// caller of `wait_value` receives that same result.
pub struct CentralReduceBarrier<T, Op> {
    n: usize,
    counter: AtomicUsize,
    go: AtomicBool,
    values: Vec<UnsafeCell<T>>,
    result: UnsafeCell<T>,
    action: Option<Action>,
    generic_hook: Option<GenericHook>,
    poisoned: Poison,
    _op: core::marker::PhantomData<Op>,
}

// SAFETY: `values[i]` is written only by the party with id `i` before it
// increments `counter`, and read only by the releasing party after
// observing `counter == n` (which happens-after every party's write via the
// SeqCst fetch_add total order). `result` is written only by the releasing
// party before the release store to `go`, and read only after a waiter
// observes `go` flip (acquire).
unsafe impl<T: Send, Op> Sync for CentralReduceBarrier<T, Op> {}

impl<T: Copy + Default, Op: ReduceOp<T>> CentralReduceBarrier<T, Op> {
    /// Create a reduction barrier for `n` parties.
    pub fn new(n: usize) -> Result<Self, BarrierError> {
        Self::with_hooks(n, None, None)
    }

    /// Create a reduction barrier with an optional action and generic hook.
    pub fn with_hooks(
        n: usize,
        action: Option<Action>,
        generic_hook: Option<GenericHook>,
    ) -> Result<Self, BarrierError> {
        check_n(n)?;
        let values = (0..n).map(|_| UnsafeCell::new(T::default())).collect();
        Ok(Self {
            n,
            counter: AtomicUsize::new(0),
            go: AtomicBool::new(false),
            values,
            result: UnsafeCell::new(T::default()),
            action,
            generic_hook,
            poisoned: Poison::new(),
            _op: core::marker::PhantomData,
        })
    }

    /// Number of parties this barrier was constructed for.
    #[inline]
    pub fn n(&self) -> usize {
        self.n
    }

    /// Unstick every party currently spinning on this barrier.
    #[inline]
    pub fn poison(&self) {
        self.poisoned.poison();
    }

    /// Whether [`Self::poison`] has been called on this barrier.
    #[inline]
    pub fn is_poisoned(&self) -> bool {
        self.poisoned.is_poisoned()
    }

    /// Contribute `value` and block until all parties have arrived,
    /// returning the folded reduction result.
    pub fn wait_value(&self, id: usize, value: T) -> T {
        debug_assert!(id < self.n, "party id {id} out of range for n={}", self.n);
        // SAFETY: only party `id` writes `values[id]`, and only before its
        // own `fetch_add` below.
        unsafe {
            *self.values[id].get() = value;
        }

        let local_go = self.go.load(Ordering::Acquire);
        let arrived = self.counter.fetch_add(1, Ordering::SeqCst) + 1;

        if arrived == self.n {
            // SAFETY: every party's write to `values[i]` happens-before its
            // own fetch_add, and fetch_add on the same atomic establishes a
            // total modification order with release/acquire semantics
            // between consecutive RMWs, so all writes are visible here.
            let folded = unsafe {
                let mut acc = *self.values[0].get();
                for i in 1..self.n {
                    acc = Op::combine(acc, *self.values[i].get());
                }
                acc
            };
            // SAFETY: only the releasing party writes `result`, before the
            // release store to `go` that waiters acquire-load.
            unsafe {
                *self.result.get() = folded;
            }

            self.counter.store(0, Ordering::SeqCst);
            if let Some(hook) = &self.generic_hook {
                for i in 1..self.n {
                    hook(0, i);
                }
            }
            if let Some(action) = &self.action {
                action();
            }
            crate::diagnostics::episode_released(ALGORITHM, self.n);
            self.go.store(!local_go, Ordering::Release);
            folded
        } else {
            let mut backoff = Backoff::new();
            while self.go.load(Ordering::Acquire) == local_go {
                if self.poisoned.check() {
                    // SAFETY: `result` may not have been written yet; reading it
                    // here is a best-effort diagnostic value, not a synchronized
                    // result.
                    return unsafe { *self.result.get() };
                }
                backoff.spin();
            }
            // SAFETY: the acquire load above synchronizes-with the
            // releasing party's release store, making `result` visible.
            unsafe { *self.result.get() }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    extern crate std;
    use crate::reduce::{Max, Min, Sum};
    use alloc::boxed::Box;
    use alloc::sync::Arc;
    use alloc::vec::Vec;
    use std::thread;

    #[test]
    fn rejects_too_few_parties() {
        assert!(CentralBarrier::new(0).is_err());
        assert!(CentralBarrier::new(1).is_err());
        assert!(CentralBarrier::new(2).is_ok());
    }

    #[test]
    fn accepts_non_power_of_two() {
        assert!(CentralBarrier::new(3).is_ok());
        assert!(CentralBarrier::new(5).is_ok());
        assert!(CentralBarrier::new(7).is_ok());
    }

    #[test]
    fn two_threads_rendezvous_many_episodes() {
        let barrier = Arc::new(CentralBarrier::new(4).unwrap());
        let episodes = 2_000;
        let handles: Vec<_> = (0..4)
            .map(|id| {
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    for _ in 0..episodes {
                        barrier.wait(id);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
    }

    #[test]
    fn action_runs_exactly_once_per_episode() {
        let barrier = Arc::new(CentralBarrier::with_action(
            3,
            Box::new({
                let counter = Arc::new(AtomicUsize::new(0));
                let counter2 = Arc::clone(&counter);
                move || {
                    counter2.fetch_add(1, Ordering::SeqCst);
                }
            }),
        ).unwrap());
        let episodes = 500;
        let handles: Vec<_> = (0..3)
            .map(|id| {
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    for _ in 0..episodes {
                        barrier.wait(id);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
    }

    #[test]
    fn poison_unsticks_a_stuck_waiter() {
        let barrier = Arc::new(CentralBarrier::new(3).unwrap());
        let waiter = {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || barrier.wait(1))
        };
        // id 0 and id 2 never arrive; poison should unstick the waiter
        // instead of hanging the test forever.
        assert!(!barrier.is_poisoned());
        barrier.poison();
        waiter.join().unwrap();
        assert!(barrier.is_poisoned());
    }

    #[test]
    fn central_sum_four_floats() {
        let barrier = Arc::new(CentralReduceBarrier::<f64, Sum>::new(4).unwrap());
        let values = [1.0, 2.0, 3.0, 4.0];
        let handles: Vec<_> = (0..4)
            .map(|id| {
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || barrier.wait_value(id, values[id]))
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), 10.0);
        }
    }

    #[test]
    fn central_min_ints() {
        let barrier = Arc::new(CentralReduceBarrier::<i32, Min>::new(4).unwrap());
        let values = [7, 3, 9, 1];
        let handles: Vec<_> = (0..4)
            .map(|id| {
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || barrier.wait_value(id, values[id]))
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), 1);
        }
    }

    #[test]
    fn central_max_over_many_episodes() {
        let barrier = Arc::new(CentralReduceBarrier::<i64, Max>::new(5).unwrap());
        for episode in 0..200i64 {
            let handles: Vec<_> = (0..5)
                .map(|id| {
                    let barrier = Arc::clone(&barrier);
                    thread::spawn(move || barrier.wait_value(id, episode * 10 + id as i64))
                })
                .collect();
            for h in handles {
                assert_eq!(h.join().unwrap(), episode * 10 + 4);
            }
        }
    }
}
