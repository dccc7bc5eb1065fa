//! Static tree barrier: an asymmetric arrival tree rooted at party 0.
//!
//! Requires a power-of-two party count. Every party but the root has exactly
//! one parent; interior parties additionally have two children. Root's
//! children are special-cased to `{1, 2, n-1}` to compact the top two levels
//! of what would otherwise be an unbalanced binary tree.

use alloc::vec::Vec;
use core::cell::{Cell, UnsafeCell};
use core::sync::atomic::{AtomicBool, Ordering};

use crate::backoff::Backoff;
use crate::error::{check_power_of_two, BarrierError};
use crate::hook::{Action, GenericHook};
use crate::poison::Poison;
use crate::reduce::ReduceOp;

const ALGORITHM: &str = "static-tree";

#[inline]
fn left_child(i: usize) -> usize {
    2 * i + 1
}

#[inline]
fn right_child(i: usize) -> usize {
    2 * i + 2
}

/// A static tree barrier with no combining.
pub struct TreeBarrier {
    n: usize,
    thresh: usize,
    sense: Vec<Cell<bool>>,
    flags: Vec<AtomicBool>,
    flag_out: AtomicBool,
    action: Option<Action>,
    generic_hook: Option<GenericHook>,
    poisoned: Poison,
}

// SAFETY: `sense[id]` is touched only by the thread calling `wait` with that
// id; `flags[id]` is single-writer (party `id`) single-reader (its parent).
unsafe impl Sync for TreeBarrier {}

impl TreeBarrier {
    /// Create a barrier for `n` parties (`n` must be a power of two).
    pub fn new(n: usize) -> Result<Self, BarrierError> {
        Self::with_hooks(n, None, None)
    }

    /// Create a barrier that runs `action` once per episode (on party 0).
    pub fn with_action(n: usize, action: Action) -> Result<Self, BarrierError> {
        Self::with_hooks(n, Some(action), None)
    }

    /// Create a barrier with an optional action and generic reduction hook.
    pub fn with_hooks(
        n: usize,
        action: Option<Action>,
        generic_hook: Option<GenericHook>,
    ) -> Result<Self, BarrierError> {
        check_power_of_two(ALGORITHM, n)?;
        Ok(Self {
            n,
            thresh: (n - 1) / 2,
            sense: (0..n).map(|_| Cell::new(false)).collect(),
            flags: (0..n).map(|_| AtomicBool::new(false)).collect(),
            flag_out: AtomicBool::new(false),
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
    pub fn wait(&self, id: usize) {
        debug_assert!(id < self.n, "party id {id} out of range for n={}", self.n);
        let sense = !self.sense[id].get();
        self.sense[id].set(sense);

        if id == 0 {
            self.spin_on(1, sense);
            self.hook(0, 1);
            if self.n > 2 {
                self.spin_on(2, sense);
                self.hook(0, 2);
            }
            if self.n > 3 {
                self.spin_on(self.n - 1, sense);
                self.hook(0, self.n - 1);
            }
            if let Some(action) = &self.action {
                action();
            }
            crate::diagnostics::episode_released(ALGORITHM, self.n);
            self.flag_out.store(sense, Ordering::Release);
        } else if id >= self.thresh {
            self.flags[id].store(sense, Ordering::Release);
            self.wait_release(sense);
        } else {
            let (left, right) = (left_child(id), right_child(id));
            self.spin_on(left, sense);
            self.hook(id, left);
            self.spin_on(right, sense);
            self.hook(id, right);
            self.flags[id].store(sense, Ordering::Release);
            self.wait_release(sense);
        }
    }

    #[inline]
    fn spin_on(&self, child: usize, sense: bool) {
        let mut backoff = Backoff::new();
        while self.flags[child].load(Ordering::Acquire) != sense {
            if self.poisoned.check() {
                return;
            }
            backoff.spin();
        }
    }

    #[inline]
    fn wait_release(&self, sense: bool) {
        let mut backoff = Backoff::new();
        while self.flag_out.load(Ordering::Acquire) != sense {
            if self.poisoned.check() {
                return;
            }
            backoff.spin();
        }
    }

    #[inline]
    fn hook(&self, dst: usize, src: usize) {
        if let Some(hook) = &self.generic_hook {
            hook(dst, src);
        }
    }
}

/// A static tree barrier augmented with a typed combining reduction.
///
/// Every non-root party writes its contribution to a scratch slot before
/// signalling its parent; the root folds children in the order `(1, 2,
/// n-1)` and publishes the result.
pub struct TreeReduceBarrier<T, Op> {
    n: usize,
    thresh: usize,
    sense: Vec<Cell<bool>>,
    flags: Vec<AtomicBool>,
    values: Vec<UnsafeCell<T>>,
    result: UnsafeCell<T>,
    flag_out: AtomicBool,
    action: Option<Action>,
    generic_hook: Option<GenericHook>,
    poisoned: Poison,
    _op: core::marker::PhantomData<Op>,
}

// SAFETY: `values[id]` is written only by party `id` (progressively, while
// folding in its children, then as its final contribution) and read only by
// its parent after acquiring `flags[id]`, which synchronizes-with the
// release store that follows the last write. `result` is written only by
// the root before the release store to `flag_out`.
unsafe impl<T: Send, Op> Sync for TreeReduceBarrier<T, Op> {}

impl<T: Copy + Default, Op: ReduceOp<T>> TreeReduceBarrier<T, Op> {
    /// Create a reduction barrier for `n` parties (`n` must be a power of two).
    pub fn new(n: usize) -> Result<Self, BarrierError> {
        Self::with_hooks(n, None, None)
    }

    /// Create a reduction barrier with an optional action and generic hook.
    pub fn with_hooks(
        n: usize,
        action: Option<Action>,
        generic_hook: Option<GenericHook>,
    ) -> Result<Self, BarrierError> {
        check_power_of_two(ALGORITHM, n)?;
        Ok(Self {
            n,
            thresh: (n - 1) / 2,
            sense: (0..n).map(|_| Cell::new(false)).collect(),
            flags: (0..n).map(|_| AtomicBool::new(false)).collect(),
            values: (0..n).map(|_| UnsafeCell::new(T::default())).collect(),
            result: UnsafeCell::new(T::default()),
            flag_out: AtomicBool::new(false),
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
        // SAFETY: only party `id` writes `values[id]` before anyone could
        // observe it via `flags[id]`.
        unsafe {
            *self.values[id].get() = value;
        }

        let sense = !self.sense[id].get();
        self.sense[id].set(sense);

        if id == 0 {
            self.spin_on(1, sense);
            self.hook(0, 1);
            // SAFETY: the acquire-load in `spin_on` above synchronizes-with
            // child 1's release store, making `values[1]` visible.
            let mut acc = unsafe { Op::combine(*self.values[0].get(), *self.values[1].get()) };
            if self.n > 2 {
                self.spin_on(2, sense);
                self.hook(0, 2);
                acc = unsafe { Op::combine(acc, *self.values[2].get()) };
            }
            if self.n > 3 {
                self.spin_on(self.n - 1, sense);
                self.hook(0, self.n - 1);
                acc = unsafe { Op::combine(acc, *self.values[self.n - 1].get()) };
            }
            if let Some(action) = &self.action {
                action();
            }
            // SAFETY: only the root writes `result`, before the release
            // store to `flag_out` below.
            unsafe {
                *self.result.get() = acc;
            }
            crate::diagnostics::episode_released(ALGORITHM, self.n);
            self.flag_out.store(sense, Ordering::Release);
            acc
        } else if id >= self.thresh {
            self.flags[id].store(sense, Ordering::Release);
            self.wait_release(sense);
            // SAFETY: the acquire-load in `wait_release` synchronizes-with
            // the root's release store to `flag_out`, which happens-after
            // it wrote `result`.
            unsafe { *self.result.get() }
        } else {
            let (left, right) = (left_child(id), right_child(id));
            self.spin_on(left, sense);
            self.hook(id, left);
            self.spin_on(right, sense);
            self.hook(id, right);
            // SAFETY: see the root arm above; both children's release
            // stores are synchronized-with by the acquire-loads in `spin_on`.
            unsafe {
                let own = *self.values[id].get();
                let l = *self.values[left].get();
                let r = *self.values[right].get();
                *self.values[id].get() = Op::combine(Op::combine(own, l), r);
            }
            self.flags[id].store(sense, Ordering::Release);
            self.wait_release(sense);
            unsafe { *self.result.get() }
        }
    }

    #[inline]
    fn spin_on(&self, child: usize, sense: bool) {
        let mut backoff = Backoff::new();
        while self.flags[child].load(Ordering::Acquire) != sense {
            if self.poisoned.check() {
                return;
            }
            backoff.spin();
        }
    }

    #[inline]
    fn wait_release(&self, sense: bool) {
        let mut backoff = Backoff::new();
        while self.flag_out.load(Ordering::Acquire) != sense {
            if self.poisoned.check() {
                return;
            }
            backoff.spin();
        }
    }

    #[inline]
    fn hook(&self, dst: usize, src: usize) {
        if let Some(hook) = &self.generic_hook {
            hook(dst, src);
        }
    }
}
