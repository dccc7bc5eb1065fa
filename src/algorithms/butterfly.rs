//! Butterfly barrier: `log2 n` rounds of XOR-partner flag exchange.
//!
//! Requires a power-of-two party count. Identical round structure to the
//! dissemination barrier, but round `k`'s partner is `i XOR 2^k`, which is
//! both the outgoing and the incoming partner — butterfly exchange is
//! symmetric, unlike dissemination's directed ring schedule.

use alloc::vec::Vec;
use core::cell::{Cell, UnsafeCell};
use core::sync::atomic::{AtomicBool, Ordering};

use crate::backoff::Backoff;
use crate::cc::{log2_usize, power_of_two};
use crate::error::{check_power_of_two, BarrierError};
use crate::hook::{Action, GenericHook};
use crate::poison::Poison;
use crate::reduce::ReduceOp;

const ALGORITHM: &str = "butterfly";

struct PartyState {
    /// `flags_in[parity][round]`, set by the round's XOR partner.
    flags_in: [Vec<AtomicBool>; 2],
    sense: Cell<bool>,
    parity: Cell<usize>,
    out_sense: Cell<bool>,
}

// SAFETY: see `dissemination::PartyState` — identical single-writer,
// thread-confined-scalar layout.
unsafe impl Sync for PartyState {}

impl PartyState {
    fn new(rounds: usize) -> Self {
        Self {
            flags_in: [
                (0..rounds).map(|_| AtomicBool::new(false)).collect(),
                (0..rounds).map(|_| AtomicBool::new(false)).collect(),
            ],
            sense: Cell::new(true),
            parity: Cell::new(0),
            out_sense: Cell::new(false),
        }
    }
}

fn episode_step(
    n: usize,
    rounds: usize,
    parties: &[PartyState],
    flag_out: &AtomicBool,
    action: &Option<Action>,
    generic_hook: &Option<GenericHook>,
    poisoned: &Poison,
    id: usize,
    mut on_round: impl FnMut(usize, usize),
) {
    let p = &parties[id];
    let parity = p.parity.get();
    let sense = p.sense.get();

    for round in 0..rounds {
        let partner = id ^ power_of_two(round as u32);
        parties[partner].flags_in[parity][round].store(sense, Ordering::Release);

        let mut backoff = Backoff::new();
        while parties[id].flags_in[parity][round].load(Ordering::Acquire) != sense {
            if poisoned.check() {
                return;
            }
            backoff.spin();
        }

        on_round(round, partner);
        if let Some(hook) = generic_hook {
            hook(id, partner);
        }
    }

    if let Some(action) = action {
        let out_sense = !p.out_sense.get();
        p.out_sense.set(out_sense);
        if id == 0 {
            action();
            crate::diagnostics::episode_released(ALGORITHM, n);
            flag_out.store(out_sense, Ordering::Release);
        } else {
            let mut backoff = Backoff::new();
            while flag_out.load(Ordering::Acquire) != out_sense {
                if poisoned.check() {
                    return;
                }
                backoff.spin();
            }
        }
    }

    let new_parity = 1 - parity;
    if parity == 1 {
        p.sense.set(!sense);
    }
    p.parity.set(new_parity);
}

/// A butterfly barrier with no combining.
pub struct ButterflyBarrier {
    n: usize,
    rounds: usize,
    parties: Vec<PartyState>,
    flag_out: AtomicBool,
    action: Option<Action>,
    generic_hook: Option<GenericHook>,
    poisoned: Poison,
}

unsafe impl Sync for ButterflyBarrier {}

impl ButterflyBarrier {
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
        let rounds = log2_usize(n) as usize;
        Ok(Self {
            n,
            rounds,
            parties: (0..n).map(|_| PartyState::new(rounds)).collect(),
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
        episode_step(
            self.n,
            self.rounds,
            &self.parties,
            &self.flag_out,
            &self.action,
            &self.generic_hook,
            &self.poisoned,
            id,
            |_, _| {},
        );
    }
}

/// A butterfly barrier augmented with a typed combining reduction.
///
/// Per-round intermediate values follow the round's XOR-partner schedule:
/// `values[round+1] = op(values[round], partner.values[round])`. The final
/// `values[rounds]` is returned to every party.
pub struct ButterflyReduceBarrier<T, Op> {
    n: usize,
    rounds: usize,
    parties: Vec<PartyState>,
    values: Vec<[Vec<UnsafeCell<T>>; 2]>,
    flag_out: AtomicBool,
    action: Option<Action>,
    generic_hook: Option<GenericHook>,
    poisoned: Poison,
    _op: core::marker::PhantomData<Op>,
}

// SAFETY: see `dissemination::DisseminationReduceBarrier` — same
// release/acquire pairing, just over the symmetric XOR partner.
unsafe impl<T: Send, Op> Sync for ButterflyReduceBarrier<T, Op> {}

impl<T: Copy + Default, Op: ReduceOp<T>> ButterflyReduceBarrier<T, Op> {
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
        let rounds = log2_usize(n) as usize;
        let values = (0..n)
            .map(|_| {
                [
                    (0..=rounds).map(|_| UnsafeCell::new(T::default())).collect(),
                    (0..=rounds).map(|_| UnsafeCell::new(T::default())).collect(),
                ]
            })
            .collect();
        Ok(Self {
            n,
            rounds,
            parties: (0..n).map(|_| PartyState::new(rounds)).collect(),
            values,
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

    /// Per-round intermediate value at the current parity bank for `id`,
    /// for use in tests that assert on the partner-schedule-ordered fold.
    #[doc(hidden)]
    pub fn round_value(&self, id: usize, parity: usize, round: usize) -> T {
        // SAFETY: exposed only for single-threaded post-episode inspection
        // in tests, after all parties have already returned from `wait_value`.
        unsafe { *self.values[id][parity][round].get() }
    }

    /// Contribute `value` and block until all parties have arrived,
    /// returning the folded reduction result.
    pub fn wait_value(&self, id: usize, value: T) -> T {
        debug_assert!(id < self.n, "party id {id} out of range for n={}", self.n);
        let parity = self.parties[id].parity.get();
        // SAFETY: only party `id` writes `values[id][parity][0]`.
        unsafe {
            *self.values[id][parity][0].get() = value;
        }

        episode_step(
            self.n,
            self.rounds,
            &self.parties,
            &self.flag_out,
            &self.action,
            &self.generic_hook,
            &self.poisoned,
            id,
            |round, partner| {
                // SAFETY: the acquire-load of `flags_in[parity][round]`
                // inside `episode_step` synchronizes-with the partner's
                // release store, which happens-after it finished writing
                // `values[partner][parity][round]`.
                unsafe {
                    let own = *self.values[id][parity][round].get();
                    let other = *self.values[partner][parity][round].get();
                    *self.values[id][parity][round + 1].get() = Op::combine(own, other);
                }
            },
        );

        // SAFETY: written by this same thread just above.
        unsafe { *self.values[id][parity][self.rounds].get() }
    }
}
