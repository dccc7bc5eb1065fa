//! Tournament barrier: single-elimination tree over any `n >= 2`.
//!
//! Unlike dissemination and butterfly, the tournament algorithm does not
//! require a power-of-two party count: it embeds the `n` real parties into
//! a virtual bracket of size `v = next_power_of_two(n)` and treats any
//! round whose XOR partner falls outside `[0, n)` as a bye (`Wildcard`).
//! Every non-root party eventually loses exactly one round and waits on a
//! single shared release flag; the root wins every round it plays.

use alloc::vec::Vec;
use core::cell::{Cell, UnsafeCell};
use core::sync::atomic::{AtomicBool, Ordering};

use crate::backoff::Backoff;
use crate::cc::{log2_usize, next_power_of_two, power_of_two};
use crate::error::{check_n, BarrierError};
use crate::hook::{Action, GenericHook};
use crate::poison::Poison;
use crate::reduce::ReduceOp;

const ALGORITHM: &str = "tournament";

/// A party's role in one round of the tournament.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Beat its round partner; proceeds to the next round.
    Winner,
    /// Lost its round partner; signals the winner and waits for release.
    Loser,
    /// Has no real partner this round (a bye); proceeds without exchange.
    Wildcard,
    /// The sole party that wins every round; runs `action` and releases.
    Root,
}

#[inline]
fn partner(v: usize, id: usize, round: usize) -> usize {
    (id ^ power_of_two(round as u32)) % v
}

#[inline]
fn role_at(n: usize, rounds: usize, id: usize, round: usize, v: usize) -> Role {
    let p = partner(v, id, round);
    let is_winner = id % power_of_two((round + 1) as u32) == 0;
    if p >= n {
        Role::Wildcard
    } else if is_winner && id == 0 && round == rounds - 1 {
        Role::Root
    } else if is_winner {
        Role::Winner
    } else {
        Role::Loser
    }
}

struct PartyState {
    sense: Cell<bool>,
}

// SAFETY: `sense` is touched only by the thread calling `wait`/`wait_value`
// with this party's id.
unsafe impl Sync for PartyState {}

/// A tournament barrier with no combining.
pub struct TournamentBarrier {
    n: usize,
    v: usize,
    rounds: usize,
    parties: Vec<PartyState>,
    /// `flags[winner_id][round]`, set by that round's loser.
    flags: Vec<Vec<AtomicBool>>,
    flag_out: AtomicBool,
    action: Option<Action>,
    generic_hook: Option<GenericHook>,
    poisoned: Poison,
}

unsafe impl Sync for TournamentBarrier {}

impl TournamentBarrier {
    /// Create a barrier for any `n >= 2`.
    pub fn new(n: usize) -> Result<Self, BarrierError> {
        Self::with_hooks(n, None, None)
    }

    /// Create a barrier that runs `action` once per episode (on the root).
    pub fn with_action(n: usize, action: Action) -> Result<Self, BarrierError> {
        Self::with_hooks(n, Some(action), None)
    }

    /// Create a barrier with an optional action and generic reduction hook.
    pub fn with_hooks(
        n: usize,
        action: Option<Action>,
        generic_hook: Option<GenericHook>,
    ) -> Result<Self, BarrierError> {
        check_n(n)?;
        let v = next_power_of_two(n);
        let rounds = log2_usize(v) as usize;
        Ok(Self {
            n,
            v,
            rounds,
            parties: (0..n).map(|_| PartyState { sense: Cell::new(false) }).collect(),
            flags: (0..n)
                .map(|_| (0..rounds).map(|_| AtomicBool::new(false)).collect())
                .collect(),
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

    /// Role party `id` plays in `round`, for inspection/testing.
    pub fn role(&self, id: usize, round: usize) -> Role {
        role_at(self.n, self.rounds, id, round, self.v)
    }

    /// Block until all `n` parties have called `wait` for this episode.
    pub fn wait(&self, id: usize) {
        debug_assert!(id < self.n, "party id {id} out of range for n={}", self.n);
        let p = &self.parties[id];
        let sense = !p.sense.get();
        p.sense.set(sense);

        for round in 0..self.rounds {
            match self.role(id, round) {
                Role::Wildcard => continue,
                Role::Winner => {
                    let mut backoff = Backoff::new();
                    while self.flags[id][round].load(Ordering::Acquire) != sense {
                        if self.poisoned.check() {
                            return;
                        }
                        backoff.spin();
                    }
                    if let Some(hook) = &self.generic_hook {
                        hook(id, partner(self.v, id, round));
                    }
                }
                Role::Loser => {
                    let winner = partner(self.v, id, round);
                    self.flags[winner][round].store(sense, Ordering::Release);
                    let mut backoff = Backoff::new();
                    while self.flag_out.load(Ordering::Acquire) != sense {
                        if self.poisoned.check() {
                            return;
                        }
                        backoff.spin();
                    }
                    return;
                }
                Role::Root => {
                    let mut backoff = Backoff::new();
                    while self.flags[id][round].load(Ordering::Acquire) != sense {
                        if self.poisoned.check() {
                            return;
                        }
                        backoff.spin();
                    }
                    if let Some(hook) = &self.generic_hook {
                        hook(id, partner(self.v, id, round));
                    }
                    if let Some(action) = &self.action {
                        action();
                    }
                    crate::diagnostics::episode_released(ALGORITHM, self.n);
                    self.flag_out.store(sense, Ordering::Release);
                    return;
                }
            }
        }
        unreachable!("every non-root party loses exactly one round before rounds are exhausted");
    }
}

/// A tournament barrier augmented with a typed combining reduction.
///
/// Each winner folds its running value with its defeated partner's final
/// value (`value := op(value, partner.value)`); the root folds last and
/// publishes the result to every waiting loser.
pub struct TournamentReduceBarrier<T, Op> {
    n: usize,
    v: usize,
    rounds: usize,
    parties: Vec<PartyState>,
    flags: Vec<Vec<AtomicBool>>,
    values: Vec<UnsafeCell<T>>,
    result: UnsafeCell<T>,
    flag_out: AtomicBool,
    action: Option<Action>,
    generic_hook: Option<GenericHook>,
    poisoned: Poison,
    _op: core::marker::PhantomData<Op>,
}

// SAFETY: `values[id]` is written only by party `id`, progressively, across
// the rounds it wins, and read by exactly one other party (its eventual
// winner, after that winner's acquire-load of `flags[id's winner][round]`
// synchronizes-with this party's release store). `result` is written only
// by the root before the release store to `flag_out` that every loser
// acquire-loads before reading it.
unsafe impl<T: Send, Op> Sync for TournamentReduceBarrier<T, Op> {}

impl<T: Copy + Default, Op: ReduceOp<T>> TournamentReduceBarrier<T, Op> {
    /// Create a reduction barrier for any `n >= 2`.
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
        let v = next_power_of_two(n);
        let rounds = log2_usize(v) as usize;
        Ok(Self {
            n,
            v,
            rounds,
            parties: (0..n).map(|_| PartyState { sense: Cell::new(false) }).collect(),
            flags: (0..n)
                .map(|_| (0..rounds).map(|_| AtomicBool::new(false)).collect())
                .collect(),
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

    /// Role party `id` plays in `round`, for inspection/testing.
    pub fn role(&self, id: usize, round: usize) -> Role {
        role_at(self.n, self.rounds, id, round, self.v)
    }

    /// Contribute `value` and block until all parties have arrived,
    /// returning the folded reduction result.
    pub fn wait_value(&self, id: usize, value: T) -> T {
        debug_assert!(id < self.n, "party id {id} out of range for n={}", self.n);
        // SAFETY: only party `id` writes `values[id]`.
        unsafe {
            *self.values[id].get() = value;
        }

        let p = &self.parties[id];
        let sense = !p.sense.get();
        p.sense.set(sense);

        for round in 0..self.rounds {
            match self.role(id, round) {
                Role::Wildcard => continue,
                Role::Winner => {
                    let mut backoff = Backoff::new();
                    while self.flags[id][round].load(Ordering::Acquire) != sense {
                        if self.poisoned.check() {
                            // SAFETY: best-effort diagnostic read; the value may
                            // not reflect a fully combined contribution.
                            return unsafe { *self.values[id].get() };
                        }
                        backoff.spin();
                    }
                    let partner_id = partner(self.v, id, round);
                    if let Some(hook) = &self.generic_hook {
                        hook(id, partner_id);
                    }
                    // SAFETY: the acquire-load above synchronizes-with the
                    // loser's release store, making `values[partner_id]`
                    // visible.
                    unsafe {
                        let own = *self.values[id].get();
                        let other = *self.values[partner_id].get();
                        *self.values[id].get() = Op::combine(own, other);
                    }
                }
                Role::Loser => {
                    let winner = partner(self.v, id, round);
                    self.flags[winner][round].store(sense, Ordering::Release);
                    let mut backoff = Backoff::new();
                    while self.flag_out.load(Ordering::Acquire) != sense {
                        if self.poisoned.check() {
                            // SAFETY: best-effort diagnostic read; `result`
                            // may not have been published yet.
                            return unsafe { *self.result.get() };
                        }
                        backoff.spin();
                    }
                    // SAFETY: the acquire-load above synchronizes-with the
                    // root's release store to `flag_out`, after which it
                    // wrote `result`.
                    return unsafe { *self.result.get() };
                }
                Role::Root => {
                    let mut backoff = Backoff::new();
                    while self.flags[id][round].load(Ordering::Acquire) != sense {
                        if self.poisoned.check() {
                            // SAFETY: best-effort diagnostic read.
                            return unsafe { *self.values[id].get() };
                        }
                        backoff.spin();
                    }
                    let partner_id = partner(self.v, id, round);
                    if let Some(hook) = &self.generic_hook {
                        hook(id, partner_id);
                    }
                    // SAFETY: see the `Winner` arm above.
                    let folded = unsafe {
                        let own = *self.values[id].get();
                        let other = *self.values[partner_id].get();
                        let folded = Op::combine(own, other);
                        *self.values[id].get() = folded;
                        folded
                    };
                    if let Some(action) = &self.action {
                        action();
                    }
                    // SAFETY: only the root writes `result`, before the
                    // release store below.
                    unsafe {
                        *self.result.get() = folded;
                    }
                    crate::diagnostics::episode_released(ALGORITHM, self.n);
                    self.flag_out.store(sense, Ordering::Release);
                    return folded;
                }
            }
        }
        unreachable!("every non-root party loses exactly one round before rounds are exhausted");
    }
}
