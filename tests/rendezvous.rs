//! Multi-threaded rendezvous properties, across real `std::thread`s.
//!
//! Pure-logic properties (bit utilities, reduction operators, role/partner
//! computation) live inline in `#[cfg(test)]` modules next to the code they
//! exercise; the properties here genuinely need concurrent OS threads and so
//! live as integration tests instead.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use muster::algorithms::{
    ButterflyBarrier, CentralBarrier, DisseminationBarrier, TournamentBarrier, TreeBarrier,
};

const DEFAULT_EPISODES: usize = 200;
const STRESS_EPISODES: usize = 10_000;

fn run_central(n: usize, episodes: usize) {
    let barrier = Arc::new(CentralBarrier::new(n).unwrap());
    let returns: Arc<Vec<AtomicUsize>> = Arc::new((0..n).map(|_| AtomicUsize::new(0)).collect());
    let handles: Vec<_> = (0..n)
        .map(|id| {
            let barrier = Arc::clone(&barrier);
            let returns = Arc::clone(&returns);
            thread::spawn(move || {
                for _ in 0..episodes {
                    barrier.wait(id);
                    returns[id].fetch_add(1, Ordering::SeqCst);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    for r in returns.iter() {
        assert_eq!(r.load(Ordering::SeqCst), episodes);
    }
}

fn run_dissemination(n: usize, episodes: usize) {
    let barrier = Arc::new(DisseminationBarrier::new(n).unwrap());
    let returns: Arc<Vec<AtomicUsize>> = Arc::new((0..n).map(|_| AtomicUsize::new(0)).collect());
    let handles: Vec<_> = (0..n)
        .map(|id| {
            let barrier = Arc::clone(&barrier);
            let returns = Arc::clone(&returns);
            thread::spawn(move || {
                for _ in 0..episodes {
                    barrier.wait(id);
                    returns[id].fetch_add(1, Ordering::SeqCst);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    for r in returns.iter() {
        assert_eq!(r.load(Ordering::SeqCst), episodes);
    }
}

fn run_butterfly(n: usize, episodes: usize) {
    let barrier = Arc::new(ButterflyBarrier::new(n).unwrap());
    let returns: Arc<Vec<AtomicUsize>> = Arc::new((0..n).map(|_| AtomicUsize::new(0)).collect());
    let handles: Vec<_> = (0..n)
        .map(|id| {
            let barrier = Arc::clone(&barrier);
            let returns = Arc::clone(&returns);
            thread::spawn(move || {
                for _ in 0..episodes {
                    barrier.wait(id);
                    returns[id].fetch_add(1, Ordering::SeqCst);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    for r in returns.iter() {
        assert_eq!(r.load(Ordering::SeqCst), episodes);
    }
}

fn run_tournament(n: usize, episodes: usize) {
    let barrier = Arc::new(TournamentBarrier::new(n).unwrap());
    let returns: Arc<Vec<AtomicUsize>> = Arc::new((0..n).map(|_| AtomicUsize::new(0)).collect());
    let handles: Vec<_> = (0..n)
        .map(|id| {
            let barrier = Arc::clone(&barrier);
            let returns = Arc::clone(&returns);
            thread::spawn(move || {
                for _ in 0..episodes {
                    barrier.wait(id);
                    returns[id].fetch_add(1, Ordering::SeqCst);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    for r in returns.iter() {
        assert_eq!(r.load(Ordering::SeqCst), episodes);
    }
}

fn run_tree(n: usize, episodes: usize) {
    let barrier = Arc::new(TreeBarrier::new(n).unwrap());
    let returns: Arc<Vec<AtomicUsize>> = Arc::new((0..n).map(|_| AtomicUsize::new(0)).collect());
    let handles: Vec<_> = (0..n)
        .map(|id| {
            let barrier = Arc::clone(&barrier);
            let returns = Arc::clone(&returns);
            thread::spawn(move || {
                for _ in 0..episodes {
                    barrier.wait(id);
                    returns[id].fetch_add(1, Ordering::SeqCst);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    for r in returns.iter() {
        assert_eq!(r.load(Ordering::SeqCst), episodes);
    }
}

#[test]
fn central_returns_every_caller_exactly_k_times_across_sizes() {
    for &n in &[2usize, 3, 5, 7, 8, 16, 32, 64] {
        run_central(n, DEFAULT_EPISODES);
    }
}

#[test]
fn dissemination_returns_every_caller_exactly_k_times_across_sizes() {
    for &n in &[2usize, 4, 8, 16, 32, 64] {
        run_dissemination(n, DEFAULT_EPISODES);
    }
}

#[test]
fn butterfly_returns_every_caller_exactly_k_times_across_sizes() {
    for &n in &[2usize, 4, 8, 16, 32, 64] {
        run_butterfly(n, DEFAULT_EPISODES);
    }
}

#[test]
fn tournament_returns_every_caller_exactly_k_times_across_sizes() {
    for &n in &[2usize, 3, 5, 7, 8, 16, 32] {
        run_tournament(n, DEFAULT_EPISODES);
    }
}

#[test]
fn tree_returns_every_caller_exactly_k_times_across_sizes() {
    for &n in &[2usize, 4, 8, 16, 32, 64] {
        run_tree(n, DEFAULT_EPISODES);
    }
}

#[test]
#[ignore = "10k-episode stress run; enable with `cargo test -- --ignored`"]
fn dissemination_stress_n64() {
    run_dissemination(64, STRESS_EPISODES);
}

#[test]
#[ignore = "10k-episode stress run; enable with `cargo test -- --ignored`"]
fn tournament_stress_n63() {
    run_tournament(63, STRESS_EPISODES);
}

/// Every pre-`wait` write is visible to every party after `wait` returns:
/// each party writes its id into a shared slot immediately before calling
/// `wait`, and the action (run on the releasing/root/zero party) reads
/// every slot and records whether all were populated for that episode.
#[test]
fn happens_before_property_central() {
    let n = 6;
    let slots: Arc<Vec<AtomicUsize>> = Arc::new((0..n).map(|_| AtomicUsize::new(0)).collect());
    let all_visible_episodes = Arc::new(AtomicUsize::new(0));
    let episodes = 300;

    let action_slots = Arc::clone(&slots);
    let action_counter = Arc::clone(&all_visible_episodes);
    let barrier = Arc::new(CentralBarrier::with_action(
        n,
        Box::new(move || {
            if action_slots
                .iter()
                .enumerate()
                .all(|(i, s)| s.load(Ordering::SeqCst) == i + 1)
            {
                action_counter.fetch_add(1, Ordering::SeqCst);
            }
        }),
    )
    .unwrap());

    let handles: Vec<_> = (0..n)
        .map(|id| {
            let barrier = Arc::clone(&barrier);
            let slots = Arc::clone(&slots);
            thread::spawn(move || {
                for episode in 1..=episodes {
                    slots[id].store(episode, Ordering::SeqCst);
                    barrier.wait(id);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(all_visible_episodes.load(Ordering::SeqCst), episodes);
}

/// Action runs exactly once per tripped episode, counted over K episodes,
/// for an algorithm whose releaser isn't the central counter (dissemination
/// releases via party 0's out-sense fan-out).
#[test]
fn action_runs_exactly_once_per_episode_dissemination() {
    let n = 16;
    let episodes = 1_000;
    let counter = Arc::new(AtomicUsize::new(0));
    let action_counter = Arc::clone(&counter);
    let barrier = Arc::new(
        DisseminationBarrier::with_action(
            n,
            Box::new(move || {
                action_counter.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .unwrap(),
    );
    let handles: Vec<_> = (0..n)
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
    assert_eq!(counter.load(Ordering::SeqCst), episodes);
}

/// Successive episodes are independent: running a barrier for `K` episodes
/// and inspecting it afterward should be indistinguishable from a fresh
/// barrier about to run its first episode, modulo already-observed counts.
#[test]
fn successive_episodes_are_independent() {
    let n = 8;
    for _ in 0..3 {
        let barrier = Arc::new(CentralBarrier::new(n).unwrap());
        let handles: Vec<_> = (0..n)
            .map(|id| {
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    for _ in 0..50 {
                        barrier.wait(id);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
    }
    // A freshly constructed barrier behaves identically regardless of how
    // many prior barriers in this process have already run episodes.
    run_central(n, 50);
}

/// Idempotence of construction-time validation: the same invalid arguments
/// fail identically every time.
#[test]
fn construction_validation_is_idempotent() {
    let a = CentralBarrier::new(1);
    let b = CentralBarrier::new(1);
    assert_eq!(a.unwrap_err(), b.unwrap_err());

    let a = DisseminationBarrier::new(6);
    let b = DisseminationBarrier::new(6);
    assert_eq!(a.unwrap_err(), b.unwrap_err());
}
