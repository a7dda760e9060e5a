//! Weighted random-walk tip selection.
//!
//! A walk starts somewhere inside the tangle and steps forward along
//! `approved_by` edges until it reaches a transaction the walker considers a
//! tip. At each branch the walker prefers the candidate with the highest
//! cumulative weight with probability `alpha`, which biases the walk toward
//! the better-confirmed part of the tangle while keeping some randomness.
//!
//! ```text
//!   start ──► a ──► c ──► (tip)
//!               \
//!                ► b ──► (tip)
//! ```
//!
//! Every function here is a pure function of the DAG, a [`TipSnapshot`] and
//! the generator passed in. Nothing in the DAG is written, so traversal
//! bookkeeping (visited sets) is local to each call.

use std::collections::HashSet;

use rand::{Rng, RngExt};
use serde::{Deserialize, Serialize};

use super::ledger::{Dag, TipSnapshot};
use super::transaction::{SimTime, TxId};

/// How a walker treats the heaviest candidate at a branch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WalkBias {
    /// With probability `alpha` take the heaviest candidate, otherwise pick
    /// uniformly among the *other* candidates.
    #[default]
    ExcludeHeaviest,
    /// With probability `alpha` take the heaviest candidate, otherwise pick
    /// uniformly among *all* candidates, heaviest included.
    Inclusive,
}

/// Where a walk ended and how many steps it took to get there.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WalkOutcome {
    pub tip: TxId,
    pub steps: usize,
}

/// Cumulative weight of `tx` as seen at `as_of`.
///
/// Counts `tx` itself plus every transaction that approves it directly or
/// transitively, skipping anything issued after `as_of`. A transaction
/// reachable along several paths is counted once.
///
/// # Panics
///
/// Panics if `tx` is not in `dag`.
pub fn compute_weight(dag: &Dag, tx: TxId, as_of: SimTime) -> u64 {
    let mut visited = HashSet::new();
    visited.insert(tx);
    let mut stack = vec![tx];
    let mut weight = 1;

    while let Some(current) = stack.pop() {
        for &approver in dag.tx(current).approved_by() {
            if dag.tx(approver).visible_at(as_of) && visited.insert(approver) {
                weight += 1;
                stack.push(approver);
            }
        }
    }

    weight
}

/// Index of the first candidate with maximal weight.
fn heaviest_index(dag: &Dag, candidates: &[TxId], as_of: SimTime) -> usize {
    let mut best = 0;
    let mut best_weight = 0;
    for (i, &candidate) in candidates.iter().enumerate() {
        let weight = compute_weight(dag, candidate, as_of);
        if weight > best_weight {
            best = i;
            best_weight = weight;
        }
    }
    best
}

/// Pick a walk start by backtracking from a random tip.
///
/// Picks a uniform tip from the snapshot (genesis if the snapshot is empty)
/// and follows `approves` edges backwards for up to `backtrack_distance`
/// steps, stopping early at genesis. Each step draws one of the K approvee
/// slots and falls back to the first approvee when the drawn slot is empty.
///
/// # Panics
///
/// Panics if a non-genesis transaction with no approvees is reached. Attach
/// never creates one, so hitting it means the DAG is corrupt. Also panics if
/// `tips` holds an id that is not in `dag`; snapshots taken with
/// [`Dag::snapshot_tips`] never do.
pub fn walk_start<R: Rng + ?Sized>(
    dag: &Dag,
    tips: &TipSnapshot,
    backtrack_distance: usize,
    rng: &mut R,
) -> TxId {
    let mut current = match tips.len() {
        0 => TxId::GENESIS,
        n => {
            let index = rng.random_range(0..n);
            tips.iter().nth(index).unwrap_or(TxId::GENESIS)
        }
    };

    let mut remaining = backtrack_distance;
    while remaining > 0 {
        let tx = dag.tx(current);
        if tx.is_genesis() {
            break;
        }
        let approves = tx.approves();
        assert!(
            !approves.is_empty(),
            "non-genesis transaction {current} approves nothing"
        );
        let slot = rng.random_range(0..dag.fan_out());
        current = approves.get(slot).copied().unwrap_or(approves[0]);
        remaining -= 1;
    }

    current
}

/// Walk forward from `start` until reaching a tip of `tips`.
///
/// Only approvers issued at or before `as_of` are considered. If a walker
/// runs out of visible approvers before reaching a snapshot tip it stops
/// where it is; the returned transaction is then not necessarily a tip.
///
/// # Panics
///
/// Panics if `start` is not in `dag`.
pub fn walk<R: Rng + ?Sized>(
    dag: &Dag,
    start: TxId,
    alpha: f64,
    tips: &TipSnapshot,
    as_of: SimTime,
    bias: WalkBias,
    rng: &mut R,
) -> WalkOutcome {
    let mut current = start;
    let mut steps = 0;

    while !tips.contains(current) {
        let mut candidates: Vec<TxId> = dag
            .tx(current)
            .approved_by()
            .iter()
            .copied()
            .filter(|&id| dag.tx(id).visible_at(as_of))
            .collect();

        let next = match candidates.len() {
            0 => {
                tracing::trace!(tx = %current, steps, "walk stalled before reaching a tip");
                break;
            }
            1 => candidates[0],
            _ => {
                let heaviest = heaviest_index(dag, &candidates, as_of);
                match bias {
                    WalkBias::ExcludeHeaviest => {
                        let heaviest = candidates.remove(heaviest);
                        if rng.random::<f64>() < alpha {
                            heaviest
                        } else if candidates.len() == 1 {
                            candidates[0]
                        } else {
                            candidates[rng.random_range(0..candidates.len())]
                        }
                    }
                    WalkBias::Inclusive => {
                        if rng.random::<f64>() < alpha {
                            candidates[heaviest]
                        } else {
                            candidates[rng.random_range(0..candidates.len())]
                        }
                    }
                }
            }
        };

        current = next;
        steps += 1;
    }

    WalkOutcome { tip: current, steps }
}

/// Number of walkers multi-walker launches for `k_multiplier` and K, or
/// `None` if it does not fit in a `usize`.
pub fn walker_count(k_multiplier: usize, fan_out: usize) -> Option<usize> {
    k_multiplier.checked_mul(fan_out)?.checked_add(4)
}

/// Select up to K tips by agreement among several independent walkers.
///
/// Launches `k_multiplier * K + 4` inclusive walks, each from its own
/// backtracked start. Results are ordered by walk length (longest first),
/// duplicates are dropped and the first K distinct tips are returned.
///
/// # Panics
///
/// Panics if `tips` holds an id that is not in `dag`, as [`walk_start`] does,
/// or if [`walker_count`] overflows.
pub fn multi_walker<R: Rng + ?Sized>(
    dag: &Dag,
    tips: &TipSnapshot,
    alpha: f64,
    as_of: SimTime,
    k_multiplier: usize,
    backtrack_distance: usize,
    rng: &mut R,
) -> Vec<TxId> {
    let k = dag.fan_out();
    let Some(walkers) = walker_count(k_multiplier, k) else {
        panic!("walker count overflows for k_multiplier {k_multiplier} and K {k}");
    };

    let mut outcomes: Vec<WalkOutcome> = (0..walkers)
        .map(|_| {
            let start = walk_start(dag, tips, backtrack_distance, &mut *rng);
            walk(dag, start, alpha, tips, as_of, WalkBias::Inclusive, &mut *rng)
        })
        .collect();
    outcomes.sort_by(|a, b| b.steps.cmp(&a.steps));

    let mut seen = HashSet::new();
    let chosen: Vec<TxId> = outcomes
        .into_iter()
        .map(|outcome| outcome.tip)
        .filter(|tip| seen.insert(*tip))
        .take(k)
        .collect();

    tracing::trace!(walkers, chosen = chosen.len(), "multi-walker selection");
    chosen
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(11)
    }

    /// genesis ← a ← c, genesis ← b ← c, b ← d
    fn diamond() -> (Dag, [TxId; 4]) {
        let mut dag = Dag::new(2).unwrap();
        let a = dag.attach(None, SimTime(10), &[TxId::GENESIS]).unwrap();
        let b = dag.attach(None, SimTime(20), &[TxId::GENESIS]).unwrap();
        let c = dag.attach(None, SimTime(30), &[a, b]).unwrap();
        let d = dag.attach(None, SimTime(40), &[b]).unwrap();
        (dag, [a, b, c, d])
    }

    #[test]
    fn weight_counts_shared_approvers_once() {
        let (dag, [a, b, c, d]) = diamond();
        assert_eq!(compute_weight(&dag, TxId::GENESIS, SimTime(100)), 5);
        assert_eq!(compute_weight(&dag, a, SimTime(100)), 2);
        assert_eq!(compute_weight(&dag, b, SimTime(100)), 3);
        assert_eq!(compute_weight(&dag, c, SimTime(100)), 1);
        assert_eq!(compute_weight(&dag, d, SimTime(100)), 1);
    }

    #[test]
    fn weight_respects_cutoff() {
        let (dag, [_, b, _, _]) = diamond();
        assert_eq!(compute_weight(&dag, TxId::GENESIS, SimTime(0)), 1);
        assert_eq!(compute_weight(&dag, TxId::GENESIS, SimTime(20)), 3);
        assert_eq!(compute_weight(&dag, TxId::GENESIS, SimTime(30)), 4);
        assert_eq!(compute_weight(&dag, b, SimTime(35)), 2);
    }

    #[test]
    fn heaviest_prefers_first_on_tie() {
        let (dag, [a, b, c, d]) = diamond();
        assert_eq!(heaviest_index(&dag, &[a, b], SimTime(100)), 1);
        assert_eq!(heaviest_index(&dag, &[c, d], SimTime(100)), 0);
    }

    #[test]
    fn walk_start_without_backtrack_is_a_tip() {
        let (dag, _) = diamond();
        let tips = dag.snapshot_tips(SimTime(100));
        let mut rng = rng();
        for _ in 0..20 {
            assert!(tips.contains(walk_start(&dag, &tips, 0, &mut rng)));
        }
    }

    #[test]
    fn walk_start_stops_at_genesis() {
        let (dag, _) = diamond();
        let tips = dag.snapshot_tips(SimTime(100));
        let mut rng = rng();
        for _ in 0..20 {
            assert_eq!(walk_start(&dag, &tips, 50, &mut rng), TxId::GENESIS);
        }
    }

    #[test]
    fn walk_start_on_empty_snapshot_is_genesis() {
        let (dag, _) = diamond();
        let tips = TipSnapshot::new(SimTime(100), []);
        assert_eq!(walk_start(&dag, &tips, 3, &mut rng()), TxId::GENESIS);
    }

    #[test]
    #[should_panic(expected = "approves nothing")]
    fn walk_start_panics_on_orphan() {
        let mut dag = Dag::new(2).unwrap();
        dag.add_tip(crate::tangle::Transaction::new(TxId(1), SimTime(1), None, vec![]))
            .unwrap();
        let tips = TipSnapshot::new(SimTime(1), [TxId(1)]);
        walk_start(&dag, &tips, 1, &mut rng());
    }

    #[test]
    #[should_panic(expected = "#99 is not in the DAG")]
    fn walk_start_panics_on_foreign_snapshot() {
        let (dag, _) = diamond();
        let tips = TipSnapshot::new(SimTime(100), [TxId(99)]);
        walk_start(&dag, &tips, 2, &mut rng());
    }

    #[test]
    fn walker_count_checks_overflow() {
        assert_eq!(walker_count(1, 2), Some(6));
        assert_eq!(walker_count(0, 3), Some(4));
        assert_eq!(walker_count(usize::MAX, 2), None);
        assert_eq!(walker_count(usize::MAX / 2, 2), None);
    }

    #[test]
    fn walk_from_tip_takes_no_steps() {
        let (dag, [_, _, c, _]) = diamond();
        let tips = dag.snapshot_tips(SimTime(100));
        let outcome = walk(&dag, c, 0.5, &tips, SimTime(100), WalkBias::Inclusive, &mut rng());
        assert_eq!(outcome, WalkOutcome { tip: c, steps: 0 });
    }

    #[test]
    fn walk_with_full_bias_follows_heaviest() {
        let (dag, [_, b, _, _]) = diamond();
        let tips = dag.snapshot_tips(SimTime(100));
        let mut rng = rng();
        for bias in [WalkBias::ExcludeHeaviest, WalkBias::Inclusive] {
            let outcome = walk(&dag, TxId::GENESIS, 1.0, &tips, SimTime(100), bias, &mut rng);
            // genesis -> b (heaviest), then b -> c (tie with d, first wins)
            assert_eq!(outcome.steps, 2);
            assert!(tips.contains(outcome.tip));
            assert!(dag.tx(outcome.tip).approves().contains(&b));
        }
    }

    #[test]
    fn exclude_heaviest_with_zero_alpha_never_takes_heaviest() {
        let (dag, [a, _, _, _]) = diamond();
        // Stop walkers right after the first branch.
        let tips = TipSnapshot::new(SimTime(100), dag.genesis().approved_by().iter().copied());
        let mut rng = rng();
        for _ in 0..50 {
            let outcome = walk(
                &dag,
                TxId::GENESIS,
                0.0,
                &tips,
                SimTime(100),
                WalkBias::ExcludeHeaviest,
                &mut rng,
            );
            assert_eq!(outcome.tip, a);
        }
    }

    #[test]
    fn inclusive_with_zero_alpha_reaches_both_branches() {
        let (dag, [a, b, _, _]) = diamond();
        let tips = TipSnapshot::new(SimTime(100), [a, b]);
        let mut rng = rng();
        let mut seen = HashSet::new();
        for _ in 0..100 {
            let outcome = walk(
                &dag,
                TxId::GENESIS,
                0.0,
                &tips,
                SimTime(100),
                WalkBias::Inclusive,
                &mut rng,
            );
            seen.insert(outcome.tip);
        }
        assert_eq!(seen, HashSet::from([a, b]));
    }

    #[test]
    fn walk_stalls_at_cutoff() {
        let (dag, [a, _, _, _]) = diamond();
        // c approves a but is not visible yet; a is not a snapshot tip.
        let tips = TipSnapshot::new(SimTime(15), [TxId(99)]);
        let outcome = walk(&dag, a, 0.5, &tips, SimTime(15), WalkBias::Inclusive, &mut rng());
        assert_eq!(outcome, WalkOutcome { tip: a, steps: 0 });
    }

    #[test]
    fn multi_walker_returns_distinct_tips() {
        let (dag, _) = diamond();
        let tips = dag.snapshot_tips(SimTime(100));
        let mut rng = rng();
        for _ in 0..20 {
            let chosen = multi_walker(&dag, &tips, 0.3, SimTime(100), 2, 3, &mut rng);
            assert!(!chosen.is_empty() && chosen.len() <= 2);
            let unique: HashSet<_> = chosen.iter().collect();
            assert_eq!(unique.len(), chosen.len());
            assert!(chosen.iter().all(|&t| tips.contains(t)));
        }
    }
}
