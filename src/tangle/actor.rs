//! Actors: the parties that select tips and attach new transactions.

use std::collections::HashSet;

use rand::{Rng, RngExt};

use super::ledger::{Dag, Ledger, LedgerError, TipSnapshot};
use super::transaction::{ActorId, SimTime, TxId};
use super::walk::{multi_walker, walk, walk_start, WalkBias};

/// Tip-selection strategy.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TipSelector {
    /// Sample up to K snapshot tips uniformly without replacement.
    UniformRandom,
    /// One biased walk per approvee slot, each from its own backtracked start.
    WeightedWalk {
        alpha: f64,
        backtrack_distance: usize,
        bias: WalkBias,
    },
    /// `k_multiplier * K + 4` inclusive walkers, longest walks win.
    MultiWalker {
        alpha: f64,
        backtrack_distance: usize,
        k_multiplier: usize,
    },
}

impl TipSelector {
    pub fn name(&self) -> &'static str {
        match self {
            TipSelector::UniformRandom => "uniform-random",
            TipSelector::WeightedWalk {
                bias: WalkBias::ExcludeHeaviest,
                ..
            } => "weighted-walk (exclude-heaviest)",
            TipSelector::WeightedWalk {
                bias: WalkBias::Inclusive,
                ..
            } => "weighted-walk (inclusive)",
            TipSelector::MultiWalker { .. } => "multi-walker",
        }
    }

    /// Whether this strategy finds tips by walking the DAG.
    pub fn is_walk(&self) -> bool {
        !matches!(self, TipSelector::UniformRandom)
    }

    /// Choose up to K distinct transactions to approve.
    ///
    /// Walks use the snapshot time as their causal cutoff.
    ///
    /// # Panics
    ///
    /// Walk-based strategies panic if `tips` holds an id that is not in
    /// `dag`; see [`walk_start`].
    pub fn select<R: Rng + ?Sized>(
        &self,
        dag: &Dag,
        tips: &TipSnapshot,
        rng: &mut R,
    ) -> Vec<TxId> {
        let k = dag.fan_out();
        let as_of = tips.taken_at();
        match *self {
            TipSelector::UniformRandom => uniform_random(tips, k, rng),
            TipSelector::WeightedWalk {
                alpha,
                backtrack_distance,
                bias,
            } => {
                let mut chosen = Vec::with_capacity(k.min(tips.len()));
                for _ in 0..k {
                    let start = walk_start(dag, tips, backtrack_distance, &mut *rng);
                    let outcome = walk(dag, start, alpha, tips, as_of, bias, &mut *rng);
                    chosen.push(outcome.tip);
                }
                dedup_in_order(chosen)
            }
            TipSelector::MultiWalker {
                alpha,
                backtrack_distance,
                k_multiplier,
            } => multi_walker(dag, tips, alpha, as_of, k_multiplier, backtrack_distance, rng),
        }
    }
}

/// Uniform random tip selection.
///
/// Draws up to `k` tips from the snapshot without replacement. Returns fewer
/// than `k` when the snapshot is smaller than that.
pub fn uniform_random<R: Rng + ?Sized>(tips: &TipSnapshot, k: usize, rng: &mut R) -> Vec<TxId> {
    let mut pool = tips.to_vec();
    let mut chosen = Vec::with_capacity(k.min(pool.len()));
    for _ in 0..k {
        if pool.is_empty() {
            break;
        }
        let index = rng.random_range(0..pool.len());
        chosen.push(pool.remove(index));
    }
    dedup_in_order(chosen)
}

fn dedup_in_order(ids: Vec<TxId>) -> Vec<TxId> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}

/// An actor issuing transactions into one ledger.
///
/// The actor keeps no reference to the ledger; every operation takes it
/// explicitly. `issued` is bookkeeping for reporting and is never consulted
/// by selection.
#[derive(Clone, Debug)]
pub struct Actor {
    id: ActorId,
    issued: Vec<TxId>,
}

impl Actor {
    pub fn new(id: ActorId) -> Self {
        Actor {
            id,
            issued: Vec::new(),
        }
    }

    pub fn id(&self) -> ActorId {
        self.id
    }

    /// Transactions this actor attached, oldest first.
    pub fn issued(&self) -> &[TxId] {
        &self.issued
    }

    /// Run `selector` against `tips` using the ledger's shared generator.
    pub fn select(&self, ledger: &mut Ledger, selector: &TipSelector, tips: &TipSnapshot) -> Vec<TxId> {
        let (dag, rng) = ledger.split_rng();
        selector.select(dag, tips, rng)
    }

    /// Attach a new transaction approving `chosen`.
    ///
    /// Links the new transaction into the DAG, removes the approvees from
    /// the live tip set and adds the new transaction as a tip. On error
    /// nothing in the ledger or the actor has changed.
    pub fn attach(
        &mut self,
        ledger: &mut Ledger,
        tips: &TipSnapshot,
        issue_time: SimTime,
        chosen: &[TxId],
    ) -> Result<TxId, LedgerError> {
        self.issued.try_reserve(1)?;

        // Snapshot tips someone else approved while we were working.
        let stale = tips.iter().filter(|&t| !ledger.dag().is_tip(t)).count();

        let id = ledger.attach(Some(self.id), issue_time, chosen)?;
        self.issued.push(id);

        tracing::debug!(
            actor = %self.id,
            tx = %id,
            approves = ?chosen,
            tips_seen = tips.len(),
            stale,
            tips_now = ledger.tip_count(),
            "attached transaction"
        );
        Ok(id)
    }
}
