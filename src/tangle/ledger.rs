//! The tangle store: every transaction ever attached plus the live tip set.
//!
//! Transactions live in an arena indexed by [`TxId`]; `approves` and
//! `approved_by` hold ids into that arena, so the arena is the only owner
//! and edges in both directions are plain data.
//!
//! The tip set is maintained incrementally on every attach and is never
//! rebuilt by scanning history. [`Dag::check_tip_invariant`] exists so tests
//! can verify it against a full scan.

use std::collections::{BTreeSet, HashSet, TryReserveError};

use rand::rngs::StdRng;
use rand::SeedableRng;

use super::transaction::{ActorId, SimTime, Transaction, TxId};
use crate::constants;

/// Errors from ledger mutation.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("out of memory while attaching transaction")]
    OutOfMemory(#[from] TryReserveError),
    #[error("transaction {0} is not in the ledger")]
    UnknownTransaction(TxId),
    #[error("non-genesis transaction must approve at least one transaction")]
    NoApprovees,
    #[error("transaction approves {count} transactions, fan-out is {fan_out}")]
    TooManyApprovees { count: usize, fan_out: usize },
    #[error("approvee {approvee} was issued at {approvee_time}, after {issue_time}")]
    ApproveeFromFuture {
        approvee: TxId,
        approvee_time: SimTime,
        issue_time: SimTime,
    },
    #[error("fan-out must be between 1 and {max}, got {0}", max = constants::MAX_FAN_OUT)]
    InvalidFanOut(usize),
}

/// A point-in-time copy of the tip set.
///
/// Actors select against a snapshot, not the live set, so an actor keeps
/// working with the frontier it saw when it started even after other actors
/// have approved some of those tips. Iteration is in ascending id order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TipSnapshot {
    taken_at: SimTime,
    tips: BTreeSet<TxId>,
}

impl TipSnapshot {
    pub fn new(taken_at: SimTime, tips: impl IntoIterator<Item = TxId>) -> Self {
        TipSnapshot {
            taken_at,
            tips: tips.into_iter().collect(),
        }
    }

    /// Virtual time the snapshot was taken; also the causal cutoff for walks.
    pub fn taken_at(&self) -> SimTime {
        self.taken_at
    }

    /// Relative-tip test: was `id` a tip from this snapshot's point of view?
    pub fn contains(&self, id: TxId) -> bool {
        self.tips.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.tips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tips.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = TxId> + '_ {
        self.tips.iter().copied()
    }

    pub fn to_vec(&self) -> Vec<TxId> {
        self.iter().collect()
    }
}

/// The DAG of transactions and its tip set.
#[derive(Debug)]
pub struct Dag {
    /// All transactions, `txs[id]` is the transaction with that id
    txs: Vec<Transaction>,
    /// Transactions nobody approves yet
    tips: HashSet<TxId>,
    /// Maximum number of approvees per transaction (K)
    fan_out: usize,
}

impl Dag {
    /// Create a DAG holding only the genesis transaction.
    pub fn new(fan_out: usize) -> Result<Self, LedgerError> {
        if fan_out == 0 || fan_out > constants::MAX_FAN_OUT {
            return Err(LedgerError::InvalidFanOut(fan_out));
        }
        let mut tips = HashSet::new();
        tips.insert(TxId::GENESIS);
        Ok(Dag {
            txs: vec![Transaction::genesis()],
            tips,
            fan_out,
        })
    }

    pub fn fan_out(&self) -> usize {
        self.fan_out
    }

    pub fn get(&self, id: TxId) -> Option<&Transaction> {
        self.txs.get(id.index())
    }

    /// Look up a transaction whose id came from this DAG.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not in the DAG.
    pub(crate) fn tx(&self, id: TxId) -> &Transaction {
        match self.txs.get(id.index()) {
            Some(tx) => tx,
            None => panic!("transaction {id} is not in the DAG"),
        }
    }

    pub fn genesis(&self) -> &Transaction {
        &self.txs[0]
    }

    /// Total number of transactions, genesis included.
    pub fn len(&self) -> usize {
        self.txs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.txs.is_empty()
    }

    pub fn next_id(&self) -> TxId {
        TxId(self.txs.len() as u64)
    }

    pub fn transactions(&self) -> impl Iterator<Item = &Transaction> {
        self.txs.iter()
    }

    pub fn tip_count(&self) -> usize {
        self.tips.len()
    }

    pub fn is_tip(&self, id: TxId) -> bool {
        self.tips.contains(&id)
    }

    /// Copy the current tip set.
    pub fn snapshot_tips(&self, at: SimTime) -> TipSnapshot {
        TipSnapshot::new(at, self.tips.iter().copied())
    }

    /// Compare the live tip set against a full history scan.
    pub fn check_tip_invariant(&self) -> bool {
        let scanned: HashSet<TxId> = self
            .txs
            .iter()
            .filter(|tx| tx.is_tip())
            .map(|tx| tx.id)
            .collect();
        scanned == self.tips
    }

    /// Remove newly approved transactions from the tip set.
    ///
    /// Idempotent: ids that are not tips are ignored.
    pub(crate) fn reconcile(&mut self, approved: &[TxId]) {
        for id in approved {
            self.tips.remove(id);
        }
    }

    /// Insert a freshly created transaction into history and the tip set.
    pub(crate) fn add_tip(&mut self, tx: Transaction) -> Result<(), LedgerError> {
        debug_assert_eq!(tx.id, self.next_id());
        self.txs.try_reserve(1)?;
        self.tips.try_reserve(1)?;
        self.tips.insert(tx.id);
        self.txs.push(tx);
        Ok(())
    }

    /// Create a transaction approving `chosen` and link it into the DAG.
    ///
    /// Everything that can fail (validation and allocation) happens before
    /// the first write, so an error leaves the DAG untouched.
    pub(crate) fn attach(
        &mut self,
        issuer: Option<ActorId>,
        issue_time: SimTime,
        chosen: &[TxId],
    ) -> Result<TxId, LedgerError> {
        let mut approves = Vec::new();
        approves.try_reserve_exact(chosen.len())?;
        for &id in chosen {
            if !approves.contains(&id) {
                approves.push(id);
            }
        }

        if approves.is_empty() {
            return Err(LedgerError::NoApprovees);
        }
        if approves.len() > self.fan_out {
            return Err(LedgerError::TooManyApprovees {
                count: approves.len(),
                fan_out: self.fan_out,
            });
        }
        for &id in &approves {
            let approvee = self.get(id).ok_or(LedgerError::UnknownTransaction(id))?;
            if approvee.issue_time > issue_time {
                return Err(LedgerError::ApproveeFromFuture {
                    approvee: id,
                    approvee_time: approvee.issue_time,
                    issue_time,
                });
            }
        }

        self.txs.try_reserve(1)?;
        self.tips.try_reserve(1)?;
        for &id in &approves {
            self.txs[id.index()].approved_by.try_reserve(1)?;
        }

        let id = self.next_id();
        for &approvee in &approves {
            let parent = &mut self.txs[approvee.index()];
            parent.approved_by.push(id);
            if parent.first_approval_time.is_none() {
                parent.first_approval_time = Some(issue_time);
            }
        }
        self.reconcile(&approves);
        self.add_tip(Transaction::new(id, issue_time, issuer, approves))?;

        Ok(id)
    }
}

/// The ledger: the DAG plus the one random generator every selection draws
/// from.
///
/// The order of draws across all actors determines a run, so there is
/// exactly one generator per ledger and it is seeded by the caller.
#[derive(Debug)]
pub struct Ledger {
    dag: Dag,
    rng: StdRng,
}

impl Ledger {
    pub fn new(fan_out: usize, rng: StdRng) -> Result<Self, LedgerError> {
        Ok(Ledger {
            dag: Dag::new(fan_out)?,
            rng,
        })
    }

    /// Create a ledger whose generator is seeded deterministically.
    pub fn seeded(fan_out: usize, seed: u64) -> Result<Self, LedgerError> {
        Self::new(fan_out, StdRng::seed_from_u64(seed))
    }

    pub fn dag(&self) -> &Dag {
        &self.dag
    }

    pub fn rng_mut(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    /// Borrow the DAG read-only and the generator mutably at the same time.
    pub fn split_rng(&mut self) -> (&Dag, &mut StdRng) {
        (&self.dag, &mut self.rng)
    }

    pub fn snapshot_tips(&self, at: SimTime) -> TipSnapshot {
        self.dag.snapshot_tips(at)
    }

    pub fn tip_count(&self) -> usize {
        self.dag.tip_count()
    }

    pub fn genesis(&self) -> &Transaction {
        self.dag.genesis()
    }

    pub fn get(&self, id: TxId) -> Option<&Transaction> {
        self.dag.get(id)
    }

    pub fn len(&self) -> usize {
        self.dag.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dag.is_empty()
    }

    pub fn fan_out(&self) -> usize {
        self.dag.fan_out()
    }

    pub(crate) fn attach(
        &mut self,
        issuer: Option<ActorId>,
        issue_time: SimTime,
        chosen: &[TxId],
    ) -> Result<TxId, LedgerError> {
        self.dag.attach(issuer, issue_time, chosen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dag() -> Dag {
        Dag::new(2).unwrap()
    }

    #[test]
    fn new_dag_has_genesis_tip() {
        let dag = dag();
        assert_eq!(dag.len(), 1);
        assert_eq!(dag.tip_count(), 1);
        assert!(dag.is_tip(TxId::GENESIS));
        assert!(dag.genesis().is_genesis());
    }

    #[test]
    fn fan_out_out_of_range_rejected() {
        assert_eq!(Dag::new(0).unwrap_err(), LedgerError::InvalidFanOut(0));
        let too_wide = constants::MAX_FAN_OUT + 1;
        assert_eq!(Dag::new(too_wide).unwrap_err(), LedgerError::InvalidFanOut(too_wide));
        assert!(Dag::new(constants::MAX_FAN_OUT).is_ok());
    }

    #[test]
    #[should_panic(expected = "is not in the DAG")]
    fn lookup_of_unknown_id_names_it() {
        dag().tx(TxId(99));
    }

    #[test]
    fn attach_moves_tip() {
        let mut dag = dag();
        let t1 = dag.attach(None, SimTime(10), &[TxId::GENESIS]).unwrap();
        assert_eq!(t1, TxId(1));
        assert!(!dag.is_tip(TxId::GENESIS));
        assert!(dag.is_tip(t1));
        assert_eq!(dag.genesis().first_approval_time(), Some(SimTime(10)));
        assert!(dag.check_tip_invariant());
    }

    #[test]
    fn first_approval_time_set_once() {
        let mut dag = dag();
        let t1 = dag.attach(None, SimTime(10), &[TxId::GENESIS]).unwrap();
        let t2 = dag.attach(None, SimTime(20), &[t1]).unwrap();
        dag.attach(None, SimTime(30), &[t1, t2]).unwrap();
        assert_eq!(dag.tx(t1).first_approval_time(), Some(SimTime(20)));
        assert_eq!(dag.tx(t1).approver_count(), 2);
    }

    #[test]
    fn duplicate_approvees_collapse() {
        let mut dag = dag();
        let t1 = dag
            .attach(None, SimTime(1), &[TxId::GENESIS, TxId::GENESIS])
            .unwrap();
        assert_eq!(dag.tx(t1).approves(), &[TxId::GENESIS]);
        assert_eq!(dag.genesis().approver_count(), 1);
    }

    #[test]
    fn failed_attach_leaves_dag_untouched() {
        let mut dag = dag();
        let t1 = dag.attach(None, SimTime(10), &[TxId::GENESIS]).unwrap();

        let err = dag.attach(None, SimTime(20), &[t1, TxId(99)]).unwrap_err();
        assert_eq!(err, LedgerError::UnknownTransaction(TxId(99)));
        assert_eq!(dag.len(), 2);
        assert!(dag.is_tip(t1));
        assert!(dag.tx(t1).approved_by().is_empty());

        let err = dag.attach(None, SimTime(5), &[t1]).unwrap_err();
        assert!(matches!(err, LedgerError::ApproveeFromFuture { .. }));
        assert!(dag.is_tip(t1));

        assert_eq!(
            dag.attach(None, SimTime(20), &[]).unwrap_err(),
            LedgerError::NoApprovees
        );
        assert!(dag.check_tip_invariant());
    }

    #[test]
    fn too_many_approvees_rejected() {
        let mut dag = Dag::new(1).unwrap();
        let t1 = dag.attach(None, SimTime(1), &[TxId::GENESIS]).unwrap();
        let t2 = dag.attach(None, SimTime(2), &[t1]).unwrap();
        let err = dag.attach(None, SimTime(3), &[t1, t2]).unwrap_err();
        assert_eq!(
            err,
            LedgerError::TooManyApprovees {
                count: 2,
                fan_out: 1
            }
        );
    }

    #[test]
    fn reconcile_is_idempotent() {
        let mut dag = dag();
        let t1 = dag.attach(None, SimTime(1), &[TxId::GENESIS]).unwrap();
        dag.reconcile(&[TxId::GENESIS, TxId(42)]);
        dag.reconcile(&[TxId::GENESIS]);
        assert_eq!(dag.tip_count(), 1);
        assert!(dag.is_tip(t1));
    }

    #[test]
    fn snapshot_is_a_copy() {
        let mut dag = dag();
        let snapshot = dag.snapshot_tips(SimTime(0));
        dag.attach(None, SimTime(1), &[TxId::GENESIS]).unwrap();

        assert!(snapshot.contains(TxId::GENESIS));
        assert_eq!(snapshot.len(), 1);
        assert!(!dag.is_tip(TxId::GENESIS));
    }

    #[test]
    fn snapshot_iterates_in_id_order() {
        let mut dag = Dag::new(3).unwrap();
        let a = dag.attach(None, SimTime(1), &[TxId::GENESIS]).unwrap();
        let b = dag.attach(None, SimTime(1), &[TxId::GENESIS]).unwrap();
        let c = dag.attach(None, SimTime(1), &[TxId::GENESIS]).unwrap();
        let snapshot = dag.snapshot_tips(SimTime(1));
        assert_eq!(snapshot.to_vec(), vec![a, b, c]);
    }

    #[test]
    fn seeded_ledgers_draw_identically() {
        use rand::RngExt;

        let mut a = Ledger::seeded(2, 7).unwrap();
        let mut b = Ledger::seeded(2, 7).unwrap();
        let xs: Vec<u32> = (0..8).map(|_| a.rng_mut().random_range(0..1000)).collect();
        let ys: Vec<u32> = (0..8).map(|_| b.rng_mut().random_range(0..1000)).collect();
        assert_eq!(xs, ys);
    }
}
