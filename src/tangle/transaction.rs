//! Transaction records: the vertices of the tangle.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique transaction identifier.
///
/// Ids are assigned by the ledger in strictly increasing order and double as
/// the index into the ledger's arena. Genesis is always `TxId(0)`.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct TxId(pub u64);

impl TxId {
    pub const GENESIS: TxId = TxId(0);

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifier of the actor that issued a transaction.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ActorId(pub u32);

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "actor-{}", self.0)
    }
}

/// Virtual simulation time in milliseconds.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
)]
pub struct SimTime(pub u64);

impl SimTime {
    pub const ZERO: SimTime = SimTime(0);

    pub fn from_millis(ms: u64) -> Self {
        SimTime(ms)
    }

    pub fn as_millis(self) -> u64 {
        self.0
    }

    pub fn saturating_add(self, ms: u64) -> Self {
        SimTime(self.0.saturating_add(ms))
    }

    /// Milliseconds elapsed since `earlier`, zero if `earlier` is later.
    pub fn since(self, earlier: SimTime) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:03}s", self.0 / 1000, self.0 % 1000)
    }
}

/// A transaction in the tangle.
///
/// Identity (`id`, `issue_time`, `approves`) is fixed at creation. The
/// approval bookkeeping (`approved_by`, `first_approval_time`) only grows and
/// is written exclusively by the ledger during attach.
#[derive(Clone, Debug)]
pub struct Transaction {
    pub(crate) id: TxId,
    pub(crate) issue_time: SimTime,
    pub(crate) issuer: Option<ActorId>,
    /// Transactions this one directly approves (0 for genesis, 1..=K otherwise)
    pub(crate) approves: Vec<TxId>,
    /// Transactions that directly approve this one, in attach order
    pub(crate) approved_by: Vec<TxId>,
    pub(crate) first_approval_time: Option<SimTime>,
}

impl Transaction {
    pub(crate) fn genesis() -> Self {
        Transaction {
            id: TxId::GENESIS,
            issue_time: SimTime::ZERO,
            issuer: None,
            approves: Vec::new(),
            approved_by: Vec::new(),
            first_approval_time: None,
        }
    }

    pub(crate) fn new(
        id: TxId,
        issue_time: SimTime,
        issuer: Option<ActorId>,
        approves: Vec<TxId>,
    ) -> Self {
        Transaction {
            id,
            issue_time,
            issuer,
            approves,
            approved_by: Vec::new(),
            first_approval_time: None,
        }
    }

    pub fn id(&self) -> TxId {
        self.id
    }

    pub fn issue_time(&self) -> SimTime {
        self.issue_time
    }

    pub fn issuer(&self) -> Option<ActorId> {
        self.issuer
    }

    pub fn approves(&self) -> &[TxId] {
        &self.approves
    }

    pub fn approved_by(&self) -> &[TxId] {
        &self.approved_by
    }

    pub fn approver_count(&self) -> usize {
        self.approved_by.len()
    }

    pub fn first_approval_time(&self) -> Option<SimTime> {
        self.first_approval_time
    }

    pub fn is_genesis(&self) -> bool {
        self.id == TxId::GENESIS
    }

    /// A tip is a transaction nobody approves yet.
    pub fn is_tip(&self) -> bool {
        self.approved_by.is_empty()
    }

    /// Whether this transaction was visible at `as_of`.
    pub fn visible_at(&self, as_of: SimTime) -> bool {
        self.issue_time <= as_of
    }

    /// Time from issue to first approval, if it has been approved.
    pub fn confirmation_latency(&self) -> Option<u64> {
        self.first_approval_time.map(|t| t.since(self.issue_time))
    }
}
