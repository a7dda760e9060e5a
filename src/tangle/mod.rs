//! # The tangle
//!
//! A DAG ledger without blocks or a total order. Every new transaction
//! approves up to K earlier transactions that were still unapproved ("tips")
//! when its issuer looked at the ledger:
//!
//! ```text
//!            ┌── t1 ◄── t3 ◄──┐
//!  genesis ◄─┤                ├── t5   (tip)
//!            └── t2 ◄── t4 ◄──┘
//!                        ▲
//!                        └──── t6     (tip)
//! ```
//!
//! Confidence in a transaction grows with its cumulative weight: the number
//! of transactions that approve it directly or indirectly.
//!
//! ## Pieces
//!
//! - [`transaction`]: transaction records and ids
//! - [`ledger`]: the arena of transactions, the live tip set and the shared
//!   random generator
//! - [`walk`]: cumulative weight, backtracking walk start, biased random
//!   walks and multi-walker selection
//! - [`actor`]: uniform random selection, the [`TipSelector`] strategy and
//!   attach

pub mod actor;
pub mod ledger;
pub mod transaction;
pub mod walk;

pub use actor::{uniform_random, Actor, TipSelector};
pub use ledger::{Dag, Ledger, LedgerError, TipSnapshot};
pub use transaction::{ActorId, SimTime, Transaction, TxId};
pub use walk::{
    compute_weight, multi_walker, walk, walk_start, walker_count, WalkBias, WalkOutcome,
};
