//! # tangle-sim
//!
//! A simulator for DAG ledgers in the style of a "tangle":
//! - **No blocks, no total order**: each transaction approves up to K earlier
//!   unconfirmed transactions (tips)
//! - **Tip selection**: uniform random, biased random walk (two variants)
//!   and multi-walker agreement
//! - **Cumulative weight** with a causal cutoff, so actors only see what
//!   existed when they started working
//! - **Discrete-event driver**: actors with stale tip views, simulated
//!   proof-of-work delay and link latency
//!
//! The [`tangle`] module is the core and has no knowledge of the driver.

pub mod config;
pub mod sim;
pub mod tangle;

/// Simulation constants
pub mod constants {
    /// Default number of transactions each transaction approves (K)
    pub const DEFAULT_FAN_OUT: usize = 2;
    /// Default probability of a walker stepping to the heaviest candidate
    pub const DEFAULT_ALPHA: f64 = 0.5;
    /// Default number of backwards steps when picking a walk start
    pub const DEFAULT_BACKTRACK_DISTANCE: usize = 10;
    /// Default multi-walker multiplier; walkers = multiplier * K + 4
    pub const DEFAULT_K_MULTIPLIER: usize = 1;
    /// Upper bound on K accepted by the ledger and config
    pub const MAX_FAN_OUT: usize = 64;
    /// Upper bound on the multi-walker multiplier accepted by config
    pub const MAX_K_MULTIPLIER: usize = 1_024;

    /// Default number of issuing actors
    pub const DEFAULT_ACTORS: usize = 10;
    /// Default run length in transactions
    pub const DEFAULT_TRANSACTION_LIMIT: u64 = 1_000;
    /// Default mean time between an actor's issuances
    pub const DEFAULT_ISSUE_INTERVAL_MS: u64 = 1_000;
    /// Default proof-of-work delay
    pub const DEFAULT_POW_TIME_MS: u64 = 500;

    /// Every n-th transaction is tracked in the run report
    pub const TRACK_EVERY: u64 = 10;
    /// Mixed into the run seed for the scheduling generator
    pub const SCHEDULE_SEED_MIX: u64 = 0x9e37_79b9_7f4a_7c15;

    /// Config file looked up in the working directory
    pub const CONFIG_FILE_NAME: &str = "tangle.toml";
}
