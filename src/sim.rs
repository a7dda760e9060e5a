//! Discrete-event driver.
//!
//! Advances virtual time and moves each actor through its issuance cycle:
//!
//! ```text
//!  NextTx ──► TipRequest ──► TipReply ──► PowComplete ──► AttachConfirmed
//!    ▲          (link)        (link,        (pow time,       (link)
//!    │                        snapshot)     select+attach)
//!    └──────────────── exponential issue interval ──┘
//! ```
//!
//! Exactly one event is handled at a time, in non-decreasing time order and
//! FIFO among events scheduled for the same instant. An actor's snapshot is
//! taken at `TipReply` and used unchanged at `PowComplete`, so actors work
//! against a stale view of the tips whenever `pow_time_ms` is non-zero.
//!
//! New transactions are stamped with the `PowComplete` time by default. With
//! `issue_time = "tip-view"` walk strategies stamp with the snapshot time
//! instead, so their transactions look older to other actors' weight cutoffs.
//!
//! Scheduling draws come from a separate generator so that the sequence of
//! draws seen by tip selection depends only on the ledger seed and the order
//! of events.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use rand::rngs::StdRng;
use rand::{Rng, RngExt, SeedableRng};

use crate::config::{ConfigError, IssueTime, SimConfig};
use crate::constants;
use crate::tangle::{
    Actor, ActorId, Ledger, LedgerError, SimTime, TipSelector, TipSnapshot, TxId,
};

/// Errors that prevent a simulation from starting.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Event {
    NextTx(usize),
    TipRequest(usize),
    TipReply(usize),
    PowComplete(usize),
    AttachConfirmed(TxId),
}

#[derive(Debug, PartialEq, Eq)]
struct Scheduled {
    at: SimTime,
    seq: u64,
    event: Event,
}

// BinaryHeap is a max-heap; invert so the earliest (then oldest) pops first.
impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .at
            .cmp(&self.at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug)]
struct ActorSlot {
    actor: Actor,
    /// Tips seen at the last `TipReply`, consumed at `PowComplete`
    view: Option<TipSnapshot>,
}

/// A tracked transaction's state at the end of a run.
#[derive(Clone, Debug, PartialEq)]
pub struct TrackedTx {
    pub id: TxId,
    pub issue_time: SimTime,
    pub approvers: usize,
    pub confirmation_ms: Option<u64>,
}

/// Summary of a finished (or interrupted) run.
#[derive(Clone, Debug, PartialEq)]
pub struct SimReport {
    pub strategy: &'static str,
    pub end_time: SimTime,
    /// Attached transactions, genesis excluded
    pub transactions: usize,
    pub tips: usize,
    /// Transactions with at least one approver, genesis excluded
    pub confirmed: usize,
    pub mean_confirmation_ms: Option<f64>,
    pub mean_tips_seen: f64,
    pub attach_failures: u64,
    pub tracked: Vec<TrackedTx>,
}

/// A single simulation run.
pub struct Simulation {
    config: SimConfig,
    ledger: Ledger,
    selector: TipSelector,
    actors: Vec<ActorSlot>,
    queue: BinaryHeap<Scheduled>,
    seq: u64,
    now: SimTime,
    schedule_rng: StdRng,
    tracked: Vec<TxId>,
    snapshots: u64,
    tips_seen: u64,
    attach_failures: u64,
    finished: bool,
}

/// Exponentially distributed delay with the given mean, by inversion.
fn exponential_ms<R: Rng + ?Sized>(rng: &mut R, mean_ms: u64) -> u64 {
    if mean_ms == 0 {
        return 0;
    }
    let u: f64 = rng.random();
    (-(mean_ms as f64) * (1.0 - u).ln()).round() as u64
}

impl Simulation {
    pub fn new(config: SimConfig) -> Result<Self, SimError> {
        config.validate()?;
        let seed = config.simulation.seed;
        let ledger = Ledger::seeded(config.selection.fan_out, seed)?;
        let selector = config.selection.selector();
        let actors = (0..config.simulation.actors)
            .map(|i| ActorSlot {
                actor: Actor::new(ActorId(i as u32)),
                view: None,
            })
            .collect();

        let mut sim = Simulation {
            ledger,
            selector,
            actors,
            queue: BinaryHeap::new(),
            seq: 0,
            now: SimTime::ZERO,
            schedule_rng: StdRng::seed_from_u64(seed ^ constants::SCHEDULE_SEED_MIX),
            tracked: Vec::new(),
            snapshots: 0,
            tips_seen: 0,
            attach_failures: 0,
            finished: false,
            config,
        };

        for i in 0..sim.actors.len() {
            let delay = exponential_ms(
                &mut sim.schedule_rng,
                sim.config.simulation.issue_interval_ms,
            );
            sim.schedule(delay, Event::NextTx(i));
        }

        Ok(sim)
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn actors(&self) -> impl Iterator<Item = &Actor> {
        self.actors.iter().map(|slot| &slot.actor)
    }

    pub fn now(&self) -> SimTime {
        self.now
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn schedule(&mut self, delay_ms: u64, event: Event) {
        self.seq += 1;
        self.queue.push(Scheduled {
            at: self.now.saturating_add(delay_ms),
            seq: self.seq,
            event,
        });
    }

    /// Handle the next event. Returns `false` once the run is over.
    pub fn step(&mut self) -> bool {
        if self.finished {
            return false;
        }
        let Some(next) = self.queue.pop() else {
            self.finished = true;
            return false;
        };
        debug_assert!(next.at >= self.now);
        self.now = next.at;
        self.handle(next.event);
        !self.finished
    }

    /// Run until the transaction limit is reached.
    pub fn run(&mut self) -> SimReport {
        tracing::info!(
            strategy = self.selector.name(),
            actors = self.actors.len(),
            limit = self.config.simulation.transaction_limit,
            seed = self.config.simulation.seed,
            "Starting simulation"
        );
        while self.step() {}
        let report = self.report();
        tracing::info!(
            end = %report.end_time,
            transactions = report.transactions,
            tips = report.tips,
            "Simulation finished"
        );
        report
    }

    fn handle(&mut self, event: Event) {
        let link = self.config.simulation.link_delay_ms;
        match event {
            Event::NextTx(i) => {
                tracing::trace!(actor = %self.actors[i].actor.id(), "requesting tips");
                self.schedule(link, Event::TipRequest(i));
            }
            Event::TipRequest(i) => {
                self.schedule(link, Event::TipReply(i));
            }
            Event::TipReply(i) => {
                let view = self.ledger.snapshot_tips(self.now);
                self.snapshots += 1;
                self.tips_seen += view.len() as u64;
                self.actors[i].view = Some(view);
                self.schedule(self.config.simulation.pow_time_ms, Event::PowComplete(i));
            }
            Event::PowComplete(i) => {
                self.complete_pow(i);
                let delay =
                    exponential_ms(&mut self.schedule_rng, self.config.simulation.issue_interval_ms);
                self.schedule(delay, Event::NextTx(i));
            }
            Event::AttachConfirmed(id) => {
                if id.0 >= self.config.simulation.transaction_limit {
                    tracing::info!(tx = %id, at = %self.now, "Transaction limit reached");
                    self.finished = true;
                }
            }
        }
    }

    fn complete_pow(&mut self, i: usize) {
        let slot = &mut self.actors[i];
        let actor_id = slot.actor.id();
        let Some(view) = slot.view.take() else {
            tracing::warn!(actor = %actor_id, "proof of work completed without a tip view");
            return;
        };

        let issue_time = match self.config.simulation.issue_time {
            IssueTime::TipView if self.selector.is_walk() => view.taken_at(),
            _ => self.now,
        };

        let chosen = slot.actor.select(&mut self.ledger, &self.selector, &view);
        let attached = slot.actor.attach(&mut self.ledger, &view, issue_time, &chosen);
        match attached {
            Ok(id) => {
                if id.0 % constants::TRACK_EVERY == 0 {
                    self.tracked.push(id);
                }
                self.schedule(self.config.simulation.link_delay_ms, Event::AttachConfirmed(id));
            }
            Err(e) => {
                self.attach_failures += 1;
                tracing::warn!(actor = %actor_id, error = %e, "Attach failed");
            }
        }
    }

    /// Summarise the current state of the run.
    pub fn report(&self) -> SimReport {
        let dag = self.ledger.dag();
        let latencies: Vec<u64> = dag
            .transactions()
            .filter(|tx| !tx.is_genesis())
            .filter_map(|tx| tx.confirmation_latency())
            .collect();
        let mean_confirmation_ms = if latencies.is_empty() {
            None
        } else {
            Some(latencies.iter().sum::<u64>() as f64 / latencies.len() as f64)
        };
        let mean_tips_seen = if self.snapshots == 0 {
            0.0
        } else {
            self.tips_seen as f64 / self.snapshots as f64
        };

        let tracked = self
            .tracked
            .iter()
            .filter_map(|&id| dag.get(id))
            .map(|tx| TrackedTx {
                id: tx.id(),
                issue_time: tx.issue_time(),
                approvers: tx.approver_count(),
                confirmation_ms: tx.confirmation_latency(),
            })
            .collect();

        SimReport {
            strategy: self.selector.name(),
            end_time: self.now,
            transactions: dag.len() - 1,
            tips: dag.tip_count(),
            confirmed: latencies.len(),
            mean_confirmation_ms,
            mean_tips_seen,
            attach_failures: self.attach_failures,
            tracked,
        }
    }
}
