//! Frontier bookkeeping for the crawl
//!
//! This module handles:
//! - The FIFO queue of pending units, including retries waiting out a backoff
//! - The "seen" set used to dedup units by normalized URL
//! - Tracking which units are in flight and moving them through their
//!   lifecycle states
//!
//! The frontier is plain data; the coordinator wraps it in a lock and is the
//! only thing that decides when to dispatch.

use crate::state::{UnitState, WorkUnit};
use std::collections::{HashMap, HashSet, VecDeque};
use tokio::time::Instant;
use tracing::{trace, warn};

/// A unit waiting for a worker
#[derive(Debug, Clone)]
pub struct QueuedUnit {
    pub unit: WorkUnit,

    /// 1-based fetch attempt this dispatch will make
    pub attempt: u32,

    /// Earliest dispatch time; set while a retry backs off
    pub not_before: Option<Instant>,
}

impl QueuedUnit {
    fn ready_at(&self, now: Instant) -> bool {
        self.not_before.map_or(true, |at| at <= now)
    }
}

/// What the frontier has to offer right now
#[derive(Debug)]
pub enum Ready {
    /// A unit to dispatch, already moved to `InFlight`
    Unit(QueuedUnit),
    /// Only backing-off retries are queued; the earliest is due then
    WaitUntil(Instant),
    /// Nothing queued
    Empty,
}

/// Pending queue plus in-flight set plus everything ever admitted
#[derive(Debug, Default)]
pub struct Frontier {
    queue: VecDeque<QueuedUnit>,
    in_flight: HashMap<String, (WorkUnit, UnitState)>,
    seen: HashSet<String>,
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admits a new unit
    ///
    /// Returns false if a unit with the same normalized URL was already
    /// admitted in this run (queued, in flight or finished).
    pub fn push(&mut self, unit: WorkUnit) -> bool {
        if !self.seen.insert(unit.key().to_string()) {
            trace!("Already seen: {}", unit.key());
            return false;
        }

        self.queue.push_back(QueuedUnit {
            unit,
            attempt: 1,
            not_before: None,
        });
        true
    }

    /// Returns true if the unit was admitted in this run
    pub fn has_seen(&self, key: &str) -> bool {
        self.seen.contains(key)
    }

    /// Records a key as handled without queueing it
    ///
    /// Used for units a prior run already completed.
    pub fn mark_seen(&mut self, key: &str) -> bool {
        self.seen.insert(key.to_string())
    }

    /// Takes the first unit that may be dispatched now
    pub fn pop_ready(&mut self, now: Instant) -> Ready {
        let position = match self.queue.iter().position(|q| q.ready_at(now)) {
            Some(position) => position,
            None => {
                return match self.queue.iter().filter_map(|q| q.not_before).min() {
                    Some(at) => Ready::WaitUntil(at),
                    None => Ready::Empty,
                };
            }
        };

        let Some(entry) = self.queue.remove(position) else {
            return Ready::Empty;
        };
        let state = advance(entry.unit.key(), UnitState::Pending, UnitState::InFlight);
        self.in_flight
            .insert(entry.unit.key().to_string(), (entry.unit.clone(), state));
        Ready::Unit(entry)
    }

    /// Puts an in-flight unit back in the queue for another attempt
    pub fn requeue(&mut self, unit: WorkUnit, attempt: u32, not_before: Instant) {
        if let Some((_, state)) = self.in_flight.remove(unit.key()) {
            advance(unit.key(), state, UnitState::Pending);
        }

        self.queue.push_back(QueuedUnit {
            unit,
            attempt,
            not_before: Some(not_before),
        });
    }

    /// Records that an in-flight unit produced a document
    pub fn mark_extracted(&mut self, key: &str) {
        if let Some((_, state)) = self.in_flight.get_mut(key) {
            *state = advance(key, *state, UnitState::Extracted);
        }
    }

    /// Retires an in-flight unit as `Complete` or `Failed`
    pub fn finish(&mut self, key: &str, outcome: UnitState) -> Option<WorkUnit> {
        let (unit, state) = self.in_flight.remove(key)?;
        advance(key, state, outcome);
        Some(unit)
    }

    /// Current lifecycle state of an in-flight unit
    pub fn state_of(&self, key: &str) -> Option<UnitState> {
        self.in_flight.get(key).map(|(_, state)| *state)
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Returns true when nothing is queued and nothing is in flight
    pub fn is_drained(&self) -> bool {
        self.queue.is_empty() && self.in_flight.is_empty()
    }

    /// Every unit not yet retired, in flight first, for persistence
    pub fn outstanding(&self) -> Vec<WorkUnit> {
        self.in_flight
            .values()
            .map(|(unit, _)| unit.clone())
            .chain(self.queue.iter().map(|q| q.unit.clone()))
            .collect()
    }
}

/// Applies a lifecycle transition, logging if it is not a legal one
fn advance(key: &str, from: UnitState, to: UnitState) -> UnitState {
    match from.transition(to) {
        Ok(next) => next,
        Err(e) => {
            warn!("Unit {}: {}", key, e);
            to
        }
    }
}
