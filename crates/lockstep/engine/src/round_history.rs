//! Round history: the ordered record of applied transitions
//!
//! Every transition a replica applies is recorded, and the same fact is
//! published to subscribers as a [`RoundChange`]. Two replicas fed the
//! same events produce identical histories, modulo timestamps.

use chrono::{DateTime, Utc};
use lockstep_types::{Event, Round};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// One applied transition
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundRecord {
    /// Position among all transitions of the replica, starting at zero
    pub step: u64,
    pub from: Round,
    pub event: Event,
    pub to: Round,
    /// Period the transition was applied in
    pub period: u64,
    /// Whether the event was injected by the timeout supervisor
    pub timed_out: bool,
    pub timestamp: DateTime<Utc>,
}

impl RoundRecord {
    pub fn is_self_loop(&self) -> bool {
        self.from == self.to
    }
}

impl std::fmt::Display for RoundRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "#{} [period {}] {} --{}--> {}",
            self.step, self.period, self.from, self.event, self.to
        )?;
        if self.timed_out {
            write!(f, " (timeout)")?;
        }
        Ok(())
    }
}

/// Round-changed notification for external monitoring
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundChange {
    pub record: RoundRecord,
    /// Set on the transition that first exceeds the round's retry cap
    pub retry_limit_exceeded: bool,
    /// Consecutive self-loops of the destination round so far
    pub consecutive_retries: u32,
}

/// Records kept by a history unless configured otherwise
pub const DEFAULT_HISTORY_CAPACITY: usize = 10_000;

/// Ordered history of a replica.
///
/// Keeps at most `capacity` of the most recent records; older ones are
/// dropped as new ones arrive. Step numbers keep counting across drops.
#[derive(Clone, Debug)]
pub struct RoundHistory {
    records: VecDeque<RoundRecord>,
    capacity: usize,
    total: u64,
}

impl Default for RoundHistory {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }
}

impl RoundHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// A history retaining at most `capacity` records (at least one)
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity.min(DEFAULT_HISTORY_CAPACITY)),
            capacity,
            total: 0,
        }
    }

    /// Append a transition and return the stored record
    pub fn record(
        &mut self,
        from: Round,
        event: Event,
        to: Round,
        period: u64,
        timed_out: bool,
    ) -> &RoundRecord {
        let record = RoundRecord {
            step: self.total,
            from,
            event,
            to,
            period,
            timed_out,
            timestamp: Utc::now(),
        };
        tracing::trace!(step = record.step, %from, %event, %to, "Round recorded");
        self.total += 1;

        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
        &self.records[self.records.len() - 1]
    }

    /// Retained records, oldest first
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &RoundRecord> + ExactSizeIterator {
        self.records.iter()
    }

    /// The retained record with step number `step`
    pub fn get(&self, step: u64) -> Option<&RoundRecord> {
        let first = self.records.front()?.step;
        let offset = usize::try_from(step.checked_sub(first)?).ok()?;
        self.records.get(offset)
    }

    /// Records currently retained
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Transitions recorded over the history's lifetime, dropped ones
    /// included
    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn last(&self) -> Option<&RoundRecord> {
        self.records.back()
    }

    /// Retained records of one period
    pub fn for_period(&self, period: u64) -> Vec<&RoundRecord> {
        self.records.iter().filter(|r| r.period == period).collect()
    }

    /// The retained `(from, event, to)` path, without timing
    pub fn path(&self) -> Vec<(Round, Event, Round)> {
        self.records
            .iter()
            .map(|r| (r.from, r.event, r.to))
            .collect()
    }

    /// Retained transitions caused by injected timeouts
    pub fn timeout_count(&self) -> usize {
        self.records.iter().filter(|r| r.timed_out).count()
    }
}
