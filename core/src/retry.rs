//! Acknowledgement tracking and bounded retransmission
//!
//! Every tracked envelope gets one [`PendingAck`] keyed by its sequence id.
//! Tracking a second envelope under the same id replaces the first, so the
//! map never holds two entries for one id.
//!
//! A retry pass ([`RetryManager::poll`]) resends every entry whose last
//! transmission is at least one retry interval old. After `max_retries`
//! retransmissions the next due pass drops the entry and reports a
//! [`DeliveryFailure`] instead.
//!
//! The manager never reads the clock itself; callers pass `now` in. This
//! keeps it usable from tests without a time driver.

use embassy_time::{Duration, Instant};
use heapless::{FnvIndexMap, Vec};

use crate::envelope::{sequence_id_from, Envelope, SequenceId};
use crate::error::RelayError;

/// Maximum number of envelopes awaiting acknowledgement (power of two)
pub const MAX_PENDING: usize = 16;

/// Bookkeeping for one envelope awaiting acknowledgement
#[derive(Debug, Clone)]
pub struct PendingAck {
    pub envelope: Envelope,
    pub first_sent_at: Instant,
    pub last_sent_at: Instant,
    pub retry_count: u8,
}

/// Retry budget exhausted for one sequence id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryFailure {
    pub sequence_id: SequenceId,
    pub retries: u8,
}

/// Work produced by a retry pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryAction {
    /// Transmit this envelope again
    Resend(Envelope),
    /// Entry dropped, report upward
    Expired(DeliveryFailure),
}

/// Tracks envelopes awaiting acknowledgement
pub struct RetryManager {
    pending: FnvIndexMap<SequenceId, PendingAck, MAX_PENDING>,
    interval: Duration,
    max_retries: u8,
}

impl RetryManager {
    pub fn new(interval: Duration, max_retries: u8) -> Self {
        Self {
            pending: FnvIndexMap::new(),
            interval,
            max_retries,
        }
    }

    /// Start tracking an envelope that was just transmitted
    ///
    /// Replaces any entry under the same sequence id.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::RetryQueueFull` if the id is new and
    /// `MAX_PENDING` entries are already tracked.
    pub fn track(&mut self, envelope: Envelope, now: Instant) -> Result<(), RelayError> {
        let (sequence_id, _) = envelope.clone().into_parts();
        let entry = PendingAck {
            envelope,
            first_sent_at: now,
            last_sent_at: now,
            retry_count: 0,
        };
        self.pending
            .insert(sequence_id, entry)
            .map(|_| ())
            .map_err(|_| RelayError::RetryQueueFull)
    }

    /// Drop the entry for an acknowledged sequence id
    ///
    /// Returns `false` when nothing was pending under that id.
    pub fn acknowledge(&mut self, sequence_id: &str) -> bool {
        match sequence_id_from(sequence_id) {
            Ok(key) => self.pending.remove(&key).is_some(),
            Err(_) => false,
        }
    }

    pub fn get(&self, sequence_id: &str) -> Option<&PendingAck> {
        let key = sequence_id_from(sequence_id).ok()?;
        self.pending.get(&key)
    }

    pub fn contains(&self, sequence_id: &str) -> bool {
        self.get(sequence_id).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Sequence ids currently awaiting acknowledgement
    pub fn pending_ids(&self) -> impl Iterator<Item = &str> {
        self.pending.keys().map(|id| id.as_str())
    }

    /// Earliest instant at which a retry pass has work to do
    pub fn next_due(&self) -> Option<Instant> {
        self.pending
            .values()
            .map(|entry| entry.last_sent_at + self.interval)
            .min()
    }

    /// Run one retry pass
    ///
    /// Entries that are due and still within budget are returned as
    /// [`RetryAction::Resend`] with their counters advanced. Entries that are
    /// due with the budget spent are removed and returned as
    /// [`RetryAction::Expired`].
    pub fn poll(&mut self, now: Instant) -> Vec<RetryAction, MAX_PENDING> {
        let mut actions = Vec::new();
        let mut expired: Vec<SequenceId, MAX_PENDING> = Vec::new();

        for (id, entry) in self.pending.iter_mut() {
            if now < entry.last_sent_at + self.interval {
                continue;
            }
            if entry.retry_count >= self.max_retries {
                // Both vectors hold at most MAX_PENDING items, one per entry
                let _ = expired.push(id.clone());
                continue;
            }
            entry.retry_count += 1;
            entry.last_sent_at = now;
            let _ = actions.push(RetryAction::Resend(entry.envelope.clone()));
        }

        for id in expired {
            if let Some(entry) = self.pending.remove(&id) {
                let _ = actions.push(RetryAction::Expired(DeliveryFailure {
                    sequence_id: id,
                    retries: entry.retry_count,
                }));
            }
        }

        actions
    }
}
