//! Debounced persistence pipeline.
//!
//! Owns the optimistic delta of the selected item and decides when, and with
//! which amount, a remote `ApplyDelta` write happens.
//!
//! # Accounting
//!
//! For the selected item the pipeline tracks:
//!
//! - `increments`: what the user sees on top of the stored quantity
//! - `confirmed`: written successfully, cleared once the confirmation delay
//!   has passed
//! - the delta of the write in flight, if any
//!
//! The amount a new write sends is `increments - confirmed - in_flight`, so a
//! scan accepted while a write is running is never sent twice and never lost.
//!
//! Deltas left behind by an item switch are queued as [`PendingFlush`]es and
//! written one at a time behind the in-flight write.

use crate::{
    error::Result, Command, Error, Feedback, ItemId, NetworkHealth, Quantity, RequestId,
    RetryPolicy, SessionId, Timestamp, Timing, WriteError,
};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use uuid::Uuid;

/// Check that an identifier is a well-formed UUID.
pub fn validate_identifier(field: &'static str, value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).map_err(|_| Error::InvalidIdentifier {
        field,
        value: value.to_string(),
    })
}

/// A delta for an item that is no longer selected, waiting to be written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingFlush {
    pub item_id: ItemId,
    pub delta: Quantity,
}

/// Who owns the result of a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    /// Part of the selected item's accumulator
    Current,
    /// Flush for a previously selected item
    Detached,
    /// Overwritten by a later absolute quantity; the outcome is irrelevant
    Superseded,
}

#[derive(Debug, Clone)]
struct InFlight {
    request: RequestId,
    flush: PendingFlush,
    attempt: u32,
    /// Set while waiting out a backoff delay
    retry_at: Option<Timestamp>,
    origin: Origin,
}

#[derive(Debug, Clone)]
pub(crate) struct Pipeline {
    session_id: SessionId,
    policy: RetryPolicy,
    debounce_ms: u64,
    confirm_delay_ms: u64,
    health: NetworkHealth,
    next_request: RequestId,

    item_id: Option<ItemId>,
    increments: Quantity,
    /// Last-known-good value of `increments`
    backup: Quantity,
    confirmed: Quantity,
    /// Scans accepted since the in-flight write for this item started
    accepted_in_flight: Quantity,

    debounce_at: Option<Timestamp>,
    reset_at: Option<Timestamp>,
    in_flight: Option<InFlight>,
    outbox: VecDeque<PendingFlush>,
    /// Flushes that failed for good; resubmitted after the next successful
    /// write or an explicit retry.
    parked: Vec<PendingFlush>,
    /// Written amounts no longer shown as increments, for the caller to fold
    /// into its stored quantities
    settled: Vec<PendingFlush>,
}

impl Pipeline {
    pub(crate) fn new(session_id: SessionId, policy: RetryPolicy, timing: &Timing) -> Self {
        Self {
            session_id,
            policy,
            debounce_ms: timing.debounce_ms,
            confirm_delay_ms: timing.confirm_delay_ms,
            health: NetworkHealth::Online,
            next_request: 1,
            item_id: None,
            increments: 0,
            backup: 0,
            confirmed: 0,
            accepted_in_flight: 0,
            debounce_at: None,
            reset_at: None,
            in_flight: None,
            outbox: VecDeque::new(),
            parked: Vec::new(),
            settled: Vec::new(),
        }
    }

    pub(crate) fn allocate_request(&mut self) -> RequestId {
        let request = self.next_request;
        self.next_request += 1;
        request
    }

    pub(crate) fn increments(&self) -> Quantity {
        self.increments
    }

    pub(crate) fn backup(&self) -> Quantity {
        self.backup
    }

    pub(crate) fn health(&self) -> NetworkHealth {
        self.health
    }

    pub(crate) fn set_health(&mut self, health: NetworkHealth) {
        self.health = health;
    }

    pub(crate) fn is_persisting(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Flushes for other items that have not been written yet.
    pub(crate) fn pending_flushes(&self) -> Vec<PendingFlush> {
        let in_flight = self
            .in_flight
            .iter()
            .filter(|f| f.origin == Origin::Detached)
            .map(|f| f.flush.clone());
        in_flight
            .chain(self.outbox.iter().cloned())
            .chain(self.parked.iter().cloned())
            .collect()
    }

    /// Delta of the selected item not covered by a confirmed or running write.
    pub(crate) fn unsent(&self) -> Quantity {
        let in_flight = match &self.in_flight {
            Some(f) if f.origin == Origin::Current => f.flush.delta,
            _ => 0,
        };
        (self.increments - self.confirmed - in_flight).max(0)
    }

    /// Take the amounts confirmed by the backend since the last call.
    pub(crate) fn take_settled(&mut self) -> Vec<PendingFlush> {
        std::mem::take(&mut self.settled)
    }

    pub(crate) fn next_deadline(&self) -> Option<Timestamp> {
        let retry_at = self.in_flight.as_ref().and_then(|f| f.retry_at);
        [self.debounce_at, self.reset_at, retry_at]
            .into_iter()
            .flatten()
            .min()
    }

    /// Switch the accumulator to another item, flushing what the previous one
    /// still owes.
    pub(crate) fn select(&mut self, item_id: ItemId, cmds: &mut Vec<Command>) {
        let unsent = self.unsent();
        if let Some(previous) = self.item_id.take() {
            if self.confirmed > 0 {
                self.settled.push(PendingFlush {
                    item_id: previous.clone(),
                    delta: self.confirmed,
                });
            }
            if unsent > 0 {
                tracing::info!(item_id = %previous, delta = unsent, "flushing delta of previous item");
                self.outbox.push_back(PendingFlush {
                    item_id: previous,
                    delta: unsent,
                });
            }
        }
        if let Some(f) = self.in_flight.as_mut() {
            if f.origin == Origin::Current {
                f.origin = Origin::Detached;
            }
        }

        self.item_id = Some(item_id);
        self.zero();
        self.pump(cmds);
    }

    /// Credit an accepted scan and re-arm the debounce timer.
    pub(crate) fn record_scan(&mut self, qty: Quantity, now: Timestamp) {
        self.increments += qty;
        if matches!(&self.in_flight, Some(f) if f.origin == Origin::Current) {
            self.accepted_in_flight += qty;
        }
        self.debounce_at = Some(now.saturating_add(self.debounce_ms));
    }

    /// Forget everything owed for `item_id`; an absolute quantity replaces it.
    ///
    /// A write for the item that is still on the wire is left to finish with
    /// its outcome ignored. One waiting out a backoff delay is never resent.
    pub(crate) fn set_absolute(&mut self, item_id: &str, cmds: &mut Vec<Command>) {
        let waiting = match self.in_flight.as_mut() {
            Some(f) if f.flush.item_id == item_id && f.retry_at.is_none() => {
                f.origin = Origin::Superseded;
                false
            }
            Some(f) => f.flush.item_id == item_id,
            None => false,
        };
        if waiting {
            tracing::debug!(item_id, "cancelling delta retry");
            self.in_flight = None;
        }
        self.outbox.retain(|p| p.item_id != item_id);
        self.parked.retain(|p| p.item_id != item_id);
        if self.item_id.as_deref() == Some(item_id) {
            self.zero();
        }
        self.pump(cmds);
    }

    /// Resubmit everything still owed.
    pub(crate) fn retry_pending(&mut self, now: Timestamp, cmds: &mut Vec<Command>) {
        self.outbox.extend(self.parked.drain(..));
        self.pump(cmds);
        if self.unsent() > 0 {
            self.on_debounce(now, cmds);
        }
    }

    /// Fire every timer due at `now`, earliest first.
    pub(crate) fn poll(&mut self, now: Timestamp, cmds: &mut Vec<Command>) {
        loop {
            let retry_at = self.in_flight.as_ref().and_then(|f| f.retry_at);
            let due = [
                (retry_at, Timer::Retry),
                (self.debounce_at, Timer::Debounce),
                (self.reset_at, Timer::Reset),
            ]
            .into_iter()
            .filter_map(|(at, timer)| at.filter(|at| *at <= now).map(|at| (at, timer)))
            .min_by_key(|(at, _)| *at);

            match due {
                Some((_, Timer::Retry)) => self.on_retry(cmds),
                Some((_, Timer::Debounce)) => self.on_debounce(now, cmds),
                Some((_, Timer::Reset)) => self.on_reset(),
                None => break,
            }
        }
    }

    /// Feed back the outcome of an `ApplyDelta`. Returns `false` if the
    /// request is not the one in flight.
    pub(crate) fn complete(
        &mut self,
        request: RequestId,
        result: std::result::Result<(), WriteError>,
        now: Timestamp,
        cmds: &mut Vec<Command>,
    ) -> bool {
        let matches = matches!(
            &self.in_flight,
            Some(f) if f.request == request && f.retry_at.is_none()
        );
        if !matches {
            return false;
        }

        match result {
            Ok(()) => self.succeed(now),
            Err(error) => {
                let Some(f) = self.in_flight.as_mut() else {
                    return false;
                };
                if f.origin != Origin::Superseded && self.policy.should_retry(f.attempt, error.kind) {
                    let delay = self.policy.delay_for(f.attempt);
                    tracing::warn!(
                        item_id = %f.flush.item_id,
                        attempt = f.attempt,
                        delay_ms = delay,
                        error = %error,
                        "delta write failed, retrying"
                    );
                    f.retry_at = Some(now.saturating_add(delay));
                    return true;
                }
                self.fail(error, cmds);
            }
        }
        self.pump(cmds);
        true
    }

    /// The caller's stored quantities were reloaded and already include
    /// every confirmed write.
    pub(crate) fn absorb_confirmed(&mut self) {
        self.settled.clear();
        self.drop_confirmed();
    }

    /// Drop all state and cancel every timer. Request ids keep counting so
    /// late completions of the old state are ignored.
    pub(crate) fn clear(&mut self) {
        self.item_id = None;
        self.zero();
        self.in_flight = None;
        self.outbox.clear();
        self.parked.clear();
        self.settled.clear();
    }

    fn zero(&mut self) {
        self.increments = 0;
        self.backup = 0;
        self.confirmed = 0;
        self.accepted_in_flight = 0;
        self.debounce_at = None;
        self.reset_at = None;
    }

    fn on_debounce(&mut self, now: Timestamp, cmds: &mut Vec<Command>) {
        self.debounce_at = None;
        if self.in_flight.is_some() {
            self.debounce_at = Some(now.saturating_add(self.debounce_ms));
            return;
        }

        let unsent = self.unsent();
        let Some(item_id) = self.item_id.clone() else {
            return;
        };
        if unsent <= 0 {
            return;
        }

        if let Err(err) = self.validate(&item_id) {
            tracing::error!(item_id = %item_id, error = %err, "refusing to persist delta");
            self.increments = self.backup;
            cmds.push(Command::Notify(Feedback::data_integrity(&err.to_string())));
            return;
        }

        self.backup = self.increments;
        self.reset_at = None;
        self.accepted_in_flight = 0;
        let request = self.allocate_request();
        self.in_flight = Some(InFlight {
            request,
            flush: PendingFlush {
                item_id,
                delta: unsent,
            },
            attempt: 1,
            retry_at: None,
            origin: Origin::Current,
        });
        self.launch(cmds);
    }

    fn on_retry(&mut self, cmds: &mut Vec<Command>) {
        if let Some(f) = self.in_flight.as_mut() {
            f.retry_at = None;
            f.attempt += 1;
        }
        self.launch(cmds);
        self.pump(cmds);
    }

    fn on_reset(&mut self) {
        tracing::debug!(cleared = self.confirmed, "clearing confirmed delta");
        if let Some(item_id) = self.item_id.clone() {
            if self.confirmed > 0 {
                self.settled.push(PendingFlush {
                    item_id,
                    delta: self.confirmed,
                });
            }
        }
        self.drop_confirmed();
    }

    fn drop_confirmed(&mut self) {
        self.reset_at = None;
        self.increments = (self.increments - self.confirmed).max(0);
        self.backup = (self.backup - self.confirmed).max(0);
        self.confirmed = 0;
    }

    /// Send the in-flight write, or fail it at once when offline.
    fn launch(&mut self, cmds: &mut Vec<Command>) {
        let Some(f) = self.in_flight.as_ref() else {
            return;
        };

        match self.health {
            NetworkHealth::Offline => {
                tracing::warn!(item_id = %f.flush.item_id, "offline, skipping delta write");
                self.fail(WriteError::offline(), cmds);
                return;
            }
            NetworkHealth::Degraded if f.attempt == 1 => {
                cmds.push(Command::Notify(Feedback::slow_connection()));
            }
            _ => {}
        }

        tracing::info!(
            item_id = %f.flush.item_id,
            delta = f.flush.delta,
            attempt = f.attempt,
            "persisting delta"
        );
        cmds.push(Command::ApplyDelta {
            request: f.request,
            attempt: f.attempt,
            session_id: self.session_id.clone(),
            item_id: f.flush.item_id.clone(),
            delta: f.flush.delta,
        });
    }

    /// Start queued flushes until one is in flight or the queue is empty.
    fn pump(&mut self, cmds: &mut Vec<Command>) {
        while self.in_flight.is_none() {
            let Some(flush) = self.outbox.pop_front() else {
                break;
            };
            if let Err(err) = self.validate(&flush.item_id) {
                tracing::error!(item_id = %flush.item_id, error = %err, "dropping queued flush");
                cmds.push(Command::Notify(Feedback::data_integrity(&err.to_string())));
                continue;
            }
            let request = self.allocate_request();
            self.in_flight = Some(InFlight {
                request,
                flush,
                attempt: 1,
                retry_at: None,
                origin: Origin::Detached,
            });
            self.launch(cmds);
        }
    }

    fn succeed(&mut self, now: Timestamp) {
        let Some(f) = self.in_flight.take() else {
            return;
        };
        tracing::info!(item_id = %f.flush.item_id, delta = f.flush.delta, "delta persisted");

        match f.origin {
            Origin::Current => {
                self.confirmed += f.flush.delta;
                self.accepted_in_flight = 0;
                self.reset_at = Some(now.saturating_add(self.confirm_delay_ms));
            }
            Origin::Detached => self.settled.push(f.flush),
            Origin::Superseded => {}
        }
        if !self.parked.is_empty() {
            self.outbox.extend(self.parked.drain(..));
        }
    }

    fn fail(&mut self, error: WriteError, cmds: &mut Vec<Command>) {
        let Some(f) = self.in_flight.take() else {
            return;
        };

        match f.origin {
            Origin::Current => {
                self.increments = self.backup + self.accepted_in_flight;
                self.accepted_in_flight = 0;
                tracing::warn!(
                    item_id = %f.flush.item_id,
                    kept = self.increments,
                    error = %error,
                    "delta write failed, rolled back to backup"
                );
                cmds.push(Command::Notify(Feedback::persist_failed(
                    &error,
                    self.unsent(),
                )));
            }
            Origin::Detached => {
                tracing::warn!(
                    item_id = %f.flush.item_id,
                    delta = f.flush.delta,
                    error = %error,
                    "flush of previous item failed, parking it"
                );
                cmds.push(Command::Notify(Feedback::persist_failed(
                    &error,
                    f.flush.delta,
                )));
                self.parked.push(f.flush);
            }
            Origin::Superseded => {
                tracing::debug!(item_id = %f.flush.item_id, "superseded delta write failed");
            }
        }
    }

    fn validate(&self, item_id: &str) -> Result<()> {
        validate_identifier("session", &self.session_id)?;
        validate_identifier("item", item_id)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum Timer {
    Retry,
    Debounce,
    Reset,
}
