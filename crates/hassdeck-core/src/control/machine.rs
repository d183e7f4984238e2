// ── Optimistic commit state machine ──
//
// Sans-IO: every operation takes the current instant and returns the
// effects the owner must carry out. Timers are plain deadlines stored on
// the pending commit; the owner asks `next_deadline()` when to call
// `poll_timers()` again. Dropping the pending commit is therefore the
// whole of timer cancellation.

use std::marker::PhantomData;

use strum::Display;
use tokio::time::Instant;
use tracing::{debug, trace};

use super::attribute::ControlledAttribute;
use crate::config::ControlTiming;
use crate::model::Device;

/// Where a control is in its gesture → commit → confirm cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Phase {
    /// Display mirrors the hub.
    Idle,
    /// The user is mid-gesture; hub updates are held off.
    Dragging,
    /// A value was sent and the control is waiting to see it reflected.
    AwaitingConfirm,
}

/// The commit currently awaiting confirmation.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingCommit<V> {
    /// Identity of this commit. Retries only fire for the live generation.
    pub generation: u64,
    pub committed: V,
    /// Hub value at commit time; the display returns here on timeout.
    pub rollback_to: V,
    pub retries_remaining: u8,
    pub deadline: Instant,
    pub next_retry_at: Instant,
}

/// Side effects requested by the machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect<V> {
    /// Send this value to the hub (first send or a retry).
    Dispatch(V),
    /// The hub caught up; the display now shows this authoritative value.
    Confirmed(V),
    /// The deadline passed unconfirmed; the display reverted to this value.
    RolledBack(V),
}

/// One interactive control for one attribute of one device.
#[derive(Debug)]
pub struct OptimisticControl<A: ControlledAttribute> {
    timing: ControlTiming,
    phase: Phase,
    displayed: A::Value,
    authoritative: A::Value,
    pending: Option<PendingCommit<A::Value>>,
    generation: u64,
    _attribute: PhantomData<A>,
}

impl<A: ControlledAttribute> OptimisticControl<A> {
    pub fn new(authoritative: A::Value, timing: ControlTiming) -> Self {
        Self {
            timing,
            phase: Phase::Idle,
            displayed: authoritative.clone(),
            authoritative,
            pending: None,
            generation: 0,
            _attribute: PhantomData,
        }
    }

    /// Start from the device's current value for this attribute.
    pub fn for_device(device: &Device, timing: ControlTiming) -> Self {
        Self::new(A::read(device), timing)
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The value the UI should show right now.
    pub fn displayed(&self) -> &A::Value {
        &self.displayed
    }

    /// The last value reported by the hub.
    pub fn authoritative(&self) -> &A::Value {
        &self.authoritative
    }

    pub fn pending(&self) -> Option<&PendingCommit<A::Value>> {
        self.pending.as_ref()
    }

    /// Generation of the most recent commit; 0 before the first.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    // ── Gestures ─────────────────────────────────────────────────────

    /// A new gesture always wins: any pending commit and its timers are dropped.
    pub fn on_interaction_start(&mut self) {
        if let Some(stale) = self.pending.take() {
            debug!(
                attribute = A::NAME,
                generation = stale.generation,
                "pending commit superseded by new gesture"
            );
        }
        self.phase = Phase::Dragging;
    }

    /// Live feedback while dragging. Ignored in any other phase.
    pub fn on_interaction_update(&mut self, value: A::Value) {
        if self.phase == Phase::Dragging {
            self.displayed = value;
        }
    }

    /// The gesture ended without a commit (e.g. pointer left the control).
    pub fn on_interaction_cancel(&mut self) {
        if self.phase == Phase::Dragging {
            self.phase = Phase::Idle;
            self.displayed = self.authoritative.clone();
        }
    }

    /// Send `value` and wait for the hub to reflect it.
    ///
    /// Replaces any pending commit. The deadline is fixed here and is not
    /// extended by retries.
    pub fn commit(&mut self, value: A::Value, now: Instant) -> Effect<A::Value> {
        self.generation += 1;
        self.pending = Some(PendingCommit {
            generation: self.generation,
            committed: value.clone(),
            rollback_to: self.authoritative.clone(),
            retries_remaining: self.timing.max_retries,
            deadline: now + self.timing.deadline,
            next_retry_at: now + self.timing.retry_interval,
        });
        self.phase = Phase::AwaitingConfirm;
        self.displayed = value.clone();

        debug!(
            attribute = A::NAME,
            generation = self.generation,
            value = ?value,
            "commit"
        );
        Effect::Dispatch(value)
    }

    /// Commit only if `value` differs from what is displayed.
    pub fn select(&mut self, value: A::Value, now: Instant) -> Option<Effect<A::Value>> {
        if value == self.displayed {
            return None;
        }
        Some(self.commit(value, now))
    }

    /// Power/open-close toggle, modelled as a commit of a derived value.
    ///
    /// `None` when the attribute has no known target for this toggle; the
    /// owner sends a plain power command instead.
    pub fn toggle(&mut self, device: &Device, now: Instant) -> Option<Effect<A::Value>> {
        A::toggle_target(device).map(|target| self.commit(target, now))
    }

    /// Step by `delta` (e.g. a `+`/`-` button), committing only on change.
    pub fn step(&mut self, delta: f64, device: &Device, now: Instant) -> Option<Effect<A::Value>> {
        let target = A::step_target(&self.displayed, delta, device)?;
        self.select(target, now)
    }

    // ── Hub updates ──────────────────────────────────────────────────

    /// Feed the latest hub value for this attribute.
    pub fn reconcile(&mut self, value: A::Value) -> Option<Effect<A::Value>> {
        self.authoritative = value.clone();

        match self.phase {
            Phase::Dragging => None,
            Phase::Idle => {
                self.displayed = value;
                None
            }
            Phase::AwaitingConfirm => {
                let confirmed = self
                    .pending
                    .as_ref()
                    .is_some_and(|p| A::within_tolerance(&p.committed, &value));
                if !confirmed {
                    trace!(attribute = A::NAME, value = ?value, "holding optimistic value");
                    return None;
                }

                self.pending = None;
                self.phase = Phase::Idle;
                self.displayed = value.clone();
                debug!(attribute = A::NAME, value = ?value, "commit confirmed");
                Some(Effect::Confirmed(value))
            }
        }
    }

    // ── Timers ───────────────────────────────────────────────────────

    /// When the owner should next call [`poll_timers`](Self::poll_timers).
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|p| {
            if p.retries_remaining > 0 {
                p.next_retry_at.min(p.deadline)
            } else {
                p.deadline
            }
        })
    }

    /// Fire at most one due timer. Call repeatedly until it returns `None`.
    pub fn poll_timers(&mut self, now: Instant) -> Option<Effect<A::Value>> {
        let pending = self.pending.as_mut()?;

        if now >= pending.deadline {
            let generation = pending.generation;
            let rollback_to = pending.rollback_to.clone();
            self.pending = None;
            self.phase = Phase::Idle;
            self.displayed = rollback_to;
            debug!(
                attribute = A::NAME,
                generation,
                value = ?self.displayed,
                "commit timed out, rolled back"
            );
            return Some(Effect::RolledBack(self.displayed.clone()));
        }

        if pending.retries_remaining > 0 && now >= pending.next_retry_at {
            pending.retries_remaining -= 1;
            pending.next_retry_at += self.timing.retry_interval;
            trace!(
                attribute = A::NAME,
                generation = pending.generation,
                remaining = pending.retries_remaining,
                "retrying commit"
            );
            return Some(Effect::Dispatch(pending.committed.clone()));
        }

        None
    }
}
