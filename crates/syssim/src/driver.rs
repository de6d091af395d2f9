//! Event-replay driver.
//!
//! Turns a sequence of trace records into engine calls, one request at a
//! time, and accumulates latency statistics.
//!
//! ## Lifecycle
//!
//! ```text
//!   Idle ──submit──▶ AwaitingCompletion ──(pump, completion)──▶ Idle
//!    │
//!    └── trace exhausted ──▶ Drained ──finish──▶ ShuttingDown
//! ```
//!
//! For each record the driver clears the completion flag, submits a
//! request stamped with the current time, then pumps the engine: while a
//! callback is pending it advances the clock to the due time, empties the
//! slot and calls `internal_event`. When nothing is pending the request
//! must have completed; otherwise the engine broke its contract and
//! [`ReplayError::CompletionMissing`] is returned.
//!
//! The pump loop is the only place simulation time advances.
//!
//! ## Warm-up
//!
//! Completions are numbered from 1. Only completions numbered above
//! `floor(warmup_fraction × max_requests)` are recorded, so early
//! requests that fill caches do not skew steady-state latency.

use std::time::Instant;

use tracing::{debug, info};

use crate::config::ReplaySettings;
use crate::diagnostics::Diagnostics;
use crate::engine::{CallbackSlot, Engine, Request};
use crate::error::ReplayError;
use crate::stats::LatencyStats;
use crate::time::{SimClock, SimTime};
use crate::trace::TraceRecord;

// ============================================================================
// State
// ============================================================================

/// Where the driver is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    /// Ready to submit the next request.
    Idle,
    /// A request is outstanding. A driver left here by an error is
    /// unusable.
    AwaitingCompletion,
    /// The trace is exhausted.
    Drained,
    /// The engine has been shut down.
    ShuttingDown,
}

impl DriverState {
    pub fn as_str(self) -> &'static str {
        match self {
            DriverState::Idle => "idle",
            DriverState::AwaitingCompletion => "awaiting completion",
            DriverState::Drained => "drained",
            DriverState::ShuttingDown => "shutting down",
        }
    }
}

/// Result of one submit-pump-complete cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestOutcome {
    /// The request as echoed back by the engine's completion.
    pub request: Request,
    pub completion_time: SimTime,
    pub latency: SimTime,
    /// Whether the latency went into the statistics.
    pub recorded: bool,
    /// Internal events pumped for this request.
    pub events: u64,
}

/// Final result of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayReport {
    pub stats: LatencyStats,
    /// Requests submitted and completed.
    pub requests: u64,
    /// Requests whose latency was recorded.
    pub recorded: u64,
    /// Simulation time at shutdown.
    pub final_time: SimTime,
}

// ============================================================================
// Driver
// ============================================================================

/// Drives an [`Engine`] from trace records, strictly one request at a
/// time.
pub struct ReplayDriver<E: Engine> {
    engine: E,
    settings: ReplaySettings,
    warmup_threshold: u64,
    clock: SimClock,
    slot: CallbackSlot,
    stats: LatencyStats,
    /// Requests submitted, used as request ids.
    submitted: u64,
    /// Completions observed; compared against the warm-up threshold.
    completed: u64,
    recorded: u64,
    state: DriverState,
    diagnostics: Diagnostics,
}

impl<E: Engine> ReplayDriver<E> {
    /// Creates a driver around an initialized engine.
    ///
    /// `max_requests` is the expected trace length; it only sets the
    /// warm-up threshold. Diagnostic files named in `settings` are
    /// created here.
    pub fn new(
        engine: E,
        settings: ReplaySettings,
        max_requests: u64,
    ) -> Result<Self, ReplayError> {
        settings.validate()?;
        let diagnostics = Diagnostics::open(&settings)?;

        Ok(Self {
            engine,
            warmup_threshold: settings.warmup_threshold(max_requests),
            slot: CallbackSlot::new(settings.slot_policy),
            settings,
            clock: SimClock::new(),
            stats: LatencyStats::new(),
            submitted: 0,
            completed: 0,
            recorded: 0,
            state: DriverState::Idle,
            diagnostics,
        })
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    /// Current simulation time.
    pub fn now(&self) -> SimTime {
        self.clock.now()
    }

    pub fn stats(&self) -> &LatencyStats {
        &self.stats
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Number of completions observed so far.
    pub fn completed(&self) -> u64 {
        self.completed
    }

    /// Completions at or below this number are not recorded.
    pub fn warmup_threshold(&self) -> u64 {
        self.warmup_threshold
    }

    fn expect_state(&self, expected: DriverState) -> Result<(), ReplayError> {
        if self.state != expected {
            return Err(ReplayError::InvalidState {
                expected: expected.as_str(),
                actual: self.state.as_str(),
            });
        }
        Ok(())
    }

    fn check_violation(&mut self) -> Result<(), ReplayError> {
        match self.slot.take_violation() {
            Some(violation) => Err(violation),
            None => Ok(()),
        }
    }

    /// Submits one record and runs the engine until it completes.
    pub fn submit(&mut self, record: &TraceRecord) -> Result<RequestOutcome, ReplayError> {
        self.expect_state(DriverState::Idle)?;

        self.submitted += 1;
        let request = Request {
            id: self.submitted,
            start_time: self.clock.now(),
            direction: record.direction,
            device_id: record.device_id,
            block_number: record.block_number,
            byte_count: record.byte_count(self.settings.sector_size),
        };
        let id = request.id;

        self.slot.arm();
        self.state = DriverState::AwaitingCompletion;
        let wall = Instant::now();

        self.engine
            .request_arrive(self.clock.now(), request, &mut self.slot)?;
        self.check_violation()?;
        let events = self.pump(id)?;

        let completion = self
            .slot
            .take_completion()
            .ok_or(ReplayError::CompletionMissing { request: id })?;

        let start = completion.request.start_time;
        let latency = completion.time - start;
        if latency.is_nan() || latency < 0.0 {
            return Err(ReplayError::NegativeLatency {
                request: id,
                start,
                completion: completion.time,
            });
        }
        self.state = DriverState::Idle;
        self.completed += 1;

        let recorded = self.completed > self.warmup_threshold;
        if recorded {
            let pages = completion.request.byte_count / self.settings.page_size;
            self.stats
                .record_request(completion.request.direction, pages, latency);
            self.recorded += 1;
        }

        let outcome = RequestOutcome {
            request: completion.request,
            completion_time: completion.time,
            latency,
            recorded,
            events,
        };
        self.diagnostics.record(&outcome, wall.elapsed())?;
        debug!(
            request = id,
            latency,
            events,
            recorded,
            "request completed"
        );
        Ok(outcome)
    }

    /// Runs pending internal events until the engine stops scheduling.
    fn pump(&mut self, request: u64) -> Result<u64, ReplayError> {
        let mut events = 0;
        while let Some(due) = self.slot.take_due() {
            if let Some(limit) = self.settings.max_events_per_request {
                if events >= limit {
                    return Err(ReplayError::EventLimit { request, limit });
                }
            }
            self.clock.advance_to(due)?;
            events += 1;
            debug!(request, now = due, "internal event");

            self.engine.internal_event(due, &mut self.slot)?;
            self.check_violation()?;
        }
        Ok(events)
    }

    /// Submits every record in order, then marks the driver drained.
    ///
    /// Returns the number of records submitted by this call.
    pub fn replay<I>(&mut self, records: I) -> Result<u64, ReplayError>
    where
        I: IntoIterator<Item = TraceRecord>,
    {
        let mut count = 0;
        for record in records {
            self.submit(&record)?;
            count += 1;
        }
        self.state = DriverState::Drained;
        info!(
            requests = self.submitted,
            recorded = self.recorded,
            now = self.clock.now(),
            "trace drained"
        );
        Ok(count)
    }

    /// Shuts the engine down and returns the accumulated statistics.
    ///
    /// Allowed from `Idle` or `Drained`.
    pub fn finish(mut self) -> Result<ReplayReport, ReplayError> {
        if self.state == DriverState::Idle {
            self.state = DriverState::Drained;
        }
        self.expect_state(DriverState::Drained)?;
        self.state = DriverState::ShuttingDown;

        self.engine.shutdown(self.clock.now())?;
        self.diagnostics.close()?;
        info!(now = self.clock.now(), "engine shut down");

        Ok(ReplayReport {
            stats: self.stats,
            requests: self.completed,
            recorded: self.recorded,
            final_time: self.clock.now(),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
