//! Engine adapter: the contract between the replay driver and a
//! discrete-event storage engine.
//!
//! The engine is a black box driven through four calls
//! ([`Engine::initialize`], [`Engine::request_arrive`],
//! [`Engine::internal_event`], [`Engine::shutdown`]). It talks back
//! through an [`EngineHost`] passed into every call that may produce
//! callbacks:
//!
//! ```text
//!   driver ──request_arrive / internal_event──▶ engine
//!     ▲                                          │
//!     └── schedule / deschedule / completion ◀───┘  (via EngineHost)
//! ```
//!
//! # Single-slot contract
//!
//! The engine holds at most one scheduled callback at a time, so the host
//! keeps a single "next due time" instead of a queue. [`CallbackSlot`] is
//! the driver's host implementation; under [`SlotPolicy::Strict`] it
//! records a violation when a second callback is scheduled over a pending
//! one instead of silently dropping the earlier time.

pub mod disk;

pub use disk::{DiskConfig, DiskEngine};

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{EngineError, ReplayError};
use crate::time::SimTime;
use crate::trace::Direction;

// ============================================================================
// Requests
// ============================================================================

/// One I/O operation submitted to the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// 1-based submission sequence number.
    pub id: u64,
    /// Simulation time at submission.
    pub start_time: SimTime,
    pub direction: Direction,
    pub device_id: u32,
    pub block_number: u64,
    pub byte_count: u64,
}

// ============================================================================
// Engine Contract
// ============================================================================

/// Callbacks an engine uses to talk back to its driver.
pub trait EngineHost {
    /// Asks for [`Engine::internal_event`] to be called at `due`.
    fn schedule_callback(&mut self, due: SimTime);

    /// Cancels the outstanding scheduled callback at `now`.
    fn deschedule_callback(&mut self, now: SimTime);

    /// Reports that `request` finished at `completion_time`.
    fn report_completion(&mut self, completion_time: SimTime, request: &Request);
}

/// A discrete-event storage engine.
pub trait Engine {
    /// Loads the engine configuration and opens its raw output file.
    fn initialize(config_path: &Path, output_path: &Path) -> Result<Self, EngineError>
    where
        Self: Sized;

    /// Submits a request. May schedule callbacks or complete the request
    /// synchronously through `host`.
    fn request_arrive(
        &mut self,
        now: SimTime,
        request: Request,
        host: &mut dyn EngineHost,
    ) -> Result<(), EngineError>;

    /// Advances engine-internal state to `now`.
    fn internal_event(&mut self, now: SimTime, host: &mut dyn EngineHost)
    -> Result<(), EngineError>;

    /// Terminal call. No other call is valid afterwards.
    fn shutdown(&mut self, now: SimTime) -> Result<(), EngineError>;
}

// ============================================================================
// Callback Slot
// ============================================================================

/// What to do when a callback is scheduled over a pending one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotPolicy {
    /// Record a [`ReplayError::SlotOverwrite`] violation.
    #[default]
    Strict,
    /// Replace the pending due time with the new one.
    Supersede,
}

/// A completion observed by the host.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub time: SimTime,
    pub request: Request,
}

/// The driver's [`EngineHost`]: one pending-event slot plus the
/// completion flag for the single outstanding request.
///
/// Callbacks cannot fail, so contract violations are stored and picked
/// up by the driver with [`CallbackSlot::take_violation`] after each
/// engine call returns. Only the first violation is kept.
#[derive(Debug, Default)]
pub struct CallbackSlot {
    policy: SlotPolicy,
    next_due: Option<SimTime>,
    outstanding: bool,
    completion: Option<Completion>,
    violation: Option<ReplayError>,
}

impl CallbackSlot {
    pub fn new(policy: SlotPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    /// Marks a new request outstanding and clears the completion flag.
    pub fn arm(&mut self) {
        self.outstanding = true;
        self.completion = None;
    }

    /// Returns the pending due time, if any.
    pub fn next_due(&self) -> Option<SimTime> {
        self.next_due
    }

    /// Empties the slot, returning the due time it held.
    pub fn take_due(&mut self) -> Option<SimTime> {
        self.next_due.take()
    }

    /// Returns true once the outstanding request has completed.
    pub fn is_completed(&self) -> bool {
        self.completion.is_some()
    }

    /// Takes the completion and ends the outstanding period.
    pub fn take_completion(&mut self) -> Option<Completion> {
        self.outstanding = false;
        self.completion.take()
    }

    /// Takes the first contract violation seen since the last call.
    pub fn take_violation(&mut self) -> Option<ReplayError> {
        self.violation.take()
    }

    fn violate(&mut self, error: ReplayError) {
        if self.violation.is_none() {
            self.violation = Some(error);
        }
    }
}

impl EngineHost for CallbackSlot {
    fn schedule_callback(&mut self, due: SimTime) {
        trace!(due, "schedule callback");
        match (self.next_due, self.policy) {
            (Some(pending), SlotPolicy::Strict) => self.violate(ReplayError::SlotOverwrite {
                pending,
                requested: due,
            }),
            _ => self.next_due = Some(due),
        }
    }

    fn deschedule_callback(&mut self, now: SimTime) {
        trace!(now, pending = ?self.next_due, "deschedule callback");
        self.next_due = None;
    }

    fn report_completion(&mut self, completion_time: SimTime, request: &Request) {
        trace!(request = request.id, completion_time, "completion");
        if !self.outstanding || self.completion.is_some() {
            self.violate(ReplayError::UnexpectedCompletion {
                at: completion_time,
            });
            return;
        }
        self.completion = Some(Completion {
            time: completion_time,
            request: request.clone(),
        });
    }
}
