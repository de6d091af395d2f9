//! # syssim: trace-driven replay for a discrete-event storage simulator
//!
//! Replays an I/O trace against a storage simulation engine one request
//! at a time and reports response-time statistics.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   records   ┌───────────────┐  request_arrive   ┌──────────┐
//! │ TraceReader  │ ──────────▶ │ ReplayDriver  │ ────────────────▶ │  Engine  │
//! └──────────────┘             │  SimClock     │  internal_event   │ (opaque) │
//!                              │  CallbackSlot │ ◀──────────────── │          │
//!                              │  LatencyStats │  schedule /       └──────────┘
//!                              └───────────────┘  deschedule /
//!                                                 completion
//! ```
//!
//! The engine keeps at most one scheduled callback, so the driver holds a
//! single pending due time rather than an event queue. Time advances only
//! when the driver pumps that callback.
//!
//! ## Quick Start
//!
//! ```ignore
//! use syssim::{DiskEngine, Engine, ReplayDriver, ReplaySettings, TraceReader};
//!
//! let engine = DiskEngine::initialize("disk.toml".as_ref(), "engine.out".as_ref())?;
//! let mut driver = ReplayDriver::new(engine, ReplaySettings::default(), 10_000)?;
//! driver.replay(TraceReader::open("financial.trace")?)?;
//! let report = driver.finish()?;
//! print!("{}", report.stats.report("response time"));
//! ```

#![cfg_attr(test, allow(clippy::float_cmp))]

pub mod config;
mod diagnostics;
pub mod driver;
pub mod engine;
mod error;
pub mod stats;
pub mod time;
pub mod trace;

pub use config::{ReplaySettings, SettingsLoader};
pub use driver::{DriverState, ReplayDriver, ReplayReport, RequestOutcome};
pub use engine::{
    CallbackSlot, Completion, DiskConfig, DiskEngine, Engine, EngineHost, Request, SlotPolicy,
};
pub use error::{ConfigError, EngineError, RecordError, ReplayError, StatsError, TraceError};
pub use stats::{BucketKind, BucketSummary, LatencyBucket, LatencyStats, StatsReport};
pub use time::{SimClock, SimTime};
pub use trace::{Direction, SyntheticWorkload, TraceEnd, TraceReader, TraceRecord};
