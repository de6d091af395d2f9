//! Error types for trace replay.

use std::path::PathBuf;

use thiserror::Error;

use crate::stats::BucketKind;
use crate::time::SimTime;

/// Errors from the statistics accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StatsError {
    /// Mean and deviation are undefined over zero samples.
    #[error("bucket '{bucket}' has no samples")]
    EmptyBucket { bucket: BucketKind },
}

/// Errors opening a trace source.
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("failed to open trace file {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid synthetic workload: {0}")]
    InvalidWorkload(String),
}

/// Why a single trace line could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("missing field '{0}'")]
    MissingField(&'static str),

    #[error("field '{field}' is not a valid number: '{value}'")]
    InvalidField { field: &'static str, value: String },
}

/// Errors raised by a simulation engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to read engine configuration {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse engine configuration {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid engine configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to open engine output {path}: {source}")]
    Output {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("engine I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("engine rejected call: {0}")]
    Rejected(String),
}

/// Errors loading driver settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load settings: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid settings: {0}")]
    Invalid(String),
}

/// Errors from the event-replay driver.
///
/// Every variant except `Io` and `Config` is an engine contract
/// violation: the run cannot continue and its statistics are not
/// trustworthy.
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("internal error: event loop drained without completing request {request}")]
    CompletionMissing { request: u64 },

    #[error("engine reported a completion at {at} with no request outstanding")]
    UnexpectedCompletion { at: SimTime },

    #[error(
        "request {request} completed before it started (start={start}, completion={completion})"
    )]
    NegativeLatency {
        request: u64,
        start: SimTime,
        completion: SimTime,
    },

    #[error("engine scheduled a callback at {requested} while one is pending at {pending}")]
    SlotOverwrite { pending: SimTime, requested: SimTime },

    #[error("engine scheduled a callback at {due}, before the current time {now}")]
    ClockRegression { now: SimTime, due: SimTime },

    #[error("request {request} exceeded {limit} internal events without completing")]
    EventLimit { request: u64, limit: u64 },

    #[error("driver is {actual}, expected {expected}")]
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("diagnostic output error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
