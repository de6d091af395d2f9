//! Built-in deterministic disk engine.
//!
//! Serves one request at a time in two phases:
//!
//! 1. **Controller**: fixed overhead, scheduled from `request_arrive`.
//! 2. **Media**: seek proportional to head travel, transfer proportional
//!    to size, plus a fixed penalty for writes. Completion is reported
//!    from the `internal_event` that ends this phase.
//!
//! A phase that costs nothing is skipped, and a request that costs
//! nothing at all completes inside `request_arrive`.
//!
//! Configuration is a TOML file; every key is optional:
//!
//! ```toml
//! devices = 2
//! controller_overhead_ms = 0.1
//! seek_ms_per_1k_blocks = 0.02
//! transfer_ms_per_kib = 0.01
//! write_penalty_ms = 0.05
//! ```

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use super::{Engine, EngineHost, Request};
use crate::error::EngineError;
use crate::time::SimTime;
use crate::trace::Direction;

/// Service-time parameters of [`DiskEngine`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DiskConfig {
    /// Number of devices; valid device ids are `0..devices`.
    pub devices: u32,
    pub controller_overhead_ms: f64,
    /// Seek time per 1000 blocks of head travel.
    pub seek_ms_per_1k_blocks: f64,
    pub transfer_ms_per_kib: f64,
    /// Extra media time for writes.
    pub write_penalty_ms: f64,
}

impl Default for DiskConfig {
    fn default() -> Self {
        Self {
            devices: 1,
            controller_overhead_ms: 0.1,
            seek_ms_per_1k_blocks: 0.02,
            transfer_ms_per_kib: 0.01,
            write_penalty_ms: 0.05,
        }
    }
}

impl DiskConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.devices == 0 {
            return Err(EngineError::InvalidConfig(
                "devices must be at least 1".to_string(),
            ));
        }
        let costs = [
            ("controller_overhead_ms", self.controller_overhead_ms),
            ("seek_ms_per_1k_blocks", self.seek_ms_per_1k_blocks),
            ("transfer_ms_per_kib", self.transfer_ms_per_kib),
            ("write_penalty_ms", self.write_penalty_ms),
        ];
        for (name, value) in costs {
            if !value.is_finite() || value < 0.0 {
                return Err(EngineError::InvalidConfig(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
        }
        Ok(())
    }

    fn media_time(&self, head: u64, request: &Request) -> SimTime {
        let travel = head.abs_diff(request.block_number) as f64;
        let seek = travel / 1000.0 * self.seek_ms_per_1k_blocks;
        let transfer = request.byte_count as f64 / 1024.0 * self.transfer_ms_per_kib;
        let penalty = match request.direction {
            Direction::Write => self.write_penalty_ms,
            Direction::Read => 0.0,
        };
        seek + transfer + penalty
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Controller,
    Media,
}

#[derive(Debug)]
struct InService {
    request: Request,
    phase: Phase,
}

/// Deterministic single-queue disk model.
#[derive(Debug)]
pub struct DiskEngine {
    config: DiskConfig,
    /// Last block served, per device.
    heads: Vec<u64>,
    in_service: Option<InService>,
    output: Option<BufWriter<File>>,
    completed: u64,
    shut_down: bool,
}

impl DiskEngine {
    /// Creates an engine without a raw output file.
    pub fn new(config: DiskConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            heads: vec![0; config.devices as usize],
            config,
            in_service: None,
            output: None,
            completed: 0,
            shut_down: false,
        })
    }

    /// Returns the number of requests completed so far.
    pub fn completed(&self) -> u64 {
        self.completed
    }

    fn ensure_running(&self) -> Result<(), EngineError> {
        if self.shut_down {
            return Err(EngineError::Rejected("engine has been shut down".to_string()));
        }
        Ok(())
    }

    fn complete(
        &mut self,
        now: SimTime,
        request: Request,
        host: &mut dyn EngineHost,
    ) -> Result<(), EngineError> {
        self.heads[request.device_id as usize] = request.block_number;
        self.completed += 1;
        if let Some(out) = self.output.as_mut() {
            writeln!(
                out,
                "complete id={} dev={} block={} bytes={} dir={} start={:.6} finish={:.6}",
                request.id,
                request.device_id,
                request.block_number,
                request.byte_count,
                request.direction.as_str(),
                request.start_time,
                now,
            )?;
        }
        host.report_completion(now, &request);
        Ok(())
    }

    /// Starts the media phase, or completes at once if it costs nothing.
    fn start_media(
        &mut self,
        now: SimTime,
        request: Request,
        host: &mut dyn EngineHost,
    ) -> Result<(), EngineError> {
        let media = self
            .config
            .media_time(self.heads[request.device_id as usize], &request);
        if media <= 0.0 {
            return self.complete(now, request, host);
        }
        debug!(request = request.id, due = now + media, "media phase scheduled");
        host.schedule_callback(now + media);
        self.in_service = Some(InService {
            request,
            phase: Phase::Media,
        });
        Ok(())
    }
}

impl Engine for DiskEngine {
    fn initialize(config_path: &Path, output_path: &Path) -> Result<Self, EngineError> {
        let text = fs::read_to_string(config_path).map_err(|source| EngineError::ConfigRead {
            path: config_path.to_path_buf(),
            source,
        })?;
        let config: DiskConfig =
            toml::from_str(&text).map_err(|source| EngineError::ConfigParse {
                path: config_path.to_path_buf(),
                source,
            })?;

        let mut engine = Self::new(config)?;
        let file = File::create(output_path).map_err(|source| EngineError::Output {
            path: output_path.to_path_buf(),
            source,
        })?;
        engine.output = Some(BufWriter::new(file));

        debug!(config = ?engine.config, "disk engine initialized");
        Ok(engine)
    }

    fn request_arrive(
        &mut self,
        now: SimTime,
        request: Request,
        host: &mut dyn EngineHost,
    ) -> Result<(), EngineError> {
        self.ensure_running()?;
        if request.device_id >= self.config.devices {
            return Err(EngineError::Rejected(format!(
                "request {} targets device {} but only {} configured",
                request.id, request.device_id, self.config.devices
            )));
        }
        if let Some(busy) = &self.in_service {
            return Err(EngineError::Rejected(format!(
                "request {} arrived while request {} is in service",
                request.id, busy.request.id
            )));
        }

        let overhead = self.config.controller_overhead_ms;
        if overhead <= 0.0 {
            return self.start_media(now, request, host);
        }
        host.schedule_callback(now + overhead);
        self.in_service = Some(InService {
            request,
            phase: Phase::Controller,
        });
        Ok(())
    }

    fn internal_event(
        &mut self,
        now: SimTime,
        host: &mut dyn EngineHost,
    ) -> Result<(), EngineError> {
        self.ensure_running()?;
        let Some(InService { request, phase }) = self.in_service.take() else {
            debug!(now, "internal event with nothing in service");
            return Ok(());
        };

        match phase {
            Phase::Controller => self.start_media(now, request, host),
            Phase::Media => self.complete(now, request, host),
        }
    }

    fn shutdown(&mut self, now: SimTime) -> Result<(), EngineError> {
        self.ensure_running()?;
        self.shut_down = true;
        if let Some(mut out) = self.output.take() {
            writeln!(out, "shutdown time={now:.6} completed={}", self.completed)?;
            out.flush()?;
        }
        debug!(now, completed = self.completed, "disk engine shut down");
        Ok(())
    }
}
