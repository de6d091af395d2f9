//! Auxiliary per-request diagnostic files.
//!
//! Neither file is a stable format; both are line-oriented text meant for
//! eyeballing and grepping.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::time::Duration;

use crate::config::ReplaySettings;
use crate::driver::RequestOutcome;

/// Open handles to the configured diagnostic files.
#[derive(Debug, Default)]
pub(crate) struct Diagnostics {
    timing: Option<BufWriter<File>>,
    requests: Option<BufWriter<File>>,
}

fn create(path: Option<&Path>) -> io::Result<Option<BufWriter<File>>> {
    path.map(|p| File::create(p).map(BufWriter::new)).transpose()
}

impl Diagnostics {
    /// Creates (truncating) every file named in `settings`.
    pub(crate) fn open(settings: &ReplaySettings) -> io::Result<Self> {
        Ok(Self {
            timing: create(settings.timing_log.as_deref())?,
            requests: create(settings.request_log.as_deref())?,
        })
    }

    pub(crate) fn record(&mut self, outcome: &RequestOutcome, wall: Duration) -> io::Result<()> {
        let request = &outcome.request;
        if let Some(out) = self.timing.as_mut() {
            writeln!(
                out,
                "request={} wall_us={} events={}",
                request.id,
                wall.as_micros(),
                outcome.events
            )?;
        }
        if let Some(out) = self.requests.as_mut() {
            writeln!(
                out,
                "request={} dev={} block={} bytes={} dir={} start={:.6} completion={:.6} latency={:.6} recorded={}",
                request.id,
                request.device_id,
                request.block_number,
                request.byte_count,
                request.direction.as_str(),
                request.start_time,
                outcome.completion_time,
                outcome.latency,
                outcome.recorded,
            )?;
        }
        Ok(())
    }

    /// Flushes and closes both files.
    pub(crate) fn close(&mut self) -> io::Result<()> {
        for out in [self.timing.take(), self.requests.take()].into_iter().flatten() {
            out.into_inner().map_err(io::IntoInnerError::into_error)?;
        }
        Ok(())
    }
}
