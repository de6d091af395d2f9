//! I/O trace sources.
//!
//! A trace is a text file with one request per line and five
//! whitespace-separated fields:
//!
//! ```text
//! time_offset  device_id  block_number  size_in_sectors  direction
//! 0.0          0          100           8                0
//! ```
//!
//! `direction` is `0` for a write; any other value is a read. Columns past
//! the fifth are ignored and blank lines are skipped.
//!
//! [`TraceReader`] yields records lazily and stops at end of input or at
//! the first line it cannot parse. Both stop the stream the same way;
//! [`TraceReader::end`] tells them apart afterwards.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing::warn;

use crate::error::{RecordError, TraceError};

// ============================================================================
// Records
// ============================================================================

/// Transfer direction of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Write,
    Read,
}

impl Direction {
    /// Decodes the trace flag: `0` is a write, anything else a read.
    pub fn from_flag(flag: i64) -> Self {
        if flag == 0 {
            Direction::Write
        } else {
            Direction::Read
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Write => "write",
            Direction::Read => "read",
        }
    }
}

/// One request descriptor from a trace.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraceRecord {
    /// Arrival offset recorded in the trace. Requests are replayed
    /// back to back, so this is informational only.
    pub time_offset: f64,
    pub device_id: u32,
    pub block_number: u64,
    pub size_in_sectors: u64,
    pub direction: Direction,
}

impl TraceRecord {
    /// Bytes transferred by this request for the given sector size.
    pub fn byte_count(&self, sector_size: u64) -> u64 {
        self.size_in_sectors.saturating_mul(sector_size)
    }
}

impl FromStr for TraceRecord {
    type Err = RecordError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut fields = line.split_whitespace();

        let time_offset = next_field(&mut fields, "time_offset")?;
        let device_id = next_field(&mut fields, "device_id")?;
        let block_number = next_field(&mut fields, "block_number")?;
        let size_in_sectors = next_field(&mut fields, "size_in_sectors")?;
        let flag: i64 = next_field(&mut fields, "direction")?;

        Ok(Self {
            time_offset,
            device_id,
            block_number,
            size_in_sectors,
            direction: Direction::from_flag(flag),
        })
    }
}

fn next_field<'a, T: FromStr>(
    fields: &mut impl Iterator<Item = &'a str>,
    name: &'static str,
) -> Result<T, RecordError> {
    let raw = fields.next().ok_or(RecordError::MissingField(name))?;
    raw.parse().map_err(|_| RecordError::InvalidField {
        field: name,
        value: raw.to_string(),
    })
}

// ============================================================================
// Trace Reader
// ============================================================================

/// Why a trace stream stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEnd {
    /// Reached end of input.
    EndOfInput,
    /// A line could not be parsed; nothing after it is read.
    Malformed { line: u64, error: RecordError },
    /// The underlying reader failed.
    ReadFailed { line: u64, message: String },
}

/// Lazy, single-pass reader of trace records.
#[derive(Debug)]
pub struct TraceReader<R> {
    reader: R,
    buf: String,
    /// Number of lines consumed so far.
    line: u64,
    records: u64,
    end: Option<TraceEnd>,
}

impl TraceReader<BufReader<File>> {
    /// Opens a trace file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TraceError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| TraceError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> TraceReader<R> {
    /// Wraps a buffered reader.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: String::new(),
            line: 0,
            records: 0,
            end: None,
        }
    }

    /// Returns why the stream stopped, once it has.
    pub fn end(&self) -> Option<&TraceEnd> {
        self.end.as_ref()
    }

    /// Returns the number of records yielded so far.
    pub fn records_read(&self) -> u64 {
        self.records
    }

    fn finish(&mut self, end: TraceEnd) -> Option<TraceRecord> {
        self.end = Some(end);
        None
    }
}

impl<R: BufRead> Iterator for TraceReader<R> {
    type Item = TraceRecord;

    fn next(&mut self) -> Option<TraceRecord> {
        if self.end.is_some() {
            return None;
        }

        loop {
            self.buf.clear();
            match self.reader.read_line(&mut self.buf) {
                Ok(0) => return self.finish(TraceEnd::EndOfInput),
                Ok(_) => self.line += 1,
                Err(e) => {
                    warn!(line = self.line + 1, error = %e, "trace read failed, stopping");
                    return self.finish(TraceEnd::ReadFailed {
                        line: self.line + 1,
                        message: e.to_string(),
                    });
                }
            }

            if self.buf.trim().is_empty() {
                continue;
            }

            return match self.buf.parse::<TraceRecord>() {
                Ok(record) => {
                    self.records += 1;
                    Some(record)
                }
                Err(error) => {
                    warn!(line = self.line, %error, "malformed trace line, stopping");
                    let line = self.line;
                    self.finish(TraceEnd::Malformed { line, error })
                }
            };
        }
    }
}

// ============================================================================
// Synthetic Workload
// ============================================================================

/// Seeded generator of single-page random reads.
///
/// Block numbers are page aligned and stay below `sector_count`.
#[derive(Debug)]
pub struct SyntheticWorkload {
    rng: SmallRng,
    remaining: u64,
    index: u64,
    sectors_per_page: u64,
    pages: u64,
}

impl SyntheticWorkload {
    /// Default seed, so unseeded runs are still reproducible.
    pub const DEFAULT_SEED: u64 = 1;

    pub fn new(
        count: u64,
        sector_count: u64,
        sector_size: u64,
        page_size: u64,
        seed: u64,
    ) -> Result<Self, TraceError> {
        if sector_size == 0 || page_size < sector_size || page_size % sector_size != 0 {
            return Err(TraceError::InvalidWorkload(format!(
                "page size {page_size} is not a multiple of sector size {sector_size}"
            )));
        }
        let sectors_per_page = page_size / sector_size;
        let pages = sector_count / sectors_per_page;
        if pages == 0 {
            return Err(TraceError::InvalidWorkload(format!(
                "{sector_count} sectors hold no {page_size}-byte page"
            )));
        }

        Ok(Self {
            rng: SmallRng::seed_from_u64(seed),
            remaining: count,
            index: 0,
            sectors_per_page,
            pages,
        })
    }
}

impl Iterator for SyntheticWorkload {
    type Item = TraceRecord;

    fn next(&mut self) -> Option<TraceRecord> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let page = self.rng.gen_range(0..self.pages);
        let record = TraceRecord {
            time_offset: self.index as f64,
            device_id: 0,
            block_number: page * self.sectors_per_page,
            size_in_sectors: self.sectors_per_page,
            direction: Direction::Read,
        };
        self.index += 1;
        Some(record)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = usize::try_from(self.remaining).unwrap_or(usize::MAX);
        (n, Some(n))
    }
}

// ============================================================================
// Tests
// ============================================================================
