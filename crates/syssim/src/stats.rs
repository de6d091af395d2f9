//! Latency statistics.
//!
//! Each bucket keeps a running count, sum and sum of squares, so mean and
//! standard deviation can be derived at any point without storing
//! samples. Five buckets are kept per run:
//!
//! | Bucket       | Counts                                   |
//! |--------------|------------------------------------------|
//! | `all`        | every recorded request                   |
//! | `write`      | write requests                           |
//! | `write_page` | write requests, weighted by page count   |
//! | `read`       | read requests                            |
//! | `read_page`  | read requests, weighted by page count    |
//!
//! In a weighted bucket one request adds `weight` to the count but its
//! latency only once to the sum, so the mean is per page rather than per
//! request.

use std::fmt;

use crate::error::StatsError;
use crate::time::SimTime;
use crate::trace::Direction;

// ============================================================================
// Buckets
// ============================================================================

/// Identifies one of the five latency buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BucketKind {
    All,
    Write,
    WritePage,
    Read,
    ReadPage,
}

impl BucketKind {
    /// All buckets, in report order.
    pub const ALL: [BucketKind; 5] = [
        BucketKind::All,
        BucketKind::Write,
        BucketKind::WritePage,
        BucketKind::Read,
        BucketKind::ReadPage,
    ];

    /// Category label used in the printed summary.
    pub fn label(self) -> &'static str {
        match self {
            BucketKind::All => "all",
            BucketKind::Write => "write",
            BucketKind::WritePage => "write_page",
            BucketKind::Read => "read",
            BucketKind::ReadPage => "read_page",
        }
    }
}

impl fmt::Display for BucketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Running aggregate over latency samples.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LatencyBucket {
    count: u64,
    sum: f64,
    sum_of_squares: f64,
}

/// Derived statistics of a non-empty bucket.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketSummary {
    pub count: u64,
    pub mean: f64,
    pub std_dev: f64,
}

impl LatencyBucket {
    /// Creates an empty bucket.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one sample.
    pub fn record(&mut self, value: f64) {
        self.record_weighted(1, value);
    }

    /// Adds a sample that counts `weight` times toward the count.
    pub fn record_weighted(&mut self, weight: u64, value: f64) {
        self.count += weight;
        self.sum += value;
        self.sum_of_squares += value * value;
    }

    /// Returns the (possibly weighted) sample count.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Returns the sum of recorded values.
    pub fn sum(&self) -> f64 {
        self.sum
    }

    /// Returns the sum of squared values.
    pub fn sum_of_squares(&self) -> f64 {
        self.sum_of_squares
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Computes count, mean and population standard deviation.
    ///
    /// `kind` only labels the error when the bucket is empty.
    pub fn summarize(&self, kind: BucketKind) -> Result<BucketSummary, StatsError> {
        if self.count == 0 {
            return Err(StatsError::EmptyBucket { bucket: kind });
        }

        let n = self.count as f64;
        let mean = self.sum / n;
        // Rounding, or zero-weight samples in a page bucket, can push the
        // variance slightly below zero.
        let variance = (self.sum_of_squares / n - mean * mean).max(0.0);

        Ok(BucketSummary {
            count: self.count,
            mean,
            std_dev: variance.sqrt(),
        })
    }
}

// ============================================================================
// Per-run statistics
// ============================================================================

/// The five latency buckets of a replay run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LatencyStats {
    all: LatencyBucket,
    write: LatencyBucket,
    write_page: LatencyBucket,
    read: LatencyBucket,
    read_page: LatencyBucket,
}

impl LatencyStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the bucket of the given kind.
    pub fn bucket(&self, kind: BucketKind) -> &LatencyBucket {
        match kind {
            BucketKind::All => &self.all,
            BucketKind::Write => &self.write,
            BucketKind::WritePage => &self.write_page,
            BucketKind::Read => &self.read,
            BucketKind::ReadPage => &self.read_page,
        }
    }

    fn bucket_mut(&mut self, kind: BucketKind) -> &mut LatencyBucket {
        match kind {
            BucketKind::All => &mut self.all,
            BucketKind::Write => &mut self.write,
            BucketKind::WritePage => &mut self.write_page,
            BucketKind::Read => &mut self.read,
            BucketKind::ReadPage => &mut self.read_page,
        }
    }

    /// Records one sample into a single bucket.
    pub fn record(&mut self, kind: BucketKind, value: f64) {
        self.bucket_mut(kind).record(value);
    }

    /// Records one weighted sample into a single bucket.
    pub fn record_weighted(&mut self, kind: BucketKind, weight: u64, value: f64) {
        self.bucket_mut(kind).record_weighted(weight, value);
    }

    /// Records a completed request: the `all` bucket, its direction's
    /// request bucket, and its direction's page bucket with `pages` as
    /// weight.
    pub fn record_request(&mut self, direction: Direction, pages: u64, latency: SimTime) {
        self.all.record(latency);
        let (request, page) = match direction {
            Direction::Write => (BucketKind::Write, BucketKind::WritePage),
            Direction::Read => (BucketKind::Read, BucketKind::ReadPage),
        };
        self.record(request, latency);
        self.record_weighted(page, pages, latency);
    }

    /// Summarizes a single bucket.
    pub fn summarize(&self, kind: BucketKind) -> Result<BucketSummary, StatsError> {
        self.bucket(kind).summarize(kind)
    }

    /// Returns a printable report with the given title.
    pub fn report<'a>(&'a self, title: &'a str) -> StatsReport<'a> {
        StatsReport { stats: self, title }
    }
}

/// Printed form of [`LatencyStats`].
///
/// Empty buckets print `n=0 no samples` instead of a mean and deviation.
pub struct StatsReport<'a> {
    stats: &'a LatencyStats,
    title: &'a str,
}

impl fmt::Display for StatsReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f)?;
        for kind in BucketKind::ALL {
            match self.stats.summarize(kind) {
                Ok(summary) => writeln!(
                    f,
                    "{} {}: n={} average={:.6} std. deviation={:.6}",
                    kind, self.title, summary.count, summary.mean, summary.std_dev
                )?,
                Err(StatsError::EmptyBucket { .. }) => {
                    writeln!(f, "{} {}: n=0 no samples", kind, self.title)?;
                }
            }
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
