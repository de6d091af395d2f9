//! End-to-end replay tests against fixture engines and the built-in disk
//! engine.

#![allow(clippy::float_cmp)]

use std::fs;
use std::io::Cursor;
use std::path::Path;

use proptest::prelude::*;
use syssim::{
    BucketKind, DiskEngine, Direction, Engine, EngineError, EngineHost, ReplayDriver,
    ReplayError, ReplaySettings, Request, SimTime, TraceEnd, TraceReader, TraceRecord,
};

// ============================================================================
// Fixture Engine
// ============================================================================

/// Well-behaved engine: every request takes two internal events, the
/// second one completing it. Service time depends only on the request,
/// so runs are deterministic.
///
/// A negative `skew` makes completions land before the request started.
struct TwoStageEngine {
    skew: SimTime,
    pending: Option<(Request, bool)>,
}

impl TwoStageEngine {
    fn new() -> Self {
        Self::with_skew(0.0)
    }

    fn with_skew(skew: SimTime) -> Self {
        Self {
            skew,
            pending: None,
        }
    }

    fn service_time(request: &Request) -> SimTime {
        0.25 + (request.block_number % 17) as f64 * 0.5 + request.byte_count as f64 / 4096.0
    }
}

impl Engine for TwoStageEngine {
    fn initialize(_: &Path, _: &Path) -> Result<Self, EngineError> {
        Ok(Self::new())
    }

    fn request_arrive(
        &mut self,
        now: SimTime,
        request: Request,
        host: &mut dyn EngineHost,
    ) -> Result<(), EngineError> {
        host.schedule_callback(now + 0.125);
        self.pending = Some((request, false));
        Ok(())
    }

    fn internal_event(
        &mut self,
        now: SimTime,
        host: &mut dyn EngineHost,
    ) -> Result<(), EngineError> {
        match self.pending.take() {
            Some((request, false)) => {
                host.schedule_callback(now + Self::service_time(&request));
                self.pending = Some((request, true));
            }
            Some((request, true)) => {
                let finish = if self.skew < 0.0 {
                    request.start_time + self.skew
                } else {
                    now
                };
                host.report_completion(finish, &request);
            }
            None => {}
        }
        Ok(())
    }

    fn shutdown(&mut self, _: SimTime) -> Result<(), EngineError> {
        Ok(())
    }
}

fn records_from(spec: &[(u64, u64, bool)]) -> Vec<TraceRecord> {
    spec.iter()
        .enumerate()
        .map(|(i, &(block, sectors, write))| TraceRecord {
            time_offset: i as f64,
            device_id: 0,
            block_number: block,
            size_in_sectors: sectors,
            direction: if write { Direction::Write } else { Direction::Read },
        })
        .collect()
}

fn trace_strategy() -> impl Strategy<Value = Vec<(u64, u64, bool)>> {
    prop::collection::vec((0u64..1_000_000, 1u64..64, any::<bool>()), 1..60)
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn two_line_trace_through_disk_engine() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("disk.toml");
    fs::write(&config, "controller_overhead_ms = 0.5\n").unwrap();

    let engine = DiskEngine::initialize(&config, &dir.path().join("engine.out")).unwrap();
    let mut driver = ReplayDriver::new(engine, ReplaySettings::default(), 2).unwrap();
    let mut trace = TraceReader::new(Cursor::new("0.0 0 100 8 0\n1.0 0 200 8 1\n"));

    let first = driver.submit(&trace.next().unwrap()).unwrap();
    let second = driver.submit(&trace.next().unwrap()).unwrap();
    assert!(trace.next().is_none());

    assert_eq!(first.request.byte_count, 4096);
    assert_eq!(first.request.direction, Direction::Write);
    assert!(!first.recorded);
    assert_eq!(second.request.byte_count, 4096);
    assert_eq!(second.request.direction, Direction::Read);
    assert!(second.recorded);
    assert_eq!(second.request.start_time, first.completion_time);

    let report = driver.finish().unwrap();
    let stats = &report.stats;
    assert_eq!(stats.bucket(BucketKind::All).count(), 1);
    assert_eq!(stats.bucket(BucketKind::Write).count(), 0);
    assert_eq!(stats.bucket(BucketKind::WritePage).count(), 0);
    assert_eq!(stats.bucket(BucketKind::Read).count(), 1);
    // 4096 / 4096 = one page
    assert_eq!(stats.bucket(BucketKind::ReadPage).count(), 1);
    assert_eq!(
        stats.summarize(BucketKind::Read).unwrap().mean,
        second.latency
    );
}

#[test]
fn malformed_line_still_reaches_shutdown() {
    let mut trace = TraceReader::new(Cursor::new("0.0 0 100 8 0\n1.0 0 x 8 1\n2.0 0 300 8 1\n"));
    let mut driver = ReplayDriver::new(TwoStageEngine::new(), ReplaySettings::default(), 1).unwrap();

    assert_eq!(driver.replay(&mut trace).unwrap(), 1);
    assert!(matches!(trace.end(), Some(TraceEnd::Malformed { line: 2, .. })));

    let report = driver.finish().unwrap();
    assert_eq!(report.requests, 1);
    assert_eq!(report.stats.bucket(BucketKind::All).count(), 1);
    assert_eq!(report.stats.bucket(BucketKind::Write).count(), 1);

    let text = report.stats.report("response time").to_string();
    assert!(text.contains("read response time: n=0 no samples"));
}

#[test]
fn sub_page_requests_add_zero_weight() {
    let mut driver = ReplayDriver::new(TwoStageEngine::new(), ReplaySettings::default(), 1).unwrap();
    driver.replay(records_from(&[(10, 1, false)])).unwrap();
    let report = driver.finish().unwrap();

    // 512 bytes is less than a page.
    assert_eq!(report.stats.bucket(BucketKind::Read).count(), 1);
    assert_eq!(report.stats.bucket(BucketKind::ReadPage).count(), 0);
    assert!(report.stats.bucket(BucketKind::ReadPage).sum() > 0.0);
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    /// Property: a well-behaved engine always completes, latencies are
    /// non-negative, and the clock ends at the last completion.
    #[test]
    fn prop_pump_terminates_with_completion(spec in trace_strategy()) {
        let records = records_from(&spec);
        let mut driver =
            ReplayDriver::new(TwoStageEngine::new(), ReplaySettings::default(), records.len() as u64)
                .unwrap();

        let mut last = 0.0;
        for record in &records {
            let outcome = driver.submit(record).unwrap();
            prop_assert!(outcome.latency >= 0.0);
            prop_assert!(outcome.completion_time >= outcome.request.start_time);
            prop_assert_eq!(outcome.events, 2);
            last = outcome.completion_time;
        }
        prop_assert_eq!(driver.now(), last);
        prop_assert_eq!(driver.completed(), records.len() as u64);
    }

    /// Property: an engine completing before submission is rejected
    /// rather than averaged in.
    #[test]
    fn prop_negative_latency_is_rejected(spec in trace_strategy(), skew in -100.0f64..-0.001) {
        let records = records_from(&spec);
        let mut driver =
            ReplayDriver::new(TwoStageEngine::with_skew(skew), ReplaySettings::default(), 1)
                .unwrap();

        let result = driver.replay(records);
        let is_negative_latency = matches!(result, Err(ReplayError::NegativeLatency { request: 1, .. }));
        prop_assert!(is_negative_latency);
        prop_assert!(driver.stats().bucket(BucketKind::All).is_empty());
    }

    /// Property: all = write + read, and exactly the requests past the
    /// warm-up threshold are recorded.
    #[test]
    fn prop_bucket_counts_follow_warmup(spec in trace_strategy()) {
        let records = records_from(&spec);
        let n = records.len() as u64;
        let mut driver = ReplayDriver::new(TwoStageEngine::new(), ReplaySettings::default(), n).unwrap();
        driver.replay(records).unwrap();
        let threshold = driver.warmup_threshold();
        let report = driver.finish().unwrap();

        let all = report.stats.bucket(BucketKind::All).count();
        let writes = report.stats.bucket(BucketKind::Write).count();
        let reads = report.stats.bucket(BucketKind::Read).count();

        prop_assert_eq!(threshold, (n as f64 * 0.6).floor() as u64);
        prop_assert_eq!(all, writes + reads);
        prop_assert_eq!(all, n - threshold);
        prop_assert_eq!(report.recorded, all);
    }

    /// Property: replaying the same trace through two independent drivers
    /// gives identical results.
    #[test]
    fn prop_replay_is_deterministic(spec in trace_strategy()) {
        let text: String = spec
            .iter()
            .enumerate()
            .map(|(i, (block, sectors, write))| {
                format!("{i}.0 0 {block} {sectors} {}\n", if *write { 0 } else { 1 })
            })
            .collect();

        let run = || {
            let mut driver =
                ReplayDriver::new(TwoStageEngine::new(), ReplaySettings::default(), spec.len() as u64)
                    .unwrap();
            driver.replay(TraceReader::new(Cursor::new(text.clone()))).unwrap();
            driver.finish().unwrap()
        };

        prop_assert_eq!(run(), run());
    }
}
