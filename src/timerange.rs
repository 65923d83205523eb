//! Time range resolution and chunk partitioning.
//!
//! The master range is derived from the configured start/end literals (or the
//! lookback offset), clamped to the present, and then split into contiguous
//! half-open windows of one chunk each.

use crate::defaults::TIME_FORMAT;
use crate::error::{PromtuneError, Result};
use std::time::{Duration, SystemTime};

/// Source of wall-clock time.
///
/// This trait allows swapping implementations (system time vs fixed time in tests).
pub trait Clock: Send + Sync {
    /// Returns the current wall-clock time.
    fn now(&self) -> SystemTime;
}

/// Real system clock using `SystemTime::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Clock frozen at a single instant, for tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub SystemTime);

impl Clock for FixedClock {
    fn now(&self) -> SystemTime {
        self.0
    }
}

/// Half-open interval `[start, end)` queried at `step` resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: SystemTime,
    pub end: SystemTime,
    pub step: Duration,
}

impl TimeWindow {
    pub fn new(start: SystemTime, end: SystemTime, step: Duration) -> Self {
        Self { start, end, step }
    }

    /// Width of the window, zero if `end` precedes `start`.
    pub fn duration(&self) -> Duration {
        self.end.duration_since(self.start).unwrap_or_default()
    }

    /// Number of chunk windows `partition` yields: `floor(duration / chunk) + 1`.
    pub fn chunk_count(&self, chunk: Duration) -> u64 {
        if chunk.is_zero() {
            return 1;
        }
        (self.duration().as_nanos() / chunk.as_nanos()) as u64 + 1
    }

    /// Sub-window `n`: `[start + n*chunk, start + (n+1)*chunk)`.
    pub fn chunk_window(&self, chunk: Duration, n: u64) -> TimeWindow {
        let start = self.start + offset_of(chunk, n);
        let end = self.start + offset_of(chunk, n + 1);
        TimeWindow::new(start, end, self.step)
    }

    /// Split into contiguous chunk windows, inclusive of the trailing index.
    ///
    /// The trailing window extends past `end` (and starts exactly at `end`
    /// when the duration is a whole multiple of `chunk`).
    pub fn partition(&self, chunk: Duration) -> impl Iterator<Item = TimeWindow> + '_ {
        (0..self.chunk_count(chunk)).map(move |n| self.chunk_window(chunk, n))
    }
}

fn offset_of(chunk: Duration, n: u64) -> Duration {
    let nanos = chunk.as_nanos().saturating_mul(n as u128);
    Duration::new(
        (nanos / 1_000_000_000).min(u64::MAX as u128) as u64,
        (nanos % 1_000_000_000) as u32,
    )
}

/// Parse a `YYYY-MM-DD HH:MM:SS` literal (UTC).
///
/// Returns `fallback` when the literal is empty or does not parse.
pub fn parse_time(literal: Option<&str>, fallback: SystemTime) -> SystemTime {
    match literal.map(str::trim) {
        Some(s) if !s.is_empty() => parse_time_literal(s).unwrap_or(fallback),
        _ => fallback,
    }
}

/// Strict parse of the fixed time literal layout.
pub fn parse_time_literal(s: &str) -> Result<SystemTime> {
    let bytes = s.as_bytes();
    if bytes.len() != TIME_FORMAT.len() || bytes[10] != b' ' {
        return Err(PromtuneError::ConfigParse {
            message: format!("time '{}' does not match {}", s, TIME_FORMAT),
        });
    }
    humantime::parse_rfc3339_weak(s).map_err(|e| PromtuneError::ConfigParse {
        message: format!("time '{}': {}", s, e),
    })
}

/// Resolve the master time range.
///
/// start defaults to `now - offset`, end defaults to `now`. An end in the
/// future is clamped to `now`; if the clamped end precedes the start, the
/// start becomes `end - offset`.
pub fn resolve_time_range(
    clock: &dyn Clock,
    start_time: Option<&str>,
    end_time: Option<&str>,
    offset: Duration,
    step: Duration,
) -> TimeWindow {
    let now = clock.now();
    let default_start = now.checked_sub(offset).unwrap_or(SystemTime::UNIX_EPOCH);

    let mut start = parse_time(start_time, default_start);
    let mut end = parse_time(end_time, now);

    if end > now {
        end = now;
    }

    if end < start {
        start = end.checked_sub(offset).unwrap_or(SystemTime::UNIX_EPOCH);
    }

    TimeWindow::new(start, end, step)
}

/// Format a time as `YYYY-MM-DD HH:MM:SS` for status output.
pub fn format_time(time: SystemTime) -> String {
    humantime::format_rfc3339_seconds(time)
        .to_string()
        .trim_end_matches('Z')
        .replace('T', " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: Duration = Duration::from_secs(60);

    fn at(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[test]
    fn parse_time_accepts_fixed_layout() {
        let t = parse_time(Some("2024-01-02 03:04:05"), at(0));
        assert_eq!(t, at(1_704_164_645));
    }

    #[test]
    fn parse_time_falls_back_on_empty() {
        assert_eq!(parse_time(None, at(42)), at(42));
        assert_eq!(parse_time(Some(""), at(42)), at(42));
        assert_eq!(parse_time(Some("   "), at(42)), at(42));
    }

    #[test]
    fn parse_time_falls_back_on_garbage() {
        assert_eq!(parse_time(Some("yesterday"), at(42)), at(42));
        assert_eq!(parse_time(Some("2024-13-02 03:04:05"), at(42)), at(42));
    }

    #[test]
    fn parse_time_rejects_other_layouts() {
        assert!(parse_time_literal("2024-01-02T03:04:05Z").is_err());
        assert!(parse_time_literal("2024-01-02 03:04").is_err());
        assert!(parse_time_literal("2024-01-02 03:04:05.123").is_err());
    }

    #[test]
    fn format_time_round_trips_literal() {
        let t = parse_time_literal("2024-01-02 03:04:05").unwrap();
        assert_eq!(format_time(t), "2024-01-02 03:04:05");
    }

    #[test]
    fn resolve_defaults_to_offset_before_now() {
        let clock = FixedClock(at(10_000));
        let range = resolve_time_range(&clock, None, None, 2 * MINUTE, Duration::from_secs(1));
        assert_eq!(range.start, at(10_000 - 120));
        assert_eq!(range.end, at(10_000));
        assert_eq!(range.step, Duration::from_secs(1));
    }

    #[test]
    fn resolve_clamps_future_end_to_now() {
        let now = parse_time_literal("2024-01-02 03:04:05").unwrap();
        let clock = FixedClock(now);
        let range = resolve_time_range(
            &clock,
            Some("2024-01-02 02:00:00"),
            Some("2030-01-01 00:00:00"),
            MINUTE,
            Duration::from_secs(1),
        );
        assert_eq!(range.end, now);
        assert_eq!(
            range.start,
            parse_time_literal("2024-01-02 02:00:00").unwrap()
        );
    }

    #[test]
    fn resolve_recomputes_start_when_end_precedes_it() {
        let now = parse_time_literal("2024-01-02 03:04:05").unwrap();
        let clock = FixedClock(now);
        let range = resolve_time_range(
            &clock,
            Some("2024-01-02 03:00:00"),
            Some("2024-01-02 02:00:00"),
            10 * MINUTE,
            Duration::from_secs(1),
        );
        let end = parse_time_literal("2024-01-02 02:00:00").unwrap();
        assert_eq!(range.end, end);
        assert_eq!(range.start, end - 10 * MINUTE);
    }

    #[test]
    fn resolve_future_start_falls_back_to_clamped_end_minus_offset() {
        let now = parse_time_literal("2024-01-02 03:04:05").unwrap();
        let clock = FixedClock(now);
        let range = resolve_time_range(
            &clock,
            Some("2031-01-01 00:00:00"),
            None,
            5 * MINUTE,
            Duration::from_secs(1),
        );
        assert_eq!(range.end, now);
        assert_eq!(range.start, now - 5 * MINUTE);
    }

    #[test]
    fn chunk_count_is_floor_plus_one() {
        let range = TimeWindow::new(at(0), at(150), Duration::from_secs(1));
        assert_eq!(range.chunk_count(MINUTE), 3);

        let exact = TimeWindow::new(at(0), at(120), Duration::from_secs(1));
        assert_eq!(exact.chunk_count(MINUTE), 3);

        let short = TimeWindow::new(at(0), at(59), Duration::from_secs(1));
        assert_eq!(short.chunk_count(MINUTE), 1);
    }

    #[test]
    fn partition_windows_are_contiguous() {
        let range = TimeWindow::new(at(1000), at(1000 + 3600), Duration::from_secs(1));
        let windows: Vec<_> = range.partition(7 * MINUTE).collect();

        assert_eq!(windows.len(), 3600 / 420 + 1);
        assert_eq!(windows[0].start, range.start);
        for pair in windows.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
        for w in &windows {
            assert_eq!(w.duration(), 7 * MINUTE);
            assert_eq!(w.step, range.step);
        }
    }

    #[test]
    fn partition_two_minutes_by_one_minute() {
        let now = at(100_000);
        let range = TimeWindow::new(now - 2 * MINUTE, now, Duration::from_secs(1));
        let windows: Vec<_> = range.partition(MINUTE).collect();

        assert_eq!(windows.len(), 3);
        assert_eq!(windows[0].start, now - 2 * MINUTE);
        assert_eq!(windows[0].end, now - MINUTE);
        assert_eq!(windows[1].start, now - MINUTE);
        assert_eq!(windows[1].end, now);
        assert_eq!(windows[2].start, now);
    }

    #[test]
    fn inverted_window_has_zero_duration() {
        let w = TimeWindow::new(at(10), at(5), Duration::from_secs(1));
        assert_eq!(w.duration(), Duration::ZERO);
        assert_eq!(w.chunk_count(MINUTE), 1);
    }
}
