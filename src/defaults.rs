//! Default configuration constants for promtune.
//!
//! Shared between the config file defaults, the CLI and the pipeline so the
//! values stay consistent.

use std::time::Duration;

/// Default output sample rate in Hz.
///
/// 44.1kHz is the compact disc rate and is accepted by practically every
/// output device, so chunks usually reach the speaker without resampling.
pub const SAMPLE_RATE: u32 = 44100;

/// Default channel count of the encoded PCM chunks.
pub const CHANNELS: u16 = 1;

/// Default bit depth of the encoded PCM chunks.
///
/// 8-bit unsigned PCM maps metric values 0..=255 directly onto the full
/// amplitude range, with 128 as the zero line.
pub const BITS_PER_SAMPLE: u16 = 8;

/// Default resampling quality (number of neighbouring frames on each side).
pub const RESAMPLE_QUALITY: usize = 4;

/// Upper bound accepted for the resampling quality.
pub const MAX_RESAMPLE_QUALITY: usize = 64;

/// Default lookback when no explicit start time is given.
pub const OFFSET: Duration = Duration::from_secs(24 * 60 * 60);

/// Default time range covered by a single range query.
pub const CHUNK: Duration = Duration::from_secs(60);

/// Default range query resolution.
pub const SCRAPE_INTERVAL: Duration = Duration::from_secs(1);

/// Output buffers hold this fraction of a second of audio (1/10 s).
pub const OUTPUT_BUFFERS_PER_SECOND: u32 = 10;

/// Device buffers still queued in the backend after the last frame leaves
/// the stream queue. ALSA and PipeWire usually keep two or more periods in
/// flight, and `BufferSize::Default` only gives an estimate of one period.
pub const DRAIN_TAIL_BUFFERS: u32 = 3;

/// Literal layout accepted for `start_time` / `end_time`.
pub const TIME_FORMAT: &str = "YYYY-MM-DD HH:MM:SS";

/// Number of output frames for one device buffer at `sample_rate`.
pub fn output_buffer_frames(sample_rate: u32) -> u32 {
    (sample_rate / OUTPUT_BUFFERS_PER_SECOND).max(1)
}

/// Time to keep the stream open after the queue drains.
pub fn drain_tail(buffer: Duration) -> Duration {
    buffer * DRAIN_TAIL_BUFFERS
}
