//! promtune - Play Prometheus metrics as sound
//!
//! Range-queries a metric window by window, turns every data point into a
//! PCM sample and streams the result gaplessly to an audio output device.

// Library code propagates errors; only tests may unwrap
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod defaults;
pub mod error;
pub mod pipeline;
pub mod prometheus;
pub mod timerange;

// Composition root - needs the audio backend
#[cfg(feature = "cpal-audio")]
pub mod app;

// Core traits (metrics source → queue → output)
pub use audio::queue::{QueueHandle, StreamQueue, stream_queue};
pub use audio::source::AudioSource;
pub use prometheus::{MetricsSource, PrometheusClient};
pub use timerange::{Clock, SystemClock, TimeWindow};

// Pipeline
pub use pipeline::{ChunkPipeline, PipelineConfig, PlaybackSummary};

// Error handling
pub use error::{PromtuneError, Result};

// Config
pub use config::Config;

/// Version reported by `--version`: `"0.1.0+abc1234"` when built from a git
/// checkout, `"0.1.0"` otherwise.
pub const VERSION: &str = env!("PROMTUNE_VERSION");
