//! Chunked fetch-and-play pipeline.
//!
//! Walks the master time range one chunk at a time:
//! range query → flatten → encode → decode → resample → queue

use crate::audio::encoder::{PcmFormat, SampleChunk, encode_chunk};
use crate::audio::queue::QueueHandle;
use crate::audio::resample::Resampler;
use crate::audio::source::AudioSource;
use crate::audio::wav::WavSource;
use crate::defaults;
use crate::error::{PromtuneError, Result};
use crate::prometheus::{MetricsSource, QueryResult};
use crate::timerange::{TimeWindow, format_time};
use std::sync::Arc;
use std::time::Duration;

/// Configuration for the chunk pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// PromQL expression evaluated for every chunk
    pub query: String,
    /// Width of each sub-window
    pub chunk: Duration,
    /// PCM layout of the encoded chunks
    pub format: PcmFormat,
    /// Rate the output device runs at
    pub output_rate: u32,
    pub resample_quality: usize,
    /// Verbosity level (0=summary, 1=per-chunk progress, 2=window details)
    pub verbosity: u8,
    /// Suppress status messages
    pub quiet: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            query: String::new(),
            chunk: defaults::CHUNK,
            format: PcmFormat::default(),
            output_rate: defaults::SAMPLE_RATE,
            resample_quality: defaults::RESAMPLE_QUALITY,
            verbosity: 0,
            quiet: false,
        }
    }
}

/// Counters reported when a playback session ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaybackSummary {
    /// Windows a range query was issued for
    pub chunks_queried: u64,
    /// Windows that produced audio
    pub chunks_queued: u64,
    /// Windows with no data, or starting at the range end
    pub chunks_skipped: u64,
    /// Data points read across all windows
    pub samples_read: u64,
    /// Sources the output played to exhaustion
    pub sources_consumed: u64,
    /// Output pulls padded with silence while waiting for data
    pub underruns: u64,
}

/// Fetches metric windows and feeds them to the stream queue as audio.
pub struct ChunkPipeline {
    metrics: Arc<dyn MetricsSource>,
    config: PipelineConfig,
}

impl ChunkPipeline {
    /// Create a pipeline.
    ///
    /// # Errors
    /// Returns `ConfigInvalidValue` for a zero chunk, an unsupported PCM
    /// layout, a zero output rate or an out-of-range resample quality.
    pub fn new(metrics: Arc<dyn MetricsSource>, config: PipelineConfig) -> Result<Self> {
        if config.chunk.is_zero() {
            return Err(PromtuneError::ConfigInvalidValue {
                key: "range.chunk".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        config.format.validate()?;
        if config.output_rate == 0 {
            return Err(PromtuneError::ConfigInvalidValue {
                key: "audio.sample_rate".to_string(),
                message: "output rate must be positive".to_string(),
            });
        }
        if !(1..=defaults::MAX_RESAMPLE_QUALITY).contains(&config.resample_quality) {
            return Err(PromtuneError::ConfigInvalidValue {
                key: "audio.resample_quality".to_string(),
                message: format!(
                    "must be in 1..={}, got {}",
                    defaults::MAX_RESAMPLE_QUALITY,
                    config.resample_quality
                ),
            });
        }

        Ok(Self { metrics, config })
    }

    /// Queue every chunk of `range`, then wait until the output has played
    /// all of them.
    ///
    /// # Errors
    /// A failed range query, encode or decode aborts the run. Returns
    /// `PlaybackInterrupted` if the consumer goes away before draining.
    pub async fn run(&self, range: &TimeWindow, queue: &QueueHandle) -> Result<PlaybackSummary> {
        let mut summary = self.enqueue_all(range, queue).await?;

        queue.finish().await?;

        summary.sources_consumed = queue.stats().consumed();
        summary.underruns = queue.stats().underruns();
        Ok(summary)
    }

    /// Queue every chunk of `range` without waiting for playback.
    pub async fn enqueue_all(
        &self,
        range: &TimeWindow,
        queue: &QueueHandle,
    ) -> Result<PlaybackSummary> {
        let mut summary = PlaybackSummary::default();

        for (n, window) in range.partition(self.config.chunk).enumerate() {
            if window.start >= range.end {
                if self.config.verbosity >= 2 && !self.config.quiet {
                    eprintln!("Chunk {}: starts at range end, skipping", n);
                }
                summary.chunks_skipped += 1;
                continue;
            }

            if self.config.verbosity >= 2 && !self.config.quiet {
                eprintln!(
                    "Chunk {}: {} .. {}",
                    n,
                    format_time(window.start),
                    format_time(window.end)
                );
            }

            let result = self
                .metrics
                .range_query(&self.config.query, &window)
                .await?;
            summary.chunks_queried += 1;

            let chunk = flatten(result);
            if self.config.verbosity >= 1 && !self.config.quiet {
                eprintln!("Read {} samples, chunk {}", chunk.len(), n);
            }
            summary.samples_read += chunk.len() as u64;

            if chunk.is_empty() {
                if self.config.verbosity >= 2 && !self.config.quiet {
                    eprintln!("Chunk {}: no data, skipping", n);
                }
                summary.chunks_skipped += 1;
                continue;
            }

            let source = self.chunk_source(&chunk)?;
            queue.append(std::iter::once(source))?;
            summary.chunks_queued += 1;
        }

        Ok(summary)
    }

    /// Encode a chunk, decode it back and resample it to the output rate.
    fn chunk_source(&self, chunk: &SampleChunk) -> Result<Box<dyn AudioSource>> {
        let bytes = encode_chunk(chunk, &self.config.format)?;
        let (wav, format) = WavSource::decode(bytes)?;
        let resampled = Resampler::new(
            self.config.resample_quality,
            format.sample_rate,
            self.config.output_rate,
            wav,
        )?;
        Ok(Box::new(resampled))
    }
}

/// Concatenate every series of a matrix or vector result, series by series.
///
/// Any other result type yields an empty chunk.
pub fn flatten(result: QueryResult) -> SampleChunk {
    let mut chunk = SampleChunk::new();
    for series in result.into_series().unwrap_or_default() {
        chunk.extend(series.points.into_iter().map(|p| p.value));
    }
    chunk
}
