//! Playback session: resolve the range, open the speaker, run the pipeline.

use crate::audio::output::{Speaker, suppress_audio_warnings};
use crate::audio::queue::stream_queue;
use crate::config::Config;
use crate::defaults;
use crate::error::{PromtuneError, Result};
use crate::pipeline::{ChunkPipeline, PipelineConfig, PlaybackSummary};
use crate::prometheus::{MetricsSource, PrometheusClient};
use crate::timerange::{Clock, SystemClock, format_time, resolve_time_range};
use std::sync::Arc;

/// Run the play command: query → encode → play until the range is done.
///
/// # Arguments
/// * `config` - Fully resolved configuration (file, env and CLI overrides applied)
/// * `quiet` - Suppress status messages
/// * `verbosity` - Verbosity level (0=summary, 1=per-chunk progress, 2=window and device details)
///
/// # Returns
/// Playback counters, or the first error that stopped the session
pub async fn run_play_command(
    config: Config,
    quiet: bool,
    verbosity: u8,
) -> Result<PlaybackSummary> {
    run_play_with_clock(config, &SystemClock, quiet, verbosity).await
}

pub async fn run_play_with_clock(
    config: Config,
    clock: &dyn Clock,
    quiet: bool,
    verbosity: u8,
) -> Result<PlaybackSummary> {
    config.validate()?;
    let url = required(config.prometheus.url.as_deref(), "prometheus.url")?;
    let query = required(config.prometheus.query.as_deref(), "prometheus.query")?;

    let range = resolve_time_range(
        clock,
        config.range.start_time.as_deref(),
        config.range.end_time.as_deref(),
        config.range.offset,
        config.prometheus.scrape_interval,
    );

    if !quiet {
        eprintln!(
            "Playing '{}' from {} to {} ({} chunks of {})",
            query,
            format_time(range.start),
            format_time(range.end),
            range.chunk_count(config.range.chunk),
            humantime::format_duration(config.range.chunk),
        );
    }

    let client = PrometheusClient::new(url)?;
    if !quiet && verbosity >= 2 {
        eprintln!("Querying {}", client.endpoint());
    }
    let metrics: Arc<dyn MetricsSource> = Arc::new(client);

    // Suppress noisy JACK/ALSA warnings before audio init
    suppress_audio_warnings();

    let mut speaker = Speaker::open(
        config.audio.device.as_deref(),
        config.audio.sample_rate,
        defaults::output_buffer_frames(config.audio.sample_rate),
    )?;
    if !quiet && verbosity >= 2 {
        eprintln!(
            "Output: {}ch/{}Hz, buffer {:?}",
            speaker.channels(),
            speaker.sample_rate(),
            speaker.buffer_duration()
        );
    }

    let pipeline = ChunkPipeline::new(
        metrics,
        PipelineConfig {
            query: query.to_string(),
            chunk: config.range.chunk,
            format: config.audio.pcm_format(),
            output_rate: speaker.sample_rate(),
            resample_quality: config.audio.resample_quality,
            verbosity,
            quiet,
        },
    )?;

    let (handle, queue) = stream_queue();
    speaker.play(queue)?;

    let outcome = tokio::select! {
        result = pipeline.run(&range, &handle) => result,
        _ = tokio::signal::ctrl_c() => {
            if !quiet {
                eprintln!("\nShutting down...");
            }
            Err(PromtuneError::PlaybackInterrupted)
        }
    };

    // The backend still holds queued buffers when the stream queue drains
    if outcome.is_ok() {
        tokio::time::sleep(defaults::drain_tail(speaker.buffer_duration())).await;
    }
    speaker.stop()?;

    outcome
}

fn required<'a>(value: Option<&'a str>, name: &str) -> Result<&'a str> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(PromtuneError::MissingSetting {
            name: name.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timerange::FixedClock;
    use std::time::{Duration, SystemTime};

    #[test]
    fn required_rejects_missing_and_blank() {
        assert!(matches!(
            required(None, "prometheus.url"),
            Err(PromtuneError::MissingSetting { name }) if name == "prometheus.url"
        ));
        assert!(required(Some("  "), "prometheus.query").is_err());
        assert_eq!(required(Some(" up "), "prometheus.query").unwrap(), "up");
    }

    #[tokio::test]
    async fn missing_query_fails_before_opening_audio() {
        let mut config = Config::default();
        config.prometheus.url = Some("http://localhost:9090".to_string());
        let clock = FixedClock(SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000));

        let result = run_play_with_clock(config, &clock, true, 0).await;
        assert!(matches!(
            result,
            Err(PromtuneError::MissingSetting { name }) if name == "prometheus.query"
        ));
    }

    #[tokio::test]
    async fn invalid_config_fails_before_opening_audio() {
        let mut config = Config::default();
        config.prometheus.url = Some("http://localhost:9090".to_string());
        config.prometheus.query = Some("up".to_string());
        config.range.chunk = Duration::ZERO;

        let result = run_play_command(config, true, 0).await;
        assert!(matches!(
            result,
            Err(PromtuneError::ConfigInvalidValue { .. })
        ));
    }
}
