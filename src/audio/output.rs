//! Audio playback using CPAL (Cross-Platform Audio Library).

use crate::audio::source::{AudioSource, Frame, SILENCE};
use crate::error::{PromtuneError, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SampleFormat, SizedSample};
use std::time::Duration;

/// Run a closure with stderr temporarily redirected to /dev/null.
///
/// This suppresses noisy ALSA/JACK/PipeWire messages that CPAL triggers
/// when probing audio backends.
///
/// # Safety
/// Uses `libc::dup`/`libc::dup2` to save and restore file descriptor 2 (stderr).
/// Safe as long as no other thread is concurrently manipulating fd 2.
fn with_suppressed_stderr<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    unsafe {
        let saved_fd = libc::dup(2);
        let devnull = libc::open(c"/dev/null".as_ptr(), libc::O_WRONLY);
        if saved_fd >= 0 && devnull >= 0 {
            libc::dup2(devnull, 2);
            libc::close(devnull);
        }

        let result = f();

        if saved_fd >= 0 {
            libc::dup2(saved_fd, 2);
            libc::close(saved_fd);
        }

        result
    }
}

/// Keep JACK and PipeWire quiet while CPAL probes backends.
///
/// # Safety
/// This modifies environment variables which is safe when called before spawning threads.
pub fn suppress_audio_warnings() {
    // SAFETY: Called at startup before the runtime spawns worker threads
    unsafe {
        std::env::set_var("JACK_NO_START_SERVER", "1");
        std::env::set_var("JACK_NO_AUDIO_RESERVATION", "1");
        std::env::set_var("PIPEWIRE_DEBUG", "0");
        std::env::set_var("ALSA_DEBUG", "0");
        std::env::set_var("PW_LOG", "0");
    }
}

/// Preferred sinks on PipeWire/PulseAudio desktops.
const PREFERRED_DEVICES: &[&str] = &["pipewire", "pulse", "PulseAudio"];

/// Device name patterns hidden from the device list.
const FILTERED_PATTERNS: &[&str] = &["surround", "front:", "rear:", "center:", "side:"];

const RECOMMENDED_SUFFIX: &str = " [recommended]";

fn should_filter_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    FILTERED_PATTERNS
        .iter()
        .any(|pattern| lower.contains(&pattern.to_lowercase()))
}

fn is_preferred_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    PREFERRED_DEVICES
        .iter()
        .any(|pref| lower.contains(&pref.to_lowercase()))
}

fn device_name(device: &cpal::Device) -> Option<String> {
    device.description().ok().map(|d| d.name().to_string())
}

/// List output devices, marking preferred ones with "\[recommended\]".
///
/// # Errors
/// Returns `AudioOutput` if device enumeration fails.
pub fn list_output_devices() -> Result<Vec<String>> {
    let devices = with_suppressed_stderr(|| cpal::default_host().output_devices())
        .map_err(|e| PromtuneError::AudioOutput {
            message: format!("Failed to enumerate output devices: {}", e),
        })?;

    let mut names = Vec::new();
    for device in devices {
        if let Some(name) = device_name(&device) {
            if should_filter_device(&name) {
                continue;
            }
            if is_preferred_device(&name) {
                names.push(format!("{}{}", name, RECOMMENDED_SUFFIX));
            } else {
                names.push(name);
            }
        }
    }

    Ok(names)
}

/// Find an output device by name, or the best default.
///
/// Without a name, PipeWire and PulseAudio sinks win over the host default.
fn find_output_device(name: Option<&str>) -> Result<cpal::Device> {
    with_suppressed_stderr(|| {
        let host = cpal::default_host();

        if let Some(name) = name {
            let wanted = name.trim_end_matches(RECOMMENDED_SUFFIX);
            let devices = host
                .output_devices()
                .map_err(|e| PromtuneError::AudioOutput {
                    message: format!("Failed to enumerate devices: {}", e),
                })?;
            for device in devices {
                if device_name(&device).as_deref() == Some(wanted) {
                    return Ok(device);
                }
            }
            return Err(PromtuneError::AudioDeviceNotFound {
                device: name.to_string(),
            });
        }

        if let Ok(devices) = host.output_devices() {
            for device in devices {
                if device_name(&device).is_some_and(|n| is_preferred_device(&n)) {
                    return Ok(device);
                }
            }
        }

        host.default_output_device()
            .ok_or_else(|| PromtuneError::AudioDeviceNotFound {
                device: "default".to_string(),
            })
    })
}

/// Wrapper for cpal::Stream to make it Send.
///
/// SAFETY: The stream is owned by a single `Speaker` and only started and
/// dropped from the thread that owns it.
struct SendableStream(cpal::Stream);

unsafe impl Send for SendableStream {}

/// Output device driver.
///
/// Opens the device at the session sample rate when it supports one, and
/// otherwise falls back to the device's native config; callers read
/// [`Speaker::sample_rate`] and resample to it.
pub struct Speaker {
    device: cpal::Device,
    config: cpal::StreamConfig,
    sample_format: SampleFormat,
    stream: Option<SendableStream>,
}

impl Speaker {
    /// Open an output device.
    ///
    /// # Arguments
    /// * `device_name` - Optional device name. If None, uses the best default output.
    /// * `sample_rate` - Desired stream rate in Hz.
    /// * `buffer_frames` - Desired callback buffer size in frames.
    ///
    /// # Errors
    /// - `AudioDeviceNotFound` if the named device does not exist
    /// - `AudioOutput` if no usable stream configuration is found
    pub fn open(device_name: Option<&str>, sample_rate: u32, buffer_frames: u32) -> Result<Self> {
        let device = find_output_device(device_name)?;
        let (config, sample_format) = with_suppressed_stderr(|| {
            preferred_config(&device, sample_rate, buffer_frames)
                .map(Ok)
                .unwrap_or_else(|| native_config(&device))
        })?;

        Ok(Self {
            device,
            config,
            sample_format,
            stream: None,
        })
    }

    /// Rate the device stream runs at.
    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.config.channels
    }

    /// Playback time of one device buffer.
    pub fn buffer_duration(&self) -> Duration {
        let frames = match self.config.buffer_size {
            cpal::BufferSize::Fixed(frames) => frames,
            cpal::BufferSize::Default => crate::defaults::output_buffer_frames(self.sample_rate()),
        };
        Duration::from_secs_f64(frames as f64 / self.sample_rate().max(1) as f64)
    }

    /// Start pulling audio from `source` on the device callback thread.
    ///
    /// # Errors
    /// Returns `AudioOutput` if the stream cannot be built or started.
    pub fn play<S: AudioSource + 'static>(&mut self, source: S) -> Result<()> {
        let stream = match self.sample_format {
            SampleFormat::F32 => self.build_stream::<f32, S>(source)?,
            SampleFormat::I16 => self.build_stream::<i16, S>(source)?,
            SampleFormat::U16 => self.build_stream::<u16, S>(source)?,
            SampleFormat::I32 => self.build_stream::<i32, S>(source)?,
            fmt => {
                return Err(PromtuneError::AudioOutput {
                    message: format!(
                        "Unsupported output sample format: {:?}. \
                         Try specifying a device with --device.",
                        fmt
                    ),
                });
            }
        };

        stream.play().map_err(|e| PromtuneError::AudioOutput {
            message: format!("Failed to start audio stream: {}", e),
        })?;
        self.stream = Some(SendableStream(stream));
        Ok(())
    }

    /// Stop and release the device stream.
    pub fn stop(&mut self) -> Result<()> {
        if let Some(sendable_stream) = self.stream.take() {
            sendable_stream
                .0
                .pause()
                .map_err(|e| PromtuneError::AudioOutput {
                    message: format!("Failed to stop audio stream: {}", e),
                })?;
        }
        Ok(())
    }

    fn build_stream<T, S>(&self, mut source: S) -> Result<cpal::Stream>
    where
        T: SizedSample + FromSample<f32>,
        S: AudioSource + 'static,
    {
        let channels = self.config.channels as usize;
        let mut frames = Vec::new();

        self.device
            .build_output_stream(
                &self.config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    render(&mut source, &mut frames, data, channels);
                },
                |err| {
                    eprintln!("Audio stream error: {}", err);
                },
                None,
            )
            .map_err(|e| PromtuneError::AudioOutput {
                message: format!("Failed to build output stream: {}", e),
            })
    }
}

/// Stereo or mono, f32 or i16, at exactly `sample_rate`.
fn preferred_config(
    device: &cpal::Device,
    sample_rate: u32,
    buffer_frames: u32,
) -> Option<(cpal::StreamConfig, SampleFormat)> {
    let ranges: Vec<_> = device.supported_output_configs().ok()?.collect();

    let rank = |range: &cpal::SupportedStreamConfigRange| {
        let format_rank = match range.sample_format() {
            SampleFormat::F32 => 0,
            SampleFormat::I16 => 1,
            _ => return None,
        };
        let channel_rank = match range.channels() {
            2 => 0,
            1 => 1,
            _ => return None,
        };
        Some((format_rank, channel_rank))
    };

    let best = ranges
        .iter()
        .filter(|r| r.min_sample_rate() <= sample_rate && sample_rate <= r.max_sample_rate())
        .filter_map(|r| rank(r).map(|k| (k, r)))
        .min_by_key(|(k, _)| *k)
        .map(|(_, r)| *r)?;

    let buffer_size = match best.buffer_size() {
        cpal::SupportedBufferSize::Range { min, max } if (*min..=*max).contains(&buffer_frames) => {
            cpal::BufferSize::Fixed(buffer_frames)
        }
        _ => cpal::BufferSize::Default,
    };

    let config = cpal::StreamConfig {
        channels: best.channels(),
        sample_rate,
        buffer_size,
    };
    Some((config, best.sample_format()))
}

/// Device default config, used when the session rate is not supported.
fn native_config(device: &cpal::Device) -> Result<(cpal::StreamConfig, SampleFormat)> {
    let default_config =
        device
            .default_output_config()
            .map_err(|e| PromtuneError::AudioOutput {
                message: format!("Failed to query default output config: {}", e),
            })?;

    eprintln!(
        "promtune: using native audio format ({}ch/{}Hz/{:?}), resampling in software",
        default_config.channels(),
        default_config.sample_rate(),
        default_config.sample_format(),
    );

    let sample_format = default_config.sample_format();
    Ok((default_config.into(), sample_format))
}

/// Fill an interleaved device buffer from `source`.
///
/// Stereo frames go to the first two channels (other channels stay silent);
/// mono devices get the channel average. Frames the source does not supply
/// are silence.
pub(crate) fn render<S, T>(source: &mut S, frames: &mut Vec<Frame>, out: &mut [T], channels: usize)
where
    S: AudioSource + ?Sized,
    T: SizedSample + FromSample<f32>,
{
    let channels = channels.max(1);
    let count = out.len() / channels;
    frames.clear();
    frames.resize(count, SILENCE);

    let (produced, _) = source.produce(&mut frames[..]);
    frames[produced.min(count)..].fill(SILENCE);

    for (frame, slot) in frames.iter().zip(out.chunks_exact_mut(channels)) {
        let left = frame[0].clamp(-1.0, 1.0);
        let right = frame[1].clamp(-1.0, 1.0);
        if channels == 1 {
            slot[0] = T::from_sample((left + right) * 0.5);
        } else {
            slot[0] = T::from_sample(left);
            slot[1] = T::from_sample(right);
            for extra in &mut slot[2..] {
                *extra = T::from_sample(0.0f32);
            }
        }
    }
}
