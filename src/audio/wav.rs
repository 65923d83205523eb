//! WAV container audio source.

use crate::audio::encoder::PcmFormat;
use crate::audio::source::{AudioSource, Frame};
use crate::error::{PromtuneError, Result};
use std::io::{Cursor, Read};

/// Audio source that plays back decoded WAV data.
///
/// Integer samples are normalized to `[-1.0, 1.0)`; mono input is
/// duplicated to both output channels.
pub struct WavSource {
    frames: Vec<Frame>,
    position: usize,
}

impl WavSource {
    /// Decode an in-memory WAV container.
    pub fn decode(bytes: Vec<u8>) -> Result<(Self, PcmFormat)> {
        Self::from_reader(Cursor::new(bytes))
    }

    /// Create from any reader (for testing/flexibility).
    pub fn from_reader<R: Read>(reader: R) -> Result<(Self, PcmFormat)> {
        let mut wav_reader = hound::WavReader::new(reader).map_err(|e| PromtuneError::Decode {
            message: format!("Failed to parse WAV container: {}", e),
        })?;

        let spec = wav_reader.spec();
        if spec.sample_format != hound::SampleFormat::Int {
            return Err(PromtuneError::Decode {
                message: "float WAV data is not supported".to_string(),
            });
        }
        if spec.channels == 0 {
            return Err(PromtuneError::Decode {
                message: "WAV container declares zero channels".to_string(),
            });
        }

        let normalized: Vec<f32> = match spec.bits_per_sample {
            8 => read_normalized::<i8, _>(&mut wav_reader, 128.0)?,
            16 => read_normalized::<i16, _>(&mut wav_reader, 32768.0)?,
            bits => {
                return Err(PromtuneError::Decode {
                    message: format!("unsupported bit depth: {}", bits),
                });
            }
        };

        let channels = spec.channels as usize;
        let frames = normalized
            .chunks_exact(channels)
            .map(|frame| {
                let left = frame[0];
                let right = if channels > 1 { frame[1] } else { left };
                [left, right]
            })
            .collect();

        let format = PcmFormat {
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            bits_per_sample: spec.bits_per_sample,
        };

        Ok((
            Self {
                frames,
                position: 0,
            },
            format,
        ))
    }

    /// Total number of decoded frames.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

fn read_normalized<S, R>(reader: &mut hound::WavReader<R>, scale: f32) -> Result<Vec<f32>>
where
    S: hound::Sample + Into<f32>,
    R: Read,
{
    reader
        .samples::<S>()
        .map(|s| s.map(|v| v.into() / scale))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| PromtuneError::Decode {
            message: format!("Failed to read WAV samples: {}", e),
        })
}

impl AudioSource for WavSource {
    fn produce(&mut self, buf: &mut [Frame]) -> (usize, bool) {
        let n = buf.len().min(self.frames.len() - self.position);
        buf[..n].copy_from_slice(&self.frames[self.position..self.position + n]);
        self.position += n;
        (n, self.position < self.frames.len())
    }
}
