//! Encode metric samples into an in-memory WAV container.

use crate::defaults;
use crate::error::{PromtuneError, Result};
use std::io::Cursor;

/// PCM layout shared by every chunk of a playback session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

impl Default for PcmFormat {
    fn default() -> Self {
        Self {
            sample_rate: defaults::SAMPLE_RATE,
            channels: defaults::CHANNELS,
            bits_per_sample: defaults::BITS_PER_SAMPLE,
        }
    }
}

impl PcmFormat {
    /// Check the layout is one the encoder can write.
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(PromtuneError::ConfigInvalidValue {
                key: "audio.sample_rate".to_string(),
                message: "must be positive".to_string(),
            });
        }
        if !(1..=2).contains(&self.channels) {
            return Err(PromtuneError::ConfigInvalidValue {
                key: "audio.channels".to_string(),
                message: format!("must be 1 or 2, got {}", self.channels),
            });
        }
        if self.bits_per_sample != 8 && self.bits_per_sample != 16 {
            return Err(PromtuneError::ConfigInvalidValue {
                key: "audio.bits_per_sample".to_string(),
                message: format!("must be 8 or 16, got {}", self.bits_per_sample),
            });
        }
        Ok(())
    }

    fn wav_spec(&self) -> hound::WavSpec {
        hound::WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: self.bits_per_sample,
            sample_format: hound::SampleFormat::Int,
        }
    }
}

/// Integer amplitudes for one window, one per data point.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SampleChunk {
    amplitudes: Vec<i64>,
}

impl SampleChunk {
    pub fn new() -> Self {
        Self::default()
    }

    /// Truncate each metric value toward zero.
    ///
    /// Values outside the `i64` range saturate; NaN becomes 0.
    pub fn from_values<I: IntoIterator<Item = f64>>(values: I) -> Self {
        Self {
            amplitudes: values.into_iter().map(|v| v as i64).collect(),
        }
    }

    pub fn push(&mut self, value: f64) {
        self.amplitudes.push(value as i64);
    }

    pub fn extend<I: IntoIterator<Item = f64>>(&mut self, values: I) {
        self.amplitudes.extend(values.into_iter().map(|v| v as i64));
    }

    pub fn amplitudes(&self) -> &[i64] {
        &self.amplitudes
    }

    pub fn len(&self) -> usize {
        self.amplitudes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.amplitudes.is_empty()
    }
}

/// Encode a chunk as a WAV container.
///
/// Amplitudes are narrowed to the bit depth by wrapping, so for 8-bit output
/// an amplitude `v` lands in the data chunk as the unsigned byte `v as u8`
/// (128 is the zero line). Mono amplitudes are written to every channel.
pub fn encode_chunk(chunk: &SampleChunk, format: &PcmFormat) -> Result<Vec<u8>> {
    format.validate()?;

    let mut cursor = Cursor::new(Vec::new());
    let mut writer =
        hound::WavWriter::new(&mut cursor, format.wav_spec()).map_err(|e| PromtuneError::Encode {
            message: format!("Failed to write WAV header: {}", e),
        })?;

    for &amp in chunk.amplitudes() {
        for _ in 0..format.channels {
            let written = if format.bits_per_sample == 8 {
                writer.write_sample(unsigned_byte_as_i8(amp as u8))
            } else {
                writer.write_sample(amp as i16)
            };
            written.map_err(|e| PromtuneError::Encode {
                message: format!("Failed to write sample: {}", e),
            })?;
        }
    }

    writer.finalize().map_err(|e| PromtuneError::Encode {
        message: format!("Failed to finalize WAV: {}", e),
    })?;

    Ok(cursor.into_inner())
}

/// hound stores 8-bit samples offset by 128; undo that so `byte` is what lands on disk.
fn unsigned_byte_as_i8(byte: u8) -> i8 {
    (byte as i16 - 128) as i8
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER_LEN: usize = 44;

    #[test]
    fn from_values_truncates_toward_zero() {
        let chunk = SampleChunk::from_values([1.9, -1.9, 200.5, 0.0]);
        assert_eq!(chunk.amplitudes(), &[1, -1, 200, 0]);
    }

    #[test]
    fn from_values_handles_non_finite() {
        let chunk = SampleChunk::from_values([f64::NAN, f64::INFINITY, f64::NEG_INFINITY]);
        assert_eq!(chunk.amplitudes(), &[0, i64::MAX, i64::MIN]);
    }

    #[test]
    fn empty_chunk_reports_empty() {
        let mut chunk = SampleChunk::new();
        assert!(chunk.is_empty());
        chunk.push(3.0);
        chunk.extend([4.0, 5.0]);
        assert_eq!(chunk.len(), 3);
    }

    #[test]
    fn eight_bit_mono_is_byte_exact() {
        let chunk = SampleChunk::from_values([0.0, 128.0, 255.0, 256.0, 300.0, -1.0]);
        let bytes = encode_chunk(&chunk, &PcmFormat::default()).unwrap();

        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
        assert_eq!(bytes.len(), HEADER_LEN + 6);
        assert_eq!(&bytes[HEADER_LEN..], &[0, 128, 255, 0, 44, 255]);
    }

    #[test]
    fn header_carries_session_format() {
        let format = PcmFormat {
            sample_rate: 22050,
            channels: 2,
            bits_per_sample: 16,
        };
        let bytes = encode_chunk(&SampleChunk::from_values([1.0]), &format).unwrap();
        let reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
        let spec = reader.spec();

        assert_eq!(spec.sample_rate, 22050);
        assert_eq!(spec.channels, 2);
        assert_eq!(spec.bits_per_sample, 16);
    }

    #[test]
    fn stereo_duplicates_each_value() {
        let format = PcmFormat {
            channels: 2,
            bits_per_sample: 16,
            ..PcmFormat::default()
        };
        let chunk = SampleChunk::from_values([1000.0, -2000.0]);
        let bytes = encode_chunk(&chunk, &format).unwrap();
        let mut reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();

        assert_eq!(samples, vec![1000, 1000, -2000, -2000]);
    }

    #[test]
    fn sixteen_bit_wraps_out_of_range_values() {
        let format = PcmFormat {
            bits_per_sample: 16,
            ..PcmFormat::default()
        };
        let chunk = SampleChunk::from_values([65536.0 + 5.0]);
        let bytes = encode_chunk(&chunk, &format).unwrap();
        let mut reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();

        assert_eq!(samples, vec![5]);
    }

    #[test]
    fn validate_rejects_unsupported_layouts() {
        let bad_bits = PcmFormat {
            bits_per_sample: 24,
            ..PcmFormat::default()
        };
        assert!(bad_bits.validate().is_err());

        let bad_channels = PcmFormat {
            channels: 3,
            ..PcmFormat::default()
        };
        assert!(bad_channels.validate().is_err());

        let bad_rate = PcmFormat {
            sample_rate: 0,
            ..PcmFormat::default()
        };
        assert!(bad_rate.validate().is_err());

        assert!(PcmFormat::default().validate().is_ok());
    }
}
