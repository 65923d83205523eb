//! Streaming sample-rate conversion.
//!
//! Polynomial (Lagrange) interpolation over `2 * quality` neighbouring input
//! frames. Quality 1 is plain linear interpolation; positions outside the
//! input are treated as silence.

use crate::audio::source::{AudioSource, Frame, SILENCE};
use crate::defaults::MAX_RESAMPLE_QUALITY;
use crate::error::{PromtuneError, Result};
use std::collections::VecDeque;

/// Input frames pulled from the wrapped source per refill.
const PULL_FRAMES: usize = 512;

/// Audio source adapter converting `from_rate` to `to_rate`.
pub struct Resampler<S: AudioSource> {
    source: S,
    quality: usize,
    /// Input frames advanced per output frame (`from_rate / to_rate`).
    ratio: f64,
    passthrough: bool,
    /// Input frames starting at absolute index `base`.
    history: VecDeque<Frame>,
    base: u64,
    input_done: bool,
    output_pos: u64,
    scratch: Vec<Frame>,
}

impl<S: AudioSource> Resampler<S> {
    /// Wrap `source`, converting from `from_rate` to `to_rate`.
    ///
    /// # Errors
    /// Returns `ConfigInvalidValue` if either rate is zero or `quality` is
    /// outside `1..=MAX_RESAMPLE_QUALITY`.
    pub fn new(quality: usize, from_rate: u32, to_rate: u32, source: S) -> Result<Self> {
        if !(1..=MAX_RESAMPLE_QUALITY).contains(&quality) {
            return Err(PromtuneError::ConfigInvalidValue {
                key: "audio.resample_quality".to_string(),
                message: format!("must be in 1..={}, got {}", MAX_RESAMPLE_QUALITY, quality),
            });
        }
        if from_rate == 0 || to_rate == 0 {
            return Err(PromtuneError::ConfigInvalidValue {
                key: "audio.sample_rate".to_string(),
                message: format!("cannot resample {} Hz to {} Hz", from_rate, to_rate),
            });
        }

        Ok(Self {
            source,
            quality,
            ratio: from_rate as f64 / to_rate as f64,
            passthrough: from_rate == to_rate,
            history: VecDeque::new(),
            base: 0,
            input_done: false,
            output_pos: 0,
            scratch: vec![SILENCE; PULL_FRAMES],
        })
    }

    /// Input frames seen so far (exclusive upper index).
    fn input_end(&self) -> u64 {
        self.base + self.history.len() as u64
    }

    /// Pull input until index `upto` is buffered or the source is exhausted.
    ///
    /// Returns false if the source stalled (produced nothing but is not done).
    fn fill_until(&mut self, upto: u64) -> bool {
        while !self.input_done && self.input_end() <= upto {
            let (n, more) = self.source.produce(&mut self.scratch);
            self.history.extend(self.scratch[..n].iter().copied());
            if !more {
                self.input_done = true;
            } else if n == 0 {
                return false;
            }
        }
        true
    }

    fn input_at(&self, index: i64) -> Frame {
        if index < self.base as i64 {
            return SILENCE;
        }
        self.history
            .get((index - self.base as i64) as usize)
            .copied()
            .unwrap_or(SILENCE)
    }

    fn interpolate(&self, x: f64, j: i64) -> Frame {
        let q = self.quality as i64;
        let lo = j - q + 1;
        let hi = j + q;

        let mut out = [0.0f64; 2];
        for k in lo..=hi {
            let mut weight = 1.0;
            for m in lo..=hi {
                if m != k {
                    weight *= (x - m as f64) / (k - m) as f64;
                }
            }
            let frame = self.input_at(k);
            out[0] += weight * frame[0] as f64;
            out[1] += weight * frame[1] as f64;
        }
        [out[0] as f32, out[1] as f32]
    }
}

impl<S: AudioSource> AudioSource for Resampler<S> {
    fn produce(&mut self, buf: &mut [Frame]) -> (usize, bool) {
        if self.passthrough {
            return self.source.produce(buf);
        }

        let q = self.quality as i64;
        for (i, slot) in buf.iter_mut().enumerate() {
            let x = self.output_pos as f64 * self.ratio;
            let j = x.floor() as i64;

            if !self.fill_until((j + q) as u64) {
                return (i, true);
            }
            if self.input_done && j as u64 >= self.input_end() {
                return (i, false);
            }

            // Frames left of the window are never needed again
            let keep_from = (j - q + 1).max(0) as u64;
            while self.base < keep_from && !self.history.is_empty() {
                self.history.pop_front();
                self.base += 1;
            }

            *slot = self.interpolate(x, j);
            self.output_pos += 1;
        }

        (buf.len(), true)
    }

    fn error(&self) -> Option<&PromtuneError> {
        self.source.error()
    }
}
