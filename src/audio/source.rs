use crate::error::PromtuneError;

/// One interleaved stereo frame, amplitudes in `[-1.0, 1.0]`.
pub type Frame = [f32; 2];

/// Zero amplitude on both channels.
pub const SILENCE: Frame = [0.0, 0.0];

/// Trait for pull-based audio sources.
///
/// The output driver (or an outer source such as the stream queue) calls
/// `produce` repeatedly; the source fills as much of the buffer as it can.
pub trait AudioSource: Send {
    /// Fill `buf` from the front.
    ///
    /// # Returns
    /// `(count, more)`: the number of frames written to `buf[..count]`, and
    /// `false` once the source is exhausted and must not be pulled again.
    fn produce(&mut self, buf: &mut [Frame]) -> (usize, bool);

    /// Error the source hit while producing, if any.
    fn error(&self) -> Option<&PromtuneError> {
        None
    }
}

impl<S: AudioSource + ?Sized> AudioSource for Box<S> {
    fn produce(&mut self, buf: &mut [Frame]) -> (usize, bool) {
        (**self).produce(buf)
    }

    fn error(&self) -> Option<&PromtuneError> {
        (**self).error()
    }
}

/// Mock audio source for testing
#[derive(Debug)]
pub struct MockAudioSource {
    frames: Vec<Frame>,
    position: usize,
    max_per_pull: usize,
    error: Option<PromtuneError>,
}

impl MockAudioSource {
    /// Create a mock source that yields the given frames
    pub fn new(frames: Vec<Frame>) -> Self {
        Self {
            frames,
            position: 0,
            max_per_pull: usize::MAX,
            error: None,
        }
    }

    /// Create a mock source from mono amplitudes (duplicated to both channels)
    pub fn mono(values: &[f32]) -> Self {
        Self::new(values.iter().map(|&v| [v, v]).collect())
    }

    /// Limit how many frames a single `produce` call returns
    pub fn with_max_per_pull(mut self, max: usize) -> Self {
        self.max_per_pull = max.max(1);
        self
    }

    /// Configure the mock to report an error
    pub fn with_error(mut self, message: &str) -> Self {
        self.error = Some(PromtuneError::Other(message.to_string()));
        self
    }

    /// Frames not yet produced
    pub fn remaining(&self) -> usize {
        self.frames.len() - self.position
    }
}

impl AudioSource for MockAudioSource {
    fn produce(&mut self, buf: &mut [Frame]) -> (usize, bool) {
        let n = buf.len().min(self.remaining()).min(self.max_per_pull);
        buf[..n].copy_from_slice(&self.frames[self.position..self.position + n]);
        self.position += n;
        (n, self.remaining() > 0)
    }

    fn error(&self) -> Option<&PromtuneError> {
        self.error.as_ref()
    }
}
