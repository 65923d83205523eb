//! Audio path: chunk encoding, decoding, resampling and the playback queue.

pub mod encoder;
#[cfg(feature = "cpal-audio")]
pub mod output;
pub mod queue;
pub mod resample;
pub mod source;
pub mod wav;

pub use encoder::{PcmFormat, SampleChunk, encode_chunk};
pub use queue::{Drained, QueueHandle, QueueStats, StreamQueue, stream_queue};
pub use resample::Resampler;
pub use source::{AudioSource, Frame, MockAudioSource, SILENCE};
pub use wav::WavSource;
