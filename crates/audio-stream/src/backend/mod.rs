//! Audio backend abstraction.
//!
//! The streaming core talks to the playback device only through [`AudioBackend`].
//! The model follows OpenAL: *buffers* hold uploaded PCM, *voices* play either a
//! queue of buffers or one static buffer.
//!
//! Queue semantics every implementation must honour:
//! - a buffer becomes *processed* once the voice has played past it
//! - `stop` marks every queued buffer processed
//! - `play` on a stopped or initial voice rewinds to the first queued buffer
//! - a voice that plays past its last queued buffer becomes [`VoiceState::Stopped`]

pub mod software;

use audio_stream_types::{SoundFormat, Vec3};

use crate::error::BackendError;

pub use software::SoftwareBackend;

/// Backend buffer object handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u32);

/// Backend voice (playback source) handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoiceId(pub u32);

/// Playback state reported by a voice.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoiceState {
    /// Created but never started.
    Initial,
    Playing,
    Paused,
    Stopped,
}

/// Capability surface the streaming core requires from an audio backend.
///
/// Implementations use interior mutability: the refill task and caller threads
/// share one backend through an `Arc`.
pub trait AudioBackend: Send + Sync {
    /// Allocate an empty buffer object.
    fn create_buffer(&self) -> Result<BufferId, BackendError>;

    /// Release a buffer object. Unknown ids are ignored.
    fn delete_buffer(&self, buffer: BufferId);

    /// Replace a buffer's contents with `data` in the given format and rate.
    fn upload(
        &self,
        buffer: BufferId,
        format: SoundFormat,
        data: &[u8],
        sample_rate: u32,
    ) -> Result<(), BackendError>;

    /// Allocate a voice in the [`VoiceState::Initial`] state.
    fn create_voice(&self) -> Result<VoiceId, BackendError>;

    /// Stop and release a voice. Unknown ids are ignored.
    fn delete_voice(&self, voice: VoiceId);

    /// Bind one static buffer to a voice, replacing any queue.
    fn bind_static(&self, voice: VoiceId, buffer: BufferId) -> Result<(), BackendError>;

    /// Append a buffer to the voice's play queue.
    fn queue_buffer(&self, voice: VoiceId, buffer: BufferId) -> Result<(), BackendError>;

    /// Remove the oldest processed buffer from the queue, if any.
    fn unqueue_processed(&self, voice: VoiceId) -> Result<Option<BufferId>, BackendError>;

    /// Number of queued buffers the voice has finished playing.
    fn processed_count(&self, voice: VoiceId) -> Result<usize, BackendError>;

    fn play(&self, voice: VoiceId) -> Result<(), BackendError>;

    /// Halt a playing voice without discarding its queue position.
    fn pause(&self, voice: VoiceId) -> Result<(), BackendError>;

    fn stop(&self, voice: VoiceId) -> Result<(), BackendError>;

    fn state(&self, voice: VoiceId) -> Result<VoiceState, BackendError>;

    /// Whether a voice with a static buffer restarts it at the end.
    fn set_looping(&self, voice: VoiceId, looping: bool) -> Result<(), BackendError>;

    fn set_gain(&self, voice: VoiceId, gain: f32) -> Result<(), BackendError>;

    fn set_position(&self, voice: VoiceId, position: Vec3) -> Result<(), BackendError>;

    fn set_velocity(&self, voice: VoiceId, velocity: Vec3) -> Result<(), BackendError>;
}
