use audio_stream_types::{LoadMode, SourceStatus, Vec3};

/// Mirrored playback state of one sound source.
///
/// Guarded by the source's mutex together with its buffer streamer; the background
/// task reads the flags to decide whether to refill, and control calls update them.
#[derive(Clone, Debug, PartialEq)]
pub struct PlaybackState {
    /// Playback requested and not yet stopped or paused.
    pub is_playing: bool,
    /// Wrap to the loop start instead of stopping at the loop end.
    pub is_looping: bool,
    /// Set once during shutdown; the background task exits when it sees it.
    pub is_ended: bool,
    /// Last gain applied to the voice.
    pub volume: f32,
    /// Last position applied to the voice.
    pub position: Vec3,
    /// Last velocity applied to the voice.
    pub velocity: Vec3,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            is_playing: false,
            is_looping: false,
            is_ended: false,
            volume: 1.0,
            position: Vec3::ZERO,
            velocity: Vec3::ZERO,
        }
    }
}

impl PlaybackState {
    /// Return a snapshot suitable for diagnostics.
    pub fn snapshot(&self, mode: LoadMode, pcm_offset: u64, copy_voices: usize) -> SourceStatus {
        SourceStatus {
            mode,
            playing: self.is_playing,
            looping: self.is_looping,
            volume: self.volume,
            position: self.position,
            velocity: self.velocity,
            pcm_offset,
            copy_voices,
        }
    }

    /// Whether the background task should keep feeding the voice.
    pub fn wants_audio(&self) -> bool {
        self.is_playing && !self.is_ended
    }
}
