use serde::{Deserialize, Serialize};

/// PCM sample layout carried by a decoded stream.
///
/// Only 8-bit unsigned and 16-bit signed little-endian samples are supported,
/// in mono or interleaved stereo.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SoundFormat {
    Mono8,
    Mono16,
    Stereo8,
    Stereo16,
}

impl SoundFormat {
    /// Resolve a format from a `(channels, bits_per_sample)` pair.
    ///
    /// Returns `None` for layouts outside 1–2 channels × 8/16 bits.
    pub fn from_layout(channels: u16, bits_per_sample: u16) -> Option<Self> {
        match (channels, bits_per_sample) {
            (1, 8) => Some(Self::Mono8),
            (1, 16) => Some(Self::Mono16),
            (2, 8) => Some(Self::Stereo8),
            (2, 16) => Some(Self::Stereo16),
            _ => None,
        }
    }

    /// Number of interleaved channels.
    pub fn channels(self) -> usize {
        match self {
            Self::Mono8 | Self::Mono16 => 1,
            Self::Stereo8 | Self::Stereo16 => 2,
        }
    }

    /// Bytes used by a single sample of one channel.
    pub fn bytes_per_sample(self) -> usize {
        match self {
            Self::Mono8 | Self::Stereo8 => 1,
            Self::Mono16 | Self::Stereo16 => 2,
        }
    }

    /// Bytes used by one frame (one sample per channel).
    pub fn bytes_per_frame(self) -> usize {
        self.channels() * self.bytes_per_sample()
    }
}

/// How a sound source keeps its PCM data resident.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LoadMode {
    /// A fixed pool of small buffers refilled by a background task.
    #[default]
    Streaming,
    /// The whole loop region decoded once into a single buffer.
    ///
    /// Required for overlapping one-shot copy playback.
    #[serde(alias = "all_read")]
    Preload,
}

/// 3-D vector used for listener-relative position and velocity.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

impl From<[f32; 3]> for Vec3 {
    fn from([x, y, z]: [f32; 3]) -> Self {
        Self { x, y, z }
    }
}

/// Point-in-time view of one sound source's mirrored playback state.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct SourceStatus {
    /// Load mode the source was created with.
    pub mode: LoadMode,
    /// `true` while the source is playing (paused and stopped report `false`).
    pub playing: bool,
    /// Whether playback wraps to the loop start at the end of the loop region.
    pub looping: bool,
    /// Last gain applied through `set_volume`.
    pub volume: f32,
    /// Last position applied through `set_position`.
    pub position: Vec3,
    /// Last velocity applied through `set_velocity`.
    pub velocity: Vec3,
    /// Current decoder cursor in frames.
    pub pcm_offset: u64,
    /// Number of live one-shot copy voices.
    pub copy_voices: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_layout_maps_supported_layouts() {
        assert_eq!(SoundFormat::from_layout(1, 8), Some(SoundFormat::Mono8));
        assert_eq!(SoundFormat::from_layout(2, 16), Some(SoundFormat::Stereo16));
        assert_eq!(SoundFormat::from_layout(2, 24), None);
        assert_eq!(SoundFormat::from_layout(6, 16), None);
    }

    #[test]
    fn bytes_per_frame_matches_layout() {
        assert_eq!(SoundFormat::Mono8.bytes_per_frame(), 1);
        assert_eq!(SoundFormat::Mono16.bytes_per_frame(), 2);
        assert_eq!(SoundFormat::Stereo8.bytes_per_frame(), 2);
        assert_eq!(SoundFormat::Stereo16.bytes_per_frame(), 4);
    }

    #[test]
    fn load_mode_accepts_legacy_all_read_name() {
        let mode: LoadMode = serde_json::from_str("\"all_read\"").unwrap();
        assert_eq!(mode, LoadMode::Preload);
        let mode: LoadMode = serde_json::from_str("\"streaming\"").unwrap();
        assert_eq!(mode, LoadMode::Streaming);
    }
}
