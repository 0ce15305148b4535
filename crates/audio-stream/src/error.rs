//! Error types for the streaming engine.

use thiserror::Error;

use crate::backend::{BufferId, VoiceId};

/// Failures while opening or parsing a PCM container.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not a RIFF/WAVE container")]
    NotRiffWave,

    #[error("fmt chunk too short: {0} bytes")]
    MalformedFmtChunk(u32),

    #[error("unsupported format id {0} (only linear PCM is supported)")]
    UnsupportedFormatId(u16),

    #[error("unsupported layout: {channels} channel(s), {bits_per_sample} bits per sample")]
    UnsupportedLayout { channels: u16, bits_per_sample: u16 },

    #[error("invalid block size {block_size} for {channels} channel(s) × {bits_per_sample} bits")]
    InvalidBlockSize {
        block_size: u16,
        channels: u16,
        bits_per_sample: u16,
    },

    #[error("expected exactly one fmt and one data chunk, found {fmt} fmt and {data} data")]
    ChunkCount { fmt: usize, data: usize },

    #[error("unsupported container: {0}")]
    UnsupportedContainer(String),
}

/// Failures reported by an [`AudioBackend`](crate::backend::AudioBackend).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("unknown buffer {0:?}")]
    UnknownBuffer(BufferId),

    #[error("unknown voice {0:?}")]
    UnknownVoice(VoiceId),

    #[error("voice {0:?} has a static buffer bound; queueing is not allowed")]
    StaticVoice(VoiceId),

    #[error("upload of {len} bytes is not a whole number of {block_size}-byte frames")]
    UnalignedData { len: usize, block_size: usize },
}

/// Top-level error for sound sources and the registry.
#[derive(Debug, Error)]
pub enum SoundError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("sound source {0:?} already exists")]
    DuplicateSource(String),

    #[error("copy playback requires a preloaded source")]
    CopyRequiresPreload,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
