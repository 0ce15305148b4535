//! PCM source abstraction and decoder factory.
//!
//! A [`PcmSource`] exposes raw, block-aligned PCM with a frame cursor bounded by a
//! loop region. [`open_source`] picks the decoder from the file extension:
//! - `.wav` → [`WavDecoder`]
//! - `.ogg` → recognised, but reported as unsupported
//! - anything else → unsupported

use std::path::Path;

use audio_stream_types::SoundFormat;

use crate::error::DecodeError;
use crate::wav::WavDecoder;

/// Facts about a decoded stream, fixed once the container has been parsed.
///
/// Offsets and lengths named `*_frames`/`loop_*` are in frames; one frame is
/// `block_size` bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamDescriptor {
    /// Size of the PCM payload in bytes.
    pub pcm_size_bytes: u64,
    /// First frame of the loop region.
    pub loop_start: u64,
    /// Length of the loop region in frames.
    pub loop_length: u64,
    pub format: SoundFormat,
    pub sample_rate: u32,
    /// Bytes per frame (1 for 8-bit mono up to 4 for 16-bit stereo).
    pub block_size: usize,
    /// Container-relative byte offset of the first PCM byte.
    pub data_start_offset: u64,
}

impl StreamDescriptor {
    /// Frame one past the end of the loop region.
    pub fn loop_end(&self) -> u64 {
        self.loop_start + self.loop_length
    }

    /// Whole frames present in the PCM payload.
    pub fn total_frames(&self) -> u64 {
        self.pcm_size_bytes / self.block_size as u64
    }
}

/// Random-access PCM reader with a loop-bounded frame cursor.
///
/// Invariant: `0 <= pcm_offset() <= descriptor().loop_end()`.
pub trait PcmSource: Send {
    fn descriptor(&self) -> &StreamDescriptor;

    /// Read up to `buf.len()` bytes of PCM at the cursor.
    ///
    /// Returns 0 without moving the cursor when `buf.len()` is not a multiple of the
    /// block size. Never reads past the loop end. The returned length is always a
    /// whole number of frames and the cursor advances by exactly that many frames.
    fn read(&mut self, buf: &mut [u8]) -> usize;

    /// Move the cursor to `frame`, clamped to the loop end.
    fn seek(&mut self, frame: u64);

    /// Current cursor in frames.
    fn pcm_offset(&self) -> u64;

    /// Narrow the loop region. Values are clamped to the PCM payload.
    fn set_loop_region(&mut self, start: u64, length: u64);

    fn loop_start(&self) -> u64 {
        self.descriptor().loop_start
    }

    fn loop_length(&self) -> u64 {
        self.descriptor().loop_length
    }

    fn loop_end(&self) -> u64 {
        self.descriptor().loop_end()
    }

    fn block_size(&self) -> usize {
        self.descriptor().block_size
    }

    fn format(&self) -> SoundFormat {
        self.descriptor().format
    }

    fn sample_rate(&self) -> u32 {
        self.descriptor().sample_rate
    }
}

/// Container formats recognised by file extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContainerKind {
    Wav,
    Ogg,
}

impl ContainerKind {
    /// Case-insensitive extension lookup.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "wav" | "wave" => Some(Self::Wav),
            "ogg" => Some(Self::Ogg),
            _ => None,
        }
    }
}

/// Open a PCM source for `path`, choosing the decoder by extension.
pub fn open_source(path: &Path) -> Result<Box<dyn PcmSource>, DecodeError> {
    match ContainerKind::from_path(path) {
        Some(ContainerKind::Wav) => Ok(Box::new(WavDecoder::open(path)?)),
        Some(ContainerKind::Ogg) => Err(DecodeError::UnsupportedContainer(
            "ogg/vorbis decoding is not available".to_string(),
        )),
        None => Err(DecodeError::UnsupportedContainer(format!(
            "unrecognised extension: {}",
            path.display()
        ))),
    }
}

/// Read from `source` until `out` is full or the loop end is reached.
///
/// Returns the number of bytes written to the front of `out`.
pub fn read_full(source: &mut dyn PcmSource, out: &mut [u8]) -> usize {
    let mut filled = 0;
    while filled < out.len() {
        let n = source.read(&mut out[filled..]);
        if n == 0 {
            break;
        }
        filled += n;
    }
    filled
}
