//! RIFF/WAVE container decoder.
//!
//! Walks the chunk list once at load time, then serves raw PCM straight from the
//! `data` chunk. The file is read through Symphonia's [`MediaSourceStream`] so local
//! files and in-memory buffers share one code path.

use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::Path;

use audio_stream_types::SoundFormat;
use symphonia::core::io::{MediaSource, MediaSourceStream, ReadBytes};

use crate::decode::{PcmSource, StreamDescriptor};
use crate::error::DecodeError;

const FORMAT_PCM: u16 = 1;
const FMT_MIN_LEN: u32 = 16;

/// Fields of the `fmt ` chunk the decoder needs.
#[derive(Clone, Copy, Debug)]
struct FmtChunk {
    channels: u16,
    sample_rate: u32,
    block_size: u16,
    bits_per_sample: u16,
}

/// WAV decoder serving block-aligned reads from a loop region.
pub struct WavDecoder {
    descriptor: StreamDescriptor,
    reader: MediaSourceStream,
    pcm_offset: u64,
}

impl WavDecoder {
    /// Open and parse a WAV file.
    pub fn open(path: &Path) -> Result<Self, DecodeError> {
        let file = File::open(path)?;
        let decoder = Self::from_media_source(Box::new(file))?;
        tracing::debug!(
            path = %path.display(),
            format = ?decoder.descriptor.format,
            sample_rate = decoder.descriptor.sample_rate,
            frames = decoder.descriptor.loop_length,
            "wav loaded"
        );
        Ok(decoder)
    }

    /// Parse a WAV container from any seekable media source.
    pub fn from_media_source(source: Box<dyn MediaSource>) -> Result<Self, DecodeError> {
        let byte_len = source.byte_len();
        let mut reader = MediaSourceStream::new(source, Default::default());

        let (fmt, data_start, declared_size) = walk_chunks(&mut reader)?;

        let format = SoundFormat::from_layout(fmt.channels, fmt.bits_per_sample).ok_or(
            DecodeError::UnsupportedLayout {
                channels: fmt.channels,
                bits_per_sample: fmt.bits_per_sample,
            },
        )?;
        if usize::from(fmt.block_size) != format.bytes_per_frame() {
            return Err(DecodeError::InvalidBlockSize {
                block_size: fmt.block_size,
                channels: fmt.channels,
                bits_per_sample: fmt.bits_per_sample,
            });
        }

        // Streamed recorders sometimes leave a placeholder size; trust the bytes present.
        let pcm_size_bytes = match byte_len {
            Some(len) => declared_size.min(len.saturating_sub(data_start)),
            None => declared_size,
        };
        let block_size = usize::from(fmt.block_size);

        let mut decoder = Self {
            descriptor: StreamDescriptor {
                pcm_size_bytes,
                loop_start: 0,
                loop_length: pcm_size_bytes / block_size as u64,
                format,
                sample_rate: fmt.sample_rate,
                block_size,
                data_start_offset: data_start,
            },
            reader,
            pcm_offset: 0,
        };
        decoder.seek(0);
        Ok(decoder)
    }

    /// Move the file position to match `pcm_offset`.
    fn sync_file_position(&mut self) {
        let pos =
            self.descriptor.data_start_offset + self.pcm_offset * self.descriptor.block_size as u64;
        if let Err(e) = self.reader.seek(SeekFrom::Start(pos)) {
            tracing::warn!(pos, "wav seek failed: {e}");
        }
    }
}

impl PcmSource for WavDecoder {
    fn descriptor(&self) -> &StreamDescriptor {
        &self.descriptor
    }

    fn read(&mut self, buf: &mut [u8]) -> usize {
        let block = self.descriptor.block_size;
        if buf.len() % block != 0 {
            return 0;
        }
        let remaining = self.descriptor.loop_end().saturating_sub(self.pcm_offset);
        let frames = (buf.len() / block).min(usize::try_from(remaining).unwrap_or(usize::MAX));
        if frames == 0 {
            return 0;
        }

        let want = frames * block;
        let got = read_up_to(&mut self.reader, &mut buf[..want]);
        let got_frames = got / block;
        self.pcm_offset += got_frames as u64;
        if got != want {
            // Short read: drop any partial frame and resync the file position.
            self.sync_file_position();
        }
        got_frames * block
    }

    fn seek(&mut self, frame: u64) {
        self.pcm_offset = frame.min(self.descriptor.loop_end());
        self.sync_file_position();
    }

    fn pcm_offset(&self) -> u64 {
        self.pcm_offset
    }

    fn set_loop_region(&mut self, start: u64, length: u64) {
        let total = self.descriptor.total_frames();
        let start = start.min(total);
        self.descriptor.loop_start = start;
        self.descriptor.loop_length = length.min(total - start);
        if self.pcm_offset > self.descriptor.loop_end() {
            self.seek(self.descriptor.loop_end());
        }
    }
}

/// Validate the RIFF header and walk chunks until the declared RIFF size is consumed.
///
/// Returns the `fmt ` fields plus the data chunk's payload offset and declared size.
fn walk_chunks(reader: &mut MediaSourceStream) -> Result<(FmtChunk, u64, u64), DecodeError> {
    let riff = read_header_id(reader)?;
    let riff_size = reader.read_u32().map_err(|_| DecodeError::NotRiffWave)?;
    let wave = read_header_id(reader)?;
    if &riff != b"RIFF" || &wave != b"WAVE" {
        return Err(DecodeError::NotRiffWave);
    }

    let riff_end = 8 + u64::from(riff_size);
    let mut offset = 12u64;
    let mut fmt = None;
    let mut fmt_count = 0usize;
    let mut data = None;
    let mut data_count = 0usize;

    while offset < riff_end {
        let Some((id, size)) = read_chunk_header(reader)? else {
            break;
        };
        let body = offset + 8;
        match &id {
            b"fmt " => {
                fmt = Some(read_fmt(reader, size)?);
                fmt_count += 1;
            }
            b"data" => {
                data = Some((body, u64::from(size)));
                data_count += 1;
            }
            other => {
                tracing::trace!(id = %String::from_utf8_lossy(other), size, "skipping chunk");
            }
        }
        // Chunk bodies are padded to an even length.
        offset = body + u64::from(size) + u64::from(size & 1);
        reader.seek(SeekFrom::Start(offset))?;
    }

    match (fmt, data) {
        (Some(fmt), Some((start, size))) if fmt_count == 1 && data_count == 1 => {
            Ok((fmt, start, size))
        }
        _ => Err(DecodeError::ChunkCount {
            fmt: fmt_count,
            data: data_count,
        }),
    }
}

fn read_header_id(reader: &mut MediaSourceStream) -> Result<[u8; 4], DecodeError> {
    reader.read_quad_bytes().map_err(|_| DecodeError::NotRiffWave)
}

/// Read a chunk header, or `None` once the stream is exhausted.
fn read_chunk_header(reader: &mut MediaSourceStream) -> Result<Option<([u8; 4], u32)>, DecodeError> {
    let id = match reader.read_quad_bytes() {
        Ok(id) => id,
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    match reader.read_u32() {
        Ok(size) => Ok(Some((id, size))),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn read_fmt(reader: &mut MediaSourceStream, size: u32) -> Result<FmtChunk, DecodeError> {
    if size < FMT_MIN_LEN {
        return Err(DecodeError::MalformedFmtChunk(size));
    }
    let format_id = reader.read_u16()?;
    if format_id != FORMAT_PCM {
        return Err(DecodeError::UnsupportedFormatId(format_id));
    }
    let channels = reader.read_u16()?;
    let sample_rate = reader.read_u32()?;
    let _bytes_per_sec = reader.read_u32()?;
    let block_size = reader.read_u16()?;
    let bits_per_sample = reader.read_u16()?;
    Ok(FmtChunk {
        channels,
        sample_rate,
        block_size,
        bits_per_sample,
    })
}

/// Fill `buf` from `reader`, stopping early at end of stream or on error.
fn read_up_to(reader: &mut MediaSourceStream, buf: &mut [u8]) -> usize {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                tracing::warn!("wav read failed: {e}");
                break;
            }
        }
    }
    filled
}
