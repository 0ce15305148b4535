//! Fixture builders shared by unit tests.

use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;

use audio_stream_types::SoundFormat;
use tempfile::TempDir;

use crate::backend::SoftwareBackend;
use crate::config::StreamerConfig;
use crate::wav::WavDecoder;

/// 16-byte PCM `fmt ` body with a block align derived from the layout.
pub fn fmt_body(format_id: u16, channels: u16, sample_rate: u32, bits: u16) -> Vec<u8> {
    let block_align = channels * bits / 8;
    let mut body = Vec::with_capacity(16);
    body.extend_from_slice(&format_id.to_le_bytes());
    body.extend_from_slice(&channels.to_le_bytes());
    body.extend_from_slice(&sample_rate.to_le_bytes());
    body.extend_from_slice(&(sample_rate * u32::from(block_align)).to_le_bytes());
    body.extend_from_slice(&block_align.to_le_bytes());
    body.extend_from_slice(&bits.to_le_bytes());
    body
}

/// Assemble a RIFF/WAVE file from raw chunks, padding odd bodies.
pub fn riff(chunks: &[(&[u8; 4], &[u8])]) -> Vec<u8> {
    let mut body = b"WAVE".to_vec();
    for (id, data) in chunks {
        body.extend_from_slice(*id);
        body.extend_from_slice(&(data.len() as u32).to_le_bytes());
        body.extend_from_slice(data);
        if data.len() % 2 == 1 {
            body.push(0);
        }
    }
    let mut out = b"RIFF".to_vec();
    out.extend_from_slice(&(body.len() as u32).to_le_bytes());
    out.extend_from_slice(&body);
    out
}

/// Canonical 44-byte-header WAV holding `pcm` in `format`.
pub fn pcm_wav(format: SoundFormat, sample_rate: u32, pcm: &[u8]) -> Vec<u8> {
    let bits = (format.bytes_per_sample() * 8) as u16;
    let fmt = fmt_body(1, format.channels() as u16, sample_rate, bits);
    riff(&[(b"fmt ", fmt.as_slice()), (b"data", pcm)])
}

/// 16-bit PCM where sample `i` holds `i` (wrapping), `frames × channels` samples.
pub fn ramp16(frames: usize, channels: usize) -> Vec<u8> {
    (0..frames * channels)
        .flat_map(|i| (i as i16).to_le_bytes())
        .collect()
}

/// WAV bytes written by `hound`, `frames` frames of a sawtooth.
pub fn hound_wav(spec: hound::WavSpec, frames: usize) -> Vec<u8> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for i in 0..frames {
            for _ in 0..spec.channels {
                match spec.bits_per_sample {
                    8 => writer.write_sample((i % 256) as u8 as i8).unwrap(),
                    _ => writer.write_sample((i as i16).wrapping_mul(64)).unwrap(),
                }
            }
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

/// Parse in-memory WAV bytes.
pub fn wav_source(bytes: Vec<u8>) -> WavDecoder {
    WavDecoder::from_media_source(Box::new(Cursor::new(bytes))).unwrap()
}

pub fn write_temp(dir: &TempDir, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

/// Small pool with fast polls so background tasks react within a few milliseconds.
pub fn fast_config(slot_count: usize, slot_bytes: usize) -> StreamerConfig {
    StreamerConfig {
        slot_count,
        slot_bytes,
        idle_poll_ms: 1,
        backpressure_poll_ms: 2,
    }
}

pub fn software_backend() -> Arc<SoftwareBackend> {
    Arc::new(SoftwareBackend::new())
}

/// Poll `cond` until it holds or two seconds pass.
pub fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(2);
    while std::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(std::time::Duration::from_millis(1));
    }
    cond()
}
