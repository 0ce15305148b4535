//! In-process audio backend.
//!
//! Keeps buffers and voices in memory and consumes them either by wall-clock time
//! ([`SoftwareBackend::advance`]) or by rendering into an output callback
//! ([`SoftwareBackend::render`], driven by the CPAL stream in [`crate::playback`]).
//!
//! Rendering: each voice steps through its frames at
//! `buffer_rate / output_rate`, gain is applied, voices are summed and clamped.
//! Position and velocity are stored but not spatialised.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use audio_stream_types::{SoundFormat, Vec3};

use super::{AudioBackend, BufferId, VoiceId, VoiceState};
use crate::error::BackendError;

#[derive(Default)]
struct Buffer {
    format: Option<SoundFormat>,
    sample_rate: u32,
    data: Vec<u8>,
}

impl Buffer {
    fn frames(&self) -> usize {
        self.format
            .map(|f| self.data.len() / f.bytes_per_frame())
            .unwrap_or(0)
    }

    /// Sample for output channel `dst_ch` of `dst_channels`, mapped from the buffer layout.
    ///
    /// - mono → any: duplicate channel 0
    /// - stereo → mono: average L/R
    /// - stereo → stereo or wider: pass-through, extra channels reuse R
    fn sample(&self, frame: usize, dst_ch: usize, dst_channels: usize) -> f32 {
        let Some(format) = self.format else {
            return 0.0;
        };
        let frame_start = frame * format.bytes_per_frame();
        let get = |ch: usize| -> f32 {
            let at = frame_start + ch * format.bytes_per_sample();
            match format.bytes_per_sample() {
                1 => self
                    .data
                    .get(at)
                    .map(|b| (f32::from(*b) - 128.0) / 128.0)
                    .unwrap_or(0.0),
                _ => match self.data.get(at..at + 2) {
                    Some(b) => f32::from(i16::from_le_bytes([b[0], b[1]])) / 32768.0,
                    None => 0.0,
                },
            }
        };
        match (format.channels(), dst_channels) {
            (1, _) => get(0),
            (2, 1) => 0.5 * (get(0) + get(1)),
            _ => get(dst_ch.min(1)),
        }
    }
}

struct Voice {
    state: VoiceState,
    queue: VecDeque<BufferId>,
    /// Leading entries of `queue` that have been fully played.
    processed: usize,
    /// Fractional frame position inside `queue[processed]`.
    cursor: f64,
    is_static: bool,
    looping: bool,
    gain: f32,
    position: Vec3,
    velocity: Vec3,
}

impl Voice {
    fn new() -> Self {
        Self {
            state: VoiceState::Initial,
            queue: VecDeque::new(),
            processed: 0,
            cursor: 0.0,
            is_static: false,
            looping: false,
            gain: 1.0,
            position: Vec3::ZERO,
            velocity: Vec3::ZERO,
        }
    }

    fn current(&self) -> Option<BufferId> {
        self.queue.get(self.processed).copied()
    }

    /// Move past the current buffer; `len` is its length in frames.
    fn finish_buffer(&mut self, len: usize) {
        self.cursor = (self.cursor - len as f64).max(0.0);
        self.processed += 1;
        if self.processed < self.queue.len() {
            return;
        }
        if self.is_static && self.looping && len > 0 {
            self.processed = 0;
        } else {
            self.processed = self.queue.len();
            self.cursor = 0.0;
            self.state = VoiceState::Stopped;
        }
    }

    /// Consume `secs` of wall-clock playback.
    fn advance(&mut self, buffers: &HashMap<BufferId, Buffer>, mut secs: f64) {
        while secs > 0.0 && self.state == VoiceState::Playing {
            let Some(id) = self.current() else {
                self.finish_buffer(0);
                continue;
            };
            let (len, rate) = buffers
                .get(&id)
                .map(|b| (b.frames(), b.sample_rate.max(1)))
                .unwrap_or((0, 1));
            let remaining = (len as f64 - self.cursor).max(0.0);
            let needed = remaining / f64::from(rate);
            if secs >= needed {
                secs -= needed;
                self.cursor = len as f64;
                self.finish_buffer(len);
            } else {
                self.cursor += secs * f64::from(rate);
                secs = 0.0;
            }
        }
    }

    /// Add this voice's next `out.len() / channels` frames into `out`.
    fn mix_into(
        &mut self,
        buffers: &HashMap<BufferId, Buffer>,
        out: &mut [f32],
        channels: usize,
        out_rate: u32,
    ) {
        let frames = out.len() / channels;
        let mut frame = 0usize;
        while frame < frames && self.state == VoiceState::Playing {
            let Some(id) = self.current() else {
                self.finish_buffer(0);
                continue;
            };
            let Some(buffer) = buffers.get(&id) else {
                self.finish_buffer(0);
                continue;
            };
            let len = buffer.frames();
            let src_frame = self.cursor as usize;
            if src_frame >= len {
                self.finish_buffer(len);
                continue;
            }
            for ch in 0..channels {
                out[frame * channels + ch] += buffer.sample(src_frame, ch, channels) * self.gain;
            }
            self.cursor += f64::from(buffer.sample_rate.max(1)) / f64::from(out_rate.max(1));
            frame += 1;
        }
    }
}

#[derive(Default)]
struct Tables {
    next_id: u32,
    buffers: HashMap<BufferId, Buffer>,
    voices: HashMap<VoiceId, Voice>,
}

impl Tables {
    fn next_id(&mut self) -> u32 {
        self.next_id = self.next_id.wrapping_add(1);
        self.next_id
    }

    fn voice(&mut self, id: VoiceId) -> Result<&mut Voice, BackendError> {
        self.voices.get_mut(&id).ok_or(BackendError::UnknownVoice(id))
    }
}

/// Memory-backed [`AudioBackend`] with OpenAL-like queue semantics.
#[derive(Default)]
pub struct SoftwareBackend {
    inner: Mutex<Tables>,
}

impl SoftwareBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Consume `elapsed` of playback on every playing voice without producing samples.
    pub fn advance(&self, elapsed: Duration) {
        let mut guard = self.tables();
        let Tables {
            buffers, voices, ..
        } = &mut *guard;
        for voice in voices.values_mut() {
            voice.advance(buffers, elapsed.as_secs_f64());
        }
    }

    /// Render interleaved `f32` output for every playing voice.
    ///
    /// `out` is overwritten; it holds `out.len() / channels` frames at `sample_rate`.
    pub fn render(&self, out: &mut [f32], channels: usize, sample_rate: u32) {
        out.fill(0.0);
        if channels == 0 {
            return;
        }
        let mut guard = self.tables();
        let Tables {
            buffers, voices, ..
        } = &mut *guard;
        for voice in voices.values_mut() {
            voice.mix_into(buffers, out, channels, sample_rate);
        }
        for s in out.iter_mut() {
            *s = s.clamp(-1.0, 1.0);
        }
    }

    /// Total buffers attached to a voice, processed ones included.
    pub fn queued_count(&self, voice: VoiceId) -> usize {
        self.tables()
            .voices
            .get(&voice)
            .map(|v| v.queue.len())
            .unwrap_or(0)
    }

    pub fn voice_count(&self) -> usize {
        self.tables().voices.len()
    }

    pub fn buffer_count(&self) -> usize {
        self.tables().buffers.len()
    }

    /// Uploaded size of a buffer in bytes.
    pub fn buffer_len(&self, buffer: BufferId) -> Option<usize> {
        self.tables().buffers.get(&buffer).map(|b| b.data.len())
    }

    /// Uploaded bytes of a buffer.
    pub fn buffer_data(&self, buffer: BufferId) -> Option<Vec<u8>> {
        self.tables().buffers.get(&buffer).map(|b| b.data.clone())
    }

    /// Buffers currently attached to a voice, oldest first.
    pub fn queue_of(&self, voice: VoiceId) -> Vec<BufferId> {
        self.tables()
            .voices
            .get(&voice)
            .map(|v| v.queue.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn gain(&self, voice: VoiceId) -> Option<f32> {
        self.tables().voices.get(&voice).map(|v| v.gain)
    }

    pub fn position(&self, voice: VoiceId) -> Option<Vec3> {
        self.tables().voices.get(&voice).map(|v| v.position)
    }

    pub fn velocity(&self, voice: VoiceId) -> Option<Vec3> {
        self.tables().voices.get(&voice).map(|v| v.velocity)
    }

    pub fn is_looping(&self, voice: VoiceId) -> Option<bool> {
        self.tables().voices.get(&voice).map(|v| v.looping)
    }
}

impl AudioBackend for SoftwareBackend {
    fn create_buffer(&self) -> Result<BufferId, BackendError> {
        let mut t = self.tables();
        let id = BufferId(t.next_id());
        t.buffers.insert(id, Buffer::default());
        Ok(id)
    }

    fn delete_buffer(&self, buffer: BufferId) {
        self.tables().buffers.remove(&buffer);
    }

    fn upload(
        &self,
        buffer: BufferId,
        format: SoundFormat,
        data: &[u8],
        sample_rate: u32,
    ) -> Result<(), BackendError> {
        let block_size = format.bytes_per_frame();
        if data.len() % block_size != 0 {
            return Err(BackendError::UnalignedData {
                len: data.len(),
                block_size,
            });
        }
        let mut t = self.tables();
        let slot = t
            .buffers
            .get_mut(&buffer)
            .ok_or(BackendError::UnknownBuffer(buffer))?;
        slot.format = Some(format);
        slot.sample_rate = sample_rate;
        slot.data.clear();
        slot.data.extend_from_slice(data);
        Ok(())
    }

    fn create_voice(&self) -> Result<VoiceId, BackendError> {
        let mut t = self.tables();
        let id = VoiceId(t.next_id());
        t.voices.insert(id, Voice::new());
        Ok(id)
    }

    fn delete_voice(&self, voice: VoiceId) {
        self.tables().voices.remove(&voice);
    }

    fn bind_static(&self, voice: VoiceId, buffer: BufferId) -> Result<(), BackendError> {
        let mut t = self.tables();
        if !t.buffers.contains_key(&buffer) {
            return Err(BackendError::UnknownBuffer(buffer));
        }
        let v = t.voice(voice)?;
        v.queue.clear();
        v.queue.push_back(buffer);
        v.processed = 0;
        v.cursor = 0.0;
        v.is_static = true;
        v.state = VoiceState::Initial;
        Ok(())
    }

    fn queue_buffer(&self, voice: VoiceId, buffer: BufferId) -> Result<(), BackendError> {
        let mut t = self.tables();
        if !t.buffers.contains_key(&buffer) {
            return Err(BackendError::UnknownBuffer(buffer));
        }
        let v = t.voice(voice)?;
        if v.is_static {
            return Err(BackendError::StaticVoice(voice));
        }
        v.queue.push_back(buffer);
        Ok(())
    }

    fn unqueue_processed(&self, voice: VoiceId) -> Result<Option<BufferId>, BackendError> {
        let mut t = self.tables();
        let v = t.voice(voice)?;
        if v.is_static {
            return Err(BackendError::StaticVoice(voice));
        }
        if v.processed == 0 {
            return Ok(None);
        }
        v.processed -= 1;
        Ok(v.queue.pop_front())
    }

    fn processed_count(&self, voice: VoiceId) -> Result<usize, BackendError> {
        let mut t = self.tables();
        let v = t.voice(voice)?;
        Ok(if v.is_static { 0 } else { v.processed })
    }

    fn play(&self, voice: VoiceId) -> Result<(), BackendError> {
        let mut t = self.tables();
        let v = t.voice(voice)?;
        match v.state {
            VoiceState::Playing => {}
            VoiceState::Paused => v.state = VoiceState::Playing,
            VoiceState::Initial | VoiceState::Stopped => {
                v.processed = 0;
                v.cursor = 0.0;
                v.state = if v.queue.is_empty() {
                    VoiceState::Stopped
                } else {
                    VoiceState::Playing
                };
            }
        }
        Ok(())
    }

    fn pause(&self, voice: VoiceId) -> Result<(), BackendError> {
        let mut t = self.tables();
        let v = t.voice(voice)?;
        if v.state == VoiceState::Playing {
            v.state = VoiceState::Paused;
        }
        Ok(())
    }

    fn stop(&self, voice: VoiceId) -> Result<(), BackendError> {
        let mut t = self.tables();
        let v = t.voice(voice)?;
        v.state = VoiceState::Stopped;
        v.processed = v.queue.len();
        v.cursor = 0.0;
        Ok(())
    }

    fn state(&self, voice: VoiceId) -> Result<VoiceState, BackendError> {
        let mut t = self.tables();
        Ok(t.voice(voice)?.state)
    }

    fn set_looping(&self, voice: VoiceId, looping: bool) -> Result<(), BackendError> {
        self.tables().voice(voice)?.looping = looping;
        Ok(())
    }

    fn set_gain(&self, voice: VoiceId, gain: f32) -> Result<(), BackendError> {
        self.tables().voice(voice)?.gain = gain.max(0.0);
        Ok(())
    }

    fn set_position(&self, voice: VoiceId, position: Vec3) -> Result<(), BackendError> {
        self.tables().voice(voice)?.position = position;
        Ok(())
    }

    fn set_velocity(&self, voice: VoiceId, velocity: Vec3) -> Result<(), BackendError> {
        self.tables().voice(voice)?.velocity = velocity;
        Ok(())
    }
}
