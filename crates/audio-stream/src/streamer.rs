//! Buffer pool feeding one backend voice from a [`PcmSource`].
//!
//! Streaming mode keeps a fixed ring of equally sized slots queued on the voice and
//! refills them one at a time as the backend reports them processed. Preload mode
//! decodes the whole loop region into a single static buffer, which also backs any
//! number of one-shot copy voices.

use std::sync::Arc;

use audio_stream_types::{LoadMode, Vec3};

use crate::backend::{AudioBackend, BufferId, VoiceId, VoiceState};
use crate::config::StreamerConfig;
use crate::decode::{PcmSource, StreamDescriptor, read_full};
use crate::error::{BackendError, SoundError};

/// Outcome of one [`BufferStreamer::refill_free_slot`] call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FillProgress {
    /// No buffer has been consumed yet.
    Waiting,
    /// A slot was refilled with this many bytes.
    Filled(usize),
    /// A slot was refilled and the cursor wrapped back to the loop start.
    Wrapped(usize),
    /// A slot was refilled and the source has no more data to play.
    Ended,
}

struct BufferSlot {
    buffer: BufferId,
    data: Vec<u8>,
}

pub struct BufferStreamer {
    backend: Arc<dyn AudioBackend>,
    source: Box<dyn PcmSource>,
    voice: VoiceId,
    mode: LoadMode,
    slots: Vec<BufferSlot>,
    copies: Vec<VoiceId>,
    /// Slot capacity, a whole number of frames.
    slot_bytes: usize,
}

impl BufferStreamer {
    /// Allocate the voice and buffers and perform the initial fill.
    ///
    /// Streaming sources end up with every slot queued; preload sources end up with
    /// the whole loop region bound as a static buffer. The voice is not started.
    pub fn new(
        backend: Arc<dyn AudioBackend>,
        source: Box<dyn PcmSource>,
        mode: LoadMode,
        cfg: &StreamerConfig,
    ) -> Result<Self, SoundError> {
        cfg.validate()?;
        let block = source.block_size();
        let voice = backend.create_voice()?;
        let mut streamer = Self {
            backend,
            source,
            voice,
            mode,
            slots: Vec::new(),
            copies: Vec::new(),
            slot_bytes: (cfg.slot_bytes / block).max(1) * block,
        };

        match mode {
            LoadMode::Streaming => {
                for _ in 0..cfg.slot_count {
                    let buffer = streamer.backend.create_buffer()?;
                    streamer.slots.push(BufferSlot {
                        buffer,
                        data: vec![0; streamer.slot_bytes],
                    });
                }
                streamer.queue_all_slots()?;
            }
            LoadMode::Preload => streamer.preload()?,
        }

        tracing::debug!(
            voice = ?streamer.voice,
            mode = ?mode,
            slots = streamer.slots.len(),
            slot_bytes = streamer.slot_bytes,
            "buffer streamer ready"
        );
        Ok(streamer)
    }

    fn preload(&mut self) -> Result<(), SoundError> {
        let len = usize::try_from(self.source.loop_length())
            .unwrap_or(usize::MAX)
            .saturating_mul(self.source.block_size());
        let buffer = self.backend.create_buffer()?;
        self.slots.push(BufferSlot {
            buffer,
            data: Vec::new(),
        });

        let mut data = vec![0; len];
        self.source.seek(self.source.loop_start());
        let n = read_full(&mut *self.source, &mut data);
        self.backend.upload(
            buffer,
            self.source.format(),
            &data[..n],
            self.source.sample_rate(),
        )?;
        self.backend.bind_static(self.voice, buffer)?;
        Ok(())
    }

    /// Decode one chunk into every slot, in order, and queue it.
    fn queue_all_slots(&mut self) -> Result<(), SoundError> {
        let format = self.source.format();
        let rate = self.source.sample_rate();
        for slot in &mut self.slots {
            let n = read_full(&mut *self.source, &mut slot.data[..self.slot_bytes]);
            self.backend.upload(slot.buffer, format, &slot.data[..n], rate)?;
            self.backend.queue_buffer(self.voice, slot.buffer)?;
        }
        Ok(())
    }

    /// Bytes the next refill pass should aim for: one slot, or what is left of the loop.
    pub fn fill_target(&self) -> usize {
        let frames_left = self.source.loop_end().saturating_sub(self.source.pcm_offset());
        let bytes_left = usize::try_from(frames_left)
            .unwrap_or(usize::MAX)
            .saturating_mul(self.source.block_size());
        self.slot_bytes.min(bytes_left)
    }

    /// Refill at most one processed slot with up to `max_bytes` of PCM and re-queue it.
    pub fn refill_free_slot(
        &mut self,
        max_bytes: usize,
        looping: bool,
    ) -> Result<FillProgress, SoundError> {
        if self.backend.processed_count(self.voice)? == 0 {
            return Ok(FillProgress::Waiting);
        }
        let Some(buffer) = self.backend.unqueue_processed(self.voice)? else {
            return Ok(FillProgress::Waiting);
        };
        let slot = self
            .slots
            .iter_mut()
            .find(|slot| slot.buffer == buffer)
            .ok_or(BackendError::UnknownBuffer(buffer))?;

        let block = self.source.block_size();
        let want = max_bytes.min(self.slot_bytes) / block * block;
        let n = read_full(&mut *self.source, &mut slot.data[..want]);
        self.backend.upload(
            buffer,
            self.source.format(),
            &slot.data[..n],
            self.source.sample_rate(),
        )?;
        self.backend.queue_buffer(self.voice, buffer)?;

        if n == 0 || self.source.pcm_offset() >= self.source.loop_end() {
            if looping {
                self.source.seek(self.source.loop_start());
                tracing::trace!(voice = ?self.voice, bytes = n, "stream wrapped to loop start");
                return Ok(FillProgress::Wrapped(n));
            }
            return Ok(FillProgress::Ended);
        }
        Ok(FillProgress::Filled(n))
    }

    /// Halt the voice and return to frame 0 with a freshly filled queue.
    pub fn rewind(&mut self) -> Result<(), SoundError> {
        self.backend.stop(self.voice)?;
        if self.mode == LoadMode::Preload {
            return Ok(());
        }
        for _ in 0..self.slots.len() {
            if self.backend.unqueue_processed(self.voice)?.is_none() {
                break;
            }
        }
        self.source.seek(0);
        self.queue_all_slots()
    }

    /// Start an independent voice over the preloaded buffer.
    ///
    /// The copy inherits the given gain, position and velocity and is released by
    /// [`sweep_copies`](Self::sweep_copies) once it finishes.
    pub fn play_copy(
        &mut self,
        volume: f32,
        position: Vec3,
        velocity: Vec3,
    ) -> Result<VoiceId, SoundError> {
        if self.mode != LoadMode::Preload {
            return Err(SoundError::CopyRequiresPreload);
        }
        let buffer = self.slots[0].buffer;
        let copy = self.backend.create_voice()?;
        let started = self
            .backend
            .bind_static(copy, buffer)
            .and_then(|()| self.backend.set_gain(copy, volume))
            .and_then(|()| self.backend.set_position(copy, position))
            .and_then(|()| self.backend.set_velocity(copy, velocity))
            .and_then(|()| self.backend.play(copy));
        if let Err(e) = started {
            self.backend.delete_voice(copy);
            return Err(e.into());
        }
        self.copies.push(copy);
        Ok(copy)
    }

    /// Release every copy voice that is no longer playing. Returns how many were released.
    pub fn sweep_copies(&mut self) -> usize {
        let backend = &self.backend;
        let before = self.copies.len();
        self.copies.retain(|&copy| {
            let playing = matches!(backend.state(copy), Ok(VoiceState::Playing));
            if !playing {
                backend.delete_voice(copy);
            }
            playing
        });
        before - self.copies.len()
    }

    pub fn play(&self) -> Result<(), BackendError> {
        self.backend.play(self.voice)
    }

    pub fn pause(&self) -> Result<(), BackendError> {
        self.backend.pause(self.voice)
    }

    /// Stop the main voice without touching the queue or the cursor.
    pub fn halt(&self) -> Result<(), BackendError> {
        self.backend.stop(self.voice)
    }

    pub fn voice_state(&self) -> Result<VoiceState, BackendError> {
        self.backend.state(self.voice)
    }

    pub fn set_looping(&self, looping: bool) -> Result<(), BackendError> {
        self.backend.set_looping(self.voice, looping)
    }

    pub fn set_gain(&self, gain: f32) -> Result<(), BackendError> {
        self.backend.set_gain(self.voice, gain)
    }

    pub fn set_position(&self, position: Vec3) -> Result<(), BackendError> {
        self.backend.set_position(self.voice, position)
    }

    pub fn set_velocity(&self, velocity: Vec3) -> Result<(), BackendError> {
        self.backend.set_velocity(self.voice, velocity)
    }

    pub fn voice(&self) -> VoiceId {
        self.voice
    }

    pub fn mode(&self) -> LoadMode {
        self.mode
    }

    pub fn descriptor(&self) -> &StreamDescriptor {
        self.source.descriptor()
    }

    pub fn pcm_offset(&self) -> u64 {
        self.source.pcm_offset()
    }

    /// True once the cursor sits at the loop end.
    pub fn at_loop_end(&self) -> bool {
        self.source.pcm_offset() >= self.source.loop_end()
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn slot_bytes(&self) -> usize {
        self.slot_bytes
    }

    pub fn copy_count(&self) -> usize {
        self.copies.len()
    }
}

impl Drop for BufferStreamer {
    fn drop(&mut self) {
        for copy in self.copies.drain(..) {
            self.backend.delete_voice(copy);
        }
        self.backend.delete_voice(self.voice);
        for slot in &self.slots {
            self.backend.delete_buffer(slot.buffer);
        }
        tracing::debug!(voice = ?self.voice, "buffer streamer released");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use audio_stream_types::SoundFormat;

    use super::*;
    use crate::backend::SoftwareBackend;
    use crate::test_support::{fast_config, pcm_wav, ramp16, software_backend, wav_source};

    /// Mono16 at 1 kHz so one frame lasts one millisecond.
    fn mono_source(frames: usize) -> Box<dyn PcmSource> {
        Box::new(wav_source(pcm_wav(
            SoundFormat::Mono16,
            1_000,
            &ramp16(frames, 1),
        )))
    }

    fn streaming(
        backend: &Arc<SoftwareBackend>,
        frames: usize,
        slots: usize,
        slot_bytes: usize,
    ) -> BufferStreamer {
        BufferStreamer::new(
            backend.clone(),
            mono_source(frames),
            LoadMode::Streaming,
            &fast_config(slots, slot_bytes),
        )
        .unwrap()
    }

    #[test]
    fn eight_second_stereo_stream_queues_every_slot() {
        let backend = software_backend();
        let frames = 8 * 44_100;
        let source = wav_source(pcm_wav(
            SoundFormat::Stereo16,
            44_100,
            &ramp16(frames, 2),
        ));
        let streamer = BufferStreamer::new(
            backend.clone(),
            Box::new(source),
            LoadMode::Streaming,
            &StreamerConfig::default(),
        )
        .unwrap();

        assert_eq!(streamer.descriptor().loop_length, 352_800);
        assert_eq!(streamer.slot_count(), 32);
        let queue = backend.queue_of(streamer.voice());
        assert_eq!(queue.len(), 32);
        assert!(queue.iter().all(|b| backend.buffer_len(*b) == Some(4096)));
        assert_eq!(streamer.pcm_offset(), 32 * 1024);
        assert_eq!(
            backend.state(streamer.voice()).unwrap(),
            VoiceState::Initial
        );
    }

    #[test]
    fn slot_size_is_aligned_down_to_whole_frames() {
        let backend = software_backend();
        let source = wav_source(pcm_wav(SoundFormat::Stereo16, 8_000, &ramp16(64, 2)));
        let streamer = BufferStreamer::new(
            backend.clone(),
            Box::new(source),
            LoadMode::Streaming,
            &fast_config(2, 10),
        )
        .unwrap();
        assert_eq!(streamer.slot_bytes(), 8);
    }

    #[test]
    fn fill_target_is_capped_by_what_is_left() {
        let backend = software_backend();
        let streamer = streaming(&backend, 22, 5, 8);
        assert_eq!(streamer.pcm_offset(), 20);
        assert_eq!(streamer.fill_target(), 4);

        let fresh = streaming(&backend, 100, 2, 8);
        assert_eq!(fresh.fill_target(), 8);
    }

    #[test]
    fn refill_waits_until_a_buffer_is_processed() {
        let backend = software_backend();
        let mut streamer = streaming(&backend, 100, 4, 8);
        assert_eq!(
            streamer.refill_free_slot(8, false).unwrap(),
            FillProgress::Waiting
        );
    }

    #[test]
    fn refill_requeues_next_chunk_at_the_back() {
        let backend = software_backend();
        let pcm = ramp16(100, 1);
        let mut streamer = streaming(&backend, 100, 4, 8);
        let first = backend.queue_of(streamer.voice())[0];

        streamer.play().unwrap();
        backend.advance(Duration::from_millis(5));
        assert_eq!(
            streamer.refill_free_slot(8, false).unwrap(),
            FillProgress::Filled(8)
        );

        let queue = backend.queue_of(streamer.voice());
        assert_eq!(queue.len(), 4);
        assert_eq!(queue[3], first);
        assert_eq!(backend.buffer_data(first).unwrap(), pcm[32..40].to_vec());
        assert_eq!(streamer.pcm_offset(), 20);
    }

    #[test]
    fn looping_refill_resumes_at_loop_start() {
        let backend = software_backend();
        let pcm = ramp16(22, 1);
        let mut streamer = streaming(&backend, 22, 5, 8);
        streamer.play().unwrap();

        backend.advance(Duration::from_millis(5));
        assert_eq!(
            streamer.refill_free_slot(8, true).unwrap(),
            FillProgress::Wrapped(4)
        );
        assert_eq!(streamer.pcm_offset(), 0);

        backend.advance(Duration::from_millis(4));
        assert_eq!(
            streamer.refill_free_slot(8, true).unwrap(),
            FillProgress::Filled(8)
        );
        let newest = *backend.queue_of(streamer.voice()).last().unwrap();
        assert_eq!(backend.buffer_data(newest).unwrap(), pcm[..8].to_vec());
    }

    #[test]
    fn looping_wraps_into_a_narrowed_region() {
        let backend = software_backend();
        let mut source = wav_source(pcm_wav(SoundFormat::Mono16, 1_000, &ramp16(40, 1)));
        source.set_loop_region(4, 8);
        let pcm = ramp16(40, 1);
        let mut streamer = BufferStreamer::new(
            backend.clone(),
            Box::new(source),
            LoadMode::Streaming,
            &fast_config(2, 8),
        )
        .unwrap();
        assert_eq!(streamer.pcm_offset(), 8);
        streamer.play().unwrap();

        backend.advance(Duration::from_millis(5));
        assert_eq!(
            streamer.refill_free_slot(8, true).unwrap(),
            FillProgress::Wrapped(8)
        );
        assert_eq!(streamer.pcm_offset(), 4);

        backend.advance(Duration::from_millis(4));
        assert_eq!(
            streamer.refill_free_slot(8, true).unwrap(),
            FillProgress::Filled(8)
        );
        let newest = *backend.queue_of(streamer.voice()).last().unwrap();
        assert_eq!(backend.buffer_data(newest).unwrap(), pcm[8..16].to_vec());
    }

    #[test]
    fn non_looping_refill_reports_end() {
        let backend = software_backend();
        let mut streamer = streaming(&backend, 22, 5, 8);
        streamer.play().unwrap();
        backend.advance(Duration::from_millis(5));
        assert_eq!(
            streamer.refill_free_slot(8, false).unwrap(),
            FillProgress::Ended
        );
        assert!(streamer.at_loop_end());
    }

    #[test]
    fn rewind_flushes_and_refills_from_frame_zero() {
        let backend = software_backend();
        let pcm = ramp16(100, 1);
        let mut streamer = streaming(&backend, 100, 3, 8);
        streamer.play().unwrap();
        backend.advance(Duration::from_millis(5));
        streamer.refill_free_slot(8, false).unwrap();
        assert_eq!(streamer.pcm_offset(), 16);

        streamer.rewind().unwrap();
        assert_eq!(streamer.voice_state().unwrap(), VoiceState::Stopped);
        assert_eq!(streamer.pcm_offset(), 12);
        let queue = backend.queue_of(streamer.voice());
        assert_eq!(queue.len(), 3);
        assert_eq!(backend.buffer_data(queue[0]).unwrap(), pcm[..8].to_vec());
        assert_eq!(backend.processed_count(streamer.voice()).unwrap(), 0);
    }

    #[test]
    fn streaming_source_refuses_copies() {
        let backend = software_backend();
        let mut streamer = streaming(&backend, 100, 3, 8);
        let voices = backend.voice_count();
        assert!(matches!(
            streamer.play_copy(1.0, Vec3::ZERO, Vec3::ZERO),
            Err(SoundError::CopyRequiresPreload)
        ));
        assert_eq!(backend.voice_count(), voices);
        assert_eq!(streamer.copy_count(), 0);
    }

    #[test]
    fn preload_binds_whole_region_as_static_buffer() {
        let backend = software_backend();
        let streamer = BufferStreamer::new(
            backend.clone(),
            mono_source(50),
            LoadMode::Preload,
            &fast_config(4, 8),
        )
        .unwrap();
        assert_eq!(streamer.slot_count(), 1);
        let queue = backend.queue_of(streamer.voice());
        assert_eq!(queue.len(), 1);
        assert_eq!(backend.buffer_len(queue[0]), Some(100));
        assert_eq!(streamer.pcm_offset(), 50);
    }

    #[test]
    fn copies_inherit_mirrors_and_are_swept_when_done() {
        let backend = software_backend();
        let mut streamer = BufferStreamer::new(
            backend.clone(),
            mono_source(50),
            LoadMode::Preload,
            &fast_config(4, 8),
        )
        .unwrap();
        let position = Vec3::new(1.0, 2.0, 3.0);
        let velocity = Vec3::new(0.0, -1.0, 0.0);
        let copy = streamer.play_copy(0.25, position, velocity).unwrap();

        assert_eq!(backend.gain(copy), Some(0.25));
        assert_eq!(backend.position(copy), Some(position));
        assert_eq!(backend.velocity(copy), Some(velocity));
        assert_eq!(backend.state(copy).unwrap(), VoiceState::Playing);
        assert_eq!(streamer.sweep_copies(), 0);

        backend.advance(Duration::from_millis(60));
        assert_eq!(streamer.sweep_copies(), 1);
        assert_eq!(streamer.copy_count(), 0);
        assert_eq!(backend.voice_count(), 1);
    }

    #[test]
    fn drop_releases_backend_objects() {
        let backend = software_backend();
        let mut streamer = BufferStreamer::new(
            backend.clone(),
            mono_source(50),
            LoadMode::Preload,
            &fast_config(4, 8),
        )
        .unwrap();
        streamer.play_copy(1.0, Vec3::ZERO, Vec3::ZERO).unwrap();
        assert_eq!(backend.voice_count(), 2);
        drop(streamer);
        assert_eq!(backend.voice_count(), 0);
        assert_eq!(backend.buffer_count(), 0);

        drop(streaming(&backend, 100, 4, 8));
        assert_eq!(backend.voice_count(), 0);
        assert_eq!(backend.buffer_count(), 0);
    }
}
