//! Playback controller for one sound.
//!
//! A [`SoundSource`] owns a [`BufferStreamer`] behind a mutex shared with one
//! background thread (refill for streaming sources, copy sweep for preloaded ones).
//! Control calls run on the caller's thread and perform their backend calls and
//! mirror updates under a single lock acquisition.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;

use audio_stream_types::{LoadMode, SourceStatus, Vec3};
use crossbeam_channel::Sender;

use crate::backend::{AudioBackend, VoiceId, VoiceState};
use crate::config::StreamerConfig;
use crate::decode::{PcmSource, StreamDescriptor, open_source};
use crate::error::SoundError;
use crate::status::PlaybackState;
use crate::streamer::BufferStreamer;
use crate::worker::{self, SourceInner};

pub struct SoundSource {
    name: String,
    mode: LoadMode,
    descriptor: StreamDescriptor,
    voice: VoiceId,
    shared: Arc<Mutex<SourceInner>>,
    /// Dropping the sender wakes and ends the background task.
    shutdown: Option<Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl SoundSource {
    /// Open `path` through the decoder factory and start its background task.
    pub fn open(
        name: impl Into<String>,
        path: &Path,
        mode: LoadMode,
        backend: Arc<dyn AudioBackend>,
        cfg: &StreamerConfig,
    ) -> Result<Self, SoundError> {
        let source = open_source(path)?;
        Self::from_source(name, source, mode, backend, cfg)
    }

    /// Build a source over an already opened decoder.
    pub fn from_source(
        name: impl Into<String>,
        source: Box<dyn PcmSource>,
        mode: LoadMode,
        backend: Arc<dyn AudioBackend>,
        cfg: &StreamerConfig,
    ) -> Result<Self, SoundError> {
        let name = name.into();
        let streamer = BufferStreamer::new(backend, source, mode, cfg)?;
        let descriptor = *streamer.descriptor();
        let voice = streamer.voice();
        let shared = Arc::new(Mutex::new(SourceInner {
            state: PlaybackState::default(),
            streamer,
        }));

        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(0);
        let task = {
            let name = name.clone();
            let shared = shared.clone();
            let cfg = cfg.clone();
            std::thread::spawn(move || match mode {
                LoadMode::Streaming => worker::run_refill_task(name, shared, shutdown_rx, cfg),
                LoadMode::Preload => worker::run_sweep_task(name, shared, shutdown_rx, cfg),
            })
        };

        tracing::info!(
            source = %name,
            ?mode,
            format = ?descriptor.format,
            sample_rate = descriptor.sample_rate,
            frames = descriptor.loop_length,
            "sound source created"
        );
        Ok(Self {
            name,
            mode,
            descriptor,
            voice,
            shared,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        })
    }

    fn lock(&self) -> MutexGuard<'_, SourceInner> {
        worker::lock(&self.shared)
    }

    /// Start or resume playback. Does nothing if the voice is already playing.
    pub fn play(&self, looping: bool) -> Result<(), SoundError> {
        let mut inner = self.lock();
        if inner.streamer.voice_state()? == VoiceState::Playing {
            return Ok(());
        }
        if self.mode == LoadMode::Preload {
            inner.streamer.set_looping(looping)?;
        }
        inner.streamer.play()?;
        inner.state.is_playing = true;
        inner.state.is_looping = looping;
        tracing::debug!(source = %self.name, looping, "play");
        Ok(())
    }

    /// Pause the voice, keeping its queue and position.
    pub fn pause(&self) -> Result<(), SoundError> {
        let mut inner = self.lock();
        inner.streamer.pause()?;
        inner.state.is_playing = false;
        tracing::debug!(source = %self.name, "pause");
        Ok(())
    }

    /// Halt playback and rewind to the first frame.
    pub fn stop(&self) -> Result<(), SoundError> {
        self.lock().stop()?;
        tracing::debug!(source = %self.name, "stop");
        Ok(())
    }

    pub fn set_volume(&self, volume: f32) -> Result<(), SoundError> {
        let mut inner = self.lock();
        inner.streamer.set_gain(volume)?;
        inner.state.volume = volume;
        Ok(())
    }

    pub fn set_position(&self, position: Vec3) -> Result<(), SoundError> {
        let mut inner = self.lock();
        inner.streamer.set_position(position)?;
        inner.state.position = position;
        Ok(())
    }

    pub fn set_velocity(&self, velocity: Vec3) -> Result<(), SoundError> {
        let mut inner = self.lock();
        inner.streamer.set_velocity(velocity)?;
        inner.state.velocity = velocity;
        Ok(())
    }

    /// Start a one-shot copy of a preloaded sound with the current volume, position
    /// and velocity. Streaming sources return [`SoundError::CopyRequiresPreload`].
    ///
    /// The source reports playing, not looping, until the sweep has released the
    /// last finished copy.
    pub fn play_copy(&self) -> Result<(), SoundError> {
        let mut guard = self.lock();
        let SourceInner { state, streamer } = &mut *guard;
        let copy = streamer.play_copy(state.volume, state.position, state.velocity)?;
        state.is_playing = true;
        state.is_looping = false;
        tracing::trace!(source = %self.name, voice = ?copy, "copy started");
        Ok(())
    }

    pub fn is_playing(&self) -> bool {
        self.lock().state.is_playing
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> LoadMode {
        self.mode
    }

    pub fn descriptor(&self) -> &StreamDescriptor {
        &self.descriptor
    }

    /// Backend voice driven by this source.
    pub fn voice(&self) -> VoiceId {
        self.voice
    }

    pub fn copy_voice_count(&self) -> usize {
        self.lock().streamer.copy_count()
    }

    pub fn status(&self) -> SourceStatus {
        let inner = self.lock();
        inner.state.snapshot(
            self.mode,
            inner.streamer.pcm_offset(),
            inner.streamer.copy_count(),
        )
    }
}

impl Drop for SoundSource {
    fn drop(&mut self) {
        {
            let mut inner = self.lock();
            inner.state.is_ended = true;
            inner.state.is_playing = false;
            if let Err(e) = inner.streamer.halt() {
                tracing::warn!(source = %self.name, "halt on close failed: {e}");
            }
        }
        drop(self.shutdown.take());
        if let Some(task) = self.task.take() {
            if task.join().is_err() {
                tracing::warn!(source = %self.name, "background task panicked");
            }
        }
        tracing::info!(source = %self.name, "sound source closed");
    }
}
