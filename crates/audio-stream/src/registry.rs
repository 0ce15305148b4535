//! Name-keyed sound source registry and output lifetime.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use audio_stream_types::LoadMode;
use cpal::traits::{DeviceTrait, StreamTrait};

use crate::backend::{AudioBackend, SoftwareBackend};
use crate::config::{StreamerConfig, SystemConfig};
use crate::error::SoundError;
use crate::source::SoundSource;
use crate::{device, playback};

/// Owns every [`SoundSource`] by unique name, plus the backend they play through.
pub struct SoundSystem {
    // Fields drop in declaration order: sources release their voices before the
    // output stream closes.
    sources: HashMap<String, SoundSource>,
    backend: Arc<dyn AudioBackend>,
    streamer: StreamerConfig,
    // Held only to keep the device stream alive.
    _output: Option<cpal::Stream>,
}

impl SoundSystem {
    /// Open the configured output device and start rendering the software backend.
    pub fn open(cfg: &SystemConfig) -> Result<Self> {
        let backend = Arc::new(SoftwareBackend::new());

        let host = cpal::default_host();
        let device = device::pick_device(&host, cfg.device_name())?;
        let config = device::pick_output_config(&device, cfg.sample_rate)?;
        let stream_config: cpal::StreamConfig = config.clone().into();
        let stream = playback::build_output_stream(
            &device,
            &stream_config,
            config.sample_format(),
            &backend,
        )
        .context("build output stream")?;
        stream.play().context("start output stream")?;

        tracing::info!(
            device = %device
                .description()
                .map(|d| d.to_string())
                .unwrap_or_else(|_| "<unknown>".to_string()),
            sample_rate = stream_config.sample_rate,
            channels = stream_config.channels,
            sample_format = ?config.sample_format(),
            "sound system ready"
        );

        let mut system = Self::with_backend(backend, cfg.streamer.clone())?;
        system._output = Some(stream);
        Ok(system)
    }

    /// Registry over any backend, without an output stream of its own.
    pub fn with_backend(
        backend: Arc<dyn AudioBackend>,
        streamer: StreamerConfig,
    ) -> Result<Self, SoundError> {
        streamer.validate()?;
        Ok(Self {
            sources: HashMap::new(),
            backend,
            streamer,
            _output: None,
        })
    }

    /// Open `path` and register it under `name`.
    ///
    /// Fails with [`SoundError::DuplicateSource`] without touching the registry
    /// when `name` is taken.
    pub fn create_source(
        &mut self,
        name: &str,
        path: &Path,
        mode: LoadMode,
    ) -> Result<&SoundSource, SoundError> {
        if self.sources.contains_key(name) {
            return Err(SoundError::DuplicateSource(name.to_string()));
        }
        let source = SoundSource::open(name, path, mode, self.backend.clone(), &self.streamer)?;
        Ok(self.sources.entry(name.to_string()).or_insert(source))
    }

    /// Remove and shut down the source named `name`. Returns `false` if it was absent.
    pub fn delete_source(&mut self, name: &str) -> bool {
        self.sources.remove(name).is_some()
    }

    pub fn get_source(&self, name: &str) -> Option<&SoundSource> {
        self.sources.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sources.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Registered names in sorted order.
    pub fn source_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.sources.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use audio_stream_types::SoundFormat;

    use super::*;
    use crate::test_support::{fast_config, pcm_wav, ramp16, software_backend, write_temp};

    fn system() -> (SoundSystem, Arc<SoftwareBackend>) {
        let backend = software_backend();
        let system = SoundSystem::with_backend(backend.clone(), fast_config(4, 64)).unwrap();
        (system, backend)
    }

    #[test]
    fn create_get_and_delete_sources() {
        let (mut system, backend) = system();
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(
            &dir,
            "beep.wav",
            &pcm_wav(SoundFormat::Mono16, 8_000, &ramp16(256, 1)),
        );

        system
            .create_source("music", &path, LoadMode::Streaming)
            .unwrap();
        system.create_source("beep", &path, LoadMode::Preload).unwrap();
        assert_eq!(system.len(), 2);
        assert_eq!(system.source_names(), vec!["beep", "music"]);
        assert_eq!(
            system.get_source("beep").map(SoundSource::mode),
            Some(LoadMode::Preload)
        );
        assert!(system.get_source("missing").is_none());

        assert!(system.delete_source("music"));
        assert!(!system.delete_source("music"));
        assert!(!system.contains("music"));
        assert_eq!(system.len(), 1);
        assert_eq!(backend.voice_count(), 1);
    }

    #[test]
    fn duplicate_name_is_rejected_and_leaves_one_entry() {
        let (mut system, backend) = system();
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(
            &dir,
            "jump.wav",
            &pcm_wav(SoundFormat::Mono8, 8_000, &[128; 64]),
        );

        system.create_source("jump", &path, LoadMode::Preload).unwrap();
        assert!(matches!(
            system.create_source("jump", &path, LoadMode::Streaming),
            Err(SoundError::DuplicateSource(ref n)) if n == "jump"
        ));
        assert_eq!(system.len(), 1);
        assert_eq!(
            system.get_source("jump").map(SoundSource::mode),
            Some(LoadMode::Preload)
        );
        assert_eq!(backend.voice_count(), 1);
    }

    #[test]
    fn failed_open_registers_nothing() {
        let (mut system, backend) = system();
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(&dir, "broken.wav", b"RIFF\x04\0\0\0WAVE");

        assert!(matches!(
            system.create_source("broken", &path, LoadMode::Streaming),
            Err(SoundError::Decode(_))
        ));
        assert!(system.is_empty());
        assert_eq!(backend.voice_count(), 0);
    }

    #[test]
    fn streaming_source_creates_no_copy_voice() {
        let (mut system, backend) = system();
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(
            &dir,
            "music.wav",
            &pcm_wav(SoundFormat::Stereo16, 44_100, &ramp16(512, 2)),
        );
        let source = system
            .create_source("music", &path, LoadMode::Streaming)
            .unwrap();
        assert!(matches!(
            source.play_copy(),
            Err(SoundError::CopyRequiresPreload)
        ));
        assert_eq!(source.copy_voice_count(), 0);
        assert_eq!(backend.voice_count(), 1);
    }

    #[test]
    fn dropping_the_system_releases_every_source() {
        let (mut system, backend) = system();
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(
            &dir,
            "loop.wav",
            &pcm_wav(SoundFormat::Mono16, 8_000, &ramp16(256, 1)),
        );
        system.create_source("a", &path, LoadMode::Streaming).unwrap();
        system.create_source("b", &path, LoadMode::Preload).unwrap();
        system.get_source("a").unwrap().play(true).unwrap();

        drop(system);
        assert_eq!(backend.voice_count(), 0);
        assert_eq!(backend.buffer_count(), 0);
    }

    #[test]
    fn zero_slot_config_is_rejected() {
        let err = SoundSystem::with_backend(software_backend(), fast_config(0, 64));
        assert!(matches!(err, Err(SoundError::InvalidConfig(_))));
    }
}
