//! Playback stage (CPAL output stream).
//!
//! Builds the CPAL output stream whose real-time callback pulls mixed audio from the
//! [`SoftwareBackend`] and converts it to the device sample format.

use std::sync::Arc;

use anyhow::{Result, anyhow};
use cpal::traits::DeviceTrait;

use crate::backend::SoftwareBackend;

/// Build a CPAL output stream that plays every voice of `backend`.
///
/// The callback renders interleaved `f32` at the stream's rate and channel count,
/// then converts to the device sample format. Voices with no queued audio render
/// as silence.
pub fn build_output_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    backend: &Arc<SoftwareBackend>,
) -> Result<cpal::Stream> {
    match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(device, config, backend),
        cpal::SampleFormat::I16 => build_stream::<i16>(device, config, backend),
        cpal::SampleFormat::I32 => build_stream::<i32>(device, config, backend),
        cpal::SampleFormat::U16 => build_stream::<u16>(device, config, backend),
        other => Err(anyhow!("Unsupported sample format: {other:?}")),
    }
}

/// Type-specialized stream builder for CPAL sample formats.
fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    backend: &Arc<SoftwareBackend>,
) -> Result<cpal::Stream>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels = config.channels as usize;
    let sample_rate = config.sample_rate;
    let backend_cb = backend.clone();
    let mut scratch: Vec<f32> = Vec::new();

    let err_fn = |err| tracing::warn!("stream error: {err}");

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _| {
            render_into(&backend_cb, &mut scratch, data, channels, sample_rate);
        },
        err_fn,
        None,
    )?;

    Ok(stream)
}

/// Render one callback's worth of audio into `data`.
///
/// `scratch` is reused between callbacks and only grows.
fn render_into<T>(
    backend: &SoftwareBackend,
    scratch: &mut Vec<f32>,
    data: &mut [T],
    channels: usize,
    sample_rate: u32,
) where
    T: cpal::Sample + cpal::FromSample<f32>,
{
    if scratch.len() < data.len() {
        scratch.resize(data.len(), 0.0);
    }
    let mixed = &mut scratch[..data.len()];
    backend.render(mixed, channels, sample_rate);
    for (dst, src) in data.iter_mut().zip(mixed.iter()) {
        *dst = <T as cpal::Sample>::from_sample::<f32>(*src);
    }
}
