//! Output device and stream format selection for [`crate::SoundSystem::open`].

use anyhow::{Context, Result, anyhow};
use cpal::SampleFormat;
use cpal::traits::{DeviceTrait, HostTrait};

/// Sample formats [`crate::playback::build_output_stream`] can write, most preferred first.
const RENDER_FORMATS: [SampleFormat; 4] = [
    SampleFormat::F32,
    SampleFormat::I16,
    SampleFormat::I32,
    SampleFormat::U16,
];

/// Output device whose name contains `name` (case-insensitive), or the host default
/// when `name` is `None`.
pub fn pick_device(host: &cpal::Host, name: Option<&str>) -> Result<cpal::Device> {
    let Some(name) = name else {
        return host
            .default_output_device()
            .ok_or_else(|| anyhow!("host has no default output device"));
    };
    let wanted = name.to_lowercase();
    for device in host.output_devices().context("enumerate output devices")? {
        let Ok(description) = device.description() else {
            continue;
        };
        if description.name().to_lowercase().contains(&wanted) {
            return Ok(device);
        }
    }
    Err(anyhow!("no output device name contains {name:?}"))
}

/// Supported output config opened at the rate closest to `target_rate`.
///
/// Without a target the device's default rate is aimed for. Ranges in formats the
/// renderer cannot write are skipped. Equally close ranges are ordered by
/// [`RENDER_FORMATS`], then by the order the device lists them.
pub fn pick_output_config(
    device: &cpal::Device,
    target_rate: Option<u32>,
) -> Result<cpal::SupportedStreamConfig> {
    let target = match target_rate {
        Some(rate) => rate,
        None => device
            .default_output_config()
            .context("query default output config")?
            .sample_rate(),
    };
    let mut ranges: Vec<cpal::SupportedStreamConfigRange> = device
        .supported_output_configs()
        .context("query output configs")?
        .collect();
    let (index, rate) = closest_range(
        ranges
            .iter()
            .map(|r| (r.min_sample_rate(), r.max_sample_rate(), r.sample_format())),
        target,
    )
    .ok_or_else(|| anyhow!("device offers no output format the renderer can write"))?;
    Ok(ranges.swap_remove(index).with_sample_rate(rate))
}

/// Index of the winning `(min_rate, max_rate, format)` range and the rate to open it at.
fn closest_range(
    ranges: impl IntoIterator<Item = (u32, u32, SampleFormat)>,
    target: u32,
) -> Option<(usize, u32)> {
    ranges
        .into_iter()
        .enumerate()
        .filter_map(|(index, (min, max, format))| {
            let preference = RENDER_FORMATS.iter().position(|f| *f == format)?;
            let rate = target.clamp(min, max.max(min));
            Some((rate.abs_diff(target), preference, index, rate))
        })
        .min_by_key(|&(distance, preference, _, _)| (distance, preference))
        .map(|(_, _, index, rate)| (index, rate))
}
