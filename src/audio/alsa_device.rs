//! ALSA capture device wrappers: enumeration, opening, and mixer controls.

use alsa::device_name::HintIter;
use alsa::mixer::{Mixer, Selem, SelemChannelId};
use alsa::pcm::{Access, Format, HwParams, PCM};
use alsa::{Direction, ValueOr};
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fmt;

/// A capture-capable PCM as listed by ALSA's device hints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputDevice {
    /// ALSA device string (e.g. "default", "hw:CARD=PCH,DEV=0")
    pub name: String,
    /// Human readable description, if the driver provides one
    pub description: Option<String>,
}

impl fmt::Display for InputDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.description {
            Some(desc) => write!(f, "{} ({})", self.name, desc),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Signed little-endian sample widths the level meter understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleWidth {
    S8,
    S16,
    S32,
}

impl SampleWidth {
    pub fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            8 => Some(Self::S8),
            16 => Some(Self::S16),
            32 => Some(Self::S32),
            _ => None,
        }
    }

    pub fn bytes(self) -> usize {
        match self {
            Self::S8 => 1,
            Self::S16 => 2,
            Self::S32 => 4,
        }
    }

    fn format(self) -> Format {
        match self {
            Self::S8 => Format::S8,
            Self::S16 => Format::S16LE,
            Self::S32 => Format::S32LE,
        }
    }

    fn from_format(format: Format) -> Option<Self> {
        match format {
            Format::S8 => Some(Self::S8),
            Format::S16LE => Some(Self::S16),
            Format::S32LE => Some(Self::S32),
            _ => None,
        }
    }
}

/// Parameters negotiated with the ALSA hardware.
#[derive(Debug, Clone)]
pub struct CaptureParams {
    /// Actual sample rate after negotiation
    pub sample_rate: u32,
    /// Actual number of channels
    pub channels: u32,
    /// Sample width the device reports after negotiation
    pub sample_width: SampleWidth,
    /// Period size in frames (one frame = channels × sample width)
    pub period_size: usize,
}

impl CaptureParams {
    pub fn frame_bytes(&self) -> usize {
        self.channels as usize * self.sample_width.bytes()
    }
}

/// Lists PCM devices that can capture, in ALSA hint order.
pub fn input_devices() -> Result<Vec<InputDevice>> {
    let hints =
        HintIter::new_str(None, "pcm").context("Failed to enumerate ALSA PCM devices")?;

    Ok(hints
        .filter(|hint| hint.direction.is_none_or(|dir| dir == Direction::Capture))
        .filter_map(|hint| {
            let name = hint.name?;
            if name == "null" {
                return None;
            }
            Some(InputDevice {
                name,
                description: hint.desc.map(|desc| desc.replace('\n', " ")),
            })
        })
        .collect())
}

/// Open a PCM device for capture (recording).
pub fn open_capture(
    device: &str,
    sample_rate: u32,
    channels: u32,
    width: SampleWidth,
) -> Result<(PCM, CaptureParams)> {
    let pcm = PCM::new(device, Direction::Capture, false)
        .with_context(|| format!("Failed to open PCM device '{}' for Capture", device))?;

    {
        let hwp = HwParams::any(&pcm).with_context(|| "Failed to initialize HwParams")?;
        hwp.set_access(Access::RWInterleaved)?;
        hwp.set_format(width.format())
            .with_context(|| format!("Device '{}' does not support {:?}", device, width))?;
        hwp.set_channels(channels)?;
        hwp.set_rate_near(sample_rate, ValueOr::Nearest)?;
        pcm.hw_params(&hwp)?;
    }

    // Read back actual negotiated parameters
    let (actual_rate, actual_channels, actual_format, period_size) = {
        let hwp = pcm.hw_params_current()?;
        let rate = hwp.get_rate()?;
        let ch = hwp.get_channels()?;
        let format = hwp.get_format()?;
        let ps = hwp.get_period_size()? as usize;
        (rate, ch, format, ps)
    };

    let sample_width = SampleWidth::from_format(actual_format)
        .with_context(|| format!("Unsupported capture format {:?}", actual_format))?;

    let params = CaptureParams {
        sample_rate: actual_rate,
        channels: actual_channels,
        sample_width,
        period_size,
    };

    log::info!(
        "ALSA Capture: device={}, rate={}, channels={}, width={:?}, period_size={}",
        device,
        actual_rate,
        actual_channels,
        sample_width,
        period_size,
    );

    Ok((pcm, params))
}

/// Value of one mixer control, for display only.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlValue {
    Percent(f64),
    Switch(bool),
}

impl fmt::Display for ControlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Percent(p) => write!(f, "{:.0}%", p),
            Self::Switch(on) => write!(f, "{}", if *on { "on" } else { "off" }),
        }
    }
}

/// Reads the capture volume and capture switch controls of the card that
/// backs `device`.
pub fn mixer_controls(device: &str) -> Result<BTreeMap<String, ControlValue>> {
    let card = mixer_card(device);
    let mixer = Mixer::new(&card, false)
        .with_context(|| format!("Failed to open mixer '{}'", card))?;

    let mut controls = BTreeMap::new();
    for elem in mixer.iter() {
        let Some(selem) = Selem::new(elem) else {
            continue;
        };
        let name = match selem.get_id().get_name() {
            Ok(name) => name.to_string(),
            Err(_) => continue,
        };

        if selem.has_capture_volume() {
            let (min, max) = selem.get_capture_volume_range();
            if let Ok(value) = selem.get_capture_volume(SelemChannelId::mono()) {
                controls.insert(
                    format!("{} Capture Volume", name),
                    ControlValue::Percent(percent(value, min, max)),
                );
            }
        }
        if selem.has_capture_switch() {
            if let Ok(value) = selem.get_capture_switch(SelemChannelId::mono()) {
                controls.insert(
                    format!("{} Capture Switch", name),
                    ControlValue::Switch(value != 0),
                );
            }
        }
    }
    Ok(controls)
}

fn percent(value: i64, min: i64, max: i64) -> f64 {
    if max <= min {
        return 0.0;
    }
    (value - min) as f64 * 100.0 / (max - min) as f64
}

/// Maps a PCM device string to the control device of its card.
fn mixer_card(device: &str) -> String {
    let Some((prefix, rest)) = device.split_once(':') else {
        return "default".to_string();
    };
    let first = rest.split(',').next().unwrap_or_default();
    if first.starts_with("CARD=") || prefix.ends_with("hw") {
        format!("hw:{}", first)
    } else {
        "default".to_string()
    }
}
