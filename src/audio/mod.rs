//! audio - Microphone capture and loudness leveling
//!
//! Uses ALSA for capture and device/mixer enumeration, and reduces raw PCM
//! to a smoothed rectified-amplitude level.

mod alsa_device;
mod level_monitor;

pub use alsa_device::{CaptureParams, ControlValue, InputDevice, SampleWidth};
pub use level_monitor::{buffer_average, CaptureConfig, LevelMonitor, LevelWindow, WINDOW_LEN};
