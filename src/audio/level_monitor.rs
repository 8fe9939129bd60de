//! Microphone level monitor.
//!
//! Uses a dedicated std::thread (NOT a tokio task) for the blocking ALSA
//! reads. Each period is reduced to its rectified mean magnitude, scaled,
//! and smoothed over the last `WINDOW_LEN` periods before being handed to
//! the async side through an mpsc channel.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use alsa::pcm::PCM;
use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use super::alsa_device::{self, CaptureParams, ControlValue, InputDevice, SampleWidth};

/// Number of per-buffer averages the smoothed level is computed over.
pub const WINDOW_LEN: usize = 5;

/// Capture configuration.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Desired sample rate (may be negotiated by hardware)
    pub sample_rate: u32,
    /// Desired channel count
    pub channels: u32,
    /// Desired sample width
    pub sample_width: SampleWidth,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            channels: 1,
            sample_width: SampleWidth::S16,
        }
    }
}

/// Mean of `|sample|` over a buffer of interleaved little-endian samples.
///
/// Returns `None` for a buffer that holds no complete sample.
pub fn buffer_average(bytes: &[u8], width: SampleWidth) -> Option<f64> {
    let samples = bytes.chunks_exact(width.bytes());
    let count = samples.len();
    if count == 0 {
        return None;
    }

    let sum: f64 = match width {
        SampleWidth::S8 => samples
            .map(|s| i8::from_le_bytes([s[0]]).unsigned_abs() as f64)
            .sum(),
        SampleWidth::S16 => samples
            .map(|s| i16::from_le_bytes([s[0], s[1]]).unsigned_abs() as f64)
            .sum(),
        SampleWidth::S32 => samples
            .map(|s| i32::from_le_bytes([s[0], s[1], s[2], s[3]]).unsigned_abs() as f64)
            .sum(),
    };
    Some(sum / count as f64)
}

/// Fixed-capacity FIFO of per-buffer averages.
#[derive(Debug, Default)]
pub struct LevelWindow {
    samples: VecDeque<f64>,
}

impl LevelWindow {
    pub fn new() -> Self {
        Self {
            samples: VecDeque::with_capacity(WINDOW_LEN),
        }
    }

    /// Adds one average, evicting the oldest once the window is full, and
    /// returns the window mean whenever the window holds `WINDOW_LEN` values.
    pub fn push(&mut self, average: f64) -> Option<f64> {
        self.samples.push_back(average);
        if self.samples.len() > WINDOW_LEN {
            self.samples.pop_front();
        }
        if self.samples.len() < WINDOW_LEN {
            return None;
        }
        Some(self.samples.iter().sum::<f64>() / WINDOW_LEN as f64)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Captures from one microphone and publishes smoothed levels.
///
/// The device is opened in [`LevelMonitor::open`] so a missing or busy
/// microphone is reported to the caller instead of inside the thread.
pub struct LevelMonitor {
    device: InputDevice,
    params: CaptureParams,
    pcm: Option<PCM>,
    scale: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
    capture_handle: Option<JoinHandle<PCM>>,
    tx: mpsc::Sender<f64>,
}

impl LevelMonitor {
    /// Capture devices in the order [`LevelMonitor::open`] indexes them.
    pub fn devices() -> Result<Vec<InputDevice>> {
        alsa_device::input_devices()
    }

    /// Open the capture device at `index` of [`LevelMonitor::devices`].
    ///
    /// * `config` - Requested capture format
    /// * `tx`     - Receives one smoothed level per captured period once the window is full
    pub fn open(index: usize, config: &CaptureConfig, tx: mpsc::Sender<f64>) -> Result<Self> {
        let device = Self::devices()?
            .into_iter()
            .nth(index)
            .with_context(|| format!("No capture device with index {}", index))?;

        let (pcm, params) = alsa_device::open_capture(
            &device.name,
            config.sample_rate,
            config.channels,
            config.sample_width,
        )?;

        Ok(Self {
            device,
            params,
            pcm: Some(pcm),
            scale: Arc::new(AtomicU64::new(1.0f64.to_bits())),
            running: Arc::new(AtomicBool::new(false)),
            capture_handle: None,
            tx,
        })
    }

    pub fn device(&self) -> &InputDevice {
        &self.device
    }

    pub fn params(&self) -> &CaptureParams {
        &self.params
    }

    pub fn scale(&self) -> f64 {
        f64::from_bits(self.scale.load(Ordering::Relaxed))
    }

    /// Multiplier applied to every per-buffer average; takes effect on the
    /// next captured period.
    pub fn set_scale(&self, scale: f64) {
        self.scale.store(scale.to_bits(), Ordering::Relaxed);
    }

    /// Mixer controls of the device's card (gain, mute...), display only.
    pub fn properties(&self) -> Result<BTreeMap<String, ControlValue>> {
        alsa_device::mixer_controls(&self.device.name)
    }

    /// False once the capture thread has exited, including on its own after
    /// the level receiver is dropped or the device could not be recovered.
    pub fn is_running(&self) -> bool {
        thread_alive(self.capture_handle.as_ref())
    }

    /// Starts capturing. A no-op when already running.
    pub fn start(&mut self) -> Result<()> {
        // A thread that exited on its own still holds the device until joined.
        if self.capture_handle.is_some() && !self.is_running() {
            self.stop();
        }
        if self.capture_handle.is_some() {
            return Ok(());
        }
        let pcm = self
            .pcm
            .take()
            .context("Capture device was lost by a previous capture thread")?;

        if let Err(e) = pcm.prepare().and_then(|_| pcm.start()) {
            self.pcm = Some(pcm);
            return Err(e).with_context(|| format!("Failed to start capture on '{}'", self.device.name));
        }

        self.running.store(true, Ordering::SeqCst);
        let handle = {
            let params = self.params.clone();
            let scale = self.scale.clone();
            let running = self.running.clone();
            let tx = self.tx.clone();
            thread::Builder::new()
                .name("audio-level".into())
                .spawn(move || capture_thread(pcm, &params, &scale, &running, &tx))
                .context("Failed to spawn capture thread")?
        };
        self.capture_handle = Some(handle);
        Ok(())
    }

    /// Signal the capture thread to stop and wait for it to hand the device back.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.capture_handle.take() {
            match handle.join() {
                Ok(pcm) => {
                    if let Err(e) = pcm.drop() {
                        log::warn!("Failed to drop pending capture frames: {}", e);
                    }
                    self.pcm = Some(pcm);
                }
                Err(_) => log::error!("Capture thread panicked"),
            }
        }
    }
}

impl Drop for LevelMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn thread_alive<T>(handle: Option<&JoinHandle<T>>) -> bool {
    handle.is_some_and(|h| !h.is_finished())
}

// ======================== Capture thread ========================

fn capture_thread(
    pcm: PCM,
    params: &CaptureParams,
    scale: &AtomicU64,
    running: &AtomicBool,
    tx: &mpsc::Sender<f64>,
) -> PCM {
    let frame_bytes = params.frame_bytes();
    let mut read_buf = vec![0u8; params.period_size * frame_bytes];
    let mut window = LevelWindow::new();

    log::info!(
        "Level capture started: rate={}, ch={}, period={}",
        params.sample_rate,
        params.channels,
        params.period_size,
    );

    {
        let io = pcm.io_bytes();
        while running.load(Ordering::Relaxed) {
            match io.readi(&mut read_buf) {
                Ok(frames) => {
                    let recorded = (frames * frame_bytes).min(read_buf.len());
                    let Some(average) = buffer_average(&read_buf[..recorded], params.sample_width)
                    else {
                        continue;
                    };
                    let scaled = average * f64::from_bits(scale.load(Ordering::Relaxed));
                    let Some(level) = window.push(scaled) else {
                        continue;
                    };
                    // Never block the capture loop on a slow consumer.
                    match tx.try_send(level) {
                        Ok(()) | Err(TrySendError::Full(_)) => {}
                        Err(TrySendError::Closed(_)) => {
                            log::warn!("Level receiver dropped, stopping capture");
                            break;
                        }
                    }
                }
                Err(e) => {
                    log::warn!("ALSA capture error: {}, recovering...", e);
                    if let Err(e2) = pcm.prepare() {
                        log::error!("Failed to recover PCM capture: {}", e2);
                        break;
                    }
                }
            }
        }
    }

    log::info!("Level capture stopped");
    pcm
}
