//! Closed-loop volume control.
//!
//! Microphone levels go through the range detector; crossings start or stop
//! a repeating key press on the TV. Volume down repeats faster than volume
//! up so the TV backs off quickly and creeps back slowly.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::audio::LevelMonitor;
use crate::lock;
use crate::range_detector::{Boundaries, Cross, RangeDetector};
use crate::tv_remote::{Key, Remote};

pub const VOLUME_UP_INTERVAL: Duration = Duration::from_millis(2000);
pub const VOLUME_DOWN_INTERVAL: Duration = Duration::from_millis(300);

/// Full-scale value of the 16-bit level that maps to 100 on the detector scale.
pub const LEVEL_FULL_SCALE: f64 = 65535.0;
pub const DEFAULT_LOW_HYSTERESIS: f64 = 3.0;
pub const DEFAULT_HIGH_HYSTERESIS: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActiveKey {
    #[default]
    None,
    Up,
    Down,
}

impl ActiveKey {
    fn key(self) -> Option<Key> {
        match self {
            ActiveKey::None => None,
            ActiveKey::Up => Some(Key::VolumeUp),
            ActiveKey::Down => Some(Key::VolumeDown),
        }
    }

    fn step(self) -> i32 {
        match self {
            ActiveKey::None => 0,
            ActiveKey::Up => 1,
            ActiveKey::Down => -1,
        }
    }

    fn interval(self) -> Option<Duration> {
        match self {
            ActiveKey::None => None,
            ActiveKey::Up => Some(VOLUME_UP_INTERVAL),
            ActiveKey::Down => Some(VOLUME_DOWN_INTERVAL),
        }
    }
}

#[derive(Debug)]
struct ControlState {
    enabled: bool,
    current_volume: i32,
    max_volume: i32,
    active_key: ActiveKey,
}

enum Tick {
    Idle,
    Sent,
    Saturated,
}

struct Repeater {
    cancel: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

pub struct VolumeController<R: Remote + 'static> {
    remote: Arc<R>,
    detector: RangeDetector,
    monitor: Option<LevelMonitor>,
    state: Arc<Mutex<ControlState>>,
    repeater: Option<Repeater>,
    tx: mpsc::Sender<i32>,
}

impl<R: Remote + 'static> VolumeController<R> {
    /// * `remote` - Client the key presses go to; shut down with the controller
    /// * `bounds` - Detector thresholds on the 0..100 level scale
    /// * `tx`     - Receives the new volume after each key sent
    pub fn new(remote: Arc<R>, bounds: Boundaries, tx: mpsc::Sender<i32>) -> Self {
        Self {
            remote,
            detector: RangeDetector::new(bounds),
            monitor: None,
            state: Arc::new(Mutex::new(ControlState {
                enabled: true,
                current_volume: 0,
                max_volume: 0,
                active_key: ActiveKey::None,
            })),
            repeater: None,
            tx,
        }
    }

    /// Hands the microphone over so it is stopped on shutdown.
    pub fn with_monitor(mut self, monitor: LevelMonitor) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn remote(&self) -> &Arc<R> {
        &self.remote
    }

    pub fn monitor(&self) -> Option<&LevelMonitor> {
        self.monitor.as_ref()
    }

    pub fn detector(&self) -> &RangeDetector {
        &self.detector
    }

    pub fn detector_mut(&mut self) -> &mut RangeDetector {
        &mut self.detector
    }

    pub fn is_enabled(&self) -> bool {
        lock(&self.state).enabled
    }

    /// Disabling stops the repeat timer; enabling does not restart it.
    pub async fn set_enabled(&mut self, enabled: bool) {
        lock(&self.state).enabled = enabled;
        if !enabled {
            self.stop_repeating().await;
        }
    }

    /// Our estimate of the TV volume. Must match the TV before enabling.
    pub fn current_volume(&self) -> i32 {
        lock(&self.state).current_volume
    }

    pub fn set_current_volume(&self, volume: i32) {
        lock(&self.state).current_volume = volume;
    }

    pub fn max_volume(&self) -> i32 {
        lock(&self.state).max_volume
    }

    pub fn set_max_volume(&self, volume: i32) {
        lock(&self.state).max_volume = volume;
    }

    pub fn active_key(&self) -> ActiveKey {
        lock(&self.state).active_key
    }

    pub fn is_repeating(&self) -> bool {
        self.repeater
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }

    /// Feeds one smoothed microphone level and reacts to the crossing.
    pub async fn handle_level(&mut self, level: f64) -> Cross {
        let normalized = level / LEVEL_FULL_SCALE * 100.0;
        let cross = self.detector.feed(normalized);
        if cross != Cross::None {
            log::debug!("Level {:.1} crossed: {:?}", normalized, cross);
        }
        self.handle_cross(cross).await;
        cross
    }

    pub async fn handle_cross(&mut self, cross: Cross) {
        match cross {
            Cross::ExitUp => self.start_repeating(ActiveKey::Down).await,
            Cross::ExitDown => self.start_repeating(ActiveKey::Up).await,
            Cross::Enter => self.stop_repeating().await,
            Cross::None => {}
        }
    }

    async fn start_repeating(&mut self, key: ActiveKey) {
        self.stop_repeating().await;

        let enabled = {
            let mut state = lock(&self.state);
            state.active_key = key;
            state.enabled
        };
        if !enabled {
            return;
        }
        let Some(period) = key.interval() else {
            return;
        };

        log::info!("Repeating {:?} every {:?}", key, period);
        self.repeater = Some(spawn_repeater(
            self.remote.clone(),
            self.state.clone(),
            self.tx.clone(),
            period,
        ));
    }

    /// Stops the repeat timer and waits for an in-flight tick to finish.
    pub async fn stop_repeating(&mut self) {
        if let Some(repeater) = self.repeater.take() {
            let _ = repeater.cancel.send(());
            if let Err(e) = repeater.handle.await {
                log::warn!("Repeat task ended abnormally: {}", e);
            }
        }
    }

    /// Stops the timer, then closes the remote and the microphone.
    pub async fn shutdown(mut self) {
        self.stop_repeating().await;
        self.remote.close().await;
        if let Some(monitor) = self.monitor.take() {
            // Joining the capture thread blocks until the current period is read.
            if let Err(e) = tokio::task::spawn_blocking(move || drop(monitor)).await {
                log::error!("Failed to stop the microphone: {}", e);
            }
        }
    }
}

impl<R: Remote + 'static> Drop for VolumeController<R> {
    fn drop(&mut self) {
        if let Some(repeater) = self.repeater.take() {
            repeater.handle.abort();
        }
    }
}

fn spawn_repeater<R: Remote + 'static>(
    remote: Arc<R>,
    state: Arc<Mutex<ControlState>>,
    tx: mpsc::Sender<i32>,
    period: Duration,
) -> Repeater {
    let (cancel, mut cancelled) = oneshot::channel::<()>();

    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        // A tick still sending when the next is due skips it instead of bursting.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = &mut cancelled => break,
                _ = ticker.tick() => {
                    if let Tick::Saturated = tick(remote.as_ref(), &state, &tx).await {
                        log::info!("Volume limit reached, stopping");
                        break;
                    }
                }
            }
        }
    });

    Repeater { cancel, handle }
}

async fn tick<R: Remote + ?Sized>(
    remote: &R,
    state: &Mutex<ControlState>,
    tx: &mpsc::Sender<i32>,
) -> Tick {
    let (key, volume) = {
        let mut state = lock(state);
        let Some(key) = state.active_key.key() else {
            return Tick::Idle;
        };
        if !state.enabled || !remote.is_connected() {
            return Tick::Idle;
        }
        let next = state.current_volume + state.active_key.step();
        if next > state.max_volume {
            return Tick::Saturated;
        }
        state.current_volume = next;
        (key, next)
    };

    log::debug!("Volume {} -> {}", key, volume);
    if !remote.press(key).await {
        log::warn!("Failed to send {} to the TV", key);
    }
    if let Err(e) = tx.send(volume).await {
        log::debug!("Volume change not delivered: {}", e);
    }
    Tick::Sent
}
