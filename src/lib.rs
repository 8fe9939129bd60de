pub mod audio;
pub mod config;
pub mod range_detector;
pub mod tv_remote;
pub mod volume_controller;

use std::sync::{Mutex, MutexGuard};

/// Locks a std mutex, taking the data back from a panicked holder.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
