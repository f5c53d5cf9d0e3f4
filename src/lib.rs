// dynswapd - dynamic swappiness and swap-pool controller driven by PSI pressure
// SPDX-License-Identifier: GPL-3.0-or-later

pub mod bootgate;
pub mod config;
pub mod controller;
pub mod defaults;
pub mod helpers;
pub mod inventory;
pub mod lifecycle;
pub mod pidfile;
pub mod power;
pub mod pressure;
pub mod swappiness;
pub mod syscalls;

use std::sync::atomic::{AtomicBool, Ordering};

/// Process-wide running flag observed by every sleep loop (spec.md §4.9).
/// Starts true; a termination signal flips it false and every blocking
/// wait exits at its next sub-tick.
pub static RUNNING: AtomicBool = AtomicBool::new(true);

/// True until a termination signal has been handled.
pub fn running() -> bool {
    RUNNING.load(Ordering::Acquire)
}

/// Request termination: flips `RUNNING` false for every observer.
pub fn request_shutdown() {
    RUNNING.store(false, Ordering::Release);
}
