// Boot-wait gate: suppresses swappiness writes during the post-boot warm-up
// SPDX-License-Identifier: GPL-3.0-or-later

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use crate::{defaults, info, warn};

#[derive(Debug, Clone)]
pub struct BootGate {
    path: PathBuf,
}

impl BootGate {
    pub fn new() -> Self {
        Self::at(defaults::BOOT_GATE_PATH)
    }

    pub fn at<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    /// True iff the gate file exists and contains `true`. A missing file
    /// means no external component armed the gate, so writes proceed
    /// immediately — this is the common case for a manual/interactive start.
    pub fn is_set(&self) -> bool {
        fs::read_to_string(&self.path)
            .map(|s| s.trim() == "true")
            .unwrap_or(false)
    }

    pub fn clear(&self) {
        if let Some(parent) = self.path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        if let Err(e) = fs::write(&self.path, "false") {
            warn!("BootGate: failed to clear {}: {}", self.path.display(), e);
        }
    }

    /// Spawn a one-shot waiter that sleeps for `warmup`, then clears the
    /// gate. Polls the running flag every second so a shutdown mid-warmup
    /// doesn't leave the process waiting on a thread past exit.
    pub fn spawn_waiter(self, warmup: Duration) {
        thread::spawn(move || {
            let ticks = warmup.as_secs().max(1);
            for _ in 0..ticks {
                if !crate::RUNNING.load(Ordering::Acquire) {
                    return;
                }
                thread::sleep(Duration::from_secs(1));
            }
            info!("BootGate: warm-up elapsed, clearing gate");
            self.clear();
        });
    }
}

impl Default for BootGate {
    fn default() -> Self {
        Self::new()
    }
}
