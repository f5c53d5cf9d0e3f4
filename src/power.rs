// Power-state probing
// SPDX-License-Identifier: GPL-3.0-or-later

use std::process::Command;

use crate::warn;

const WAKEFULNESS_TOKEN: &str = "mWakefulness=Asleep";
const DEEP_IDLE_TOKEN: &str = "IDLE";

/// True iff the device's power dump reports the asleep wakefulness state.
/// Best effort: a spawn or read failure is logged and treated as awake,
/// since that's the safer default (it keeps the deactivate-in-sleep path
/// from firing on a host where the probe simply isn't available).
pub fn is_asleep() -> bool {
    match run(&["dumpsys", "power"]) {
        Ok(out) => is_asleep_output(&out),
        Err(e) => {
            warn!("Power probe: dumpsys power failed: {}", e);
            false
        }
    }
}

/// True iff the device's deep-idle query trims to exactly `IDLE`.
pub fn is_deep_idle() -> bool {
    match run(&["dumpsys", "deviceidle", "get", "deep"]) {
        Ok(out) => is_deep_idle_output(&out),
        Err(e) => {
            warn!("Power probe: dumpsys deviceidle failed: {}", e);
            false
        }
    }
}

fn is_asleep_output(out: &str) -> bool {
    out.contains(WAKEFULNESS_TOKEN)
}

fn is_deep_idle_output(out: &str) -> bool {
    out.trim() == DEEP_IDLE_TOKEN
}

/// No shell, argv-based spawn: avoids quoting/injection concerns entirely.
fn run(argv: &[&str]) -> std::io::Result<String> {
    let output = Command::new(argv[0]).args(&argv[1..]).output()?;
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}
