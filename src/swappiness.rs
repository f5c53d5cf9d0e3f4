// The vm.swappiness knob
// SPDX-License-Identifier: GPL-3.0-or-later

use std::path::Path;

use crate::defaults;
use crate::error;
use crate::helpers::{read_file, write_file};

/// Current kernel value, or `None` if `/proc/sys/vm/swappiness` can't be
/// read (missing sysctl, permission error).
pub fn read() -> Option<i32> {
    read_from(Path::new(defaults::SWAPPINESS_PATH))
}

fn read_from(path: &Path) -> Option<i32> {
    read_file(path).ok()?.trim().parse().ok()
}

/// Best-effort write. Failures are logged, never raised: a rejected write
/// (e.g. a sysctl locked down by another policy) is not fatal to the
/// control loop, it's retried naturally on the next commit.
pub fn write(value: i32) {
    write_to(Path::new(defaults::SWAPPINESS_PATH), value);
}

fn write_to(path: &Path, value: i32) {
    if let Err(e) = write_file(path, &value.to_string()) {
        error!("Swappiness: failed to write {} to {}: {}", value, path.display(), e);
    }
}
