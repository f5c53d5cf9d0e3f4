// PSI (pressure stall information) sampling
// SPDX-License-Identifier: GPL-3.0-or-later

use std::fs;

use crate::defaults;

/// Sample one `avg10`/`avg60`/`avg300`/`total` value out of
/// `/proc/pressure/<resource>`. Returns `None` ("unreadable") on any
/// failure — an unmounted PSI interface, a missing `level` line, or a
/// missing `key` token — rather than propagating, since the controller
/// treats an unreadable snapshot as pressured regardless of cause.
pub fn sample(resource: &str, level: &str, key: &str) -> Option<f64> {
    let path = format!("{}/{}", defaults::PRESSURE_DIR, resource);
    let content = fs::read_to_string(&path).ok()?;
    parse(&content, level, key)
}

fn parse(content: &str, level: &str, key: &str) -> Option<f64> {
    for line in content.lines() {
        let mut words = line.split_whitespace();
        if words.next()? != level {
            continue;
        }
        for tok in words {
            if let Some((k, v)) = tok.split_once('=') {
                if k == key {
                    return v.parse::<f64>().ok();
                }
            }
        }
        return None; // matched the level line but the key wasn't on it
    }
    None
}
