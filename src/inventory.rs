// Swap device inventory: candidate discovery and /proc/swaps accounting
// SPDX-License-Identifier: GPL-3.0-or-later

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::defaults;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapClass {
    Compressed,
    File,
}

/// `compressed` is inferred from the substring `zram`; everything else
/// that reached here (candidates are pre-filtered to paths containing
/// `swap` or `zram`) is classified as `file`, keyed on the configured
/// swap-file marker when present for clarity in logs.
pub fn classify(path: &Path, file_marker: &str) -> SwapClass {
    let s = path.to_string_lossy();
    if s.contains("zram") {
        SwapClass::Compressed
    } else {
        let _ = file_marker; // kept for symmetry with the activation log line
        SwapClass::File
    }
}

fn trailing_number(path: &Path) -> u64 {
    let s = path.to_string_lossy();
    let digits: String = s.chars().rev().take_while(|c| c.is_ascii_digit()).collect();
    digits.chars().rev().collect::<String>().parse().unwrap_or(0)
}

/// Scan the candidate directories for un-adopted swap devices/files,
/// classify and sort each class by trailing numeric suffix descending
/// (so the smallest index sits at the tail, popped first).
pub fn list_candidates(
    dirs: &[&Path],
    file_marker: &str,
    active: &HashSet<PathBuf>,
) -> (Vec<PathBuf>, Vec<PathBuf>) {
    let mut compressed = Vec::new();
    let mut file = Vec::new();

    for dir in dirs {
        let Ok(entries) = fs::read_dir(dir) else { continue };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                continue;
            }
            let s = path.to_string_lossy();
            if !(s.contains("swap") || s.contains("zram")) {
                continue;
            }
            if active.contains(&path) {
                continue;
            }
            match classify(&path, file_marker) {
                SwapClass::Compressed => compressed.push(path),
                SwapClass::File => file.push(path),
            }
        }
    }

    compressed.sort_by_key(|p| std::cmp::Reverse(trailing_number(p)));
    file.sort_by_key(|p| std::cmp::Reverse(trailing_number(p)));
    (compressed, file)
}

struct SwapsRow {
    path: PathBuf,
    priority: i64,
    size_pages: u64,
    used_pages: u64,
}

/// Parse `/proc/swaps`: skip the header, then positionally split each row
/// into `Filename Type Size Used Priority` (named-column parsing is not
/// guaranteed stable across kernels; the column order is).
fn parse_swaps(content: &str) -> Vec<SwapsRow> {
    content
        .lines()
        .skip(1)
        .filter_map(|line| {
            let mut cols = line.split_whitespace();
            let path = cols.next()?;
            let _kind = cols.next()?;
            let size_pages = cols.next()?.parse().ok()?;
            let used_pages = cols.next()?.parse().ok()?;
            let priority = cols.next().and_then(|p| p.parse().ok()).unwrap_or(0);
            Some(SwapsRow {
                path: PathBuf::from(path),
                priority,
                size_pages,
                used_pages,
            })
        })
        .collect()
}

/// Active devices, sorted by used_pages descending.
pub fn list_active(swaps_path: &Path) -> Vec<(PathBuf, u64)> {
    let Ok(content) = fs::read_to_string(swaps_path) else {
        return Vec::new();
    };
    let mut rows = parse_swaps(&content);
    rows.sort_by_key(|r| std::cmp::Reverse(r.used_pages));
    rows.into_iter().map(|r| (r.path, r.used_pages)).collect()
}

/// Active devices whose path matches the naming convention used to
/// identify devices under our management (`zram`/file marker), ordered
/// oldest-first by the kernel swap priority we assigned at activation
/// (strictly decreasing, so the highest priority is the oldest device).
/// Used once at startup to reconstruct `active` after a restart.
pub fn list_managed_active(swaps_path: &Path, file_marker: &str) -> Vec<(PathBuf, SwapClass, i32)> {
    let Ok(content) = fs::read_to_string(swaps_path) else {
        return Vec::new();
    };
    let mut rows: Vec<SwapsRow> = parse_swaps(&content)
        .into_iter()
        .filter(|r| {
            let s = r.path.to_string_lossy();
            s.contains("zram") || s.contains(file_marker)
        })
        .collect();
    rows.sort_by_key(|r| std::cmp::Reverse(r.priority));
    rows.into_iter()
        .map(|r| (r.path.clone(), classify(&r.path, file_marker), r.priority as i32))
        .collect()
}

/// `(used_mb, used_pct)` for the device at `path`, read fresh from
/// `/proc/swaps`. `(0, 0)` both when the device has vanished and when its
/// advertised size is zero — either way there's no usage signal to act on.
pub fn usage(swaps_path: &Path, path: &Path) -> (u64, u8) {
    let Ok(content) = fs::read_to_string(swaps_path) else {
        return (0, 0);
    };
    let rows = parse_swaps(&content);
    match rows.iter().find(|r| r.path == path) {
        Some(r) if r.size_pages > 0 => {
            let used_mb = r.used_pages / 1024;
            let pct = ((r.used_pages * 100) / r.size_pages).min(100) as u8;
            (used_mb, pct)
        }
        _ => (0, 0),
    }
}

pub fn candidate_dirs() -> [PathBuf; 2] {
    [
        PathBuf::from(defaults::ZRAM_CANDIDATE_DIR),
        PathBuf::from(defaults::FILE_CANDIDATE_DIR),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn classify_zram_is_compressed() {
        assert_eq!(classify(Path::new("/dev/block/zram3"), "fmiop_swap."), SwapClass::Compressed);
    }

    #[test]
    fn classify_marker_is_file() {
        assert_eq!(
            classify(Path::new("/data/adb/dynswapd/swap/fmiop_swap.2"), "fmiop_swap."),
            SwapClass::File
        );
    }

    #[test]
    fn trailing_number_extracts_suffix() {
        assert_eq!(trailing_number(Path::new("/dev/block/zram3")), 3);
        assert_eq!(trailing_number(Path::new("/data/swap/fmiop_swap.12")), 12);
        assert_eq!(trailing_number(Path::new("/dev/block/zram")), 0);
    }

    #[test]
    fn parse_swaps_skips_header_and_reads_columns() {
        let content = "Filename\t\t\t\tType\t\tSize\t\tUsed\t\tPriority\n\
                        /dev/block/zram0                       partition\t4194300\t1048576\t32767\n\
                        /data/adb/dynswapd/swap/fmiop_swap.0    file    \t2097152\t0\t-2\n";
        let rows = parse_swaps(content);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].path, PathBuf::from("/dev/block/zram0"));
        assert_eq!(rows[0].size_pages, 4194300);
        assert_eq!(rows[0].used_pages, 1048576);
        assert_eq!(rows[0].priority, 32767);
        assert_eq!(rows[1].priority, -2);
    }

    #[test]
    fn list_active_sorts_by_used_descending() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("dynswapd-swaps-test-{}", std::process::id()));
        let content = "Filename Type Size Used Priority\n\
                        /dev/block/zram0 partition 1000 100 32767\n\
                        /dev/block/zram1 partition 1000 500 32766\n";
        fs::File::create(&path).unwrap().write_all(content.as_bytes()).unwrap();
        let active = list_active(&path);
        assert_eq!(active, vec![
            (PathBuf::from("/dev/block/zram1"), 500),
            (PathBuf::from("/dev/block/zram0"), 100),
        ]);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn usage_handles_zero_size_as_undefined() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("dynswapd-swaps-zero-test-{}", std::process::id()));
        let content = "Filename Type Size Used Priority\n/dev/block/zram0 partition 0 0 32767\n";
        fs::File::create(&path).unwrap().write_all(content.as_bytes()).unwrap();
        assert_eq!(usage(&path, Path::new("/dev/block/zram0")), (0, 0));
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn usage_of_absent_device_is_zero() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("dynswapd-swaps-absent-test-{}", std::process::id()));
        fs::File::create(&path).unwrap().write_all(b"Filename Type Size Used Priority\n").unwrap();
        assert_eq!(usage(&path, Path::new("/dev/block/zram9")), (0, 0));
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn list_candidates_filters_active_and_sorts_descending() {
        let base = std::env::temp_dir().join(format!("dynswapd-candidates-test-{}", std::process::id()));
        fs::create_dir_all(&base).unwrap();
        for name in ["zram0", "zram1", "zram2", "not-a-candidate"] {
            fs::File::create(base.join(name)).unwrap();
        }
        let mut active = HashSet::new();
        active.insert(base.join("zram1"));

        let (compressed, file) = list_candidates(&[&base], "fmiop_swap.", &active);
        assert_eq!(compressed, vec![base.join("zram2"), base.join("zram0")]);
        assert!(file.is_empty());

        let _ = fs::remove_dir_all(&base);
    }
}
