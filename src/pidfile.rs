// PID registry: a name=pid line store, rewritten in place on every save
// SPDX-License-Identifier: GPL-3.0-or-later

use std::fs;
use std::path::Path;

use crate::{defaults, info, warn};

pub fn save_pid(name: &str, pid: i32) {
    save_pid_at(Path::new(defaults::PID_REGISTRY_PATH), name, pid);
}

fn save_pid_at(path: &Path, name: &str, pid: i32) {
    let existing = fs::read_to_string(path).unwrap_or_default();
    let prefix = format!("{}=", name);

    let mut replaced = false;
    let mut lines: Vec<String> = existing
        .lines()
        .filter(|line| {
            if line.starts_with(&prefix) {
                replaced = true;
                false
            } else {
                true
            }
        })
        .map(String::from)
        .collect();
    lines.push(format!("{}{}", prefix, pid));

    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }

    let content = lines.join("\n") + "\n";
    match fs::write(path, content) {
        Ok(()) => info!(
            "PID registry: {} {}={} in {}",
            if replaced { "updated" } else { "recorded" },
            name,
            pid,
            path.display()
        ),
        Err(e) => warn!("PID registry: failed to write {}: {}", path.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("dynswapd-pidfile-test-{}-{}", std::process::id(), name));
        path
    }

    #[test]
    fn creates_registry_with_one_entry() {
        let path = temp_path("create");
        save_pid_at(&path, "dynswapd", 1234);
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "dynswapd=1234\n");
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn replaces_existing_entry_for_same_name() {
        let path = temp_path("replace");
        save_pid_at(&path, "dynswapd", 1234);
        save_pid_at(&path, "dynswapd", 5678);
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "dynswapd=5678\n");
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn preserves_other_names() {
        let path = temp_path("preserve");
        save_pid_at(&path, "other-daemon", 1);
        save_pid_at(&path, "dynswapd", 2);
        save_pid_at(&path, "dynswapd", 3);
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("other-daemon=1\n"));
        assert!(content.contains("dynswapd=3\n"));
        assert!(!content.contains("dynswapd=2\n"));
        let _ = fs::remove_file(&path);
    }
}
