// Thin safe wrappers over the swapon(2)/swapoff(2) syscalls
// SPDX-License-Identifier: GPL-3.0-or-later

use std::ffi::CString;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

// Matches <linux/swap.h>: SWAP_FLAG_PREFER selects a priority out of the
// low 15 bits instead of letting the kernel pick one automatically.
const SWAP_FLAG_PREFER: i32 = 0x8000;
const SWAP_FLAG_PRIO_MASK: i32 = 0x7fff;

fn path_to_cstring(path: &Path) -> io::Result<CString> {
    CString::new(path.as_os_str().as_bytes())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains a NUL byte"))
}

/// Activates `path` as a swap device/file (consumed as-is; dynswapd never
/// sizes or formats backing stores). `priority` mirrors the `swapon -p`
/// convention both `dynv.cpp` revisions use: a strictly-decreasing
/// per-activation value so the kernel's own priority ordering agrees with
/// the controller's `active` activation order.
pub fn swapon(path: &Path, priority: i32) -> io::Result<()> {
    let c_path = path_to_cstring(path)?;
    let flags = SWAP_FLAG_PREFER | (priority & SWAP_FLAG_PRIO_MASK);
    let rc = unsafe { libc::swapon(c_path.as_ptr(), flags) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

/// Deactivates `path`. Blocks in the kernel until outstanding pages have
/// been paged back in — callers run this off the controller's tick thread.
pub fn swapoff(path: &Path) -> io::Result<()> {
    let c_path = path_to_cstring(path)?;
    let rc = unsafe { libc::swapoff(c_path.as_ptr()) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}
