// Daemonization boundary. dynswapd does not own a supervisor (spec.md §1
// names session detachment, fd closing, and working-directory change as an
// external collaborator's job) — this module exists only so the startup
// failure modes spec.md §7 assigns to that collaborator (fork/setsid/chdir
// failure aborts the process with non-zero status) have somewhere to live.
// SPDX-License-Identifier: GPL-3.0-or-later

use std::fs::{self, OpenOptions};
use std::os::unix::io::AsRawFd;
use std::path::Path;

use nix::unistd::{self, ForkResult};
use thiserror::Error;

use crate::defaults;

#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("fork failed: {0}")]
    Fork(#[source] nix::errno::Errno),
    #[error("setsid failed: {0}")]
    Setsid(#[source] nix::errno::Errno),
    #[error("chdir failed: {0}")]
    Chdir(#[source] nix::errno::Errno),
    #[error("failed to open log file {0}: {1}")]
    LogFile(String, #[source] std::io::Error),
    #[error("failed to redirect standard descriptor: {0}")]
    Redirect(#[source] nix::errno::Errno),
}

pub type Result<T> = std::result::Result<T, LifecycleError>;

/// Signal outcome of `daemonize()`: the parent exits immediately after a
/// successful fork, the child keeps running as the daemon proper.
pub enum DaemonizeOutcome {
    ParentShouldExit,
    Child,
}

/// Double-fork, detach from the controlling terminal, `chdir("/")`, and
/// redirect stdin to `/dev/null` and stdout/stderr to the log file so the
/// `info!`/`warn!`/`error!` macros keep producing visible output under a
/// process supervisor that doesn't capture an already-detached session.
pub fn daemonize() -> Result<DaemonizeOutcome> {
    match unsafe { unistd::fork() }.map_err(LifecycleError::Fork)? {
        ForkResult::Parent { .. } => return Ok(DaemonizeOutcome::ParentShouldExit),
        ForkResult::Child => {}
    }

    unistd::setsid().map_err(LifecycleError::Setsid)?;

    // Second fork so the daemon can never reacquire a controlling terminal.
    match unsafe { unistd::fork() }.map_err(LifecycleError::Fork)? {
        ForkResult::Parent { .. } => std::process::exit(0),
        ForkResult::Child => {}
    }

    unistd::chdir("/").map_err(LifecycleError::Chdir)?;

    let _ = fs::create_dir_all(defaults::WORK_DIR);
    redirect_standard_descriptors()?;

    Ok(DaemonizeOutcome::Child)
}

fn redirect_standard_descriptors() -> Result<()> {
    let devnull = OpenOptions::new()
        .read(true)
        .open("/dev/null")
        .map_err(|e| LifecycleError::LogFile("/dev/null".to_string(), e))?;
    unistd::dup2(devnull.as_raw_fd(), libc::STDIN_FILENO).map_err(LifecycleError::Redirect)?;

    let log = OpenOptions::new()
        .create(true)
        .append(true)
        .open(Path::new(defaults::LOG_FILE))
        .map_err(|e| LifecycleError::LogFile(defaults::LOG_FILE.to_string(), e))?;
    unistd::dup2(log.as_raw_fd(), libc::STDOUT_FILENO).map_err(LifecycleError::Redirect)?;
    unistd::dup2(log.as_raw_fd(), libc::STDERR_FILENO).map_err(LifecycleError::Redirect)?;

    Ok(())
}
