// dynswapd - dynamic swappiness and swap-pool controller driven by PSI pressure
// SPDX-License-Identifier: GPL-3.0-or-later

use std::time::Duration;

use dynswapd::config::ConfigProvider;
use dynswapd::controller::Controller;
use dynswapd::lifecycle::{self, DaemonizeOutcome};
use dynswapd::{bootgate::BootGate, defaults, helpers, pidfile, request_shutdown};
use dynswapd::{error, info};

fn main() {
    if let Err(e) = run() {
        error!("{}", e);
        std::process::exit(1);
    }
}

/// No CLI flags (spec.md §6): the daemon starts unconditionally and runs
/// until signalled. Startup failures — daemonization, config load, the
/// initial inventory/swappiness snapshot — abort with non-zero status
/// per spec.md §7; a tick failure never does.
fn run() -> Result<(), Box<dyn std::error::Error>> {
    helpers::am_i_root()?;

    match lifecycle::daemonize()? {
        DaemonizeOutcome::ParentShouldExit => return Ok(()),
        DaemonizeOutcome::Child => {}
    }

    pidfile::save_pid(defaults::PROCESS_NAME, std::process::id() as i32);

    ctrlc::set_handler(move || {
        request_shutdown();
    })?;

    let config = ConfigProvider::new();

    BootGate::new().spawn_waiter(Duration::from_secs(defaults::BOOT_GATE_WARMUP_SECS));

    info!("dynswapd: starting control loop");
    let controller = Controller::startup(&config);
    controller.run();

    info!("dynswapd: terminated cleanly");
    Ok(())
}
