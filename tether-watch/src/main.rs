//! Logs USB attach/detach events until stdin is closed.

use std::io::{self, BufRead};

use tether_hotplug::{HotplugEvent, HotplugKind, HotplugMonitor, MonitorConfig};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize logging.
fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tether_watch=info,tether_hotplug=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn log_event(event: &HotplugEvent) {
    let device = event.device();
    info!(
        kind = ?event.kind(),
        sysname = %device.sysname,
        subsystem = device.subsystem.as_deref().unwrap_or("-"),
        devnode = ?device.devnode,
        "Device event"
    );
}

fn main() {
    init_logging();

    let config = MonitorConfig::default();
    info!(subsystem = %config.subsystem, "tether-watch starting; close stdin to exit");

    let monitor = HotplugMonitor::system(config);
    monitor.subscribe(HotplugKind::Added, log_event);
    monitor.subscribe(HotplugKind::Removed, log_event);
    monitor.acquire();

    for line in io::stdin().lock().lines() {
        if line.is_err() {
            break;
        }
    }

    if let Err(e) = monitor.release() {
        error!("{}", e);
    }
    info!("tether-watch stopped");
}
