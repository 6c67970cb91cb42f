//! Hotplug monitor service.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, instrument, trace, warn};

use crate::channel::system_channel;
use crate::error::HotplugError;
use crate::event::{HotplugEvent, HotplugKind};
use crate::{EventChannel, HotplugResult, DEFAULT_POLL_INTERVAL, USB_SUBSYSTEM};

/// Callback invoked on the monitor thread for each matching event.
pub type HotplugCallback = Arc<dyn Fn(&HotplugEvent) + Send + Sync>;

/// Handle returned by [`HotplugMonitor::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Monitor configuration.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Device subsystem to watch.
    pub subsystem: String,

    /// Upper bound on one channel poll; also bounds how long a stop takes.
    pub poll_interval: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            subsystem: USB_SUBSYSTEM.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

struct Subscriber {
    id: SubscriptionId,
    kind: HotplugKind,
    callback: HotplugCallback,
}

#[derive(Default)]
struct Registry {
    subscribers: Vec<Subscriber>,
}

impl Registry {
    fn publish(&self, event: &HotplugEvent) -> usize {
        let kind = event.kind();
        let mut delivered = 0;
        for subscriber in self.subscribers.iter().filter(|s| s.kind == kind) {
            (subscriber.callback)(event);
            delivered += 1;
        }
        delivered
    }
}

struct Worker {
    thread: JoinHandle<()>,
    should_stop: Arc<AtomicBool>,
}

impl Worker {
    fn stop(self) {
        self.should_stop.store(true, Ordering::SeqCst);
        if self.thread.join().is_err() {
            warn!("Hotplug monitor thread panicked");
        }
    }
}

/// Shared attach/detach monitor.
///
/// One background thread runs while at least one user holds a reference.
/// Subscriber callbacks run on that thread with the registry lock held, so
/// they must not call back into `subscribe`, `unsubscribe`, `acquire` or
/// `release`.
pub struct HotplugMonitor {
    channel: Arc<dyn EventChannel>,
    config: MonitorConfig,
    refs: AtomicUsize,
    worker: Mutex<Option<Worker>>,
    registry: Arc<Mutex<Registry>>,
    listening: Arc<AtomicBool>,
    next_id: AtomicU64,
}

impl HotplugMonitor {
    /// Create a monitor over the given channel. No thread runs until the
    /// first [`acquire`](Self::acquire).
    pub fn new(channel: Arc<dyn EventChannel>, config: MonitorConfig) -> Arc<Self> {
        Arc::new(Self {
            channel,
            config,
            refs: AtomicUsize::new(0),
            worker: Mutex::new(None),
            registry: Arc::new(Mutex::new(Registry::default())),
            listening: Arc::new(AtomicBool::new(false)),
            next_id: AtomicU64::new(1),
        })
    }

    /// Create a monitor over the platform's device-event channel.
    pub fn system(config: MonitorConfig) -> Arc<Self> {
        let channel = system_channel(&config.subsystem);
        Self::new(channel, config)
    }

    /// Take a reference, starting the monitor thread on the first one.
    ///
    /// If the thread or the event channel cannot be started the monitor
    /// stays inert: the reference still counts, but no events arrive.
    #[instrument(name = "hotplug_acquire", skip(self))]
    pub fn acquire(&self) {
        let mut worker = self.worker.lock();
        let previous = self.refs.fetch_add(1, Ordering::SeqCst);

        if previous == 0 {
            match self.spawn_worker() {
                Ok(started) => {
                    *worker = Some(started);
                    info!(channel = self.channel.name(), "Hotplug monitor started");
                }
                Err(e) => warn!("{}; hotplug notifications disabled", e),
            }
        }

        debug!(refs = previous + 1, "Hotplug monitor acquired");
    }

    /// Drop a reference, stopping and joining the thread on the last one.
    #[instrument(name = "hotplug_release", skip(self))]
    pub fn release(&self) -> HotplugResult<()> {
        let mut worker = self.worker.lock();
        let current = self.refs.load(Ordering::SeqCst);

        if current == 0 {
            warn!("Hotplug monitor released more often than acquired");
            return Err(HotplugError::Unbalanced);
        }

        self.refs.fetch_sub(1, Ordering::SeqCst);
        debug!(refs = current - 1, "Hotplug monitor released");

        if current == 1 {
            if let Some(running) = worker.take() {
                running.stop();
            }
            self.registry.lock().subscribers.clear();
            info!("Hotplug monitor stopped");
        }

        Ok(())
    }

    /// Register a callback for one kind of event.
    pub fn subscribe<F>(&self, kind: HotplugKind, callback: F) -> SubscriptionId
    where
        F: Fn(&HotplugEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.registry.lock().subscribers.push(Subscriber {
            id,
            kind,
            callback: Arc::new(callback),
        });
        trace!(?id, ?kind, "Hotplug subscriber added");
        id
    }

    /// Remove a callback. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut registry = self.registry.lock();
        let before = registry.subscribers.len();
        registry.subscribers.retain(|s| s.id != id);
        let removed = registry.subscribers.len() != before;
        trace!(?id, removed, "Hotplug subscriber removed");
        removed
    }

    /// Current reference count.
    pub fn ref_count(&self) -> usize {
        self.refs.load(Ordering::SeqCst)
    }

    /// Whether the monitor thread has been started and not yet stopped.
    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some()
    }

    /// Whether the event channel is open and being polled.
    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    /// Number of registered callbacks.
    pub fn subscriber_count(&self) -> usize {
        self.registry.lock().subscribers.len()
    }

    fn spawn_worker(&self) -> HotplugResult<Worker> {
        let should_stop = Arc::new(AtomicBool::new(false));

        let channel = Arc::clone(&self.channel);
        let registry = Arc::clone(&self.registry);
        let listening = Arc::clone(&self.listening);
        let stop = Arc::clone(&should_stop);
        let poll_interval = self.config.poll_interval;

        let thread = thread::Builder::new()
            .name("hotplug-monitor".to_string())
            .spawn(move || monitor_thread(channel, registry, listening, stop, poll_interval))
            .map_err(HotplugError::Spawn)?;

        Ok(Worker {
            thread,
            should_stop,
        })
    }
}

impl Drop for HotplugMonitor {
    fn drop(&mut self) {
        if let Some(running) = self.worker.get_mut().take() {
            running.stop();
        }
    }
}

fn monitor_thread(
    channel: Arc<dyn EventChannel>,
    registry: Arc<Mutex<Registry>>,
    listening: Arc<AtomicBool>,
    should_stop: Arc<AtomicBool>,
    poll_interval: Duration,
) {
    let mut stream = match channel.open() {
        Ok(stream) => stream,
        Err(source) => {
            let err = HotplugError::ChannelOpen {
                channel: channel.name(),
                source,
            };
            warn!("{}; hotplug notifications disabled", err);
            return;
        }
    };

    listening.store(true, Ordering::SeqCst);
    debug!(channel = channel.name(), "Hotplug monitor listening");

    while !should_stop.load(Ordering::SeqCst) {
        let events = match stream.poll(poll_interval) {
            Ok(events) => events,
            Err(source) => {
                let err = HotplugError::ChannelPoll {
                    channel: channel.name(),
                    source,
                };
                warn!("{}", err);
                thread::sleep(poll_interval);
                continue;
            }
        };

        for raw in events {
            let Some(event) = HotplugEvent::classify(raw) else {
                continue;
            };

            let delivered = registry.lock().publish(&event);
            debug!(
                kind = ?event.kind(),
                device = %event.device().sysname,
                delivered,
                "Hotplug event"
            );
        }
    }

    listening.store(false, Ordering::SeqCst);
    debug!("Hotplug monitor thread exiting");
}
