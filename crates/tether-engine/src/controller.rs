//! Source controller state machine.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::Value;
use tether_device::{DeviceError, DeviceSession, AUTOFOCUS_DRIVE, MANUAL_FOCUS_DRIVE};
use tether_hotplug::{HotplugKind, HotplugMonitor, SubscriptionId};
use tether_ipc::{
    CadenceControl, CaptureMetrics, DeviceDescriptor, DeviceProperty, FocusStep,
    ManualFocusControl, PropertyKind, PropertySheet, PropertyValue, SettingsResult, SourceCommand,
    SourceEvent, SourceSettings, SourceState,
};
use tracing::{debug, error, info, instrument, warn};

use crate::sink::FrameSink;
use crate::stats::CaptureStats;

/// Handles shared by a controller and its capture machinery.
#[derive(Clone)]
pub struct CaptureContext {
    pub session: Arc<DeviceSession>,
    pub sink: Arc<dyn FrameSink>,
    pub stats: Arc<CaptureStats>,
}

/// Capture behavior plugged into a [`SourceController`].
pub trait SourceMode: Send + 'static {
    /// Short name for diagnostics.
    const NAME: &'static str;

    /// Device properties offered in the property sheet, as `(key, label)`.
    const PROPERTIES: &'static [(&'static str, &'static str)];

    /// Whether the property sheet offers a test capture button.
    const TEST_CAPTURE: bool;

    fn new(settings: &SourceSettings) -> Self;

    /// Cadence control for the property sheet.
    fn cadence(settings: &SourceSettings) -> CadenceControl;

    /// Configured frames per second, 0 for shutter-driven modes.
    fn target_fps(settings: &SourceSettings) -> f32;

    /// The session was just opened.
    fn opened(&mut self, capture: &CaptureContext, settings: &SourceSettings);

    /// The session is about to close.
    fn closing(&mut self);

    /// The fps or interval setting changed.
    fn cadence_changed(&mut self, settings: &SourceSettings);
}

pub(crate) struct ControllerState<M> {
    pub(crate) settings: SourceSettings,
    pub(crate) source: SourceState,
    pub(crate) active: bool,
    pub(crate) destroyed: bool,
    pub(crate) overrides: BTreeMap<String, PropertyValue>,
    pub(crate) mode: M,
}

pub(crate) struct Shared<M> {
    pub(crate) capture: CaptureContext,
    pub(crate) state: Mutex<ControllerState<M>>,
}

/// A camera source: owns one device session and reacts to host lifecycle
/// calls, settings updates and hotplug events.
///
/// Lock order is hotplug registry, then controller state, then session.
pub struct SourceController<M: SourceMode> {
    pub(crate) shared: Arc<Shared<M>>,
    monitor: Arc<HotplugMonitor>,
    subscriptions: Mutex<Vec<SubscriptionId>>,
}

impl<M: SourceMode> SourceController<M> {
    /// Create a closed controller and subscribe it to hotplug events.
    ///
    /// Takes a reference on `monitor`, returned by [`destroy`](Self::destroy).
    #[instrument(name = "source_create", skip_all, fields(mode = M::NAME))]
    pub fn create(
        settings: SourceSettings,
        session: DeviceSession,
        monitor: Arc<HotplugMonitor>,
        sink: Arc<dyn FrameSink>,
    ) -> Self {
        let shared = Arc::new(Shared {
            capture: CaptureContext {
                session: Arc::new(session),
                sink,
                stats: Arc::new(CaptureStats::new()),
            },
            state: Mutex::new(ControllerState {
                mode: M::new(&settings),
                settings,
                source: SourceState::Closed,
                active: false,
                destroyed: false,
                overrides: BTreeMap::new(),
            }),
        });

        monitor.acquire();

        let added: Weak<Shared<M>> = Arc::downgrade(&shared);
        let removed = Weak::clone(&added);
        let subscriptions = vec![
            monitor.subscribe(HotplugKind::Added, move |_| {
                if let Some(shared) = added.upgrade() {
                    shared.device_added();
                }
            }),
            monitor.subscribe(HotplugKind::Removed, move |_| {
                if let Some(shared) = removed.upgrade() {
                    shared.device_removed();
                }
            }),
        ];

        debug!("Source created");

        Self {
            shared,
            monitor,
            subscriptions: Mutex::new(subscriptions),
        }
    }

    /// The source became visible.
    #[instrument(name = "source_show", skip(self), fields(mode = M::NAME))]
    pub fn show(&self) {
        let mut state = self.shared.state.lock();
        if state.destroyed {
            return;
        }

        state.active = true;
        if state.source.is_closed() && state.settings.has_camera() {
            self.shared.open_locked(&mut state, None);
        }
    }

    /// The source was hidden.
    #[instrument(name = "source_hide", skip(self), fields(mode = M::NAME))]
    pub fn hide(&self) {
        let mut state = self.shared.state.lock();
        state.active = false;
        self.shared.close_locked(&mut state);
    }

    /// Apply one settings change.
    #[instrument(name = "source_update", skip(self), fields(mode = M::NAME))]
    pub fn update(&self, command: SourceCommand) {
        let shared = &self.shared;
        let mut state = shared.state.lock();
        if state.destroyed {
            debug!("Ignoring update on destroyed source");
            return;
        }

        match command {
            SourceCommand::CameraChanged(name) => {
                state.settings.camera_name = name;
                if state.active {
                    shared.close_locked(&mut state);
                    shared.open_locked(&mut state, None);
                }
            }
            SourceCommand::FpsChanged(fps) => {
                state.settings.fps = fps;
                let ControllerState { settings, mode, .. } = &mut *state;
                mode.cadence_changed(settings);
            }
            SourceCommand::IntervalChanged(interval) => {
                state.settings.interval = interval;
                let ControllerState { settings, mode, .. } = &mut *state;
                mode.cadence_changed(settings);
            }
            SourceCommand::AutofocusChanged(enabled) => {
                state.settings.autofocus = enabled;
                if state.source.is_open() {
                    if let Err(e) = shared.capture.session.autofocus(enabled) {
                        shared.report("set autofocus", &e);
                    }
                }
                shared.capture.sink.send_event(SourceEvent::PropertiesChanged);
            }
            SourceCommand::ManualFocusChanged(focus) => {
                if state.source.is_open() {
                    if let Err(e) = shared.capture.session.manual_focus(focus) {
                        shared.report("drive manual focus", &e);
                    }
                }
            }
            SourceCommand::PropertyChanged { key, value } => {
                if state.source.is_open() {
                    if let Err(e) = shared.capture.session.set_config_property(&key, &value) {
                        shared.report("write configuration", &e);
                    }
                }
                state.overrides.insert(key, value);
            }
        }
    }

    /// Apply a host settings object carrying a `changed` tag.
    pub fn update_from_settings(&self, settings: &Value) -> SettingsResult<()> {
        let command = SourceCommand::from_settings(settings)?;
        self.update(command);
        Ok(())
    }

    /// Tear the source down. Safe to call more than once.
    #[instrument(name = "source_destroy", skip(self), fields(mode = M::NAME))]
    pub fn destroy(&self) {
        {
            let mut state = self.shared.state.lock();
            if state.destroyed {
                return;
            }
            state.destroyed = true;
            state.active = false;
            self.shared.close_locked(&mut state);
        }

        for id in self.subscriptions.lock().drain(..) {
            self.monitor.unsubscribe(id);
        }
        if let Err(e) = self.monitor.release() {
            warn!("{}", e);
        }

        debug!("Source destroyed");
    }

    /// Width of the last published frame.
    pub fn width(&self) -> u32 {
        self.shared.capture.stats.dimensions().width
    }

    /// Height of the last published frame.
    pub fn height(&self) -> u32 {
        self.shared.capture.stats.dimensions().height
    }

    /// Current session state.
    pub fn state(&self) -> SourceState {
        self.shared.state.lock().source.clone()
    }

    /// Whether the host is showing the source.
    pub fn is_active(&self) -> bool {
        self.shared.state.lock().active
    }

    /// Snapshot of the current settings.
    pub fn settings(&self) -> SourceSettings {
        self.shared.state.lock().settings.clone()
    }

    /// Property values set through updates, by configuration key.
    pub fn property_overrides(&self) -> BTreeMap<String, PropertyValue> {
        self.shared.state.lock().overrides.clone()
    }

    /// Capture statistics for the current session.
    pub fn metrics(&self) -> CaptureMetrics {
        let target_fps = M::target_fps(&self.shared.state.lock().settings);
        self.shared.capture.stats.snapshot(target_fps)
    }

    /// Build the settings UI description.
    ///
    /// The state lock is held while the session is queried.
    pub fn properties(&self) -> PropertySheet {
        let state = self.shared.state.lock();
        let settings = &state.settings;
        let open = state.source.is_open();
        let session = &self.shared.capture.session;

        let cameras: Vec<String> = match session.list_devices() {
            Ok(devices) => devices.into_iter().map(|device| device.name).collect(),
            Err(e) => {
                warn!("{}", e);
                Vec::new()
            }
        };

        let mut sheet = PropertySheet {
            cadence: (!cameras.is_empty()).then(|| M::cadence(settings)),
            cameras,
            ..Default::default()
        };

        if !open {
            return sheet;
        }

        if let Ok(descriptor) = session.get_config_property(AUTOFOCUS_DRIVE) {
            if let (PropertyKind::Toggle, PropertyValue::Toggle(on)) =
                (&descriptor.kind, &descriptor.current)
            {
                sheet.autofocus = Some(*on);
            }
        }

        if let Ok(descriptor) = session.get_config_property(MANUAL_FOCUS_DRIVE) {
            sheet.manual_focus = match (&descriptor.kind, &descriptor.current) {
                (PropertyKind::Choice(choices), _) if choices.len() == FocusStep::ALL.len() => {
                    Some(ManualFocusControl::Steps(
                        FocusStep::ALL
                            .into_iter()
                            .filter(|step| *step != FocusStep::Neutral)
                            .collect(),
                    ))
                }
                (PropertyKind::Range { min, max, step }, PropertyValue::Number(current)) => {
                    Some(ManualFocusControl::Range {
                        min: *min,
                        max: *max,
                        step: *step,
                        current: *current as f32,
                    })
                }
                _ => None,
            };
        }

        sheet.properties = M::PROPERTIES
            .iter()
            .filter_map(|(key, label)| {
                session
                    .get_config_property(key)
                    .ok()
                    .map(|descriptor| DeviceProperty {
                        key: key.to_string(),
                        label: label.to_string(),
                        descriptor,
                    })
            })
            .collect();
        sheet.test_capture = M::TEST_CAPTURE;

        sheet
    }
}

impl<M: SourceMode> Drop for SourceController<M> {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl<M: SourceMode> Shared<M> {
    /// Open the configured camera. `devices` is enumerated when not given.
    pub(crate) fn open_locked(
        &self,
        state: &mut ControllerState<M>,
        devices: Option<Vec<DeviceDescriptor>>,
    ) {
        if !state.settings.has_camera() {
            return;
        }

        let session = &self.capture.session;
        let devices = match devices {
            Some(devices) => devices,
            None => match session.list_devices() {
                Ok(devices) => devices,
                Err(e) => {
                    self.report("enumerate cameras", &e);
                    return;
                }
            },
        };

        let camera = state.settings.camera_name.clone();
        if let Err(e) = session.open(&camera, &devices) {
            self.report("open camera", &e);
            return;
        }

        self.capture.stats.start();
        self.transition_to(state, SourceState::Open { camera });

        if state.settings.autofocus {
            if let Err(e) = session.autofocus(true) {
                self.report("set autofocus", &e);
            }
        }

        let ControllerState { settings, mode, .. } = state;
        mode.opened(&self.capture, settings);

        self.capture.sink.send_event(SourceEvent::PropertiesChanged);
    }

    /// Stop capturing and close the session if open.
    pub(crate) fn close_locked(&self, state: &mut ControllerState<M>) {
        if state.source.is_closed() {
            return;
        }

        state.mode.closing();
        self.capture.session.close();
        self.capture.stats.stop();
        self.transition_to(state, SourceState::Closed);
    }

    fn device_added(&self) {
        let mut state = self.state.lock();
        if state.destroyed || state.source.is_open() || !state.settings.has_camera() {
            return;
        }

        let devices = match self.capture.session.list_devices() {
            Ok(devices) => devices,
            Err(e) => {
                warn!("{}", e);
                return;
            }
        };

        if devices.iter().any(|d| d.name == state.settings.camera_name) {
            info!(camera = %state.settings.camera_name, mode = M::NAME, "Camera attached");
            self.open_locked(&mut state, Some(devices));
        }
    }

    fn device_removed(&self) {
        let mut state = self.state.lock();
        let Some(camera) = state.source.camera().map(str::to_string) else {
            return;
        };

        let devices = match self.capture.session.list_devices() {
            Ok(devices) => devices,
            Err(e) => {
                warn!("{}", e);
                return;
            }
        };

        if !devices.iter().any(|d| d.name == camera) {
            info!(camera = %camera, mode = M::NAME, "Camera detached");
            self.close_locked(&mut state);
        }
    }

    fn transition_to(&self, state: &mut ControllerState<M>, new_state: SourceState) {
        let previous = std::mem::replace(&mut state.source, new_state.clone());

        debug!(
            previous = %previous.name(),
            current = %new_state.name(),
            "State transition"
        );

        self.capture.sink.send_event(SourceEvent::StateChanged {
            previous,
            current: new_state,
        });
    }

    pub(crate) fn report(&self, operation: &str, e: &DeviceError) {
        error!(operation, mode = M::NAME, "{}", e);
        self.capture.sink.send_event(SourceEvent::Error {
            recoverable: e.is_recoverable(),
            message: e.to_string(),
        });
    }
}
