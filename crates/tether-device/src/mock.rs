//! Scripted in-memory camera driver for tests.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use image::{ImageFormat, Rgba, RgbaImage};
use parking_lot::Mutex;
use tether_ipc::{DeviceDescriptor, FocusStep};

use crate::driver::{
    CameraDriver, CameraEvent, CameraFilePath, CameraHandle, ConfigWidget, ModelAbilities,
    PortInfo, WidgetKind, WidgetValue,
};
use crate::error::DriverError;
use crate::{DriverResult, AUTOFOCUS_DRIVE, CANCEL_AUTOFOCUS, MANUAL_FOCUS_DRIVE};

/// Encode a solid-color PNG.
pub fn encode_test_image(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
    let image = RgbaImage::from_pixel(width, height, Rgba(rgba));
    let mut encoded = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut encoded), ImageFormat::Png)
        .expect("PNG encoding of an in-memory image cannot fail");
    encoded
}

/// Driver call that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockFailure {
    Autodetect,
    LoadAbilities,
    LoadPorts,
    CreateHandle,
    SetAbilities,
    SetPort,
    Init,
    Preview,
    Capture,
    Transfer,
    Event,
}

/// Call counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MockStats {
    pub autodetects: u64,
    pub abilities_loads: u64,
    pub port_loads: u64,
    pub handles_created: u64,
    pub inits: u64,
    pub exits: u64,
    pub previews: u64,
    pub photos: u64,
    pub transfers: u64,
    pub deletes: u64,
}

struct MockState {
    cameras: Vec<DeviceDescriptor>,
    models: Vec<ModelAbilities>,
    ports: Vec<PortInfo>,
    failures: HashSet<MockFailure>,
    config: BTreeMap<String, ConfigWidget>,
    rejected: HashSet<String>,
    writes: Vec<(String, WidgetValue)>,
    pending_files: VecDeque<CameraFilePath>,
    preview_size: (u32, u32),
    photo_size: (u32, u32),
    corrupt_images: bool,
    live_handles: usize,
    bound_ports: Vec<String>,
    next_file: u32,
    stats: MockStats,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            cameras: Vec::new(),
            models: Vec::new(),
            ports: Vec::new(),
            failures: HashSet::new(),
            config: BTreeMap::new(),
            rejected: HashSet::new(),
            writes: Vec::new(),
            pending_files: VecDeque::new(),
            preview_size: (16, 12),
            photo_size: (32, 24),
            corrupt_images: false,
            live_handles: 0,
            bound_ports: Vec::new(),
            next_file: 1,
            stats: MockStats::default(),
        }
    }
}

impl MockState {
    fn check(&self, failure: MockFailure, what: &str) -> DriverResult<()> {
        if self.failures.contains(&failure) {
            Err(DriverError::new(DriverError::ERROR, format!("{} failed", what)))
        } else {
            Ok(())
        }
    }

    fn image(&self, (width, height): (u32, u32)) -> Vec<u8> {
        if self.corrupt_images {
            b"corrupt".to_vec()
        } else {
            encode_test_image(width, height, [200, 100, 50, 255])
        }
    }
}

/// An in-memory camera driver.
///
/// Clones share state, so a test keeps one clone to script and inspect the
/// driver while the code under test owns another. Event waits return
/// immediately.
#[derive(Clone, Default)]
pub struct MockDriver {
    state: Arc<Mutex<MockState>>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a driver with the given `(name, port)` cameras attached.
    pub fn with_cameras(cameras: &[(&str, &str)]) -> Self {
        let driver = Self::new();
        for (name, port) in cameras {
            driver.attach(name, port);
        }
        driver
    }

    /// Attach a camera. Its model and port become known to the library.
    pub fn attach(&self, name: &str, port: &str) {
        let mut state = self.state.lock();
        state.cameras.push(DeviceDescriptor::new(name, port));
        if !state.models.iter().any(|m| m.model == name) {
            state.models.push(ModelAbilities::new(name));
        }
        if !state.ports.iter().any(|p| p.path == port) {
            state.ports.push(PortInfo::new(port, "Universal Serial Bus"));
        }
    }

    /// Detach every camera with the given name.
    pub fn detach(&self, name: &str) {
        self.state.lock().cameras.retain(|camera| camera.name != name);
    }

    pub fn set_failure(&self, failure: MockFailure, fail: bool) {
        let mut state = self.state.lock();
        if fail {
            state.failures.insert(failure);
        } else {
            state.failures.remove(&failure);
        }
    }

    pub fn set_preview_size(&self, width: u32, height: u32) {
        self.state.lock().preview_size = (width, height);
    }

    pub fn set_photo_size(&self, width: u32, height: u32) {
        self.state.lock().photo_size = (width, height);
    }

    /// Make previews and files undecodable.
    pub fn set_corrupt_images(&self, corrupt: bool) {
        self.state.lock().corrupt_images = corrupt;
    }

    /// Queue a "file added" event, as if the shutter was pressed on the body.
    pub fn push_file_added(&self, folder: &str, name: &str) {
        self.state
            .lock()
            .pending_files
            .push_back(CameraFilePath::new(folder, name));
    }

    /// Install a configuration widget.
    pub fn install_config(&self, key: &str, kind: WidgetKind, value: WidgetValue) {
        self.state
            .lock()
            .config
            .insert(key.to_string(), ConfigWidget::new(kind, value));
    }

    /// Install autofocus widgets and a seven-choice focus drive.
    pub fn install_radio_focus(&self) {
        let choices = FocusStep::ALL
            .iter()
            .map(|step| step.label().to_string())
            .collect();
        self.install_config(AUTOFOCUS_DRIVE, WidgetKind::Toggle, WidgetValue::Int(0));
        self.install_config(CANCEL_AUTOFOCUS, WidgetKind::Toggle, WidgetValue::Int(0));
        self.install_config(
            MANUAL_FOCUS_DRIVE,
            WidgetKind::Radio(choices),
            WidgetValue::Text(FocusStep::Neutral.label().to_string()),
        );
    }

    /// Install autofocus widgets and a continuous focus drive.
    pub fn install_range_focus(&self, min: f32, max: f32, step: f32) {
        self.install_config(AUTOFOCUS_DRIVE, WidgetKind::Toggle, WidgetValue::Int(0));
        self.install_config(
            MANUAL_FOCUS_DRIVE,
            WidgetKind::Range { min, max, step },
            WidgetValue::Float(min),
        );
    }

    /// Make every write to `key` fail.
    pub fn reject_config(&self, key: &str) {
        self.state.lock().rejected.insert(key.to_string());
    }

    pub fn config_value(&self, key: &str) -> Option<WidgetValue> {
        self.state
            .lock()
            .config
            .get(key)
            .map(|widget| widget.value.clone())
    }

    /// Drain the log of successful configuration writes.
    pub fn take_config_writes(&self) -> Vec<(String, WidgetValue)> {
        std::mem::take(&mut self.state.lock().writes)
    }

    /// Handles initialized and not yet exited.
    pub fn live_handles(&self) -> usize {
        self.state.lock().live_handles
    }

    /// Ports bound by successful opens, oldest first.
    pub fn bound_ports(&self) -> Vec<String> {
        self.state.lock().bound_ports.clone()
    }

    pub fn stats(&self) -> MockStats {
        self.state.lock().stats.clone()
    }
}

impl CameraDriver for MockDriver {
    fn autodetect(&self) -> DriverResult<Vec<DeviceDescriptor>> {
        let mut state = self.state.lock();
        state.stats.autodetects += 1;
        state.check(MockFailure::Autodetect, "autodetect")?;
        Ok(state.cameras.clone())
    }

    fn load_abilities(&self) -> DriverResult<Vec<ModelAbilities>> {
        let mut state = self.state.lock();
        state.stats.abilities_loads += 1;
        state.check(MockFailure::LoadAbilities, "abilities load")?;
        Ok(state.models.clone())
    }

    fn load_ports(&self) -> DriverResult<Vec<PortInfo>> {
        let mut state = self.state.lock();
        state.stats.port_loads += 1;
        state.check(MockFailure::LoadPorts, "port load")?;
        Ok(state.ports.clone())
    }

    fn create_handle(&self) -> DriverResult<Box<dyn CameraHandle>> {
        let mut state = self.state.lock();
        state.check(MockFailure::CreateHandle, "handle creation")?;
        state.stats.handles_created += 1;
        Ok(Box::new(MockHandle {
            state: Arc::clone(&self.state),
            port: None,
            initialized: false,
        }))
    }
}

struct MockHandle {
    state: Arc<Mutex<MockState>>,
    port: Option<String>,
    initialized: bool,
}

impl MockHandle {
    fn photo(&self, state: &mut MockState) -> Vec<u8> {
        let size = state.photo_size;
        state.image(size)
    }
}

impl CameraHandle for MockHandle {
    fn set_abilities(&mut self, _abilities: &ModelAbilities) -> DriverResult<()> {
        self.state
            .lock()
            .check(MockFailure::SetAbilities, "abilities binding")
    }

    fn set_port(&mut self, port: &PortInfo) -> DriverResult<()> {
        self.state.lock().check(MockFailure::SetPort, "port binding")?;
        self.port = Some(port.path.clone());
        Ok(())
    }

    fn init(&mut self) -> DriverResult<()> {
        let mut state = self.state.lock();
        state.check(MockFailure::Init, "init")?;
        state.stats.inits += 1;
        state.live_handles += 1;
        if let Some(port) = &self.port {
            state.bound_ports.push(port.clone());
        }
        self.initialized = true;
        Ok(())
    }

    fn exit(&mut self) -> DriverResult<()> {
        let mut state = self.state.lock();
        state.stats.exits += 1;
        if self.initialized {
            state.live_handles -= 1;
            self.initialized = false;
        }
        Ok(())
    }

    fn capture_preview(&mut self) -> DriverResult<Vec<u8>> {
        let mut state = self.state.lock();
        state.check(MockFailure::Preview, "preview")?;
        state.stats.previews += 1;
        let size = state.preview_size;
        Ok(state.image(size))
    }

    fn capture_image(&mut self) -> DriverResult<CameraFilePath> {
        let mut state = self.state.lock();
        state.check(MockFailure::Capture, "capture")?;
        state.stats.photos += 1;
        let name = format!("IMG_{:04}.JPG", state.next_file);
        state.next_file += 1;
        Ok(CameraFilePath::new("/store_00010001/DCIM/100CANON", name))
    }

    fn file_get(&mut self, _path: &CameraFilePath) -> DriverResult<Vec<u8>> {
        let mut state = self.state.lock();
        state.check(MockFailure::Transfer, "file transfer")?;
        state.stats.transfers += 1;
        Ok(self.photo(&mut state))
    }

    fn file_delete(&mut self, _path: &CameraFilePath) -> DriverResult<()> {
        self.state.lock().stats.deletes += 1;
        Ok(())
    }

    fn get_config(&mut self, key: &str) -> DriverResult<ConfigWidget> {
        self.state.lock().config.get(key).cloned().ok_or_else(|| {
            DriverError::new(DriverError::ERROR, format!("no configuration widget {}", key))
        })
    }

    fn set_config(&mut self, key: &str, value: &WidgetValue) -> DriverResult<()> {
        let mut state = self.state.lock();
        if state.rejected.contains(key) {
            return Err(DriverError::new(DriverError::ERROR, "camera refused value"));
        }

        let widget = state.config.get_mut(key).ok_or_else(|| {
            DriverError::new(DriverError::ERROR, format!("no configuration widget {}", key))
        })?;
        widget.value = value.clone();
        state.writes.push((key.to_string(), value.clone()));
        Ok(())
    }

    fn wait_for_event(&mut self, _timeout: Duration) -> DriverResult<CameraEvent> {
        let mut state = self.state.lock();
        state.check(MockFailure::Event, "event wait")?;
        Ok(state
            .pending_files
            .pop_front()
            .map(CameraEvent::FileAdded)
            .unwrap_or(CameraEvent::Timeout))
    }
}

impl Drop for MockHandle {
    fn drop(&mut self) {
        if self.initialized {
            self.state.lock().live_handles -= 1;
        }
    }
}
