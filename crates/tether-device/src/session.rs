//! Device session management.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tether_ipc::{DeviceDescriptor, FocusStep, ManualFocus, PropertyDescriptor, PropertyValue};
use tracing::{debug, error, info, instrument, warn};

use crate::config::{describe, encode};
use crate::context::DeviceContext;
use crate::decode::{ImageCrateDecoder, ImageDecoder};
use crate::driver::{CameraEvent, CameraFilePath, CameraHandle, WidgetKind, WidgetValue};
use crate::error::{DeviceError, DriverError, InitStage};
use crate::frame::{FrameBuffer, FrameDimensions};
use crate::{DeviceResult, AUTOFOCUS_DRIVE, CANCEL_AUTOFOCUS, MANUAL_FOCUS_DRIVE};

/// What a capture should produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureKind {
    /// Cheap live-view frame.
    Preview,

    /// Shutter capture, transferred off the device and deleted there.
    Photo,
}

#[derive(Default)]
struct SessionInner {
    handle: Option<Box<dyn CameraHandle>>,
    camera: Option<String>,
}

/// An exclusive session with one camera.
///
/// All device traffic goes through the session guard, held for the whole
/// operation including decode.
pub struct DeviceSession {
    context: Arc<DeviceContext>,
    decoder: Arc<dyn ImageDecoder>,
    inner: Mutex<SessionInner>,
}

impl DeviceSession {
    /// Create a closed session.
    pub fn new(context: Arc<DeviceContext>, decoder: Arc<dyn ImageDecoder>) -> Self {
        Self {
            context,
            decoder,
            inner: Mutex::new(SessionInner::default()),
        }
    }

    /// Create a closed session that decodes with the `image` crate.
    pub fn with_default_decoder(context: Arc<DeviceContext>) -> Self {
        Self::new(context, Arc::new(ImageCrateDecoder))
    }

    /// The shared driver context this session opens devices through.
    pub fn context(&self) -> &Arc<DeviceContext> {
        &self.context
    }

    /// Open the first device in `known_devices` named `name`.
    ///
    /// A handle that is already open is closed first.
    #[instrument(name = "device_open", skip(self, known_devices))]
    pub fn open(&self, name: &str, known_devices: &[DeviceDescriptor]) -> DeviceResult<()> {
        let mut inner = self.inner.lock();

        if let Some(previous) = inner.camera.clone() {
            debug!(previous = %previous, "Closing previous camera before reopening");
            Self::close_locked(&mut inner);
        }

        let descriptor = known_devices
            .iter()
            .find(|device| device.name == name)
            .ok_or_else(|| DeviceError::DeviceNotFound(name.to_string()))?;

        let handle = self.init_handle(descriptor)?;
        inner.handle = Some(handle);
        inner.camera = Some(descriptor.name.clone());

        info!(port = %descriptor.transport_address, "Camera opened");
        Ok(())
    }

    fn init_handle(&self, descriptor: &DeviceDescriptor) -> DeviceResult<Box<dyn CameraHandle>> {
        let failed = |stage: InitStage| {
            let name = descriptor.name.clone();
            move |source: DriverError| DeviceError::InitFailed {
                stage,
                name,
                source,
            }
        };

        let abilities = self.context.abilities().map_err(failed(InitStage::Lookup))?;
        let model = abilities
            .iter()
            .find(|abilities| abilities.model == descriptor.name)
            .ok_or_else(|| {
                failed(InitStage::Lookup)(DriverError::new(
                    DriverError::MODEL_NOT_FOUND,
                    "model not in abilities list",
                ))
            })?;

        let mut handle = self
            .context
            .create_handle()
            .map_err(failed(InitStage::HandleCreate))?;
        handle
            .set_abilities(model)
            .map_err(failed(InitStage::AbilitiesBind))?;

        let ports = self.context.ports().map_err(failed(InitStage::PortBind))?;
        let port = ports
            .iter()
            .find(|port| port.path == descriptor.transport_address)
            .ok_or_else(|| {
                failed(InitStage::PortBind)(DriverError::new(
                    DriverError::UNKNOWN_PORT,
                    format!("port {} not found", descriptor.transport_address),
                ))
            })?;
        handle.set_port(port).map_err(failed(InitStage::PortBind))?;

        handle.init().map_err(failed(InitStage::Init))?;
        Ok(handle)
    }

    /// Close the session. Does nothing if already closed.
    #[instrument(name = "device_close", skip(self))]
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        if inner.handle.is_some() {
            Self::close_locked(&mut inner);
        }
    }

    fn close_locked(inner: &mut SessionInner) {
        let camera = inner.camera.take().unwrap_or_default();
        if let Some(mut handle) = inner.handle.take() {
            if let Err(e) = handle.exit() {
                warn!(camera = %camera, "Camera exit failed: {}", e);
            }
            info!(camera = %camera, "Camera closed");
        }
    }

    /// Whether a device handle is held.
    pub fn is_open(&self) -> bool {
        self.inner.lock().handle.is_some()
    }

    /// Name of the open camera.
    pub fn camera_name(&self) -> Option<String> {
        self.inner.lock().camera.clone()
    }

    /// Enumerate attached cameras.
    pub fn list_devices(&self) -> DeviceResult<Vec<DeviceDescriptor>> {
        let _guard = self.inner.lock();
        self.context.autodetect()
    }

    /// Capture one image and decode it into `buffer`.
    pub fn capture_into(
        &self,
        kind: CaptureKind,
        buffer: &mut FrameBuffer,
    ) -> DeviceResult<FrameDimensions> {
        let decoder = &self.decoder;
        self.with_handle("capture", |handle, name| {
            let data = match kind {
                CaptureKind::Preview => {
                    handle
                        .capture_preview()
                        .map_err(|source| DeviceError::CaptureFailed {
                            name: name.to_string(),
                            source,
                        })?
                }
                CaptureKind::Photo => {
                    let path = handle
                        .capture_image()
                        .map_err(|source| DeviceError::CaptureFailed {
                            name: name.to_string(),
                            source,
                        })?;
                    take_file(handle, name, &path)?
                }
            };
            decode_into(decoder.as_ref(), &data, buffer)
        })
    }

    /// Capture one image into a new buffer.
    pub fn capture_frame(&self, kind: CaptureKind) -> DeviceResult<FrameBuffer> {
        let mut buffer = FrameBuffer::new();
        self.capture_into(kind, &mut buffer)?;
        Ok(buffer)
    }

    /// Wait at most `timeout` for a file produced by the device itself.
    ///
    /// Returns `Ok(None)` on timeout or any event other than a new file.
    pub fn wait_for_file(
        &self,
        timeout: Duration,
        buffer: &mut FrameBuffer,
    ) -> DeviceResult<Option<FrameDimensions>> {
        let decoder = &self.decoder;
        self.with_handle("wait for file", |handle, name| {
            let event = handle
                .wait_for_event(timeout)
                .map_err(|source| DeviceError::CaptureFailed {
                    name: name.to_string(),
                    source,
                })?;

            match event {
                CameraEvent::FileAdded(path) => {
                    debug!(folder = %path.folder, file = %path.name, "Camera produced a file");
                    let data = take_file(handle, name, &path)?;
                    decode_into(decoder.as_ref(), &data, buffer).map(Some)
                }
                CameraEvent::Timeout | CameraEvent::Other => Ok(None),
            }
        })
    }

    /// Read one configuration property.
    pub fn get_config_property(&self, key: &str) -> DeviceResult<PropertyDescriptor> {
        self.with_handle("read configuration", |handle, _| read_property(handle, key))
    }

    /// Write one configuration property.
    pub fn set_config_property(&self, key: &str, value: &PropertyValue) -> DeviceResult<()> {
        self.with_handle("write configuration", |handle, name| {
            write_property(handle, key, value)?;
            debug!(camera = %name, key, value = %value.to_text(), "Configuration written");
            Ok(())
        })
    }

    /// Enable or disable the autofocus drive.
    ///
    /// Enabling neutralizes any manual focus drive first; disabling also
    /// cancels a focus run in progress where the camera supports it.
    #[instrument(name = "device_autofocus", skip(self))]
    pub fn autofocus(&self, enable: bool) -> DeviceResult<()> {
        self.with_handle("set autofocus", |handle, _| {
            if enable {
                neutralize_manual_focus(handle);
                write_property(handle, AUTOFOCUS_DRIVE, &PropertyValue::Toggle(true))
            } else {
                write_property(handle, AUTOFOCUS_DRIVE, &PropertyValue::Toggle(false))?;
                request_autofocus_cancel(handle);
                Ok(())
            }
        })
    }

    /// Drive manual focus. Autofocus is cancelled first.
    #[instrument(name = "device_manual_focus", skip(self))]
    pub fn manual_focus(&self, focus: ManualFocus) -> DeviceResult<()> {
        self.with_handle("drive manual focus", |handle, _| {
            cancel_autofocus(handle);

            let widget = handle
                .get_config(MANUAL_FOCUS_DRIVE)
                .map_err(|_| DeviceError::Unsupported(MANUAL_FOCUS_DRIVE.to_string()))?;
            let rejected = |reason: &str| DeviceError::ConfigRejected {
                key: MANUAL_FOCUS_DRIVE.to_string(),
                reason: reason.to_string(),
            };

            let value = match (focus, &widget.kind) {
                (ManualFocus::Step(step), WidgetKind::Radio(choices) | WidgetKind::Menu(choices)) => {
                    if !choices.iter().any(|choice| choice == step.label()) {
                        return Err(rejected("focus step not offered by the camera"));
                    }
                    WidgetValue::Text(step.label().to_string())
                }
                (ManualFocus::Position(position), WidgetKind::Range { min, max, .. }) => {
                    if !(*min..=*max).contains(&position) {
                        return Err(rejected("focus position out of range"));
                    }
                    WidgetValue::Float(position)
                }
                (ManualFocus::Step(_), WidgetKind::Range { .. }) => {
                    return Err(rejected("camera focus drive is continuous"));
                }
                (ManualFocus::Position(_), WidgetKind::Radio(_) | WidgetKind::Menu(_)) => {
                    return Err(rejected("camera focus drive is stepped"));
                }
                _ => return Err(DeviceError::Unsupported(MANUAL_FOCUS_DRIVE.to_string())),
            };

            handle
                .set_config(MANUAL_FOCUS_DRIVE, &value)
                .map_err(|e| rejected(&e.message))
        })
    }

    fn with_handle<T>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&mut dyn CameraHandle, &str) -> DeviceResult<T>,
    ) -> DeviceResult<T> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        match (inner.handle.as_deref_mut(), inner.camera.as_deref()) {
            (Some(handle), Some(name)) => f(handle, name),
            _ => {
                error!(operation, "Camera operation on a closed session");
                Err(DeviceError::InvalidState(operation))
            }
        }
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        self.close();
    }
}

fn take_file(
    handle: &mut dyn CameraHandle,
    name: &str,
    path: &CameraFilePath,
) -> DeviceResult<Vec<u8>> {
    let data = handle
        .file_get(path)
        .map_err(|source| DeviceError::TransferFailed {
            name: name.to_string(),
            source,
        })?;

    if let Err(e) = handle.file_delete(path) {
        warn!(camera = %name, file = %path.name, "Failed to delete file on camera: {}", e);
    }

    Ok(data)
}

fn decode_into(
    decoder: &dyn ImageDecoder,
    data: &[u8],
    buffer: &mut FrameBuffer,
) -> DeviceResult<FrameDimensions> {
    let image = decoder.decode(data)?;
    let (width, height) = (image.width(), image.height());

    buffer.ensure_dimensions(width, height);
    image.export_bgra(width, height, buffer.data_mut())?;

    Ok(FrameDimensions::new(width, height))
}

fn read_property(handle: &mut dyn CameraHandle, key: &str) -> DeviceResult<PropertyDescriptor> {
    let widget = handle
        .get_config(key)
        .map_err(|_| DeviceError::Unsupported(key.to_string()))?;
    describe(key, &widget)
}

fn write_property(
    handle: &mut dyn CameraHandle,
    key: &str,
    value: &PropertyValue,
) -> DeviceResult<()> {
    let widget = handle
        .get_config(key)
        .map_err(|_| DeviceError::Unsupported(key.to_string()))?;
    let encoded = encode(key, &widget, value)?;

    handle
        .set_config(key, &encoded)
        .map_err(|e| DeviceError::ConfigRejected {
            key: key.to_string(),
            reason: e.message,
        })
}

// Best effort: cameras without a stepped focus drive have nothing to stop.
fn neutralize_manual_focus(handle: &mut dyn CameraHandle) {
    let Ok(widget) = handle.get_config(MANUAL_FOCUS_DRIVE) else {
        return;
    };

    let neutral = FocusStep::Neutral.label();
    if let WidgetKind::Radio(choices) = &widget.kind {
        if choices.iter().any(|choice| choice == neutral) {
            let value = WidgetValue::Text(neutral.to_string());
            if let Err(e) = handle.set_config(MANUAL_FOCUS_DRIVE, &value) {
                debug!("Could not stop manual focus drive: {}", e);
            }
        }
    }
}

fn request_autofocus_cancel(handle: &mut dyn CameraHandle) {
    if let Err(e) = write_property(handle, CANCEL_AUTOFOCUS, &PropertyValue::Toggle(true)) {
        debug!("Could not cancel autofocus: {}", e);
    }
}

fn cancel_autofocus(handle: &mut dyn CameraHandle) {
    if let Err(e) = write_property(handle, AUTOFOCUS_DRIVE, &PropertyValue::Toggle(false)) {
        debug!("Could not disable autofocus drive: {}", e);
    }
    request_autofocus_cancel(handle);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockDriver, MockFailure};

    const CANON: &str = "Canon EOS 80D";

    fn session(driver: &MockDriver) -> DeviceSession {
        DeviceSession::with_default_decoder(DeviceContext::new(Arc::new(driver.clone())))
    }

    fn open(driver: &MockDriver) -> DeviceSession {
        let session = session(driver);
        let devices = session.list_devices().unwrap();
        session.open(CANON, &devices).unwrap();
        session
    }

    #[test]
    fn test_open_by_name() {
        let driver = MockDriver::with_cameras(&[(CANON, "usb:001,004")]);
        let session = session(&driver);
        let devices = session.list_devices().unwrap();

        session.open(CANON, &devices).unwrap();
        assert!(session.is_open());
        assert_eq!(session.camera_name().as_deref(), Some(CANON));

        session.close();
        assert!(matches!(
            session.open("Nikon D90", &devices),
            Err(DeviceError::DeviceNotFound(_))
        ));
        assert!(!session.is_open());
    }

    #[test]
    fn test_close_is_idempotent() {
        let driver = MockDriver::with_cameras(&[(CANON, "usb:001,004")]);
        let session = open(&driver);

        session.close();
        session.close();
        assert!(!session.is_open());
        assert_eq!(driver.stats().exits, 1);
        assert_eq!(driver.live_handles(), 0);
    }

    #[test]
    fn test_reopen_closes_previous_handle() {
        let driver = MockDriver::with_cameras(&[(CANON, "usb:001,004")]);
        let session = open(&driver);
        let devices = session.list_devices().unwrap();

        session.open(CANON, &devices).unwrap();
        assert_eq!(driver.live_handles(), 1);
        assert_eq!(driver.stats().exits, 1);
    }

    #[test]
    fn test_duplicate_names_open_first() {
        let driver = MockDriver::with_cameras(&[(CANON, "usb:001,004"), (CANON, "usb:001,007")]);
        let session = open(&driver);
        assert_eq!(driver.bound_ports(), vec!["usb:001,004".to_string()]);
        session.close();
    }

    #[test]
    fn test_open_reports_failing_stage() {
        let cases = [
            (MockFailure::LoadAbilities, InitStage::Lookup),
            (MockFailure::CreateHandle, InitStage::HandleCreate),
            (MockFailure::SetAbilities, InitStage::AbilitiesBind),
            (MockFailure::SetPort, InitStage::PortBind),
            (MockFailure::Init, InitStage::Init),
        ];

        for (failure, expected) in cases {
            let driver = MockDriver::with_cameras(&[(CANON, "usb:001,004")]);
            driver.set_failure(failure, true);
            let session = session(&driver);
            let devices = session.list_devices().unwrap();

            match session.open(CANON, &devices) {
                Err(DeviceError::InitFailed { stage, .. }) => assert_eq!(stage, expected),
                other => panic!("expected {:?} failure, got {:?}", expected, other),
            }
            assert!(!session.is_open());
        }
    }

    #[test]
    fn test_unknown_port_fails_port_bind() {
        let driver = MockDriver::with_cameras(&[(CANON, "usb:001,004")]);
        let session = session(&driver);
        let devices = vec![DeviceDescriptor::new(CANON, "usb:009,009")];

        assert!(matches!(
            session.open(CANON, &devices),
            Err(DeviceError::InitFailed {
                stage: InitStage::PortBind,
                ..
            })
        ));
    }

    #[test]
    fn test_closed_session_rejects_operations() {
        let driver = MockDriver::with_cameras(&[(CANON, "usb:001,004")]);
        let session = session(&driver);
        let mut buffer = FrameBuffer::new();

        assert!(matches!(
            session.capture_into(CaptureKind::Preview, &mut buffer),
            Err(DeviceError::InvalidState(_))
        ));
        assert!(matches!(
            session.autofocus(true),
            Err(DeviceError::InvalidState(_))
        ));
        assert!(matches!(
            session.get_config_property("iso"),
            Err(DeviceError::InvalidState(_))
        ));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_preview_resizes_buffer() {
        let driver = MockDriver::with_cameras(&[(CANON, "usb:001,004")]);
        driver.set_preview_size(8, 6);
        let session = open(&driver);

        let mut buffer = FrameBuffer::new();
        let dims = session.capture_into(CaptureKind::Preview, &mut buffer).unwrap();
        assert_eq!(dims, FrameDimensions::new(8, 6));
        assert_eq!(buffer.data().len(), 8 * 6 * 4);

        driver.set_preview_size(4, 4);
        let dims = session.capture_into(CaptureKind::Preview, &mut buffer).unwrap();
        assert_eq!(dims, FrameDimensions::new(4, 4));
        assert_eq!(buffer.data().len(), 4 * 4 * 4);
    }

    #[test]
    fn test_photo_transfers_and_deletes() {
        let driver = MockDriver::with_cameras(&[(CANON, "usb:001,004")]);
        driver.set_photo_size(12, 8);
        let session = open(&driver);

        let frame = session.capture_frame(CaptureKind::Photo).unwrap();
        assert_eq!(frame.dimensions(), FrameDimensions::new(12, 8));

        let stats = driver.stats();
        assert_eq!(stats.photos, 1);
        assert_eq!(stats.transfers, 1);
        assert_eq!(stats.deletes, 1);
    }

    #[test]
    fn test_capture_failures_keep_session_open() {
        let driver = MockDriver::with_cameras(&[(CANON, "usb:001,004")]);
        let session = open(&driver);

        driver.set_failure(MockFailure::Preview, true);
        assert!(matches!(
            session.capture_frame(CaptureKind::Preview),
            Err(DeviceError::CaptureFailed { .. })
        ));

        driver.set_failure(MockFailure::Transfer, true);
        let err = session.capture_frame(CaptureKind::Photo).unwrap_err();
        assert!(matches!(err, DeviceError::TransferFailed { .. }));
        assert!(err.is_recoverable());

        driver.set_failure(MockFailure::Transfer, false);
        driver.set_corrupt_images(true);
        assert!(matches!(
            session.capture_frame(CaptureKind::Photo),
            Err(DeviceError::DecodeFailed(_))
        ));
        assert!(session.is_open());
    }

    #[test]
    fn test_wait_for_file() {
        let driver = MockDriver::with_cameras(&[(CANON, "usb:001,004")]);
        driver.set_photo_size(6, 4);
        let session = open(&driver);
        let mut buffer = FrameBuffer::new();

        let idle = session
            .wait_for_file(Duration::from_millis(100), &mut buffer)
            .unwrap();
        assert_eq!(idle, None);

        driver.push_file_added("/store_00010001/DCIM", "IMG_0001.JPG");
        let produced = session
            .wait_for_file(Duration::from_millis(100), &mut buffer)
            .unwrap();
        assert_eq!(produced, Some(FrameDimensions::new(6, 4)));
        assert_eq!(driver.stats().deletes, 1);
    }

    #[test]
    fn test_config_properties() {
        let driver = MockDriver::with_cameras(&[(CANON, "usb:001,004")]);
        driver.install_config(
            "iso",
            WidgetKind::Radio(vec!["100".into(), "400".into()]),
            WidgetValue::Text("100".into()),
        );
        let session = open(&driver);

        session
            .set_config_property("iso", &PropertyValue::Text("400".into()))
            .unwrap();
        let descriptor = session.get_config_property("iso").unwrap();
        assert_eq!(descriptor.current, PropertyValue::Text("400".into()));

        assert!(matches!(
            session.get_config_property("shutterspeed"),
            Err(DeviceError::Unsupported(_))
        ));

        driver.reject_config("iso");
        assert!(matches!(
            session.set_config_property("iso", &PropertyValue::Text("100".into())),
            Err(DeviceError::ConfigRejected { .. })
        ));
    }

    #[test]
    fn test_autofocus_and_manual_focus_are_exclusive() {
        let driver = MockDriver::with_cameras(&[(CANON, "usb:001,004")]);
        driver.install_radio_focus();
        let session = open(&driver);

        session.autofocus(true).unwrap();
        let writes = driver.take_config_writes();
        assert_eq!(
            writes,
            vec![
                (MANUAL_FOCUS_DRIVE.to_string(), WidgetValue::Text("None".into())),
                (AUTOFOCUS_DRIVE.to_string(), WidgetValue::Int(1)),
            ]
        );

        session
            .manual_focus(ManualFocus::Step(FocusStep::Far2))
            .unwrap();
        let writes = driver.take_config_writes();
        assert_eq!(
            writes,
            vec![
                (AUTOFOCUS_DRIVE.to_string(), WidgetValue::Int(0)),
                (CANCEL_AUTOFOCUS.to_string(), WidgetValue::Int(1)),
                (MANUAL_FOCUS_DRIVE.to_string(), WidgetValue::Text("Far 2".into())),
            ]
        );
    }

    #[test]
    fn test_autofocus_disable_without_cancel_widget() {
        let driver = MockDriver::with_cameras(&[(CANON, "usb:001,004")]);
        driver.install_config(AUTOFOCUS_DRIVE, WidgetKind::Toggle, WidgetValue::Int(1));
        let session = open(&driver);

        session.autofocus(false).unwrap();
        assert_eq!(
            driver.take_config_writes(),
            vec![(AUTOFOCUS_DRIVE.to_string(), WidgetValue::Int(0))]
        );
    }

    #[test]
    fn test_manual_focus_shape_mismatch() {
        let driver = MockDriver::with_cameras(&[(CANON, "usb:001,004")]);
        driver.install_range_focus(0.0, 100.0, 1.0);
        let session = open(&driver);

        assert!(matches!(
            session.manual_focus(ManualFocus::Step(FocusStep::Near1)),
            Err(DeviceError::ConfigRejected { .. })
        ));
        session.manual_focus(ManualFocus::Position(42.0)).unwrap();
        assert_eq!(
            driver.config_value(MANUAL_FOCUS_DRIVE),
            Some(WidgetValue::Float(42.0))
        );

        let driver = MockDriver::with_cameras(&[(CANON, "usb:001,004")]);
        driver.install_radio_focus();
        let session = open(&driver);
        assert!(matches!(
            session.manual_focus(ManualFocus::Position(1.0)),
            Err(DeviceError::ConfigRejected { .. })
        ));
    }
}
