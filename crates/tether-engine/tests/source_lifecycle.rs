use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use serde_json::json;
use tether_device::mock::MockDriver;
use tether_device::{
    DeviceContext, DeviceSession, VideoFrame, WidgetKind, WidgetValue, AUTOFOCUS_DRIVE,
    CANCEL_AUTOFOCUS, MANUAL_FOCUS_DRIVE,
};
use tether_engine::{ChannelSink, PreviewSource, SourceController, SourceMode, TimelapseSource};
use tether_hotplug::{HotplugMonitor, ManualChannel, MonitorConfig, RawDeviceInfo};
use tether_ipc::{
    CadenceControl, FocusStep, ManualFocus, ManualFocusControl, PropertyValue, SourceCommand,
    SourceEvent, SourceSettings, SourceState,
};

const CANON: &str = "Canon EOS 80D";
const NIKON: &str = "Nikon D750";

struct Harness {
    driver: MockDriver,
    monitor: Arc<HotplugMonitor>,
    hotplug: Sender<RawDeviceInfo>,
    frames: Receiver<VideoFrame>,
    events: Receiver<SourceEvent>,
    sink: Arc<ChannelSink>,
}

impl Harness {
    fn new(cameras: &[(&str, &str)]) -> Self {
        let (channel, hotplug) = ManualChannel::new();
        let monitor = HotplugMonitor::new(
            Arc::new(channel),
            MonitorConfig {
                poll_interval: Duration::from_millis(20),
                ..Default::default()
            },
        );
        let (sink, frames, events) = ChannelSink::new();

        Self {
            driver: MockDriver::with_cameras(cameras),
            monitor,
            hotplug,
            frames,
            events,
            sink: Arc::new(sink),
        }
    }

    fn source<M: SourceMode>(&self, settings: SourceSettings) -> SourceController<M> {
        let context = DeviceContext::new(Arc::new(self.driver.clone()));
        SourceController::create(
            settings,
            DeviceSession::with_default_decoder(context),
            Arc::clone(&self.monitor),
            self.sink.clone(),
        )
    }

    fn drain_events(&self) -> Vec<SourceEvent> {
        self.events.try_iter().collect()
    }
}

fn settings(camera: &str) -> SourceSettings {
    SourceSettings {
        camera_name: camera.to_string(),
        ..Default::default()
    }
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

#[test]
fn test_show_opens_and_hide_closes() {
    let harness = Harness::new(&[(CANON, "usb:001,004")]);
    let source: PreviewSource = harness.source(settings(CANON));
    assert_eq!(source.state(), SourceState::Closed);

    source.show();
    assert_eq!(
        source.state(),
        SourceState::Open {
            camera: CANON.to_string()
        }
    );
    assert!(source.is_capturing());
    assert!(harness
        .frames
        .recv_timeout(Duration::from_secs(1))
        .unwrap()
        .is_valid());
    assert_eq!((source.width(), source.height()), (16, 12));

    source.hide();
    assert_eq!(source.state(), SourceState::Closed);
    assert!(!source.is_capturing());
    assert_eq!(harness.driver.live_handles(), 0);

    let events = harness.drain_events();
    assert!(events.contains(&SourceEvent::StateChanged {
        previous: SourceState::Closed,
        current: SourceState::Open {
            camera: CANON.to_string()
        },
    }));
    assert!(events.contains(&SourceEvent::PropertiesChanged));
}

#[test]
fn test_close_reports_zero_size() {
    let harness = Harness::new(&[(CANON, "usb:001,004")]);
    let source: PreviewSource = harness.source(settings(CANON));
    source.show();
    harness.frames.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!((source.width(), source.height()), (16, 12));

    source.update(SourceCommand::CameraChanged("Nikon D90".to_string()));
    assert_eq!(source.state(), SourceState::Closed);
    assert_eq!((source.width(), source.height()), (0, 0));

    source.update(SourceCommand::CameraChanged(CANON.to_string()));
    harness.frames.try_iter().for_each(drop);
    harness.frames.recv_timeout(Duration::from_secs(1)).unwrap();
    source.hide();
    assert_eq!((source.width(), source.height()), (0, 0));
}

#[test]
fn test_unknown_camera_stays_closed() {
    let harness = Harness::new(&[(CANON, "usb:001,004")]);
    let source: PreviewSource = harness.source(settings("Nikon D90"));

    source.show();
    assert_eq!(source.state(), SourceState::Closed);
    assert!(source.is_active());
    assert!(harness.drain_events().iter().any(|event| matches!(
        event,
        SourceEvent::Error {
            recoverable: false,
            ..
        }
    )));
}

#[test]
fn test_preview_paces_to_deadline() {
    let harness = Harness::new(&[(CANON, "usb:001,004")]);
    let source: PreviewSource = harness.source(settings(CANON));
    source.show();

    let mut last = None;
    for _ in 0..10 {
        last = Some(harness.frames.recv_timeout(Duration::from_secs(1)).unwrap());
    }
    source.hide();

    let tenth = last.unwrap();
    assert_eq!(tenth.sequence, 10);
    // Ten frames take nine full periods after the first one.
    let elapsed = Duration::from_nanos(tenth.timestamp.pts_ns);
    assert!(elapsed >= Duration::from_millis(299), "elapsed {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(400), "elapsed {:?}", elapsed);
}

#[test]
fn test_fps_change_while_running() {
    let harness = Harness::new(&[(CANON, "usb:001,004")]);
    let source: PreviewSource = harness.source(settings(CANON));
    source.show();
    assert_eq!(source.capture_fps(), 30);

    source.update(SourceCommand::FpsChanged(60));
    assert_eq!(source.capture_fps(), 60);
    assert_eq!(source.metrics().target_fps, 60.0);

    source
        .update_from_settings(&json!({ "changed": "fps", "fps": 24 }))
        .unwrap();
    assert_eq!(source.capture_fps(), 20);
    assert!(source.is_capturing());
}

#[test]
fn test_capture_failures_are_counted() {
    let harness = Harness::new(&[(CANON, "usb:001,004")]);
    let source: PreviewSource = harness.source(settings(CANON));
    harness
        .driver
        .set_failure(tether_device::mock::MockFailure::Preview, true);
    source.show();

    assert!(wait_until(Duration::from_secs(1), || {
        source.metrics().capture_failures >= 3
    }));
    assert!(source.state().is_open());
    assert!(harness.frames.try_recv().is_err());
}

#[test]
fn test_timelapse_interval() {
    let harness = Harness::new(&[(CANON, "usb:001,004")]);
    let mut config = settings(CANON);
    config.interval = 5;
    let source: TimelapseSource = harness.source(config);
    source.show();
    assert_eq!(harness.frames.try_iter().count(), 1);

    source.tick(5.2);
    assert_eq!(harness.driver.stats().photos, 2);
    assert_eq!(source.elapsed(), 0.0);
    assert_eq!((source.width(), source.height()), (32, 24));
    assert!(harness.frames.try_recv().is_ok());

    for _ in 0..30 {
        source.tick(0.1);
    }
    assert_eq!(harness.driver.stats().photos, 2);
    assert!(source.elapsed() > 2.9);
}

#[test]
fn test_timelapse_publishes_camera_body_photos() {
    let harness = Harness::new(&[(CANON, "usb:001,004")]);
    let source: TimelapseSource = harness.source(settings(CANON));
    source.show();
    let opened = harness.driver.stats();
    harness.frames.try_iter().for_each(drop);

    harness.driver.push_file_added("/store_00010001/DCIM", "IMG_0042.JPG");
    source.tick(0.1);

    assert!(harness.frames.try_recv().is_ok());
    assert_eq!(harness.driver.stats().photos, opened.photos);
    assert_eq!(harness.driver.stats().deletes, opened.deletes + 1);
}

#[test]
fn test_timelapse_open_takes_first_photo() {
    let harness = Harness::new(&[(CANON, "usb:001,004")]);
    let source: TimelapseSource = harness.source(settings(CANON));
    assert_eq!((source.width(), source.height()), (0, 0));

    source.show();
    assert_eq!(harness.driver.stats().photos, 1);
    let frame = harness.frames.try_recv().unwrap();
    assert_eq!((frame.width, frame.height), (32, 24));
    assert_eq!(frame.sequence, 1);
    assert_eq!((source.width(), source.height()), (32, 24));
    assert_eq!(source.metrics().frames_captured, 1);

    // The opening photo does not start the hotkey debounce window.
    assert!(source.hotkey_pressed(true));
}

#[test]
fn test_timelapse_open_survives_failed_first_photo() {
    let harness = Harness::new(&[(CANON, "usb:001,004")]);
    harness
        .driver
        .set_failure(tether_device::mock::MockFailure::Capture, true);
    let source: TimelapseSource = harness.source(settings(CANON));

    source.show();
    assert!(source.state().is_open());
    assert_eq!((source.width(), source.height()), (0, 0));
    assert_eq!(source.metrics().capture_failures, 1);
    assert!(harness.drain_events().iter().any(|event| matches!(
        event,
        SourceEvent::Error {
            recoverable: true,
            ..
        }
    )));
}

#[test]
fn test_hotkey_debounce() {
    let harness = Harness::new(&[(CANON, "usb:001,004")]);
    let source: TimelapseSource = harness.source(settings(CANON));
    source.show();

    assert!(source.hotkey_pressed(true));
    thread::sleep(Duration::from_millis(200));
    assert!(!source.hotkey_pressed(true));
    assert!(!source.hotkey_pressed(false));
    assert_eq!(harness.driver.stats().photos, 2);

    thread::sleep(Duration::from_millis(350));
    assert!(source.hotkey_pressed(true));
    assert_eq!(harness.driver.stats().photos, 3);
}

#[test]
fn test_hotkey_ignored_when_hidden() {
    let harness = Harness::new(&[(CANON, "usb:001,004")]);
    let source: TimelapseSource = harness.source(settings(CANON));

    assert!(!source.hotkey_pressed(true));
    source.show();
    source.hide();
    assert!(!source.hotkey_pressed(true));
    assert_eq!(harness.driver.stats().photos, 1);
}

#[test]
fn test_test_capture_skips_debounce() {
    let harness = Harness::new(&[(CANON, "usb:001,004")]);
    let source: TimelapseSource = harness.source(settings(CANON));
    source.show();

    assert!(source.test_capture());
    assert!(source.test_capture());
    assert_eq!(harness.driver.stats().photos, 3);
}

#[test]
fn test_hotplug_attach_and_detach() {
    let harness = Harness::new(&[]);
    let source: PreviewSource = harness.source(settings(CANON));
    source.show();
    assert_eq!(source.state(), SourceState::Closed);

    harness.driver.attach(CANON, "usb:001,004");
    harness.hotplug.send(RawDeviceInfo::new("add", "1-4")).unwrap();
    assert!(wait_until(Duration::from_secs(2), || source.state().is_open()));
    assert!(source.is_capturing());

    harness.driver.detach(CANON);
    harness
        .hotplug
        .send(RawDeviceInfo::new("remove", "1-4"))
        .unwrap();
    assert!(wait_until(Duration::from_secs(2), || source.state().is_closed()));
    assert!(source.is_active());
    assert!(!source.is_capturing());
    assert_eq!(harness.driver.live_handles(), 0);
}

#[test]
fn test_unrelated_detach_keeps_session() {
    let harness = Harness::new(&[(CANON, "usb:001,004")]);
    let source: PreviewSource = harness.source(settings(CANON));
    source.show();

    harness
        .hotplug
        .send(RawDeviceInfo::new("remove", "1-7"))
        .unwrap();
    thread::sleep(Duration::from_millis(100));
    assert!(source.state().is_open());
}

#[test]
fn test_camera_change_reopens_when_active() {
    let harness = Harness::new(&[(CANON, "usb:001,004"), (NIKON, "usb:001,005")]);
    let source: TimelapseSource = harness.source(settings(CANON));

    source.update(SourceCommand::CameraChanged(NIKON.to_string()));
    assert_eq!(source.state(), SourceState::Closed);
    assert_eq!(source.settings().camera_name, NIKON);

    source.show();
    source.update(SourceCommand::CameraChanged(CANON.to_string()));
    assert_eq!(
        source.state(),
        SourceState::Open {
            camera: CANON.to_string()
        }
    );
    assert_eq!(harness.driver.live_handles(), 1);
    assert_eq!(
        harness.driver.bound_ports(),
        vec!["usb:001,005".to_string(), "usb:001,004".to_string()]
    );
}

#[test]
fn test_focus_commands_are_exclusive() {
    let harness = Harness::new(&[(CANON, "usb:001,004")]);
    harness.driver.install_radio_focus();
    let mut config = settings(CANON);
    config.autofocus = true;
    let source: TimelapseSource = harness.source(config);

    source.show();
    let writes = harness.driver.take_config_writes();
    assert_eq!(
        writes.last(),
        Some(&(AUTOFOCUS_DRIVE.to_string(), WidgetValue::Int(1)))
    );

    source.update(SourceCommand::ManualFocusChanged(ManualFocus::Step(
        FocusStep::Near1,
    )));
    assert_eq!(
        harness.driver.take_config_writes(),
        vec![
            (AUTOFOCUS_DRIVE.to_string(), WidgetValue::Int(0)),
            (CANCEL_AUTOFOCUS.to_string(), WidgetValue::Int(1)),
            (
                MANUAL_FOCUS_DRIVE.to_string(),
                WidgetValue::Text("Near 1".into())
            ),
        ]
    );

    source.update(SourceCommand::AutofocusChanged(true));
    assert_eq!(
        harness.driver.take_config_writes(),
        vec![
            (
                MANUAL_FOCUS_DRIVE.to_string(),
                WidgetValue::Text("None".into())
            ),
            (AUTOFOCUS_DRIVE.to_string(), WidgetValue::Int(1)),
        ]
    );
}

#[test]
fn test_property_overrides() {
    let harness = Harness::new(&[(CANON, "usb:001,004")]);
    harness.driver.install_config(
        "iso",
        WidgetKind::Radio(vec!["100".into(), "400".into()]),
        WidgetValue::Text("100".into()),
    );
    let source: TimelapseSource = harness.source(settings(CANON));

    source.update(SourceCommand::PropertyChanged {
        key: "iso".to_string(),
        value: PropertyValue::Text("400".into()),
    });
    assert_eq!(
        harness.driver.config_value("iso"),
        Some(WidgetValue::Text("100".into()))
    );
    assert_eq!(
        source.property_overrides().get("iso"),
        Some(&PropertyValue::Text("400".into()))
    );

    source.show();
    source
        .update_from_settings(&json!({ "changed": "auto_prop", "auto_prop": "iso", "iso": "400" }))
        .unwrap();
    assert_eq!(
        harness.driver.config_value("iso"),
        Some(WidgetValue::Text("400".into()))
    );

    source.update(SourceCommand::PropertyChanged {
        key: "iso".to_string(),
        value: PropertyValue::Text("3200".into()),
    });
    assert!(harness.drain_events().iter().any(|event| matches!(
        event,
        SourceEvent::Error {
            recoverable: true,
            ..
        }
    )));
    assert!(source.state().is_open());
}

#[test]
fn test_property_sheets() {
    let harness = Harness::new(&[(CANON, "usb:001,004")]);
    harness.driver.install_radio_focus();
    harness.driver.install_config(
        "iso",
        WidgetKind::Radio(vec!["100".into(), "400".into()]),
        WidgetValue::Text("100".into()),
    );

    let preview: PreviewSource = harness.source(settings(CANON));
    let closed = preview.properties();
    assert_eq!(closed.cameras, vec![CANON.to_string()]);
    assert!(closed.properties.is_empty());
    assert_eq!(closed.manual_focus, None);

    preview.show();
    let sheet = preview.properties();
    assert_eq!(
        sheet.cadence,
        Some(CadenceControl::FrameRate {
            choices: vec![25, 30, 60],
            current: 30
        })
    );
    assert_eq!(sheet.autofocus, Some(false));
    match sheet.manual_focus {
        Some(ManualFocusControl::Steps(steps)) => {
            assert_eq!(steps.len(), 6);
            assert!(!steps.contains(&FocusStep::Neutral));
        }
        other => panic!("expected focus steps, got {:?}", other),
    }
    let keys: Vec<_> = sheet.properties.iter().map(|p| p.key.as_str()).collect();
    assert_eq!(keys, vec!["iso"]);
    assert!(!sheet.test_capture);
    preview.destroy();

    let timelapse: TimelapseSource = harness.source(settings(CANON));
    timelapse.show();
    let sheet = timelapse.properties();
    assert!(sheet.test_capture);
    assert_eq!(
        sheet.cadence,
        Some(CadenceControl::Interval {
            min: 0,
            max: 100_000,
            step: 1,
            current: 30
        })
    );
}

#[test]
fn test_property_sheet_is_consistent_under_hide() {
    let harness = Harness::new(&[(CANON, "usb:001,004")]);
    harness.driver.install_config(
        "iso",
        WidgetKind::Radio(vec!["100".into(), "400".into()]),
        WidgetValue::Text("100".into()),
    );
    harness.driver.install_config(
        AUTOFOCUS_DRIVE,
        WidgetKind::Toggle,
        WidgetValue::Int(0),
    );
    let source: TimelapseSource = harness.source(settings(CANON));

    thread::scope(|scope| {
        scope.spawn(|| {
            for _ in 0..50 {
                source.show();
                source.hide();
            }
        });

        for _ in 0..200 {
            let sheet = source.properties();
            let keys: Vec<_> = sheet.properties.iter().map(|p| p.key.as_str()).collect();
            match sheet.autofocus {
                Some(_) => assert_eq!(keys, vec!["iso"]),
                None => assert!(keys.is_empty()),
            }
        }
    });
}

#[test]
fn test_destroy_releases_monitor() {
    let harness = Harness::new(&[(CANON, "usb:001,004")]);
    let first: PreviewSource = harness.source(settings(CANON));
    let second: TimelapseSource = harness.source(settings(CANON));
    assert_eq!(harness.monitor.ref_count(), 2);
    assert_eq!(harness.monitor.subscriber_count(), 4);

    first.show();
    first.destroy();
    first.destroy();
    assert_eq!(first.state(), SourceState::Closed);
    assert_eq!(harness.monitor.ref_count(), 1);
    assert_eq!(harness.monitor.subscriber_count(), 2);

    first.show();
    first.update(SourceCommand::CameraChanged(CANON.to_string()));
    assert_eq!(first.state(), SourceState::Closed);

    drop(second);
    assert_eq!(harness.monitor.ref_count(), 0);
    assert!(!harness.monitor.is_running());
    drop(first);
    assert_eq!(harness.monitor.ref_count(), 0);
}
