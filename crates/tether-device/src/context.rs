//! Shared device-control context.

use std::sync::Arc;

use parking_lot::Mutex;
use tether_ipc::DeviceDescriptor;
use tracing::{debug, instrument};

use crate::driver::{CameraDriver, CameraHandle, ModelAbilities, PortInfo};
use crate::error::DeviceError;
use crate::{DeviceResult, DriverResult};

/// Driver plus the process-wide abilities and port caches.
///
/// Each cache is loaded at most once, on first use; a failed load is retried
/// on the next call. Share one context between all sessions through `Arc`.
pub struct DeviceContext {
    driver: Arc<dyn CameraDriver>,
    abilities: Mutex<Option<Arc<Vec<ModelAbilities>>>>,
    ports: Mutex<Option<Arc<Vec<PortInfo>>>>,
}

impl DeviceContext {
    /// Create a context over the given driver.
    pub fn new(driver: Arc<dyn CameraDriver>) -> Arc<Self> {
        Arc::new(Self {
            driver,
            abilities: Mutex::new(None),
            ports: Mutex::new(None),
        })
    }

    /// Enumerate attached cameras.
    #[instrument(name = "device_autodetect", skip(self))]
    pub fn autodetect(&self) -> DeviceResult<Vec<DeviceDescriptor>> {
        let devices = self
            .driver
            .autodetect()
            .map_err(DeviceError::EnumerationFailed)?;
        debug!(count = devices.len(), "Cameras detected");
        Ok(devices)
    }

    /// The supported-models list, loading it on first use.
    pub fn abilities(&self) -> DriverResult<Arc<Vec<ModelAbilities>>> {
        let mut cache = self.abilities.lock();
        if let Some(abilities) = cache.as_ref() {
            return Ok(Arc::clone(abilities));
        }

        let loaded = Arc::new(self.driver.load_abilities()?);
        debug!(count = loaded.len(), "Abilities list loaded");
        *cache = Some(Arc::clone(&loaded));
        Ok(loaded)
    }

    /// The port list, loading it on first use.
    pub fn ports(&self) -> DriverResult<Arc<Vec<PortInfo>>> {
        let mut cache = self.ports.lock();
        if let Some(ports) = cache.as_ref() {
            return Ok(Arc::clone(ports));
        }

        let loaded = Arc::new(self.driver.load_ports()?);
        debug!(count = loaded.len(), "Port list loaded");
        *cache = Some(Arc::clone(&loaded));
        Ok(loaded)
    }

    pub(crate) fn create_handle(&self) -> DriverResult<Box<dyn CameraHandle>> {
        self.driver.create_handle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockDriver, MockFailure};

    #[test]
    fn test_caches_load_once() {
        let driver = MockDriver::with_cameras(&[("Canon EOS 80D", "usb:001,004")]);
        let context = DeviceContext::new(Arc::new(driver.clone()));

        let first = context.abilities().unwrap();
        let second = context.abilities().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        context.ports().unwrap();
        context.ports().unwrap();

        let stats = driver.stats();
        assert_eq!(stats.abilities_loads, 1);
        assert_eq!(stats.port_loads, 1);
    }

    #[test]
    fn test_failed_load_is_retried() {
        let driver = MockDriver::with_cameras(&[("Canon EOS 80D", "usb:001,004")]);
        driver.set_failure(MockFailure::LoadAbilities, true);
        let context = DeviceContext::new(Arc::new(driver.clone()));

        assert!(context.abilities().is_err());
        driver.set_failure(MockFailure::LoadAbilities, false);
        assert_eq!(context.abilities().unwrap().len(), 1);
        assert_eq!(driver.stats().abilities_loads, 2);
    }
}
