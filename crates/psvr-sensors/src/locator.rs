//! Locating the sensor interface of the PSVR processor unit.
//!
//! The processor unit exposes several HID interfaces under the same
//! vendor/product pair. Sensor reports come from one of them; another is the
//! control channel used to switch the headset's VR mode. The interface is
//! identified by the suffix of its HID path.

use crate::error::SensorError;
use crate::hid::HidBackend;
use crate::types::DeviceEntry;

/// PSVR USB identifiers.
pub const PSVR_VENDOR_ID: u16 = 0x054c;
pub const PSVR_PRODUCT_ID: u16 = 0x09af;

/// Path suffix of the sensor-reporting interface.
pub const SENSOR_INTERFACE_SUFFIX: &str = ":04";

/// Path suffix of the control-channel interface (never selected here).
pub const CONTROL_INTERFACE_SUFFIX: &str = ":05";

pub fn is_psvr(entry: &DeviceEntry) -> bool {
    entry.vendor_id == PSVR_VENDOR_ID && entry.product_id == PSVR_PRODUCT_ID
}

/// Pick the sensor interface path out of an enumeration snapshot.
pub fn select_sensor_path<'a>(devices: impl IntoIterator<Item = &'a DeviceEntry>) -> Option<String> {
    devices
        .into_iter()
        .filter(|d| is_psvr(d))
        .find(|d| d.path.ends_with(SENSOR_INTERFACE_SUFFIX))
        .map(|d| d.path.clone())
}

/// Every attached PSVR interface, in enumeration order.
pub fn list_devices(backend: &mut dyn HidBackend) -> Result<Vec<DeviceEntry>, SensorError> {
    let devices: Vec<DeviceEntry> = backend.enumerate()?.into_iter().filter(is_psvr).collect();
    tracing::debug!(count = devices.len(), "Enumerated PSVR interfaces");
    Ok(devices)
}

/// Enumerate and select the sensor interface. `Ok(None)` when it is not attached.
pub fn locate_sensor(backend: &mut dyn HidBackend) -> Result<Option<String>, SensorError> {
    let devices = list_devices(backend)?;
    let path = select_sensor_path(&devices);
    match &path {
        Some(path) => tracing::info!(%path, "Found PSVR sensor interface"),
        None => tracing::debug!(
            vendor = format!("{:04x}", PSVR_VENDOR_ID),
            product = format!("{:04x}", PSVR_PRODUCT_ID),
            "PSVR sensor interface not present"
        ),
    }
    Ok(path)
}
