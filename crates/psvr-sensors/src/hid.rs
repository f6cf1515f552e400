use crate::error::SensorError;
use crate::types::DeviceEntry;
use hidapi::{HidApi, HidDevice};
use std::ffi::CString;
use std::time::Duration;

/// A source of fixed-size input reports.
pub trait ReportSource: Send {
    /// Read one report into `buf`, blocking for at most `timeout`.
    ///
    /// Returns the number of bytes read; `Ok(0)` means the timeout expired.
    fn read_report(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, SensorError>;
}

/// Platform HID access: enumeration and opening by path.
pub trait HidBackend {
    /// Every HID device currently attached.
    fn enumerate(&mut self) -> Result<Vec<DeviceEntry>, SensorError>;

    /// Open the device at `path` for reading input reports.
    fn open_path(&mut self, path: &str) -> Result<Box<dyn ReportSource>, SensorError>;
}

/// [`HidBackend`] over the system hidapi library.
pub struct HidApiBackend {
    api: HidApi,
}

impl HidApiBackend {
    pub fn new() -> Result<Self, SensorError> {
        Ok(Self { api: HidApi::new()? })
    }
}

impl HidBackend for HidApiBackend {
    fn enumerate(&mut self) -> Result<Vec<DeviceEntry>, SensorError> {
        self.api.refresh_devices()?;
        Ok(self
            .api
            .device_list()
            .map(|d| DeviceEntry {
                path: d.path().to_string_lossy().into_owned(),
                vendor_id: d.vendor_id(),
                product_id: d.product_id(),
                interface_number: d.interface_number(),
                product: d.product_string().map(str::to_owned),
            })
            .collect())
    }

    fn open_path(&mut self, path: &str) -> Result<Box<dyn ReportSource>, SensorError> {
        let path = CString::new(path).map_err(|_| SensorError::NotFound)?;
        let device = self.api.open_path(&path)?;
        Ok(Box::new(HidReportSource { device }))
    }
}

/// An open hidapi device. Closed when dropped.
struct HidReportSource {
    device: HidDevice,
}

impl ReportSource for HidReportSource {
    fn read_report(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, SensorError> {
        // hidapi treats -1 as "block forever"; timeouts are validated positive upstream.
        let timeout_ms = timeout.as_millis().clamp(1, i32::MAX as u128) as i32;
        Ok(self.device.read_timeout(buf, timeout_ms)?)
    }
}
