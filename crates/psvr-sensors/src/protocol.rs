use crate::types::RawSample;
use glam::DVec3;
use thiserror::Error;

/// Size of a PSVR sensor input report.
pub const REPORT_SIZE: usize = 64;

/// Byte offsets of the two little-endian i16 sub-readings for each axis.
/// The second sub-sensor sits 16 bytes after the first.
const X_OFFSETS: [usize; 2] = [20, 36];
const Y_OFFSETS: [usize; 2] = [22, 38];
const Z_OFFSETS: [usize; 2] = [24, 40];

/// Scale from summed raw units to degrees per millisecond.
pub const ACCEL_COEFF: f64 = 0.000_031_25;

/// Per-axis polarity mapping the sensor frame onto the view frame.
///
/// The headset reports x and y with the opposite handedness of the
/// renderer, so both are negated; z is used as-is.
pub const AXIS_POLARITY: DVec3 = DVec3::new(-1.0, -1.0, 1.0);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Report has {actual} bytes, expected {expected}")]
    WrongLength { expected: usize, actual: usize },
}

/// Decode the accelerometer axes from one input report.
///
/// Only reports of exactly [`REPORT_SIZE`] bytes are accepted.
pub fn decode_report(report: &[u8]) -> Result<RawSample, ProtocolError> {
    if report.len() != REPORT_SIZE {
        return Err(ProtocolError::WrongLength {
            expected: REPORT_SIZE,
            actual: report.len(),
        });
    }

    // The sum wraps like the device's own 16-bit arithmetic.
    let axis = |[a, b]: [usize; 2]| read_i16(report, a).wrapping_add(read_i16(report, b));

    Ok(RawSample {
        x: axis(X_OFFSETS),
        y: axis(Y_OFFSETS),
        z: axis(Z_OFFSETS),
    })
}

impl RawSample {
    /// Angular rate for this sample in degrees per millisecond, before bias.
    pub fn angular_rate(&self) -> DVec3 {
        DVec3::new(self.x as f64, self.y as f64, self.z as f64) * AXIS_POLARITY * ACCEL_COEFF
    }
}

fn read_i16(report: &[u8], offset: usize) -> i16 {
    i16::from_le_bytes([report[offset], report[offset + 1]])
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Build a report whose sub-readings are `first` and `second` per axis.
    pub(crate) fn make_report(first: [i16; 3], second: [i16; 3]) -> Vec<u8> {
        let mut report = vec![0u8; REPORT_SIZE];
        let offsets = [X_OFFSETS, Y_OFFSETS, Z_OFFSETS];
        for (axis, [a, b]) in offsets.iter().enumerate() {
            report[*a..*a + 2].copy_from_slice(&first[axis].to_le_bytes());
            report[*b..*b + 2].copy_from_slice(&second[axis].to_le_bytes());
        }
        report
    }

    #[test]
    fn decode_sums_sub_sensors() {
        let report = make_report([1000, -20, 7], [1000, -30, 8]);
        let sample = decode_report(&report).unwrap();
        assert_eq!(sample, RawSample { x: 2000, y: -50, z: 15 });
    }

    #[test]
    fn decode_reads_little_endian() {
        let mut report = vec![0u8; REPORT_SIZE];
        report[20] = 0x34;
        report[21] = 0x12;
        report[40] = 0xff;
        report[41] = 0xff;
        let sample = decode_report(&report).unwrap();
        assert_eq!(sample.x, 0x1234);
        assert_eq!(sample.z, -1);
    }

    #[test]
    fn reject_short_and_long_reports() {
        assert_eq!(
            decode_report(&[0u8; 63]),
            Err(ProtocolError::WrongLength {
                expected: 64,
                actual: 63
            })
        );
        assert!(decode_report(&[0u8; 65]).is_err());
        assert!(decode_report(&[]).is_err());
    }

    #[test]
    fn x_axis_is_negated() {
        let sample = RawSample { x: 2000, y: 0, z: 0 };
        let rate = sample.angular_rate();
        assert!((rate.x - (-2000.0 * ACCEL_COEFF)).abs() < 1e-12);
        assert_eq!(rate.y, 0.0);
        assert_eq!(rate.z, 0.0);
    }

    #[test]
    fn polarity_per_axis() {
        let rate = RawSample { x: 1, y: 1, z: 1 }.angular_rate();
        assert!(rate.x < 0.0);
        assert!(rate.y < 0.0);
        assert!(rate.z > 0.0);
    }
}
