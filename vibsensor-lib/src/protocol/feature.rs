use std::fmt;

use log::info;

use super::exchange::transact;
use super::frame::CRC_LEN;
use super::{decode_be_f32, frame, Command, Device, ProtocolError};

pub const FEATURE_COUNT: usize = 18;
/// Address, command and length bytes, 18 big-endian floats, CRC.
pub const FEATURE_RESPONSE_LEN: usize = FEATURE_HEADER_LEN + FEATURE_COUNT * 4 + CRC_LEN;
const FEATURE_HEADER_LEN: usize = 3;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AxisFeatures {
    pub mean: f32,
    pub rms: f32,
    pub peak_to_peak: f32,
    pub kurtosis: f32,
}

impl AxisFeatures {
    fn from_slice(v: &[f32]) -> Self {
        Self {
            mean: v[0],
            rms: v[1],
            peak_to_peak: v[2],
            kurtosis: v[3],
        }
    }
}

/// Computed vibration features. Acceleration values are in g, frequencies
/// in Hz. The spectral and envelope values describe the Z axis.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureReport {
    /// Address the report came from.
    pub device: u8,
    pub x: AxisFeatures,
    pub y: AxisFeatures,
    pub z: AxisFeatures,
    pub dominant_frequency: f32,
    pub dominant_amplitude: f32,
    /// Amplitude at twice the rotation frequency.
    pub second_harmonic_amplitude: f32,
    pub envelope_rms: f32,
    pub envelope_peak: f32,
    pub temperature: f32,
}

impl FeatureReport {
    pub fn from_values(device: u8, v: [f32; FEATURE_COUNT]) -> Self {
        Self {
            device,
            x: AxisFeatures::from_slice(&v[0..4]),
            y: AxisFeatures::from_slice(&v[4..8]),
            z: AxisFeatures::from_slice(&v[8..12]),
            dominant_frequency: v[12],
            dominant_amplitude: v[13],
            second_harmonic_amplitude: v[14],
            envelope_rms: v[15],
            envelope_peak: v[16],
            temperature: v[17],
        }
    }

    /// Wire order of the decoded values.
    pub fn values(&self) -> [f32; FEATURE_COUNT] {
        let (x, y, z) = (&self.x, &self.y, &self.z);
        [
            x.mean,
            x.rms,
            x.peak_to_peak,
            x.kurtosis,
            y.mean,
            y.rms,
            y.peak_to_peak,
            y.kurtosis,
            z.mean,
            z.rms,
            z.peak_to_peak,
            z.kurtosis,
            self.dominant_frequency,
            self.dominant_amplitude,
            self.second_harmonic_amplitude,
            self.envelope_rms,
            self.envelope_peak,
            self.temperature,
        ]
    }

    pub fn decode(response: &[u8], verify_crc: bool) -> Result<Self, ProtocolError> {
        if response.len() != FEATURE_RESPONSE_LEN {
            return Err(ProtocolError::LengthMismatch {
                expected: FEATURE_RESPONSE_LEN,
                actual: response.len(),
            });
        }
        if verify_crc {
            frame::validate(response)?;
        }

        let floats = decode_be_f32(&response[FEATURE_HEADER_LEN..response.len() - CRC_LEN]);
        let mut values = [0f32; FEATURE_COUNT];
        values.copy_from_slice(&floats);

        Ok(Self::from_values(response[0], values))
    }
}

impl fmt::Display for FeatureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "device 0x{:02X}", self.device)?;
        for (name, axis) in [("X", &self.x), ("Y", &self.y), ("Z", &self.z)] {
            writeln!(
                f,
                "{} mean {:.4}g rms {:.4}g p-p {:.4}g kurtosis {:.4}",
                name, axis.mean, axis.rms, axis.peak_to_peak, axis.kurtosis
            )?;
        }
        writeln!(
            f,
            "dominant {:.1}Hz {:.4}g, 2x {:.4}g",
            self.dominant_frequency, self.dominant_amplitude, self.second_harmonic_amplitude
        )?;
        writeln!(
            f,
            "envelope rms {:.4}g peak {:.4}g",
            self.envelope_rms, self.envelope_peak
        )?;
        write!(f, "temperature {:.2}", self.temperature)
    }
}

impl<'a> Device<'a> {
    pub fn read_features(&mut self) -> Result<FeatureReport, ProtocolError> {
        let request = self.request(Command::Feature, &[0, 0, 0]);
        let response = transact(self.port, &request, FEATURE_RESPONSE_LEN)?;
        let report = FeatureReport::decode(&response, self.config.verify_crc)?;

        info!("feature report received from 0x{:02X}", report.device);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::test_config;
    use crate::transport::mock::MockTransport;

    fn response(values: &[f32; FEATURE_COUNT]) -> Vec<u8> {
        let mut payload = vec![0x00];
        for v in values {
            payload.extend_from_slice(&v.to_be_bytes());
        }
        frame::encode(0x00, 0x02, &payload)
    }

    #[test]
    fn decode_zeros() {
        let bytes = response(&[0.0; FEATURE_COUNT]);
        assert_eq!(bytes.len(), 77);
        assert_eq!(bytes[..3], [0x00, 0x02, 0x00]);

        let report = FeatureReport::decode(&bytes, true).unwrap();
        assert_eq!(report.values(), [0.0; FEATURE_COUNT]);
    }

    #[test]
    fn decode_wrong_length() {
        let bytes = response(&[0.0; FEATURE_COUNT]);

        assert!(matches!(
            FeatureReport::decode(&bytes[..76], false),
            Err(ProtocolError::LengthMismatch {
                expected: 77,
                actual: 76
            })
        ));

        let mut longer = bytes.clone();
        longer.push(0);
        assert!(matches!(
            FeatureReport::decode(&longer, false),
            Err(ProtocolError::LengthMismatch {
                expected: 77,
                actual: 78
            })
        ));
    }

    #[test]
    fn decode_field_order() {
        let mut values = [0f32; FEATURE_COUNT];
        for (i, v) in values.iter_mut().enumerate() {
            *v = i as f32;
        }
        let report = FeatureReport::decode(&response(&values), true).unwrap();

        assert_eq!(report.x.mean, 0.0);
        assert_eq!(report.y.rms, 5.0);
        assert_eq!(report.z.kurtosis, 11.0);
        assert_eq!(report.dominant_frequency, 12.0);
        assert_eq!(report.envelope_peak, 16.0);
        assert_eq!(report.temperature, 17.0);
        assert_eq!(report.values(), values);
    }

    #[test]
    fn crc_policy() {
        let mut bytes = response(&[1.5; FEATURE_COUNT]);
        bytes[76] ^= 0x55;

        assert!(matches!(
            FeatureReport::decode(&bytes, true),
            Err(ProtocolError::CrcMismatch { .. })
        ));
        assert!(FeatureReport::decode(&bytes, false).is_ok());
    }

    #[test]
    fn read_features() {
        let mut port = MockTransport::new().reply(response(&[2.0; FEATURE_COUNT]));
        let report = Device::new(&mut port, test_config()).read_features().unwrap();

        assert_eq!(report.temperature, 2.0);
        assert_eq!(port.sent, [vec![0x01, 0x02, 0x00, 0x00, 0x00, 0x18, 0x78]]);
    }

    #[test]
    fn read_features_timeout() {
        let mut port = MockTransport::new().silence();

        assert!(matches!(
            Device::new(&mut port, test_config()).read_features(),
            Err(ProtocolError::LengthMismatch {
                expected: 77,
                actual: 0
            })
        ));
    }
}
