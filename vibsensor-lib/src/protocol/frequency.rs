use log::info;

use super::exchange::transact;
use super::{expect_byte, Command, Device, ProtocolError};

/// Output data rates the accelerometer supports. Devices fall back to
/// 50 Hz for anything else.
pub const SUPPORTED_SAMPLE_RATES: [u16; 12] = [
    25600, 12800, 6400, 3200, 1600, 800, 400, 200, 100, 50, 25, 12,
];

const RESPONSE_LEN: usize = 7;

pub fn is_supported_sample_rate(hz: u16) -> bool {
    SUPPORTED_SAMPLE_RATES.contains(&hz)
}

impl<'a> Device<'a> {
    pub fn set_sample_rate(&mut self, hz: u16) -> Result<(), ProtocolError> {
        let [hi, lo] = hz.to_be_bytes();
        let request = self.request(Command::SetSampleRate, &[0, hi, lo]);
        let response = transact(self.port, &request, RESPONSE_LEN)?;

        self.check_crc(&response)?;
        expect_byte(&response, 1, Command::SetSampleRate as u8)?;
        expect_byte(&response, 3, b'O')?;
        expect_byte(&response, 4, b'K')?;

        info!("sample rate set to {} Hz", hz);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{frame, test_config, DeviceConfig};
    use crate::transport::mock::MockTransport;

    fn ok() -> Vec<u8> {
        vec![0x01, 0x87, 0x02, 0x4F, 0x4B, 0xE4, 0xB3]
    }

    #[test]
    fn supported_rates() {
        assert!(is_supported_sample_rate(25600));
        assert!(is_supported_sample_rate(12));
        assert!(!is_supported_sample_rate(1000));
    }

    #[test]
    fn set_rate() {
        let mut port = MockTransport::new().reply(ok());
        Device::new(&mut port, test_config())
            .set_sample_rate(25600)
            .unwrap();

        assert_eq!(port.sent, [vec![0x01, 0x87, 0x00, 0x64, 0x00, 0x1B, 0xB4]]);
    }

    #[test]
    fn rejected() {
        let mut port = MockTransport::new().reply(frame::encode(0x01, 0x87, &[0x02, b'N', b'O']));

        assert!(matches!(
            Device::new(&mut port, test_config()).set_sample_rate(640),
            Err(ProtocolError::UnexpectedStatusByte {
                offset: 3,
                actual: b'N',
                ..
            })
        ));
        assert_eq!(port.sent, [vec![0x01, 0x87, 0x00, 0x02, 0x80, 0x31, 0xB4]]);
    }

    #[test]
    fn wrong_command_echo() {
        let mut port = MockTransport::new().reply(frame::encode(0x01, 0x02, &[0x02, b'O', b'K']));

        assert!(matches!(
            Device::new(&mut port, test_config()).set_sample_rate(100),
            Err(ProtocolError::UnexpectedStatusByte {
                offset: 1,
                expected: 0x87,
                actual: 0x02
            })
        ));
    }

    #[test]
    fn lenient_crc() {
        let mut reply = ok();
        reply[5] = 0x00;

        let mut port = MockTransport::new().reply(reply.clone());
        assert!(matches!(
            Device::new(&mut port, test_config()).set_sample_rate(100),
            Err(ProtocolError::CrcMismatch { .. })
        ));

        let mut port = MockTransport::new().reply(reply);
        let config = DeviceConfig {
            verify_crc: false,
            ..test_config()
        };
        assert!(Device::new(&mut port, config).set_sample_rate(100).is_ok());
    }
}
