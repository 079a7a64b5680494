mod checksum;
mod discovery;
mod exchange;
mod feature;
pub mod frame;
mod frequency;
mod ota;
mod wave;

use std::time::Duration;

use num_derive::FromPrimitive;
use thiserror::Error;

use crate::transport::Transport;

pub use checksum::crc16;
pub use discovery::{DeviceIdentity, BROADCAST_ADDRESS, DISCOVERY_RESPONSE_LEN, UID_LEN};
pub use feature::{AxisFeatures, FeatureReport, FEATURE_COUNT, FEATURE_RESPONSE_LEN};
pub use frame::Frame;
pub use frequency::{is_supported_sample_rate, SUPPORTED_SAMPLE_RATES};
pub use ota::{OtaSummary, ACK_LEN};
pub use wave::{PACKET_COUNT, SAMPLES_PER_PACKET, WAVE_PACKET_LEN, WAVE_POINTS};

#[derive(Clone, Copy, Debug, PartialEq, Eq, FromPrimitive)]
#[repr(u8)]
pub enum Command {
    Feature = 0x02,
    WavePacket = 0x03,
    WaveSnapshot = 0x04,
    Discover = 0x41,
    OtaStart = 0x50,
    OtaData = 0x51,
    OtaEnd = 0x52,
    SetSampleRate = 0x87,
}

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("response length mismatch: expected {expected} bytes, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("crc mismatch: received {received:#06x}, computed {computed:#06x}")]
    CrcMismatch { received: u16, computed: u16 },
    #[error("unexpected byte {actual:#04x} at offset {offset} (expected {expected:#04x})")]
    UnexpectedStatusByte {
        offset: usize,
        expected: u8,
        actual: u8,
    },
    #[error("no complete response within {deadline:?}: got {received}/{expected} bytes")]
    DeadlineExceeded {
        expected: usize,
        received: usize,
        deadline: Duration,
    },
    #[error("waveform snapshot request failed")]
    SnapshotArmFailed(#[source] Box<ProtocolError>),
    #[error("waveform packet {seq} lost, {} samples collected", .samples.len())]
    PacketSequenceAborted {
        seq: u8,
        samples: Vec<f32>,
        #[source]
        cause: Box<ProtocolError>,
    },
    #[error("OTA start not acknowledged")]
    OtaStartFailed(#[source] Box<ProtocolError>),
    #[error("OTA interrupted at offset {offset}")]
    OtaChunkFailed {
        offset: u32,
        #[source]
        cause: Box<ProtocolError>,
    },
    #[error("invalid OTA packet size {0}")]
    InvalidPacketSize(usize),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Per-session settings; the port name and baud rate live with the transport.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Target device address.
    pub address: u8,
    /// Check the CRC of every response, not only discovery and OTA ACKs.
    pub verify_crc: bool,
    /// Deadline for each OTA acknowledgement, measured from the write.
    pub ack_timeout: Duration,
    /// Blind wait after OTA start while the device erases flash.
    pub erase_time: Duration,
    pub ota_packet_size: usize,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            address: 0x00,
            verify_crc: true,
            ack_timeout: Duration::from_secs(3),
            erase_time: Duration::from_secs(8),
            ota_packet_size: 256,
        }
    }
}

/// A single device reached over an exclusively borrowed transport.
///
/// Every operation is one complete request/response exchange (or a
/// sequence of them); none is retried.
pub struct Device<'a> {
    port: &'a mut dyn Transport,
    config: DeviceConfig,
}

impl<'a> Device<'a> {
    pub fn new(port: &'a mut dyn Transport, config: DeviceConfig) -> Self {
        Self { port, config }
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn address(&self) -> u8 {
        self.config.address
    }

    pub fn set_address(&mut self, address: u8) {
        self.config.address = address;
    }

    fn request(&self, command: Command, payload: &[u8]) -> Vec<u8> {
        frame::encode(self.config.address, command as u8, payload)
    }

    fn check_crc(&self, response: &[u8]) -> Result<(), ProtocolError> {
        if self.config.verify_crc {
            frame::validate(response)?;
        }
        Ok(())
    }
}

pub(crate) fn expect_byte(
    response: &[u8],
    offset: usize,
    expected: u8,
) -> Result<(), ProtocolError> {
    match response.get(offset) {
        Some(&actual) if actual == expected => Ok(()),
        Some(&actual) => Err(ProtocolError::UnexpectedStatusByte {
            offset,
            expected,
            actual,
        }),
        None => Err(ProtocolError::LengthMismatch {
            expected: offset + 1,
            actual: response.len(),
        }),
    }
}

pub(crate) fn decode_be_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

#[cfg(test)]
pub(crate) fn test_config() -> DeviceConfig {
    DeviceConfig {
        address: 0x01,
        ack_timeout: Duration::from_millis(50),
        erase_time: Duration::ZERO,
        ..DeviceConfig::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_codes() {
        use num_traits::FromPrimitive;

        assert_eq!(Command::from_u8(0x41), Some(Command::Discover));
        assert_eq!(Command::from_u8(0x87), Some(Command::SetSampleRate));
        assert_eq!(Command::from_u8(0x01), None);
        assert_eq!(Command::OtaData as u8, 0x51);
    }

    #[test]
    fn expect_byte_reports_offset() {
        let response = [0x01, 0x87, 0x02, b'N', b'G'];

        assert!(expect_byte(&response, 1, 0x87).is_ok());
        assert!(matches!(
            expect_byte(&response, 3, b'O'),
            Err(ProtocolError::UnexpectedStatusByte {
                offset: 3,
                expected: b'O',
                actual: b'N'
            })
        ));
        assert!(matches!(
            expect_byte(&response, 7, 0),
            Err(ProtocolError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn big_endian_floats() {
        let bytes = [0x3F, 0x80, 0x00, 0x00, 0xC0, 0x00, 0x00, 0x00, 0xAA];
        assert_eq!(decode_be_f32(&bytes), [1.0, -2.0]);
    }
}
