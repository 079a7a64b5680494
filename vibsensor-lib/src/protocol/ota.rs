use std::thread;
use std::time::Duration;

use log::{error, info, warn};

use super::exchange::send_and_wait_ack;
use super::{Command, Device, ProtocolError};
use crate::firmware::FirmwareImage;
use crate::transport::Transport;

/// Every OTA phase is acknowledged with a 7-byte frame.
pub const ACK_LEN: usize = 7;

/// Per-read timeout while polling for acknowledgements.
const POLL_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtaSummary {
    /// Padded image length.
    pub image_len: u32,
    pub chunks: usize,
    /// Whether the device acknowledged the end frame. The image is fully
    /// written either way.
    pub end_acknowledged: bool,
}

impl<'a> Device<'a> {
    /// Transfers `image` with the start / data / end sequence.
    ///
    /// A failed start or data chunk aborts the update; there is no resume.
    pub fn update_firmware(&mut self, image: &FirmwareImage) -> Result<OtaSummary, ProtocolError> {
        let packet_size = self.config.ota_packet_size;
        if packet_size == 0 || packet_size > u16::MAX as usize {
            return Err(ProtocolError::InvalidPacketSize(packet_size));
        }

        let saved = self.port.timeout();
        self.port.set_timeout(POLL_TIMEOUT)?;
        let result = self.transfer(image, packet_size);
        let restored = self.port.set_timeout(saved);

        let summary = result?;
        restored?;
        Ok(summary)
    }

    fn send_ota(&mut self, command: Command, payload: &[u8]) -> Result<(), ProtocolError> {
        let request = self.request(command, payload);
        send_and_wait_ack(self.port, &request, ACK_LEN, self.config.ack_timeout).map(|_| ())
    }

    fn transfer(
        &mut self,
        image: &FirmwareImage,
        packet_size: usize,
    ) -> Result<OtaSummary, ProtocolError> {
        let image_len = image.len();
        let total = (image_len as usize + packet_size - 1) / packet_size;

        info!("OTA start: {} bytes in {} packets", image_len, total);
        self.send_ota(Command::OtaStart, &image_len.to_be_bytes())
            .map_err(|e| ProtocolError::OtaStartFailed(Box::new(e)))?;

        info!("waiting {:?} for flash erase", self.config.erase_time);
        thread::sleep(self.config.erase_time);

        for (index, (offset, chunk)) in image.chunks(packet_size).enumerate() {
            let mut payload = Vec::with_capacity(6 + chunk.len());
            payload.extend_from_slice(&offset.to_be_bytes());
            payload.extend_from_slice(&(chunk.len() as u16).to_be_bytes());
            payload.extend_from_slice(chunk);

            if let Err(e) = self.send_ota(Command::OtaData, &payload) {
                error!("OTA interrupted at offset {}: {}", offset, e);
                return Err(ProtocolError::OtaChunkFailed {
                    offset,
                    cause: Box::new(e),
                });
            }

            let done = index + 1;
            info!(
                "packet {}/{} ({:.1}%)",
                done,
                total,
                done as f64 * 100.0 / total as f64
            );
        }

        let end_acknowledged = match self.send_ota(Command::OtaEnd, &image_len.to_be_bytes()) {
            Ok(()) => true,
            Err(e) => {
                warn!("OTA end not acknowledged: {}", e);
                false
            }
        };

        info!("OTA complete");
        Ok(OtaSummary {
            image_len,
            chunks: total,
            end_acknowledged,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{frame, test_config, DeviceConfig};
    use crate::transport::mock::MockTransport;

    fn ack(command: u8) -> Vec<u8> {
        frame::encode(0x01, command, &[0x02, b'O', b'K'])
    }

    fn firmware(len: usize) -> FirmwareImage {
        FirmwareImage::from_bytes((0..len).map(|i| i as u8).collect()).unwrap()
    }

    #[test]
    fn full_update() {
        let mut port = MockTransport::new()
            .reply(ack(0x50))
            .reply(ack(0x51))
            .reply(ack(0x51))
            .reply(ack(0x51))
            .reply(ack(0x52));
        let image = firmware(600);

        let summary = Device::new(&mut port, test_config())
            .update_firmware(&image)
            .unwrap();

        assert_eq!(
            summary,
            OtaSummary {
                image_len: 608,
                chunks: 3,
                end_acknowledged: true
            }
        );

        assert_eq!(port.sent.len(), 5);
        assert_eq!(port.sent[0], frame::encode(0x01, 0x50, &608u32.to_be_bytes()));
        assert_eq!(port.sent[4], frame::encode(0x01, 0x52, &608u32.to_be_bytes()));

        let offsets_and_lengths: Vec<_> = port.sent[1..4]
            .iter()
            .map(|f| {
                let decoded = frame::Frame::decode(f).unwrap();
                assert_eq!(decoded.command, 0x51);
                let p = decoded.payload;
                let offset = u32::from_be_bytes([p[0], p[1], p[2], p[3]]);
                let len = u16::from_be_bytes([p[4], p[5]]);
                assert_eq!(p.len(), 6 + len as usize);
                let start = offset as usize;
                assert_eq!(p[6..], image.as_bytes()[start..start + len as usize]);
                (offset, len)
            })
            .collect();
        assert_eq!(offsets_and_lengths, [(0, 256), (256, 256), (512, 96)]);

        assert_eq!(port.timeout(), Duration::from_millis(20));
    }

    #[test]
    fn start_rejected() {
        let mut bad = ack(0x50);
        bad[5] ^= 0x01;
        let mut port = MockTransport::new().reply(bad);

        let result = Device::new(&mut port, test_config()).update_firmware(&firmware(64));

        match result {
            Err(ProtocolError::OtaStartFailed(cause)) => {
                assert!(matches!(*cause, ProtocolError::CrcMismatch { .. }))
            }
            other => panic!("unexpected result {:?}", other),
        }
        assert_eq!(port.sent.len(), 1);
    }

    #[test]
    fn chunk_failure_aborts() {
        let mut port = MockTransport::new()
            .reply(ack(0x50))
            .reply(ack(0x51))
            .silence()
            .reply(ack(0x51))
            .reply(ack(0x52));

        let result = Device::new(&mut port, test_config()).update_firmware(&firmware(600));

        match result {
            Err(ProtocolError::OtaChunkFailed { offset, cause }) => {
                assert_eq!(offset, 256);
                assert!(matches!(*cause, ProtocolError::DeadlineExceeded { .. }));
            }
            other => panic!("unexpected result {:?}", other),
        }
        assert_eq!(port.sent.len(), 3);
        assert_eq!(port.timeout(), Duration::from_millis(20));
    }

    #[test]
    fn end_failure_is_not_fatal() {
        let mut port = MockTransport::new()
            .reply(ack(0x50))
            .reply(ack(0x51))
            .silence();

        let summary = Device::new(&mut port, test_config())
            .update_firmware(&firmware(32))
            .unwrap();

        assert_eq!(summary.chunks, 1);
        assert!(!summary.end_acknowledged);
        assert_eq!(port.sent.len(), 3);
    }

    #[test]
    fn erase_wait() {
        let mut port = MockTransport::new()
            .reply(ack(0x50))
            .reply(ack(0x51))
            .reply(ack(0x52));
        let config = DeviceConfig {
            erase_time: Duration::from_millis(40),
            ..test_config()
        };
        let start = std::time::Instant::now();

        Device::new(&mut port, config)
            .update_firmware(&firmware(32))
            .unwrap();
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn invalid_packet_size() {
        let mut port = MockTransport::new();
        let config = DeviceConfig {
            ota_packet_size: 0,
            ..test_config()
        };

        assert!(matches!(
            Device::new(&mut port, config).update_firmware(&firmware(32)),
            Err(ProtocolError::InvalidPacketSize(0))
        ));
        assert!(port.sent.is_empty());
    }
}
