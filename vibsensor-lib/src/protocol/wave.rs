use log::{debug, info, warn};

use super::exchange::transact;
use super::frame::CRC_LEN;
use super::{decode_be_f32, expect_byte, Command, Device, ProtocolError};

pub const WAVE_POINTS: usize = 4096;
pub const SAMPLES_PER_PACKET: usize = 64;
pub const PACKET_COUNT: usize = WAVE_POINTS / SAMPLES_PER_PACKET;
/// Four header bytes, the samples as big-endian floats, CRC.
pub const WAVE_PACKET_LEN: usize = PACKET_HEADER_LEN + SAMPLES_PER_PACKET * 4 + CRC_LEN;

const PACKET_HEADER_LEN: usize = 4;
const SNAPSHOT_RESPONSE_LEN: usize = 7;
const SNAPSHOT_OK: u8 = b'O';

impl<'a> Device<'a> {
    /// Freezes the device's waveform buffer so it can be read out packet by
    /// packet.
    pub fn arm_snapshot(&mut self) -> Result<(), ProtocolError> {
        let request = self.request(Command::WaveSnapshot, &[0, 0, 0]);
        let response = transact(self.port, &request, SNAPSHOT_RESPONSE_LEN)?;

        self.check_crc(&response)?;
        expect_byte(&response, 3, SNAPSHOT_OK)
    }

    pub fn read_wave_packet(&mut self, seq: u8) -> Result<Vec<f32>, ProtocolError> {
        let request = self.request(Command::WavePacket, &[seq, PACKET_COUNT as u8, 0]);
        let response = transact(self.port, &request, WAVE_PACKET_LEN)?;

        self.check_crc(&response)?;
        Ok(decode_be_f32(
            &response[PACKET_HEADER_LEN..response.len() - CRC_LEN],
        ))
    }

    /// Arms a snapshot and reads all of its packets in order.
    ///
    /// The first packet that fails ends the capture; the samples collected
    /// up to that point are handed back inside
    /// [`ProtocolError::PacketSequenceAborted`].
    pub fn capture_waveform(&mut self) -> Result<Vec<f32>, ProtocolError> {
        self.arm_snapshot()
            .map_err(|e| ProtocolError::SnapshotArmFailed(Box::new(e)))?;
        info!("snapshot armed, reading {} points", WAVE_POINTS);

        let mut samples = Vec::with_capacity(WAVE_POINTS);
        for seq in 0..PACKET_COUNT as u8 {
            match self.read_wave_packet(seq) {
                Ok(packet) => {
                    samples.extend(packet);
                    debug!("packet {}/{}", seq as usize + 1, PACKET_COUNT);
                }
                Err(e) => {
                    warn!("packet {} lost: {}", seq, e);
                    return Err(ProtocolError::PacketSequenceAborted {
                        seq,
                        samples,
                        cause: Box::new(e),
                    });
                }
            }
        }

        info!("waveform complete");
        Ok(samples)
    }
}
