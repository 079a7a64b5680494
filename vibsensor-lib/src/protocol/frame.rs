//! Wire frame codec.
//!
//! Every frame is `[address][command][payload..][crc_lo][crc_hi]`, with the
//! CRC16/Modbus computed over everything that precedes it.

use super::checksum::crc16;
use super::ProtocolError;

/// Address byte plus command byte.
pub const HEADER_LEN: usize = 2;
pub const CRC_LEN: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub address: u8,
    pub command: u8,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(address: u8, command: u8, payload: &[u8]) -> Self {
        Frame {
            address,
            command,
            payload: payload.to_vec(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        encode(self.address, self.command, &self.payload)
    }

    /// Validates the trailing CRC and splits `bytes` back into its fields.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < HEADER_LEN + CRC_LEN {
            return Err(ProtocolError::LengthMismatch {
                expected: HEADER_LEN + CRC_LEN,
                actual: bytes.len(),
            });
        }
        validate(bytes)?;

        Ok(Frame {
            address: bytes[0],
            command: bytes[1],
            payload: bytes[HEADER_LEN..bytes.len() - CRC_LEN].to_vec(),
        })
    }
}

pub fn encode(address: u8, command: u8, payload: &[u8]) -> Vec<u8> {
    let mut buffer = Vec::with_capacity(HEADER_LEN + payload.len() + CRC_LEN);

    buffer.push(address);
    buffer.push(command);
    buffer.extend_from_slice(payload);

    let cs = crc16(&buffer);
    buffer.extend_from_slice(&cs.to_le_bytes());
    buffer
}

pub fn validate(bytes: &[u8]) -> Result<(), ProtocolError> {
    if bytes.len() < CRC_LEN {
        return Err(ProtocolError::LengthMismatch {
            expected: CRC_LEN,
            actual: bytes.len(),
        });
    }

    let (body, tail) = bytes.split_at(bytes.len() - CRC_LEN);
    let received = u16::from_le_bytes([tail[0], tail[1]]);
    let computed = crc16(body);

    if received != computed {
        return Err(ProtocolError::CrcMismatch { received, computed });
    }
    Ok(())
}
