use std::fmt;

use itertools::Itertools;
use log::info;

use super::exchange::transact;
use super::{expect_byte, frame, Command, Device, ProtocolError};

/// Reserved for discovery; any listening device answers.
pub const BROADCAST_ADDRESS: u8 = 0x00;
pub const UID_LEN: usize = 12;
/// Address, command, length, UID, address echo, CRC.
pub const DISCOVERY_RESPONSE_LEN: usize = 3 + UID_LEN + 1 + frame::CRC_LEN;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub uid: [u8; UID_LEN],
    /// Address the device currently answers to.
    pub address: u8,
}

impl DeviceIdentity {
    /// Discovery responses are always CRC-checked, whatever the session's
    /// CRC policy.
    pub fn decode(response: &[u8]) -> Result<Self, ProtocolError> {
        if response.len() != DISCOVERY_RESPONSE_LEN {
            return Err(ProtocolError::LengthMismatch {
                expected: DISCOVERY_RESPONSE_LEN,
                actual: response.len(),
            });
        }
        frame::validate(response)?;
        expect_byte(response, 1, Command::Discover as u8)?;

        let mut uid = [0u8; UID_LEN];
        uid.copy_from_slice(&response[3..3 + UID_LEN]);

        Ok(Self {
            uid,
            address: response[3 + UID_LEN],
        })
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "uid {} address 0x{:02X}",
            self.uid.iter().map(|b| format!("{:02X}", b)).join(""),
            self.address
        )
    }
}

impl<'a> Device<'a> {
    /// Broadcasts a discovery request.
    ///
    /// The session address is left untouched; callers that want to talk to
    /// the discovered device apply [`DeviceIdentity::address`] themselves.
    pub fn discover(&mut self) -> Result<DeviceIdentity, ProtocolError> {
        let request = frame::encode(BROADCAST_ADDRESS, Command::Discover as u8, &[0, 0, 0]);
        let response = transact(self.port, &request, DISCOVERY_RESPONSE_LEN)?;
        let identity = DeviceIdentity::decode(&response)?;

        info!("discovered {}", identity);
        Ok(identity)
    }
}
