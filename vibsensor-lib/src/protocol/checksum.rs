use crc::{Crc, CRC_16_MODBUS};

/// CRC16/Modbus: reflected polynomial 0xA001, seed 0xFFFF, no final xor.
pub fn crc16(data: &[u8]) -> u16 {
    let crc = Crc::<u16>::new(&CRC_16_MODBUS);
    crc.checksum(data)
}
