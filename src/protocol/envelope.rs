//! Mass-storage style command wrapper (CBW) and status reply (CSW).
//!
//! ```text
//! [0..4]   "USBC"
//! [4..8]   tag
//! [8..12]  data length (LE u32)
//! [12]     flags: 0x80 = device to host, 0x00 = host to device
//! [13]     LUN (always 0)
//! [14]     CDB length
//! [15..31] CDB
//! ```

use super::cdb::{Cdb, CDB_LEN};
use crate::error::DeviceError;

pub const CBW_LEN: usize = 31;
pub const CSW_LEN: usize = 13;

const CBW_SIGNATURE: [u8; 4] = *b"USBC";
const CSW_SIGNATURE: [u8; 4] = *b"USBS";
const CBW_TAG: [u8; 4] = [0xde, 0xad, 0xbe, 0xef];

/// Data phase direction of a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Host to device
    Out,
    /// Device to host
    In,
}

impl Direction {
    fn flag(self) -> u8 {
        match self {
            Direction::Out => 0x00,
            Direction::In => 0x80,
        }
    }
}

/// Build the 31-byte command envelope
pub fn build_envelope(cdb: &Cdb, data_len: u32, direction: Direction) -> [u8; CBW_LEN] {
    let mut buf = [0u8; CBW_LEN];
    buf[0..4].copy_from_slice(&CBW_SIGNATURE);
    buf[4..8].copy_from_slice(&CBW_TAG);
    buf[8..12].copy_from_slice(&data_len.to_le_bytes());
    buf[12] = direction.flag();
    buf[13] = 0; // LUN
    buf[14] = CDB_LEN as u8;
    buf[15..].copy_from_slice(cdb);
    buf
}

/// Validate a status reply.
///
/// Only the signature is checked. The status byte at offset 12 is left
/// alone: existing units answer with values there that a strict check
/// would reject.
pub fn check_status(reply: &[u8]) -> Result<(), DeviceError> {
    if reply.len() < 4 {
        return Err(DeviceError::Protocol(format!(
            "short status reply ({} bytes)",
            reply.len()
        )));
    }
    if reply[..4] != CSW_SIGNATURE {
        return Err(DeviceError::Protocol(format!(
            "invalid status signature {:02x?}",
            &reply[..4]
        )));
    }
    Ok(())
}
