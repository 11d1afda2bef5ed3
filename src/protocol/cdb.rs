//! Command descriptor blocks understood by the AX206 firmware.

use crate::pixel_format::Rect;

pub const CDB_LEN: usize = 16;
pub type Cdb = [u8; CDB_LEN];

pub const MAX_BRIGHTNESS: u8 = 7;

const OPCODE: u8 = 0xcd;
const CMD_SET_PROPERTY: u8 = 0x01;
const CMD_BLIT: u8 = 0x12;
const PROPERTY_BRIGHTNESS: u16 = 1;

/// Ask the device for its panel width and height
pub fn dimension_query_cdb() -> Cdb {
    let mut cdb = [0u8; CDB_LEN];
    cdb[0] = OPCODE;
    cdb[5] = 0x02;
    cdb
}

/// Set the backlight level (already clamped by the caller)
pub fn brightness_cdb(level: u8) -> Cdb {
    let mut cdb = [0u8; CDB_LEN];
    cdb[0] = OPCODE;
    cdb[5] = 0x06;
    cdb[6] = CMD_SET_PROPERTY;
    cdb[7..9].copy_from_slice(&PROPERTY_BRIGHTNESS.to_le_bytes());
    cdb[9..11].copy_from_slice(&(level as u16).to_le_bytes());
    cdb
}

/// Blit into `rect`. The wire wants inclusive end coordinates.
pub fn blit_cdb(rect: &Rect) -> Cdb {
    let mut cdb = [0u8; CDB_LEN];
    cdb[0] = OPCODE;
    cdb[5] = 0x06;
    cdb[6] = CMD_BLIT;
    cdb[7..9].copy_from_slice(&rect.x0.to_le_bytes());
    cdb[9..11].copy_from_slice(&rect.y0.to_le_bytes());
    cdb[11..13].copy_from_slice(&rect.x1.saturating_sub(1).to_le_bytes());
    cdb[13..15].copy_from_slice(&rect.y1.saturating_sub(1).to_le_bytes());
    cdb
}
