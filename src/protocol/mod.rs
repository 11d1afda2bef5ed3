mod cdb;
mod envelope;
mod scsi;

pub use cdb::{blit_cdb, brightness_cdb, dimension_query_cdb, MAX_BRIGHTNESS};
pub use scsi::{scsi_read, scsi_write};

use crate::error::DeviceError;

/// A pair of bulk endpoints that commands and pixel data travel over.
pub trait BulkLink {
    /// Write the whole buffer to the out endpoint
    fn write_out(&mut self, data: &[u8]) -> Result<(), DeviceError>;

    /// Read one transfer from the in endpoint, returning the byte count
    fn read_in(&mut self, buf: &mut [u8]) -> Result<usize, DeviceError>;
}

/// Space-separated hex dump for trace logging
pub(crate) fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
