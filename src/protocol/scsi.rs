use tracing::trace;

use super::cdb::Cdb;
use super::envelope::{build_envelope, check_status, Direction, CSW_LEN};
use super::{hex, BulkLink};
use crate::error::{DeviceError, PartialRead};

/// Send a command with an optional host-to-device payload, then wait for
/// the status reply.
///
/// Nothing is retried here; the caller owns reconnect policy.
pub fn scsi_write<L: BulkLink + ?Sized>(
    link: &mut L,
    cdb: &Cdb,
    payload: &[u8],
) -> Result<(), DeviceError> {
    let data_len = u32::try_from(payload.len()).map_err(|_| DeviceError::Validation {
        expected: u32::MAX as usize,
        actual: payload.len(),
    })?;
    let envelope = build_envelope(cdb, data_len, Direction::Out);
    trace!(target: "ax206usb", "[WRITE] command {}", hex(&envelope));

    link.write_out(&envelope)?;

    if !payload.is_empty() {
        trace!(target: "ax206usb", "[WRITE] {} bytes of data", payload.len());
        link.write_out(payload)?;
    }

    read_status(link)
}

/// Send a device-to-host command and read back up to `expected_len` bytes.
///
/// If the data arrived but the status reply is bad, the data is handed back
/// inside the error.
pub fn scsi_read<L: BulkLink + ?Sized>(
    link: &mut L,
    cdb: &Cdb,
    expected_len: usize,
) -> Result<Vec<u8>, PartialRead> {
    let data_len = u32::try_from(expected_len).map_err(|_| DeviceError::Validation {
        expected: u32::MAX as usize,
        actual: expected_len,
    })?;
    let envelope = build_envelope(cdb, data_len, Direction::In);
    trace!(target: "ax206usb", "[READ] command {}", hex(&envelope));

    link.write_out(&envelope)?;

    let mut data = vec![0u8; expected_len];
    let n = link.read_in(&mut data)?;
    data.truncate(n);
    trace!(target: "ax206usb", "[READ] data {}", hex(&data));

    match read_status(link) {
        Ok(()) => Ok(data),
        Err(source) => Err(PartialRead { data, source }),
    }
}

fn read_status<L: BulkLink + ?Sized>(link: &mut L) -> Result<(), DeviceError> {
    let mut buf = [0u8; CSW_LEN];
    let n = link
        .read_in(&mut buf)
        .map_err(|e| DeviceError::Protocol(format!("status read failed: {}", e)))?;
    trace!(target: "ax206usb", "[ACK] {}", hex(&buf[..n]));
    check_status(&buf[..n])
}
