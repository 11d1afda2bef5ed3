use thiserror::Error;

/// Failures raised while talking to the display.
///
/// `Enumeration` and `Resource` come from connecting; `Transfer` and
/// `Protocol` end an active session. `Validation` is a caller bug that is
/// caught before anything reaches the wire.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("device not available: {0}")]
    Enumeration(String),

    #[error("USB resource unavailable: {0}")]
    Resource(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("transfer failed: {0}")]
    Transfer(String),

    #[error("invalid payload: expected {expected} bytes, got {actual}")]
    Validation { expected: usize, actual: usize },
}

/// A device-to-host read whose status check failed after some data arrived.
///
/// The bytes read before the failure are kept so callers can decide whether
/// a partial answer is still usable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{source}")]
pub struct PartialRead {
    pub data: Vec<u8>,
    pub source: DeviceError,
}

impl From<DeviceError> for PartialRead {
    fn from(source: DeviceError) -> Self {
        PartialRead {
            data: Vec::new(),
            source,
        }
    }
}
