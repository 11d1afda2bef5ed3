//! USB plumbing for the AX206: context, device handle, configuration,
//! interface and the two bulk endpoints.
//!
//! Every resource lives in an `Option` on [`UsbConnection`]. Acquisition
//! fills them front to back; [`UsbConnection::close`] empties them back to
//! front and skips whatever was never acquired, so a connection that failed
//! halfway cleans up the same way as a healthy one.

use std::time::Duration;

use rusb::{TransferType, UsbContext};
use tracing::debug;

use crate::error::DeviceError;
use crate::protocol::BulkLink;

pub const AX206_VID: u16 = 0x1908;
pub const AX206_PID: u16 = 0x0102;

/// Where to find the display on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsbSettings {
    pub vendor_id: u16,
    pub product_id: u16,
    pub configuration: u8,
    pub interface: u8,
    pub out_endpoint: u8,
    pub in_endpoint: u8,
    /// Deadline for each bulk transfer
    pub timeout: Duration,
}

impl Default for UsbSettings {
    fn default() -> Self {
        UsbSettings {
            vendor_id: AX206_VID,
            product_id: AX206_PID,
            configuration: 1,
            interface: 0,
            out_endpoint: 0x01,
            in_endpoint: 0x81,
            timeout: Duration::from_millis(1000),
        }
    }
}

/// A USB context able to open devices.
pub trait UsbBus: Sized {
    type Handle: UsbHandle;

    fn open_device(&self, vendor_id: u16, product_id: u16) -> Result<Self::Handle, DeviceError>;
}

/// An open device handle. Dropping it closes the device.
pub trait UsbHandle {
    fn select_configuration(&mut self, configuration: u8) -> Result<(), DeviceError>;
    fn claim_interface(&mut self, interface: u8) -> Result<(), DeviceError>;
    fn release_interface(&mut self, interface: u8) -> Result<(), DeviceError>;
    /// Check that `address` is a bulk endpoint of `interface`
    fn find_bulk_endpoint(&self, interface: u8, address: u8) -> Result<(), DeviceError>;
    fn write_bulk(&self, endpoint: u8, data: &[u8], timeout: Duration) -> Result<usize, DeviceError>;
    fn read_bulk(&self, endpoint: u8, buf: &mut [u8], timeout: Duration) -> Result<usize, DeviceError>;
}

/// Opens a fresh link to the display, one attempt per call.
pub trait Connector: Send {
    type Link: BulkLink + Send;

    fn connect(&self) -> Result<Self::Link, DeviceError>;
}

/// A claimed AX206 with both bulk endpoints resolved.
pub struct UsbConnection<B: UsbBus> {
    settings: UsbSettings,
    context: Option<B>,
    handle: Option<B::Handle>,
    configuration: Option<u8>,
    interface: Option<u8>,
    out_endpoint: Option<u8>,
    in_endpoint: Option<u8>,
}

impl<B: UsbBus> UsbConnection<B> {
    /// Acquire everything in order, unwinding on the first failure.
    pub fn open<F>(init: F, settings: UsbSettings) -> Result<Self, DeviceError>
    where
        F: FnOnce() -> Result<B, DeviceError>,
    {
        let mut conn = UsbConnection {
            settings,
            context: None,
            handle: None,
            configuration: None,
            interface: None,
            out_endpoint: None,
            in_endpoint: None,
        };

        if let Err(e) = conn.acquire(init) {
            conn.close();
            return Err(e);
        }

        Ok(conn)
    }

    fn acquire<F>(&mut self, init: F) -> Result<(), DeviceError>
    where
        F: FnOnce() -> Result<B, DeviceError>,
    {
        let s = self.settings;

        let context = self.context.insert(init()?);
        let handle = self
            .handle
            .insert(context.open_device(s.vendor_id, s.product_id)?);
        debug!(target: "ax206usb", "Device opened: {:04x}:{:04x}", s.vendor_id, s.product_id);

        handle.select_configuration(s.configuration)?;
        self.configuration = Some(s.configuration);

        handle.claim_interface(s.interface)?;
        self.interface = Some(s.interface);

        handle.find_bulk_endpoint(s.interface, s.out_endpoint)?;
        self.out_endpoint = Some(s.out_endpoint);

        handle.find_bulk_endpoint(s.interface, s.in_endpoint)?;
        self.in_endpoint = Some(s.in_endpoint);

        Ok(())
    }

    #[allow(dead_code)]
    pub fn is_open(&self) -> bool {
        self.in_endpoint.is_some()
    }

    /// Release whatever is held, newest first. Safe to call repeatedly.
    pub fn close(&mut self) {
        self.in_endpoint = None;
        self.out_endpoint = None;

        if let Some(interface) = self.interface.take() {
            if let Some(handle) = self.handle.as_mut() {
                if let Err(e) = handle.release_interface(interface) {
                    debug!(target: "ax206usb", "Interface release failed: {}", e);
                }
            }
        }

        self.configuration = None;

        if self.handle.take().is_some() {
            debug!(target: "ax206usb", "Device closed");
        }
        self.context = None;
    }

    fn endpoint(&self, endpoint: Option<u8>) -> Result<(&B::Handle, u8), DeviceError> {
        match (self.handle.as_ref(), endpoint) {
            (Some(handle), Some(address)) => Ok((handle, address)),
            _ => Err(DeviceError::Transfer("connection closed".into())),
        }
    }
}

impl<B: UsbBus> Drop for UsbConnection<B> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<B: UsbBus> BulkLink for UsbConnection<B> {
    fn write_out(&mut self, data: &[u8]) -> Result<(), DeviceError> {
        let (handle, address) = self.endpoint(self.out_endpoint)?;
        let mut sent = 0;
        while sent < data.len() {
            let n = handle.write_bulk(address, &data[sent..], self.settings.timeout)?;
            if n == 0 {
                return Err(DeviceError::Transfer(format!(
                    "endpoint {:#04x} accepted no data ({} of {} bytes sent)",
                    address,
                    sent,
                    data.len()
                )));
            }
            sent += n;
        }
        Ok(())
    }

    fn read_in(&mut self, buf: &mut [u8]) -> Result<usize, DeviceError> {
        let (handle, address) = self.endpoint(self.in_endpoint)?;
        handle.read_bulk(address, buf, self.settings.timeout)
    }
}

/// libusb context backed by `rusb`
pub struct RusbBus(rusb::Context);

impl RusbBus {
    pub fn new() -> Result<Self, DeviceError> {
        rusb::Context::new()
            .map(RusbBus)
            .map_err(|e| DeviceError::Enumeration(format!("failed to create USB context: {}", e)))
    }
}

impl UsbBus for RusbBus {
    type Handle = RusbHandle;

    fn open_device(&self, vendor_id: u16, product_id: u16) -> Result<RusbHandle, DeviceError> {
        self.0
            .open_device_with_vid_pid(vendor_id, product_id)
            .map(RusbHandle)
            .ok_or_else(|| {
                DeviceError::Enumeration(format!(
                    "no device {:04x}:{:04x} found",
                    vendor_id, product_id
                ))
            })
    }
}

pub struct RusbHandle(rusb::DeviceHandle<rusb::Context>);

impl UsbHandle for RusbHandle {
    fn select_configuration(&mut self, configuration: u8) -> Result<(), DeviceError> {
        if self.0.active_configuration().ok() == Some(configuration) {
            return Ok(());
        }
        self.0.set_active_configuration(configuration).map_err(|e| {
            DeviceError::Resource(format!("failed to set configuration {}: {}", configuration, e))
        })
    }

    fn claim_interface(&mut self, interface: u8) -> Result<(), DeviceError> {
        // usb-storage grabs the frame on Linux
        if let Err(e) = self.0.set_auto_detach_kernel_driver(true) {
            debug!(target: "ax206usb", "Kernel driver auto-detach unavailable: {}", e);
        }
        self.0.claim_interface(interface).map_err(|e| {
            DeviceError::Resource(format!("failed to claim interface {}: {}", interface, e))
        })
    }

    fn release_interface(&mut self, interface: u8) -> Result<(), DeviceError> {
        self.0.release_interface(interface).map_err(|e| {
            DeviceError::Resource(format!("failed to release interface {}: {}", interface, e))
        })
    }

    fn find_bulk_endpoint(&self, interface: u8, address: u8) -> Result<(), DeviceError> {
        let config = self
            .0
            .device()
            .active_config_descriptor()
            .map_err(|e| DeviceError::Resource(format!("failed to read configuration: {}", e)))?;

        for iface in config.interfaces() {
            if iface.number() != interface {
                continue;
            }
            for alt in iface.descriptors() {
                for ep in alt.endpoint_descriptors() {
                    if ep.address() == address && ep.transfer_type() == TransferType::Bulk {
                        return Ok(());
                    }
                }
            }
        }

        Err(DeviceError::Resource(format!(
            "no bulk endpoint {:#04x} on interface {}",
            address, interface
        )))
    }

    fn write_bulk(&self, endpoint: u8, data: &[u8], timeout: Duration) -> Result<usize, DeviceError> {
        self.0
            .write_bulk(endpoint, data, timeout)
            .map_err(|e| DeviceError::Transfer(format!("write to {:#04x} failed: {}", endpoint, e)))
    }

    fn read_bulk(&self, endpoint: u8, buf: &mut [u8], timeout: Duration) -> Result<usize, DeviceError> {
        self.0
            .read_bulk(endpoint, buf, timeout)
            .map_err(|e| DeviceError::Transfer(format!("read from {:#04x} failed: {}", endpoint, e)))
    }
}

/// Connects to the real display through libusb
#[derive(Debug, Clone, Default)]
pub struct UsbConnector {
    settings: UsbSettings,
}

impl UsbConnector {
    pub fn new(settings: UsbSettings) -> Self {
        UsbConnector { settings }
    }
}

impl Connector for UsbConnector {
    type Link = UsbConnection<RusbBus>;

    fn connect(&self) -> Result<Self::Link, DeviceError> {
        UsbConnection::open(RusbBus::new, self.settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    type Journal = Arc<Mutex<Vec<String>>>;

    fn log(journal: &Journal, event: impl Into<String>) {
        journal.lock().unwrap().push(event.into());
    }

    struct FakeBus {
        journal: Journal,
        fail_at: Option<&'static str>,
        chunk: usize,
    }

    impl Drop for FakeBus {
        fn drop(&mut self) {
            log(&self.journal, "close context");
        }
    }

    impl UsbBus for FakeBus {
        type Handle = FakeHandle;

        fn open_device(&self, vendor_id: u16, product_id: u16) -> Result<FakeHandle, DeviceError> {
            if self.fail_at == Some("open") {
                return Err(DeviceError::Enumeration("absent".into()));
            }
            log(&self.journal, format!("open {:04x}:{:04x}", vendor_id, product_id));
            Ok(FakeHandle {
                journal: Arc::clone(&self.journal),
                fail_at: self.fail_at,
                chunk: self.chunk,
            })
        }
    }

    struct FakeHandle {
        journal: Journal,
        fail_at: Option<&'static str>,
        chunk: usize,
    }

    impl Drop for FakeHandle {
        fn drop(&mut self) {
            log(&self.journal, "close device");
        }
    }

    impl UsbHandle for FakeHandle {
        fn select_configuration(&mut self, configuration: u8) -> Result<(), DeviceError> {
            if self.fail_at == Some("config") {
                return Err(DeviceError::Resource("config".into()));
            }
            log(&self.journal, format!("config {}", configuration));
            Ok(())
        }

        fn claim_interface(&mut self, interface: u8) -> Result<(), DeviceError> {
            if self.fail_at == Some("claim") {
                return Err(DeviceError::Resource("busy".into()));
            }
            log(&self.journal, format!("claim {}", interface));
            Ok(())
        }

        fn release_interface(&mut self, interface: u8) -> Result<(), DeviceError> {
            log(&self.journal, format!("release {}", interface));
            Ok(())
        }

        fn find_bulk_endpoint(&self, _interface: u8, address: u8) -> Result<(), DeviceError> {
            if self.fail_at == Some("in") && address == 0x81 {
                return Err(DeviceError::Resource("no in endpoint".into()));
            }
            log(&self.journal, format!("endpoint {:02x}", address));
            Ok(())
        }

        fn write_bulk(&self, endpoint: u8, data: &[u8], _timeout: Duration) -> Result<usize, DeviceError> {
            let n = data.len().min(self.chunk);
            log(&self.journal, format!("write {:02x} {}", endpoint, n));
            Ok(n)
        }

        fn read_bulk(&self, endpoint: u8, buf: &mut [u8], _timeout: Duration) -> Result<usize, DeviceError> {
            log(&self.journal, format!("read {:02x}", endpoint));
            buf[..4].copy_from_slice(b"USBS");
            Ok(4)
        }
    }

    fn open_fake(
        fail_at: Option<&'static str>,
    ) -> (Journal, Result<UsbConnection<FakeBus>, DeviceError>) {
        let journal: Journal = Arc::default();
        let bus_journal = Arc::clone(&journal);
        let init = move || {
            log(&bus_journal, "context");
            Ok(FakeBus {
                journal: bus_journal,
                fail_at,
                chunk: 64,
            })
        };
        let result = UsbConnection::open(init, UsbSettings::default());
        (journal, result)
    }

    fn events(journal: &Journal) -> Vec<String> {
        journal.lock().unwrap().clone()
    }

    #[test]
    fn test_acquire_order() {
        let (journal, conn) = open_fake(None);
        let conn = conn.unwrap();
        assert!(conn.is_open());
        assert_eq!(
            events(&journal),
            ["context", "open 1908:0102", "config 1", "claim 0", "endpoint 01", "endpoint 81"]
        );
    }

    #[test]
    fn test_close_reverses_and_is_idempotent() {
        let (journal, conn) = open_fake(None);
        let mut conn = conn.unwrap();
        journal.lock().unwrap().clear();

        conn.close();
        conn.close();
        drop(conn);

        assert_eq!(
            events(&journal),
            ["release 0", "close device", "close context"]
        );
    }

    #[test]
    fn test_claim_failure_releases_only_acquired() {
        let (journal, conn) = open_fake(Some("claim"));
        assert!(matches!(conn, Err(DeviceError::Resource(_))));
        assert_eq!(
            events(&journal),
            ["context", "open 1908:0102", "config 1", "close device", "close context"]
        );
    }

    #[test]
    fn test_missing_in_endpoint_releases_interface() {
        let (journal, conn) = open_fake(Some("in"));
        assert!(matches!(conn, Err(DeviceError::Resource(_))));
        let events = events(&journal);
        assert_eq!(
            events[events.len() - 3..].to_vec(),
            ["release 0", "close device", "close context"]
        );
    }

    #[test]
    fn test_enumeration_failure_closes_context() {
        let (journal, conn) = open_fake(Some("open"));
        assert!(matches!(conn, Err(DeviceError::Enumeration(_))));
        assert_eq!(events(&journal), ["context", "close context"]);
    }

    #[test]
    fn test_write_out_loops_until_done() {
        let (journal, conn) = open_fake(None);
        let mut conn = conn.unwrap();
        journal.lock().unwrap().clear();

        conn.write_out(&[0u8; 150]).unwrap();
        assert_eq!(
            events(&journal),
            ["write 01 64", "write 01 64", "write 01 22"]
        );

        let mut buf = [0u8; 13];
        assert_eq!(conn.read_in(&mut buf).unwrap(), 4);
    }

    #[test]
    fn test_io_after_close_fails() {
        let (_journal, conn) = open_fake(None);
        let mut conn = conn.unwrap();
        conn.close();
        assert!(matches!(
            conn.write_out(&[1]),
            Err(DeviceError::Transfer(_))
        ));
    }
}
