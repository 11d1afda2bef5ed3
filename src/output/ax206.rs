use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use anyhow::Result;
use image::DynamicImage;
use tracing::{debug, error, info, trace, warn};

use super::OutputHandler;
use crate::device::Ax206;
use crate::error::DeviceError;
use crate::pixel_format::Rgb565Image;
use crate::rate_limit::RateLimiter;
use crate::usb::Connector;

/// How often a missing device may be reported
const WARN_WINDOW: Duration = Duration::from_secs(10);

struct Session<C: Connector> {
    device: Option<Ax206<C::Link>>,
    warnings: RateLimiter,
}

/// Sink that pushes frames to an AX206 over USB.
///
/// The device is connected lazily: a failed connect leaves the handler
/// disconnected, and the next frame makes exactly one new attempt. Any
/// transfer error drops the connection; the frame is not retried.
pub struct Ax206Output<C: Connector> {
    connector: C,
    brightness: i32,
    session: Mutex<Session<C>>,
}

impl<C: Connector> Ax206Output<C> {
    /// Create the handler and make one connection attempt
    pub fn new(connector: C, brightness: i32) -> Self {
        let handler = Ax206Output {
            connector,
            brightness,
            session: Mutex::new(Session {
                device: None,
                warnings: RateLimiter::new(WARN_WINDOW),
            }),
        };

        {
            let mut session = handler.lock();
            // Failure is already logged; the first frame retries
            let _ = handler.try_connect(&mut session);
        }

        handler
    }

    pub fn is_connected(&self) -> bool {
        self.lock().device.is_some()
    }

    fn lock(&self) -> MutexGuard<'_, Session<C>> {
        // A panic mid-transfer leaves nothing worth protecting
        self.session.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// One connect attempt. A device only counts as connected once it has
    /// answered a brightness command, since enumeration alone proves little.
    fn try_connect(&self, session: &mut Session<C>) -> Result<(), DeviceError> {
        session.device = None;

        let link = match self.connector.connect() {
            Ok(link) => link,
            Err(e) => {
                if session.warnings.allow() {
                    warn!(target: "ax206usb", "Device not available: {}", e);
                }
                return Err(e);
            }
        };

        let mut device = Ax206::open(link);
        if let Err(e) = device.set_brightness(self.brightness) {
            if session.warnings.allow() {
                warn!(target: "ax206usb", "Device test failed: {}", e);
            }
            return Err(e);
        }

        info!(
            target: "ax206usb",
            "Connected ({}x{})",
            device.width(),
            device.height()
        );
        session.device = Some(device);
        Ok(())
    }
}

impl<C: Connector> OutputHandler for Ax206Output<C> {
    fn output(&self, frame: &DynamicImage) -> Result<()> {
        let mut session = self.lock();

        if session.device.is_none() {
            self.try_connect(&mut session)?;
        }

        let Some(device) = session.device.as_mut() else {
            return Err(DeviceError::Enumeration("device not available".into()).into());
        };

        let img = Rgb565Image::from_frame(frame);
        if img.width() != device.width() || img.height() != device.height() {
            debug!(
                target: "ax206usb",
                "Frame is {}x{}, device is {}x{}",
                img.width(),
                img.height(),
                device.width(),
                device.height()
            );
        }
        trace!(
            target: "ax206usb",
            "Sending frame, origin pixel {:?}",
            img.pixel(0, 0).to_rgb888()
        );
        if let Err(e) = device.blit_image(&img) {
            error!(target: "ax206usb", "Transfer failed: {}", e);
            session.device = None;
            return Err(e.into());
        }

        Ok(())
    }

    fn close(&self) -> Result<()> {
        if self.lock().device.take().is_some() {
            info!(target: "ax206usb", "Disconnecting");
        }
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "ax206usb"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::testing::{ScriptedLink, GOOD_STATUS};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Hands out prepared links, one per connect call
    struct FakeConnector {
        links: Mutex<VecDeque<Result<ScriptedLink, DeviceError>>>,
        attempts: Arc<AtomicUsize>,
    }

    impl FakeConnector {
        fn new(links: Vec<Result<ScriptedLink, DeviceError>>) -> Self {
            FakeConnector {
                links: Mutex::new(links.into()),
                attempts: Arc::default(),
            }
        }
    }

    impl Connector for FakeConnector {
        type Link = ScriptedLink;

        fn connect(&self) -> Result<ScriptedLink, DeviceError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            self.links
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(DeviceError::Enumeration("unplugged".into())))
        }
    }

    /// A 4x2 device that acks the sanity check and then `replies`
    fn healthy(replies: &[&[u8]]) -> Result<ScriptedLink, DeviceError> {
        let mut link = ScriptedLink::new()
            .reply(&[4, 0, 2, 0, 0])
            .ack()
            .ack();
        for reply in replies {
            link = link.reply(reply);
        }
        Ok(link)
    }

    fn absent() -> Result<ScriptedLink, DeviceError> {
        Err(DeviceError::Enumeration("no device".into()))
    }

    fn refused() -> Result<ScriptedLink, DeviceError> {
        Err(DeviceError::Resource("failed to claim interface 0".into()))
    }

    fn frame() -> DynamicImage {
        DynamicImage::new_rgb8(4, 2)
    }

    #[test]
    fn test_connects_on_construction() {
        let handler = Ax206Output::new(FakeConnector::new(vec![healthy(&[&GOOD_STATUS])]), 7);
        assert!(handler.is_connected());
        assert!(handler.output(&frame()).is_ok());
        assert_eq!(handler.connector.attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_absent_device_drops_frame() {
        let handler = Ax206Output::new(FakeConnector::new(vec![absent(), absent()]), 7);
        assert!(!handler.is_connected());

        let err = handler.output(&frame()).unwrap_err();
        assert_eq!(
            err.downcast_ref::<DeviceError>(),
            Some(&DeviceError::Enumeration("no device".into()))
        );
        // one attempt at construction, one inline retry
        assert_eq!(handler.connector.attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_reconnects_lazily() {
        let handler = Ax206Output::new(
            FakeConnector::new(vec![absent(), healthy(&[&GOOD_STATUS])]),
            7,
        );
        assert!(!handler.is_connected());
        assert!(handler.output(&frame()).is_ok());
        assert!(handler.is_connected());
    }

    #[test]
    fn test_failed_sanity_check_stays_disconnected() {
        let link = ScriptedLink::new()
            .reply(&[4, 0, 2, 0, 0])
            .ack()
            .reply(&[0u8; 13]);
        let handler = Ax206Output::new(FakeConnector::new(vec![Ok(link)]), 7);
        assert!(!handler.is_connected());
    }

    #[test]
    fn test_reconnect_failure_reports_cause() {
        let nak = ScriptedLink::new()
            .reply(&[4, 0, 2, 0, 0])
            .ack()
            .reply(&[0u8; 13]);
        let handler = Ax206Output::new(FakeConnector::new(vec![refused(), Ok(nak)]), 7);

        // construction consumed the claim failure; the frame hits the bad sanity check
        let err = handler.output(&frame()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DeviceError>(),
            Some(DeviceError::Protocol(_))
        ));

        let handler = Ax206Output::new(FakeConnector::new(vec![absent(), refused()]), 7);
        let err = handler.output(&frame()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DeviceError>(),
            Some(DeviceError::Resource(_))
        ));
        assert!(!handler.is_connected());
    }

    #[test]
    fn test_transfer_failure_tears_down() {
        let handler = Ax206Output::new(
            FakeConnector::new(vec![
                healthy(&[&[0u8; 13]]),
                healthy(&[&GOOD_STATUS]),
            ]),
            7,
        );

        let err = handler.output(&frame()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DeviceError>(),
            Some(DeviceError::Protocol(_))
        ));
        assert!(!handler.is_connected());
        assert_eq!(handler.connector.attempts.load(Ordering::SeqCst), 1);

        // next frame reconnects with a fresh link
        assert!(handler.output(&frame()).is_ok());
        assert_eq!(handler.connector.attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_close_is_idempotent() {
        let handler = Ax206Output::new(FakeConnector::new(vec![healthy(&[])]), 3);
        assert!(handler.close().is_ok());
        assert!(!handler.is_connected());
        assert!(handler.close().is_ok());
        assert_eq!(handler.kind(), "ax206usb");
    }
}
