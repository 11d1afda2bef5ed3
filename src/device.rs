use tracing::{debug, warn};

use crate::error::DeviceError;
use crate::pixel_format::{Rect, Rgb565Image};
use crate::protocol::{
    blit_cdb, brightness_cdb, dimension_query_cdb, scsi_read, scsi_write, BulkLink,
    MAX_BRIGHTNESS,
};

/// Resolution assumed when the device will not report one
pub const DEFAULT_WIDTH: u16 = 480;
pub const DEFAULT_HEIGHT: u16 = 320;

const DIMENSION_REPLY_LEN: usize = 5;

/// An AX206 picture frame reachable over a bulk link.
pub struct Ax206<L: BulkLink> {
    link: L,
    width: u16,
    height: u16,
}

impl<L: BulkLink> Ax206<L> {
    /// Wrap a connected link and learn the panel size.
    ///
    /// Many units answer the size query unreliably but blit fine, so a
    /// failed query falls back to 480x320 instead of failing.
    pub fn open(link: L) -> Self {
        let mut device = Ax206 {
            link,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
        };

        match device.query_dimensions() {
            Ok((width, height)) => {
                debug!(target: "ax206usb", "Device dimensions: {}x{}", width, height);
                device.width = width;
                device.height = height;
            }
            Err(e) => {
                warn!(
                    target: "ax206usb",
                    "Failed to get device dimensions, using {}x{}: {}",
                    DEFAULT_WIDTH, DEFAULT_HEIGHT, e
                );
            }
        }

        device
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    /// Ask the panel for its width and height
    pub fn query_dimensions(&mut self) -> Result<(u16, u16), DeviceError> {
        let data = scsi_read(&mut self.link, &dimension_query_cdb(), DIMENSION_REPLY_LEN)
            .map_err(|e| e.source)?;
        if data.len() < 4 {
            return Err(DeviceError::Protocol(format!(
                "dimension reply too short ({} bytes)",
                data.len()
            )));
        }
        let width = u16::from_le_bytes([data[0], data[1]]);
        let height = u16::from_le_bytes([data[2], data[3]]);
        Ok((width, height))
    }

    /// Set backlight brightness; values outside 0..=7 are clamped
    pub fn set_brightness(&mut self, level: i32) -> Result<(), DeviceError> {
        let level = level.clamp(0, MAX_BRIGHTNESS as i32) as u8;
        scsi_write(&mut self.link, &brightness_cdb(level), &[])
    }

    /// Copy an RGB565 payload into `rect` of the device frame buffer.
    ///
    /// The payload must hold exactly `width * height * 2` bytes for `rect`.
    pub fn blit(&mut self, rect: Rect, payload: &[u8]) -> Result<(), DeviceError> {
        let expected = rect.payload_len();
        if payload.len() != expected {
            return Err(DeviceError::Validation {
                expected,
                actual: payload.len(),
            });
        }
        if rect.is_empty() {
            debug!(target: "ax206usb", "Skipping empty blit {:?}", rect);
            return Ok(());
        }
        scsi_write(&mut self.link, &blit_cdb(&rect), payload)
    }

    /// Blit a whole encoded image at the origin
    pub fn blit_image(&mut self, img: &Rgb565Image) -> Result<(), DeviceError> {
        self.blit(img.bounds(), img.as_bytes())
    }
}
