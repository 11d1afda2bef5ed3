use image::DynamicImage;

/// A single RGB565 color (5 bits red, 6 bits green, 5 bits blue).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgb565(pub u16);

impl Rgb565 {
    pub const BLACK: Rgb565 = Rgb565(0x0000);

    /// Pack 8-bit channels by keeping the top 5/6/5 bits
    pub fn from_rgb(r: u8, g: u8, b: u8) -> Self {
        let r5 = (r >> 3) as u16;
        let g6 = (g >> 2) as u16;
        let b5 = (b >> 3) as u16;
        Rgb565((r5 << 11) | (g6 << 5) | b5)
    }

    /// Expand back to 8-bit channels (low bits are zero)
    pub fn to_rgb888(self) -> [u8; 3] {
        let r = ((self.0 >> 11) & 0x1f) as u8;
        let g = ((self.0 >> 5) & 0x3f) as u8;
        let b = (self.0 & 0x1f) as u8;
        [r << 3, g << 2, b << 3]
    }

    pub fn to_be_bytes(self) -> [u8; 2] {
        self.0.to_be_bytes()
    }
}

/// Half-open pixel rectangle `[x0, x1) x [y0, y1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x0: u16,
    pub y0: u16,
    pub x1: u16,
    pub y1: u16,
}

impl Rect {
    pub fn new(x0: u16, y0: u16, x1: u16, y1: u16) -> Self {
        Rect { x0, y0, x1, y1 }
    }

    /// Rectangle anchored at the origin
    pub fn from_size(width: u16, height: u16) -> Self {
        Rect::new(0, 0, width, height)
    }

    pub fn width(&self) -> usize {
        self.x1.saturating_sub(self.x0) as usize
    }

    pub fn height(&self) -> usize {
        self.y1.saturating_sub(self.y0) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Number of payload bytes needed to fill this rectangle in RGB565
    pub fn payload_len(&self) -> usize {
        self.width() * self.height() * 2
    }
}

/// Full-frame RGB565 buffer, row-major, big-endian, no row padding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rgb565Image {
    width: u16,
    height: u16,
    pix: Vec<u8>,
}

impl Rgb565Image {
    /// Black image of the given size
    pub fn new(width: u16, height: u16) -> Self {
        Rgb565Image {
            width,
            height,
            pix: vec![0u8; width as usize * height as usize * 2],
        }
    }

    /// Encode an arbitrary raster frame into RGB565.
    ///
    /// Frames larger than 65535 pixels on a side are cropped to fit the
    /// 16-bit coordinates the device understands.
    pub fn from_frame(frame: &DynamicImage) -> Self {
        let rgb = frame.to_rgb8();
        let width = u16::try_from(rgb.width()).unwrap_or(u16::MAX);
        let height = u16::try_from(rgb.height()).unwrap_or(u16::MAX);
        let mut img = Rgb565Image::new(width, height);

        for (x, y, pixel) in rgb.enumerate_pixels() {
            let [r, g, b] = pixel.0;
            img.set_pixel(x, y, Rgb565::from_rgb(r, g, b));
        }

        img
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    pub fn bounds(&self) -> Rect {
        Rect::from_size(self.width, self.height)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.pix
    }

    fn offset(&self, x: u32, y: u32) -> Option<usize> {
        if x >= self.width as u32 || y >= self.height as u32 {
            return None;
        }
        Some((y as usize * self.width as usize + x as usize) * 2)
    }

    /// Read a pixel; out-of-bounds reads yield black
    pub fn pixel(&self, x: u32, y: u32) -> Rgb565 {
        match self.offset(x, y) {
            Some(i) => Rgb565(u16::from_be_bytes([self.pix[i], self.pix[i + 1]])),
            None => Rgb565::BLACK,
        }
    }

    /// Write a pixel; out-of-bounds writes are ignored
    pub fn set_pixel(&mut self, x: u32, y: u32, color: Rgb565) {
        if let Some(i) = self.offset(x, y) {
            self.pix[i..i + 2].copy_from_slice(&color.to_be_bytes());
        }
    }
}
