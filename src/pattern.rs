use image::{DynamicImage, Rgb, RgbImage};

const BAR_WIDTH: u32 = 8;
const BAR_STEP: u32 = 4;

/// Stand-in frame source: a hue sweep with a white bar that moves every tick.
pub struct TestPattern {
    width: u32,
    height: u32,
    tick: u32,
}

impl TestPattern {
    pub fn new(width: u32, height: u32) -> Self {
        TestPattern {
            width,
            height,
            tick: 0,
        }
    }

    /// Render the next frame
    pub fn next_frame(&mut self) -> DynamicImage {
        let bar_x = if self.width == 0 {
            0
        } else {
            (self.tick.wrapping_mul(BAR_STEP)) % self.width
        };
        self.tick = self.tick.wrapping_add(1);

        let width = self.width;
        let height = self.height;
        let img = RgbImage::from_fn(width, height, |x, y| {
            if x >= bar_x && x < bar_x + BAR_WIDTH {
                return Rgb([255, 255, 255]);
            }
            let shade = if height == 0 { 255 } else { 255 - (y * 255 / height) as u8 };
            let [r, g, b] = hue(x * 1536 / width.max(1));
            Rgb([scale(r, shade), scale(g, shade), scale(b, shade)])
        });

        DynamicImage::ImageRgb8(img)
    }
}

/// Six-segment hue wheel, `pos` in 0..1536
fn hue(pos: u32) -> [u8; 3] {
    let step = (pos % 256) as u8;
    match pos / 256 {
        0 => [255, step, 0],
        1 => [255 - step, 255, 0],
        2 => [0, 255, step],
        3 => [0, 255 - step, 255],
        4 => [step, 0, 255],
        _ => [255, 0, 255 - step],
    }
}

fn scale(channel: u8, shade: u8) -> u8 {
    (channel as u16 * shade as u16 / 255) as u8
}
