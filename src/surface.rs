use byteorder::{ByteOrder, LittleEndian};
use embedded_graphics::{
    pixelcolor::{Rgb888, RgbColor},
    prelude::*,
    primitives::Rectangle,
};
use image::RgbaImage;
use std::{convert::Infallible, fmt};

/// Decoded image data that can be blitted onto a [`Surface`].
pub type Sprite = RgbaImage;

/// Memory layout of a single pixel in a [`Surface`]. Multi-byte pixels are stored little endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Luma8,
    Rgb565,
    Rgb888,
    Xrgb8888,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DrawError {
    #[error("blit source {x},{y} {width}x{height} lies outside the {sprite_width}x{sprite_height} sprite")]
    SourceOutOfBounds {
        x: i32,
        y: i32,
        width: u32,
        height: u32,
        sprite_width: u32,
        sprite_height: u32,
    },
    #[error("{0} widget rendered before it was initialised")]
    NotInitialised(&'static str),
}

impl PixelFormat {
    pub fn from_bits_per_pixel(bits_per_pixel: u8) -> Option<PixelFormat> {
        match bits_per_pixel {
            8 => Some(PixelFormat::Luma8),
            16 => Some(PixelFormat::Rgb565),
            24 => Some(PixelFormat::Rgb888),
            32 => Some(PixelFormat::Xrgb8888),
            _ => None,
        }
    }

    pub fn bits_per_pixel(self) -> u8 {
        self.bytes_per_pixel() as u8 * 8
    }

    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Luma8 => 1,
            PixelFormat::Rgb565 => 2,
            PixelFormat::Rgb888 => 3,
            PixelFormat::Xrgb8888 => 4,
        }
    }

    fn encode(self, color: Rgb888, out: &mut [u8]) {
        let (r, g, b) = (u32::from(color.r()), u32::from(color.g()), u32::from(color.b()));
        match self {
            PixelFormat::Luma8 => out[0] = luma(color),
            PixelFormat::Rgb565 => {
                let raw = (r >> 3) << 11 | (g >> 2) << 5 | (b >> 3);
                LittleEndian::write_u16(out, raw as u16);
            }
            PixelFormat::Rgb888 => LittleEndian::write_u24(out, r << 16 | g << 8 | b),
            PixelFormat::Xrgb8888 => LittleEndian::write_u32(out, r << 16 | g << 8 | b),
        }
    }

    fn decode(self, bytes: &[u8]) -> Rgb888 {
        match self {
            PixelFormat::Luma8 => Rgb888::new(bytes[0], bytes[0], bytes[0]),
            PixelFormat::Rgb565 => {
                let raw = LittleEndian::read_u16(bytes);
                let (r5, g6, b5) = ((raw >> 11) as u8, ((raw >> 5) & 0x3f) as u8, (raw & 0x1f) as u8);
                Rgb888::new(r5 << 3 | r5 >> 2, g6 << 2 | g6 >> 4, b5 << 3 | b5 >> 2)
            }
            PixelFormat::Rgb888 => unpack(LittleEndian::read_u24(bytes)),
            PixelFormat::Xrgb8888 => unpack(LittleEndian::read_u32(bytes)),
        }
    }
}

fn unpack(v: u32) -> Rgb888 {
    Rgb888::new((v >> 16) as u8, (v >> 8) as u8, v as u8)
}

/// Perceived brightness of a color, 0..=255.
pub fn luma(color: Rgb888) -> u8 {
    let sum = 77 * u32::from(color.r()) + 150 * u32::from(color.g()) + 29 * u32::from(color.b());
    (sum >> 8) as u8
}

/// The single framebuffer everything is drawn onto. Only the render thread ever holds one.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Surface {
    width: u32,
    height: u32,
    format: PixelFormat,
    pixels: Vec<u8>,
}

impl Surface {
    /// Creates a black surface. Callers are expected to have validated the geometry.
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Surface {
        let len = width as usize * height as usize * format.bytes_per_pixel();
        Surface {
            width,
            height,
            format,
            pixels: vec![0; len],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Raw pixel bytes, row-major.
    pub fn as_bytes(&self) -> &[u8] {
        &self.pixels
    }

    fn offset(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 || x as u32 >= self.width || y as u32 >= self.height {
            return None;
        }
        Some((y as usize * self.width as usize + x as usize) * self.format.bytes_per_pixel())
    }

    pub fn pixel(&self, x: i32, y: i32) -> Option<Rgb888> {
        let idx = self.offset(x, y)?;
        Some(self.format.decode(&self.pixels[idx..]))
    }

    /// Writes a single pixel, silently clipping anything off-surface.
    pub fn set_pixel(&mut self, x: i32, y: i32, color: Rgb888) {
        if let Some(idx) = self.offset(x, y) {
            let bpp = self.format.bytes_per_pixel();
            self.format.encode(color, &mut self.pixels[idx..idx + bpp]);
        }
    }

    /// Copies `src` (a region of `sprite`) to `dest`. Fully transparent sprite pixels are skipped
    /// and the destination is clipped to the surface; the source region must lie within the sprite.
    pub fn blit(&mut self, dest: Point, sprite: &Sprite, src: Rectangle) -> Result<(), DrawError> {
        let sprite_box = Rectangle::new(Point::zero(), Size::new(sprite.width(), sprite.height()));
        let inside = src.size == Size::zero()
            || (sprite_box.contains(src.top_left)
                && src.bottom_right().map_or(false, |p| sprite_box.contains(p)));
        if !inside {
            return Err(DrawError::SourceOutOfBounds {
                x: src.top_left.x,
                y: src.top_left.y,
                width: src.size.width,
                height: src.size.height,
                sprite_width: sprite.width(),
                sprite_height: sprite.height(),
            });
        }

        for point in src.points() {
            let px = sprite.get_pixel(point.x as u32, point.y as u32);
            let [r, g, b, a] = px.0;
            if a == 0 {
                continue;
            }
            let target = dest + (point - src.top_left);
            self.set_pixel(target.x, target.y, Rgb888::new(r, g, b));
        }
        Ok(())
    }
}

impl OriginDimensions for Surface {
    fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}

impl DrawTarget for Surface {
    type Color = Rgb888;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            self.set_pixel(point.x, point.y, color);
        }
        Ok(())
    }

    fn fill_solid(&mut self, area: &Rectangle, color: Self::Color) -> Result<(), Self::Error> {
        let area = area.intersection(&self.bounding_box());
        let bpp = self.format.bytes_per_pixel();
        let mut encoded = [0u8; 4];
        self.format.encode(color, &mut encoded[..bpp]);
        for point in area.points() {
            if let Some(idx) = self.offset(point.x, point.y) {
                self.pixels[idx..idx + bpp].copy_from_slice(&encoded[..bpp]);
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Surface")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}

/// Coarse brightness dump, one character per pixel. Handy for eyeballing frames in logs and tests.
impl fmt::Display for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const RAMP: [char; 4] = [' ', '.', 'o', '#'];

        write!(f, ".")?;
        for _ in 0..self.width {
            write!(f, "-")?;
        }
        writeln!(f, ".")?;

        for y in 0..self.height as i32 {
            write!(f, "|")?;
            for x in 0..self.width as i32 {
                let level = self.pixel(x, y).map_or(0, luma) as usize;
                write!(f, "{}", RAMP[level * RAMP.len() / 256])?;
            }
            writeln!(f, "|")?;
        }

        write!(f, ".")?;
        for _ in 0..self.width {
            write!(f, "-")?;
        }
        write!(f, ".")
    }
}
