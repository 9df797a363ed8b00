//! Software compositor: palette lookup, overlays, CRT pass, cursor
//!
//! Turns the indexed screen snapshot of a [`SimHalf`] into a true-color
//! [`Image`] the platform can upload as-is. Pixels are `0xAARRGGBB` with
//! opaque alpha, which is `Bgra8` byte order on little-endian targets.

use glam::Vec2;

use crate::frame::{MousePointer, PALETTE_SIZE, ProfileBar, SimHalf, WindowRequests};

/// Black frame around the picture while the CRT pass is on
pub const CRT_BORDER: u32 = 8;

const OPAQUE: u32 = 0xFF00_0000;

/// Profiling bar geometry, in screen pixels
const BAR_HEIGHT: u32 = 2;
const BAR_GAP: u32 = 1;

/// Composited true-color picture.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Image {
    pub width: u32,
    pub height: u32,
    /// `0xAARRGGBB`, row-major
    pub pixels: Vec<u32>,
}

impl Image {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![OPAQUE; (width * height) as usize],
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<u32> {
        (x < self.width && y < self.height).then(|| self.pixels[(y * self.width + x) as usize])
    }

    /// Raw bytes for texture upload.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.pixels)
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.pixels.clear();
        self.pixels.resize((width * height) as usize, OPAQUE);
    }
}

/// Keeps the last composited image and the display options it was made with.
#[derive(Debug, Default)]
pub struct Compositor {
    crt: bool,
    pointer: MousePointer,
    /// Pointer position in screen pixels
    cursor: Vec2,
    image: Image,
}

impl Compositor {
    pub fn new(crt: bool) -> Self {
        Self {
            crt,
            ..Self::default()
        }
    }

    pub fn crt(&self) -> bool {
        self.crt
    }

    pub fn pointer(&self) -> &MousePointer {
        &self.pointer
    }

    /// Border the CRT pass adds on each side.
    pub fn border(&self) -> u32 {
        if self.crt { CRT_BORDER } else { 0 }
    }

    /// Size of the composited image for a screen of `screen` pixels.
    pub fn image_size(&self, screen: (u32, u32)) -> (u32, u32) {
        let border = self.border() * 2;
        (screen.0 + border, screen.1 + border)
    }

    /// Pick up display options from window requests.
    pub fn apply(&mut self, requests: &WindowRequests) {
        if let Some(crt) = requests.crt {
            self.crt = crt;
        }
        if let Some(pointer) = &requests.pointer {
            self.pointer = pointer.clone();
        }
    }

    pub fn set_cursor(&mut self, position: Vec2) {
        self.cursor = position;
    }

    /// Last composited image.
    pub fn image(&self) -> &Image {
        &self.image
    }

    pub fn composite(&mut self, half: &SimHalf) -> &Image {
        let (width, height) = self.image_size((half.width, half.height));
        self.image.resize(width, height);

        self.lookup_palette(half);
        self.draw_profile(half.width, &half.profile);
        if self.crt {
            self.scanlines();
        }
        if let MousePointer::Custom(cursor) = &self.pointer {
            let border = self.border() as i32;
            let x = self.cursor.x.floor() as i32 + border - cursor.hotspot.0 as i32;
            let y = self.cursor.y.floor() as i32 + border - cursor.hotspot.1 as i32;
            blend_sprite(
                &mut self.image,
                x,
                y,
                cursor.width,
                cursor.height,
                &cursor.pixels,
            );
        }
        &self.image
    }

    fn lookup_palette(&mut self, half: &SimHalf) {
        let border = self.border();
        let expected = (half.width * half.height) as usize;
        if half.screen.len() < expected {
            tracing::warn!(
                "Screen snapshot has {} pixels, expected {}",
                half.screen.len(),
                expected
            );
            return;
        }

        let mut palette: &[u32; PALETTE_SIZE] = &*half.palette;
        let mut splits = half.splits.iter().peekable();
        for y in 0..half.height {
            while let Some(split) = splits.next_if(|s| s.line <= y) {
                palette = &*split.palette;
            }
            let src = &half.screen[(y * half.width) as usize..((y + 1) * half.width) as usize];
            let row = ((y + border) * self.image.width + border) as usize;
            let dst = &mut self.image.pixels[row..row + half.width as usize];
            for (out, &index) in dst.iter_mut().zip(src) {
                *out = OPAQUE | palette[index as usize];
            }
        }
    }

    fn draw_profile(&mut self, screen_width: u32, bars: &[ProfileBar]) {
        let border = self.border();
        for (i, bar) in bars.iter().enumerate() {
            let top = border + BAR_GAP + i as u32 * (BAR_HEIGHT + BAR_GAP);
            if top + BAR_HEIGHT > self.image.height {
                break;
            }
            let length = (bar.fraction.clamp(0.0, 1.0) * screen_width as f32) as u32;
            for y in top..top + BAR_HEIGHT {
                let row = (y * self.image.width + border) as usize;
                self.image.pixels[row..row + length as usize].fill(OPAQUE | bar.color);
            }
        }
    }

    /// Darken every other line to three quarters.
    fn scanlines(&mut self) {
        let width = self.image.width as usize;
        for row in self.image.pixels.chunks_mut(width).skip(1).step_by(2) {
            for pixel in row {
                *pixel = OPAQUE | scale_rgb(*pixel, 3, 4);
            }
        }
    }
}

fn scale_rgb(pixel: u32, num: u32, den: u32) -> u32 {
    let r = ((pixel >> 16) & 0xFF) * num / den;
    let g = ((pixel >> 8) & 0xFF) * num / den;
    let b = (pixel & 0xFF) * num / den;
    (r << 16) | (g << 8) | b
}

/// Alpha-blend an `0xAARRGGBB` sprite onto the image, clipped.
fn blend_sprite(image: &mut Image, x: i32, y: i32, width: u32, height: u32, pixels: &[u32]) {
    for sy in 0..height {
        let dy = y + sy as i32;
        if dy < 0 || dy >= image.height as i32 {
            continue;
        }
        for sx in 0..width {
            let dx = x + sx as i32;
            if dx < 0 || dx >= image.width as i32 {
                continue;
            }
            let Some(&src) = pixels.get((sy * width + sx) as usize) else {
                return;
            };
            let dst = &mut image.pixels[(dy as u32 * image.width + dx as u32) as usize];
            *dst = blend(src, *dst);
        }
    }
}

fn blend(src: u32, dst: u32) -> u32 {
    let alpha = src >> 24;
    match alpha {
        0 => dst,
        255 => src | OPAQUE,
        _ => {
            let mix = |shift: u32| {
                let s = (src >> shift) & 0xFF;
                let d = (dst >> shift) & 0xFF;
                ((s * alpha + d * (255 - alpha) + 127) / 255) << shift
            };
            OPAQUE | mix(16) | mix(8) | mix(0)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::alloc::AllocContext;
    use crate::frame::{CursorImage, FrameBuffer, PaletteSplit};

    fn half(width: u32, height: u32, fill: u8) -> SimHalf {
        let mut frame = FrameBuffer::new(&AllocContext::new());
        frame.sim.width = width;
        frame.sim.height = height;
        frame.sim.screen.resize((width * height) as usize, fill);
        frame.sim.palette[1] = 0x0011_2233;
        frame.sim.palette[2] = 0x0080_8080;
        frame.sim
    }

    #[test]
    fn test_palette_lookup() {
        let mut compositor = Compositor::new(false);
        let image = compositor.composite(&half(4, 2, 1));
        assert_eq!((image.width, image.height), (4, 2));
        assert!(image.pixels.iter().all(|&p| p == 0xFF11_2233));
    }

    #[test]
    fn test_split_palette_applies_from_its_line() {
        let mut half = half(2, 4, 1);
        let mut palette = Box::new([0; PALETTE_SIZE]);
        palette[1] = 0x00AB_CDEF;
        half.splits.push(PaletteSplit { line: 2, palette });

        let mut compositor = Compositor::new(false);
        let image = compositor.composite(&half);
        assert_eq!(image.pixel(0, 1), Some(0xFF11_2233));
        assert_eq!(image.pixel(0, 2), Some(0xFFAB_CDEF));
        assert_eq!(image.pixel(1, 3), Some(0xFFAB_CDEF));
    }

    #[test]
    fn test_profile_bar_length_follows_fraction() {
        let mut half = half(10, 10, 0);
        half.profile.push(ProfileBar {
            fraction: 0.5,
            color: 0x00FF_0000,
        });
        half.profile.push(ProfileBar {
            fraction: 3.0,
            color: 0x0000_FF00,
        });
        let mut compositor = Compositor::new(false);
        let image = compositor.composite(&half);
        assert_eq!(image.pixel(4, 1), Some(0xFFFF_0000));
        assert_eq!(image.pixel(5, 1), Some(OPAQUE));
        // Clamped to the full width
        assert_eq!(image.pixel(9, 4), Some(0xFF00_FF00));
    }

    #[test]
    fn test_crt_adds_border_and_scanlines() {
        let mut compositor = Compositor::new(true);
        let image = compositor.composite(&half(4, 4, 2));
        let b = CRT_BORDER;
        assert_eq!((image.width, image.height), (4 + 2 * b, 4 + 2 * b));
        assert_eq!(image.pixel(0, 0), Some(OPAQUE));

        let even = image.pixel(b, b).unwrap();
        let odd = image.pixel(b, b + 1).unwrap();
        assert_eq!(even, 0xFF80_8080);
        assert_eq!(odd, 0xFF60_6060);
    }

    #[test]
    fn test_crt_toggle_from_requests() {
        let mut compositor = Compositor::new(false);
        compositor.apply(&WindowRequests {
            crt: Some(true),
            ..WindowRequests::default()
        });
        assert!(compositor.crt());
        assert_eq!(compositor.image_size((320, 200)), (336, 216));
    }

    #[test]
    fn test_software_cursor_alpha_blends() {
        let cursor = CursorImage {
            width: 2,
            height: 1,
            hotspot: (0, 0),
            pixels: vec![0xFFFF_FFFF, 0x8000_0000],
        };
        let mut compositor = Compositor::new(false);
        compositor.apply(&WindowRequests {
            pointer: Some(MousePointer::Custom(Arc::new(cursor))),
            ..WindowRequests::default()
        });
        compositor.set_cursor(Vec2::new(1.0, 1.0));
        let image = compositor.composite(&half(4, 4, 2));

        assert_eq!(image.pixel(1, 1), Some(0xFFFF_FFFF));
        // Half-transparent black over 0x80 grey
        assert_eq!(image.pixel(2, 1), Some(0xFF40_4040));
        assert_eq!(image.pixel(3, 1), Some(0xFF80_8080));
    }

    #[test]
    fn test_cursor_clips_at_edges() {
        let cursor = CursorImage {
            width: 4,
            height: 4,
            hotspot: (2, 2),
            pixels: vec![0xFF00_00FF; 16],
        };
        let mut compositor = Compositor::new(false);
        compositor.apply(&WindowRequests {
            pointer: Some(MousePointer::Custom(Arc::new(cursor))),
            ..WindowRequests::default()
        });
        compositor.set_cursor(Vec2::ZERO);
        let image = compositor.composite(&half(4, 4, 2));
        assert_eq!(image.pixel(0, 0), Some(0xFF00_00FF));
        assert_eq!(image.pixel(1, 1), Some(0xFF00_00FF));
        assert_eq!(image.pixel(2, 2), Some(0xFF80_8080));
    }
}
