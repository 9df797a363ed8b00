//! Indexed-color screen owned by the simulation
//!
//! Game logic draws palette indices into the [`Screen`]; at the end of each
//! tick the simulation copies pixels, palette and palette splits into its
//! frame buffer half. Rasterization beyond single pixels and rectangles is
//! left to external drawing helpers operating on [`Screen::pixels_mut`].

use crate::frame::{PALETTE_SIZE, PaletteSplit};

/// Default 16-color palette loaded into entries 0..16.
const DEFAULT_PALETTE: [u32; 16] = [
    0x000000, 0x1D2B53, 0x7E2553, 0x008751, 0xAB5236, 0x5F574F, 0xC2C3C7, 0xFFF1E8,
    0xFF004D, 0xFFA300, 0xFFEC27, 0x00E436, 0x29ADFF, 0x83769C, 0xFF77A8, 0xFFCCAA,
];

#[derive(Debug, Clone)]
pub struct Screen {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    palette: Box<[u32; PALETTE_SIZE]>,
    splits: Vec<PaletteSplit>,
}

impl Screen {
    pub fn new(width: u32, height: u32) -> Self {
        let mut palette = Box::new([0u32; PALETTE_SIZE]);
        palette[..DEFAULT_PALETTE.len()].copy_from_slice(&DEFAULT_PALETTE);
        Self {
            width,
            height,
            pixels: vec![0; (width * height) as usize],
            palette,
            splits: Vec::new(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Change resolution; contents are cleared.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.pixels.clear();
        self.pixels.resize((width * height) as usize, 0);
        self.splits.clear();
    }

    pub fn clear(&mut self, color: u8) {
        self.pixels.fill(color);
    }

    pub fn pixel(&self, x: i32, y: i32) -> Option<u8> {
        self.offset(x, y).map(|i| self.pixels[i])
    }

    /// Set one pixel; out-of-bounds writes are ignored.
    pub fn set_pixel(&mut self, x: i32, y: i32, color: u8) {
        if let Some(i) = self.offset(x, y) {
            self.pixels[i] = color;
        }
    }

    /// Fill a rectangle, clipped to the screen.
    pub fn fill_rect(&mut self, x: i32, y: i32, w: i32, h: i32, color: u8) {
        let x0 = x.max(0);
        let y0 = y.max(0);
        let x1 = (x + w).min(self.width as i32);
        let y1 = (y + h).min(self.height as i32);
        if x0 >= x1 || y0 >= y1 {
            return;
        }
        for row in y0..y1 {
            let start = (row as u32 * self.width) as usize;
            self.pixels[start + x0 as usize..start + x1 as usize].fill(color);
        }
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    pub fn palette(&self) -> &[u32; PALETTE_SIZE] {
        &self.palette
    }

    pub fn set_palette(&mut self, index: u8, rgb: u32) {
        self.palette[index as usize] = rgb & 0x00FF_FFFF;
    }

    /// Use a different palette from scanline `line` downwards.
    pub fn add_split(&mut self, line: u32, palette: [u32; PALETTE_SIZE]) {
        self.splits.push(PaletteSplit {
            line,
            palette: Box::new(palette),
        });
        self.splits.sort_by_key(|s| s.line);
    }

    pub fn clear_splits(&mut self) {
        self.splits.clear();
    }

    pub fn splits(&self) -> &[PaletteSplit] {
        &self.splits
    }

    fn offset(&self, x: i32, y: i32) -> Option<usize> {
        (x >= 0 && y >= 0 && (x as u32) < self.width && (y as u32) < self.height)
            .then(|| (y as u32 * self.width + x as u32) as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_rect_clips() {
        let mut screen = Screen::new(8, 4);
        screen.fill_rect(-2, 2, 4, 10, 3);
        assert_eq!(screen.pixel(0, 2), Some(3));
        assert_eq!(screen.pixel(1, 3), Some(3));
        assert_eq!(screen.pixel(2, 2), Some(0));
        assert_eq!(screen.pixel(0, 1), Some(0));
        assert_eq!(screen.pixel(9, 9), None);
    }

    #[test]
    fn test_splits_sorted_by_line() {
        let mut screen = Screen::new(4, 4);
        screen.add_split(3, [1; PALETTE_SIZE]);
        screen.add_split(1, [2; PALETTE_SIZE]);
        let lines: Vec<_> = screen.splits().iter().map(|s| s.line).collect();
        assert_eq!(lines, vec![1, 3]);
    }

    #[test]
    fn test_palette_masks_alpha() {
        let mut screen = Screen::new(1, 1);
        screen.set_palette(5, 0xFF12_3456);
        assert_eq!(screen.palette()[5], 0x12_3456);
    }
}
