//! Viewport placement of the composited image inside the window
//!
//! Shared by the GPU blit (where to draw) and the input translator (where a
//! window-space pointer lands in the image).

use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Scaling mode for the composited image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ScaleMode {
    /// Stretch to fill window (may distort aspect ratio)
    Stretch,
    /// Maintain aspect ratio, scale to fill as much as possible (adds letterbox bars)
    Fit,
    /// Integer scaling for pixel-perfect rendering (adds black bars, may not fill screen)
    #[default]
    PixelPerfect,
}

/// Rectangle in window pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    /// Place an `image` sized picture inside a `window` sized surface.
    pub fn compute(mode: ScaleMode, image: (u32, u32), window: (u32, u32)) -> Self {
        let render_width = image.0.max(1) as f32;
        let render_height = image.1.max(1) as f32;
        let window_width = window.0.max(1) as f32;
        let window_height = window.1.max(1) as f32;

        let scale = match mode {
            ScaleMode::Stretch => {
                return Self {
                    x: 0.0,
                    y: 0.0,
                    width: window_width,
                    height: window_height,
                };
            }
            ScaleMode::Fit => (window_width / render_width).min(window_height / render_height),
            ScaleMode::PixelPerfect => {
                // Largest integer scale that fits both dimensions, at least 1x
                let scale_x = (window_width / render_width).floor();
                let scale_y = (window_height / render_height).floor();
                scale_x.min(scale_y).max(1.0)
            }
        };

        let width = render_width * scale;
        let height = render_height * scale;
        Self {
            x: (window_width - width) / 2.0,
            y: (window_height - height) / 2.0,
            width,
            height,
        }
    }

    /// Map a window-space point to image pixels (may fall outside the image).
    pub fn window_to_image(&self, point: Vec2, image: (u32, u32)) -> Vec2 {
        let local = point - Vec2::new(self.x, self.y);
        let scale = Vec2::new(
            image.0 as f32 / self.width.max(1.0),
            image.1 as f32 / self.height.max(1.0),
        );
        local * scale
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_perfect_centers_integer_scale() {
        let vp = Viewport::compute(ScaleMode::PixelPerfect, (320, 200), (1000, 700));
        assert_eq!(vp.width, 960.0);
        assert_eq!(vp.height, 600.0);
        assert_eq!(vp.x, 20.0);
        assert_eq!(vp.y, 50.0);
    }

    #[test]
    fn test_fit_letterboxes() {
        let vp = Viewport::compute(ScaleMode::Fit, (320, 200), (640, 600));
        assert_eq!(vp.width, 640.0);
        assert_eq!(vp.height, 400.0);
        assert_eq!(vp.y, 100.0);
    }

    #[test]
    fn test_stretch_fills_window() {
        let vp = Viewport::compute(ScaleMode::Stretch, (320, 200), (800, 800));
        assert_eq!((vp.x, vp.y, vp.width, vp.height), (0.0, 0.0, 800.0, 800.0));
    }

    #[test]
    fn test_window_to_image_inverts_placement() {
        let vp = Viewport::compute(ScaleMode::PixelPerfect, (320, 200), (1000, 700));
        let window_point = Vec2::new(20.0 + 3.0 * 100.0, 50.0 + 3.0 * 10.0);
        let p = vp.window_to_image(window_point, (320, 200));
        assert_eq!(p, Vec2::new(100.0, 10.0));
    }
}
