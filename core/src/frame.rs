//! Frame buffer carried over the frame channel
//!
//! A [`FrameBuffer`] has two disjoint halves. The simulation writes
//! [`SimHalf`] (screen snapshot, palettes, overlays, window requests) and the
//! presentation loop writes [`PresentHalf`] (captured input, window geometry,
//! exit request). Whoever holds the buffer writes only its own half and reads
//! only the other.

use std::sync::Arc;

use crate::alloc::AllocContext;
use crate::display::WindowGeometry;
use crate::growable::GrowBuffer;
use crate::input::InputEvent;

/// Number of entries in a palette.
pub const PALETTE_SIZE: usize = 256;

/// Palette override starting at a given scanline.
#[derive(Debug, Clone, PartialEq)]
pub struct PaletteSplit {
    /// First scanline this palette applies to
    pub line: u32,
    /// `0x00RRGGBB` entries
    pub palette: Box<[u32; PALETTE_SIZE]>,
}

/// One horizontal CPU-usage bar in the profiling overlay.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProfileBar {
    /// Fraction of the tick budget, 0.0..=1.0 (clamped when drawn)
    pub fraction: f32,
    /// `0x00RRGGBB`
    pub color: u32,
}

/// RGBA cursor sprite for the software pointer.
#[derive(Debug, Clone, PartialEq)]
pub struct CursorImage {
    pub width: u32,
    pub height: u32,
    /// Pixel inside the sprite that sits under the pointer position
    pub hotspot: (u32, u32),
    /// `0xAARRGGBB`, row-major
    pub pixels: Vec<u32>,
}

/// How the mouse pointer is shown.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum MousePointer {
    /// Platform cursor
    #[default]
    System,
    /// No cursor at all
    Hidden,
    /// Software cursor composited over the frame
    Custom(Arc<CursorImage>),
}

/// Window changes requested by the simulation.
///
/// Each field is `None` when unchanged; the presentation loop applies what
/// is set and the simulation clears it once handed off.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WindowRequests {
    pub title: Option<String>,
    pub size: Option<(u32, u32)>,
    pub position: Option<(i32, i32)>,
    pub fullscreen: Option<bool>,
    pub crt: Option<bool>,
    pub pointer: Option<MousePointer>,
}

impl WindowRequests {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Fold newer requests over older ones.
    pub fn merge(&mut self, newer: WindowRequests) {
        let WindowRequests {
            title,
            size,
            position,
            fullscreen,
            crt,
            pointer,
        } = newer;
        self.title = title.or(self.title.take());
        self.size = size.or(self.size);
        self.position = position.or(self.position);
        self.fullscreen = fullscreen.or(self.fullscreen);
        self.crt = crt.or(self.crt);
        self.pointer = pointer.or(self.pointer.take());
    }
}

/// Simulation-written half.
#[derive(Debug, Clone)]
pub struct SimHalf {
    pub width: u32,
    pub height: u32,
    /// Palette indices, row-major
    pub screen: GrowBuffer<u8>,
    pub palette: Box<[u32; PALETTE_SIZE]>,
    pub splits: GrowBuffer<PaletteSplit>,
    pub profile: GrowBuffer<ProfileBar>,
    pub requests: WindowRequests,
    /// Simulation tick that produced this snapshot
    pub tick: u64,
    pub exit: bool,
}

/// Presentation-written half.
#[derive(Debug, Clone)]
pub struct PresentHalf {
    /// Input captured since the previous handoff, in arrival order
    pub input: GrowBuffer<InputEvent>,
    pub geometry: WindowGeometry,
    /// User asked to close the window
    pub exit_requested: bool,
    /// Presentation iteration that returned this buffer
    pub iteration: u64,
    /// Set on the buffer that acknowledges the simulation's exit frame
    pub exit_ack: bool,
}

/// Unit of the frame channel.
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    pub sim: SimHalf,
    pub present: PresentHalf,
}

impl FrameBuffer {
    pub fn new(ctx: &AllocContext) -> Self {
        Self {
            sim: SimHalf {
                width: 0,
                height: 0,
                screen: GrowBuffer::new("frame.screen", ctx),
                palette: Box::new([0; PALETTE_SIZE]),
                splits: GrowBuffer::new("frame.splits", ctx),
                profile: GrowBuffer::new("frame.profile", ctx),
                requests: WindowRequests::default(),
                tick: 0,
                exit: false,
            },
            present: PresentHalf {
                input: GrowBuffer::new("frame.input", ctx),
                geometry: WindowGeometry::default(),
                exit_requested: false,
                iteration: 0,
                exit_ack: false,
            },
        }
    }

    /// Allocate the channel's fixed pool.
    pub fn pool(size: usize, ctx: &AllocContext) -> Vec<Self> {
        (0..size).map(|_| Self::new(ctx)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requests_merge_keeps_latest() {
        let mut pending = WindowRequests {
            title: Some("old".into()),
            fullscreen: Some(true),
            ..Default::default()
        };
        pending.merge(WindowRequests {
            title: Some("new".into()),
            size: Some((640, 400)),
            ..Default::default()
        });
        assert_eq!(pending.title.as_deref(), Some("new"));
        assert_eq!(pending.size, Some((640, 400)));
        assert_eq!(pending.fullscreen, Some(true));
        assert!(!pending.is_empty());
        assert!(WindowRequests::default().is_empty());
    }
}
