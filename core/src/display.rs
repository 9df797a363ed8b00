//! Display enumeration and window geometry

/// One monitor as seen at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayInfo {
    pub name: String,
    /// Physical pixels
    pub size: (u32, u32),
    /// Top-left corner in desktop coordinates
    pub position: (i32, i32),
    pub refresh_hz: Option<u32>,
    pub scale_factor: f64,
}

impl DisplayInfo {
    /// Stand-in display for headless runs.
    pub fn headless(width: u32, height: u32) -> Self {
        Self {
            name: "headless".to_string(),
            size: (width, height),
            position: (0, 0),
            refresh_hz: Some(60),
            scale_factor: 1.0,
        }
    }
}

/// Window position and inner size, in physical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WindowGeometry {
    pub position: (i32, i32),
    pub size: (u32, u32),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::sim::Engine;

    #[test]
    fn test_engine_keeps_startup_display_snapshot() {
        let displays = vec![
            DisplayInfo::headless(320, 240),
            DisplayInfo {
                name: "side".to_string(),
                size: (1920, 1080),
                position: (320, 0),
                refresh_hz: None,
                scale_factor: 1.5,
            },
        ];
        let engine = Engine::new(&RuntimeConfig::default(), displays.clone());
        assert_eq!(engine.displays(), displays.as_slice());
    }

    #[test]
    fn test_headless_display_is_at_origin() {
        let display = DisplayInfo::headless(64, 48);
        assert_eq!(display.size, (64, 48));
        assert_eq!(display.position, (0, 0));
        assert_eq!(display.refresh_hz, Some(60));
    }
}
