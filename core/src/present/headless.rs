//! Windowless platform for tests and `--headless` runs

use std::collections::VecDeque;

use crate::display::WindowGeometry;
use crate::frame::WindowRequests;
use crate::input::InputEvent;

use super::{Image, Platform, PlatformStatus};

/// Scripted input per poll, presents recorded in memory.
#[derive(Debug, Default)]
pub struct HeadlessPlatform {
    geometry: WindowGeometry,
    script: VecDeque<Vec<InputEvent>>,
    polls: u64,
    close_at: Option<u64>,
    applied: WindowRequests,
    presents: u64,
    last: Option<Image>,
    history: Option<Vec<Image>>,
}

impl HeadlessPlatform {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            geometry: WindowGeometry {
                position: (0, 0),
                size: (width, height),
            },
            ..Self::default()
        }
    }

    /// Keep a copy of every presented image.
    pub fn record_frames(mut self) -> Self {
        self.history = Some(Vec::new());
        self
    }

    /// Deliver `events` on a future poll, one batch per poll.
    pub fn push_input(&mut self, events: Vec<InputEvent>) {
        self.script.push_back(events);
    }

    /// Report a close request from poll number `poll` (1-based) onwards.
    pub fn close_at(&mut self, poll: u64) {
        self.close_at = Some(poll);
    }

    pub fn request_close(&mut self) {
        self.close_at = Some(self.polls);
    }

    pub fn polls(&self) -> u64 {
        self.polls
    }

    pub fn presents(&self) -> u64 {
        self.presents
    }

    pub fn last_image(&self) -> Option<&Image> {
        self.last.as_ref()
    }

    /// Every presented image, if recording was enabled.
    pub fn history(&self) -> &[Image] {
        self.history.as_deref().unwrap_or_default()
    }

    /// Requests applied so far, latest value per field.
    pub fn applied(&self) -> &WindowRequests {
        &self.applied
    }

    pub fn geometry(&self) -> WindowGeometry {
        self.geometry
    }
}

impl Platform for HeadlessPlatform {
    fn poll_events(&mut self, input: &mut Vec<InputEvent>) -> PlatformStatus {
        self.polls += 1;
        if let Some(events) = self.script.pop_front() {
            input.extend(events);
        }
        PlatformStatus {
            geometry: self.geometry,
            close_requested: self.close_at.is_some_and(|at| self.polls >= at),
        }
    }

    fn apply_requests(&mut self, requests: &WindowRequests) {
        if let Some(size) = requests.size {
            self.geometry.size = size;
        }
        if let Some(position) = requests.position {
            self.geometry.position = position;
        }
        self.applied.merge(requests.clone());
    }

    fn present(&mut self, image: &Image) {
        self.presents += 1;
        if let Some(history) = &mut self.history {
            history.push(image.clone());
        }
        match &mut self.last {
            Some(last) => last.clone_from(image),
            None => self.last = Some(image.clone()),
        }
    }
}
