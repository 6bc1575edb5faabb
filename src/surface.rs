use crate::decoder::DecodedFrame;
use crate::session::{FrameSink, VideoGeometry};

/// Drawable target for decoded frames.
///
/// The canvas is resized before drawing whenever a frame arrives with new
/// display dimensions, so a rotation shows up on the very next draw.
#[derive(Debug, Default)]
pub struct Surface {
    canvas: Vec<u8>,
    geometry: Option<VideoGeometry>,
    frames_drawn: u64,
    resizes: u64,
    last_timestamp_us: Option<u64>,
}

impl Surface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn geometry(&self) -> Option<VideoGeometry> {
        self.geometry
    }

    pub fn frames_drawn(&self) -> u64 {
        self.frames_drawn
    }

    pub fn resizes(&self) -> u64 {
        self.resizes
    }

    pub fn last_timestamp_us(&self) -> Option<u64> {
        self.last_timestamp_us
    }

    pub fn canvas(&self) -> &[u8] {
        &self.canvas
    }

    fn resize(&mut self, geometry: VideoGeometry) {
        let len = geometry.width as usize * geometry.height as usize * 4;
        self.canvas.clear();
        self.canvas.resize(len, 0);
        self.geometry = Some(geometry);
        self.resizes += 1;
        tracing::debug!(width = geometry.width, height = geometry.height, "surface resized");
    }
}

impl FrameSink for Surface {
    fn on_frame(&mut self, frame: DecodedFrame) {
        let geometry = VideoGeometry {
            width: frame.display_width,
            height: frame.display_height,
        };
        if self.geometry != Some(geometry) {
            self.resize(geometry);
        }

        // Placeholder decoders emit no pixels; keep the canvas as is.
        if frame.pixels.len() == self.canvas.len() {
            self.canvas.copy_from_slice(&frame.pixels);
        }
        self.frames_drawn += 1;
        self.last_timestamp_us = Some(frame.timestamp_us);
    }
}
