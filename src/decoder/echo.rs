use std::collections::VecDeque;

use bytes::Bytes;

use super::{DecodedFrame, DecoderConfig, DecoderError, EncodedChunk, VideoDecoder};

const DEFAULT_WIDTH: u32 = 1080;
const DEFAULT_HEIGHT: u32 = 2400;

/// Decoder that turns every chunk into a blank frame carrying the chunk's
/// timestamp.
///
/// It keeps a log of what it was asked to do, can hold output back to build
/// up queue depth and can be told to fail, which makes it the test double
/// for the session state machine.
#[derive(Debug)]
pub struct EchoDecoder {
    config: Option<DecoderConfig>,
    closed: bool,
    width: u32,
    height: u32,
    hold_output: bool,
    pending: VecDeque<EncodedChunk>,
    fail_next_configure: Option<DecoderError>,
    fail_next_decode: Option<DecoderError>,
    fail_next_output: Option<DecoderError>,
    configure_calls: Vec<DecoderConfig>,
    decoded: Vec<EncodedChunk>,
}

impl Default for EchoDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl EchoDecoder {
    pub fn new() -> Self {
        Self::with_dimensions(DEFAULT_WIDTH, DEFAULT_HEIGHT)
    }

    pub fn with_dimensions(width: u32, height: u32) -> Self {
        Self {
            config: None,
            closed: false,
            width,
            height,
            hold_output: false,
            pending: VecDeque::new(),
            fail_next_configure: None,
            fail_next_decode: None,
            fail_next_output: None,
            configure_calls: Vec::new(),
            decoded: Vec::new(),
        }
    }

    /// While held, accepted chunks stay queued and count towards queue depth.
    pub fn set_hold_output(&mut self, hold: bool) {
        self.hold_output = hold;
    }

    /// Frames emitted from now on report these dimensions.
    pub fn set_dimensions(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    pub fn fail_next_configure(&mut self, err: DecoderError) {
        self.fail_next_configure = Some(err);
    }

    pub fn fail_next_decode(&mut self, err: DecoderError) {
        self.fail_next_decode = Some(err);
    }

    /// Makes the next polled output an error, like a decoder reporting a
    /// failure after accepting the chunk.
    pub fn fail_next_output(&mut self, err: DecoderError) {
        self.fail_next_output = Some(err);
    }

    pub fn configure_calls(&self) -> &[DecoderConfig] {
        &self.configure_calls
    }

    /// Every chunk accepted by `decode`, in order.
    pub fn decoded(&self) -> &[EncodedChunk] {
        &self.decoded
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl VideoDecoder for EchoDecoder {
    fn configure(&mut self, config: &DecoderConfig) -> Result<(), DecoderError> {
        if self.closed {
            return Err(DecoderError::Closed);
        }
        self.configure_calls.push(config.clone());
        if let Some(err) = self.fail_next_configure.take() {
            return Err(err);
        }
        if !config.codec.starts_with("avc1.") {
            return Err(DecoderError::UnsupportedCodec(config.codec.clone()));
        }
        self.config = Some(config.clone());
        Ok(())
    }

    fn decode(&mut self, chunk: EncodedChunk) -> Result<(), DecoderError> {
        if self.closed {
            return Err(DecoderError::Closed);
        }
        if self.config.is_none() {
            return Err(DecoderError::NotConfigured);
        }
        if let Some(err) = self.fail_next_decode.take() {
            return Err(err);
        }
        self.decoded.push(chunk.clone());
        self.pending.push_back(chunk);
        Ok(())
    }

    fn queue_depth(&self) -> usize {
        self.pending.len()
    }

    fn poll_output(&mut self) -> Option<Result<DecodedFrame, DecoderError>> {
        if self.hold_output || self.closed {
            return None;
        }
        let chunk = self.pending.pop_front()?;
        if let Some(err) = self.fail_next_output.take() {
            return Some(Err(err));
        }
        Some(Ok(DecodedFrame {
            timestamp_us: chunk.timestamp_us,
            display_width: self.width,
            display_height: self.height,
            pixels: Bytes::new(),
        }))
    }

    fn close(&mut self) {
        self.closed = true;
        self.pending.clear();
    }

    fn name(&self) -> &'static str {
        "echo"
    }
}
