use std::collections::VecDeque;

use bytes::Bytes;
use openh264::decoder::Decoder;
use openh264::formats::YUVSource;

use super::{DecodedFrame, DecoderConfig, DecoderError, EncodedChunk, VideoDecoder};

/// Software fallback on top of openh264.
///
/// openh264 decodes synchronously, so frames are ready as soon as `decode`
/// returns and the queue never builds up.
pub struct OpenH264Decoder {
    decoder: Option<Decoder>,
    closed: bool,
    output: VecDeque<Result<DecodedFrame, DecoderError>>,
}

impl Default for OpenH264Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenH264Decoder {
    pub fn new() -> Self {
        Self {
            decoder: None,
            closed: false,
            output: VecDeque::new(),
        }
    }
}

impl VideoDecoder for OpenH264Decoder {
    fn configure(&mut self, config: &DecoderConfig) -> Result<(), DecoderError> {
        if self.closed {
            return Err(DecoderError::Closed);
        }
        if !config.codec.starts_with("avc1.") {
            return Err(DecoderError::UnsupportedCodec(config.codec.clone()));
        }
        let decoder =
            Decoder::new().map_err(|e| DecoderError::Configure(format!("openh264: {e}")))?;
        self.decoder = Some(decoder);
        Ok(())
    }

    fn decode(&mut self, chunk: EncodedChunk) -> Result<(), DecoderError> {
        if self.closed {
            return Err(DecoderError::Closed);
        }
        let decoder = self.decoder.as_mut().ok_or(DecoderError::NotConfigured)?;

        match decoder.decode(&chunk.data) {
            Ok(Some(yuv)) => {
                let (width, height) = yuv.dimensions();
                let mut rgba = vec![0u8; width * height * 4];
                yuv.write_rgba8(&mut rgba);
                self.output.push_back(Ok(DecodedFrame {
                    timestamp_us: chunk.timestamp_us,
                    display_width: width as u32,
                    display_height: height as u32,
                    pixels: Bytes::from(rgba),
                }));
                Ok(())
            }
            // Not enough data for a picture yet.
            Ok(None) => Ok(()),
            Err(e) => Err(DecoderError::Decode(format!("openh264: {e}"))),
        }
    }

    fn queue_depth(&self) -> usize {
        0
    }

    fn poll_output(&mut self) -> Option<Result<DecodedFrame, DecoderError>> {
        self.output.pop_front()
    }

    fn close(&mut self) {
        self.closed = true;
        self.decoder = None;
        self.output.clear();
    }

    fn name(&self) -> &'static str {
        "openh264"
    }
}
