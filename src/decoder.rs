//! Video decoder capability.
//!
//! The session only talks to [`VideoDecoder`], so the same state machine
//! drives a platform codec, the openh264 software fallback or the echo
//! decoder used in tests and dry runs.

mod echo;
#[cfg(feature = "openh264")]
mod openh264;

pub use echo::EchoDecoder;
#[cfg(feature = "openh264")]
pub use openh264::OpenH264Decoder;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DecoderError {
    #[error("unsupported codec: {0}")]
    UnsupportedCodec(String),

    #[error("decoder is not configured")]
    NotConfigured,

    #[error("decoder is closed")]
    Closed,

    #[error("configure failed: {0}")]
    Configure(String),

    #[error("decode failed: {0}")]
    Decode(String),
}

/// One-time decoder configuration derived from the stream's SPS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoderConfig {
    /// `avc1.PPCCLL` codec identifier.
    pub codec: String,
    /// Ask the decoder to output frames as soon as possible.
    pub low_latency: bool,
}

impl DecoderConfig {
    /// Stream config: low latency, strictly increasing presentation order.
    pub fn low_latency(codec: String) -> Self {
        Self {
            codec,
            low_latency: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    Key,
    Delta,
}

impl ChunkKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChunkKind::Key => "key",
            ChunkKind::Delta => "delta",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedChunk {
    pub kind: ChunkKind,
    /// Microseconds since the first submitted chunk of the session.
    pub timestamp_us: u64,
    pub data: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    pub timestamp_us: u64,
    pub display_width: u32,
    pub display_height: u32,
    /// RGBA8, `display_width * display_height * 4` bytes when present.
    pub pixels: Bytes,
}

pub trait VideoDecoder {
    fn configure(&mut self, config: &DecoderConfig) -> Result<(), DecoderError>;

    /// Enqueues one chunk. Output arrives through [`VideoDecoder::poll_output`].
    fn decode(&mut self, chunk: EncodedChunk) -> Result<(), DecoderError>;

    /// Chunks accepted but not yet turned into output.
    fn queue_depth(&self) -> usize;

    /// Next decoded frame or asynchronous decode failure, if any.
    fn poll_output(&mut self) -> Option<Result<DecodedFrame, DecoderError>>;

    fn close(&mut self);

    fn name(&self) -> &'static str;
}

impl<D: VideoDecoder + ?Sized> VideoDecoder for Box<D> {
    fn configure(&mut self, config: &DecoderConfig) -> Result<(), DecoderError> {
        (**self).configure(config)
    }

    fn decode(&mut self, chunk: EncodedChunk) -> Result<(), DecoderError> {
        (**self).decode(chunk)
    }

    fn queue_depth(&self) -> usize {
        (**self).queue_depth()
    }

    fn poll_output(&mut self) -> Option<Result<DecodedFrame, DecoderError>> {
        (**self).poll_output()
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum DecoderBackend {
    /// Emits blank frames with the stream's timestamps.
    #[default]
    Echo,
    /// Software decoding through Cisco's openh264.
    Openh264,
}

/// Builds a fresh decoder for the chosen backend.
pub fn new_decoder(backend: DecoderBackend) -> Result<Box<dyn VideoDecoder>, DecoderError> {
    match backend {
        DecoderBackend::Echo => Ok(Box::new(EchoDecoder::new())),
        #[cfg(feature = "openh264")]
        DecoderBackend::Openh264 => Ok(Box::new(OpenH264Decoder::new())),
        #[cfg(not(feature = "openh264"))]
        DecoderBackend::Openh264 => Err(DecoderError::UnsupportedCodec(
            "openh264 backend not compiled in".to_string(),
        )),
    }
}
