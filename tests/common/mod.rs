#![allow(dead_code)]

use droidmirror::decoder::{DecoderError, EchoDecoder};

pub const SPS: &[u8] = &[0, 0, 0, 1, 0x67, 0x64, 0x00, 0x28, 0xAC, 0xD9, 0x40, 0x78];
pub const PPS: &[u8] = &[0, 0, 0, 1, 0x68, 0xEB, 0xE3, 0xCB, 0x22, 0xC0];
pub const IDR: &[u8] = &[0, 0, 0, 1, 0x65, 0x88, 0x84, 0x00, 0x33, 0xFF, 0x12];

/// Codec string the fixture SPS maps to.
pub const CODEC: &str = "avc1.640028";

/// SPS, PPS and an IDR slice in one packet, the way scrcpy sends a
/// keyframe.
pub fn keyframe() -> Vec<u8> {
    [SPS, PPS, IDR].concat()
}

/// A non-IDR slice with a 3-byte start code. `n` varies the payload.
pub fn delta(n: u8) -> Vec<u8> {
    vec![0, 0, 1, 0x41, 0x9A, n, 0x21, 0x07]
}

pub fn echo() -> Result<EchoDecoder, DecoderError> {
    Ok(EchoDecoder::new())
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
