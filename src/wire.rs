//! Messages exchanged between the host and the UI.
//!
//! Video bytes travel base64-encoded inside JSON, which serializes far
//! faster than a JSON array of numbers.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug)]
pub enum WireError {
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeSliceError),

    #[error("invalid message: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireMessage {
    Video {
        data: String,
    },
    Connected {
        device: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        width: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        height: Option<u32>,
    },
    Disconnected {
        reason: String,
    },
    Log {
        message: String,
        level: LogLevel,
    },
    Stats {
        dropped_frames: u64,
        decoded_frames: u64,
    },
}

impl WireMessage {
    pub fn video(bytes: &[u8]) -> Self {
        WireMessage::Video {
            data: STANDARD.encode(bytes),
        }
    }

    pub fn log(level: LogLevel, message: impl Into<String>) -> Self {
        WireMessage::Log {
            message: message.into(),
            level,
        }
    }

    pub fn to_json(&self) -> Result<String, WireError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(s: &str) -> Result<Self, WireError> {
        Ok(serde_json::from_str(s)?)
    }
}

/// Decodes `encoded` into the front of `out`, returning the decoded length.
/// `out` must hold at least [`decoded_len_estimate`] bytes.
pub fn decode_into(encoded: &str, out: &mut [u8]) -> Result<usize, WireError> {
    Ok(STANDARD.decode_slice(encoded.as_bytes(), out)?)
}

/// Upper bound on the decoded size of `encoded_len` base64 characters.
pub fn decoded_len_estimate(encoded_len: usize) -> usize {
    base64::decoded_len_estimate(encoded_len)
}
