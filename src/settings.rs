use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::batcher::DEFAULT_MAX_BUFFER_BYTES;
use crate::decoder::DecoderBackend;
use crate::session::DEFAULT_MAX_QUEUE_DEPTH;
use crate::transport::DEFAULT_SCRATCH_MIN_BYTES;

pub const ENV_PREFIX: &str = "DROIDMIRROR";

#[derive(thiserror::Error, Debug)]
pub enum SettingsError {
    #[error(transparent)]
    Load(#[from] config::ConfigError),

    #[error("invalid setting {key}: {reason}")]
    Invalid {
        key: &'static str,
        reason: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatcherSettings {
    pub flush_interval_ms: u64,
    pub max_buffer_bytes: usize,
}

impl Default for BatcherSettings {
    fn default() -> Self {
        Self {
            flush_interval_ms: 8,
            max_buffer_bytes: DEFAULT_MAX_BUFFER_BYTES,
        }
    }
}

impl BatcherSettings {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSettings {
    pub read_timeout_secs: u64,
    pub read_chunk_bytes: usize,
    /// Expect the 12-byte scrcpy codec header before the stream.
    pub codec_meta: bool,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            read_timeout_secs: 10,
            read_chunk_bytes: 64 * 1024,
            codec_meta: false,
        }
    }
}

impl DeviceSettings {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderSettings {
    pub backend: DecoderBackend,
    pub max_queue_depth: usize,
    pub scratch_min_bytes: usize,
}

impl Default for DecoderSettings {
    fn default() -> Self {
        Self {
            backend: DecoderBackend::default(),
            max_queue_depth: DEFAULT_MAX_QUEUE_DEPTH,
            scratch_min_bytes: DEFAULT_SCRATCH_MIN_BYTES,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorSettings {
    pub batcher: BatcherSettings,
    pub device: DeviceSettings,
    pub decoder: DecoderSettings,
}

impl MirrorSettings {
    /// Defaults, then the optional TOML file, then `DROIDMIRROR__*`
    /// environment variables (e.g. `DROIDMIRROR__BATCHER__FLUSH_INTERVAL_MS`).
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let settings: MirrorSettings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_toml(s: &str) -> Result<Self, SettingsError> {
        let settings: MirrorSettings = config::Config::builder()
            .add_source(config::File::from_str(s, config::FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        let checks: [(bool, &'static str, &'static str); 5] = [
            (
                self.batcher.flush_interval_ms > 0,
                "batcher.flush_interval_ms",
                "must be positive",
            ),
            (
                self.batcher.max_buffer_bytes > 0,
                "batcher.max_buffer_bytes",
                "must be positive",
            ),
            (
                self.device.read_timeout_secs > 0,
                "device.read_timeout_secs",
                "must be positive",
            ),
            (
                self.device.read_chunk_bytes > 0,
                "device.read_chunk_bytes",
                "must be positive",
            ),
            (
                self.decoder.max_queue_depth > 0,
                "decoder.max_queue_depth",
                "must be positive",
            ),
        ];

        match checks.iter().find(|(ok, _, _)| !ok) {
            Some(&(_, key, reason)) => Err(SettingsError::Invalid { key, reason }),
            None => Ok(()),
        }
    }
}
