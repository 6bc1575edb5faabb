//! Reads the raw H.264 stream of a scrcpy video socket.

use std::io;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::settings::DeviceSettings;

pub const CODEC_META_LEN: usize = 12;
pub const CODEC_ID_H264: &str = "h264";

#[derive(thiserror::Error, Debug)]
pub enum DeviceError {
    #[error("device stream ended")]
    Eof,

    #[error("device read failed: {0}")]
    Io(#[from] io::Error),

    #[error("unsupported device codec: {0:?}")]
    UnsupportedCodec(String),

    #[error("event receiver dropped")]
    ReceiverClosed,
}

/// Header scrcpy sends ahead of the stream when codec meta is enabled:
/// a 4-byte ASCII codec id followed by big-endian width and height.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecMeta {
    pub codec_id: String,
    pub width: u32,
    pub height: u32,
}

impl CodecMeta {
    pub fn parse(raw: &[u8; CODEC_META_LEN]) -> Self {
        let codec_id = raw[..4]
            .iter()
            .filter(|b| b.is_ascii_graphic())
            .map(|&b| b as char)
            .collect();
        let width = u32::from_be_bytes([raw[4], raw[5], raw[6], raw[7]]);
        let height = u32::from_be_bytes([raw[8], raw[9], raw[10], raw[11]]);
        Self {
            codec_id,
            width,
            height,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    Connected {
        device: String,
        meta: Option<CodecMeta>,
    },
    Video(Bytes),
    Disconnected {
        reason: String,
    },
}

pub struct VideoReader<R> {
    device: String,
    stream: R,
    settings: DeviceSettings,
}

impl<R: AsyncRead + Unpin> VideoReader<R> {
    pub fn new(device: impl Into<String>, stream: R, settings: DeviceSettings) -> Self {
        Self {
            device: device.into(),
            stream,
            settings,
        }
    }

    /// Streams device events until the stream ends, fails or `shutdown`
    /// fires. A read that times out only means the device is idle (e.g. the
    /// screen is static) and is retried; EOF and I/O errors are terminal and
    /// are reported as `Disconnected` before returning.
    pub async fn run(
        mut self,
        events: mpsc::Sender<DeviceEvent>,
        shutdown: CancellationToken,
    ) -> Result<(), DeviceError> {
        let meta = if self.settings.codec_meta {
            let meta = tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Ok(()),
                res = self.read_codec_meta() => res,
            };
            match meta {
                Ok(meta) => Some(meta),
                Err(err) => {
                    notify_disconnect(&events, &err).await;
                    return Err(err);
                }
            }
        } else {
            None
        };

        tracing::info!(device = %self.device, ?meta, "device video stream connected");
        events
            .send(DeviceEvent::Connected {
                device: self.device.clone(),
                meta,
            })
            .await
            .map_err(|_| DeviceError::ReceiverClosed)?;

        let chunk_size = self.settings.read_chunk_bytes;
        let read_timeout = self.settings.read_timeout();
        let mut buf = BytesMut::with_capacity(chunk_size);

        loop {
            buf.reserve(chunk_size);
            let res = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    tracing::info!(device = %self.device, "device read cancelled");
                    return Ok(());
                }
                res = tokio::time::timeout(read_timeout, self.stream.read_buf(&mut buf)) => res,
            };

            let err = match res {
                Err(_elapsed) => {
                    tracing::debug!(device = %self.device, ?read_timeout, "device idle");
                    continue;
                }
                Ok(Ok(0)) => DeviceError::Eof,
                Ok(Ok(_)) => {
                    let chunk = buf.split().freeze();
                    if events.send(DeviceEvent::Video(chunk)).await.is_err() {
                        return Err(DeviceError::ReceiverClosed);
                    }
                    continue;
                }
                Ok(Err(err)) => DeviceError::Io(err),
            };

            tracing::warn!(device = %self.device, "device connection lost: {err}");
            notify_disconnect(&events, &err).await;
            return Err(err);
        }
    }

    async fn read_codec_meta(&mut self) -> Result<CodecMeta, DeviceError> {
        let mut raw = [0u8; CODEC_META_LEN];
        let read = tokio::time::timeout(
            self.settings.read_timeout(),
            self.stream.read_exact(&mut raw),
        )
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "no codec header"))?;

        match read {
            Ok(_) => {}
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Err(DeviceError::Eof),
            Err(err) => return Err(err.into()),
        }

        let meta = CodecMeta::parse(&raw);
        if meta.codec_id != CODEC_ID_H264 {
            return Err(DeviceError::UnsupportedCodec(meta.codec_id));
        }
        Ok(meta)
    }
}

async fn notify_disconnect(events: &mpsc::Sender<DeviceEvent>, err: &DeviceError) {
    let _ = events
        .send(DeviceEvent::Disconnected {
            reason: err.to_string(),
        })
        .await;
}
