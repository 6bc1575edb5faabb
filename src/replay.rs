//! Plays a recorded Annex-B file as if it came from a device.

use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::device::{DeviceError, DeviceEvent};
use crate::nal;

pub const DEFAULT_FPS: u32 = 60;

/// Splits a recording into pictures.
///
/// Parameter sets and other non-slice units stick to the picture that
/// follows them. A slice whose `first_mb_in_slice` is zero (leading bit of
/// the slice header set) starts a new picture.
pub fn split_pictures(recording: &Bytes) -> Vec<Bytes> {
    let mut pictures = Vec::new();
    let mut start = None;
    let mut has_slice = false;

    for range in nal::split_nal_units(recording) {
        let unit = range.slice(recording);
        let Some(classified) = nal::classify(unit) else {
            continue;
        };

        let starts_picture = classified.nal_type.is_slice()
            && unit
                .get(classified.header_offset + 1)
                .is_some_and(|b| b & 0x80 != 0);

        if has_slice && (starts_picture || !classified.nal_type.is_slice()) {
            if let Some(begin) = start.take() {
                pictures.push(recording.slice(begin..range.start));
            }
            has_slice = false;
        }

        start.get_or_insert(range.start);
        has_slice |= classified.nal_type.is_slice();
    }

    if let Some(begin) = start {
        pictures.push(recording.slice(begin..));
    }
    pictures
}

/// Feeds a recording picture by picture at a fixed frame rate, emitting
/// the same events a live [`crate::device::VideoReader`] would.
pub struct Replay {
    device: String,
    pictures: Vec<Bytes>,
    frame_interval: Duration,
}

impl Replay {
    pub fn new(device: impl Into<String>, recording: Bytes, fps: u32) -> Self {
        let pictures = split_pictures(&recording);
        Self {
            device: device.into(),
            pictures,
            frame_interval: Duration::from_secs(1) / fps.max(1),
        }
    }

    pub fn pictures(&self) -> usize {
        self.pictures.len()
    }

    pub fn frame_interval(&self) -> Duration {
        self.frame_interval
    }

    pub async fn run(
        self,
        events: mpsc::Sender<DeviceEvent>,
        shutdown: CancellationToken,
    ) -> Result<(), DeviceError> {
        tracing::info!(
            device = %self.device,
            pictures = self.pictures.len(),
            interval = ?self.frame_interval,
            "replay started"
        );
        events
            .send(DeviceEvent::Connected {
                device: self.device.clone(),
                meta: None,
            })
            .await
            .map_err(|_| DeviceError::ReceiverClosed)?;

        let mut ticker = tokio::time::interval(self.frame_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        for picture in self.pictures {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    tracing::info!(device = %self.device, "replay cancelled");
                    return Ok(());
                }
                _ = ticker.tick() => {}
            }
            events
                .send(DeviceEvent::Video(picture))
                .await
                .map_err(|_| DeviceError::ReceiverClosed)?;
        }

        // Let the last picture go out on its own flush.
        ticker.tick().await;
        events
            .send(DeviceEvent::Disconnected {
                reason: "recording finished".into(),
            })
            .await
            .map_err(|_| DeviceError::ReceiverClosed)?;
        Ok(())
    }
}
