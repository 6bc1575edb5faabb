//! UI side of the mirror: turns wire messages into drawn frames.

use crate::clock::Clock;
use crate::decoder::{DecoderError, VideoDecoder};
use crate::session::{SessionState, SessionStats};
use crate::settings::DecoderSettings;
use crate::surface::Surface;
use crate::transport::TransportAdapter;
use crate::wire::{LogLevel, WireError, WireMessage};

/// Owns the stream pipeline for the current device connection.
///
/// A `connected` message always starts from scratch with a fresh decoder,
/// so parameter sets, timestamps and decoder state never leak across
/// connections. An errored decoder stays errored until the next
/// `connected` or an explicit [`MirrorSession::reset`].
pub struct MirrorSession<D, C, F>
where
    D: VideoDecoder,
    C: Clock + Clone,
    F: FnMut() -> Result<D, DecoderError>,
{
    new_decoder: F,
    clock: C,
    settings: DecoderSettings,
    adapter: Option<TransportAdapter<D, C>>,
    surface: Surface,
    device: Option<String>,
    /// Stats of torn down adapters.
    retired: SessionStats,
    error_reported: bool,
}

impl<D, C, F> MirrorSession<D, C, F>
where
    D: VideoDecoder,
    C: Clock + Clone,
    F: FnMut() -> Result<D, DecoderError>,
{
    pub fn new(new_decoder: F, clock: C, settings: DecoderSettings) -> Self {
        Self {
            new_decoder,
            clock,
            settings,
            adapter: None,
            surface: Surface::new(),
            device: None,
            retired: SessionStats::default(),
            error_reported: false,
        }
    }

    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    pub fn device(&self) -> Option<&str> {
        self.device.as_deref()
    }

    pub fn adapter(&self) -> Option<&TransportAdapter<D, C>> {
        self.adapter.as_ref()
    }

    /// `None` while no device is connected.
    pub fn state(&self) -> Option<SessionState> {
        self.adapter.as_ref().map(TransportAdapter::state)
    }

    /// Totals across every connection so far.
    pub fn totals(&self) -> SessionStats {
        let current = self.adapter.as_ref().map(|a| a.stats()).unwrap_or_default();
        SessionStats {
            submitted: self.retired.submitted + current.submitted,
            decoded: self.retired.decoded + current.decoded,
            dropped: self.retired.dropped + current.dropped,
        }
    }

    pub fn stats(&self) -> WireMessage {
        let totals = self.totals();
        WireMessage::Stats {
            dropped_frames: totals.dropped,
            decoded_frames: totals.decoded,
        }
    }

    pub fn handle_json(&mut self, json: &str) -> Result<Option<WireMessage>, WireError> {
        let msg = WireMessage::from_json(json)?;
        Ok(self.handle(msg))
    }

    /// Applies one inbound message. Returns a log message for the host
    /// when something worth reporting happened.
    pub fn handle(&mut self, msg: WireMessage) -> Option<WireMessage> {
        match msg {
            WireMessage::Video { data } => self.on_video(&data),
            WireMessage::Connected {
                device,
                width,
                height,
            } => {
                tracing::info!(%device, ?width, ?height, "device connected");
                self.device = Some(device);
                self.reset()
            }
            WireMessage::Disconnected { reason } => {
                tracing::info!(device = ?self.device, %reason, "device disconnected");
                self.teardown();
                self.device = None;
                None
            }
            WireMessage::Log { message, level } => {
                match level {
                    LogLevel::Debug => tracing::debug!(target: "droidmirror::remote", "{message}"),
                    LogLevel::Info => tracing::info!(target: "droidmirror::remote", "{message}"),
                    LogLevel::Warn => tracing::warn!(target: "droidmirror::remote", "{message}"),
                    LogLevel::Error => tracing::error!(target: "droidmirror::remote", "{message}"),
                }
                None
            }
            WireMessage::Stats { .. } => None,
        }
    }

    /// Replaces the current pipeline with a fresh one.
    pub fn reset(&mut self) -> Option<WireMessage> {
        self.teardown();
        self.error_reported = false;

        let decoder = match (self.new_decoder)() {
            Ok(decoder) => decoder,
            Err(err) => {
                tracing::error!("failed to create decoder: {err}");
                self.error_reported = true;
                return Some(WireMessage::log(
                    LogLevel::Error,
                    format!("failed to create decoder: {err}"),
                ));
            }
        };

        self.adapter = Some(TransportAdapter::new(
            decoder,
            self.clock.clone(),
            self.settings.max_queue_depth,
            self.settings.scratch_min_bytes,
        ));
        None
    }

    fn teardown(&mut self) {
        if let Some(mut adapter) = self.adapter.take() {
            adapter.close();
            let stats = adapter.stats();
            self.retired.submitted += stats.submitted;
            self.retired.decoded += stats.decoded;
            self.retired.dropped += stats.dropped;
        }
    }

    fn on_video(&mut self, data: &str) -> Option<WireMessage> {
        let Some(adapter) = self.adapter.as_mut() else {
            tracing::trace!("video without a connected device, ignoring");
            return None;
        };

        match adapter.handle_encoded(data, &mut self.surface) {
            Ok(_) => None,
            // Report once per pipeline; the next connect clears it.
            Err(_) if self.error_reported => None,
            Err(err) => {
                self.error_reported = true;
                Some(WireMessage::log(
                    LogLevel::Error,
                    format!("video decoding stopped: {err}"),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::clock::ManualClock;
    use crate::decoder::{ChunkKind, EchoDecoder};

    const SPS: &[u8] = &[0, 0, 0, 1, 0x67, 0x64, 0x00, 0x28, 0xAC, 0xD9];
    const PPS: &[u8] = &[0, 0, 0, 1, 0x68, 0xEB, 0xE3, 0xCB];
    const IDR: &[u8] = &[0, 0, 0, 1, 0x65, 0x88, 0x84, 0x21, 0xA0];
    const NON_IDR: &[u8] = &[0, 0, 0, 1, 0x41, 0x9A, 0x22, 0x11];

    fn connected() -> WireMessage {
        WireMessage::Connected {
            device: "emulator-5554".into(),
            width: None,
            height: None,
        }
    }

    fn echo() -> Result<EchoDecoder, DecoderError> {
        Ok(EchoDecoder::new())
    }

    #[test]
    fn keyframe_then_delta_reach_the_surface() {
        let clock = ManualClock::new();
        let mut mirror = MirrorSession::new(echo, clock.clone(), DecoderSettings::default());
        assert!(mirror.handle(connected()).is_none());

        assert!(mirror.handle(WireMessage::video(&[SPS, PPS, IDR].concat())).is_none());
        clock.advance(Duration::from_millis(16));
        assert!(mirror.handle(WireMessage::video(NON_IDR)).is_none());

        let adapter = mirror.adapter().unwrap();
        let decoder = adapter.session().decoder();
        assert_eq!(decoder.configure_calls().len(), 1);
        assert_eq!(decoder.configure_calls()[0].codec, "avc1.640028");

        let chunks = decoder.decoded();
        assert_eq!(chunks.len(), 2);
        assert_eq!((chunks[0].kind, chunks[0].timestamp_us), (ChunkKind::Key, 0));
        assert_eq!(chunks[1].kind, ChunkKind::Delta);
        assert!(chunks[1].timestamp_us > chunks[0].timestamp_us);

        assert_eq!(mirror.surface().frames_drawn(), 2);
        assert_eq!(
            mirror.stats(),
            WireMessage::Stats {
                dropped_frames: 0,
                decoded_frames: 2
            }
        );
    }

    #[test]
    fn video_without_connection_is_ignored() {
        let mut mirror = MirrorSession::new(echo, ManualClock::new(), DecoderSettings::default());
        assert!(mirror.handle(WireMessage::video(&[SPS, PPS, IDR].concat())).is_none());
        assert_eq!(mirror.state(), None);
        assert_eq!(mirror.surface().frames_drawn(), 0);
    }

    #[test]
    fn reconnect_starts_a_fresh_pipeline() {
        let mut mirror = MirrorSession::new(echo, ManualClock::new(), DecoderSettings::default());
        mirror.handle(connected());
        mirror.handle(WireMessage::video(&[SPS, PPS, IDR].concat()));

        mirror.handle(WireMessage::Disconnected {
            reason: "usb unplugged".into(),
        });
        assert_eq!(mirror.state(), None);
        assert_eq!(mirror.device(), None);

        mirror.handle(connected());
        assert_eq!(mirror.state(), Some(SessionState::Unconfigured));
        // Parameter sets from the old connection are gone.
        assert!(mirror.adapter().unwrap().assembler().params().sps().is_none());
        mirror.handle(WireMessage::video(NON_IDR));
        assert_eq!(mirror.totals().dropped, 1);
        assert_eq!(mirror.totals().decoded, 1);
    }

    #[test]
    fn decoder_failure_is_reported_once_and_cleared_by_reconnect() {
        let mut built = 0;
        let factory = move || {
            built += 1;
            let mut decoder = EchoDecoder::new();
            if built == 1 {
                decoder.fail_next_decode(DecoderError::Decode("corrupt slice".into()));
            }
            Ok(decoder)
        };
        let mut mirror = MirrorSession::new(factory, ManualClock::new(), DecoderSettings::default());
        mirror.handle(connected());

        let report = mirror.handle(WireMessage::video(&[SPS, PPS, IDR].concat()));
        assert!(matches!(
            report,
            Some(WireMessage::Log {
                level: LogLevel::Error,
                ..
            })
        ));
        assert_eq!(mirror.state(), Some(SessionState::Errored));
        assert!(mirror.handle(WireMessage::video(IDR)).is_none());

        mirror.handle(connected());
        assert!(mirror.handle(WireMessage::video(&[SPS, PPS, IDR].concat())).is_none());
        assert_eq!(mirror.state(), Some(SessionState::Configured));
        assert_eq!(mirror.surface().frames_drawn(), 1);
    }

    #[test]
    fn factory_failure_is_reported() {
        let factory = || -> Result<EchoDecoder, DecoderError> {
            Err(DecoderError::UnsupportedCodec("no backend".into()))
        };
        let mut mirror = MirrorSession::new(factory, ManualClock::new(), DecoderSettings::default());
        assert!(matches!(
            mirror.handle(connected()),
            Some(WireMessage::Log {
                level: LogLevel::Error,
                ..
            })
        ));
        assert_eq!(mirror.state(), None);
    }

    #[test]
    fn malformed_json_is_an_error() {
        let mut mirror = MirrorSession::new(echo, ManualClock::new(), DecoderSettings::default());
        assert!(mirror.handle_json("{not json").is_err());
        assert_eq!(mirror.handle_json(r#"{"type":"disconnected","reason":"x"}"#).unwrap(), None);
    }
}
