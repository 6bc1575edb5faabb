//! Decoder session: configure once, then decode until closed or errored.

use std::fmt;

use crate::assembler::AccessUnit;
use crate::clock::{Clock, TimestampGenerator};
use crate::decoder::{
    ChunkKind, DecodedFrame, DecoderConfig, DecoderError, EncodedChunk, VideoDecoder,
};

/// Queue depth above which delta frames are dropped.
pub const DEFAULT_MAX_QUEUE_DEPTH: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unconfigured,
    Configuring,
    Configured,
    Closed,
    Errored,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionState::Unconfigured => "unconfigured",
            SessionState::Configuring => "configuring",
            SessionState::Configured => "configured",
            SessionState::Closed => "closed",
            SessionState::Errored => "errored",
        })
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("cannot configure a session in state {0}")]
    InvalidState(SessionState),

    #[error("session is errored and must be rebuilt")]
    Errored,

    #[error(transparent)]
    Decoder(#[from] DecoderError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Decoder queue is over its limit and the unit is a delta frame.
    Backpressure,
    /// No configuration has been accepted yet.
    Unconfigured,
    /// Delta frame before the first keyframe of the session.
    AwaitingKeyframe,
}

impl DropReason {
    fn as_str(self) -> &'static str {
        match self {
            DropReason::Backpressure => "backpressure",
            DropReason::Unconfigured => "unconfigured",
            DropReason::AwaitingKeyframe => "awaiting_keyframe",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Submitted { timestamp_us: u64 },
    Dropped(DropReason),
    /// Session was closed; the unit is ignored.
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoGeometry {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub submitted: u64,
    pub decoded: u64,
    pub dropped: u64,
}

/// Receives decoded frames, e.g. a drawable surface.
pub trait FrameSink {
    fn on_frame(&mut self, frame: DecodedFrame);
}

impl<F: FnMut(DecodedFrame)> FrameSink for F {
    fn on_frame(&mut self, frame: DecodedFrame) {
        self(frame)
    }
}

pub struct DecoderSession<D: VideoDecoder, C: Clock> {
    decoder: D,
    clock: C,
    state: SessionState,
    max_queue_depth: usize,
    timestamps: TimestampGenerator,
    seen_keyframe: bool,
    geometry: Option<VideoGeometry>,
    stats: SessionStats,
}

impl<D: VideoDecoder, C: Clock> DecoderSession<D, C> {
    pub fn new(decoder: D, clock: C, max_queue_depth: usize) -> Self {
        Self {
            decoder,
            clock,
            state: SessionState::Unconfigured,
            max_queue_depth,
            timestamps: TimestampGenerator::new(),
            seen_keyframe: false,
            geometry: None,
            stats: SessionStats::default(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Geometry of the last decoded frame.
    pub fn geometry(&self) -> Option<VideoGeometry> {
        self.geometry
    }

    pub fn decoder(&self) -> &D {
        &self.decoder
    }

    pub fn decoder_mut(&mut self) -> &mut D {
        &mut self.decoder
    }

    /// Issues the single configure call this session is allowed.
    pub fn configure(&mut self, config: &DecoderConfig) -> Result<(), SessionError> {
        match self.state {
            SessionState::Unconfigured => {}
            SessionState::Errored => return Err(SessionError::Errored),
            state => return Err(SessionError::InvalidState(state)),
        }

        self.state = SessionState::Configuring;
        match self.decoder.configure(config) {
            Ok(()) => {
                self.state = SessionState::Configured;
                tracing::info!(
                    codec = %config.codec,
                    low_latency = config.low_latency,
                    decoder = self.decoder.name(),
                    "decoder configured"
                );
                Ok(())
            }
            Err(err) => {
                self.fail(&err);
                Err(err.into())
            }
        }
    }

    /// Submits one access unit and hands any ready frames to `sink`.
    pub fn submit<S: FrameSink + ?Sized>(
        &mut self,
        unit: AccessUnit,
        sink: &mut S,
    ) -> Result<SubmitOutcome, SessionError> {
        match self.state {
            SessionState::Configured => {}
            SessionState::Closed => return Ok(SubmitOutcome::Ignored),
            SessionState::Errored => return Err(SessionError::Errored),
            SessionState::Unconfigured | SessionState::Configuring => {
                return Ok(self.drop_unit(DropReason::Unconfigured));
            }
        }

        let kind = unit.kind();
        if kind == ChunkKind::Delta {
            if !self.seen_keyframe {
                return Ok(self.drop_unit(DropReason::AwaitingKeyframe));
            }
            if self.decoder.queue_depth() > self.max_queue_depth {
                return Ok(self.drop_unit(DropReason::Backpressure));
            }
        }

        let timestamp_us = self.timestamps.next(self.clock.now());
        let chunk = EncodedChunk {
            kind,
            timestamp_us,
            data: unit.data,
        };

        if let Err(err) = self.decoder.decode(chunk) {
            self.fail(&err);
            return Err(err.into());
        }

        if kind == ChunkKind::Key {
            self.seen_keyframe = true;
        }
        self.stats.submitted += 1;
        metrics::counter!("mirror_access_units_total", "kind" => kind.as_str()).increment(1);

        self.drain(sink)?;
        Ok(SubmitOutcome::Submitted { timestamp_us })
    }

    /// Delivers every frame the decoder has ready.
    pub fn drain<S: FrameSink + ?Sized>(&mut self, sink: &mut S) -> Result<usize, SessionError> {
        if self.state != SessionState::Configured {
            return Ok(0);
        }

        let mut delivered = 0;
        while let Some(output) = self.decoder.poll_output() {
            match output {
                Ok(frame) => {
                    self.update_geometry(&frame);
                    self.stats.decoded += 1;
                    metrics::counter!("mirror_frames_decoded_total").increment(1);
                    sink.on_frame(frame);
                    delivered += 1;
                }
                Err(err) => {
                    self.fail(&err);
                    return Err(err.into());
                }
            }
        }
        Ok(delivered)
    }

    /// Releases the decoder. Later submissions are ignored.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.decoder.close();
        tracing::debug!(
            previous = %self.state,
            submitted = self.stats.submitted,
            decoded = self.stats.decoded,
            dropped = self.stats.dropped,
            "decoder session closed"
        );
        self.state = SessionState::Closed;
    }

    fn drop_unit(&mut self, reason: DropReason) -> SubmitOutcome {
        self.stats.dropped += 1;
        metrics::counter!("mirror_frames_dropped_total", "reason" => reason.as_str()).increment(1);
        SubmitOutcome::Dropped(reason)
    }

    fn fail(&mut self, err: &DecoderError) {
        tracing::error!(previous = %self.state, decoder = self.decoder.name(), "decoder failed: {err}");
        self.state = SessionState::Errored;
    }

    fn update_geometry(&mut self, frame: &DecodedFrame) {
        let geometry = VideoGeometry {
            width: frame.display_width,
            height: frame.display_height,
        };
        if self.geometry != Some(geometry) {
            tracing::info!(
                width = geometry.width,
                height = geometry.height,
                "video geometry changed"
            );
            self.geometry = Some(geometry);
        }
    }
}

impl<D: VideoDecoder, C: Clock> Drop for DecoderSession<D, C> {
    fn drop(&mut self) {
        self.close();
    }
}
