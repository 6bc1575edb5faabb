use crate::assembler::AccessUnitAssembler;
use crate::clock::Clock;
use crate::decoder::VideoDecoder;
use crate::session::{
    DecoderSession, FrameSink, SessionError, SessionState, SessionStats, SubmitOutcome,
};
use crate::wire::{self, WireError};

pub const DEFAULT_SCRATCH_MIN_BYTES: usize = 256 * 1024;

/// Reusable buffer for decoding wire payloads.
///
/// On a miss it grows to `max(needed * 2, min_capacity)` and never shrinks,
/// so a steady stream settles on one allocation.
#[derive(Debug)]
pub struct ScratchBuffer {
    buf: Vec<u8>,
    min_capacity: usize,
    grows: u64,
}

impl ScratchBuffer {
    pub fn new(min_capacity: usize) -> Self {
        Self {
            buf: Vec::new(),
            min_capacity,
            grows: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn grows(&self) -> u64 {
        self.grows
    }

    /// Returns a writable slice of at least `needed` bytes.
    pub fn reserve(&mut self, needed: usize) -> &mut [u8] {
        if self.buf.len() < needed {
            let size = (needed * 2).max(self.min_capacity);
            self.buf.resize(size, 0);
            self.grows += 1;
            metrics::counter!("mirror_scratch_grow_total").increment(1);
            tracing::debug!(size, "scratch buffer grown");
        }
        &mut self.buf[..]
    }

    pub fn decode_base64(&mut self, encoded: &str) -> Result<&[u8], WireError> {
        let needed = wire::decoded_len_estimate(encoded.len());
        let out = self.reserve(needed);
        let len = wire::decode_into(encoded, out)?;
        Ok(&self.buf[..len])
    }
}

/// UI-side entry point for one stream: wire payload in, frames out.
///
/// Each call runs the whole chain (decode wire encoding, split, classify,
/// assemble, configure if needed, submit) before returning.
pub struct TransportAdapter<D: VideoDecoder, C: Clock> {
    scratch: ScratchBuffer,
    assembler: AccessUnitAssembler,
    session: DecoderSession<D, C>,
    wire_errors: u64,
}

impl<D: VideoDecoder, C: Clock> TransportAdapter<D, C> {
    pub fn new(decoder: D, clock: C, max_queue_depth: usize, scratch_min_bytes: usize) -> Self {
        Self {
            scratch: ScratchBuffer::new(scratch_min_bytes),
            assembler: AccessUnitAssembler::new(),
            session: DecoderSession::new(decoder, clock, max_queue_depth),
            wire_errors: 0,
        }
    }

    pub fn session(&self) -> &DecoderSession<D, C> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut DecoderSession<D, C> {
        &mut self.session
    }

    pub fn assembler(&self) -> &AccessUnitAssembler {
        &self.assembler
    }

    pub fn scratch(&self) -> &ScratchBuffer {
        &self.scratch
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn stats(&self) -> SessionStats {
        self.session.stats()
    }

    pub fn wire_errors(&self) -> u64 {
        self.wire_errors
    }

    /// Handles one base64 video payload. Undecodable payloads are counted
    /// and dropped.
    pub fn handle_encoded<S: FrameSink + ?Sized>(
        &mut self,
        encoded: &str,
        sink: &mut S,
    ) -> Result<Option<SubmitOutcome>, SessionError> {
        let packet = match self.scratch.decode_base64(encoded) {
            Ok(packet) => packet,
            Err(err) => {
                self.wire_errors += 1;
                metrics::counter!("mirror_wire_decode_errors_total").increment(1);
                tracing::trace!("dropping undecodable payload: {err}");
                return Ok(None);
            }
        };
        process(&mut self.assembler, &mut self.session, packet, sink)
    }

    /// Handles one packet of raw Annex-B bytes.
    pub fn handle_packet<S: FrameSink + ?Sized>(
        &mut self,
        packet: &[u8],
        sink: &mut S,
    ) -> Result<Option<SubmitOutcome>, SessionError> {
        process(&mut self.assembler, &mut self.session, packet, sink)
    }

    pub fn close(&mut self) {
        self.session.close();
        self.assembler.reset();
    }
}

fn process<D: VideoDecoder, C: Clock, S: FrameSink + ?Sized>(
    assembler: &mut AccessUnitAssembler,
    session: &mut DecoderSession<D, C>,
    packet: &[u8],
    sink: &mut S,
) -> Result<Option<SubmitOutcome>, SessionError> {
    let Some(unit) = assembler.push(packet) else {
        return Ok(None);
    };

    // Configure lazily on the first packet that carries a picture, so a
    // burst of parameter sets settles on the newest pair.
    if let Some(config) = assembler.pending_config() {
        if session.state() == SessionState::Unconfigured {
            session.configure(&config)?;
            assembler.mark_configured();
        }
    }

    session.submit(unit, sink).map(Some)
}

#[cfg(test)]
mod tests {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;

    use super::*;
    use crate::clock::ManualClock;
    use crate::decoder::{DecodedFrame, EchoDecoder};
    use crate::session::DropReason;

    const SPS: &[u8] = &[0, 0, 0, 1, 0x67, 0x64, 0x00, 0x28, 0xAC, 0xD9];
    const PPS: &[u8] = &[0, 0, 0, 1, 0x68, 0xEB, 0xE3, 0xCB];
    const IDR: &[u8] = &[0, 0, 0, 1, 0x65, 0x88, 0x84, 0x21, 0xA0];

    fn adapter() -> TransportAdapter<EchoDecoder, ManualClock> {
        TransportAdapter::new(EchoDecoder::new(), ManualClock::new(), 3, 1024)
    }

    fn discard(_: DecodedFrame) {}

    #[test]
    fn scratch_grows_to_floor_then_doubles() {
        let mut scratch = ScratchBuffer::new(1024);
        scratch.reserve(10);
        assert_eq!(scratch.capacity(), 1024);
        scratch.reserve(1000);
        assert_eq!(scratch.capacity(), 1024);
        assert_eq!(scratch.grows(), 1);

        scratch.reserve(4000);
        assert_eq!(scratch.capacity(), 8000);
        scratch.reserve(100);
        assert_eq!(scratch.capacity(), 8000);
        assert_eq!(scratch.grows(), 2);
    }

    #[test]
    fn scratch_decodes_base64() {
        let mut scratch = ScratchBuffer::new(16);
        let encoded = STANDARD.encode(IDR);
        assert_eq!(scratch.decode_base64(&encoded).unwrap(), IDR);
        assert_eq!(scratch.grows(), 1);
    }

    #[test]
    fn encoded_keyframe_configures_and_decodes() {
        let mut adapter = adapter();
        let encoded = STANDARD.encode([SPS, PPS, IDR].concat());
        let mut frames = 0;
        let outcome = adapter
            .handle_encoded(&encoded, &mut |_: DecodedFrame| frames += 1)
            .unwrap();

        assert_eq!(outcome, Some(SubmitOutcome::Submitted { timestamp_us: 0 }));
        assert_eq!(frames, 1);
        assert!(adapter.assembler().params().is_configured());
        assert_eq!(adapter.session().decoder().configure_calls().len(), 1);
    }

    #[test]
    fn parameter_set_burst_configures_once_with_latest_pair() {
        const SPS_BASELINE: &[u8] = &[0, 0, 0, 1, 0x67, 0x42, 0xC0, 0x1F, 0xDA];
        const PPS_2: &[u8] = &[0, 0, 0, 1, 0x68, 0xCE, 0x3C, 0x80];

        let mut adapter = adapter();
        assert_eq!(adapter.handle_packet(SPS, &mut discard), Ok(None));
        assert_eq!(adapter.handle_packet(SPS_BASELINE, &mut discard), Ok(None));
        assert_eq!(adapter.handle_packet(PPS, &mut discard), Ok(None));
        assert_eq!(adapter.handle_packet(PPS_2, &mut discard), Ok(None));
        assert_eq!(adapter.state(), SessionState::Unconfigured);

        let outcome = adapter.handle_packet(IDR, &mut discard).unwrap();
        assert!(matches!(outcome, Some(SubmitOutcome::Submitted { .. })));

        let decoder = adapter.session().decoder();
        assert_eq!(decoder.configure_calls().len(), 1);
        assert_eq!(decoder.configure_calls()[0].codec, "avc1.42c01f");
        assert_eq!(
            decoder.decoded()[0].data.as_ref(),
            [SPS_BASELINE, PPS_2, IDR].concat().as_slice()
        );

        // A later keyframe with new parameter sets does not reconfigure.
        adapter.handle_packet(&[SPS, PPS, IDR].concat(), &mut discard).unwrap();
        assert_eq!(adapter.session().decoder().configure_calls().len(), 1);
    }

    #[test]
    fn invalid_payload_is_counted_not_fatal() {
        let mut adapter = adapter();
        assert_eq!(adapter.handle_encoded("@@@", &mut discard), Ok(None));
        assert_eq!(adapter.wire_errors(), 1);
        assert_eq!(adapter.state(), SessionState::Unconfigured);
    }

    #[test]
    fn slice_before_parameter_sets_is_dropped() {
        let mut adapter = adapter();
        let outcome = adapter.handle_packet(IDR, &mut discard).unwrap();
        assert_eq!(outcome, Some(SubmitOutcome::Dropped(DropReason::Unconfigured)));
    }

    #[test]
    fn configure_failure_is_reported() {
        let mut adapter = adapter();
        adapter
            .session_mut()
            .decoder_mut()
            .fail_next_configure(crate::decoder::DecoderError::Configure("busy".into()));
        assert!(adapter.handle_packet(&[SPS, PPS, IDR].concat(), &mut discard).is_err());
        assert_eq!(adapter.state(), SessionState::Errored);
        assert!(!adapter.assembler().params().is_configured());
    }

    #[test]
    fn close_resets_parameter_sets() {
        let mut adapter = adapter();
        adapter.handle_packet(&[SPS, PPS, IDR].concat(), &mut discard).unwrap();
        adapter.close();
        assert_eq!(adapter.state(), SessionState::Closed);
        assert!(adapter.assembler().params().sps().is_none());
        assert_eq!(adapter.handle_packet(IDR, &mut discard), Ok(Some(SubmitOutcome::Ignored)));
    }
}
