use bytes::{Bytes, BytesMut};

use crate::decoder::{ChunkKind, DecoderConfig};
use crate::nal::{self, MIN_NALU_LEN, NalRange, NalType};
use crate::params::ParameterSetCache;

/// Packets shorter than this are transport garbage and never parsed.
pub const MIN_PACKET_LEN: usize = 5;

/// One picture's worth of Annex-B data, ready for a single decode call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessUnit {
    pub data: Bytes,
    pub is_keyframe: bool,
}

impl AccessUnit {
    pub fn kind(&self) -> ChunkKind {
        if self.is_keyframe {
            ChunkKind::Key
        } else {
            ChunkKind::Delta
        }
    }
}

/// Turns transport packets into access units.
///
/// Every SPS/PPS in a packet refreshes the parameter set cache; IDR and
/// non-IDR slices are collected in order and everything else is discarded.
/// Keyframes are emitted as `SPS ++ PPS ++ slices` when both parameter sets
/// are known, delta frames as the bare slices.
#[derive(Debug, Default)]
pub struct AccessUnitAssembler {
    params: ParameterSetCache,
    slices: Vec<NalRange>,
}

impl AccessUnitAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn params(&self) -> &ParameterSetCache {
        &self.params
    }

    /// Configuration the decoder still needs, if any.
    pub fn pending_config(&self) -> Option<DecoderConfig> {
        self.params.pending_config()
    }

    /// Records that the decoder accepted the pending configuration.
    pub fn mark_configured(&mut self) {
        self.params.mark_configured();
    }

    pub fn reset(&mut self) {
        self.params.reset();
        self.slices.clear();
    }

    pub fn push(&mut self, packet: &[u8]) -> Option<AccessUnit> {
        if packet.len() < MIN_PACKET_LEN {
            tracing::trace!(len = packet.len(), "dropping short packet");
            metrics::counter!("mirror_packets_dropped_total", "reason" => "short").increment(1);
            return None;
        }

        self.slices.clear();
        let mut has_keyframe = false;

        for range in nal::split_nal_units(packet) {
            if range.len() < MIN_NALU_LEN {
                continue;
            }
            let unit = range.slice(packet);
            let Some(classified) = nal::classify(unit) else {
                continue;
            };

            match classified.nal_type {
                NalType::Sps => self.params.set_sps(unit, classified.profile),
                NalType::Pps => self.params.set_pps(unit),
                NalType::Idr => {
                    has_keyframe = true;
                    self.slices.push(range);
                }
                NalType::Slice => self.slices.push(range),
                NalType::Other(t) => {
                    tracing::trace!(nal_type = t, "ignoring nal unit");
                }
            }
        }

        if self.slices.is_empty() {
            return None;
        }

        let slice_len: usize = self.slices.iter().map(NalRange::len).sum();
        let params = match (has_keyframe, self.params.sps(), self.params.pps()) {
            (true, Some(sps), Some(pps)) => Some((sps, pps)),
            _ => None,
        };
        let param_len = params.map_or(0, |(sps, pps)| sps.len() + pps.len());

        let mut data = BytesMut::with_capacity(param_len + slice_len);
        if let Some((sps, pps)) = params {
            data.extend_from_slice(sps);
            data.extend_from_slice(pps);
        }
        for range in &self.slices {
            data.extend_from_slice(range.slice(packet));
        }

        Some(AccessUnit {
            data: data.freeze(),
            is_keyframe: has_keyframe,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPS: &[u8] = &[0, 0, 0, 1, 0x67, 0x64, 0x00, 0x28, 0xAC, 0xD9];
    const PPS: &[u8] = &[0, 0, 0, 1, 0x68, 0xEB, 0xE3, 0xCB];
    const IDR: &[u8] = &[0, 0, 0, 1, 0x65, 0x88, 0x84, 0x21, 0xA0];
    const IDR_2: &[u8] = &[0, 0, 1, 0x65, 0x00, 0x33, 0x42];
    const P_SLICE: &[u8] = &[0, 0, 0, 1, 0x41, 0x9A, 0x22, 0x11];
    const SEI: &[u8] = &[0, 0, 0, 1, 0x06, 0x05, 0x10, 0xB8];

    #[test]
    fn keyframe_is_prefixed_with_parameter_sets() {
        let mut assembler = AccessUnitAssembler::new();
        let packet = [SPS, PPS, IDR, IDR_2].concat();
        let unit = assembler.push(&packet).unwrap();

        assert!(unit.is_keyframe);
        assert_eq!(unit.kind(), ChunkKind::Key);
        assert_eq!(
            unit.data.len(),
            SPS.len() + PPS.len() + IDR.len() + IDR_2.len()
        );
        assert_eq!(&unit.data[..SPS.len()], SPS);
        assert_eq!(unit.data.as_ref(), packet.as_slice());
    }

    #[test]
    fn keyframe_uses_cached_parameter_sets_from_earlier_packet() {
        let mut assembler = AccessUnitAssembler::new();
        assert!(assembler.push(&[SPS, PPS].concat()).is_none());

        let unit = assembler.push(IDR).unwrap();
        assert_eq!(unit.data.as_ref(), [SPS, PPS, IDR].concat().as_slice());
    }

    #[test]
    fn delta_frame_never_carries_parameter_sets() {
        let mut assembler = AccessUnitAssembler::new();
        assembler.push(&[SPS, PPS, IDR].concat()).unwrap();

        let unit = assembler.push(P_SLICE).unwrap();
        assert!(!unit.is_keyframe);
        assert_eq!(unit.kind(), ChunkKind::Delta);
        assert_eq!(unit.data.as_ref(), P_SLICE);
        assert!(!unit.data.starts_with(SPS));
        assert!(!unit.data.starts_with(PPS));
    }

    #[test]
    fn parameter_sets_in_delta_packet_are_cached_not_emitted() {
        let mut assembler = AccessUnitAssembler::new();
        let unit = assembler.push(&[SPS, PPS, P_SLICE].concat()).unwrap();
        assert_eq!(unit.data.as_ref(), P_SLICE);
        assert!(assembler.params().has_both());
    }

    #[test]
    fn keyframe_without_parameter_sets_is_bare() {
        let mut assembler = AccessUnitAssembler::new();
        let unit = assembler.push(IDR).unwrap();
        assert!(unit.is_keyframe);
        assert_eq!(unit.data.as_ref(), IDR);
    }

    #[test]
    fn other_nal_types_are_discarded() {
        let mut assembler = AccessUnitAssembler::new();
        assert!(assembler.push(SEI).is_none());

        let unit = assembler.push(&[SEI, P_SLICE].concat()).unwrap();
        assert_eq!(unit.data.as_ref(), P_SLICE);
    }

    #[test]
    fn short_packets_are_rejected_without_touching_cache() {
        let mut assembler = AccessUnitAssembler::new();
        let packets: [&[u8]; 4] = [&[], &[0, 0, 1], &[0, 0, 1, 0x67], &[0, 0, 0, 1]];
        for packet in packets {
            assert!(assembler.push(packet).is_none());
        }
        assert!(assembler.params().sps().is_none());
        assert!(assembler.params().pps().is_none());
    }

    #[test]
    fn garbage_without_start_code_is_ignored() {
        let mut assembler = AccessUnitAssembler::new();
        assert!(assembler.push(&[0x65, 0x88, 0x84, 0x21, 0x10, 0x33]).is_none());
    }

    #[test]
    fn latest_parameter_sets_drive_configuration() {
        let mut assembler = AccessUnitAssembler::new();
        let sps_baseline: &[u8] = &[0, 0, 0, 1, 0x67, 0x42, 0xC0, 0x1F, 0x8C];
        let pps_b: &[u8] = &[0, 0, 0, 1, 0x68, 0xCE, 0x06, 0xE2];
        assembler.push(&[SPS, sps_baseline, PPS, pps_b].concat());

        assert_eq!(assembler.params().sps().unwrap().as_ref(), sps_baseline);
        assert_eq!(assembler.params().pps().unwrap().as_ref(), pps_b);
        assert_eq!(assembler.pending_config().unwrap().codec, "avc1.42c01f");
    }
}
