//! Annex-B NAL unit scanning and classification.
//!
//! Units are reported as byte ranges into the caller's buffer and always
//! include their own start code, so concatenating the ranges of a split
//! reproduces the scanned buffer (minus any leading bytes before the first
//! start code).

use std::fmt;

pub const SLICE_NALU_TYPE: u8 = 1;
pub const IDR_NALU_TYPE: u8 = 5;
pub const SPS_NALU_TYPE: u8 = 7;
pub const PPS_NALU_TYPE: u8 = 8;

pub const NALU_TYPE_BITMASK: u8 = 0x1F;

/// Shortest unit (start code included) worth classifying.
pub const MIN_NALU_LEN: usize = 4;

const START_CODE_4: &[u8] = &[0x00, 0x00, 0x00, 0x01];
const START_CODE_3: &[u8] = &[0x00, 0x00, 0x01];

/// Returns the length of the start code at the front of `data`, preferring
/// the 4-byte form.
pub fn start_code_len(data: &[u8]) -> Option<usize> {
    if data.starts_with(START_CODE_4) {
        Some(START_CODE_4.len())
    } else if data.starts_with(START_CODE_3) {
        Some(START_CODE_3.len())
    } else {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NalRange {
    pub start: usize,
    pub end: usize,
}

impl NalRange {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn slice<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        &data[self.start..self.end]
    }
}

/// Iterator over the start-code-delimited units of a buffer.
///
/// A buffer without any start code yields nothing. Bytes preceding the first
/// start code are skipped.
pub struct NalSplitter<'a> {
    data: &'a [u8],
    pos: usize,
    current: Option<usize>,
}

impl<'a> NalSplitter<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        let mut splitter = Self {
            data,
            pos: data.len(),
            current: None,
        };

        for i in 0..data.len() {
            if let Some(len) = start_code_len(&data[i..]) {
                splitter.current = Some(i);
                splitter.pos = i + len;
                break;
            }
        }

        splitter
    }
}

impl Iterator for NalSplitter<'_> {
    type Item = NalRange;

    fn next(&mut self) -> Option<Self::Item> {
        let start = self.current?;

        while self.pos < self.data.len() {
            if let Some(len) = start_code_len(&self.data[self.pos..]) {
                let range = NalRange {
                    start,
                    end: self.pos,
                };
                self.current = Some(self.pos);
                self.pos += len;
                return Some(range);
            }
            self.pos += 1;
        }

        self.current = None;
        Some(NalRange {
            start,
            end: self.data.len(),
        })
    }
}

pub fn split_nal_units(data: &[u8]) -> NalSplitter<'_> {
    NalSplitter::new(data)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NalType {
    Slice,
    Idr,
    Sps,
    Pps,
    Other(u8),
}

impl From<u8> for NalType {
    fn from(header: u8) -> Self {
        match header & NALU_TYPE_BITMASK {
            SLICE_NALU_TYPE => NalType::Slice,
            IDR_NALU_TYPE => NalType::Idr,
            SPS_NALU_TYPE => NalType::Sps,
            PPS_NALU_TYPE => NalType::Pps,
            t => NalType::Other(t),
        }
    }
}

impl NalType {
    pub fn is_slice(self) -> bool {
        matches!(self, NalType::Slice | NalType::Idr)
    }
}

/// The three SPS bytes that make up an `avc1` codec string.
///
/// They are read at a fixed offset right after the NAL header. This holds
/// for the SPS layout emitted by the device encoder (profile_idc,
/// constraint flags and level_idc are the first three fields and are not
/// Exp-Golomb coded); it is not a general SPS parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpsProfile {
    pub profile_idc: u8,
    pub constraint_flags: u8,
    pub level_idc: u8,
}

impl SpsProfile {
    pub fn codec_string(&self) -> String {
        format!(
            "avc1.{}",
            hex::encode([self.profile_idc, self.constraint_flags, self.level_idc])
        )
    }
}

impl fmt::Display for SpsProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.codec_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassifiedNal {
    pub nal_type: NalType,
    /// Offset of the NAL header byte, i.e. the start code length.
    pub header_offset: usize,
    /// Present only for an SPS long enough to carry the profile bytes.
    pub profile: Option<SpsProfile>,
}

/// Classifies one unit that still carries its start code.
///
/// Returns `None` when the unit has no start code or no header byte.
pub fn classify(unit: &[u8]) -> Option<ClassifiedNal> {
    let header_offset = start_code_len(unit)?;
    let header = *unit.get(header_offset)?;
    let nal_type = NalType::from(header);

    let profile = match nal_type {
        NalType::Sps => match unit.get(header_offset + 1..header_offset + 4) {
            Some(&[profile_idc, constraint_flags, level_idc]) => Some(SpsProfile {
                profile_idc,
                constraint_flags,
                level_idc,
            }),
            _ => None,
        },
        _ => None,
    };

    Some(ClassifiedNal {
        nal_type,
        header_offset,
        profile,
    })
}
