use bytes::Bytes;

use crate::decoder::DecoderConfig;
use crate::nal::SpsProfile;

/// Most recent SPS and PPS seen on a stream, plus whether the decoder has
/// already been configured from them. Last write wins; no history is kept.
#[derive(Debug, Default)]
pub struct ParameterSetCache {
    sps: Option<Bytes>,
    pps: Option<Bytes>,
    profile: Option<SpsProfile>,
    configured: bool,
}

impl ParameterSetCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a whole SPS unit, start code included.
    pub fn set_sps(&mut self, unit: &[u8], profile: Option<SpsProfile>) {
        self.sps = Some(Bytes::copy_from_slice(unit));
        self.profile = profile;
    }

    /// Stores a whole PPS unit, start code included.
    pub fn set_pps(&mut self, unit: &[u8]) {
        self.pps = Some(Bytes::copy_from_slice(unit));
    }

    pub fn sps(&self) -> Option<&Bytes> {
        self.sps.as_ref()
    }

    pub fn pps(&self) -> Option<&Bytes> {
        self.pps.as_ref()
    }

    pub fn profile(&self) -> Option<SpsProfile> {
        self.profile
    }

    pub fn has_both(&self) -> bool {
        self.sps.is_some() && self.pps.is_some()
    }

    pub fn is_configured(&self) -> bool {
        self.configured
    }

    /// Builds the one-time decoder configuration if both parameter sets are
    /// cached, the SPS carried readable profile bytes and no configuration
    /// has been accepted yet.
    pub fn pending_config(&self) -> Option<DecoderConfig> {
        if self.configured || !self.has_both() {
            return None;
        }
        self.profile.map(|profile| DecoderConfig::low_latency(profile.codec_string()))
    }

    pub fn mark_configured(&mut self) {
        debug_assert!(self.has_both(), "configured without parameter sets");
        self.configured = true;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
