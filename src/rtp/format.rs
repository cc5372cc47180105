//! Payload-type descriptors.
//!
//! A `Format` binds an RTP payload type to a sample spec and a decoder
//! constructor. The static payload types from RFC 3551 that this crate
//! supports are registered by default; dynamic types can be added on top.

use std::collections::HashMap;

use crate::audio::{Pcm16Decoder, PayloadDecoder, SampleSpec};

/// L16 stereo at 44100 Hz (RFC 3551).
pub const PAYLOAD_TYPE_L16_STEREO: u8 = 10;
/// L16 mono at 44100 Hz (RFC 3551).
pub const PAYLOAD_TYPE_L16_MONO: u8 = 11;

/// Descriptor for one RTP payload type.
pub struct Format {
    pub payload_type: u8,
    pub sample_spec: SampleSpec,
    new_decoder: fn(SampleSpec) -> Box<dyn PayloadDecoder>,
}

impl Format {
    pub fn new_decoder(&self) -> Box<dyn PayloadDecoder> {
        (self.new_decoder)(self.sample_spec)
    }
}

/// Registry of known payload types.
pub struct FormatMap {
    formats: HashMap<u8, Format>,
}

impl FormatMap {
    /// Map with the built-in L16 formats registered.
    pub fn new() -> Self {
        let mut map = Self {
            formats: HashMap::new(),
        };
        map.add(Format {
            payload_type: PAYLOAD_TYPE_L16_STEREO,
            sample_spec: SampleSpec::new(44100, 0x3),
            new_decoder: |spec| Box::new(Pcm16Decoder::new(spec)),
        });
        map.add(Format {
            payload_type: PAYLOAD_TYPE_L16_MONO,
            sample_spec: SampleSpec::new(44100, 0x1),
            new_decoder: |spec| Box::new(Pcm16Decoder::new(spec)),
        });
        map
    }

    /// Register or replace a format.
    pub fn add(&mut self, format: Format) {
        self.formats.insert(format.payload_type, format);
    }

    pub fn format(&self, payload_type: u8) -> Option<&Format> {
        self.formats.get(&payload_type)
    }
}

impl Default for FormatMap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn built_in_formats_present() {
        let map = FormatMap::new();
        let stereo = map.format(PAYLOAD_TYPE_L16_STEREO).unwrap();
        assert_eq!(stereo.sample_spec.num_channels(), 2);
        assert_eq!(stereo.sample_spec.sample_rate(), 44100);
        assert!(map.format(96).is_none());
    }

    #[test]
    fn decoder_matches_spec() {
        let map = FormatMap::new();
        let format = map.format(PAYLOAD_TYPE_L16_MONO).unwrap();
        let decoder = format.new_decoder();
        assert_eq!(decoder.sample_spec().num_channels(), 1);
    }
}
