//! Payload codecs.
//!
//! Network byte order PCM, 16-bit signed. The decoder side feeds the
//! depacketizer; the encoder side exists for loopback and test senders.

use crate::audio::SampleSpec;

/// Decodes packet payload bytes into interleaved float samples.
pub trait PayloadDecoder {
    fn sample_spec(&self) -> SampleSpec;

    /// Number of samples per channel encoded in `payload`.
    fn decoded_sample_count(&self, payload: &[u8]) -> u32;

    /// Decode into `out`, returning the number of interleaved samples
    /// written. Truncates if `out` is too small.
    fn decode(&mut self, payload: &[u8], out: &mut [f32]) -> usize;
}

const PCM16_SCALE: f32 = 1.0 / 32768.0;

/// PCM 16-bit big-endian decoder.
pub struct Pcm16Decoder {
    spec: SampleSpec,
}

impl Pcm16Decoder {
    pub fn new(spec: SampleSpec) -> Self {
        Self { spec }
    }
}

impl PayloadDecoder for Pcm16Decoder {
    fn sample_spec(&self) -> SampleSpec {
        self.spec
    }

    fn decoded_sample_count(&self, payload: &[u8]) -> u32 {
        (payload.len() / 2 / self.spec.num_channels()) as u32
    }

    fn decode(&mut self, payload: &[u8], out: &mut [f32]) -> usize {
        let count = (payload.len() / 2).min(out.len());
        for i in 0..count {
            let sample = i16::from_be_bytes([payload[i * 2], payload[i * 2 + 1]]);
            out[i] = sample as f32 * PCM16_SCALE;
        }
        count
    }
}

/// Encode interleaved float samples as PCM 16-bit big-endian.
/// The inverse of [`Pcm16Decoder`].
pub fn encode_pcm16(samples: &[f32], out: &mut Vec<u8>) {
    out.reserve(samples.len() * 2);
    for &sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * 32767.0) as i16;
        out.extend_from_slice(&value.to_be_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_known_values() {
        let spec = SampleSpec::new(44100, 0x1);
        let mut decoder = Pcm16Decoder::new(spec);

        let payload = [0x7f, 0xff, 0x80, 0x00, 0x00, 0x00];
        let mut out = [0.0f32; 3];
        assert_eq!(decoder.decode(&payload, &mut out), 3);

        assert!((out[0] - 32767.0 / 32768.0).abs() < 1e-6);
        assert!((out[1] + 1.0).abs() < 1e-6);
        assert_eq!(out[2], 0.0);
    }

    #[test]
    fn sample_count_respects_channels() {
        let stereo = Pcm16Decoder::new(SampleSpec::new(44100, 0x3));
        assert_eq!(stereo.decoded_sample_count(&[0u8; 160]), 40);
        let mono = Pcm16Decoder::new(SampleSpec::new(44100, 0x1));
        assert_eq!(mono.decoded_sample_count(&[0u8; 160]), 80);
    }

    #[test]
    fn encode_decode_round_trip() {
        let spec = SampleSpec::new(44100, 0x1);
        let mut decoder = Pcm16Decoder::new(spec);

        let samples = [0.5f32, -0.25, 0.0, 0.999];
        let mut bytes = Vec::new();
        encode_pcm16(&samples, &mut bytes);

        let mut out = [0.0f32; 4];
        decoder.decode(&bytes, &mut out);
        for (a, b) in samples.iter().zip(out.iter()) {
            assert!((a - b).abs() < 1e-3);
        }
    }
}
