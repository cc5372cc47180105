//! Sample stream parameters.

use std::time::Duration;

/// Sample rate plus channel mask. The channel count is the mask's
/// population count; bit 0 is the leftmost channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleSpec {
    sample_rate: u32,
    channel_mask: u32,
}

impl SampleSpec {
    pub const fn new(sample_rate: u32, channel_mask: u32) -> Self {
        Self {
            sample_rate,
            channel_mask,
        }
    }

    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub const fn channel_mask(&self) -> u32 {
        self.channel_mask
    }

    pub const fn num_channels(&self) -> usize {
        self.channel_mask.count_ones() as usize
    }

    /// Convert a duration to samples per channel, rounding to nearest.
    pub fn duration_to_samples(&self, duration: Duration) -> u32 {
        (duration.as_secs_f64() * self.sample_rate as f64).round() as u32
    }

    /// Convert samples per channel to a duration.
    pub fn samples_to_duration(&self, samples: u32) -> Duration {
        Duration::from_secs_f64(samples as f64 / self.sample_rate as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_count_from_mask() {
        assert_eq!(SampleSpec::new(44100, 0x1).num_channels(), 1);
        assert_eq!(SampleSpec::new(44100, 0x3).num_channels(), 2);
        assert_eq!(SampleSpec::new(48000, 0x3f).num_channels(), 6);
    }

    #[test]
    fn duration_conversions() {
        let spec = SampleSpec::new(44100, 0x3);
        assert_eq!(spec.duration_to_samples(Duration::from_secs(1)), 44100);
        assert_eq!(spec.duration_to_samples(Duration::from_millis(10)), 441);
        assert_eq!(
            spec.samples_to_duration(44100),
            Duration::from_secs(1)
        );
    }
}
