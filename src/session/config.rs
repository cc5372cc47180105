//! Receiver and session configuration.

use std::time::Duration;

use crate::audio::{
    LatencyMonitorConfig, ResamplerBackend, ResamplerProfile, SampleSpec, WatchdogConfig,
};
use crate::fec::{FecReaderConfig, FecScheme};
use crate::rtp::{ValidatorConfig, PAYLOAD_TYPE_L16_STEREO};

/// FEC block parameters negotiated for a stream.
#[derive(Debug, Clone)]
pub struct FecConfig {
    pub scheme: FecScheme,
    /// Source symbols per block (k).
    pub n_source_packets: usize,
    /// Repair symbols per block (m).
    pub n_repair_packets: usize,
}

impl Default for FecConfig {
    fn default() -> Self {
        Self {
            scheme: FecScheme::None,
            n_source_packets: 20,
            n_repair_packets: 10,
        }
    }
}

/// Per-session parameters, fixed at session creation.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// RTP payload type selecting the stream format.
    pub payload_type: u8,
    /// Desired playout buffer above the depacketizer read pointer.
    pub target_latency: Duration,
    pub fec: FecConfig,
    pub fec_reader: FecReaderConfig,
    pub rtp_validator: ValidatorConfig,
    pub watchdog: WatchdogConfig,
    pub latency_monitor: LatencyMonitorConfig,
    pub resampler_backend: ResamplerBackend,
    pub resampler_profile: ResamplerProfile,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            payload_type: PAYLOAD_TYPE_L16_STEREO,
            target_latency: Duration::from_millis(200),
            fec: FecConfig::default(),
            fec_reader: FecReaderConfig::default(),
            rtp_validator: ValidatorConfig::default(),
            watchdog: WatchdogConfig::default(),
            latency_monitor: LatencyMonitorConfig::default(),
            resampler_backend: ResamplerBackend::default(),
            resampler_profile: ResamplerProfile::default(),
        }
    }
}

/// Parameters shared by all sessions of a receiver.
#[derive(Debug, Clone)]
pub struct CommonConfig {
    /// Sample spec of the emitted frames.
    pub output_sample_spec: SampleSpec,
    /// Granularity of internal frame buffers.
    pub internal_frame_length: Duration,
    /// Enable the resampler (and with it, rate control).
    pub resampling: bool,
    /// Overwrite frame buffers with a sentinel before each read.
    pub poisoning: bool,
    /// Conceal with an audible marker tone instead of silence.
    pub beeping: bool,
}

impl Default for CommonConfig {
    fn default() -> Self {
        Self {
            output_sample_spec: SampleSpec::new(44100, 0x3),
            internal_frame_length: Duration::from_millis(10),
            resampling: false,
            poisoning: false,
            beeping: false,
        }
    }
}

/// Top-level receiver configuration.
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    pub common: CommonConfig,
    /// Template for lazily created sessions.
    pub default_session: SessionConfig,
    /// Bound on the cross-thread ingress queue, in packets. Zero means
    /// unbounded.
    pub ingress_queue_size: usize,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            common: CommonConfig::default(),
            default_session: SessionConfig::default(),
            ingress_queue_size: 1000,
        }
    }
}
