//! Per-source session: chain assembly and lifecycle.
//!
//! A session owns the complete reader chain for one remote sender:
//!
//! ```text
//! source queue -> validator -> populator -> delayed reader
//!   [-> fec reader (+ repair queue) -> validator]
//!   -> depacketizer [-> watchdog] [-> channel mapper]
//!   [-> poisoner -> resampler reader] [-> poisoner]
//! ```
//!
//! plus the latency monitor observing the source queue and the
//! depacketizer from the side. Stages are wired at construction; any
//! stage that cannot be built fails the whole session and the caller
//! discards it.

use std::cell::RefCell;
use std::fmt;
use std::net::SocketAddr;
use std::rc::Rc;

use log::debug;

use crate::audio::{
    new_resampler, ChannelMapperReader, Depacketizer, FrameReader, LatencyMonitor,
    PoisonReader, ResamplerReader, SampleSpec, Watchdog,
};
use crate::fec::{CodecMap, FecReader, FecScheme};
use crate::packet::{
    DelayedReader, Packet, PacketFlags, PacketReader, Router, SortedQueue, Timestamp,
};
use crate::rtp::{FormatMap, Populator, Validator};

use super::{CommonConfig, SessionConfig};

/// Why a session could not be built.
#[derive(Debug)]
pub enum SessionError {
    /// No format registered for the configured payload type.
    UnknownPayloadType(u8),
    /// No codec registered for the configured FEC scheme.
    UnsupportedFecScheme(FecScheme),
    /// A channel mask with no channels on either side.
    InvalidChannelMask(u32),
    /// The configured resampler backend is not available.
    ResamplerUnavailable,
    /// Router route conflict.
    DuplicateRoute,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::UnknownPayloadType(pt) => {
                write!(f, "unknown payload type {}", pt)
            }
            SessionError::UnsupportedFecScheme(scheme) => {
                write!(f, "unsupported fec scheme {}", scheme)
            }
            SessionError::InvalidChannelMask(mask) => {
                write!(f, "invalid channel mask {:#x}", mask)
            }
            SessionError::ResamplerUnavailable => {
                write!(f, "resampler backend not available")
            }
            SessionError::DuplicateRoute => write!(f, "duplicate router route"),
        }
    }
}

impl std::error::Error for SessionError {}

/// Receiver-side state for one remote source address.
pub struct Session {
    src_addr: SocketAddr,
    router: Router,
    latency_monitor: LatencyMonitor,
    watchdog: Option<Rc<RefCell<Watchdog>>>,
    reader: Box<dyn FrameReader>,
}

impl Session {
    pub fn new(
        config: &SessionConfig,
        common: &CommonConfig,
        src_addr: SocketAddr,
        format_map: &FormatMap,
        codec_map: &CodecMap,
    ) -> Result<Self, SessionError> {
        let format = format_map
            .format(config.payload_type)
            .ok_or(SessionError::UnknownPayloadType(config.payload_type))?;

        let in_spec = format.sample_spec;
        if in_spec.num_channels() == 0 {
            return Err(SessionError::InvalidChannelMask(in_spec.channel_mask()));
        }
        if common.output_sample_spec.num_channels() == 0 {
            return Err(SessionError::InvalidChannelMask(
                common.output_sample_spec.channel_mask(),
            ));
        }

        let target_latency = in_spec.duration_to_samples(config.target_latency);
        let internal_frame =
            in_spec.duration_to_samples(common.internal_frame_length).max(1) as usize;

        let mut router = Router::new();

        let source_queue = Rc::new(RefCell::new(SortedQueue::new(0)));
        if !router.add_route(Box::new(source_queue.clone()), PacketFlags::AUDIO) {
            return Err(SessionError::DuplicateRoute);
        }

        let mut preader: Box<dyn PacketReader> = Box::new(source_queue.clone());

        preader = Box::new(Validator::new(
            preader,
            &config.rtp_validator,
            config.payload_type,
            in_spec,
        ));

        preader = Box::new(Populator::new(preader, format.new_decoder()));

        preader = Box::new(DelayedReader::new(preader, target_latency));

        if config.fec.scheme != FecScheme::None {
            let repair_capacity =
                config.fec_reader.max_pending_blocks * config.fec.n_repair_packets;
            let repair_queue = Rc::new(RefCell::new(SortedQueue::new(repair_capacity)));
            if !router.add_route(Box::new(repair_queue.clone()), PacketFlags::REPAIR) {
                return Err(SessionError::DuplicateRoute);
            }

            let codec = codec_map
                .new_codec(config.fec.scheme)
                .ok_or(SessionError::UnsupportedFecScheme(config.fec.scheme))?;

            preader = Box::new(FecReader::new(
                preader,
                Box::new(repair_queue),
                codec,
                &config.fec_reader,
                config.fec.n_source_packets,
                config.fec.n_repair_packets,
            ));

            // recovered packets go through the same checks as received
            // ones
            preader = Box::new(Validator::new(
                preader,
                &config.rtp_validator,
                config.payload_type,
                in_spec,
            ));
        }

        let depacketizer = Rc::new(RefCell::new(Depacketizer::new(
            preader,
            format.new_decoder(),
            in_spec,
            common.beeping,
        )));

        let mut areader: Box<dyn FrameReader> = Box::new(depacketizer.clone());

        let watchdog = if !config.watchdog.no_playback_timeout.is_zero()
            || !config.watchdog.broken_playback_timeout.is_zero()
        {
            let watchdog = Rc::new(RefCell::new(Watchdog::new(
                areader,
                &config.watchdog,
                in_spec,
            )));
            areader = Box::new(watchdog.clone());
            Some(watchdog)
        } else {
            None
        };

        let out_mask = common.output_sample_spec.channel_mask();
        if in_spec.channel_mask() != out_mask {
            areader = Box::new(ChannelMapperReader::new(
                areader,
                in_spec,
                SampleSpec::new(in_spec.sample_rate(), out_mask),
                internal_frame,
            ));
        }

        let resampler_reader = if common.resampling {
            if common.poisoning {
                areader = Box::new(PoisonReader::new(areader));
            }

            let resampler_in_spec = SampleSpec::new(in_spec.sample_rate(), out_mask);
            let resampler = new_resampler(
                config.resampler_backend,
                config.resampler_profile,
                resampler_in_spec,
                common.output_sample_spec,
            )
            .ok_or(SessionError::ResamplerUnavailable)?;

            let reader = Rc::new(RefCell::new(ResamplerReader::new(
                areader,
                resampler,
                resampler_in_spec,
                common.output_sample_spec,
                internal_frame,
            )));
            areader = Box::new(reader.clone());
            Some(reader)
        } else {
            None
        };

        if common.poisoning {
            areader = Box::new(PoisonReader::new(areader));
        }

        let latency_monitor = LatencyMonitor::new(
            source_queue,
            depacketizer,
            resampler_reader,
            &config.latency_monitor,
            target_latency,
            in_spec,
        );

        debug!(
            "session: created for {} (pt={}, target latency {} samples)",
            src_addr, config.payload_type, target_latency
        );

        Ok(Self {
            src_addr,
            router,
            latency_monitor,
            watchdog,
            reader: areader,
        })
    }

    pub fn src_addr(&self) -> SocketAddr {
        self.src_addr
    }

    /// Measured latency at the last advance, in source samples.
    pub fn latency(&self) -> i64 {
        self.latency_monitor.latency()
    }

    /// Route one packet into the session. Returns `false` for packets
    /// that do not belong to this session's source.
    pub fn handle(&mut self, packet: Packet) -> bool {
        use crate::packet::PacketWriter;

        if !packet.flags.contains(PacketFlags::UDP) {
            return false;
        }
        if packet.src_addr != self.src_addr {
            return false;
        }
        self.router.write(packet);
        true
    }

    /// Drive the watchdog and the latency monitor. Returns `false`
    /// when the session must be terminated by the caller.
    pub fn advance(&mut self, ts: Timestamp) -> bool {
        if let Some(watchdog) = &self.watchdog {
            if !watchdog.borrow_mut().update() {
                return false;
            }
        }
        self.latency_monitor.update(ts)
    }

    /// Reserved for cross-session NTP alignment.
    pub fn reclock(&mut self, _ntp_ts: u64) -> bool {
        true
    }

    /// Terminal frame reader of the chain.
    pub fn reader(&mut self) -> &mut dyn FrameReader {
        self.reader.as_mut()
    }
}
