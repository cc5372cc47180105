//! The session set: ingress, demultiplexing, lifecycle and mixed
//! output.

use std::net::SocketAddr;

use log::{debug, info, warn};

use crate::audio::{Frame, Mixer};
use crate::fec::{CodecMap, FecScheme};
use crate::packet::{IngressQueue, IngressWriter, Packet, Timestamp};
use crate::rtp::{FormatMap, Parser};

use super::{ReceiverConfig, Session};

/// Which endpoint a datagram arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interface {
    AudioSource,
    AudioRepair,
}

/// Parsing front end for one receive socket. Cloneable and `Send`:
/// network threads hold these, parse datagrams in place and push the
/// packets across the ingress boundary.
#[derive(Clone)]
pub struct PacketEndpoint {
    parser: std::sync::Arc<Parser>,
    writer: IngressWriter,
    dst_addr: SocketAddr,
}

impl PacketEndpoint {
    /// Parse and enqueue one datagram. Returns `false` if it was not a
    /// well-formed packet for this endpoint.
    pub fn write(&self, src_addr: SocketAddr, data: &[u8]) -> bool {
        match self.parser.parse(src_addr, self.dst_addr, data) {
            Some(packet) => {
                self.writer.push(packet);
                true
            }
            None => {
                debug!("endpoint {}: malformed datagram dropped", self.dst_addr);
                false
            }
        }
    }
}

/// The receiver: owns all sessions, demultiplexes inbound packets by
/// source address, and serves the mixed output frame stream.
///
/// `read` and the endpoint writers may run on different threads; the
/// ingress queue is the only crossing point. Everything else is
/// single-threaded.
pub struct Receiver {
    config: ReceiverConfig,
    format_map: FormatMap,
    codec_map: CodecMap,
    ingress: IngressQueue,
    sessions: Vec<Session>,
    mixer: Mixer,
    timestamp: Timestamp,
}

impl Receiver {
    pub fn new(config: ReceiverConfig, format_map: FormatMap, codec_map: CodecMap) -> Self {
        let ingress = IngressQueue::new(config.ingress_queue_size);
        Self {
            config,
            format_map,
            codec_map,
            ingress,
            sessions: Vec::new(),
            mixer: Mixer::new(),
            timestamp: 0,
        }
    }

    /// Create the parsing front end for one receive socket.
    pub fn endpoint(&self, iface: Interface, dst_addr: SocketAddr) -> PacketEndpoint {
        let parser = match iface {
            Interface::AudioSource => {
                Parser::new_source(self.config.default_session.fec.scheme != FecScheme::None)
            }
            Interface::AudioRepair => Parser::new_repair(),
        };
        PacketEndpoint {
            parser: std::sync::Arc::new(parser),
            writer: self.ingress.writer(),
            dst_addr,
        }
    }

    pub fn num_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Latency of each live session, for monitoring.
    pub fn session_latencies(&self) -> Vec<(SocketAddr, i64)> {
        self.sessions
            .iter()
            .map(|s| (s.src_addr(), s.latency()))
            .collect()
    }

    fn route_packet(&mut self, packet: Packet) {
        for session in &mut self.sessions {
            if session.src_addr() == packet.src_addr {
                session.handle(packet);
                return;
            }
        }

        let src_addr = packet.src_addr;
        match Session::new(
            &self.config.default_session,
            &self.config.common,
            src_addr,
            &self.format_map,
            &self.codec_map,
        ) {
            Ok(mut session) => {
                info!("receiver: creating session for {}", src_addr);
                session.handle(packet);
                self.sessions.push(session);
            }
            Err(err) => {
                warn!("receiver: cannot create session for {}: {}", src_addr, err);
            }
        }
    }

    /// Reserved for cross-session NTP alignment.
    pub fn reclock(&mut self, ntp_ts: u64) {
        for session in &mut self.sessions {
            session.reclock(ntp_ts);
        }
    }

    /// Read one mixed output frame. Drains the ingress queue, drives
    /// each session's watchdog and latency monitor (terminating dead
    /// sessions), then mixes the per-session outputs. With no live
    /// sessions the frame is silence.
    pub fn read(&mut self, frame: &mut Frame<'_>) {
        while let Some(packet) = self.ingress.pop() {
            self.route_packet(packet);
        }

        let ts = self.timestamp;
        self.sessions.retain_mut(|session| {
            let alive = session.advance(ts);
            if !alive {
                info!("receiver: terminating session for {}", session.src_addr());
            }
            alive
        });

        self.mixer
            .mix(self.sessions.iter_mut().map(|s| s.reader()), frame);

        let channels = self.config.common.output_sample_spec.num_channels();
        self.timestamp = self
            .timestamp
            .wrapping_add((frame.num_samples() / channels) as u32);
    }
}
