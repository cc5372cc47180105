//! Receiver-side pipeline for real-time network audio streaming.
//!
//! Ingests RTP media packets (optionally FEC-protected), reorders and
//! repairs them, decodes payloads into PCM frames, compensates jitter via
//! a delay buffer, and keeps playout latency on target by driving a
//! resampler from a closed-loop latency monitor.
//!
//! The crate is organized as a pull graph: the output sink reads frames
//! from the terminal reader of a per-session chain, and each stage pulls
//! from its upstream on demand. Packet ingress is push-based and crosses
//! exactly one thread boundary (the ingress queue feeding the router).
//!
//! ```text
//! UDP -> endpoint -> ingress -> Receiver -> per-session chain -> frames
//! ```

pub mod audio;
pub mod fec;
pub mod packet;
pub mod rtp;
pub mod session;

pub use audio::{Frame, FrameFlags, FrameReader, SampleSpec};
pub use packet::{Packet, PacketFlags, PacketReader, PacketWriter};
pub use session::{CommonConfig, Receiver, ReceiverConfig, SessionConfig};
