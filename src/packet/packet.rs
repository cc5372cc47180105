//! The packet record transported by the packet-domain stages.

use std::fmt;
use std::net::SocketAddr;

use bytes::Bytes;

use super::{Seqnum, Timestamp};

/// Capability bitmask describing what a packet carries.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct PacketFlags(u16);

impl PacketFlags {
    /// Delivered over UDP (source/destination addresses are meaningful).
    pub const UDP: PacketFlags = PacketFlags(1 << 0);
    /// Carries a parsed RTP header.
    pub const RTP: PacketFlags = PacketFlags(1 << 1);
    /// Carries audio payload.
    pub const AUDIO: PacketFlags = PacketFlags(1 << 2);
    /// Carries a repair symbol.
    pub const REPAIR: PacketFlags = PacketFlags(1 << 3);
    /// Carries FEC block coordinates.
    pub const FEC: PacketFlags = PacketFlags(1 << 4);
    /// Reconstructed by the FEC reader rather than received off the wire.
    pub const RESTORED: PacketFlags = PacketFlags(1 << 5);

    pub fn empty() -> Self {
        PacketFlags(0)
    }

    pub fn contains(self, other: PacketFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersects(self, other: PacketFlags) -> bool {
        self.0 & other.0 != 0
    }
}

impl std::ops::BitOr for PacketFlags {
    type Output = PacketFlags;
    fn bitor(self, rhs: PacketFlags) -> PacketFlags {
        PacketFlags(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for PacketFlags {
    fn bitor_assign(&mut self, rhs: PacketFlags) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for PacketFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PacketFlags({:#06x})", self.0)
    }
}

/// Parsed RTP view of a packet.
#[derive(Debug, Clone)]
pub struct RtpFields {
    pub seqnum: Seqnum,
    pub timestamp: Timestamp,
    pub ssrc: u32,
    pub payload_type: u8,
    pub marker: bool,
    /// Payload duration in samples per channel. Zero until the populator
    /// derives it from the payload decoder.
    pub duration: u32,
    /// Audio payload bytes (refcounted view into the datagram).
    pub payload: Bytes,
}

/// Parsed FEC block coordinates of a packet.
///
/// The core treats these as opaque coordinates; codec bodies interpret
/// the symbol contents.
#[derive(Debug, Clone)]
pub struct FecFields {
    pub source_block_number: u16,
    pub encoding_symbol_id: u16,
    /// Number of source symbols in the block (k).
    pub source_block_length: u16,
    /// Total symbols in the block (k + m).
    pub block_length: u16,
    /// Repair symbol bytes (empty on source packets).
    pub repair_payload: Bytes,
}

/// A received (or recovered) media packet.
///
/// Cloning is cheap: header fields are copied, payload bytes are
/// reference-counted slices of the original datagram.
#[derive(Debug, Clone)]
pub struct Packet {
    pub flags: PacketFlags,
    pub rtp: Option<RtpFields>,
    pub fec: Option<FecFields>,
    /// Entire datagram payload as received. FEC symbols for source
    /// packets are these bytes.
    pub raw: Bytes,
    pub src_addr: SocketAddr,
    pub dst_addr: SocketAddr,
}

impl Packet {
    /// RTP sequence number; panics if the packet has no RTP view.
    pub fn seqnum(&self) -> Seqnum {
        self.rtp.as_ref().expect("packet has no rtp fields").seqnum
    }

    /// RTP timestamp; panics if the packet has no RTP view.
    pub fn timestamp(&self) -> Timestamp {
        self.rtp.as_ref().expect("packet has no rtp fields").timestamp
    }

    /// Timestamp just past the packet's payload.
    pub fn end_timestamp(&self) -> Timestamp {
        let rtp = self.rtp.as_ref().expect("packet has no rtp fields");
        rtp.timestamp.wrapping_add(rtp.duration)
    }
}
