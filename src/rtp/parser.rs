//! Datagram-to-packet parsing.

use std::net::SocketAddr;

use bytes::Bytes;
use log::debug;

use crate::fec::FecHeader;
use crate::packet::{FecFields, Packet, PacketFlags, RtpFields};

use super::RtpHeader;

/// Parses datagrams arriving on one endpoint into packets, attaching
/// the capability flags the router dispatches on.
pub struct Parser {
    flags: PacketFlags,
    has_fec: bool,
}

impl Parser {
    /// Parser for the audio source endpoint. `fec` selects whether
    /// source packets carry the FEC block-coordinate header.
    pub fn new_source(fec: bool) -> Self {
        let mut flags = PacketFlags::UDP | PacketFlags::RTP | PacketFlags::AUDIO;
        if fec {
            flags |= PacketFlags::FEC;
        }
        Self {
            flags,
            has_fec: fec,
        }
    }

    /// Parser for the repair endpoint. Repair packets always carry the
    /// FEC header.
    pub fn new_repair() -> Self {
        Self {
            flags: PacketFlags::UDP | PacketFlags::RTP | PacketFlags::REPAIR | PacketFlags::FEC,
            has_fec: true,
        }
    }

    /// Parse one datagram. Returns `None` if it is not a well-formed
    /// packet for this endpoint.
    pub fn parse(&self, src_addr: SocketAddr, dst_addr: SocketAddr, data: &[u8]) -> Option<Packet> {
        let header = RtpHeader::parse(data)?;
        let mut offset = header.payload_offset(data)?;
        let end = header.payload_end(data)?;
        if offset > end {
            return None;
        }

        let raw = Bytes::copy_from_slice(data);

        let fec = if self.has_fec {
            let fec_header = FecHeader::parse(&raw[offset..end])?;
            offset += FecHeader::SIZE;
            Some(fec_header)
        } else {
            None
        };

        let payload = raw.slice(offset..end);
        if payload.is_empty() {
            debug!("parser: dropping empty packet seq={}", header.seqnum);
            return None;
        }

        let is_repair = self.flags.contains(PacketFlags::REPAIR);

        Some(Packet {
            flags: self.flags,
            rtp: Some(RtpFields {
                seqnum: header.seqnum,
                timestamp: header.timestamp,
                ssrc: header.ssrc,
                payload_type: header.payload_type,
                marker: header.marker,
                duration: 0,
                payload: if is_repair { Bytes::new() } else { payload.clone() },
            }),
            fec: fec.map(|h| FecFields {
                source_block_number: h.source_block_number,
                encoding_symbol_id: h.encoding_symbol_id,
                source_block_length: h.source_block_length,
                block_length: h.block_length,
                repair_payload: if is_repair { payload } else { Bytes::new() },
            }),
            raw,
            src_addr,
            dst_addr,
        })
    }
}
