//! Packet-domain types and stages: the packet model, sorted jitter queue,
//! capability router, initial-delay reader and the cross-thread ingress
//! queue.

mod delayed;
mod ingress;
mod queue;
mod router;

#[allow(clippy::module_inception)]
mod packet;

pub use delayed::DelayedReader;
pub use ingress::{IngressQueue, IngressWriter};
pub use packet::{FecFields, Packet, PacketFlags, RtpFields};
pub use queue::SortedQueue;
pub use router::Router;

use std::cell::RefCell;
use std::rc::Rc;

/// RTP sequence number (16-bit, wrapping).
pub type Seqnum = u16;

/// Stream timestamp in samples per channel (32-bit, wrapping).
pub type Timestamp = u32;

/// Signed distance from `b` to `a` over the 16-bit sequence space.
/// Positive means `a` is ahead of `b`.
pub fn seqnum_diff(a: Seqnum, b: Seqnum) -> i32 {
    a.wrapping_sub(b) as i16 as i32
}

/// Signed distance from `b` to `a` over the 32-bit timestamp space.
pub fn timestamp_diff(a: Timestamp, b: Timestamp) -> i64 {
    a.wrapping_sub(b) as i32 as i64
}

/// Pull side of a packet-domain stage.
pub trait PacketReader {
    /// Return the next packet, or `None` if nothing is available
    /// or the stage has failed terminally.
    fn read(&mut self) -> Option<Packet>;
}

/// Push side of a packet-domain stage.
pub trait PacketWriter {
    fn write(&mut self, packet: Packet);
}

impl<R: PacketReader> PacketReader for Rc<RefCell<R>> {
    fn read(&mut self) -> Option<Packet> {
        self.borrow_mut().read()
    }
}

impl<W: PacketWriter> PacketWriter for Rc<RefCell<W>> {
    fn write(&mut self, packet: Packet) {
        self.borrow_mut().write(packet)
    }
}
