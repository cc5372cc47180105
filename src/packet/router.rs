//! Capability-based packet dispatch.

use log::debug;

use super::{Packet, PacketFlags, PacketWriter};

struct Route {
    writer: Box<dyn PacketWriter>,
    flags: PacketFlags,
}

/// Dispatches packets to the first route whose capability mask the
/// packet's flags contain. A packet matches at most one route; packets
/// matching none are dropped and counted.
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
    dropped: u64,
}

impl Router {
    pub fn new() -> Self {
        Self {
            routes: Vec::new(),
            dropped: 0,
        }
    }

    /// Register a writer for packets carrying all of `flags`.
    /// Fails if the same mask was already added.
    pub fn add_route(&mut self, writer: Box<dyn PacketWriter>, flags: PacketFlags) -> bool {
        if self.routes.iter().any(|r| r.flags == flags) {
            return false;
        }
        self.routes.push(Route { writer, flags });
        true
    }

    /// Number of packets that matched no route.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl PacketWriter for Router {
    fn write(&mut self, packet: Packet) {
        for route in &mut self.routes {
            if packet.flags.contains(route.flags) {
                route.writer.write(packet);
                return;
            }
        }
        self.dropped += 1;
        debug!("router: no route for packet flags {:?}", packet.flags);
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::packet::SortedQueue;
    use crate::rtp::test_packet_with_flags;

    #[test]
    fn dispatches_by_flags() {
        let audio = Rc::new(RefCell::new(SortedQueue::new(0)));
        let repair = Rc::new(RefCell::new(SortedQueue::new(0)));

        let mut router = Router::new();
        assert!(router.add_route(Box::new(audio.clone()), PacketFlags::AUDIO));
        assert!(router.add_route(Box::new(repair.clone()), PacketFlags::REPAIR));

        router.write(test_packet_with_flags(1, 0, PacketFlags::RTP | PacketFlags::AUDIO));
        router.write(test_packet_with_flags(2, 0, PacketFlags::RTP | PacketFlags::REPAIR));

        assert_eq!(audio.borrow().size(), 1);
        assert_eq!(repair.borrow().size(), 1);
    }

    #[test]
    fn counts_unroutable_packets() {
        let mut router = Router::new();
        router.write(test_packet_with_flags(1, 0, PacketFlags::RTP));
        assert_eq!(router.dropped(), 1);
    }

    #[test]
    fn rejects_duplicate_mask() {
        let q = Rc::new(RefCell::new(SortedQueue::new(0)));
        let mut router = Router::new();
        assert!(router.add_route(Box::new(q.clone()), PacketFlags::AUDIO));
        assert!(!router.add_route(Box::new(q), PacketFlags::AUDIO));
    }
}
