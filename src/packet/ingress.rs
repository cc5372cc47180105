//! Cross-thread packet handoff.
//!
//! The single place where packets cross a thread boundary: network
//! threads push parsed packets through cloneable writer handles, the
//! session driver drains them on its own thread. Bounded, FIFO per
//! producer, drop-oldest on overflow.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use super::Packet;

struct Shared {
    packets: VecDeque<Packet>,
    capacity: usize,
    dropped: u64,
}

/// Receiver end of the ingress queue. Owned by the session driver.
pub struct IngressQueue {
    shared: Arc<Mutex<Shared>>,
}

/// Producer handle. Clone freely and move to network threads.
#[derive(Clone)]
pub struct IngressWriter {
    shared: Arc<Mutex<Shared>>,
}

impl IngressQueue {
    /// Capacity 0 means unbounded.
    pub fn new(capacity: usize) -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared {
                packets: VecDeque::new(),
                capacity,
                dropped: 0,
            })),
        }
    }

    pub fn writer(&self) -> IngressWriter {
        IngressWriter {
            shared: self.shared.clone(),
        }
    }

    /// Pop the oldest pending packet.
    pub fn pop(&self) -> Option<Packet> {
        self.shared.lock().packets.pop_front()
    }

    pub fn len(&self) -> usize {
        self.shared.lock().packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Packets discarded because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.shared.lock().dropped
    }
}

impl IngressWriter {
    pub fn push(&self, packet: Packet) {
        let mut shared = self.shared.lock();
        if shared.capacity != 0 && shared.packets.len() >= shared.capacity {
            shared.packets.pop_front();
            shared.dropped += 1;
        }
        shared.packets.push_back(packet);
    }
}
