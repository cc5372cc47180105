//! Initial playout delay.
//!
//! Establishes the target latency before the first packet is released
//! downstream: packets are absorbed until the buffered duration reaches
//! the target, then the buffer drains and the stage becomes a
//! passthrough.

use std::collections::VecDeque;

use log::debug;

use super::{timestamp_diff, Packet, PacketReader};

enum State {
    Filling,
    Draining,
}

/// Buffers an initial prefix of the packet stream until `target_latency`
/// samples (per channel) are on hand, then yields them and passes
/// everything else through.
pub struct DelayedReader {
    upstream: Box<dyn PacketReader>,
    buffer: VecDeque<Packet>,
    target_latency: u32,
    state: State,
}

impl DelayedReader {
    pub fn new(upstream: Box<dyn PacketReader>, target_latency: u32) -> Self {
        Self {
            upstream,
            buffer: VecDeque::new(),
            target_latency,
            state: State::Filling,
        }
    }

    /// Buffered duration in samples per channel, measured from the head
    /// packet's timestamp to the end of the tail packet.
    fn buffered_duration(&self) -> i64 {
        match (self.buffer.front(), self.buffer.back()) {
            (Some(head), Some(tail)) => {
                timestamp_diff(tail.end_timestamp(), head.timestamp())
            }
            _ => 0,
        }
    }

    fn fetch(&mut self) {
        while let Some(packet) = self.upstream.read() {
            self.buffer.push_back(packet);
        }
    }
}

impl PacketReader for DelayedReader {
    fn read(&mut self) -> Option<Packet> {
        match self.state {
            State::Filling => {
                self.fetch();
                if self.buffered_duration() >= self.target_latency as i64 {
                    debug!(
                        "delayed reader: buffered {} samples, starting playout",
                        self.buffered_duration()
                    );
                    self.state = State::Draining;
                    self.buffer.pop_front()
                } else {
                    None
                }
            }
            State::Draining => match self.buffer.pop_front() {
                Some(packet) => Some(packet),
                None => self.upstream.read(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::packet::{PacketWriter, SortedQueue};
    use crate::rtp::test_packet_with_duration;

    const SAMPLES_PER_PACKET: u32 = 40;

    fn queue_and_reader(target: u32) -> (Rc<RefCell<SortedQueue>>, DelayedReader) {
        let queue = Rc::new(RefCell::new(SortedQueue::new(0)));
        let reader = DelayedReader::new(Box::new(queue.clone()), target);
        (queue, reader)
    }

    fn push(queue: &Rc<RefCell<SortedQueue>>, seq: u16) {
        queue.borrow_mut().write(test_packet_with_duration(
            seq,
            seq as u32 * SAMPLES_PER_PACKET,
            SAMPLES_PER_PACKET,
        ));
    }

    #[test]
    fn holds_packets_until_target_reached() {
        let (queue, mut reader) = queue_and_reader(SAMPLES_PER_PACKET * 3);

        push(&queue, 0);
        push(&queue, 1);
        assert!(reader.read().is_none());

        push(&queue, 2);
        for seq in 0u16..3 {
            assert_eq!(reader.read().unwrap().seqnum(), seq);
        }
        assert!(reader.read().is_none());
    }

    #[test]
    fn passes_through_after_drain() {
        let (queue, mut reader) = queue_and_reader(SAMPLES_PER_PACKET);

        push(&queue, 0);
        assert_eq!(reader.read().unwrap().seqnum(), 0);

        push(&queue, 1);
        assert_eq!(reader.read().unwrap().seqnum(), 1);
    }

    #[test]
    fn survives_pauses_while_filling() {
        let (queue, mut reader) = queue_and_reader(SAMPLES_PER_PACKET * 4);

        push(&queue, 0);
        for _ in 0..10 {
            assert!(reader.read().is_none());
        }
        push(&queue, 1);
        push(&queue, 2);
        assert!(reader.read().is_none());
        push(&queue, 3);
        assert_eq!(reader.read().unwrap().seqnum(), 0);
    }
}
