//! Insertion-sorted packet queue.
//!
//! Keeps packets in ascending RTP sequence order regardless of arrival
//! order. Duplicates and packets older than the read position are
//! dropped, since they can no longer be played out.

use std::collections::VecDeque;

use log::debug;

use super::{seqnum_diff, PacketReader, PacketWriter};
use super::{Packet, Seqnum, Timestamp};

/// Statistics for monitoring queue health.
#[derive(Debug, Default, Clone)]
pub struct QueueStats {
    pub packets_written: u64,
    pub packets_dropped_late: u64,
    pub packets_dropped_duplicate: u64,
    pub packets_dropped_overflow: u64,
}

/// Bounded or unbounded queue re-sorted by RTP sequence number on insert.
///
/// Capacity 0 means unbounded. When bounded and full, the oldest packet
/// is dropped to make room: freshness beats completeness for real-time
/// audio.
pub struct SortedQueue {
    packets: VecDeque<Packet>,
    capacity: usize,
    /// Sequence number of the last packet handed out by `read`.
    last_read: Option<Seqnum>,
    stats: QueueStats,
}

impl SortedQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            packets: VecDeque::new(),
            capacity,
            last_read: None,
            stats: QueueStats::default(),
        }
    }

    pub fn size(&self) -> usize {
        self.packets.len()
    }

    /// RTP timestamp of the oldest buffered packet.
    pub fn head_timestamp(&self) -> Option<Timestamp> {
        self.packets.front().map(|p| p.timestamp())
    }

    /// RTP timestamp of the newest buffered packet.
    pub fn tail_timestamp(&self) -> Option<Timestamp> {
        self.packets.back().map(|p| p.timestamp())
    }

    pub fn stats(&self) -> &QueueStats {
        &self.stats
    }

    /// Position in `packets` where a packet with `seq` belongs, keeping
    /// ascending modular order. Binary search from both ends.
    fn insert_position(&self, seq: Seqnum) -> usize {
        let mut left = 0;
        let mut right = self.packets.len();
        while left < right {
            let mid = (left + right) / 2;
            if seqnum_diff(self.packets[mid].seqnum(), seq) < 0 {
                left = mid + 1;
            } else {
                right = mid;
            }
        }
        left
    }
}

impl PacketWriter for SortedQueue {
    fn write(&mut self, packet: Packet) {
        self.stats.packets_written += 1;
        let seq = packet.seqnum();

        // Anything at or behind the read position is stale.
        if let Some(last) = self.last_read {
            if seqnum_diff(seq, last) <= 0 {
                self.stats.packets_dropped_late += 1;
                debug!("sorted queue: dropping late packet seq={}", seq);
                return;
            }
        }

        let pos = self.insert_position(seq);
        if pos < self.packets.len() && self.packets[pos].seqnum() == seq {
            self.stats.packets_dropped_duplicate += 1;
            return;
        }
        self.packets.insert(pos, packet);

        if self.capacity != 0 {
            while self.packets.len() > self.capacity {
                self.packets.pop_front();
                self.stats.packets_dropped_overflow += 1;
            }
        }
    }
}

impl PacketReader for SortedQueue {
    fn read(&mut self) -> Option<Packet> {
        let packet = self.packets.pop_front()?;
        self.last_read = Some(packet.seqnum());
        Some(packet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rtp::test_packet;

    fn drain_seqs(q: &mut SortedQueue) -> Vec<u16> {
        let mut seqs = Vec::new();
        while let Some(p) = q.read() {
            seqs.push(p.seqnum());
        }
        seqs
    }

    #[test]
    fn sorts_out_of_order_inserts() {
        let mut q = SortedQueue::new(0);
        for seq in [5u16, 2, 9, 3, 7] {
            q.write(test_packet(seq, seq as u32 * 40));
        }
        assert_eq!(drain_seqs(&mut q), vec![2, 3, 5, 7, 9]);
    }

    #[test]
    fn drops_duplicates() {
        let mut q = SortedQueue::new(0);
        q.write(test_packet(1, 0));
        q.write(test_packet(2, 40));
        q.write(test_packet(1, 0));
        assert_eq!(q.stats().packets_dropped_duplicate, 1);
        assert_eq!(drain_seqs(&mut q), vec![1, 2]);
    }

    #[test]
    fn sorts_across_wraparound() {
        let mut q = SortedQueue::new(0);
        for seq in [65534u16, 1, 65535, 0] {
            q.write(test_packet(seq, 0));
        }
        assert_eq!(drain_seqs(&mut q), vec![65534, 65535, 0, 1]);
    }

    #[test]
    fn drops_packets_behind_read_position() {
        let mut q = SortedQueue::new(0);
        q.write(test_packet(10, 0));
        assert_eq!(q.read().unwrap().seqnum(), 10);
        q.write(test_packet(9, 0));
        q.write(test_packet(10, 0));
        q.write(test_packet(11, 0));
        assert_eq!(q.stats().packets_dropped_late, 2);
        assert_eq!(drain_seqs(&mut q), vec![11]);
    }

    #[test]
    fn bounded_drops_oldest() {
        let mut q = SortedQueue::new(3);
        for seq in 0u16..5 {
            q.write(test_packet(seq, 0));
        }
        assert_eq!(q.stats().packets_dropped_overflow, 2);
        assert_eq!(drain_seqs(&mut q), vec![2, 3, 4]);
    }

    #[test]
    fn reports_head_and_tail_timestamps() {
        let mut q = SortedQueue::new(0);
        assert_eq!(q.tail_timestamp(), None);
        q.write(test_packet(2, 80));
        q.write(test_packet(1, 40));
        assert_eq!(q.head_timestamp(), Some(40));
        assert_eq!(q.tail_timestamp(), Some(80));
    }
}
