//! Stateful RTP stream validation.
//!
//! Checks each pulled packet against the previous one. Any violation is
//! terminal: the stage fails and returns `None` for all subsequent
//! reads, which the session observes as stream death.

use std::time::Duration;

use log::warn;

use crate::audio::SampleSpec;
use crate::packet::{seqnum_diff, timestamp_diff, Packet, PacketReader};

/// Validator limits.
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// Maximum allowed sequence number jump between adjacent packets.
    pub max_sn_jump: u16,
    /// Maximum allowed timestamp jump between adjacent packets.
    pub max_ts_jump: Duration,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            max_sn_jump: 100,
            max_ts_jump: Duration::from_secs(1),
        }
    }
}

struct PrevPacket {
    seqnum: u16,
    timestamp: u32,
    ssrc: u32,
}

/// Packet-domain stage rejecting streams that change identity or jump
/// too far in sequence/timestamp space.
pub struct Validator {
    upstream: Box<dyn PacketReader>,
    max_sn_jump: u16,
    max_ts_jump: u32,
    payload_type: u8,
    prev: Option<PrevPacket>,
    failed: bool,
}

impl Validator {
    pub fn new(
        upstream: Box<dyn PacketReader>,
        config: &ValidatorConfig,
        payload_type: u8,
        sample_spec: SampleSpec,
    ) -> Self {
        Self {
            upstream,
            max_sn_jump: config.max_sn_jump,
            max_ts_jump: sample_spec.duration_to_samples(config.max_ts_jump),
            payload_type,
            prev: None,
            failed: false,
        }
    }

    fn check(&self, packet: &Packet) -> bool {
        let rtp = match packet.rtp.as_ref() {
            Some(rtp) => rtp,
            None => {
                warn!("validator: packet without rtp view");
                return false;
            }
        };

        if rtp.payload_type != self.payload_type {
            warn!(
                "validator: payload type changed mid-stream: got {}, expected {}",
                rtp.payload_type, self.payload_type
            );
            return false;
        }

        let prev = match self.prev.as_ref() {
            Some(prev) => prev,
            None => return true,
        };

        if rtp.ssrc != prev.ssrc {
            warn!(
                "validator: ssrc changed mid-stream: got {:#x}, expected {:#x}",
                rtp.ssrc, prev.ssrc
            );
            return false;
        }

        let sn_jump = seqnum_diff(rtp.seqnum, prev.seqnum).unsigned_abs();
        if sn_jump > self.max_sn_jump as u32 {
            warn!("validator: seqnum jump of {} exceeds limit", sn_jump);
            return false;
        }

        let ts_jump = timestamp_diff(rtp.timestamp, prev.timestamp).unsigned_abs();
        if ts_jump > self.max_ts_jump as u64 {
            warn!("validator: timestamp jump of {} exceeds limit", ts_jump);
            return false;
        }

        true
    }
}

impl PacketReader for Validator {
    fn read(&mut self) -> Option<Packet> {
        if self.failed {
            return None;
        }

        let packet = self.upstream.read()?;

        if !self.check(&packet) {
            self.failed = true;
            return None;
        }

        let rtp = packet.rtp.as_ref().unwrap();
        self.prev = Some(PrevPacket {
            seqnum: rtp.seqnum,
            timestamp: rtp.timestamp,
            ssrc: rtp.ssrc,
        });

        Some(packet)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::packet::{PacketWriter, SortedQueue};
    use crate::rtp::test_packet;

    const SPEC: SampleSpec = SampleSpec::new(44100, 0x3);
    const PT: u8 = 10;

    fn validator_over_queue() -> (Rc<RefCell<SortedQueue>>, Validator) {
        let queue = Rc::new(RefCell::new(SortedQueue::new(0)));
        let validator = Validator::new(
            Box::new(queue.clone()),
            &ValidatorConfig::default(),
            PT,
            SPEC,
        );
        (queue, validator)
    }

    #[test]
    fn passes_well_behaved_stream() {
        let (queue, mut validator) = validator_over_queue();
        for seq in 0u16..4 {
            queue.borrow_mut().write(test_packet(seq, seq as u32 * 40));
        }
        for _ in 0..4 {
            assert!(validator.read().is_some());
        }
    }

    #[test]
    fn fails_terminally_on_ssrc_change() {
        let (queue, mut validator) = validator_over_queue();
        queue.borrow_mut().write(test_packet(0, 0));
        assert!(validator.read().is_some());

        let mut bad = test_packet(1, 40);
        bad.rtp.as_mut().unwrap().ssrc ^= 1;
        queue.borrow_mut().write(bad);
        assert!(validator.read().is_none());

        // stays failed even when a good packet follows
        queue.borrow_mut().write(test_packet(2, 80));
        assert!(validator.read().is_none());
    }

    #[test]
    fn fails_on_payload_type_change() {
        let (queue, mut validator) = validator_over_queue();
        let mut bad = test_packet(0, 0);
        bad.rtp.as_mut().unwrap().payload_type = PT + 1;
        queue.borrow_mut().write(bad);
        assert!(validator.read().is_none());
    }

    #[test]
    fn fails_on_large_seqnum_jump() {
        let (queue, mut validator) = validator_over_queue();
        queue.borrow_mut().write(test_packet(0, 0));
        assert!(validator.read().is_some());
        queue.borrow_mut().write(test_packet(500, 40));
        assert!(validator.read().is_none());
    }

    #[test]
    fn fails_on_large_timestamp_jump() {
        let (queue, mut validator) = validator_over_queue();
        queue.borrow_mut().write(test_packet(0, 0));
        assert!(validator.read().is_some());
        queue.borrow_mut().write(test_packet(1, 44100 * 2));
        assert!(validator.read().is_none());
    }
}
