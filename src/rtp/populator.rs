//! Derived-field population.
//!
//! Fills the packet duration from the payload decoder so that stages
//! downstream (delay buffer, latency accounting) can reason about time.
//! Pure transformation; never fails.

use crate::audio::PayloadDecoder;
use crate::packet::{Packet, PacketReader};

/// Packet-domain stage deriving per-packet metadata from the payload.
pub struct Populator {
    upstream: Box<dyn PacketReader>,
    decoder: Box<dyn PayloadDecoder>,
}

impl Populator {
    pub fn new(upstream: Box<dyn PacketReader>, decoder: Box<dyn PayloadDecoder>) -> Self {
        Self { upstream, decoder }
    }
}

impl PacketReader for Populator {
    fn read(&mut self) -> Option<Packet> {
        let mut packet = self.upstream.read()?;

        if let Some(rtp) = packet.rtp.as_mut() {
            if rtp.duration == 0 {
                rtp.duration = self.decoder.decoded_sample_count(&rtp.payload);
            }
        }

        Some(packet)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use bytes::Bytes;

    use super::*;
    use crate::audio::{Pcm16Decoder, SampleSpec};
    use crate::packet::{PacketWriter, SortedQueue};
    use crate::rtp::test_packet;

    #[test]
    fn fills_duration_from_payload() {
        let spec = SampleSpec::new(44100, 0x3);
        let queue = Rc::new(RefCell::new(SortedQueue::new(0)));
        let mut populator = Populator::new(
            Box::new(queue.clone()),
            Box::new(Pcm16Decoder::new(spec)),
        );

        let mut packet = test_packet(0, 0);
        // 40 stereo samples, 2 bytes each
        packet.rtp.as_mut().unwrap().payload = Bytes::from(vec![0u8; 40 * 2 * 2]);
        queue.borrow_mut().write(packet);

        let populated = populator.read().unwrap();
        assert_eq!(populated.rtp.unwrap().duration, 40);
    }
}
