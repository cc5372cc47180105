//! Packet-to-frame boundary.
//!
//! Pulls packets, decodes payloads, and serves fixed-size sample frames
//! driven by the stream timestamp. Missing stretches are concealed with
//! silence (or a marker tone) and flagged on the frame.

use log::debug;

use crate::packet::{timestamp_diff, PacketReader, Timestamp};

use super::{Frame, FrameFlags, FrameReader, PayloadDecoder, SampleSpec};

/// Audible concealment marker frequency.
const BEEP_HZ: f32 = 880.0;

/// Frame-domain stage assembling PCM frames from the packet stream.
pub struct Depacketizer {
    upstream: Box<dyn PacketReader>,
    decoder: Box<dyn PayloadDecoder>,
    spec: SampleSpec,
    beeping: bool,
    beep_phase: f32,
    /// Next output timestamp, in samples per channel.
    timestamp: Timestamp,
    started: bool,
    /// Decoded samples of the current packet and the interleaved read
    /// position within them.
    pkt_samples: Vec<f32>,
    pkt_timestamp: Timestamp,
    pkt_pos: usize,
    /// Counters.
    concealed_samples: u64,
    late_packets: u64,
}

impl Depacketizer {
    pub fn new(
        upstream: Box<dyn PacketReader>,
        decoder: Box<dyn PayloadDecoder>,
        spec: SampleSpec,
        beeping: bool,
    ) -> Self {
        Self {
            upstream,
            decoder,
            spec,
            beeping,
            beep_phase: 0.0,
            timestamp: 0,
            started: false,
            pkt_samples: Vec::new(),
            pkt_timestamp: 0,
            pkt_pos: 0,
            concealed_samples: 0,
            late_packets: 0,
        }
    }

    /// Next output timestamp; meaningful once `started` returns true.
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Whether the first packet has been consumed.
    pub fn started(&self) -> bool {
        self.started
    }

    pub fn concealed_samples(&self) -> u64 {
        self.concealed_samples
    }

    pub fn late_packets(&self) -> u64 {
        self.late_packets
    }

    /// Timestamp (per channel) of the next undecoded sample in the
    /// current packet.
    fn pkt_read_ts(&self) -> Timestamp {
        self.pkt_timestamp
            .wrapping_add((self.pkt_pos / self.spec.num_channels()) as u32)
    }

    fn pkt_exhausted(&self) -> bool {
        self.pkt_pos >= self.pkt_samples.len()
    }

    /// Pull and decode the next packet. Returns false when the upstream
    /// has nothing.
    fn fetch_packet(&mut self) -> bool {
        let packet = match self.upstream.read() {
            Some(packet) => packet,
            None => return false,
        };
        let rtp = match packet.rtp.as_ref() {
            Some(rtp) => rtp,
            None => return true, // skip, try next
        };

        let total = self.decoder.decoded_sample_count(&rtp.payload) as usize
            * self.spec.num_channels();
        self.pkt_samples.resize(total, 0.0);
        let decoded = self.decoder.decode(&rtp.payload, &mut self.pkt_samples);
        self.pkt_samples.truncate(decoded);
        self.pkt_timestamp = rtp.timestamp;
        self.pkt_pos = 0;

        if !self.started {
            self.started = true;
            self.timestamp = rtp.timestamp;
            debug!("depacketizer: stream started at ts {}", rtp.timestamp);
        }

        true
    }

    /// Write `count` interleaved concealment samples.
    fn conceal(&mut self, out: &mut [f32]) {
        if self.beeping {
            let channels = self.spec.num_channels();
            let step = BEEP_HZ / self.spec.sample_rate() as f32 * 2.0 * std::f32::consts::PI;
            for chunk in out.chunks_mut(channels) {
                let value = self.beep_phase.sin();
                self.beep_phase += step;
                chunk.fill(value);
            }
        } else {
            out.fill(0.0);
        }
        self.concealed_samples += out.len() as u64;
    }
}

impl FrameReader for Depacketizer {
    fn read(&mut self, frame: &mut Frame<'_>) -> bool {
        let channels = self.spec.num_channels();
        let num_samples = frame.num_samples();
        debug_assert!(num_samples % channels == 0);

        frame.start_ts = self.timestamp;
        let mut pos = 0;

        while pos < num_samples {
            if self.pkt_exhausted() && !self.fetch_packet() {
                break;
            }
            if self.pkt_exhausted() {
                continue;
            }

            let cur_ts = self
                .timestamp
                .wrapping_add((pos / channels) as u32);
            let diff = timestamp_diff(self.pkt_read_ts(), cur_ts);

            if diff < 0 {
                // late data: discard the overlapping part of the packet
                if self.pkt_pos == 0 {
                    self.late_packets += 1;
                }
                let skip = ((-diff) as usize * channels).min(self.pkt_samples.len() - self.pkt_pos);
                self.pkt_pos += skip;
                continue;
            }

            if diff > 0 {
                // gap before the packet: conceal up to its start
                let gap = (diff as usize * channels).min(num_samples - pos);
                self.conceal(&mut frame.samples_mut()[pos..pos + gap]);
                frame.flags |= FrameFlags::INCOMPLETE | FrameFlags::DROPS;
                pos += gap;
                continue;
            }

            let available = self.pkt_samples.len() - self.pkt_pos;
            let copy = available.min(num_samples - pos);
            frame.samples_mut()[pos..pos + copy]
                .copy_from_slice(&self.pkt_samples[self.pkt_pos..self.pkt_pos + copy]);
            self.pkt_pos += copy;
            pos += copy;
        }

        if pos < num_samples {
            // ran out of packets: conceal the tail
            self.conceal(&mut frame.samples_mut()[pos..]);
            frame.flags |= FrameFlags::INCOMPLETE;
        }

        self.timestamp = self
            .timestamp
            .wrapping_add((num_samples / channels) as u32);

        true
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use bytes::Bytes;

    use super::*;
    use crate::audio::{encode_pcm16, Pcm16Decoder};
    use crate::packet::{Packet, PacketWriter, SortedQueue};
    use crate::rtp::test_packet;

    const SPEC: SampleSpec = SampleSpec::new(44100, 0x3);
    const CHANNELS: usize = 2;

    fn pcm_packet(seq: u16, ts: u32, samples_per_ch: usize) -> Packet {
        let mut packet = test_packet(seq, ts);
        let values: Vec<f32> = (0..samples_per_ch * CHANNELS)
            .map(|i| (ts as usize * CHANNELS + i) as f32 / 100_000.0)
            .collect();
        let mut bytes = Vec::new();
        encode_pcm16(&values, &mut bytes);
        packet.rtp.as_mut().unwrap().payload = Bytes::from(bytes);
        packet
    }

    fn depacketizer_over_queue() -> (Rc<RefCell<SortedQueue>>, Depacketizer) {
        let queue = Rc::new(RefCell::new(SortedQueue::new(0)));
        let dep = Depacketizer::new(
            Box::new(queue.clone()),
            Box::new(Pcm16Decoder::new(SPEC)),
            SPEC,
            false,
        );
        (queue, dep)
    }

    #[test]
    fn assembles_contiguous_stream() {
        let (queue, mut dep) = depacketizer_over_queue();
        queue.borrow_mut().write(pcm_packet(0, 0, 4));
        queue.borrow_mut().write(pcm_packet(1, 4, 4));

        let mut buf = [0.0f32; 6];
        let mut frame = Frame::new(&mut buf);
        assert!(dep.read(&mut frame));
        assert_eq!(frame.flags, FrameFlags::empty());
        assert_eq!(frame.start_ts, 0);

        let mut buf2 = [0.0f32; 10];
        let mut frame2 = Frame::new(&mut buf2);
        assert!(dep.read(&mut frame2));
        assert_eq!(frame2.flags, FrameFlags::empty());
        assert_eq!(frame2.start_ts, 3);

        // samples continue seamlessly across the packet boundary
        let expected: Vec<f32> = (6..16).map(|i| i as f32 / 100_000.0).collect();
        for (a, b) in frame2.samples().iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-3);
        }
        assert_eq!(dep.timestamp(), 8);
    }

    #[test]
    fn conceals_gap_and_flags_frame() {
        let (queue, mut dep) = depacketizer_over_queue();
        queue.borrow_mut().write(pcm_packet(0, 0, 2));
        queue.borrow_mut().write(pcm_packet(2, 4, 2)); // ts 2..4 missing

        let mut buf = [1.0f32; 12];
        let mut frame = Frame::new(&mut buf);
        assert!(dep.read(&mut frame));
        assert!(frame.flags.contains(FrameFlags::INCOMPLETE | FrameFlags::DROPS));

        // middle 4 samples concealed as silence
        assert_eq!(&frame.samples()[4..8], &[0.0; 4]);
        assert!(frame.samples()[2] != 0.0);
        assert!(frame.samples()[8] != 0.0);
    }

    #[test]
    fn discards_late_packet_overlap() {
        let (queue, mut dep) = depacketizer_over_queue();
        queue.borrow_mut().write(pcm_packet(0, 0, 4));

        let mut buf = [0.0f32; 8];
        let mut frame = Frame::new(&mut buf);
        assert!(dep.read(&mut frame));

        // packet starting at ts 2 arrives after we consumed up to ts 4
        queue.borrow_mut().write(pcm_packet(1, 2, 4));
        let mut buf2 = [0.0f32; 4];
        let mut frame2 = Frame::new(&mut buf2);
        assert!(dep.read(&mut frame2));
        assert_eq!(frame2.flags, FrameFlags::empty());

        // only the tail of the late packet is used
        let expected: Vec<f32> = (8..12).map(|i| i as f32 / 100_000.0).collect();
        for (a, b) in frame2.samples().iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-3);
        }
    }

    #[test]
    fn silence_before_first_packet() {
        let (_queue, mut dep) = depacketizer_over_queue();
        let mut buf = [1.0f32; 8];
        let mut frame = Frame::new(&mut buf);
        assert!(dep.read(&mut frame));
        assert!(frame.flags.contains(FrameFlags::INCOMPLETE));
        assert_eq!(frame.samples(), &[0.0; 8]);
        assert!(!dep.started());
    }

    #[test]
    fn beeping_marks_concealed_stretches() {
        let queue = Rc::new(RefCell::new(SortedQueue::new(0)));
        let mut dep = Depacketizer::new(
            Box::new(queue.clone()),
            Box::new(Pcm16Decoder::new(SPEC)),
            SPEC,
            true,
        );
        queue.borrow_mut().write(pcm_packet(0, 0, 2));

        let mut buf = [0.0f32; 12];
        let mut frame = Frame::new(&mut buf);
        assert!(dep.read(&mut frame));
        assert!(frame.flags.contains(FrameFlags::INCOMPLETE));
        // the concealed tail carries the marker tone, not silence
        assert!(frame.samples()[4..].iter().any(|s| s.abs() > 1e-3));
    }
}
