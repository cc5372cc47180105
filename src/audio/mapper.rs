//! Channel layout conversion.
//!
//! Pulls frames at the input channel mask and re-emits them at the
//! output mask, preserving sample rate and frame boundaries. Mono and
//! stereo get proper mixdown/upmix; other pairs fall back to a
//! dup/drop rule over channel indices.

use super::{Frame, FrameReader, SampleSpec};

/// Frame-domain stage converting between channel masks.
pub struct ChannelMapperReader {
    upstream: Box<dyn FrameReader>,
    in_spec: SampleSpec,
    out_spec: SampleSpec,
    /// Scratch buffer for upstream frames, sized to the internal frame
    /// length.
    scratch: Vec<f32>,
    max_frames_per_chunk: usize,
}

impl ChannelMapperReader {
    /// `internal_frame_samples` bounds how many samples per channel are
    /// pulled from the upstream in one go.
    pub fn new(
        upstream: Box<dyn FrameReader>,
        in_spec: SampleSpec,
        out_spec: SampleSpec,
        internal_frame_samples: usize,
    ) -> Self {
        let max_frames = internal_frame_samples.max(1);
        Self {
            upstream,
            in_spec,
            out_spec,
            scratch: vec![0.0; max_frames * in_spec.num_channels()],
            max_frames_per_chunk: max_frames,
        }
    }

    fn map_chunk(&self, input: &[f32], output: &mut [f32]) {
        let in_ch = self.in_spec.num_channels();
        let out_ch = self.out_spec.num_channels();

        match (in_ch, out_ch) {
            (1, 2) => {
                for (i, frame) in output.chunks_exact_mut(2).enumerate() {
                    frame[0] = input[i];
                    frame[1] = input[i];
                }
            }
            (2, 1) => {
                for (i, sample) in output.iter_mut().enumerate() {
                    *sample = (input[i * 2] + input[i * 2 + 1]) * 0.5;
                }
            }
            _ => {
                // generic fallback: copy matching channel indices,
                // duplicate the last input channel upward
                for (i, frame) in output.chunks_exact_mut(out_ch).enumerate() {
                    let in_frame = &input[i * in_ch..(i + 1) * in_ch];
                    for (ch, sample) in frame.iter_mut().enumerate() {
                        *sample = in_frame[ch.min(in_ch - 1)];
                    }
                }
            }
        }
    }
}

impl FrameReader for ChannelMapperReader {
    fn read(&mut self, frame: &mut Frame<'_>) -> bool {
        let in_ch = self.in_spec.num_channels();
        let out_ch = self.out_spec.num_channels();
        let total_frames = frame.num_samples() / out_ch;

        let mut frames_done = 0;
        let mut first = true;

        while frames_done < total_frames {
            let chunk_frames = (total_frames - frames_done).min(self.max_frames_per_chunk);

            let mut scratch = std::mem::take(&mut self.scratch);
            let mut upstream_frame = Frame::new(&mut scratch[..chunk_frames * in_ch]);
            let ok = self.upstream.read(&mut upstream_frame);
            let flags = upstream_frame.flags;
            let start_ts = upstream_frame.start_ts;
            drop(upstream_frame);

            if !ok {
                self.scratch = scratch;
                return false;
            }

            self.map_chunk(
                &scratch[..chunk_frames * in_ch],
                &mut frame.samples_mut()
                    [frames_done * out_ch..(frames_done + chunk_frames) * out_ch],
            );
            self.scratch = scratch;

            frame.flags |= flags;
            if first {
                frame.start_ts = start_ts;
                first = false;
            }
            frames_done += chunk_frames;
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::FrameFlags;

    /// Upstream emitting a deterministic ramp at the input spec.
    struct RampReader {
        channels: usize,
        counter: u32,
        flags: FrameFlags,
    }

    impl FrameReader for RampReader {
        fn read(&mut self, frame: &mut Frame<'_>) -> bool {
            frame.start_ts = self.counter;
            for chunk in frame.samples_mut().chunks_mut(self.channels) {
                for (ch, sample) in chunk.iter_mut().enumerate() {
                    *sample = self.counter as f32 + ch as f32 * 0.5;
                }
                self.counter += 1;
            }
            frame.flags = self.flags;
            true
        }
    }

    fn mapper(in_mask: u32, out_mask: u32, flags: FrameFlags) -> ChannelMapperReader {
        let in_spec = SampleSpec::new(44100, in_mask);
        ChannelMapperReader::new(
            Box::new(RampReader {
                channels: in_spec.num_channels(),
                counter: 0,
                flags,
            }),
            in_spec,
            SampleSpec::new(44100, out_mask),
            8,
        )
    }

    #[test]
    fn mono_to_stereo_duplicates() {
        let mut m = mapper(0x1, 0x3, FrameFlags::empty());
        let mut buf = [0.0f32; 8];
        let mut frame = Frame::new(&mut buf);
        assert!(m.read(&mut frame));
        assert_eq!(frame.samples(), &[0.0, 0.0, 1.0, 1.0, 2.0, 2.0, 3.0, 3.0]);
    }

    #[test]
    fn stereo_to_mono_averages() {
        let mut m = mapper(0x3, 0x1, FrameFlags::empty());
        let mut buf = [0.0f32; 4];
        let mut frame = Frame::new(&mut buf);
        assert!(m.read(&mut frame));
        // each input frame is (n, n + 0.5); average is n + 0.25
        assert_eq!(frame.samples(), &[0.25, 1.25, 2.25, 3.25]);
    }

    #[test]
    fn preserves_flags_and_timestamp() {
        let mut m = mapper(0x1, 0x3, FrameFlags::INCOMPLETE);
        let mut buf = [0.0f32; 4];
        let mut frame = Frame::new(&mut buf);
        assert!(m.read(&mut frame));
        assert!(frame.flags.contains(FrameFlags::INCOMPLETE));
        assert_eq!(frame.start_ts, 0);

        let mut frame2 = Frame::new(&mut buf);
        assert!(m.read(&mut frame2));
        assert_eq!(frame2.start_ts, 2);
    }

    #[test]
    fn large_reads_chunk_through_scratch() {
        // chunk limit is 8 frames; request 20
        let mut m = mapper(0x1, 0x3, FrameFlags::empty());
        let mut buf = [0.0f32; 40];
        let mut frame = Frame::new(&mut buf);
        assert!(m.read(&mut frame));
        for i in 0..20 {
            assert_eq!(frame.samples()[i * 2], i as f32);
            assert_eq!(frame.samples()[i * 2 + 1], i as f32);
        }
    }
}
