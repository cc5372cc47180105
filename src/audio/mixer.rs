//! Session output mixing.

use super::{Frame, FrameFlags, FrameReader};

/// Sums frames from any number of readers into the output frame,
/// clamping to the valid sample range. With no readers the output is
/// silence, which is exactly what a receiver with no live sessions
/// should play.
pub struct Mixer {
    scratch: Vec<f32>,
}

impl Mixer {
    pub fn new() -> Self {
        Self {
            scratch: Vec::new(),
        }
    }

    /// Read one frame from every reader and accumulate into `frame`.
    /// Returns the combined flags of all mixed frames.
    pub fn mix<'a, I>(&mut self, readers: I, frame: &mut Frame<'_>) -> FrameFlags
    where
        I: Iterator<Item = &'a mut dyn FrameReader>,
    {
        frame.clear();
        let mut flags = FrameFlags::empty();

        self.scratch.resize(frame.num_samples(), 0.0);
        for reader in readers {
            let mut session_frame = Frame::new(&mut self.scratch);
            if !reader.read(&mut session_frame) {
                continue;
            }
            flags |= session_frame.flags;
            let start_ts = session_frame.start_ts;
            drop(session_frame);

            frame.start_ts = start_ts;
            for (out, add) in frame.samples_mut().iter_mut().zip(self.scratch.iter()) {
                *out = (*out + add).clamp(-1.0, 1.0);
            }
        }

        frame.flags |= flags;
        flags
    }
}

impl Default for Mixer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ConstReader(f32);

    impl FrameReader for ConstReader {
        fn read(&mut self, frame: &mut Frame<'_>) -> bool {
            for sample in frame.samples_mut() {
                *sample = self.0;
            }
            frame.flags = FrameFlags::empty();
            true
        }
    }

    #[test]
    fn sums_and_clamps() {
        let mut mixer = Mixer::new();
        let mut a = ConstReader(0.4);
        let mut b = ConstReader(0.8);
        let mut readers: Vec<&mut dyn FrameReader> = vec![&mut a, &mut b];

        let mut buf = [0.0f32; 4];
        let mut frame = Frame::new(&mut buf);
        mixer.mix(readers.drain(..), &mut frame);
        assert_eq!(frame.samples(), &[1.0; 4]);
    }

    #[test]
    fn empty_mix_is_silence() {
        let mut mixer = Mixer::new();
        let mut buf = [0.7f32; 4];
        let mut frame = Frame::new(&mut buf);
        mixer.mix(std::iter::empty(), &mut frame);
        assert_eq!(frame.samples(), &[0.0; 4]);
    }
}
