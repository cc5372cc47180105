//! Use-after-release detection for frame buffers.

use super::{Frame, FrameReader};

/// Sentinel written into frame buffers before the upstream fills them.
/// Loud and far outside the valid sample range, so a stage that forgets
/// to write its samples is immediately audible in debug runs.
pub const POISON_SAMPLE: f32 = -1.0e9;

/// Debug stage overwriting the frame buffer with a sentinel pattern
/// before passing the read upstream.
pub struct PoisonReader {
    upstream: Box<dyn FrameReader>,
}

impl PoisonReader {
    pub fn new(upstream: Box<dyn FrameReader>) -> Self {
        Self { upstream }
    }
}

impl FrameReader for PoisonReader {
    fn read(&mut self, frame: &mut Frame<'_>) -> bool {
        frame.samples_mut().fill(POISON_SAMPLE);
        self.upstream.read(frame)
    }
}
