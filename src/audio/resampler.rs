//! Sample-rate conversion.
//!
//! The pipeline consumes resamplers through the [`Resampler`] trait;
//! the built-in backend does linear interpolation, which is cheap and
//! good enough for the small ratio corrections the latency monitor
//! applies. The conversion ratio is `(input_rate / output_rate) *
//! scaling`, where `scaling` is the knob the monitor drives.

use std::collections::VecDeque;

use log::debug;

use super::{Frame, FrameFlags, FrameReader, SampleSpec};

/// Scaling factors outside this range are rejected as nonsense.
const MIN_SCALING: f64 = 0.5;
const MAX_SCALING: f64 = 2.0;

/// Resampler backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResamplerBackend {
    #[default]
    Default,
    Builtin,
    /// An externally provided kernel; nothing is linked in by default,
    /// so selecting this without one fails session construction.
    External,
}

/// Quality/cost trade-off knob, consumed by backends that support it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResamplerProfile {
    Low,
    #[default]
    Medium,
    High,
}

/// Streaming sample-rate converter over interleaved frames.
pub trait Resampler {
    /// Append input samples.
    fn push_input(&mut self, samples: &[f32]);

    /// Produce output samples; returns how many were written. Less than
    /// `out.len()` means more input is needed.
    fn pop_output(&mut self, out: &mut [f32]) -> usize;

    /// Update the conversion ratio. Returns false if the scaling factor
    /// is out of range.
    fn set_scaling(&mut self, scaling: f64) -> bool;

    /// Input samples currently buffered.
    fn buffered(&self) -> usize;
}

/// Linear-interpolation resampler.
pub struct LinearResampler {
    channels: usize,
    /// Input consumed per output frame.
    base_ratio: f64,
    scaling: f64,
    /// Fractional position between `prev` and `curr` input frames.
    pos: f64,
    prev: Vec<f32>,
    curr: Vec<f32>,
    primed: bool,
    input: VecDeque<f32>,
}

impl LinearResampler {
    pub fn new(in_spec: SampleSpec, out_spec: SampleSpec) -> Self {
        let channels = in_spec.num_channels();
        Self {
            channels,
            base_ratio: in_spec.sample_rate() as f64 / out_spec.sample_rate() as f64,
            scaling: 1.0,
            pos: 0.0,
            prev: vec![0.0; channels],
            curr: vec![0.0; channels],
            primed: false,
            input: VecDeque::new(),
        }
    }

    fn step(&self) -> f64 {
        self.base_ratio * self.scaling
    }

    /// Shift `curr` to `prev` and load the next input frame.
    fn advance_frame(&mut self) -> bool {
        if self.input.len() < self.channels {
            return false;
        }
        std::mem::swap(&mut self.prev, &mut self.curr);
        for sample in self.curr.iter_mut() {
            *sample = self.input.pop_front().unwrap();
        }
        true
    }
}

impl Resampler for LinearResampler {
    fn push_input(&mut self, samples: &[f32]) {
        self.input.extend(samples.iter().copied());
    }

    fn pop_output(&mut self, out: &mut [f32]) -> usize {
        if !self.primed {
            // need two input frames before interpolating
            if !self.advance_frame() || !self.advance_frame() {
                return 0;
            }
            self.primed = true;
        }

        let mut written = 0;
        for chunk in out.chunks_exact_mut(self.channels) {
            // consume input owed from the previous step first, so a
            // starved stream resumes exactly where it left off
            while self.pos >= 1.0 {
                if !self.advance_frame() {
                    return written;
                }
                self.pos -= 1.0;
            }

            let t = self.pos as f32;
            for (ch, sample) in chunk.iter_mut().enumerate() {
                *sample = self.prev[ch] + (self.curr[ch] - self.prev[ch]) * t;
            }

            self.pos += self.step();
            written += self.channels;
        }
        written
    }

    fn set_scaling(&mut self, scaling: f64) -> bool {
        if !(MIN_SCALING..=MAX_SCALING).contains(&scaling) {
            return false;
        }
        self.scaling = scaling;
        true
    }

    fn buffered(&self) -> usize {
        self.input.len()
    }
}

/// Construct the backend selected by configuration, or `None` if it is
/// not available in this build.
pub fn new_resampler(
    backend: ResamplerBackend,
    _profile: ResamplerProfile,
    in_spec: SampleSpec,
    out_spec: SampleSpec,
) -> Option<Box<dyn Resampler>> {
    match backend {
        ResamplerBackend::Default | ResamplerBackend::Builtin => {
            Some(Box::new(LinearResampler::new(in_spec, out_spec)))
        }
        ResamplerBackend::External => None,
    }
}

/// Frame-domain stage pulling frames at the input rate and emitting
/// frames at the output rate. The latency monitor writes the scaling
/// knob; it takes effect at the next frame boundary.
pub struct ResamplerReader {
    upstream: Box<dyn FrameReader>,
    resampler: Box<dyn Resampler>,
    in_spec: SampleSpec,
    out_spec: SampleSpec,
    scratch: Vec<f32>,
    /// Scaling requested but not yet applied.
    pending_scaling: Option<f64>,
    /// Flags accumulated from upstream frames feeding the current
    /// output frame.
    pending_flags: FrameFlags,
    /// Output-domain timestamp of the next emitted sample.
    out_ts: u32,
    started: bool,
}

impl ResamplerReader {
    pub fn new(
        upstream: Box<dyn FrameReader>,
        resampler: Box<dyn Resampler>,
        in_spec: SampleSpec,
        out_spec: SampleSpec,
        internal_frame_samples: usize,
    ) -> Self {
        let chunk = internal_frame_samples.max(1) * in_spec.num_channels();
        Self {
            upstream,
            resampler,
            in_spec,
            out_spec,
            scratch: vec![0.0; chunk],
            pending_scaling: None,
            pending_flags: FrameFlags::empty(),
            out_ts: 0,
            started: false,
        }
    }

    /// Request a new scaling factor. Returns false if it is out of
    /// range. Applied at the next frame boundary.
    pub fn set_scaling(&mut self, scaling: f64) -> bool {
        if !(MIN_SCALING..=MAX_SCALING).contains(&scaling) {
            return false;
        }
        self.pending_scaling = Some(scaling);
        true
    }
}

impl FrameReader for ResamplerReader {
    fn read(&mut self, frame: &mut Frame<'_>) -> bool {
        if let Some(scaling) = self.pending_scaling.take() {
            if !self.resampler.set_scaling(scaling) {
                debug!("resampler reader: scaling {} rejected", scaling);
            }
        }

        let num_samples = frame.num_samples();
        let mut written = 0;

        while written < num_samples {
            written += self
                .resampler
                .pop_output(&mut frame.samples_mut()[written..]);
            if written >= num_samples {
                break;
            }

            let mut scratch = std::mem::take(&mut self.scratch);
            let mut upstream_frame = Frame::new(&mut scratch);
            let ok = self.upstream.read(&mut upstream_frame);
            let flags = upstream_frame.flags;
            let start_ts = upstream_frame.start_ts;
            drop(upstream_frame);

            if !ok {
                self.scratch = scratch;
                return false;
            }
            self.resampler.push_input(&scratch);
            self.scratch = scratch;

            self.pending_flags |= flags;
            if !self.started {
                self.started = true;
                // scale the first input timestamp into the output domain
                self.out_ts = (start_ts as f64 * self.out_spec.sample_rate() as f64
                    / self.in_spec.sample_rate() as f64) as u32;
            }
        }

        frame.flags |= self.pending_flags;
        self.pending_flags = FrameFlags::empty();
        frame.start_ts = self.out_ts;
        self.out_ts = self
            .out_ts
            .wrapping_add((num_samples / self.out_spec.num_channels()) as u32);

        true
    }
}
