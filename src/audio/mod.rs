//! Frame-domain types and stages: sample formats, payload codecs, the
//! depacketizer, playback supervision, channel mapping, resampling and
//! latency control.

mod decoder;
mod depacketizer;
mod frame;
mod latency;
mod mapper;
mod mixer;
mod poison;
mod resampler;
mod spec;
mod watchdog;

pub use decoder::{encode_pcm16, Pcm16Decoder, PayloadDecoder};
pub use depacketizer::Depacketizer;
pub use frame::{Frame, FrameFlags};
pub use latency::{FreqEstimator, LatencyMonitor, LatencyMonitorConfig};
pub use mapper::ChannelMapperReader;
pub use mixer::Mixer;
pub use poison::{PoisonReader, POISON_SAMPLE};
pub use resampler::{
    new_resampler, LinearResampler, Resampler, ResamplerBackend, ResamplerProfile,
    ResamplerReader,
};
pub use spec::SampleSpec;
pub use watchdog::{Watchdog, WatchdogConfig};

use std::cell::RefCell;
use std::rc::Rc;

/// Pull side of a frame-domain stage.
pub trait FrameReader {
    /// Fill `frame` with the next samples. Returns `false` when the
    /// stage has failed terminally and the session must end.
    fn read(&mut self, frame: &mut Frame<'_>) -> bool;
}

impl<R: FrameReader> FrameReader for Rc<RefCell<R>> {
    fn read(&mut self, frame: &mut Frame<'_>) -> bool {
        self.borrow_mut().read(frame)
    }
}
