//! Playback supervision.
//!
//! Observes frame flags as they pass by and terminates the session
//! after prolonged silence or sustained breakage. The two timers are
//! driven by the sample counters of the frame stream itself, so they
//! advance exactly as fast as the sink consumes audio.

use std::collections::VecDeque;
use std::time::Duration;

use log::{debug, warn};

use super::{Frame, FrameFlags, FrameReader, SampleSpec};

/// Watchdog limits. Zero durations disable the respective timer.
#[derive(Debug, Clone)]
pub struct WatchdogConfig {
    /// Maximum time without a single complete frame.
    pub no_playback_timeout: Duration,
    /// Maximum time of sustained breakage (every detection window
    /// containing drops).
    pub broken_playback_timeout: Duration,
    /// Number of recent frame statuses kept for the failure report.
    pub frame_status_window: usize,
    /// Length of one breakage detection window.
    pub breakage_detection_window: Duration,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            no_playback_timeout: Duration::from_secs(2),
            broken_playback_timeout: Duration::from_secs(2),
            frame_status_window: 20,
            breakage_detection_window: Duration::from_millis(300),
        }
    }
}

/// Frame-domain stage tracking stream liveness.
pub struct Watchdog {
    upstream: Box<dyn FrameReader>,
    spec: SampleSpec,
    max_blank: u64,
    max_drops: u64,
    drop_window: u64,
    /// Samples (per channel) read since the last complete frame.
    blank_samples: u64,
    /// Samples read in the current detection window and whether it saw
    /// drops.
    window_samples: u64,
    window_has_drops: bool,
    /// Length of the current run of windows with drops, in samples.
    drops_span: u64,
    /// Recent frame statuses, newest last, for the failure report.
    status: VecDeque<char>,
    status_window: usize,
    alive: bool,
}

impl Watchdog {
    pub fn new(upstream: Box<dyn FrameReader>, config: &WatchdogConfig, spec: SampleSpec) -> Self {
        Self {
            upstream,
            spec,
            max_blank: spec.duration_to_samples(config.no_playback_timeout) as u64,
            max_drops: spec.duration_to_samples(config.broken_playback_timeout) as u64,
            drop_window: spec.duration_to_samples(config.breakage_detection_window) as u64,
            blank_samples: 0,
            window_samples: 0,
            window_has_drops: false,
            drops_span: 0,
            status: VecDeque::new(),
            status_window: config.frame_status_window,
            alive: true,
        }
    }

    /// Check the timers. Returns `false` once either has fired; the
    /// caller must stop reading and drop the session.
    pub fn update(&mut self) -> bool {
        if !self.alive {
            return false;
        }

        if self.max_blank != 0 && self.blank_samples >= self.max_blank {
            warn!(
                "watchdog: no playback for {} samples, status: {}",
                self.blank_samples,
                self.status_string()
            );
            self.alive = false;
            return false;
        }

        if self.max_drops != 0 && self.drop_window != 0 && self.drops_span >= self.max_drops {
            warn!(
                "watchdog: broken playback for {} samples, status: {}",
                self.drops_span,
                self.status_string()
            );
            self.alive = false;
            return false;
        }

        true
    }

    fn status_string(&self) -> String {
        self.status.iter().collect()
    }

    fn track_frame(&mut self, samples_per_ch: u64, flags: FrameFlags) {
        let incomplete = flags.contains(FrameFlags::INCOMPLETE);
        let drops = flags.contains(FrameFlags::DROPS);

        if incomplete {
            self.blank_samples += samples_per_ch;
        } else {
            self.blank_samples = 0;
        }

        if self.drop_window != 0 {
            self.window_samples += samples_per_ch;
            self.window_has_drops |= drops;
            while self.window_samples >= self.drop_window {
                self.window_samples -= self.drop_window;
                if self.window_has_drops {
                    self.drops_span += self.drop_window;
                } else {
                    self.drops_span = 0;
                }
                self.window_has_drops = false;
            }
        }

        if self.status_window != 0 {
            let mark = match (incomplete, drops) {
                (false, false) => '.',
                (true, false) => 'b',
                (_, true) => 'D',
            };
            if self.status.len() == self.status_window {
                self.status.pop_front();
            }
            self.status.push_back(mark);
        }
    }
}

impl FrameReader for Watchdog {
    fn read(&mut self, frame: &mut Frame<'_>) -> bool {
        if !self.alive {
            return false;
        }
        if !self.upstream.read(frame) {
            debug!("watchdog: upstream failed");
            self.alive = false;
            return false;
        }

        let samples_per_ch = (frame.num_samples() / self.spec.num_channels()) as u64;
        self.track_frame(samples_per_ch, frame.flags);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPEC: SampleSpec = SampleSpec::new(44100, 0x3);

    /// Upstream producing frames with a scripted flag sequence.
    struct ScriptedReader {
        flags: Vec<FrameFlags>,
        pos: usize,
    }

    impl FrameReader for ScriptedReader {
        fn read(&mut self, frame: &mut Frame<'_>) -> bool {
            frame.clear();
            frame.flags = self.flags[self.pos % self.flags.len()];
            self.pos += 1;
            true
        }
    }

    fn watchdog_with(flags: Vec<FrameFlags>, config: &WatchdogConfig) -> Watchdog {
        Watchdog::new(
            Box::new(ScriptedReader { flags, pos: 0 }),
            config,
            SPEC,
        )
    }

    fn read_one(dog: &mut Watchdog, samples: usize) -> bool {
        let mut buf = vec![0.0f32; samples];
        let mut frame = Frame::new(&mut buf);
        dog.read(&mut frame)
    }

    #[test]
    fn stays_alive_on_healthy_stream() {
        let config = WatchdogConfig {
            no_playback_timeout: Duration::from_millis(10), // 441 samples
            ..Default::default()
        };
        let mut dog = watchdog_with(vec![FrameFlags::empty()], &config);
        for _ in 0..100 {
            assert!(read_one(&mut dog, 20));
            assert!(dog.update());
        }
    }

    #[test]
    fn fires_after_silence_timeout() {
        let config = WatchdogConfig {
            no_playback_timeout: Duration::from_millis(10), // 441 samples
            ..Default::default()
        };
        let mut dog = watchdog_with(vec![FrameFlags::INCOMPLETE], &config);

        let mut ticks = 0;
        loop {
            assert!(read_one(&mut dog, 20)); // 10 samples per channel
            if !dog.update() {
                break;
            }
            ticks += 1;
            assert!(ticks < 100, "watchdog never fired");
        }
        // 441 samples at 10 per tick
        assert_eq!(ticks, 44);
        // stays fired
        assert!(!dog.update());
        assert!(!read_one(&mut dog, 20));
    }

    #[test]
    fn complete_frame_resets_silence_timer() {
        let config = WatchdogConfig {
            no_playback_timeout: Duration::from_millis(10),
            ..Default::default()
        };
        // every 4th frame is complete
        let mut dog = watchdog_with(
            vec![
                FrameFlags::INCOMPLETE,
                FrameFlags::INCOMPLETE,
                FrameFlags::INCOMPLETE,
                FrameFlags::empty(),
            ],
            &config,
        );
        for _ in 0..200 {
            assert!(read_one(&mut dog, 20));
            assert!(dog.update());
        }
    }

    #[test]
    fn fires_on_sustained_breakage() {
        let config = WatchdogConfig {
            no_playback_timeout: Duration::ZERO, // disabled
            broken_playback_timeout: Duration::from_millis(10), // 441 samples
            breakage_detection_window: Duration::from_millis(1), // ~44 samples
            ..Default::default()
        };
        let mut dog = watchdog_with(
            vec![FrameFlags::INCOMPLETE | FrameFlags::DROPS],
            &config,
        );

        let mut fired = false;
        for _ in 0..100 {
            assert!(read_one(&mut dog, 20));
            if !dog.update() {
                fired = true;
                break;
            }
        }
        assert!(fired);
    }

    #[test]
    fn zero_timeouts_disable_watchdog() {
        let config = WatchdogConfig {
            no_playback_timeout: Duration::ZERO,
            broken_playback_timeout: Duration::ZERO,
            ..Default::default()
        };
        let mut dog = watchdog_with(
            vec![FrameFlags::INCOMPLETE | FrameFlags::DROPS],
            &config,
        );
        for _ in 0..1000 {
            assert!(read_one(&mut dog, 20));
            assert!(dog.update());
        }
    }
}
