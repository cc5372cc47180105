//! Closed-loop latency control.
//!
//! Measures how much audio sits between the network edge (source queue
//! tail) and the playout edge (depacketizer read pointer), and trims
//! the resampler ratio with a PI controller so the measured latency
//! converges to the target. Latency escaping the configured window is
//! fatal for the session.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use log::{debug, warn};

use crate::packet::{timestamp_diff, SortedQueue, Timestamp};

use super::{Depacketizer, ResamplerReader, SampleSpec};

/// Latency monitor limits and controller coefficients.
#[derive(Debug, Clone)]
pub struct LatencyMonitorConfig {
    /// Lower bound on measured latency; zero derives it from the
    /// target.
    pub min_latency: Duration,
    /// Upper bound on measured latency; zero derives it from the
    /// target.
    pub max_latency: Duration,
    /// Moving-average window over latency measurements, in ticks.
    pub fe_input: usize,
    /// Ticks between controller recomputes.
    pub fe_output: usize,
    /// Consecutive in-tolerance recomputes before the estimator reports
    /// stable.
    pub fe_stable_criteria: usize,
    /// Proportional gain over the normalized latency error.
    pub kp: f64,
    /// Integral gain over the normalized latency error.
    pub ki: f64,
    /// Bound on the scaling factor's deviation from 1.0.
    pub scaling_tolerance: f64,
}

impl Default for LatencyMonitorConfig {
    fn default() -> Self {
        Self {
            min_latency: Duration::ZERO,
            max_latency: Duration::ZERO,
            fe_input: 10,
            fe_output: 5,
            fe_stable_criteria: 10,
            kp: 1e-4,
            ki: 5e-6,
            scaling_tolerance: 0.005,
        }
    }
}

/// PI controller producing a resampler scaling factor from latency
/// measurements.
pub struct FreqEstimator {
    kp: f64,
    ki: f64,
    tolerance: f64,
    input_window: usize,
    output_interval: usize,
    stable_criteria: usize,
    window: VecDeque<f64>,
    window_sum: f64,
    tick: usize,
    integral: f64,
    coeff: f64,
    stable_ticks: usize,
}

impl FreqEstimator {
    pub fn new(config: &LatencyMonitorConfig) -> Self {
        Self {
            kp: config.kp,
            ki: config.ki,
            tolerance: config.scaling_tolerance,
            input_window: config.fe_input.max(1),
            output_interval: config.fe_output.max(1),
            stable_criteria: config.fe_stable_criteria.max(1),
            window: VecDeque::new(),
            window_sum: 0.0,
            tick: 0,
            integral: 0.0,
            coeff: 1.0,
            stable_ticks: 0,
        }
    }

    /// Feed one latency measurement; returns the current scaling
    /// factor, recomputed every `fe_output` ticks.
    pub fn update(&mut self, latency: f64, target: f64) -> f64 {
        self.window.push_back(latency);
        self.window_sum += latency;
        if self.window.len() > self.input_window {
            self.window_sum -= self.window.pop_front().unwrap();
        }

        self.tick += 1;
        if self.tick % self.output_interval != 0 || target <= 0.0 {
            return self.coeff;
        }

        let avg = self.window_sum / self.window.len() as f64;
        let error = (avg - target) / target;

        // anti-windup: the integral term alone may not exceed the
        // scaling bound
        self.integral = (self.integral + error)
            .clamp(-self.tolerance / self.ki, self.tolerance / self.ki);

        self.coeff = (1.0 + self.kp * error + self.ki * self.integral)
            .clamp(1.0 - self.tolerance, 1.0 + self.tolerance);

        if error.abs() <= self.tolerance {
            self.stable_ticks += 1;
        } else {
            self.stable_ticks = 0;
        }

        self.coeff
    }

    /// Whether the controller has been in tolerance for long enough.
    pub fn is_stable(&self) -> bool {
        self.stable_ticks >= self.stable_criteria
    }

    pub fn coeff(&self) -> f64 {
        self.coeff
    }
}

/// Observes the source queue and the depacketizer (non-owning; the
/// session owns all of them and destroys the monitor first) and drives
/// the resampler scaling.
pub struct LatencyMonitor {
    queue: Rc<RefCell<SortedQueue>>,
    depacketizer: Rc<RefCell<Depacketizer>>,
    resampler: Option<Rc<RefCell<ResamplerReader>>>,
    estimator: FreqEstimator,
    /// All in samples per channel of the source stream.
    target_latency: u32,
    min_latency: i64,
    max_latency: i64,
    last_latency: i64,
}

impl LatencyMonitor {
    pub fn new(
        queue: Rc<RefCell<SortedQueue>>,
        depacketizer: Rc<RefCell<Depacketizer>>,
        resampler: Option<Rc<RefCell<ResamplerReader>>>,
        config: &LatencyMonitorConfig,
        target_latency: u32,
        sample_spec: SampleSpec,
    ) -> Self {
        // derive the window from the target when not configured: allow
        // transient dips to empty and growth to several targets before
        // declaring the session unrecoverable
        let min_latency = if config.min_latency.is_zero() {
            -(target_latency as i64)
        } else {
            sample_spec.duration_to_samples(config.min_latency) as i64
        };
        let max_latency = if config.max_latency.is_zero() {
            target_latency as i64 * 5
        } else {
            sample_spec.duration_to_samples(config.max_latency) as i64
        };

        Self {
            queue,
            depacketizer,
            resampler,
            estimator: FreqEstimator::new(config),
            target_latency,
            min_latency,
            max_latency,
            last_latency: 0,
        }
    }

    /// Measured latency at the last `update`, in source samples.
    pub fn latency(&self) -> i64 {
        self.last_latency
    }

    pub fn is_stable(&self) -> bool {
        self.estimator.is_stable()
    }

    /// Run one control tick. Returns `false` when latency left the
    /// recoverable window and the session must end.
    pub fn update(&mut self, _ts: Timestamp) -> bool {
        let (started, dep_ts) = {
            let dep = self.depacketizer.borrow();
            (dep.started(), dep.timestamp())
        };
        if !started {
            return true;
        }
        let tail_ts = match self.queue.borrow().tail_timestamp() {
            Some(ts) => ts,
            None => return true, // queue drained into the chain; nothing to measure
        };

        let latency = timestamp_diff(tail_ts, dep_ts);
        self.last_latency = latency;

        if latency < self.min_latency || latency > self.max_latency {
            warn!(
                "latency monitor: latency {} outside window [{}, {}]",
                latency, self.min_latency, self.max_latency
            );
            return false;
        }

        let coeff = self
            .estimator
            .update(latency as f64, self.target_latency as f64);

        if let Some(resampler) = &self.resampler {
            if !resampler.borrow_mut().set_scaling(coeff) {
                warn!("latency monitor: resampler rejected scaling {}", coeff);
                return false;
            }
            debug!("latency monitor: latency={} scaling={:.6}", latency, coeff);
        }

        true
    }
}
