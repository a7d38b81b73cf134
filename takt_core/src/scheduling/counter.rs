//! Tick/tock timing statistics for scheduled tasks.
//!
//! Every periodic loop brackets its work with `tick()`/`tock()`. The counter
//! accumulates run-time and jitter statistics and reports each completed
//! cycle to its monitor callbacks. Overruns (run time beyond the configured
//! period) are counted but never stop execution.

use std::sync::Arc;
use std::time::Instant;

/// Callback invoked after every `tock()` with the updated counter.
pub type Monitor = Arc<dyn Fn(&Counter) + Send + Sync>;

/// Running min/max/mean over a stream of samples, in seconds.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub last: f64,
    samples: u64,
}

impl TimeStats {
    fn add(&mut self, sample: f64) {
        if self.samples == 0 || sample < self.min {
            self.min = sample;
        }
        if sample > self.max {
            self.max = sample;
        }
        let total = self.mean * self.samples as f64;
        self.samples += 1;
        self.mean = (total + sample) / self.samples as f64;
        self.last = sample;
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }
}

/// Per-task timing sample window.
pub struct Counter {
    period: f64,
    tick_instant: Option<Instant>,
    last_tick: Option<Instant>,
    /// Run time per cycle (tock - tick)
    pub run: TimeStats,
    /// Absolute deviation of the measured period from the configured one
    pub jitter: TimeStats,
    ticks: u64,
    overruns: u64,
    pub monitors: Vec<Monitor>,
}

impl Default for Counter {
    fn default() -> Self {
        Self::new()
    }
}

impl Counter {
    pub fn new() -> Self {
        Counter {
            period: 0.0,
            tick_instant: None,
            last_tick: None,
            run: TimeStats::default(),
            jitter: TimeStats::default(),
            ticks: 0,
            overruns: 0,
            monitors: Vec::new(),
        }
    }

    /// Configure the expected period; jitter and overruns are measured
    /// against it.
    pub fn set_period(&mut self, period: f64) {
        self.period = period;
    }

    pub fn period(&self) -> f64 {
        self.period
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn overruns(&self) -> u64 {
        self.overruns
    }

    /// Record the wake time of the current cycle and the jitter against the
    /// previous wake.
    pub fn tick(&mut self) {
        let now = Instant::now();
        if let Some(prev) = self.last_tick {
            let measured = (now - prev).as_secs_f64();
            self.jitter.add((measured - self.period).abs());
        }
        self.last_tick = Some(now);
        self.tick_instant = Some(now);
    }

    /// Record the run time of the current cycle and notify monitors.
    pub fn tock(&mut self) {
        if let Some(started) = self.tick_instant.take() {
            let run_time = started.elapsed().as_secs_f64();
            self.run.add(run_time);
            self.ticks += 1;
            if self.period > 0.0 && run_time > self.period {
                self.overruns += 1;
            }

            // Monitors are detached while running so they can read the counter
            let monitors = std::mem::take(&mut self.monitors);
            for monitor in &monitors {
                monitor(self);
            }
            self.monitors = monitors;
        }
    }
}
