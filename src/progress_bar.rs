//! Progress reporting for event loops (cargo feature `progress`).
//!
//! [`EventProgress`] wraps an `indicatif` bar over the events of a source. Besides the rate and
//! the ETA, its message shows the time spent on the last event and a smoothed time per event,
//! `avg ← α·dt + (1 – α)·avg` with `α = 0.2`, seeded by the first event.
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};

const BAR_TEMPLATE: &str = "{bar:40.cyan/blue} {pos}/{len} ({percent:>3}%) \
     | {per_sec} | ETA {eta_precise} | {msg}";
const SPINNER_TEMPLATE: &str = "{spinner} {pos} events | {per_sec} | {elapsed_precise} | {msg}";

/// Weight of the newest event in the smoothed time per event.
const SMOOTHING: f64 = 0.2;

/// Progress bar over the events of one processing run.
pub struct EventProgress {
    bar: ProgressBar,
    last_event: Instant,
    /// Smoothed seconds per event, `None` before the first event
    per_event: Option<f64>,
}

impl EventProgress {
    /// A bar of `total` events, or a spinner when the number of events is unknown.
    pub fn new(total: Option<u64>) -> Self {
        let (bar, style) = match total {
            Some(total) => (
                ProgressBar::new(total.max(1)),
                ProgressStyle::with_template(BAR_TEMPLATE)
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            ),
            None => (
                ProgressBar::new_spinner(),
                ProgressStyle::with_template(SPINNER_TEMPLATE)
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            ),
        };
        bar.set_style(style);
        bar.enable_steady_tick(Duration::from_millis(200));
        Self {
            bar,
            last_event: Instant::now(),
            per_event: None,
        }
    }

    /// Count one processed event.
    pub fn inc(&mut self) {
        let now = Instant::now();
        let dt = now.duration_since(self.last_event);
        self.last_event = now;

        let avg = self.smooth(dt.as_secs_f64());
        self.bar.set_message(format!(
            "last: {}, avg: {}",
            short_duration(dt),
            short_duration(Duration::from_secs_f64(avg))
        ));
        self.bar.inc(1);
    }

    fn smooth(&mut self, seconds: f64) -> f64 {
        let avg = match self.per_event {
            Some(avg) => SMOOTHING * seconds + (1.0 - SMOOTHING) * avg,
            None => seconds,
        };
        self.per_event = Some(avg);
        avg
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    pub fn finish(self) {
        self.bar.finish_and_clear();
    }
}

/// `"253µs"`, `"42ms"` or `"3.14s"`.
fn short_duration(d: Duration) -> String {
    match d.as_micros() {
        us if us < 1_000 => format!("{us}µs"),
        us if us < 1_000_000 => format!("{}ms", us / 1_000),
        _ => format!("{:.2}s", d.as_secs_f64()),
    }
}
