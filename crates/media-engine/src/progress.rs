//! Progress parsing and percent reporting.

use std::sync::atomic::{AtomicU16, Ordering};

/// Accumulated state from ffmpeg's `-progress` key/value stream.
#[derive(Debug, Default)]
pub struct ProgressState {
    pub out_time_secs: f64,
    pub complete: bool,
}

impl ProgressState {
    pub fn update(&mut self, key: &str, value: &str) {
        match key {
            // ffmpeg reports microseconds under both keys.
            "out_time_ms" | "out_time_us" => {
                if let Ok(us) = value.parse::<f64>() {
                    self.out_time_secs = us / 1_000_000.0;
                }
            }
            "progress" => {
                self.complete = value == "end";
            }
            _ => {}
        }
    }

    /// Completion ratio in `[0, 1]`, if it can be estimated.
    pub fn ratio(&self, expected_duration_secs: Option<f64>) -> Option<f64> {
        if self.complete {
            return Some(1.0);
        }
        let expected = expected_duration_secs.filter(|d| *d > 0.0)?;
        Some((self.out_time_secs / expected).clamp(0.0, 1.0))
    }
}

const UNREPORTED: u16 = u16::MAX;

/// Converts completion ratios into integer percents that never go backwards.
#[derive(Debug)]
pub struct PercentTracker {
    last: AtomicU16,
}

impl Default for PercentTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PercentTracker {
    pub fn new() -> Self {
        Self {
            last: AtomicU16::new(UNREPORTED),
        }
    }

    /// Returns the percent to report, or `None` if it would not advance.
    pub fn advance(&self, ratio: f64) -> Option<u8> {
        if !ratio.is_finite() {
            return None;
        }
        let percent = (ratio.clamp(0.0, 1.0) * 100.0).round() as u16;
        self.last
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| {
                (last == UNREPORTED || percent > last).then_some(percent)
            })
            .ok()
            .map(|_| percent as u8)
    }

    /// Last percent reported, if any.
    pub fn last(&self) -> Option<u8> {
        match self.last.load(Ordering::Acquire) {
            UNREPORTED => None,
            p => Some(p as u8),
        }
    }
}
