// =============================================================================
// Chart Scales — map data space (dates, prices) onto pixel space
// =============================================================================
//
// Both scales are plain linear interpolations between a domain and a range.
// A degenerate domain (both ends equal) maps every input onto the middle of
// the range so a single data point still lands inside the plot area.

use chrono::{Duration, NaiveDate};
use serde::Serialize;

use crate::types::date_to_ms;

/// Day steps the time axis may use, smallest first.
const DAY_STEPS: &[i64] = &[1, 2, 7, 14, 30, 61, 91, 182, 365];

/// Upper bound on time-axis labels before a coarser step is chosen.
const MAX_TIME_TICKS: i64 = 8;

fn interpolate(value: f64, domain: (f64, f64), range: (f64, f64)) -> f64 {
    let span = domain.1 - domain.0;
    let t = if span == 0.0 {
        0.5
    } else {
        (value - domain.0) / span
    };
    range.0 + t * (range.1 - range.0)
}

// ---------------------------------------------------------------------------
// LinearScale
// ---------------------------------------------------------------------------

/// Continuous linear scale, used for the price (y) axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LinearScale {
    pub domain: (f64, f64),
    pub range: (f64, f64),
}

impl LinearScale {
    pub fn new(domain: (f64, f64), range: (f64, f64)) -> Self {
        Self { domain, range }
    }

    /// Price axis: `[0, max_price]` onto `[inner_height, 0]` so larger prices
    /// sit higher. An empty or all-zero data set falls back to `[0, 1]`.
    pub fn for_prices(max_price: Option<f64>, inner_height: f64) -> Self {
        let top = match max_price {
            Some(p) if p.is_finite() && p > 0.0 => p,
            _ => 1.0,
        };
        Self::new((0.0, top), (inner_height, 0.0))
    }

    pub fn apply(&self, value: f64) -> f64 {
        interpolate(value, self.domain, self.range)
    }

    /// Round tick values covering the domain, roughly `count` of them.
    pub fn ticks(&self, count: usize) -> Vec<f64> {
        let (mut start, mut stop) = self.domain;
        if start == stop {
            return vec![start];
        }
        let reversed = stop < start;
        if reversed {
            std::mem::swap(&mut start, &mut stop);
        }
        let mut ticks = match tick_increment(start, stop, count.max(1)) {
            Some(Increment::Step(step)) => {
                let first = (start / step).ceil() as i64;
                let last = (stop / step).floor() as i64;
                (first..=last).map(|i| i as f64 * step).collect::<Vec<_>>()
            }
            Some(Increment::Inverse(inv)) => {
                let first = (start * inv).ceil() as i64;
                let last = (stop * inv).floor() as i64;
                (first..=last).map(|i| i as f64 / inv).collect()
            }
            None => return Vec::new(),
        };
        if reversed {
            ticks.reverse();
        }
        ticks
    }
}

/// Tick spacing. Sub-unit steps are kept as their inverse (ticks per unit)
/// so that values like 0.3 come out exact instead of as 0.30000000000000004.
enum Increment {
    Step(f64),
    Inverse(f64),
}

/// Spacing of the form 1, 2 or 5 x 10^k closest to `span / count`.
fn tick_increment(start: f64, stop: f64, count: usize) -> Option<Increment> {
    let raw = (stop - start) / count as f64;
    if !raw.is_finite() || raw <= 0.0 {
        return None;
    }
    let power = raw.log10().floor();
    let error = raw / 10f64.powf(power);
    let factor = if error >= 50f64.sqrt() {
        10.0
    } else if error >= 10f64.sqrt() {
        5.0
    } else if error >= 2f64.sqrt() {
        2.0
    } else {
        1.0
    };
    if power >= 0.0 {
        Some(Increment::Step(factor * 10f64.powf(power)))
    } else {
        Some(Increment::Inverse(10f64.powf(-power) / factor))
    }
}

// ---------------------------------------------------------------------------
// TimeScale
// ---------------------------------------------------------------------------

/// Time scale over trading days, used for the date (x) axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimeScale {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub range: (f64, f64),
}

impl TimeScale {
    pub fn new(start: NaiveDate, end: NaiveDate, range: (f64, f64)) -> Self {
        Self { start, end, range }
    }

    fn domain_ms(&self) -> (f64, f64) {
        (date_to_ms(self.start), date_to_ms(self.end))
    }

    pub fn apply(&self, date: NaiveDate) -> f64 {
        self.apply_ms(date_to_ms(date))
    }

    pub fn apply_ms(&self, ms: f64) -> f64 {
        interpolate(ms, self.domain_ms(), self.range)
    }

    /// Pixel to Unix milliseconds.
    pub fn invert(&self, pixel: f64) -> f64 {
        interpolate(pixel, self.range, self.domain_ms())
    }

    /// Dates for the axis labels: the domain start, then every `step` days.
    pub fn ticks(&self) -> Vec<NaiveDate> {
        let span = (self.end - self.start).num_days();
        if span <= 0 {
            return vec![self.start];
        }
        let step = DAY_STEPS
            .iter()
            .copied()
            .find(|s| span / s < MAX_TIME_TICKS)
            .unwrap_or(365);

        let mut ticks = Vec::new();
        let mut day = self.start;
        while day <= self.end {
            ticks.push(day);
            day += Duration::days(step);
        }
        ticks
    }
}
