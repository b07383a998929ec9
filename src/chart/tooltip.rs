// =============================================================================
// Hover Tooltip — nearest sampled point per series for a cursor position
// =============================================================================
//
// The cursor x is inverted through the time scale, then each series is
// bisected for that instant. The earlier neighbour wins only when the cursor
// is strictly closer to it; an exact midpoint goes to the later sample.

use chrono::NaiveDate;
use serde::Serialize;

use super::palette::Palette;
use super::scale::TimeScale;
use super::series::Series;
use super::ChartLayout;
use crate::types::PricePoint;

/// Header format, e.g. `Thu Mar 01 2018`.
const TITLE_FORMAT: &str = "%a %b %d %Y";

/// Index of the sample in `points` closest to `target_ms`.
///
/// `points` must be sorted by date. Returns `None` for an empty slice; a
/// target outside the sampled range clamps to the first or last sample.
pub fn nearest_index(points: &[PricePoint], target_ms: f64) -> Option<usize> {
    if points.is_empty() {
        return None;
    }
    let index = points.partition_point(|p| p.timestamp_ms() < target_ms);
    if index == 0 {
        return Some(0);
    }
    if index == points.len() {
        return Some(points.len() - 1);
    }
    let to_next = points[index].timestamp_ms() - target_ms;
    let to_prev = target_ms - points[index - 1].timestamp_ms();
    if to_next > to_prev {
        Some(index - 1)
    } else {
        Some(index)
    }
}

/// One line of the tooltip.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TooltipEntry {
    pub ticker: String,
    pub date: NaiveDate,
    pub price: f64,
    pub color: String,
}

/// Everything the client needs to draw the hover state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tooltip {
    /// Date of the first series' nearest sample.
    pub date: NaiveDate,
    pub title: String,
    /// Plot-area x of the vertical guide line.
    pub line_x: f64,
    /// Tooltip box position relative to the chart container.
    pub left: f64,
    pub top: f64,
    pub entries: Vec<TooltipEntry>,
}

/// Build the tooltip for a cursor at `(mouse_x, mouse_y)` in plot-area
/// coordinates. Returns `None` when there is nothing to show.
pub fn build(
    layout: &ChartLayout,
    time_scale: &TimeScale,
    series: &[Series],
    palette: &Palette,
    mouse_x: f64,
    mouse_y: f64,
) -> Option<Tooltip> {
    let x = mouse_x.clamp(0.0, layout.inner_width());
    let y = mouse_y.clamp(0.0, layout.inner_height());
    let target_ms = time_scale.invert(x);

    let entries: Vec<TooltipEntry> = series
        .iter()
        .filter_map(|s| {
            let idx = nearest_index(&s.points, target_ms)?;
            let point = &s.points[idx];
            Some(TooltipEntry {
                ticker: s.ticker.clone(),
                date: point.date,
                price: point.price,
                color: palette.color_for(&s.ticker),
            })
        })
        .collect();

    let date = entries.first()?.date;
    Some(Tooltip {
        date,
        title: date.format(TITLE_FORMAT).to_string(),
        line_x: time_scale.apply(date),
        left: x + layout.margin.left + layout.tooltip_offset.0,
        top: y + layout.margin.top + layout.tooltip_offset.1,
        entries,
    })
}
