// =============================================================================
// Chart Renderer
// =============================================================================
//
// Pure chart math for the multi-line price chart: scales, per-stock series,
// nearest-point tooltip lookup and SVG generation. Nothing in here performs
// I/O; the API layer feeds it the latest dashboard and ships the result.

pub mod palette;
pub mod render;
pub mod scale;
pub mod series;
pub mod tooltip;

use serde::{Deserialize, Serialize};

pub use palette::Palette;
pub use render::ChartModel;
pub use series::Series;
pub use tooltip::Tooltip;

/// Space reserved around the plot area for axes and labels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Margin {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

impl Default for Margin {
    fn default() -> Self {
        Self {
            top: 100.0,
            right: 50.0,
            bottom: 50.0,
            left: 70.0,
        }
    }
}

fn default_width() -> f64 {
    1000.0
}

fn default_height() -> f64 {
    700.0
}

fn default_y_ticks() -> usize {
    10
}

fn default_tooltip_offset() -> (f64, f64) {
    (-75.0, 20.0)
}

/// Outer dimensions of the chart and the tooltip placement offset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartLayout {
    #[serde(default = "default_width")]
    pub width: f64,
    #[serde(default = "default_height")]
    pub height: f64,
    #[serde(default)]
    pub margin: Margin,
    /// Approximate number of y-axis ticks and gridlines.
    #[serde(default = "default_y_ticks")]
    pub y_ticks: usize,
    /// Tooltip box offset from the cursor, in pixels.
    #[serde(default = "default_tooltip_offset")]
    pub tooltip_offset: (f64, f64),
}

impl Default for ChartLayout {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            margin: Margin::default(),
            y_ticks: default_y_ticks(),
            tooltip_offset: default_tooltip_offset(),
        }
    }
}

impl ChartLayout {
    /// Width of the plot area inside the margins.
    pub fn inner_width(&self) -> f64 {
        (self.width - self.margin.left - self.margin.right).max(0.0)
    }

    /// Height of the plot area inside the margins.
    pub fn inner_height(&self) -> f64 {
        (self.height - self.margin.top - self.margin.bottom).max(0.0)
    }
}
