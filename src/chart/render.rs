// =============================================================================
// Chart Model & SVG Rendering
// =============================================================================
//
// `ChartModel` is the fully laid-out chart: scales, one SVG path per stock,
// axis ticks and gridlines. It is serialised for the JSON API and rendered to
// a standalone SVG document for the browser client.

use std::fmt::Write as _;

use serde::Serialize;

use super::palette::Palette;
use super::scale::{LinearScale, TimeScale};
use super::series::{self, Series};
use super::tooltip::{self, Tooltip};
use super::ChartLayout;

const Y_AXIS_LABEL: &str = "Price per share ($)";
const X_TICK_FORMAT: &str = "%b %d";
const TICK_SIZE: f64 = 6.0;

/// A rendered price line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinePath {
    pub ticker: String,
    pub color: String,
    /// SVG path data, `M x,y L x,y ...`.
    pub d: String,
}

/// An axis tick: label plus its pixel offset along the axis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AxisTick {
    pub label: String,
    pub position: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChartModel {
    pub layout: ChartLayout,
    pub inner_width: f64,
    pub inner_height: f64,
    /// `None` while there is no data to derive a date domain from.
    pub time_scale: Option<TimeScale>,
    pub price_scale: LinearScale,
    pub lines: Vec<LinePath>,
    pub x_ticks: Vec<AxisTick>,
    pub y_ticks: Vec<AxisTick>,
    #[serde(skip)]
    series: Vec<Series>,
}

impl ChartModel {
    pub fn build(layout: &ChartLayout, series: &[Series], palette: &Palette) -> Self {
        let inner_width = layout.inner_width();
        let inner_height = layout.inner_height();

        let time_scale = series::date_extent(series)
            .map(|(start, end)| TimeScale::new(start, end, (0.0, inner_width)));
        let price_scale = LinearScale::for_prices(series::max_price(series), inner_height);

        let lines = match &time_scale {
            Some(ts) => series
                .iter()
                .filter(|s| !s.is_empty())
                .map(|s| LinePath {
                    ticker: s.ticker.clone(),
                    color: palette.color_for(&s.ticker),
                    d: line_path(s, ts, &price_scale),
                })
                .collect(),
            None => Vec::new(),
        };

        let x_ticks = time_scale
            .map(|ts| {
                ts.ticks()
                    .into_iter()
                    .map(|date| AxisTick {
                        label: date.format(X_TICK_FORMAT).to_string(),
                        position: ts.apply(date),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let y_ticks = price_scale
            .ticks(layout.y_ticks)
            .into_iter()
            .map(|value| AxisTick {
                label: format!("{value}"),
                position: price_scale.apply(value),
            })
            .collect();

        Self {
            layout: layout.clone(),
            inner_width,
            inner_height,
            time_scale,
            price_scale,
            lines,
            x_ticks,
            y_ticks,
            series: series.to_vec(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Tooltip for a cursor at plot-area coordinates `(x, y)`.
    pub fn tooltip(&self, palette: &Palette, x: f64, y: f64) -> Option<Tooltip> {
        let ts = self.time_scale.as_ref()?;
        tooltip::build(&self.layout, ts, &self.series, palette, x, y)
    }

    /// Render a standalone SVG document.
    pub fn to_svg(&self) -> String {
        let l = &self.layout;
        let path_bytes: usize = self.lines.iter().map(|p| p.d.len()).sum();
        let mut svg = String::with_capacity(4096 + path_bytes);

        // Writing into a String cannot fail.
        let _ = write!(
            svg,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
            w = fmt_coord(l.width),
            h = fmt_coord(l.height),
        );
        let _ = write!(
            svg,
            r#"<text class="axis-label" transform="rotate(-90)" y="{}" x="{}" text-anchor="middle">{}</text>"#,
            fmt_coord(l.margin.left / 2.0),
            fmt_coord(-l.height / 2.0),
            xml_escape(Y_AXIS_LABEL),
        );
        let _ = write!(
            svg,
            r#"<g transform="translate({}, {})">"#,
            fmt_coord(l.margin.left),
            fmt_coord(l.margin.top),
        );

        // Gridlines
        svg.push_str(r#"<g class="gridlines">"#);
        for tick in &self.y_ticks {
            let _ = write!(
                svg,
                r#"<line x1="0" x2="{}" y1="{y}" y2="{y}"/>"#,
                fmt_coord(self.inner_width),
                y = fmt_coord(tick.position),
            );
        }
        svg.push_str("</g>");

        // X axis
        let _ = write!(
            svg,
            r#"<g id="x-axis" transform="translate(0, {})"><path class="domain" d="M0,0H{}"/>"#,
            fmt_coord(self.inner_height),
            fmt_coord(self.inner_width),
        );
        for tick in &self.x_ticks {
            let _ = write!(
                svg,
                r#"<g class="tick" transform="translate({},0)"><line y2="{}"/><text y="{}" dy="0.71em" text-anchor="middle">{}</text></g>"#,
                fmt_coord(tick.position),
                fmt_coord(TICK_SIZE),
                fmt_coord(TICK_SIZE + 3.0),
                xml_escape(&tick.label),
            );
        }
        svg.push_str("</g>");

        // Y axis
        let _ = write!(
            svg,
            r#"<g id="y-axis"><path class="domain" d="M0,0V{}"/>"#,
            fmt_coord(self.inner_height),
        );
        for tick in &self.y_ticks {
            let _ = write!(
                svg,
                r#"<g class="tick" transform="translate(0,{})"><line x2="-{}"/><text x="-{}" dy="0.32em" text-anchor="end">{}</text></g>"#,
                fmt_coord(tick.position),
                fmt_coord(TICK_SIZE),
                fmt_coord(TICK_SIZE + 3.0),
                xml_escape(&tick.label),
            );
        }
        svg.push_str("</g>");

        for line in &self.lines {
            let _ = write!(
                svg,
                r#"<path class="line" data-ticker="{}" fill="none" stroke="{}" d="{}"/>"#,
                xml_escape(&line.ticker),
                xml_escape(&line.color),
                line.d,
            );
        }

        let _ = write!(
            svg,
            r#"<line id="vertical-line" y1="0" y2="{}" style="display:none"/>"#,
            fmt_coord(self.inner_height),
        );
        let _ = write!(
            svg,
            r#"<rect class="overlay" width="{}" height="{}" fill="none" pointer-events="all"/>"#,
            fmt_coord(self.inner_width),
            fmt_coord(self.inner_height),
        );

        svg.push_str("</g></svg>");
        svg
    }
}

/// SVG path data through every point of `series`.
fn line_path(series: &Series, x: &TimeScale, y: &LinearScale) -> String {
    let mut d = String::with_capacity(series.points.len() * 16);
    for (i, point) in series.points.iter().enumerate() {
        d.push(if i == 0 { 'M' } else { 'L' });
        d.push_str(&fmt_coord(x.apply(point.date)));
        d.push(',');
        d.push_str(&fmt_coord(y.apply(point.price)));
    }
    d
}

/// Two decimals at most, trailing zeros dropped: `550`, `12.5`, `3.14`.
fn fmt_coord(value: f64) -> String {
    let s = format!("{value:.2}");
    let s = s.trim_end_matches('0').trim_end_matches('.');
    match s {
        "-0" | "" => "0".to_string(),
        other => other.to_string(),
    }
}

fn xml_escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::types::PricePoint;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2018, 3, day).unwrap()
    }

    fn sample_series() -> Vec<Series> {
        vec![
            Series {
                ticker: "AAPL".into(),
                points: vec![
                    PricePoint::new("AAPL", d(1), 100.0),
                    PricePoint::new("AAPL", d(11), 200.0),
                ],
            },
            Series {
                ticker: "MSFT".into(),
                points: vec![PricePoint::new("MSFT", d(6), 50.0)],
            },
        ]
    }

    #[test]
    fn fmt_coord_trims() {
        assert_eq!(fmt_coord(550.0), "550");
        assert_eq!(fmt_coord(12.5), "12.5");
        assert_eq!(fmt_coord(3.14159), "3.14");
        assert_eq!(fmt_coord(-0.001), "0");
        assert_eq!(fmt_coord(-4.2), "-4.2");
    }

    #[test]
    fn builds_paths_from_scales() {
        let layout = ChartLayout::default();
        let palette = Palette::new();
        let model = ChartModel::build(&layout, &sample_series(), &palette);

        assert_eq!(model.lines.len(), 2);
        // AAPL: day 1 at x=0 priced 100 of 200 -> y=275; day 11 at the right edge, top.
        assert_eq!(model.lines[0].d, "M0,275L880,0");
        // MSFT: day 6 is the middle of the domain, 50/200 of the height.
        assert_eq!(model.lines[1].d, "M440,412.5");
        assert_eq!(model.lines[0].color, palette.color_for("AAPL"));
        assert_eq!(model.price_scale.domain, (0.0, 200.0));
        assert_eq!(model.y_ticks.first().map(|t| t.label.as_str()), Some("0"));
        assert_eq!(model.y_ticks.last().map(|t| t.position), Some(0.0));
        assert_eq!(model.x_ticks[0].label, "Mar 01");
    }

    #[test]
    fn empty_model_still_renders() {
        let model = ChartModel::build(&ChartLayout::default(), &[], &Palette::new());
        assert!(model.is_empty());
        assert!(model.time_scale.is_none());
        assert!(model.x_ticks.is_empty());
        assert!(model.tooltip(&Palette::new(), 10.0, 10.0).is_none());

        let svg = model.to_svg();
        assert!(svg.starts_with("<svg"));
        assert!(svg.ends_with("</svg>"));
        assert!(!svg.contains(r#"class="line""#));
    }

    #[test]
    fn svg_contains_lines_axes_and_label() {
        let palette = Palette::new();
        let model = ChartModel::build(&ChartLayout::default(), &sample_series(), &palette);
        let svg = model.to_svg();
        assert!(svg.contains(r#"width="1000" height="700""#));
        assert!(svg.contains(r#"translate(70, 100)"#));
        assert!(svg.contains("Price per share ($)"));
        assert!(svg.contains(r#"id="x-axis""#));
        assert!(svg.contains(r#"id="y-axis""#));
        assert!(svg.contains(r#"data-ticker="AAPL""#));
        assert!(svg.contains(r#"d="M0,275L880,0""#));
        assert_eq!(svg.matches(r#"class="line""#).count(), 2);
    }

    #[test]
    fn model_tooltip_uses_built_series() {
        let palette = Palette::new();
        let model = ChartModel::build(&ChartLayout::default(), &sample_series(), &palette);
        let tip = model.tooltip(&palette, 0.0, 0.0).unwrap();
        assert_eq!(tip.date, d(1));
        assert_eq!(tip.entries.len(), 2);
        assert_eq!(tip.entries[1].date, d(6));
    }
}
