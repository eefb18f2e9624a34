use std::collections::BTreeMap;
use std::ops::Range;
use std::path::Path;

use anyhow::{Context, Result};
use plotters::coord::Shift;
use plotters::prelude::*;
use serde::{Deserialize, Serialize};

use crate::aggregate::Trajectory;
use crate::plan::Condition;

/// Well-known key of the terminal comparison chart
pub const SUMMARY_KEY: &str = "summary_results";

/// Presentation settings for the comparison chart
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartConfig {
    /// Caption above the plot
    pub title: String,
    /// X axis description
    pub x_label: String,
    /// Y axis description
    pub y_label: String,
    /// Local file name; the extension picks the backend (`.svg` or bitmap)
    pub file_name: String,
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
    /// Opacity of the confidence band
    pub band_alpha: f64,
    /// Legend labels; conditions not listed use their display name
    pub labels: BTreeMap<Condition, String>,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            title: "Evolution of Puzzle-Solving".into(),
            x_label: "Generations".into(),
            y_label: "Avg Puzzles Solved".into(),
            file_name: "figure.png".into(),
            width: 800,
            height: 600,
            band_alpha: 0.3,
            labels: BTreeMap::new(),
        }
    }
}

/// One condition's band and mean line, in data coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct ChartSeries {
    pub condition: Condition,
    /// Legend text
    pub label: String,
    /// Line and band colour (RGB)
    pub color: (u8, u8, u8),
    /// `(t, mean)` per time step
    pub mean_line: Vec<(f64, f64)>,
    /// Closed outline: upper bound left to right, then lower bound back
    pub band: Vec<(f64, f64)>,
}

/// Everything needed to draw the comparison chart
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonChart {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    /// Pixel size (width, height)
    pub size: (u32, u32),
    pub band_alpha: f64,
    /// Shared x axis, covering every series
    pub x_range: Range<f64>,
    /// Shared y axis, padded around every band
    pub y_range: Range<f64>,
    /// One entry per condition, in condition order
    pub series: Vec<ChartSeries>,
}

/// matplotlib's C0 and C1
fn condition_color(condition: Condition) -> (u8, u8, u8) {
    match condition {
        Condition::Predictable => (31, 119, 180),
        Condition::Unpredictable => (255, 127, 14),
    }
}

impl ComparisonChart {
    /// Lay out one series per condition on shared axes
    pub fn build(trajectories: &BTreeMap<Condition, Trajectory>, config: &ChartConfig) -> Self {
        let mut series = Vec::with_capacity(trajectories.len());
        let mut x_min = f64::INFINITY;
        let mut x_max = f64::NEG_INFINITY;
        let mut y_min = f64::INFINITY;
        let mut y_max = f64::NEG_INFINITY;

        for (&condition, trajectory) in trajectories {
            let mean_line: Vec<(f64, f64)> = trajectory
                .points
                .iter()
                .map(|p| (p.t as f64, p.mean))
                .collect();
            let mut band: Vec<(f64, f64)> = trajectory
                .points
                .iter()
                .map(|p| (p.t as f64, p.ci_high))
                .collect();
            band.extend(trajectory.points.iter().rev().map(|p| (p.t as f64, p.ci_low)));

            for &(x, y) in &band {
                if x.is_finite() && y.is_finite() {
                    x_min = x_min.min(x);
                    x_max = x_max.max(x);
                    y_min = y_min.min(y);
                    y_max = y_max.max(y);
                }
            }

            let label = config
                .labels
                .get(&condition)
                .cloned()
                .unwrap_or_else(|| condition.display_name().to_string());
            series.push(ChartSeries {
                condition,
                label,
                color: condition_color(condition),
                mean_line,
                band,
            });
        }

        Self {
            title: config.title.clone(),
            x_label: config.x_label.clone(),
            y_label: config.y_label.clone(),
            size: (config.width, config.height),
            band_alpha: config.band_alpha,
            x_range: padded_range(x_min, x_max, 0.0),
            y_range: padded_range(y_min, y_max, 0.1),
            series,
        }
    }
}

/// `min..max` widened by `pad_ratio` of the span; flat or empty data still
/// gets a non-empty range
fn padded_range(min: f64, max: f64, pad_ratio: f64) -> Range<f64> {
    if !min.is_finite() || !max.is_finite() {
        return 0.0..1.0;
    }
    let span = max - min;
    let pad = if span > 1e-9 {
        pad_ratio * span
    } else {
        0.1 * max.abs().max(1.0)
    };
    (min - pad)..(max + pad)
}

/// Render `chart` to `path`
pub fn render(chart: &ComparisonChart, path: &Path) -> Result<()> {
    let is_svg = path
        .extension()
        .map_or(false, |ext| ext.eq_ignore_ascii_case("svg"));
    let drawn = if is_svg {
        let root = SVGBackend::new(path, chart.size).into_drawing_area();
        draw(&root, chart)
    } else {
        let root = BitMapBackend::new(path, chart.size).into_drawing_area();
        draw(&root, chart)
    };
    drawn.context(format!("Failed to render chart to {}", path.display()))
}

fn draw<DB: DrawingBackend>(root: &DrawingArea<DB, Shift>, chart: &ComparisonChart) -> Result<()>
where
    DB::ErrorType: 'static,
{
    root.fill(&WHITE)?;
    let mut ctx = ChartBuilder::on(root)
        .caption(&chart.title, ("sans-serif", 20))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(chart.x_range.clone(), chart.y_range.clone())?;

    ctx.configure_mesh()
        .x_desc(chart.x_label.as_str())
        .y_desc(chart.y_label.as_str())
        .draw()?;

    for series in &chart.series {
        let (r, g, b) = series.color;
        let color = RGBColor(r, g, b);
        if series.band.len() >= 2 {
            ctx.draw_series(std::iter::once(Polygon::new(
                series.band.clone(),
                color.mix(chart.band_alpha).filled(),
            )))?;
        }
        ctx.draw_series(LineSeries::new(series.mean_line.iter().copied(), &color))?
            .label(series.label.as_str())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
    }

    ctx.configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;

    root.present()?;
    Ok(())
}
