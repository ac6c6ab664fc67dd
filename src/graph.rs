use log::debug;
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::full_palette::{GREY, ORANGE, PURPLE};
use plotters::style::text_anchor::{HPos, Pos, VPos};
use std::error::Error;
use std::fmt;
use std::fs;
use std::ops::Range;
use std::path::Path;
use std::str::FromStr;

use chrono::DateTime;

use crate::config::ChartConfig;
use crate::error::{HydrateError, Result};
use crate::record::{
    INSTANTANEOUS, PREDICTION, RAW_COLUMNS, SETPOINT, TIME, VALVE_PERCENT, parse_timestamp,
};
use crate::risk::{HIGH_THRESHOLD, RiskBand};
use crate::table::{Table, is_missing};

type DrawResult<T> = std::result::Result<T, Box<dyn Error>>;

const HISTOGRAM_BINS: usize = 30;

/// Chart types offered for an uploaded dataset
///
/// The set is closed; every kind declares the columns it needs through
/// [`ChartKind::required_columns`], which is checked before any rendering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChartKind {
    /// 2x2 grid of the raw pipeline signals and the prediction
    TimeSeries,

    /// Pairwise Pearson correlation of every numeric column
    CorrelationHeatmap,

    /// 30-bin histogram of predicted likelihood
    RiskDistribution,

    /// Valve opening against instantaneous volume, coloured by prediction
    ValveVsVolume,

    /// Predicted likelihood over time, one line per risk band
    RiskTimeline,
}

impl ChartKind {
    pub const ALL: [ChartKind; 5] = [
        ChartKind::TimeSeries,
        ChartKind::CorrelationHeatmap,
        ChartKind::RiskDistribution,
        ChartKind::ValveVsVolume,
        ChartKind::RiskTimeline,
    ];

    /// Name shown in the chart picker
    pub fn label(self) -> &'static str {
        match self {
            ChartKind::TimeSeries => "Time Series - All Variables",
            ChartKind::CorrelationHeatmap => "Correlation Heatmap",
            ChartKind::RiskDistribution => "Hydrate Risk Distribution",
            ChartKind::ValveVsVolume => "Valve vs Volume Relationship",
            ChartKind::RiskTimeline => "Risk Alert Timeline",
        }
    }

    /// Short name used on the command line and in file names
    pub fn slug(self) -> &'static str {
        match self {
            ChartKind::TimeSeries => "time-series",
            ChartKind::CorrelationHeatmap => "correlation",
            ChartKind::RiskDistribution => "distribution",
            ChartKind::ValveVsVolume => "valve-volume",
            ChartKind::RiskTimeline => "timeline",
        }
    }

    pub fn required_columns(self) -> &'static [&'static str] {
        match self {
            ChartKind::TimeSeries => &RAW_COLUMNS,
            ChartKind::CorrelationHeatmap => &[],
            ChartKind::RiskDistribution | ChartKind::RiskTimeline => &[PREDICTION],
            ChartKind::ValveVsVolume => &[VALVE_PERCENT, INSTANTANEOUS],
        }
    }

    fn title(self, dataset_name: &str) -> String {
        let prefix = match self {
            ChartKind::TimeSeries => "Time Series Analysis",
            ChartKind::CorrelationHeatmap => "Correlation Matrix",
            ChartKind::RiskDistribution => "Hydrate Risk Distribution",
            ChartKind::ValveVsVolume => "Valve vs Volume Relationship",
            ChartKind::RiskTimeline => "Hydrate Risk Timeline",
        };
        format!("{} - {}", prefix, dataset_name)
    }
}

impl fmt::Display for ChartKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ChartKind {
    type Err = HydrateError;

    /// Accepts the picker label or the slug, ignoring case
    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        ChartKind::ALL
            .into_iter()
            .find(|kind| {
                kind.slug().eq_ignore_ascii_case(wanted) || kind.label().eq_ignore_ascii_case(wanted)
            })
            .ok_or_else(|| HydrateError::compute(format!("Unknown chart type: {}", s)))
    }
}

/// Why a chart could not be drawn for a table
#[derive(Clone, Debug, PartialEq)]
pub enum Unavailable {
    MissingColumns(Vec<String>),
    NoNumericColumns,
    EmptyTable,
}

impl fmt::Display for Unavailable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Unavailable::MissingColumns(columns) => {
                write!(f, "Missing required columns: {}", columns.join(", "))
            }
            Unavailable::NoNumericColumns => f.write_str("No numeric columns to correlate"),
            Unavailable::EmptyTable => f.write_str("Dataset has no rows"),
        }
    }
}

/// A rendered SVG chart
#[derive(Clone, Debug)]
pub struct Chart {
    pub kind: ChartKind,
    pub title: String,
    pub svg: String,
}

impl Chart {
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, &self.svg)?;
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub enum ChartOutcome {
    Rendered(Chart),
    Unavailable(Unavailable),
}

impl ChartOutcome {
    pub fn chart(&self) -> Option<&Chart> {
        match self {
            ChartOutcome::Rendered(chart) => Some(chart),
            ChartOutcome::Unavailable(_) => None,
        }
    }
}

/// Creates a chart from a dataset
///
/// Required columns are checked first; a missing column yields
/// `ChartOutcome::Unavailable` rather than an error. Every call renders from
/// the table as given.
///
/// # Arguments
/// * `table` - The dataset, with the prediction column if it was scored
/// * `kind` - Which chart to draw
/// * `dataset_name` - Used in the chart title
/// * `options` - Pixel size
///
/// # Returns
/// * `Result<ChartOutcome>` - The SVG chart, or the reason it is unavailable
///
/// # Errors
/// * `ComputeFailure` if a needed column holds text or drawing fails
/// * `Config` if the chart size is zero
///
/// # Examples
/// ```
/// use hydrate_alert::config::ChartConfig;
/// use hydrate_alert::graph::{ChartKind, ChartOutcome, create_chart};
/// use hydrate_alert::loader::from_csv_bytes;
///
/// let table = from_csv_bytes(b"Inj Gas Meter Volume Instantaneous\n410.5\n").unwrap();
/// let outcome = create_chart(&table, ChartKind::ValveVsVolume, "march", &ChartConfig::default()).unwrap();
/// assert!(matches!(outcome, ChartOutcome::Unavailable(_)));
/// ```
pub fn create_chart(
    table: &Table,
    kind: ChartKind,
    dataset_name: &str,
    options: &ChartConfig,
) -> Result<ChartOutcome> {
    options.validate()?;
    let missing = table.missing_columns(kind.required_columns());
    if !missing.is_empty() {
        debug!("{} unavailable, missing {:?}", kind, missing);
        return Ok(ChartOutcome::Unavailable(Unavailable::MissingColumns(missing)));
    }
    if table.is_empty() {
        return Ok(ChartOutcome::Unavailable(Unavailable::EmptyTable));
    }

    let title = kind.title(dataset_name);
    let size = (options.width, options.height);
    let x_axis = XAxis::from_table(table);

    let rendered = match kind {
        ChartKind::TimeSeries => {
            let prediction = optional_column(table, PREDICTION)?;
            render_time_series(
                &title,
                size,
                &x_axis,
                [
                    table.numeric_column(INSTANTANEOUS)?,
                    table.numeric_column(SETPOINT)?,
                    table.numeric_column(VALVE_PERCENT)?,
                ],
                prediction,
            )
        }
        ChartKind::CorrelationHeatmap => {
            let columns = table.numeric_columns();
            if columns.is_empty() {
                return Ok(ChartOutcome::Unavailable(Unavailable::NoNumericColumns));
            }
            render_heatmap(&title, size, &columns)
        }
        ChartKind::RiskDistribution => {
            render_histogram(&title, size, &table.numeric_column(PREDICTION)?)
        }
        ChartKind::ValveVsVolume => render_scatter(
            &title,
            size,
            &table.numeric_column(VALVE_PERCENT)?,
            &table.numeric_column(INSTANTANEOUS)?,
            optional_column(table, PREDICTION)?.as_deref(),
        ),
        ChartKind::RiskTimeline => {
            render_timeline(&title, size, &x_axis, &table.numeric_column(PREDICTION)?)
        }
    };

    let svg = rendered
        .map_err(|e| HydrateError::compute(format!("Error creating {}: {}", kind, e)))?;
    Ok(ChartOutcome::Rendered(Chart { kind, title, svg }))
}

fn optional_column(table: &Table, name: &str) -> Result<Option<Vec<Option<f64>>>> {
    if table.has_column(name) {
        table.numeric_column(name).map(Some)
    } else {
        Ok(None)
    }
}

/// Horizontal axis: epoch seconds when every `Time` cell parses, else row index
struct XAxis {
    values: Vec<f64>,
    is_time: bool,
}

impl XAxis {
    fn from_table(table: &Table) -> Self {
        let times: Option<Vec<f64>> = table.text_column(TIME).ok().and_then(|cells| {
            cells
                .into_iter()
                .map(|cell| {
                    if is_missing(cell) {
                        return None;
                    }
                    parse_timestamp(cell).map(|ts| ts.and_utc().timestamp() as f64)
                })
                .collect()
        });

        match times {
            Some(values) => XAxis {
                values,
                is_time: true,
            },
            None => XAxis {
                values: (0..table.len()).map(|i| i as f64).collect(),
                is_time: false,
            },
        }
    }

    fn range(&self) -> Range<f64> {
        value_range(self.values.iter().copied())
    }

    fn label(&self) -> &'static str {
        if self.is_time { "Time" } else { "Row" }
    }

    fn format(&self, value: f64) -> String {
        if self.is_time {
            DateTime::from_timestamp(value as i64, 0)
                .map(|dt| dt.format("%m-%d %H:%M").to_string())
                .unwrap_or_default()
        } else {
            format!("{:.0}", value)
        }
    }

    /// Points whose y value is present and finite
    fn points(&self, ys: &[Option<f64>]) -> Vec<(f64, f64)> {
        self.values
            .iter()
            .zip(ys)
            .filter_map(|(&x, y)| y.filter(|v| v.is_finite()).map(|y| (x, y)))
            .collect()
    }
}

/// Axis range over the finite values, padded by 5%
fn value_range<I: IntoIterator<Item = f64>>(values: I) -> Range<f64> {
    let (min, max) = values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });

    if !min.is_finite() {
        return 0.0..1.0;
    }
    if min == max {
        return (min - 0.5)..(max + 0.5);
    }
    let pad = (max - min) * 0.05;
    (min - pad)..(max + pad)
}

fn render_time_series(
    title: &str,
    size: (u32, u32),
    x_axis: &XAxis,
    raw: [Vec<Option<f64>>; 3],
    prediction: Option<Vec<Option<f64>>>,
) -> DrawResult<String> {
    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, size).into_drawing_area();
        root.fill(&WHITE)?;
        let root = root.titled(title, ("sans-serif", 30))?;
        let panels = root.split_evenly((2, 2));

        let [instantaneous, setpoint, valve] = raw;
        draw_line_panel(&panels[0], "Volume Instantaneous", x_axis, &instantaneous, &BLUE)?;
        draw_line_panel(&panels[1], "Volume Setpoint", x_axis, &setpoint, &RED)?;
        draw_line_panel(&panels[2], "Valve Percent Open", x_axis, &valve, &GREEN)?;

        match prediction {
            Some(values) => {
                draw_line_panel(&panels[3], "Hydrate Likelihood", x_axis, &values, &ORANGE)?
            }
            None => {
                let flat = vec![Some(0.0); x_axis.values.len()];
                draw_line_panel(&panels[3], "No Predictions Available", x_axis, &flat, &GREY)?
            }
        }

        root.present()?;
    }
    Ok(svg)
}

fn draw_line_panel(
    area: &DrawingArea<SVGBackend<'_>, Shift>,
    caption: &str,
    x_axis: &XAxis,
    values: &[Option<f64>],
    color: &RGBColor,
) -> DrawResult<()> {
    let points = x_axis.points(values);
    let y_range = value_range(points.iter().map(|&(_, y)| y));

    let mut chart = ChartBuilder::on(area)
        .caption(caption, ("sans-serif", 18).into_font())
        .margin(10)
        .x_label_area_size(30)
        .y_label_area_size(50)
        .build_cartesian_2d(x_axis.range(), y_range)?;

    chart
        .configure_mesh()
        .x_labels(4)
        .x_label_formatter(&|x| x_axis.format(*x))
        .x_desc(x_axis.label())
        .draw()?;

    chart.draw_series(LineSeries::new(points, color))?;
    Ok(())
}

/// Pearson correlation over rows where both values are present and finite
fn pearson(a: &[Option<f64>], b: &[Option<f64>]) -> f64 {
    let pairs: Vec<(f64, f64)> = a
        .iter()
        .zip(b)
        .filter_map(|(x, y)| match (x, y) {
            (Some(x), Some(y)) if x.is_finite() && y.is_finite() => Some((*x, *y)),
            _ => None,
        })
        .collect();
    if pairs.len() < 2 {
        return f64::NAN;
    }

    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|p| p.1).sum::<f64>() / n;
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (x, y) in &pairs {
        let dx = x - mean_x;
        let dy = y - mean_y;
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }

    if sxx == 0.0 || syy == 0.0 {
        f64::NAN
    } else {
        (sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0)
    }
}

/// Diverging blue-white-red scale for r in [-1, 1]
fn correlation_color(r: f64) -> RGBColor {
    if r.is_nan() {
        return RGBColor(200, 200, 200);
    }
    let blend = |from: (u8, u8, u8), t: f64| {
        let mix = |a: u8| (a as f64 + (255.0 - a as f64) * (1.0 - t)).round() as u8;
        RGBColor(mix(from.0), mix(from.1), mix(from.2))
    };
    if r < 0.0 {
        blend((33, 102, 172), -r)
    } else {
        blend((178, 24, 43), r)
    }
}

fn truncate_label(name: &str) -> String {
    const MAX: usize = 18;
    if name.chars().count() <= MAX {
        name.to_string()
    } else {
        let head: String = name.chars().take(MAX - 3).collect();
        format!("{}...", head)
    }
}

fn render_heatmap(
    title: &str,
    size: (u32, u32),
    columns: &[(&str, Vec<Option<f64>>)],
) -> DrawResult<String> {
    let n = columns.len();
    let matrix: Vec<Vec<f64>> = columns
        .iter()
        .map(|(_, a)| columns.iter().map(|(_, b)| pearson(a, b)).collect())
        .collect();

    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, size).into_drawing_area();
        root.fill(&WHITE)?;

        let extent = n as f64;
        let mut chart = ChartBuilder::on(&root)
            .caption(title, ("sans-serif", 30).into_font())
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(140)
            .build_cartesian_2d(0.0..extent, 0.0..extent)?;

        // first column on the top row
        let row_of = |i: usize| (n - 1 - i) as f64;

        chart.draw_series(matrix.iter().enumerate().flat_map(|(i, row)| {
            row.iter().enumerate().map(move |(j, &r)| {
                let y = row_of(i);
                Rectangle::new(
                    [(j as f64, y), (j as f64 + 1.0, y + 1.0)],
                    correlation_color(r).filled(),
                )
            })
        }))?;

        let value_style = |r: f64| {
            let style = TextStyle::from(("sans-serif", 14).into_font())
                .pos(Pos::new(HPos::Center, VPos::Center));
            if r.abs() > 0.6 { style.color(&WHITE) } else { style.color(&BLACK) }
        };
        chart.draw_series(matrix.iter().enumerate().flat_map(|(i, row)| {
            row.iter().enumerate().map(move |(j, &r)| {
                let text = if r.is_nan() { "nan".to_string() } else { format!("{:.2}", r) };
                Text::new(text, (j as f64 + 0.5, row_of(i) + 0.5), value_style(r))
            })
        }))?;

        let left = TextStyle::from(("sans-serif", 13).into_font())
            .pos(Pos::new(HPos::Right, VPos::Center));
        let below = TextStyle::from(("sans-serif", 13).into_font())
            .pos(Pos::new(HPos::Center, VPos::Top));
        for (i, (name, _)) in columns.iter().enumerate() {
            let (x, y) = chart.backend_coord(&(0.0, row_of(i) + 0.5));
            root.draw(&Text::new(truncate_label(name), (x - 6, y), left.clone()))?;

            let (x, y) = chart.backend_coord(&(i as f64 + 0.5, 0.0));
            root.draw(&Text::new(truncate_label(name), (x, y + 6), below.clone()))?;
        }

        root.present()?;
    }
    Ok(svg)
}

fn render_histogram(title: &str, size: (u32, u32), values: &[Option<f64>]) -> DrawResult<String> {
    let values: Vec<f64> = values.iter().flatten().copied().filter(|v| v.is_finite()).collect();

    let (lo, hi) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let (lo, hi) = if values.is_empty() {
        (0.0, 1.0)
    } else if lo == hi {
        (lo - 0.5, hi + 0.5)
    } else {
        (lo, hi)
    };

    let width = (hi - lo) / HISTOGRAM_BINS as f64;
    let mut counts = [0usize; HISTOGRAM_BINS];
    for v in &values {
        let bin = (((v - lo) / width) as usize).min(HISTOGRAM_BINS - 1);
        counts[bin] += 1;
    }
    let max_count = counts.iter().copied().max().unwrap_or(0);

    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, size).into_drawing_area();
        root.fill(&WHITE)?;

        let mut chart = ChartBuilder::on(&root)
            .caption(title, ("sans-serif", 30).into_font())
            .margin(10)
            .x_label_area_size(30)
            .y_label_area_size(40)
            .build_cartesian_2d(lo..hi, 0.0..(max_count as f64 + 1.0))?;

        chart
            .configure_mesh()
            .x_desc(PREDICTION)
            .y_desc("count")
            .draw()?;

        chart.draw_series(counts.iter().enumerate().map(|(i, &count)| {
            let x0 = lo + i as f64 * width;
            Rectangle::new([(x0, 0.0), (x0 + width, count as f64)], ORANGE.mix(0.7).filled())
        }))?;

        root.present()?;
    }
    Ok(svg)
}

fn render_scatter(
    title: &str,
    size: (u32, u32),
    valve: &[Option<f64>],
    volume: &[Option<f64>],
    prediction: Option<&[Option<f64>]>,
) -> DrawResult<String> {
    let points: Vec<(f64, f64, Option<f64>)> = valve
        .iter()
        .zip(volume)
        .enumerate()
        .filter_map(|(i, (x, y))| match (x, y) {
            (Some(x), Some(y)) if x.is_finite() && y.is_finite() => {
                let p = prediction.and_then(|p| p[i]).filter(|v| v.is_finite());
                Some((*x, *y, p))
            }
            _ => None,
        })
        .collect();

    let p_range = value_range(points.iter().filter_map(|p| p.2));
    let shade = |p: Option<f64>| -> ShapeStyle {
        match (prediction, p) {
            (None, _) => BLUE.mix(0.7).filled(),
            (Some(_), None) => GREY.filled(),
            (Some(_), Some(p)) => {
                let t = ((p - p_range.start) / (p_range.end - p_range.start)).clamp(0.0, 1.0);
                HSLColor(0.66 * (1.0 - t), 0.85, 0.45).filled()
            }
        }
    };

    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, size).into_drawing_area();
        root.fill(&WHITE)?;

        let mut chart = ChartBuilder::on(&root)
            .caption(title, ("sans-serif", 30).into_font())
            .margin(10)
            .x_label_area_size(30)
            .y_label_area_size(50)
            .build_cartesian_2d(
                value_range(points.iter().map(|p| p.0)),
                value_range(points.iter().map(|p| p.1)),
            )?;

        chart
            .configure_mesh()
            .x_desc(VALVE_PERCENT)
            .y_desc(INSTANTANEOUS)
            .draw()?;

        chart.draw_series(
            points
                .iter()
                .map(|&(x, y, p)| Circle::new((x, y), 3, shade(p))),
        )?;

        root.present()?;
    }
    Ok(svg)
}

fn band_color(band: RiskBand) -> RGBColor {
    match band {
        RiskBand::Low => GREEN,
        RiskBand::Medium => ORANGE,
        RiskBand::High => RED,
        RiskBand::Critical => PURPLE,
    }
}

fn render_timeline(
    title: &str,
    size: (u32, u32),
    x_axis: &XAxis,
    predictions: &[Option<f64>],
) -> DrawResult<String> {
    let points = x_axis.points(predictions);
    let x_range = x_axis.range();
    let y_range = value_range(
        points
            .iter()
            .map(|&(_, y)| y)
            .chain(std::iter::once(HIGH_THRESHOLD)),
    );

    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, size).into_drawing_area();
        root.fill(&WHITE)?;

        let mut chart = ChartBuilder::on(&root)
            .caption(title, ("sans-serif", 30).into_font())
            .margin(10)
            .x_label_area_size(30)
            .y_label_area_size(40)
            .build_cartesian_2d(x_range.clone(), y_range)?;

        chart
            .configure_mesh()
            .x_label_formatter(&|x| x_axis.format(*x))
            .x_desc(x_axis.label())
            .y_desc(PREDICTION)
            .draw()?;

        for band in RiskBand::ALL {
            let band_points: Vec<(f64, f64)> = points
                .iter()
                .copied()
                .filter(|&(_, y)| RiskBand::classify(y) == band)
                .collect();
            if band_points.is_empty() {
                continue;
            }
            let color = band_color(band);
            chart
                .draw_series(LineSeries::new(band_points, &color))?
                .label(band.label())
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &color));
        }

        chart
            .draw_series(LineSeries::new(
                vec![(x_range.start, HIGH_THRESHOLD), (x_range.end, HIGH_THRESHOLD)],
                RED.stroke_width(2),
            ))?
            .label("High Risk Threshold")
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], RED.stroke_width(2)));

        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()?;

        root.present()?;
    }
    Ok(svg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::from_csv_bytes;

    fn scored_table() -> Table {
        let mut csv = String::from(
            "Time,Inj Gas Meter Volume Instantaneous,Inj Gas Meter Volume Setpoint,Inj Gas Valve Percent Open,Predicted_Hydrate_Likelihood\n",
        );
        for i in 0..12 {
            csv.push_str(&format!(
                "2024-05-01 {:02}:00:00,{},400,{},{}\n",
                i,
                400 + i * 3,
                20 + i * 5,
                i as f64 * 0.75
            ));
        }
        from_csv_bytes(csv.as_bytes()).unwrap()
    }

    fn render(table: &Table, kind: ChartKind) -> ChartOutcome {
        create_chart(table, kind, "pad-7", &ChartConfig::default()).unwrap()
    }

    #[test]
    fn every_kind_renders_for_a_scored_table() {
        let table = scored_table();
        for kind in ChartKind::ALL {
            match render(&table, kind) {
                ChartOutcome::Rendered(chart) => {
                    assert!(chart.svg.contains("<svg"), "{}", kind);
                    assert!(chart.title.ends_with("pad-7"));
                }
                ChartOutcome::Unavailable(reason) => panic!("{} unavailable: {}", kind, reason),
            }
        }
    }

    #[test]
    fn missing_valve_column_is_unavailable() {
        let csv = "Inj Gas Meter Volume Instantaneous,Inj Gas Meter Volume Setpoint\n410,400\n";
        let table = from_csv_bytes(csv.as_bytes()).unwrap();
        match render(&table, ChartKind::ValveVsVolume) {
            ChartOutcome::Unavailable(Unavailable::MissingColumns(cols)) => {
                assert_eq!(cols, vec![VALVE_PERCENT.to_string()]);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn prediction_charts_need_predictions() {
        let csv = "Inj Gas Meter Volume Instantaneous,Inj Gas Meter Volume Setpoint,Inj Gas Valve Percent Open\n410,400,50\n";
        let table = from_csv_bytes(csv.as_bytes()).unwrap();
        assert!(render(&table, ChartKind::RiskDistribution).chart().is_none());
        assert!(render(&table, ChartKind::RiskTimeline).chart().is_none());

        let chart = render(&table, ChartKind::TimeSeries);
        assert!(chart.chart().unwrap().svg.contains("No Predictions Available"));
    }

    #[test]
    fn heatmap_needs_a_numeric_column() {
        let table = from_csv_bytes(b"Site,Operator\nnorth,ana\n").unwrap();
        assert!(matches!(
            render(&table, ChartKind::CorrelationHeatmap),
            ChartOutcome::Unavailable(Unavailable::NoNumericColumns)
        ));
    }

    #[test]
    fn chart_kind_parses_labels_and_slugs() {
        assert_eq!("timeline".parse::<ChartKind>().unwrap(), ChartKind::RiskTimeline);
        assert_eq!(
            "correlation heatmap".parse::<ChartKind>().unwrap(),
            ChartKind::CorrelationHeatmap
        );
        assert!("pie".parse::<ChartKind>().is_err());
    }

    #[test]
    fn pearson_handles_gaps_and_constants() {
        let a = [Some(1.0), Some(2.0), None, Some(4.0)];
        let b = [Some(2.0), Some(4.0), Some(100.0), Some(8.0)];
        assert!((pearson(&a, &b) - 1.0).abs() < 1e-12);
        assert!(pearson(&a, &[Some(1.0); 4]).is_nan());
    }

    #[test]
    fn zero_sized_chart_is_a_config_error() {
        let table = from_csv_bytes(b"a,b\n1,2\n3,5\n").unwrap();
        let options = ChartConfig {
            width: 0,
            height: 600,
        };
        assert!(matches!(
            create_chart(&table, ChartKind::CorrelationHeatmap, "t", &options),
            Err(HydrateError::Config(_))
        ));
    }

    #[test]
    fn unparseable_time_falls_back_to_row_index() {
        let csv = "Time,v\n2024-01-01 00:00:00,1\nlater,2\n";
        let axis = XAxis::from_table(&from_csv_bytes(csv.as_bytes()).unwrap());
        assert!(!axis.is_time);
        assert_eq!(axis.values, vec![0.0, 1.0]);
    }
}
