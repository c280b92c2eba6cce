use crate::errors::RenderError;
use crate::models::{LogRecord, SeriesPoint};
use crate::storage::LogStore;
use chrono::NaiveDate;
use maud::{Markup, html};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::info;

const WIDTH: f64 = 1200.0;
const HEIGHT: f64 = 600.0;
const MARGIN_LEFT: f64 = 80.0;
const MARGIN_RIGHT: f64 = 40.0;
const MARGIN_TOP: f64 = 50.0;
const MARGIN_BOTTOM: f64 = 110.0;

const MAX_DATE_TICKS: i64 = 12;
const TICK_STEPS_DAYS: [i64; 10] = [1, 2, 3, 7, 14, 28, 56, 91, 182, 364];
const Y_TICKS: u64 = 4;

const TEXT_STYLE: &str = "fill: #222; font-family: sans-serif";
const GRID_STYLE: &str = "stroke: #ccc; stroke-width: 0.5; stroke-dasharray: 4 3";
const LINE_COLOR: &str = "#1f77b4";

/// Daily attempts over date with a zero anchor one day before the first
/// record. `None` when the segment has no records.
pub fn daily_series(records: &[LogRecord]) -> Option<Vec<SeriesPoint>> {
    let mut sorted: Vec<&LogRecord> = records.iter().collect();
    sorted.sort_by_key(|record| record.date);
    let first = sorted.first()?;

    let mut series = Vec::with_capacity(sorted.len() + 1);
    if let Some(anchor) = first.date.pred_opt() {
        series.push(SeriesPoint {
            date: anchor,
            daily_attempts: 0,
        });
    }
    series.extend(sorted.iter().map(|record| SeriesPoint {
        date: record.date,
        daily_attempts: record.daily_attempts,
    }));
    Some(series)
}

/// Evenly spaced date ticks, at most [`MAX_DATE_TICKS`] of them, starting at
/// `start`.
pub fn date_ticks(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let span = (end - start).num_days().max(0);
    let step = TICK_STEPS_DAYS
        .iter()
        .copied()
        .find(|step| span / step + 1 <= MAX_DATE_TICKS)
        .unwrap_or_else(|| span / (MAX_DATE_TICKS - 1) + 1);

    (0..=span / step)
        .filter_map(|k| start.checked_add_days(chrono::Days::new((k * step) as u64)))
        .collect()
}

/// Rounds up to 1, 2 or 5 times a power of ten. Zero maps to 1 so the axis
/// never collapses; values too close to `u64::MAX` to round stay as they are.
fn nice_ceiling(max: u64) -> u64 {
    if max == 0 {
        return 1;
    }
    let mut magnitude = 1_u64;
    while let Some(next) = magnitude.checked_mul(10).filter(|next| *next <= max) {
        magnitude = next;
    }
    [1, 2, 5, 10]
        .into_iter()
        .filter_map(|factor| magnitude.checked_mul(factor))
        .find(|candidate| *candidate >= max)
        .unwrap_or(max)
}

/// The `i`-th of [`Y_TICKS`] even steps from 0 to `y_max`.
fn y_tick(y_max: u64, i: u64) -> u64 {
    let value = u128::from(y_max) * u128::from(i) / u128::from(Y_TICKS);
    u64::try_from(value).unwrap_or(y_max)
}

pub fn chart_path(chart_dir: &Path, segment_id: u64) -> PathBuf {
    chart_dir.join(format!("segment_{segment_id}_plot.svg"))
}

pub fn render_svg(segment_id: u64, segment_name: &str, series: &[SeriesPoint]) -> Markup {
    let chart_w = WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
    let chart_h = HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;
    let bottom = MARGIN_TOP + chart_h;

    let (start, end) = match (series.first(), series.last()) {
        (Some(first), Some(last)) => (first.date, last.date),
        _ => return html! {},
    };
    let span_days = (end - start).num_days().max(1) as f64;
    let y_max = nice_ceiling(series.iter().map(|p| p.daily_attempts).max().unwrap_or(0));

    let x_of = |date: NaiveDate| {
        if start == end {
            MARGIN_LEFT + chart_w / 2.0
        } else {
            MARGIN_LEFT + ((date - start).num_days() as f64 / span_days) * chart_w
        }
    };
    let y_of = |value: u64| bottom - (value as f64 / y_max as f64) * chart_h;

    let points = series
        .iter()
        .map(|point| format!("{:.1},{:.1}", x_of(point.date), y_of(point.daily_attempts)))
        .collect::<Vec<_>>()
        .join(" ");

    let mut y_ticks: Vec<u64> = (0..=Y_TICKS).map(|i| y_tick(y_max, i)).collect();
    y_ticks.dedup();
    let x_ticks = date_ticks(start, end);
    let title = format!("Daily Attempts on Segment: {segment_name} ({segment_id})");

    html! {
        svg viewBox=(format!("0 0 {WIDTH} {HEIGHT}")) width=(WIDTH) height=(HEIGHT) xmlns="http://www.w3.org/2000/svg" {
            rect width=(WIDTH) height=(HEIGHT) style="fill: #fff" {}
            text x=(WIDTH / 2.0) y="28" font-size="18" text-anchor="middle" style=(TEXT_STYLE) { (title) }

            @for value in &y_ticks {
                @let y = y_of(*value);
                line x1=(MARGIN_LEFT) y1=(y) x2=(MARGIN_LEFT + chart_w) y2=(y) style=(GRID_STYLE) {}
                text x=(MARGIN_LEFT - 8.0) y=(y + 4.0) font-size="12" text-anchor="end" style=(TEXT_STYLE) { (value) }
            }
            @for date in &x_ticks {
                @let x = x_of(*date);
                @let label_y = bottom + 18.0;
                line x1=(x) y1=(MARGIN_TOP) x2=(x) y2=(bottom) style=(GRID_STYLE) {}
                text x=(x) y=(label_y) font-size="12" text-anchor="end" transform=(format!("rotate(-30 {x} {label_y})")) style=(TEXT_STYLE) {
                    (date.format("%Y-%m-%d").to_string())
                }
            }

            line x1=(MARGIN_LEFT) y1=(bottom) x2=(MARGIN_LEFT + chart_w) y2=(bottom) stroke="#222" {}
            line x1=(MARGIN_LEFT) y1=(MARGIN_TOP) x2=(MARGIN_LEFT) y2=(bottom) stroke="#222" {}

            polyline points=(points) fill="none" stroke=(LINE_COLOR) stroke-width="2" {}
            @for point in series {
                circle cx=(x_of(point.date)) cy=(y_of(point.daily_attempts)) r="4" fill=(LINE_COLOR) {
                    title { (point.date.format("%Y-%m-%d").to_string()) ": " (point.daily_attempts) }
                }
            }

            text x=(MARGIN_LEFT + chart_w / 2.0) y=(HEIGHT - 12.0) font-size="14" text-anchor="middle" style=(TEXT_STYLE) { "Date" }
            @let y_label_x = 22.0;
            @let y_label_y = MARGIN_TOP + chart_h / 2.0;
            text x=(y_label_x) y=(y_label_y) font-size="14" text-anchor="middle" transform=(format!("rotate(-90 {y_label_x} {y_label_y})")) style=(TEXT_STYLE) {
                "Attempts Recorded That Day"
            }
        }
    }
}

/// Writes the chart for one segment. `Ok(None)` when the log holds nothing
/// for it.
pub fn render<S: LogStore>(
    segment_id: u64,
    segment_name: &str,
    store: &S,
    chart_dir: &Path,
) -> Result<Option<PathBuf>, RenderError> {
    let Some(series) = daily_series(&store.query(segment_id)) else {
        info!("chart skipped for segment {segment_id}: no log records");
        return Ok(None);
    };

    let path = chart_path(chart_dir, segment_id);
    let io_error = |source: std::io::Error| RenderError::Io {
        path: path.display().to_string(),
        source,
    };
    fs::create_dir_all(chart_dir).map_err(io_error)?;
    fs::write(&path, render_svg(segment_id, segment_name, &series).into_string()).map_err(io_error)?;

    info!("chart for segment {segment_id} saved to {}", path.display());
    Ok(Some(path))
}
