//! # Terminal Rendering
//!
//! Renders sensor state for the terminal: a one-line summary used in logs and
//! an ASCII chart of a sensor's series for `--stdout` mode.

use chrono::{DateTime, Utc};

use crate::sensor::{Availability, Sensor};
use crate::Series;

/// Chart height in text rows
const ROWS: usize = 12;
/// Space for Y-axis labels
const Y_AXIS_WIDTH: usize = 8;
/// Widest chart body before the series is thinned out
const MAX_COLUMNS: usize = 96;

/// One-line summary, e.g. `Nordnes temperature: 11.59 Celsius (stale)`.
pub fn format_state(sensor: &Sensor) -> String {
    let state = sensor.state();
    let unit = state.unit_of_measurement.unwrap_or_default();
    match (state.availability, state.value) {
        (Availability::Available, Some(value)) => {
            format!("{}: {:.2} {}", state.name, value, unit).trim_end().to_string()
        }
        (Availability::Stale, Some(value)) => {
            format!("{}: {:.2} {} (stale)", state.name, value, unit)
        }
        _ => format!("{}: unavailable", state.name),
    }
}

/// Plot `series` as text rows. The point closest to `now` is marked with `X`.
///
/// Returns no rows when the series has no values.
pub fn render_chart(series: &Series, now: DateTime<Utc>) -> Vec<String> {
    let step = series.len().div_ceil(MAX_COLUMNS).max(1);
    let columns: Vec<(DateTime<Utc>, f64)> = series
        .points()
        .iter()
        .step_by(step)
        .filter_map(|point| point.value.map(|v| (point.time, v)))
        .collect();
    if columns.is_empty() {
        return Vec::new();
    }

    let (min, max) = columns
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), &(_, v)| {
            (min.min(v), max.max(v))
        });
    let span = if max > min { max - min } else { 1.0 };

    let value_to_row = |value: f64| {
        let normalized = (value - min) / span;
        ((1.0 - normalized) * (ROWS as f64 - 1.0)).round() as usize
    };

    let now_column = columns
        .iter()
        .enumerate()
        .min_by_key(|(_, (time, _))| (*time - now).num_seconds().abs())
        .map(|(i, _)| i);

    let mut grid = vec![vec![' '; columns.len() + Y_AXIS_WIDTH]; ROWS];

    // Y-axis: max at the top, min at the bottom
    for (row, value) in [(0, max), (ROWS - 1, min)] {
        let label = format!("{:>width$.2}", value, width = Y_AXIS_WIDTH - 2);
        for (i, ch) in label.chars().take(Y_AXIS_WIDTH - 1).enumerate() {
            grid[row][i] = ch;
        }
    }
    for row in grid.iter_mut() {
        row[Y_AXIS_WIDTH - 1] = '│';
    }

    for (column, &(_, value)) in columns.iter().enumerate() {
        let row = value_to_row(value).min(ROWS - 1);
        grid[row][column + Y_AXIS_WIDTH] = if Some(column) == now_column { 'X' } else { '•' };
    }

    let mut lines: Vec<String> = grid.into_iter().map(|row| row.into_iter().collect()).collect();

    let first = columns[0].0.format("%d/%m %H:%M").to_string();
    let last = columns[columns.len() - 1].0.format("%d/%m %H:%M").to_string();
    let gap = (columns.len() + 1).saturating_sub(first.len() + last.len()).max(1);
    lines.push(format!(
        "{}{}{}{}",
        " ".repeat(Y_AXIS_WIDTH),
        first,
        " ".repeat(gap),
        last
    ));
    lines
}

/// Print a sensor summary and its chart to stdout.
pub fn draw_ascii(sensor: &Sensor) {
    println!("{}", format_state(sensor));

    let Some(attrs) = sensor.attributes() else {
        if let Some(err) = sensor.last_error() {
            println!("  ⚠ {}", err);
        }
        println!();
        return;
    };

    println!(
        "  requested {:.4}, {:.4} at {} m; nearest grid {:.4}, {:.4}",
        attrs.latitude, attrs.longitude, attrs.depth, attrs.nearest_grid_lat, attrs.nearest_grid_lon
    );
    if let Some(model_depth) = attrs.model_depth {
        println!("  model layer at {} m", model_depth);
    }
    if attrs.stale {
        println!("  ⚠ STALE: {}", sensor.last_error().unwrap_or_default());
    }
    for line in render_chart(&attrs.series, Utc::now()) {
        println!("{}", line);
    }
    println!();
}
