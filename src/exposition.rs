//! Prometheus text exposition rendering.

use std::collections::BTreeMap;
use std::io::Write;

use crate::snapshot::{SensorReading, Snapshot};

/// Render a snapshot in Prometheus exposition format.
///
/// Readings are grouped into one metric per hardware group and unit,
/// e.g. `hw_cpu_percent` or `hw_thermal_celsius`. All metrics are
/// gauges. Output is sorted by metric name and series id, so the same
/// snapshot always renders to the same text.
pub fn render(snapshot: &Snapshot, host: &str) -> String {
    let mut by_name: BTreeMap<String, Vec<&SensorReading>> = BTreeMap::new();
    for reading in &snapshot.readings {
        by_name
            .entry(metric_name(reading))
            .or_default()
            .push(reading);
    }

    let mut output = Vec::with_capacity(snapshot.readings.len() * 100);

    for (name, mut series) in by_name {
        series.sort_by(|a, b| a.identifier.cmp(&b.identifier));

        writeln!(output, "# TYPE {} gauge", name).ok();
        for reading in series {
            writeln!(
                output,
                "{}{{hardware=\"{}\",host=\"{}\",id=\"{}\",sensor=\"{}\"}} {}",
                name,
                escape_label_value(&reading.hardware),
                escape_label_value(host),
                escape_label_value(&reading.identifier),
                escape_label_value(&reading.sensor),
                format_value(reading.value)
            )
            .ok();
        }
    }

    String::from_utf8(output).unwrap_or_default()
}

/// Build the metric name for a reading.
///
/// Format: `hw_{group}_{unit}` where the group is the first identifier
/// segment. The `id` label keeps series within a metric unique.
fn metric_name(reading: &SensorReading) -> String {
    let group = reading
        .identifier
        .trim_start_matches('/')
        .split('/')
        .next()
        .unwrap_or_default();

    format!(
        "hw_{}_{}",
        sanitize_metric_part(group),
        reading.kind.base_unit()
    )
}

/// Sanitize one component of a metric name.
///
/// Prometheus metric names must match `[a-zA-Z_:][a-zA-Z0-9_:]*`; the
/// component sits after the `hw_` prefix, so lowercase alphanumerics
/// joined by single underscores are enough.
fn sanitize_metric_part(part: &str) -> String {
    let mut result = String::with_capacity(part.len());
    let mut last_was_underscore = false;

    for c in part.chars() {
        if c.is_ascii_alphanumeric() {
            result.push(c.to_ascii_lowercase());
            last_was_underscore = false;
        } else if !last_was_underscore {
            result.push('_');
            last_was_underscore = true;
        }
    }

    let trimmed = result.trim_matches('_');
    if trimmed.is_empty() {
        "unknown".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Escape special characters in label values.
fn escape_label_value(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            '"' => result.push_str("\\\""),
            '\n' => result.push_str("\\n"),
            _ => result.push(c),
        }
    }
    result
}

/// Format a floating point value for Prometheus.
fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value.is_sign_positive() {
            "+Inf".to_string()
        } else {
            "-Inf".to_string()
        }
    } else if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{}", value)
    }
}
