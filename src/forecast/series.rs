//! Turning an irregular poll series into a regular, smoothed trend.

use chrono::{DateTime, Duration, Utc};

use crate::db::series::SeriesPoint;

/// Sampling interval of a re-indexed series.
pub fn daily() -> Duration {
    Duration::days(1)
}

/// Collapse equal timestamps, keeping the last value for each.
pub fn distinct_points(points: &[SeriesPoint]) -> Vec<SeriesPoint> {
    let mut sorted = points.to_vec();
    sorted.sort_by_key(|p| p.at);
    let mut out: Vec<SeriesPoint> = Vec::with_capacity(sorted.len());
    for p in sorted {
        match out.last_mut() {
            Some(last) if last.at == p.at => *last = p,
            _ => out.push(p),
        }
    }
    out
}

/// The common gap when every gap between distinct points is equal, else
/// daily. `points` must be distinct and sorted.
pub fn infer_cadence(points: &[SeriesPoint]) -> Duration {
    let mut gaps = points.windows(2).map(|w| w[1].at - w[0].at);
    let Some(first) = gaps.next() else {
        return daily();
    };
    if first > Duration::zero() && gaps.all(|g| g == first) {
        first
    } else {
        daily()
    }
}

/// Number of grid points between `first` and `last` at `cadence`, anchored
/// on `last`.
pub fn grid_len(first: DateTime<Utc>, last: DateTime<Utc>, cadence: Duration) -> usize {
    let span = (last - first).num_milliseconds().max(0);
    let step = cadence.num_milliseconds().max(1);
    (span / step) as usize + 1
}

/// Re-index onto a regular grid ending at the last observation. Each grid
/// point carries the latest value at or before it, so status is assumed to
/// persist between polls.
pub fn reindex(points: &[SeriesPoint], cadence: Duration) -> Vec<SeriesPoint> {
    let (Some(first), Some(last)) = (points.first(), points.last()) else {
        return Vec::new();
    };
    let n = grid_len(first.at, last.at, cadence);
    let start = last.at - cadence * (n as i32 - 1);

    let mut out = Vec::with_capacity(n);
    let mut idx = 0usize;
    for i in 0..n {
        let at = start + cadence * i as i32;
        while idx + 1 < points.len() && points[idx + 1].at <= at {
            idx += 1;
        }
        out.push(SeriesPoint { at, stock_status: points[idx].stock_status });
    }
    out
}

/// Trailing rolling mean with a minimum of one sample.
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    let window = window.max(1);
    let mut out = Vec::with_capacity(values.len());
    let mut sum = 0.0;
    for (i, v) in values.iter().enumerate() {
        sum += v;
        if i >= window {
            sum -= values[i - window];
        }
        out.push(sum / (i + 1).min(window) as f64);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::TimeZone;

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap()
    }

    fn p(offset: Duration, status: f64) -> SeriesPoint {
        SeriesPoint { at: base() + offset, stock_status: status }
    }

    #[test]
    fn regular_hourly_cadence_is_inferred() {
        let pts: Vec<_> = (0..4).map(|h| p(Duration::hours(h), 1.0)).collect();
        assert_eq!(infer_cadence(&pts), Duration::hours(1));
    }

    #[test]
    fn irregular_cadence_defaults_to_daily() {
        let pts = vec![p(Duration::hours(0), 1.0), p(Duration::hours(5), 1.0), p(Duration::hours(7), 0.0)];
        assert_eq!(infer_cadence(&pts), Duration::days(1));
    }

    #[test]
    fn distinct_keeps_last_value() {
        let pts = vec![p(Duration::days(1), 1.0), p(Duration::days(0), 1.0), p(Duration::days(1), 0.0)];
        let d = distinct_points(&pts);
        assert_eq!(d.len(), 2);
        assert_eq!(d[1].stock_status, 0.0);
    }

    #[test]
    fn reindex_forward_fills_gaps() {
        let pts = vec![p(Duration::days(0), 1.0), p(Duration::days(3), 0.0), p(Duration::days(4), 1.0)];
        let grid = reindex(&pts, daily());
        let values: Vec<_> = grid.iter().map(|g| g.stock_status).collect();
        assert_eq!(values, vec![1.0, 1.0, 1.0, 0.0, 1.0]);
        assert_eq!(grid.last().unwrap().at, base() + Duration::days(4));
    }

    #[test]
    fn reindex_anchors_on_last_observation() {
        let pts = vec![
            p(Duration::hours(0), 1.0),
            p(Duration::hours(30), 0.0),
            p(Duration::hours(60), 1.0),
        ];
        let grid = reindex(&pts, daily());
        let times: Vec<_> = grid.iter().map(|g| g.at).collect();
        assert_eq!(
            times,
            vec![base() + Duration::hours(12), base() + Duration::hours(36), base() + Duration::hours(60)]
        );
        let values: Vec<_> = grid.iter().map(|g| g.stock_status).collect();
        assert_eq!(values, vec![1.0, 0.0, 1.0]);
    }

    #[test]
    fn rolling_mean_uses_partial_windows() {
        let out = rolling_mean(&[1.0, 0.0, 1.0, 1.0], 3);
        assert_relative_eq!(out[0], 1.0);
        assert_relative_eq!(out[1], 0.5);
        assert_relative_eq!(out[2], 2.0 / 3.0);
        assert_relative_eq!(out[3], 2.0 / 3.0);
    }
}
