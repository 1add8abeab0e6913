//! Histogram binning, countBy grouping and time-bucketed histograms.

use crate::aggregation::Aggregator;
use crate::error::{DataframeError, Result};
use crate::types::{ColumnValues, DataType, Value, ValueKey};
use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::HashMap;

/// Integral columns with fewer distinct values get one bin per value.
pub const MAX_BIN_COUNT: usize = 30;
pub const MAX_BINS_TIME_HISTOGRAM: usize = 2500;
const MAX_WIDTH_ADJUSTMENTS: usize = 128;
const TIME_STEP_SAFETY_CAP: usize = 100_000;
pub const OTHER_BIN: &str = "_other";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Binning {
    pub num_bins: usize,
    pub bin_width: f64,
    pub min_value: f64,
    pub max_value: f64,
}

impl Binning {
    fn single(min: f64, max: f64) -> Self {
        Self {
            num_bins: 1,
            bin_width: 1.0,
            min_value: min,
            max_value: max,
        }
    }

    /// Rejects bin specs `histogram` cannot bucket into.
    pub fn validate(&self) -> Result<()> {
        if self.num_bins == 0 {
            return Err(DataframeError::InvalidArgument("binning has no bins".into()));
        }
        if !(self.bin_width.is_finite() && self.bin_width > 0.0) {
            return Err(DataframeError::InvalidArgument(format!(
                "binning width must be positive, got {}",
                self.bin_width
            )));
        }
        if !self.min_value.is_finite() {
            return Err(DataframeError::InvalidArgument(format!(
                "binning minimum must be finite, got {}",
                self.min_value
            )));
        }
        Ok(())
    }

    /// Bin of `value`, clamped into `[0, num_bins)`.
    pub fn bin_of(&self, value: f64) -> usize {
        if self.num_bins <= 1 || self.bin_width <= 0.0 {
            return 0;
        }
        let raw = ((value - self.min_value) / self.bin_width).floor();
        if raw <= 0.0 {
            0
        } else {
            (raw as usize).min(self.num_bins - 1)
        }
    }
}

fn goal_bins_for(num_values: usize) -> usize {
    let n = num_values as f64;
    if num_values > MAX_BIN_COUNT {
        ((n.log2().ceil() as usize) + 1).clamp(8, MAX_BIN_COUNT)
    } else {
        (n.sqrt().ceil() as usize).max(1)
    }
}

fn round_down(value: f64, step: f64) -> f64 {
    (value / step).floor() * step
}

fn round_up(value: f64, step: f64) -> f64 {
    (value / step).ceil() * step
}

/// Chooses bin count and width for a numeric column.
pub fn calculate_binning(agg: &mut Aggregator<'_>, goal_number_of_bins: Option<usize>) -> Binning {
    let Some((min, max)) = agg.numeric_range() else {
        return Binning::single(0.0, 0.0);
    };
    if min == max || !min.is_finite() || !max.is_finite() {
        return Binning::single(min, max);
    }
    let range = max - min;

    if agg.is_integral() {
        let distinct = agg.count_distinct();
        if distinct < MAX_BIN_COUNT {
            let num_bins = distinct.max(1);
            return Binning {
                num_bins,
                bin_width: range / (num_bins.saturating_sub(1).max(1)) as f64,
                min_value: min,
                max_value: max,
            };
        }
    }

    if let Some(goal) = goal_number_of_bins.filter(|&g| g > 0) {
        return Binning {
            num_bins: goal,
            bin_width: range / (goal.saturating_sub(1).max(1)) as f64,
            min_value: min,
            max_value: max,
        };
    }

    let goal = goal_bins_for(agg.count()) as f64;
    let mut width = 10f64.powf(range.log10().floor());
    let mut num_bins = range / width;
    for _ in 0..MAX_WIDTH_ADJUSTMENTS {
        if num_bins < 2.0 {
            width /= 10.0;
        } else if num_bins >= 100.0 {
            width *= 10.0;
        } else {
            break;
        }
        num_bins = range / width;
    }

    let lower = goal / 2.0 - 1.0;
    for _ in 0..MAX_WIDTH_ADJUSTMENTS {
        if num_bins < lower {
            width /= 2.0;
        } else if num_bins > goal {
            width *= 2.0;
        } else {
            break;
        }
        num_bins = range / width;
    }

    let bottom = round_down(min, width);
    let top = round_up(max, width);
    Binning {
        num_bins: (((top - bottom) / width).round() as usize).max(1),
        bin_width: width,
        min_value: bottom,
        max_value: top,
    }
}

#[derive(Debug, Clone, PartialEq)]
enum BinValue {
    Empty,
    Uniform(Value),
    Mixed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Histogram {
    pub data_type: DataType,
    pub num_bins: usize,
    pub num_values: usize,
    pub bin_width: f64,
    pub min_value: f64,
    pub max_value: f64,
    pub bins: Vec<u32>,
    /// The single value every member of a bin shares, or `None` when mixed or empty.
    pub bin_values: Vec<Option<Value>>,
}

/// Buckets the defined values at `positions` according to `binning`.
pub fn histogram(
    values: &ColumnValues,
    positions: impl Iterator<Item = usize>,
    binning: &Binning,
    data_type: DataType,
) -> Histogram {
    let mut bins = vec![0u32; binning.num_bins];
    let mut shared = vec![BinValue::Empty; binning.num_bins];
    let mut num_values = 0;
    for i in positions {
        num_values += 1;
        let Some(n) = values.numeric_at(i) else {
            continue;
        };
        let bin = binning.bin_of(n);
        bins[bin] += 1;
        let value = values.value_at(i);
        shared[bin] = match std::mem::replace(&mut shared[bin], BinValue::Mixed) {
            BinValue::Empty => BinValue::Uniform(value),
            BinValue::Uniform(existing) if existing == value => BinValue::Uniform(existing),
            _ => BinValue::Mixed,
        };
    }

    Histogram {
        data_type,
        num_bins: binning.num_bins,
        num_values,
        bin_width: binning.bin_width,
        min_value: binning.min_value,
        max_value: binning.max_value,
        bins,
        bin_values: shared
            .into_iter()
            .map(|b| match b {
                BinValue::Uniform(v) => Some(v),
                _ => None,
            })
            .collect(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CountByBin {
    pub label: String,
    pub value: Value,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CountBy {
    pub data_type: DataType,
    pub num_bins: usize,
    pub num_values: usize,
    /// Most frequent first; serialized as a `label -> count` object.
    #[serde(serialize_with = "serialize_bins")]
    pub bins: Vec<CountByBin>,
}

impl CountBy {
    pub fn get(&self, label: &str) -> Option<usize> {
        self.bins.iter().find(|b| b.label == label).map(|b| b.count)
    }
}

fn serialize_bins<S: Serializer>(bins: &[CountByBin], serializer: S) -> std::result::Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(bins.len()))?;
    for bin in bins {
        map.serialize_entry(&bin.label, &bin.count)?;
    }
    map.end()
}

/// Groups the defined values at `positions` by exact value.
///
/// Keeps the `max_bins - 1` most frequent values. When that cutoff falls
/// inside a run of equal counts, the whole run moves to the remainder. A
/// remainder of two or more keys becomes `_other`; a single leftover key is
/// kept under its own label.
pub fn count_by(
    values: &ColumnValues,
    positions: impl Iterator<Item = usize>,
    max_bins: usize,
    data_type: DataType,
) -> CountBy {
    let mut counts: HashMap<ValueKey, usize> = HashMap::new();
    let mut num_values = 0;
    for i in positions {
        num_values += 1;
        if let Some(key) = ValueKey::from_value(&values.value_at(i)) {
            *counts.entry(key).or_insert(0) += 1;
        }
    }

    let mut sorted: Vec<(ValueKey, usize)> = counts.into_iter().collect();
    sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let mut keep = max_bins.saturating_sub(1).min(sorted.len());
    if keep > 0 && keep < sorted.len() && sorted[keep - 1].1 == sorted[keep].1 {
        let tied = sorted[keep].1;
        keep = sorted.iter().position(|(_, c)| *c == tied).unwrap_or(keep);
    }

    let mut bins: Vec<CountByBin> = sorted[..keep]
        .iter()
        .map(|(key, count)| {
            let value = key.to_value();
            CountByBin {
                label: value.to_display_string(),
                value,
                count: *count,
            }
        })
        .collect();

    let rest = &sorted[keep..];
    match rest {
        [] => {}
        [(key, count)] => {
            let value = key.to_value();
            bins.push(CountByBin {
                label: value.to_display_string(),
                value,
                count: *count,
            });
        }
        _ => bins.push(CountByBin {
            label: OTHER_BIN.to_string(),
            value: Value::String(OTHER_BIN.to_string()),
            count: rest.iter().map(|(_, c)| c).sum(),
        }),
    }

    CountBy {
        data_type,
        num_bins: bins.len(),
        num_values,
        bins,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeGranularity {
    Day,
    Hour,
    Minute,
    Second,
}

impl TimeGranularity {
    pub fn step(&self) -> TimeDelta {
        match self {
            TimeGranularity::Day => TimeDelta::days(1),
            TimeGranularity::Hour => TimeDelta::hours(1),
            TimeGranularity::Minute => TimeDelta::minutes(1),
            TimeGranularity::Second => TimeDelta::seconds(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeHistogram {
    pub granularity: TimeGranularity,
    /// Snapped range, milliseconds since the epoch.
    pub start: i64,
    pub stop: i64,
    pub num_bins: usize,
    /// Bin `k` covers `[cutoffs[k], cutoffs[k + 1])`.
    pub cutoffs: Vec<i64>,
    pub bins: Vec<u32>,
    pub max_bin: u32,
    /// True when the range needed more than the bin cap and uniform-width
    /// bins replaced calendar-aligned steps.
    pub approximate: bool,
}

fn to_datetime(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .ok_or_else(|| DataframeError::InvalidArgument(format!("timestamp out of range: {ms}")))
}

fn snap(start_ms: i64, stop_ms: i64, step: TimeDelta) -> Result<(i64, i64)> {
    let trunc = |dt: DateTime<Utc>| {
        dt.duration_trunc(step)
            .map_err(|e| DataframeError::InvalidArgument(e.to_string()))
    };
    let start = trunc(to_datetime(start_ms)?)?;
    let stop_raw = to_datetime(stop_ms)?;
    let advance = |dt: DateTime<Utc>| {
        dt.checked_add_signed(step)
            .ok_or_else(|| DataframeError::InvalidArgument(format!("time range end overflows: {stop_ms}")))
    };
    let mut stop = trunc(stop_raw)?;
    if stop < stop_raw {
        stop = advance(stop)?;
    }
    if stop <= start {
        stop = advance(start)?;
    }
    Ok((start.timestamp_millis(), stop.timestamp_millis()))
}

/// Counts timestamps (milliseconds) at `positions` into calendar-aligned bins
/// between `start_ms` and `stop_ms`.
pub fn time_histogram(
    values: &ColumnValues,
    positions: impl Iterator<Item = usize>,
    start_ms: i64,
    stop_ms: i64,
    granularity: TimeGranularity,
) -> Result<TimeHistogram> {
    if start_ms > stop_ms {
        return Err(DataframeError::InvalidArgument(format!(
            "time range start {start_ms} is after stop {stop_ms}"
        )));
    }
    let step = granularity.step();
    let step_ms = step.num_milliseconds();
    let (start, stop) = snap(start_ms, stop_ms, step)?;

    let steps = ((stop - start) / step_ms) as usize;
    let approximate = steps > MAX_BINS_TIME_HISTOGRAM;
    let cutoffs: Vec<i64> = if approximate {
        let width = (stop - start) as f64 / MAX_BINS_TIME_HISTOGRAM as f64;
        (0..=MAX_BINS_TIME_HISTOGRAM)
            .map(|k| start + (k as f64 * width).round() as i64)
            .collect()
    } else {
        let mut cutoffs = vec![start];
        let mut cur = start;
        while cur < stop && cutoffs.len() <= TIME_STEP_SAFETY_CAP {
            cur += step_ms;
            cutoffs.push(cur);
        }
        cutoffs
    };

    let num_bins = cutoffs.len().saturating_sub(1).max(1);
    let mut bins = vec![0u32; num_bins];
    for i in positions {
        let Some(ms) = values.numeric_at(i).map(|n| n as i64) else {
            continue;
        };
        if ms < start || ms > stop {
            continue;
        }
        let bin = cutoffs.partition_point(|&c| c <= ms).saturating_sub(1);
        bins[bin.min(num_bins - 1)] += 1;
    }

    Ok(TimeHistogram {
        granularity,
        start,
        stop,
        num_bins,
        max_bin: bins.iter().copied().max().unwrap_or(0),
        cutoffs,
        bins,
        approximate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::{AggregationCache, DEFAULT_DISTINCT_LIMIT};

    fn binning_for(values: &ColumnValues, goal: Option<usize>) -> Binning {
        let mut cache = AggregationCache::default();
        let mut agg = Aggregator::new(values, None, &mut cache, DEFAULT_DISTINCT_LIMIT);
        calculate_binning(&mut agg, goal)
    }

    #[test]
    fn degenerate_bin_specs_are_rejected() {
        let ok = Binning::single(0.0, 0.0);
        assert!(ok.validate().is_ok());
        for bad in [
            Binning { num_bins: 0, ..ok.clone() },
            Binning { bin_width: 0.0, ..ok.clone() },
            Binning { bin_width: f64::NAN, ..ok.clone() },
            Binning { min_value: f64::NEG_INFINITY, ..ok.clone() },
        ] {
            assert!(matches!(bad.validate(), Err(DataframeError::InvalidArgument(_))));
        }
    }

    #[test]
    fn explicit_goal_divides_range_evenly() {
        let values = ColumnValues::Number((0..=1000).map(|i| i as f64 / 10.0).collect());
        let binning = binning_for(&values, Some(10));
        assert_eq!(binning.num_bins, 10);
        assert!((binning.bin_width - 100.0 / 9.0).abs() < 1e-9);
        assert_eq!(binning.min_value, 0.0);
        assert_eq!(binning.max_value, 100.0);
    }

    #[test]
    fn small_integral_columns_bin_per_value() {
        let values = ColumnValues::Integer(vec![1, 2, 3, 3, 4]);
        let binning = binning_for(&values, None);
        assert_eq!(binning.num_bins, 4);
        assert_eq!(binning.bin_width, 1.0);
    }

    #[test]
    fn automatic_width_snaps_to_multiples() {
        let values = ColumnValues::Number((0..200).map(|i| 3.3 + i as f64 * 0.47).collect());
        let binning = binning_for(&values, None);
        let goal = goal_bins_for(200);
        assert!(binning.num_bins >= 2);
        assert!(binning.num_bins <= goal + 1);
        let ratio = binning.min_value / binning.bin_width;
        assert!((ratio - ratio.round()).abs() < 1e-9);
        assert!(binning.min_value <= 3.3);
        assert!(binning.max_value >= 3.3 + 199.0 * 0.47);
    }

    #[test]
    fn degenerate_ranges_get_one_bin() {
        let same = ColumnValues::Number(vec![4.5, 4.5]);
        assert_eq!(binning_for(&same, None).num_bins, 1);
        let empty = ColumnValues::Number(vec![f64::NAN]);
        assert_eq!(binning_for(&empty, None).num_bins, 1);
    }

    #[test]
    fn histogram_tracks_uniform_bins() {
        let values = ColumnValues::Number(vec![0.0, 0.0, 5.0, 9.0, 10.0, f64::NAN]);
        let binning = Binning {
            num_bins: 2,
            bin_width: 5.0,
            min_value: 0.0,
            max_value: 10.0,
        };
        let hist = histogram(&values, 0..values.len(), &binning, DataType::Number);
        assert_eq!(hist.bins, vec![2, 3]);
        assert_eq!(hist.bin_values, vec![Some(Value::Number(0.0)), None]);
        assert_eq!(hist.num_values, 6);
    }

    #[test]
    fn count_by_merges_tail_into_other() {
        let values = ColumnValues::String(
            ["a", "a", "a", "b", "c", "d"].iter().map(|s| s.to_string()).collect(),
        );
        let result = count_by(&values, 0..values.len(), 3, DataType::String);
        assert_eq!(result.num_bins, 2);
        assert_eq!(result.get("a"), Some(3));
        assert_eq!(result.get(OTHER_BIN), Some(3));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["bins"], serde_json::json!({"a": 3, "_other": 3}));
    }

    #[test]
    fn count_by_keeps_single_leftover_key() {
        let values = ColumnValues::String(
            ["a", "a", "b", "b", "b", "c"].iter().map(|s| s.to_string()).collect(),
        );
        let result = count_by(&values, 0..values.len(), 3, DataType::String);
        assert_eq!(result.get("b"), Some(3));
        assert_eq!(result.get("a"), Some(2));
        assert_eq!(result.get("c"), Some(1));
        assert_eq!(result.get(OTHER_BIN), None);
    }

    #[test]
    fn count_by_reads_through_indices() {
        let values = ColumnValues::Integer(vec![7, 8, 8, 9]);
        let indices = [1usize, 2, 3];
        let result = count_by(&values, indices.into_iter(), 10, DataType::Integer);
        assert_eq!(result.get("8"), Some(2));
        assert_eq!(result.get("7"), None);
    }

    #[test]
    fn time_histogram_aligns_to_hours() -> Result<()> {
        let hour = 3_600_000i64;
        let base = 1_700_000_000_000i64 - 1_700_000_000_000i64 % hour;
        let values = ColumnValues::Date(vec![
            Some(base + 10),
            Some(base + hour + 5),
            Some(base + hour + 6),
            None,
            Some(base + 10 * hour),
        ]);
        let hist = time_histogram(
            &values,
            0..values.len(),
            base + 1,
            base + 2 * hour + 1,
            TimeGranularity::Hour,
        )?;
        assert_eq!(hist.start, base);
        assert_eq!(hist.stop, base + 3 * hour);
        assert_eq!(hist.num_bins, 3);
        assert_eq!(hist.bins, vec![1, 2, 0]);
        assert_eq!(hist.max_bin, 2);
        assert!(!hist.approximate);
        Ok(())
    }

    #[test]
    fn long_time_ranges_fall_back_to_uniform_bins() -> Result<()> {
        let values = ColumnValues::Date(vec![Some(0), Some(5_000_000)]);
        let hist = time_histogram(&values, 0..2, 0, 10_000_000, TimeGranularity::Second)?;
        assert!(hist.approximate);
        assert_eq!(hist.num_bins, MAX_BINS_TIME_HISTOGRAM);
        assert_eq!(hist.bins.iter().sum::<u32>(), 2);
        Ok(())
    }

    #[test]
    fn time_range_ending_at_the_calendar_limit_is_rejected() {
        let values = ColumnValues::Date(vec![Some(0)]);
        let last = DateTime::<Utc>::MAX_UTC.timestamp_millis();
        let err = time_histogram(&values, 0..1, 0, last, TimeGranularity::Day).unwrap_err();
        assert!(matches!(err, DataframeError::InvalidArgument(_)));
    }
}
