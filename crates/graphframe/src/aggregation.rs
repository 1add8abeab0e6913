//! Per-column statistics: type inference, numeric summaries, distinct counts
//! and categorical detection.
//!
//! Every field is computed at most once until [`AggregationCache::reset`] and
//! pulls in whatever prerequisites it needs (`min_value` needs `is_numeric`,
//! which needs `count`, ...).

use crate::binning::{calculate_binning, Binning};
use crate::types::{ColumnValues, DataType, Value, ValueKey};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

pub const DEFAULT_DISTINCT_LIMIT: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AggregationKind {
    Count,
    CountDistinct,
    DistinctValues,
    DataType,
    IsNumeric,
    IsIntegral,
    IsCategorical,
    IsOrdered,
    IsDiverging,
    IsQuantitative,
    IsContinuous,
    HasPositive,
    HasNegative,
    MinValue,
    MaxValue,
    Sum,
    AverageValue,
    Binning,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct TypeInference {
    is_numeric: bool,
    is_integral: bool,
    data_type: DataType,
}

#[derive(Debug, Clone, PartialEq)]
struct Extremes {
    min: Value,
    max: Value,
    sum: Option<f64>,
    average: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Distinct {
    /// Saturates at `limit + 1`, meaning "more than the limit".
    count: usize,
    values: Vec<(Value, usize)>,
    is_categorical: bool,
}

impl Extremes {
    fn empty() -> Self {
        Self {
            min: Value::Null,
            max: Value::Null,
            sum: None,
            average: None,
        }
    }
}

/// Lazily filled statistics for one column over one view.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregationCache {
    count: Option<usize>,
    inference: Option<TypeInference>,
    extremes: Option<Extremes>,
    distinct: Option<Distinct>,
    binning: Option<Binning>,
}

impl AggregationCache {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Borrowed view over a column's values (optionally restricted to `indices`)
/// paired with the cache that stores its statistics.
pub struct Aggregator<'a> {
    values: &'a ColumnValues,
    indices: Option<&'a [u32]>,
    cache: &'a mut AggregationCache,
    distinct_limit: usize,
}

impl<'a> Aggregator<'a> {
    pub fn new(
        values: &'a ColumnValues,
        indices: Option<&'a [u32]>,
        cache: &'a mut AggregationCache,
        distinct_limit: usize,
    ) -> Self {
        Self {
            values,
            indices,
            cache,
            distinct_limit,
        }
    }

    pub fn values(&self) -> &'a ColumnValues {
        self.values
    }

    pub fn indices(&self) -> Option<&'a [u32]> {
        self.indices
    }

    fn positions(&self) -> Box<dyn Iterator<Item = usize> + 'a> {
        match self.indices {
            Some(indices) => Box::new(indices.iter().map(|&i| i as usize)),
            None => Box::new(0..self.values.len()),
        }
    }

    /// Number of scanned positions, undefined cells included.
    pub fn count(&mut self) -> usize {
        if let Some(count) = self.cache.count {
            return count;
        }
        let count = self.indices.map_or(self.values.len(), |i| i.len());
        self.cache.count = Some(count);
        count
    }

    fn inference(&mut self) -> TypeInference {
        if let Some(inferred) = self.cache.inference {
            return inferred;
        }
        self.count();
        let inferred = infer_data_type(self.values, self.positions());
        self.cache.inference = Some(inferred);
        inferred
    }

    pub fn is_numeric(&mut self) -> bool {
        self.inference().is_numeric
    }

    pub fn is_integral(&mut self) -> bool {
        self.inference().is_integral
    }

    pub fn data_type(&mut self) -> DataType {
        self.inference().data_type
    }

    pub fn is_ordered(&mut self) -> bool {
        self.data_type().is_ordered()
    }

    fn extremes(&mut self) -> &Extremes {
        if self.cache.extremes.is_none() {
            let count = self.count();
            let extremes = if self.is_numeric() {
                let integral = self.data_type() == DataType::Integer;
                numeric_extremes(self.values, self.positions(), count, integral)
            } else {
                generic_extremes(self.values, self.positions())
            };
            self.cache.extremes = Some(extremes);
        }
        self.cache.extremes.get_or_insert_with(Extremes::empty)
    }

    pub fn min_value(&mut self) -> Value {
        self.extremes().min.clone()
    }

    pub fn max_value(&mut self) -> Value {
        self.extremes().max.clone()
    }

    pub fn sum(&mut self) -> Option<f64> {
        self.extremes().sum
    }

    /// `sum / count`, where `count` includes undefined positions.
    pub fn average_value(&mut self) -> Option<f64> {
        self.extremes().average
    }

    /// `(min, max)` as numbers when the column is numeric and has defined values.
    pub fn numeric_range(&mut self) -> Option<(f64, f64)> {
        if !self.is_numeric() {
            return None;
        }
        let extremes = self.extremes();
        Some((extremes.min.as_f64()?, extremes.max.as_f64()?))
    }

    fn distinct(&mut self) -> &Distinct {
        if self.cache.distinct.is_none() {
            let data_type = self.data_type();
            let distinct =
                count_distinct(self.values, self.positions(), self.distinct_limit, data_type);
            self.cache.distinct = Some(distinct);
        }
        self.cache.distinct.get_or_insert_with(Distinct::default)
    }

    pub fn count_distinct(&mut self) -> usize {
        self.distinct().count
    }

    /// Value counts, most frequent first, at most `distinct_limit` entries.
    pub fn distinct_values(&mut self) -> Vec<(Value, usize)> {
        self.distinct().values.clone()
    }

    pub fn is_categorical(&mut self) -> bool {
        self.distinct().is_categorical
    }

    pub fn is_quantitative(&mut self) -> bool {
        self.is_numeric() && !self.is_categorical()
    }

    pub fn is_continuous(&mut self) -> bool {
        self.is_numeric() && !self.is_integral()
    }

    pub fn has_positive(&mut self) -> bool {
        self.numeric_range().is_some_and(|(_, max)| max > 0.0)
    }

    pub fn has_negative(&mut self) -> bool {
        self.numeric_range().is_some_and(|(min, _)| min < 0.0)
    }

    pub fn is_diverging(&mut self) -> bool {
        self.has_positive() && self.has_negative()
    }

    /// Default binning (no explicit goal), cached alongside the other fields.
    pub fn binning(&mut self) -> Binning {
        if let Some(binning) = &self.cache.binning {
            return binning.clone();
        }
        let binning = calculate_binning(self, None);
        self.cache.binning = Some(binning.clone());
        binning
    }

    pub fn get_aggregation_by_type(&mut self, kind: AggregationKind) -> serde_json::Value {
        use serde_json::json;
        match kind {
            AggregationKind::Count => json!(self.count()),
            AggregationKind::CountDistinct => json!(self.count_distinct()),
            AggregationKind::DistinctValues => {
                let values = self.distinct_values();
                json!(values
                    .iter()
                    .map(|(v, c)| json!({ "distinctValue": v, "count": c }))
                    .collect::<Vec<_>>())
            }
            AggregationKind::DataType => json!(self.data_type()),
            AggregationKind::IsNumeric => json!(self.is_numeric()),
            AggregationKind::IsIntegral => json!(self.is_integral()),
            AggregationKind::IsCategorical => json!(self.is_categorical()),
            AggregationKind::IsOrdered => json!(self.is_ordered()),
            AggregationKind::IsDiverging => json!(self.is_diverging()),
            AggregationKind::IsQuantitative => json!(self.is_quantitative()),
            AggregationKind::IsContinuous => json!(self.is_continuous()),
            AggregationKind::HasPositive => json!(self.has_positive()),
            AggregationKind::HasNegative => json!(self.has_negative()),
            AggregationKind::MinValue => json!(self.min_value()),
            AggregationKind::MaxValue => json!(self.max_value()),
            AggregationKind::Sum => json!(self.sum()),
            AggregationKind::AverageValue => json!(self.average_value()),
            AggregationKind::Binning => json!(self.binning()),
        }
    }

    /// Every field at once, for presentation layers.
    pub fn summary(&mut self) -> ColumnSummary {
        ColumnSummary {
            data_type: self.data_type(),
            count: self.count(),
            count_distinct: self.count_distinct(),
            is_numeric: self.is_numeric(),
            is_integral: self.is_integral(),
            is_categorical: self.is_categorical(),
            is_ordered: self.is_ordered(),
            is_diverging: self.is_diverging(),
            min_value: self.min_value(),
            max_value: self.max_value(),
            sum: self.sum(),
            average_value: self.average_value(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnSummary {
    pub data_type: DataType,
    pub count: usize,
    pub count_distinct: usize,
    pub is_numeric: bool,
    pub is_integral: bool,
    pub is_categorical: bool,
    pub is_ordered: bool,
    pub is_diverging: bool,
    pub min_value: Value,
    pub max_value: Value,
    pub sum: Option<f64>,
    pub average_value: Option<f64>,
}

fn infer_data_type(values: &ColumnValues, positions: impl Iterator<Item = usize>) -> TypeInference {
    if let ColumnValues::Date(_) = values {
        return TypeInference {
            is_numeric: false,
            is_integral: false,
            data_type: DataType::Date,
        };
    }

    let mut is_numeric = true;
    let mut is_integral = true;
    let mut defined = 0usize;
    for i in positions {
        if !values.is_defined(i) {
            continue;
        }
        defined += 1;
        match values.numeric_at(i) {
            Some(n) => {
                if is_integral && n.fract() != 0.0 {
                    is_integral = false;
                }
            }
            None => {
                is_numeric = false;
                is_integral = false;
                break;
            }
        }
    }

    // Nothing defined: keep the declared storage type.
    if defined == 0 {
        let declared = values.data_type();
        return TypeInference {
            is_numeric: matches!(declared, DataType::Number | DataType::Integer),
            is_integral: declared == DataType::Integer,
            data_type: declared,
        };
    }

    let data_type = if is_integral {
        DataType::Integer
    } else if is_numeric {
        DataType::Number
    } else {
        DataType::String
    };
    TypeInference {
        is_numeric,
        is_integral,
        data_type,
    }
}

fn numeric_extremes(
    values: &ColumnValues,
    positions: impl Iterator<Item = usize>,
    count: usize,
    integral: bool,
) -> Extremes {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut sum = 0.0;
    for i in positions {
        let Some(n) = values.numeric_at(i) else {
            continue;
        };
        min = min.min(n);
        max = max.max(n);
        sum += n;
    }
    let wrap = |n: f64| {
        if !n.is_finite() {
            Value::Null
        } else if integral {
            Value::Integer(n as i64)
        } else {
            Value::Number(n)
        }
    };
    Extremes {
        min: wrap(min),
        max: wrap(max),
        sum: Some(sum),
        // Denominator counts every scanned position, defined or not.
        average: (count > 0).then(|| sum / count as f64),
    }
}

fn generic_extremes(values: &ColumnValues, positions: impl Iterator<Item = usize>) -> Extremes {
    let mut min = Value::Null;
    let mut max = Value::Null;
    for i in positions {
        let value = values.value_at(i);
        if value.is_null() {
            continue;
        }
        if min.is_null() || value.compare(&min) == Ordering::Less {
            min = value.clone();
        }
        if max.is_null() || value.compare(&max) == Ordering::Greater {
            max = value;
        }
    }
    Extremes {
        min,
        max,
        sum: None,
        average: None,
    }
}

fn count_distinct(
    values: &ColumnValues,
    positions: impl Iterator<Item = usize>,
    limit: usize,
    data_type: DataType,
) -> Distinct {
    let mut counts: HashMap<ValueKey, usize> = HashMap::new();
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for i in positions {
        let value = values.value_at(i);
        let Some(key) = ValueKey::from_value(&value) else {
            continue;
        };
        if let Some(n) = values.numeric_at(i) {
            min = min.min(n);
            max = max.max(n);
        }
        let seen = counts.len();
        match counts.get_mut(&key) {
            Some(c) => *c += 1,
            // One key past the limit is kept so saturation is observable.
            None if seen <= limit => {
                counts.insert(key, 1);
            }
            None => {}
        }
    }

    let count = counts.len();
    let is_categorical = match data_type {
        DataType::String => count <= limit,
        DataType::Integer => {
            count <= limit
                && (min == 0.0 || min == 1.0)
                && (max - min) == (count as f64 - 1.0)
        }
        DataType::Number | DataType::Date => false,
    };

    let mut sorted: Vec<(ValueKey, usize)> = counts.into_iter().collect();
    sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    sorted.truncate(limit);

    Distinct {
        count,
        values: sorted.into_iter().map(|(k, c)| (k.to_value(), c)).collect(),
        is_categorical,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UNDEFINED_NUMBER_SENTINEL;

    fn aggregate<T>(values: &ColumnValues, f: impl FnOnce(&mut Aggregator<'_>) -> T) -> T {
        let mut cache = AggregationCache::default();
        let mut agg = Aggregator::new(values, None, &mut cache, DEFAULT_DISTINCT_LIMIT);
        f(&mut agg)
    }

    #[test]
    fn infers_integral_before_numeric_before_string() {
        let ints = ColumnValues::Number(vec![1.0, 2.0, f64::NAN]);
        assert_eq!(aggregate(&ints, |a| a.data_type()), DataType::Integer);

        let floats = ColumnValues::Number(vec![1.5, 2.0]);
        assert_eq!(aggregate(&floats, |a| a.data_type()), DataType::Number);

        let numeric_strings = ColumnValues::String(vec!["1".into(), "2.5".into(), "".into()]);
        assert_eq!(aggregate(&numeric_strings, |a| a.data_type()), DataType::Number);

        let strings = ColumnValues::String(vec!["1".into(), "x".into()]);
        assert_eq!(aggregate(&strings, |a| a.data_type()), DataType::String);
    }

    #[test]
    fn average_divides_by_all_scanned_values() {
        let values = ColumnValues::Integer(vec![2, 4, UNDEFINED_NUMBER_SENTINEL, 6]);
        aggregate(&values, |a| {
            assert_eq!(a.sum(), Some(12.0));
            assert_eq!(a.average_value(), Some(3.0));
            assert_eq!(a.min_value(), Value::Integer(2));
            assert_eq!(a.max_value(), Value::Integer(6));
        });
    }

    #[test]
    fn string_extremes_are_lexicographic() {
        let values = ColumnValues::String(vec!["pear".into(), "apple".into(), "n/a".into()]);
        aggregate(&values, |a| {
            assert_eq!(a.min_value(), Value::String("apple".into()));
            assert_eq!(a.max_value(), Value::String("pear".into()));
            assert_eq!(a.sum(), None);
            assert_eq!(a.average_value(), None);
        });
    }

    #[test]
    fn dense_integer_ranges_are_categorical() {
        let dense = ColumnValues::Integer(vec![0, 1, 2, 3, 4, 4, 2]);
        assert!(aggregate(&dense, |a| a.is_categorical()));

        let sparse = ColumnValues::Integer(vec![5, 10, 15]);
        assert!(!aggregate(&sparse, |a| a.is_categorical()));

        let floats = ColumnValues::Number(vec![0.5, 1.5]);
        assert!(!aggregate(&floats, |a| a.is_categorical()));
    }

    #[test]
    fn distinct_counting_saturates_past_limit() {
        let values = ColumnValues::Integer((0..10).chain([0, 0]).collect());
        let mut cache = AggregationCache::default();
        let mut agg = Aggregator::new(&values, None, &mut cache, 4);
        assert_eq!(agg.count_distinct(), 5);
        assert!(!agg.is_categorical());
        let distinct = agg.distinct_values();
        assert_eq!(distinct.len(), 4);
        assert_eq!(distinct[0], (Value::Integer(0), 3));
    }

    #[test]
    fn seen_keys_keep_counting_after_saturation() {
        let values = ColumnValues::Integer(vec![0, 1, 2, 3, 4, 5, 4, 4]);
        let mut cache = AggregationCache::default();
        let mut agg = Aggregator::new(&values, None, &mut cache, 4);
        assert_eq!(agg.count_distinct(), 5);
        assert_eq!(agg.distinct_values()[0], (Value::Integer(4), 3));
    }

    #[test]
    fn statistics_respect_index_subsets() {
        let values = ColumnValues::Number(vec![-5.0, 1.0, 2.0, 100.0]);
        let indices = [1u32, 2];
        let mut cache = AggregationCache::default();
        let mut agg = Aggregator::new(&values, Some(&indices), &mut cache, 500);
        assert_eq!(agg.count(), 2);
        assert_eq!(agg.numeric_range(), Some((1.0, 2.0)));
        assert!(!agg.is_diverging());
    }

    #[test]
    fn fields_are_cached_until_reset() {
        let values = ColumnValues::Number(vec![-1.0, 3.0]);
        let mut cache = AggregationCache::default();
        {
            let mut agg = Aggregator::new(&values, None, &mut cache, 500);
            assert!(agg.is_diverging());
        }
        assert!(!cache.is_empty());
        cache.reset();
        assert!(cache.is_empty());
    }

    #[test]
    fn aggregation_by_type_dispatches() {
        let values = ColumnValues::String(vec!["a".into(), "b".into(), "a".into()]);
        aggregate(&values, |a| {
            assert_eq!(
                a.get_aggregation_by_type(AggregationKind::CountDistinct),
                serde_json::json!(2)
            );
            assert_eq!(
                a.get_aggregation_by_type(AggregationKind::DataType),
                serde_json::json!("string")
            );
            assert_eq!(
                a.get_aggregation_by_type(AggregationKind::IsCategorical),
                serde_json::json!(true)
            );
        });
    }
}
