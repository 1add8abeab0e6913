//! Compiled query plans and their evaluation into masks.
//!
//! Expression parsing happens upstream; plans arrive as predicates over a
//! single value or over a row of named attributes.

use crate::composer::{compose_masks, MaskLimits};
use crate::dataframe::{Dataframe, ViewKind};
use crate::error::{DataframeError, Result};
use crate::mask::DataframeMask;
use crate::types::{ColumnValues, ComponentType, Value};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

pub type ValuePredicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;
pub type RowPredicate = Arc<dyn Fn(&RowAccessor<'_>) -> bool + Send + Sync>;

/// Named cells of one element, as seen by a [`RowPredicate`].
pub struct RowAccessor<'a> {
    columns: &'a [(String, &'a ColumnValues)],
    index: usize,
}

impl RowAccessor<'_> {
    /// Global index of the element.
    pub fn index(&self) -> usize {
        self.index
    }

    /// The cell of attribute `name`, `Value::Null` when the plan did not reference it.
    pub fn get(&self, name: &str) -> Value {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, values)| values.value_at(self.index))
            .unwrap_or(Value::Null)
    }
}

#[derive(Clone)]
pub enum QueryPlan {
    SingleAttributePredicate {
        attribute: String,
        /// Restricts name resolution; `None` tries points, then edges.
        component: Option<ComponentType>,
        predicate: ValuePredicate,
    },
    CompiledExpression {
        component: ComponentType,
        attributes: Vec<String>,
        predicate: RowPredicate,
    },
}

impl fmt::Debug for QueryPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryPlan::SingleAttributePredicate {
                attribute,
                component,
                ..
            } => f
                .debug_struct("SingleAttributePredicate")
                .field("attribute", attribute)
                .field("component", component)
                .finish_non_exhaustive(),
            QueryPlan::CompiledExpression {
                component,
                attributes,
                ..
            } => f
                .debug_struct("CompiledExpression")
                .field("component", component)
                .field("attributes", attributes)
                .finish_non_exhaustive(),
        }
    }
}

/// A query that could not be planned or evaluated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryError {
    pub attribute: Option<String>,
    pub message: String,
}

impl QueryError {
    fn from_error(plan: &QueryPlan, err: &DataframeError) -> Self {
        let attribute = match err {
            DataframeError::InvalidReference { name, .. } => Some(name.clone()),
            _ => plan.attributes().first().map(|a| a.to_string()),
        };
        Self {
            attribute,
            message: err.to_string(),
        }
    }
}

impl QueryPlan {
    pub fn single(attribute: impl Into<String>, predicate: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Self {
        QueryPlan::SingleAttributePredicate {
            attribute: attribute.into(),
            component: None,
            predicate: Arc::new(predicate),
        }
    }

    pub fn expression(
        component: ComponentType,
        attributes: Vec<String>,
        predicate: impl Fn(&RowAccessor<'_>) -> bool + Send + Sync + 'static,
    ) -> Self {
        QueryPlan::CompiledExpression {
            component,
            attributes,
            predicate: Arc::new(predicate),
        }
    }

    pub fn attributes(&self) -> Vec<&str> {
        match self {
            QueryPlan::SingleAttributePredicate { attribute, .. } => vec![attribute.as_str()],
            QueryPlan::CompiledExpression { attributes, .. } => {
                attributes.iter().map(String::as_str).collect()
            }
        }
    }

    /// True when the plan reads a single attribute and can be evaluated one
    /// value at a time.
    pub fn is_redundant(&self) -> bool {
        self.attributes().len() == 1
    }

    /// Component type the plan iterates over.
    pub fn iteration_type(&self, df: &Dataframe) -> Result<ComponentType> {
        match self {
            QueryPlan::SingleAttributePredicate {
                attribute,
                component,
                ..
            } => Ok(df.resolve(attribute, *component)?.component),
            QueryPlan::CompiledExpression { component, .. } => Ok(*component),
        }
    }

    /// Global indices matching the plan, ascending, plus their component type.
    pub fn matches(&self, df: &Dataframe) -> Result<(ComponentType, Vec<u32>)> {
        match self {
            QueryPlan::SingleAttributePredicate {
                attribute,
                component,
                predicate,
            } => {
                let key = df.resolve(attribute, *component)?;
                let column = df.raw().attributes.column(&key)?;
                let hits = (0..column.len())
                    .filter(|&i| predicate(&column.values.value_at(i)))
                    .map(|i| i as u32)
                    .collect();
                Ok((key.component, hits))
            }
            QueryPlan::CompiledExpression {
                component,
                attributes,
                predicate,
            } => {
                if attributes.is_empty() {
                    return Err(DataframeError::InvalidArgument(
                        "expression references no attributes".to_string(),
                    ));
                }
                let mut columns = Vec::with_capacity(attributes.len());
                for name in attributes {
                    let key = df.resolve(name, Some(*component))?;
                    if key.component != *component {
                        return Err(DataframeError::InvalidArgument(format!(
                            "{name} is a {} attribute, expression iterates {component}s",
                            key.component
                        )));
                    }
                    columns.push((name.clone(), &df.raw.attributes.column(&key)?.values));
                }
                let total = df.num_elements(ViewKind::Raw).get(*component);
                let hits = (0..total)
                    .filter(|&index| {
                        predicate(&RowAccessor {
                            columns: &columns,
                            index,
                        })
                    })
                    .map(|i| i as u32)
                    .collect();
                Ok((*component, hits))
            }
        }
    }

    /// Selection mask: matched elements of the plan's type, the other type full.
    pub fn execute(&self, df: &Dataframe) -> Result<DataframeMask> {
        let universe = df.num_elements(ViewKind::Raw);
        let (component, hits) = self.matches(df)?;
        Ok(match component {
            ComponentType::Point => DataframeMask::new(universe, Some(hits), None),
            ComponentType::Edge => DataframeMask::new(universe, None, Some(hits)),
        })
    }
}

impl Dataframe {
    /// Evaluates `plan` over the raw data. Point queries keep only edges between
    /// matched points. Failures are appended to `errors` and yield `None`.
    pub fn get_masks_for_query(&self, plan: &QueryPlan, errors: &mut Vec<QueryError>) -> Option<DataframeMask> {
        match plan.execute(self) {
            Ok(mask) if mask.is_full(ComponentType::Point) => Some(mask),
            Ok(mask) => Some(self.prune_mask_edges(&mask)),
            Err(err) => {
                warn!(?plan, error = %err, "query failed");
                errors.push(QueryError::from_error(plan, &err));
                None
            }
        }
    }

    /// Composes selection and exclusion queries into one mask. Failed queries
    /// are reported in `errors` and left out; the rest still apply.
    pub fn filter_mask_for_queries(
        &self,
        selections: &[QueryPlan],
        exclusions: &[QueryPlan],
        limits: MaskLimits,
        errors: &mut Vec<QueryError>,
    ) -> DataframeMask {
        let universe = self.num_elements(ViewKind::Raw);
        let selected: Vec<DataframeMask> = selections
            .iter()
            .filter_map(|plan| self.get_masks_for_query(plan, errors))
            .collect();
        let excluded: Vec<DataframeMask> = exclusions
            .iter()
            .filter_map(|plan| match plan.matches(self) {
                Ok((ComponentType::Point, hits)) => {
                    Some(DataframeMask::new(universe, Some(hits), Some(Vec::new())))
                }
                Ok((ComponentType::Edge, hits)) => {
                    Some(DataframeMask::new(universe, Some(Vec::new()), Some(hits)))
                }
                Err(err) => {
                    errors.push(QueryError::from_error(plan, &err));
                    None
                }
            })
            .collect();

        let selected: Vec<&DataframeMask> = selected.iter().collect();
        let excluded: Vec<&DataframeMask> = excluded.iter().collect();
        let composed = compose_masks(universe, &selected, &excluded, limits);
        self.prune_mask_edges(&composed)
    }
}
