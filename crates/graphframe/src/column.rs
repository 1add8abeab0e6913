use crate::aggregation::{AggregationCache, Aggregator};
use crate::error::{DataframeError, Result};
use crate::types::{ComponentType, DataType, ColumnValues};
use tracing::warn;

/// Identity of a column: component type plus key. Display names may repeat.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ColumnKey {
    pub component: ComponentType,
    pub key: String,
}

impl ColumnKey {
    pub fn new(component: ComponentType, key: impl Into<String>) -> Self {
        Self {
            component,
            key: key.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Column {
    pub key: String,
    pub name: String,
    pub values: ColumnValues,
    pub aggregations: AggregationCache,
}

impl Column {
    pub fn new(key: impl Into<String>, values: ColumnValues) -> Self {
        let key = key.into();
        Self {
            name: key.clone(),
            key,
            values,
            aggregations: AggregationCache::default(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn data_type(&self) -> DataType {
        self.values.data_type()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Keys starting with `__` are bookkeeping columns hidden from row projections.
    pub fn is_internal(&self) -> bool {
        self.key.starts_with("__")
    }

    /// Statistics over the whole column, cached on the column.
    pub fn aggregations(&mut self, distinct_limit: usize) -> Aggregator<'_> {
        Aggregator::new(&self.values, None, &mut self.aggregations, distinct_limit)
    }
}

/// Columns of one component type, in load order.
#[derive(Debug, Clone, Default)]
pub struct AttributeMap {
    columns: Vec<Column>,
}

impl AttributeMap {
    /// Adds `column`, replacing any column with the same key.
    pub fn insert(&mut self, column: Column) {
        match self.columns.iter_mut().find(|c| c.key == column.key) {
            Some(existing) => *existing = column,
            None => self.columns.push(column),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.key == key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| c.key == key)
    }

    /// Resolves a key or display name. Keys win; ambiguous display names
    /// resolve to the first loaded column.
    pub fn resolve_key(&self, name: &str) -> Option<&str> {
        if let Some(column) = self.get(name) {
            return Some(&column.key);
        }
        let mut matches = self.columns.iter().filter(|c| c.name == name);
        let first = matches.next()?;
        let others = matches.count();
        if others > 0 {
            warn!(
                name,
                chosen = %first.key,
                others,
                "ambiguous column name, using first match"
            );
        }
        Some(&first.key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Column> {
        self.columns.iter_mut()
    }

    pub fn public_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| !c.is_internal())
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Attributes {
    pub point: AttributeMap,
    pub edge: AttributeMap,
}

impl Attributes {
    pub fn of(&self, component: ComponentType) -> &AttributeMap {
        match component {
            ComponentType::Point => &self.point,
            ComponentType::Edge => &self.edge,
        }
    }

    pub fn of_mut(&mut self, component: ComponentType) -> &mut AttributeMap {
        match component {
            ComponentType::Point => &mut self.point,
            ComponentType::Edge => &mut self.edge,
        }
    }

    pub fn column(&self, key: &ColumnKey) -> Result<&Column> {
        self.of(key.component)
            .get(&key.key)
            .ok_or_else(|| DataframeError::unknown_column(format!("{}:{}", key.component, key.key)))
    }

    pub fn column_mut(&mut self, key: &ColumnKey) -> Result<&mut Column> {
        self.of_mut(key.component)
            .get_mut(&key.key)
            .ok_or_else(|| DataframeError::unknown_column(format!("{}:{}", key.component, key.key)))
    }

    /// Resolves `name`, which may be qualified as `point:<name>` or
    /// `edge:<name>`. Unqualified names are looked up in `preferred` first,
    /// then in the other component type.
    pub fn resolve(&self, name: &str, preferred: Option<ComponentType>) -> Option<ColumnKey> {
        if let Some((prefix, rest)) = name.split_once(':') {
            if let Some(component) = ComponentType::parse(prefix) {
                return self
                    .of(component)
                    .resolve_key(rest)
                    .map(|key| ColumnKey::new(component, key));
            }
        }
        let order = match preferred {
            Some(ComponentType::Edge) => [ComponentType::Edge, ComponentType::Point],
            _ => [ComponentType::Point, ComponentType::Edge],
        };
        let candidates = match preferred {
            Some(_) => &order[..1],
            None => &order[..],
        };
        candidates.iter().find_map(|&component| {
            self.of(component)
                .resolve_key(name)
                .map(|key| ColumnKey::new(component, key))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attributes() -> Attributes {
        let mut attrs = Attributes::default();
        attrs
            .point
            .insert(Column::new("size", ColumnValues::Number(vec![1.0, 2.0])));
        attrs.point.insert(
            Column::new("community_a", ColumnValues::Integer(vec![0, 1])).with_name("community"),
        );
        attrs.point.insert(
            Column::new("community_b", ColumnValues::Integer(vec![1, 1])).with_name("community"),
        );
        attrs
            .edge
            .insert(Column::new("weight", ColumnValues::Number(vec![0.5])));
        attrs
    }

    #[test]
    fn ambiguous_names_resolve_to_first_loaded() {
        let attrs = attributes();
        let key = attrs.resolve("community", Some(ComponentType::Point)).unwrap();
        assert_eq!(key, ColumnKey::new(ComponentType::Point, "community_a"));
    }

    #[test]
    fn qualified_names_pick_component() {
        let attrs = attributes();
        assert_eq!(
            attrs.resolve("edge:weight", None),
            Some(ColumnKey::new(ComponentType::Edge, "weight"))
        );
        assert_eq!(attrs.resolve("point:weight", None), None);
        assert_eq!(
            attrs.resolve("weight", None),
            Some(ColumnKey::new(ComponentType::Edge, "weight"))
        );
        assert_eq!(attrs.resolve("weight", Some(ComponentType::Point)), None);
    }

    #[test]
    fn insert_replaces_same_key() {
        let mut attrs = attributes();
        attrs
            .point
            .insert(Column::new("size", ColumnValues::Number(vec![9.0, 9.0])));
        assert_eq!(attrs.point.len(), 3);
        let size = attrs.point.get("size").unwrap();
        assert_eq!(size.values, ColumnValues::Number(vec![9.0, 9.0]));
    }

    #[test]
    fn internal_columns_are_hidden() {
        let mut attrs = attributes();
        attrs
            .point
            .insert(Column::new("__selection", ColumnValues::Integer(vec![0, 0])));
        let public: Vec<_> = attrs.point.public_columns().map(|c| c.key.as_str()).collect();
        assert_eq!(public, vec!["size", "community_a", "community_b"]);
    }
}
