//! Sparse point/edge selections over a dataframe.
//!
//! A mask stores global indices per component type. `None` means "every
//! element", which avoids materializing identity arrays for unfiltered views.
//! Edge indices always refer to the canonical (source-sorted) edge order.

use crate::types::ComponentType;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Element counts per component type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaskSize {
    pub point: usize,
    pub edge: usize,
}

impl MaskSize {
    pub fn new(point: usize, edge: usize) -> Self {
        Self { point, edge }
    }

    pub fn get(&self, component: ComponentType) -> usize {
        match component {
            ComponentType::Point => self.point,
            ComponentType::Edge => self.edge,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataframeMask {
    universe: MaskSize,
    point: Option<Vec<u32>>,
    edge: Option<Vec<u32>>,
}

impl DataframeMask {
    /// Builds a mask over a dataframe with `universe` elements. Index lists are
    /// normalized to strictly ascending order.
    pub fn new(universe: MaskSize, point: Option<Vec<u32>>, edge: Option<Vec<u32>>) -> Self {
        Self {
            universe,
            point: point.map(normalize),
            edge: edge.map(normalize),
        }
    }

    pub fn full(universe: MaskSize) -> Self {
        Self::new(universe, None, None)
    }

    pub fn empty(universe: MaskSize) -> Self {
        Self::new(universe, Some(Vec::new()), Some(Vec::new()))
    }

    pub fn universe(&self) -> MaskSize {
        self.universe
    }

    pub fn is_full(&self, component: ComponentType) -> bool {
        self.slot(component).is_none()
    }

    /// The explicit index list, or `None` when the mask covers every element.
    pub fn indexes(&self, component: ComponentType) -> Option<&[u32]> {
        self.slot(component).as_deref()
    }

    fn slot(&self, component: ComponentType) -> &Option<Vec<u32>> {
        match component {
            ComponentType::Point => &self.point,
            ComponentType::Edge => &self.edge,
        }
    }

    pub fn num_points(&self) -> usize {
        self.len(ComponentType::Point)
    }

    pub fn num_edges(&self) -> usize {
        self.len(ComponentType::Edge)
    }

    pub fn len(&self, component: ComponentType) -> usize {
        match self.slot(component) {
            Some(indexes) => indexes.len(),
            None => self.universe.get(component),
        }
    }

    pub fn mask_size(&self) -> MaskSize {
        MaskSize::new(self.num_points(), self.num_edges())
    }

    /// Ascending traversal of the global indices present for `component`.
    pub fn iter(&self, component: ComponentType) -> IndexIter<'_> {
        match self.slot(component) {
            Some(indexes) => IndexIter::Sparse(indexes.iter()),
            None => IndexIter::Full(0..self.universe.get(component) as u32),
        }
    }

    /// Calls `f(global_index, local_position)` for every present point.
    pub fn map_point_indexes<F: FnMut(u32, usize)>(&self, f: F) {
        self.map_indexes(ComponentType::Point, f)
    }

    /// Calls `f(global_index, local_position)` for every present edge.
    pub fn map_edge_indexes<F: FnMut(u32, usize)>(&self, f: F) {
        self.map_indexes(ComponentType::Edge, f)
    }

    pub fn map_indexes<F: FnMut(u32, usize)>(&self, component: ComponentType, mut f: F) {
        for (local, global) in self.iter(component).enumerate() {
            f(global, local);
        }
    }

    /// Translates a local (filtered) position back to a global index.
    pub fn get_index_by_type(&self, component: ComponentType, local: usize) -> Option<u32> {
        match self.slot(component) {
            Some(indexes) => indexes.get(local).copied(),
            None if local < self.universe.get(component) => Some(local as u32),
            None => None,
        }
    }

    pub fn typed_point_indexes(&self) -> Vec<u32> {
        self.iter(ComponentType::Point).collect()
    }

    pub fn typed_edge_indexes(&self) -> Vec<u32> {
        self.iter(ComponentType::Edge).collect()
    }

    /// Same points, replaced edge selection.
    pub fn with_edges(&self, edge: Option<Vec<u32>>) -> Self {
        Self::new(self.universe, self.point.clone(), edge)
    }

    /// Wire form: per type either explicit indexes or inclusive ranges,
    /// whichever is shorter. Types with more than `threshold` entries are omitted.
    pub fn to_json(&self, threshold: usize) -> MaskJson {
        MaskJson {
            point: self.index_set(ComponentType::Point, threshold),
            edge: self.index_set(ComponentType::Edge, threshold),
        }
    }

    fn index_set(&self, component: ComponentType, threshold: usize) -> Option<IndexSet> {
        if self.len(component) > threshold {
            return None;
        }
        let ranges = to_ranges(self.iter(component));
        if ranges.len() * 2 < self.len(component) {
            Some(IndexSet::Ranges { ranges })
        } else {
            Some(IndexSet::Indexes(self.iter(component).collect()))
        }
    }
}

fn normalize(mut indexes: Vec<u32>) -> Vec<u32> {
    if indexes.windows(2).any(|w| w[0] >= w[1]) {
        indexes.sort_unstable();
        indexes.dedup();
    }
    indexes
}

fn to_ranges(iter: impl Iterator<Item = u32>) -> Vec<[u32; 2]> {
    let mut ranges: Vec<[u32; 2]> = Vec::new();
    for idx in iter {
        match ranges.last_mut() {
            Some(last) if last[1] + 1 == idx => last[1] = idx,
            _ => ranges.push([idx, idx]),
        }
    }
    ranges
}

pub enum IndexIter<'a> {
    Full(Range<u32>),
    Sparse(std::slice::Iter<'a, u32>),
}

impl Iterator for IndexIter<'_> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        match self {
            IndexIter::Full(range) => range.next(),
            IndexIter::Sparse(iter) => iter.next().copied(),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self {
            IndexIter::Full(range) => range.size_hint(),
            IndexIter::Sparse(iter) => iter.size_hint(),
        }
    }
}

impl ExactSizeIterator for IndexIter<'_> {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IndexSet {
    Indexes(Vec<u32>),
    Ranges { ranges: Vec<[u32; 2]> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskJson {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub point: Option<IndexSet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edge: Option<IndexSet>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn traversal_is_ascending_and_counted() {
        let mask = DataframeMask::new(MaskSize::new(10, 4), Some(vec![7, 2, 2, 5]), None);
        let mut seen = Vec::new();
        mask.map_point_indexes(|global, local| seen.push((global, local)));
        assert_eq!(seen, vec![(2, 0), (5, 1), (7, 2)]);
        assert_eq!(mask.num_points(), seen.len());

        let mut edges = Vec::new();
        mask.map_edge_indexes(|global, _| edges.push(global));
        assert_eq!(edges, vec![0, 1, 2, 3]);
        assert_eq!(mask.num_edges(), 4);
    }

    #[test]
    fn local_positions_translate_to_global() {
        let mask = DataframeMask::new(MaskSize::new(10, 4), Some(vec![3, 8]), None);
        assert_eq!(mask.get_index_by_type(ComponentType::Point, 1), Some(8));
        assert_eq!(mask.get_index_by_type(ComponentType::Point, 2), None);
        assert_eq!(mask.get_index_by_type(ComponentType::Edge, 3), Some(3));
        assert_eq!(mask.get_index_by_type(ComponentType::Edge, 4), None);
    }

    #[test]
    fn typed_exports_expand_full_selections() {
        let mask = DataframeMask::new(MaskSize::new(3, 5), None, Some(vec![4, 1]));
        assert_eq!(mask.mask_size(), MaskSize::new(3, 2));
        assert_eq!(mask.typed_point_indexes(), vec![0, 1, 2]);
        assert_eq!(mask.typed_edge_indexes(), vec![1, 4]);
    }

    #[test]
    fn json_prefers_ranges_when_contiguous() {
        let mask = DataframeMask::new(
            MaskSize::new(100, 3),
            Some((10..40).collect()),
            Some(vec![0, 2]),
        );
        let json = serde_json::to_value(mask.to_json(30_000)).unwrap();
        assert_eq!(json["point"]["ranges"], serde_json::json!([[10, 39]]));
        assert_eq!(json["edge"], serde_json::json!([0, 2]));
    }

    #[test]
    fn json_omits_types_above_threshold() {
        let mask = DataframeMask::full(MaskSize::new(50, 2));
        let json = mask.to_json(10);
        assert!(json.point.is_none());
        assert_eq!(json.edge, Some(IndexSet::Indexes(vec![0, 1])));
    }
}
