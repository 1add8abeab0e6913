//! Canonical edge ordering and per-point adjacency tables.
//!
//! Edges are sorted by source, ties broken by destination and then by input
//! position, so multi-edges stay distinct and the order is deterministic. The
//! backward direction is the same routine applied to flipped pairs.

use crate::error::{DataframeError, Result};
use serde::Serialize;

/// Adjacency range of one point inside the sorted edge array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WorkItem {
    /// Offset of the first outgoing edge, or -1 for degree-0 points.
    pub start: i32,
    pub count: u32,
    pub point: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EdgeEncapsulation {
    pub num_points: usize,
    /// Flattened `(src, dst)` pairs in canonical order.
    pub edges_typed: Vec<u32>,
    /// Out-degree per point.
    pub degrees_typed: Vec<u32>,
    /// Input position -> sorted position.
    pub edge_permutation: Vec<u32>,
    /// Sorted position -> input position.
    pub edge_permutation_inverse: Vec<u32>,
    pub work_items: Vec<WorkItem>,
    /// Per point `(start, end)` edge range, `(-1, -1)` without edges.
    pub edge_start_end_idxs: Vec<[i32; 2]>,
    pub src_to_work_item: Vec<u32>,
}

impl EdgeEncapsulation {
    pub fn num_edges(&self) -> usize {
        self.edges_typed.len() / 2
    }

    /// `(src, dst)` of the edge at canonical position `sorted_idx`.
    pub fn edge(&self, sorted_idx: usize) -> Option<(u32, u32)> {
        let src = *self.edges_typed.get(sorted_idx * 2)?;
        let dst = *self.edges_typed.get(sorted_idx * 2 + 1)?;
        Some((src, dst))
    }

    /// Destinations of `point`'s outgoing edges, in canonical order.
    pub fn neighbors(&self, point: u32) -> impl Iterator<Item = u32> + '_ {
        let item = self.work_items.get(point as usize).copied();
        let range = match item {
            Some(item) if item.start >= 0 => {
                let start = item.start as usize;
                start..start + item.count as usize
            }
            _ => 0..0,
        };
        range.map(move |e| self.edges_typed[e * 2 + 1])
    }

    /// Work items flattened as `start, count, point` triples for buffer upload.
    pub fn work_items_typed(&self) -> Vec<i32> {
        self.work_items
            .iter()
            .flat_map(|w| [w.start, w.count as i32, w.point as i32])
            .collect()
    }

    pub fn edge_start_end_typed(&self) -> Vec<i32> {
        self.edge_start_end_idxs.iter().flatten().copied().collect()
    }

    /// Recomputes every table in place for `edges` over `num_points`,
    /// reusing the existing allocations.
    pub fn rebuild(&mut self, edges: &[u32], num_points: usize) -> Result<()> {
        if edges.len() % 2 != 0 {
            return Err(DataframeError::mismatched(
                "edge pair array",
                edges.len() + 1,
                edges.len(),
            ));
        }
        if let Some(&bad) = edges.iter().find(|&&p| p as usize >= num_points) {
            return Err(DataframeError::InvalidReference {
                kind: "point",
                name: bad.to_string(),
            });
        }

        let num_edges = edges.len() / 2;
        self.num_points = num_points;

        let originals = &mut self.edge_permutation_inverse;
        originals.clear();
        originals.extend(0..num_edges as u32);
        originals.sort_unstable_by_key(|&i| {
            let i = i as usize;
            (edges[i * 2], edges[i * 2 + 1], i)
        });

        self.edge_permutation.clear();
        self.edge_permutation.resize(num_edges, 0);
        for (sorted, &original) in self.edge_permutation_inverse.iter().enumerate() {
            self.edge_permutation[original as usize] = sorted as u32;
        }

        self.edges_typed.clear();
        self.edges_typed.reserve(edges.len());
        for &original in &self.edge_permutation_inverse {
            let o = original as usize;
            self.edges_typed.push(edges[o * 2]);
            self.edges_typed.push(edges[o * 2 + 1]);
        }

        self.build_work_items();
        self.build_degrees();
        self.build_start_end();
        Ok(())
    }

    fn build_work_items(&mut self) {
        self.work_items.clear();
        self.work_items.reserve(self.num_points);
        let num_edges = self.num_edges();
        let mut edge = 0usize;
        for point in 0..self.num_points as u32 {
            let start = edge;
            while edge < num_edges && self.edges_typed[edge * 2] == point {
                edge += 1;
            }
            let count = (edge - start) as u32;
            self.work_items.push(WorkItem {
                start: if count > 0 { start as i32 } else { -1 },
                count,
                point,
            });
        }
    }

    fn build_degrees(&mut self) {
        self.degrees_typed.clear();
        self.degrees_typed.resize(self.num_points, 0);
        self.src_to_work_item.clear();
        self.src_to_work_item.resize(self.num_points, 0);
        for (slot, item) in self.work_items.iter().enumerate() {
            self.degrees_typed[item.point as usize] = item.count;
            self.src_to_work_item[item.point as usize] = slot as u32;
        }
    }

    fn build_start_end(&mut self) {
        let num_edges = self.num_edges() as i32;
        let items = &self.work_items;
        self.edge_start_end_idxs.clear();
        self.edge_start_end_idxs.reserve(items.len());
        for (i, item) in items.iter().enumerate() {
            if item.start < 0 {
                self.edge_start_end_idxs.push([-1, -1]);
                continue;
            }
            // End is the next start, skipping over degree-0 gaps.
            let end = items[i + 1..]
                .iter()
                .find(|next| next.start >= 0)
                .map_or(num_edges, |next| next.start);
            self.edge_start_end_idxs.push([item.start, end]);
        }
    }
}

pub fn encapsulate_edges(edges: &[u32], num_points: usize) -> Result<EdgeEncapsulation> {
    let mut encapsulation = EdgeEncapsulation::default();
    encapsulation.rebuild(edges, num_points)?;
    Ok(encapsulation)
}

/// Swaps every `(src, dst)` pair into `out`, reusing its allocation.
pub fn flip_pairs_into(edges: &[u32], out: &mut Vec<u32>) {
    out.clear();
    out.reserve(edges.len());
    for pair in edges.chunks_exact(2) {
        out.push(pair[1]);
        out.push(pair[0]);
    }
}

/// Forward and backward encapsulations for the same edge list.
pub fn encapsulate_both(
    edges: &[u32],
    num_points: usize,
) -> Result<(EdgeEncapsulation, EdgeEncapsulation)> {
    let forwards = encapsulate_edges(edges, num_points)?;
    let mut flipped = Vec::new();
    flip_pairs_into(edges, &mut flipped);
    let backwards = encapsulate_edges(&flipped, num_points)?;
    Ok((forwards, backwards))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sorts_by_source_then_destination() -> Result<()> {
        let edges = [2, 0, 0, 3, 0, 1, 1, 2];
        let enc = encapsulate_edges(&edges, 4)?;
        assert_eq!(enc.edges_typed, vec![0, 1, 0, 3, 1, 2, 2, 0]);
        assert_eq!(enc.edge_permutation_inverse, vec![2, 1, 3, 0]);
        assert_eq!(enc.edge_permutation, vec![3, 1, 0, 2]);
        for (sorted, &original) in enc.edge_permutation_inverse.iter().enumerate() {
            assert_eq!(enc.edge_permutation[original as usize] as usize, sorted);
        }
        Ok(())
    }

    #[test]
    fn degrees_sum_to_edge_count() -> Result<()> {
        let edges = [0, 1, 0, 2, 3, 0, 0, 1];
        let enc = encapsulate_edges(&edges, 5)?;
        assert_eq!(enc.degrees_typed, vec![3, 0, 0, 1, 0]);
        assert_eq!(enc.degrees_typed.iter().sum::<u32>() as usize, enc.num_edges());
        Ok(())
    }

    #[test]
    fn work_items_and_ranges() -> Result<()> {
        let edges = [0, 1, 0, 2, 3, 0];
        let enc = encapsulate_edges(&edges, 5)?;
        assert_eq!(
            enc.work_items,
            vec![
                WorkItem { start: 0, count: 2, point: 0 },
                WorkItem { start: -1, count: 0, point: 1 },
                WorkItem { start: -1, count: 0, point: 2 },
                WorkItem { start: 2, count: 1, point: 3 },
                WorkItem { start: -1, count: 0, point: 4 },
            ]
        );
        assert_eq!(
            enc.edge_start_end_idxs,
            vec![[0, 2], [-1, -1], [-1, -1], [2, 3], [-1, -1]]
        );
        assert_eq!(enc.src_to_work_item, vec![0, 1, 2, 3, 4]);
        assert_eq!(enc.neighbors(0).collect::<Vec<_>>(), vec![1, 2]);
        Ok(())
    }

    #[test]
    fn empty_edge_set() -> Result<()> {
        let enc = encapsulate_edges(&[], 3)?;
        assert!(enc.work_items.iter().all(|w| w.start == -1 && w.count == 0));
        assert!(enc.edge_start_end_idxs.iter().all(|r| *r == [-1, -1]));
        assert_eq!(enc.num_edges(), 0);
        Ok(())
    }

    #[test]
    fn multi_and_self_edges_are_kept() -> Result<()> {
        let edges = [1, 1, 0, 1, 0, 1];
        let enc = encapsulate_edges(&edges, 2)?;
        assert_eq!(enc.edges_typed, vec![0, 1, 0, 1, 1, 1]);
        assert_eq!(enc.edge_permutation_inverse, vec![1, 2, 0]);
        Ok(())
    }

    #[test]
    fn backward_direction_uses_flipped_pairs() -> Result<()> {
        let edges = [0, 1, 1, 2, 2, 3];
        let (fwd, bwd) = encapsulate_both(&edges, 4)?;
        assert_eq!(fwd.degrees_typed, vec![1, 1, 1, 0]);
        assert_eq!(bwd.degrees_typed, vec![0, 1, 1, 1]);
        assert_eq!(bwd.edges_typed, vec![1, 0, 2, 1, 3, 2]);
        Ok(())
    }

    #[test]
    fn rejects_out_of_range_endpoints() {
        let err = encapsulate_edges(&[0, 9], 3).unwrap_err();
        assert!(matches!(err, DataframeError::InvalidReference { kind: "point", .. }));
    }

    #[test]
    fn rebuild_reuses_previous_tables() -> Result<()> {
        let mut enc = encapsulate_edges(&[0, 1, 1, 2, 2, 0], 3)?;
        enc.rebuild(&[1, 0], 2)?;
        assert_eq!(enc.edges_typed, vec![1, 0]);
        assert_eq!(enc.degrees_typed, vec![0, 1]);
        assert_eq!(enc.edge_start_end_idxs, vec![[-1, -1], [0, 1]]);
        Ok(())
    }
}
