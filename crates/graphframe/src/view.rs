//! Raw (ingested) and current (filtered) views of the dataframe.
//!
//! Both share the [`DataView`] shape. The raw view additionally owns the
//! attribute columns, which are never filtered in place; the current view
//! owns aggregation caches that die with it on the next filter pass.

use crate::aggregation::AggregationCache;
use crate::buffers::SharedBuffer;
use crate::column::{Attributes, ColumnKey};
use crate::encapsulate::EdgeEncapsulation;
use crate::error::{DataframeError, Result};
use crate::mask::MaskSize;
use crate::types::ComponentType;
use std::collections::{BTreeMap, HashMap};

pub type NumElements = MaskSize;

/// Element layout of a buffer: which component indexes it and how many
/// scalars each element occupies. Edge layouts follow canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferLayout {
    pub component: ComponentType,
    pub stride: usize,
}

impl BufferLayout {
    pub const fn new(component: ComponentType, stride: usize) -> Self {
        Self { component, stride }
    }

    pub fn len_for(&self, num_elements: NumElements) -> usize {
        num_elements.get(self.component) * self.stride
    }
}

/// Well-known simulator buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimBuffer {
    CurPoints,
    PrevForces,
    Degrees,
    SpringsPos,
    ForwardsEdges,
    ForwardsWorkItems,
    ForwardsEdgeStartEndIdxs,
    ForwardsEdgeWeights,
    BackwardsEdges,
    BackwardsWorkItems,
    BackwardsEdgeStartEndIdxs,
    BackwardsEdgeWeights,
}

impl SimBuffer {
    pub const ALL: [SimBuffer; 12] = [
        SimBuffer::CurPoints,
        SimBuffer::PrevForces,
        SimBuffer::Degrees,
        SimBuffer::SpringsPos,
        SimBuffer::ForwardsEdges,
        SimBuffer::ForwardsWorkItems,
        SimBuffer::ForwardsEdgeStartEndIdxs,
        SimBuffer::ForwardsEdgeWeights,
        SimBuffer::BackwardsEdges,
        SimBuffer::BackwardsWorkItems,
        SimBuffer::BackwardsEdgeStartEndIdxs,
        SimBuffer::BackwardsEdgeWeights,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SimBuffer::CurPoints => "curPoints",
            SimBuffer::PrevForces => "prevForces",
            SimBuffer::Degrees => "degrees",
            SimBuffer::SpringsPos => "springsPos",
            SimBuffer::ForwardsEdges => "forwardsEdges",
            SimBuffer::ForwardsWorkItems => "forwardsWorkItems",
            SimBuffer::ForwardsEdgeStartEndIdxs => "forwardsEdgeStartEndIdxs",
            SimBuffer::ForwardsEdgeWeights => "forwardsEdgeWeights",
            SimBuffer::BackwardsEdges => "backwardsEdges",
            SimBuffer::BackwardsWorkItems => "backwardsWorkItems",
            SimBuffer::BackwardsEdgeStartEndIdxs => "backwardsEdgeStartEndIdxs",
            SimBuffer::BackwardsEdgeWeights => "backwardsEdgeWeights",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        SimBuffer::ALL.into_iter().find(|b| b.name() == name)
    }

    pub fn layout(&self) -> BufferLayout {
        use ComponentType::{Edge, Point};
        match self {
            SimBuffer::CurPoints | SimBuffer::PrevForces => BufferLayout::new(Point, 2),
            SimBuffer::Degrees => BufferLayout::new(Point, 1),
            SimBuffer::SpringsPos => BufferLayout::new(Edge, 4),
            SimBuffer::ForwardsEdges | SimBuffer::BackwardsEdges => BufferLayout::new(Edge, 2),
            SimBuffer::ForwardsWorkItems | SimBuffer::BackwardsWorkItems => {
                BufferLayout::new(Point, 3)
            }
            SimBuffer::ForwardsEdgeStartEndIdxs | SimBuffer::BackwardsEdgeStartEndIdxs => {
                BufferLayout::new(Point, 2)
            }
            SimBuffer::ForwardsEdgeWeights | SimBuffer::BackwardsEdgeWeights => {
                BufferLayout::new(Edge, 1)
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EdgeBuffers {
    pub edges: Option<SharedBuffer>,
    pub work_items: Option<SharedBuffer>,
    pub edge_start_end_idxs: Option<SharedBuffer>,
    /// Weights in this direction's canonical order.
    pub weights: Option<SharedBuffer>,
}

#[derive(Debug, Clone)]
pub struct OverlayBuffer {
    pub handle: SharedBuffer,
    pub layout: BufferLayout,
}

#[derive(Debug, Clone, Default)]
pub struct SimulatorBuffers {
    pub cur_points: Option<SharedBuffer>,
    pub prev_forces: Option<SharedBuffer>,
    pub degrees: Option<SharedBuffer>,
    pub springs_pos: Option<SharedBuffer>,
    pub forwards: EdgeBuffers,
    pub backwards: EdgeBuffers,
    /// User-registered `f32` buffers outside the well-known set.
    pub overlays: BTreeMap<String, OverlayBuffer>,
}

impl SimulatorBuffers {
    pub fn get(&self, buffer: SimBuffer) -> Option<&SharedBuffer> {
        self.slot(buffer).as_ref()
    }

    pub fn set(&mut self, buffer: SimBuffer, handle: SharedBuffer) -> Option<SharedBuffer> {
        self.slot_mut(buffer).replace(handle)
    }

    fn slot(&self, buffer: SimBuffer) -> &Option<SharedBuffer> {
        match buffer {
            SimBuffer::CurPoints => &self.cur_points,
            SimBuffer::PrevForces => &self.prev_forces,
            SimBuffer::Degrees => &self.degrees,
            SimBuffer::SpringsPos => &self.springs_pos,
            SimBuffer::ForwardsEdges => &self.forwards.edges,
            SimBuffer::ForwardsWorkItems => &self.forwards.work_items,
            SimBuffer::ForwardsEdgeStartEndIdxs => &self.forwards.edge_start_end_idxs,
            SimBuffer::ForwardsEdgeWeights => &self.forwards.weights,
            SimBuffer::BackwardsEdges => &self.backwards.edges,
            SimBuffer::BackwardsWorkItems => &self.backwards.work_items,
            SimBuffer::BackwardsEdgeStartEndIdxs => &self.backwards.edge_start_end_idxs,
            SimBuffer::BackwardsEdgeWeights => &self.backwards.weights,
        }
    }

    fn slot_mut(&mut self, buffer: SimBuffer) -> &mut Option<SharedBuffer> {
        match buffer {
            SimBuffer::CurPoints => &mut self.cur_points,
            SimBuffer::PrevForces => &mut self.prev_forces,
            SimBuffer::Degrees => &mut self.degrees,
            SimBuffer::SpringsPos => &mut self.springs_pos,
            SimBuffer::ForwardsEdges => &mut self.forwards.edges,
            SimBuffer::ForwardsWorkItems => &mut self.forwards.work_items,
            SimBuffer::ForwardsEdgeStartEndIdxs => &mut self.forwards.edge_start_end_idxs,
            SimBuffer::ForwardsEdgeWeights => &mut self.forwards.weights,
            SimBuffer::BackwardsEdges => &mut self.backwards.edges,
            SimBuffer::BackwardsWorkItems => &mut self.backwards.work_items,
            SimBuffer::BackwardsEdgeStartEndIdxs => &mut self.backwards.edge_start_end_idxs,
            SimBuffer::BackwardsEdgeWeights => &mut self.backwards.weights,
        }
    }

    /// Filtering needs edge weights in both directions.
    pub fn is_ready(&self) -> bool {
        self.forwards.weights.is_some() && self.backwards.weights.is_some()
    }

    /// Every handle held, well-known and overlay alike.
    pub fn handles(&self) -> Vec<SharedBuffer> {
        SimBuffer::ALL
            .iter()
            .filter_map(|b| self.get(*b).cloned())
            .chain(self.overlays.values().map(|o| o.handle.clone()))
            .collect()
    }
}

/// CPU-side adjacency tables.
#[derive(Debug, Clone, Default)]
pub struct HostBuffers {
    pub forwards_edges: EdgeEncapsulation,
    pub backwards_edges: EdgeEncapsulation,
    /// Flattened `(src, dst)` pairs in load order.
    pub unsorted_edges: Vec<u32>,
}

/// Well-known CPU-side render arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocalBuffer {
    PointSizes,
    PointColors,
    EdgeColors,
    EdgeHeights,
    MidEdgesColors,
}

impl LocalBuffer {
    pub fn name(&self) -> &'static str {
        match self {
            LocalBuffer::PointSizes => "pointSizes",
            LocalBuffer::PointColors => "pointColors",
            LocalBuffer::EdgeColors => "edgeColors",
            LocalBuffer::EdgeHeights => "edgeHeights",
            LocalBuffer::MidEdgesColors => "midEdgesColors",
        }
    }

    pub fn layout(&self) -> BufferLayout {
        match self {
            LocalBuffer::PointSizes | LocalBuffer::PointColors => {
                BufferLayout::new(ComponentType::Point, 1)
            }
            LocalBuffer::EdgeColors | LocalBuffer::MidEdgesColors => {
                BufferLayout::new(ComponentType::Edge, 2)
            }
            LocalBuffer::EdgeHeights => BufferLayout::new(ComponentType::Edge, 1),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LocalArray {
    U8(Vec<u8>),
    U32(Vec<u32>),
    F32(Vec<f32>),
}

impl LocalArray {
    pub fn len(&self) -> usize {
        match self {
            LocalArray::U8(v) => v.len(),
            LocalArray::U32(v) => v.len(),
            LocalArray::F32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies the `stride`-wide element of every index, in iteration order.
    pub fn gather(&self, indexes: impl Iterator<Item = u32>, stride: usize) -> LocalArray {
        match self {
            LocalArray::U8(v) => LocalArray::U8(gather_strided(v, indexes, stride)),
            LocalArray::U32(v) => LocalArray::U32(gather_strided(v, indexes, stride)),
            LocalArray::F32(v) => LocalArray::F32(gather_strided(v, indexes, stride)),
        }
    }
}

pub(crate) fn gather_strided<T: Copy>(
    src: &[T],
    indexes: impl Iterator<Item = u32>,
    stride: usize,
) -> Vec<T> {
    let mut out = Vec::with_capacity(indexes.size_hint().0 * stride);
    for idx in indexes {
        let start = idx as usize * stride;
        out.extend_from_slice(&src[start..start + stride]);
    }
    out
}

#[derive(Debug, Clone)]
pub struct LocalOverlay {
    pub layout: BufferLayout,
    pub data: LocalArray,
}

#[derive(Debug, Clone, Default)]
pub struct LocalBuffers {
    pub point_sizes: Option<LocalArray>,
    pub point_colors: Option<LocalArray>,
    pub edge_colors: Option<LocalArray>,
    pub edge_heights: Option<LocalArray>,
    pub mid_edges_colors: Option<LocalArray>,
    pub overlays: BTreeMap<String, LocalOverlay>,
}

impl LocalBuffers {
    pub fn get(&self, buffer: LocalBuffer) -> Option<&LocalArray> {
        match buffer {
            LocalBuffer::PointSizes => self.point_sizes.as_ref(),
            LocalBuffer::PointColors => self.point_colors.as_ref(),
            LocalBuffer::EdgeColors => self.edge_colors.as_ref(),
            LocalBuffer::EdgeHeights => self.edge_heights.as_ref(),
            LocalBuffer::MidEdgesColors => self.mid_edges_colors.as_ref(),
        }
    }

    pub fn set(&mut self, buffer: LocalBuffer, data: LocalArray) {
        let slot = match buffer {
            LocalBuffer::PointSizes => &mut self.point_sizes,
            LocalBuffer::PointColors => &mut self.point_colors,
            LocalBuffer::EdgeColors => &mut self.edge_colors,
            LocalBuffer::EdgeHeights => &mut self.edge_heights,
            LocalBuffer::MidEdgesColors => &mut self.mid_edges_colors,
        };
        *slot = Some(data);
    }
}

#[derive(Debug, Clone, Default)]
pub struct Labels {
    pub point: Option<Vec<String>>,
    pub edge: Option<Vec<String>>,
}

impl Labels {
    pub fn of(&self, component: ComponentType) -> Option<&[String]> {
        match component {
            ComponentType::Point => self.point.as_deref(),
            ComponentType::Edge => self.edge.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DataView {
    pub buffers: SimulatorBuffers,
    pub host_buffers: HostBuffers,
    pub local_buffers: LocalBuffers,
    pub labels: Labels,
    pub num_elements: NumElements,
}

impl DataView {
    pub fn check_len(&self, what: &str, layout: BufferLayout, actual: usize) -> Result<()> {
        let expected = layout.len_for(self.num_elements);
        if expected != actual {
            return Err(DataframeError::mismatched(what, expected, actual));
        }
        Ok(())
    }
}

/// Immutable ingested data; the source of truth for global indices.
#[derive(Debug, Clone, Default)]
pub struct RawData {
    pub attributes: Attributes,
    pub view: DataView,
}

/// The filtered view produced by the last successful filter pass. Indices are local.
#[derive(Debug, Clone, Default)]
pub struct CurrentData {
    pub view: DataView,
    pub aggregations: HashMap<ColumnKey, AggregationCache>,
}
