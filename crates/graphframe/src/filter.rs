//! In-place filtering: rebuilds the current view from the raw view for a mask.
//!
//! A pass translates the mask's canonical edge indices to load order, remaps
//! endpoints to local point ids, re-canonicalizes both directions, gathers the
//! CPU-side arrays, and rewrites every simulator buffer at the new size. The
//! previous view's host buffers are deleted once the replacements exist.
//! Scratch vectors are owned by the dataframe and only ever grow.

use crate::buffers::{create_typed, read_typed, BufferHost, SharedBuffer};
use crate::dataframe::Dataframe;
use crate::encapsulate::flip_pairs_into;
use crate::error::{DataframeError, Result};
use crate::mask::{DataframeMask, MaskSize};
use crate::types::ComponentType;
use crate::view::{
    CurrentData, DataView, Labels, LocalBuffer, LocalBuffers, LocalOverlay, OverlayBuffer, SimBuffer,
};
use futures::future::try_join_all;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

const ABSENT: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOutcome {
    /// Raw edge weight buffers are not loaded yet; nothing was done.
    NotReady,
    /// The mask is the one already applied.
    Unchanged,
    Applied(MaskSize),
}

/// Index bookkeeping for one pass.
#[derive(Debug, Default)]
struct IndexScratch {
    points: Vec<u32>,
    /// Mask edges in canonical order.
    edges: Vec<u32>,
    /// Mask edges translated to load order, ascending.
    unsorted: Vec<u32>,
    /// Raw point id -> local point id, `ABSENT` when masked out.
    point_lookup: Vec<u32>,
    local_edges: Vec<u32>,
    flipped: Vec<u32>,
    /// Raw backward-canonical position of each local backward edge.
    backward: Vec<u32>,
}

/// Transfer buffers for host reads and writes.
#[derive(Debug, Default)]
struct IoScratch {
    staging: Vec<u8>,
    f32_in: Vec<f32>,
    f32_out: Vec<f32>,
}

/// Reusable vectors sized to the raw element counts on first use.
#[derive(Debug, Default)]
pub struct ScratchArena {
    index: IndexScratch,
    io: IoScratch,
    reserved: MaskSize,
}

impl ScratchArena {
    fn reserve(&mut self, raw: MaskSize) {
        if raw.point <= self.reserved.point && raw.edge <= self.reserved.edge {
            return;
        }
        let points = raw.point.max(self.reserved.point);
        let edges = raw.edge.max(self.reserved.edge);
        let index = &mut self.index;
        index.points.reserve(points);
        index.point_lookup.reserve(points);
        index.edges.reserve(edges);
        index.unsorted.reserve(edges);
        index.local_edges.reserve(edges * 2);
        index.flipped.reserve(edges * 2);
        index.backward.reserve(edges);
        let floats = (points * 2).max(edges * 4);
        self.io.f32_in.reserve(floats);
        self.io.f32_out.reserve(floats);
        self.io.staging.reserve(floats * 4);
        self.reserved = MaskSize::new(points, edges);
        debug!(points, edges, "scratch arena grown");
    }

    /// Element counts the arena has been sized for.
    pub fn reserved(&self) -> MaskSize {
        self.reserved
    }
}

fn gather_into<T: Copy>(src: &[T], indexes: &[u32], stride: usize, out: &mut Vec<T>) {
    out.clear();
    for &idx in indexes {
        let start = idx as usize * stride;
        out.extend_from_slice(&src[start..start + stride]);
    }
}

/// Reads all of `source`, gathers `indexes`, and uploads the result as `name`.
async fn reproject(
    host: &dyn BufferHost,
    source: &SharedBuffer,
    name: &str,
    indexes: &[u32],
    stride: usize,
    io: &mut IoScratch,
) -> Result<SharedBuffer> {
    io.f32_in.clear();
    io.f32_in.resize(source.byte_length() / 4, 0.0);
    read_typed(source.as_ref(), &mut io.f32_in, &mut io.staging).await?;
    gather_into(&io.f32_in, indexes, stride, &mut io.f32_out);
    create_typed(host, name, &io.f32_out, &mut io.staging).await
}

fn validate(mask: &DataframeMask, raw: MaskSize) -> Result<()> {
    if mask.universe() != raw {
        return Err(DataframeError::InvalidMask(format!(
            "mask covers {} points / {} edges, dataframe has {} / {}",
            mask.universe().point,
            mask.universe().edge,
            raw.point,
            raw.edge
        )));
    }
    for component in ComponentType::ALL {
        if let Some(&last) = mask.indexes(component).and_then(|v| v.last()) {
            if last as usize >= raw.get(component) {
                return Err(DataframeError::InvalidMask(format!(
                    "{component} index {last} out of range"
                )));
            }
        }
    }
    Ok(())
}

impl Dataframe {
    /// Rebuilds the current view for `mask`.
    ///
    /// Passing the same `Arc` as the previous call is a no-op. Host I/O
    /// failures abort the pass and leave the current view unspecified; callers
    /// retry with a fresh mask.
    pub async fn apply_mask_to_filter_in_place(
        &mut self,
        mask: Arc<DataframeMask>,
        host: &dyn BufferHost,
    ) -> Result<FilterOutcome> {
        if !self.raw.view.buffers.is_ready() {
            debug!("filter skipped, simulator buffers not loaded");
            return Ok(FilterOutcome::NotReady);
        }
        if self.last_mask.as_ref().is_some_and(|last| Arc::ptr_eq(last, &mask)) {
            return Ok(FilterOutcome::Unchanged);
        }
        let raw_n = self.raw.view.num_elements;
        validate(&mask, raw_n)?;
        let started = Instant::now();

        let Dataframe {
            raw,
            current,
            last_mask,
            scratch,
            last_point_positions,
            ..
        } = self;
        scratch.reserve(raw_n);
        let ScratchArena { index, io, .. } = scratch;
        let raw_hb = &raw.view.host_buffers;

        index.points.clear();
        index.points.extend(mask.iter(ComponentType::Point));
        index.edges.clear();
        index.edges.extend(mask.iter(ComponentType::Edge));

        index.unsorted.clear();
        index.unsorted.extend(
            index
                .edges
                .iter()
                .map(|&e| raw_hb.forwards_edges.edge_permutation_inverse[e as usize]),
        );
        index.unsorted.sort_unstable();

        index.point_lookup.clear();
        index.point_lookup.resize(raw_n.point, ABSENT);
        for (local, &global) in index.points.iter().enumerate() {
            index.point_lookup[global as usize] = local as u32;
        }

        index.local_edges.clear();
        for &u in &index.unsorted {
            let u = u as usize;
            for endpoint in [raw_hb.unsorted_edges[u * 2], raw_hb.unsorted_edges[u * 2 + 1]] {
                let local = index.point_lookup[endpoint as usize];
                if local == ABSENT {
                    return Err(DataframeError::InvalidMask(format!(
                        "edge {u} references absent point {endpoint}"
                    )));
                }
                index.local_edges.push(local);
            }
        }
        flip_pairs_into(&index.local_edges, &mut index.flipped);

        let num_points = index.points.len();
        let num_edges = index.unsorted.len();
        let mut host_buffers = current
            .as_mut()
            .map(|c| std::mem::take(&mut c.view.host_buffers))
            .unwrap_or_default();
        host_buffers.forwards_edges.rebuild(&index.local_edges, num_points)?;
        host_buffers.backwards_edges.rebuild(&index.flipped, num_points)?;
        host_buffers.unsorted_edges.clear();
        host_buffers.unsorted_edges.extend_from_slice(&index.local_edges);

        index.backward.clear();
        index.backward.extend(
            host_buffers
                .backwards_edges
                .edge_permutation_inverse
                .iter()
                .map(|&p| raw_hb.backwards_edges.edge_permutation[index.unsorted[p as usize] as usize]),
        );

        // CPU-side arrays.
        let labels = Labels {
            point: raw.view.labels.point.as_ref().map(|l| {
                index.points.iter().map(|&p| l[p as usize].clone()).collect()
            }),
            edge: raw.view.labels.edge.as_ref().map(|l| {
                index.edges.iter().map(|&e| l[e as usize].clone()).collect()
            }),
        };
        let component_indexes = |component: ComponentType| match component {
            ComponentType::Point => &index.points,
            ComponentType::Edge => &index.edges,
        };
        let raw_local = &raw.view.local_buffers;
        let mut local_buffers = LocalBuffers::default();
        for buffer in [
            LocalBuffer::PointSizes,
            LocalBuffer::PointColors,
            LocalBuffer::EdgeColors,
            LocalBuffer::EdgeHeights,
            LocalBuffer::MidEdgesColors,
        ] {
            if let Some(data) = raw_local.get(buffer) {
                let layout = buffer.layout();
                let idx = component_indexes(layout.component);
                local_buffers.set(buffer, data.gather(idx.iter().copied(), layout.stride));
            }
        }
        for (name, overlay) in &raw_local.overlays {
            let idx = component_indexes(overlay.layout.component);
            local_buffers.overlays.insert(
                name.clone(),
                LocalOverlay {
                    layout: overlay.layout,
                    data: overlay.data.gather(idx.iter().copied(), overlay.layout.stride),
                },
            );
        }

        // Simulator buffers.
        let raw_buffers = &raw.view.buffers;
        let mut view = DataView {
            num_elements: MaskSize::new(num_points, num_edges),
            labels,
            local_buffers,
            ..DataView::default()
        };

        // Every handle lands in `view` as soon as it exists, so a failed
        // upload can release what was already created.
        let uploaded: Result<()> = async {
            if let Some(raw_points) = &raw_buffers.cur_points {
                match last_point_positions {
                    None => {
                        let mut baseline = vec![0f32; raw_n.point * 2];
                        read_typed(raw_points.as_ref(), &mut baseline, &mut io.staging).await?;
                        *last_point_positions = Some(baseline);
                    }
                    Some(baseline) => {
                        let previous = current.as_ref().and_then(|c| c.view.buffers.cur_points.clone());
                        if let (Some(previous), Some(previous_mask)) = (previous, last_mask.as_ref()) {
                            io.f32_in.clear();
                            io.f32_in.resize(previous.byte_length() / 4, 0.0);
                            read_typed(previous.as_ref(), &mut io.f32_in, &mut io.staging).await?;
                            for (local, global) in previous_mask.iter(ComponentType::Point).enumerate() {
                                let g = global as usize * 2;
                                baseline[g..g + 2].copy_from_slice(&io.f32_in[local * 2..local * 2 + 2]);
                            }
                        }
                    }
                }
                if let Some(baseline) = last_point_positions.as_deref() {
                    gather_into(baseline, &index.points, 2, &mut io.f32_out);
                    let name = SimBuffer::CurPoints.name();
                    let handle = create_typed(host, name, &io.f32_out, &mut io.staging).await?;
                    view.buffers.set(SimBuffer::CurPoints, handle);
                }
            }

            for (buffer, idx) in [
                (SimBuffer::PrevForces, &index.points),
                (SimBuffer::SpringsPos, &index.edges),
                (SimBuffer::ForwardsEdgeWeights, &index.edges),
                (SimBuffer::BackwardsEdgeWeights, &index.backward),
            ] {
                if let Some(source) = raw_buffers.get(buffer) {
                    let stride = buffer.layout().stride;
                    let handle = reproject(host, source, buffer.name(), idx, stride, io).await?;
                    view.buffers.set(buffer, handle);
                }
            }

            for (name, overlay) in &raw_buffers.overlays {
                let idx = component_indexes(overlay.layout.component);
                let handle = reproject(host, &overlay.handle, name, idx, overlay.layout.stride, io).await?;
                view.buffers.overlays.insert(
                    name.clone(),
                    OverlayBuffer {
                        handle,
                        layout: overlay.layout,
                    },
                );
            }

            let forwards = &host_buffers.forwards_edges;
            let backwards = &host_buffers.backwards_edges;
            if forwards.degrees_typed.len() != num_points || backwards.degrees_typed.len() != num_points {
                return Err(DataframeError::mismatched(
                    SimBuffer::Degrees.name(),
                    num_points,
                    forwards.degrees_typed.len(),
                ));
            }
            let degrees: Vec<u32> = forwards
                .degrees_typed
                .iter()
                .zip(&backwards.degrees_typed)
                .map(|(out, inc)| out + inc)
                .collect();
            let forwards_work_items = forwards.work_items_typed();
            let forwards_start_end = forwards.edge_start_end_typed();
            let backwards_work_items = backwards.work_items_typed();
            let backwards_start_end = backwards.edge_start_end_typed();
            let staging = &mut io.staging;
            let edges: [(SimBuffer, &[u32]); 3] = [
                (SimBuffer::Degrees, &degrees),
                (SimBuffer::ForwardsEdges, &forwards.edges_typed),
                (SimBuffer::BackwardsEdges, &backwards.edges_typed),
            ];
            for (buffer, data) in edges {
                let handle = create_typed(host, buffer.name(), data, staging).await?;
                view.buffers.set(buffer, handle);
            }
            let ranges: [(SimBuffer, &[i32]); 4] = [
                (SimBuffer::ForwardsWorkItems, &forwards_work_items),
                (SimBuffer::ForwardsEdgeStartEndIdxs, &forwards_start_end),
                (SimBuffer::BackwardsWorkItems, &backwards_work_items),
                (SimBuffer::BackwardsEdgeStartEndIdxs, &backwards_start_end),
            ];
            for (buffer, data) in ranges {
                let handle = create_typed(host, buffer.name(), data, staging).await?;
                view.buffers.set(buffer, handle);
            }
            Ok(())
        }
        .await;
        if let Err(err) = uploaded {
            let orphaned = view.buffers.handles();
            if let Err(release) = try_join_all(orphaned.iter().map(|handle| handle.delete())).await {
                warn!(error = %release, "failed to release buffers of an aborted filter pass");
            }
            return Err(err);
        }
        view.host_buffers = host_buffers;

        if let Some(previous) = current.take() {
            let released = previous.view.buffers.handles();
            try_join_all(released.iter().map(|handle| handle.delete())).await?;
            debug!(released = released.len(), "released previous view buffers");
        }

        let versions = host.versions();
        for handle in view.buffers.handles() {
            versions.bump(handle.name());
        }
        versions.bump_tick();

        *current = Some(CurrentData {
            view,
            aggregations: Default::default(),
        });
        *last_mask = Some(mask);

        info!(
            points = num_points,
            edges = num_edges,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "filter applied"
        );
        Ok(FilterOutcome::Applied(MaskSize::new(num_points, num_edges)))
    }
}
