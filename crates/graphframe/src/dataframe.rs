//! The dataframe: raw columns and buffers, the current filtered view, and the
//! read paths (column values, rows, aggregates) that honor the last mask.

use crate::aggregation::{AggregationCache, Aggregator, ColumnSummary};
use crate::binning::{count_by, histogram, time_histogram, Binning, CountBy, Histogram, TimeGranularity, TimeHistogram};
use crate::buffers::{create_typed, read_typed, BufferElement, BufferHost, SharedBuffer};
use crate::column::{Column, ColumnKey};
use crate::config::DataframeConfig;
use crate::encapsulate::encapsulate_both;
use crate::error::{DataframeError, Result};
use crate::filter::ScratchArena;
use crate::mask::{DataframeMask, MaskJson, MaskSize};
use crate::types::{ColumnValues, ComponentType, DataType, Value};
use crate::view::{
    BufferLayout, CurrentData, DataView, LocalArray, LocalBuffer, LocalOverlay, NumElements,
    OverlayBuffer, RawData, SimBuffer,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

/// Which view a read targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewKind {
    Raw,
    #[default]
    Current,
}

/// Initial simulator state for [`Dataframe::load_simulator_buffers`].
#[derive(Debug, Clone, Default)]
pub struct SimulatorSeed {
    /// `x, y` per point.
    pub points: Vec<f32>,
    /// One weight per edge in load order; defaults to `1.0`.
    pub edge_weights: Option<Vec<f32>>,
}

/// A row projection keyed by column name, plus `_index` (global index).
pub type Row = BTreeMap<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompactRows {
    pub header: Vec<String>,
    pub values: Vec<Vec<Value>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AggregateMode {
    Histogram,
    CountBy,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum AggregateResult {
    #[serde(rename = "histogram")]
    Histogram(Histogram),
    #[serde(rename = "countBy")]
    CountBy(CountBy),
    #[serde(rename = "nodata")]
    NoData,
}

pub struct Dataframe {
    config: DataframeConfig,
    pub(crate) raw: RawData,
    pub(crate) current: Option<CurrentData>,
    pub(crate) last_mask: Option<Arc<DataframeMask>>,
    pub(crate) scratch: ScratchArena,
    /// Last known `x, y` per raw point, carried across filter passes.
    pub(crate) last_point_positions: Option<Vec<f32>>,
    edges_loaded: bool,
}

impl Default for Dataframe {
    fn default() -> Self {
        Self::new(DataframeConfig::default())
    }
}

impl Dataframe {
    pub fn new(config: DataframeConfig) -> Self {
        Self {
            config,
            raw: RawData::default(),
            current: None,
            last_mask: None,
            scratch: ScratchArena::default(),
            last_point_positions: None,
            edges_loaded: false,
        }
    }

    pub fn config(&self) -> &DataframeConfig {
        &self.config
    }

    pub fn raw(&self) -> &RawData {
        &self.raw
    }

    pub fn view(&self, which: ViewKind) -> &DataView {
        match (which, &self.current) {
            (ViewKind::Current, Some(current)) => &current.view,
            _ => &self.raw.view,
        }
    }

    pub fn num_elements(&self, which: ViewKind) -> NumElements {
        self.view(which).num_elements
    }

    pub fn last_mask(&self) -> Option<&Arc<DataframeMask>> {
        self.last_mask.as_ref()
    }

    pub fn scratch(&self) -> &ScratchArena {
        &self.scratch
    }

    // ---- ingestion ----

    fn check_component_len(&self, component: ComponentType, what: &str, actual: usize) -> Result<()> {
        let expected = self.raw.view.num_elements.get(component);
        let established = expected > 0
            || !self.raw.attributes.of(component).is_empty()
            || (component == ComponentType::Edge && self.edges_loaded);
        if established && expected != actual {
            return Err(DataframeError::mismatched(what, expected, actual));
        }
        Ok(())
    }

    fn set_count_if_unset(&mut self, component: ComponentType, count: usize) {
        let slot = match component {
            ComponentType::Point => &mut self.raw.view.num_elements.point,
            ComponentType::Edge => &mut self.raw.view.num_elements.edge,
        };
        if *slot == 0 {
            *slot = count;
        }
    }

    /// Permutes load-order edge values into canonical order.
    fn to_canonical(&self, values: &ColumnValues) -> ColumnValues {
        values.gather(&self.raw.view.host_buffers.forwards_edges.edge_permutation_inverse)
    }

    /// Adds a raw column. Edge values are given in load order.
    pub fn load_column(&mut self, component: ComponentType, mut column: Column) -> Result<()> {
        self.check_component_len(component, &format!("column {}", column.key), column.len())?;
        if component == ComponentType::Edge && self.edges_loaded {
            column.values = self.to_canonical(&column.values);
        }
        self.set_count_if_unset(component, column.len());
        debug!(component = %component, key = %column.key, len = column.len(), "loaded column");
        self.raw.attributes.of_mut(component).insert(column);
        Ok(())
    }

    /// Labels per element. Edge labels are given in load order.
    pub fn load_labels(&mut self, component: ComponentType, labels: Vec<String>) -> Result<()> {
        self.check_component_len(component, &format!("{component} labels"), labels.len())?;
        self.set_count_if_unset(component, labels.len());
        let labels = match component {
            ComponentType::Edge if self.edges_loaded => {
                let inverse = &self.raw.view.host_buffers.forwards_edges.edge_permutation_inverse;
                inverse.iter().map(|&i| labels[i as usize].clone()).collect()
            }
            _ => labels,
        };
        match component {
            ComponentType::Point => self.raw.view.labels.point = Some(labels),
            ComponentType::Edge => self.raw.view.labels.edge = Some(labels),
        }
        Ok(())
    }

    /// Stores the unsorted edge list and canonicalizes it in both directions.
    /// Edge columns and labels loaded earlier are reordered to canonical order.
    pub fn load_edges_and_encapsulate(&mut self, edges: Vec<u32>, num_points: usize) -> Result<()> {
        if self.edges_loaded {
            return Err(DataframeError::InvalidArgument(
                "edges are already loaded".to_string(),
            ));
        }
        let num_edges = edges.len() / 2;
        self.check_component_len(ComponentType::Point, "point count", num_points)?;
        self.check_component_len(ComponentType::Edge, "edge count", num_edges)?;

        let (forwards, backwards) = encapsulate_both(&edges, num_points)?;
        let host = &mut self.raw.view.host_buffers;
        host.forwards_edges = forwards;
        host.backwards_edges = backwards;
        host.unsorted_edges = edges;
        self.raw.view.num_elements = MaskSize::new(num_points, num_edges);
        self.edges_loaded = true;

        let inverse = self.raw.view.host_buffers.forwards_edges.edge_permutation_inverse.clone();
        for column in self.raw.attributes.edge.iter_mut() {
            column.values = column.values.gather(&inverse);
            column.aggregations.reset();
        }
        if let Some(labels) = self.raw.view.labels.edge.take() {
            self.raw.view.labels.edge =
                Some(inverse.iter().map(|&i| labels[i as usize].clone()).collect());
        }
        info!(num_points, num_edges, "encapsulated edges");
        Ok(())
    }

    fn require_edges(&self) -> Result<()> {
        if self.edges_loaded {
            Ok(())
        } else {
            Err(DataframeError::unknown_buffer(SimBuffer::ForwardsEdges.name()))
        }
    }

    /// Uploads the raw simulator buffers. Replaces (and deletes) any loaded before.
    pub async fn load_simulator_buffers(&mut self, host: &dyn BufferHost, seed: SimulatorSeed) -> Result<()> {
        self.require_edges()?;
        let n = self.raw.view.num_elements;
        if seed.points.len() != n.point * 2 {
            return Err(DataframeError::mismatched("curPoints", n.point * 2, seed.points.len()));
        }
        let weights = seed.edge_weights.unwrap_or_else(|| vec![1.0; n.edge]);
        if weights.len() != n.edge {
            return Err(DataframeError::mismatched("edge weights", n.edge, weights.len()));
        }

        let hb = &self.raw.view.host_buffers;
        let forwards_weights: Vec<f32> = hb
            .forwards_edges
            .edge_permutation_inverse
            .iter()
            .map(|&i| weights[i as usize])
            .collect();
        let backwards_weights: Vec<f32> = hb
            .backwards_edges
            .edge_permutation_inverse
            .iter()
            .map(|&i| weights[i as usize])
            .collect();
        let springs: Vec<f32> = hb
            .forwards_edges
            .edges_typed
            .chunks_exact(2)
            .flat_map(|pair| {
                let (s, d) = (pair[0] as usize, pair[1] as usize);
                [seed.points[s * 2], seed.points[s * 2 + 1], seed.points[d * 2], seed.points[d * 2 + 1]]
            })
            .collect();
        let degrees: Vec<u32> = hb
            .forwards_edges
            .degrees_typed
            .iter()
            .zip(&hb.backwards_edges.degrees_typed)
            .map(|(out, inc)| out + inc)
            .collect();

        let mut staging = Vec::new();
        let mut created: Vec<(SimBuffer, SharedBuffer)> = Vec::with_capacity(SimBuffer::ALL.len());
        for buffer in SimBuffer::ALL {
            let name = buffer.name();
            let handle = match buffer {
                SimBuffer::CurPoints => create_typed(host, name, &seed.points, &mut staging).await?,
                SimBuffer::PrevForces => {
                    create_typed(host, name, &vec![0f32; n.point * 2], &mut staging).await?
                }
                SimBuffer::Degrees => create_typed(host, name, &degrees, &mut staging).await?,
                SimBuffer::SpringsPos => create_typed(host, name, &springs, &mut staging).await?,
                SimBuffer::ForwardsEdges => {
                    create_typed(host, name, &hb.forwards_edges.edges_typed, &mut staging).await?
                }
                SimBuffer::ForwardsWorkItems => {
                    create_typed(host, name, &hb.forwards_edges.work_items_typed(), &mut staging).await?
                }
                SimBuffer::ForwardsEdgeStartEndIdxs => {
                    create_typed(host, name, &hb.forwards_edges.edge_start_end_typed(), &mut staging)
                        .await?
                }
                SimBuffer::ForwardsEdgeWeights => {
                    create_typed(host, name, &forwards_weights, &mut staging).await?
                }
                SimBuffer::BackwardsEdges => {
                    create_typed(host, name, &hb.backwards_edges.edges_typed, &mut staging).await?
                }
                SimBuffer::BackwardsWorkItems => {
                    create_typed(host, name, &hb.backwards_edges.work_items_typed(), &mut staging)
                        .await?
                }
                SimBuffer::BackwardsEdgeStartEndIdxs => {
                    create_typed(host, name, &hb.backwards_edges.edge_start_end_typed(), &mut staging)
                        .await?
                }
                SimBuffer::BackwardsEdgeWeights => {
                    create_typed(host, name, &backwards_weights, &mut staging).await?
                }
            };
            created.push((buffer, handle));
        }

        for (buffer, handle) in created {
            if let Some(old) = self.raw.view.buffers.set(buffer, handle) {
                old.delete().await?;
            }
            host.versions().bump(buffer.name());
        }
        host.versions().bump_tick();
        info!(points = n.point, edges = n.edge, "simulator buffers loaded");
        Ok(())
    }

    /// Registers a user-defined `f32` simulator buffer. Edge layouts are in canonical order.
    pub async fn register_overlay(
        &mut self,
        host: &dyn BufferHost,
        name: &str,
        layout: BufferLayout,
        data: &[f32],
    ) -> Result<()> {
        if SimBuffer::parse(name).is_some() {
            return Err(DataframeError::InvalidArgument(format!(
                "{name} is a well-known simulator buffer"
            )));
        }
        self.raw.view.check_len(name, layout, data.len())?;
        let mut staging = Vec::new();
        let handle = create_typed(host, name, data, &mut staging).await?;
        let previous = self
            .raw
            .view
            .buffers
            .overlays
            .insert(name.to_string(), OverlayBuffer { handle, layout });
        if let Some(previous) = previous {
            previous.handle.delete().await?;
        }
        host.versions().bump(name);
        Ok(())
    }

    /// Sets a CPU-side render array. Edge arrays are in canonical order.
    pub fn load_local_buffer(&mut self, buffer: LocalBuffer, data: LocalArray) -> Result<()> {
        self.raw.view.check_len(buffer.name(), buffer.layout(), data.len())?;
        self.raw.view.local_buffers.set(buffer, data);
        Ok(())
    }

    pub fn load_local_overlay(&mut self, name: &str, layout: BufferLayout, data: LocalArray) -> Result<()> {
        self.raw.view.check_len(name, layout, data.len())?;
        self.raw
            .view
            .local_buffers
            .overlays
            .insert(name.to_string(), LocalOverlay { layout, data });
        Ok(())
    }

    // ---- synthetic columns ----

    /// Adds point columns `degree`, `degree_in` and `degree_out`.
    pub fn load_degrees(&mut self) -> Result<()> {
        self.require_edges()?;
        let hb = &self.raw.view.host_buffers;
        let out: Vec<i32> = hb.forwards_edges.degrees_typed.iter().map(|&d| d as i32).collect();
        let inc: Vec<i32> = hb.backwards_edges.degrees_typed.iter().map(|&d| d as i32).collect();
        let total: Vec<i32> = out.iter().zip(&inc).map(|(o, i)| o + i).collect();
        self.load_column(ComponentType::Point, Column::new("degree", ColumnValues::Integer(total)))?;
        self.load_column(ComponentType::Point, Column::new("degree_in", ColumnValues::Integer(inc)))?;
        self.load_column(ComponentType::Point, Column::new("degree_out", ColumnValues::Integer(out)))
    }

    /// Adds edge columns `Source` and `Destination`: point labels when loaded,
    /// point ids otherwise.
    pub fn load_edge_destinations(&mut self) -> Result<()> {
        self.require_edges()?;
        let edges = &self.raw.view.host_buffers.forwards_edges.edges_typed;
        let side = |offset: usize| -> ColumnValues {
            let ids = edges.iter().skip(offset).step_by(2);
            match &self.raw.view.labels.point {
                Some(labels) => ColumnValues::String(ids.map(|&p| labels[p as usize].clone()).collect()),
                None => ColumnValues::Integer(ids.map(|&p| p as i32).collect()),
            }
        };
        let (source, destination) = (side(0), side(1));
        // Already canonical, so insert directly instead of through load_column.
        let attrs = &mut self.raw.attributes.edge;
        attrs.insert(Column::new("Source", source));
        attrs.insert(Column::new("Destination", destination));
        Ok(())
    }

    // ---- columns and cells ----

    pub fn resolve(&self, name: &str, component: Option<ComponentType>) -> Result<ColumnKey> {
        self.raw
            .attributes
            .resolve(name, component)
            .ok_or_else(|| DataframeError::unknown_column(name))
    }

    pub fn has_column(&self, name: &str, component: Option<ComponentType>) -> bool {
        self.raw.attributes.resolve(name, component).is_some()
    }

    pub fn get_column(&self, name: &str, component: Option<ComponentType>) -> Result<&Column> {
        let key = self.resolve(name, component)?;
        self.raw.attributes.column(&key)
    }

    /// Public column names of `component`, in load order.
    pub fn column_names_by_type(&self, component: ComponentType) -> Vec<String> {
        self.raw
            .attributes
            .of(component)
            .public_columns()
            .map(|c| c.name.clone())
            .collect()
    }

    /// Column values for `which` view: raw values, or the last mask's gather.
    pub fn get_column_values(
        &self,
        name: &str,
        component: ComponentType,
        which: ViewKind,
    ) -> Result<ColumnValues> {
        let key = self.resolve(name, Some(component))?;
        let column = self.raw.attributes.column(&key)?;
        match (which, self.current_indexes(key.component)) {
            (ViewKind::Current, Some(indexes)) => Ok(column.values.gather(indexes)),
            _ => Ok(column.values.clone()),
        }
    }

    /// Cell at a local index of the current view.
    pub fn get_cell(&self, name: &str, component: ComponentType, local: usize) -> Result<Value> {
        let key = self.resolve(name, Some(component))?;
        let column = self.raw.attributes.column(&key)?;
        let global = self.global_index(key.component, local)?;
        Ok(column.values.value_at(global as usize))
    }

    /// Explicit indexes the current view keeps, `None` when it keeps all.
    pub(crate) fn current_indexes(&self, component: ComponentType) -> Option<&[u32]> {
        self.last_mask.as_deref().and_then(|m| m.indexes(component))
    }

    /// Translates a current-view index to a raw index.
    pub fn global_index(&self, component: ComponentType, local: usize) -> Result<u32> {
        let translated = match &self.last_mask {
            Some(mask) => mask.get_index_by_type(component, local),
            None if local < self.raw.view.num_elements.get(component) => Some(local as u32),
            None => None,
        };
        translated.ok_or_else(|| DataframeError::InvalidReference {
            kind: "index",
            name: format!("{component}:{local}"),
        })
    }

    // ---- rows ----

    fn row_from(&self, component: ComponentType, global: u32) -> Row {
        let mut row: Row = self
            .raw
            .attributes
            .of(component)
            .public_columns()
            .map(|c| (c.name.clone(), c.values.value_at(global as usize)))
            .collect();
        row.insert("_index".to_string(), Value::Integer(global as i64));
        row
    }

    /// Row at a local index of the current view.
    pub fn get_row_at(&self, local: usize, component: ComponentType) -> Result<Row> {
        let global = self.global_index(component, local)?;
        Ok(self.row_from(component, global))
    }

    fn row_indexes(&self, indexes: Option<&[u32]>, component: ComponentType) -> Result<Vec<u32>> {
        let total = self.raw.view.num_elements.get(component);
        let indexes: Vec<u32> = match (indexes, self.current_indexes(component)) {
            (Some(explicit), _) => explicit.to_vec(),
            (None, Some(current)) => current.to_vec(),
            (None, None) => (0..total as u32).collect(),
        };
        if let Some(&bad) = indexes.iter().find(|&&i| i as usize >= total) {
            return Err(DataframeError::InvalidReference {
                kind: "index",
                name: format!("{component}:{bad}"),
            });
        }
        Ok(indexes)
    }

    /// Rows at global `indexes`, or every row of the current view.
    pub fn get_rows(&self, indexes: Option<&[u32]>, component: ComponentType) -> Result<Vec<Row>> {
        Ok(self
            .row_indexes(indexes, component)?
            .into_iter()
            .map(|i| self.row_from(component, i))
            .collect())
    }

    pub fn get_rows_compact(&self, indexes: Option<&[u32]>, component: ComponentType) -> Result<CompactRows> {
        let columns: Vec<&Column> = self.raw.attributes.of(component).public_columns().collect();
        let values = self
            .row_indexes(indexes, component)?
            .into_iter()
            .map(|i| columns.iter().map(|c| c.values.value_at(i as usize)).collect())
            .collect();
        Ok(CompactRows {
            header: columns.iter().map(|c| c.name.clone()).collect(),
            values,
        })
    }

    // ---- masks ----

    pub fn full_mask(&self) -> DataframeMask {
        DataframeMask::full(self.raw.view.num_elements)
    }

    pub fn empty_mask(&self) -> DataframeMask {
        DataframeMask::empty(self.raw.view.num_elements)
    }

    pub fn mask_to_json(&self, mask: &DataframeMask) -> MaskJson {
        mask.to_json(self.config.mask_json_threshold)
    }

    /// Drops edges whose source or destination is not among the mask's points.
    pub fn prune_mask_edges(&self, mask: &DataframeMask) -> DataframeMask {
        let Some(points) = mask.indexes(ComponentType::Point) else {
            return mask.clone();
        };
        let mut present = vec![false; self.raw.view.num_elements.point];
        for &p in points {
            if let Some(slot) = present.get_mut(p as usize) {
                *slot = true;
            }
        }
        let forwards = &self.raw.view.host_buffers.forwards_edges;
        let kept = mask
            .iter(ComponentType::Edge)
            .filter(|&e| match forwards.edge(e as usize) {
                Some((src, dst)) => present[src as usize] && present[dst as usize],
                None => false,
            })
            .collect();
        mask.with_edges(Some(kept))
    }

    // ---- aggregation ----

    /// Runs `f` over the current view of `key`, with that view's cache.
    fn with_current_aggregator<T>(
        &mut self,
        key: &ColumnKey,
        f: impl FnOnce(&mut Aggregator<'_>) -> T,
    ) -> Result<T> {
        let limit = self.config.distinct_limit;
        match (&mut self.current, &self.last_mask) {
            (Some(current), Some(mask)) => {
                let column = self.raw.attributes.column(key)?;
                let cache = current.aggregations.entry(key.clone()).or_default();
                let mut agg = Aggregator::new(&column.values, mask.indexes(key.component), cache, limit);
                Ok(f(&mut agg))
            }
            _ => {
                let column = self.raw.attributes.column_mut(key)?;
                Ok(f(&mut column.aggregations(limit)))
            }
        }
    }

    /// Statistics of a column over `which` view.
    pub fn column_summary(&mut self, name: &str, component: ComponentType, which: ViewKind) -> Result<ColumnSummary> {
        let key = self.resolve(name, Some(component))?;
        match which {
            ViewKind::Current => self.with_current_aggregator(&key, |agg| agg.summary()),
            ViewKind::Raw => {
                let limit = self.config.distinct_limit;
                let column = self.raw.attributes.column_mut(&key)?;
                Ok(column.aggregations(limit).summary())
            }
        }
    }

    /// Drops every cached statistic, raw and current.
    pub fn reset_aggregations(&mut self) {
        for component in ComponentType::ALL {
            for column in self.raw.attributes.of_mut(component).iter_mut() {
                column.aggregations.reset();
            }
        }
        if let Some(current) = &mut self.current {
            current.aggregations.clear();
        }
    }

    /// Histogram or countBy per attribute over global `indexes` (the current
    /// view when `None`). Bins come from `hints` or the current view's binning,
    /// so subsets line up with the full view. Yields between columns.
    pub async fn aggregate(
        &mut self,
        indexes: Option<&[u32]>,
        attributes: &[String],
        hints: &HashMap<String, Binning>,
        mode: Option<AggregateMode>,
        component: ComponentType,
    ) -> Result<BTreeMap<String, AggregateResult>> {
        let mut results = BTreeMap::new();
        for name in attributes {
            let key = self.resolve(name, Some(component))?;
            let (categorical, numeric, data_type) = self.with_current_aggregator(&key, |agg| {
                (agg.is_categorical(), agg.is_numeric(), agg.data_type())
            })?;
            let mode = mode.unwrap_or(if categorical || !numeric {
                AggregateMode::CountBy
            } else {
                AggregateMode::Histogram
            });
            let binning = match (mode, hints.get(name)) {
                (AggregateMode::Histogram, Some(hint)) => {
                    hint.validate()?;
                    Some(hint.clone())
                }
                (AggregateMode::Histogram, None) => {
                    Some(self.with_current_aggregator(&key, |agg| agg.binning())?)
                }
                (AggregateMode::CountBy, _) => None,
            };

            let positions = self.row_indexes(indexes, key.component)?;
            let column = self.raw.attributes.column(&key)?;
            let values = &column.values;
            let defined = positions.iter().any(|&i| values.is_defined(i as usize));
            let result = if !defined {
                AggregateResult::NoData
            } else if let Some(binning) = binning {
                let iter = positions.iter().map(|&i| i as usize);
                AggregateResult::Histogram(histogram(values, iter, &binning, data_type))
            } else {
                let iter = positions.iter().map(|&i| i as usize);
                let max_bins = self.config.max_histogram_bins;
                AggregateResult::CountBy(count_by(values, iter, max_bins, data_type))
            };
            debug!(attribute = %name, positions = positions.len(), "aggregated");
            results.insert(name.clone(), result);
            tokio::task::yield_now().await;
        }
        Ok(results)
    }

    /// Calendar-bucketed counts of a date or numeric (ms) column over global
    /// `indexes`, or the current view.
    pub fn time_histogram(
        &self,
        name: &str,
        component: ComponentType,
        indexes: Option<&[u32]>,
        start_ms: i64,
        stop_ms: i64,
        granularity: TimeGranularity,
    ) -> Result<TimeHistogram> {
        let key = self.resolve(name, Some(component))?;
        let column = self.raw.attributes.column(&key)?;
        let positions = self.row_indexes(indexes, key.component)?;
        time_histogram(
            &column.values,
            positions.iter().map(|&i| i as usize),
            start_ms,
            stop_ms,
            granularity,
        )
    }

    /// Statistics over an explicit global index set, outside any view cache.
    pub fn summarize_indexes(&self, name: &str, component: ComponentType, indexes: &[u32]) -> Result<ColumnSummary> {
        let column = self.get_column(name, Some(component))?;
        let mut cache = AggregationCache::default();
        let mut agg = Aggregator::new(&column.values, Some(indexes), &mut cache, self.config.distinct_limit);
        Ok(agg.summary())
    }

    // ---- buffers ----

    /// Looks up a simulator buffer (well-known or overlay) by name.
    pub fn get_buffer(&self, name: &str, which: ViewKind) -> Result<SharedBuffer> {
        let buffers = &self.view(which).buffers;
        let handle = match SimBuffer::parse(name) {
            Some(buffer) => buffers.get(buffer).cloned(),
            None => buffers.overlays.get(name).map(|o| o.handle.clone()),
        };
        handle.ok_or_else(|| DataframeError::unknown_buffer(name))
    }

    /// Reads a whole simulator buffer back from the host.
    pub async fn read_buffer<T: BufferElement>(&self, name: &str, which: ViewKind) -> Result<Vec<T>> {
        let handle = self.get_buffer(name, which)?;
        let mut out = vec![T::default(); handle.byte_length() / T::BYTES];
        let mut staging = Vec::new();
        read_typed(handle.as_ref(), &mut out, &mut staging).await?;
        Ok(out)
    }

    pub fn data_type_of(&self, name: &str, component: ComponentType) -> Result<DataType> {
        Ok(self.get_column(name, Some(component))?.data_type())
    }
}
