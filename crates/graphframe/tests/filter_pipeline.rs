use async_trait::async_trait;
use graphframe_core::buffers::{write_typed, BufferHost, SharedBuffer, VersionTable};
use graphframe_core::view::{BufferLayout, LocalArray, LocalBuffer};
use graphframe_core::{
    Column, ColumnValues, ComponentType, Dataframe, DataframeError, DataframeMask, FilterOutcome,
    MaskSize, MemoryBufferHost, Result, SimulatorSeed, Value, ViewKind,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// 4 points, edges loaded as (2,3), (0,1), (1,2) with weights 3, 1, 2.
async fn fixture(host: &MemoryBufferHost) -> Result<Dataframe> {
    let mut df = Dataframe::default();
    df.load_edges_and_encapsulate(vec![2, 3, 0, 1, 1, 2], 4)?;
    df.load_column(
        ComponentType::Point,
        Column::new("score", ColumnValues::Number(vec![1.0, 2.0, 3.0, 4.0])),
    )?;
    df.load_column(
        ComponentType::Edge,
        Column::new("w", ColumnValues::Number(vec![30.0, 10.0, 20.0])),
    )?;
    df.load_simulator_buffers(
        host,
        SimulatorSeed {
            points: vec![0.0, 0.0, 1.0, 10.0, 2.0, 20.0, 3.0, 30.0],
            edge_weights: Some(vec![3.0, 1.0, 2.0]),
        },
    )
    .await?;
    Ok(df)
}

fn first_three_points(df: &Dataframe) -> Arc<DataframeMask> {
    let mask = DataframeMask::new(df.num_elements(ViewKind::Raw), Some(vec![0, 1, 2]), None);
    Arc::new(df.prune_mask_edges(&mask))
}

#[tokio::test]
async fn full_mask_keeps_raw_counts() -> Result<()> {
    let host = MemoryBufferHost::new();
    let mut df = fixture(&host).await?;

    let outcome = df
        .apply_mask_to_filter_in_place(Arc::new(df.full_mask()), &host)
        .await?;
    assert_eq!(outcome, FilterOutcome::Applied(MaskSize::new(4, 3)));
    assert_eq!(df.num_elements(ViewKind::Current), df.num_elements(ViewKind::Raw));

    let raw_degrees: Vec<u32> = df.read_buffer("degrees", ViewKind::Raw).await?;
    let degrees: Vec<u32> = df.read_buffer("degrees", ViewKind::Current).await?;
    assert_eq!(raw_degrees, vec![1, 2, 2, 1]);
    assert_eq!(degrees, raw_degrees);
    Ok(())
}

#[tokio::test]
async fn same_mask_twice_is_a_no_op() -> Result<()> {
    let host = MemoryBufferHost::new();
    let mut df = fixture(&host).await?;
    let mask = first_three_points(&df);

    df.apply_mask_to_filter_in_place(Arc::clone(&mask), &host).await?;
    let tick = host.versions().tick();
    let points_version = host.versions().buffer("curPoints");

    let outcome = df.apply_mask_to_filter_in_place(mask, &host).await?;
    assert_eq!(outcome, FilterOutcome::Unchanged);
    assert_eq!(host.versions().tick(), tick);
    assert_eq!(host.versions().buffer("curPoints"), points_version);
    Ok(())
}

#[tokio::test]
async fn pruned_subset_rebuilds_local_view() -> Result<()> {
    let host = MemoryBufferHost::new();
    let mut df = fixture(&host).await?;
    let mask = first_three_points(&df);
    assert_eq!(mask.indexes(ComponentType::Edge), Some(&[0u32, 1][..]));

    let outcome = df.apply_mask_to_filter_in_place(mask, &host).await?;
    assert_eq!(outcome, FilterOutcome::Applied(MaskSize::new(3, 2)));

    let edges: Vec<u32> = df.read_buffer("forwardsEdges", ViewKind::Current).await?;
    assert_eq!(edges, vec![0, 1, 1, 2]);
    let forwards: Vec<f32> = df.read_buffer("forwardsEdgeWeights", ViewKind::Current).await?;
    assert_eq!(forwards, vec![1.0, 2.0]);
    let backwards: Vec<f32> = df.read_buffer("backwardsEdgeWeights", ViewKind::Current).await?;
    assert_eq!(backwards, vec![1.0, 2.0]);
    let degrees: Vec<u32> = df.read_buffer("degrees", ViewKind::Current).await?;
    assert_eq!(degrees, vec![1, 2, 1]);
    let points: Vec<f32> = df.read_buffer("curPoints", ViewKind::Current).await?;
    assert_eq!(points, vec![0.0, 0.0, 1.0, 10.0, 2.0, 20.0]);
    let springs: Vec<f32> = df.read_buffer("springsPos", ViewKind::Current).await?;
    assert_eq!(springs, vec![0.0, 0.0, 1.0, 10.0, 1.0, 10.0, 2.0, 20.0]);

    assert_eq!(
        df.get_column_values("w", ComponentType::Edge, ViewKind::Current)?,
        ColumnValues::Number(vec![10.0, 20.0])
    );
    assert_eq!(df.get_cell("score", ComponentType::Point, 2)?, Value::Number(3.0));
    assert!(df.get_cell("score", ComponentType::Point, 3).is_err());
    Ok(())
}

#[tokio::test]
async fn accessors_use_the_resolved_column_component() -> Result<()> {
    let host = MemoryBufferHost::new();
    let mut df = fixture(&host).await?;
    df.apply_mask_to_filter_in_place(first_three_points(&df), &host).await?;

    // Point columns keep the point mask even when asked for as edges.
    let expected = ColumnValues::Number(vec![1.0, 2.0, 3.0]);
    assert_eq!(
        df.get_column_values("point:score", ComponentType::Edge, ViewKind::Current)?,
        expected
    );
    assert_eq!(
        df.get_column_values("score", ComponentType::Edge, ViewKind::Current)?,
        expected
    );
    assert_eq!(df.get_cell("score", ComponentType::Edge, 2)?, Value::Number(3.0));
    assert_eq!(
        df.get_column_values("edge:w", ComponentType::Point, ViewKind::Current)?,
        ColumnValues::Number(vec![10.0, 20.0])
    );
    Ok(())
}

#[tokio::test]
async fn unpruned_edges_are_rejected() -> Result<()> {
    let host = MemoryBufferHost::new();
    let mut df = fixture(&host).await?;
    let mask = DataframeMask::new(df.num_elements(ViewKind::Raw), Some(vec![0, 1, 2]), None);
    let err = df
        .apply_mask_to_filter_in_place(Arc::new(mask), &host)
        .await
        .unwrap_err();
    assert!(matches!(err, DataframeError::InvalidMask(_)));
    Ok(())
}

#[tokio::test]
async fn filtering_before_buffers_load_is_not_ready() -> Result<()> {
    let host = MemoryBufferHost::new();
    let mut df = Dataframe::default();
    df.load_edges_and_encapsulate(vec![0, 1], 2)?;
    let outcome = df
        .apply_mask_to_filter_in_place(Arc::new(df.full_mask()), &host)
        .await?;
    assert_eq!(outcome, FilterOutcome::NotReady);
    assert!(df.last_mask().is_none());
    Ok(())
}

#[tokio::test]
async fn previous_view_buffers_are_released() -> Result<()> {
    let host = MemoryBufferHost::new();
    let mut df = fixture(&host).await?;
    assert_eq!(host.live_buffers(), 12);

    df.apply_mask_to_filter_in_place(first_three_points(&df), &host).await?;
    let after_first = host.live_buffers();
    assert_eq!(after_first, 12 + 12);

    for _ in 0..3 {
        df.apply_mask_to_filter_in_place(first_three_points(&df), &host).await?;
        assert_eq!(host.live_buffers(), after_first);
    }
    assert_eq!(df.scratch().reserved(), MaskSize::new(4, 3));
    Ok(())
}

#[tokio::test]
async fn positions_carry_over_between_filters() -> Result<()> {
    let host = MemoryBufferHost::new();
    let mut df = fixture(&host).await?;
    df.apply_mask_to_filter_in_place(first_three_points(&df), &host).await?;

    // The simulator moves the visible points.
    let current = df.get_buffer("curPoints", ViewKind::Current)?;
    let moved = [100.0f32, 100.0, 101.0, 101.0, 102.0, 102.0];
    write_typed(current.as_ref(), &moved, &mut Vec::new()).await?;

    df.apply_mask_to_filter_in_place(Arc::new(df.full_mask()), &host).await?;
    let points: Vec<f32> = df.read_buffer("curPoints", ViewKind::Current).await?;
    assert_eq!(points, vec![100.0, 100.0, 101.0, 101.0, 102.0, 102.0, 3.0, 30.0]);
    Ok(())
}

#[tokio::test]
async fn versions_advance_per_pass() -> Result<()> {
    let host = MemoryBufferHost::new();
    let mut df = fixture(&host).await?;
    let loaded_tick = host.versions().tick();
    assert_eq!(host.versions().buffer("degrees"), 1);

    df.apply_mask_to_filter_in_place(first_three_points(&df), &host).await?;
    assert_eq!(host.versions().buffer("degrees"), 2);
    assert_eq!(host.versions().tick(), loaded_tick + 1);
    Ok(())
}

#[tokio::test]
async fn host_failures_propagate() -> Result<()> {
    let host = MemoryBufferHost::new();
    let mut df = fixture(&host).await?;
    host.set_failing(true);
    let err = df
        .apply_mask_to_filter_in_place(first_three_points(&df), &host)
        .await
        .unwrap_err();
    assert!(matches!(err, DataframeError::BufferIo(_)));
    Ok(())
}

#[tokio::test]
async fn unknown_buffers_are_invalid_references() -> Result<()> {
    let host = MemoryBufferHost::new();
    let df = fixture(&host).await?;
    let err = df.get_buffer("nope", ViewKind::Raw).unwrap_err();
    assert!(matches!(err, DataframeError::InvalidReference { kind: "buffer", .. }));
    Ok(())
}

/// Memory host that refuses allocations once its budget is spent.
struct BudgetHost {
    inner: MemoryBufferHost,
    remaining: AtomicUsize,
}

impl BudgetHost {
    fn new() -> Self {
        Self {
            inner: MemoryBufferHost::new(),
            remaining: AtomicUsize::new(usize::MAX),
        }
    }

    fn set_budget(&self, buffers: usize) {
        self.remaining.store(buffers, Ordering::SeqCst);
    }
}

#[async_trait]
impl BufferHost for BudgetHost {
    async fn create_buffer(&self, byte_length: usize, name: &str) -> Result<SharedBuffer> {
        let spent = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if spent.is_err() {
            return Err(DataframeError::BufferIo(format!("no room for {name}")));
        }
        self.inner.create_buffer(byte_length, name).await
    }

    fn versions(&self) -> &VersionTable {
        self.inner.versions()
    }
}

#[tokio::test]
async fn aborted_pass_releases_new_buffers() -> Result<()> {
    let host = BudgetHost::new();
    let mut df = fixture(&host.inner).await?;
    assert_eq!(host.inner.live_buffers(), 12);

    for budget in 0..12 {
        host.set_budget(budget);
        let err = df
            .apply_mask_to_filter_in_place(first_three_points(&df), &host)
            .await
            .unwrap_err();
        assert!(matches!(err, DataframeError::BufferIo(_)), "budget {budget}: {err}");
        assert_eq!(host.inner.live_buffers(), 12, "budget {budget}");
    }
    assert!(df.last_mask().is_none());

    host.set_budget(usize::MAX);
    let outcome = df
        .apply_mask_to_filter_in_place(first_three_points(&df), &host)
        .await?;
    assert_eq!(outcome, FilterOutcome::Applied(MaskSize::new(3, 2)));
    assert_eq!(host.inner.live_buffers(), 24);
    Ok(())
}

#[tokio::test]
async fn render_arrays_and_overlays_follow_the_mask() -> Result<()> {
    let host = MemoryBufferHost::new();
    let mut df = fixture(&host).await?;
    let point = |stride| BufferLayout::new(ComponentType::Point, stride);
    let edge = |stride| BufferLayout::new(ComponentType::Edge, stride);

    // Canonical edges: (0,1), (1,2), (2,3). Labels arrive in load order.
    df.load_labels(ComponentType::Point, vec!["p0".into(), "p1".into(), "p2".into(), "p3".into()])?;
    df.load_labels(ComponentType::Edge, vec!["c".into(), "a".into(), "b".into()])?;
    df.load_local_buffer(LocalBuffer::PointSizes, LocalArray::U8(vec![1, 2, 3, 4]))?;
    df.load_local_buffer(LocalBuffer::EdgeHeights, LocalArray::F32(vec![10.0, 20.0, 30.0]))?;
    df.load_local_buffer(LocalBuffer::EdgeColors, LocalArray::U32(vec![1, 1, 2, 2, 3, 3]))?;
    df.load_local_overlay("halo", point(1), LocalArray::F32(vec![7.0, 8.0, 9.0, 10.0]))?;
    df.register_overlay(&host, "edgeGlow", edge(1), &[100.0, 200.0, 300.0]).await?;
    assert!(df
        .load_local_buffer(LocalBuffer::PointSizes, LocalArray::U8(vec![1, 2]))
        .is_err());
    assert!(df
        .register_overlay(&host, "degrees", point(1), &[0.0; 4])
        .await
        .is_err());

    let mask = DataframeMask::new(df.num_elements(ViewKind::Raw), Some(vec![1, 2, 3]), None);
    let mask = Arc::new(df.prune_mask_edges(&mask));
    df.apply_mask_to_filter_in_place(mask, &host).await?;

    let view = df.view(ViewKind::Current);
    assert_eq!(view.labels.of(ComponentType::Point), Some(&["p1".to_string(), "p2".into(), "p3".into()][..]));
    assert_eq!(view.labels.of(ComponentType::Edge), Some(&["b".to_string(), "c".into()][..]));
    let local = &view.local_buffers;
    assert_eq!(local.get(LocalBuffer::PointSizes), Some(&LocalArray::U8(vec![2, 3, 4])));
    assert_eq!(local.get(LocalBuffer::EdgeHeights), Some(&LocalArray::F32(vec![20.0, 30.0])));
    assert_eq!(local.get(LocalBuffer::EdgeColors), Some(&LocalArray::U32(vec![2, 2, 3, 3])));
    assert_eq!(local.get(LocalBuffer::PointColors), None);
    assert_eq!(local.overlays["halo"].data, LocalArray::F32(vec![8.0, 9.0, 10.0]));

    let glow: Vec<f32> = df.read_buffer("edgeGlow", ViewKind::Current).await?;
    assert_eq!(glow, vec![200.0, 300.0]);
    let raw_glow: Vec<f32> = df.read_buffer("edgeGlow", ViewKind::Raw).await?;
    assert_eq!(raw_glow, vec![100.0, 200.0, 300.0]);
    Ok(())
}
