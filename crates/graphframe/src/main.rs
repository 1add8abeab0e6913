use anyhow::{bail, Context, Result};
use graphframe_core::ingest::{extract_graph, load_graph, CsvTableExtractor};
use graphframe_core::serialize::RowFormat;
use graphframe_core::{ComponentType, Dataframe, DataframeConfig, MemoryBufferHost, SimulatorSeed};
use std::collections::HashMap;
use std::env;
use std::f32::consts::TAU;
use std::fs;
use tracing::info;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: graphframe <points.csv> <edges.csv> [attribute...]";

/// Points evenly spaced on the unit circle.
fn circle_layout(n: usize) -> Vec<f32> {
    (0..n)
        .flat_map(|i| {
            let angle = TAU * i as f32 / n.max(1) as f32;
            [angle.cos(), angle.sin()]
        })
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let [points_path, edges_path, attributes @ ..] = args.as_slice() else {
        bail!(USAGE);
    };

    let config = DataframeConfig::from_env();
    info!(base_dir = %config.base_dir.display(), "starting graphframe");

    let extractor = CsvTableExtractor::new();
    let points = extractor.extract(
        &fs::read_to_string(points_path).with_context(|| format!("failed to read {points_path}"))?,
    )?;
    let edges = extractor.extract(
        &fs::read_to_string(edges_path).with_context(|| format!("failed to read {edges_path}"))?,
    )?;
    let graph = extract_graph(&points, &edges, "source", "destination")?;
    let weights = graph.edge_weights("weight");
    let num_points = graph.num_points();

    let mut df = Dataframe::new(config);
    load_graph(&mut df, graph)?;

    let host = MemoryBufferHost::new();
    df.load_simulator_buffers(
        &host,
        SimulatorSeed {
            points: circle_layout(num_points),
            edge_weights: weights,
        },
    )
    .await?;

    let attributes: Vec<String> = if attributes.is_empty() {
        df.column_names_by_type(ComponentType::Point)
    } else {
        attributes.to_vec()
    };
    let aggregates = df
        .aggregate(None, &attributes, &HashMap::new(), None, ComponentType::Point)
        .await?;
    println!("{}", serde_json::to_string_pretty(&aggregates)?);

    let rows = df.serialize_rows("rows", RowFormat::Compact)?;
    let columns = df.serialize_columns("columns")?;
    info!(rows = %rows.display(), columns = %columns.display(), "wrote documents");
    Ok(())
}
