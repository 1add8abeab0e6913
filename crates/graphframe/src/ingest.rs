//! CSV extraction of point and edge tables.
//!
//! The first column of the points table is the point id (used as its label).
//! Edge endpoints are looked up by id through the source/destination columns.
//! Every other column becomes an attribute with an inferred type.

use crate::column::Column;
use crate::dataframe::Dataframe;
use crate::types::{is_undefined_string, ColumnValues, ComponentType, UNDEFINED_NUMBER_SENTINEL};
use anyhow::{anyhow, bail, Context, Result};
use chrono::DateTime;
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h.eq_ignore_ascii_case(name))
    }

    fn cells(&self, index: usize) -> Vec<String> {
        self.rows
            .iter()
            .map(|row| row.get(index).cloned().unwrap_or_default())
            .collect()
    }
}

pub struct CsvTableExtractor {
    pub delimiter: u8,
}

impl Default for CsvTableExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl CsvTableExtractor {
    pub fn new() -> Self {
        Self { delimiter: b',' }
    }

    pub fn extract(&self, content: &str) -> Result<Table> {
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .flexible(true)
            .from_reader(content.as_bytes());

        let headers = rdr
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        let mut rows = Vec::new();
        for result in rdr.records() {
            let record = result?;
            if record.iter().all(|cell| cell.trim().is_empty()) {
                continue;
            }
            rows.push(record.iter().map(|cell| cell.trim().to_string()).collect());
        }
        Ok(Table { headers, rows })
    }
}

/// Picks the narrowest type every defined cell fits: integer, number, date
/// (RFC 3339), else string.
pub fn infer_column(name: &str, cells: Vec<String>) -> Column {
    let defined = || cells.iter().filter(|c| !is_undefined_string(c));
    let values = if defined().all(|c| c.parse::<i32>().is_ok_and(|i| i != UNDEFINED_NUMBER_SENTINEL)) {
        ColumnValues::Integer(
            cells
                .iter()
                .map(|c| c.parse().unwrap_or(UNDEFINED_NUMBER_SENTINEL))
                .collect(),
        )
    } else if defined().all(|c| c.parse::<f64>().is_ok()) {
        ColumnValues::Number(cells.iter().map(|c| c.parse().unwrap_or(f64::NAN)).collect())
    } else if defined().all(|c| DateTime::parse_from_rfc3339(c).is_ok()) {
        ColumnValues::Date(
            cells
                .iter()
                .map(|c| DateTime::parse_from_rfc3339(c).ok().map(|d| d.timestamp_millis()))
                .collect(),
        )
    } else {
        ColumnValues::String(cells)
    };
    Column::new(name, values)
}

/// Graph extracted from a points table and an edges table.
#[derive(Debug, Clone, Default)]
pub struct ExtractedGraph {
    pub labels: Vec<String>,
    /// Flattened `(src, dst)` pairs in table order.
    pub edges: Vec<u32>,
    pub point_columns: Vec<Column>,
    pub edge_columns: Vec<Column>,
}

impl ExtractedGraph {
    pub fn num_points(&self) -> usize {
        self.labels.len()
    }

    /// Numeric edge column `name`, as `f32` weights in table order.
    pub fn edge_weights(&self, name: &str) -> Option<Vec<f32>> {
        let column = self.edge_columns.iter().find(|c| c.name == name)?;
        (0..column.len())
            .map(|i| column.values.numeric_at(i).map(|n| n as f32))
            .collect()
    }
}

pub fn extract_graph(points: &Table, edges: &Table, source: &str, destination: &str) -> Result<ExtractedGraph> {
    if points.headers.is_empty() {
        bail!("points table has no header");
    }
    let labels = points.cells(0);
    let mut ids: HashMap<&str, u32> = HashMap::with_capacity(labels.len());
    for (i, label) in labels.iter().enumerate() {
        if ids.insert(label.as_str(), i as u32).is_some() {
            bail!("duplicate point id {label:?}");
        }
    }

    let src_col = edges
        .column_index(source)
        .ok_or_else(|| anyhow!("edges table has no {source:?} column"))?;
    let dst_col = edges
        .column_index(destination)
        .ok_or_else(|| anyhow!("edges table has no {destination:?} column"))?;

    let mut pairs = Vec::with_capacity(edges.rows.len() * 2);
    for (line, row) in edges.rows.iter().enumerate() {
        for col in [src_col, dst_col] {
            let id = row.get(col).map(String::as_str).unwrap_or_default();
            let point = ids
                .get(id)
                .with_context(|| format!("edge row {} references unknown point {id:?}", line + 1))?;
            pairs.push(*point);
        }
    }

    let point_columns = (1..points.headers.len())
        .map(|i| infer_column(&points.headers[i], points.cells(i)))
        .collect();
    let edge_columns = (0..edges.headers.len())
        .filter(|&i| i != src_col && i != dst_col)
        .map(|i| infer_column(&edges.headers[i], edges.cells(i)))
        .collect();

    Ok(ExtractedGraph {
        labels,
        edges: pairs,
        point_columns,
        edge_columns,
    })
}

/// Loads an extracted graph into an empty dataframe, with degree and
/// source/destination columns.
pub fn load_graph(df: &mut Dataframe, graph: ExtractedGraph) -> Result<()> {
    let num_points = graph.num_points();
    df.load_edges_and_encapsulate(graph.edges, num_points)
        .context("failed to encapsulate edges")?;
    df.load_labels(ComponentType::Point, graph.labels)?;
    for column in graph.point_columns {
        df.load_column(ComponentType::Point, column)?;
    }
    for column in graph.edge_columns {
        df.load_column(ComponentType::Edge, column)?;
    }
    df.load_degrees()?;
    df.load_edge_destinations()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataframe::ViewKind;
    use crate::types::Value;

    const POINTS: &str = "id,community,score,seen\nalice,0,1.5,2024-01-01T00:00:00Z\nbob,1,n/a,\ncarol,1,3,2024-01-02T12:00:00Z\n";
    const EDGES: &str = "source,destination,weight\nalice,bob,2\nbob,carol,1\ncarol,alice,0.5\n";

    #[test]
    fn infers_column_types() -> Result<()> {
        let points = CsvTableExtractor::new().extract(POINTS)?;
        let edges = CsvTableExtractor::new().extract(EDGES)?;
        let graph = extract_graph(&points, &edges, "source", "destination")?;
        assert_eq!(graph.labels, vec!["alice", "bob", "carol"]);
        assert_eq!(graph.edges, vec![0, 1, 1, 2, 2, 0]);

        let types: Vec<_> = graph.point_columns.iter().map(|c| c.data_type()).collect();
        assert_eq!(
            types,
            vec![
                crate::types::DataType::Integer,
                crate::types::DataType::Number,
                crate::types::DataType::Date
            ]
        );
        assert!(graph.point_columns[1].values.value_at(1).is_null());
        assert_eq!(graph.edge_weights("weight"), Some(vec![2.0, 1.0, 0.5]));
        Ok(())
    }

    #[test]
    fn unknown_endpoint_is_an_error() -> Result<()> {
        let points = CsvTableExtractor::new().extract(POINTS)?;
        let edges = CsvTableExtractor::new().extract("source,destination\nalice,dave\n")?;
        let err = extract_graph(&points, &edges, "source", "destination").unwrap_err();
        assert!(err.to_string().contains("dave"));
        Ok(())
    }

    #[test]
    fn loads_into_dataframe() -> Result<()> {
        let points = CsvTableExtractor::new().extract(POINTS)?;
        let edges = CsvTableExtractor::new().extract(EDGES)?;
        let mut df = Dataframe::default();
        load_graph(&mut df, extract_graph(&points, &edges, "source", "destination")?)?;

        // Canonical order: alice->bob, bob->carol, carol->alice.
        let dst = df.get_column_values("Destination", ComponentType::Edge, ViewKind::Raw)?;
        assert_eq!(
            dst,
            ColumnValues::String(vec!["bob".into(), "carol".into(), "alice".into()])
        );
        assert_eq!(
            df.get_cell("degree", ComponentType::Point, 0)?,
            Value::Integer(2)
        );
        Ok(())
    }
}
