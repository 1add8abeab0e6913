//! JSON documents of rows or columns, and CSV rendering of compact rows.

use crate::dataframe::{CompactRows, Dataframe, Row, ViewKind};
use crate::error::Result;
use crate::types::{ColumnValues, ComponentType, Value};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use tracing::info;

const ZSTD_LEVEL: i32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RowFormat {
    #[default]
    Objects,
    Compact,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RowsDocument {
    Objects(Vec<Row>),
    Compact(CompactRows),
}

fn column_values_json(values: &ColumnValues) -> Vec<Value> {
    (0..values.len()).map(|i| values.value_at(i)).collect()
}

impl Dataframe {
    /// Current-view rows of every component type.
    pub fn rows_document(&self, format: RowFormat) -> Result<BTreeMap<ComponentType, RowsDocument>> {
        let mut document = BTreeMap::new();
        for component in ComponentType::ALL {
            let rows = match format {
                RowFormat::Objects => RowsDocument::Objects(self.get_rows(None, component)?),
                RowFormat::Compact => RowsDocument::Compact(self.get_rows_compact(None, component)?),
            };
            document.insert(component, rows);
        }
        Ok(document)
    }

    /// Current-view values of every public column, keyed by type then name.
    pub fn columns_document(&self) -> Result<BTreeMap<ComponentType, BTreeMap<String, Vec<Value>>>> {
        let mut document = BTreeMap::new();
        for component in ComponentType::ALL {
            let mut columns = BTreeMap::new();
            for column in self.raw().attributes.of(component).public_columns() {
                let key = format!("{component}:{}", column.key);
                let values = self.get_column_values(&key, component, ViewKind::Current)?;
                columns.insert(column.name.clone(), column_values_json(&values));
            }
            document.insert(component, columns);
        }
        Ok(document)
    }

    /// Writes the rows document to `<base_dir>/<name>.json` (`.json.zst` when
    /// compression is on) and returns the path.
    pub fn serialize_rows(&self, name: &str, format: RowFormat) -> Result<PathBuf> {
        let document = self.rows_document(format)?;
        self.write_document(name, &document)
    }

    pub fn serialize_columns(&self, name: &str) -> Result<PathBuf> {
        let document = self.columns_document()?;
        self.write_document(name, &document)
    }

    fn write_document<T: Serialize>(&self, name: &str, document: &T) -> Result<PathBuf> {
        let config = self.config();
        fs::create_dir_all(&config.base_dir)?;
        let json = serde_json::to_vec(document)?;
        let (path, bytes) = if config.compress {
            let compressed = zstd::encode_all(json.as_slice(), ZSTD_LEVEL)?;
            (config.base_dir.join(format!("{name}.json.zst")), compressed)
        } else {
            (config.base_dir.join(format!("{name}.json")), json)
        };
        fs::write(&path, &bytes)?;
        info!(path = %path.display(), bytes = bytes.len(), "serialized document");
        Ok(path)
    }
}

/// Renders compact rows as CSV with a header line.
pub fn format_as_csv(rows: &CompactRows) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&rows.header)?;
    for row in &rows.values {
        writer.write_record(row.iter().map(Value::to_display_string))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| std::io::Error::other(e.to_string()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
