//! In-memory graph dataframe.
//!
//! Point and edge attributes live in typed columns. A [`mask::DataframeMask`]
//! selects a subset, and [`dataframe::Dataframe::apply_mask_to_filter_in_place`]
//! rebuilds the filtered view (edges, adjacency, degrees and the numeric
//! buffers shared with a simulator) from the raw data. Aggregations answer
//! statistics and histogram queries over either view.

pub mod aggregation;
pub mod binning;
pub mod buffers;
pub mod column;
pub mod composer;
pub mod config;
pub mod dataframe;
pub mod encapsulate;
pub mod error;
pub mod filter;
pub mod ingest;
pub mod mask;
pub mod query;
pub mod serialize;
pub mod types;
pub mod view;

pub use buffers::{BufferHandle, BufferHost, MemoryBufferHost};
pub use column::{Column, ColumnKey};
pub use config::DataframeConfig;
pub use dataframe::{AggregateMode, AggregateResult, Dataframe, SimulatorSeed, ViewKind};
pub use error::{DataframeError, Result};
pub use filter::FilterOutcome;
pub use mask::{DataframeMask, MaskSize};
pub use query::{QueryError, QueryPlan};
pub use types::{ColumnValues, ComponentType, DataType, Value};
