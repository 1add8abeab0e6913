use crate::aggregation::DEFAULT_DISTINCT_LIMIT;
use crate::binning::MAX_BIN_COUNT;
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::warn;

pub const DEFAULT_MASK_JSON_THRESHOLD: usize = 30_000;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DataframeConfig {
    /// Directory that serialized row/column documents are written to.
    pub base_dir: PathBuf,
    pub distinct_limit: usize,
    /// Per-type element count above which mask JSON omits the type.
    pub mask_json_threshold: usize,
    /// zstd-compress serialized documents.
    pub compress: bool,
    pub max_histogram_bins: usize,
}

impl Default for DataframeConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("data/graphframe"),
            distinct_limit: DEFAULT_DISTINCT_LIMIT,
            mask_json_threshold: DEFAULT_MASK_JSON_THRESHOLD,
            compress: false,
            max_histogram_bins: MAX_BIN_COUNT,
        }
    }
}

impl DataframeConfig {
    /// Defaults overridden by any parseable `GRAPHFRAME_*` variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(dir) = env::var("GRAPHFRAME_BASE_DIR") {
            config.base_dir = PathBuf::from(dir);
        }
        override_from_env("GRAPHFRAME_DISTINCT_LIMIT", &mut config.distinct_limit);
        override_from_env(
            "GRAPHFRAME_MASK_JSON_THRESHOLD",
            &mut config.mask_json_threshold,
        );
        override_from_env("GRAPHFRAME_MAX_HISTOGRAM_BINS", &mut config.max_histogram_bins);
        override_from_env("GRAPHFRAME_COMPRESS", &mut config.compress);
        config
    }
}

fn override_from_env<T: FromStr>(var: &str, slot: &mut T) {
    let Ok(raw) = env::var(var) else {
        return;
    };
    match raw.trim().parse() {
        Ok(value) => *slot = value,
        Err(_) => warn!(var, value = %raw, "ignoring unparseable override"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config: DataframeConfig =
            serde_json::from_str(r#"{"distinct_limit": 42, "compress": true}"#).unwrap();
        assert_eq!(config.distinct_limit, 42);
        assert!(config.compress);
        assert_eq!(config.mask_json_threshold, DEFAULT_MASK_JSON_THRESHOLD);
        assert_eq!(config.base_dir, PathBuf::from("data/graphframe"));
    }
}
