//! Resolver configuration
//!
//! Deserializable with defaults so the owning application's YAML/JSON config
//! can embed it as a section.

use crate::loader::Encoding;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for a [`ResolutionContext`](crate::ResolutionContext)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Load the bundled dataset and try it first.
    /// When false the dataset is never read.
    pub use_bundled_data: bool,
    /// Fall back to a nearest-centroid estimate when nothing authoritative answers
    pub use_mock_on_failure: bool,
    /// Emit per-step diagnostics at `info` instead of `trace`
    pub debug: bool,
    /// File or directory holding the bundled dataset
    pub dataset_path: PathBuf,
    /// Encoding tried first when `dataset_path` is a directory
    pub preferred_encoding: Encoding,
    /// Consult the remote authority on a bundled miss
    pub use_remote: bool,
    /// Upper bound for one remote lookup
    #[serde(rename = "remote_timeout_ms", with = "duration_ms")]
    pub remote_timeout: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            use_bundled_data: true,
            use_mock_on_failure: true,
            debug: false,
            dataset_path: PathBuf::from("data"),
            preferred_encoding: Encoding::default(),
            use_remote: true,
            remote_timeout: Duration::from_secs(10),
        }
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
