//! County Resolver Library - Point-to-County Resolution over Bundled Boundaries
//!
//! This library answers "which county contains this point?" using a locally bundled
//! boundary dataset indexed by an R-tree, with deterministic fallback to a remote
//! census authority and, when everything else fails, a nearest-centroid estimate.
//!
//! # Architecture
//!
//! - **[`loader`]**: Reads the bundled dataset (GeoJSON or compact columnar) into a [`NormalizedDataset`]
//! - **[`GeometryStore`]**: Owns every [`PolygonRecord`] with precomputed bounding boxes and centroids
//! - **[`SpatialIndex`]**: Bulk-loaded R-tree returning bounding-box candidates for a point
//! - **[`ResolutionContext`]**: Lazily built resolution state and the bundled → remote → degraded chain
//! - **[`CountyAuthority`]**: Capability trait for the remote authority
//! - **[`degraded`]**: Nearest-centroid best effort answers
//!
//! # Performance Characteristics
//!
//! - **Build Time**: O(N log N) for the index, metadata computed in parallel
//! - **Query Time**: O(log N + K) candidates, then exact containment on K polygons
//! - **Memory**: O(V) for boundary coordinates + O(N) for the index

mod authority;
mod config;
pub mod degraded;
pub mod geometry;
mod index;
pub mod loader;
mod record;
mod resolver;
mod store;

// Public API exports
pub use authority::{AuthorityError, CountyAuthority, CountyCode, OfflineAuthority};
pub use config::ResolverConfig;
pub use index::{IndexEntry, SpatialIndex};
pub use loader::{CountyBoundary, Encoding, NormalizedDataset};
pub use record::{PolygonRecord, RegionId};
pub use resolver::{
    Mode, Provenance, Resolution, ResolutionContext, ResolutionState, ResolutionStatus,
};
pub use store::{GeometryStore, StoreInfo};

use std::path::PathBuf;

/// Errors raised while loading the bundled boundary dataset.
///
/// Any of these disables bundled lookups for the lifetime of the resolution
/// state; they never reach callers of [`ResolutionContext::resolve`].
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Dataset not found at {}", path.display())]
    NotFound { path: PathBuf },

    #[error("Dataset schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Corrupt record #{record}: {reason}")]
    Corrupt { record: usize, reason: String },
}

pub type Result<T> = std::result::Result<T, LoadError>;

/// Errors returned to callers of [`ResolutionContext::resolve`]
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ResolutionError {
    #[error("Invalid point: lat={lat}, lon={lon}")]
    InvalidPoint { lat: f64, lon: f64 },

    #[error("Remote authority unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("Point could not be resolved to any county")]
    Unresolvable,
}
