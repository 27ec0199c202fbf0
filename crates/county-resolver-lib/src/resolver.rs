//! Resolver - Top-level point-to-county resolution
//!
//! [`ResolutionState`] holds the loaded store and index and answers pure
//! bundled lookups. [`ResolutionContext`] builds that state lazily, exactly
//! once, and runs the full chain for each query:
//!
//! 0. reject invalid points
//! 1. bundled lookup (index candidates, exact containment, tie-break)
//! 2. remote authority, bounded by a timeout and a cancellation token
//! 3. degraded nearest-centroid estimate

use crate::{
    CountyAuthority, GeometryStore, NormalizedDataset, PolygonRecord, ResolutionError,
    ResolverConfig, SpatialIndex, degraded, geometry, loader,
};

use geo::Point;
use once_cell::sync::OnceCell;
use rayon::prelude::*;
use tokio_util::sync::CancellationToken;

/// Per-step diagnostics: `info` when the config asks for debug output, `trace` otherwise
macro_rules! step_event {
    ($debug:expr, $($arg:tt)+) => {
        if $debug {
            tracing::info!($($arg)+)
        } else {
            tracing::trace!($($arg)+)
        }
    };
}

/// Which lookup path is attempted first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Bundled dataset loaded and indexed
    Bundled,
    /// No usable bundled data; the remote authority is tried first
    RemoteOnly,
    /// Neither bundled data nor remote; only degraded estimates
    DegradedOnly,
}

/// Where a resolution came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    Bundled,
    Remote,
    /// Nearest-centroid estimate, not authoritative
    Degraded,
}

/// A resolved county
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub state_code: String,
    pub county_code: String,
    /// Display name when known (bundled and degraded results)
    pub name: Option<String>,
    pub provenance: Provenance,
}

impl Resolution {
    fn from_record(record: &PolygonRecord, provenance: Provenance) -> Self {
        Self {
            state_code: record.state_code().to_string(),
            county_code: record.county_code().to_string(),
            name: Some(record.name().to_string()),
            provenance,
        }
    }

    /// `state_code ++ county_code`
    pub fn region_id(&self) -> String {
        format!("{}{}", self.state_code, self.county_code)
    }
}

/// Diagnostics snapshot of a resolution state
#[derive(Debug, Clone, PartialEq)]
pub struct ResolutionStatus {
    pub mode: Mode,
    /// Records in the bundled store (0 when not loaded)
    pub record_count: usize,
    /// Why the bundled dataset is unavailable, if it failed to load
    pub load_error: Option<String>,
}

/// Loaded geometry, its index and the derived mode
///
/// Read-only after construction.
#[derive(Debug)]
pub struct ResolutionState {
    store: Option<GeometryStore>,
    index: Option<SpatialIndex>,
    mode: Mode,
    load_error: Option<String>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl ResolutionState {
    /// Load the bundled dataset named by the configuration and build the index
    ///
    /// Load failures are logged and recorded; they only downgrade the mode.
    pub fn load(config: &ResolverConfig) -> Self {
        #[cfg(feature = "profiling")]
        profiling::scope!("resolution_state::load");

        if !config.use_bundled_data {
            tracing::info!("Bundled data disabled, skipping dataset load");
            return Self::assemble(None, None, config);
        }

        let outcome = loader::load(config.preferred_encoding, &config.dataset_path)
            .and_then(GeometryStore::build);
        Self::from_store(outcome, config)
    }

    /// Build the state from an already decoded dataset
    ///
    /// The dataset is validated exactly as if it had been loaded from disk.
    pub fn from_dataset(dataset: NormalizedDataset, config: &ResolverConfig) -> Self {
        if !config.use_bundled_data {
            return Self::assemble(None, None, config);
        }

        let outcome = dataset
            .validate()
            .and_then(|()| GeometryStore::build(dataset));
        Self::from_store(outcome, config)
    }

    fn from_store(outcome: crate::Result<GeometryStore>, config: &ResolverConfig) -> Self {
        match outcome {
            Ok(store) => {
                let index = SpatialIndex::build(&store);
                tracing::info!(
                    "Bundled dataset ready: {} counties, {} coordinates, index depth {}",
                    store.len(),
                    store.info().coordinate_count,
                    index.depth()
                );
                Self::assemble(Some((store, index)), None, config)
            }
            Err(e) => {
                tracing::warn!(
                    "Bundled dataset unavailable ({}), bundled lookups disabled: {}",
                    config.dataset_path.display(),
                    e
                );
                Self::assemble(None, Some(e.to_string()), config)
            }
        }
    }

    fn assemble(
        loaded: Option<(GeometryStore, SpatialIndex)>,
        load_error: Option<String>,
        config: &ResolverConfig,
    ) -> Self {
        let mode = match &loaded {
            Some(_) if config.use_bundled_data => Mode::Bundled,
            _ if config.use_remote => Mode::RemoteOnly,
            _ => Mode::DegradedOnly,
        };
        let (store, index) = loaded.unzip();

        Self {
            store,
            index,
            mode,
            load_error,
        }
    }

    /// Bundled lookup only: validates the point, then searches the index
    ///
    /// `Ok(None)` when the point is in no county or bundled mode is inactive.
    pub fn locate(&self, lat: f64, lon: f64) -> Result<Option<Resolution>, ResolutionError> {
        if !geometry::is_valid_wgs84(lat, lon) {
            return Err(ResolutionError::InvalidPoint { lat, lon });
        }

        let point = geometry::point_from_lat_lon(lat, lon);
        Ok(self
            .bundled_lookup(point)
            .map(|record| Resolution::from_record(record, Provenance::Bundled)))
    }

    /// [`locate`](Self::locate) over a batch in parallel; output order matches input
    pub fn locate_many(
        &self,
        points: &[(f64, f64)],
    ) -> Vec<Result<Option<Resolution>, ResolutionError>> {
        points
            .par_iter()
            .map(|&(lat, lon)| self.locate(lat, lon))
            .collect()
    }

    fn bundled_lookup(&self, point: Point<f64>) -> Option<&PolygonRecord> {
        if self.mode != Mode::Bundled {
            return None;
        }
        let store = self.store.as_ref()?;
        let index = self.index.as_ref()?;

        let containing: Vec<&PolygonRecord> = index
            .candidate_slots(point)
            .into_iter()
            .filter_map(|slot| store.by_slot(slot))
            .filter(|record| record.contains(point))
            .collect();

        if containing.len() <= 1 {
            return containing.first().copied();
        }

        // Overlapping boundaries: smaller bounding box wins, then smaller region id
        let chosen = containing.iter().copied().min_by(|a, b| {
            a.bounding_box_area()
                .total_cmp(&b.bounding_box_area())
                .then_with(|| a.region_id().cmp(b.region_id()))
        })?;
        tracing::warn!(
            "Point ({}, {}) lies in {} counties, choosing {}",
            point.y(),
            point.x(),
            containing.len(),
            chosen.region_id()
        );
        Some(chosen)
    }

    #[inline]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    #[inline]
    pub fn store(&self) -> Option<&GeometryStore> {
        self.store.as_ref()
    }

    #[inline]
    pub fn index(&self) -> Option<&SpatialIndex> {
        self.index.as_ref()
    }

    #[inline]
    pub fn load_error(&self) -> Option<&str> {
        self.load_error.as_deref()
    }

    pub fn status(&self) -> ResolutionStatus {
        ResolutionStatus {
            mode: self.mode,
            record_count: self.store.as_ref().map_or(0, GeometryStore::len),
            load_error: self.load_error.clone(),
        }
    }
}

/// Entry point for resolving points to counties
///
/// Owns the configuration, the remote authority and the lazily built
/// [`ResolutionState`]. Concurrent first callers block on a single build.
///
/// # Runtime
///
/// The remote step is bounded with `tokio::time::timeout`, so [`resolve`],
/// [`resolve_with_cancel`] and [`resolve_many`] must be polled inside a Tokio
/// runtime with the time driver enabled (`Runtime::new()`, `#[tokio::main]`, or
/// a `Builder` with `enable_time()`). Polling them elsewhere panics once the
/// remote step is reached.
///
/// The first access loads and indexes the dataset synchronously, blocking the
/// calling thread for the whole disk read, decode and index build. Call
/// [`warm_up`] before serving queries, either outside the runtime or through
/// `tokio::task::spawn_blocking`, so that build never stalls an executor thread.
///
/// [`resolve`]: Self::resolve
/// [`resolve_with_cancel`]: Self::resolve_with_cancel
/// [`resolve_many`]: Self::resolve_many
/// [`warm_up`]: Self::warm_up
pub struct ResolutionContext<A: CountyAuthority> {
    config: ResolverConfig,
    authority: A,
    state: OnceCell<ResolutionState>,
}

impl<A: CountyAuthority> ResolutionContext<A> {
    /// Create a context; the dataset is loaded on first use
    pub fn new(config: ResolverConfig, authority: A) -> Self {
        Self {
            config,
            authority,
            state: OnceCell::new(),
        }
    }

    /// Create a context around an already built state
    pub fn with_state(config: ResolverConfig, authority: A, state: ResolutionState) -> Self {
        Self {
            config,
            authority,
            state: OnceCell::with_value(state),
        }
    }

    /// The resolution state, built on first access
    pub fn state(&self) -> &ResolutionState {
        self.state
            .get_or_init(|| ResolutionState::load(&self.config))
    }

    /// Force the one-time build now instead of on the first query
    ///
    /// Blocks until the dataset is loaded and indexed. From async code, run it
    /// with `tokio::task::spawn_blocking` on a shared context.
    pub fn warm_up(&self) -> ResolutionStatus {
        self.state().status()
    }

    /// Drop the built state; the next query reloads from the configuration
    pub fn reset(&mut self) {
        self.state.take();
    }

    pub fn status(&self) -> ResolutionStatus {
        self.state().status()
    }

    pub fn mode(&self) -> Mode {
        self.state().mode()
    }

    #[inline]
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    #[inline]
    pub fn authority(&self) -> &A {
        &self.authority
    }

    /// Resolve a WGS84 point to its county
    pub async fn resolve(&self, lat: f64, lon: f64) -> Result<Resolution, ResolutionError> {
        self.resolve_with_cancel(lat, lon, &CancellationToken::new())
            .await
    }

    /// Resolve a WGS84 point; cancelling `cancel` aborts only the remote step
    pub async fn resolve_with_cancel(
        &self,
        lat: f64,
        lon: f64,
        cancel: &CancellationToken,
    ) -> Result<Resolution, ResolutionError> {
        let debug = self.config.debug;
        let state = self.state();

        if let Some(resolution) = state.locate(lat, lon)? {
            step_event!(
                debug,
                "({}, {}) resolved from bundled data: {}",
                lat,
                lon,
                resolution.region_id()
            );
            return Ok(resolution);
        }
        step_event!(debug, "({}, {}) bundled lookup missed, mode {:?}", lat, lon, state.mode());

        let remote_failure = if self.config.use_remote && state.mode() != Mode::DegradedOnly {
            match self.remote_lookup(lat, lon, cancel).await {
                Ok(code) => {
                    step_event!(
                        debug,
                        "({}, {}) resolved by {}: {}{}",
                        lat,
                        lon,
                        self.authority.name(),
                        code.state_code,
                        code.county_code
                    );
                    return Ok(Resolution {
                        state_code: code.state_code,
                        county_code: code.county_code,
                        name: None,
                        provenance: Provenance::Remote,
                    });
                }
                Err(reason) => {
                    tracing::warn!(
                        "Remote lookup via {} failed for ({}, {}): {}",
                        self.authority.name(),
                        lat,
                        lon,
                        reason
                    );
                    Some(reason)
                }
            }
        } else {
            step_event!(debug, "({}, {}) remote lookup skipped", lat, lon);
            None
        };

        if self.config.use_mock_on_failure {
            let point = geometry::point_from_lat_lon(lat, lon);
            let nearest = state.store().and_then(|store| {
                degraded::nearest(point, store).and_then(|region_id| store.get(region_id))
            });
            if let Some(record) = nearest {
                step_event!(
                    debug,
                    "({}, {}) degraded estimate: {}",
                    lat,
                    lon,
                    record.region_id()
                );
                return Ok(Resolution::from_record(record, Provenance::Degraded));
            }
        }

        match remote_failure {
            Some(reason) if !self.config.use_mock_on_failure => {
                Err(ResolutionError::RemoteUnavailable(reason))
            }
            _ => Err(ResolutionError::Unresolvable),
        }
    }

    /// Resolve a batch sequentially; one result per input, in order
    pub async fn resolve_many(
        &self,
        points: &[(f64, f64)],
    ) -> Vec<Result<Resolution, ResolutionError>> {
        let mut results = Vec::with_capacity(points.len());
        for &(lat, lon) in points {
            results.push(self.resolve(lat, lon).await);
        }
        results
    }

    /// One authority call, bounded by the configured timeout and the token
    async fn remote_lookup(
        &self,
        lat: f64,
        lon: f64,
        cancel: &CancellationToken,
    ) -> Result<crate::CountyCode, String> {
        let timeout = self.config.remote_timeout;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err("lookup cancelled".to_string()),
            result = tokio::time::timeout(timeout, self.authority.lookup_county(lat, lon)) => {
                match result {
                    Ok(Ok(code)) => Ok(code),
                    Ok(Err(e)) => Err(e.to_string()),
                    Err(_) => Err(format!("timed out after {} ms", timeout.as_millis())),
                }
            }
        }
    }
}
