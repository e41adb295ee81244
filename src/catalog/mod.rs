//! Anchor catalog loading
//!
//! The anchor list is fetched once and cached as CSV; later runs read the
//! cache instead of paging through the API again. The anchor to measurement
//! mapping is always rebuilt from a full catalog scan.

use crate::fetcher::{FetcherError, MeasurementSource};
use crate::{Anchor, MeasurementRef};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

pub mod cache;

pub use cache::{read_anchor_cache, write_anchor_cache, ANCHOR_HEADER};

/// Catalog errors
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// Cache header differs from the expected column list
    #[error("anchor cache {path} has unexpected header: expected [{expected}], found [{found}]")]
    SchemaMismatch {
        /// Cache file
        path: String,
        /// Expected columns
        expected: String,
        /// Columns found in the file
        found: String,
    },

    /// Malformed CSV row
    #[error("CSV error: {0}")]
    Csv(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(String),

    /// Upstream fetch failed
    #[error(transparent)]
    Fetcher(#[from] FetcherError),
}

/// Result type for catalog operations
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Loaded anchor list with its id projections
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnchorCatalog {
    /// Anchors sorted by id
    pub anchors: Vec<Anchor>,
    /// Anchor ids, same order as `anchors`
    pub ids: Vec<u32>,
    /// Anchor probe ids, same order as `anchors`
    pub probe_ids: Vec<u32>,
}

impl AnchorCatalog {
    /// Build a catalog, sorting and deduplicating by anchor id
    pub fn new(mut anchors: Vec<Anchor>) -> Self {
        anchors.sort_by_key(|a| a.aid);
        anchors.dedup_by_key(|a| a.aid);
        let ids = anchors.iter().map(|a| a.aid).collect();
        let probe_ids = anchors.iter().map(|a| a.pid).collect();
        Self {
            anchors,
            ids,
            probe_ids,
        }
    }

    /// Number of anchors
    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    /// Whether the catalog is empty
    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }
}

/// Anchor id to ping measurements targeting it
pub type MeasurementMap = HashMap<u32, Vec<MeasurementRef>>;

/// Load anchors from `cache_path`, or fetch and cache them
///
/// # Errors
/// - `SchemaMismatch` if the cache exists with a different header
/// - `Fetcher` if the cache is missing and the listing fails
/// - `Io`/`Csv` on unreadable or unwritable cache files
pub async fn load_anchors(
    cache_path: &Path,
    source: &dyn MeasurementSource,
) -> CatalogResult<AnchorCatalog> {
    if cache_path.exists() {
        let anchors = read_anchor_cache(cache_path)?;
        info!(
            path = %cache_path.display(),
            anchors = anchors.len(),
            "Loaded anchors from cache"
        );
        return Ok(AnchorCatalog::new(anchors));
    }

    info!(path = %cache_path.display(), "No anchor cache, fetching anchor list");
    let catalog = AnchorCatalog::new(source.list_anchors().await?);
    write_anchor_cache(cache_path, &catalog.anchors)?;

    Ok(catalog)
}

/// Map each anchor to the ping measurements that target it
///
/// Every anchor in `anchor_ids` gets an entry, possibly empty. Lists are
/// sorted and deduplicated so iteration order is stable across runs.
pub async fn load_measurements(
    source: &dyn MeasurementSource,
    anchor_ids: &[u32],
) -> CatalogResult<MeasurementMap> {
    let mut map: MeasurementMap = anchor_ids.iter().map(|&aid| (aid, Vec::new())).collect();

    for (aid, measurement) in source.list_ping_measurements(anchor_ids).await? {
        if let Some(list) = map.get_mut(&aid) {
            list.push(measurement);
        }
    }

    for list in map.values_mut() {
        list.sort_unstable();
        list.dedup();
    }

    let total: usize = map.values().map(Vec::len).sum();
    let uncovered = map.values().filter(|list| list.is_empty()).count();
    info!(
        measurements = total,
        anchors = map.len(),
        uncovered,
        "Measurement catalog loaded"
    );

    Ok(map)
}
