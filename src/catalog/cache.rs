//! Anchor cache CSV reader and writer
//!
//! The cache is rewritten atomically (temp file, fsync, rename) so a crash
//! never leaves a half-written anchor list behind.

use super::{CatalogError, CatalogResult};
use crate::Anchor;
use csv::{ReaderBuilder, WriterBuilder};
use std::io::Write;
use std::path::Path;
use tracing::{debug, info};

/// Anchor cache columns, in file order
pub const ANCHOR_HEADER: [&str; 8] = [
    "aid",
    "pid",
    "address_v4",
    "asn_v4",
    "latitude",
    "longitude",
    "country_code",
    "city",
];

/// Read the anchor cache
///
/// # Errors
/// Returns `SchemaMismatch` unless the header equals [`ANCHOR_HEADER`] exactly
pub fn read_anchor_cache(path: &Path) -> CatalogResult<Vec<Anchor>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| CatalogError::Io(format!("Failed to open {}: {e}", path.display())))?;

    let headers = reader
        .headers()
        .map_err(|e| CatalogError::Csv(format!("Failed to read header: {e}")))?
        .clone();

    if !headers.iter().eq(ANCHOR_HEADER) {
        return Err(CatalogError::SchemaMismatch {
            path: path.display().to_string(),
            expected: ANCHOR_HEADER.join(","),
            found: headers.iter().collect::<Vec<_>>().join(","),
        });
    }

    reader
        .deserialize()
        .enumerate()
        .map(|(i, row)| {
            row.map_err(|e| CatalogError::Csv(format!("Invalid anchor row {}: {e}", i + 1)))
        })
        .collect()
}

/// Write the anchor cache sorted by anchor id, replacing any existing file
pub fn write_anchor_cache(path: &Path, anchors: &[Anchor]) -> CatalogResult<()> {
    let parent_dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent_dir)
        .map_err(|e| CatalogError::Io(format!("Failed to create directory: {e}")))?;

    let mut sorted: Vec<&Anchor> = anchors.iter().collect();
    sorted.sort_by_key(|a| a.aid);

    let temp_file = tempfile::NamedTempFile::new_in(parent_dir)
        .map_err(|e| CatalogError::Io(format!("Failed to create temp file: {e}")))?;

    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .from_writer(temp_file);
    writer
        .write_record(ANCHOR_HEADER)
        .map_err(|e| CatalogError::Csv(format!("Failed to write header: {e}")))?;
    for anchor in &sorted {
        writer
            .serialize(anchor)
            .map_err(|e| CatalogError::Csv(format!("Failed to write anchor {}: {e}", anchor.aid)))?;
    }

    let mut temp_file = writer
        .into_inner()
        .map_err(|e| CatalogError::Io(format!("Failed to flush anchor cache: {e}")))?;
    temp_file
        .flush()
        .map_err(|e| CatalogError::Io(format!("Failed to flush temp file: {e}")))?;
    temp_file
        .as_file()
        .sync_all()
        .map_err(|e| CatalogError::Io(format!("Failed to sync temp file: {e}")))?;
    temp_file
        .persist(path)
        .map_err(|e| CatalogError::Io(format!("Failed to persist temp file: {e}")))?;

    // Fsync parent directory so the rename is durable
    if let Ok(dir) = std::fs::File::open(parent_dir) {
        let _ = dir.sync_all();
    }

    debug!(path = %path.display(), "Anchor cache replaced");
    info!(
        path = %path.display(),
        anchors = sorted.len(),
        "Anchor cache written"
    );
    Ok(())
}
