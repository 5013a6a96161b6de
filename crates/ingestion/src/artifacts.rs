//! Loading of derived artifacts: marks and timing map

use std::path::Path;

use contracts::{ContractError, Mark, TimingMapAnchor};
use tracing::{info, instrument};

use crate::reader::{read_records, ReadStats};

/// Load persisted marks.
///
/// # Errors
/// `MissingFile` when the file does not exist
#[instrument(name = "ingestion_load_marks", skip_all, fields(path = %path.display()))]
pub fn load_marks(path: &Path) -> Result<(Vec<Mark>, ReadStats), ContractError> {
    let (marks, stats) = read_records::<Mark>(path)?;
    info!(marks = marks.len(), malformed = stats.malformed, "loaded marks");
    Ok((marks, stats))
}

/// Load a persisted timing map.
///
/// Anchors are returned as stored; ordering is enforced by the conversion
/// service.
///
/// # Errors
/// `MissingFile` when the file does not exist
#[instrument(name = "ingestion_load_timing_map", skip_all, fields(path = %path.display()))]
pub fn load_timing_map(path: &Path) -> Result<(Vec<TimingMapAnchor>, ReadStats), ContractError> {
    let (anchors, stats) = read_records::<TimingMapAnchor>(path)?;
    info!(anchors = anchors.len(), malformed = stats.malformed, "loaded timing map");
    Ok((anchors, stats))
}
