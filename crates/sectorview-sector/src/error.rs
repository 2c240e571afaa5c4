use sectorview_core::types::{FileId, SectorId};
use thiserror::Error;

/// Errors that can occur while loading and building sector geometry.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SectorError {
    #[error("failed to fetch {file}: {reason}")]
    Fetch { file: String, reason: String },

    #[error("failed to decode {file}: {reason}")]
    Decode { file: String, reason: String },

    /// A mesh references a file that was not among the sector's
    /// peripheral files.
    #[error("mesh file for file id {0} was not loaded")]
    MissingMeshFile(FileId),

    #[error("malformed mesh data for file id {file_id}: {reason}")]
    MalformedMesh { file_id: FileId, reason: String },

    #[error("sector {0} has no faces file for simple geometry")]
    MissingFacesFile(SectorId),
}
