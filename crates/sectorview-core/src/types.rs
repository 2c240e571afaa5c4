use std::fmt;

use serde::{Deserialize, Serialize};

/// Newtype for sector identifiers within one model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct SectorId(pub u32);

impl fmt::Display for SectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Newtype for the identifier of a mesh source file (`mesh_<id>.ctm`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct FileId(pub u64);

impl FileId {
    /// Name of the peripheral file holding this mesh's geometry.
    pub fn mesh_file_name(self) -> String {
        format!("mesh_{}.ctm", self.0)
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index of a node in the model's asset hierarchy, as stored per vertex.
pub type TreeIndex = u32;

/// Detail level a sector is wanted at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LevelOfDetail {
    /// Not wanted; any loaded geometry should be dropped.
    Discarded,
    /// Low-detail quad representation.
    Simple,
    /// Full triangle and primitive geometry.
    Detailed,
}

impl fmt::Display for LevelOfDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LevelOfDetail::Discarded => "discarded",
            LevelOfDetail::Simple => "simple",
            LevelOfDetail::Detailed => "detailed",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mesh_file_name() {
        assert_eq!(FileId(7).mesh_file_name(), "mesh_7.ctm");
    }

    #[test]
    fn test_level_of_detail_display() {
        assert_eq!(LevelOfDetail::Simple.to_string(), "simple");
        assert_eq!(LevelOfDetail::Detailed.to_string(), "detailed");
        assert_eq!(LevelOfDetail::Discarded.to_string(), "discarded");
    }
}
