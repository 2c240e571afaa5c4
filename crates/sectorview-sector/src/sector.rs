use std::sync::Arc;

use sectorview_core::math::Aabb;
use sectorview_core::types::{FileId, LevelOfDetail, SectorId};

use crate::scene::SceneNode;

/// Static description of one sector as listed in the model's scene file.
#[derive(Debug, Clone, PartialEq)]
pub struct SectorMetadata {
    pub id: SectorId,
    pub bounds: Aabb,
    /// Binary file holding the sector's detailed mesh table.
    pub index_file: String,
    /// Mesh geometry files the index file refers to.
    pub peripheral_files: Vec<String>,
    /// Binary file with the simple quad representation, if the sector has one.
    pub faces_file: Option<String>,
}

/// A sector the viewer wants at a given level of detail.
#[derive(Debug, Clone, PartialEq)]
pub struct WantedSector {
    pub blob_url: String,
    pub metadata: Arc<SectorMetadata>,
    pub level_of_detail: LevelOfDetail,
}

impl WantedSector {
    pub fn new(blob_url: impl Into<String>, metadata: Arc<SectorMetadata>, level_of_detail: LevelOfDetail) -> Self {
        Self {
            blob_url: blob_url.into(),
            metadata,
            level_of_detail,
        }
    }

    /// `<blob_url>.<sector_id>.<lod>`, unique per model, sector and detail level.
    pub fn cache_key(&self) -> String {
        format!("{}.{}.{}", self.blob_url, self.metadata.id, self.level_of_detail)
    }
}

/// Triangle mesh ready for the scene graph.
///
/// Arrays are shared so a mesh can sit in a cache and in the scene at
/// the same time without copying.
#[derive(Debug, Clone, PartialEq)]
pub struct TriangleMesh {
    pub file_id: FileId,
    pub indices: Arc<[u32]>,
    /// Positions, three floats per vertex.
    pub vertices: Arc<[f32]>,
    /// RGB, three bytes per vertex.
    pub colors: Arc<[u8]>,
    /// Three floats per vertex. Computed from topology when absent.
    pub normals: Option<Arc<[f32]>>,
    /// Tree index per vertex, stored as float for vertex attributes.
    pub tree_indices: Option<Arc<[f32]>>,
}

impl TriangleMesh {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / 3
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// Instances drawing the same triangle range of a mesh file.
#[derive(Debug, Clone, PartialEq)]
pub struct InstancedMesh {
    pub triangle_count: u32,
    pub triangle_offset: u64,
    /// Column-major 4x4 transforms, sixteen floats per instance.
    pub instance_matrices: Arc<[f32]>,
    /// RGBA, four bytes per instance.
    pub colors: Arc<[u8]>,
    pub tree_indices: Arc<[f32]>,
}

impl InstancedMesh {
    pub fn instance_count(&self) -> usize {
        self.tree_indices.len()
    }

    /// Index range of the shared file's index buffer drawn by each instance.
    pub fn index_range(&self) -> std::ops::Range<usize> {
        let start = 3 * self.triangle_offset as usize;
        start..start + 3 * self.triangle_count as usize
    }
}

/// A mesh file shared by instanced meshes of one sector.
#[derive(Debug, Clone, PartialEq)]
pub struct InstancedMeshFile {
    pub file_id: FileId,
    pub indices: Arc<[u32]>,
    pub vertices: Arc<[f32]>,
    pub normals: Option<Arc<[f32]>>,
    pub instances: Vec<InstancedMesh>,
}

/// Parsed detailed sector.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SectorGeometry {
    pub triangle_meshes: Vec<TriangleMesh>,
    pub instance_meshes: Vec<InstancedMeshFile>,
}

impl SectorGeometry {
    pub fn is_empty(&self) -> bool {
        self.triangle_meshes.is_empty() && self.instance_meshes.is_empty()
    }
}

/// Parsed simple sector: packed per-quad instance data.
#[derive(Debug, Clone, PartialEq)]
pub struct SectorQuads {
    pub buffer: Arc<[f32]>,
}

/// Result of loading a wanted sector. `group` is `None` for discarded
/// sectors and for sectors without geometry.
#[derive(Debug, Clone)]
pub struct ConsumedSector {
    pub blob_url: String,
    pub metadata: Arc<SectorMetadata>,
    pub level_of_detail: LevelOfDetail,
    pub group: Option<SceneNode>,
}

impl ConsumedSector {
    pub fn new(wanted: &WantedSector, group: Option<SceneNode>) -> Self {
        Self {
            blob_url: wanted.blob_url.clone(),
            metadata: wanted.metadata.clone(),
            level_of_detail: wanted.level_of_detail,
            group,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_includes_url_id_and_lod() {
        let metadata = Arc::new(SectorMetadata {
            id: SectorId(12),
            bounds: Aabb::default(),
            index_file: "sector_12.i3d".into(),
            peripheral_files: vec![],
            faces_file: None,
        });
        let wanted = WantedSector::new("models/7", metadata, LevelOfDetail::Detailed);
        assert_eq!(wanted.cache_key(), "models/7.12.detailed");
    }
}
