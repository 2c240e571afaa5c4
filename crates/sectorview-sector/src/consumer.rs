use std::collections::HashSet;
use std::sync::Arc;

use sectorview_core::math::Aabb;
use sectorview_core::types::SectorId;

use crate::normals::compute_vertex_normals;
use crate::scene::{Geometry, InstancedMeshNode, MaterialKind, MeshNode, QuadsNode, SceneNode};
use crate::sector::{InstancedMeshFile, SectorGeometry, SectorQuads, TriangleMesh};

/// Builds scene nodes from parsed sectors.
///
/// Detailed sectors become a group named `Sector <id>` with one mesh per
/// distinct mesh file, followed by one instanced node per instance batch.
/// Triangle meshes sharing a file id are deduplicated: only the first
/// survives, so color and tree-index data of the later ones is not
/// represented.
#[derive(Debug, Clone, Copy, Default)]
pub struct SectorGeometryConsumer;

pub fn detailed_group_name(sector_id: SectorId) -> String {
    format!("Sector {sector_id}")
}

pub fn simple_group_name(sector_id: SectorId) -> String {
    format!("Quads {sector_id}")
}

impl SectorGeometryConsumer {
    pub fn new() -> Self {
        Self
    }

    /// Add the sector's group to `parent`. A sector without triangle
    /// meshes leaves `parent` untouched. Returns whether a group was added.
    pub fn consume_detailed(
        &self,
        sector_id: SectorId,
        bounds: &Aabb,
        sector: &SectorGeometry,
        parent: &mut SceneNode,
    ) -> bool {
        match self.build_detailed_group(sector_id, bounds, sector) {
            Some(group) => {
                parent.add(group);
                true
            }
            None => false,
        }
    }

    /// Same as [`Self::consume_detailed`] for the quad representation.
    pub fn consume_simple(
        &self,
        sector_id: SectorId,
        bounds: &Aabb,
        quads: &SectorQuads,
        parent: &mut SceneNode,
    ) -> bool {
        match self.build_simple_group(sector_id, bounds, quads) {
            Some(group) => {
                parent.add(group);
                true
            }
            None => false,
        }
    }

    /// Group for a detailed sector, `None` if it has no meshes at all.
    pub fn build_detailed_group(
        &self,
        sector_id: SectorId,
        bounds: &Aabb,
        sector: &SectorGeometry,
    ) -> Option<SceneNode> {
        if sector.is_empty() {
            return None;
        }

        let mut group = SceneNode::group(detailed_group_name(sector_id));
        let mut seen = HashSet::new();
        for mesh in &sector.triangle_meshes {
            if !seen.insert(mesh.file_id) {
                continue;
            }
            group.add(SceneNode::mesh(
                format!("Triangle mesh {}", mesh.file_id),
                MeshNode {
                    file_id: Some(mesh.file_id),
                    geometry: build_geometry(mesh, bounds),
                    material: MaterialKind::Detailed,
                },
            ));
        }

        let skipped = sector.triangle_meshes.len() - group.child_count();
        if skipped > 0 {
            log::debug!("Sector {sector_id}: {skipped} meshes share a file id with an earlier mesh");
        }

        for file in &sector.instance_meshes {
            add_instanced_file(&mut group, file, bounds);
        }
        Some(group)
    }

    /// Group for a simple sector, `None` if it has no quads.
    pub fn build_simple_group(
        &self,
        sector_id: SectorId,
        bounds: &Aabb,
        quads: &SectorQuads,
    ) -> Option<SceneNode> {
        if quads.buffer.is_empty() {
            return None;
        }
        let mut group = SceneNode::group(simple_group_name(sector_id));
        group.add(SceneNode::quads(
            "Quads",
            QuadsNode {
                instances: quads.buffer.clone(),
                bounding_box: *bounds,
                material: MaterialKind::Simple,
            },
        ));
        Some(group)
    }
}

/// One node per instance batch, sharing the file's vertex arrays.
fn add_instanced_file(group: &mut SceneNode, file: &InstancedMeshFile, bounds: &Aabb) {
    let normal = match &file.normals {
        Some(normals) => normals.clone(),
        None => Arc::from(compute_vertex_normals(&file.indices, &file.vertices)),
    };
    for batch in &file.instances {
        let Some(index) = file.indices.get(batch.index_range()) else {
            log::warn!(
                "Instanced mesh {}: triangles at offset {} exceed the index buffer",
                file.file_id,
                batch.triangle_offset
            );
            continue;
        };
        let geometry = Geometry {
            index: Arc::from(index),
            position: file.vertices.clone(),
            color: Arc::from(Vec::new()),
            normal: normal.clone(),
            tree_index: None,
            bounding_box: *bounds,
            bounding_sphere: bounds.bounding_sphere(),
        };
        group.add(SceneNode::instanced_mesh(
            format!("Instanced mesh {}@{}", file.file_id, batch.triangle_offset),
            InstancedMeshNode {
                file_id: file.file_id,
                triangle_offset: batch.triangle_offset,
                geometry,
                instance_matrices: batch.instance_matrices.clone(),
                instance_colors: batch.colors.clone(),
                instance_tree_indices: batch.tree_indices.clone(),
                material: MaterialKind::Instanced,
            },
        ));
    }
}

/// Geometry bounded by the sector box rather than the mesh's own extent.
fn build_geometry(mesh: &TriangleMesh, bounds: &Aabb) -> Geometry {
    let normal = match &mesh.normals {
        Some(normals) => normals.clone(),
        None => Arc::from(compute_vertex_normals(&mesh.indices, &mesh.vertices)),
    };
    Geometry {
        index: mesh.indices.clone(),
        position: mesh.vertices.clone(),
        color: mesh.colors.clone(),
        normal,
        tree_index: mesh.tree_indices.clone(),
        bounding_box: *bounds,
        bounding_sphere: bounds.bounding_sphere(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use sectorview_core::types::FileId;
    use crate::sector::InstancedMesh;

    fn mesh(file_id: u64, with_normals: bool) -> TriangleMesh {
        TriangleMesh {
            file_id: FileId(file_id),
            indices: Arc::from(vec![0u32, 1, 2]),
            vertices: Arc::from(vec![0.0f32, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0]),
            colors: Arc::from(vec![file_id as u8; 9]),
            normals: with_normals.then(|| Arc::from(vec![1.0f32, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0])),
            tree_indices: None,
        }
    }

    fn bounds() -> Aabb {
        Aabb::new(Vec3::new(-1.0, -2.0, -3.0), Vec3::new(1.0, 2.0, 3.0))
    }

    #[test]
    fn test_empty_sector_leaves_parent_unchanged() {
        let mut parent = SceneNode::group("model");
        parent.add(SceneNode::group("existing"));

        let added = SectorGeometryConsumer::new().consume_detailed(
            SectorId(3),
            &bounds(),
            &SectorGeometry::default(),
            &mut parent,
        );
        assert!(!added);
        assert_eq!(parent.child_count(), 1);
    }

    #[test]
    fn test_one_mesh_per_unique_file_id() {
        let sector = SectorGeometry {
            triangle_meshes: vec![mesh(1, true), mesh(2, true), mesh(1, true), mesh(3, false), mesh(2, true)],
            ..Default::default()
        };
        let mut parent = SceneNode::group("model");
        assert!(SectorGeometryConsumer::new().consume_detailed(SectorId(8), &bounds(), &sector, &mut parent));

        assert_eq!(parent.child_count(), 1);
        let group = parent.find_child("Sector 8").expect("sector group");
        assert_eq!(group.child_count(), 3);
        let ids: Vec<Option<FileId>> = group.meshes().iter().map(|m| m.file_id).collect();
        assert_eq!(ids, vec![Some(FileId(1)), Some(FileId(2)), Some(FileId(3))]);
    }

    #[test]
    fn test_first_mesh_of_a_file_is_kept() {
        let mut second = mesh(1, true);
        second.colors = Arc::from(vec![200u8; 9]);
        let sector = SectorGeometry {
            triangle_meshes: vec![mesh(1, true), second],
            ..Default::default()
        };
        let group = SectorGeometryConsumer::new()
            .build_detailed_group(SectorId(1), &bounds(), &sector)
            .expect("group");
        let kept = group.meshes()[0];
        assert_eq!(kept.geometry.color[0], 1);
    }

    #[test]
    fn test_geometry_attributes_and_bounds() {
        let sector = SectorGeometry {
            triangle_meshes: vec![mesh(5, false)],
            ..Default::default()
        };
        let group = SectorGeometryConsumer::new()
            .build_detailed_group(SectorId(2), &bounds(), &sector)
            .expect("group");
        let node = group.meshes()[0];
        assert_eq!(node.material, MaterialKind::Detailed);

        let geometry = &node.geometry;
        assert_eq!(geometry.bounding_box, bounds());
        assert_eq!(geometry.bounding_sphere.center, Vec3::ZERO);
        assert!((geometry.bounding_sphere.radius - bounds().size().length() / 2.0).abs() < 1e-6);
        // Computed normals of a CCW triangle in the XY plane.
        assert_eq!(&geometry.normal[0..3], &[0.0, 0.0, 1.0]);
        assert_eq!(geometry.normal.len(), geometry.position.len());
    }

    #[test]
    fn test_provided_normals_are_used() {
        let sector = SectorGeometry {
            triangle_meshes: vec![mesh(5, true)],
            ..Default::default()
        };
        let group = SectorGeometryConsumer::new()
            .build_detailed_group(SectorId(2), &bounds(), &sector)
            .expect("group");
        assert_eq!(&group.meshes()[0].geometry.normal[0..3], &[1.0, 0.0, 0.0]);
    }

    fn instanced_file() -> InstancedMeshFile {
        let batch = |offset: u64, instances: usize| InstancedMesh {
            triangle_count: 1,
            triangle_offset: offset,
            instance_matrices: Arc::from(vec![0.0f32; 16 * instances]),
            colors: Arc::from(vec![7u8; 4 * instances]),
            tree_indices: Arc::from(vec![1.0f32; instances]),
        };
        InstancedMeshFile {
            file_id: FileId(11),
            indices: Arc::from(vec![0u32, 1, 2, 2, 1, 0]),
            vertices: Arc::from(vec![0.0f32, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0]),
            normals: None,
            instances: vec![batch(0, 3), batch(1, 1)],
        }
    }

    #[test]
    fn test_instanced_batches_become_instanced_nodes() {
        let sector = SectorGeometry {
            triangle_meshes: vec![mesh(1, true)],
            instance_meshes: vec![instanced_file()],
        };
        let group = SectorGeometryConsumer::new()
            .build_detailed_group(SectorId(6), &bounds(), &sector)
            .expect("group");
        assert_eq!(group.child_count(), 3);
        assert_eq!(group.meshes().len(), 1);

        let instanced = group.instanced_meshes();
        assert_eq!(instanced.len(), 2);
        assert_eq!(instanced[0].material, MaterialKind::Instanced);
        assert_eq!(instanced[0].instance_count(), 3);
        assert_eq!(&instanced[0].geometry.index[..], &[0, 1, 2]);
        assert_eq!(&instanced[1].geometry.index[..], &[2, 1, 0]);
        assert_eq!(instanced[1].triangle_offset, 1);
        assert_eq!(instanced[0].geometry.bounding_box, bounds());
        assert!(group.find_child("Instanced mesh 11@1").is_some());
    }

    #[test]
    fn test_instanced_only_sector_is_not_empty() {
        let sector = SectorGeometry {
            triangle_meshes: Vec::new(),
            instance_meshes: vec![instanced_file()],
        };
        let mut parent = SceneNode::group("model");
        assert!(SectorGeometryConsumer::new().consume_detailed(SectorId(9), &bounds(), &sector, &mut parent));
        assert_eq!(parent.instanced_meshes().len(), 2);
    }

    #[test]
    fn test_simple_sector_group_name() {
        let quads = SectorQuads {
            buffer: Arc::from(vec![0.0f32; 8]),
        };
        let mut parent = SceneNode::group("model");
        assert!(SectorGeometryConsumer::new().consume_simple(SectorId(4), &bounds(), &quads, &mut parent));
        assert!(parent.find_child("Quads 4").is_some());

        let empty = SectorQuads { buffer: Arc::from(Vec::<f32>::new()) };
        assert!(!SectorGeometryConsumer::new().consume_simple(SectorId(5), &bounds(), &empty, &mut parent));
        assert_eq!(parent.child_count(), 1);
    }
}
