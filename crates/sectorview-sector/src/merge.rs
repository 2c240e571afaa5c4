use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use sectorview_core::constants::{
    INSTANCE_MATRIX_FLOATS, RAW_MESH_COLOR_BYTES, VEC3_COMPONENTS, VERTEX_COLOR_BYTES,
};
use sectorview_core::types::{FileId, TreeIndex};

use crate::error::SectorError;
use crate::sector::{InstancedMesh, InstancedMeshFile, TriangleMesh};

/// Per-mesh table from a sector's index file.
///
/// Meshes of the same file are stored back to back in that file's index
/// buffer, in the order they appear here.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawTriangleMeshes {
    pub file_ids: Vec<FileId>,
    pub tree_indices: Vec<TreeIndex>,
    /// RGBA, four bytes per mesh.
    pub colors: Vec<u8>,
    pub triangle_counts: Vec<u32>,
}

impl RawTriangleMeshes {
    pub fn len(&self) -> usize {
        self.file_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.file_ids.is_empty()
    }

    fn check_lengths(&self) -> Result<(), SectorError> {
        let n = self.len();
        if self.tree_indices.len() != n
            || self.triangle_counts.len() != n
            || self.colors.len() != n * RAW_MESH_COLOR_BYTES
        {
            return Err(SectorError::MalformedMesh {
                file_id: self.file_ids.first().copied().unwrap_or_default(),
                reason: format!(
                    "mesh table columns disagree: {} file ids, {} tree indices, {} triangle counts, {} color bytes",
                    n,
                    self.tree_indices.len(),
                    self.triangle_counts.len(),
                    self.colors.len()
                ),
            });
        }
        Ok(())
    }
}

/// Per-instance table from a sector's index file.
///
/// Each row places a triangle range of a shared mesh file with its own
/// transform. Rows with the same file and triangle offset draw the same
/// geometry and are batched together.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawInstanceMeshes {
    pub file_ids: Vec<FileId>,
    pub tree_indices: Vec<TreeIndex>,
    /// RGBA, four bytes per instance.
    pub colors: Vec<u8>,
    pub triangle_counts: Vec<u32>,
    /// First triangle of the instanced range within the mesh file.
    pub triangle_offsets: Vec<u64>,
    /// Column-major 4x4 transforms, sixteen floats per instance.
    pub instance_matrices: Vec<f32>,
}

impl RawInstanceMeshes {
    pub fn len(&self) -> usize {
        self.file_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.file_ids.is_empty()
    }

    fn check_lengths(&self) -> Result<(), SectorError> {
        let n = self.len();
        if self.tree_indices.len() != n
            || self.triangle_counts.len() != n
            || self.triangle_offsets.len() != n
            || self.colors.len() != n * RAW_MESH_COLOR_BYTES
            || self.instance_matrices.len() != n * INSTANCE_MATRIX_FLOATS
        {
            return Err(SectorError::MalformedMesh {
                file_id: self.file_ids.first().copied().unwrap_or_default(),
                reason: format!(
                    "instance table columns disagree: {} file ids, {} tree indices, {} triangle counts, \
                     {} triangle offsets, {} color bytes, {} matrix floats",
                    n,
                    self.tree_indices.len(),
                    self.triangle_counts.len(),
                    self.triangle_offsets.len(),
                    self.colors.len(),
                    self.instance_matrices.len()
                ),
            });
        }
        Ok(())
    }
}

/// Both mesh tables of a detailed sector's index file.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawSectorMeshes {
    pub triangle_meshes: RawTriangleMeshes,
    pub instance_meshes: RawInstanceMeshes,
}

impl From<RawTriangleMeshes> for RawSectorMeshes {
    fn from(triangle_meshes: RawTriangleMeshes) -> Self {
        Self {
            triangle_meshes,
            instance_meshes: RawInstanceMeshes::default(),
        }
    }
}

/// Decoded geometry of one `mesh_<id>.ctm` file.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshFileGeometry {
    pub indices: Arc<[u32]>,
    pub vertices: Arc<[f32]>,
    pub normals: Option<Arc<[f32]>>,
}

/// Positions of equal keys, groups in order of first appearance.
fn group_by_key<K: Copy + Eq + Hash>(keys: impl IntoIterator<Item = K>) -> Vec<(K, Vec<usize>)> {
    let mut groups: Vec<(K, Vec<usize>)> = Vec::new();
    let mut slot: HashMap<K, usize> = HashMap::new();
    for (position, key) in keys.into_iter().enumerate() {
        let index = *slot.entry(key).or_insert_with(|| {
            groups.push((key, Vec::new()));
            groups.len() - 1
        });
        groups[index].1.push(position);
    }
    groups
}

fn group_by_file(file_ids: &[FileId]) -> Vec<(FileId, Vec<usize>)> {
    group_by_key(file_ids.iter().copied())
}

fn mesh_file<'a>(
    files: &'a HashMap<String, MeshFileGeometry>,
    file_id: FileId,
) -> Result<&'a MeshFileGeometry, SectorError> {
    files
        .get(&file_id.mesh_file_name())
        .ok_or(SectorError::MissingMeshFile(file_id))
}

/// Merge the meshes of a sector into one [`TriangleMesh`] per mesh file.
///
/// Each file's index buffer is split into consecutive triangle ranges,
/// one per mesh, and every vertex those triangles touch is painted with
/// the owning mesh's RGB color and tree index. `files` is keyed by file
/// name as produced by [`FileId::mesh_file_name`].
pub fn merge_triangle_meshes_by_file(
    raw: &RawTriangleMeshes,
    files: &HashMap<String, MeshFileGeometry>,
) -> Result<Vec<TriangleMesh>, SectorError> {
    raw.check_lengths()?;

    let mut merged = Vec::new();
    for (file_id, meshes) in group_by_file(&raw.file_ids) {
        let file = mesh_file(files, file_id)?;
        let vertex_count = file.vertices.len() / VEC3_COMPONENTS;
        let triangle_total = file.indices.len() / 3;

        let mut colors = vec![0u8; VERTEX_COLOR_BYTES * vertex_count];
        let mut tree_indices = vec![0f32; vertex_count];

        let mut offset = 0usize;
        for mesh in meshes {
            let count = raw.triangle_counts[mesh] as usize;
            if offset + count > triangle_total {
                return Err(SectorError::MalformedMesh {
                    file_id,
                    reason: format!(
                        "triangles {}..{} exceed the file's {triangle_total} triangles",
                        offset,
                        offset + count
                    ),
                });
            }

            let rgba = &raw.colors[RAW_MESH_COLOR_BYTES * mesh..RAW_MESH_COLOR_BYTES * (mesh + 1)];
            let tree_index = raw.tree_indices[mesh] as f32;
            for &vertex in &file.indices[3 * offset..3 * (offset + count)] {
                let v = vertex as usize;
                if v >= vertex_count {
                    return Err(SectorError::MalformedMesh {
                        file_id,
                        reason: format!("index {v} out of range for {vertex_count} vertices"),
                    });
                }
                colors[VERTEX_COLOR_BYTES * v..VERTEX_COLOR_BYTES * (v + 1)].copy_from_slice(&rgba[..3]);
                tree_indices[v] = tree_index;
            }
            offset += count;
        }

        merged.push(TriangleMesh {
            file_id,
            indices: file.indices.clone(),
            vertices: file.vertices.clone(),
            colors: colors.into(),
            normals: file.normals.clone(),
            tree_indices: Some(tree_indices.into()),
        });
    }

    log::debug!(
        "Merged {} meshes into {} file meshes",
        raw.len(),
        merged.len()
    );
    Ok(merged)
}

/// Merge a sector's instance table into one [`InstancedMeshFile`] per
/// mesh file.
///
/// Within a file, instances sharing a triangle offset are batched into
/// one [`InstancedMesh`] holding their transforms, RGBA colors and tree
/// indices in table order. The batch's triangle count is taken from its
/// first instance.
pub fn merge_instance_meshes_by_file(
    raw: &RawInstanceMeshes,
    files: &HashMap<String, MeshFileGeometry>,
) -> Result<Vec<InstancedMeshFile>, SectorError> {
    raw.check_lengths()?;

    let mut merged = Vec::new();
    for (file_id, meshes) in group_by_file(&raw.file_ids) {
        let file = mesh_file(files, file_id)?;
        let triangle_total = (file.indices.len() / 3) as u64;

        let batches = group_by_key(meshes.iter().map(|&mesh| raw.triangle_offsets[mesh]));
        let mut instances = Vec::with_capacity(batches.len());
        for (triangle_offset, members) in batches {
            let triangle_count = raw.triangle_counts[meshes[members[0]]];
            if triangle_offset + u64::from(triangle_count) > triangle_total {
                return Err(SectorError::MalformedMesh {
                    file_id,
                    reason: format!(
                        "instanced triangles {}..{} exceed the file's {triangle_total} triangles",
                        triangle_offset,
                        triangle_offset + u64::from(triangle_count)
                    ),
                });
            }

            let mut instance_matrices = Vec::with_capacity(INSTANCE_MATRIX_FLOATS * members.len());
            let mut colors = Vec::with_capacity(RAW_MESH_COLOR_BYTES * members.len());
            let mut tree_indices = Vec::with_capacity(members.len());
            for member in members {
                let mesh = meshes[member];
                instance_matrices.extend_from_slice(
                    &raw.instance_matrices[INSTANCE_MATRIX_FLOATS * mesh..INSTANCE_MATRIX_FLOATS * (mesh + 1)],
                );
                colors.extend_from_slice(&raw.colors[RAW_MESH_COLOR_BYTES * mesh..RAW_MESH_COLOR_BYTES * (mesh + 1)]);
                tree_indices.push(raw.tree_indices[mesh] as f32);
            }

            instances.push(InstancedMesh {
                triangle_count,
                triangle_offset,
                instance_matrices: instance_matrices.into(),
                colors: colors.into(),
                tree_indices: tree_indices.into(),
            });
        }

        merged.push(InstancedMeshFile {
            file_id,
            indices: file.indices.clone(),
            vertices: file.vertices.clone(),
            normals: file.normals.clone(),
            instances,
        });
    }

    log::debug!(
        "Merged {} instances into {} instanced mesh files",
        raw.len(),
        merged.len()
    );
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two triangles sharing no vertices.
    fn two_triangle_file() -> MeshFileGeometry {
        MeshFileGeometry {
            indices: Arc::from(vec![0u32, 1, 2, 3, 4, 5]),
            vertices: Arc::from(vec![0.0f32; 18]),
            normals: None,
        }
    }

    fn files(ids: &[u64]) -> HashMap<String, MeshFileGeometry> {
        ids.iter()
            .map(|&id| (FileId(id).mesh_file_name(), two_triangle_file()))
            .collect()
    }

    #[test]
    fn test_groups_keep_first_appearance_order() {
        let groups = group_by_file(&[FileId(9), FileId(2), FileId(9), FileId(5), FileId(2)]);
        let order: Vec<u64> = groups.iter().map(|(id, _)| id.0).collect();
        assert_eq!(order, vec![9, 2, 5]);
        assert_eq!(groups[0].1, vec![0, 2]);
        assert_eq!(groups[1].1, vec![1, 4]);
    }

    #[test]
    fn test_meshes_paint_their_triangle_ranges() {
        let raw = RawTriangleMeshes {
            file_ids: vec![FileId(1), FileId(1)],
            tree_indices: vec![10, 20],
            colors: vec![255, 0, 0, 255, 0, 0, 255, 255],
            triangle_counts: vec![1, 1],
        };
        let merged = merge_triangle_meshes_by_file(&raw, &files(&[1])).expect("merge");
        assert_eq!(merged.len(), 1);

        let mesh = &merged[0];
        assert_eq!(&mesh.colors[0..9], &[255, 0, 0, 255, 0, 0, 255, 0, 0]);
        assert_eq!(&mesh.colors[9..18], &[0, 0, 255, 0, 0, 255, 0, 0, 255]);
        let trees = mesh.tree_indices.as_ref().expect("tree indices");
        assert_eq!(&trees[..], &[10.0, 10.0, 10.0, 20.0, 20.0, 20.0]);
    }

    #[test]
    fn test_one_mesh_per_file() {
        let raw = RawTriangleMeshes {
            file_ids: vec![FileId(1), FileId(2), FileId(1)],
            tree_indices: vec![0, 1, 2],
            colors: vec![0; 12],
            triangle_counts: vec![1, 2, 1],
        };
        let merged = merge_triangle_meshes_by_file(&raw, &files(&[1, 2])).expect("merge");
        let ids: Vec<FileId> = merged.iter().map(|m| m.file_id).collect();
        assert_eq!(ids, vec![FileId(1), FileId(2)]);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let raw = RawTriangleMeshes {
            file_ids: vec![FileId(4)],
            tree_indices: vec![0],
            colors: vec![0; 4],
            triangle_counts: vec![1],
        };
        let err = merge_triangle_meshes_by_file(&raw, &files(&[1])).unwrap_err();
        assert_eq!(err, SectorError::MissingMeshFile(FileId(4)));
    }

    #[test]
    fn test_triangle_overrun_is_malformed() {
        let raw = RawTriangleMeshes {
            file_ids: vec![FileId(1)],
            tree_indices: vec![0],
            colors: vec![0; 4],
            triangle_counts: vec![3],
        };
        let err = merge_triangle_meshes_by_file(&raw, &files(&[1])).unwrap_err();
        assert!(matches!(err, SectorError::MalformedMesh { file_id: FileId(1), .. }));
    }

    #[test]
    fn test_column_mismatch_is_malformed() {
        let raw = RawTriangleMeshes {
            file_ids: vec![FileId(1)],
            tree_indices: vec![],
            colors: vec![0; 4],
            triangle_counts: vec![1],
        };
        assert!(merge_triangle_meshes_by_file(&raw, &files(&[1])).is_err());
    }

    fn matrix(tag: f32) -> [f32; 16] {
        let mut m = [0.0f32; 16];
        m[0] = 1.0;
        m[5] = 1.0;
        m[10] = 1.0;
        m[15] = 1.0;
        m[12] = tag;
        m
    }

    fn instance_table(rows: &[(u64, u64, u32)]) -> RawInstanceMeshes {
        let mut raw = RawInstanceMeshes::default();
        for (i, &(file_id, offset, count)) in rows.iter().enumerate() {
            raw.file_ids.push(FileId(file_id));
            raw.tree_indices.push(100 + i as u32);
            raw.colors.extend_from_slice(&[i as u8, 0, 0, 255]);
            raw.triangle_counts.push(count);
            raw.triangle_offsets.push(offset);
            raw.instance_matrices.extend_from_slice(&matrix(i as f32));
        }
        raw
    }

    #[test]
    fn test_instances_batch_by_file_then_offset() {
        let raw = instance_table(&[(1, 1, 1), (2, 0, 2), (1, 0, 1), (1, 1, 1)]);
        let merged = merge_instance_meshes_by_file(&raw, &files(&[1, 2])).expect("merge");

        let ids: Vec<FileId> = merged.iter().map(|f| f.file_id).collect();
        assert_eq!(ids, vec![FileId(1), FileId(2)]);

        let file_one = &merged[0];
        let offsets: Vec<u64> = file_one.instances.iter().map(|i| i.triangle_offset).collect();
        assert_eq!(offsets, vec![1, 0]);

        let batch = &file_one.instances[0];
        assert_eq!(batch.instance_count(), 2);
        assert_eq!(batch.triangle_count, 1);
        assert_eq!(&batch.tree_indices[..], &[100.0, 103.0]);
        assert_eq!(&batch.colors[..], &[0, 0, 0, 255, 3, 0, 0, 255]);
        assert_eq!(batch.instance_matrices[12], 0.0);
        assert_eq!(batch.instance_matrices[16 + 12], 3.0);

        assert_eq!(merged[1].instances.len(), 1);
        assert_eq!(merged[1].instances[0].triangle_count, 2);
        assert_eq!(&merged[1].indices[..], &[0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_instance_range_overrun_is_malformed() {
        let raw = instance_table(&[(1, 1, 2)]);
        let err = merge_instance_meshes_by_file(&raw, &files(&[1])).unwrap_err();
        assert!(matches!(err, SectorError::MalformedMesh { file_id: FileId(1), .. }));
    }

    #[test]
    fn test_instance_missing_file_and_bad_columns() {
        let raw = instance_table(&[(7, 0, 1)]);
        assert_eq!(
            merge_instance_meshes_by_file(&raw, &files(&[1])).unwrap_err(),
            SectorError::MissingMeshFile(FileId(7))
        );

        let mut short = instance_table(&[(1, 0, 1)]);
        short.instance_matrices.truncate(15);
        assert!(matches!(
            merge_instance_meshes_by_file(&short, &files(&[1])),
            Err(SectorError::MalformedMesh { .. })
        ));
    }
}
