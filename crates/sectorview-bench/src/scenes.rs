use std::sync::Arc;

use glam::Vec3;
use sectorview_core::math::Aabb;
use sectorview_core::types::{FileId, LevelOfDetail, SectorId};
use sectorview_sector::fixtures::{encode_index_file, encode_mesh_file, InMemoryFileProvider};
use sectorview_sector::{
    MeshFileGeometry, RawInstanceMeshes, RawSectorMeshes, RawTriangleMeshes, SectorMetadata, TriangleMesh, WantedSector,
};

/// What a scene exercises.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Workload {
    /// Bound setter calls on one clipper, each recomputing all planes.
    ClipperUpdates,
    /// Consume one detailed sector with `size` meshes over `size / 4` files.
    ConsumeSector,
    /// Merge `size` raw meshes into per-file meshes.
    MergeMeshes,
    /// Batch `size` raw instances by file and triangle offset.
    MergeInstances,
    /// Fenced readback of a `size` x `size` RGBA8 rectangle.
    SoftwareReadback,
    /// Decode a `size` x `size` coverage image and prioritise sectors.
    CoverageDecode,
    /// Load `size` detailed sectors through a cold repository.
    RepositoryLoad,
}

/// Configuration for a single benchmark scene.
pub struct SceneConfig {
    pub name: &'static str,
    pub workload: Workload,
    pub size: u32,
}

/// Return the standard suite of benchmark scenes.
pub fn standard_scenes() -> Vec<SceneConfig> {
    vec![
        SceneConfig {
            name: "clipper-10K",
            workload: Workload::ClipperUpdates,
            size: 10_000,
        },
        SceneConfig {
            name: "consume-256",
            workload: Workload::ConsumeSector,
            size: 256,
        },
        SceneConfig {
            name: "merge-1K",
            workload: Workload::MergeMeshes,
            size: 1_000,
        },
        SceneConfig {
            name: "instances-4K",
            workload: Workload::MergeInstances,
            size: 4_000,
        },
        SceneConfig {
            name: "readback-256",
            workload: Workload::SoftwareReadback,
            size: 256,
        },
        SceneConfig {
            name: "readback-1024",
            workload: Workload::SoftwareReadback,
            size: 1_024,
        },
        SceneConfig {
            name: "coverage-512",
            workload: Workload::CoverageDecode,
            size: 512,
        },
        SceneConfig {
            name: "repository-64",
            workload: Workload::RepositoryLoad,
            size: 64,
        },
    ]
}

/// Triangles per generated mesh.
const TRIANGLES_PER_MESH: u32 = 32;

/// A strip of `triangles` triangles with one vertex per index.
pub fn generate_mesh_file(triangles: u32, seed: u32) -> MeshFileGeometry {
    let vertex_count = triangles * 3;
    let vertices: Vec<f32> = (0..vertex_count)
        .flat_map(|v| {
            let t = (v + seed) as f32;
            [t.sin(), t.cos(), (t * 0.1).fract()]
        })
        .collect();
    MeshFileGeometry {
        indices: (0..vertex_count).collect::<Vec<u32>>().into(),
        vertices: vertices.into(),
        normals: None,
    }
}

/// `mesh_count` meshes spread round-robin over `file_count` files.
pub fn generate_raw_meshes(mesh_count: u32, file_count: u32) -> RawTriangleMeshes {
    let file_count = file_count.max(1);
    RawTriangleMeshes {
        file_ids: (0..mesh_count).map(|m| FileId((m % file_count) as u64)).collect(),
        tree_indices: (0..mesh_count).collect(),
        colors: (0..mesh_count)
            .flat_map(|m| [(m % 256) as u8, (m / 256 % 256) as u8, 128, 255])
            .collect(),
        triangle_counts: vec![TRIANGLES_PER_MESH; mesh_count as usize],
    }
}

/// Mesh files sized so every mesh of `raw` fits its file.
pub fn mesh_files_for(raw: &RawTriangleMeshes) -> std::collections::HashMap<String, MeshFileGeometry> {
    let mut triangles: std::collections::HashMap<FileId, u32> = std::collections::HashMap::new();
    for (i, file_id) in raw.file_ids.iter().enumerate() {
        *triangles.entry(*file_id).or_insert(0) += raw.triangle_counts[i];
    }
    triangles
        .into_iter()
        .map(|(file_id, count)| (file_id.mesh_file_name(), generate_mesh_file(count, file_id.0 as u32)))
        .collect()
}

/// Distinct triangle ranges per instanced mesh file.
const BATCHES_PER_INSTANCED_FILE: u32 = 4;

/// `instance_count` instances spread round-robin over `file_count` files,
/// each file cycling through its triangle ranges.
pub fn generate_raw_instances(instance_count: u32, file_count: u32) -> RawInstanceMeshes {
    let file_count = file_count.max(1);
    let mut raw = RawInstanceMeshes::default();
    for i in 0..instance_count {
        let batch = (i / file_count) % BATCHES_PER_INSTANCED_FILE;
        raw.file_ids.push(FileId((i % file_count) as u64));
        raw.tree_indices.push(i);
        raw.colors.extend_from_slice(&[(i % 256) as u8, 64, 192, 255]);
        raw.triangle_counts.push(TRIANGLES_PER_MESH);
        raw.triangle_offsets.push(u64::from(batch * TRIANGLES_PER_MESH));
        let t = i as f32;
        raw.instance_matrices.extend_from_slice(&[
            1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, t, 0.0, -t, 1.0,
        ]);
    }
    raw
}

/// Shared mesh files holding every triangle range of `generate_raw_instances`.
pub fn instanced_files(file_count: u32) -> std::collections::HashMap<String, MeshFileGeometry> {
    (0..file_count.max(1))
        .map(|f| {
            let file_id = FileId(f as u64);
            let geometry = generate_mesh_file(TRIANGLES_PER_MESH * BATCHES_PER_INSTANCED_FILE, f);
            (file_id.mesh_file_name(), geometry)
        })
        .collect()
}

/// Triangle meshes for consumption, four meshes per file id.
pub fn generate_triangle_meshes(mesh_count: u32) -> Vec<TriangleMesh> {
    (0..mesh_count)
        .map(|m| {
            let file = generate_mesh_file(TRIANGLES_PER_MESH, m);
            let vertex_count = file.vertices.len() / 3;
            TriangleMesh {
                file_id: FileId((m / 4) as u64),
                indices: file.indices,
                vertices: file.vertices,
                colors: vec![200u8; vertex_count * 3].into(),
                normals: None,
                tree_indices: Some(vec![m as f32; vertex_count].into()),
            }
        })
        .collect()
}

pub fn sector_bounds(index: u32) -> Aabb {
    let min = Vec3::new(index as f32 * 10.0, 0.0, 0.0);
    Aabb::new(min, min + Vec3::splat(10.0))
}

/// Provider holding `sector_count` detailed sectors, plus the requests
/// that load them.
pub fn generate_model(blob_url: &str, sector_count: u32) -> (InMemoryFileProvider, Vec<WantedSector>) {
    let mut provider = InMemoryFileProvider::default();
    let mut wanted = Vec::with_capacity(sector_count as usize);

    for id in 0..sector_count {
        let raw = generate_raw_meshes(16, 4);
        let files = mesh_files_for(&raw);
        let index_file = format!("sector_{id}.i3d");
        provider.insert(blob_url, &index_file, encode_index_file(&RawSectorMeshes::from(raw)));

        let mut peripheral_files: Vec<String> = files.keys().cloned().collect();
        peripheral_files.sort();
        for (name, geometry) in &files {
            provider.insert(blob_url, name, encode_mesh_file(geometry));
        }

        let metadata = SectorMetadata {
            id: SectorId(id),
            bounds: sector_bounds(id),
            index_file,
            peripheral_files,
            faces_file: None,
        };
        wanted.push(WantedSector::new(blob_url, Arc::new(metadata), LevelOfDetail::Detailed));
    }

    (provider, wanted)
}

/// RGBA8 coverage image with a band of sectors across the middle.
pub fn generate_coverage_image(size: u32) -> Vec<u8> {
    let mut pixels = vec![255u8; (size * size * 4) as usize];
    for y in size / 4..size * 3 / 4 {
        for x in 0..size {
            let id = x / 16 + (y / 16) * 64;
            let i = ((y * size + x) * 4) as usize;
            pixels[i] = (id / (255 * 255)) as u8;
            pixels[i + 1] = (id / 255 % 255) as u8;
            pixels[i + 2] = (id % 255) as u8;
            pixels[i + 3] = (x % 200) as u8;
        }
    }
    pixels
}
