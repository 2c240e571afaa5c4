//! In-memory file provider and a plain binary sector format.
//!
//! Used by tests and the benchmark runner to drive [`CachedRepository`]
//! without a network or the production decoders. The format is a magic
//! tag, `u32` counts, then raw native-endian arrays.
//!
//! [`CachedRepository`]: crate::repository::CachedRepository

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

use sectorview_core::types::FileId;

use crate::error::SectorError;
use sectorview_core::constants::{INSTANCE_MATRIX_FLOATS, RAW_MESH_COLOR_BYTES};

use crate::merge::{MeshFileGeometry, RawInstanceMeshes, RawSectorMeshes, RawTriangleMeshes};
use crate::repository::{BinaryFileProvider, SectorDecoder};
use crate::sector::SectorQuads;

const INDEX_MAGIC: &[u8; 4] = b"SVI1";
const MESH_MAGIC: &[u8; 4] = b"SVM1";
const QUADS_MAGIC: &[u8; 4] = b"SVQ1";

type FileKey = (String, String);

fn file_key(base_url: &str, file_name: &str) -> FileKey {
    (base_url.to_string(), file_name.to_string())
}

/// Files held in memory, with per-file request counters and scripted
/// transient failures.
#[derive(Default)]
pub struct InMemoryFileProvider {
    files: HashMap<FileKey, Vec<u8>>,
    requests: RefCell<HashMap<FileKey, usize>>,
    pending_failures: RefCell<HashMap<FileKey, u32>>,
}

impl InMemoryFileProvider {
    pub fn insert(&mut self, base_url: &str, file_name: &str, bytes: Vec<u8>) {
        self.files.insert(file_key(base_url, file_name), bytes);
    }

    /// Make the next `count` requests for a file fail.
    pub fn fail_next(&mut self, base_url: &str, file_name: &str, count: u32) {
        self.pending_failures
            .get_mut()
            .insert(file_key(base_url, file_name), count);
    }

    pub fn request_count(&self, base_url: &str, file_name: &str) -> usize {
        self.requests
            .borrow()
            .get(&file_key(base_url, file_name))
            .copied()
            .unwrap_or(0)
    }

    pub fn total_requests(&self) -> usize {
        self.requests.borrow().values().sum()
    }
}

impl BinaryFileProvider for InMemoryFileProvider {
    fn get_binary_file(&self, base_url: &str, file_name: &str) -> Result<Vec<u8>, SectorError> {
        let key = file_key(base_url, file_name);
        *self.requests.borrow_mut().entry(key.clone()).or_insert(0) += 1;

        if let Some(remaining) = self.pending_failures.borrow_mut().get_mut(&key) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(SectorError::Fetch {
                    file: file_name.to_string(),
                    reason: "simulated transient failure".to_string(),
                });
            }
        }

        self.files.get(&key).cloned().ok_or_else(|| SectorError::Fetch {
            file: file_name.to_string(),
            reason: format!("not found under {base_url}"),
        })
    }
}

fn push_array<T: bytemuck::Pod>(out: &mut Vec<u8>, values: &[T]) {
    out.extend_from_slice(bytemuck::cast_slice(values));
}

fn push_len(out: &mut Vec<u8>, len: usize) {
    push_array(out, &[len as u32]);
}

fn push_file_ids(out: &mut Vec<u8>, file_ids: &[FileId]) {
    let ids: Vec<u64> = file_ids.iter().map(|id| id.0).collect();
    push_array(out, &ids);
}

/// Triangle table, then instance table, each led by its row count.
pub fn encode_index_file(raw: &RawSectorMeshes) -> Vec<u8> {
    let triangles = &raw.triangle_meshes;
    let instances = &raw.instance_meshes;
    let mut out = INDEX_MAGIC.to_vec();

    push_len(&mut out, triangles.len());
    push_file_ids(&mut out, &triangles.file_ids);
    push_array(&mut out, &triangles.tree_indices);
    push_array(&mut out, &triangles.triangle_counts);
    push_array(&mut out, &triangles.colors);

    push_len(&mut out, instances.len());
    push_file_ids(&mut out, &instances.file_ids);
    push_array(&mut out, &instances.tree_indices);
    push_array(&mut out, &instances.triangle_counts);
    push_array(&mut out, &instances.triangle_offsets);
    push_array(&mut out, &instances.colors);
    push_array(&mut out, &instances.instance_matrices);
    out
}

pub fn encode_mesh_file(geometry: &MeshFileGeometry) -> Vec<u8> {
    let normals: &[f32] = geometry.normals.as_deref().unwrap_or(&[]);
    let mut out = MESH_MAGIC.to_vec();
    push_len(&mut out, geometry.indices.len());
    push_len(&mut out, geometry.vertices.len());
    push_len(&mut out, normals.len());
    push_array(&mut out, &geometry.indices[..]);
    push_array(&mut out, &geometry.vertices[..]);
    push_array(&mut out, normals);
    out
}

pub fn encode_quads(buffer: &[f32]) -> Vec<u8> {
    let mut out = QUADS_MAGIC.to_vec();
    push_len(&mut out, buffer.len());
    push_array(&mut out, buffer);
    out
}

/// Sequential reader over one file's bytes.
struct Reader<'a> {
    file: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(file: &'a str, bytes: &'a [u8], magic: &[u8; 4]) -> Result<Self, SectorError> {
        let mut reader = Self { file, bytes, pos: 0 };
        if reader.take(4)? != magic {
            return Err(reader.error("bad magic"));
        }
        Ok(reader)
    }

    fn error(&self, reason: impl Into<String>) -> SectorError {
        SectorError::Decode {
            file: self.file.to_string(),
            reason: reason.into(),
        }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], SectorError> {
        let end = self.pos.checked_add(len).filter(|&end| end <= self.bytes.len());
        let Some(end) = end else {
            return Err(self.error(format!(
                "truncated: need {len} bytes at offset {}, have {}",
                self.pos,
                self.bytes.len()
            )));
        };
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_array<T: bytemuck::Pod>(&mut self, count: usize) -> Result<Vec<T>, SectorError> {
        let size = std::mem::size_of::<T>();
        let bytes = self.take(count.saturating_mul(size))?;
        Ok(bytes.chunks_exact(size).map(bytemuck::pod_read_unaligned).collect())
    }

    fn read_len(&mut self) -> Result<usize, SectorError> {
        let bytes = self.take(4)?;
        Ok(bytemuck::pod_read_unaligned::<u32>(bytes) as usize)
    }

    fn read_file_ids(&mut self, count: usize) -> Result<Vec<FileId>, SectorError> {
        Ok(self.read_array::<u64>(count)?.into_iter().map(FileId).collect())
    }

    fn finish(self) -> Result<(), SectorError> {
        if self.pos != self.bytes.len() {
            return Err(self.error(format!("{} trailing bytes", self.bytes.len() - self.pos)));
        }
        Ok(())
    }
}

/// Decoder for the fixture format written by the `encode_*` functions.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixtureDecoder;

impl SectorDecoder for FixtureDecoder {
    fn decode_index_file(&self, file_name: &str, bytes: &[u8]) -> Result<RawSectorMeshes, SectorError> {
        let mut reader = Reader::new(file_name, bytes, INDEX_MAGIC)?;

        let n = reader.read_len()?;
        let triangle_meshes = RawTriangleMeshes {
            file_ids: reader.read_file_ids(n)?,
            tree_indices: reader.read_array(n)?,
            triangle_counts: reader.read_array(n)?,
            colors: reader.read_array(n.saturating_mul(RAW_MESH_COLOR_BYTES))?,
        };

        let m = reader.read_len()?;
        let instance_meshes = RawInstanceMeshes {
            file_ids: reader.read_file_ids(m)?,
            tree_indices: reader.read_array(m)?,
            triangle_counts: reader.read_array(m)?,
            triangle_offsets: reader.read_array(m)?,
            colors: reader.read_array(m.saturating_mul(RAW_MESH_COLOR_BYTES))?,
            instance_matrices: reader.read_array(m.saturating_mul(INSTANCE_MATRIX_FLOATS))?,
        };

        reader.finish()?;
        Ok(RawSectorMeshes {
            triangle_meshes,
            instance_meshes,
        })
    }

    fn decode_mesh_file(&self, file_name: &str, bytes: &[u8]) -> Result<MeshFileGeometry, SectorError> {
        let mut reader = Reader::new(file_name, bytes, MESH_MAGIC)?;
        let index_count = reader.read_len()?;
        let vertex_floats = reader.read_len()?;
        let normal_floats = reader.read_len()?;
        let indices: Vec<u32> = reader.read_array(index_count)?;
        let vertices: Vec<f32> = reader.read_array(vertex_floats)?;
        let normals: Vec<f32> = reader.read_array(normal_floats)?;
        reader.finish()?;
        Ok(MeshFileGeometry {
            indices: indices.into(),
            vertices: vertices.into(),
            normals: (!normals.is_empty()).then(|| Arc::from(normals)),
        })
    }

    fn decode_quads(&self, file_name: &str, bytes: &[u8]) -> Result<SectorQuads, SectorError> {
        let mut reader = Reader::new(file_name, bytes, QUADS_MAGIC)?;
        let count = reader.read_len()?;
        let buffer: Vec<f32> = reader.read_array(count)?;
        reader.finish()?;
        Ok(SectorQuads {
            buffer: buffer.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mesh_file_decodes_what_was_encoded() {
        let geometry = MeshFileGeometry {
            indices: Arc::from(vec![0u32, 2, 1]),
            vertices: Arc::from(vec![0.5f32; 9]),
            normals: Some(Arc::from(vec![0.0f32, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0])),
        };
        let decoded = FixtureDecoder
            .decode_mesh_file("mesh_1.ctm", &encode_mesh_file(&geometry))
            .expect("decode");
        assert_eq!(decoded, geometry);
    }

    #[test]
    fn test_truncated_index_file_rejected() {
        let raw = RawTriangleMeshes {
            file_ids: vec![FileId(1)],
            tree_indices: vec![2],
            colors: vec![1, 2, 3, 4],
            triangle_counts: vec![5],
        };
        let bytes = encode_index_file(&RawSectorMeshes::from(raw));
        let err = FixtureDecoder
            .decode_index_file("sector.i3d", &bytes[..bytes.len() - 1])
            .unwrap_err();
        assert!(matches!(err, SectorError::Decode { .. }));
    }

    #[test]
    fn test_index_file_carries_instance_table() {
        let raw = RawSectorMeshes {
            triangle_meshes: RawTriangleMeshes::default(),
            instance_meshes: RawInstanceMeshes {
                file_ids: vec![FileId(8)],
                tree_indices: vec![3],
                colors: vec![1, 2, 3, 4],
                triangle_counts: vec![6],
                triangle_offsets: vec![12],
                instance_matrices: (0..16).map(|i| i as f32).collect(),
            },
        };
        let decoded = FixtureDecoder
            .decode_index_file("sector.i3d", &encode_index_file(&raw))
            .expect("decode");
        assert_eq!(decoded, raw);
    }

    #[test]
    fn test_huge_row_count_is_truncation_not_overflow() {
        let mut bytes = INDEX_MAGIC.to_vec();
        push_len(&mut bytes, u32::MAX as usize);
        let err = FixtureDecoder.decode_index_file("sector.i3d", &bytes).unwrap_err();
        assert!(matches!(err, SectorError::Decode { ref reason, .. } if reason.starts_with("truncated")));
    }

    #[test]
    fn test_wrong_magic_rejected() {
        let bytes = encode_quads(&[1.0]);
        assert!(FixtureDecoder.decode_mesh_file("q", &bytes).is_err());
    }

    #[test]
    fn test_scripted_failures_then_recovery() {
        let mut provider = InMemoryFileProvider::default();
        provider.insert("u", "f", vec![7]);
        provider.fail_next("u", "f", 1);
        assert!(provider.get_binary_file("u", "f").is_err());
        assert_eq!(provider.get_binary_file("u", "f"), Ok(vec![7]));
        assert_eq!(provider.request_count("u", "f"), 2);
        assert!(provider.get_binary_file("u", "missing").is_err());
        assert_eq!(provider.total_requests(), 3);
    }
}
