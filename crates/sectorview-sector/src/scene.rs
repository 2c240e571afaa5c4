//! Minimal scene graph produced by sector consumption.

use std::sync::Arc;

use sectorview_core::math::{Aabb, Sphere};
use sectorview_core::types::FileId;

/// Shader family a mesh is drawn with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterialKind {
    /// Lit triangle meshes of detailed sectors.
    Detailed,
    /// Shared mesh geometry drawn once per instance transform.
    Instanced,
    /// Instanced quads of simple sectors.
    Simple,
}

/// Indexed geometry with per-vertex attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    pub index: Arc<[u32]>,
    /// Three floats per vertex.
    pub position: Arc<[f32]>,
    /// Three bytes per vertex, normalised to [0, 1] on upload.
    pub color: Arc<[u8]>,
    /// Three floats per vertex.
    pub normal: Arc<[f32]>,
    pub tree_index: Option<Arc<[f32]>>,
    pub bounding_box: Aabb,
    pub bounding_sphere: Sphere,
}

/// Interleaved vertex layout for upload. Must match the mesh vertex shader.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub color: [f32; 3],
    pub tree_index: f32,
}

impl Geometry {
    pub fn vertex_count(&self) -> usize {
        self.position.len() / 3
    }

    /// Interleave the attribute arrays. Missing attribute data reads as zero.
    pub fn to_gpu_vertices(&self) -> Vec<GpuVertex> {
        let attr3 = |data: &[f32], i: usize| -> [f32; 3] {
            data.get(3 * i..3 * i + 3)
                .map(|v| [v[0], v[1], v[2]])
                .unwrap_or_default()
        };
        (0..self.vertex_count())
            .map(|i| {
                let color = self
                    .color
                    .get(3 * i..3 * i + 3)
                    .map(|c| [c[0] as f32 / 255.0, c[1] as f32 / 255.0, c[2] as f32 / 255.0])
                    .unwrap_or_default();
                GpuVertex {
                    position: attr3(&self.position, i),
                    normal: attr3(&self.normal, i),
                    color,
                    tree_index: self
                        .tree_index
                        .as_ref()
                        .and_then(|t| t.get(i).copied())
                        .unwrap_or(0.0),
                }
            })
            .collect()
    }

    /// Interleaved vertices as raw bytes, ready for a vertex buffer.
    pub fn vertex_bytes(&self) -> Vec<u8> {
        bytemuck::cast_slice(&self.to_gpu_vertices()).to_vec()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeshNode {
    pub file_id: Option<FileId>,
    pub geometry: Geometry,
    pub material: MaterialKind,
}

/// One batch of instances over a shared triangle range. Per-vertex color
/// and tree index are empty; both come from the instance attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct InstancedMeshNode {
    pub file_id: FileId,
    pub triangle_offset: u64,
    pub geometry: Geometry,
    /// Column-major 4x4 transforms, sixteen floats per instance.
    pub instance_matrices: Arc<[f32]>,
    /// RGBA, four bytes per instance.
    pub instance_colors: Arc<[u8]>,
    pub instance_tree_indices: Arc<[f32]>,
    pub material: MaterialKind,
}

impl InstancedMeshNode {
    pub fn instance_count(&self) -> usize {
        self.instance_tree_indices.len()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuadsNode {
    pub instances: Arc<[f32]>,
    pub bounding_box: Aabb,
    pub material: MaterialKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Group,
    Mesh(Box<MeshNode>),
    InstancedMesh(Box<InstancedMeshNode>),
    Quads(QuadsNode),
}

/// Named node owning its children.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneNode {
    pub name: String,
    pub kind: NodeKind,
    children: Vec<SceneNode>,
}

impl SceneNode {
    pub fn group(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: NodeKind::Group,
            children: Vec::new(),
        }
    }

    pub fn mesh(name: impl Into<String>, mesh: MeshNode) -> Self {
        Self {
            name: name.into(),
            kind: NodeKind::Mesh(Box::new(mesh)),
            children: Vec::new(),
        }
    }

    pub fn instanced_mesh(name: impl Into<String>, mesh: InstancedMeshNode) -> Self {
        Self {
            name: name.into(),
            kind: NodeKind::InstancedMesh(Box::new(mesh)),
            children: Vec::new(),
        }
    }

    pub fn quads(name: impl Into<String>, quads: QuadsNode) -> Self {
        Self {
            name: name.into(),
            kind: NodeKind::Quads(quads),
            children: Vec::new(),
        }
    }

    pub fn add(&mut self, child: SceneNode) {
        self.children.push(child);
    }

    pub fn children(&self) -> &[SceneNode] {
        &self.children
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    pub fn find_child(&self, name: &str) -> Option<&SceneNode> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Detach and return the direct child named `name`.
    pub fn remove_child(&mut self, name: &str) -> Option<SceneNode> {
        let index = self.children.iter().position(|c| c.name == name)?;
        Some(self.children.remove(index))
    }

    pub fn as_mesh(&self) -> Option<&MeshNode> {
        match &self.kind {
            NodeKind::Mesh(mesh) => Some(mesh),
            _ => None,
        }
    }

    /// Mesh nodes in this subtree, depth first.
    pub fn meshes(&self) -> Vec<&MeshNode> {
        let mut out = Vec::new();
        self.collect_meshes(&mut out);
        out
    }

    fn collect_meshes<'a>(&'a self, out: &mut Vec<&'a MeshNode>) {
        if let NodeKind::Mesh(mesh) = &self.kind {
            out.push(mesh);
        }
        for child in &self.children {
            child.collect_meshes(out);
        }
    }

    /// Instanced mesh nodes in this subtree, depth first.
    pub fn instanced_meshes(&self) -> Vec<&InstancedMeshNode> {
        let mut out = Vec::new();
        self.collect_instanced(&mut out);
        out
    }

    fn collect_instanced<'a>(&'a self, out: &mut Vec<&'a InstancedMeshNode>) {
        if let NodeKind::InstancedMesh(mesh) = &self.kind {
            out.push(mesh);
        }
        for child in &self.children {
            child.collect_instanced(out);
        }
    }
}
