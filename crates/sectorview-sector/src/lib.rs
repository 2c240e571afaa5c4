pub mod cache;
pub mod consumer;
pub mod error;
pub mod fixtures;
pub mod merge;
pub mod normals;
pub mod repository;
pub mod scene;
pub mod sector;

pub use cache::MemoryRequestCache;
pub use consumer::SectorGeometryConsumer;
pub use error::SectorError;
pub use merge::{
    merge_instance_meshes_by_file, merge_triangle_meshes_by_file, MeshFileGeometry, RawInstanceMeshes,
    RawSectorMeshes, RawTriangleMeshes,
};
pub use normals::compute_vertex_normals;
pub use repository::{BinaryFileProvider, CachedRepository, LoadingState, SectorDecoder};
pub use scene::{Geometry, GpuVertex, InstancedMeshNode, MaterialKind, MeshNode, NodeKind, SceneNode};
pub use sector::{
    ConsumedSector, InstancedMesh, InstancedMeshFile, SectorGeometry, SectorMetadata, SectorQuads, TriangleMesh,
    WantedSector,
};
