//! Cached sector loading: fetch, decode, merge and consume.
//!
//! Consumed sectors are cached by `<blob_url>.<sector_id>.<lod>` and
//! decoded mesh files by `<blob_url>.<file_name>`, so sectors sharing a
//! mesh file only fetch it once. A failed load removes its key so the
//! next request starts over.

use std::collections::HashMap;

use sectorview_core::config::RepositoryConfig;
use sectorview_core::types::LevelOfDetail;

use crate::cache::MemoryRequestCache;
use crate::consumer::SectorGeometryConsumer;
use crate::error::SectorError;
use crate::merge::{
    merge_instance_meshes_by_file, merge_triangle_meshes_by_file, MeshFileGeometry, RawSectorMeshes,
};
use crate::sector::{ConsumedSector, SectorGeometry, SectorQuads, WantedSector};

/// Source of model files, e.g. an HTTP client or a local directory.
pub trait BinaryFileProvider {
    /// Fetch `file_name` relative to `base_url`. Failures should be
    /// reported as [`SectorError::Fetch`].
    fn get_binary_file(&self, base_url: &str, file_name: &str) -> Result<Vec<u8>, SectorError>;
}

/// Decoder for the model's binary sector formats. Failures should be
/// reported as [`SectorError::Decode`] naming `file_name`.
pub trait SectorDecoder {
    /// Triangle and instance tables of a detailed sector's index file.
    fn decode_index_file(&self, file_name: &str, bytes: &[u8]) -> Result<RawSectorMeshes, SectorError>;

    /// Geometry of one mesh file.
    fn decode_mesh_file(&self, file_name: &str, bytes: &[u8]) -> Result<MeshFileGeometry, SectorError>;

    /// Quad instances of a simple sector's faces file.
    fn decode_quads(&self, file_name: &str, bytes: &[u8]) -> Result<SectorQuads, SectorError>;
}

/// Progress counters. Failed loads count as loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadingState {
    pub is_loading: bool,
    pub items_requested: usize,
    pub items_loaded: usize,
}

pub struct CachedRepository<P, D> {
    provider: P,
    decoder: D,
    consumer: SectorGeometryConsumer,
    consumed_sectors: MemoryRequestCache<String, ConsumedSector>,
    mesh_files: MemoryRequestCache<String, MeshFileGeometry>,
    fetch_retries: u32,
    items_requested: usize,
    items_loaded: usize,
}

impl<P: BinaryFileProvider, D: SectorDecoder> CachedRepository<P, D> {
    pub fn new(provider: P, decoder: D, config: &RepositoryConfig) -> Self {
        Self {
            provider,
            decoder,
            consumer: SectorGeometryConsumer::new(),
            consumed_sectors: MemoryRequestCache::new(config.max_cached_sectors),
            mesh_files: MemoryRequestCache::new(config.max_cached_mesh_files),
            fetch_retries: config.fetch_retries,
            items_requested: 0,
            items_loaded: 0,
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Load one wanted sector. Discarded sectors never touch the provider
    /// and come back without a group.
    pub fn load_sector(&mut self, wanted: &WantedSector) -> Result<ConsumedSector, SectorError> {
        if wanted.level_of_detail == LevelOfDetail::Discarded {
            return Ok(ConsumedSector::new(wanted, None));
        }

        let key = wanted.cache_key();
        if let Some(cached) = self.consumed_sectors.get(&key) {
            log::debug!("Sector cache hit for {key}");
            return Ok(cached.clone());
        }

        self.items_requested += 1;
        let result = match wanted.level_of_detail {
            LevelOfDetail::Simple => self.load_simple(wanted),
            LevelOfDetail::Detailed => self.load_detailed(wanted),
            LevelOfDetail::Discarded => Ok(ConsumedSector::new(wanted, None)),
        };
        self.items_loaded += 1;

        match result {
            Ok(consumed) => {
                self.consumed_sectors.force_insert(key, consumed.clone());
                Ok(consumed)
            }
            Err(e) => {
                log::warn!("Failed to load sector {}: {e}", wanted.metadata.id);
                self.consumed_sectors.remove(&key);
                Err(e)
            }
        }
    }

    /// Load a batch in order, one result per wanted sector.
    pub fn load_sectors(&mut self, wanted: &[WantedSector]) -> Vec<Result<ConsumedSector, SectorError>> {
        wanted.iter().map(|w| self.load_sector(w)).collect()
    }

    pub fn loading_state(&self) -> LoadingState {
        LoadingState {
            is_loading: self.items_requested != self.items_loaded,
            items_requested: self.items_requested,
            items_loaded: self.items_loaded,
        }
    }

    /// Drop every cached sector and mesh file.
    pub fn clear(&mut self) {
        self.consumed_sectors.clear();
        self.mesh_files.clear();
    }

    pub fn cached_sector_count(&self) -> usize {
        self.consumed_sectors.len()
    }

    pub fn cached_mesh_file_count(&self) -> usize {
        self.mesh_files.len()
    }

    fn load_simple(&mut self, wanted: &WantedSector) -> Result<ConsumedSector, SectorError> {
        let metadata = &wanted.metadata;
        let faces_file = metadata
            .faces_file
            .as_deref()
            .ok_or(SectorError::MissingFacesFile(metadata.id))?;
        let bytes = self.fetch(&wanted.blob_url, faces_file)?;
        let quads = self.decoder.decode_quads(faces_file, &bytes)?;
        let group = self
            .consumer
            .build_simple_group(metadata.id, &metadata.bounds, &quads);
        Ok(ConsumedSector::new(wanted, group))
    }

    fn load_detailed(&mut self, wanted: &WantedSector) -> Result<ConsumedSector, SectorError> {
        let metadata = &wanted.metadata;
        let bytes = self.fetch(&wanted.blob_url, &metadata.index_file)?;
        let raw = self.decoder.decode_index_file(&metadata.index_file, &bytes)?;

        let mut files = HashMap::with_capacity(metadata.peripheral_files.len());
        for file_name in &metadata.peripheral_files {
            let geometry = self.load_mesh_file(&wanted.blob_url, file_name)?;
            files.insert(file_name.clone(), geometry);
        }

        let sector = SectorGeometry {
            triangle_meshes: merge_triangle_meshes_by_file(&raw.triangle_meshes, &files)?,
            instance_meshes: merge_instance_meshes_by_file(&raw.instance_meshes, &files)?,
        };
        let group = self
            .consumer
            .build_detailed_group(metadata.id, &metadata.bounds, &sector);
        Ok(ConsumedSector::new(wanted, group))
    }

    fn load_mesh_file(&mut self, blob_url: &str, file_name: &str) -> Result<MeshFileGeometry, SectorError> {
        let key = format!("{blob_url}.{file_name}");
        if let Some(cached) = self.mesh_files.get(&key) {
            return Ok(cached.clone());
        }

        let loaded = self
            .fetch(blob_url, file_name)
            .and_then(|bytes| self.decoder.decode_mesh_file(file_name, &bytes));
        match loaded {
            Ok(geometry) => {
                self.mesh_files.force_insert(key, geometry.clone());
                Ok(geometry)
            }
            Err(e) => {
                self.mesh_files.remove(&key);
                Err(e)
            }
        }
    }

    /// Fetch with up to `fetch_retries` extra attempts.
    fn fetch(&self, blob_url: &str, file_name: &str) -> Result<Vec<u8>, SectorError> {
        let mut attempt = 0;
        loop {
            match self.provider.get_binary_file(blob_url, file_name) {
                Ok(bytes) => return Ok(bytes),
                Err(e) if attempt < self.fetch_retries => {
                    attempt += 1;
                    log::debug!("Retrying {file_name} ({attempt}/{}): {e}", self.fetch_retries);
                }
                Err(e) => return Err(e),
            }
        }
    }
}
