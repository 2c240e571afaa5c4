//! Shared constants for readback, sector streaming and coverage estimation.

/// Interval between non-blocking fence checks during async readback.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 10;

/// Maximum number of consumed sectors held by the repository cache.
pub const DEFAULT_MAX_CACHED_SECTORS: usize = 50;

/// Maximum number of decoded mesh files held by the repository cache.
pub const DEFAULT_MAX_CACHED_MESH_FILES: usize = 300;

/// Extra attempts made after a failed binary file fetch.
pub const DEFAULT_FETCH_RETRIES: u32 = 3;

/// Coverage render target size relative to the full render size.
pub const COVERAGE_RENDER_TARGET_SCALE: f32 = 0.5;

/// Lower bound on each coverage render target axis, in pixels.
pub const MIN_COVERAGE_TARGET_SIZE: u32 = 64;

/// Channel value of a pixel not covered by any sector (cleared to white).
pub const COVERAGE_EMPTY_CHANNEL: u8 = 255;

/// Byte alignment wgpu requires for each row of a texture-to-buffer copy.
pub const COPY_ROW_ALIGNMENT: u32 = 256;

/// Components per vertex position and normal.
pub const VEC3_COMPONENTS: usize = 3;

/// Bytes per packed mesh color in raw sector data (RGBA).
pub const RAW_MESH_COLOR_BYTES: usize = 4;

/// Bytes per per-vertex color in built geometry (RGB).
pub const VERTEX_COLOR_BYTES: usize = 3;

/// Floats per column-major 4x4 instance transform.
pub const INSTANCE_MATRIX_FLOATS: usize = 16;
