pub mod clipping;
pub mod coverage;
pub mod error;
pub mod readback;

pub use clipping::BoundingBoxClipper;
pub use coverage::{prioritize_sectors, unpack_sector_visibility, PrioritizedSector, SectorVisibility};
pub use error::ReadbackError;
pub use readback::{
    read_pixels_async, BufferSync, PixelFormat, PixelRect, PixelType, ReadbackContext,
    ReadbackFuture, ReadbackRequest, SoftwareReadbackContext,
};
