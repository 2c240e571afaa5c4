pub mod config;
pub mod constants;
pub mod error;
pub mod math;
pub mod types;

pub use config::ViewerConfig;
pub use error::CoreError;
pub use math::{Aabb, Plane, Sphere};
pub use types::{FileId, LevelOfDetail, SectorId, TreeIndex};
