use thiserror::Error;

/// Errors raised by shared configuration and math helpers.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Failed to parse viewer config RON: {0}")]
    ConfigParseError(String),

    #[error("invalid bounds: min {min:?} exceeds max {max:?}")]
    InvalidBounds { min: [f32; 3], max: [f32; 3] },
}
