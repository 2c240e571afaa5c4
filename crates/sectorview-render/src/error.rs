use thiserror::Error;

use crate::readback::PixelRect;

/// Errors that can occur while reading pixels back from the GPU.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReadbackError {
    /// The context refused to allocate a required GPU object. Raised when
    /// the readback is started, never from the returned future.
    #[error("GPU resource unavailable: {0}")]
    MissingResource(&'static str),

    /// The fence wait reported failure. The destination is unwritten.
    #[error("fence wait failed")]
    FenceFailed,

    #[error("fence not signalled after {polls} polls")]
    Timeout { polls: u32 },

    #[error("destination holds {actual} bytes, readback needs {needed}")]
    DestinationTooSmall { needed: usize, actual: usize },

    #[error("pixel layout {0} is not readable from this target")]
    UnsupportedFormat(String),

    /// `x + width` or `y + height` does not fit in a `u32`.
    #[error("rectangle {0:?} overflows the coordinate range")]
    RectOverflow(PixelRect),

    #[error("rectangle {rect:?} lies outside the {width}x{height} target")]
    RectOutOfBounds {
        rect: PixelRect,
        width: u32,
        height: u32,
    },

    #[error("pack buffer holds {actual} bytes, copy needs {needed}")]
    PackBufferTooSmall { needed: usize, actual: usize },

    /// Copying the pack buffer to the CPU failed after the fence
    /// signalled. The destination is unwritten.
    #[error("pack buffer copy-out failed: {0}")]
    CopyFailed(String),
}
