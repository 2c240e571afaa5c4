//! Fenced GPU-to-CPU pixel readback.
//!
//! [`ReadbackContext`] models a WebGL2-style pixel-pack API: a copy into a
//! GPU-side pack buffer, a fence after the flush, and a non-blocking wait
//! on that fence. [`read_pixels_async`] drives the fence from a future so
//! the calling thread is never parked on the GPU.

use crate::error::ReadbackError;

mod fence;
mod pixel_readback;
mod scheduler;
pub mod software;
pub mod wgpu_context;

pub use fence::{BufferSync, FenceState};
pub use pixel_readback::{read_pixels_async, ReadbackFuture};
#[cfg(target_arch = "wasm32")]
pub use scheduler::TimeoutScheduler;
#[cfg(not(target_arch = "wasm32"))]
pub use scheduler::ThreadScheduler;
pub use scheduler::{ImmediateScheduler, WakeScheduler};
pub use software::SoftwareReadbackContext;
pub use wgpu_context::WgpuReadbackContext;

/// Rectangle of pixels in the render target's native orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Exclusive right edge, `None` if it overflows.
    pub fn checked_right(&self) -> Option<u32> {
        self.x.checked_add(self.width)
    }

    /// Exclusive bottom edge, `None` if it overflows.
    pub fn checked_bottom(&self) -> Option<u32> {
        self.y.checked_add(self.height)
    }
}

/// Channel layout of the pixels being read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Red,
    Rg,
    Rgba,
}

impl PixelFormat {
    pub fn channels(self) -> usize {
        match self {
            PixelFormat::Red => 1,
            PixelFormat::Rg => 2,
            PixelFormat::Rgba => 4,
        }
    }
}

/// Storage type of each channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelType {
    UnsignedByte,
    UnsignedInt,
    Float,
}

impl PixelType {
    pub fn bytes(self) -> usize {
        match self {
            PixelType::UnsignedByte => 1,
            PixelType::UnsignedInt | PixelType::Float => 4,
        }
    }
}

/// Bytes per pixel for a format/type pair.
pub fn bytes_per_pixel(format: PixelFormat, ty: PixelType) -> usize {
    format.channels() * ty.bytes()
}

/// Result of one non-blocking wait on a fence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    /// The fence had signalled before the wait began.
    AlreadySignaled,
    /// The fence signalled during the wait.
    ConditionSatisfied,
    /// Not signalled yet; try again later.
    TimeoutExpired,
    /// The wait itself failed. The fence will never be usable.
    WaitFailed,
}

/// One readback call: where to read, how to interpret it, and where to
/// put it. The destination is borrowed for the lifetime of the call.
#[derive(Debug)]
pub struct ReadbackRequest<'a> {
    pub rect: PixelRect,
    pub format: PixelFormat,
    pub ty: PixelType,
    pub destination: &'a mut [u8],
}

impl<'a> ReadbackRequest<'a> {
    pub fn new(
        rect: PixelRect,
        format: PixelFormat,
        ty: PixelType,
        destination: &'a mut [u8],
    ) -> Self {
        Self {
            rect,
            format,
            ty,
            destination,
        }
    }

    /// Bytes the rectangle occupies once tightly packed.
    pub fn packed_len(&self) -> usize {
        self.rect.pixel_count() * bytes_per_pixel(self.format, self.ty)
    }
}

/// GPU context capable of reading pixels from its current render target.
///
/// Methods take `&self`: a context is a shared handle and several
/// readbacks may be in flight on it at once, each owning its own pack
/// buffer and fence.
pub trait ReadbackContext {
    /// GPU-side buffer receiving a pixel-pack copy.
    type PackBuffer;
    /// Fence inserted after a flush.
    type Fence;

    /// Whether pack buffers and fences are available. When false,
    /// readback falls back to [`ReadbackContext::read_pixels`].
    fn supports_fenced_readback(&self) -> bool;

    /// Whether the render target can be read with this format/type pair.
    fn supports_layout(&self, _format: PixelFormat, _ty: PixelType) -> bool {
        true
    }

    /// Allocate a pack buffer of `size` bytes. `None` if the GPU refused.
    fn create_pack_buffer(&self, size: usize) -> Option<Self::PackBuffer>;

    /// Queue a copy of `rect` from the render target into `buffer`.
    fn read_pixels_to_buffer(
        &self,
        rect: PixelRect,
        format: PixelFormat,
        ty: PixelType,
        buffer: &Self::PackBuffer,
    ) -> Result<(), ReadbackError>;

    /// Submit all queued commands.
    fn flush(&self);

    /// Insert a fence after everything submitted so far. `None` if the
    /// GPU refused.
    fn fence_sync(&self) -> Option<Self::Fence>;

    /// Check a fence without blocking.
    fn client_wait_sync(&self, fence: &Self::Fence) -> WaitStatus;

    /// Copy the buffer's contents into `destination`, tightly packed.
    /// Only called once the fence after the copy has signalled.
    fn get_buffer_sub_data(
        &self,
        buffer: &Self::PackBuffer,
        destination: &mut [u8],
    ) -> Result<(), ReadbackError>;

    fn delete_buffer(&self, buffer: Self::PackBuffer);

    fn delete_sync(&self, fence: Self::Fence);

    /// Blocking read straight into `destination`, tightly packed.
    fn read_pixels(
        &self,
        rect: PixelRect,
        format: PixelFormat,
        ty: PixelType,
        destination: &mut [u8],
    ) -> Result<(), ReadbackError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_per_pixel() {
        assert_eq!(bytes_per_pixel(PixelFormat::Rgba, PixelType::UnsignedByte), 4);
        assert_eq!(bytes_per_pixel(PixelFormat::Rgba, PixelType::Float), 16);
        assert_eq!(bytes_per_pixel(PixelFormat::Red, PixelType::UnsignedInt), 4);
        assert_eq!(bytes_per_pixel(PixelFormat::Rg, PixelType::UnsignedByte), 2);
    }

    #[test]
    fn test_packed_len() {
        let mut dst = vec![0u8; 64];
        let request = ReadbackRequest::new(
            PixelRect::new(3, 4, 4, 2),
            PixelFormat::Rgba,
            PixelType::UnsignedByte,
            &mut dst,
        );
        assert_eq!(request.packed_len(), 32);
    }

    #[test]
    fn test_rect_edges_detect_overflow() {
        let rect = PixelRect::new(2, u32::MAX, 3, 2);
        assert_eq!(rect.checked_right(), Some(5));
        assert_eq!(rect.checked_bottom(), None);
        assert_eq!(PixelRect::new(0, u32::MAX, 1, 0).checked_bottom(), Some(u32::MAX));
    }
}
