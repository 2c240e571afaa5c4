//! CPU-side render target implementing [`ReadbackContext`].
//!
//! Pack copies are queued until `flush`, fences follow a scripted
//! [`FenceBehavior`], and every live buffer and fence is counted so
//! callers can check that readback never leaks GPU objects.

use std::cell::RefCell;
use std::collections::HashMap;

use crate::error::ReadbackError;
use crate::readback::{
    bytes_per_pixel, PixelFormat, PixelRect, PixelType, ReadbackContext, WaitStatus,
};

/// How fences created by the context respond to waits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceBehavior {
    /// Report `TimeoutExpired` for the first `n` waits, then signal.
    /// `SignalAfter(0)` reports `AlreadySignaled` on the first wait.
    SignalAfter(u32),
    /// Every wait reports `WaitFailed`.
    Fail,
    /// Never signal.
    Never,
}

/// Handle to a pack buffer owned by a [`SoftwareReadbackContext`].
#[derive(Debug, PartialEq, Eq)]
pub struct SoftwarePackBuffer(u32);

/// Handle to a fence owned by a [`SoftwareReadbackContext`].
#[derive(Debug, PartialEq, Eq)]
pub struct SoftwareFence(u32);

#[derive(Default)]
struct GpuState {
    next_handle: u32,
    buffers: HashMap<u32, Vec<u8>>,
    queued_copies: Vec<(u32, Vec<u8>)>,
    /// Waits performed so far, per fence.
    fences: HashMap<u32, u32>,
    fence_polls: u32,
}

impl GpuState {
    fn next_handle(&mut self) -> u32 {
        self.next_handle += 1;
        self.next_handle
    }
}

pub struct SoftwareReadbackContext {
    width: u32,
    height: u32,
    format: PixelFormat,
    ty: PixelType,
    pixels: Vec<u8>,
    fenced: bool,
    fence_behavior: FenceBehavior,
    fail_buffer_creation: bool,
    fail_fence_creation: bool,
    fail_copy_out: bool,
    state: RefCell<GpuState>,
}

impl SoftwareReadbackContext {
    /// RGBA8 target cleared to zero, fences signal on the first wait.
    pub fn new(width: u32, height: u32) -> Self {
        Self::with_layout(width, height, PixelFormat::Rgba, PixelType::UnsignedByte)
    }

    pub fn with_layout(width: u32, height: u32, format: PixelFormat, ty: PixelType) -> Self {
        let len = width as usize * height as usize * bytes_per_pixel(format, ty);
        Self {
            width,
            height,
            format,
            ty,
            pixels: vec![0; len],
            fenced: true,
            fence_behavior: FenceBehavior::SignalAfter(0),
            fail_buffer_creation: false,
            fail_fence_creation: false,
            fail_copy_out: false,
            state: RefCell::new(GpuState::default()),
        }
    }

    pub fn with_fence_behavior(mut self, behavior: FenceBehavior) -> Self {
        self.fence_behavior = behavior;
        self
    }

    /// Behave like a context without pack buffers or fences.
    pub fn without_fenced_readback(mut self) -> Self {
        self.fenced = false;
        self
    }

    pub fn with_buffer_creation_failure(mut self) -> Self {
        self.fail_buffer_creation = true;
        self
    }

    pub fn with_fence_creation_failure(mut self) -> Self {
        self.fail_fence_creation = true;
        self
    }

    /// Make every pack-buffer copy-out fail, as a lost mapping would.
    pub fn with_copy_out_failure(mut self) -> Self {
        self.fail_copy_out = true;
        self
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    fn pixel_bytes(&self) -> usize {
        bytes_per_pixel(self.format, self.ty)
    }

    /// Overwrite one pixel. Out-of-range coordinates and short values are
    /// ignored.
    pub fn set_pixel(&mut self, x: u32, y: u32, value: &[u8]) {
        let bpp = self.pixel_bytes();
        if x >= self.width || y >= self.height || value.len() < bpp {
            return;
        }
        let start = (y as usize * self.width as usize + x as usize) * bpp;
        self.pixels[start..start + bpp].copy_from_slice(&value[..bpp]);
    }

    /// Whole target, row-major from the top-left corner.
    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    pub fn live_buffers(&self) -> usize {
        self.state.borrow().buffers.len()
    }

    pub fn live_fences(&self) -> usize {
        self.state.borrow().fences.len()
    }

    /// Total fence waits across all fences.
    pub fn fence_polls(&self) -> u32 {
        self.state.borrow().fence_polls
    }

    /// Tightly packed copy of `rect`; pixels outside the target read as zero.
    fn copy_rect(&self, rect: PixelRect, destination: &mut [u8]) {
        let bpp = self.pixel_bytes();
        let row_bytes = rect.width as usize * bpp;
        for (row, dst_row) in destination
            .chunks_exact_mut(row_bytes.max(1))
            .take(rect.height as usize)
            .enumerate()
        {
            dst_row.fill(0);
            let y = u32::try_from(row).ok().and_then(|row| rect.y.checked_add(row));
            let Some(y) = y.filter(|&y| y < self.height) else {
                continue;
            };
            if rect.x >= self.width {
                continue;
            }
            let visible = (self.width - rect.x).min(rect.width) as usize;
            let src_start = (y as usize * self.width as usize + rect.x as usize) * bpp;
            dst_row[..visible * bpp].copy_from_slice(&self.pixels[src_start..src_start + visible * bpp]);
        }
    }
}

impl ReadbackContext for SoftwareReadbackContext {
    type PackBuffer = SoftwarePackBuffer;
    type Fence = SoftwareFence;

    fn supports_fenced_readback(&self) -> bool {
        self.fenced
    }

    fn supports_layout(&self, format: PixelFormat, ty: PixelType) -> bool {
        format == self.format && ty == self.ty
    }

    fn create_pack_buffer(&self, size: usize) -> Option<SoftwarePackBuffer> {
        if self.fail_buffer_creation || !self.fenced {
            return None;
        }
        let mut state = self.state.borrow_mut();
        let handle = state.next_handle();
        state.buffers.insert(handle, vec![0; size]);
        Some(SoftwarePackBuffer(handle))
    }

    fn read_pixels_to_buffer(
        &self,
        rect: PixelRect,
        format: PixelFormat,
        ty: PixelType,
        buffer: &SoftwarePackBuffer,
    ) -> Result<(), ReadbackError> {
        if !self.supports_layout(format, ty) {
            return Err(ReadbackError::UnsupportedFormat(format!("{format:?}/{ty:?}")));
        }
        let needed = rect.pixel_count() * self.pixel_bytes();
        let mut state = self.state.borrow_mut();
        let actual = state
            .buffers
            .get(&buffer.0)
            .map(Vec::len)
            .ok_or(ReadbackError::MissingResource("pack buffer"))?;
        if actual < needed {
            return Err(ReadbackError::PackBufferTooSmall { needed, actual });
        }
        let mut copy = vec![0; needed];
        self.copy_rect(rect, &mut copy);
        state.queued_copies.push((buffer.0, copy));
        Ok(())
    }

    fn flush(&self) {
        let mut state = self.state.borrow_mut();
        let copies = std::mem::take(&mut state.queued_copies);
        for (handle, data) in copies {
            if let Some(buffer) = state.buffers.get_mut(&handle) {
                let len = data.len().min(buffer.len());
                buffer[..len].copy_from_slice(&data[..len]);
            }
        }
    }

    fn fence_sync(&self) -> Option<SoftwareFence> {
        if self.fail_fence_creation || !self.fenced {
            return None;
        }
        let mut state = self.state.borrow_mut();
        let handle = state.next_handle();
        state.fences.insert(handle, 0);
        Some(SoftwareFence(handle))
    }

    fn client_wait_sync(&self, fence: &SoftwareFence) -> WaitStatus {
        let mut state = self.state.borrow_mut();
        state.fence_polls += 1;
        let Some(waits) = state.fences.get_mut(&fence.0) else {
            return WaitStatus::WaitFailed;
        };
        let previous = *waits;
        *waits += 1;
        match self.fence_behavior {
            FenceBehavior::Fail => WaitStatus::WaitFailed,
            FenceBehavior::Never => WaitStatus::TimeoutExpired,
            FenceBehavior::SignalAfter(0) => WaitStatus::AlreadySignaled,
            FenceBehavior::SignalAfter(n) if previous < n => WaitStatus::TimeoutExpired,
            FenceBehavior::SignalAfter(_) => WaitStatus::ConditionSatisfied,
        }
    }

    fn get_buffer_sub_data(
        &self,
        buffer: &SoftwarePackBuffer,
        destination: &mut [u8],
    ) -> Result<(), ReadbackError> {
        if self.fail_copy_out {
            return Err(ReadbackError::CopyFailed("pack buffer mapping lost".to_string()));
        }
        let state = self.state.borrow();
        let data = state
            .buffers
            .get(&buffer.0)
            .ok_or_else(|| ReadbackError::CopyFailed(format!("unknown pack buffer {}", buffer.0)))?;
        let len = data.len().min(destination.len());
        destination[..len].copy_from_slice(&data[..len]);
        Ok(())
    }

    fn delete_buffer(&self, buffer: SoftwarePackBuffer) {
        let mut state = self.state.borrow_mut();
        state.buffers.remove(&buffer.0);
        state.queued_copies.retain(|(handle, _)| *handle != buffer.0);
    }

    fn delete_sync(&self, fence: SoftwareFence) {
        self.state.borrow_mut().fences.remove(&fence.0);
    }

    fn read_pixels(
        &self,
        rect: PixelRect,
        format: PixelFormat,
        ty: PixelType,
        destination: &mut [u8],
    ) -> Result<(), ReadbackError> {
        if !self.supports_layout(format, ty) {
            return Err(ReadbackError::UnsupportedFormat(format!("{format:?}/{ty:?}")));
        }
        let needed = rect.pixel_count() * self.pixel_bytes();
        if destination.len() < needed {
            return Err(ReadbackError::DestinationTooSmall {
                needed,
                actual: destination.len(),
            });
        }
        self.copy_rect(rect, &mut destination[..needed]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_copy_invisible_until_flush() {
        let mut ctx = SoftwareReadbackContext::new(2, 1);
        ctx.set_pixel(0, 0, &[9, 8, 7, 6]);
        let buffer = ctx.create_pack_buffer(4).expect("buffer");
        ctx.read_pixels_to_buffer(
            PixelRect::new(0, 0, 1, 1),
            PixelFormat::Rgba,
            PixelType::UnsignedByte,
            &buffer,
        )
        .expect("copy");

        let mut out = [0u8; 4];
        ctx.get_buffer_sub_data(&buffer, &mut out).expect("copy-out");
        assert_eq!(out, [0, 0, 0, 0]);

        ctx.flush();
        ctx.get_buffer_sub_data(&buffer, &mut out).expect("copy-out");
        assert_eq!(out, [9, 8, 7, 6]);
        ctx.delete_buffer(buffer);
        assert_eq!(ctx.live_buffers(), 0);
    }

    #[test]
    fn test_out_of_range_pixels_read_as_zero() {
        let mut ctx = SoftwareReadbackContext::new(2, 2);
        ctx.pixels_mut().fill(1);
        let mut out = vec![0xAAu8; 3 * 3 * 4];
        ctx.read_pixels(
            PixelRect::new(1, 1, 3, 3),
            PixelFormat::Rgba,
            PixelType::UnsignedByte,
            &mut out,
        )
        .expect("read");
        assert_eq!(&out[0..4], &[1, 1, 1, 1]);
        assert!(out[4..12].iter().all(|&b| b == 0));
        assert!(out[12..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_rows_past_coordinate_limit_read_as_zero() {
        let mut ctx = SoftwareReadbackContext::new(2, 2);
        ctx.pixels_mut().fill(1);
        let mut out = vec![0xAAu8; 2 * 4];
        ctx.read_pixels(
            PixelRect::new(0, u32::MAX, 1, 2),
            PixelFormat::Rgba,
            PixelType::UnsignedByte,
            &mut out,
        )
        .expect("read");
        assert!(out.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_undersized_pack_buffer_rejected() {
        let ctx = SoftwareReadbackContext::new(4, 4);
        let buffer = ctx.create_pack_buffer(4).expect("buffer");
        let result = ctx.read_pixels_to_buffer(
            PixelRect::new(0, 0, 2, 1),
            PixelFormat::Rgba,
            PixelType::UnsignedByte,
            &buffer,
        );
        assert_eq!(result, Err(ReadbackError::PackBufferTooSmall { needed: 8, actual: 4 }));
        ctx.delete_buffer(buffer);
    }

    #[test]
    fn test_scripted_copy_out_failure() {
        let ctx = SoftwareReadbackContext::new(1, 1).with_copy_out_failure();
        let buffer = ctx.create_pack_buffer(4).expect("buffer");
        let mut out = [0u8; 4];
        assert!(matches!(
            ctx.get_buffer_sub_data(&buffer, &mut out),
            Err(ReadbackError::CopyFailed(_))
        ));
        ctx.delete_buffer(buffer);
    }

    #[test]
    fn test_signal_after_zero_is_already_signaled() {
        let ctx = SoftwareReadbackContext::new(1, 1);
        let fence = ctx.fence_sync().expect("fence");
        assert_eq!(ctx.client_wait_sync(&fence), WaitStatus::AlreadySignaled);
        ctx.delete_sync(fence);
    }

    #[test]
    fn test_unfenced_context_refuses_gpu_objects() {
        let ctx = SoftwareReadbackContext::new(1, 1).without_fenced_readback();
        assert!(!ctx.supports_fenced_readback());
        assert!(ctx.create_pack_buffer(4).is_none());
        assert!(ctx.fence_sync().is_none());
    }
}
