//! [`ReadbackContext`] over a wgpu texture.
//!
//! wgpu has no fence objects. Flushing submits the recorded copies and
//! immediately requests a map of every pack buffer they write; a fence
//! signals once the submitted work is done and those maps have settled.
//! Waits only ever use `Maintain::Poll` and `try_recv`, so nothing blocks
//! the calling thread. Texture copies need 256-byte aligned rows; the
//! padding is stripped when the buffer is copied out.

use std::cell::{Cell, OnceCell, RefCell};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;

use sectorview_core::constants::COPY_ROW_ALIGNMENT;

use crate::error::ReadbackError;
use crate::readback::{
    bytes_per_pixel, PixelFormat, PixelRect, PixelType, ReadbackContext, WaitStatus,
};

type MapResult = Result<(), wgpu::BufferAsyncError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MapStatus {
    Idle,
    Requested,
    Mapped,
    Failed,
}

/// Progress of one pack buffer's `map_async`, shared between the buffer
/// and the fence that waits on it.
struct MapSlot {
    receiver: OnceCell<Receiver<MapResult>>,
    status: Cell<MapStatus>,
}

impl MapSlot {
    fn new() -> Self {
        Self {
            receiver: OnceCell::new(),
            status: Cell::new(MapStatus::Idle),
        }
    }

    fn request(&self, buffer: &wgpu::Buffer) {
        let (tx, rx) = mpsc::channel();
        buffer.slice(..).map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = self.receiver.set(rx);
        self.status.set(MapStatus::Requested);
    }

    /// Pick up a delivered map callback, if any.
    fn refresh(&self) -> MapStatus {
        if self.status.get() != MapStatus::Requested {
            return self.status.get();
        }
        let Some(rx) = self.receiver.get() else {
            return self.status.get();
        };
        match rx.try_recv() {
            Ok(Ok(())) => self.status.set(MapStatus::Mapped),
            Ok(Err(e)) => {
                log::warn!("Readback buffer map failed: {e:?}");
                self.status.set(MapStatus::Failed);
            }
            Err(TryRecvError::Disconnected) => {
                log::warn!("Readback map callback dropped");
                self.status.set(MapStatus::Failed);
            }
            Err(TryRecvError::Empty) => {}
        }
        self.status.get()
    }

    fn is_settled(&self) -> bool {
        matches!(self.refresh(), MapStatus::Mapped | MapStatus::Failed)
    }
}

/// Padded layout of a pack buffer, fixed once the copy is recorded.
struct PackedRows {
    buffer: wgpu::Buffer,
    row_bytes: u32,
    padded_row_bytes: u32,
    rows: u32,
    map: Rc<MapSlot>,
}

/// Pack buffer allocated lazily when the copy is recorded, since its
/// padded size depends on the rectangle width.
pub struct WgpuPackBuffer {
    size: usize,
    rows: OnceCell<PackedRows>,
}

pub struct WgpuFence {
    done: Arc<AtomicBool>,
    maps: Vec<Rc<MapSlot>>,
}

impl WgpuFence {
    fn is_signaled(&self) -> bool {
        // Every slot is refreshed so failures are logged as they arrive.
        let maps_settled = self.maps.iter().fold(true, |all, map| map.is_settled() && all);
        maps_settled && self.done.load(Ordering::Acquire)
    }
}

/// Reads from `texture`, which must have been created with
/// `TextureUsages::COPY_SRC`. Rectangles use wgpu's top-left origin and
/// must lie inside the texture.
pub struct WgpuReadbackContext<'a> {
    device: &'a wgpu::Device,
    queue: &'a wgpu::Queue,
    texture: &'a wgpu::Texture,
    pending: RefCell<Vec<wgpu::CommandBuffer>>,
    /// Buffers written by `pending`, mapped once it is submitted.
    unsubmitted: RefCell<Vec<(wgpu::Buffer, Rc<MapSlot>)>>,
    /// Maps requested since the last fence.
    unfenced: RefCell<Vec<Rc<MapSlot>>>,
}

fn align_row(row_bytes: u32) -> u32 {
    row_bytes.div_ceil(COPY_ROW_ALIGNMENT) * COPY_ROW_ALIGNMENT
}

impl<'a> WgpuReadbackContext<'a> {
    pub fn new(device: &'a wgpu::Device, queue: &'a wgpu::Queue, texture: &'a wgpu::Texture) -> Self {
        Self {
            device,
            queue,
            texture,
            pending: RefCell::new(Vec::new()),
            unsubmitted: RefCell::new(Vec::new()),
            unfenced: RefCell::new(Vec::new()),
        }
    }

    fn check_bounds(&self, rect: PixelRect) -> Result<(), ReadbackError> {
        let (width, height) = (self.texture.width(), self.texture.height());
        let inside = rect.checked_right().is_some_and(|right| right <= width)
            && rect.checked_bottom().is_some_and(|bottom| bottom <= height);
        if inside {
            Ok(())
        } else {
            Err(ReadbackError::RectOutOfBounds {
                rect,
                width,
                height,
            })
        }
    }

    fn record_copy(&self, rect: PixelRect, bpp: u32) -> PackedRows {
        let row_bytes = rect.width * bpp;
        let padded_row_bytes = align_row(row_bytes);
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback-pack-buffer"),
            size: padded_row_bytes as u64 * rect.height.max(1) as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("readback-copy-encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: rect.x,
                    y: rect.y,
                    z: 0,
                },
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row_bytes),
                    rows_per_image: Some(rect.height),
                },
            },
            wgpu::Extent3d {
                width: rect.width,
                height: rect.height,
                depth_or_array_layers: 1,
            },
        );
        self.pending.borrow_mut().push(encoder.finish());

        let map = Rc::new(MapSlot::new());
        self.unsubmitted
            .borrow_mut()
            .push((buffer.clone(), map.clone()));
        PackedRows {
            buffer,
            row_bytes,
            padded_row_bytes,
            rows: rect.height,
            map,
        }
    }

    /// Copy the mapped rows out without padding. Fails unless the map
    /// requested at flush time has completed.
    fn copy_out(&self, rows: &PackedRows, destination: &mut [u8]) -> Result<(), ReadbackError> {
        match rows.map.refresh() {
            MapStatus::Mapped => {}
            MapStatus::Failed => {
                return Err(ReadbackError::CopyFailed("pack buffer map failed".to_string()));
            }
            MapStatus::Idle | MapStatus::Requested => {
                return Err(ReadbackError::CopyFailed("pack buffer is not mapped yet".to_string()));
            }
        }

        {
            let mapped = rows.buffer.slice(..).get_mapped_range();
            let row_bytes = rows.row_bytes as usize;
            for (row, dst_row) in destination
                .chunks_mut(row_bytes.max(1))
                .take(rows.rows as usize)
                .enumerate()
            {
                let start = row * rows.padded_row_bytes as usize;
                let len = dst_row.len();
                dst_row.copy_from_slice(&mapped[start..start + len]);
            }
        }
        rows.buffer.unmap();
        rows.map.status.set(MapStatus::Idle);
        Ok(())
    }
}

impl ReadbackContext for WgpuReadbackContext<'_> {
    type PackBuffer = WgpuPackBuffer;
    type Fence = WgpuFence;

    fn supports_fenced_readback(&self) -> bool {
        true
    }

    fn supports_layout(&self, format: PixelFormat, ty: PixelType) -> bool {
        self.texture.format().block_copy_size(None) == Some(bytes_per_pixel(format, ty) as u32)
    }

    fn create_pack_buffer(&self, size: usize) -> Option<WgpuPackBuffer> {
        Some(WgpuPackBuffer {
            size,
            rows: OnceCell::new(),
        })
    }

    fn read_pixels_to_buffer(
        &self,
        rect: PixelRect,
        format: PixelFormat,
        ty: PixelType,
        buffer: &WgpuPackBuffer,
    ) -> Result<(), ReadbackError> {
        if !self.supports_layout(format, ty) {
            return Err(ReadbackError::UnsupportedFormat(format!("{format:?}/{ty:?}")));
        }
        self.check_bounds(rect)?;
        let bpp = bytes_per_pixel(format, ty);
        let needed = rect.pixel_count() * bpp;
        if needed > buffer.size {
            return Err(ReadbackError::PackBufferTooSmall {
                needed,
                actual: buffer.size,
            });
        }
        if buffer.rows.get().is_some() {
            return Err(ReadbackError::CopyFailed("pack buffer already holds a copy".to_string()));
        }
        let rows = self.record_copy(rect, bpp as u32);
        let _ = buffer.rows.set(rows);
        Ok(())
    }

    fn flush(&self) {
        let commands: Vec<_> = self.pending.borrow_mut().drain(..).collect();
        if !commands.is_empty() {
            self.queue.submit(commands);
        }
        let written: Vec<_> = self.unsubmitted.borrow_mut().drain(..).collect();
        let mut unfenced = self.unfenced.borrow_mut();
        for (buffer, map) in written {
            map.request(&buffer);
            unfenced.push(map);
        }
    }

    fn fence_sync(&self) -> Option<WgpuFence> {
        let done = Arc::new(AtomicBool::new(false));
        let signal = done.clone();
        self.queue.on_submitted_work_done(move || {
            signal.store(true, Ordering::Release);
        });
        let maps = self.unfenced.borrow_mut().drain(..).collect();
        Some(WgpuFence { done, maps })
    }

    fn client_wait_sync(&self, fence: &WgpuFence) -> WaitStatus {
        if fence.is_signaled() {
            return WaitStatus::AlreadySignaled;
        }
        let _ = self.device.poll(wgpu::Maintain::Poll);
        if fence.is_signaled() {
            WaitStatus::ConditionSatisfied
        } else {
            WaitStatus::TimeoutExpired
        }
    }

    fn get_buffer_sub_data(
        &self,
        buffer: &WgpuPackBuffer,
        destination: &mut [u8],
    ) -> Result<(), ReadbackError> {
        let rows = buffer
            .rows
            .get()
            .ok_or_else(|| ReadbackError::CopyFailed("no copy was recorded".to_string()))?;
        self.copy_out(rows, destination)
    }

    fn delete_buffer(&self, buffer: WgpuPackBuffer) {
        if let Some(rows) = buffer.rows.into_inner() {
            self.unsubmitted
                .borrow_mut()
                .retain(|(_, map)| !Rc::ptr_eq(map, &rows.map));
            self.unfenced
                .borrow_mut()
                .retain(|map| !Rc::ptr_eq(map, &rows.map));
            rows.buffer.destroy();
        }
    }

    fn delete_sync(&self, _fence: WgpuFence) {}

    /// Blocks on `Maintain::Wait`, so only suitable for native targets.
    fn read_pixels(
        &self,
        rect: PixelRect,
        format: PixelFormat,
        ty: PixelType,
        destination: &mut [u8],
    ) -> Result<(), ReadbackError> {
        let size = rect.pixel_count() * bytes_per_pixel(format, ty);
        let buffer = self
            .create_pack_buffer(size)
            .ok_or(ReadbackError::MissingResource("pack buffer"))?;
        let result = self
            .read_pixels_to_buffer(rect, format, ty, &buffer)
            .and_then(|()| {
                self.flush();
                let _ = self.device.poll(wgpu::Maintain::Wait);
                self.get_buffer_sub_data(&buffer, destination)
            });
        self.delete_buffer(buffer);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_alignment() {
        assert_eq!(align_row(4), 256);
        assert_eq!(align_row(256), 256);
        assert_eq!(align_row(257), 512);
        assert_eq!(align_row(1024), 1024);
    }

    fn requested_slot() -> (Rc<MapSlot>, mpsc::Sender<MapResult>) {
        let (tx, rx) = mpsc::channel();
        let slot = Rc::new(MapSlot::new());
        let _ = slot.receiver.set(rx);
        slot.status.set(MapStatus::Requested);
        (slot, tx)
    }

    #[test]
    fn test_fence_waits_for_work_and_maps() {
        let (slot, tx) = requested_slot();
        let fence = WgpuFence {
            done: Arc::new(AtomicBool::new(true)),
            maps: vec![slot.clone()],
        };
        assert!(!fence.is_signaled());

        tx.send(Ok(())).expect("send");
        assert!(fence.is_signaled());
        assert_eq!(slot.refresh(), MapStatus::Mapped);

        fence.done.store(false, Ordering::Release);
        assert!(!fence.is_signaled());
    }

    #[test]
    fn test_map_failure_settles_as_failed() {
        let (failed, tx) = requested_slot();
        tx.send(Err(wgpu::BufferAsyncError)).expect("send");
        assert_eq!(failed.refresh(), MapStatus::Failed);

        let (dropped, tx) = requested_slot();
        drop(tx);
        assert_eq!(dropped.refresh(), MapStatus::Failed);

        let idle = MapSlot::new();
        assert!(!idle.is_settled());
    }

    #[cfg(feature = "gpu_tests")]
    fn gpu_target(width: u32, height: u32) -> (wgpu::Device, wgpu::Queue, wgpu::Texture, Vec<u8>) {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions::default()))
            .expect("no GPU adapter");
        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor::default(), None))
            .expect("failed to create device");

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("readback-test-target"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::COPY_SRC | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let texels: Vec<u8> = (0..width * height * 4).map(|i| (i % 251) as u8).collect();
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &texels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width * 4),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );

        (device, queue, texture, texels)
    }

    #[cfg(feature = "gpu_tests")]
    #[test]
    fn test_gpu_readback_matches_uploaded_texels() {
        use crate::readback::{read_pixels_async, ReadbackRequest, ThreadScheduler};
        use sectorview_core::config::ReadbackConfig;

        let (width, height) = (16u32, 8u32);
        let (device, queue, texture, texels) = gpu_target(width, height);

        let ctx = WgpuReadbackContext::new(&device, &queue, &texture);
        let mut dst = vec![0u8; 4 * 3 * 4];
        let request = ReadbackRequest::new(
            PixelRect::new(2, 1, 4, 3),
            PixelFormat::Rgba,
            PixelType::UnsignedByte,
            &mut dst,
        );
        let future = read_pixels_async(&ctx, request, ThreadScheduler::new(), &ReadbackConfig::default())
            .expect("readback should start");
        pollster::block_on(future).expect("readback should succeed");

        for row in 0..3usize {
            let src = ((row + 1) * width as usize + 2) * 4;
            assert_eq!(&dst[row * 16..row * 16 + 16], &texels[src..src + 16]);
        }
    }

    #[cfg(feature = "gpu_tests")]
    #[test]
    fn test_gpu_rect_outside_texture_rejected() {
        use crate::readback::{read_pixels_async, ImmediateScheduler, ReadbackRequest};
        use sectorview_core::config::ReadbackConfig;

        let (device, queue, texture, _) = gpu_target(16, 8);
        let ctx = WgpuReadbackContext::new(&device, &queue, &texture);
        let mut dst = vec![0u8; 4 * 4];
        let rect = PixelRect::new(14, 0, 4, 1);
        let request = ReadbackRequest::new(rect, PixelFormat::Rgba, PixelType::UnsignedByte, &mut dst);
        let result = read_pixels_async(&ctx, request, ImmediateScheduler, &ReadbackConfig::default());
        assert!(matches!(
            result,
            Err(ReadbackError::RectOutOfBounds { width: 16, height: 8, .. })
        ));
    }
}
