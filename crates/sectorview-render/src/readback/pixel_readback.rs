use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use sectorview_core::config::ReadbackConfig;

use crate::error::ReadbackError;
use crate::readback::fence::{BufferSync, FenceState};
use crate::readback::{ReadbackContext, ReadbackRequest, WakeScheduler};

struct InFlight<C: ReadbackContext> {
    buffer: C::PackBuffer,
    sync: BufferSync<C::Fence>,
}

/// Pending readback returned by [`read_pixels_async`].
///
/// Each poll performs one non-blocking fence check. While the fence is
/// unsignalled the future asks its scheduler for a wake-up after the poll
/// interval and returns `Pending`. The pack buffer and fence are released
/// on every exit path, including when the future is dropped unfinished.
pub struct ReadbackFuture<'a, C: ReadbackContext, S> {
    ctx: &'a C,
    destination: &'a mut [u8],
    in_flight: Option<InFlight<C>>,
    scheduler: S,
    poll_interval: Duration,
    max_polls: Option<u32>,
    polls: u32,
}

// Nothing inside is structurally pinned.
impl<C: ReadbackContext, S> Unpin for ReadbackFuture<'_, C, S> {}

/// Read `request.rect` from the context's render target into
/// `request.destination` without blocking on the GPU.
///
/// Validation and GPU allocation happen before this returns. A missing
/// pack buffer or fence, an unreadable layout, an overflowing rectangle
/// and a short destination are reported here rather than from the future. Contexts without fenced
/// readback are read synchronously and the returned future is already
/// complete.
pub fn read_pixels_async<'a, C, S>(
    ctx: &'a C,
    request: ReadbackRequest<'a>,
    scheduler: S,
    config: &ReadbackConfig,
) -> Result<ReadbackFuture<'a, C, S>, ReadbackError>
where
    C: ReadbackContext,
    S: WakeScheduler,
{
    let needed = request.packed_len();
    let ReadbackRequest {
        rect,
        format,
        ty,
        destination,
    } = request;

    if rect.checked_right().is_none() || rect.checked_bottom().is_none() {
        return Err(ReadbackError::RectOverflow(rect));
    }
    if destination.len() < needed {
        return Err(ReadbackError::DestinationTooSmall {
            needed,
            actual: destination.len(),
        });
    }
    if !ctx.supports_layout(format, ty) {
        return Err(ReadbackError::UnsupportedFormat(format!("{format:?}/{ty:?}")));
    }
    let destination = &mut destination[..needed];

    let mut future = ReadbackFuture {
        ctx,
        destination,
        in_flight: None,
        scheduler,
        poll_interval: config.poll_interval(),
        max_polls: config.max_polls,
        polls: 0,
    };

    if !ctx.supports_fenced_readback() {
        log::debug!("Fenced readback unavailable, reading {rect:?} synchronously");
        ctx.read_pixels(rect, format, ty, future.destination)?;
        return Ok(future);
    }

    let buffer = ctx
        .create_pack_buffer(needed)
        .ok_or(ReadbackError::MissingResource("pack buffer"))?;
    if let Err(e) = ctx.read_pixels_to_buffer(rect, format, ty, &buffer) {
        ctx.delete_buffer(buffer);
        return Err(e);
    }

    let sync = match BufferSync::insert(ctx) {
        Ok(sync) => sync,
        Err(e) => {
            ctx.delete_buffer(buffer);
            return Err(e);
        }
    };

    future.in_flight = Some(InFlight { buffer, sync });
    Ok(future)
}

impl<C: ReadbackContext, S> ReadbackFuture<'_, C, S> {
    /// Number of fence checks performed so far.
    pub fn polls(&self) -> u32 {
        self.polls
    }

    /// Whether the readback has finished, successfully or not.
    pub fn is_complete(&self) -> bool {
        self.in_flight.is_none()
    }

    fn release(&mut self) {
        if let Some(InFlight { buffer, sync }) = self.in_flight.take() {
            sync.release(self.ctx);
            self.ctx.delete_buffer(buffer);
        }
    }
}

impl<C: ReadbackContext, S: WakeScheduler> Future for ReadbackFuture<'_, C, S> {
    type Output = Result<(), ReadbackError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let Some(in_flight) = this.in_flight.as_ref() else {
            return Poll::Ready(Ok(()));
        };

        this.polls += 1;
        match in_flight.sync.poll(this.ctx) {
            FenceState::Signaled => {
                let result = this
                    .ctx
                    .get_buffer_sub_data(&in_flight.buffer, this.destination);
                if let Err(e) = &result {
                    log::warn!("Readback copy-out failed: {e}");
                }
                this.release();
                Poll::Ready(result)
            }
            FenceState::Failed => {
                log::warn!("Readback fence wait failed after {} polls", this.polls);
                this.release();
                Poll::Ready(Err(ReadbackError::FenceFailed))
            }
            FenceState::Pending => {
                if this.max_polls.is_some_and(|max| this.polls >= max) {
                    log::warn!("Readback fence still pending after {} polls", this.polls);
                    this.release();
                    return Poll::Ready(Err(ReadbackError::Timeout { polls: this.polls }));
                }
                this.scheduler
                    .wake_after(this.poll_interval, cx.waker().clone());
                Poll::Pending
            }
        }
    }
}

impl<C: ReadbackContext, S> Drop for ReadbackFuture<'_, C, S> {
    fn drop(&mut self) {
        self.release();
    }
}
