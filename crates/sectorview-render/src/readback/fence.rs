use crate::error::ReadbackError;
use crate::readback::{ReadbackContext, WaitStatus};

/// Outcome of a single fence check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceState {
    Pending,
    Signaled,
    Failed,
}

impl From<WaitStatus> for FenceState {
    fn from(status: WaitStatus) -> Self {
        match status {
            WaitStatus::AlreadySignaled | WaitStatus::ConditionSatisfied => FenceState::Signaled,
            WaitStatus::TimeoutExpired => FenceState::Pending,
            WaitStatus::WaitFailed => FenceState::Failed,
        }
    }
}

/// A fence inserted after a flush, checked without blocking.
///
/// The fence is not deleted on drop since that needs the context; call
/// [`BufferSync::release`].
#[derive(Debug)]
pub struct BufferSync<F> {
    fence: F,
}

impl<F> BufferSync<F> {
    /// Flush queued commands and fence everything submitted so far.
    pub fn insert<C>(ctx: &C) -> Result<Self, ReadbackError>
    where
        C: ReadbackContext<Fence = F>,
    {
        ctx.flush();
        let fence = ctx
            .fence_sync()
            .ok_or(ReadbackError::MissingResource("fence"))?;
        Ok(Self { fence })
    }

    /// One non-blocking check.
    pub fn poll<C>(&self, ctx: &C) -> FenceState
    where
        C: ReadbackContext<Fence = F>,
    {
        ctx.client_wait_sync(&self.fence).into()
    }

    pub fn release<C>(self, ctx: &C)
    where
        C: ReadbackContext<Fence = F>,
    {
        ctx.delete_sync(self.fence);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::readback::software::{FenceBehavior, SoftwareReadbackContext};

    #[test]
    fn test_wait_status_mapping() {
        assert_eq!(FenceState::from(WaitStatus::AlreadySignaled), FenceState::Signaled);
        assert_eq!(FenceState::from(WaitStatus::ConditionSatisfied), FenceState::Signaled);
        assert_eq!(FenceState::from(WaitStatus::TimeoutExpired), FenceState::Pending);
        assert_eq!(FenceState::from(WaitStatus::WaitFailed), FenceState::Failed);
    }

    #[test]
    fn test_fence_signals_after_scripted_polls() {
        let ctx = SoftwareReadbackContext::new(2, 2).with_fence_behavior(FenceBehavior::SignalAfter(2));
        let sync = BufferSync::insert(&ctx).expect("fence should be created");
        assert_eq!(sync.poll(&ctx), FenceState::Pending);
        assert_eq!(sync.poll(&ctx), FenceState::Pending);
        assert_eq!(sync.poll(&ctx), FenceState::Signaled);
        assert_eq!(ctx.live_fences(), 1);
        sync.release(&ctx);
        assert_eq!(ctx.live_fences(), 0);
    }

    #[test]
    fn test_missing_fence_is_an_error() {
        let ctx = SoftwareReadbackContext::new(2, 2).with_fence_creation_failure();
        let result = BufferSync::insert(&ctx);
        assert!(matches!(result, Err(ReadbackError::MissingResource("fence"))));
    }
}
