use std::task::Waker;
use std::time::Duration;

/// Arranges for a pending readback to be polled again later.
pub trait WakeScheduler {
    /// Wake `waker` once `delay` has elapsed. Must not block the caller.
    fn wake_after(&self, delay: Duration, waker: Waker);
}

impl<S: WakeScheduler + ?Sized> WakeScheduler for &S {
    fn wake_after(&self, delay: Duration, waker: Waker) {
        (**self).wake_after(delay, waker)
    }
}

/// Wakes immediately, ignoring the delay.
///
/// Suited to executors that already poll once per frame, and to tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImmediateScheduler;

impl WakeScheduler for ImmediateScheduler {
    fn wake_after(&self, _delay: Duration, waker: Waker) {
        waker.wake();
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub use native::ThreadScheduler;

#[cfg(not(target_arch = "wasm32"))]
mod native {
    use std::cmp::Ordering;
    use std::collections::BinaryHeap;
    use std::sync::mpsc::{self, RecvTimeoutError, Sender};
    use std::task::Waker;
    use std::thread;
    use std::time::{Duration, Instant};

    use super::WakeScheduler;

    struct Timer {
        deadline: Instant,
        seq: u64,
        waker: Waker,
    }

    impl PartialEq for Timer {
        fn eq(&self, other: &Self) -> bool {
            self.deadline == other.deadline && self.seq == other.seq
        }
    }

    impl Eq for Timer {}

    impl PartialOrd for Timer {
        fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
            Some(self.cmp(other))
        }
    }

    impl Ord for Timer {
        // Reversed so the max-heap pops the earliest deadline first.
        fn cmp(&self, other: &Self) -> Ordering {
            other
                .deadline
                .cmp(&self.deadline)
                .then_with(|| other.seq.cmp(&self.seq))
        }
    }

    /// Native scheduler backed by one timer thread.
    ///
    /// The thread exits after the last handle is dropped, waking any
    /// timers still pending so no future is left stranded.
    #[derive(Debug, Clone)]
    pub struct ThreadScheduler {
        tx: Sender<(Instant, Waker)>,
    }

    impl Default for ThreadScheduler {
        fn default() -> Self {
            Self::new()
        }
    }

    impl ThreadScheduler {
        pub fn new() -> Self {
            let (tx, rx) = mpsc::channel::<(Instant, Waker)>();
            let spawned = thread::Builder::new()
                .name("readback-timer".into())
                .spawn(move || {
                    let mut timers = BinaryHeap::new();
                    let mut seq = 0u64;
                    loop {
                        let now = Instant::now();
                        while timers
                            .peek()
                            .is_some_and(|t: &Timer| t.deadline <= now)
                        {
                            if let Some(timer) = timers.pop() {
                                timer.waker.wake();
                            }
                        }

                        let received = match timers.peek() {
                            Some(next) => rx.recv_timeout(next.deadline.saturating_duration_since(now)),
                            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
                        };

                        match received {
                            Ok((deadline, waker)) => {
                                seq += 1;
                                timers.push(Timer {
                                    deadline,
                                    seq,
                                    waker,
                                });
                            }
                            Err(RecvTimeoutError::Timeout) => {}
                            Err(RecvTimeoutError::Disconnected) => break,
                        }
                    }
                    for timer in timers.drain() {
                        timer.waker.wake();
                    }
                });
            if let Err(e) = spawned {
                log::warn!("Failed to spawn readback timer thread: {e}");
            }
            Self { tx }
        }
    }

    impl WakeScheduler for ThreadScheduler {
        fn wake_after(&self, delay: Duration, waker: Waker) {
            if let Err(mpsc::SendError((_, waker))) = self.tx.send((Instant::now() + delay, waker)) {
                // Timer thread is gone; poll again right away rather than hang.
                waker.wake();
            }
        }
    }
}

#[cfg(target_arch = "wasm32")]
pub use web::TimeoutScheduler;

#[cfg(target_arch = "wasm32")]
mod web {
    use std::task::Waker;
    use std::time::Duration;

    use wasm_bindgen::closure::Closure;
    use wasm_bindgen::JsCast;

    use super::WakeScheduler;

    /// Browser scheduler using `window.setTimeout`.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct TimeoutScheduler;

    impl WakeScheduler for TimeoutScheduler {
        fn wake_after(&self, delay: Duration, waker: Waker) {
            let Some(window) = web_sys::window() else {
                waker.wake();
                return;
            };
            let fallback = waker.clone();
            let callback = Closure::once_into_js(move || waker.wake());
            let millis = delay.as_millis().min(i32::MAX as u128) as i32;
            if window
                .set_timeout_with_callback_and_timeout_and_arguments_0(callback.unchecked_ref(), millis)
                .is_err()
            {
                log::warn!("setTimeout rejected readback poll; polling immediately");
                fallback.wake();
            }
        }
    }
}
