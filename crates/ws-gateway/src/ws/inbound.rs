//! Serialized inbound frame processing.
//!
//! Frames are appended by the reader loop. Whoever claims the drain flag
//! processes frames until the queue is empty; concurrent arrivals only
//! enqueue. After releasing, the drainer re-checks once so a frame pushed
//! during the release is not left behind.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};

pub struct InboundQueue {
    frames: Mutex<VecDeque<String>>,
    draining: AtomicBool,
}

impl InboundQueue {
    pub(crate) fn new() -> Self {
        Self {
            frames: Mutex::new(VecDeque::new()),
            draining: AtomicBool::new(false),
        }
    }

    /// Append a frame. Returns `true` if the caller now owns the drain and
    /// must call [`drain_with`](Self::drain_with).
    pub fn push(&self, frame: String) -> bool {
        self.frames.lock().push_back(frame);
        self.try_claim()
    }

    pub fn len(&self) -> usize {
        self.frames.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.lock().is_empty()
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    fn try_claim(&self) -> bool {
        self.draining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn pop(&self) -> Option<String> {
        self.frames.lock().pop_front()
    }

    /// Process frames in arrival order until none are left.
    ///
    /// Must only be called by the owner returned from [`push`](Self::push).
    pub async fn drain_with<F, Fut>(&self, mut handle: F)
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = ()>,
    {
        loop {
            while let Some(frame) = self.pop() {
                handle(frame).await;
            }
            self.draining.store(false, Ordering::Release);
            if self.is_empty() || !self.try_claim() {
                return;
            }
        }
    }

    /// Drop queued frames of a closed session.
    pub(crate) fn clear(&self) {
        self.frames.lock().clear();
    }
}
