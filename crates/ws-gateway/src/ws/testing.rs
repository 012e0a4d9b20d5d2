//! Transport doubles for unit tests.

use crate::domain::close::CloseStatus;
use crate::domain::error::TransportError;
use crate::ports::TransportSession;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Records everything written; optionally fails after `fail_after` texts.
#[derive(Default)]
pub struct RecordingTransport {
    texts: Mutex<Vec<String>>,
    closes: Mutex<Vec<CloseStatus>>,
    pings: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    fail_after: Option<usize>,
}

impl RecordingTransport {
    pub fn failing_after(n: usize) -> Self {
        Self {
            fail_after: Some(n),
            ..Self::default()
        }
    }

    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().clone()
    }

    pub fn closes(&self) -> Vec<CloseStatus> {
        self.closes.lock().clone()
    }

    pub fn pings(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }

    pub fn max_concurrent_sends(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransportSession for RecordingTransport {
    async fn send_text(&self, text: String) -> Result<(), TransportError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::task::yield_now().await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let mut texts = self.texts.lock();
        if self.fail_after.is_some_and(|n| texts.len() >= n) {
            return Err(TransportError::Io("broken pipe".into()));
        }
        texts.push(text);
        Ok(())
    }

    async fn send_ping(&self) -> Result<(), TransportError> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self, status: CloseStatus) {
        self.closes.lock().push(status);
    }
}

/// A consumer that never finishes a write.
#[derive(Default)]
pub struct StalledTransport {
    closes: Mutex<Vec<CloseStatus>>,
}

impl StalledTransport {
    pub fn closes(&self) -> Vec<CloseStatus> {
        self.closes.lock().clone()
    }
}

#[async_trait]
impl TransportSession for StalledTransport {
    async fn send_text(&self, _text: String) -> Result<(), TransportError> {
        std::future::pending().await
    }

    async fn send_ping(&self) -> Result<(), TransportError> {
        std::future::pending().await
    }

    async fn close(&self, status: CloseStatus) {
        self.closes.lock().push(status);
    }
}
