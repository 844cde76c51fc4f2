#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use listfeed_core::{BinarySource, FetchError};
use tokio::sync::Semaphore;
use url::Url;

/// In-memory object source that counts fetches. Unknown URLs fail with 404.
#[derive(Default)]
pub struct MemorySource {
    objects: HashMap<String, Bytes>,
    calls: AtomicUsize,
    gate: Option<Arc<Semaphore>>,
    delay: Duration,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_object(mut self, url: &str, len: usize) -> Self {
        self.objects.insert(url.to_string(), Bytes::from(vec![7u8; len]));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fetches block until the returned semaphore receives permits.
    pub fn gated(mut self) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        self.gate = Some(gate.clone());
        (self, gate)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BinarySource for MemorySource {
    async fn fetch_binary(&self, url: &Url) -> Result<Bytes, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            let _permit = gate.acquire().await;
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.objects
            .get(url.as_str())
            .cloned()
            .ok_or(FetchError::Status(404))
    }
}

/// Waits until `check` holds, failing after two seconds.
pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !check().await {
        assert!(tokio::time::Instant::now() < deadline, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
