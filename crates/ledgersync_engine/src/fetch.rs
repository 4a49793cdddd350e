//! Page-fetch abstraction.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use ledgersync_protocol::PageEnvelope;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// A page fetcher retrieves one page of records from the upstream resource.
///
/// This trait abstracts the network layer, allowing for different
/// implementations (HTTP proxy, loopback, mock for testing).
#[async_trait]
pub trait PageFetch: Send + Sync {
    /// Fetches the given 1-based page, requesting `page_size` records.
    async fn fetch_page(&self, page: u64, page_size: u32) -> SyncResult<PageEnvelope>;
}

#[async_trait]
impl<F: PageFetch + ?Sized> PageFetch for Arc<F> {
    async fn fetch_page(&self, page: u64, page_size: u32) -> SyncResult<PageEnvelope> {
        (**self).fetch_page(page, page_size).await
    }
}

/// A mock fetcher that replays scripted responses, for testing.
///
/// Responses are handed out in the order they were queued, one per fetch
/// call, regardless of the requested page number.
#[derive(Debug, Default)]
pub struct MockFetcher {
    responses: Mutex<VecDeque<SyncResult<PageEnvelope>>>,
    calls: AtomicUsize,
}

impl MockFetcher {
    /// Creates a new mock fetcher with no scripted responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the next response to hand out.
    pub fn push_response(&self, response: SyncResult<PageEnvelope>) {
        self.responses.lock().unwrap().push_back(response);
    }

    /// Number of fetch calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageFetch for MockFetcher {
    async fn fetch_page(&self, _page: u64, _page_size: u32) -> SyncResult<PageEnvelope> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(SyncError::Protocol("no mock response queued".into())))
    }
}
