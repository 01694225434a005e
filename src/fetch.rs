//! Concurrent retrieval of the remaining pages of a thread.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};

use crate::config::DEFAULT_FETCH_CONCURRENCY;
use crate::error::Result;
use crate::extract::{DocumentParser, PageDocument, ReplyExtractor};
use crate::threading::{Reply, ThreadId};

pub use url::Url;

/// Source of raw thread pages.
///
/// Implementations perform the actual transport. See
/// [`HttpPageSource`](crate::runtime::http::HttpPageSource) for the bundled
/// HTTP implementation and [`MockPageSource`](crate::mock::MockPageSource)
/// for tests.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Fetch page `page` (1-based) of `thread`.
    async fn fetch_page(&self, thread: &ThreadId, page: u32) -> Result<PageDocument>;
}

#[async_trait]
impl<P: PageSource + ?Sized> PageSource for Arc<P> {
    async fn fetch_page(&self, thread: &ThreadId, page: u32) -> Result<PageDocument> {
        (**self).fetch_page(thread, page).await
    }
}

/// Callback receiving `(pages_done, pages_total)` after every settled fetch.
pub type ProgressObserver = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// Which pages a fetch pass retrieved and which it had to skip.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchReport {
    /// Pages retrieved successfully, ascending
    pub pages_fetched: Vec<u32>,
    /// Pages whose fetch failed, ascending
    pub failed_pages: Vec<u32>,
}

impl FetchReport {
    /// Number of pages requested.
    pub fn pages_requested(&self) -> usize {
        self.pages_fetched.len() + self.failed_pages.len()
    }

    /// True when every requested page arrived.
    pub fn is_complete(&self) -> bool {
        self.failed_pages.is_empty()
    }
}

/// Replies gathered from the fetched pages.
#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    /// Replies of all fetched pages, in arrival order
    pub replies: Vec<Reply>,
    /// Per-page results
    pub report: FetchReport,
}

/// Fetches every page of a thread except the one already loaded.
///
/// At most `concurrency` fetches are in flight at a time. A failed page
/// contributes no replies and never cancels the others. Pages are not
/// retried.
pub struct PageFetcher<P, D> {
    source: P,
    extractor: ReplyExtractor<D>,
    concurrency: usize,
    observer: Option<ProgressObserver>,
}

impl<P, D> fmt::Debug for PageFetcher<P, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageFetcher")
            .field("concurrency", &self.concurrency)
            .field("observer", &self.observer.is_some())
            .finish_non_exhaustive()
    }
}

impl<P: PageSource, D: DocumentParser> PageFetcher<P, D> {
    /// Create a fetcher with the default concurrency.
    pub fn new(source: P, extractor: ReplyExtractor<D>) -> Self {
        Self {
            source,
            extractor,
            concurrency: DEFAULT_FETCH_CONCURRENCY,
            observer: None,
        }
    }

    /// Set the maximum number of fetches in flight (at least 1).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Report progress to `observer` after every page.
    pub fn with_progress<F>(mut self, observer: F) -> Self
    where
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        self.observer = Some(Arc::new(observer));
        self
    }

    /// The page source.
    pub fn source(&self) -> &P {
        &self.source
    }

    /// The extractor run on every fetched page.
    pub fn extractor(&self) -> &ReplyExtractor<D> {
        &self.extractor
    }

    /// Maximum number of fetches in flight.
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Fetch pages `1..=total_pages` except `local_page` and extract their
    /// replies.
    pub async fn fetch_remaining(
        &self,
        thread: &ThreadId,
        total_pages: u32,
        local_page: u32,
    ) -> FetchOutcome {
        let pages: Vec<u32> = (1..=total_pages).filter(|page| *page != local_page).collect();
        let total = pages.len();
        let mut outcome = FetchOutcome::default();
        if total == 0 {
            return outcome;
        }

        log::debug!(
            "fetching {total} pages of thread {thread} ({} at a time)",
            self.concurrency
        );

        let source = &self.source;
        let mut results = stream::iter(pages)
            .map(|page| async move { (page, source.fetch_page(thread, page).await) })
            .buffer_unordered(self.concurrency);

        let mut done = 0;
        while let Some((page, result)) = results.next().await {
            done += 1;
            match result {
                Ok(document) => {
                    let replies = self.extractor.extract(&document);
                    log::debug!("page {page} of thread {thread}: {} replies", replies.len());
                    outcome.replies.extend(replies);
                    outcome.report.pages_fetched.push(page);
                }
                Err(e) => {
                    log::warn!("skipping page {page} of thread {thread}: {e}");
                    outcome.report.failed_pages.push(page);
                }
            }

            log::debug!("thread {thread}: {done}/{total} pages settled");
            if let Some(observer) = &self.observer {
                observer(done, total);
            }
        }

        outcome.report.pages_fetched.sort_unstable();
        outcome.report.failed_pages.sort_unstable();
        outcome
    }
}

/// Page number carried by `url` in query parameter `param`.
///
/// Missing, non-numeric, or zero values give page 1.
///
/// # Example
///
/// ```
/// use floortree::fetch::{page_from_url, Url};
///
/// let url = Url::parse("https://example.com/t/42?p=3#r_901").unwrap();
/// assert_eq!(page_from_url(&url, "p"), 3);
///
/// let url = Url::parse("https://example.com/t/42").unwrap();
/// assert_eq!(page_from_url(&url, "p"), 1);
/// ```
pub fn page_from_url(url: &Url, param: &str) -> u32 {
    url.query_pairs()
        .find(|(key, _)| key.as_ref() == param)
        .and_then(|(_, value)| value.parse::<u32>().ok())
        .filter(|page| *page > 0)
        .unwrap_or(1)
}
