//! One reconstruction pass for the thread being viewed.
//!
//! A [`Reconstructor`] ties the pieces together: it extracts the locally
//! loaded page, fetches the rest, builds the forest and flags unseen
//! replies. The [`ActiveView`] tells it whether the result is still wanted
//! once the fetches settle.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::ThreadConfig;
use crate::error::Result;
use crate::extract::{DocumentParser, PageDocument, ReplyExtractor};
use crate::fetch::{FetchReport, PageFetcher, PageSource};
use crate::threading::{
    build_forest, merge_replies, Forest, ParentResolver, ReadWatermarkTracker, ThreadId,
    WatermarkStore,
};

/// The thread currently shown to the viewer.
///
/// Clones share the same state. Navigation updates it with
/// [`set_current`](Self::set_current); a reconstruction whose thread is no
/// longer current when its fetches settle is discarded.
#[derive(Debug, Clone, Default)]
pub struct ActiveView {
    current: Arc<Mutex<Option<ThreadId>>>,
}

impl ActiveView {
    /// Create a view showing no thread.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a view showing `thread`.
    pub fn showing(thread: ThreadId) -> Self {
        let view = Self::new();
        view.set_current(thread);
        view
    }

    /// Switch to `thread`.
    pub fn set_current(&self, thread: ThreadId) {
        *self.current.lock() = Some(thread);
    }

    /// Leave the current thread without opening another.
    pub fn clear(&self) {
        *self.current.lock() = None;
    }

    /// Thread currently shown, if any.
    pub fn current(&self) -> Option<ThreadId> {
        self.current.lock().clone()
    }

    /// True if `thread` is the one currently shown.
    pub fn is_current(&self, thread: &ThreadId) -> bool {
        self.current.lock().as_ref() == Some(thread)
    }
}

/// Result of a completed reconstruction.
#[derive(Debug, Clone)]
pub struct Reconstruction {
    /// Thread that was reconstructed
    pub thread: ThreadId,
    /// Reply forest, with unseen replies flagged
    pub forest: Forest,
    /// Watermark after this visit; `None` when marking is off or the store
    /// was unavailable
    pub watermark: Option<u32>,
    /// Total number of pages in the thread
    pub total_pages: u32,
    /// Pages fetched and pages skipped
    pub report: FetchReport,
}

/// Rebuilds the reply tree of a thread from its pages.
pub struct Reconstructor<P, D, S> {
    fetcher: PageFetcher<P, D>,
    tracker: ReadWatermarkTracker<S>,
    resolver: ParentResolver,
    config: ThreadConfig,
}

impl<P, D, S> std::fmt::Debug for Reconstructor<P, D, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconstructor")
            .field("resolver", &self.resolver)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<P, D, S> Reconstructor<P, D, S>
where
    P: PageSource,
    D: DocumentParser,
    S: WatermarkStore,
{
    /// Create a reconstructor with the default configuration.
    pub fn new(source: P, parser: D, store: S) -> Self {
        Self::build(source, parser, store, ThreadConfig::default())
    }

    /// Create a reconstructor from a validated configuration.
    pub fn with_config(source: P, parser: D, store: S, config: ThreadConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(source, parser, store, config))
    }

    fn build(source: P, parser: D, store: S, config: ThreadConfig) -> Self {
        let fetcher = PageFetcher::new(source, ReplyExtractor::new(parser))
            .with_concurrency(config.fetch_concurrency);
        Self {
            fetcher,
            tracker: ReadWatermarkTracker::new(store),
            resolver: config.resolver(),
            config,
        }
    }

    /// Report fetch progress to `observer` as `(pages_done, pages_total)`.
    pub fn with_progress<F>(mut self, observer: F) -> Self
    where
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        self.fetcher = self.fetcher.with_progress(observer);
        self
    }

    /// The page fetcher.
    pub fn fetcher(&self) -> &PageFetcher<P, D> {
        &self.fetcher
    }

    /// The watermark tracker.
    pub fn tracker(&self) -> &ReadWatermarkTracker<S> {
        &self.tracker
    }

    /// Active configuration.
    pub fn config(&self) -> &ThreadConfig {
        &self.config
    }

    /// Reconstruct `thread` given its locally loaded page.
    ///
    /// Returns `None` when `view` moved to another thread before the work
    /// finished; nothing is persisted in that case. Fetch and store
    /// failures never abort the pass: they show up as missing replies, in
    /// the [`FetchReport`], or as an absent watermark.
    pub async fn reconstruct(
        &self,
        view: &ActiveView,
        thread: &ThreadId,
        local: &PageDocument,
    ) -> Option<Reconstruction> {
        let extractor = self.fetcher.extractor();
        let total_pages = extractor.page_count(local);
        let local_replies = extractor.extract(local);

        let fetched = self
            .fetcher
            .fetch_remaining(thread, total_pages, local.page)
            .await;
        if !view.is_current(thread) {
            log::info!("discarding reconstruction of thread {thread}: no longer viewed");
            return None;
        }

        let forest = build_forest(
            merge_replies(local_replies, fetched.replies),
            &self.resolver,
        );

        let (forest, watermark) = if self.config.mark_new_replies {
            let prior = self.tracker.prior(thread).await;
            if !view.is_current(thread) {
                log::info!("discarding reconstruction of thread {thread}: no longer viewed");
                return None;
            }
            self.tracker.apply(thread, forest, prior).await
        } else {
            (forest, None)
        };

        log::info!(
            "thread {thread}: {} replies in {} trees, {} unseen, {}/{} pages loaded",
            forest.len(),
            forest.roots().len(),
            forest.unseen_count(),
            total_pages as usize - fetched.report.failed_pages.len(),
            total_pages
        );

        Some(Reconstruction {
            thread: thread.clone(),
            forest,
            watermark,
            total_pages,
            report: fetched.report,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::ForumHtmlParser;
    use crate::mock::{forum_page, reply_cell, MockPageSource};
    use crate::threading::MemoryWatermarkStore;

    fn two_page_thread() -> (PageDocument, MockPageSource) {
        let page1 = forum_page(
            2,
            &[
                reply_cell("501", 1, "A", "hello"),
                reply_cell("502", 2, "B", r#"@<a href="/member/A">A</a> nice"#),
            ],
        );
        let page2 = forum_page(2, &[reply_cell("503", 3, "C", "#1 agree")]);
        (
            PageDocument::new(1, page1.into_bytes()),
            MockPageSource::new().with_page(2, page2),
        )
    }

    #[test]
    fn test_active_view() {
        let view = ActiveView::new();
        let thread = ThreadId::from("1");
        assert!(!view.is_current(&thread));

        let shared = view.clone();
        shared.set_current(thread.clone());
        assert!(view.is_current(&thread));
        assert_eq!(view.current(), Some(thread.clone()));

        view.set_current(ThreadId::from("2"));
        assert!(!shared.is_current(&thread));
        view.clear();
        assert_eq!(shared.current(), None);
    }

    #[tokio::test]
    async fn test_reconstruct_two_pages() {
        let (local, source) = two_page_thread();
        let thread = ThreadId::from("77");
        let view = ActiveView::showing(thread.clone());
        let engine = Reconstructor::new(source, ForumHtmlParser::new(), MemoryWatermarkStore::new());

        let result = engine.reconstruct(&view, &thread, &local).await.unwrap();
        assert_eq!(result.total_pages, 2);
        assert_eq!(result.report.pages_fetched, vec![2]);
        assert_eq!(result.forest.len(), 3);
        assert_eq!(result.forest.roots().len(), 1);
        assert_eq!(result.forest.parent_of(2), Some(1));
        assert_eq!(result.forest.parent_of(3), Some(1));
        assert_eq!(result.watermark, Some(3));
        assert_eq!(result.forest.unseen_count(), 0);
        assert_eq!(engine.tracker().store().watermark(&thread), Some(3));
    }

    #[tokio::test]
    async fn test_reconstruct_discarded_when_view_moves() {
        let (local, source) = two_page_thread();
        let thread = ThreadId::from("77");
        let view = ActiveView::showing(ThreadId::from("other"));
        let engine = Reconstructor::new(source, ForumHtmlParser::new(), MemoryWatermarkStore::new());

        assert!(engine.reconstruct(&view, &thread, &local).await.is_none());
        assert_eq!(engine.tracker().store().watermark(&thread), None);
    }

    #[tokio::test]
    async fn test_reconstruct_without_marking() {
        let (local, source) = two_page_thread();
        let thread = ThreadId::from("77");
        let view = ActiveView::showing(thread.clone());
        let store = MemoryWatermarkStore::new();
        store.insert_raw(&thread, "1");
        let config = ThreadConfig::default().with_new_reply_marking(false);
        let engine =
            Reconstructor::with_config(source, ForumHtmlParser::new(), store, config).unwrap();

        let result = engine.reconstruct(&view, &thread, &local).await.unwrap();
        assert_eq!(result.watermark, None);
        assert_eq!(result.forest.unseen_count(), 0);
        assert_eq!(engine.tracker().store().watermark(&thread), Some(1));
    }

    #[test]
    fn test_with_config_rejects_invalid() {
        let config = ThreadConfig::default().with_fetch_concurrency(0);
        let result = Reconstructor::with_config(
            MockPageSource::new(),
            ForumHtmlParser::new(),
            MemoryWatermarkStore::new(),
            config,
        );
        assert!(result.is_err());
    }
}
