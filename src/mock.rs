//! Scripted page source for testing.
//!
//! [`MockPageSource`] answers page fetches from a fixed script and records
//! what was asked of it, so tests can check which pages were fetched and how
//! many fetches overlapped. [`forum_page`] and [`reply_cell`] render pages in
//! the layout understood by [`ForumHtmlParser`](crate::extract::ForumHtmlParser).

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::Poll;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::extract::PageDocument;
use crate::fetch::PageSource;
use crate::threading::ThreadId;

/// Scripted answer for one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockPage {
    /// Serve this body
    Body(Bytes),
    /// Answer with a non-success HTTP status
    Status(u16),
    /// Fail at the transport level
    Failure(String),
}

/// A page source that serves scripted pages.
///
/// Pages without a script entry answer with HTTP 404. The thread id is
/// ignored.
#[derive(Debug, Default)]
pub struct MockPageSource {
    pages: HashMap<u32, MockPage>,
    yields: usize,
    fetched: Mutex<Vec<u32>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockPageSource {
    /// Create a source with no pages.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `html` for `page`.
    pub fn with_page(mut self, page: u32, html: impl Into<String>) -> Self {
        self.pages
            .insert(page, MockPage::Body(Bytes::from(html.into())));
        self
    }

    /// Answer `page` with HTTP `status`.
    pub fn with_status(mut self, page: u32, status: u16) -> Self {
        self.pages.insert(page, MockPage::Status(status));
        self
    }

    /// Fail `page` with a transport error.
    pub fn with_failure(mut self, page: u32, reason: impl Into<String>) -> Self {
        self.pages.insert(page, MockPage::Failure(reason.into()));
        self
    }

    /// Suspend each fetch `yields` times before answering, so concurrent
    /// fetches overlap.
    pub fn with_yields(mut self, yields: usize) -> Self {
        self.yields = yields;
        self
    }

    /// Pages fetched so far, ascending.
    pub fn fetched_pages(&self) -> Vec<u32> {
        let mut pages = self.fetched.lock().clone();
        pages.sort_unstable();
        pages
    }

    /// Number of fetches so far.
    pub fn fetch_count(&self) -> usize {
        self.fetched.lock().len()
    }

    /// Highest number of fetches that were in flight at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageSource for MockPageSource {
    async fn fetch_page(&self, thread: &ThreadId, page: u32) -> Result<PageDocument> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.fetched.lock().push(page);
        log::trace!("mock fetch of page {page} of thread {thread}");

        for _ in 0..self.yields {
            yield_now().await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match self.pages.get(&page) {
            Some(MockPage::Body(body)) => Ok(PageDocument::new(page, body.clone())),
            Some(MockPage::Status(status)) => Err(Error::Http {
                page,
                status: *status,
            }),
            Some(MockPage::Failure(reason)) => Err(Error::Fetch {
                page,
                reason: reason.clone(),
            }),
            None => Err(Error::Http { page, status: 404 }),
        }
    }
}

async fn yield_now() {
    let mut yielded = false;
    futures::future::poll_fn(|cx| {
        if yielded {
            Poll::Ready(())
        } else {
            yielded = true;
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    })
    .await
}

/// Render one comment block.
///
/// `body_html` is inserted as-is into the reply content.
pub fn reply_cell(id: &str, floor: u32, author: &str, body_html: &str) -> String {
    format!(
        concat!(
            r#"<div id="r_{id}" class="cell"><table><tr><td>"#,
            r#"<strong><a href="/member/{author}" class="dark">{author}</a></strong>"#,
            r#"<div class="fr"><span class="no">{floor}</span></div>"#,
            r#"<div class="reply_content">{body}</div>"#,
            r#"</td></tr></table></div>"#
        ),
        id = id,
        author = author,
        floor = floor,
        body = body_html
    )
}

/// Render a thread page holding `cells`, advertising `total_pages` pages.
pub fn forum_page(total_pages: u32, cells: &[String]) -> String {
    let pager = if total_pages > 1 {
        format!(r#"<input class="page_input" type="number" min="1" max="{total_pages}">"#)
    } else {
        String::new()
    };
    format!(
        "<html><body><div class=\"box\">{}{pager}</div></body></html>",
        cells.join("\n")
    )
}
