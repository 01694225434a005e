//! Read/unread watermark.
//!
//! The watermark of a thread is the highest floor the viewer had seen at the
//! end of the previous visit. Replies above it are flagged as unseen on the
//! next visit. A first visit flags nothing.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::Result;

use super::types::{Forest, ThreadId};

/// Key-value persistence for per-thread watermarks.
///
/// Values are read back raw so that corrupted entries (written by an older
/// version, edited by hand, or truncated) can be normalized instead of
/// failing the visit.
#[async_trait]
pub trait WatermarkStore: Send + Sync {
    /// Raw stored value for `thread`, `None` if the thread was never visited.
    async fn get(&self, thread: &ThreadId) -> Result<Option<String>>;

    /// Store the watermark for `thread`.
    async fn set(&self, thread: &ThreadId, floor: u32) -> Result<()>;
}

/// In-process watermark store.
#[derive(Debug, Default)]
pub struct MemoryWatermarkStore {
    entries: Mutex<HashMap<ThreadId, String>>,
}

impl MemoryWatermarkStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a raw value, bypassing normalization.
    pub fn insert_raw(&self, thread: &ThreadId, raw: impl Into<String>) {
        self.entries.lock().insert(thread.clone(), raw.into());
    }

    /// Stored watermark for `thread`, normalized.
    pub fn watermark(&self, thread: &ThreadId) -> Option<u32> {
        self.entries
            .lock()
            .get(thread)
            .map(|raw| parse_watermark(raw))
    }
}

#[async_trait]
impl WatermarkStore for MemoryWatermarkStore {
    async fn get(&self, thread: &ThreadId) -> Result<Option<String>> {
        Ok(self.entries.lock().get(thread).cloned())
    }

    async fn set(&self, thread: &ThreadId, floor: u32) -> Result<()> {
        self.entries.lock().insert(thread.clone(), floor.to_string());
        Ok(())
    }
}

/// Normalize a stored watermark value.
///
/// Non-numeric, negative, or out-of-range values become 0.
///
/// # Example
///
/// ```
/// use floortree::threading::parse_watermark;
///
/// assert_eq!(parse_watermark("42"), 42);
/// assert_eq!(parse_watermark(" 7 "), 7);
/// assert_eq!(parse_watermark("-3"), 0);
/// assert_eq!(parse_watermark("NaN"), 0);
/// ```
pub fn parse_watermark(raw: &str) -> u32 {
    match raw.trim().parse::<i64>() {
        Ok(value) => u32::try_from(value.max(0)).unwrap_or(0),
        Err(_) => {
            log::warn!("ignoring corrupted watermark value {raw:?}");
            0
        }
    }
}

/// Flag replies newer than `prior` as unseen and compute the new watermark.
///
/// - `prior == None` (first visit): nothing is flagged; the new watermark
///   is the highest floor present.
/// - otherwise every reply above `prior` is flagged; the new watermark is
///   the highest floor present, never lower than `prior`.
///
/// Calling it again with the returned watermark and the same replies flags
/// nothing.
pub fn mark_unread(mut forest: Forest, prior: Option<u32>) -> (Forest, u32) {
    let max_floor = forest.max_floor().unwrap_or(0);

    match prior {
        None => {
            forest.for_each_mut(|node| node.unseen = false);
            (forest, max_floor)
        }
        Some(prior) => {
            forest.for_each_mut(|node| node.unseen = node.floor() > prior);
            (forest, max_floor.max(prior))
        }
    }
}

/// What the store knew about a thread before this visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriorWatermark {
    /// Never visited before
    FirstVisit,
    /// Highest floor seen on the previous visit
    Seen(u32),
    /// The store could not be read; the visit must not overwrite it
    Unavailable,
}

impl PriorWatermark {
    /// The prior floor to compare against, if the visit can be marked.
    pub fn floor(self) -> Option<u32> {
        match self {
            PriorWatermark::Seen(floor) => Some(floor),
            PriorWatermark::FirstVisit | PriorWatermark::Unavailable => None,
        }
    }
}

/// Reads and writes per-thread watermarks through a [`WatermarkStore`].
///
/// Store failures are logged and absorbed: an unreadable watermark marks
/// nothing and is left untouched.
#[derive(Debug)]
pub struct ReadWatermarkTracker<S> {
    store: S,
}

impl<S: WatermarkStore> ReadWatermarkTracker<S> {
    /// Create a tracker over `store`.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Get a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Load the watermark left by the previous visit.
    pub async fn prior(&self, thread: &ThreadId) -> PriorWatermark {
        match self.store.get(thread).await {
            Ok(Some(raw)) => PriorWatermark::Seen(parse_watermark(&raw)),
            Ok(None) => PriorWatermark::FirstVisit,
            Err(e) => {
                log::warn!("could not read watermark for thread {thread}: {e}");
                PriorWatermark::Unavailable
            }
        }
    }

    /// Flag unseen replies in `forest` and persist the new watermark.
    ///
    /// Returns the annotated forest and the thread's watermark after the
    /// visit, or `None` when it could not be read or persisted.
    pub async fn visit(&self, thread: &ThreadId, forest: Forest) -> (Forest, Option<u32>) {
        let prior = self.prior(thread).await;
        self.apply(thread, forest, prior).await
    }

    /// Like [`visit`](Self::visit) with an already loaded prior watermark.
    pub async fn apply(
        &self,
        thread: &ThreadId,
        forest: Forest,
        prior: PriorWatermark,
    ) -> (Forest, Option<u32>) {
        if prior == PriorWatermark::Unavailable {
            return (mark_unread(forest, None).0, None);
        }

        let (forest, watermark) = mark_unread(forest, prior.floor());
        if prior == PriorWatermark::Seen(watermark) {
            return (forest, Some(watermark));
        }

        match self.store.set(thread, watermark).await {
            Ok(()) => {
                log::debug!("watermark for thread {thread} is now {watermark}");
                (forest, Some(watermark))
            }
            Err(e) => {
                log::warn!("could not store watermark for thread {thread}: {e}");
                (forest, None)
            }
        }
    }
}
