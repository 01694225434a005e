//! Reply threading for flat, floor-numbered discussions.
//!
//! Forum threads store comments as a numbered sequence ("floors") with no
//! parent pointer. Replies cite each other in free text instead: `#12`,
//! `@alice`, or a permalink to a reply id. This module infers the implicit
//! reply hierarchy from those citations and tracks which replies are new
//! since the viewer's last visit.
//!
//! Everything here is pure and synchronous except the watermark store.
//!
//! # Overview
//!
//! - [`Reply`]: one comment with its floor, author and body
//! - [`ParentResolver`]: ordered [`Rule`] chain inferring a reply's parent
//! - [`build_thread`] / [`build_forest`]: assemble replies into a [`Forest`]
//! - [`mark_unread`]: flag replies above the previous watermark
//! - [`ReadWatermarkTracker`]: load and persist watermarks via a
//!   [`WatermarkStore`]
//!
//! # Example
//!
//! ```
//! use floortree::threading::{build_thread, mark_unread, Reply};
//!
//! let replies = vec![
//!     Reply::new("101", 1, "alice", "Which editor do you use?"),
//!     Reply::new("102", 2, "bob", "@alice helix"),
//!     Reply::new("103", 3, "carol", "#2 same here"),
//! ];
//!
//! let forest = build_thread(replies, Vec::new());
//! assert_eq!(forest.roots().len(), 1);
//! assert_eq!(forest.max_depth(), 2);
//!
//! let (forest, watermark) = mark_unread(forest, Some(1));
//! assert_eq!(watermark, 3);
//! assert_eq!(forest.unseen_count(), 2);
//! ```

mod algorithm;
mod refs;
mod resolver;
mod types;
mod watermark;

// Re-export public types
pub use algorithm::{build_forest, build_thread, merge_replies};
pub use refs::{anchor_refs, floor_refs, leading_mention, mentions, trailing_mentions};
pub use resolver::{resolve_parent, Corpus, ParentResolver, Rule};
pub use types::{
    FlattenIterator, Forest, Markup, Reply, ReplyNode, ReplyNodeIterator, ThreadId,
};
pub use watermark::{
    mark_unread, parse_watermark, MemoryWatermarkStore, PriorWatermark, ReadWatermarkTracker,
    WatermarkStore,
};
