//! # floortree
//!
//! Reply tree reconstruction for flat, floor-numbered forum threads.
//!
//! Many forums show a thread as a paginated list of comments numbered by
//! position ("floors"), with no parent pointer. Users reply by citing each
//! other in the text instead: `#12`, `@alice`, or a permalink to a reply.
//! This library gathers every page of such a thread, infers who answers
//! whom, and hands back a forest of reply trees with the replies that are
//! new since the last visit flagged.
//!
//! ## Design
//!
//! - **Pure core**: [`threading`] holds parent inference, forest assembly
//!   and watermark arithmetic. None of it performs I/O.
//! - **Injected I/O**: pages come from a [`PageSource`], watermarks go to a
//!   [`WatermarkStore`](threading::WatermarkStore). Both are traits, so the
//!   engine runs on any transport and any async executor.
//! - **Never fatal**: failed pages, malformed comments and corrupted
//!   watermarks degrade the result instead of aborting it.
//!
//! ## Examples
//!
//! ### Building a forest directly
//!
//! ```rust
//! use floortree::threading::{build_thread, Reply};
//!
//! let local = vec![Reply::new("1", 1, "A", "hello")];
//! let fetched = vec![
//!     Reply::new("2", 2, "B", "@A nice"),
//!     Reply::new("3", 3, "C", "#1 agree"),
//! ];
//! let forest = build_thread(local, fetched);
//! assert_eq!(forest.roots().len(), 1);
//! assert_eq!(forest.parent_of(3), Some(1));
//! ```
//!
//! ### Reconstructing a whole thread
//!
//! ```rust,no_run
//! # #[cfg(feature = "tokio-runtime")]
//! # {
//! use floortree::extract::{ForumHtmlParser, PageDocument};
//! use floortree::runtime::{HttpPageSource, JsonFileWatermarkStore};
//! use floortree::{ActiveView, Reconstructor, ThreadId};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let source = HttpPageSource::new("https://forum.example.com/t")?;
//! let store = JsonFileWatermarkStore::new("watermarks.json");
//! let engine = Reconstructor::new(source, ForumHtmlParser::new(), store);
//!
//! let thread = ThreadId::from("12345");
//! let view = ActiveView::showing(thread.clone());
//! let local = PageDocument::new(1, std::fs::read("page1.html")?);
//!
//! if let Some(result) = engine.reconstruct(&view, &thread, &local).await {
//!     for (depth, node) in result.forest.flatten() {
//!         println!("{}#{} {}", "  ".repeat(depth), node.floor(), node.reply.author);
//!     }
//! }
//! # Ok(())
//! # }
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod session;
pub mod threading;

// Scripted page source for testing
pub mod mock;

pub use config::ThreadConfig;
pub use error::{Error, Result};
pub use extract::{DocumentParser, ForumHtmlParser, PageDocument, ReplyExtractor};
pub use fetch::{FetchReport, PageFetcher, PageSource};
pub use session::{ActiveView, Reconstruction, Reconstructor};
pub use threading::{
    build_thread, mark_unread, resolve_parent, Forest, Reply, ReplyNode, ThreadId,
};

// Optional async runtime integrations
#[cfg(feature = "tokio-runtime")]
#[cfg_attr(docsrs, doc(cfg(feature = "tokio-runtime")))]
pub mod runtime;
