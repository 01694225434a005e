//! Concrete I/O backends, built on Tokio.
//!
//! - [`http::HttpPageSource`]: fetches thread pages over HTTP with `reqwest`
//! - [`file_store::JsonFileWatermarkStore`]: keeps watermarks in a JSON file
//!
//! Both are only available with the `tokio-runtime` feature. The rest of the
//! crate is runtime-agnostic and can be driven by any executor.

pub mod file_store;
pub mod http;

pub use file_store::JsonFileWatermarkStore;
pub use http::HttpPageSource;
