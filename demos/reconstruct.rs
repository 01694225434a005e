//! Reconstruct a live thread and print its reply tree.
//!
//! ```text
//! RUST_LOG=floortree=debug cargo run --example reconstruct --features tokio-runtime -- \
//!     https://forum.example.com/t https://forum.example.com/t/12345?p=2
//! ```
//!
//! Watermarks are kept in `watermarks.json` in the working directory, so a
//! second run flags the replies posted in between.

use floortree::runtime::{HttpPageSource, JsonFileWatermarkStore};
use floortree::{ActiveView, ForumHtmlParser, PageSource, Reconstructor, ThreadConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let (Some(base_url), Some(thread_url)) = (args.next(), args.next()) else {
        eprintln!("usage: reconstruct <base-url> <thread-page-url>");
        std::process::exit(2);
    };
    let config = ThreadConfig::from_env();

    let source = HttpPageSource::from_config(&base_url, &config)?;
    let (thread, page) = source.locate(&thread_url)?;
    let local = source.fetch_page(&thread, page).await?;

    let engine = Reconstructor::with_config(
        source,
        ForumHtmlParser::new(),
        JsonFileWatermarkStore::new("watermarks.json"),
        config,
    )?
    .with_progress(|done, total| eprintln!("fetched {done}/{total} pages"));

    let view = ActiveView::showing(thread.clone());
    let Some(result) = engine.reconstruct(&view, &thread, &local).await else {
        return Ok(());
    };

    for (depth, node) in result.forest.flatten() {
        let marker = if node.unseen { "*" } else { " " };
        let first_line = node.reply.text.lines().next().unwrap_or_default();
        println!(
            "{marker}{}#{} {}: {first_line}",
            "  ".repeat(depth),
            node.floor(),
            node.reply.author
        );
    }

    if !result.report.is_complete() {
        eprintln!("pages not loaded: {:?}", result.report.failed_pages);
    }
    println!(
        "{} replies, {} new, watermark {:?}",
        result.forest.len(),
        result.forest.unseen_count(),
        result.watermark
    );
    Ok(())
}
