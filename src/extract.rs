//! Reply extraction from fetched pages.
//!
//! Extraction is split in two layers:
//!
//! - a [`DocumentParser`] knows the markup of a particular forum and turns a
//!   page into loosely typed [`ReplyCandidate`]s
//! - the [`ReplyExtractor`] validates candidates into [`Reply`] records,
//!   silently dropping any that lack a required field
//!
//! [`ForumHtmlParser`] is the bundled parser for the common
//! `div.cell#r_<id>` comment layout.

use std::borrow::Cow;
use std::sync::OnceLock;

use bytes::Bytes;
use encoding_rs::{Encoding, UTF_8};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::threading::{Markup, Reply};

/// A raw page as returned by a page source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageDocument {
    /// 1-based page number within the thread
    pub page: u32,
    /// Undecoded response body
    pub body: Bytes,
    /// Charset label declared by the transport, if any
    pub charset: Option<String>,
}

impl PageDocument {
    /// Create a document from raw bytes, assumed UTF-8 unless a BOM says otherwise.
    pub fn new(page: u32, body: impl Into<Bytes>) -> Self {
        Self {
            page,
            body: body.into(),
            charset: None,
        }
    }

    /// Set the declared charset label (e.g. from a `Content-Type` header).
    pub fn with_charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = Some(charset.into());
        self
    }

    /// Decode the body to text.
    ///
    /// Unknown labels fall back to UTF-8. Malformed sequences are replaced
    /// rather than rejected.
    pub fn text(&self) -> Cow<'_, str> {
        let encoding = self
            .charset
            .as_deref()
            .and_then(|label| Encoding::for_label(label.trim().as_bytes()))
            .unwrap_or(UTF_8);
        let (text, used, had_errors) = encoding.decode(&self.body);
        if had_errors {
            log::debug!(
                "page {} contained malformed {} sequences",
                self.page,
                used.name()
            );
        }
        text
    }
}

/// A comment block as found in the markup, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplyCandidate {
    /// Reply id
    pub id: Option<String>,
    /// Floor number as printed on the page
    pub floor: Option<String>,
    /// Author handle
    pub author: Option<String>,
    /// Plain-text body; `None` when the content element is missing
    pub text: Option<String>,
    /// Links found in the body
    pub markup: Markup,
}

impl ReplyCandidate {
    /// Validate into a [`Reply`].
    ///
    /// Returns None if the candidate is missing its id, a positive floor,
    /// a non-empty author, or its content.
    pub fn into_reply(self) -> Option<Reply> {
        let id = self.id.filter(|id| !id.trim().is_empty())?;
        let floor = self
            .floor?
            .trim()
            .parse::<u32>()
            .ok()
            .filter(|floor| *floor > 0)?;
        let author = self.author.map(|a| a.trim().to_string()).filter(|a| !a.is_empty())?;
        let text = self.text?;

        Some(Reply::new(id, floor, author, text).with_markup(self.markup))
    }
}

/// Forum-specific page parsing.
pub trait DocumentParser: Send + Sync {
    /// All comment blocks on the page, in page order.
    fn candidates(&self, document: &PageDocument) -> Vec<ReplyCandidate>;

    /// Total number of pages in the thread, as advertised by this page.
    ///
    /// Returns `None` when the page shows no pagination.
    fn page_count(&self, document: &PageDocument) -> Option<u32>;
}

/// Turns pages into validated reply records.
#[derive(Debug, Clone, Default)]
pub struct ReplyExtractor<P> {
    parser: P,
}

impl<P: DocumentParser> ReplyExtractor<P> {
    /// Create an extractor over `parser`.
    pub fn new(parser: P) -> Self {
        Self { parser }
    }

    /// Extract the replies of one page, in page order.
    ///
    /// Never fails: incomplete comment blocks are dropped and an
    /// unparsable page yields no replies.
    pub fn extract(&self, document: &PageDocument) -> Vec<Reply> {
        let candidates = self.parser.candidates(document);
        let found = candidates.len();
        let replies: Vec<Reply> = candidates
            .into_iter()
            .filter_map(ReplyCandidate::into_reply)
            .collect();

        if replies.len() < found {
            log::debug!(
                "page {}: dropped {} of {} comment blocks with missing fields",
                document.page,
                found - replies.len(),
                found
            );
        }
        replies
    }

    /// Total number of pages in the thread, at least 1.
    pub fn page_count(&self, document: &PageDocument) -> u32 {
        self.parser.page_count(document).unwrap_or(1).max(1)
    }
}

static MEMBER_HREF_REGEX: OnceLock<Regex> = OnceLock::new();
static ANCHOR_HREF_REGEX: OnceLock<Regex> = OnceLock::new();
static LEADING_LINK_REGEX: OnceLock<Regex> = OnceLock::new();

fn member_href_regex() -> &'static Regex {
    MEMBER_HREF_REGEX.get_or_init(|| {
        Regex::new(r"^/member/([A-Za-z0-9_]+)$").expect("Invalid member href regex")
    })
}

fn anchor_href_regex() -> &'static Regex {
    ANCHOR_HREF_REGEX
        .get_or_init(|| Regex::new(r"#r_(\d+)").expect("Invalid anchor href regex"))
}

fn leading_link_regex() -> &'static Regex {
    LEADING_LINK_REGEX.get_or_init(|| {
        Regex::new(r#"(?i)^(?:<br\s*/?>\s*)*<a[^>]+href="/member/([A-Za-z0-9_]+)""#)
            .expect("Invalid leading link regex")
    })
}

struct Selectors {
    cell: Selector,
    content: Selector,
    author: Selector,
    floor: Selector,
    member_link: Selector,
    anchor_link: Selector,
    page_input: Selector,
    page_link: Selector,
}

static SELECTORS: OnceLock<Selectors> = OnceLock::new();

fn selectors() -> &'static Selectors {
    SELECTORS.get_or_init(|| {
        let parse = |css: &str| Selector::parse(css).expect("Invalid built-in selector");
        Selectors {
            cell: parse(r#"div.cell[id^="r_"]"#),
            content: parse(".reply_content"),
            author: parse("strong a"),
            floor: parse(".no"),
            member_link: parse(r#"a[href^="/member/"]"#),
            anchor_link: parse(r##"a[href*="#r_"]"##),
            page_input: parse(".page_input"),
            page_link: parse("a.page_normal"),
        }
    })
}

/// Parser for the `div.cell#r_<id>` comment layout.
///
/// Each comment block carries its id in the element id (`r_123`), the floor
/// in `.no`, the author in `strong a`, and the body in `.reply_content`.
/// Mentions are `/member/<handle>` links; permalinks end in `#r_<id>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ForumHtmlParser;

impl ForumHtmlParser {
    /// Create the parser.
    pub fn new() -> Self {
        Self
    }

    fn candidate(cell: ElementRef<'_>) -> ReplyCandidate {
        let sel = selectors();
        let content = cell.select(&sel.content).next();

        let mut markup = Markup::default();
        if let Some(content) = content {
            markup.mentions = content
                .select(&sel.member_link)
                .filter_map(|link| link.value().attr("href"))
                .filter_map(|href| member_href_regex().captures(href))
                .map(|caps| caps[1].to_string())
                .collect();
            markup.anchors = content
                .select(&sel.anchor_link)
                .filter_map(|link| link.value().attr("href"))
                .filter_map(|href| anchor_href_regex().captures(href))
                .map(|caps| caps[1].to_string())
                .collect();
            markup.leading_mention = leading_link_regex()
                .captures(content.inner_html().trim())
                .map(|caps| caps[1].to_string());
        }

        ReplyCandidate {
            id: cell
                .value()
                .id()
                .and_then(|id| id.strip_prefix("r_"))
                .map(str::to_string),
            floor: cell.select(&sel.floor).next().map(element_text),
            author: cell.select(&sel.author).next().map(element_text),
            text: content.map(text_without_code),
            markup,
        }
    }
}

impl DocumentParser for ForumHtmlParser {
    fn candidates(&self, document: &PageDocument) -> Vec<ReplyCandidate> {
        let html = Html::parse_document(&document.text());
        html.select(&selectors().cell)
            .map(Self::candidate)
            .collect()
    }

    fn page_count(&self, document: &PageDocument) -> Option<u32> {
        let html = Html::parse_document(&document.text());
        let sel = selectors();

        let from_input = html
            .select(&sel.page_input)
            .filter_map(|input| input.value().attr("max"))
            .find_map(|max| max.trim().parse::<u32>().ok());

        from_input.or_else(|| {
            html.select(&sel.page_link)
                .last()
                .and_then(|link| element_text(link).parse::<u32>().ok())
        })
    }
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Text of `element` with `pre`/`code` blocks left out, so `#123` inside a
/// code sample is not taken for a floor citation.
fn text_without_code(element: ElementRef<'_>) -> String {
    let mut out = String::new();
    for node in element.descendants() {
        if let Some(el) = node.value().as_element() {
            if el.name() == "br" {
                out.push('\n');
            }
            continue;
        }
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let in_code = node
            .ancestors()
            .take_while(|ancestor| ancestor.id() != element.id())
            .filter_map(|ancestor| ancestor.value().as_element())
            .any(|el| matches!(el.name(), "pre" | "code"));
        if !in_code {
            out.push_str(text);
        }
    }
    out.trim().to_string()
}
