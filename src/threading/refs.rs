//! Citation tokens found in reply bodies.
//!
//! Forum users cite earlier replies in three ways:
//!
//! - `#N` quotes a floor number
//! - `@handle` mentions a participant
//! - `r_<id>` (usually inside a permalink) names a reply id directly
//!
//! Link-derived values from [`Markup`](super::types::Markup) take precedence
//! over tokens scraped from the plain text.

use std::sync::OnceLock;

use regex::Regex;

use super::types::Reply;

static MENTION_REGEX: OnceLock<Regex> = OnceLock::new();
static LEADING_MENTION_REGEX: OnceLock<Regex> = OnceLock::new();
static FLOOR_REGEX: OnceLock<Regex> = OnceLock::new();
static ANCHOR_REGEX: OnceLock<Regex> = OnceLock::new();

/// Highest floor number taken from a `#N` token.
const MAX_FLOOR: u32 = 999_999;

/// `@handle` at the start of the text or after a character that cannot be
/// part of an address, so `joe@example.com` is not a mention.
fn mention_regex() -> &'static Regex {
    MENTION_REGEX.get_or_init(|| {
        Regex::new(r"(?:^|[^A-Za-z0-9_.@])@([A-Za-z0-9_]{1,20})")
            .expect("Invalid mention regex")
    })
}

/// Leading whitespace, punctuation and quote markers, then a mention.
fn leading_mention_regex() -> &'static Regex {
    LEADING_MENTION_REGEX.get_or_init(|| {
        Regex::new(r#"^[\s>\-–—：:，,。.!?（）()【】\[\]"'“”‘’「」『』]*@([A-Za-z0-9_]{1,20})"#)
            .expect("Invalid leading mention regex")
    })
}

fn floor_regex() -> &'static Regex {
    FLOOR_REGEX.get_or_init(|| Regex::new(r"#(\d+)").expect("Invalid floor regex"))
}

fn anchor_regex() -> &'static Regex {
    ANCHOR_REGEX.get_or_init(|| Regex::new(r"\br_(\d{3,})\b").expect("Invalid anchor regex"))
}

/// All mentioned handles, in body order.
///
/// Uses the markup's mention links when there are any, falling back to
/// `@handle` tokens in the text.
///
/// # Example
///
/// ```
/// use floortree::threading::{mentions, Reply};
///
/// let reply = Reply::new("9", 9, "carol", "@alice @bob agreed");
/// assert_eq!(mentions(&reply), vec!["alice", "bob"]);
/// ```
pub fn mentions(reply: &Reply) -> Vec<String> {
    if !reply.markup.mentions.is_empty() {
        return reply.markup.mentions.clone();
    }
    mention_regex()
        .captures_iter(&reply.text)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Handle of the mention the reply opens with, if any.
///
/// Reply buttons prefill `@author `, so a body that starts with a mention
/// is the strongest positional signal of intent.
///
/// # Example
///
/// ```
/// use floortree::threading::{leading_mention, Reply};
///
/// let reply = Reply::new("2", 2, "bob", "> @alice: right");
/// assert_eq!(leading_mention(&reply).as_deref(), Some("alice"));
///
/// let reply = Reply::new("3", 3, "bob", "thanks @alice");
/// assert_eq!(leading_mention(&reply), None);
/// ```
pub fn leading_mention(reply: &Reply) -> Option<String> {
    leading_mention_regex()
        .captures(&reply.text)
        .map(|caps| caps[1].to_string())
        .or_else(|| reply.markup.leading_mention.clone())
}

/// Mentioned handles other than the leading one.
pub fn trailing_mentions(reply: &Reply) -> Vec<String> {
    let leading = leading_mention(reply).map(|handle| handle.to_lowercase());
    mentions(reply)
        .into_iter()
        .filter(|handle| leading.as_deref() != Some(handle.to_lowercase().as_str()))
        .collect()
}

/// All quoted floor numbers, in text order.
///
/// # Example
///
/// ```
/// use floortree::threading::floor_refs;
///
/// assert_eq!(floor_refs("#3 and #12 are both wrong"), vec![3, 12]);
/// assert!(floor_refs("no citations").is_empty());
/// ```
pub fn floor_refs(text: &str) -> Vec<u32> {
    floor_regex()
        .captures_iter(text)
        .filter_map(|caps| caps[1].parse::<u32>().ok())
        .filter(|floor| *floor <= MAX_FLOOR)
        .collect()
}

/// Reply ids targeted by permalink anchors, links first, then text tokens.
pub fn anchor_refs(reply: &Reply) -> Vec<String> {
    let mut anchors = reply.markup.anchors.clone();
    anchors.extend(
        anchor_regex()
            .captures_iter(&reply.text)
            .map(|caps| caps[1].to_string()),
    );
    anchors
}
