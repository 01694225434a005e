//! Parent inference for flat, floor-numbered replies.
//!
//! Replies carry no parent pointer, only free-text citations. The resolver
//! runs an ordered chain of [`Rule`]s against a reply and the thread's
//! [`Corpus`]; the first rule that names an earlier reply wins.
//!
//! Default chain, highest confidence first:
//!
//! 1. [`Rule::Anchor`]: a permalink to another reply id
//! 2. [`Rule::Compound`]: `@user #N` where floor `N` was written by `user`
//! 3. [`Rule::LeadingMention`]: the body opens with `@user`
//! 4. [`Rule::BareFloor`]: `#N` with no mention anywhere
//! 5. [`Rule::TrailingMention`]: `@user` later in the body (opt-in)
//!
//! Every candidate has a strictly smaller floor than the reply being
//! resolved, so the resulting parent graph cannot contain a cycle.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::refs::{anchor_refs, floor_refs, leading_mention, mentions, trailing_mentions};
use super::types::Reply;

/// Lookup structure over all replies of a thread.
#[derive(Debug, Clone)]
pub struct Corpus<'a> {
    /// Replies ascending by floor
    replies: Vec<&'a Reply>,
    by_floor: HashMap<u32, &'a Reply>,
    by_id: HashMap<&'a str, &'a Reply>,
}

impl<'a> Corpus<'a> {
    /// Index a set of replies. Input order does not matter.
    pub fn new(replies: &'a [Reply]) -> Self {
        let mut sorted: Vec<&'a Reply> = replies.iter().collect();
        sorted.sort_by_key(|reply| reply.floor);

        let mut by_floor = HashMap::with_capacity(sorted.len());
        let mut by_id = HashMap::with_capacity(sorted.len());
        for &reply in &sorted {
            by_floor.entry(reply.floor).or_insert(reply);
            by_id.entry(reply.id.as_str()).or_insert(reply);
        }

        Self {
            replies: sorted,
            by_floor,
            by_id,
        }
    }

    /// Number of indexed replies.
    pub fn len(&self) -> usize {
        self.replies.len()
    }

    /// Check if the corpus is empty.
    pub fn is_empty(&self) -> bool {
        self.replies.is_empty()
    }

    /// Reply at `floor`.
    pub fn at_floor(&self, floor: u32) -> Option<&'a Reply> {
        self.by_floor.get(&floor).copied()
    }

    /// Reply with the given id.
    pub fn by_id(&self, id: &str) -> Option<&'a Reply> {
        self.by_id.get(id).copied()
    }

    /// Most recent reply by `handle` strictly below `floor`.
    pub fn latest_by_author_before(&self, handle: &str, floor: u32) -> Option<&'a Reply> {
        let end = self.replies.partition_point(|reply| reply.floor < floor);
        self.replies[..end]
            .iter()
            .rev()
            .find(|reply| reply.is_authored_by(handle))
            .copied()
    }
}

/// One parent-inference strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    /// Permalink to an earlier reply id
    Anchor,
    /// Mention plus floor number whose author matches the mention
    Compound,
    /// Mention at the very start of the body
    LeadingMention,
    /// Floor number without any mention
    BareFloor,
    /// Mention anywhere after the start of the body
    TrailingMention,
}

impl Rule {
    /// Chain used when weak mentions are not attached.
    pub const DEFAULT_CHAIN: [Rule; 4] = [
        Rule::Anchor,
        Rule::Compound,
        Rule::LeadingMention,
        Rule::BareFloor,
    ];

    /// Apply this rule alone to `reply`.
    pub fn apply<'a>(self, reply: &Reply, corpus: &Corpus<'a>) -> Option<&'a Reply> {
        let candidate = match self {
            Rule::Anchor => anchor_parent(reply, corpus),
            Rule::Compound => compound_parent(reply, corpus),
            Rule::LeadingMention => leading_mention_parent(reply, corpus),
            Rule::BareFloor => bare_floor_parent(reply, corpus),
            Rule::TrailingMention => trailing_mention_parent(reply, corpus),
        };
        candidate.filter(|parent| parent.floor < reply.floor)
    }

    /// Short name used in logs.
    pub fn name(self) -> &'static str {
        match self {
            Rule::Anchor => "anchor",
            Rule::Compound => "compound",
            Rule::LeadingMention => "leading_mention",
            Rule::BareFloor => "bare_floor",
            Rule::TrailingMention => "trailing_mention",
        }
    }
}

fn anchor_parent<'a>(reply: &Reply, corpus: &Corpus<'a>) -> Option<&'a Reply> {
    anchor_refs(reply)
        .iter()
        .filter_map(|id| corpus.by_id(id))
        .find(|target| target.floor < reply.floor)
}

fn compound_parent<'a>(reply: &Reply, corpus: &Corpus<'a>) -> Option<&'a Reply> {
    let mentioned = mentions(reply);
    if mentioned.is_empty() {
        return None;
    }
    floor_refs(&reply.text)
        .into_iter()
        .filter(|floor| *floor < reply.floor)
        .filter_map(|floor| corpus.at_floor(floor))
        .find(|target| mentioned.iter().any(|handle| target.is_authored_by(handle)))
}

fn leading_mention_parent<'a>(reply: &Reply, corpus: &Corpus<'a>) -> Option<&'a Reply> {
    let handle = leading_mention(reply)?;
    corpus.latest_by_author_before(&handle, reply.floor)
}

fn bare_floor_parent<'a>(reply: &Reply, corpus: &Corpus<'a>) -> Option<&'a Reply> {
    if !mentions(reply).is_empty() {
        return None;
    }
    floor_refs(&reply.text)
        .into_iter()
        .filter(|floor| *floor < reply.floor)
        .find_map(|floor| corpus.at_floor(floor))
}

fn trailing_mention_parent<'a>(reply: &Reply, corpus: &Corpus<'a>) -> Option<&'a Reply> {
    let handle = trailing_mentions(reply).into_iter().next()?;
    corpus.latest_by_author_before(&handle, reply.floor)
}

/// Ordered rule chain, evaluated first-match-wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentResolver {
    rules: Vec<Rule>,
}

impl Default for ParentResolver {
    fn default() -> Self {
        Self::new(false)
    }
}

impl ParentResolver {
    /// Create the default chain, optionally attaching weak mentions.
    ///
    /// Weak (trailing) mentions are often incidental, so linking them trades
    /// precision for a more densely connected tree.
    pub fn new(attach_weak_mentions: bool) -> Self {
        let mut rules = Rule::DEFAULT_CHAIN.to_vec();
        if attach_weak_mentions {
            rules.push(Rule::TrailingMention);
        }
        Self { rules }
    }

    /// Create a resolver with a custom chain.
    pub fn with_rules(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    /// The rules in evaluation order.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Infer the parent of `reply`, or `None` if it is a root.
    pub fn resolve<'a>(&self, reply: &Reply, corpus: &Corpus<'a>) -> Option<&'a Reply> {
        self.resolve_with_rule(reply, corpus).map(|(_, parent)| parent)
    }

    /// Infer the parent of `reply` together with the rule that matched.
    pub fn resolve_with_rule<'a>(
        &self,
        reply: &Reply,
        corpus: &Corpus<'a>,
    ) -> Option<(Rule, &'a Reply)> {
        let (rule, parent) = self
            .rules
            .iter()
            .find_map(|rule| rule.apply(reply, corpus).map(|parent| (*rule, parent)))?;
        log::debug!(
            "floor {} -> floor {} via {}",
            reply.floor,
            parent.floor,
            rule.name()
        );
        Some((rule, parent))
    }
}

/// Infer the parent of `reply` among `all_replies` with the default chain.
///
/// Pure and deterministic: the same inputs always give the same answer.
/// Builds a [`Corpus`] on every call; use [`ParentResolver`] with a shared
/// corpus when resolving a whole thread.
///
/// # Example
///
/// ```
/// use floortree::threading::{resolve_parent, Reply};
///
/// let replies = vec![
///     Reply::new("11", 1, "A", "hello"),
///     Reply::new("12", 2, "B", "@A nice"),
/// ];
/// let parent = resolve_parent(&replies[1], &replies);
/// assert_eq!(parent.map(|p| p.floor), Some(1));
/// ```
pub fn resolve_parent<'a>(reply: &Reply, all_replies: &'a [Reply]) -> Option<&'a Reply> {
    ParentResolver::default().resolve(reply, &Corpus::new(all_replies))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::threading::types::Markup;

    fn reply(floor: u32, author: &str, text: &str) -> Reply {
        Reply::new(format!("{}", 9000 + floor), floor, author, text)
    }

    fn parent_floor(replies: &[Reply], floor: u32, resolver: &ParentResolver) -> Option<u32> {
        let corpus = Corpus::new(replies);
        let target = corpus.at_floor(floor).expect("floor present");
        resolver.resolve(target, &corpus).map(|p| p.floor)
    }

    #[test]
    fn test_leading_mention_and_bare_floor() {
        let replies = vec![
            reply(1, "A", "hello"),
            reply(2, "B", "@A nice"),
            reply(3, "C", "#1 agree"),
        ];
        let resolver = ParentResolver::default();
        assert_eq!(parent_floor(&replies, 1, &resolver), None);
        assert_eq!(parent_floor(&replies, 2, &resolver), Some(1));
        assert_eq!(parent_floor(&replies, 3, &resolver), Some(1));
    }

    #[test]
    fn test_compound_mismatch_falls_through_to_leading_mention() {
        let replies = vec![
            reply(5, "bob", "hi"),
            reply(9, "carol", "hi"),
            reply(12, "dave", "@bob #9 lol"),
        ];
        let corpus = Corpus::new(&replies);
        let target = corpus.at_floor(12).unwrap();
        assert!(Rule::Compound.apply(target, &corpus).is_none());

        let resolved = ParentResolver::default().resolve_with_rule(target, &corpus);
        assert_eq!(
            resolved.map(|(rule, p)| (rule, p.floor)),
            Some((Rule::LeadingMention, 5))
        );
    }

    #[test]
    fn test_compound_match_picks_exact_floor() {
        // bob posted twice; the floor number selects the older one
        let replies = vec![
            reply(2, "bob", "first"),
            reply(4, "bob", "second"),
            reply(7, "eve", "@bob #2 about your first point"),
        ];
        let corpus = Corpus::new(&replies);
        let target = corpus.at_floor(7).unwrap();
        let resolved = ParentResolver::default().resolve_with_rule(target, &corpus);
        assert_eq!(
            resolved.map(|(rule, p)| (rule, p.floor)),
            Some((Rule::Compound, 2))
        );
    }

    #[test]
    fn test_compound_tries_every_cited_floor() {
        let replies = vec![
            reply(1, "amy", "x"),
            reply(2, "bob", "y"),
            reply(3, "eve", "cc @bob re #1 #2"),
        ];
        assert_eq!(
            parent_floor(&replies, 3, &ParentResolver::default()),
            Some(2)
        );
    }

    #[test]
    fn test_weak_mention_gate_off_by_default() {
        let replies = vec![
            reply(20, "dave", "hi"),
            reply(27, "erin", "thanks @dave for this"),
        ];
        assert_eq!(parent_floor(&replies, 27, &ParentResolver::default()), None);
        assert_eq!(parent_floor(&replies, 27, &ParentResolver::new(true)), Some(20));
    }

    #[test]
    fn test_anchor_beats_everything() {
        let replies = vec![
            reply(1, "amy", "x"),
            reply(2, "bob", "y"),
            reply(3, "eve", "@bob #2 but see r_9001"),
        ];
        let corpus = Corpus::new(&replies);
        let target = corpus.at_floor(3).unwrap();
        let resolved = ParentResolver::default().resolve_with_rule(target, &corpus);
        assert_eq!(
            resolved.map(|(rule, p)| (rule, p.floor)),
            Some((Rule::Anchor, 1))
        );
    }

    #[test]
    fn test_anchor_link_from_markup() {
        let replies = vec![
            reply(1, "amy", "x"),
            reply(2, "eve", "this one").with_markup(Markup {
                anchors: vec!["9001".to_string()],
                ..Markup::default()
            }),
        ];
        assert_eq!(parent_floor(&replies, 2, &ParentResolver::default()), Some(1));
    }

    #[test]
    fn test_anchor_to_later_reply_is_ignored() {
        let replies = vec![reply(1, "amy", "see r_9002"), reply(2, "bob", "ok")];
        assert_eq!(parent_floor(&replies, 1, &ParentResolver::default()), None);
    }

    #[test]
    fn test_leading_mention_prefers_most_recent() {
        let replies = vec![
            reply(1, "bob", "a"),
            reply(3, "Bob", "b"),
            reply(6, "bob", "c"),
            reply(5, "eve", "@BOB what?"),
        ];
        assert_eq!(parent_floor(&replies, 5, &ParentResolver::default()), Some(3));
    }

    #[test]
    fn test_leading_mention_without_earlier_reply_is_root() {
        let replies = vec![reply(1, "amy", "x"), reply(2, "eve", "@ghost hi")];
        assert_eq!(parent_floor(&replies, 2, &ParentResolver::default()), None);
    }

    #[test]
    fn test_bare_floor_ignores_self_and_future_floors() {
        let replies = vec![
            reply(1, "amy", "x"),
            reply(4, "eve", "#4 #9 me"),
            reply(9, "bob", "y"),
        ];
        assert_eq!(parent_floor(&replies, 4, &ParentResolver::default()), None);
    }

    #[test]
    fn test_bare_floor_skips_missing_floor() {
        // floor 2 was on a page that failed to load
        let replies = vec![reply(1, "amy", "x"), reply(3, "eve", "#2 or #1")];
        assert_eq!(parent_floor(&replies, 3, &ParentResolver::default()), Some(1));
    }

    #[test]
    fn test_bare_floor_next_to_email_address() {
        let replies = vec![
            reply(1, "amy", "question"),
            reply(2, "bob", "#1 mail me at joe@example.com"),
            reply(3, "example", "hi"),
            reply(4, "cat", "write to help@example.com, no reply here"),
        ];
        assert_eq!(parent_floor(&replies, 2, &ParentResolver::default()), Some(1));
        assert_eq!(parent_floor(&replies, 4, &ParentResolver::new(true)), None);
    }

    #[test]
    fn test_mismatched_floor_with_mention_is_not_trusted() {
        let replies = vec![
            reply(1, "amy", "x"),
            reply(2, "bob", "y"),
            reply(3, "eve", "thanks @carl for #2"),
        ];
        assert_eq!(parent_floor(&replies, 3, &ParentResolver::default()), None);
    }

    #[test]
    fn test_resolve_parent_is_pure() {
        let replies = vec![
            reply(1, "amy", "x"),
            reply(2, "bob", "@amy y"),
            reply(3, "eve", "#2"),
        ];
        let first = resolve_parent(&replies[2], &replies).map(|p| p.floor);
        for _ in 0..5 {
            assert_eq!(resolve_parent(&replies[2], &replies).map(|p| p.floor), first);
        }
        assert_eq!(first, Some(2));
    }

    #[test]
    fn test_custom_rule_chain() {
        let replies = vec![
            reply(1, "amy", "x"),
            reply(2, "bob", "y"),
            reply(3, "eve", "@bob #1"),
        ];
        // Without the leading mention rule, the floor alone is not trusted
        let resolver = ParentResolver::with_rules(vec![Rule::Compound, Rule::BareFloor]);
        assert_eq!(resolver.rules(), &[Rule::Compound, Rule::BareFloor]);
        assert_eq!(parent_floor(&replies, 3, &resolver), None);
    }

    #[test]
    fn test_corpus_lookups() {
        let replies = vec![reply(3, "b", ""), reply(1, "a", ""), reply(2, "a", "")];
        let corpus = Corpus::new(&replies);
        assert_eq!(corpus.len(), 3);
        assert_eq!(corpus.at_floor(2).map(|r| r.id.as_str()), Some("9002"));
        assert_eq!(corpus.by_id("9003").map(|r| r.floor), Some(3));
        assert_eq!(corpus.latest_by_author_before("A", 3).map(|r| r.floor), Some(2));
        assert_eq!(corpus.latest_by_author_before("a", 1), None);
    }
}
