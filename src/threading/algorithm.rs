//! Forest assembly.
//!
//! This module turns a flat list of replies into a forest by asking the
//! [`ParentResolver`] for the parent of every reply once and attaching each
//! reply under its parent, or as a root.

use std::collections::HashMap;

use super::resolver::{Corpus, ParentResolver, Rule};
use super::types::{Forest, Reply, ReplyNode};

/// Merge the locally loaded replies with the fetched ones.
///
/// The result is sorted by floor with one reply per floor. When the same
/// floor shows up twice (a page fetched while also loaded locally), the
/// local copy is kept.
pub fn merge_replies(local: Vec<Reply>, fetched: Vec<Reply>) -> Vec<Reply> {
    let mut replies = local;
    replies.extend(fetched);

    // Stable sort keeps local replies ahead of fetched duplicates
    replies.sort_by_key(|reply| reply.floor);

    let before = replies.len();
    replies.dedup_by_key(|reply| reply.floor);
    let dropped = before - replies.len();
    if dropped > 0 {
        log::debug!("dropped {dropped} duplicate floors while merging pages");
    }

    replies
}

/// Build the reply forest from locally loaded and fetched replies.
///
/// Uses the default rule chain (weak mentions not attached).
///
/// # Example
///
/// ```
/// use floortree::threading::{build_thread, Reply};
///
/// let local = vec![Reply::new("11", 1, "A", "hello")];
/// let fetched = vec![
///     Reply::new("12", 2, "B", "@A nice"),
///     Reply::new("13", 3, "C", "#1 agree"),
/// ];
/// let forest = build_thread(local, fetched);
///
/// assert_eq!(forest.roots().len(), 1);
/// assert_eq!(forest.roots()[0].reply_count(), 2);
/// ```
pub fn build_thread(local: Vec<Reply>, fetched: Vec<Reply>) -> Forest {
    build_forest(merge_replies(local, fetched), &ParentResolver::default())
}

/// Build a forest from a set of replies with the given resolver.
///
/// Steps:
/// 1. Sorts replies by floor and drops duplicate floors
/// 2. Resolves the parent of every reply exactly once
/// 3. Assembles nodes bottom-up, highest floor first, so every child is
///    complete before it is attached
///
/// Every parent has a smaller floor than its child, so each reply ends up
/// in the forest exactly once and children come out ascending by floor.
pub fn build_forest(replies: Vec<Reply>, resolver: &ParentResolver) -> Forest {
    let replies = merge_replies(replies, Vec::new());
    if replies.is_empty() {
        return Forest::default();
    }

    // Step 2: resolve every reply against the full corpus
    let links: Vec<Option<(Rule, usize, u32)>> = {
        let index_of: HashMap<u32, usize> = replies
            .iter()
            .enumerate()
            .map(|(index, reply)| (reply.floor, index))
            .collect();
        let corpus = Corpus::new(&replies);

        replies
            .iter()
            .map(|reply| {
                resolver
                    .resolve_with_rule(reply, &corpus)
                    .and_then(|(rule, parent)| {
                        index_of
                            .get(&parent.floor)
                            .map(|index| (rule, *index, parent.floor))
                    })
            })
            .collect()
    };

    // Step 3: attach bottom-up
    let mut slots: Vec<Option<ReplyNode>> = replies
        .into_iter()
        .map(|reply| Some(ReplyNode::new(reply)))
        .collect();
    let mut roots: Vec<ReplyNode> = Vec::new();

    for index in (0..slots.len()).rev() {
        let Some(mut node) = slots[index].take() else {
            continue;
        };
        // Children were pushed highest floor first
        node.children.reverse();

        match links[index] {
            Some((rule, parent_index, parent_floor)) => {
                node.parent = Some(parent_floor);
                node.linked_by = Some(rule);
                match slots[parent_index].as_mut() {
                    Some(parent) => parent.children.push(node),
                    None => roots.push(node),
                }
            }
            None => roots.push(node),
        }
    }
    roots.reverse();

    let forest = Forest::new(roots);
    log::debug!(
        "built forest of {} replies with {} roots",
        forest.len(),
        forest.roots().len()
    );
    forest
}
