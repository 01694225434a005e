//! Core types for reply reconstruction.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::resolver::Rule;

/// Identity of the thread a reconstruction pass belongs to.
///
/// Threaded through every call that touches per-thread state: the page
/// source, the watermark store, and the staleness guard.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ThreadId(String);

impl ThreadId {
    /// Create a thread identity from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ThreadId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ThreadId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Link targets found in the rich body of a reply.
///
/// Filled by the page parser from the body's hyperlinks. These carry more
/// confidence than tokens scraped out of the plain text, so the resolver
/// prefers them when present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Markup {
    /// Handles of linked user mentions, in body order
    pub mentions: Vec<String>,
    /// Reply ids targeted by permalink anchors, in body order
    pub anchors: Vec<String>,
    /// Handle of the mention link the body opens with, if any
    pub leading_mention: Option<String>,
}

impl Markup {
    /// Check if the markup carries no links at all.
    pub fn is_empty(&self) -> bool {
        self.mentions.is_empty() && self.anchors.is_empty() && self.leading_mention.is_none()
    }
}

/// One comment in a thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    /// Opaque id, unique within the thread and stable across reloads
    pub id: String,
    /// 1-based position in original posting order
    pub floor: u32,
    /// Author handle (compared case-insensitively)
    pub author: String,
    /// Plain-text body used for token matching (code blocks excluded)
    pub text: String,
    /// Links found in the rich body
    pub markup: Markup,
}

impl Reply {
    /// Create a reply with no markup links.
    pub fn new(
        id: impl Into<String>,
        floor: u32,
        author: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            floor,
            author: author.into(),
            text: text.into(),
            markup: Markup::default(),
        }
    }

    /// Attach markup links to this reply.
    pub fn with_markup(mut self, markup: Markup) -> Self {
        self.markup = markup;
        self
    }

    /// Check whether this reply was written by `handle`, ignoring case.
    pub fn is_authored_by(&self, handle: &str) -> bool {
        self.author.to_lowercase() == handle.to_lowercase()
    }
}

/// A node in the reconstructed forest.
///
/// Owns its reply and its children. The parent is stored as a floor number
/// only, which keeps the tree free of back-pointers.
///
/// Cloning, comparing and dropping walk the subtree with an explicit stack,
/// so reply chains of any depth are safe.
#[derive(Debug, Serialize)]
pub struct ReplyNode {
    /// The reply at this node
    pub reply: Reply,
    /// Floor of the inferred parent, `None` for roots
    pub parent: Option<u32>,
    /// Rule that linked this reply to its parent
    pub linked_by: Option<Rule>,
    /// Whether the reply appeared after the viewer's last visit
    pub unseen: bool,
    /// Direct replies, ascending by floor
    pub children: Vec<ReplyNode>,
}

impl ReplyNode {
    /// Create a root node with no children.
    pub fn new(reply: Reply) -> Self {
        Self {
            reply,
            parent: None,
            linked_by: None,
            unseen: false,
            children: Vec::new(),
        }
    }

    /// Floor of the reply at this node.
    pub fn floor(&self) -> u32 {
        self.reply.floor
    }

    /// Check if this node has no parent.
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Get the number of direct replies to this node.
    pub fn reply_count(&self) -> usize {
        self.children.len()
    }

    /// Check if this node has any replies.
    pub fn has_replies(&self) -> bool {
        !self.children.is_empty()
    }

    /// Find a node by floor in this subtree.
    pub fn find_by_floor(&self, floor: u32) -> Option<&ReplyNode> {
        self.iter().find(|node| node.floor() == floor)
    }

    /// Count all nodes in this subtree, including this one.
    pub fn count_nodes(&self) -> usize {
        self.iter().count()
    }

    /// Get the maximum depth of the subtree (0 if no replies).
    pub fn max_depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack = vec![(self, 0usize)];
        while let Some((node, depth)) = stack.pop() {
            deepest = deepest.max(depth);
            for child in &node.children {
                stack.push((child, depth + 1));
            }
        }
        deepest
    }

    /// Iterate over this subtree depth-first, children in floor order.
    pub fn iter(&self) -> ReplyNodeIterator<'_> {
        ReplyNodeIterator::new(std::slice::from_ref(self))
    }

    /// Copy of this node without its children.
    fn clone_detached(&self) -> Self {
        Self {
            reply: self.reply.clone(),
            parent: self.parent,
            linked_by: self.linked_by,
            unseen: self.unseen,
            children: Vec::with_capacity(self.children.len()),
        }
    }

    /// Apply `f` to every node of this subtree, depth-first.
    pub(crate) fn for_each_mut(&mut self, mut f: impl FnMut(&mut ReplyNode)) {
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            f(&mut *node);
            for child in node.children.iter_mut().rev() {
                stack.push(child);
            }
        }
    }
}

impl Clone for ReplyNode {
    fn clone(&self) -> Self {
        // Pre-order listing; each entry remembers its parent's position
        let mut order: Vec<(&ReplyNode, usize)> = vec![(self, 0)];
        let mut stack: Vec<(&ReplyNode, usize)> =
            self.children.iter().map(|child| (child, 0)).collect();
        while let Some((node, parent)) = stack.pop() {
            let index = order.len();
            order.push((node, parent));
            stack.extend(node.children.iter().map(|child| (child, index)));
        }

        let mut copies: Vec<Option<ReplyNode>> = order
            .iter()
            .enumerate()
            .map(|(index, (node, _))| (index > 0).then(|| node.clone_detached()))
            .collect();
        let mut root = self.clone_detached();

        // Descendants sit after their ancestor, so walking backwards attaches
        // complete subtrees. Siblings were listed last-first, so they come
        // back out in their original order.
        for index in (1..order.len()).rev() {
            let Some(copy) = copies[index].take() else {
                continue;
            };
            match order[index].1 {
                0 => root.children.push(copy),
                parent => {
                    if let Some(parent) = copies[parent].as_mut() {
                        parent.children.push(copy);
                    }
                }
            }
        }
        root
    }
}

impl PartialEq for ReplyNode {
    fn eq(&self, other: &Self) -> bool {
        let mut stack = vec![(self, other)];
        while let Some((a, b)) = stack.pop() {
            if a.reply != b.reply
                || a.parent != b.parent
                || a.linked_by != b.linked_by
                || a.unseen != b.unseen
                || a.children.len() != b.children.len()
            {
                return false;
            }
            stack.extend(a.children.iter().zip(&b.children));
        }
        true
    }
}

impl Eq for ReplyNode {}

impl Drop for ReplyNode {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.children);
        while let Some(mut node) = pending.pop() {
            pending.append(&mut node.children);
        }
    }
}

/// The reconstructed reply hierarchy of one thread.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Forest {
    /// Top-level replies, ascending by floor
    roots: Vec<ReplyNode>,
    /// Total number of replies across all trees
    reply_count: usize,
}

impl Forest {
    /// Create a forest from its root nodes.
    pub fn new(roots: Vec<ReplyNode>) -> Self {
        let reply_count = roots.iter().map(ReplyNode::count_nodes).sum();
        Self { roots, reply_count }
    }

    /// Get the top-level replies.
    pub fn roots(&self) -> &[ReplyNode] {
        &self.roots
    }

    /// Get the total number of replies in the forest.
    pub fn len(&self) -> usize {
        self.reply_count
    }

    /// Check if the forest holds no replies.
    pub fn is_empty(&self) -> bool {
        self.reply_count == 0
    }

    /// Find a reply node by floor.
    pub fn find_by_floor(&self, floor: u32) -> Option<&ReplyNode> {
        self.iter().find(|node| node.floor() == floor)
    }

    /// Floor of the parent of `floor`, if that reply exists and is linked.
    pub fn parent_of(&self, floor: u32) -> Option<u32> {
        self.find_by_floor(floor).and_then(|node| node.parent)
    }

    /// Highest floor present, or `None` for an empty forest.
    pub fn max_floor(&self) -> Option<u32> {
        self.iter().map(ReplyNode::floor).max()
    }

    /// Longest reply chain below any root.
    pub fn max_depth(&self) -> usize {
        self.roots.iter().map(ReplyNode::max_depth).max().unwrap_or(0)
    }

    /// Number of replies flagged as unseen.
    pub fn unseen_count(&self) -> usize {
        self.iter().filter(|node| node.unseen).count()
    }

    /// Iterate over all nodes depth-first, in rendering order.
    pub fn iter(&self) -> ReplyNodeIterator<'_> {
        ReplyNodeIterator::new(&self.roots)
    }

    /// Iterate over all nodes with their depth (0 for roots).
    ///
    /// This is the order an indented renderer draws the thread in.
    pub fn flatten(&self) -> FlattenIterator<'_> {
        FlattenIterator::new(&self.roots)
    }

    /// Consume the forest and return the root nodes.
    pub fn into_roots(self) -> Vec<ReplyNode> {
        self.roots
    }

    pub(crate) fn for_each_mut(&mut self, mut f: impl FnMut(&mut ReplyNode)) {
        for root in &mut self.roots {
            root.for_each_mut(&mut f);
        }
    }
}

impl<'a> IntoIterator for &'a Forest {
    type Item = &'a ReplyNode;
    type IntoIter = ReplyNodeIterator<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Depth-first iterator over reply nodes.
pub struct ReplyNodeIterator<'a> {
    stack: Vec<&'a ReplyNode>,
}

impl<'a> ReplyNodeIterator<'a> {
    fn new(roots: &'a [ReplyNode]) -> Self {
        Self {
            stack: roots.iter().rev().collect(),
        }
    }
}

impl<'a> Iterator for ReplyNodeIterator<'a> {
    type Item = &'a ReplyNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        // Push children in reverse order so they're processed left-to-right
        for child in node.children.iter().rev() {
            self.stack.push(child);
        }
        Some(node)
    }
}

/// Depth-first iterator yielding `(depth, node)` pairs.
pub struct FlattenIterator<'a> {
    stack: Vec<(usize, &'a ReplyNode)>,
}

impl<'a> FlattenIterator<'a> {
    fn new(roots: &'a [ReplyNode]) -> Self {
        Self {
            stack: roots.iter().rev().map(|node| (0, node)).collect(),
        }
    }
}

impl<'a> Iterator for FlattenIterator<'a> {
    type Item = (usize, &'a ReplyNode);

    fn next(&mut self) -> Option<Self::Item> {
        let (depth, node) = self.stack.pop()?;
        for child in node.children.iter().rev() {
            self.stack.push((depth + 1, child));
        }
        Some((depth, node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_node(floor: u32, parent: Option<u32>, children: Vec<ReplyNode>) -> ReplyNode {
        ReplyNode {
            reply: Reply::new(format!("{}", 1000 + floor), floor, "user", "text"),
            parent,
            linked_by: parent.map(|_| Rule::BareFloor),
            unseen: false,
            children,
        }
    }

    fn sample_forest() -> Forest {
        // 1 -> (2 -> 4), 3 ; 5
        Forest::new(vec![
            make_node(
                1,
                None,
                vec![
                    make_node(2, Some(1), vec![make_node(4, Some(2), vec![])]),
                    make_node(3, Some(1), vec![]),
                ],
            ),
            make_node(5, None, vec![]),
        ])
    }

    #[test]
    fn test_reply_is_authored_by_ignores_case() {
        let reply = Reply::new("1", 1, "Alice_99", "hi");
        assert!(reply.is_authored_by("alice_99"));
        assert!(reply.is_authored_by("ALICE_99"));
        assert!(!reply.is_authored_by("alice"));
    }

    #[test]
    fn test_markup_is_empty() {
        assert!(Markup::default().is_empty());
        let markup = Markup {
            leading_mention: Some("bob".to_string()),
            ..Markup::default()
        };
        assert!(!markup.is_empty());
    }

    #[test]
    fn test_thread_id_display() {
        let id = ThreadId::from("1024");
        assert_eq!(id.to_string(), "1024");
        assert_eq!(id.as_str(), "1024");
        assert_eq!(id, ThreadId::new(String::from("1024")));
    }

    #[test]
    fn test_forest_counts() {
        let forest = sample_forest();
        assert_eq!(forest.len(), 5);
        assert_eq!(forest.roots().len(), 2);
        assert_eq!(forest.max_floor(), Some(5));
        assert_eq!(forest.max_depth(), 2);
        assert!(!forest.is_empty());
    }

    #[test]
    fn test_forest_iter_order() {
        let forest = sample_forest();
        let floors: Vec<u32> = forest.iter().map(ReplyNode::floor).collect();
        assert_eq!(floors, vec![1, 2, 4, 3, 5]);
    }

    #[test]
    fn test_forest_flatten_depths() {
        let forest = sample_forest();
        let flat: Vec<(usize, u32)> = forest.flatten().map(|(d, n)| (d, n.floor())).collect();
        assert_eq!(flat, vec![(0, 1), (1, 2), (2, 4), (1, 3), (0, 5)]);
    }

    #[test]
    fn test_forest_find_and_parent() {
        let forest = sample_forest();
        assert_eq!(forest.find_by_floor(4).map(ReplyNode::floor), Some(4));
        assert!(forest.find_by_floor(9).is_none());
        assert_eq!(forest.parent_of(4), Some(2));
        assert_eq!(forest.parent_of(1), None);
    }

    #[test]
    fn test_node_helpers() {
        let forest = sample_forest();
        let root = &forest.roots()[0];
        assert!(root.is_root());
        assert!(root.has_replies());
        assert_eq!(root.reply_count(), 2);
        assert_eq!(root.count_nodes(), 4);
        assert!(root.find_by_floor(5).is_none());
    }

    #[test]
    fn test_for_each_mut_visits_every_node() {
        let mut forest = sample_forest();
        forest.for_each_mut(|node| node.unseen = node.floor() > 2);
        assert_eq!(forest.unseen_count(), 3);
    }

    #[test]
    fn test_clone_keeps_shape_and_order() {
        let forest = sample_forest();
        let copy = forest.clone();
        assert!(copy == forest);

        let floors: Vec<(usize, u32)> = copy.flatten().map(|(d, n)| (d, n.floor())).collect();
        assert_eq!(floors, vec![(0, 1), (1, 2), (2, 4), (1, 3), (0, 5)]);

        let mut changed = forest.clone();
        changed.for_each_mut(|node| node.unseen = node.floor() == 4);
        assert!(changed != forest);
    }

    #[test]
    fn test_deep_chain_clone_compare_drop() {
        const DEPTH: u32 = 50_000;

        let mut node = make_node(DEPTH, Some(DEPTH - 1), vec![]);
        for floor in (1..DEPTH).rev() {
            node = make_node(floor, floor.checked_sub(1).filter(|p| *p > 0), vec![node]);
        }
        let forest = Forest::new(vec![node]);
        assert_eq!(forest.len(), DEPTH as usize);
        assert_eq!(forest.max_depth(), DEPTH as usize - 1);

        let copy = forest.clone();
        assert!(copy == forest);
        drop(forest);
        assert_eq!(copy.max_floor(), Some(DEPTH));
        drop(copy);
    }

    #[test]
    fn test_empty_forest() {
        let forest = Forest::default();
        assert!(forest.is_empty());
        assert_eq!(forest.max_floor(), None);
        assert_eq!(forest.max_depth(), 0);
        assert_eq!(forest.iter().count(), 0);
    }
}
