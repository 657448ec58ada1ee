#![forbid(unsafe_code)]

//! NodeSet type for XML canonicalization.
//!
//! A `NodeSet` represents a set of nodes from a parsed document, identified
//! by their `NodeId`.  Signature references canonicalize the subtree rooted
//! at the referenced element; `SignedInfo` itself is canonicalized in
//! document context, so its subtree is selected out of the full document.

use std::collections::HashSet;

/// A set of XML document nodes identified by `NodeId`.
#[derive(Debug, Clone)]
pub struct NodeSet {
    nodes: HashSet<usize>,
}

impl NodeSet {
    /// Create a node set for a subtree rooted at the given node, excluding
    /// comment nodes.
    pub fn tree_without_comments(root: roxmltree::Node<'_, '_>) -> Self {
        let mut nodes = HashSet::new();
        collect_subtree(root, &mut nodes, false);
        Self { nodes }
    }

    /// Create a node set for a subtree rooted at the given node, including
    /// comment nodes.
    pub fn tree_with_comments(root: roxmltree::Node<'_, '_>) -> Self {
        let mut nodes = HashSet::new();
        collect_subtree(root, &mut nodes, true);
        Self { nodes }
    }

    /// Check if a node is in this set.
    pub fn contains(&self, node: roxmltree::Node<'_, '_>) -> bool {
        self.nodes.contains(&node.id().get_usize())
    }

    /// Check if this set is empty.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of nodes in the set.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }
}

fn collect_subtree(node: roxmltree::Node<'_, '_>, set: &mut HashSet<usize>, with_comments: bool) {
    if node.is_comment() && !with_comments {
        return;
    }
    set.insert(node.id().get_usize());
    for child in node.children() {
        collect_subtree(child, set, with_comments);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subtree_excludes_siblings_and_comments() {
        let xml = "<r><a><!-- hidden --><b/></a><c/></r>";
        let doc = roxmltree::Document::parse(xml).unwrap();
        let a = doc
            .descendants()
            .find(|n| n.has_tag_name("a"))
            .unwrap();
        let set = NodeSet::tree_without_comments(a);
        let b = doc.descendants().find(|n| n.has_tag_name("b")).unwrap();
        let c = doc.descendants().find(|n| n.has_tag_name("c")).unwrap();
        let comment = doc.descendants().find(|n| n.is_comment()).unwrap();
        assert!(set.contains(a));
        assert!(set.contains(b));
        assert!(!set.contains(c));
        assert!(!set.contains(comment));

        let with = NodeSet::tree_with_comments(a);
        assert!(with.contains(comment));
        assert_eq!(with.len(), set.len() + 1);
    }
}
