#![forbid(unsafe_code)]

//! Exclusive Canonical XML 1.0 (exc-C14N).
//!
//! Algorithm URI: `http://www.w3.org/2001/10/xml-exc-c14n#`
//! With comments: `http://www.w3.org/2001/10/xml-exc-c14n#WithComments`
//!
//! The key difference from inclusive C14N: only "visibly utilized" namespace
//! declarations are output.  A namespace is visibly utilized if:
//! 1. Its prefix is used by the element's tag name, OR
//! 2. Its prefix is used by one of the element's attributes, OR
//! 3. The prefix appears in the InclusiveNamespaces PrefixList.
//!
//! A declaration is emitted on the first visible element that utilizes it
//! and suppressed on descendants while the rendered binding is unchanged.

use crate::escape;
use crate::render::{Attr, NsDecl};
use std::collections::{BTreeMap, HashSet};
use vaxholm_core::Error;
use vaxholm_xml::NodeSet;

/// Canonicalize using Exclusive C14N 1.0.
///
/// Prefixes in `inclusive_prefixes` that never resolve to an in-scope
/// binding anywhere in the canonicalized content are reported as a
/// canonicalization error, since the signature would not cover the
/// bindings the caller asked to pin.
pub fn canonicalize(
    doc: &roxmltree::Document<'_>,
    with_comments: bool,
    node_set: Option<&NodeSet>,
    inclusive_prefixes: &[String],
) -> Result<Vec<u8>, Error> {
    let mut ctx = ExcC14nContext {
        with_comments,
        node_set,
        inclusive_prefixes: inclusive_prefixes.iter().cloned().collect(),
        resolved_prefixes: HashSet::new(),
    };
    let mut output = Vec::new();
    ctx.process_node(doc.root(), &mut output, &BTreeMap::new())?;

    for prefix in &ctx.inclusive_prefixes {
        if prefix == "#default" {
            continue;
        }
        if !ctx.resolved_prefixes.contains(prefix.as_str()) {
            return Err(Error::Canonicalization(format!(
                "InclusiveNamespaces prefix '{prefix}' is not bound in the canonicalized content"
            )));
        }
    }
    Ok(output)
}

struct ExcC14nContext<'a> {
    with_comments: bool,
    node_set: Option<&'a NodeSet>,
    inclusive_prefixes: HashSet<String>,
    /// Inclusive prefixes seen bound on at least one visible element.
    resolved_prefixes: HashSet<String>,
}

impl ExcC14nContext<'_> {
    fn is_visible(&self, node: roxmltree::Node<'_, '_>) -> bool {
        match self.node_set {
            None => true,
            Some(ns) => ns.contains(node),
        }
    }

    fn process_node(
        &mut self,
        node: roxmltree::Node<'_, '_>,
        output: &mut Vec<u8>,
        rendered_ns: &BTreeMap<String, String>,
    ) -> Result<(), Error> {
        match node.node_type() {
            roxmltree::NodeType::Root => {
                for child in node.children() {
                    self.process_node(child, output, rendered_ns)?;
                }
            }
            roxmltree::NodeType::Element => {
                self.process_element(node, output, rendered_ns)?;
            }
            roxmltree::NodeType::Text => {
                if self.is_visible(node) {
                    let text = node.text().unwrap_or("");
                    output.extend_from_slice(escape::escape_text(text).as_bytes());
                }
            }
            roxmltree::NodeType::Comment => {
                if self.with_comments && self.is_visible(node) {
                    // Document-level comments get newline separators from
                    // the document element.
                    let parent_is_root = node
                        .parent()
                        .is_some_and(|p| p.node_type() == roxmltree::NodeType::Root);

                    if parent_is_root && node.prev_siblings().any(|s| s.is_element()) {
                        output.push(b'\n');
                    }

                    output.extend_from_slice(b"<!--");
                    output.extend_from_slice(node.text().unwrap_or("").as_bytes());
                    output.extend_from_slice(b"-->");

                    if parent_is_root && node.next_siblings().any(|s| s.is_element()) {
                        output.push(b'\n');
                    }
                }
            }
            roxmltree::NodeType::PI => {
                if self.is_visible(node) {
                    let parent_is_root = node
                        .parent()
                        .is_some_and(|p| p.node_type() == roxmltree::NodeType::Root);

                    if parent_is_root && node.prev_siblings().any(|s| s.is_element()) {
                        output.push(b'\n');
                    }

                    output.extend_from_slice(b"<?");
                    output.extend_from_slice(node.tag_name().name().as_bytes());
                    if let Some(value) = node.text() {
                        if !value.is_empty() {
                            output.push(b' ');
                            output.extend_from_slice(escape::escape_pi(value).as_bytes());
                        }
                    }
                    output.extend_from_slice(b"?>");

                    if parent_is_root && node.next_siblings().any(|s| s.is_element()) {
                        output.push(b'\n');
                    }
                }
            }
        }
        Ok(())
    }

    fn process_element(
        &mut self,
        node: roxmltree::Node<'_, '_>,
        output: &mut Vec<u8>,
        rendered_ns: &BTreeMap<String, String>,
    ) -> Result<(), Error> {
        if !self.is_visible(node) {
            // In exclusive C14N, namespace declarations are only rendered
            // on visible element start tags.  Invisible elements do not
            // affect the rendered-binding tracking of their descendants.
            for child in node.children() {
                self.process_node(child, output, rendered_ns)?;
            }
            return Ok(());
        }

        // Determine which namespace prefixes are "visibly utilized".
        let mut utilized_prefixes: HashSet<String> = HashSet::new();

        // 1. Prefix used by the element's tag name ("" for no prefix).
        utilized_prefixes.insert(element_prefix(&node));

        // 2. Prefixes used by attributes.
        for attr in node.attributes() {
            if let Some(prefix) = attr_prefix(&node, &attr) {
                if !prefix.is_empty() && prefix != "xml" {
                    utilized_prefixes.insert(prefix);
                }
            }
        }

        // 3. Prefixes in the InclusiveNamespaces PrefixList.
        // "#default" means the default namespace.
        for p in &self.inclusive_prefixes {
            if p == "#default" {
                utilized_prefixes.insert(String::new());
            } else {
                utilized_prefixes.insert(p.clone());
            }
        }

        let inscope_ns = collect_inscope_namespaces(&node);

        let mut ns_decls: Vec<NsDecl> = Vec::new();
        for prefix in &utilized_prefixes {
            // The xml prefix is never redeclared.
            if prefix == "xml" {
                continue;
            }

            if let Some(uri) = inscope_ns.get(prefix) {
                if self.inclusive_prefixes.contains(prefix.as_str()) {
                    self.resolved_prefixes.insert(prefix.clone());
                }
                // Only output if different from what was previously rendered.
                if rendered_ns.get(prefix) != Some(uri) {
                    ns_decls.push(NsDecl {
                        prefix: prefix.clone(),
                        uri: uri.clone(),
                    });
                }
            } else if prefix.is_empty() {
                // Default namespace: if previously rendered non-empty and
                // now out of scope, undeclare with xmlns="".
                if rendered_ns.get("").is_some_and(|u| !u.is_empty()) {
                    ns_decls.push(NsDecl {
                        prefix: String::new(),
                        uri: String::new(),
                    });
                }
            }
        }
        ns_decls.sort();

        let mut attrs: Vec<Attr> = Vec::new();
        for attr in node.attributes() {
            let ns_uri = attr.namespace().unwrap_or("");
            let qname = if let Some(prefix) = attr_prefix(&node, &attr) {
                if prefix.is_empty() {
                    attr.name().to_owned()
                } else {
                    format!("{}:{}", prefix, attr.name())
                }
            } else {
                attr.name().to_owned()
            };
            attrs.push(Attr {
                ns_uri: ns_uri.to_owned(),
                local_name: attr.name().to_owned(),
                qualified_name: qname,
                value: attr.value().to_owned(),
            });
        }
        attrs.sort();

        let elem_name = qualified_element_name(&node);

        output.push(b'<');
        output.extend_from_slice(elem_name.as_bytes());
        for ns_decl in &ns_decls {
            output.extend_from_slice(ns_decl.render().as_bytes());
        }
        for attr in &attrs {
            output.extend_from_slice(attr.render().as_bytes());
        }
        output.push(b'>');

        // Update rendered namespace context for children.
        let mut child_rendered_ns = rendered_ns.clone();
        for ns_decl in &ns_decls {
            child_rendered_ns.insert(ns_decl.prefix.clone(), ns_decl.uri.clone());
        }

        for child in node.children() {
            self.process_node(child, output, &child_rendered_ns)?;
        }

        output.extend_from_slice(b"</");
        output.extend_from_slice(elem_name.as_bytes());
        output.push(b'>');
        Ok(())
    }
}

/// Collect all in-scope namespaces for an element.
///
/// Walks up the ancestor chain collecting declarations, with closer
/// declarations overriding more distant ones.
fn collect_inscope_namespaces(node: &roxmltree::Node<'_, '_>) -> BTreeMap<String, String> {
    let mut ns_stack: Vec<BTreeMap<String, String>> = Vec::new();

    let mut current = Some(*node);
    while let Some(n) = current {
        if n.is_element() {
            let mut level = BTreeMap::new();
            for ns in n.namespaces() {
                level.insert(ns.name().unwrap_or("").to_owned(), ns.uri().to_owned());
            }
            ns_stack.push(level);
        }
        current = n.parent();
    }

    let mut result = BTreeMap::new();
    for level in ns_stack.into_iter().rev() {
        for (prefix, uri) in level {
            if uri.is_empty() {
                // Un-declaration of default namespace.
                result.remove(&prefix);
            } else {
                result.insert(prefix, uri);
            }
        }
    }
    result
}

// roxmltree nodes do not carry their source prefixes, so prefixes are
// recovered from the in-scope namespace bindings.

/// The prefix the element's namespace resolves to ("" for no namespace
/// or the default namespace).
fn element_prefix(node: &roxmltree::Node<'_, '_>) -> String {
    match node.tag_name().namespace() {
        Some(uri) => node.lookup_prefix(uri).unwrap_or("").to_owned(),
        None => String::new(),
    }
}

/// Get the qualified element name (prefix:local or just local).
fn qualified_element_name(node: &roxmltree::Node<'_, '_>) -> String {
    let prefix = element_prefix(node);
    if prefix.is_empty() {
        node.tag_name().name().to_owned()
    } else {
        format!("{}:{}", prefix, node.tag_name().name())
    }
}

/// Find the prefix for an attribute's namespace, resolved against the
/// owning element's in-scope bindings.
fn attr_prefix(
    node: &roxmltree::Node<'_, '_>,
    attr: &roxmltree::Attribute<'_, '_>,
) -> Option<String> {
    let ns_uri = attr.namespace()?;
    if ns_uri == vaxholm_core::ns::XML {
        return Some("xml".to_owned());
    }
    node.lookup_prefix(ns_uri).map(str::to_owned)
}
