#![forbid(unsafe_code)]

//! Security header decoration.
//!
//! All mutation is expressed as text splices against the document
//! source, so decoration composes with the build-then-commit signing
//! pipeline.  The helpers here compute insertion points inside existing
//! elements (including self-closing ones) and render the new
//! `wsse:Security` element and, when needed, the SOAP Header itself.

use std::ops::Range;

use vaxholm_c14n::escape::escape_attr;
use vaxholm_core::ns;
use vaxholm_xml::TextEdit;

use crate::envelope::SoapVersion;

/// How a newly created `wsse:Security` element is addressed.
#[derive(Debug, Clone)]
pub struct SecurityHeaderPolicy {
    /// Emit the SOAP `mustUnderstand` flag on the header.
    pub must_understand: bool,
    /// SOAP 1.1 actor / SOAP 1.2 role the header is addressed to.
    pub actor: Option<String>,
}

impl Default for SecurityHeaderPolicy {
    fn default() -> Self {
        Self {
            must_understand: true,
            actor: None,
        }
    }
}

/// Envelope facts the renderers need: version plus the prefix the
/// document binds to the SOAP namespace, if any.
#[derive(Debug, Clone)]
pub(crate) struct EnvContext {
    pub version: SoapVersion,
    pub prefix: Option<String>,
}

/// Where new child content goes inside an existing element.
pub(crate) enum InnerInsert {
    At(usize),
    /// Self-closing element: the trailing `/>` has to be opened up.
    Expand { slash_gt: Range<usize>, qname: String },
}

/// Compute the insertion point for appending children to `node`.
pub(crate) fn append_inside(node: roxmltree::Node<'_, '_>, source: &str) -> InnerInsert {
    match node.last_child() {
        Some(last) => InnerInsert::At(last.range().end),
        None => childless_insert(node, source),
    }
}

/// Compute the insertion point for prepending children to `node`.
pub(crate) fn prepend_inside(node: roxmltree::Node<'_, '_>, source: &str) -> InnerInsert {
    match node.first_child() {
        Some(first) => InnerInsert::At(first.range().start),
        None => childless_insert(node, source),
    }
}

fn childless_insert(node: roxmltree::Node<'_, '_>, source: &str) -> InnerInsert {
    let range = node.range();
    let qname = qualified_name(&source[range.clone()]);
    if source[range.clone()].ends_with("/>") {
        InnerInsert::Expand {
            slash_gt: range.end - 2..range.end,
            qname,
        }
    } else {
        // `<q></q>`: insert just before the end tag
        InnerInsert::At(range.end - (qname.len() + 3))
    }
}

/// Queue the content at the computed insertion point.
pub(crate) fn queue_insert(edit: &mut TextEdit, at: InnerInsert, content: String) {
    match at {
        InnerInsert::At(offset) => edit.insert(offset, content),
        InnerInsert::Expand { slash_gt, qname } => {
            edit.replace(slash_gt, format!(">{content}</{qname}>"));
        }
    }
}

/// The qualified tag name of an element, read from its source slice.
pub(crate) fn qualified_name(slice: &str) -> String {
    slice[1..]
        .chars()
        .take_while(|c| !c.is_whitespace() && *c != '/' && *c != '>')
        .collect()
}

/// Render a new `wsse:Security` element holding `inner`.
pub(crate) fn render_security(
    env: &EnvContext,
    policy: &SecurityHeaderPolicy,
    inner: &str,
) -> String {
    let mut attrs = format!(" xmlns:wsse=\"{}\" xmlns:wsu=\"{}\"", ns::WSSE, ns::WSU);
    let env_prefix = match &env.prefix {
        Some(p) => p.as_str(),
        None => {
            // The envelope uses the default namespace; qualified SOAP
            // attributes need a prefix of their own.
            attrs.push_str(&format!(" xmlns:senv=\"{}\"", env.version.ns_uri()));
            "senv"
        }
    };
    if policy.must_understand {
        attrs.push_str(&format!(
            " {env_prefix}:mustUnderstand=\"{}\"",
            env.version.must_understand_value()
        ));
    }
    if let Some(actor) = &policy.actor {
        attrs.push_str(&format!(
            " {env_prefix}:{}=\"{}\"",
            env.version.actor_attr(),
            escape_attr(actor)
        ));
    }
    format!("<wsse:Security{attrs}>{inner}</wsse:Security>")
}

/// Render a SOAP Header element holding `inner`, using the envelope's
/// namespace binding.
pub(crate) fn render_header(env_prefix: Option<&str>, inner: &str) -> String {
    match env_prefix {
        Some(p) => format!("<{p}:Header>{inner}</{p}:Header>"),
        None => format!("<Header>{inner}</Header>"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply_append(xml: &str, target: &str, content: &str) -> String {
        let doc = roxmltree::Document::parse(xml).unwrap();
        let node = doc
            .descendants()
            .find(|n| n.is_element() && n.tag_name().name() == target)
            .unwrap();
        let mut edit = TextEdit::new();
        queue_insert(&mut edit, append_inside(node, xml), content.to_owned());
        edit.apply(xml).unwrap()
    }

    #[test]
    fn append_after_existing_children() {
        let out = apply_append("<r><h><a/> </h></r>", "h", "<b/>");
        assert_eq!(out, "<r><h><a/> <b/></h></r>");
    }

    #[test]
    fn prepend_before_existing_children() {
        let xml = "<r><h><a/> </h></r>";
        let doc = roxmltree::Document::parse(xml).unwrap();
        let node = doc
            .descendants()
            .find(|n| n.is_element() && n.tag_name().name() == "h")
            .unwrap();
        let mut edit = TextEdit::new();
        queue_insert(&mut edit, prepend_inside(node, xml), "<b/>".to_owned());
        assert_eq!(edit.apply(xml).unwrap(), "<r><h><b/><a/> </h></r>");
    }

    #[test]
    fn append_into_empty_element() {
        let out = apply_append("<r><h></h></r>", "h", "<b/>");
        assert_eq!(out, "<r><h><b/></h></r>");
    }

    #[test]
    fn append_expands_self_closing_element() {
        let out = apply_append(r#"<r><ns:h xmlns:ns="urn:x" attr="v"/></r>"#, "h", "<b/>");
        assert_eq!(out, r#"<r><ns:h xmlns:ns="urn:x" attr="v"><b/></ns:h></r>"#);
    }

    #[test]
    fn security_header_with_prefixed_envelope() {
        let env = EnvContext {
            version: SoapVersion::Soap11,
            prefix: Some("soapenv".into()),
        };
        let xml = render_security(&env, &SecurityHeaderPolicy::default(), "<x/>");
        assert!(xml.contains("soapenv:mustUnderstand=\"1\""));
        assert!(xml.contains("xmlns:wsse="));
        assert!(!xml.contains("xmlns:senv"));
    }

    #[test]
    fn security_header_declares_prefix_for_default_ns_envelope() {
        let env = EnvContext {
            version: SoapVersion::Soap12,
            prefix: None,
        };
        let policy = SecurityHeaderPolicy {
            must_understand: true,
            actor: Some("urn:gateway".into()),
        };
        let xml = render_security(&env, &policy, "");
        assert!(xml.contains("xmlns:senv=\"http://www.w3.org/2003/05/soap-envelope\""));
        assert!(xml.contains("senv:mustUnderstand=\"true\""));
        assert!(xml.contains("senv:role=\"urn:gateway\""));
    }
}
