#![forbid(unsafe_code)]

//! SOAP envelope inspection.
//!
//! Locates Envelope, Header and Body, detects the SOAP version from the
//! envelope namespace, and finds the `wsse:Security` header addressed to
//! a given actor (SOAP 1.1) or role (SOAP 1.2).

use vaxholm_core::{ns, Error, Result};

/// SOAP protocol version, detected from the envelope namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoapVersion {
    Soap11,
    Soap12,
}

impl SoapVersion {
    pub fn ns_uri(&self) -> &'static str {
        match self {
            Self::Soap11 => ns::SOAP11,
            Self::Soap12 => ns::SOAP12,
        }
    }

    pub fn from_ns(uri: &str) -> Option<Self> {
        match uri {
            ns::SOAP11 => Some(Self::Soap11),
            ns::SOAP12 => Some(Self::Soap12),
            _ => None,
        }
    }

    /// The attribute naming the intended recipient of a header block.
    pub fn actor_attr(&self) -> &'static str {
        match self {
            Self::Soap11 => ns::attr::ACTOR,
            Self::Soap12 => ns::attr::ROLE,
        }
    }

    /// Lexical form of a true `mustUnderstand` flag.
    pub fn must_understand_value(&self) -> &'static str {
        match self {
            Self::Soap11 => "1",
            Self::Soap12 => "true",
        }
    }
}

/// The structural parts of a SOAP envelope.
pub struct Envelope<'a> {
    pub version: SoapVersion,
    pub envelope: roxmltree::Node<'a, 'a>,
    pub header: Option<roxmltree::Node<'a, 'a>>,
    pub body: roxmltree::Node<'a, 'a>,
}

/// Inspect a parsed document as a SOAP envelope.
pub fn inspect<'a>(doc: &'a roxmltree::Document<'a>) -> Result<Envelope<'a>> {
    let root = doc.root_element();
    let root_ns = root.tag_name().namespace().unwrap_or("");

    if root.tag_name().name() != ns::node::ENVELOPE {
        return Err(Error::MalformedEnvelope(format!(
            "document root is <{}>, not a SOAP Envelope",
            root.tag_name().name()
        )));
    }
    let version = SoapVersion::from_ns(root_ns).ok_or_else(|| {
        Error::MalformedEnvelope(format!("unknown envelope namespace '{root_ns}'"))
    })?;

    let soap_ns = version.ns_uri();
    let header = child_element(root, soap_ns, ns::node::HEADER);
    let body = child_element(root, soap_ns, ns::node::BODY)
        .ok_or_else(|| Error::MalformedEnvelope("envelope has no Body".into()))?;

    Ok(Envelope {
        version,
        envelope: root,
        header,
        body,
    })
}

/// The prefix bound to the envelope namespace at the document root, if
/// the envelope is not in the default namespace.
pub fn env_prefix<'a>(envelope: &Envelope<'a>) -> Option<&'a str> {
    envelope
        .envelope
        .lookup_prefix(envelope.version.ns_uri())
        .filter(|p| !p.is_empty())
}

/// Find the `wsse:Security` header addressed to `actor`.
///
/// `None` as the actor matches a Security header with no actor/role
/// attribute.  More than one header for the same actor is a fault.
pub fn find_security<'a>(
    envelope: &Envelope<'a>,
    actor: Option<&str>,
) -> Result<Option<roxmltree::Node<'a, 'a>>> {
    let Some(header) = envelope.header else {
        return Ok(None);
    };
    let soap_ns = envelope.version.ns_uri();
    let actor_attr = envelope.version.actor_attr();

    let mut found = None;
    for child in header.children() {
        if !child.is_element()
            || child.tag_name().name() != ns::node::SECURITY
            || child.tag_name().namespace() != Some(ns::WSSE)
        {
            continue;
        }
        if child.attribute((soap_ns, actor_attr)) != actor {
            continue;
        }
        if found.is_some() {
            return Err(Error::DuplicateSecurityHeader(match actor {
                Some(a) => format!("more than one Security header for actor '{a}'"),
                None => "more than one Security header without an actor".into(),
            }));
        }
        found = Some(child);
    }
    Ok(found)
}

fn child_element<'a>(
    parent: roxmltree::Node<'a, 'a>,
    ns_uri: &str,
    local_name: &str,
) -> Option<roxmltree::Node<'a, 'a>> {
    parent.children().find(|n| {
        n.is_element()
            && n.tag_name().name() == local_name
            && n.tag_name().namespace().unwrap_or("") == ns_uri
    })
}
