#![forbid(unsafe_code)]

//! The signing pipeline.
//!
//! Stages: inspect and decorate the envelope (Timestamp, optional
//! BinarySecurityToken, `wsu:Id` on the Body), digest each referenced
//! part, insert the assembled Signature with an empty SignatureValue,
//! canonicalize `SignedInfo` in document context, sign, and fill the
//! value in.  Every stage produces a fresh string from the previous
//! one, so an error at any point leaves the caller's document as it
//! was.

use base64::Engine;
use tracing::debug;

use vaxholm_c14n::C14nMode;
use vaxholm_core::{algorithm, ns, Error, Result};
use vaxholm_crypto::AlgorithmRegistry;
use vaxholm_keys::KeyStore;
use vaxholm_xml::{NodeSet, TextEdit, XmlDocument};

use crate::envelope;
use crate::generate_id;
use crate::header::{self, EnvContext};
use crate::keyid::{self, KeyInfoIds, RenderedKeyInfo};
use crate::request::{SignaturePart, SignatureRequest};
use crate::timestamp::{self, TimestampSpec};

/// Identifiers assigned to the elements this signing run creates.
struct Plan {
    ts_id: String,
    sig_id: String,
    key_info_id: String,
    str_id: String,
    token_id: String,
}

impl Plan {
    fn new() -> Self {
        Self {
            ts_id: generate_id("TS"),
            sig_id: generate_id("SIG"),
            key_info_id: generate_id("KI"),
            str_id: generate_id("STR"),
            token_id: generate_id("X509"),
        }
    }
}

/// Sign a SOAP document with a key from the store.
///
/// On success returns the signed document text; on any failure the
/// input is left untouched and the error describes the first stage
/// that could not complete.
pub fn sign(xml: &str, store: &KeyStore, request: &SignatureRequest) -> Result<String> {
    AlgorithmRegistry::digest(&request.digest_algorithm)?;
    let signature_alg = AlgorithmRegistry::signature(&request.signature_algorithm)?;

    // Structural validation happens before any key material is
    // decrypted: a bad envelope must fail without cryptographic work.
    {
        let xdoc = XmlDocument::parse(xml.to_owned())?;
        let doc = xdoc.parse_doc()?;
        let env = envelope::inspect(&doc)?;
        envelope::find_security(&env, request.policy.actor.as_deref())?;
    }

    let entry = store.entry(&request.alias, &request.key_passphrase)?;
    let signing_key = entry.key.to_signing_key();
    if !signing_key.matches_algorithm(&request.signature_algorithm) {
        return Err(Error::SigningKey(format!(
            "{} key cannot produce {}",
            signing_key.kind(),
            request.signature_algorithm
        )));
    }

    let plan = Plan::new();
    let key_info = keyid::render_key_info(
        request.key_identifier,
        &entry,
        &KeyInfoIds {
            key_info: &plan.key_info_id,
            str_ref: &plan.str_id,
            token: &plan.token_id,
        },
    )?;

    let (decorated, body_id) = decorate(xml, request, &key_info, &plan)?;
    let with_signature = insert_signature(&decorated, request, &key_info, &plan, &body_id)?;
    finalize_signature(with_signature, request, &plan, &signing_key, signature_alg.as_ref())
}

/// Stage 1: add the Security header (or extend the existing one) with
/// the Timestamp and, when the strategy calls for it, the
/// BinarySecurityToken; make sure the Body carries a `wsu:Id`.
fn decorate(
    xml: &str,
    request: &SignatureRequest,
    key_info: &RenderedKeyInfo,
    plan: &Plan,
) -> Result<(String, String)> {
    let mut xdoc = XmlDocument::parse(xml.to_owned())?;
    xdoc.add_id_attr(ns::WSU, ns::attr::ID);
    let doc = xdoc.parse_doc()?;
    let env = envelope::inspect(&doc)?;
    debug!(version = ?env.version, "inspected SOAP envelope");

    let env_ctx = EnvContext {
        version: env.version,
        prefix: envelope::env_prefix(&env).map(str::to_owned),
    };
    let security = envelope::find_security(&env, request.policy.actor.as_deref())?;

    let spec = TimestampSpec::with_ttl(request.ttl_secs);
    let mut inner = timestamp::render(&spec, &plan.ts_id);
    if let Some(token) = &key_info.binary_token_xml {
        inner.push_str(token);
    }

    let mut edit = TextEdit::new();
    match security {
        Some(node) => {
            debug!("reusing existing Security header");
            // The Timestamp leads the header; existing children keep
            // their place ahead of the Signature appended later.
            header::queue_insert(&mut edit, header::prepend_inside(node, xdoc.text()), inner);
        }
        None => {
            let security_xml = header::render_security(&env_ctx, &request.policy, &inner);
            match env.header {
                Some(h) => header::queue_insert(
                    &mut edit,
                    header::append_inside(h, xdoc.text()),
                    security_xml,
                ),
                None => edit.insert(
                    env.body.range().start,
                    header::render_header(env_ctx.prefix.as_deref(), &security_xml),
                ),
            }
        }
    }

    let body_id = match env.body.attribute((ns::WSU, ns::attr::ID)) {
        Some(existing) => existing.to_owned(),
        None => {
            let id = generate_id("id");
            let body_range = env.body.range();
            let qname = header::qualified_name(&xdoc.text()[body_range.clone()]);
            edit.insert(
                body_range.start + 1 + qname.len(),
                format!(" xmlns:wsu=\"{}\" wsu:Id=\"{}\"", ns::WSU, id),
            );
            id
        }
    };

    let decorated = edit.apply(xdoc.text())?;
    Ok((decorated, body_id))
}

/// Stage 2: digest each referenced part of the decorated document and
/// insert the Signature skeleton (empty SignatureValue) into the
/// Security header.
fn insert_signature(
    decorated: &str,
    request: &SignatureRequest,
    key_info: &RenderedKeyInfo,
    plan: &Plan,
    body_id: &str,
) -> Result<String> {
    let b64 = base64::engine::general_purpose::STANDARD;

    let mut xdoc = XmlDocument::parse(decorated.to_owned())?;
    xdoc.add_id_attr(ns::WSU, ns::attr::ID);
    let doc = xdoc.parse_doc()?;
    let id_map = xdoc.build_id_map(&doc);

    let mut references = Vec::with_capacity(request.parts.len());
    for part in &request.parts {
        let id = match part {
            SignaturePart::Timestamp => plan.ts_id.as_str(),
            SignaturePart::Body => body_id,
            SignaturePart::Id(value) => value.as_str(),
        };
        let node = XmlDocument::find_by_id(&doc, &id_map, id)
            .ok_or_else(|| Error::UnresolvedReference(format!("no element with Id '{id}'")))?;
        let node_set = NodeSet::tree_without_comments(node);
        let canonical =
            vaxholm_c14n::canonicalize_doc(&doc, C14nMode::Exclusive, Some(&node_set), &[])?;
        let mut digest = AlgorithmRegistry::digest(&request.digest_algorithm)?;
        digest.update(&canonical);
        let value = digest.finalize();
        debug!(reference = %id, "computed reference digest");
        references.push((id.to_owned(), b64.encode(value)));
    }

    let signed_info = render_signed_info(request, &references);
    let signature_xml = format!(
        "<ds:Signature xmlns:ds=\"{}\" Id=\"{}\">{}<ds:SignatureValue></ds:SignatureValue>{}</ds:Signature>",
        ns::DSIG,
        plan.sig_id,
        signed_info,
        key_info.key_info_xml,
    );

    let env = envelope::inspect(&doc)?;
    let security = envelope::find_security(&env, request.policy.actor.as_deref())?
        .ok_or_else(|| Error::Other("Security header missing after decoration".into()))?;

    let mut edit = TextEdit::new();
    header::queue_insert(
        &mut edit,
        header::append_inside(security, xdoc.text()),
        signature_xml,
    );
    edit.apply(xdoc.text())
}

/// Stage 3: canonicalize `SignedInfo` in its final document context,
/// compute the signature value and splice it in.
fn finalize_signature(
    with_signature: String,
    request: &SignatureRequest,
    plan: &Plan,
    signing_key: &vaxholm_crypto::SigningKey,
    signature_alg: &dyn vaxholm_crypto::SignatureAlgorithm,
) -> Result<String> {
    let b64 = base64::engine::general_purpose::STANDARD;

    let xdoc = XmlDocument::parse(with_signature)?;
    let doc = xdoc.parse_doc()?;

    let signature_node = doc
        .descendants()
        .find(|n| {
            n.is_element()
                && n.tag_name().name() == ns::node::SIGNATURE
                && n.tag_name().namespace() == Some(ns::DSIG)
                && n.attribute(ns::attr::ID) == Some(plan.sig_id.as_str())
        })
        .ok_or_else(|| Error::Other("inserted Signature element not found".into()))?;
    let signed_info = child_element(signature_node, ns::DSIG, ns::node::SIGNED_INFO)
        .ok_or_else(|| Error::Other("inserted SignedInfo element not found".into()))?;

    let node_set = NodeSet::tree_without_comments(signed_info);
    let canonical =
        vaxholm_c14n::canonicalize_doc(&doc, C14nMode::Exclusive, Some(&node_set), &[])?;
    let signature = signature_alg.sign(signing_key, &canonical)?;
    debug!(algorithm = %request.signature_algorithm, "computed signature value");

    let signature_value = child_element(signature_node, ns::DSIG, ns::node::SIGNATURE_VALUE)
        .ok_or_else(|| Error::Other("inserted SignatureValue element not found".into()))?;

    let mut edit = TextEdit::new();
    edit.replace(
        signature_value.range(),
        format!("<ds:SignatureValue>{}</ds:SignatureValue>", b64.encode(signature)),
    );
    edit.apply(xdoc.text())
}

fn render_signed_info(request: &SignatureRequest, references: &[(String, String)]) -> String {
    let mut out = format!(
        "<ds:SignedInfo><ds:CanonicalizationMethod Algorithm=\"{}\"/><ds:SignatureMethod Algorithm=\"{}\"/>",
        algorithm::EXC_C14N,
        request.signature_algorithm,
    );
    for (id, digest_b64) in references {
        out.push_str(&format!(
            "<ds:Reference URI=\"#{}\"><ds:Transforms><ds:Transform Algorithm=\"{}\"/></ds:Transforms>\
             <ds:DigestMethod Algorithm=\"{}\"/><ds:DigestValue>{}</ds:DigestValue></ds:Reference>",
            id,
            algorithm::EXC_C14N,
            request.digest_algorithm,
            digest_b64,
        ));
    }
    out.push_str("</ds:SignedInfo>");
    out
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_info_lists_references_in_request_order() {
        let request = SignatureRequest::new("client", "pw");
        let references = vec![
            ("TS-1".to_owned(), "dGltZXN0YW1w".to_owned()),
            ("id-2".to_owned(), "Ym9keQ==".to_owned()),
        ];
        let xml = render_signed_info(&request, &references);

        let wrapped = format!("<ds:SignedInfo xmlns:ds=\"{}\"{}", ns::DSIG, &xml["<ds:SignedInfo".len()..]);
        let doc = roxmltree::Document::parse(&wrapped).unwrap();
        let uris: Vec<&str> = doc
            .descendants()
            .filter(|n| n.is_element() && n.tag_name().name() == ns::node::REFERENCE)
            .filter_map(|n| n.attribute(ns::attr::URI))
            .collect();
        assert_eq!(uris, vec!["#TS-1", "#id-2"]);
        assert!(wrapped.contains(algorithm::RSA_SHA256));
        assert!(wrapped.contains("<ds:DigestValue>dGltZXN0YW1w</ds:DigestValue>"));
    }
}
