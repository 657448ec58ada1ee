//! End-to-end signing tests over a synthetically built PKCS#12 store.
//!
//! The store holds a freshly generated RSA key and a self-signed
//! certificate, so every run exercises the full pipeline including
//! store parsing, key decryption and signature verification.

use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration as StdDuration;

use base64::Engine;
use cipher::{block_padding::Pkcs7, BlockEncryptMut, KeyIvInit};
use der::{Decode, Encode};
use pkcs8::EncodePrivateKey;
use sha2::Sha256;
use signature::Verifier;
use spki::EncodePublicKey;
use vaxholm_c14n::C14nMode;
use vaxholm_core::{algorithm, ns, Error};
use vaxholm_keys::KeyStore;
use vaxholm_wsse::{sign, KeyIdentifier, SignaturePart, SignatureRequest};
use vaxholm_xml::{NodeSet, XmlDocument};
use x509_cert::builder::{Builder, CertificateBuilder, Profile};
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;
use x509_cert::spki::SubjectPublicKeyInfoOwned;
use x509_cert::time::Validity;
use yasna::models::ObjectIdentifier;
use yasna::{DERWriter, Tag, TagClass};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;

const STORE_PASS: &str = "store-secret";
const KEY_PASS: &str = "key-secret";
const ALIAS: &str = "client";

const SOAP11_ENVELOPE: &str = concat!(
    r#"<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/">"#,
    r#"<soapenv:Body><m:Ping xmlns:m="urn:example">data</m:Ping></soapenv:Body>"#,
    r#"</soapenv:Envelope>"#,
);

// ── PKCS#12 fixture ────────────────────────────────────────────────────────

fn oid(components: &[u64]) -> ObjectIdentifier {
    ObjectIdentifier::from_slice(components)
}

fn write_bag_attributes(w: DERWriter, friendly_name: &str) {
    w.write_set_of(|w| {
        w.next().write_sequence(|w| {
            w.next().write_oid(&oid(&[1, 2, 840, 113549, 1, 9, 20]));
            w.next().write_set_of(|w| {
                let mut bytes = Vec::new();
                for c in friendly_name.encode_utf16() {
                    bytes.extend_from_slice(&c.to_be_bytes());
                }
                w.next().write_tagged_implicit(
                    Tag {
                        tag_class: TagClass::Universal,
                        tag_number: 30,
                    },
                    |w| w.write_bytes(&bytes),
                );
            });
        });
        w.next().write_sequence(|w| {
            w.next().write_oid(&oid(&[1, 2, 840, 113549, 1, 9, 21]));
            w.next().write_set_of(|w| w.next().write_bytes(&[0x01]));
        });
    });
}

fn write_pbes2_alg_id(w: DERWriter, salt: &[u8], iterations: u32, iv: &[u8]) {
    w.write_sequence(|w| {
        w.next().write_oid(&oid(&[1, 2, 840, 113549, 1, 5, 13]));
        w.next().write_sequence(|w| {
            w.next().write_sequence(|w| {
                w.next().write_oid(&oid(&[1, 2, 840, 113549, 1, 5, 12]));
                w.next().write_sequence(|w| {
                    w.next().write_bytes(salt);
                    w.next().write_u32(iterations);
                    w.next().write_sequence(|w| {
                        w.next().write_oid(&oid(&[1, 2, 840, 113549, 2, 9]));
                        w.next().write_null();
                    });
                });
            });
            w.next().write_sequence(|w| {
                w.next()
                    .write_oid(&oid(&[2, 16, 840, 1, 101, 3, 4, 1, 42]));
                w.next().write_bytes(iv);
            });
        });
    });
}

fn build_pfx(private_key: &rsa::RsaPrivateKey, cert_der: &[u8]) -> Vec<u8> {
    let pkcs8 = private_key.to_pkcs8_der().unwrap();
    let kdf_salt = b"0123456789abcdef";
    let iv = [5u8; 16];
    let iterations = 600;

    let mut key = [0u8; 32];
    pbkdf2::pbkdf2_hmac::<Sha256>(KEY_PASS.as_bytes(), kdf_salt, iterations, &mut key);
    let enc = Aes256CbcEnc::new_from_slices(&key, &iv).unwrap();
    let shrouded = enc.encrypt_padded_vec_mut::<Pkcs7>(pkcs8.as_bytes());

    let safe_contents = yasna::construct_der(|w| {
        w.write_sequence_of(|w| {
            w.next().write_sequence(|w| {
                w.next()
                    .write_oid(&oid(&[1, 2, 840, 113549, 1, 12, 10, 1, 2]));
                w.next().write_tagged(Tag::context(0), |w| {
                    w.write_sequence(|w| {
                        write_pbes2_alg_id(w.next(), kdf_salt, iterations, &iv);
                        w.next().write_bytes(&shrouded);
                    });
                });
                write_bag_attributes(w.next(), ALIAS);
            });
            w.next().write_sequence(|w| {
                w.next()
                    .write_oid(&oid(&[1, 2, 840, 113549, 1, 12, 10, 1, 3]));
                w.next().write_tagged(Tag::context(0), |w| {
                    w.write_sequence(|w| {
                        w.next().write_oid(&oid(&[1, 2, 840, 113549, 1, 9, 22, 1]));
                        w.next()
                            .write_tagged(Tag::context(0), |w| w.write_bytes(cert_der));
                    });
                });
                write_bag_attributes(w.next(), ALIAS);
            });
        });
    });

    let auth_safe = yasna::construct_der(|w| {
        w.write_sequence_of(|w| {
            w.next().write_sequence(|w| {
                w.next().write_oid(&oid(&[1, 2, 840, 113549, 1, 7, 1]));
                w.next()
                    .write_tagged(Tag::context(0), |w| w.write_bytes(&safe_contents));
            });
        });
    });

    yasna::construct_der(|w| {
        w.write_sequence(|w| {
            w.next().write_u32(3);
            w.next().write_sequence(|w| {
                w.next().write_oid(&oid(&[1, 2, 840, 113549, 1, 7, 1]));
                w.next()
                    .write_tagged(Tag::context(0), |w| w.write_bytes(&auth_safe));
            });
        });
    })
}

struct Fixture {
    pfx: Vec<u8>,
    cert_der: Vec<u8>,
    private_key: rsa::RsaPrivateKey,
}

fn fixture() -> &'static Fixture {
    static FIXTURE: OnceLock<Fixture> = OnceLock::new();
    FIXTURE.get_or_init(|| {
        vaxholm_wsse::init();
        let private_key = rsa::RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap();

        let spki_der = rsa::RsaPublicKey::from(&private_key)
            .to_public_key_der()
            .unwrap();
        let spki = SubjectPublicKeyInfoOwned::from_der(spki_der.as_bytes()).unwrap();
        let signer = rsa::pkcs1v15::SigningKey::<Sha256>::new(private_key.clone());
        let builder = CertificateBuilder::new(
            Profile::Root,
            SerialNumber::from(897_234u32),
            Validity::from_now(StdDuration::from_secs(3600)).unwrap(),
            Name::from_str("CN=Vaxholm Test").unwrap(),
            spki,
            &signer,
        )
        .unwrap();
        let cert_der = builder
            .build::<rsa::pkcs1v15::Signature>()
            .unwrap()
            .to_der()
            .unwrap();

        let pfx = build_pfx(&private_key, &cert_der);
        Fixture {
            pfx,
            cert_der,
            private_key,
        }
    })
}

fn open_store() -> KeyStore {
    KeyStore::open(&fixture().pfx, STORE_PASS).unwrap()
}

// ── Output inspection helpers ──────────────────────────────────────────────

fn parse_output(output: &str) -> XmlDocument {
    let mut xdoc = XmlDocument::parse(output.to_owned()).unwrap();
    xdoc.add_id_attr(ns::WSU, ns::attr::ID);
    xdoc
}

fn element_text<'a>(doc: &'a roxmltree::Document<'a>, ns_uri: &str, local: &str) -> &'a str {
    doc.descendants()
        .find(|n| {
            n.is_element()
                && n.tag_name().name() == local
                && n.tag_name().namespace() == Some(ns_uri)
        })
        .and_then(|n| n.text())
        .unwrap()
}

/// Recompute the digest of the element a `ds:Reference` points at and
/// compare with the recorded DigestValue.
fn check_reference_digest(xdoc: &XmlDocument, uri: &str) {
    let doc = xdoc.parse_doc().unwrap();
    let id_map = xdoc.build_id_map(&doc);
    let id = uri.strip_prefix('#').unwrap();
    let target = XmlDocument::find_by_id(&doc, &id_map, id).unwrap();

    let node_set = NodeSet::tree_without_comments(target);
    let canonical =
        vaxholm_c14n::canonicalize_doc(&doc, C14nMode::Exclusive, Some(&node_set), &[]).unwrap();
    let expected = base64::engine::general_purpose::STANDARD
        .encode(vaxholm_crypto::digest::digest(algorithm::SHA256, &canonical).unwrap());

    let recorded = doc
        .descendants()
        .find(|n| {
            n.is_element()
                && n.tag_name().name() == ns::node::REFERENCE
                && n.attribute(ns::attr::URI) == Some(uri)
        })
        .and_then(|r| {
            r.descendants()
                .find(|n| n.is_element() && n.tag_name().name() == ns::node::DIGEST_VALUE)
        })
        .and_then(|n| n.text())
        .unwrap();
    assert_eq!(recorded, expected);
}

// ── Tests ──────────────────────────────────────────────────────────────────

#[test]
fn signs_soap11_envelope_with_defaults() {
    let store = open_store();
    let request = SignatureRequest::new(ALIAS, KEY_PASS);
    let output = sign(SOAP11_ENVELOPE, &store, &request).unwrap();

    let xdoc = parse_output(&output);
    let doc = xdoc.parse_doc().unwrap();

    // Header and Security were created
    let security = doc
        .descendants()
        .find(|n| {
            n.is_element()
                && n.tag_name().name() == ns::node::SECURITY
                && n.tag_name().namespace() == Some(ns::WSSE)
        })
        .unwrap();
    assert_eq!(
        security.attribute((ns::SOAP11, ns::attr::MUST_UNDERSTAND)),
        Some("1")
    );

    // Timestamp first, then the Signature
    let children: Vec<&str> = security
        .children()
        .filter(|n| n.is_element())
        .map(|n| n.tag_name().name())
        .collect();
    assert_eq!(children, vec![ns::node::TIMESTAMP, ns::node::SIGNATURE]);

    // IssuerSerial KeyInfo identifies the test certificate
    assert_eq!(
        element_text(&doc, ns::DSIG, ns::node::X509_ISSUER_NAME),
        "CN=Vaxholm Test"
    );
    assert_eq!(
        element_text(&doc, ns::DSIG, ns::node::X509_SERIAL_NUMBER),
        "897234"
    );

    // Two references, each with a correct digest
    let uris: Vec<String> = doc
        .descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == ns::node::REFERENCE)
        .filter_map(|n| n.attribute(ns::attr::URI))
        .map(str::to_owned)
        .collect();
    assert_eq!(uris.len(), 2);
    for uri in &uris {
        check_reference_digest(&xdoc, uri);
    }

    // The signature value verifies against the generated key
    let signed_info = doc
        .descendants()
        .find(|n| n.is_element() && n.tag_name().name() == ns::node::SIGNED_INFO)
        .unwrap();
    let node_set = NodeSet::tree_without_comments(signed_info);
    let canonical =
        vaxholm_c14n::canonicalize_doc(&doc, C14nMode::Exclusive, Some(&node_set), &[]).unwrap();

    let sig_b64 = element_text(&doc, ns::DSIG, ns::node::SIGNATURE_VALUE);
    let sig_bytes = base64::engine::general_purpose::STANDARD
        .decode(sig_b64)
        .unwrap();
    let verifying_key = rsa::pkcs1v15::VerifyingKey::<Sha256>::new(rsa::RsaPublicKey::from(
        &fixture().private_key,
    ));
    let signature = rsa::pkcs1v15::Signature::try_from(sig_bytes.as_slice()).unwrap();
    verifying_key.verify(&canonical, &signature).unwrap();
}

#[test]
fn timestamp_ttl_is_honored() {
    let store = open_store();
    let mut request = SignatureRequest::new(ALIAS, KEY_PASS);
    request.ttl_secs = 60;
    let output = sign(SOAP11_ENVELOPE, &store, &request).unwrap();

    let xdoc = parse_output(&output);
    let doc = xdoc.parse_doc().unwrap();
    let created =
        chrono::DateTime::parse_from_rfc3339(element_text(&doc, ns::WSU, ns::node::CREATED))
            .unwrap();
    let expires =
        chrono::DateTime::parse_from_rfc3339(element_text(&doc, ns::WSU, ns::node::EXPIRES))
            .unwrap();
    assert_eq!(expires - created, chrono::Duration::seconds(60));
}

#[test]
fn binary_security_token_strategy_embeds_certificate() {
    let store = open_store();
    let mut request = SignatureRequest::new(ALIAS, KEY_PASS);
    request.key_identifier = KeyIdentifier::BinarySecurityToken;
    let output = sign(SOAP11_ENVELOPE, &store, &request).unwrap();

    let xdoc = parse_output(&output);
    let doc = xdoc.parse_doc().unwrap();

    let token = doc
        .descendants()
        .find(|n| n.is_element() && n.tag_name().name() == ns::node::BINARY_SECURITY_TOKEN)
        .unwrap();
    assert_eq!(token.attribute(ns::attr::VALUE_TYPE), Some(ns::X509V3));
    let cert = base64::engine::general_purpose::STANDARD
        .decode(token.text().unwrap())
        .unwrap();
    assert_eq!(cert, fixture().cert_der);

    // The SecurityTokenReference points at the embedded token
    let token_id = token.attribute((ns::WSU, ns::attr::ID)).unwrap();
    let str_ref = doc
        .descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == ns::node::REFERENCE)
        .find(|n| n.tag_name().namespace() == Some(ns::WSSE))
        .unwrap();
    assert_eq!(
        str_ref.attribute(ns::attr::URI).unwrap(),
        format!("#{token_id}")
    );

    // Token sits between the Timestamp and the Signature
    let security = doc
        .descendants()
        .find(|n| n.is_element() && n.tag_name().name() == ns::node::SECURITY)
        .unwrap();
    let children: Vec<&str> = security
        .children()
        .filter(|n| n.is_element())
        .map(|n| n.tag_name().name())
        .collect();
    assert_eq!(
        children,
        vec![
            ns::node::TIMESTAMP,
            ns::node::BINARY_SECURITY_TOKEN,
            ns::node::SIGNATURE
        ]
    );
}

#[test]
fn soap12_envelope_gets_role_and_true_must_understand() {
    let store = open_store();
    let mut request = SignatureRequest::new(ALIAS, KEY_PASS);
    request.policy.actor = Some("urn:gateway".into());
    let input = concat!(
        r#"<Envelope xmlns="http://www.w3.org/2003/05/soap-envelope">"#,
        r#"<Body><Ping xmlns="urn:example"/></Body></Envelope>"#,
    );
    let output = sign(input, &store, &request).unwrap();

    let xdoc = parse_output(&output);
    let doc = xdoc.parse_doc().unwrap();
    let security = doc
        .descendants()
        .find(|n| n.is_element() && n.tag_name().name() == ns::node::SECURITY)
        .unwrap();
    assert_eq!(
        security.attribute((ns::SOAP12, ns::attr::MUST_UNDERSTAND)),
        Some("true")
    );
    assert_eq!(
        security.attribute((ns::SOAP12, ns::attr::ROLE)),
        Some("urn:gateway")
    );
}

#[test]
fn existing_security_header_is_reused() {
    let store = open_store();
    let request = SignatureRequest::new(ALIAS, KEY_PASS);
    let input = format!(
        concat!(
            r#"<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/" xmlns:wsse="{}">"#,
            r#"<soapenv:Header><wsse:Security soapenv:mustUnderstand="1"></wsse:Security></soapenv:Header>"#,
            r#"<soapenv:Body><Ping xmlns="urn:example"/></soapenv:Body></soapenv:Envelope>"#,
        ),
        ns::WSSE
    );
    let output = sign(&input, &store, &request).unwrap();

    let xdoc = parse_output(&output);
    let doc = xdoc.parse_doc().unwrap();
    let headers: Vec<_> = doc
        .descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == ns::node::SECURITY)
        .collect();
    assert_eq!(headers.len(), 1);
    let children: Vec<&str> = headers[0]
        .children()
        .filter(|n| n.is_element())
        .map(|n| n.tag_name().name())
        .collect();
    assert_eq!(children, vec![ns::node::TIMESTAMP, ns::node::SIGNATURE]);
}

#[test]
fn timestamp_leads_a_security_header_with_prior_content() {
    let store = open_store();
    let request = SignatureRequest::new(ALIAS, KEY_PASS);
    let input = format!(
        concat!(
            r#"<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/" xmlns:wsse="{}">"#,
            r#"<soapenv:Header><wsse:Security><wsse:UsernameToken/></wsse:Security></soapenv:Header>"#,
            r#"<soapenv:Body><Ping xmlns="urn:example"/></soapenv:Body></soapenv:Envelope>"#,
        ),
        ns::WSSE
    );
    let output = sign(&input, &store, &request).unwrap();

    let xdoc = parse_output(&output);
    let doc = xdoc.parse_doc().unwrap();
    let security = doc
        .descendants()
        .find(|n| n.is_element() && n.tag_name().name() == ns::node::SECURITY)
        .unwrap();
    let children: Vec<&str> = security
        .children()
        .filter(|n| n.is_element())
        .map(|n| n.tag_name().name())
        .collect();
    assert_eq!(
        children,
        vec![ns::node::TIMESTAMP, "UsernameToken", ns::node::SIGNATURE]
    );
}

#[test]
fn duplicate_security_header_is_rejected() {
    let store = open_store();
    let request = SignatureRequest::new(ALIAS, KEY_PASS);
    let input = format!(
        concat!(
            r#"<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/" xmlns:wsse="{}">"#,
            r#"<soapenv:Header><wsse:Security/><wsse:Security/></soapenv:Header>"#,
            r#"<soapenv:Body/></soapenv:Envelope>"#,
        ),
        ns::WSSE
    );
    let err = sign(&input, &store, &request).unwrap_err();
    assert!(matches!(err, Error::DuplicateSecurityHeader(_)));
}

#[test]
fn non_soap_document_is_rejected() {
    let store = open_store();
    let request = SignatureRequest::new(ALIAS, KEY_PASS);
    let err = sign("<Order xmlns='urn:shop'/>", &store, &request).unwrap_err();
    assert!(matches!(err, Error::MalformedEnvelope(_)));
}

#[test]
fn bad_envelope_fails_before_key_material_is_touched() {
    let store = open_store();
    // A wrong key passphrase would surface as BadPassphrase if the key
    // bag were decrypted first.
    let request = SignatureRequest::new(ALIAS, "not-the-key-passphrase");
    let err = sign("<Order xmlns='urn:shop'/>", &store, &request).unwrap_err();
    assert!(matches!(err, Error::MalformedEnvelope(_)));
}

#[test]
fn unknown_alias_is_alias_not_found() {
    let store = open_store();
    let request = SignatureRequest::new("server", KEY_PASS);
    let err = sign(SOAP11_ENVELOPE, &store, &request).unwrap_err();
    assert!(matches!(err, Error::AliasNotFound(_)));
}

#[test]
fn unsupported_digest_algorithm_is_rejected() {
    let store = open_store();
    let mut request = SignatureRequest::new(ALIAS, KEY_PASS);
    request.digest_algorithm = "urn:not-a-digest".into();
    let err = sign(SOAP11_ENVELOPE, &store, &request).unwrap_err();
    assert!(matches!(err, Error::UnsupportedAlgorithm(_)));
}

#[test]
fn missing_reference_target_is_unresolved() {
    let store = open_store();
    let mut request = SignatureRequest::new(ALIAS, KEY_PASS);
    request.parts = vec![
        SignaturePart::Timestamp,
        SignaturePart::Id("no-such-id".into()),
    ];
    let err = sign(SOAP11_ENVELOPE, &store, &request).unwrap_err();
    assert!(matches!(err, Error::UnresolvedReference(_)));
}
