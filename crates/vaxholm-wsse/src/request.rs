#![forbid(unsafe_code)]

//! The signing request: which key, which algorithms, which parts.

use vaxholm_core::algorithm;

use crate::header::SecurityHeaderPolicy;
use crate::keyid::KeyIdentifier;

/// Default timestamp time to live, in seconds.
pub const DEFAULT_TTL_SECS: u64 = 300;

/// A part of the message to cover with a signature reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignaturePart {
    /// The `wsu:Timestamp` added by the engine.
    Timestamp,
    /// The SOAP Body (a `wsu:Id` is assigned if it has none).
    Body,
    /// Any element carrying the given ID value.
    Id(String),
}

/// Everything that varies per signing request.
#[derive(Debug, Clone)]
pub struct SignatureRequest {
    /// Key store alias of the signing key.
    pub alias: String,
    /// Passphrase for the aliased key (may differ from the store's).
    pub key_passphrase: String,
    /// Signature algorithm URI.
    pub signature_algorithm: String,
    /// Digest algorithm URI for the references.
    pub digest_algorithm: String,
    /// How KeyInfo identifies the signing certificate.
    pub key_identifier: KeyIdentifier,
    /// Timestamp time to live in seconds.
    pub ttl_secs: u64,
    /// Ordered parts to sign.
    pub parts: Vec<SignaturePart>,
    /// Security header addressing.
    pub policy: SecurityHeaderPolicy,
}

impl SignatureRequest {
    /// A request with the standard defaults: RSA-SHA256 signature,
    /// SHA-256 digests, IssuerSerial key identification, a 300 second
    /// timestamp and references over the Timestamp and the Body.
    pub fn new(alias: impl Into<String>, key_passphrase: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            key_passphrase: key_passphrase.into(),
            signature_algorithm: algorithm::RSA_SHA256.to_owned(),
            digest_algorithm: algorithm::SHA256.to_owned(),
            key_identifier: KeyIdentifier::default(),
            ttl_secs: DEFAULT_TTL_SECS,
            parts: vec![SignaturePart::Timestamp, SignaturePart::Body],
            policy: SecurityHeaderPolicy::default(),
        }
    }
}
