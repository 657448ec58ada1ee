#![forbid(unsafe_code)]

//! Algorithm registry mapping URIs to factory functions.
//!
//! The registry is process-wide and built exactly once.  [`init`] may be
//! called any number of times from any thread; the first call (or the
//! first lookup) freezes the built-in algorithm table.

use crate::digest::DigestAlgorithm;
use crate::sign::SignatureAlgorithm;
use std::collections::HashMap;
use std::sync::OnceLock;
use vaxholm_core::Error;

type DigestFactory = fn(&str) -> Result<Box<dyn DigestAlgorithm>, Error>;
type SignatureFactory = fn(&str) -> Result<Box<dyn SignatureAlgorithm>, Error>;

struct Registry {
    digests: HashMap<&'static str, DigestFactory>,
    signatures: HashMap<&'static str, SignatureFactory>,
}

impl Registry {
    fn builtin() -> Self {
        use vaxholm_core::algorithm as alg;
        let mut digests: HashMap<&'static str, DigestFactory> = HashMap::new();
        for uri in [alg::SHA1, alg::SHA256, alg::SHA384, alg::SHA512] {
            digests.insert(uri, crate::digest::from_uri);
        }

        let mut signatures: HashMap<&'static str, SignatureFactory> = HashMap::new();
        for uri in [
            alg::RSA_SHA1,
            alg::RSA_SHA256,
            alg::RSA_SHA384,
            alg::RSA_SHA512,
            alg::ECDSA_SHA256,
            alg::ECDSA_SHA384,
        ] {
            signatures.insert(uri, crate::sign::from_uri);
        }

        Self {
            digests,
            signatures,
        }
    }
}

static REGISTRY: OnceLock<Registry> = OnceLock::new();

fn global() -> &'static Registry {
    REGISTRY.get_or_init(Registry::builtin)
}

/// Initialize the process-wide algorithm registry.  Idempotent.
pub fn init() {
    let _ = global();
}

/// Central registry for all cryptographic algorithms.
pub struct AlgorithmRegistry;

impl AlgorithmRegistry {
    /// Look up a digest algorithm by URI.
    pub fn digest(uri: &str) -> Result<Box<dyn DigestAlgorithm>, Error> {
        match global().digests.get(uri) {
            Some(factory) => factory(uri),
            None => Err(Error::UnsupportedAlgorithm(format!(
                "digest algorithm: {uri}"
            ))),
        }
    }

    /// Look up a signature algorithm by URI.
    pub fn signature(uri: &str) -> Result<Box<dyn SignatureAlgorithm>, Error> {
        match global().signatures.get(uri) {
            Some(factory) => factory(uri),
            None => Err(Error::UnsupportedAlgorithm(format!(
                "signature algorithm: {uri}"
            ))),
        }
    }
}
