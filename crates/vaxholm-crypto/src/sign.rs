#![forbid(unsafe_code)]

//! Signature algorithm implementations (RSA PKCS#1 v1.5, ECDSA).

use signature::SignatureEncoding;
use vaxholm_core::{algorithm, Error};

/// Key material for signature operations.
pub enum SigningKey {
    Rsa(rsa::RsaPrivateKey),
    EcP256(p256::ecdsa::SigningKey),
    EcP384(p384::ecdsa::SigningKey),
}

impl SigningKey {
    /// Human-readable key type, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Rsa(_) => "RSA",
            Self::EcP256(_) => "EC P-256",
            Self::EcP384(_) => "EC P-384",
        }
    }

    /// Whether this key can be used with the given signature algorithm URI.
    pub fn matches_algorithm(&self, uri: &str) -> bool {
        match self {
            Self::Rsa(_) => matches!(
                uri,
                algorithm::RSA_SHA1
                    | algorithm::RSA_SHA256
                    | algorithm::RSA_SHA384
                    | algorithm::RSA_SHA512
            ),
            Self::EcP256(_) => uri == algorithm::ECDSA_SHA256,
            Self::EcP384(_) => uri == algorithm::ECDSA_SHA384,
        }
    }
}

/// Trait for signature algorithms.
pub trait SignatureAlgorithm: Send {
    fn uri(&self) -> &'static str;
    fn sign(&self, key: &SigningKey, data: &[u8]) -> Result<Vec<u8>, Error>;
}

/// Create a signature algorithm from its URI.
pub fn from_uri(uri: &str) -> Result<Box<dyn SignatureAlgorithm>, Error> {
    match uri {
        algorithm::RSA_SHA1 => Ok(Box::new(RsaPkcs1v15 {
            uri: algorithm::RSA_SHA1,
            hash: HashType::Sha1,
        })),
        algorithm::RSA_SHA256 => Ok(Box::new(RsaPkcs1v15 {
            uri: algorithm::RSA_SHA256,
            hash: HashType::Sha256,
        })),
        algorithm::RSA_SHA384 => Ok(Box::new(RsaPkcs1v15 {
            uri: algorithm::RSA_SHA384,
            hash: HashType::Sha384,
        })),
        algorithm::RSA_SHA512 => Ok(Box::new(RsaPkcs1v15 {
            uri: algorithm::RSA_SHA512,
            hash: HashType::Sha512,
        })),

        algorithm::ECDSA_SHA256 => Ok(Box::new(EcdsaP256 {
            uri: algorithm::ECDSA_SHA256,
        })),
        algorithm::ECDSA_SHA384 => Ok(Box::new(EcdsaP384 {
            uri: algorithm::ECDSA_SHA384,
        })),

        _ => Err(Error::UnsupportedAlgorithm(format!(
            "signature algorithm: {uri}"
        ))),
    }
}

#[derive(Debug, Clone, Copy)]
enum HashType {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

// ── RSA PKCS#1 v1.5 ─────────────────────────────────────────────────

struct RsaPkcs1v15 {
    uri: &'static str,
    hash: HashType,
}

impl RsaPkcs1v15 {
    fn sign_with_key(
        &self,
        private_key: &rsa::RsaPrivateKey,
        data: &[u8],
    ) -> Result<Vec<u8>, Error> {
        use signature::Signer;
        macro_rules! do_sign {
            ($hasher:ty) => {{
                let sk = rsa::pkcs1v15::SigningKey::<$hasher>::new(private_key.clone());
                Ok(sk.sign(data).to_vec())
            }};
        }
        match self.hash {
            HashType::Sha1 => do_sign!(sha1::Sha1),
            HashType::Sha256 => do_sign!(sha2::Sha256),
            HashType::Sha384 => do_sign!(sha2::Sha384),
            HashType::Sha512 => do_sign!(sha2::Sha512),
        }
    }
}

impl SignatureAlgorithm for RsaPkcs1v15 {
    fn uri(&self) -> &'static str {
        self.uri
    }

    fn sign(&self, key: &SigningKey, data: &[u8]) -> Result<Vec<u8>, Error> {
        match key {
            SigningKey::Rsa(pk) => self.sign_with_key(pk, data),
            other => Err(Error::SigningKey(format!(
                "RSA private key required, got {}",
                other.kind()
            ))),
        }
    }
}

// ── ECDSA P-256 ──────────────────────────────────────────────────────

struct EcdsaP256 {
    uri: &'static str,
}

/// Convert a P-256 signature to XML-DSig r||s format.
pub fn p256_to_xmldsig(sig: &p256::ecdsa::Signature) -> Vec<u8> {
    let (r, s) = sig.split_bytes();
    let mut out = Vec::with_capacity(64);
    out.extend_from_slice(&r);
    out.extend_from_slice(&s);
    out
}

impl SignatureAlgorithm for EcdsaP256 {
    fn uri(&self) -> &'static str {
        self.uri
    }

    fn sign(&self, key: &SigningKey, data: &[u8]) -> Result<Vec<u8>, Error> {
        use signature::Signer;
        let SigningKey::EcP256(sk) = key else {
            return Err(Error::SigningKey(format!(
                "P-256 signing key required, got {}",
                key.kind()
            )));
        };
        let sig: p256::ecdsa::Signature = sk.sign(data);
        Ok(p256_to_xmldsig(&sig))
    }
}

// ── ECDSA P-384 ──────────────────────────────────────────────────────

struct EcdsaP384 {
    uri: &'static str,
}

/// Convert a P-384 signature to XML-DSig r||s format.
pub fn p384_to_xmldsig(sig: &p384::ecdsa::Signature) -> Vec<u8> {
    let (r, s) = sig.split_bytes();
    let mut out = Vec::with_capacity(96);
    out.extend_from_slice(&r);
    out.extend_from_slice(&s);
    out
}

impl SignatureAlgorithm for EcdsaP384 {
    fn uri(&self) -> &'static str {
        self.uri
    }

    fn sign(&self, key: &SigningKey, data: &[u8]) -> Result<Vec<u8>, Error> {
        use signature::Signer;
        let SigningKey::EcP384(sk) = key else {
            return Err(Error::SigningKey(format!(
                "P-384 signing key required, got {}",
                key.kind()
            )));
        };
        let sig: p384::ecdsa::Signature = sk.sign(data);
        Ok(p384_to_xmldsig(&sig))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_uri_rejected() {
        assert!(matches!(
            from_uri("http://www.w3.org/2000/09/xmldsig#dsa-sha1"),
            Err(Error::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn rsa_sha256_roundtrip() {
        use signature::Verifier;
        let mut rng = rand::thread_rng();
        let private = rsa::RsaPrivateKey::new(&mut rng, 2048).unwrap();
        let alg = from_uri(algorithm::RSA_SHA256).unwrap();
        let sig = alg
            .sign(&SigningKey::Rsa(private.clone()), b"signed info bytes")
            .unwrap();
        assert_eq!(sig.len(), 256);

        let vk = rsa::pkcs1v15::VerifyingKey::<sha2::Sha256>::new(private.to_public_key());
        let parsed = rsa::pkcs1v15::Signature::try_from(sig.as_slice()).unwrap();
        assert!(vk.verify(b"signed info bytes", &parsed).is_ok());
    }

    #[test]
    fn key_algorithm_mismatch_is_signing_key_error() {
        let mut rng = rand::thread_rng();
        let sk = p256::ecdsa::SigningKey::random(&mut rng);
        let alg = from_uri(algorithm::RSA_SHA256).unwrap();
        let err = alg.sign(&SigningKey::EcP256(sk), b"data").unwrap_err();
        assert!(matches!(err, Error::SigningKey(_)));
    }

    #[test]
    fn ecdsa_p256_produces_raw_rs() {
        let mut rng = rand::thread_rng();
        let sk = p256::ecdsa::SigningKey::random(&mut rng);
        let alg = from_uri(algorithm::ECDSA_SHA256).unwrap();
        let sig = alg.sign(&SigningKey::EcP256(sk), b"data").unwrap();
        assert_eq!(sig.len(), 64);
    }
}
