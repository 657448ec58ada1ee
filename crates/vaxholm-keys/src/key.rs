#![forbid(unsafe_code)]

//! Private key decoding.
//!
//! Key stores shroud keys as encrypted PKCS#8.  After decryption we try
//! the supported key types in order of how common they are in WS-Security
//! deployments: RSA first, then EC P-256 and P-384.

use pkcs8::DecodePrivateKey;
use spki::EncodePublicKey;
use vaxholm_core::{Error, Result};
use vaxholm_crypto::SigningKey;

/// A decoded signing key.
pub enum PrivateKey {
    Rsa(rsa::RsaPrivateKey),
    EcP256(p256::ecdsa::SigningKey),
    EcP384(p384::ecdsa::SigningKey),
}

impl std::fmt::Debug for PrivateKey {
    // Never print key material.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PrivateKey(")?;
        f.write_str(self.kind())?;
        f.write_str(")")
    }
}

impl PrivateKey {
    /// Decode a PKCS#8 DER private key, trying RSA, then P-256, then P-384.
    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self> {
        if let Ok(key) = rsa::RsaPrivateKey::from_pkcs8_der(der) {
            return Ok(Self::Rsa(key));
        }
        if let Ok(key) = p256::ecdsa::SigningKey::from_pkcs8_der(der) {
            return Ok(Self::EcP256(key));
        }
        if let Ok(key) = p384::ecdsa::SigningKey::from_pkcs8_der(der) {
            return Ok(Self::EcP384(key));
        }
        Err(Error::SigningKey(
            "private key is not a supported PKCS#8 type (RSA, EC P-256, EC P-384)".into(),
        ))
    }

    /// Human-readable key type, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Rsa(_) => "RSA",
            Self::EcP256(_) => "EC P-256",
            Self::EcP384(_) => "EC P-384",
        }
    }

    /// Convert into the signature-layer key representation.
    pub fn to_signing_key(&self) -> SigningKey {
        match self {
            Self::Rsa(key) => SigningKey::Rsa(key.clone()),
            Self::EcP256(key) => SigningKey::EcP256(key.clone()),
            Self::EcP384(key) => SigningKey::EcP384(key.clone()),
        }
    }

    /// DER-encoded SubjectPublicKeyInfo for this key.
    ///
    /// Used to check that an aliased key actually matches the certificate
    /// stored next to it.
    pub fn public_key_der(&self) -> Result<Vec<u8>> {
        let doc = match self {
            Self::Rsa(key) => rsa::RsaPublicKey::from(key).to_public_key_der(),
            Self::EcP256(key) => key.verifying_key().to_public_key_der(),
            Self::EcP384(key) => key.verifying_key().to_public_key_der(),
        }
        .map_err(|e| Error::Key(format!("SPKI encoding failed: {e}")))?;
        Ok(doc.into_vec())
    }
}
