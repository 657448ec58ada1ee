#![forbid(unsafe_code)]

//! PKCS#12 (.p12/.pfx) key store parser for the Vaxholm WS-Security library.
//!
//! Supports both legacy PBE (SHA-1 + 3DES-CBC) and modern PBES2
//! (PBKDF2 + AES-256-CBC) encryption as used by OpenSSL 3.x exports.
//!
//! The store MAC is verified with the store passphrase before any
//! contents are returned.  Shrouded key bags stay encrypted until
//! [`ShroudedKeyBag::decrypt`] is called, because the key passphrase may
//! differ from the store passphrase.

mod kdf;
mod parse;

use vaxholm_core::Result;

/// Contents extracted from a PKCS#12 file.
#[derive(Debug)]
pub struct Pkcs12Contents {
    /// Still-encrypted PKCS#8 private key bags.
    pub key_bags: Vec<ShroudedKeyBag>,
    /// Certificate bags (DER-encoded X.509).
    pub cert_bags: Vec<CertBag>,
}

/// A pkcs8ShroudedKeyBag with its bag attributes.
#[derive(Debug)]
pub struct ShroudedKeyBag {
    /// The `friendlyName` bag attribute, if present.  This is the store
    /// alias the key was saved under.
    pub friendly_name: Option<String>,
    /// The `localKeyID` bag attribute, if present.  Matches the key to
    /// its certificate.
    pub local_key_id: Option<Vec<u8>>,
    pub(crate) algorithm: parse::EncryptionAlgorithm,
    pub(crate) ciphertext: Vec<u8>,
}

impl ShroudedKeyBag {
    /// Decrypt this bag with the key passphrase, yielding PKCS#8 DER.
    pub fn decrypt(&self, passphrase: &str) -> Result<Vec<u8>> {
        let bmp_password = kdf::password_to_bmp(passphrase);
        parse::decrypt_data(&self.algorithm, &self.ciphertext, passphrase, &bmp_password)
    }
}

/// A certBag with its bag attributes.
#[derive(Debug)]
pub struct CertBag {
    pub friendly_name: Option<String>,
    pub local_key_id: Option<Vec<u8>>,
    /// DER-encoded X.509 certificate.
    pub cert_der: Vec<u8>,
}

/// Parse a PKCS#12 file, verifying the MAC and decrypting the safe
/// contents with the store passphrase.  Key bags remain encrypted.
pub fn parse_pkcs12(data: &[u8], store_passphrase: &str) -> Result<Pkcs12Contents> {
    parse::parse_pfx(data, store_passphrase)
}
