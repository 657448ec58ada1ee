#![forbid(unsafe_code)]

//! Key material handling for the Vaxholm WS-Security library.
//!
//! Resolves a signing key and certificate chain out of a PKCS#12 store by
//! alias, and provides the X.509 accessors the signature KeyInfo needs
//! (issuer name, serial, SubjectKeyIdentifier, thumbprint).

pub mod key;
pub mod store;
pub mod x509;

pub use key::PrivateKey;
pub use store::{KeyEntry, KeyStore};
