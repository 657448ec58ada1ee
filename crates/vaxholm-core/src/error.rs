#![forbid(unsafe_code)]

/// Errors produced by the Vaxholm WS-Security library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("XML parsing error: {0}")]
    XmlParse(String),

    #[error("malformed SOAP envelope: {0}")]
    MalformedEnvelope(String),

    #[error("duplicate wsse:Security header: {0}")]
    DuplicateSecurityHeader(String),

    #[error("unresolved signature reference: {0}")]
    UnresolvedReference(String),

    #[error("canonicalization error: {0}")]
    Canonicalization(String),

    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("alias not found in key store: {0}")]
    AliasNotFound(String),

    #[error("bad passphrase: {0}")]
    BadPassphrase(String),

    #[error("unsupported key store format: {0}")]
    UnsupportedStoreFormat(String),

    #[error("signing key error: {0}")]
    SigningKey(String),

    #[error("cryptographic error: {0}")]
    Crypto(String),

    #[error("key error: {0}")]
    Key(String),

    #[error("certificate error: {0}")]
    Certificate(String),

    #[error("base64 decode error: {0}")]
    Base64(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
