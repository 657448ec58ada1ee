#![forbid(unsafe_code)]

//! WS-Security message signing for the Vaxholm library.
//!
//! Takes a SOAP 1.1 or 1.2 document and a PKCS#12 key store entry and
//! produces the same document with a `wsse:Security` header carrying a
//! `wsu:Timestamp` and an XML-DSig signature over the timestamp and the
//! body (or any other addressed parts).  The pipeline builds the signed
//! document as a new string; the caller's input is never mutated, so a
//! failure at any stage leaves nothing half-signed.

pub mod envelope;
pub mod header;
pub mod keyid;
pub mod request;
pub mod sign;
pub mod timestamp;

use std::fmt::Write;
use std::sync::Once;

pub use envelope::SoapVersion;
pub use header::SecurityHeaderPolicy;
pub use keyid::KeyIdentifier;
pub use request::{SignaturePart, SignatureRequest, DEFAULT_TTL_SECS};
pub use sign::sign;
pub use timestamp::TimestampSpec;

static INIT: Once = Once::new();

/// Initialize process-wide state (the algorithm registry).
///
/// Idempotent and thread-safe; callers that skip it get lazy
/// initialization on first use instead.
pub fn init() {
    INIT.call_once(vaxholm_crypto::init);
}

/// Random document-unique identifier, e.g. `TS-5B1E...`.
pub(crate) fn generate_id(prefix: &str) -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    let mut id = String::with_capacity(prefix.len() + 33);
    id.push_str(prefix);
    id.push('-');
    for b in bytes {
        let _ = write!(id, "{b:02X}");
    }
    id
}
