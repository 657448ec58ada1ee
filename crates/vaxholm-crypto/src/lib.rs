#![forbid(unsafe_code)]

//! Cryptographic algorithm implementations for the Vaxholm WS-Security
//! library.
//!
//! Provides the digest and signature primitives needed by XML-DSig,
//! dispatched by algorithm URI through [`AlgorithmRegistry`].

pub mod digest;
pub mod registry;
pub mod sign;

pub use digest::DigestAlgorithm;
pub use registry::{init, AlgorithmRegistry};
pub use sign::{SignatureAlgorithm, SigningKey};
