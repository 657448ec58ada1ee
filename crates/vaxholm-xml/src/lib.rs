#![forbid(unsafe_code)]

//! XML document abstraction for the Vaxholm WS-Security library.
//!
//! Provides a DOM-like interface over `roxmltree`, a `NodeSet` for subtree
//! selection during canonicalization, and a byte-offset text editor used to
//! apply all document mutations as a single build-then-commit splice.

pub mod document;
pub mod edit;
pub mod nodeset;

pub use document::XmlDocument;
pub use edit::TextEdit;
pub use nodeset::NodeSet;

/// Return roxmltree parsing options that allow DTD.
///
/// DTD is allowed because roxmltree does not expand external entities or
/// perform entity substitution beyond the five predefined XML entities,
/// so it is safe.
pub fn parsing_options() -> roxmltree::ParsingOptions {
    roxmltree::ParsingOptions {
        allow_dtd: true,
        ..roxmltree::ParsingOptions::default()
    }
}
