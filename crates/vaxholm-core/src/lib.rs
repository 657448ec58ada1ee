#![forbid(unsafe_code)]

//! Core types for the Vaxholm WS-Security library.
//!
//! Defines the error taxonomy shared by every crate in the workspace,
//! the XML namespace constants, and the algorithm URI constants.

pub mod algorithm;
pub mod error;
pub mod ns;

pub use error::{Error, Result};
