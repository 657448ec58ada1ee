#![forbid(unsafe_code)]

pub use vaxholm_c14n as c14n;
pub use vaxholm_core as core;
pub use vaxholm_crypto as crypto;
pub use vaxholm_keys as keys;
pub use vaxholm_pkcs12 as pkcs12;
pub use vaxholm_wsse as wsse;
pub use vaxholm_xml as xml;
