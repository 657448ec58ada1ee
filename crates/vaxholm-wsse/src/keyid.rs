#![forbid(unsafe_code)]

//! KeyInfo rendering for the four WS-Security key identification
//! strategies.
//!
//! Every strategy produces a `ds:KeyInfo` wrapping a
//! `wsse:SecurityTokenReference`; the BinarySecurityToken strategy
//! additionally yields the token element itself, which the caller
//! places in the Security header ahead of the Signature.

use base64::Engine;
use vaxholm_c14n::escape::escape_text;
use vaxholm_core::{ns, Error, Result};
use vaxholm_keys::{x509, KeyEntry};

/// How the signature identifies the signing certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyIdentifier {
    /// `ds:X509IssuerSerial` direct reference (the default).
    #[default]
    IssuerSerial,
    /// Embed the certificate as a `wsse:BinarySecurityToken` and point
    /// at it.
    BinarySecurityToken,
    /// `wsse:KeyIdentifier` carrying the certificate's
    /// SubjectKeyIdentifier extension.
    SubjectKeyIdentifier,
    /// `wsse:KeyIdentifier` carrying the SHA-1 thumbprint (WSS 1.1).
    ThumbprintSha1,
}

impl std::str::FromStr for KeyIdentifier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "issuer-serial" => Ok(Self::IssuerSerial),
            "binary-security-token" | "bst" => Ok(Self::BinarySecurityToken),
            "subject-key-identifier" | "ski" => Ok(Self::SubjectKeyIdentifier),
            "thumbprint" | "thumbprint-sha1" => Ok(Self::ThumbprintSha1),
            _ => Err(Error::Other(format!(
                "unknown key identifier strategy '{s}' (expected issuer-serial, \
                 binary-security-token, subject-key-identifier or thumbprint)"
            ))),
        }
    }
}

/// Identifiers assigned to the KeyInfo elements.
pub(crate) struct KeyInfoIds<'a> {
    pub key_info: &'a str,
    pub str_ref: &'a str,
    pub token: &'a str,
}

pub(crate) struct RenderedKeyInfo {
    pub key_info_xml: String,
    /// `wsse:BinarySecurityToken` to place before the Signature, when
    /// the strategy embeds the certificate.
    pub binary_token_xml: Option<String>,
}

pub(crate) fn render_key_info(
    kind: KeyIdentifier,
    entry: &KeyEntry,
    ids: &KeyInfoIds<'_>,
) -> Result<RenderedKeyInfo> {
    let b64 = base64::engine::general_purpose::STANDARD;
    let cert = x509::parse_certificate(&entry.certificate)?;

    let (str_inner, binary_token_xml) = match kind {
        KeyIdentifier::IssuerSerial => {
            let issuer = escape_text(&x509::issuer_rfc2253(&cert));
            let serial = x509::serial_decimal(&cert);
            (
                format!(
                    "<ds:X509Data><ds:X509IssuerSerial><ds:X509IssuerName>{issuer}</ds:X509IssuerName>\
                     <ds:X509SerialNumber>{serial}</ds:X509SerialNumber></ds:X509IssuerSerial></ds:X509Data>"
                ),
                None,
            )
        }
        KeyIdentifier::BinarySecurityToken => {
            let token = format!(
                "<wsse:BinarySecurityToken xmlns:wsse=\"{}\" xmlns:wsu=\"{}\" \
                 EncodingType=\"{}\" ValueType=\"{}\" wsu:Id=\"{}\">{}</wsse:BinarySecurityToken>",
                ns::WSSE,
                ns::WSU,
                ns::BASE64_BINARY,
                ns::X509V3,
                ids.token,
                b64.encode(&entry.certificate),
            );
            (
                format!(
                    "<wsse:Reference URI=\"#{}\" ValueType=\"{}\"/>",
                    ids.token,
                    ns::X509V3
                ),
                Some(token),
            )
        }
        KeyIdentifier::SubjectKeyIdentifier => {
            let ski = x509::subject_key_identifier(&cert)?.ok_or_else(|| {
                Error::Certificate(
                    "certificate has no SubjectKeyIdentifier extension".into(),
                )
            })?;
            (
                format!(
                    "<wsse:KeyIdentifier EncodingType=\"{}\" ValueType=\"{}\">{}</wsse:KeyIdentifier>",
                    ns::BASE64_BINARY,
                    ns::X509_SKI,
                    b64.encode(ski),
                ),
                None,
            )
        }
        KeyIdentifier::ThumbprintSha1 => {
            let thumbprint = x509::thumbprint_sha1(&entry.certificate);
            (
                format!(
                    "<wsse:KeyIdentifier EncodingType=\"{}\" ValueType=\"{}\">{}</wsse:KeyIdentifier>",
                    ns::BASE64_BINARY,
                    ns::THUMBPRINT_SHA1,
                    b64.encode(thumbprint),
                ),
                None,
            )
        }
    };

    let key_info_xml = format!(
        "<ds:KeyInfo Id=\"{}\"><wsse:SecurityTokenReference xmlns:wsse=\"{}\" xmlns:wsu=\"{}\" \
         wsu:Id=\"{}\">{}</wsse:SecurityTokenReference></ds:KeyInfo>",
        ids.key_info,
        ns::WSSE,
        ns::WSU,
        ids.str_ref,
        str_inner,
    );

    Ok(RenderedKeyInfo {
        key_info_xml,
        binary_token_xml,
    })
}
