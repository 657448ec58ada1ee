#![forbid(unsafe_code)]

//! X.509 certificate accessors for signature KeyInfo rendering.
//!
//! Only the pieces a security-header builder needs: issuer name as an
//! RFC 2253 string, serial number as a decimal string, the
//! SubjectKeyIdentifier extension and the SHA-1 thumbprint.

use der::asn1::{Ia5StringRef, ObjectIdentifier, OctetString, PrintableStringRef, Utf8StringRef};
use der::{Decode, Encode};
use sha1::{Digest, Sha1};
use vaxholm_core::{Error, Result};
use x509_cert::attr::AttributeTypeAndValue;
use x509_cert::Certificate;

const OID_SKI: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.14");

const OID_CN: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.3");
const OID_SERIAL: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.5");
const OID_C: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.6");
const OID_L: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.7");
const OID_ST: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.8");
const OID_O: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.10");
const OID_OU: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.11");
const OID_DC: ObjectIdentifier = ObjectIdentifier::new_unwrap("0.9.2342.19200300.100.1.25");
const OID_UID: ObjectIdentifier = ObjectIdentifier::new_unwrap("0.9.2342.19200300.100.1.1");
const OID_EMAIL: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.1");

/// Parse a DER-encoded X.509 certificate.
pub fn parse_certificate(der: &[u8]) -> Result<Certificate> {
    Certificate::from_der(der)
        .map_err(|e| Error::Certificate(format!("X.509 parse failed: {e}")))
}

/// Issuer distinguished name as an RFC 2253 string.
///
/// RDNs are rendered in reverse DER order, as RFC 2253 requires, so the
/// output matches what Java's `X500Principal::getName` produces for the
/// same certificate.
pub fn issuer_rfc2253(cert: &Certificate) -> String {
    let rdns = &cert.tbs_certificate.issuer.0;
    let mut out = String::new();
    for rdn in rdns.iter().rev() {
        if !out.is_empty() {
            out.push(',');
        }
        let mut first = true;
        for atv in rdn.0.iter() {
            if !first {
                out.push('+');
            }
            first = false;
            render_atv(&mut out, atv);
        }
    }
    out
}

fn render_atv(out: &mut String, atv: &AttributeTypeAndValue) {
    let oid = atv.oid;
    let keyword = if oid == OID_CN {
        "CN"
    } else if oid == OID_L {
        "L"
    } else if oid == OID_ST {
        "ST"
    } else if oid == OID_O {
        "O"
    } else if oid == OID_OU {
        "OU"
    } else if oid == OID_C {
        "C"
    } else if oid == OID_DC {
        "DC"
    } else if oid == OID_UID {
        "UID"
    } else if oid == OID_EMAIL {
        "EMAILADDRESS"
    } else if oid == OID_SERIAL {
        "SERIALNUMBER"
    } else {
        ""
    };
    if keyword.is_empty() {
        out.push_str(&oid.to_string());
    } else {
        out.push_str(keyword);
    }
    out.push('=');
    match attribute_value_string(&atv.value) {
        Some(s) => escape_rfc2253(out, &s),
        // Non-string value: hex of the raw DER, per RFC 2253 section 2.4
        None => {
            out.push('#');
            if let Ok(der) = atv.value.to_der() {
                for byte in der {
                    out.push_str(&format!("{byte:02x}"));
                }
            }
        }
    }
}

fn attribute_value_string(value: &der::Any) -> Option<String> {
    if let Ok(s) = value.decode_as::<Utf8StringRef<'_>>() {
        return Some(s.to_string());
    }
    if let Ok(s) = value.decode_as::<PrintableStringRef<'_>>() {
        return Some(s.to_string());
    }
    if let Ok(s) = value.decode_as::<Ia5StringRef<'_>>() {
        return Some(s.to_string());
    }
    None
}

fn escape_rfc2253(out: &mut String, value: &str) {
    for (idx, c) in value.chars().enumerate() {
        let needs_escape = matches!(c, ',' | '+' | '"' | '\\' | '<' | '>' | ';')
            || (idx == 0 && (c == '#' || c == ' '))
            || (idx == value.chars().count() - 1 && c == ' ');
        if needs_escape {
            out.push('\\');
        }
        out.push(c);
    }
}

/// Certificate serial number as an unsigned decimal string.
///
/// X.509 serials are ASN.1 INTEGERs.  XML-DSig's X509SerialNumber wants
/// the decimal form, which can exceed u128, so the conversion works on
/// the big-endian bytes directly.
pub fn serial_decimal(cert: &Certificate) -> String {
    format_serial_decimal(cert.tbs_certificate.serial_number.as_bytes())
}

fn format_serial_decimal(bytes: &[u8]) -> String {
    // Decimal digits, little-endian
    let mut digits = vec![0u8];
    for &byte in bytes {
        let mut carry = byte as u16;
        for digit in digits.iter_mut() {
            let val = (*digit as u16) * 256 + carry;
            *digit = (val % 10) as u8;
            carry = val / 10;
        }
        while carry > 0 {
            digits.push((carry % 10) as u8);
            carry /= 10;
        }
    }
    while digits.len() > 1 && digits.last() == Some(&0) {
        digits.pop();
    }
    digits.iter().rev().map(|d| (b'0' + d) as char).collect()
}

/// The SubjectKeyIdentifier extension value, if the certificate has one.
pub fn subject_key_identifier(cert: &Certificate) -> Result<Option<Vec<u8>>> {
    let Some(extensions) = &cert.tbs_certificate.extensions else {
        return Ok(None);
    };
    for ext in extensions {
        if ext.extn_id == OID_SKI {
            // The extension value is itself a DER OCTET STRING
            let ski = OctetString::from_der(ext.extn_value.as_bytes())
                .map_err(|e| Error::Certificate(format!("malformed SubjectKeyIdentifier: {e}")))?;
            return Ok(Some(ski.as_bytes().to_vec()));
        }
    }
    Ok(None)
}

/// SHA-1 digest of the DER-encoded certificate.
pub fn thumbprint_sha1(cert_der: &[u8]) -> Vec<u8> {
    let mut hasher = Sha1::new();
    hasher.update(cert_der);
    hasher.finalize().to_vec()
}

/// DER-encoded SubjectPublicKeyInfo of the certificate.
pub fn public_key_der(cert: &Certificate) -> Result<Vec<u8>> {
    cert.tbs_certificate
        .subject_public_key_info
        .to_der()
        .map_err(|e| Error::Certificate(format!("SPKI encoding failed: {e}")))
}
