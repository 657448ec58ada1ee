#![forbid(unsafe_code)]

//! BER parsing of PKCS#12 (PFX) structures (RFC 7292).
//!
//! Uses `yasna::parse_ber` since PKCS#12 files use BER encoding, not strict DER.

use yasna::models::ObjectIdentifier;
use yasna::{ASN1Error, ASN1ErrorKind, BERReader, Tag, TagClass};

use crate::kdf;
use crate::{CertBag, Pkcs12Contents, ShroudedKeyBag};
use vaxholm_core::Error;

// ── OID constants ──────────────────────────────────────────────────────────

// Content types (PKCS#7)
const OID_DATA: &[u64] = &[1, 2, 840, 113549, 1, 7, 1];
const OID_ENCRYPTED_DATA: &[u64] = &[1, 2, 840, 113549, 1, 7, 6];

// Bag types (PKCS#12)
const OID_PKCS8_SHROUDED_KEY_BAG: &[u64] = &[1, 2, 840, 113549, 1, 12, 10, 1, 2];
const OID_CERT_BAG: &[u64] = &[1, 2, 840, 113549, 1, 12, 10, 1, 3];

// Bag attributes (PKCS#9)
const OID_FRIENDLY_NAME: &[u64] = &[1, 2, 840, 113549, 1, 9, 20];
const OID_LOCAL_KEY_ID: &[u64] = &[1, 2, 840, 113549, 1, 9, 21];

// Certificate type
const OID_X509_CERTIFICATE: &[u64] = &[1, 2, 840, 113549, 1, 9, 22, 1];

// PBE algorithms
const OID_PBE_SHA1_3DES: &[u64] = &[1, 2, 840, 113549, 1, 12, 1, 3];
const OID_PBES2: &[u64] = &[1, 2, 840, 113549, 1, 5, 13];
const OID_PBKDF2: &[u64] = &[1, 2, 840, 113549, 1, 5, 12];

// Cipher
const OID_AES_256_CBC: &[u64] = &[2, 16, 840, 1, 101, 3, 4, 1, 42];

// Hash / HMAC
const OID_SHA1: &[u64] = &[1, 3, 14, 3, 2, 26];
const OID_SHA256: &[u64] = &[2, 16, 840, 1, 101, 3, 4, 2, 1];
const OID_HMAC_SHA1: &[u64] = &[1, 2, 840, 113549, 2, 7];
const OID_HMAC_SHA256: &[u64] = &[1, 2, 840, 113549, 2, 9];

fn oid(components: &[u64]) -> ObjectIdentifier {
    ObjectIdentifier::from_slice(components)
}

// ── Algorithm types ────────────────────────────────────────────────────────

#[derive(Debug)]
pub(crate) enum EncryptionAlgorithm {
    PbeSha1And3Des {
        salt: Vec<u8>,
        iterations: u32,
    },
    Pbes2 {
        pbkdf2_salt: Vec<u8>,
        pbkdf2_iterations: u32,
        pbkdf2_prf: PrfAlgorithm,
        aes_iv: Vec<u8>,
    },
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum PrfAlgorithm {
    HmacSha1,
    HmacSha256,
}

#[derive(Debug, Clone, Copy)]
enum MacHashAlgorithm {
    Sha1,
    Sha256,
}

// ── Parsed structures ──────────────────────────────────────────────────────

struct MacData {
    digest_algorithm: MacHashAlgorithm,
    digest_value: Vec<u8>,
    salt: Vec<u8>,
    iterations: u32,
}

/// Bag attributes captured from the SafeBag attribute SET.
#[derive(Default)]
struct BagAttributes {
    friendly_name: Option<String>,
    local_key_id: Option<Vec<u8>>,
}

enum SafeBag {
    ShroudedKeyBag {
        algorithm: EncryptionAlgorithm,
        ciphertext: Vec<u8>,
        attrs: BagAttributes,
    },
    CertBag {
        cert_der: Vec<u8>,
        attrs: BagAttributes,
    },
    Other,
}

// ── Top-level parser ───────────────────────────────────────────────────────

pub(crate) fn parse_pfx(data: &[u8], password: &str) -> Result<Pkcs12Contents, Error> {
    let (auth_safe_data, mac_data) = yasna::parse_ber(data, |r| {
        r.read_sequence(|r| {
            // version
            let version = r.next().read_u32()?;
            if version != 3 {
                return Err(ASN1Error::new(ASN1ErrorKind::Invalid));
            }

            // authSafe ContentInfo
            let auth_safe_data = parse_content_info_data(r.next())?;

            // optional macData
            let mac_data = r.read_optional(parse_mac_data)?;

            Ok((auth_safe_data, mac_data))
        })
    })
    .map_err(|e| Error::UnsupportedStoreFormat(format!("not a PKCS#12 PFX: {e}")))?;

    // Verify MAC if present
    if let Some(ref mac) = mac_data {
        verify_mac(mac, &auth_safe_data, password)?;
    }

    // Parse the authSafe contents (SEQUENCE OF ContentInfo)
    let content_infos = yasna::parse_ber(&auth_safe_data, |r| {
        r.collect_sequence_of(parse_content_info_inner)
    })
    .map_err(|e| Error::UnsupportedStoreFormat(format!("bad authSafe contents: {e}")))?;

    // Process each ContentInfo to extract bags
    let bmp_password = kdf::password_to_bmp(password);
    let mut key_bags = Vec::new();
    let mut cert_bags = Vec::new();

    for ci in content_infos {
        let bags_data = match ci {
            ContentInfoInner::Data(data) => data,
            ContentInfoInner::EncryptedData {
                algorithm,
                ciphertext,
            } => decrypt_data(&algorithm, &ciphertext, password, &bmp_password)?,
        };

        // Parse SafeBags from the (possibly decrypted) data
        let bags = yasna::parse_ber(&bags_data, |r| r.collect_sequence_of(parse_safe_bag))
            .map_err(|e| Error::UnsupportedStoreFormat(format!("bad SafeBag contents: {e}")))?;

        for bag in bags {
            match bag {
                SafeBag::ShroudedKeyBag {
                    algorithm,
                    ciphertext,
                    attrs,
                } => {
                    key_bags.push(ShroudedKeyBag {
                        friendly_name: attrs.friendly_name,
                        local_key_id: attrs.local_key_id,
                        algorithm,
                        ciphertext,
                    });
                }
                SafeBag::CertBag { cert_der, attrs } => {
                    cert_bags.push(CertBag {
                        friendly_name: attrs.friendly_name,
                        local_key_id: attrs.local_key_id,
                        cert_der,
                    });
                }
                SafeBag::Other => {}
            }
        }
    }

    Ok(Pkcs12Contents {
        key_bags,
        cert_bags,
    })
}

// ── ContentInfo parsing ────────────────────────────────────────────────────

/// Parse top-level ContentInfo that wraps the authSafe: expects OID = data,
/// extracts the OCTET STRING payload.
fn parse_content_info_data(r: BERReader) -> Result<Vec<u8>, ASN1Error> {
    r.read_sequence(|r| {
        let content_type = r.next().read_oid()?;
        if content_type != oid(OID_DATA) {
            return Err(ASN1Error::new(ASN1ErrorKind::Invalid));
        }
        // [0] EXPLICIT OCTET STRING
        let data = r.next().read_tagged(Tag::context(0), |r| r.read_bytes())?;
        Ok(data)
    })
}

enum ContentInfoInner {
    Data(Vec<u8>),
    EncryptedData {
        algorithm: EncryptionAlgorithm,
        ciphertext: Vec<u8>,
    },
}

/// Parse a ContentInfo inside the authSafe SEQUENCE.
fn parse_content_info_inner(r: BERReader) -> Result<ContentInfoInner, ASN1Error> {
    r.read_sequence(|r| {
        let content_type = r.next().read_oid()?;

        if content_type == oid(OID_DATA) {
            let data = r.next().read_tagged(Tag::context(0), |r| r.read_bytes())?;
            Ok(ContentInfoInner::Data(data))
        } else if content_type == oid(OID_ENCRYPTED_DATA) {
            // [0] EXPLICIT EncryptedData
            r.next().read_tagged(Tag::context(0), |r| {
                r.read_sequence(|r| {
                    // version
                    let _version = r.next().read_u32()?;
                    // EncryptedContentInfo
                    r.next().read_sequence(|r| {
                        // contentType (should be data)
                        let _ct = r.next().read_oid()?;
                        // contentEncryptionAlgorithm
                        let algorithm = parse_algorithm_identifier(r.next())?;
                        // [0] IMPLICIT encrypted content
                        let ciphertext = r
                            .next()
                            .read_tagged_implicit(Tag::context(0), |r| r.read_bytes())?;
                        Ok(ContentInfoInner::EncryptedData {
                            algorithm,
                            ciphertext,
                        })
                    })
                })
            })
        } else {
            Err(ASN1Error::new(ASN1ErrorKind::Invalid))
        }
    })
}

// ── SafeBag parsing ────────────────────────────────────────────────────────

fn parse_safe_bag(r: BERReader) -> Result<SafeBag, ASN1Error> {
    r.read_sequence(|r| {
        let bag_type = r.next().read_oid()?;

        if bag_type == oid(OID_PKCS8_SHROUDED_KEY_BAG) {
            // [0] EXPLICIT EncryptedPrivateKeyInfo
            let (algorithm, ciphertext) = r.next().read_tagged(Tag::context(0), |r| {
                r.read_sequence(|r| {
                    let algorithm = parse_algorithm_identifier(r.next())?;
                    let ciphertext = r.next().read_bytes()?;
                    Ok((algorithm, ciphertext))
                })
            })?;
            let attrs = parse_bag_attributes(r)?;
            Ok(SafeBag::ShroudedKeyBag {
                algorithm,
                ciphertext,
                attrs,
            })
        } else if bag_type == oid(OID_CERT_BAG) {
            // [0] EXPLICIT CertBag
            let cert_der = r.next().read_tagged(Tag::context(0), |r| {
                r.read_sequence(|r| {
                    let cert_type = r.next().read_oid()?;
                    if cert_type != oid(OID_X509_CERTIFICATE) {
                        return Err(ASN1Error::new(ASN1ErrorKind::Invalid));
                    }
                    // [0] EXPLICIT OCTET STRING containing DER-encoded certificate
                    let cert_data = r.next().read_tagged(Tag::context(0), |r| r.read_bytes())?;
                    Ok(cert_data)
                })
            })?;
            let attrs = parse_bag_attributes(r)?;
            Ok(SafeBag::CertBag { cert_der, attrs })
        } else {
            // Skip unknown bag types: read and discard tag [0] value and attrs
            let _value = r.next().read_tagged(Tag::context(0), |r| r.read_der())?;
            let _attrs = parse_bag_attributes(r)?;
            Ok(SafeBag::Other)
        }
    })
}

/// Parse the optional SafeBag attribute SET, capturing `friendlyName`
/// and `localKeyID`.  Unknown attributes are skipped.
fn parse_bag_attributes(
    r: &mut yasna::BERReaderSeq<'_, '_>,
) -> Result<BagAttributes, ASN1Error> {
    let mut attrs = BagAttributes::default();
    r.read_optional(|r| {
        r.read_set_of(|r| {
            r.read_sequence(|r| {
                let attr_oid = r.next().read_oid()?;
                r.next().read_set_of(|r| {
                    let value = r.read_der()?;
                    if attr_oid == oid(OID_FRIENDLY_NAME) {
                        attrs.friendly_name = parse_bmp_string(&value);
                    } else if attr_oid == oid(OID_LOCAL_KEY_ID) {
                        attrs.local_key_id = parse_octet_string(&value);
                    }
                    Ok(())
                })?;
                Ok(())
            })
        })
    })?;
    Ok(attrs)
}

/// Decode a DER BMPString (UTF-16BE) into a String.
fn parse_bmp_string(der: &[u8]) -> Option<String> {
    let bytes = yasna::parse_der(der, |r| {
        r.read_tagged_implicit(
            Tag {
                tag_class: TagClass::Universal,
                tag_number: 30,
            },
            |r| r.read_bytes(),
        )
    })
    .ok()?;
    if bytes.len() % 2 != 0 {
        return None;
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|c| u16::from_be_bytes([c[0], c[1]]))
        .collect();
    String::from_utf16(&units).ok()
}

/// Decode a DER OCTET STRING.
fn parse_octet_string(der: &[u8]) -> Option<Vec<u8>> {
    yasna::parse_der(der, |r| r.read_bytes()).ok()
}

// ── AlgorithmIdentifier parsing ────────────────────────────────────────────

fn parse_algorithm_identifier(r: BERReader) -> Result<EncryptionAlgorithm, ASN1Error> {
    r.read_sequence(|r| {
        let alg_oid = r.next().read_oid()?;

        if alg_oid == oid(OID_PBE_SHA1_3DES) {
            // Legacy PBE params: SEQUENCE { salt OCTET STRING, iterations INTEGER }
            r.next().read_sequence(|r| {
                let salt = r.next().read_bytes()?;
                let iterations = r.next().read_u32()?;
                Ok(EncryptionAlgorithm::PbeSha1And3Des { salt, iterations })
            })
        } else if alg_oid == oid(OID_PBES2) {
            // PBES2-params: SEQUENCE { keyDerivationFunc AlgId, encryptionScheme AlgId }
            r.next().read_sequence(|r| {
                // keyDerivationFunc (must be PBKDF2)
                let (pbkdf2_salt, pbkdf2_iterations, pbkdf2_prf) =
                    r.next().read_sequence(|r| {
                        let kdf_oid = r.next().read_oid()?;
                        if kdf_oid != oid(OID_PBKDF2) {
                            return Err(ASN1Error::new(ASN1ErrorKind::Invalid));
                        }
                        // PBKDF2-params: SEQUENCE { salt, iterationCount, keyLength?, prf? }
                        r.next().read_sequence(|r| {
                            let salt = r.next().read_bytes()?;
                            let iterations = r.next().read_u32()?;

                            // Both keyLength (INTEGER) and prf (SEQUENCE)
                            // are optional; default PRF per RFC is HMAC-SHA1.
                            let mut prf = PrfAlgorithm::HmacSha1;

                            let remaining = r.read_optional(|r| r.read_der())?;
                            if let Some(der_bytes) = remaining {
                                if !der_bytes.is_empty() && der_bytes[0] == 0x30 {
                                    // This is the PRF SEQUENCE
                                    prf = parse_prf_from_der(&der_bytes)?;
                                } else {
                                    // This was keyLength, try to read PRF next
                                    if let Some(prf_der) = r.read_optional(|r| r.read_der())? {
                                        prf = parse_prf_from_der(&prf_der)?;
                                    }
                                }
                            }

                            Ok((salt, iterations, prf))
                        })
                    })?;

                // encryptionScheme
                let aes_iv = r.next().read_sequence(|r| {
                    let enc_oid = r.next().read_oid()?;
                    if enc_oid != oid(OID_AES_256_CBC) {
                        return Err(ASN1Error::new(ASN1ErrorKind::Invalid));
                    }
                    let iv = r.next().read_bytes()?;
                    Ok(iv)
                })?;

                Ok(EncryptionAlgorithm::Pbes2 {
                    pbkdf2_salt,
                    pbkdf2_iterations,
                    pbkdf2_prf,
                    aes_iv,
                })
            })
        } else {
            Err(ASN1Error::new(ASN1ErrorKind::Invalid))
        }
    })
}

/// Parse a PRF AlgorithmIdentifier from raw DER bytes.
fn parse_prf_from_der(der: &[u8]) -> Result<PrfAlgorithm, ASN1Error> {
    yasna::parse_der(der, |r| {
        r.read_sequence(|r| {
            let prf_oid = r.next().read_oid()?;
            // Read optional NULL parameter
            let _null = r.read_optional(|r| r.read_null())?;
            if prf_oid == oid(OID_HMAC_SHA256) {
                Ok(PrfAlgorithm::HmacSha256)
            } else if prf_oid == oid(OID_HMAC_SHA1) {
                Ok(PrfAlgorithm::HmacSha1)
            } else {
                Err(ASN1Error::new(ASN1ErrorKind::Invalid))
            }
        })
    })
}

// ── MAC verification ───────────────────────────────────────────────────────

fn parse_mac_data(r: BERReader) -> Result<MacData, ASN1Error> {
    r.read_sequence(|r| {
        // DigestInfo: SEQUENCE { digestAlgorithm, digest }
        let (digest_algorithm, digest_value) = r.next().read_sequence(|r| {
            let alg = r.next().read_sequence(|r| {
                let hash_oid = r.next().read_oid()?;
                // optional NULL
                let _null = r.read_optional(|r| r.read_null())?;
                if hash_oid == oid(OID_SHA256) {
                    Ok(MacHashAlgorithm::Sha256)
                } else if hash_oid == oid(OID_SHA1) {
                    Ok(MacHashAlgorithm::Sha1)
                } else {
                    Err(ASN1Error::new(ASN1ErrorKind::Invalid))
                }
            })?;
            let digest = r.next().read_bytes()?;
            Ok((alg, digest))
        })?;

        let salt = r.next().read_bytes()?;
        let iterations = r.read_optional(|r| r.read_u32())?.unwrap_or(1);

        Ok(MacData {
            digest_algorithm,
            digest_value,
            salt,
            iterations,
        })
    })
}

fn verify_mac(mac: &MacData, auth_safe_data: &[u8], password: &str) -> Result<(), Error> {
    let bmp_password = kdf::password_to_bmp(password);

    let computed = match mac.digest_algorithm {
        MacHashAlgorithm::Sha1 => {
            let mac_key =
                kdf::pkcs12_kdf_sha1(kdf::ID_MAC, &bmp_password, &mac.salt, mac.iterations, 20);
            kdf::compute_hmac_sha1(&mac_key, auth_safe_data)
        }
        MacHashAlgorithm::Sha256 => {
            let mac_key =
                kdf::pkcs12_kdf_sha256(kdf::ID_MAC, &bmp_password, &mac.salt, mac.iterations, 32);
            kdf::compute_hmac_sha256(&mac_key, auth_safe_data)
        }
    };

    if computed != mac.digest_value {
        return Err(Error::BadPassphrase(
            "PKCS#12 MAC verification failed".into(),
        ));
    }

    Ok(())
}

// ── Decryption dispatch ────────────────────────────────────────────────────

pub(crate) fn decrypt_data(
    algorithm: &EncryptionAlgorithm,
    ciphertext: &[u8],
    password: &str,
    bmp_password: &[u8],
) -> Result<Vec<u8>, Error> {
    match algorithm {
        EncryptionAlgorithm::PbeSha1And3Des { salt, iterations } => {
            kdf::decrypt_pbe_sha1_3des(ciphertext, bmp_password, salt, *iterations)
        }
        EncryptionAlgorithm::Pbes2 {
            pbkdf2_salt,
            pbkdf2_iterations,
            pbkdf2_prf,
            aes_iv,
        } => match pbkdf2_prf {
            PrfAlgorithm::HmacSha256 => kdf::decrypt_pbes2_aes256cbc(
                ciphertext,
                password,
                pbkdf2_salt,
                *pbkdf2_iterations,
                aes_iv,
            ),
            PrfAlgorithm::HmacSha1 => kdf::decrypt_pbes2_aes256cbc_sha1(
                ciphertext,
                password,
                pbkdf2_salt,
                *pbkdf2_iterations,
                aes_iv,
            ),
        },
    }
}
