#![forbid(unsafe_code)]

//! Alias-based key store over a PKCS#12 file.
//!
//! `KeyStore::open` verifies the store MAC with the store passphrase,
//! `entry` then resolves one alias to a signing key and its certificate
//! chain, decrypting the key bag with the (possibly different) key
//! passphrase on demand.

use vaxholm_core::{Error, Result};
use vaxholm_pkcs12::{parse_pkcs12, CertBag, Pkcs12Contents};
use zeroize::Zeroizing;

use crate::key::PrivateKey;
use crate::x509;

/// An opened PKCS#12 key store.
#[derive(Debug)]
pub struct KeyStore {
    contents: Pkcs12Contents,
}

/// One resolved key store entry.
#[derive(Debug)]
pub struct KeyEntry {
    pub key: PrivateKey,
    /// DER-encoded leaf certificate for the key.
    pub certificate: Vec<u8>,
    /// Remaining chain certificates in store order, DER-encoded.
    pub chain: Vec<Vec<u8>>,
}

impl KeyStore {
    /// Open a PKCS#12 store, verifying its MAC with the store passphrase.
    pub fn open(data: &[u8], store_passphrase: &str) -> Result<Self> {
        let contents = parse_pkcs12(data, store_passphrase)?;
        Ok(Self { contents })
    }

    /// Aliases of the key entries in this store.
    pub fn aliases(&self) -> Vec<&str> {
        self.contents
            .key_bags
            .iter()
            .filter_map(|bag| bag.friendly_name.as_deref())
            .collect()
    }

    /// Resolve an alias to its private key and certificate chain.
    ///
    /// Alias matching is case-insensitive, which is how Java key stores
    /// treat aliases and what most PKCS#12 producers expect.
    pub fn entry(&self, alias: &str, key_passphrase: &str) -> Result<KeyEntry> {
        let bag = self
            .contents
            .key_bags
            .iter()
            .find(|bag| {
                bag.friendly_name
                    .as_deref()
                    .is_some_and(|name| name.eq_ignore_ascii_case(alias))
            })
            .ok_or_else(|| Error::AliasNotFound(alias.to_string()))?;

        let pkcs8 = Zeroizing::new(bag.decrypt(key_passphrase)?);
        let key = PrivateKey::from_pkcs8_der(&pkcs8)?;

        let leaf_idx = select_leaf(&self.contents.cert_bags, alias, bag.local_key_id.as_deref())?;
        let leaf = &self.contents.cert_bags[leaf_idx];

        let cert = x509::parse_certificate(&leaf.cert_der)?;
        if x509::public_key_der(&cert)? != key.public_key_der()? {
            return Err(Error::SigningKey(format!(
                "certificate for alias '{alias}' does not match the private key"
            )));
        }

        let chain = self
            .contents
            .cert_bags
            .iter()
            .enumerate()
            .filter(|(idx, _)| *idx != leaf_idx)
            .map(|(_, bag)| bag.cert_der.clone())
            .collect();

        Ok(KeyEntry {
            key,
            certificate: leaf.cert_der.clone(),
            chain,
        })
    }
}

/// Pick the leaf certificate for a key bag.
///
/// Preference order: matching `localKeyID`, then matching alias, then a
/// sole certificate in the store.
fn select_leaf(cert_bags: &[CertBag], alias: &str, local_key_id: Option<&[u8]>) -> Result<usize> {
    if let Some(key_id) = local_key_id {
        if let Some(idx) = cert_bags
            .iter()
            .position(|bag| bag.local_key_id.as_deref() == Some(key_id))
        {
            return Ok(idx);
        }
    }
    if let Some(idx) = cert_bags.iter().position(|bag| {
        bag.friendly_name
            .as_deref()
            .is_some_and(|name| name.eq_ignore_ascii_case(alias))
    }) {
        return Ok(idx);
    }
    if cert_bags.len() == 1 {
        return Ok(0);
    }
    Err(Error::Certificate(format!(
        "no certificate found for alias '{alias}'"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cert_bag(name: Option<&str>, key_id: Option<&[u8]>) -> CertBag {
        CertBag {
            friendly_name: name.map(str::to_string),
            local_key_id: key_id.map(<[u8]>::to_vec),
            cert_der: Vec::new(),
        }
    }

    #[test]
    fn leaf_selected_by_local_key_id_first() {
        let bags = vec![
            cert_bag(Some("server"), Some(&[2])),
            cert_bag(Some("client"), Some(&[1])),
        ];
        assert_eq!(select_leaf(&bags, "client", Some(&[1])).unwrap(), 1);
        // localKeyID wins even when the alias names the other bag
        assert_eq!(select_leaf(&bags, "client", Some(&[2])).unwrap(), 0);
    }

    #[test]
    fn leaf_falls_back_to_alias_then_sole_cert() {
        let bags = vec![
            cert_bag(Some("ca"), None),
            cert_bag(Some("Client"), None),
        ];
        assert_eq!(select_leaf(&bags, "client", None).unwrap(), 1);

        let sole = vec![cert_bag(None, None)];
        assert_eq!(select_leaf(&sole, "anything", None).unwrap(), 0);

        let err = select_leaf(&bags, "missing", None).unwrap_err();
        assert!(matches!(err, Error::Certificate(_)));
    }
}
