//! Parsed Certificates and Chain Ordering
//!
//! Certificates arrive from the TLS layer as raw DER in no guaranteed order.
//! This module parses each one once into an owned [`ChainCertificate`] and
//! orders a set of them from the most specific certificate to the trust
//! anchor by issuer/subject linkage.

use super::name::DistinguishedName;
use super::proxy::{detect_proxy, ProxyKind};
use super::SerialNumber;
use crate::error::{Result, VomsError};

use ring::digest;
use rustls::Certificate;
use std::collections::HashSet;
use x509_parser::prelude::*;

/// VOMS attribute certificate extension carried by proxy certificates
pub const OID_VOMS_EXTENSION: &str = "1.3.6.1.4.1.8005.100.100.5";

/// Owned view of a parsed X.509 certificate.
///
/// `x509-parser` certificates borrow their input, so the fields needed by the
/// resolver and the attribute validator are copied out once at parse time.
#[derive(Debug, Clone)]
pub struct ChainCertificate {
    der: Certificate,
    subject: DistinguishedName,
    issuer: DistinguishedName,
    serial: SerialNumber,
    raw_serial: Vec<u8>,
    is_ca: bool,
    proxy: Option<ProxyKind>,
    voms_extension: Option<Vec<u8>>,
    public_key: Vec<u8>,
    public_key_curve: Option<String>,
    not_before: i64,
    not_after: i64,
    fingerprint: String,
}

impl ChainCertificate {
    pub fn parse(cert: &Certificate) -> Result<Self> {
        let (_, parsed) = X509Certificate::from_der(&cert.0).map_err(|e| VomsError::InvalidCertificate {
            reason: format!("Failed to parse certificate: {}", e),
        })?;

        let subject = DistinguishedName::from_x509(parsed.subject());
        let issuer = DistinguishedName::from_x509(parsed.issuer());

        let is_ca = parsed
            .basic_constraints()
            .ok()
            .flatten()
            .map(|bc| bc.value.ca)
            .unwrap_or(false);

        let voms_extension = parsed
            .extensions()
            .iter()
            .find(|ext| ext.oid.to_id_string() == OID_VOMS_EXTENSION)
            .map(|ext| ext.value.to_vec());

        let proxy = detect_proxy(&parsed, &subject, &issuer);

        let raw_serial = parsed.raw_serial().to_vec();
        let serial = if raw_serial.is_empty() {
            SerialNumber::Unknown
        } else {
            SerialNumber::Known(parsed.serial.to_string())
        };

        let validity = parsed.validity();

        // namedCurve parameter of EC keys, absent (NULL) for RSA
        let public_key_curve = parsed
            .public_key()
            .algorithm
            .parameters
            .as_ref()
            .and_then(|params| params.as_oid().ok())
            .map(|oid| oid.to_id_string());

        Ok(Self {
            subject,
            issuer,
            serial,
            raw_serial,
            is_ca,
            proxy,
            voms_extension,
            public_key: parsed.public_key().subject_public_key.data.to_vec(),
            public_key_curve,
            not_before: validity.not_before.timestamp(),
            not_after: validity.not_after.timestamp(),
            fingerprint: fingerprint(&cert.0),
            der: cert.clone(),
        })
    }

    pub fn certificate(&self) -> &Certificate {
        &self.der
    }

    pub fn subject(&self) -> &DistinguishedName {
        &self.subject
    }

    pub fn issuer(&self) -> &DistinguishedName {
        &self.issuer
    }

    pub fn serial(&self) -> &SerialNumber {
        &self.serial
    }

    /// Serial INTEGER content octets with leading zero padding removed
    pub fn raw_serial(&self) -> &[u8] {
        trim_leading_zeros(&self.raw_serial)
    }

    pub fn is_ca(&self) -> bool {
        self.is_ca
    }

    pub fn is_self_issued(&self) -> bool {
        self.subject == self.issuer
    }

    pub fn proxy_kind(&self) -> Option<ProxyKind> {
        self.proxy
    }

    pub fn is_proxy(&self) -> bool {
        self.proxy.is_some()
    }

    /// Raw value of the VOMS attribute certificate extension, if present
    pub fn voms_extension(&self) -> Option<&[u8]> {
        self.voms_extension.as_deref()
    }

    /// Subject public key bits as ring expects them (EC point or RSAPublicKey)
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    /// Named curve OID of an EC public key
    pub fn public_key_curve(&self) -> Option<&str> {
        self.public_key_curve.as_deref()
    }

    pub fn not_before(&self) -> i64 {
        self.not_before
    }

    pub fn not_after(&self) -> i64 {
        self.not_after
    }

    pub fn is_valid_at(&self, unix_time: i64) -> bool {
        self.not_before <= unix_time && unix_time <= self.not_after
    }

    /// Hex SHA-256 fingerprint of the DER encoding
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

pub(crate) fn trim_leading_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}

fn fingerprint(der: &[u8]) -> String {
    digest::digest(&digest::SHA256, der)
        .as_ref()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Parse every certificate of a raw chain, failing on the first bad one
pub fn parse_chain(chain: &[Certificate]) -> Result<Vec<ChainCertificate>> {
    if chain.is_empty() {
        return Err(VomsError::MalformedChain("empty certificate chain".to_string()));
    }
    chain.iter().map(ChainCertificate::parse).collect()
}

/// Order a set of certificates from the most specific one to the trust anchor.
///
/// The leaf is the only certificate whose subject does not issue any other
/// certificate of the set. Links are followed issuer to subject until a
/// self-issued certificate or an issuer outside the set; every certificate
/// must be consumed. Exact duplicates are dropped first.
pub fn sort_chain(certificates: Vec<ChainCertificate>) -> Result<Vec<ChainCertificate>> {
    if certificates.is_empty() {
        return Err(VomsError::MalformedChain("empty certificate chain".to_string()));
    }

    let mut seen = HashSet::new();
    let certificates: Vec<ChainCertificate> = certificates
        .into_iter()
        .filter(|cert| seen.insert(cert.fingerprint.clone()))
        .collect();

    if certificates.len() == 1 {
        return Ok(certificates);
    }

    let issues_another = |i: usize| {
        certificates
            .iter()
            .enumerate()
            .any(|(j, other)| j != i && other.issuer == certificates[i].subject)
    };

    let leaves: Vec<usize> = (0..certificates.len()).filter(|&i| !issues_another(i)).collect();
    let leaf = match leaves.as_slice() {
        [leaf] => *leaf,
        [] => {
            return Err(VomsError::MalformedChain(
                "no end-entity certificate found, chain contains a cycle".to_string(),
            ))
        }
        many => {
            return Err(VomsError::MalformedChain(format!(
                "{} candidate end-entity certificates found",
                many.len()
            )))
        }
    };

    let mut slots: Vec<Option<ChainCertificate>> = certificates.into_iter().map(Some).collect();
    let total = slots.len();
    let mut ordered = Vec::with_capacity(total);
    let mut current = leaf;

    loop {
        let cert = match slots[current].take() {
            Some(cert) => cert,
            None => {
                return Err(VomsError::MalformedChain(
                    "certificate chain contains a cycle".to_string(),
                ))
            }
        };

        let next = if cert.is_self_issued() {
            None
        } else {
            slots
                .iter()
                .position(|slot| slot.as_ref().map_or(false, |c| c.subject == cert.issuer))
        };
        ordered.push(cert);

        match next {
            Some(index) => current = index,
            None => break,
        }
    }

    if ordered.len() != total {
        return Err(VomsError::MalformedChain(format!(
            "disconnected certificate chain: {} of {} certificates linked",
            ordered.len(),
            total
        )));
    }

    Ok(ordered)
}

/// Check that an already ordered chain is issuer-linked
pub fn check_linkage(chain: &[ChainCertificate]) -> Result<()> {
    if chain.is_empty() {
        return Err(VomsError::MalformedChain("empty certificate chain".to_string()));
    }
    for (position, pair) in chain.windows(2).enumerate() {
        if pair[0].issuer != pair[1].subject {
            return Err(VomsError::MalformedChain(format!(
                "certificate {} issuer '{}' does not match subject '{}' of certificate {}",
                position,
                pair[0].issuer,
                pair[1].subject,
                position + 1
            )));
        }
    }
    Ok(())
}
