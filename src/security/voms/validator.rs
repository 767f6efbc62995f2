//! Attribute Certificate Validation
//!
//! [`VomsAcValidator`] is the seam between the security context and whatever
//! validates VOMS attribute certificates. [`LocalVomsValidator`] is the
//! in-process implementation backed by a [`VomsTrustStore`].
//!
//! Validation never fails a request: every problem is reported as a
//! [`ValidationFailure`] on the detailed result and the attribute is left out
//! of the validated set.

use super::ac::{decode_voms_extension, AttributeCertificate};
use super::attribute::VomsAttribute;
use super::trust_store::VomsTrustStore;
use crate::security::cert::{ChainCertificate, DistinguishedName};
use crate::security::identity::{resolve_identity, ProxyResolutionStrategy};

use der::Encode;
use ring::signature::{self, UnparsedPublicKey, VerificationAlgorithm};
use serde::Serialize;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::debug;

/// Reason an attribute certificate was rejected
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ValidationFailure {
    #[error("malformed attribute certificate: {0}")]
    Malformed(String),

    #[error("attribute authority '{issuer}' is not trusted")]
    UntrustedIssuer { issuer: String },

    #[error("unsupported signature algorithm {oid}")]
    UnsupportedAlgorithm { oid: String },

    #[error("attribute certificate signature does not verify")]
    BadSignature,

    #[error("attribute certificate is not yet valid")]
    NotYetValid,

    #[error("attribute certificate has expired")]
    Expired,

    #[error("attribute authority certificate '{issuer}' is outside its validity period")]
    AuthorityCertificateExpired { issuer: String },

    #[error("attribute certificate holder does not match the end-user certificate")]
    HolderMismatch,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ValidationOutcome {
    Valid,
    Invalid(Vec<ValidationFailure>),
}

/// Outcome of validating one attribute certificate found in a chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    /// Decoded attribute, absent when the certificate could not be decoded
    pub attribute: Option<VomsAttribute>,
    pub outcome: ValidationOutcome,
}

impl ValidationResult {
    pub fn valid(attribute: VomsAttribute) -> Self {
        Self {
            attribute: Some(attribute),
            outcome: ValidationOutcome::Valid,
        }
    }

    pub fn invalid(attribute: Option<VomsAttribute>, failures: Vec<ValidationFailure>) -> Self {
        Self {
            attribute,
            outcome: ValidationOutcome::Invalid(failures),
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self.outcome, ValidationOutcome::Valid)
    }

    pub fn failures(&self) -> &[ValidationFailure] {
        match &self.outcome {
            ValidationOutcome::Valid => &[],
            ValidationOutcome::Invalid(failures) => failures,
        }
    }
}

/// Extracts and validates VOMS attribute certificates from an ordered chain.
///
/// Implementations are shared by every worker and must be safe for
/// concurrent use.
pub trait VomsAcValidator: Send + Sync {
    /// One result per attribute certificate found in the chain
    fn validate_with_detail(&self, chain: &[ChainCertificate]) -> Vec<ValidationResult>;

    /// Decode attributes without verifying signature, trust or validity
    fn parse(&self, chain: &[ChainCertificate]) -> Vec<VomsAttribute>;

    /// Attributes that passed every check
    fn validate(&self, chain: &[ChainCertificate]) -> Vec<VomsAttribute> {
        self.validate_with_detail(chain)
            .into_iter()
            .filter(ValidationResult::is_valid)
            .filter_map(|result| result.attribute)
            .collect()
    }
}

/// Raw attribute certificates found in a chain, or the decode error of the
/// certificate extension that could not be read.
fn extract_attribute_certificates(
    chain: &[ChainCertificate],
) -> Vec<Result<AttributeCertificate, ValidationFailure>> {
    let mut found = Vec::new();
    for cert in chain {
        let Some(extension) = cert.voms_extension() else {
            continue;
        };
        match decode_voms_extension(extension) {
            Ok(acs) => found.extend(acs.into_iter().map(Ok)),
            Err(e) => {
                debug!(
                    subject = %cert.subject(),
                    error = %e,
                    "Undecodable VOMS extension"
                );
                found.push(Err(ValidationFailure::Malformed(e.to_string())));
            }
        }
    }
    found
}

/// Validator checking attribute certificates against locally configured
/// attribute authority certificates
pub struct LocalVomsValidator {
    trust_store: Arc<VomsTrustStore>,
    holder_resolution: ProxyResolutionStrategy,
}

impl LocalVomsValidator {
    pub fn new(trust_store: Arc<VomsTrustStore>) -> Self {
        Self {
            trust_store,
            holder_resolution: ProxyResolutionStrategy::default(),
        }
    }

    /// Locate the attribute certificate holder with the same strategy the
    /// identity resolver uses, so attributes are bound to the resolved
    /// identity.
    pub fn with_holder_resolution(mut self, strategy: ProxyResolutionStrategy) -> Self {
        self.holder_resolution = strategy;
        self
    }

    pub fn trust_store(&self) -> &Arc<VomsTrustStore> {
        &self.trust_store
    }

    pub fn holder_resolution(&self) -> ProxyResolutionStrategy {
        self.holder_resolution
    }

    /// Validate as of the given unix time
    pub fn validate_with_detail_at(&self, chain: &[ChainCertificate], now: i64) -> Vec<ValidationResult> {
        let holder = resolve_identity(chain, self.holder_resolution)
            .ok()
            .map(|identity| identity.certificate().clone());

        extract_attribute_certificates(chain)
            .into_iter()
            .map(|entry| match entry {
                Ok(ac) => self.check(&ac, holder.as_ref(), now),
                Err(failure) => ValidationResult::invalid(None, vec![failure]),
            })
            .collect()
    }

    fn check(&self, ac: &AttributeCertificate, holder: Option<&ChainCertificate>, now: i64) -> ValidationResult {
        let attribute = match VomsAttribute::from_attribute_certificate(ac) {
            Ok(attribute) => attribute,
            Err(reason) => return ValidationResult::invalid(None, vec![ValidationFailure::Malformed(reason)]),
        };

        let mut failures = Vec::new();

        let authorities = self.trust_store.find_by_subject(&attribute.issuer);
        if authorities.is_empty() {
            failures.push(ValidationFailure::UntrustedIssuer {
                issuer: attribute.issuer.rfc2253(),
            });
        } else {
            match verify_signature(ac, &authorities) {
                Ok(Some(authority)) => {
                    if !authority.is_valid_at(now) {
                        failures.push(ValidationFailure::AuthorityCertificateExpired {
                            issuer: attribute.issuer.rfc2253(),
                        });
                    }
                }
                Ok(None) => failures.push(ValidationFailure::BadSignature),
                Err(failure) => failures.push(failure),
            }
        }

        if attribute.not_before.timestamp() > now {
            failures.push(ValidationFailure::NotYetValid);
        }
        if attribute.not_after.timestamp() < now {
            failures.push(ValidationFailure::Expired);
        }

        if !holder_matches(&attribute, holder) {
            failures.push(ValidationFailure::HolderMismatch);
        }

        if failures.is_empty() {
            ValidationResult::valid(attribute)
        } else {
            debug!(
                vo = %attribute.vo,
                issuer = %attribute.issuer,
                failures = ?failures,
                "Rejected VOMS attribute certificate"
            );
            ValidationResult::invalid(Some(attribute), failures)
        }
    }
}

impl VomsAcValidator for LocalVomsValidator {
    fn validate_with_detail(&self, chain: &[ChainCertificate]) -> Vec<ValidationResult> {
        self.validate_with_detail_at(chain, unix_now())
    }

    fn parse(&self, chain: &[ChainCertificate]) -> Vec<VomsAttribute> {
        extract_attribute_certificates(chain)
            .into_iter()
            .filter_map(Result::ok)
            .filter_map(|ac| VomsAttribute::from_attribute_certificate(&ac).ok())
            .collect()
    }
}

fn holder_matches(attribute: &VomsAttribute, holder: Option<&ChainCertificate>) -> bool {
    let Some(holder) = holder else {
        return false;
    };
    let serial_matches = attribute
        .holder_serial
        .as_deref()
        .map_or(false, |serial| serial == holder.raw_serial());
    let issuer_matches = attribute
        .holder_issuer
        .as_ref()
        .map_or(false, |issuer: &DistinguishedName| issuer == holder.issuer());
    serial_matches && issuer_matches
}

/// The authority whose key verifies the signature, `None` if none does
fn verify_signature<'a>(
    ac: &AttributeCertificate,
    authorities: &'a [ChainCertificate],
) -> Result<Option<&'a ChainCertificate>, ValidationFailure> {
    let oid = ac.signature_algorithm.oid.to_string();
    let signed = ac
        .acinfo
        .to_der()
        .map_err(|e| ValidationFailure::Malformed(e.to_string()))?;
    let signature_bytes = ac.signature.raw_bytes();

    let mut supported = false;
    for authority in authorities {
        let Some(scheme) = SignatureScheme::select(&oid, authority.public_key_curve()) else {
            continue;
        };
        supported = true;
        if UnparsedPublicKey::new(scheme.algorithm(), authority.public_key())
            .verify(&signed, signature_bytes)
            .is_ok()
        {
            return Ok(Some(authority));
        }
    }

    if supported {
        Ok(None)
    } else {
        Err(ValidationFailure::UnsupportedAlgorithm { oid })
    }
}

const OID_CURVE_P256: &str = "1.2.840.10045.3.1.7";
const OID_CURVE_P384: &str = "1.3.132.0.34";

/// ring verification algorithm for a signature OID paired with the
/// authority key it must verify against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureScheme {
    EcdsaP256Sha256,
    EcdsaP256Sha384,
    EcdsaP384Sha256,
    EcdsaP384Sha384,
    RsaPkcs1Sha1,
    RsaPkcs1Sha256,
    RsaPkcs1Sha384,
    RsaPkcs1Sha512,
}

impl SignatureScheme {
    /// `key_curve` is the namedCurve OID of an EC key and `None` for RSA
    pub fn select(signature_oid: &str, key_curve: Option<&str>) -> Option<Self> {
        let scheme = match (signature_oid, key_curve) {
            ("1.2.840.10045.4.3.2", Some(OID_CURVE_P256)) => Self::EcdsaP256Sha256,
            ("1.2.840.10045.4.3.2", Some(OID_CURVE_P384)) => Self::EcdsaP384Sha256,
            ("1.2.840.10045.4.3.3", Some(OID_CURVE_P256)) => Self::EcdsaP256Sha384,
            ("1.2.840.10045.4.3.3", Some(OID_CURVE_P384)) => Self::EcdsaP384Sha384,
            ("1.2.840.113549.1.1.5", None) => Self::RsaPkcs1Sha1,
            ("1.2.840.113549.1.1.11", None) => Self::RsaPkcs1Sha256,
            ("1.2.840.113549.1.1.12", None) => Self::RsaPkcs1Sha384,
            ("1.2.840.113549.1.1.13", None) => Self::RsaPkcs1Sha512,
            _ => return None,
        };
        Some(scheme)
    }

    pub fn algorithm(self) -> &'static dyn VerificationAlgorithm {
        match self {
            Self::EcdsaP256Sha256 => &signature::ECDSA_P256_SHA256_ASN1,
            Self::EcdsaP256Sha384 => &signature::ECDSA_P256_SHA384_ASN1,
            Self::EcdsaP384Sha256 => &signature::ECDSA_P384_SHA256_ASN1,
            Self::EcdsaP384Sha384 => &signature::ECDSA_P384_SHA384_ASN1,
            Self::RsaPkcs1Sha1 => &signature::RSA_PKCS1_1024_8192_SHA1_FOR_LEGACY_USE_ONLY,
            Self::RsaPkcs1Sha256 => &signature::RSA_PKCS1_2048_8192_SHA256,
            Self::RsaPkcs1Sha384 => &signature::RSA_PKCS1_2048_8192_SHA384,
            Self::RsaPkcs1Sha512 => &signature::RSA_PKCS1_2048_8192_SHA512,
        }
    }
}

pub(crate) fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
