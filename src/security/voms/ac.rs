//! Attribute Certificate ASN.1 Model
//!
//! RFC 3281 attribute certificate structures, restricted to the profile VOMS
//! servers emit: a `v2Form` issuer, a `baseCertificateID` holder and an IETF
//! attribute carrying octet-string FQANs.

use der::asn1::{BitString, GeneralizedTime, ObjectIdentifier, OctetString};
use der::{Decode, Sequence};
use x509_cert::attr::Attribute;
use x509_cert::ext::pkix::name::GeneralNames;
use x509_cert::ext::Extensions;
use x509_cert::serial_number::SerialNumber;
use x509_cert::spki::AlgorithmIdentifierOwned;

/// VOMS attribute type inside an attribute certificate
pub const OID_VOMS_ATTRIBUTES: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.3.6.1.4.1.8005.100.100.4");

/// ```text
/// AttributeCertificate ::= SEQUENCE {
///     acinfo               AttributeCertificateInfo,
///     signatureAlgorithm   AlgorithmIdentifier,
///     signatureValue       BIT STRING }
/// ```
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct AttributeCertificate {
    pub acinfo: AttributeCertificateInfo,
    pub signature_algorithm: AlgorithmIdentifierOwned,
    pub signature: BitString,
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct AttributeCertificateInfo {
    /// Always 1 (v2)
    pub version: u8,
    pub holder: Holder,
    #[asn1(context_specific = "0", tag_mode = "IMPLICIT")]
    pub issuer: V2Form,
    pub signature: AlgorithmIdentifierOwned,
    pub serial_number: SerialNumber,
    pub validity: AttCertValidityPeriod,
    pub attributes: Vec<Attribute>,
    #[asn1(optional = "true")]
    pub issuer_unique_id: Option<BitString>,
    #[asn1(optional = "true")]
    pub extensions: Option<Extensions>,
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct Holder {
    #[asn1(context_specific = "0", tag_mode = "IMPLICIT", optional = "true")]
    pub base_certificate_id: Option<IssuerSerial>,
    #[asn1(context_specific = "1", tag_mode = "IMPLICIT", optional = "true")]
    pub entity_name: Option<GeneralNames>,
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct IssuerSerial {
    pub issuer: GeneralNames,
    pub serial: SerialNumber,
    #[asn1(optional = "true")]
    pub issuer_uid: Option<BitString>,
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct V2Form {
    #[asn1(optional = "true")]
    pub issuer_name: Option<GeneralNames>,
    #[asn1(context_specific = "0", tag_mode = "IMPLICIT", optional = "true")]
    pub base_certificate_id: Option<IssuerSerial>,
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct AttCertValidityPeriod {
    pub not_before: GeneralizedTime,
    pub not_after: GeneralizedTime,
}

/// ```text
/// IetfAttrSyntax ::= SEQUENCE {
///     policyAuthority [0] GeneralNames OPTIONAL,
///     values          SEQUENCE OF OCTET STRING }
/// ```
///
/// The `oid` and `string` value alternatives of RFC 3281 are never produced
/// by VOMS and are rejected as malformed.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct IetfAttrSyntax {
    #[asn1(context_specific = "0", tag_mode = "IMPLICIT", optional = "true")]
    pub policy_authority: Option<GeneralNames>,
    pub values: Vec<OctetString>,
}

/// Decode the value of the VOMS certificate extension:
/// `SEQUENCE OF SEQUENCE OF AttributeCertificate`, flattened.
pub fn decode_voms_extension(value: &[u8]) -> der::Result<Vec<AttributeCertificate>> {
    let sequences = Vec::<Vec<AttributeCertificate>>::from_der(value)?;
    Ok(sequences.into_iter().flatten().collect())
}
