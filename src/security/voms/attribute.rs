//! VOMS Attributes and FQANs

use super::ac::{AttributeCertificate, IetfAttrSyntax, OID_VOMS_ATTRIBUTES};
use crate::security::cert::chain::trim_leading_zeros;
use crate::security::cert::DistinguishedName;

use chrono::{DateTime, Utc};
use der::{Decode, Encode};
use serde::Serialize;
use std::fmt;
use x509_cert::ext::pkix::name::{GeneralName, GeneralNames};

/// Fully-qualified attribute name, e.g. `/atlas/production/Role=admin`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Fqan(String);

impl Fqan {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Group path without the `Role=` and `Capability=` qualifiers
    pub fn group(&self) -> &str {
        let end = self
            .0
            .find("/Role=")
            .or_else(|| self.0.find("/Capability="))
            .unwrap_or(self.0.len());
        &self.0[..end]
    }

    /// Role qualifier; `Role=NULL` means no role
    pub fn role(&self) -> Option<&str> {
        self.qualifier("Role=")
    }

    /// Capability qualifier; `Capability=NULL` means no capability
    pub fn capability(&self) -> Option<&str> {
        self.qualifier("Capability=")
    }

    fn qualifier(&self, key: &str) -> Option<&str> {
        self.0
            .split('/')
            .find_map(|segment| segment.strip_prefix(key))
            .filter(|value| !value.is_empty() && *value != "NULL")
    }
}

impl fmt::Display for Fqan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Fqan {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Authorization data carried by one VOMS attribute certificate
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VomsAttribute {
    pub vo: String,
    /// `host:port` of the issuing VOMS server
    pub host_port: Option<String>,
    /// Attribute authority that signed the attribute certificate
    pub issuer: DistinguishedName,
    pub holder_issuer: Option<DistinguishedName>,
    pub holder_serial: Option<Vec<u8>>,
    /// Attribute certificate serial, lower-case hex
    pub serial: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub fqans: Vec<Fqan>,
}

impl VomsAttribute {
    pub fn new(vo: impl Into<String>, issuer: DistinguishedName, fqans: Vec<Fqan>) -> Self {
        Self {
            vo: vo.into(),
            host_port: None,
            issuer,
            holder_issuer: None,
            holder_serial: None,
            serial: String::new(),
            not_before: DateTime::<Utc>::MIN_UTC,
            not_after: DateTime::<Utc>::MAX_UTC,
            fqans,
        }
    }

    /// Primary FQAN, the first one asserted by the VOMS server
    pub fn primary_fqan(&self) -> Option<&Fqan> {
        self.fqans.first()
    }

    /// Decode the VOMS view of an attribute certificate without checking it
    pub fn from_attribute_certificate(ac: &AttributeCertificate) -> Result<Self, String> {
        let info = &ac.acinfo;

        let issuer = info
            .issuer
            .issuer_name
            .as_ref()
            .and_then(directory_name)
            .ok_or_else(|| "attribute certificate has no directory issuer name".to_string())??;

        let (holder_issuer, holder_serial) = match &info.holder.base_certificate_id {
            Some(base) => (
                directory_name(&base.issuer).transpose()?,
                Some(trim_leading_zeros(base.serial.as_bytes()).to_vec()),
            ),
            None => (None, None),
        };

        let voms_attribute = info
            .attributes
            .iter()
            .find(|attr| attr.oid == OID_VOMS_ATTRIBUTES)
            .ok_or_else(|| "attribute certificate carries no VOMS attributes".to_string())?;

        let mut policy_authority = None;
        let mut fqans = Vec::new();
        for value in voms_attribute.values.iter() {
            let encoded = value.to_der().map_err(|e| e.to_string())?;
            let syntax = IetfAttrSyntax::from_der(&encoded)
                .map_err(|e| format!("invalid IETF attribute syntax: {}", e))?;
            if policy_authority.is_none() {
                policy_authority = syntax.policy_authority.as_ref().and_then(uri_name);
            }
            fqans.extend(
                syntax
                    .values
                    .iter()
                    .map(|octets| Fqan::new(String::from_utf8_lossy(octets.as_bytes()).into_owned())),
            );
        }

        let (vo, host_port) = match policy_authority {
            Some(uri) => split_policy_authority(&uri),
            None => (vo_from_fqans(&fqans).unwrap_or_default(), None),
        };

        Ok(Self {
            vo,
            host_port,
            issuer,
            holder_issuer,
            holder_serial,
            serial: hex(trim_leading_zeros(info.serial_number.as_bytes())),
            not_before: timestamp(&info.validity.not_before)?,
            not_after: timestamp(&info.validity.not_after)?,
            fqans,
        })
    }
}

impl fmt::Display for VomsAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fqans: Vec<&str> = self.fqans.iter().map(Fqan::as_str).collect();
        write!(f, "VO: {}, issuer: {}, FQANs: [{}]", self.vo, self.issuer, fqans.join(", "))
    }
}

fn directory_name(names: &GeneralNames) -> Option<Result<DistinguishedName, String>> {
    names.iter().find_map(|name| match name {
        GeneralName::DirectoryName(dn) => Some(
            dn.to_der()
                .map_err(|e| e.to_string())
                .and_then(|der| DistinguishedName::from_der(&der).map_err(|e| e.to_string())),
        ),
        _ => None,
    })
}

fn uri_name(names: &GeneralNames) -> Option<String> {
    names.iter().find_map(|name| match name {
        GeneralName::UniformResourceIdentifier(uri) => Some(uri.to_string()),
        _ => None,
    })
}

/// `atlas://voms.cern.ch:15001` -> (`atlas`, `voms.cern.ch:15001`)
fn split_policy_authority(uri: &str) -> (String, Option<String>) {
    match uri.split_once("://") {
        Some((vo, host_port)) => (vo.to_string(), Some(host_port.to_string())),
        None => (uri.to_string(), None),
    }
}

fn vo_from_fqans(fqans: &[Fqan]) -> Option<String> {
    fqans
        .first()
        .and_then(|fqan| fqan.as_str().trim_start_matches('/').split('/').next())
        .map(str::to_string)
}

fn timestamp(time: &der::asn1::GeneralizedTime) -> Result<DateTime<Utc>, String> {
    let secs = time.to_unix_duration().as_secs() as i64;
    DateTime::<Utc>::from_timestamp(secs, 0).ok_or_else(|| format!("timestamp {} out of range", secs))
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
