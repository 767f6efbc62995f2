//! Distinguished Name Rendering
//!
//! Owned representation of X.500 names with the two canonical string forms
//! used across grid services: the RFC 2253 readable form
//! (`CN=alice,O=Grid`) and the OpenSSL slash form (`/O=Grid/CN=alice`).

use crate::error::{Result, VomsError};

use serde::Serialize;
use std::fmt;
use x509_parser::prelude::*;

/// A single attribute type/value pair inside a relative distinguished name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct NameAttribute {
    /// Short name (`CN`, `O`, ...) or dotted OID for unknown types
    pub short_name: String,
    pub value: String,
}

/// Relative distinguished name; multi-valued RDNs keep every attribute
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Rdn {
    pub attributes: Vec<NameAttribute>,
}

impl Rdn {
    pub fn single(short_name: &str, value: &str) -> Self {
        Self {
            attributes: vec![NameAttribute {
                short_name: short_name.to_string(),
                value: value.to_string(),
            }],
        }
    }

    fn render(&self, separator: &str, escape: bool) -> String {
        self.attributes
            .iter()
            .map(|attr| {
                let value = if escape {
                    escape_rfc2253(&attr.value)
                } else {
                    attr.value.clone()
                };
                format!("{}={}", attr.short_name, value)
            })
            .collect::<Vec<_>>()
            .join(separator)
    }
}

/// Structured principal form of an X.500 name.
///
/// RDNs are kept in encoding order (most significant first). Equality is
/// decided on the decoded attributes, not on the raw DER, so the same name
/// encoded as `PrintableString` and `UTF8String` compares equal.
#[derive(Debug, Clone, Serialize)]
pub struct DistinguishedName {
    rdns: Vec<Rdn>,
    #[serde(skip)]
    raw: Vec<u8>,
}

impl PartialEq for DistinguishedName {
    fn eq(&self, other: &Self) -> bool {
        self.rdns == other.rdns
    }
}

impl Eq for DistinguishedName {}

impl std::hash::Hash for DistinguishedName {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.rdns.hash(state);
    }
}

impl DistinguishedName {
    pub fn from_rdns(rdns: Vec<Rdn>) -> Self {
        Self { rdns, raw: Vec::new() }
    }

    /// Build from a name parsed by `x509-parser`
    pub fn from_x509(name: &X509Name<'_>) -> Self {
        let rdns = name
            .iter()
            .map(|rdn| Rdn {
                attributes: rdn
                    .iter()
                    .map(|attr| NameAttribute {
                        short_name: short_name_for(&attr.attr_type().to_id_string()),
                        value: attribute_value(attr),
                    })
                    .collect(),
            })
            .collect();

        Self {
            rdns,
            raw: name.as_raw().to_vec(),
        }
    }

    /// Parse a DER-encoded `Name`
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let (_, name) = X509Name::from_der(der).map_err(|e| VomsError::InvalidCertificate {
            reason: format!("Failed to parse distinguished name: {}", e),
        })?;
        Ok(Self::from_x509(&name))
    }

    pub fn rdns(&self) -> &[Rdn] {
        &self.rdns
    }

    /// DER encoding as it appeared on the wire, empty for synthesized names
    pub fn raw_der(&self) -> &[u8] {
        &self.raw
    }

    pub fn is_empty(&self) -> bool {
        self.rdns.is_empty()
    }

    /// RFC 2253 readable form: least significant RDN first, comma separated
    pub fn rfc2253(&self) -> String {
        self.rdns
            .iter()
            .rev()
            .map(|rdn| rdn.render("+", true))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// OpenSSL one-line form: `/O=Grid/CN=alice`
    pub fn openssl(&self) -> String {
        self.rdns
            .iter()
            .map(|rdn| format!("/{}", rdn.render("+", false)))
            .collect()
    }

    /// Value of the last (most specific) `CN` attribute
    pub fn common_name(&self) -> Option<&str> {
        self.rdns
            .iter()
            .rev()
            .flat_map(|rdn| rdn.attributes.iter())
            .find(|attr| attr.short_name == "CN")
            .map(|attr| attr.value.as_str())
    }

    pub fn last_rdn(&self) -> Option<&Rdn> {
        self.rdns.last()
    }

    /// True if `self` is `parent` followed by exactly one more RDN
    pub fn extends(&self, parent: &DistinguishedName) -> bool {
        self.rdns.len() == parent.rdns.len() + 1 && self.rdns[..parent.rdns.len()] == parent.rdns[..]
    }
}

impl fmt::Display for DistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.rfc2253())
    }
}

fn short_name_for(oid: &str) -> String {
    let name = match oid {
        "2.5.4.3" => "CN",
        "2.5.4.5" => "SERIALNUMBER",
        "2.5.4.6" => "C",
        "2.5.4.7" => "L",
        "2.5.4.8" => "ST",
        "2.5.4.9" => "STREET",
        "2.5.4.10" => "O",
        "2.5.4.11" => "OU",
        "0.9.2342.19200300.100.1.1" => "UID",
        "0.9.2342.19200300.100.1.25" => "DC",
        "1.2.840.113549.1.9.1" => "EMAILADDRESS",
        other => return other.to_string(),
    };
    name.to_string()
}

fn attribute_value(attr: &AttributeTypeAndValue<'_>) -> String {
    match attr.as_str() {
        Ok(value) => value.to_string(),
        Err(_) => {
            let hex: String = attr
                .attr_value()
                .data
                .iter()
                .map(|b| format!("{:02x}", b))
                .collect();
            format!("#{}", hex)
        }
    }
}

fn escape_rfc2253(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    let last = value.chars().count().saturating_sub(1);
    for (i, c) in value.chars().enumerate() {
        let needs_escape = matches!(c, ',' | '+' | '"' | '\\' | '<' | '>' | ';')
            || (i == 0 && (c == '#' || c == ' '))
            || (i == last && c == ' ');
        if needs_escape {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
