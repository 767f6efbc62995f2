//! Proxy Certificate Detection
//!
//! Recognises the three proxy flavours still seen on grid infrastructures and
//! locates the end-user certificate a delegation chain was derived from.

use super::chain::ChainCertificate;
use super::name::DistinguishedName;

use serde::Serialize;
use x509_parser::prelude::*;

/// RFC 3820 proxyCertInfo extension
pub const OID_PROXY_CERT_INFO: &str = "1.3.6.1.5.5.7.1.14";

/// Pre-RFC (GT3 draft) proxyCertInfo extension
pub const OID_DRAFT_PROXY_CERT_INFO: &str = "1.3.6.1.4.1.3536.1.222";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProxyKind {
    /// RFC 3820 proxy
    Rfc3820,
    /// Pre-RFC draft proxy
    Draft,
    /// Legacy Globus proxy (`CN=proxy` or `CN=limited proxy`)
    Legacy { limited: bool },
}

pub(crate) fn detect_proxy(
    cert: &X509Certificate<'_>,
    subject: &DistinguishedName,
    issuer: &DistinguishedName,
) -> Option<ProxyKind> {
    for ext in cert.extensions() {
        let oid = ext.oid.to_id_string();
        if oid == OID_PROXY_CERT_INFO {
            return Some(ProxyKind::Rfc3820);
        }
        if oid == OID_DRAFT_PROXY_CERT_INFO {
            return Some(ProxyKind::Draft);
        }
    }

    if !subject.extends(issuer) {
        return None;
    }

    match subject.last_rdn().map(|rdn| rdn.attributes.as_slice()) {
        Some([attr]) if attr.short_name == "CN" && attr.value == "proxy" => {
            Some(ProxyKind::Legacy { limited: false })
        }
        Some([attr]) if attr.short_name == "CN" && attr.value == "limited proxy" => {
            Some(ProxyKind::Legacy { limited: true })
        }
        _ => None,
    }
}

/// True when the most specific certificate of an ordered chain is a proxy
pub fn is_proxy(chain: &[ChainCertificate]) -> bool {
    chain.first().map_or(false, ChainCertificate::is_proxy)
}

/// The first non-proxy certificate walking an ordered chain from its leaf
pub fn end_user_certificate(chain: &[ChainCertificate]) -> Option<&ChainCertificate> {
    chain.iter().find(|cert| !cert.is_proxy())
}

/// Number of proxy certificates in front of the end-user certificate
pub fn proxy_depth(chain: &[ChainCertificate]) -> usize {
    chain.iter().take_while(|cert| cert.is_proxy()).count()
}
