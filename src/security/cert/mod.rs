//! Certificate Model
//!
//! Owned X.509 certificate view, distinguished names, chain ordering and
//! proxy detection used by the identity resolver and the VOMS validator.

pub mod chain;
pub mod name;
pub mod proxy;

pub use chain::{check_linkage, parse_chain, sort_chain, ChainCertificate, OID_VOMS_EXTENSION};
pub use name::{DistinguishedName, NameAttribute, Rdn};
pub use proxy::{end_user_certificate, is_proxy, proxy_depth, ProxyKind};

use serde::Serialize;
use std::fmt;

/// Certificate serial number with an explicit marker for the absent case
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum SerialNumber {
    /// Decimal rendering of the serial
    Known(String),
    Unknown,
}

impl SerialNumber {
    pub fn is_known(&self) -> bool {
        matches!(self, SerialNumber::Known(_))
    }

    pub fn as_known(&self) -> Option<&str> {
        match self {
            SerialNumber::Known(serial) => Some(serial),
            SerialNumber::Unknown => None,
        }
    }
}

impl fmt::Display for SerialNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SerialNumber::Known(serial) => f.write_str(serial),
            SerialNumber::Unknown => f.write_str("unknown"),
        }
    }
}
