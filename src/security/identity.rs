//! Identity Resolution
//!
//! Turns an unordered client certificate chain into the canonical end-entity
//! identity. Delegated (proxy) chains are resolved to the end-user
//! certificate the proxies were derived from, never to the proxy itself.

use crate::error::{Result, VomsError};
use crate::security::cert::{
    check_linkage, end_user_certificate, is_proxy, parse_chain, proxy_depth, sort_chain,
    ChainCertificate, DistinguishedName, SerialNumber,
};

use rustls::Certificate;
use serde::{Deserialize, Serialize};

/// How the end-user certificate is located inside a delegation chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProxyResolutionStrategy {
    /// Detect proxies explicitly and take the first non-proxy certificate
    /// walking from the leaf. Authoritative.
    #[default]
    ProxyAware,
    /// Take the first certificate that is neither a CA nor self-issued,
    /// scanning from the trust-anchor end of the chain.
    BasicConstraintsScan,
}

/// Derived attributes of the resolved end-entity certificate
#[derive(Debug, Clone)]
pub struct Identity {
    subject: DistinguishedName,
    issuer: DistinguishedName,
    serial: SerialNumber,
    certificate: ChainCertificate,
    proxy_depth: usize,
}

impl Identity {
    fn from_certificate(certificate: &ChainCertificate, proxy_depth: usize) -> Self {
        Self {
            subject: certificate.subject().clone(),
            issuer: certificate.issuer().clone(),
            serial: certificate.serial().clone(),
            certificate: certificate.clone(),
            proxy_depth,
        }
    }

    pub fn subject(&self) -> &DistinguishedName {
        &self.subject
    }

    pub fn issuer(&self) -> &DistinguishedName {
        &self.issuer
    }

    /// Subject in RFC 2253 readable form
    pub fn subject_name(&self) -> String {
        self.subject.rfc2253()
    }

    /// Issuer in RFC 2253 readable form
    pub fn issuer_name(&self) -> String {
        self.issuer.rfc2253()
    }

    pub fn serial(&self) -> &SerialNumber {
        &self.serial
    }

    pub fn certificate(&self) -> &ChainCertificate {
        &self.certificate
    }

    /// Number of proxy certificates delegating from this identity
    pub fn proxy_depth(&self) -> usize {
        self.proxy_depth
    }

    pub fn is_delegated(&self) -> bool {
        self.proxy_depth > 0
    }
}

/// Identity plus the ordered chain it was resolved from
#[derive(Debug, Clone)]
pub struct ResolvedChain {
    pub identity: Identity,
    pub chain: Vec<ChainCertificate>,
}

/// Resolves client certificate chains to identities
#[derive(Debug, Clone, Copy)]
pub struct IdentityResolver {
    strategy: ProxyResolutionStrategy,
    sort_chain: bool,
}

impl Default for IdentityResolver {
    fn default() -> Self {
        Self::new(ProxyResolutionStrategy::default(), true)
    }
}

impl IdentityResolver {
    pub fn new(strategy: ProxyResolutionStrategy, sort_chain: bool) -> Self {
        Self { strategy, sort_chain }
    }

    pub fn strategy(&self) -> ProxyResolutionStrategy {
        self.strategy
    }

    /// Parse, order and resolve a raw chain
    pub fn resolve(&self, chain: &[Certificate]) -> Result<ResolvedChain> {
        let parsed = parse_chain(chain)?;
        self.resolve_parsed(parsed)
    }

    /// Resolve an already parsed chain
    pub fn resolve_parsed(&self, chain: Vec<ChainCertificate>) -> Result<ResolvedChain> {
        let chain = if self.sort_chain {
            sort_chain(chain)?
        } else {
            check_linkage(&chain)?;
            chain
        };

        let identity = resolve_identity(&chain, self.strategy)?;
        Ok(ResolvedChain { identity, chain })
    }
}

/// Resolve the identity of an ordered, linked chain with the given strategy
pub fn resolve_identity(chain: &[ChainCertificate], strategy: ProxyResolutionStrategy) -> Result<Identity> {
    if chain.is_empty() {
        return Err(VomsError::MalformedChain("empty certificate chain".to_string()));
    }

    match strategy {
        ProxyResolutionStrategy::ProxyAware => {
            if !is_proxy(chain) {
                return Ok(Identity::from_certificate(&chain[0], 0));
            }
            let end_user = end_user_certificate(chain).ok_or_else(|| {
                VomsError::MalformedChain("proxy chain without an end-user certificate".to_string())
            })?;
            Ok(Identity::from_certificate(end_user, proxy_depth(chain)))
        }
        ProxyResolutionStrategy::BasicConstraintsScan => {
            let index = chain
                .iter()
                .rposition(|cert| !cert.is_ca() && !cert.is_self_issued())
                .ok_or_else(|| {
                    VomsError::MalformedChain(
                        "no certificate in the chain is neither a CA nor self-issued".to_string(),
                    )
                })?;
            Ok(Identity::from_certificate(&chain[index], index))
        }
    }
}
