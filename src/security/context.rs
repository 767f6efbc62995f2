//! Per-Request Security Context
//!
//! A [`SecurityContext`] is created empty for every request and assembled
//! exactly once from the client certificate chain. Identity and attributes
//! are committed together, so a context is either fully resolved or carries
//! only connection metadata.

use crate::error::{Result, VomsError};
use crate::security::cert::{ChainCertificate, DistinguishedName, SerialNumber};
use crate::security::identity::{Identity, IdentityResolver};
use crate::security::voms::{AttributeResolution, AttributeValidatorAdapter, Fqan, ValidationResult, VomsAttribute};

use rustls::Certificate;
use std::sync::Arc;
use tracing::error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    /// Only connection metadata is known
    Empty,
    /// Identity and attributes have been resolved from the chain
    AttributesResolved,
}

#[derive(Debug)]
struct Resolved {
    identity: Identity,
    chain: Vec<ChainCertificate>,
    attributes: Vec<VomsAttribute>,
    results: Vec<ValidationResult>,
}

pub struct SecurityContext {
    remote_addr: Option<String>,
    session_id: Option<String>,
    resolver: IdentityResolver,
    adapter: Option<Arc<AttributeValidatorAdapter>>,
    resolved: Option<Resolved>,
}

impl std::fmt::Debug for SecurityContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityContext")
            .field("remote_addr", &self.remote_addr)
            .field("session_id", &self.session_id)
            .field("state", &self.state())
            .field("client", &self.client_x500_name())
            .field("fqans", &self.fqans())
            .finish()
    }
}

impl SecurityContext {
    /// Context with VOMS attribute resolution
    pub fn new(resolver: IdentityResolver, adapter: Arc<AttributeValidatorAdapter>) -> Self {
        Self {
            remote_addr: None,
            session_id: None,
            resolver,
            adapter: Some(adapter),
            resolved: None,
        }
    }

    /// Plain X.509 context that never carries attributes
    pub fn without_attributes(resolver: IdentityResolver) -> Self {
        Self {
            remote_addr: None,
            session_id: None,
            resolver,
            adapter: None,
            resolved: None,
        }
    }

    pub fn with_remote_addr(mut self, remote_addr: impl Into<String>) -> Self {
        self.remote_addr = Some(remote_addr.into());
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Resolve identity, then attributes, and commit both at once.
    ///
    /// May be called once per context. On a resolver error nothing is
    /// committed and the context stays [`ContextState::Empty`].
    pub fn set_client_cert_chain(&mut self, chain: &[Certificate]) -> Result<()> {
        if let Some(resolved) = &self.resolved {
            let subject = resolved.identity.subject_name();
            error!(
                subject = %subject,
                "Security context assembled twice, refusing to overwrite resolved identity"
            );
            return Err(VomsError::AlreadyResolved { subject });
        }

        let resolved_chain = self.resolver.resolve(chain)?;
        let AttributeResolution { attributes, results } = match &self.adapter {
            Some(adapter) => adapter.resolve(&resolved_chain.chain),
            None => AttributeResolution::default(),
        };

        self.resolved = Some(Resolved {
            identity: resolved_chain.identity,
            chain: resolved_chain.chain,
            attributes,
            results,
        });
        Ok(())
    }

    pub fn state(&self) -> ContextState {
        if self.resolved.is_some() {
            ContextState::AttributesResolved
        } else {
            ContextState::Empty
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.resolved.is_some()
    }

    /// Whether this context resolves VOMS attributes at all
    pub fn supports_attributes(&self) -> bool {
        self.adapter.is_some()
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.resolved.as_ref().map(|r| &r.identity)
    }

    pub fn client_principal(&self) -> Option<&DistinguishedName> {
        self.identity().map(Identity::subject)
    }

    /// Client subject, RFC 2253 readable form
    pub fn client_x500_name(&self) -> Option<String> {
        self.identity().map(Identity::subject_name)
    }

    /// Client subject, OpenSSL slash form
    pub fn client_name(&self) -> Option<String> {
        self.client_principal().map(DistinguishedName::openssl)
    }

    pub fn issuer_principal(&self) -> Option<&DistinguishedName> {
        self.identity().map(Identity::issuer)
    }

    pub fn issuer_x500_name(&self) -> Option<String> {
        self.identity().map(Identity::issuer_name)
    }

    pub fn issuer_name(&self) -> Option<String> {
        self.issuer_principal().map(DistinguishedName::openssl)
    }

    pub fn serial_number(&self) -> SerialNumber {
        self.identity()
            .map(|identity| identity.serial().clone())
            .unwrap_or(SerialNumber::Unknown)
    }

    /// End-user certificate the identity was taken from
    pub fn client_cert(&self) -> Option<&ChainCertificate> {
        self.identity().map(Identity::certificate)
    }

    /// Ordered chain, most specific certificate first
    pub fn client_cert_chain(&self) -> Option<&[ChainCertificate]> {
        self.resolved.as_ref().map(|r| r.chain.as_slice())
    }

    pub fn voms_attributes(&self) -> &[VomsAttribute] {
        self.resolved.as_ref().map(|r| r.attributes.as_slice()).unwrap_or(&[])
    }

    pub fn validation_results(&self) -> &[ValidationResult] {
        self.resolved.as_ref().map(|r| r.results.as_slice()).unwrap_or(&[])
    }

    /// Every FQAN of every attribute, in issuance order
    pub fn fqans(&self) -> Vec<&str> {
        self.voms_attributes()
            .iter()
            .flat_map(|attribute| attribute.fqans.iter().map(Fqan::as_str))
            .collect()
    }

    pub fn has_fqan(&self, fqan: &str) -> bool {
        self.fqans().contains(&fqan)
    }

    pub fn remote_addr(&self) -> Option<&str> {
        self.remote_addr.as_deref()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// One-line description of the connection for access logs
    pub fn connection_message(&self) -> String {
        let remote = self.remote_addr().unwrap_or("unknown");
        let Some(identity) = self.identity() else {
            return format!("Unauthenticated connection from '{}'.", remote);
        };

        let attributes = if self.voms_attributes().is_empty() {
            "No valid VOMS attributes found.".to_string()
        } else {
            let rendered: Vec<String> = self.voms_attributes().iter().map(ToString::to_string).collect();
            format!("VOMS attributes: [{}].", rendered.join("; "))
        };

        format!(
            "Connection from '{}' by '{}' (issued by '{}') serial: {}. {}",
            remote,
            identity.subject_name(),
            identity.issuer_name(),
            identity.serial(),
            attributes
        )
    }
}
