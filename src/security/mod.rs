//! Grid Security Context
//!
//! Derives the authenticated identity of a client from its X.509 certificate
//! chain (including delegated proxy chains), attaches the VOMS attributes the
//! chain carries, and makes the resulting context available for the duration
//! of a single request.
//!
//! ## Key Components
//!
//! - **Identity**: chain ordering and end-user resolution through proxies
//! - **Attributes**: VOMS attribute certificate validation, strict by default
//! - **Context**: per-request, assemble-once [`SecurityContext`]
//! - **Scope**: task-local [`CurrentSecurityContext`]
//! - **Interception**: [`SecurityContextInterceptor`] run ahead of application logic

pub mod cert;
pub mod context;
pub mod identity;
pub mod interceptor;
pub mod metrics;
pub mod scope;
pub mod voms;

#[cfg(test)]
pub mod tests;

pub use cert::{ChainCertificate, DistinguishedName, ProxyKind, SerialNumber};
pub use context::{ContextState, SecurityContext};
pub use identity::{Identity, IdentityResolver, ProxyResolutionStrategy, ResolvedChain};
pub use interceptor::{PeerCertificateSource, SecurityContextInterceptor, TlsPeerInfo};
pub use metrics::{InterceptionMetrics, MetricsSnapshot};
pub use scope::CurrentSecurityContext;
pub use voms::{
    AttributeValidatorAdapter, Fqan, LocalVomsValidator, ValidationMode, ValidationResult,
    VomsAcValidator, VomsAttribute, VomsTrustStore,
};

use crate::config::SecurityContextConfig;
use crate::error::Result;

use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// Composition root wiring trust store, validator, adapter and interceptor
/// from configuration
pub struct SecurityContextService {
    config: SecurityContextConfig,
    trust_store: Option<Arc<VomsTrustStore>>,
    interceptor: Arc<SecurityContextInterceptor>,
}

impl SecurityContextService {
    /// Build the service, loading the VOMS trust store from
    /// `attributes.voms_dir`. Fails with `ValidatorUnavailable` when
    /// attributes are enabled and the store cannot be loaded.
    pub fn new(config: SecurityContextConfig) -> Result<Self> {
        config.validate()?;

        if !config.attributes.enabled {
            return Self::build(config, None, None);
        }

        let trust_store = Arc::new(VomsTrustStore::from_directory(&config.attributes.voms_dir)?);
        let validator: Arc<dyn VomsAcValidator> = Arc::new(
            LocalVomsValidator::new(Arc::clone(&trust_store))
                .with_holder_resolution(config.identity.proxy_resolution),
        );
        Self::build(config, Some(trust_store), Some(validator))
    }

    /// Build the service around an externally provided validator
    pub fn with_validator(config: SecurityContextConfig, validator: Arc<dyn VomsAcValidator>) -> Result<Self> {
        config.validate()?;
        let validator = config.attributes.enabled.then_some(validator);
        Self::build(config, None, validator)
    }

    fn build(
        config: SecurityContextConfig,
        trust_store: Option<Arc<VomsTrustStore>>,
        validator: Option<Arc<dyn VomsAcValidator>>,
    ) -> Result<Self> {
        let resolver = IdentityResolver::new(config.identity.proxy_resolution, config.identity.sort_chain);
        let interceptor = match validator {
            Some(validator) => {
                let adapter = AttributeValidatorAdapter::from_config(validator, &config.attributes)?;
                SecurityContextInterceptor::new(resolver, Arc::new(adapter))
            }
            None => SecurityContextInterceptor::without_attributes(resolver),
        };

        info!(
            proxy_resolution = ?config.identity.proxy_resolution,
            attributes = config.attributes.enabled,
            mode = ?config.attributes.mode,
            "Security context service initialized"
        );

        Ok(Self {
            config,
            trust_store,
            interceptor: Arc::new(interceptor),
        })
    }

    pub fn config(&self) -> &SecurityContextConfig {
        &self.config
    }

    pub fn trust_store(&self) -> Option<&Arc<VomsTrustStore>> {
        self.trust_store.as_ref()
    }

    pub fn interceptor(&self) -> &Arc<SecurityContextInterceptor> {
        &self.interceptor
    }

    pub fn metrics(&self) -> &Arc<InterceptionMetrics> {
        self.interceptor.metrics()
    }

    /// Start periodic trust store reloads. `None` when no directory-backed
    /// store is in use.
    pub fn start_trust_store_refresh(&self) -> Option<JoinHandle<()>> {
        self.trust_store
            .as_ref()
            .map(|store| store.spawn_refresh(self.config.attributes.refresh_interval()))
    }

    pub async fn handle<S, F, Fut>(&self, source: &S, downstream: F) -> Fut::Output
    where
        S: PeerCertificateSource + ?Sized,
        F: FnOnce(Arc<SecurityContext>) -> Fut,
        Fut: Future,
    {
        self.interceptor.handle(source, downstream).await
    }
}
