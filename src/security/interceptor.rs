//! Request Interception Stage
//!
//! Runs before any application logic on every request: reads the peer
//! certificate chain from the transport, assembles a [`SecurityContext`] and
//! publishes it into the request scope. Requests without a usable chain still
//! proceed, carrying an unauthenticated context.

use crate::error::Result;
use crate::security::metrics::InterceptionMetrics;
use crate::security::context::SecurityContext;
use crate::security::identity::IdentityResolver;
use crate::security::scope::CurrentSecurityContext;
use crate::security::voms::AttributeValidatorAdapter;

use rustls::{Certificate, ServerConnection};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Transport-side view of an inbound connection
pub trait PeerCertificateSource {
    /// Chain presented by the peer, `None` when the client sent none
    fn peer_certificates(&self) -> Result<Option<Vec<Certificate>>>;

    fn remote_addr(&self) -> Option<String>;

    fn session_id(&self) -> Option<String>;
}

/// Peer information captured from a completed TLS handshake
#[derive(Debug, Clone)]
pub struct TlsPeerInfo {
    certificates: Option<Vec<Certificate>>,
    remote_addr: SocketAddr,
    connection_id: String,
}

impl TlsPeerInfo {
    pub fn new(certificates: Option<Vec<Certificate>>, remote_addr: SocketAddr) -> Self {
        Self {
            certificates,
            remote_addr,
            connection_id: Uuid::new_v4().to_string(),
        }
    }

    pub fn from_server_connection(connection: &ServerConnection, remote_addr: SocketAddr) -> Result<Self> {
        if connection.is_handshaking() {
            return Err(crate::error::VomsError::PeerCertificates(
                "TLS handshake has not completed".to_string(),
            ));
        }
        let certificates = connection.peer_certificates().map(|certs| certs.to_vec());
        Ok(Self::new(certificates, remote_addr))
    }
}

impl PeerCertificateSource for TlsPeerInfo {
    fn peer_certificates(&self) -> Result<Option<Vec<Certificate>>> {
        Ok(self.certificates.clone())
    }

    fn remote_addr(&self) -> Option<String> {
        Some(self.remote_addr.to_string())
    }

    fn session_id(&self) -> Option<String> {
        Some(self.connection_id.clone())
    }
}

pub struct SecurityContextInterceptor {
    resolver: IdentityResolver,
    adapter: Option<Arc<AttributeValidatorAdapter>>,
    metrics: Arc<InterceptionMetrics>,
}

impl SecurityContextInterceptor {
    pub fn new(resolver: IdentityResolver, adapter: Arc<AttributeValidatorAdapter>) -> Self {
        Self {
            resolver,
            adapter: Some(adapter),
            metrics: Arc::new(InterceptionMetrics::new()),
        }
    }

    /// Interceptor for plain X.509 deployments without VOMS
    pub fn without_attributes(resolver: IdentityResolver) -> Self {
        Self {
            resolver,
            adapter: None,
            metrics: Arc::new(InterceptionMetrics::new()),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<InterceptionMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &Arc<InterceptionMetrics> {
        &self.metrics
    }

    pub fn adapter(&self) -> Option<&Arc<AttributeValidatorAdapter>> {
        self.adapter.as_ref()
    }

    fn empty_context(&self) -> SecurityContext {
        match &self.adapter {
            Some(adapter) => SecurityContext::new(self.resolver, Arc::clone(adapter)),
            None => SecurityContext::without_attributes(self.resolver),
        }
    }

    /// Build the request's context and publish it into the active scope.
    ///
    /// Never fails: anything wrong with the presented chain yields an
    /// unauthenticated context.
    pub fn intercept<S>(&self, source: &S) -> Arc<SecurityContext>
    where
        S: PeerCertificateSource + ?Sized,
    {
        let mut context = self.empty_context();
        if let Some(remote_addr) = source.remote_addr() {
            context = context.with_remote_addr(remote_addr);
        }
        if let Some(session_id) = source.session_id() {
            context = context.with_session_id(session_id);
        }

        let chain = match source.peer_certificates() {
            Ok(chain) => chain.filter(|certs| !certs.is_empty()),
            Err(e) => {
                warn!(
                    remote = context.remote_addr().unwrap_or("unknown"),
                    error = %e,
                    "Could not read peer certificates, treating connection as unauthenticated"
                );
                self.metrics.record_extraction_failure();
                None
            }
        };

        match chain {
            None => {
                info!("{}", context.connection_message());
                self.metrics.record_unauthenticated();
            }
            Some(chain) => {
                let started = Instant::now();
                match context.set_client_cert_chain(&chain) {
                    Ok(()) => {
                        let rejected = context
                            .validation_results()
                            .iter()
                            .filter(|result| !result.is_valid())
                            .count();
                        self.metrics.record_authenticated(
                            started.elapsed(),
                            context.voms_attributes().len(),
                            rejected,
                        );
                        debug!("{}", context.connection_message());
                    }
                    Err(e) => {
                        warn!(
                            remote = context.remote_addr().unwrap_or("unknown"),
                            error = %e,
                            "Rejected client certificate chain, proceeding unauthenticated"
                        );
                        self.metrics.record_malformed_chain();
                    }
                }
            }
        }

        let context = Arc::new(context);
        if CurrentSecurityContext::publish(Arc::clone(&context)).is_err() {
            debug!("No request scope active, security context not published");
        }
        context
    }

    /// Run `downstream` for one request inside a fresh scope holding the
    /// intercepted context. The scope is cleared on every exit path.
    pub async fn handle<S, F, Fut>(&self, source: &S, downstream: F) -> Fut::Output
    where
        S: PeerCertificateSource + ?Sized,
        F: FnOnce(Arc<SecurityContext>) -> Fut,
        Fut: Future,
    {
        CurrentSecurityContext::scope(async {
            let context = self.intercept(source);
            let output = downstream(context).await;
            CurrentSecurityContext::clear();
            output
        })
        .await
    }
}
