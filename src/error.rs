use thiserror::Error;

pub type Result<T> = std::result::Result<T, VomsError>;

#[derive(Error, Debug)]
pub enum VomsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed certificate chain: {0}")]
    MalformedChain(String),

    #[error("Invalid certificate: {reason}")]
    InvalidCertificate { reason: String },

    #[error("Attribute validator unavailable: {0}")]
    ValidatorUnavailable(String),

    #[error("Security context already resolved for {subject}")]
    AlreadyResolved { subject: String },

    #[error("No security context scope is active on this task")]
    NoActiveScope,

    #[error("Peer certificate extraction failed: {0}")]
    PeerCertificates(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl VomsError {
    /// Whether the error stems from untrustworthy client input rather than
    /// from a broken service configuration.
    pub fn is_client_input(&self) -> bool {
        matches!(
            self,
            VomsError::MalformedChain(_)
                | VomsError::InvalidCertificate { .. }
                | VomsError::PeerCertificates(_)
        )
    }
}
