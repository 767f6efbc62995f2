pub mod config;
pub mod error;
pub mod security;

pub use config::SecurityContextConfig;
pub use error::{Result, VomsError};
pub use security::{CurrentSecurityContext, SecurityContext, SecurityContextInterceptor, SecurityContextService};
