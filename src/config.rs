use crate::security::identity::ProxyResolutionStrategy;
use crate::security::voms::ValidationMode;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityContextConfig {
    pub identity: IdentityConfig,
    pub attributes: AttributeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    pub proxy_resolution: ProxyResolutionStrategy,
    /// Order the presented chain before resolving; when off the chain must
    /// already be leaf first
    pub sort_chain: bool,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            proxy_resolution: ProxyResolutionStrategy::ProxyAware,
            sort_chain: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributeConfig {
    /// Resolve VOMS attributes at all; plain X.509 deployments turn this off
    pub enabled: bool,
    pub mode: ValidationMode,
    pub allow_unverified_attributes: bool,
    pub voms_dir: PathBuf,
    pub refresh_interval_secs: u64,
}

impl Default for AttributeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: ValidationMode::Strict,
            allow_unverified_attributes: false,
            voms_dir: PathBuf::from("/etc/grid-security/vomsdir"),
            refresh_interval_secs: 600, // 10 minutes
        }
    }
}

impl AttributeConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn validate(&self) -> crate::Result<()> {
        if !self.enabled {
            return Ok(());
        }

        if self.mode == ValidationMode::Lenient && !self.allow_unverified_attributes {
            return Err(crate::error::VomsError::InvalidConfig(
                "attributes.mode = \"lenient\" requires attributes.allow_unverified_attributes = true"
                    .to_string(),
            ));
        }

        if self.voms_dir.as_os_str().is_empty() {
            return Err(crate::error::VomsError::InvalidConfig(
                "attributes.voms_dir cannot be empty".to_string(),
            ));
        }

        if self.refresh_interval_secs == 0 {
            return Err(crate::error::VomsError::InvalidConfig(
                "attributes.refresh_interval_secs must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl SecurityContextConfig {
    pub fn from_file(path: impl AsRef<Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> crate::Result<Self> {
        let config: SecurityContextConfig =
            toml::from_str(content).map_err(|e| crate::error::VomsError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> crate::Result<()> {
        self.attributes.validate()
    }
}
