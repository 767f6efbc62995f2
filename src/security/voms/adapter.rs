//! Attribute Validator Adapter
//!
//! Front door to the attribute validator with an explicit, named trust mode.
//! Strict mode is the default; lenient mode returns attributes that were
//! never verified and has to be asked for by name.

use super::attribute::VomsAttribute;
use super::validator::{ValidationResult, VomsAcValidator};
use crate::config::AttributeConfig;
use crate::error::{Result, VomsError};
use crate::security::cert::ChainCertificate;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationMode {
    /// Only attributes that pass signature, trust, validity and holder checks
    #[default]
    Strict,
    /// Attributes are parsed but not verified
    Lenient,
}

/// Attributes selected for a context plus the per-certificate diagnostics
#[derive(Debug, Clone, Default)]
pub struct AttributeResolution {
    pub attributes: Vec<VomsAttribute>,
    pub results: Vec<ValidationResult>,
}

impl AttributeResolution {
    pub fn rejected(&self) -> usize {
        self.results.iter().filter(|result| !result.is_valid()).count()
    }
}

pub struct AttributeValidatorAdapter {
    validator: Arc<dyn VomsAcValidator>,
    mode: ValidationMode,
}

impl AttributeValidatorAdapter {
    pub fn strict(validator: Arc<dyn VomsAcValidator>) -> Self {
        Self {
            validator,
            mode: ValidationMode::Strict,
        }
    }

    /// Adapter that hands out attributes without verifying them
    pub fn lenient_unverified(validator: Arc<dyn VomsAcValidator>) -> Self {
        warn!("VOMS attributes will be parsed WITHOUT signature or trust verification");
        Self {
            validator,
            mode: ValidationMode::Lenient,
        }
    }

    /// Build from configuration; lenient mode also requires
    /// `allow_unverified_attributes`.
    pub fn from_config(validator: Arc<dyn VomsAcValidator>, config: &AttributeConfig) -> Result<Self> {
        match config.mode {
            ValidationMode::Strict => Ok(Self::strict(validator)),
            ValidationMode::Lenient if config.allow_unverified_attributes => {
                Ok(Self::lenient_unverified(validator))
            }
            ValidationMode::Lenient => Err(VomsError::InvalidConfig(
                "attributes.mode = \"lenient\" requires attributes.allow_unverified_attributes = true"
                    .to_string(),
            )),
        }
    }

    pub fn mode(&self) -> ValidationMode {
        self.mode
    }

    pub fn is_secure(&self) -> bool {
        self.mode == ValidationMode::Strict
    }

    pub fn validate_strict(&self, chain: &[ChainCertificate]) -> Vec<VomsAttribute> {
        self.validator.validate(chain)
    }

    pub fn validate_lenient(&self, chain: &[ChainCertificate]) -> Vec<VomsAttribute> {
        self.validator.parse(chain)
    }

    pub fn validate_with_detail(&self, chain: &[ChainCertificate]) -> Vec<ValidationResult> {
        self.validator.validate_with_detail(chain)
    }

    /// Attributes for the configured mode together with detailed results
    pub fn resolve(&self, chain: &[ChainCertificate]) -> AttributeResolution {
        let results = self.validate_with_detail(chain);
        let attributes = match self.mode {
            ValidationMode::Strict => results
                .iter()
                .filter(|result| result.is_valid())
                .filter_map(|result| result.attribute.clone())
                .collect(),
            ValidationMode::Lenient => self.validate_lenient(chain),
        };
        AttributeResolution { attributes, results }
    }
}
