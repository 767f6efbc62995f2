//! VOMS Attribute Certificates
//!
//! Decoding, trust anchoring and validation of the VOMS attribute
//! certificates embedded in grid proxy chains.

pub mod ac;
pub mod adapter;
pub mod attribute;
pub mod trust_store;
pub mod validator;

pub use adapter::{AttributeResolution, AttributeValidatorAdapter, ValidationMode};
pub use attribute::{Fqan, VomsAttribute};
pub use trust_store::VomsTrustStore;
pub use validator::{
    LocalVomsValidator, SignatureScheme, ValidationFailure, ValidationOutcome, ValidationResult,
    VomsAcValidator,
};
