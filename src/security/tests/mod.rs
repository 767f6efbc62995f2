//! Security context test suite
//!
//! Covers chain ordering and identity resolution through proxies, VOMS
//! attribute validation in strict and lenient mode, context assembly,
//! request scoping and the interception stage.

pub mod voms_tests;

pub use test_utils::*;
