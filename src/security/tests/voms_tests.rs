//! VOMS attribute validation tests

#[cfg(test)]
mod tests {
    use crate::config::AttributeConfig;
    use crate::error::VomsError;
    use crate::security::cert::DistinguishedName;
    use crate::security::identity::{resolve_identity, ProxyResolutionStrategy};
    use crate::security::tests::test_utils::*;
    use crate::security::voms::ac::decode_voms_extension;
    use crate::security::voms::{
        AttributeValidatorAdapter, Fqan, LocalVomsValidator, SignatureScheme, ValidationFailure,
        ValidationMode, ValidationResult, VomsAcValidator, VomsAttribute, VomsTrustStore,
    };
    use pretty_assertions::assert_eq;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct Fixture {
        ca: TestCertificate,
        aa: TestCertificate,
        alice: TestCertificate,
    }

    fn fixture() -> Fixture {
        let ca = TestPki::ca("ca");
        let aa = TestPki::attribute_authority(&ca, "voms.example.org");
        let alice = TestPki::end_entity(&ca, "alice");
        Fixture { ca, aa, alice }
    }

    fn proxy_chain(f: &Fixture, extension: Vec<u8>) -> Vec<crate::security::cert::ChainCertificate> {
        let proxy = TestPki::proxy_with_voms(&f.alice, ProxyStyle::Rfc3820, extension);
        parsed_chain_of(&[&proxy, &f.alice, &f.ca])
    }

    #[test]
    fn test_extension_decodes_to_attribute() {
        let f = fixture();
        let ac = AttributeCertificateBuilder::new(&f.aa, &f.alice, "atlas")
            .fqans(&["/atlas", "/atlas/production/Role=admin"])
            .build();

        let decoded = decode_voms_extension(&voms_extension(vec![ac.clone()])).unwrap();
        assert_eq!(decoded, vec![ac.clone()]);

        let attribute = VomsAttribute::from_attribute_certificate(&ac).unwrap();
        assert_eq!(attribute.vo, "atlas");
        assert_eq!(attribute.host_port.as_deref(), Some("voms.example.org:15000"));
        assert_eq!(attribute.issuer, *f.aa.parsed().subject());
        assert_eq!(attribute.holder_issuer.as_ref(), Some(f.ca.parsed().subject()));
        assert_eq!(attribute.holder_serial.as_deref(), Some(f.alice.parsed().raw_serial()));
        assert_eq!(attribute.serial, "015a");
        assert_eq!(attribute.primary_fqan(), Some(&Fqan::new("/atlas")));
        assert_eq!(attribute.fqans[1].role(), Some("admin"));
    }

    #[test]
    fn test_trusted_attribute_passes_strict_validation() {
        let f = fixture();
        let ac = AttributeCertificateBuilder::new(&f.aa, &f.alice, "atlas").build();
        let chain = proxy_chain(&f, voms_extension(vec![ac]));

        let validator = local_validator(&[&f.aa]);
        let results = validator.validate_with_detail(&chain);

        assert_eq!(results.len(), 1);
        assert!(results[0].is_valid(), "{:?}", results[0].failures());
        assert_eq!(validator.validate(&chain).len(), 1);
    }

    #[test]
    fn test_untrusted_issuer_is_rejected_in_strict_mode_only() {
        let f = fixture();
        let rogue = TestPki::attribute_authority(&f.ca, "rogue.example.org");
        let ac = AttributeCertificateBuilder::new(&rogue, &f.alice, "atlas").build();
        let chain = proxy_chain(&f, voms_extension(vec![ac]));

        let strict = AttributeValidatorAdapter::strict(local_validator(&[&f.aa]));
        let lenient = AttributeValidatorAdapter::lenient_unverified(local_validator(&[&f.aa]));

        assert!(strict.validate_strict(&chain).is_empty());
        let detail = strict.validate_with_detail(&chain);
        assert_eq!(
            detail[0].failures(),
            &[ValidationFailure::UntrustedIssuer {
                issuer: "CN=rogue.example.org".to_string()
            }]
        );

        let parsed = lenient.validate_lenient(&chain);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].issuer, *rogue.parsed().subject());
    }

    #[test]
    fn test_strict_never_returns_untrusted_attributes() {
        let f = fixture();
        let rogue = TestPki::attribute_authority(&f.ca, "rogue.example.org");
        let trusted = AttributeCertificateBuilder::new(&f.aa, &f.alice, "atlas").build();
        let untrusted = AttributeCertificateBuilder::new(&rogue, &f.alice, "cms").build();
        let chain = proxy_chain(&f, voms_extension(vec![trusted, untrusted]));

        let adapter = AttributeValidatorAdapter::strict(local_validator(&[&f.aa]));
        let resolution = adapter.resolve(&chain);

        let trust_set = vec![f.aa.parsed().subject().clone()];
        assert!(resolution
            .attributes
            .iter()
            .all(|attribute| trust_set.contains(&attribute.issuer)));
        assert_eq!(resolution.attributes.len(), 1);
        assert_eq!(resolution.results.len(), 2);
        assert_eq!(resolution.rejected(), 1);
    }

    #[test]
    fn test_tampered_signature_is_rejected() {
        let f = fixture();
        let ac = AttributeCertificateBuilder::new(&f.aa, &f.alice, "atlas")
            .corrupt_signature()
            .build();
        let chain = proxy_chain(&f, voms_extension(vec![ac]));

        let results = local_validator(&[&f.aa]).validate_with_detail(&chain);
        assert_eq!(results[0].failures(), &[ValidationFailure::BadSignature]);
        assert!(results[0].attribute.is_some());
    }

    #[test]
    fn test_signature_from_other_key_with_same_subject_is_rejected() {
        let f = fixture();
        let other_ca = TestPki::ca("other-ca");
        let impostor = TestPki::attribute_authority(&other_ca, "voms.example.org");
        let ac = AttributeCertificateBuilder::new(&impostor, &f.alice, "atlas").build();
        let chain = proxy_chain(&f, voms_extension(vec![ac]));

        let results = local_validator(&[&f.aa]).validate_with_detail(&chain);
        assert_eq!(results[0].failures(), &[ValidationFailure::BadSignature]);
    }

    #[test]
    fn test_expired_and_future_attribute_certificates() {
        let f = fixture();
        let expired = AttributeCertificateBuilder::new(&f.aa, &f.alice, "atlas")
            .validity(unix_time(-7200), unix_time(-3600))
            .build();
        let future = AttributeCertificateBuilder::new(&f.aa, &f.alice, "cms")
            .validity(unix_time(3600), unix_time(7200))
            .build();
        let chain = proxy_chain(&f, voms_extension(vec![expired, future]));

        let results = local_validator(&[&f.aa]).validate_with_detail(&chain);
        assert_eq!(results[0].failures(), &[ValidationFailure::Expired]);
        assert_eq!(results[1].failures(), &[ValidationFailure::NotYetValid]);
    }

    #[test]
    fn test_validation_at_fixed_time() {
        let f = fixture();
        let ac = AttributeCertificateBuilder::new(&f.aa, &f.alice, "atlas").build();
        let chain = proxy_chain(&f, voms_extension(vec![ac]));
        let validator = local_validator(&[&f.aa]);

        assert!(validator.validate_with_detail_at(&chain, unix_time(0))[0].is_valid());
        assert_eq!(
            validator.validate_with_detail_at(&chain, unix_time(48 * 3600))[0].failures(),
            &[ValidationFailure::Expired]
        );
    }

    #[test]
    fn test_expired_authority_certificate_is_rejected() {
        let f = fixture();
        let old_aa = TestPki::expired_attribute_authority(&f.ca, "old.example.org");
        let ac = AttributeCertificateBuilder::new(&old_aa, &f.alice, "atlas").build();
        let chain = proxy_chain(&f, voms_extension(vec![ac]));

        let results = local_validator(&[&old_aa]).validate_with_detail(&chain);
        assert_eq!(
            results[0].failures(),
            &[ValidationFailure::AuthorityCertificateExpired {
                issuer: "CN=old.example.org".to_string()
            }]
        );
    }

    #[test]
    fn test_attribute_for_other_holder_is_rejected() {
        let f = fixture();
        let bob = TestPki::end_entity(&f.ca, "bob");
        let ac = AttributeCertificateBuilder::new(&f.aa, &bob, "atlas").build();
        let chain = proxy_chain(&f, voms_extension(vec![ac]));

        let results = local_validator(&[&f.aa]).validate_with_detail(&chain);
        assert_eq!(results[0].failures(), &[ValidationFailure::HolderMismatch]);
    }

    #[test]
    fn test_holder_without_directory_issuer_is_rejected() {
        let f = fixture();
        let ac = AttributeCertificateBuilder::new(&f.aa, &f.alice, "atlas")
            .holder_issuer_uri("https://ca.example.org")
            .build();
        let chain = proxy_chain(&f, voms_extension(vec![ac]));

        let validator = local_validator(&[&f.aa]);
        let attributes = validator.parse(&chain);
        assert!(attributes[0].holder_issuer.is_none());
        assert_eq!(attributes[0].holder_serial.as_deref(), Some(f.alice.parsed().raw_serial()));

        let results = validator.validate_with_detail(&chain);
        assert_eq!(results[0].failures(), &[ValidationFailure::HolderMismatch]);
    }

    #[test]
    fn test_holder_follows_configured_identity_resolution() {
        let f = fixture();
        // CA-flagged end user: the two strategies pick different holders
        let carol = TestPki::end_entity_flagged_ca(&f.ca, "carol");
        let first = TestPki::proxy(&carol, ProxyStyle::Rfc3820);
        let ac = AttributeCertificateBuilder::new(&f.aa, &first, "atlas").build();
        let second = TestPki::proxy_with_voms(&first, ProxyStyle::Rfc3820, voms_extension(vec![ac]));
        let chain = parsed_chain_of(&[&second, &first, &carol, &f.ca]);

        let identity = resolve_identity(&chain, ProxyResolutionStrategy::BasicConstraintsScan).unwrap();
        assert_eq!(identity.subject(), first.parsed().subject());

        let proxy_aware = local_validator(&[&f.aa]);
        assert_eq!(proxy_aware.holder_resolution(), ProxyResolutionStrategy::ProxyAware);
        assert_eq!(
            proxy_aware.validate_with_detail(&chain)[0].failures(),
            &[ValidationFailure::HolderMismatch]
        );

        let scan = LocalVomsValidator::new(proxy_aware.trust_store().clone())
            .with_holder_resolution(ProxyResolutionStrategy::BasicConstraintsScan);
        let results = scan.validate_with_detail(&chain);
        assert!(results[0].is_valid(), "{:?}", results[0].failures());
    }

    #[test]
    fn test_p384_attribute_authority_is_verified() {
        let f = fixture();
        let aa = TestPki::attribute_authority_p384(&f.ca, "voms384.example.org");
        assert_eq!(aa.parsed().public_key_curve(), Some(OID_CURVE_P384));

        let ac = AttributeCertificateBuilder::new(&aa, &f.alice, "cms").build();
        let chain = proxy_chain(&f, voms_extension(vec![ac]));

        let results = local_validator(&[&aa]).validate_with_detail(&chain);
        assert!(results[0].is_valid(), "{:?}", results[0].failures());
    }

    #[test]
    fn test_signature_scheme_follows_authority_curve() {
        const P256: &str = "1.2.840.10045.3.1.7";
        const ECDSA_SHA256: &str = "1.2.840.10045.4.3.2";
        const ECDSA_SHA384: &str = "1.2.840.10045.4.3.3";
        const RSA_SHA256: &str = "1.2.840.113549.1.1.11";

        assert_eq!(SignatureScheme::select(ECDSA_SHA256, Some(P256)), Some(SignatureScheme::EcdsaP256Sha256));
        assert_eq!(SignatureScheme::select(ECDSA_SHA256, Some(OID_CURVE_P384)), Some(SignatureScheme::EcdsaP384Sha256));
        assert_eq!(SignatureScheme::select(ECDSA_SHA384, Some(P256)), Some(SignatureScheme::EcdsaP256Sha384));
        assert_eq!(SignatureScheme::select(ECDSA_SHA384, Some(OID_CURVE_P384)), Some(SignatureScheme::EcdsaP384Sha384));
        assert_eq!(SignatureScheme::select(RSA_SHA256, None), Some(SignatureScheme::RsaPkcs1Sha256));

        // mismatched key types and unknown curves
        assert_eq!(SignatureScheme::select(RSA_SHA256, Some(P256)), None);
        assert_eq!(SignatureScheme::select(ECDSA_SHA256, None), None);
        assert_eq!(SignatureScheme::select(ECDSA_SHA256, Some("1.3.132.0.35")), None);
    }

    #[test]
    fn test_undecodable_extension_is_reported_not_raised() {
        let f = fixture();
        let chain = proxy_chain(&f, vec![0x30, 0x03, 0x02, 0x01, 0x01]);

        let validator = local_validator(&[&f.aa]);
        let results = validator.validate_with_detail(&chain);

        assert_eq!(results.len(), 1);
        assert!(results[0].attribute.is_none());
        assert!(matches!(results[0].failures(), [ValidationFailure::Malformed(_)]));
        assert!(validator.parse(&chain).is_empty());
    }

    #[test]
    fn test_chain_without_attributes_yields_nothing() {
        let f = fixture();
        let chain = parsed_chain_of(&[&f.alice, &f.ca]);
        let adapter = AttributeValidatorAdapter::strict(local_validator(&[&f.aa]));

        let resolution = adapter.resolve(&chain);
        assert!(resolution.attributes.is_empty());
        assert!(resolution.results.is_empty());
    }

    #[test]
    fn test_strict_validation_is_idempotent() {
        let f = fixture();
        let ac = AttributeCertificateBuilder::new(&f.aa, &f.alice, "atlas")
            .fqans(&["/atlas", "/atlas/Role=pilot"])
            .build();
        let chain = proxy_chain(&f, voms_extension(vec![ac]));
        let adapter = AttributeValidatorAdapter::strict(local_validator(&[&f.aa]));

        let first = adapter.validate_strict(&chain);
        let second = adapter.validate_strict(&chain);
        assert_eq!(first, second);
        assert_eq!(first.len(), 1);
    }

    #[test]
    fn test_adapter_from_config_guards_lenient_mode() {
        let validator = Arc::new(MockVomsValidator::new(Vec::new()));

        let strict = AttributeValidatorAdapter::from_config(validator.clone(), &AttributeConfig::default()).unwrap();
        assert!(strict.is_secure());

        let mut config = AttributeConfig {
            mode: ValidationMode::Lenient,
            ..Default::default()
        };
        let result = AttributeValidatorAdapter::from_config(validator.clone(), &config);
        assert!(matches!(result, Err(VomsError::InvalidConfig(_))));

        config.allow_unverified_attributes = true;
        let lenient = AttributeValidatorAdapter::from_config(validator, &config).unwrap();
        assert_eq!(lenient.mode(), ValidationMode::Lenient);
        assert!(!lenient.is_secure());
    }

    #[test]
    fn test_lenient_resolution_keeps_detail_of_rejected_certificates() {
        let issuer = DistinguishedName::from_rdns(vec![crate::security::cert::Rdn::single("CN", "ca")]);
        let attribute = VomsAttribute::new("vo1", issuer.clone(), vec![Fqan::new("vo1/Role=admin")]);
        let validator = Arc::new(MockVomsValidator::new(vec![ValidationResult::invalid(
            Some(attribute.clone()),
            vec![ValidationFailure::UntrustedIssuer {
                issuer: issuer.rfc2253(),
            }],
        )]));

        let strict = AttributeValidatorAdapter::strict(validator.clone()).resolve(&[]);
        let lenient = AttributeValidatorAdapter::lenient_unverified(validator.clone()).resolve(&[]);

        assert!(strict.attributes.is_empty());
        assert_eq!(lenient.attributes, vec![attribute]);
        assert_eq!(strict.results, lenient.results);
        assert_eq!(validator.calls(), 2);
    }

    #[test]
    fn test_trust_store_loads_vo_subdirectories() {
        let f = fixture();
        let temp_dir = TempDir::new().unwrap();
        let vo_dir = temp_dir.path().join("atlas");
        fs::create_dir(&vo_dir).unwrap();
        fs::write(vo_dir.join("voms.example.org.pem"), f.aa.rcgen.serialize_pem_with_signer(&f.ca.rcgen).unwrap()).unwrap();
        fs::write(vo_dir.join("voms.example.org.lsc"), "/CN=voms.example.org\n/CN=ca\n").unwrap();

        let store = VomsTrustStore::from_directory(temp_dir.path()).unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.is_trusted(f.aa.parsed().subject()));
        assert!(!store.is_trusted(f.ca.parsed().subject()));
    }

    #[test]
    fn test_trust_store_reload_swaps_snapshot() {
        let f = fixture();
        let second = TestPki::attribute_authority(&f.ca, "voms2.example.org");
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("aa.pem"), f.aa.rcgen.serialize_pem_with_signer(&f.ca.rcgen).unwrap()).unwrap();

        let store = VomsTrustStore::from_directory(temp_dir.path()).unwrap();
        let before = store.snapshot();
        assert_eq!(before.len(), 1);

        fs::write(
            temp_dir.path().join("aa2.pem"),
            second.rcgen.serialize_pem_with_signer(&f.ca.rcgen).unwrap(),
        )
        .unwrap();
        assert_eq!(store.reload().unwrap(), 2);
        assert!(store.is_trusted(second.parsed().subject()));
        // readers holding the old snapshot are unaffected
        assert_eq!(before.len(), 1);
    }

    #[test]
    fn test_failed_reload_keeps_previous_snapshot() {
        let f = fixture();
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("aa.pem");
        fs::write(&path, f.aa.rcgen.serialize_pem_with_signer(&f.ca.rcgen).unwrap()).unwrap();

        let store = VomsTrustStore::from_directory(temp_dir.path()).unwrap();
        fs::remove_file(&path).unwrap();

        assert!(matches!(store.reload(), Err(VomsError::ValidatorUnavailable(_))));
        assert_eq!(store.len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_trust_store_skips_symlinked_directories() {
        let f = fixture();
        let temp_dir = TempDir::new().unwrap();
        let vo_dir = temp_dir.path().join("atlas");
        fs::create_dir(&vo_dir).unwrap();
        fs::write(vo_dir.join("voms.example.org.pem"), f.aa.rcgen.serialize_pem_with_signer(&f.ca.rcgen).unwrap()).unwrap();
        std::os::unix::fs::symlink(temp_dir.path(), vo_dir.join("loop")).unwrap();

        let store = VomsTrustStore::from_directory(temp_dir.path()).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.reload().unwrap(), 1);
    }

    #[test]
    fn test_empty_or_missing_voms_dir_is_unavailable() {
        let temp_dir = TempDir::new().unwrap();
        assert!(matches!(
            VomsTrustStore::from_directory(temp_dir.path()),
            Err(VomsError::ValidatorUnavailable(_))
        ));
        assert!(matches!(
            VomsTrustStore::from_directory(temp_dir.path().join("missing")),
            Err(VomsError::ValidatorUnavailable(_))
        ));
    }
}
