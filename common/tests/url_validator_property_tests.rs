// Property-based tests for the endpoint URL validator

use common::errors::UrlValidationError;
use common::fetch::validate_endpoint;
use proptest::prelude::*;

/// Well-formed https URLs on dotted lowercase domains always pass.
#[test]
fn property_dotted_https_domains_pass() {
    proptest!(|(
        host in "[a-z]{1,12}\\.[a-z]{2,6}",
        path in "[a-z0-9/]{0,40}"
    )| {
        let url = format!("https://{}/{}", host, path);
        prop_assert!(validate_endpoint(&url).is_ok(), "rejected {}", url);
    });
}

/// Any scheme other than https is rejected as HttpsRequired.
#[test]
fn property_non_https_schemes_rejected() {
    proptest!(|(
        scheme in prop::sample::select(vec!["http", "ftp", "ws", "wss"]),
        host in "[a-z]{1,12}\\.[a-z]{2,6}"
    )| {
        let url = format!("{}://{}/data", scheme, host);
        prop_assert_eq!(
            validate_endpoint(&url),
            Err(UrlValidationError::HttpsRequired)
        );
    });
}

/// Any explicit port other than 443 is rejected as Port443Required.
#[test]
fn property_non_default_ports_rejected() {
    proptest!(|(
        port in 1u16..65535u16,
        host in "[a-z]{1,12}\\.[a-z]{2,6}"
    )| {
        prop_assume!(port != 443);
        let url = format!("https://{}:{}/data", host, port);
        prop_assert_eq!(
            validate_endpoint(&url),
            Err(UrlValidationError::Port443Required)
        );
    });
}

/// Undotted hostnames are structurally invalid, whatever they are.
#[test]
fn property_undotted_hostnames_rejected() {
    proptest!(|(host in "[a-z][a-z0-9-]{0,20}")| {
        let url = format!("https://{}/data", host);
        prop_assert_eq!(
            validate_endpoint(&url),
            Err(UrlValidationError::InvalidDomainStructure)
        );
    });
}

/// Anything over 2000 characters is rejected as UrlTooLong, independent of
/// how far over it goes.
#[test]
fn property_overlong_urls_rejected() {
    proptest!(|(extra in 1usize..3000usize)| {
        let prefix = "https://api.example.com/";
        let url = format!("{}{}", prefix, "a".repeat(2000 - prefix.len() + extra));
        let length = url.len();
        prop_assert_eq!(
            validate_endpoint(&url),
            Err(UrlValidationError::UrlTooLong { length })
        );
    });
}

/// Block-list entries are rejected under any path and any casing.
#[test]
fn property_blocked_hostnames_rejected() {
    proptest!(|(
        host in prop::sample::select(vec![
            "metadata.google.internal",
            "169.254.169.254",
            "0.0.0.0",
            "consul.service.consul",
        ]),
        path in "[a-z0-9/]{0,30}"
    )| {
        let url = format!("https://{}/{}", host, path);
        match validate_endpoint(&url) {
            Err(UrlValidationError::BlockedHostname { hostname }) => {
                prop_assert_eq!(hostname, host);
            }
            other => prop_assert!(false, "expected BlockedHostname, got {:?}", other),
        }
    });
}
