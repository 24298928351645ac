// Endpoint URL validation (SSRF guard)
//
// The whole point of the product is "fetch a URL the user gives you", so the
// policy is deliberately conservative: HTTPS on port 443 only, real-looking
// domain names only, plus a static block-list of well-known internal targets.
// The hostname is NOT resolved here; a public name pointing at an internal
// address still passes (accepted residual gap).

use crate::errors::UrlValidationError;
use url::Url;

/// Maximum accepted URL length in characters
pub const MAX_URL_LENGTH: usize = 2000;

/// Hostnames that are never fetched, compared case-insensitively
pub const BLOCKED_HOSTNAMES: [&str; 6] = [
    "localhost",
    "0.0.0.0",
    ".", // DNS root
    "metadata.google.internal",
    "169.254.169.254", // AWS metadata
    "consul.service.consul",
];

/// Validate a user-supplied endpoint URL before any network I/O.
///
/// Checks run in order and short-circuit on the first failure:
/// parseable, https, port 443, non-empty hostname, >= 2 non-empty
/// dot-separated labels, block-list, total length.
pub fn validate_endpoint(raw: &str) -> Result<Url, UrlValidationError> {
    let parsed = Url::parse(raw).map_err(|_| UrlValidationError::InvalidFormat)?;

    if parsed.scheme() != "https" {
        return Err(UrlValidationError::HttpsRequired);
    }

    if parsed.port_or_known_default() != Some(443) {
        return Err(UrlValidationError::Port443Required);
    }

    let hostname = parsed.host_str().unwrap_or("").to_ascii_lowercase();
    if hostname.is_empty() {
        return Err(UrlValidationError::HostnameNotAllowed);
    }

    // Require a dotted domain with a TLD; rejects bare hosts ("localhost"),
    // leading/trailing dots and empty labels.
    let labels: Vec<&str> = hostname.split('.').collect();
    if labels.len() < 2 || labels.iter().any(|label| label.is_empty()) {
        return Err(UrlValidationError::InvalidDomainStructure);
    }

    if BLOCKED_HOSTNAMES.contains(&hostname.as_str()) {
        return Err(UrlValidationError::BlockedHostname { hostname });
    }

    if raw.len() > MAX_URL_LENGTH {
        return Err(UrlValidationError::UrlTooLong { length: raw.len() });
    }

    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_normal_https_endpoint() {
        assert!(validate_endpoint("https://api.example.com/data.json").is_ok());
        assert!(validate_endpoint("https://api.example.com:443/data").is_ok());
        assert!(validate_endpoint("https://sub.domain.example.co.uk/path?q=1").is_ok());
    }

    #[test]
    fn test_rejects_unparseable() {
        assert_eq!(
            validate_endpoint("not a url"),
            Err(UrlValidationError::InvalidFormat)
        );
        assert_eq!(
            validate_endpoint("/relative/path"),
            Err(UrlValidationError::InvalidFormat)
        );
    }

    #[test]
    fn test_rejects_non_https_scheme() {
        assert_eq!(
            validate_endpoint("http://api.example.com/data"),
            Err(UrlValidationError::HttpsRequired)
        );
        assert_eq!(
            validate_endpoint("ftp://example.com/file"),
            Err(UrlValidationError::HttpsRequired)
        );
    }

    #[test]
    fn test_rejects_non_default_port() {
        assert_eq!(
            validate_endpoint("https://api.example.com:8080/data"),
            Err(UrlValidationError::Port443Required)
        );
        assert_eq!(
            validate_endpoint("https://api.example.com:8443/"),
            Err(UrlValidationError::Port443Required)
        );
    }

    #[test]
    fn test_rejects_bare_hostnames() {
        // No dot: the domain-structure check fires before the block-list
        assert_eq!(
            validate_endpoint("https://localhost/path"),
            Err(UrlValidationError::InvalidDomainStructure)
        );
        assert_eq!(
            validate_endpoint("https://internal-service/api"),
            Err(UrlValidationError::InvalidDomainStructure)
        );
    }

    #[test]
    fn test_rejects_malformed_domains() {
        assert_eq!(
            validate_endpoint("https://example./data"),
            Err(UrlValidationError::InvalidDomainStructure)
        );
        assert_eq!(
            validate_endpoint("https://example..com/data"),
            Err(UrlValidationError::InvalidDomainStructure)
        );
    }

    #[test]
    fn test_rejects_blocked_hostnames() {
        assert_eq!(
            validate_endpoint("https://metadata.google.internal/computeMetadata/v1/"),
            Err(UrlValidationError::BlockedHostname {
                hostname: "metadata.google.internal".to_string()
            })
        );
        assert_eq!(
            validate_endpoint("https://169.254.169.254/latest/meta-data/"),
            Err(UrlValidationError::BlockedHostname {
                hostname: "169.254.169.254".to_string()
            })
        );
        assert_eq!(
            validate_endpoint("https://0.0.0.0/x"),
            Err(UrlValidationError::BlockedHostname {
                hostname: "0.0.0.0".to_string()
            })
        );
        assert_eq!(
            validate_endpoint("https://consul.service.consul/v1/agent/self"),
            Err(UrlValidationError::BlockedHostname {
                hostname: "consul.service.consul".to_string()
            })
        );
    }

    #[test]
    fn test_block_list_is_case_insensitive() {
        assert!(matches!(
            validate_endpoint("https://Metadata.Google.Internal/x"),
            Err(UrlValidationError::BlockedHostname { .. })
        ));
    }

    #[test]
    fn test_rejects_overlong_urls() {
        let url = format!("https://api.example.com/{}", "a".repeat(2000));
        assert!(matches!(
            validate_endpoint(&url),
            Err(UrlValidationError::UrlTooLong { .. })
        ));
        // Exactly at the limit is fine
        let path_len = 2000 - "https://api.example.com/".len();
        let url = format!("https://api.example.com/{}", "a".repeat(path_len));
        assert_eq!(url.len(), 2000);
        assert!(validate_endpoint(&url).is_ok());
    }
}
