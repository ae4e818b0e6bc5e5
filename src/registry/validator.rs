//! URL Validator (C1) — rejects endpoint URLs that would enable SSRF or
//! point to private infrastructure. See spec.md §4.1.

use std::net::IpAddr;

use crate::errors::GatewayError;

const BLOCKED_PORTS: &[u16] = &[22, 23, 25, 110, 143, 3306, 5432, 6379, 27017];
const BLOCKED_SUFFIXES: &[&str] = &[".local", ".internal", ".lan", ".corp"];

/// Validates a candidate endpoint URL, rejecting anything that could be used
/// for SSRF against private infrastructure.
pub fn validate_endpoint_url(raw: &str) -> Result<url::Url, GatewayError> {
    let url = url::Url::parse(raw)
        .map_err(|e| GatewayError::InvalidUrl(format!("malformed URL: {e}")))?;

    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(GatewayError::InvalidUrl(format!(
                "scheme '{other}' is not allowed; use http or https"
            )))
        }
    }

    let host = url
        .host_str()
        .ok_or_else(|| GatewayError::InvalidUrl("URL has no host".to_string()))?;

    let host_lower = host.to_ascii_lowercase();
    if host_lower == "localhost" {
        return Err(GatewayError::InvalidUrl(
            "host 'localhost' is not allowed".to_string(),
        ));
    }
    if BLOCKED_SUFFIXES.iter().any(|suf| host_lower.ends_with(suf)) {
        return Err(GatewayError::InvalidUrl(format!(
            "host '{host}' uses a blocked internal suffix"
        )));
    }

    if let Ok(ip) = host_lower.parse::<IpAddr>() {
        if is_private_or_loopback(ip) {
            return Err(GatewayError::InvalidUrl(format!(
                "host '{host}' resolves to private/loopback infrastructure"
            )));
        }
    }

    if let Some(port) = url.port() {
        if BLOCKED_PORTS.contains(&port) {
            return Err(GatewayError::InvalidUrl(format!(
                "port {port} is not allowed"
            )));
        }
    }

    Ok(url)
}

/// Best-effort DNS resolution check: if the host resolves to any blocked
/// address, reject it too. DNS failures are not themselves an error — a
/// literal/suffix check already covers the contract when resolution isn't
/// feasible (spec.md §4.1).
pub async fn validate_resolved(url: &url::Url) -> Result<(), GatewayError> {
    let Some(host) = url.host_str() else {
        return Ok(());
    };
    if host.parse::<IpAddr>().is_ok() {
        return Ok(());
    }
    let port = url.port().unwrap_or(if url.scheme() == "https" { 443 } else { 80 });
    let lookup = format!("{host}:{port}");
    if let Ok(addrs) = tokio::net::lookup_host(lookup).await {
        for addr in addrs {
            if is_private_or_loopback(addr.ip()) {
                return Err(GatewayError::InvalidUrl(format!(
                    "host '{host}' resolves to private/loopback infrastructure"
                )));
            }
        }
    }
    Ok(())
}

fn is_private_or_loopback(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.octets()[0] == 127
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || (v6.segments()[0] & 0xfe00) == 0xfc00 // fc00::/7
                || (v6.segments()[0] & 0xffc0) == 0xfe80 // fe80::/10
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_loopback() {
        assert!(validate_endpoint_url("http://127.0.0.1:8000").is_err());
    }

    #[test]
    fn rejects_private_range() {
        assert!(validate_endpoint_url("http://10.0.0.5:8000").is_err());
        assert!(validate_endpoint_url("http://172.16.0.5:8000").is_err());
        assert!(validate_endpoint_url("http://192.168.1.5:8000").is_err());
        assert!(validate_endpoint_url("http://169.254.1.5:8000").is_err());
    }

    #[test]
    fn rejects_localhost_and_internal_suffixes() {
        assert!(validate_endpoint_url("http://localhost:8000").is_err());
        assert!(validate_endpoint_url("http://foo.internal").is_err());
        assert!(validate_endpoint_url("http://foo.lan").is_err());
        assert!(validate_endpoint_url("http://foo.corp").is_err());
        assert!(validate_endpoint_url("http://foo.local").is_err());
    }

    #[test]
    fn rejects_blocked_ports() {
        assert!(validate_endpoint_url("https://example.com:5432").is_err());
        assert!(validate_endpoint_url("https://example.com:6379").is_err());
    }

    #[test]
    fn rejects_bad_scheme() {
        assert!(validate_endpoint_url("ftp://example.com").is_err());
    }

    #[test]
    fn accepts_public_https() {
        assert!(validate_endpoint_url("https://example.com").is_ok());
        assert!(validate_endpoint_url("https://api.example.com:8443/path").is_ok());
    }
}
