//! crates/blog_pipeline_core/src/url_guard.rs
//!
//! SSRF policy for outbound fetches. A URL is validated before any connection is made;
//! the fetcher applies the same check to every redirect hop and to the final URL.

use std::net::{Ipv4Addr, Ipv6Addr};
use url::{Host, Url};

/// Why a URL was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UrlRejection {
    #[error("URL could not be parsed: {0}")]
    Malformed(String),
    #[error("only https URLs are allowed, got '{0}'")]
    Scheme(String),
    #[error("URL has no host")]
    MissingHost,
    #[error("host '{0}' points at a loopback or unspecified address")]
    Loopback(String),
    #[error("host '{0}' points at a private or link-local network")]
    PrivateNetwork(String),
    #[error("port {0} is not allowed")]
    Port(u16),
    #[error("URLs with embedded credentials are not allowed")]
    Credentials,
}

const ALLOWED_PORTS: [u16; 2] = [80, 443];

/// Validates `raw` against the fetch policy and returns the parsed URL.
pub fn validate(raw: &str) -> Result<Url, UrlRejection> {
    let url = Url::parse(raw.trim()).map_err(|e| UrlRejection::Malformed(e.to_string()))?;
    validate_url(&url)?;
    Ok(url)
}

/// Applies the policy to an already-parsed URL.
pub fn validate_url(url: &Url) -> Result<(), UrlRejection> {
    if url.scheme() != "https" {
        return Err(UrlRejection::Scheme(url.scheme().to_string()));
    }
    if !url.username().is_empty() || url.password().is_some() {
        return Err(UrlRejection::Credentials);
    }

    // `port()` is None when the port is absent or equals the scheme default.
    if let Some(port) = url.port() {
        if !ALLOWED_PORTS.contains(&port) {
            return Err(UrlRejection::Port(port));
        }
    }

    match url.host() {
        None => Err(UrlRejection::MissingHost),
        Some(Host::Domain(domain)) => check_domain(domain),
        Some(Host::Ipv4(ip)) => check_ipv4(ip, &ip.to_string()),
        Some(Host::Ipv6(ip)) => check_ipv6(ip),
    }
}

fn check_domain(domain: &str) -> Result<(), UrlRejection> {
    let host = domain.trim_end_matches('.').to_ascii_lowercase();
    if host.is_empty() {
        return Err(UrlRejection::MissingHost);
    }
    if host == "localhost" || host.ends_with(".localhost") {
        return Err(UrlRejection::Loopback(host));
    }
    if host.ends_with(".internal") || host.ends_with(".local") {
        return Err(UrlRejection::PrivateNetwork(host));
    }
    Ok(())
}

fn check_ipv4(ip: Ipv4Addr, display: &str) -> Result<(), UrlRejection> {
    if ip.is_loopback() || ip.is_unspecified() {
        return Err(UrlRejection::Loopback(display.to_string()));
    }
    // 10/8, 172.16/12, 192.168/16, and 169.254/16
    if ip.is_private() || ip.is_link_local() {
        return Err(UrlRejection::PrivateNetwork(display.to_string()));
    }
    Ok(())
}

fn check_ipv6(ip: Ipv6Addr) -> Result<(), UrlRejection> {
    let display = ip.to_string();
    if let Some(mapped) = ip.to_ipv4_mapped() {
        return check_ipv4(mapped, &display);
    }
    if ip.is_loopback() || ip.is_unspecified() {
        return Err(UrlRejection::Loopback(display));
    }
    let first = ip.segments()[0];
    // fc00::/7 unique-local, fe80::/10 link-local
    if (first & 0xfe00) == 0xfc00 || (first & 0xffc0) == 0xfe80 {
        return Err(UrlRejection::PrivateNetwork(display));
    }
    Ok(())
}
