//! Source URL validation (SSRF protection).

use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;
use url::Url;

/// Maximum URL length to prevent DoS attacks.
pub const MAX_URL_LENGTH: usize = 2048;

/// Blocked URL patterns (internal hosts and metadata endpoints).
static BLOCKED_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"^https?://127\.").unwrap(),
        Regex::new(r"^https?://0\.").unwrap(),
        Regex::new(r"^https?://localhost").unwrap(),
        Regex::new(r"^https?://10\.").unwrap(),
        Regex::new(r"^https?://172\.(1[6-9]|2[0-9]|3[0-1])\.").unwrap(),
        Regex::new(r"^https?://192\.168\.").unwrap(),
        Regex::new(r"^https?://169\.254\.").unwrap(),
        Regex::new(r"^https?://\[::1\]").unwrap(),
        Regex::new(r"^https?://\[fd").unwrap(),
        Regex::new(r"^https?://\[fe80").unwrap(),
        Regex::new(r"^https?://metadata\.").unwrap(),
    ]
});

/// Validate a source video URL and return it trimmed.
///
/// Only `http`/`https` URLs with a host are accepted. Internal addresses are
/// always rejected; when `allowed_domains` is non-empty the host (or its
/// registrable parent) must be listed.
pub fn validate_source_url(url: &str, allowed_domains: &[String]) -> Result<String, String> {
    if url.len() > MAX_URL_LENGTH {
        return Err(format!("URL exceeds maximum length of {} characters", MAX_URL_LENGTH));
    }

    let url = url.trim();
    if url.is_empty() {
        return Err("URL cannot be empty".to_string());
    }

    let parsed = Url::parse(url).map_err(|e| format!("Invalid URL format: {}", e))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(format!(
                "Invalid protocol '{}'. Only HTTP and HTTPS are allowed.",
                scheme
            ))
        }
    }

    let lowered = url.to_lowercase();
    if BLOCKED_PATTERNS.iter().any(|p| p.is_match(&lowered)) {
        warn!(url = %url, "Blocked URL pattern detected");
        return Err("URL appears to target an internal or restricted endpoint".to_string());
    }

    let domain = parsed
        .host_str()
        .map(|d| d.to_lowercase())
        .ok_or_else(|| "URL must have a valid domain".to_string())?;

    if !allowed_domains.is_empty() && !is_domain_allowed(&domain, allowed_domains) {
        return Err(format!("Domain '{}' is not allowed", domain));
    }

    Ok(url.to_string())
}

fn is_domain_allowed(domain: &str, allowed: &[String]) -> bool {
    allowed
        .iter()
        .any(|a| domain == a || domain.ends_with(&format!(".{}", a)))
}
