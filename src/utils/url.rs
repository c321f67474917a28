// src/utils/url.rs

//! URL and address helpers.

use std::sync::OnceLock;

use regex::Regex;
use url::Url;

/// Normalize a raw website string into a crawlable URL.
///
/// Returns `None` for absent, malformed, or non-http(s) input. A bare
/// domain gets an `https://` scheme; fragments are stripped.
///
/// # Examples
/// ```
/// use menufinder::utils::url::normalize_site_url;
///
/// let url = normalize_site_url("example.com/about#team").unwrap();
/// assert_eq!(url.as_str(), "https://example.com/about");
/// assert!(normalize_site_url("").is_none());
/// assert!(normalize_site_url("ftp://example.com").is_none());
/// ```
pub fn normalize_site_url(raw: &str) -> Option<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let mut url = match Url::parse(trimmed) {
        Ok(url) => url,
        // A bare domain gets the https scheme
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            Url::parse(&format!("https://{trimmed}")).ok()?
        }
        Err(_) => return None,
    };
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    url.host_str()?;
    url.set_fragment(None);
    Some(url)
}

/// Lowercased host of a URL.
pub fn host_of(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Whether two URLs point at the same host.
///
/// # Examples
/// ```
/// use url::Url;
/// use menufinder::utils::url::same_host;
///
/// let a = Url::parse("https://example.com/menu").unwrap();
/// let b = Url::parse("https://EXAMPLE.com/").unwrap();
/// let c = Url::parse("https://other.com/").unwrap();
/// assert!(same_host(&a, &b));
/// assert!(!same_host(&a, &c));
/// ```
pub fn same_host(a: &Url, b: &Url) -> bool {
    match (host_of(a), host_of(b)) {
        (Some(ha), Some(hb)) => ha == hb,
        _ => false,
    }
}

/// Extract a UK postcode from a formatted address.
pub fn extract_postcode(address: &str) -> Option<String> {
    static POSTCODE: OnceLock<Regex> = OnceLock::new();
    let re = POSTCODE.get_or_init(|| {
        Regex::new(r"(?i)\b([A-Z]{1,2}\d[A-Z\d]?)\s?(\d[A-Z]{2})\b").expect("postcode regex")
    });
    re.captures(address).map(|caps| {
        format!(
            "{} {}",
            caps.get(1).map_or("", |m| m.as_str()).to_uppercase(),
            caps.get(2).map_or("", |m| m.as_str()).to_uppercase()
        )
    })
}
