//! Request fingerprinting: canonical URL plus sha256 identity key.
//!
//! The fingerprint is the store key for a request, so it must be stable
//! across process restarts and insensitive to URL noise (host case,
//! fragments, optionally query order). Two requests that are "the same
//! request" for replay purposes must always collapse to the same key.

use sha2::{Digest, Sha256};
use url::Url;

use crate::config::Config;
use crate::http::Request;

/// Error type for URL canonicalization failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Canonicalize a URL string for fingerprinting.
///
/// Normalization steps:
/// 1. Trim leading/trailing whitespace
/// 2. Default scheme to https:// if missing
/// 3. Lowercase the host
/// 4. Remove fragment (#...)
/// 5. Optionally sort query pairs so reordered equivalents collapse
pub fn canonicalize(input: &str, sort_query: bool) -> Result<Url, UrlError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let url_str = if trimmed.contains("://") { trimmed.to_string() } else { format!("https://{trimmed}") };

    let mut parsed = Url::parse(&url_str).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_string())),
    }

    if let Some(mut host) = parsed.host_str() {
        let h = host.to_lowercase();
        host = h.as_str();
        parsed
            .set_host(Some(host))
            .map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
    }

    parsed.set_fragment(None);

    if sort_query && parsed.query().is_some() {
        let mut pairs: Vec<(String, String)> = parsed
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        pairs.sort();
        if pairs.is_empty() {
            parsed.set_query(None);
        } else {
            let query = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(pairs)
                .finish();
            parsed.set_query(Some(&query));
        }
    }

    Ok(parsed)
}

/// Derives stable identity keys from requests.
///
/// Pure and deterministic: no clock, no per-process state.
#[derive(Debug, Clone)]
pub struct Fingerprinter {
    sort_query: bool,
    include_headers: Vec<String>,
}

impl Fingerprinter {
    pub fn new(sort_query: bool, include_headers: Vec<String>) -> Self {
        let include_headers = include_headers.into_iter().map(|h| h.to_ascii_lowercase()).collect();
        Self { sort_query, include_headers }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.sort_query, config.include_headers.clone())
    }

    /// Compute the fingerprint for a request.
    ///
    /// Hashes the method, the canonical URL, the body, and the configured
    /// header subset. For requests proxied through a rendering sub-system
    /// the nested target URL replaces the outer URL, so the same page keyed
    /// through different render endpoints still collapses to one snapshot.
    ///
    /// An unparseable URL falls back to its trimmed raw form; the key is
    /// still deterministic, it just loses normalization.
    pub fn fingerprint(&self, request: &Request) -> String {
        let target = request.render_url.as_deref().unwrap_or(&request.url);
        let canonical = match canonicalize(target, self.sort_query) {
            Ok(url) => url.to_string(),
            Err(_) => target.trim().to_string(),
        };

        let mut hasher = Sha256::new();
        hasher.update(request.method.as_bytes());
        hasher.update(b"\n");
        hasher.update(canonical.as_bytes());
        hasher.update(b"\n");
        hasher.update(&request.body);
        for name in &self.include_headers {
            if let Some(value) = request.header(name) {
                hasher.update(b"\n");
                hasher.update(name.as_bytes());
                hasher.update(b":");
                hasher.update(value);
            }
        }
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain() -> Fingerprinter {
        Fingerprinter::new(false, Vec::new())
    }

    #[test]
    fn test_canonicalize_lowercase_host() {
        let url = canonicalize("http://WWW.EXAMPLE.COM", false).unwrap();
        assert_eq!(url.host_str(), Some("www.example.com"));
    }

    #[test]
    fn test_canonicalize_remove_fragment() {
        let url = canonicalize("http://example.com/page#section", false).unwrap();
        assert_eq!(url.fragment(), None);
    }

    #[test]
    fn test_canonicalize_sort_query() {
        let url = canonicalize("http://example.com/?b=2&a=1", true).unwrap();
        assert_eq!(url.query(), Some("a=1&b=2"));
    }

    #[test]
    fn test_canonicalize_preserves_query_order_by_default() {
        let url = canonicalize("http://example.com/?b=2&a=1", false).unwrap();
        assert_eq!(url.query(), Some("b=2&a=1"));
    }

    #[test]
    fn test_fingerprint_stable() {
        let request = Request::get("http://www.example.com");
        assert_eq!(plain().fingerprint(&request), plain().fingerprint(&request));
    }

    #[test]
    fn test_fingerprint_ignores_url_noise() {
        let a = plain().fingerprint(&Request::get("http://www.example.com"));
        let b = plain().fingerprint(&Request::get("http://WWW.EXAMPLE.COM/"));
        assert_eq!(a, b);
    }

    #[test]
    fn test_fingerprint_query_order_with_sort() {
        let fp = Fingerprinter::new(true, Vec::new());
        let a = fp.fingerprint(&Request::get("http://example.com/?a=1&b=2"));
        let b = fp.fingerprint(&Request::get("http://example.com/?b=2&a=1"));
        assert_eq!(a, b);
    }

    #[test]
    fn test_fingerprint_different_urls_differ() {
        let a = plain().fingerprint(&Request::get("http://example.com/one"));
        let b = plain().fingerprint(&Request::get("http://example.com/two"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_fingerprint_method_matters() {
        let get = Request::get("http://example.com");
        let mut post = Request::get("http://example.com");
        post.method = "POST".to_string();
        assert_ne!(plain().fingerprint(&get), plain().fingerprint(&post));
    }

    #[test]
    fn test_fingerprint_header_subset() {
        let fp = Fingerprinter::new(false, vec!["Accept".to_string()]);
        let mut a = Request::get("http://example.com");
        a.headers.push(("Accept".to_string(), b"text/html".to_vec()));
        let mut b = Request::get("http://example.com");
        b.headers.push(("Accept".to_string(), b"application/json".to_vec()));
        assert_ne!(fp.fingerprint(&a), fp.fingerprint(&b));

        // headers outside the subset never contribute
        let mut c = Request::get("http://example.com");
        c.headers.push(("Cookie".to_string(), b"session=1".to_vec()));
        assert_eq!(fp.fingerprint(&Request::get("http://example.com")), fp.fingerprint(&c));
    }

    #[test]
    fn test_fingerprint_render_target() {
        let mut proxied = Request::get("http://render.local/render.html?url=http%3A%2F%2Fexample.com");
        proxied.render_url = Some("http://example.com".to_string());
        let direct = Request::get("http://example.com");
        assert_eq!(plain().fingerprint(&proxied), plain().fingerprint(&direct));
    }

    #[test]
    fn test_fingerprint_hex_shape() {
        let fp = plain().fingerprint(&Request::get("http://example.com"));
        assert_eq!(fp.len(), 64);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
