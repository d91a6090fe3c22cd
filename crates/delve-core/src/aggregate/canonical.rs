//! URL canonicalization and stable source ids.
//!
//! Two URLs with the same canonical string are the same source, whichever
//! query or provider surfaced them.

use sha2::{Digest, Sha256};
use url::{form_urlencoded, Url};

use crate::config::TRACKING_PARAMS;

/// Normalizes a URL into its identity form.
///
/// Lower-cases scheme and host, drops default ports, userinfo and the
/// fragment, removes tracking parameters, sorts the remaining query
/// parameters and collapses the trailing slash. Unparseable input is
/// trimmed and lower-cased so it still has a stable key.
pub fn canonicalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let Ok(url) = Url::parse(trimmed) else {
        return trimmed.trim_end_matches('/').to_lowercase();
    };

    let Some(host) = url.host_str() else {
        // mailto:, data: and friends have no authority to normalize
        let mut url = url;
        url.set_fragment(None);
        return url.to_string();
    };

    let mut canonical = format!("{}://{}", url.scheme(), host.to_lowercase());

    // `Url` already reports `None` for the scheme's default port
    if let Some(port) = url.port() {
        canonical.push_str(&format!(":{port}"));
    }

    let path = url.path().trim_end_matches('/');
    canonical.push_str(path);

    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    if !params.is_empty() {
        params.sort();
        let query = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params.iter())
            .finish();
        canonical.push('?');
        canonical.push_str(&query);
    }

    canonical
}

fn is_tracking_param(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key.as_str())
}

/// Stable id for a source: the first 16 hex chars of SHA-256(canonical URL).
pub fn source_id(canonical_url: &str) -> String {
    let digest = Sha256::digest(canonical_url.as_bytes());
    hex::encode(&digest[..8])
}

/// Host of a URL without a leading `www.`, lower-cased.
pub fn domain_of(raw: &str) -> Option<String> {
    let url = Url::parse(raw.trim()).ok()?;
    let host = url.host_str()?.to_lowercase();
    Some(host.strip_prefix("www.").map(str::to_string).unwrap_or(host))
}
