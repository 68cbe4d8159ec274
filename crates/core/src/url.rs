//! Download URL composition with SAS credentials, and masking for logs.
//!
//! The full URL is only ever handed to the transport. Everything that ends up
//! in a log line or an error message goes through [`mask`].

use reqwest::Url;
use std::fmt;

/// Replaces every query value in masked URLs.
pub const REDACTED: &str = "***";
/// Emitted when nothing safe can be salvaged from a malformed URL.
pub const REDACTED_URL: &str = "URL(redacted)";

/// A SAS query fragment. Formatting never reveals its contents.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Normalizes the raw value: surrounding whitespace and a leading `?` are
    /// dropped. Returns `None` if nothing is left.
    pub fn new(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        let trimmed = trimmed.strip_prefix('?').unwrap_or(trimmed);
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential({})", REDACTED)
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

/// The authenticated URL and its log-safe twin.
#[derive(Clone, PartialEq, Eq)]
pub struct ComposedUrl {
    pub full: String,
    pub masked: String,
}

impl fmt::Debug for ComposedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComposedUrl")
            .field("masked", &self.masked)
            .finish_non_exhaustive()
    }
}

/// Append `credential` to the query of `base_url`.
pub fn compose(base_url: &str, credential: Option<&Credential>) -> ComposedUrl {
    let full = match credential {
        None => base_url.to_string(),
        Some(credential) => append_query(base_url, credential.expose()),
    };
    let masked = mask(&full);
    ComposedUrl { full, masked }
}

fn append_query(base_url: &str, fragment: &str) -> String {
    match Url::parse(base_url) {
        Ok(mut url) => {
            let query = match url.query() {
                Some(existing) if !existing.is_empty() => format!("{}&{}", existing, fragment),
                _ => fragment.to_string(),
            };
            url.set_query(Some(&query));
            url.into()
        }
        Err(_) => {
            let separator = match base_url.split_once('?') {
                Some((_, query)) if !query.is_empty() => "&",
                Some(_) => "",
                None => "?",
            };
            format!("{}{}{}", base_url, separator, fragment)
        }
    }
}

/// Redact every query value (and any userinfo password) of `url`.
///
/// A parameter without `=` is a bare token and is replaced whole. If the URL
/// does not parse, the query and fragment are dropped instead.
pub fn mask(url: &str) -> String {
    let mut parsed = match Url::parse(url) {
        Ok(parsed) => parsed,
        Err(_) => return strip_query(url),
    };

    let mut changed = false;
    if parsed.password().is_some() && parsed.set_password(Some(REDACTED)).is_ok() {
        changed = true;
    }
    if let Some(query) = parsed.query() {
        let masked = mask_query(query);
        parsed.set_query(Some(&masked));
        changed = true;
    }

    if changed {
        parsed.into()
    } else {
        url.to_string()
    }
}

fn mask_query(query: &str) -> String {
    query
        .split('&')
        .filter(|param| !param.is_empty())
        .map(|param| match param.split_once('=') {
            Some((key, _)) => format!("{}={}", key, REDACTED),
            None => REDACTED.to_string(),
        })
        .collect::<Vec<_>>()
        .join("&")
}

fn strip_query(url: &str) -> String {
    let head = url.split(['?', '#']).next().unwrap_or_default().trim();
    if head.is_empty() {
        REDACTED_URL.to_string()
    } else {
        head.to_string()
    }
}
