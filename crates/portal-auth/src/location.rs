//! Host location seam and URL fragment codec
//!
//! OAuth callback data arrives through the visible URL (hash fragment or
//! query string) and must be scrubbed from it once consumed. The `Location`
//! trait is the seam the host implements — a webview bridge, a deep-link
//! handler, or `MemoryLocation` for native hosts and tests.

use std::collections::HashMap;
use std::sync::Mutex;

/// The host surface the auth service reads and navigates.
///
/// `hash` and `query` are returned without their `#`/`?` prefixes.
/// `replace` rewrites the visible URL without navigating; `assign`
/// navigates (after which the hosting page is expected to unload).
pub trait Location: Send + Sync {
    /// Full current URL.
    fn href(&self) -> String;

    /// Scheme + host, e.g. `https://portal.example.com`.
    fn origin(&self) -> String;

    fn hash(&self) -> String;

    fn query(&self) -> String;

    fn replace(&self, hash: &str, query: &str);

    fn assign(&self, url: &str);
}

/// Parse auth parameters from the location's hash and query.
///
/// The hash may itself embed a query (`#access_token=...?foo=bar`); query
/// pairs win over hash pairs on key collision. Pairs without a value are
/// dropped. Keys and values are percent-decoded.
pub fn parse_fragments(location: &dyn Location) -> HashMap<String, String> {
    let hash = location.hash();
    let mut query = location.query();

    let mut map = HashMap::new();
    if !hash.is_empty() {
        match hash.split_once('?') {
            Some((front, back)) => {
                map.extend(parse_pairs(front));
                if query.is_empty() {
                    query = back.to_string();
                }
            }
            None => map.extend(parse_pairs(&hash)),
        }
    }
    if !query.is_empty() {
        map.extend(parse_pairs(&query));
    }
    map
}

/// Convert a `key=value&...` string to a map, dropping valueless pairs.
pub fn parse_pairs(s: &str) -> HashMap<String, String> {
    s.split('&')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            if value.is_empty() {
                return None;
            }
            Some((
                urlencoding::decode(key).ok()?.into_owned(),
                urlencoding::decode(value).ok()?.into_owned(),
            ))
        })
        .collect()
}

/// Scrub one parameter from the visible URL (both hash and query) without
/// navigating. Used to remove sensitive callback values once persisted.
pub fn remove_fragment(location: &dyn Location, name: &str) {
    let hash = location.hash();
    let new_hash = match hash.split_once('?') {
        Some((front, back)) => {
            let front = strip_pair(front, name);
            let back = strip_pair(back, name);
            if back.is_empty() {
                front
            } else {
                format!("{front}?{back}")
            }
        }
        None => strip_pair(&hash, name),
    };
    let new_query = strip_pair(&location.query(), name);
    location.replace(&new_hash, &new_query);
}

fn strip_pair(s: &str, name: &str) -> String {
    s.split('&')
        .filter(|pair| {
            let key = pair.split('=').next().unwrap_or(pair);
            !key.is_empty() && key != name
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// In-memory location for native hosts and tests.
///
/// Records navigations instead of performing them, so a host (or test) can
/// observe where the service wanted to go.
pub struct MemoryLocation {
    origin: String,
    path: String,
    hash: Mutex<String>,
    query: Mutex<String>,
    assigned: Mutex<Vec<String>>,
}

impl MemoryLocation {
    pub fn new(origin: &str, path: &str) -> Self {
        Self {
            origin: origin.trim_end_matches('/').to_string(),
            path: path.to_string(),
            hash: Mutex::new(String::new()),
            query: Mutex::new(String::new()),
            assigned: Mutex::new(Vec::new()),
        }
    }

    pub fn set_hash(&self, hash: &str) {
        *self.hash.lock().unwrap_or_else(|e| e.into_inner()) =
            hash.trim_start_matches('#').to_string();
    }

    pub fn set_query(&self, query: &str) {
        *self.query.lock().unwrap_or_else(|e| e.into_inner()) =
            query.trim_start_matches('?').to_string();
    }

    /// URLs passed to `assign`, oldest first.
    pub fn assigned(&self) -> Vec<String> {
        self.assigned
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn last_assigned(&self) -> Option<String> {
        self.assigned
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last()
            .cloned()
    }
}

impl Location for MemoryLocation {
    fn href(&self) -> String {
        let query = self.query();
        let hash = self.hash();
        let mut href = format!("{}{}", self.origin, self.path);
        if !query.is_empty() {
            href.push('?');
            href.push_str(&query);
        }
        if !hash.is_empty() {
            href.push('#');
            href.push_str(&hash);
        }
        href
    }

    fn origin(&self) -> String {
        self.origin.clone()
    }

    fn hash(&self) -> String {
        self.hash.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn query(&self) -> String {
        self.query.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn replace(&self, hash: &str, query: &str) {
        *self.hash.lock().unwrap_or_else(|e| e.into_inner()) = hash.to_string();
        *self.query.lock().unwrap_or_else(|e| e.into_inner()) = query.to_string();
    }

    fn assign(&self, url: &str) {
        self.assigned
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(url.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hash_fragments() {
        let location = MemoryLocation::new("http://localhost:4200", "/app");
        location.set_hash("access_token=abc&expires_in=60");
        let fragments = parse_fragments(&location);
        assert_eq!(fragments["access_token"], "abc");
        assert_eq!(fragments["expires_in"], "60");
    }

    #[test]
    fn query_wins_over_hash_on_collision() {
        let location = MemoryLocation::new("http://localhost:4200", "/app");
        location.set_hash("code=from_hash");
        location.set_query("code=from_query");
        let fragments = parse_fragments(&location);
        assert_eq!(fragments["code"], "from_query");
    }

    #[test]
    fn hash_may_embed_a_query() {
        let location = MemoryLocation::new("http://localhost:4200", "/app");
        location.set_hash("access_token=abc?state=NONCE");
        let fragments = parse_fragments(&location);
        assert_eq!(fragments["access_token"], "abc");
        assert_eq!(fragments["state"], "NONCE");
    }

    #[test]
    fn valueless_pairs_are_dropped() {
        let pairs = parse_pairs("code=&flag&token=abc");
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs["token"], "abc");
    }

    #[test]
    fn pairs_are_percent_decoded() {
        let pairs = parse_pairs("state=NONCE%3BuserX&uri=%2Fcb");
        assert_eq!(pairs["state"], "NONCE;userX");
        assert_eq!(pairs["uri"], "/cb");
    }

    #[test]
    fn remove_fragment_scrubs_hash_and_query() {
        let location = MemoryLocation::new("http://localhost:4200", "/app");
        location.set_hash("access_token=abc&state=N");
        location.set_query("code=xyz&keep=1");

        remove_fragment(&location, "access_token");
        remove_fragment(&location, "code");

        assert_eq!(location.hash(), "state=N");
        assert_eq!(location.query(), "keep=1");
    }

    #[test]
    fn remove_fragment_handles_embedded_query() {
        let location = MemoryLocation::new("http://localhost:4200", "/app");
        location.set_hash("access_token=abc?state=N&other=1");

        remove_fragment(&location, "state");
        assert_eq!(location.hash(), "access_token=abc?other=1");

        remove_fragment(&location, "other");
        assert_eq!(location.hash(), "access_token=abc");
    }

    #[test]
    fn href_combines_parts() {
        let location = MemoryLocation::new("http://localhost:4200", "/app");
        assert_eq!(location.href(), "http://localhost:4200/app");

        location.set_query("a=1");
        location.set_hash("b=2");
        assert_eq!(location.href(), "http://localhost:4200/app?a=1#b=2");
    }

    #[test]
    fn assign_records_navigations() {
        let location = MemoryLocation::new("http://localhost:4200", "/app");
        location.assign("/login");
        location.assign("/logout");
        assert_eq!(location.assigned(), vec!["/login", "/logout"]);
        assert_eq!(location.last_assigned().as_deref(), Some("/logout"));
    }
}
