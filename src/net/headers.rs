//! Case-insensitive header maps and the header-block codec.
//!
//! [`Headers`] is the header representation shared by the request and response
//! models. Lookups ignore case, but the map remembers the spelling a header name
//! had the **first** time it was set. Every later set of the same name (in any
//! case) is stored under that first-seen spelling, and setting a name that is
//! already present appends the new value with `", "`.
//!
//! The block codec converts between a map and the raw `name: value` lines that
//! `getAllResponseHeaders()` style APIs produce:
//!
//! - [`to_block`] lower-cases names and joins lines with CRLF.
//! - [`from_block`] / [`parse_into`] lower-case names and keep the **first** value
//!   when a name shows up more than once. Lines without a colon or without a
//!   value are ignored.
//!
use crate::errors::InterceptError;
use http::header::{HeaderName, HeaderValue};
use http::HeaderMap;
use std::collections::BTreeMap;

const CRLF: &str = "\r\n";

#[derive(Debug, Clone, PartialEq, Eq)]
struct HeaderEntry {
    /// Spelling of the name when it was first set
    name: String,
    value: String,
}

/// Case-insensitive header map that keeps the first-seen spelling of every name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    /// Keyed by the lower-cased header name
    entries: BTreeMap<String, HeaderEntry>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a header, appending to an existing value with `", "`.
    pub fn append(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.entries.get_mut(&name.to_ascii_lowercase()) {
            Some(entry) => {
                entry.value = format!("{}, {}", entry.value, value);
            }
            None => {
                self.entries.insert(
                    name.to_ascii_lowercase(),
                    HeaderEntry {
                        name: name.to_string(),
                        value,
                    },
                );
            }
        }
    }

    /// Replaces the value of a header, returning the previous one. A name that is
    /// already present keeps its first-seen spelling.
    pub fn insert(&mut self, name: &str, value: impl Into<String>) -> Option<String> {
        let value = value.into();
        match self.entries.get_mut(&name.to_ascii_lowercase()) {
            Some(entry) => Some(std::mem::replace(&mut entry.value, value)),
            None => {
                self.entries.insert(
                    name.to_ascii_lowercase(),
                    HeaderEntry {
                        name: name.to_string(),
                        value,
                    },
                );
                None
            }
        }
    }

    /// Sets a header only when no value exists yet. Returns true when the value was stored.
    pub fn insert_if_absent(&mut self, name: &str, value: impl Into<String>) -> bool {
        if self.contains(name) {
            return false;
        }
        self.insert(name, value);
        true
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .get(&name.to_ascii_lowercase())
            .map(|e| e.value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&name.to_ascii_lowercase())
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.entries
            .remove(&name.to_ascii_lowercase())
            .map(|e| e.value)
    }

    /// Returns the spelling under which `name` is stored, if present.
    pub fn canonical_name(&self, name: &str) -> Option<&str> {
        self.entries
            .get(&name.to_ascii_lowercase())
            .map(|e| e.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Iterates `(name, value)` pairs using the stored spelling of each name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .values()
            .map(|e| (e.name.as_str(), e.value.as_str()))
    }

    /// Copies headers from `other` that are not present yet.
    pub fn extend_missing(&mut self, other: &Headers) {
        for (name, value) in other.iter() {
            self.insert_if_absent(name, value);
        }
    }

    /// Copies all headers from `other`, replacing existing values.
    pub fn merge(&mut self, other: &Headers) {
        for (name, value) in other.iter() {
            self.insert(name, value);
        }
    }

    /// Converts into an [`http::HeaderMap`] for the transport.
    pub fn to_header_map(&self) -> Result<HeaderMap, InterceptError> {
        let mut map = HeaderMap::with_capacity(self.len());
        for (name, value) in self.iter() {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| InterceptError::InvalidHeader(format!("{}: {}", name, e)))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|e| InterceptError::InvalidHeader(format!("{}: {}", name, e)))?;
            map.append(header_name, header_value);
        }
        Ok(map)
    }

    /// Builds a map from an [`http::HeaderMap`]. Repeated headers are joined with `", "`,
    /// values that are not valid visible ASCII are skipped.
    pub fn from_header_map(map: &HeaderMap) -> Self {
        let mut headers = Headers::new();
        for (name, value) in map.iter() {
            if let Ok(value) = value.to_str() {
                headers.append(name.as_str(), value);
            }
        }
        headers
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            headers.append(name.as_ref(), value);
        }
        headers
    }
}

/// Serializes a header map to a CRLF separated header block with lower-cased names.
pub fn to_block(headers: &Headers) -> String {
    headers
        .iter()
        .map(|(name, value)| format!("{}: {}", name.to_ascii_lowercase(), value))
        .collect::<Vec<_>>()
        .join(CRLF)
}

/// Parses a header block into a new map.
pub fn from_block(block: &str) -> Headers {
    let mut headers = Headers::new();
    parse_into(block, &mut headers);
    headers
}

/// Parses a header block into `dest`. Names already present in `dest` are left untouched.
pub fn parse_into(block: &str, dest: &mut Headers) {
    for line in block.split(CRLF) {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim_start();
        if name.is_empty() || value.is_empty() {
            continue;
        }
        dest.insert_if_absent(&name.to_ascii_lowercase(), value);
    }
}

/// The header-block codec on its own.
pub mod convert {
    pub use super::{from_block, parse_into, to_block};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_seen_spelling_wins_and_values_accumulate() {
        let mut h = Headers::new();
        h.append("X-Custom", "a");
        h.append("x-custom", "b");
        h.append("X-CUSTOM", "c");

        assert_eq!(h.len(), 1);
        assert_eq!(h.canonical_name("x-CuStOm"), Some("X-Custom"));
        assert_eq!(h.get("X-CUSTOM"), Some("a, b, c"));
    }

    #[test]
    fn insert_replaces_but_keeps_spelling() {
        let mut h = Headers::new();
        h.insert("Content-Type", "text/plain");
        let old = h.insert("content-type", "application/json");

        assert_eq!(old.as_deref(), Some("text/plain"));
        assert_eq!(h.canonical_name("CONTENT-TYPE"), Some("Content-Type"));
        assert_eq!(h.get("content-type"), Some("application/json"));
    }

    #[test]
    fn extend_missing_does_not_overwrite() {
        let mut h: Headers = [("x-hooked", "1")].into_iter().collect();
        let other: Headers = [("X-Hooked", "transport"), ("Server", "gosub")]
            .into_iter()
            .collect();

        h.extend_missing(&other);
        assert_eq!(h.get("x-hooked"), Some("1"));
        assert_eq!(h.get("server"), Some("gosub"));
    }

    #[test]
    fn block_round_trip() {
        let mut h = Headers::new();
        h.append("Content-Type", "text/html");
        h.append("X-Trace", "abc");
        h.append("x-trace", "def");

        let block = to_block(&h);
        assert!(block.contains("content-type: text/html"));
        assert!(block.contains("x-trace: abc, def"));
        assert!(block.contains(CRLF));

        let parsed = from_block(&block);
        assert_eq!(parsed.len(), 2);
        for (name, value) in h.iter() {
            assert_eq!(parsed.get(name), Some(value));
        }
    }

    #[test]
    fn parse_keeps_first_value_and_skips_garbage() {
        let block = "Server: one\r\nserver: two\r\nno-colon-here\r\nEmpty:\r\nX-A:   spaced";
        let h = from_block(block);

        assert_eq!(h.get("server"), Some("one"));
        assert!(!h.contains("empty"));
        assert!(!h.contains("no-colon-here"));
        assert_eq!(h.get("x-a"), Some("spaced"));
        assert_eq!(h.canonical_name("SERVER"), Some("server"));
    }

    #[test]
    fn parse_into_respects_existing_entries() {
        let mut dest: Headers = [("x-hooked", "1")].into_iter().collect();
        parse_into("x-hooked: 2\r\nx-other: 3", &mut dest);

        assert_eq!(dest.get("x-hooked"), Some("1"));
        assert_eq!(dest.get("x-other"), Some("3"));
    }

    #[test]
    fn header_map_conversion() {
        let h: Headers = [("Accept", "text/html"), ("X-Multi", "a"), ("x-multi", "b")]
            .into_iter()
            .collect();
        let map = h.to_header_map().unwrap();
        assert_eq!(map.get("accept").unwrap(), "text/html");
        assert_eq!(map.get("x-multi").unwrap(), "a, b");

        let back = Headers::from_header_map(&map);
        assert_eq!(back.get("ACCEPT"), Some("text/html"));
        assert_eq!(back.get("x-multi"), Some("a, b"));
    }

    #[test]
    fn invalid_header_name_is_reported() {
        let h: Headers = [("bad header", "x")].into_iter().collect();
        assert!(matches!(
            h.to_header_map(),
            Err(InterceptError::InvalidHeader(_))
        ));
    }
}
