//! Tracking parameters carried in the query string of a tracking link.

use std::collections::BTreeMap;

use serde::ser::{Serialize, SerializeMap, Serializer};
use url::form_urlencoded;

use crate::error::ParseError;

/// Ordered multimap of parameter name to values.
///
/// Keys keep the order they were first added in, which is the order they are
/// displayed and serialized in. Equality and [`encode`](Self::encode) ignore
/// that order so the same mapping always yields the same query string.
#[derive(Debug, Clone, Default)]
pub struct TrackingParameters {
    entries: Vec<(String, Vec<String>)>,
}

impl TrackingParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value for `key`, creating the key if needed.
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, values)) => values.push(value),
            None => self.entries.push((key, vec![value])),
        }
    }

    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_slice())
    }

    /// First value for `key`, if any.
    pub fn first(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(|v| v.first()).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Merge all values of `other` after the existing ones.
    pub fn extend(&mut self, other: TrackingParameters) {
        for (key, values) in other.entries {
            for value in values {
                self.add(key.clone(), value);
            }
        }
    }

    /// Build parameters from command line tokens.
    ///
    /// A single argument is treated as an `&`-joined list. Each token is split
    /// on its first `=`; a token without one gets an empty value. Tokens are
    /// taken literally, with no percent decoding.
    pub fn from_args<S: AsRef<str>>(args: &[S]) -> Self {
        let tokens: Vec<&str> = match args {
            [single] => single.as_ref().split('&').collect(),
            _ => args.iter().map(AsRef::as_ref).collect(),
        };

        let mut params = Self::new();
        for token in tokens {
            let (key, value) = token.split_once('=').unwrap_or((token, ""));
            params.add(key, value);
        }
        params
    }

    /// Decode `application/x-www-form-urlencoded` data strictly.
    ///
    /// Malformed percent escapes are an error rather than being passed
    /// through, so a caller can tell that the input was not well formed.
    pub fn parse_query(input: &str) -> Result<Self, ParseError> {
        match Self::decode_form(input.as_bytes()) {
            (params, None) => Ok(params),
            (_, Some(e)) => Err(e),
        }
    }

    /// Decode form data pair by pair.
    ///
    /// A pair with a malformed percent escape is skipped; every other pair is
    /// kept. The first error, if any, is returned alongside. Bytes that are
    /// not valid UTF-8 are replaced rather than rejected.
    pub fn decode_form(input: &[u8]) -> (Self, Option<ParseError>) {
        let mut params = Self::new();
        let mut first_error = None;
        let mut offset = 0;

        for pair in input.split(|&b| b == b'&') {
            let start = offset;
            offset += pair.len() + 1;
            if pair.is_empty() {
                continue;
            }

            if let Err(e) = check_escapes(pair, start) {
                first_error.get_or_insert(e);
                continue;
            }
            for (key, value) in form_urlencoded::parse(pair) {
                params.add(key, value);
            }
        }

        (params, first_error)
    }

    /// Form-encode the parameters, keys sorted, values in insertion order.
    pub fn encode(&self) -> String {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (key, values) in self.sorted() {
            for value in values {
                serializer.append_pair(key, value);
            }
        }
        serializer.finish()
    }

    fn sorted(&self) -> BTreeMap<&str, &[String]> {
        self.iter().collect()
    }
}

impl PartialEq for TrackingParameters {
    fn eq(&self, other: &Self) -> bool {
        self.sorted() == other.sorted()
    }
}

impl Eq for TrackingParameters {}

impl Serialize for TrackingParameters {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, values) in &self.entries {
            map.serialize_entry(key, values)?;
        }
        map.end()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for TrackingParameters {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (k, v) in iter {
            params.add(k, v);
        }
        params
    }
}

/// Every `%` must be followed by two hex digits. `base` is the offset of
/// `bytes` within the whole input, used in the error.
fn check_escapes(bytes: &[u8], base: usize) -> Result<(), ParseError> {
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let valid = bytes
                .get(i + 1..i + 3)
                .map(|h| h.iter().all(u8::is_ascii_hexdigit))
                .unwrap_or(false);
            if !valid {
                return Err(ParseError::Escape(base + i));
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    Ok(())
}
