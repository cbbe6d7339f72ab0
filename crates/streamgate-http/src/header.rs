use http::{HeaderName, HeaderValue};

use crate::HttpError;

/// An HTTP header as a name-value pair. Names are stored lowercased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into().to_ascii_lowercase(),
            value: value.into(),
        }
    }

    /// Check that the name is a valid HTTP token and the value is
    /// transmittable.
    pub fn validate(&self) -> Result<(), HttpError> {
        HeaderName::from_bytes(self.name.as_bytes())
            .map_err(|_| HttpError::InvalidHeaderName(self.name.clone()))?;
        HeaderValue::from_str(&self.value)
            .map_err(|_| HttpError::InvalidHeaderValue(self.name.clone()))?;
        Ok(())
    }
}

/// A case-insensitive header mapping with last-value-wins semantics.
///
/// Unlike a raw header list, assigning `Content-Type` and then
/// `content-type` leaves exactly one entry holding the second value. The
/// position of the first insert is kept, so iteration order is stable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    entries: Vec<Header>,
}

impl HeaderMap {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Set `name` to `value`, replacing every existing value for `name`.
    ///
    /// Returns the previous value, if there was one.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let header = Header::new(name, value);
        let Some(idx) = self.entries.iter().position(|h| h.name == header.name) else {
            self.entries.push(header);
            return None;
        };
        let previous = std::mem::replace(&mut self.entries[idx].value, header.value);
        let mut i = 0;
        self.entries.retain(|h| {
            let keep = i <= idx || h.name != header.name;
            i += 1;
            keep
        });
        Some(previous)
    }

    /// Add another value for `name`, keeping the existing ones. Only
    /// headers that may legally repeat, such as `set-cookie`, should be
    /// appended.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push(Header::new(name, value));
    }

    /// Get the value for `name` (case-insensitive).
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// Every value for `name`, in insertion order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Remove every value for `name`, returning the first.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        let idx = self
            .entries
            .iter()
            .position(|h| h.name.eq_ignore_ascii_case(name))?;
        let first = self.entries.remove(idx).value;
        self.entries.retain(|h| !h.name.eq_ignore_ascii_case(name));
        Some(first)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Header> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_vec(self) -> Vec<Header> {
        self.entries
    }

    /// Convert into an `http::HeaderMap`, validating every name and value.
    pub fn to_http(&self) -> Result<http::HeaderMap, HttpError> {
        let mut map = http::HeaderMap::with_capacity(self.entries.len());
        for header in &self.entries {
            let name = HeaderName::from_bytes(header.name.as_bytes())
                .map_err(|_| HttpError::InvalidHeaderName(header.name.clone()))?;
            let value = HeaderValue::from_str(&header.value)
                .map_err(|_| HttpError::InvalidHeaderValue(header.name.clone()))?;
            map.append(name, value);
        }
        Ok(map)
    }

    /// Build from an `http::HeaderMap`. Repeated names keep the last value
    /// and values that are not visible ASCII are skipped.
    pub fn from_http(headers: &http::HeaderMap) -> Self {
        let mut map = Self::new();
        for (name, value) in headers {
            if let Ok(value) = value.to_str() {
                map.insert(name.as_str(), value);
            }
        }
        map
    }
}

impl FromIterator<Header> for HeaderMap {
    fn from_iter<I: IntoIterator<Item = Header>>(iter: I) -> Self {
        let mut map = Self::new();
        for h in iter {
            map.insert(h.name, h.value);
        }
        map
    }
}

impl FromIterator<(String, String)> for HeaderMap {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        iter.into_iter().map(|(n, v)| Header::new(n, v)).collect()
    }
}
