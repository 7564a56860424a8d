//! Case-insensitive header store and captured route parameters.

use crate::errors::Error;
use std::collections::HashMap;

/// Case-insensitive, single-valued header store.
///
/// Keys are lowercased on insertion and values are trimmed of leading and
/// trailing ASCII whitespace, so lookups never depend on how the peer
/// spelled a name. Repeated names are rejected rather than folded; the
/// caller decides whether first-wins is acceptable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Headers {
    map: HashMap<String, String>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a header, failing with [`Error::AlreadyExists`] if the name
    /// is already present.
    #[inline]
    pub fn add(&mut self, name: &str, value: &str) -> Result<(), Error> {
        let key = name.trim_ascii().to_ascii_lowercase();
        if self.map.contains_key(&key) {
            return Err(Error::AlreadyExists);
        }
        self.map.insert(key, value.trim_ascii().to_string());
        Ok(())
    }

    /// Inserts a header, replacing any existing value.
    #[inline]
    pub fn set(&mut self, name: &str, value: &str) {
        let key = name.trim_ascii().to_ascii_lowercase();
        self.map.insert(key, value.trim_ascii().to_string());
    }

    /// Returns the value for `name`, failing with [`Error::NotExist`] when
    /// the header is missing or its value is empty.
    #[inline]
    pub fn get(&self, name: &str) -> Result<&str, Error> {
        match self.map.get(&name.trim_ascii().to_ascii_lowercase()) {
            Some(value) if !value.is_empty() => Ok(value),
            _ => Err(Error::NotExist),
        }
    }

    /// Removes a header, returning its previous value.
    #[inline]
    pub fn delete(&mut self, name: &str) -> Option<String> {
        self.map.remove(&name.trim_ascii().to_ascii_lowercase())
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.map
            .contains_key(&name.trim_ascii().to_ascii_lowercase())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Route parameters captured by the matcher.
///
/// Populated once on a successful parameterized match, before the handler
/// runs; keys are the parameter names without the leading `:`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    map: HashMap<String, String>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_captures(captures: Vec<(String, String)>) -> Self {
        Self {
            map: captures.into_iter().collect(),
        }
    }

    #[inline]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.map.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
