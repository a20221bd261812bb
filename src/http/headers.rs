//! Case-insensitive header container and header value validation.

use crate::error::{Error, Result};

pub const CONTENT_LENGTH: &str = "Content-Length";
pub const TRANSFER_ENCODING: &str = "Transfer-Encoding";
pub const CONTENT_TYPE: &str = "Content-Type";

/// An ordered set of headers.
///
/// Lookups and membership tests ignore ASCII case, while iteration yields
/// names with the casing of their most recent insert.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a header set from caller-supplied pairs, validating each one.
    pub fn try_from_pairs<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut headers = Self::new();
        for (name, value) in pairs {
            let (name, value) = (name.into(), value.into());
            check_header_validity(&name, &value)?;
            headers.insert(name, value);
        }
        Ok(headers)
    }

    /// Gets the value for `name`, ignoring case.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.position(name).map(|i| self.entries[i].1.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Sets `name` to `value`, replacing any entry that matches ignoring case.
    ///
    /// A replaced entry keeps its position but takes the new casing.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let (name, value) = (name.into(), value.into());
        match self.position(&name) {
            Some(i) => self.entries[i] = (name, value),
            None => self.entries.push((name, value)),
        }
    }

    /// Validates and inserts a header.
    pub fn try_insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> Result<()> {
        let (name, value) = (name.into(), value.into());
        check_header_validity(&name, &value)?;
        self.insert(name, value);
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.position(name).map(|i| self.entries.remove(i).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(k, _)| k.eq_ignore_ascii_case(name))
    }
}

impl<'a> IntoIterator for &'a Headers {
    type Item = (&'a str, &'a str);
    type IntoIter = Box<dyn Iterator<Item = (&'a str, &'a str)> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

/// Rejects header names and values that cannot be written to the wire.
///
/// A value may not start with whitespace, and every CR or LF must be part of
/// a line fold, i.e. immediately followed by a space or tab.
pub fn check_header_validity(name: &str, value: &str) -> Result<()> {
    if name.is_empty()
        || name
            .bytes()
            .any(|b| b == b':' || b.is_ascii_whitespace() || b.is_ascii_control())
    {
        return Err(Error::InvalidHeader(format!(
            "Invalid header name {name:?}"
        )));
    }

    let bytes = value.as_bytes();
    if matches!(bytes.first(), Some(b' ' | b'\t')) {
        return Err(invalid_value(name, value));
    }

    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\r' | b'\n' => {
                if bytes[i] == b'\r' && bytes.get(i + 1) == Some(&b'\n') {
                    i += 1;
                }
                if !matches!(bytes.get(i + 1), Some(b' ' | b'\t')) {
                    return Err(invalid_value(name, value));
                }
            }
            _ => {}
        }
        i += 1;
    }
    Ok(())
}

fn invalid_value(name: &str, value: &str) -> Error {
    Error::InvalidHeader(format!(
        "Invalid return character or leading space in header: {name} ({value:?})"
    ))
}
