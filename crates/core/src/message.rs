//! Attribute message model.
//!
//! A [`Message`] is an ordered list of `(key, value)` attributes. The first
//! entry is the kind tag (`Quote` / `Trade` / `Order` / ...) and carries no
//! value; the remaining entries are kept sorted by key so that lookups are
//! a binary search over the tail. The tag is never visible to attribute
//! lookup.

use std::str::FromStr;

/// One decoded wire or journal message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    attrs: Vec<(String, String)>,
}

impl Message {
    /// Build a message from raw decoded attributes.
    ///
    /// The first attribute is taken as the kind tag; the tail is sorted by
    /// key. An empty list produces a message with an empty kind.
    pub fn new(mut attrs: Vec<(String, String)>) -> Self {
        if attrs.is_empty() {
            attrs.push((String::new(), String::new()));
        } else {
            attrs[1..].sort_by(|a, b| a.0.cmp(&b.0));
        }
        Self { attrs }
    }

    /// Convenience constructor for a kind tag plus data attributes.
    pub fn build<'a>(kind: &str, attrs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut all = vec![(kind.to_string(), String::new())];
        all.extend(
            attrs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string())),
        );
        Self::new(all)
    }

    /// The message kind tag.
    pub fn kind(&self) -> &str {
        &self.attrs[0].0
    }

    /// Look up a data attribute by key. The kind tag is not searched.
    pub fn get(&self, key: &str) -> Option<&str> {
        let tail = &self.attrs[1..];
        tail.binary_search_by(|(k, _)| k.as_str().cmp(key))
            .ok()
            .map(|i| tail[i].1.as_str())
    }

    /// Parse an attribute into `T`, falling back to `T::default()` when the
    /// attribute is absent or fails to parse.
    pub fn parsed_or_default<T: FromStr + Default>(&self, key: &str) -> T {
        self.get(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or_default()
    }

    /// All attributes in message order, kind tag first.
    pub fn attrs(&self) -> &[(String, String)] {
        &self.attrs
    }

    /// Copy of this message with one attribute appended at the end.
    ///
    /// Used for the reject echo: the response preserves the request's
    /// attribute order and carries `reject=<reason>` as the last attribute.
    pub fn with_attr(&self, key: &str, value: impl Into<String>) -> Message {
        let mut attrs = self.attrs.clone();
        attrs.push((key.to_string(), value.into()));
        Self { attrs }
    }
}
