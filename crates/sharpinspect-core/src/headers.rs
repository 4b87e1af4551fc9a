use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// An HTTP header collection that preserves first-seen name casing while
/// looking keys up case-insensitively, and comma-joins repeated values —
/// the wire shape spec §3 calls for on `requestHeaders`/`responseHeaders`.
///
/// `Set-Cookie` is the one header RFC 6265 forbids folding this way (a
/// cookie value can itself contain a comma, making a joined line
/// unparseable), so it's kept as distinct entries instead of merged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderBag(Vec<(String, String)>);

fn is_set_cookie(name: &str) -> bool {
    name.eq_ignore_ascii_case("Set-Cookie")
}

impl HeaderBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a header value, comma-joining onto an existing value for the
    /// same name (case-insensitive) while preserving the name's first-seen
    /// casing. `Set-Cookie` is never joined — each occurrence is kept as its
    /// own entry.
    pub fn append(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        if is_set_cookie(name) {
            self.0.push((name.to_string(), value));
            return;
        }
        if let Some((_, existing)) = self
            .0
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
        {
            existing.push_str(", ");
            existing.push_str(&value);
        } else {
            self.0.push((name.to_string(), value));
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Every value stored under `name` (case-insensitive), in insertion
    /// order. For most headers this yields at most one item; for
    /// `Set-Cookie` it yields one per occurrence.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> {
        self.0
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl Serialize for HeaderBag {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// Mirrors [`Serialize`]'s entry-per-pair shape exactly (including repeated
/// `Set-Cookie` keys) rather than deserializing through a `HashMap`, which
/// would silently drop all but the last value for a repeated key and break
/// the encode/decode/re-encode round trip.
impl<'de> Deserialize<'de> for HeaderBag {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct HeaderBagVisitor;

        impl<'de> Visitor<'de> for HeaderBagVisitor {
            type Value = HeaderBag;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of header name to header value")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((key, value)) = map.next_entry::<String, String>()? {
                    entries.push((key, value));
                }
                Ok(HeaderBag(entries))
            }
        }

        deserializer.deserialize_map(HeaderBagVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_first_seen_case_and_joins() {
        let mut h = HeaderBag::new();
        h.append("Accept", "text/html");
        h.append("accept", "application/json");
        assert_eq!(h.get("ACCEPT"), Some("text/html, application/json"));
        assert_eq!(h.iter().next().unwrap().0, "Accept");
    }

    #[test]
    fn set_cookie_is_never_joined() {
        let mut h = HeaderBag::new();
        h.append("Set-Cookie", "a=1");
        h.append("set-cookie", "b=2");
        assert_eq!(h.len(), 2);
        assert_eq!(
            h.get_all("SET-COOKIE").collect::<Vec<_>>(),
            vec!["a=1", "b=2"]
        );
        // `get` only ever surfaces the first occurrence for a multi-valued header.
        assert_eq!(h.get("Set-Cookie"), Some("a=1"));
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let mut h = HeaderBag::new();
        h.append("Content-Type", "application/json");
        assert_eq!(h.get("content-type"), Some("application/json"));
    }
}
