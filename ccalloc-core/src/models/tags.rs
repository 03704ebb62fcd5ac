//! Tag sets attached to cost items and declarations.
//!
//! Tags are stored lower-cased and trimmed, in insertion order. Lookups
//! used by the resolver go through the exact (lower-cased) key, while tag
//! selectors compare keys in their normalized form (see [`normalize_tag_key`]).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::CoreError;

/// Normalizes a tag key for selector comparison.
///
/// Lower-cases the key and replaces every character outside `[a-z0-9_]`
/// with `_`, so `cost-center` and `Cost_Center` compare equal.
pub fn normalize_tag_key(key: &str) -> String {
    key.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' { c } else { '_' })
        .collect()
}

// ============================================================================
// Tag Set
// ============================================================================

/// An ordered set of tag key/value pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "IndexMap<String, String>", into = "IndexMap<String, String>")]
pub struct TagSet {
    tags: IndexMap<String, String>,
    /// Normalized key to the index of the first tag carrying it.
    normalized: IndexMap<String, usize>,
}

impl TagSet {
    /// Creates an empty tag set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a tag; key and value are trimmed and lower-cased.
    ///
    /// Re-inserting an existing key replaces its value but keeps its position.
    pub fn insert(&mut self, key: &str, value: &str) {
        let key = key.trim().to_lowercase();
        if key.is_empty() {
            return;
        }
        let normalized = normalize_tag_key(&key);
        let (index, _) = self.tags.insert_full(key, value.trim().to_lowercase());
        self.normalized.entry(normalized).or_insert(index);
    }

    /// Returns the value of a tag by its lower-cased key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.tags.get(&key.trim().to_lowercase()).map(String::as_str)
    }

    /// Returns the value of the first tag whose normalized key equals `normalized_key`.
    pub fn get_normalized(&self, normalized_key: &str) -> Option<&str> {
        let &index = self.normalized.get(normalized_key)?;
        self.tags.get_index(index).map(|(_, v)| v.as_str())
    }

    /// Resolves the first key of `candidates` present in the set.
    ///
    /// Returns the matched key together with its value.
    pub fn resolve<'a>(&'a self, candidates: &'a [String]) -> Option<(&'a str, &'a str)> {
        candidates
            .iter()
            .find_map(|key| self.get(key).map(|value| (key.as_str(), value)))
    }

    /// Returns true if the set has no tags.
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Returns the number of tags.
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// Iterates over the tags in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.tags.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Parses a JSON object of tags.
    ///
    /// String values are taken as is, `null` becomes an empty value and
    /// other values are kept in their JSON form.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Serialization`] if the text is not a JSON object.
    pub fn from_json(text: &str) -> Result<Self, CoreError> {
        let object: IndexMap<String, serde_json::Value> = serde_json::from_str(text)?;
        let mut tags = Self::new();
        for (key, value) in &object {
            match value {
                serde_json::Value::String(s) => tags.insert(key, s),
                serde_json::Value::Null => tags.insert(key, ""),
                other => tags.insert(key, &other.to_string()),
            }
        }
        Ok(tags)
    }

    /// Parses the serialized form `key:value,key:value,`.
    ///
    /// `\` escapes `:`, `,` and `\`. Fragments without a `:` separator are
    /// skipped with a warning.
    pub fn parse_serialized(text: &str) -> Self {
        let mut tags = Self::new();
        let mut key = String::new();
        let mut value = String::new();
        let mut in_value = false;
        let mut escaped = false;

        let mut flush = |key: &mut String, value: &mut String, in_value: &mut bool| {
            if *in_value {
                if key.trim().is_empty() {
                    warn!(fragment = %format!(":{value}"), "Unexpected tag format");
                } else {
                    tags.insert(key, value);
                }
            } else if !key.trim().is_empty() {
                warn!(fragment = %key, "Unexpected tag format");
            }
            key.clear();
            value.clear();
            *in_value = false;
        };

        for c in text.chars() {
            let target = if in_value { &mut value } else { &mut key };
            if escaped {
                target.push(c);
                escaped = false;
                continue;
            }
            match c {
                '\\' => escaped = true,
                ':' if !in_value => in_value = true,
                ',' => flush(&mut key, &mut value, &mut in_value),
                _ => target.push(c),
            }
        }
        flush(&mut key, &mut value, &mut in_value);

        tags
    }

    /// Serializes the set as `key:value,` pairs, escaping separators.
    pub fn to_serialized(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.tags {
            out.push_str(&escape(key));
            out.push(':');
            out.push_str(&escape(value));
            out.push(',');
        }
        out
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, ',' | ':' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

impl From<IndexMap<String, String>> for TagSet {
    fn from(tags: IndexMap<String, String>) -> Self {
        tags.iter().collect()
    }
}

impl From<TagSet> for IndexMap<String, String> {
    fn from(tags: TagSet) -> Self {
        tags.tags
    }
}

impl<K: AsRef<str>, V: AsRef<str>> FromIterator<(K, V)> for TagSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut tags = Self::new();
        for (k, v) in iter {
            tags.insert(k.as_ref(), v.as_ref());
        }
        tags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_normalizes_case() {
        let mut tags = TagSet::new();
        tags.insert(" Service ", " Storage ");
        assert_eq!(tags.get("service"), Some("storage"));
        assert_eq!(tags.get("SERVICE"), Some("storage"));
    }

    #[test]
    fn test_normalized_key_lookup() {
        let tags: TagSet = [("cost-center", "42")].into_iter().collect();
        assert_eq!(tags.get_normalized("cost_center"), Some("42"));
        assert_eq!(normalize_tag_key("Cost.Center"), "cost_center");
    }

    #[test]
    fn test_first_tag_wins_for_normalized_key() {
        let tags: TagSet = [("cost-center", "a"), ("cost_center", "b")].into_iter().collect();
        assert_eq!(tags.get_normalized("cost_center"), Some("a"));
        assert_eq!(tags.get("cost_center"), Some("b"));
    }

    #[test]
    fn test_from_json() {
        let tags = TagSet::from_json(r#"{"Service": "Web", "replicas": 3, "owner": null}"#).unwrap();
        assert_eq!(tags.get("service"), Some("web"));
        assert_eq!(tags.get("replicas"), Some("3"));
        assert_eq!(tags.get("owner"), Some(""));

        let err = TagSet::from_json("[1, 2]").unwrap_err();
        assert!(matches!(err, CoreError::Serialization(_)));
    }

    #[test]
    fn test_serde_keeps_map_form() {
        let tags: TagSet = [("env", "prod")].into_iter().collect();
        let json = serde_json::to_string(&tags).unwrap();
        assert_eq!(json, r#"{"env":"prod"}"#);
        let parsed: TagSet = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, tags);
        assert_eq!(parsed.get_normalized("env"), Some("prod"));
    }

    #[test]
    fn test_resolve_first_match_wins() {
        let tags: TagSet = [("svc", "b"), ("service", "a")].into_iter().collect();
        let candidates = vec!["service".to_string(), "svc".to_string()];
        assert_eq!(tags.resolve(&candidates), Some(("service", "a")));
    }

    #[test]
    fn test_parse_serialized_with_escapes() {
        let tags = TagSet::parse_serialized(r"service:web,url:http\://x\,y,empty:,");
        assert_eq!(tags.get("service"), Some("web"));
        assert_eq!(tags.get("url"), Some("http://x,y"));
        assert_eq!(tags.get("empty"), Some(""));
        assert_eq!(tags.len(), 3);
    }

    #[test]
    fn test_parse_serialized_skips_bad_fragments() {
        let tags = TagSet::parse_serialized("novalue,team:core");
        assert_eq!(tags.len(), 1);
        assert_eq!(tags.get("team"), Some("core"));
    }

    #[test]
    fn test_serialized_form_escapes_separators() {
        let tags: TagSet = [("url", "http://x,y")].into_iter().collect();
        assert_eq!(tags.to_serialized(), r"url:http\://x\,y,");
        assert_eq!(TagSet::parse_serialized(&tags.to_serialized()), tags);
    }
}
