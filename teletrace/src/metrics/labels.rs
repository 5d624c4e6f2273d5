//! Metric labels.
//!
//! Labels are string/string pairs attached to recorded measurements. A
//! [`LabelSet`] is canonicalized at construction so that equal sets compare
//! and hash equal regardless of the order the caller supplied them in,
//! making them usable as aggregator-map keys.
use fnv::FnvHasher;
use std::hash::{Hash, Hasher};

/// An immutable, deduplicated, sorted set of string labels.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LabelSet {
    labels: Vec<(String, String)>,
    encoded_hash: u64,
}

impl LabelSet {
    /// The empty label set.
    pub fn empty() -> Self {
        LabelSet::default()
    }

    /// Construct a label set from key/value pairs.
    ///
    /// Pairs are sorted by key and deduplicated, the last value for any
    /// repeated key wins.
    pub fn from_labels<I, K, V>(labels: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut labels: Vec<(String, String)> = labels
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        // Sort by key, stable so later duplicates stay last, then dedup
        // keeping the last value seen for each key.
        labels.sort_by(|a, b| a.0.cmp(&b.0));
        let mut deduped: Vec<(String, String)> = Vec::with_capacity(labels.len());
        for label in labels {
            match deduped.last_mut() {
                Some(last) if last.0 == label.0 => *last = label,
                _ => deduped.push(label),
            }
        }

        let mut hasher = FnvHasher::default();
        for (key, value) in deduped.iter() {
            key.hash(&mut hasher);
            value.hash(&mut hasher);
        }

        LabelSet {
            labels: deduped,
            encoded_hash: hasher.finish(),
        }
    }

    /// The number of labels in the set.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Returns `true` if the set holds no labels.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// The value for a label key, if present.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.labels
            .binary_search_by(|(k, _)| k.as_str().cmp(key))
            .ok()
            .map(|idx| self.labels[idx].1.as_str())
    }

    /// An iterator over the labels in canonical (key-sorted) order.
    pub fn iter(&self) -> std::slice::Iter<'_, (String, String)> {
        self.labels.iter()
    }

    /// The pre-computed hash of this label set.
    pub fn encoded_hash(&self) -> u64 {
        self.encoded_hash
    }

    /// Renders the canonical `k1=v1,k2=v2` encoding of this set.
    pub fn encoded(&self) -> String {
        let mut out = String::new();
        for (i, (key, value)) in self.labels.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            out.push_str(key);
            out.push('=');
            out.push_str(value);
        }
        out
    }
}

impl Hash for LabelSet {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.encoded_hash)
    }
}

impl<'a> IntoIterator for &'a LabelSet {
    type Item = &'a (String, String);
    type IntoIter = std::slice::Iter<'a, (String, String)>;

    fn into_iter(self) -> Self::IntoIter {
        self.labels.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_order() {
        let a = LabelSet::from_labels([("b", "2"), ("a", "1")]);
        let b = LabelSet::from_labels([("a", "1"), ("b", "2")]);
        assert_eq!(a, b);
        assert_eq!(a.encoded_hash(), b.encoded_hash());
        assert_eq!(a.encoded(), "a=1,b=2");
    }

    #[test]
    fn duplicate_keys_last_wins() {
        let set = LabelSet::from_labels([("a", "1"), ("a", "2")]);
        assert_eq!(set.len(), 1);
        assert_eq!(set.get("a"), Some("2"));
    }

    #[test]
    fn lookup() {
        let set = LabelSet::from_labels([("x", "1"), ("y", "2")]);
        assert_eq!(set.get("x"), Some("1"));
        assert_eq!(set.get("z"), None);
        assert!(LabelSet::empty().is_empty());
    }
}
