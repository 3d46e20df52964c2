//! # Dimensions
//!
//! Normalized dimension sets and the three-way merge used for every serialized line

use super::normalize::{normalize_dimension_key, normalize_dimension_value};
use indexmap::IndexMap;

/// Deduplicated dimensions with normalized keys and escaped values, kept in insertion order
///
/// Inserting an existing key replaces its value but keeps the key's original position.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DimensionSet {
    dimensions: IndexMap<String, String>,
}

impl DimensionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize raw `(key, value)` pairs, dropping any whose key normalizes to nothing
    ///
    /// Static and enrichment dimensions go through here once when the exporter is built.
    pub fn normalized<K, V>(dimensions: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut set = Self::new();
        set.extend_normalized(dimensions);
        set
    }

    fn extend_normalized<K, V>(&mut self, dimensions: impl IntoIterator<Item = (K, V)>)
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in dimensions {
            let key = normalize_dimension_key(key.as_ref());
            if key.is_empty() {
                continue;
            }
            self.dimensions.insert(key, normalize_dimension_value(value.as_ref()));
        }
    }

    fn extend(&mut self, other: &DimensionSet) {
        for (key, value) in &other.dimensions {
            self.dimensions.insert(key.clone(), value.clone());
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.dimensions.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.dimensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dimensions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.dimensions.iter().map(|(key, value)| (key.as_str(), value.as_str()))
    }
}

/// Merge the three dimension sources of a line, later sources win on key collisions
///
/// Priority from lowest to highest: static defaults, the point's own attributes, enrichment.
/// `static_dimensions` and `enrichment` are expected to be normalized already, the point's
/// attributes are normalized here.
pub fn merge(static_dimensions: &DimensionSet, attributes: &[(String, String)], enrichment: &DimensionSet) -> DimensionSet {
    let mut merged = DimensionSet {
        dimensions: IndexMap::with_capacity(static_dimensions.len() + attributes.len() + enrichment.len()),
    };

    merged.extend(static_dimensions);
    merged.extend_normalized(attributes.iter().map(|(key, value)| (key, value)));
    merged.extend(enrichment);

    merged
}
