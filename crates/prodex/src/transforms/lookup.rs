//! 🗺️ Category lookup table: display name → small positive id.
//!
//! Loaded once from config (or the built-in six), wrapped in an `Arc`, handed to every
//! transform that needs it. Read-only after that. Exact string match, no trimming, no
//! case folding: "men's shoes" is not "Men's Shoes" and we won't pretend otherwise.

use std::collections::HashMap;

use serde::Deserialize;

/// 📚 The Kibana e-commerce sample categories, in their canonical order.
const DEFAULT_CATEGORIES: [(&str, u32); 6] = [
    ("Women's Accessories", 1),
    ("Women's Clothing", 2),
    ("Women's Shoes", 3),
    ("Men's Accessories", 4),
    ("Men's Shoes", 5),
    ("Men's Clothing", 6),
];

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct CategoryLookupTable(HashMap<String, u32>);

impl CategoryLookupTable {
    pub fn id_for(&self, name: &str) -> Option<u32> {
        self.0.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for CategoryLookupTable {
    fn default() -> Self {
        Self(
            DEFAULT_CATEGORIES
                .iter()
                .map(|(name, id)| (name.to_string(), *id))
                .collect(),
        )
    }
}

impl<S: Into<String>> FromIterator<(S, u32)> for CategoryLookupTable {
    fn from_iter<I: IntoIterator<Item = (S, u32)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(name, id)| (name.into(), id)).collect())
    }
}
