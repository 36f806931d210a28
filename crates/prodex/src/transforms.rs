// ai
//! 🔄 Transforms: source hits in, destination documents out. Sometimes zero, sometimes many.
//!
//! 🎬 COLD OPEN: INT. CUSTOMS BOOTH, 2:47 AM
//!
//! A hit arrives from the `product` index. Its passport says `category_name`. Its luggage
//! says `null`. The officer stamps SKIPPED, writes down the reason, and waves the next one
//! through. Nobody gets deported, nobody blocks the line.
//!
//! ## Knowledge Graph 🧠
//! - `DocumentTransform`: the trait. `transform` per hit, `finish` once when the scroll is done.
//! - `TransformOutput`: documents to write + skips with reasons. Both count as "transformed".
//! - `DocumentTransformer`: enum dispatch over the concrete transforms, same pattern as every
//!   other backend enum in this crate. The match is basically free.
//! - Validation happens once per source document, up front. After that the code only sees
//!   typed values.
//!
//! ⚠️ Transforms never return errors. A bad document is a skip, not a catastrophe. 🦆

use std::fmt;

use crate::common::{DestinationDoc, SourceHit};

pub(crate) mod categories;
pub(crate) mod lookup;
pub(crate) mod products;

pub use categories::CategoryIdScheme;
pub(crate) use categories::CategoryRollup;
pub use lookup::CategoryLookupTable;
pub use products::UnmappedCategoryPolicy;
pub(crate) use products::ProductCatalog;

/// 🙅 Why a source document (or one of its nested entries) didn't make it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SkipReason {
    /// 👻 The hit had no `_source` at all.
    MissingSource,
    /// 🕳️ The field of interest isn't there.
    MissingField(String),
    /// 🫥 The field is there and it's `null`.
    NullField(String),
    /// 🧩 The field is there and it's the wrong shape.
    WrongType { field: String, found: &'static str },
    /// 💀 The document didn't survive schema validation.
    Malformed(String),
    /// 🗺️ Category name not in the lookup table.
    UnmappedCategory(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingSource => write!(f, "missing _source"),
            SkipReason::MissingField(field) => write!(f, "missing field '{}'", field),
            SkipReason::NullField(field) => write!(f, "null field '{}'", field),
            SkipReason::WrongType { field, found } => {
                write!(f, "field '{}' has unexpected type {}", field, found)
            }
            SkipReason::Malformed(detail) => write!(f, "malformed document: {}", detail),
            SkipReason::UnmappedCategory(name) => write!(f, "unmapped category '{}'", name),
        }
    }
}

/// 🏷️ JSON type names for skip messages.
pub(crate) fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// 📋 One skip: which source document (or `doc#entry`) and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Skip {
    pub source_id: String,
    pub reason: SkipReason,
}

impl Skip {
    pub(crate) fn new(source_id: impl Into<String>, reason: SkipReason) -> Self {
        Self {
            source_id: source_id.into(),
            reason,
        }
    }
}

/// 📦 What a transform produced for one hit (or for the final drain).
#[derive(Debug, Default, PartialEq)]
pub(crate) struct TransformOutput {
    pub documents: Vec<DestinationDoc>,
    pub skipped: Vec<Skip>,
}

impl TransformOutput {
    pub(crate) fn skip(source_id: impl Into<String>, reason: SkipReason) -> Self {
        Self {
            documents: Vec::new(),
            skipped: vec![Skip::new(source_id, reason)],
        }
    }

    /// 🔢 Everything that came out of the transform, written or not.
    pub(crate) fn transformed(&self) -> u64 {
        (self.documents.len() + self.skipped.len()) as u64
    }
}

/// 🔄 A per-job transform.
///
/// # Contract 📜
/// - `begin` is called once per run, right after the cursor opens. Per-run state resets here.
/// - `transform` is called once per scanned hit, in scroll order.
/// - `finish` is called once after the last page, before the final flush. Aggregating
///   transforms emit their documents here.
/// - Both may return any number of documents and skips.
pub(crate) trait DocumentTransform {
    /// 🎯 `_source.includes` for the scroll, so the cluster only ships what we read.
    fn source_includes(&self) -> Vec<String>;
    fn begin(&mut self) {}
    fn transform(&mut self, hit: &SourceHit) -> TransformOutput;
    fn finish(&mut self) -> TransformOutput {
        TransformOutput::default()
    }
}

/// 🎭 The transforms this crate knows about.
#[derive(Debug)]
pub(crate) enum DocumentTransformer {
    Categories(CategoryRollup),
    Products(ProductCatalog),
}

impl DocumentTransform for DocumentTransformer {
    fn source_includes(&self) -> Vec<String> {
        match self {
            Self::Categories(t) => t.source_includes(),
            Self::Products(t) => t.source_includes(),
        }
    }

    fn begin(&mut self) {
        match self {
            Self::Categories(t) => t.begin(),
            Self::Products(t) => t.begin(),
        }
    }

    #[inline]
    fn transform(&mut self, hit: &SourceHit) -> TransformOutput {
        match self {
            Self::Categories(t) => t.transform(hit),
            Self::Products(t) => t.transform(hit),
        }
    }

    fn finish(&mut self) -> TransformOutput {
        match self {
            Self::Categories(t) => t.finish(),
            Self::Products(t) => t.finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn the_one_where_skip_reasons_read_like_sentences() {
        assert_eq!(
            SkipReason::MissingField("category_name".into()).to_string(),
            "missing field 'category_name'"
        );
        assert_eq!(
            SkipReason::UnmappedCategory("Unknown Category".into()).to_string(),
            "unmapped category 'Unknown Category'"
        );
        assert_eq!(
            SkipReason::WrongType {
                field: "products".into(),
                found: "string"
            }
            .to_string(),
            "field 'products' has unexpected type string"
        );
    }

    #[test]
    fn the_one_where_the_enum_dispatches_to_the_right_transform() {
        let lookup = Arc::new(CategoryLookupTable::default());
        let mut products = DocumentTransformer::Products(ProductCatalog::new(
            lookup.clone(),
            UnmappedCategoryPolicy::Skip,
        ));
        let mut categories = DocumentTransformer::Categories(CategoryRollup::new(
            "category_name",
            CategoryIdScheme::Lookup,
            lookup,
        ));

        assert_eq!(products.source_includes(), vec!["products".to_string()]);
        assert_eq!(categories.source_includes(), vec!["category_name".to_string()]);

        let hit = SourceHit::new("o-1", json!({"products": [{"product_id": 1, "category": "Men's Shoes"}]}));
        assert_eq!(products.transform(&hit).documents.len(), 1);
        assert!(products.finish().documents.is_empty());

        let hit = SourceHit::new("p-1", json!({"category_name": "Men's Shoes"}));
        assert_eq!(categories.transform(&hit).transformed(), 0);
        assert_eq!(categories.finish().documents.len(), 1);
    }
}
