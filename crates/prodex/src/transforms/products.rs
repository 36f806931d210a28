// ai
//! 🛒 Product catalog: one e-commerce order in, one catalog document per order line out.
//!
//! 🎬 An order for three items walks in. Three products walk out, each wearing its own
//! `product_id` as a name tag and a nested `{id, name}` category badge. If the same
//! product shows up in a thousand orders, it gets written a thousand times under the same
//! id, and the index ends up with exactly one copy. Idempotence by natural key. 🦆
//!
//! Validation is one serde pass per order line into [`OrderLine`]. Anything that doesn't
//! deserialize is a skip for that line only; its siblings carry on.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::trace;

use super::{CategoryLookupTable, DocumentTransform, Skip, SkipReason, TransformOutput, json_type_name};
use crate::common::{DestinationDoc, SourceHit};

const PRODUCTS_FIELD: &str = "products";

/// 🗺️ What to do with an order line whose category isn't in the lookup table.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum UnmappedCategoryPolicy {
    /// 🙅 Skip the line with reason `unmapped category`.
    #[default]
    Skip,
    /// 🫥 Write it anyway with `category.id = null`.
    NullCategory,
}

/// 🔢 `product_id` shows up as a number in the sample data and as a string elsewhere.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(untagged)]
enum ProductId {
    Number(serde_json::Number),
    Text(String),
}

impl ProductId {
    fn into_key(self) -> String {
        match self {
            ProductId::Number(n) => n.to_string(),
            ProductId::Text(s) => s,
        }
    }
}

/// 📋 One entry of an order's `products` array, as far as we care about it.
#[derive(Debug, Deserialize)]
struct OrderLine {
    product_id: Option<ProductId>,
    category: Option<String>,
    product_name: Option<String>,
    base_price: Option<f64>,
    min_price: Option<f64>,
    manufacturer: Option<String>,
    sku: Option<String>,
    created_on: Option<String>,
}

#[derive(Debug, Serialize, PartialEq)]
struct CategoryRef {
    id: Option<u32>,
    name: String,
}

/// 📦 The catalog document. `status` is always `true`: a product that was ordered is live.
#[derive(Debug, Serialize, PartialEq)]
struct ProductRecord {
    product_id: String,
    product_name: Option<String>,
    category: CategoryRef,
    base_price: Option<f64>,
    min_price: Option<f64>,
    manufacturer: Option<String>,
    sku: Option<String>,
    created_on: Option<String>,
    status: bool,
}

#[derive(Debug)]
pub(crate) struct ProductCatalog {
    lookup: Arc<CategoryLookupTable>,
    unmapped: UnmappedCategoryPolicy,
}

impl ProductCatalog {
    pub(crate) fn new(lookup: Arc<CategoryLookupTable>, unmapped: UnmappedCategoryPolicy) -> Self {
        Self { lookup, unmapped }
    }

    fn line(&self, line_id: String, entry: &Value) -> Result<DestinationDoc, Skip> {
        let line: OrderLine = serde_json::from_value(entry.clone())
            .map_err(|e| Skip::new(line_id.clone(), SkipReason::Malformed(e.to_string())))?;

        let product_id = line
            .product_id
            .ok_or_else(|| Skip::new(line_id.clone(), SkipReason::MissingField("product_id".into())))?
            .into_key();
        let category = line
            .category
            .ok_or_else(|| Skip::new(line_id.clone(), SkipReason::MissingField("category".into())))?;

        let category_id = match (self.lookup.id_for(&category), self.unmapped) {
            (Some(id), _) => Some(id),
            (None, UnmappedCategoryPolicy::NullCategory) => None,
            (None, UnmappedCategoryPolicy::Skip) => {
                return Err(Skip::new(line_id, SkipReason::UnmappedCategory(category)));
            }
        };

        let record = ProductRecord {
            product_id: product_id.clone(),
            product_name: line.product_name,
            category: CategoryRef {
                id: category_id,
                name: category,
            },
            base_price: line.base_price,
            min_price: line.min_price,
            manufacturer: line.manufacturer,
            sku: line.sku,
            created_on: line.created_on,
            status: true,
        };
        let body = serde_json::to_value(&record)
            .map_err(|e| Skip::new(line_id, SkipReason::Malformed(e.to_string())))?;
        Ok(DestinationDoc {
            id: product_id,
            body,
        })
    }
}

impl DocumentTransform for ProductCatalog {
    fn source_includes(&self) -> Vec<String> {
        vec![PRODUCTS_FIELD.to_string()]
    }

    fn transform(&mut self, hit: &SourceHit) -> TransformOutput {
        let Some(source) = hit.source.as_ref() else {
            return TransformOutput::skip(&hit.id, SkipReason::MissingSource);
        };
        let lines = match source.get(PRODUCTS_FIELD) {
            None => return TransformOutput::skip(&hit.id, SkipReason::MissingField(PRODUCTS_FIELD.into())),
            Some(Value::Null) => return TransformOutput::skip(&hit.id, SkipReason::NullField(PRODUCTS_FIELD.into())),
            Some(Value::Array(lines)) => lines,
            Some(other) => {
                return TransformOutput::skip(
                    &hit.id,
                    SkipReason::WrongType {
                        field: PRODUCTS_FIELD.into(),
                        found: json_type_name(other),
                    },
                );
            }
        };

        let mut out = TransformOutput::default();
        for (position, entry) in lines.iter().enumerate() {
            match self.line(format!("{}#{}", hit.id, position), entry) {
                Ok(doc) => out.documents.push(doc),
                Err(skip) => out.skipped.push(skip),
            }
        }
        trace!(
            "🛒 order {} ({}) fanned out into {} products ({} skipped)",
            hit.id,
            hit.index.as_deref().unwrap_or("?"),
            out.documents.len(),
            out.skipped.len()
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn catalog(policy: UnmappedCategoryPolicy) -> ProductCatalog {
        ProductCatalog::new(Arc::new(CategoryLookupTable::default()), policy)
    }

    fn order_line(product_id: Value, category: &str) -> Value {
        json!({
            "product_id": product_id,
            "product_name": "Basic T-shirt - dark blue/white",
            "category": category,
            "base_price": 11.99,
            "min_price": 6.35,
            "manufacturer": "Elitelligence",
            "sku": "ZO0549605496",
            "created_on": "2016-12-26T09:28:48+00:00"
        })
    }

    #[test]
    fn the_one_where_an_order_fans_out_into_products() {
        let mut t = catalog(UnmappedCategoryPolicy::Skip);
        let hit = SourceHit::new(
            "order-1",
            json!({"products": [order_line(json!(6283), "Men's Clothing"), order_line(json!(19400), "Men's Shoes")]}),
        );

        let out = t.transform(&hit);

        assert!(out.skipped.is_empty());
        assert_eq!(out.documents.len(), 2);
        assert_eq!(out.documents[0].id, "6283");
        assert_eq!(
            out.documents[0].body,
            json!({
                "product_id": "6283",
                "product_name": "Basic T-shirt - dark blue/white",
                "category": {"id": 6, "name": "Men's Clothing"},
                "base_price": 11.99,
                "min_price": 6.35,
                "manufacturer": "Elitelligence",
                "sku": "ZO0549605496",
                "created_on": "2016-12-26T09:28:48+00:00",
                "status": true
            })
        );
        assert_eq!(out.documents[1].id, "19400");
        assert_eq!(out.documents[1].body["category"]["id"], json!(5));
    }

    #[test]
    fn the_one_where_string_ids_pass_through_untouched() {
        let mut t = catalog(UnmappedCategoryPolicy::Skip);
        let hit = SourceHit::new("o", json!({"products": [order_line(json!("sku-77"), "Women's Shoes")]}));
        assert_eq!(t.transform(&hit).documents[0].id, "sku-77");
    }

    #[test]
    fn the_one_where_an_unknown_category_is_skipped_by_default() {
        let mut t = catalog(UnmappedCategoryPolicy::Skip);
        let hit = SourceHit::new("o-9", json!({"products": [order_line(json!(1), "Unknown Category")]}));

        let out = t.transform(&hit);

        assert!(out.documents.is_empty());
        assert_eq!(
            out.skipped,
            vec![Skip::new("o-9#0", SkipReason::UnmappedCategory("Unknown Category".into()))]
        );
    }

    #[test]
    fn the_one_where_an_unknown_category_is_written_with_a_null_id_when_asked() {
        let mut t = catalog(UnmappedCategoryPolicy::NullCategory);
        let hit = SourceHit::new("o-9", json!({"products": [order_line(json!(1), "Unknown Category")]}));

        let out = t.transform(&hit);

        assert!(out.skipped.is_empty());
        assert_eq!(out.documents.len(), 1);
        assert_eq!(
            out.documents[0].body["category"],
            json!({"id": null, "name": "Unknown Category"})
        );
    }

    #[test]
    fn the_one_where_one_bad_line_does_not_sink_its_siblings() {
        let mut t = catalog(UnmappedCategoryPolicy::Skip);
        let hit = SourceHit::new(
            "o-2",
            json!({"products": [
                {"category": "Men's Shoes", "product_name": "no id"},
                order_line(json!(2), "Men's Shoes"),
                {"product_id": 3},
                {"product_id": 4, "category": "Men's Shoes", "base_price": "cheap"}
            ]}),
        );

        let out = t.transform(&hit);

        assert_eq!(out.documents.len(), 1);
        assert_eq!(out.documents[0].id, "2");
        assert_eq!(out.skipped.len(), 3);
        assert_eq!(out.skipped[0], Skip::new("o-2#0", SkipReason::MissingField("product_id".into())));
        assert_eq!(out.skipped[1], Skip::new("o-2#2", SkipReason::MissingField("category".into())));
        assert_eq!(out.skipped[2].source_id, "o-2#3");
        assert!(matches!(out.skipped[2].reason, SkipReason::Malformed(_)));
    }

    #[test]
    fn the_one_where_orders_without_products_are_one_skip_each() {
        let mut t = catalog(UnmappedCategoryPolicy::Skip);

        let missing = t.transform(&SourceHit::new("a", json!({"customer": "Eddie"})));
        assert_eq!(missing, TransformOutput::skip("a", SkipReason::MissingField("products".into())));

        let null = t.transform(&SourceHit::new("b", json!({"products": null})));
        assert_eq!(null, TransformOutput::skip("b", SkipReason::NullField("products".into())));

        let wrong = t.transform(&SourceHit::new("c", json!({"products": "lots"})));
        assert_eq!(
            wrong,
            TransformOutput::skip(
                "c",
                SkipReason::WrongType {
                    field: "products".into(),
                    found: "string"
                }
            )
        );

        let sourceless = SourceHit {
            id: "d".into(),
            index: None,
            source: None,
        };
        assert_eq!(t.transform(&sourceless), TransformOutput::skip("d", SkipReason::MissingSource));
    }

    #[test]
    fn the_one_where_an_empty_order_produces_nothing_at_all() {
        let mut t = catalog(UnmappedCategoryPolicy::Skip);
        let out = t.transform(&SourceHit::new("e", json!({"products": []})));
        assert_eq!(out.transformed(), 0);
    }

    #[test]
    fn the_one_where_the_policy_reads_from_config_strings() {
        let p: UnmappedCategoryPolicy = serde_json::from_value(json!("null_category")).unwrap();
        assert_eq!(p, UnmappedCategoryPolicy::NullCategory);
        assert_eq!(UnmappedCategoryPolicy::default(), UnmappedCategoryPolicy::Skip);
    }
}
