//! 🏷️ Category roll-up: thousands of products in, a handful of category documents out.
//!
//! Each hit contributes one category name. Names are counted while the scroll runs and
//! nothing is emitted until [`DocumentTransform::finish`], when the counts are complete.
//! Documents come out sorted by name.
//!
//! Two id schemes, picked once per job from config:
//! - `lookup`: id comes from the [`CategoryLookupTable`]. Unmapped names are skipped per
//!   source document. Running twice writes the same ids twice.
//! - `sequential`: id comes from a counter owned by this transform. The counter survives
//!   across runs of the same job, so a second run writes the same names under new ids.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace};

use super::{CategoryLookupTable, DocumentTransform, Skip, SkipReason, TransformOutput, json_type_name};
use crate::common::{DestinationDoc, SourceHit};

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CategoryIdScheme {
    #[default]
    Lookup,
    Sequential,
}

#[derive(Debug, Serialize, PartialEq)]
struct CategoryRecord<'a> {
    category_name: &'a str,
    category_id: u32,
    product_count: u64,
}

#[derive(Debug)]
pub(crate) struct CategoryRollup {
    field: String,
    scheme: CategoryIdScheme,
    lookup: Arc<CategoryLookupTable>,
    /// 📊 name → number of source documents carrying it, for the current run.
    seen: BTreeMap<String, u64>,
    /// 🔢 Last id handed out under `sequential`. Never reset.
    next_id: u32,
}

impl CategoryRollup {
    pub(crate) fn new(field: impl Into<String>, scheme: CategoryIdScheme, lookup: Arc<CategoryLookupTable>) -> Self {
        Self {
            field: field.into(),
            scheme,
            lookup,
            seen: BTreeMap::new(),
            next_id: 0,
        }
    }

    /// 🔍 The one validation step: find the field, turn scalars into a name.
    fn category_name(&self, hit: &SourceHit) -> Result<String, SkipReason> {
        let source = hit.source.as_ref().ok_or(SkipReason::MissingSource)?;
        let value = source
            .get(&self.field)
            .ok_or_else(|| SkipReason::MissingField(self.field.clone()))?;
        let name = match value {
            Value::Null => return Err(SkipReason::NullField(self.field.clone())),
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            other => {
                return Err(SkipReason::WrongType {
                    field: self.field.clone(),
                    found: json_type_name(other),
                });
            }
        };
        if name.is_empty() {
            return Err(SkipReason::Malformed(format!("empty '{}'", self.field)));
        }
        Ok(name)
    }

    fn id_for(&mut self, name: &str) -> Option<u32> {
        match self.scheme {
            CategoryIdScheme::Lookup => self.lookup.id_for(name),
            CategoryIdScheme::Sequential => {
                self.next_id += 1;
                Some(self.next_id)
            }
        }
    }
}

impl DocumentTransform for CategoryRollup {
    fn source_includes(&self) -> Vec<String> {
        vec![self.field.clone()]
    }

    fn begin(&mut self) {
        // -- 🧹 counts from an aborted run never reach `finish`. next_id stays put.
        if !self.seen.is_empty() {
            debug!("🧹 dropping {} category counts left over from an earlier run", self.seen.len());
        }
        self.seen.clear();
    }

    fn transform(&mut self, hit: &SourceHit) -> TransformOutput {
        let name = match self.category_name(hit) {
            Ok(name) => name,
            Err(reason) => return TransformOutput::skip(&hit.id, reason),
        };
        if self.scheme == CategoryIdScheme::Lookup && self.lookup.id_for(&name).is_none() {
            return TransformOutput::skip(&hit.id, SkipReason::UnmappedCategory(name));
        }
        trace!("🏷️ {} belongs to '{}'", hit.id, name);
        *self.seen.entry(name).or_insert(0) += 1;
        TransformOutput::default()
    }

    fn finish(&mut self) -> TransformOutput {
        let seen = std::mem::take(&mut self.seen);
        debug!("🏷️ rolling up {} distinct categories", seen.len());

        let mut out = TransformOutput::default();
        for (name, product_count) in seen {
            let Some(category_id) = self.id_for(&name) else {
                out.skipped.push(Skip::new(name.clone(), SkipReason::UnmappedCategory(name)));
                continue;
            };
            let record = CategoryRecord {
                category_name: &name,
                category_id,
                product_count,
            };
            match serde_json::to_value(&record) {
                Ok(body) => out.documents.push(DestinationDoc {
                    id: category_id.to_string(),
                    body,
                }),
                Err(e) => out.skipped.push(Skip::new(name.clone(), SkipReason::Malformed(e.to_string()))),
            }
        }
        out
    }
}
