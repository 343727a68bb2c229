//! Search document projections
//!
//! Each document type flattens one catalog row plus selected related rows
//! into a JSON document whose id is the entity id. Related rows are declared
//! per type as a chain of [`Relation`]s and loaded with one query per
//! relation for a whole batch of source rows, never per document.

mod concept;
mod publication;
mod question;
mod topic;
mod variable;

use ddi_common::db::store::{record_str, record_uuid, Filter, Record, Store};
use ddi_common::db::tables::table_by_name;
use ddi_common::models::NONE_NAME;
use ddi_common::Error;
use indexmap::{IndexMap, IndexSet};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::str::FromStr;
use uuid::Uuid;

/// Display label for a missing or placeholder related object
pub const NOT_CATEGORIZED: &str = "Not Categorized";
/// German display label for a missing or placeholder related object
pub const NOT_CATEGORIZED_DE: &str = "Nicht kategorisiert";

/// Related-object names treated as "no value"
const PLACEHOLDERS: &[&str] = &[NONE_NAME, "unspecified", ""];

/// Ids per `IN (...)` lookup
const LOOKUP_CHUNK: usize = 500;

/// Indexed document types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentType {
    Concepts,
    Topics,
    Variables,
    Questions,
    Publications,
}

impl DocumentType {
    pub const ALL: [DocumentType; 5] = [
        DocumentType::Concepts,
        DocumentType::Topics,
        DocumentType::Variables,
        DocumentType::Questions,
        DocumentType::Publications,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DocumentType::Concepts => "concepts",
            DocumentType::Topics => "topics",
            DocumentType::Variables => "variables",
            DocumentType::Questions => "questions",
            DocumentType::Publications => "publications",
        }
    }

    /// Table whose rows become documents of this type
    pub fn source_table(self) -> &'static str {
        self.as_str()
    }

    /// Document type fed by rows of `table`, if any
    pub fn for_table(table: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.source_table() == table)
    }

    /// Related rows preloaded for a batch, in load order
    pub fn relations(self) -> &'static [Relation] {
        match self {
            DocumentType::Concepts => concept::RELATIONS,
            DocumentType::Topics => topic::RELATIONS,
            DocumentType::Variables => variable::RELATIONS,
            DocumentType::Questions => question::RELATIONS,
            DocumentType::Publications => publication::RELATIONS,
        }
    }

    /// Project one source row into its document
    pub fn build(self, record: &Record, related: &Related) -> Value {
        match self {
            DocumentType::Concepts => concept::build(record, related),
            DocumentType::Topics => topic::build(record, related),
            DocumentType::Variables => variable::build(record, related),
            DocumentType::Questions => question::build(record, related),
            DocumentType::Publications => publication::build(record, related),
        }
    }

    /// Index settings and mappings; facet fields are keywords
    pub fn mapping(self) -> Value {
        let facet = json!({
            "properties": {
                "name": { "type": "keyword" },
                "label": { "type": "keyword" },
                "label_de": { "type": "keyword" },
            }
        });
        let mut properties = json!({
            "name": { "type": "keyword" },
            "label": { "type": "text" },
            "label_de": { "type": "text" },
            "description": { "type": "text" },
            "study": facet,
        });

        let extra: &[&str] = match self {
            DocumentType::Variables => &["dataset", "period", "analysis_unit", "conceptual_dataset"],
            DocumentType::Questions => &["instrument", "period", "analysis_unit"],
            _ => &[],
        };
        if let Some(map) = properties.as_object_mut() {
            for field in extra {
                map.insert((*field).to_string(), facet.clone());
            }
        }

        json!({ "mappings": { "properties": properties } })
    }
}

impl FromStr for DocumentType {
    type Err = crate::SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| crate::SearchError::UnknownDocumentType(s.to_string()))
    }
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One step of a related-row chain
#[derive(Debug, Clone, Copy)]
pub enum Relation {
    /// Rows of `table` referenced by `column` of the rows loaded from `from`
    Parent {
        from: &'static str,
        column: &'static str,
        table: &'static str,
    },
    /// Rows of `table` whose `column` references the rows loaded from `from`
    Children {
        from: &'static str,
        table: &'static str,
        column: &'static str,
    },
}

/// Related rows loaded for a batch of source rows
#[derive(Debug, Default)]
pub struct Related {
    rows: HashMap<&'static str, IndexMap<Uuid, Record>>,
    children: HashMap<(&'static str, &'static str), HashMap<Uuid, Vec<Uuid>>>,
}

impl Related {
    /// Load every relation of `doc_type` for `records`
    pub async fn load(
        store: &dyn Store,
        doc_type: DocumentType,
        records: &[Record],
    ) -> ddi_common::Result<Self> {
        let mut related = Self::default();
        related.rows.insert(
            doc_type.source_table(),
            records
                .iter()
                .filter_map(|r| record_uuid(r, "id").map(|id| (id, r.clone())))
                .collect(),
        );

        for relation in doc_type.relations() {
            related.load_relation(store, relation).await?;
        }
        Ok(related)
    }

    async fn load_relation(&mut self, store: &dyn Store, relation: &Relation) -> ddi_common::Result<()> {
        match *relation {
            Relation::Parent { from, column, table } => {
                let wanted: IndexSet<Uuid> = self
                    .rows
                    .get(from)
                    .into_iter()
                    .flat_map(|rows| rows.values())
                    .filter_map(|r| record_uuid(r, column))
                    .filter(|id| !self.contains(table, *id))
                    .collect();
                self.fetch_into(store, table, "id", wanted, None).await
            }
            Relation::Children { from, table, column } => {
                let parents: IndexSet<Uuid> = self
                    .rows
                    .get(from)
                    .map(|rows| rows.keys().copied().collect())
                    .unwrap_or_default();
                self.fetch_into(store, table, column, parents, Some(column)).await
            }
        }
    }

    async fn fetch_into(
        &mut self,
        store: &dyn Store,
        table_name: &'static str,
        column: &str,
        ids: IndexSet<Uuid>,
        child_column: Option<&'static str>,
    ) -> ddi_common::Result<()> {
        let table = table_by_name(table_name)
            .ok_or_else(|| Error::Internal(format!("unknown table {}", table_name)))?;
        let ids: Vec<Uuid> = ids.into_iter().collect();

        for chunk in ids.chunks(LOOKUP_CHUNK) {
            let mut filter = Filter::new().any_of(column, chunk.iter().copied());
            if table.has_column("sort_id") {
                filter = filter.order_by("sort_id");
            }
            for record in store.select(table, &filter).await? {
                let Some(id) = record_uuid(&record, "id") else {
                    continue;
                };
                if let Some(child_column) = child_column {
                    if let Some(parent) = record_uuid(&record, child_column) {
                        self.children
                            .entry((table_name, child_column))
                            .or_default()
                            .entry(parent)
                            .or_default()
                            .push(id);
                    }
                }
                self.rows.entry(table_name).or_default().insert(id, record);
            }
        }
        Ok(())
    }

    fn contains(&self, table: &str, id: Uuid) -> bool {
        self.rows.get(table).is_some_and(|rows| rows.contains_key(&id))
    }

    /// Row of `table` referenced by `column` of `record`
    pub fn parent(&self, record: &Record, column: &str, table: &str) -> Option<&Record> {
        let id = record_uuid(record, column)?;
        self.rows.get(table)?.get(&id)
    }

    /// Rows of `table` whose `column` references `record`
    pub fn children(&self, record: &Record, table: &'static str, column: &'static str) -> Vec<&Record> {
        let Some(id) = record_uuid(record, "id") else {
            return Vec::new();
        };
        let Some(rows) = self.rows.get(table) else {
            return Vec::new();
        };
        self.children
            .get(&(table, column))
            .and_then(|index| index.get(&id))
            .into_iter()
            .flatten()
            .filter_map(|child| rows.get(child))
            .collect()
    }
}

/// Text column of a record, empty when missing
pub(crate) fn text<'a>(record: &'a Record, column: &str) -> &'a str {
    record_str(record, column).unwrap_or("")
}

fn is_placeholder(value: &str) -> bool {
    PLACEHOLDERS.contains(&value.trim().to_lowercase().as_str())
}

/// Facet object for a related row with the "Not Categorized" fallback
///
/// A missing row, a placeholder name, or a placeholder label all yield the
/// fixed display labels.
pub(crate) fn facet(record: Option<&Record>) -> Value {
    let categorized = record.filter(|r| !is_placeholder(text(r, "name")) && !is_placeholder(text(r, "label")));

    match categorized {
        Some(r) => {
            let label = text(r, "label");
            let label_de = match text(r, "label_de") {
                de if is_placeholder(de) => label,
                de => de,
            };
            json!({ "name": text(r, "name"), "label": label, "label_de": label_de })
        }
        None => json!({
            "name": record.map(|r| text(r, "name")).unwrap_or(NONE_NAME),
            "label": NOT_CATEGORIZED,
            "label_de": NOT_CATEGORIZED_DE,
        }),
    }
}

/// Name/label object for a required parent (study, dataset, instrument)
pub(crate) fn summary(record: Option<&Record>) -> Value {
    match record {
        Some(r) => json!({
            "name": text(r, "name"),
            "label": text(r, "label"),
            "label_de": text(r, "label_de"),
        }),
        None => Value::Null,
    }
}
