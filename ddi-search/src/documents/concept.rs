//! Concept documents
//!
//! Concepts are study independent; the studies come from the topics the
//! concept is filed under.

use super::{text, Related, Relation};
use ddi_common::db::store::Record;
use indexmap::IndexSet;
use serde_json::{json, Value};

pub(super) const RELATIONS: &[Relation] = &[
    Relation::Children { from: "concepts", table: "concept_topics", column: "concept_id" },
    Relation::Parent { from: "concept_topics", column: "topic_id", table: "topics" },
    Relation::Parent { from: "topics", column: "study_id", table: "studies" },
];

pub(super) fn build(record: &Record, related: &Related) -> Value {
    let topics: Vec<&Record> = related
        .children(record, "concept_topics", "concept_id")
        .into_iter()
        .filter_map(|link| related.parent(link, "topic_id", "topics"))
        .collect();

    let topic_names: IndexSet<&str> = topics.iter().map(|t| text(t, "name")).collect();
    let study_names: IndexSet<&str> = topics
        .iter()
        .filter_map(|t| related.parent(t, "study_id", "studies"))
        .map(|s| text(s, "name"))
        .collect();

    json!({
        "name": text(record, "name"),
        "label": text(record, "label"),
        "label_de": text(record, "label_de"),
        "description": text(record, "description"),
        "topics": topic_names.into_iter().collect::<Vec<_>>(),
        "study_name": study_names.into_iter().collect::<Vec<_>>(),
    })
}
