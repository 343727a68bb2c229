//! Topic documents

use super::{summary, text, Related, Relation};
use ddi_common::db::store::Record;
use serde_json::{json, Value};

pub(super) const RELATIONS: &[Relation] = &[
    Relation::Parent { from: "topics", column: "study_id", table: "studies" },
    Relation::Parent { from: "topics", column: "parent_id", table: "topics" },
];

pub(super) fn build(record: &Record, related: &Related) -> Value {
    let study = related.parent(record, "study_id", "studies");
    let parent = related.parent(record, "parent_id", "topics");

    json!({
        "name": text(record, "name"),
        "label": text(record, "label"),
        "label_de": text(record, "label_de"),
        "description": text(record, "description"),
        "description_de": text(record, "description_de"),
        "study": summary(study),
        "study_name": study.map(|s| text(s, "name")).unwrap_or(""),
        "parent": parent.map(|p| text(p, "name")),
    })
}
