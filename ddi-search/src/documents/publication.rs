//! Publication documents

use super::{summary, text, Related, Relation};
use ddi_common::db::store::Record;
use serde_json::{json, Value};

pub(super) const RELATIONS: &[Relation] = &[Relation::Parent {
    from: "publications",
    column: "study_id",
    table: "studies",
}];

pub(super) fn build(record: &Record, related: &Related) -> Value {
    let study = related.parent(record, "study_id", "studies");

    json!({
        "name": text(record, "name"),
        "title": text(record, "title"),
        "author": text(record, "author"),
        "year": record.get("year").cloned().unwrap_or(Value::Null),
        "sub_type": text(record, "sub_type"),
        "abstract": text(record, "abstract_text"),
        "cite": text(record, "cite"),
        "doi": text(record, "doi"),
        "url": text(record, "url"),
        "study": summary(study),
        "study_name": study.map(|s| text(s, "name")).unwrap_or(""),
    })
}
