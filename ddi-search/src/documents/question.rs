//! Question documents

use super::{facet, summary, text, Related, Relation};
use ddi_common::db::store::Record;
use serde_json::{json, Value};

pub(super) const RELATIONS: &[Relation] = &[
    Relation::Parent { from: "questions", column: "instrument_id", table: "instruments" },
    Relation::Parent { from: "instruments", column: "study_id", table: "studies" },
    Relation::Parent { from: "instruments", column: "period_id", table: "periods" },
    Relation::Parent { from: "instruments", column: "analysis_unit_id", table: "analysis_units" },
    Relation::Children { from: "questions", table: "question_items", column: "question_id" },
];

pub(super) fn build(record: &Record, related: &Related) -> Value {
    let instrument = related.parent(record, "instrument_id", "instruments");
    let study = instrument.and_then(|i| related.parent(i, "study_id", "studies"));
    let period = instrument.and_then(|i| related.parent(i, "period_id", "periods"));
    let analysis_unit = instrument.and_then(|i| related.parent(i, "analysis_unit_id", "analysis_units"));

    let items = related.children(record, "question_items", "question_id");
    let item_labels: Vec<&str> = items
        .iter()
        .map(|i| text(i, "label"))
        .filter(|l| !l.is_empty())
        .collect();
    let item_labels_de: Vec<&str> = items
        .iter()
        .map(|i| text(i, "label_de"))
        .filter(|l| !l.is_empty())
        .collect();

    json!({
        "name": text(record, "name"),
        "label": text(record, "label"),
        "label_de": text(record, "label_de"),
        "description": text(record, "description"),
        "instruction": text(record, "instruction"),
        "study": summary(study),
        "study_name": study.map(|s| text(s, "name")).unwrap_or(""),
        "instrument": summary(instrument),
        "period": facet(period),
        "analysis_unit": facet(analysis_unit),
        "question_items": {
            "labels": item_labels,
            "labels_de": item_labels_de,
        },
    })
}
