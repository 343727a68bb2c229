//! Variable documents

use super::{facet, summary, text, Related, Relation};
use ddi_common::db::store::Record;
use serde_json::{json, Value};

pub(super) const RELATIONS: &[Relation] = &[
    Relation::Parent { from: "variables", column: "dataset_id", table: "datasets" },
    Relation::Parent { from: "datasets", column: "study_id", table: "studies" },
    Relation::Parent { from: "variables", column: "period_id", table: "periods" },
    Relation::Parent { from: "datasets", column: "period_id", table: "periods" },
    Relation::Parent { from: "datasets", column: "analysis_unit_id", table: "analysis_units" },
    Relation::Parent { from: "datasets", column: "conceptual_dataset_id", table: "conceptual_datasets" },
    Relation::Parent { from: "variables", column: "concept_id", table: "concepts" },
];

pub(super) fn build(record: &Record, related: &Related) -> Value {
    let dataset = related.parent(record, "dataset_id", "datasets");
    let study = dataset.and_then(|d| related.parent(d, "study_id", "studies"));
    // A variable's own period wins over its dataset's
    let period = related
        .parent(record, "period_id", "periods")
        .or_else(|| dataset.and_then(|d| related.parent(d, "period_id", "periods")));
    let analysis_unit = dataset.and_then(|d| related.parent(d, "analysis_unit_id", "analysis_units"));
    let conceptual_dataset =
        dataset.and_then(|d| related.parent(d, "conceptual_dataset_id", "conceptual_datasets"));
    let concept = related.parent(record, "concept_id", "concepts");

    let categories = record.get("categories").unwrap_or(&Value::Null);

    json!({
        "name": text(record, "name"),
        "label": text(record, "label"),
        "label_de": text(record, "label_de"),
        "description": text(record, "description"),
        "study": summary(study),
        "study_name": study.map(|s| text(s, "name")).unwrap_or(""),
        "dataset": summary(dataset),
        "dataset_name": dataset.map(|d| text(d, "name")).unwrap_or(""),
        "period": facet(period),
        "analysis_unit": facet(analysis_unit),
        "conceptual_dataset": facet(conceptual_dataset),
        "concept": summary(concept),
        "categories": {
            "labels": categories.get("labels").cloned().unwrap_or(Value::Null),
            "labels_de": categories.get("labels_de").cloned().unwrap_or(Value::Null),
        },
    })
}
