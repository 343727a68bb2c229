//! Datasets and variables (`datasets.csv`, `variables.csv`, `datasets.json`)

use super::{ImportReport, Importer, RowImporter};
use crate::context::ImportContext;
use crate::tabular::{json_str, read_json_records, rename_json_keys, Row};
use crate::ImportError;
use async_trait::async_trait;
use ddi_common::db::repository::to_records;
use ddi_common::db::WriteBatch;
use ddi_common::models::{Dataset, Entity, Study, Variable};
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::path::Path;
use tracing::{info, warn};
use uuid::Uuid;

/// Comma or whitespace separated key column names
fn primary_key(value: &str) -> Value {
    Value::Array(
        value
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|s| !s.is_empty())
            .map(|s| Value::String(s.to_string()))
            .collect(),
    )
}

/// Stored dataset, or a fresh one linked to the `none` sentinels
async fn dataset_or_new(ctx: &ImportContext, study: &Study, name: &str) -> Result<Dataset, ImportError> {
    let id = ctx.ids.child(study.id, name);
    if let Some(dataset) = ctx.repo::<Dataset>().get(id).await? {
        return Ok(dataset);
    }

    let mut dataset = Dataset::new(&ctx.ids, study.id, name);
    dataset.period_id = Some(ctx.period(study, None).await?);
    dataset.analysis_unit_id = Some(ctx.analysis_unit(study, None).await?);
    dataset.conceptual_dataset_id = Some(ctx.conceptual_dataset(None).await?);
    Ok(dataset)
}

pub struct DatasetImport;

#[async_trait]
impl RowImporter for DatasetImport {
    fn entity(&self) -> &'static str {
        "datasets"
    }

    fn name_column(&self) -> Option<&'static str> {
        Some("dataset")
    }

    async fn import_row(&self, ctx: &ImportContext, study: &Study, row: &Row) -> Result<Option<Uuid>, ImportError> {
        let name = row.require("datasets", "name")?;
        let mut dataset = dataset_or_new(ctx, study, name).await?;

        if let Some(v) = row.get("label") {
            dataset.label = v.to_string();
        }
        if let Some(v) = row.get("label_de") {
            dataset.label_de = v.to_string();
        }
        if let Some(v) = row.get("description") {
            dataset.description = v.to_string();
        }
        if let Some(v) = row.get("folder") {
            dataset.folder = v.to_string();
        }
        if let Some(v) = row.get("primary_key") {
            dataset.primary_key = primary_key(v);
        }

        // Named references win; a column that is present but empty means `none`
        if row.has_column("period") {
            dataset.period_id = Some(ctx.period(study, row.get("period")).await?);
        }
        if row.has_column("analysis_unit") {
            dataset.analysis_unit_id = Some(ctx.analysis_unit(study, row.get("analysis_unit")).await?);
        }
        if row.has_column("conceptual_dataset") {
            dataset.conceptual_dataset_id = Some(ctx.conceptual_dataset(row.get("conceptual_dataset")).await?);
        }

        ctx.upsert(&dataset).await.map(Some)
    }
}

/// Variables of datasets that must already exist
pub struct VariableImport;

#[async_trait]
impl RowImporter for VariableImport {
    fn entity(&self) -> &'static str {
        "variables"
    }

    fn name_column(&self) -> Option<&'static str> {
        Some("variable")
    }

    async fn import_row(&self, ctx: &ImportContext, study: &Study, row: &Row) -> Result<Option<Uuid>, ImportError> {
        let name = row.require("variables", "name")?;
        let dataset_name = row.require("variables", "dataset")?;
        let dataset_id = ctx.ids.child(study.id, dataset_name);
        if !ctx.repo::<Dataset>().exists(dataset_id).await? {
            return Err(ImportError::row(
                "variables",
                format!("dataset '{}' does not exist", dataset_name),
            ));
        }

        let id = ctx.ids.child(dataset_id, name);
        let mut variable = ctx
            .existing_or(id, || Variable::new(&ctx.ids, dataset_id, name))
            .await?;

        if let Some(v) = row.get("label") {
            variable.label = v.to_string();
        }
        if let Some(v) = row.get("label_de") {
            variable.label_de = v.to_string();
        }
        if let Some(v) = row.get("description") {
            variable.description = v.to_string();
        }
        if let Some(v) = row.get("description_long") {
            variable.description_long = v.to_string();
        }
        if let Some(v) = row.get("scale") {
            variable.scale = v.to_string();
        }
        if let Some(v) = row.get("image_url") {
            variable.image_url = Some(v.to_string());
        }
        if let Some(sort_id) = row.get_i64("variables", "sort_id")? {
            variable.sort_id = sort_id;
        }
        if row.has_column("concept") {
            variable.concept_id = ctx.optional_concept(row.get("concept")).await?;
        }
        if row.has_column("period") {
            variable.period_id = ctx.optional_period(study, row.get("period")).await?;
        }

        ctx.upsert(&variable).await.map(Some)
    }
}

/// Variable metadata with statistics, grouped into datasets
///
/// The file is a list (or dict) of variable records carrying their dataset
/// name. Datasets and variables are written as one batch.
pub struct DatasetJsonImport;

impl DatasetJsonImport {
    fn apply(variable: &mut Variable, record: &Map<String, Value>, sort_id: i64) {
        if let Some(v) = json_str(record, &["label"]) {
            variable.label = v.to_string();
        }
        if let Some(v) = json_str(record, &["label_de"]) {
            variable.label_de = v.to_string();
        }
        if let Some(v) = json_str(record, &["description"]) {
            variable.description = v.to_string();
        }
        if let Some(v) = json_str(record, &["scale"]) {
            variable.scale = v.to_string();
        }
        if let Some(categories) = record.get("categories").filter(|v| !v.is_null()) {
            variable.categories = categories.clone();
        }
        if let Some(statistics) = record.get("statistics").filter(|v| !v.is_null()) {
            variable.statistics = statistics.clone();
        }
        variable.sort_id = sort_id;
    }
}

#[async_trait]
impl Importer for DatasetJsonImport {
    fn entity(&self) -> &'static str {
        "datasets.json"
    }

    async fn import(&self, ctx: &ImportContext, study: &Study, path: &Path) -> Result<ImportReport, ImportError> {
        let records = read_json_records(path)?;
        let mut report = ImportReport::default();

        let mut grouped: IndexMap<String, Vec<Map<String, Value>>> = IndexMap::new();
        for mut record in records {
            rename_json_keys(&mut record);
            let dataset = json_str(&record, &["dataset"]).map(str::to_lowercase);
            let has_name = json_str(&record, &["name", "variable"]).is_some();
            match dataset {
                Some(dataset) if has_name => grouped.entry(dataset).or_default().push(record),
                _ => {
                    let record = Value::Object(record);
                    warn!(study = %study.name, entity = "datasets.json", record = %record, "Record lacks dataset or variable name");
                    report.failed += 1;
                }
            }
        }

        let mut datasets = Vec::with_capacity(grouped.len());
        let mut variables = Vec::new();
        for (dataset_name, records) in &grouped {
            let dataset = dataset_or_new(ctx, study, dataset_name).await?;
            for (index, record) in records.iter().enumerate() {
                let Some(name) = json_str(record, &["name", "variable"]) else {
                    continue;
                };
                let id = ctx.ids.child(dataset.id, name);
                let mut variable = ctx
                    .existing_or(id, || Variable::new(&ctx.ids, dataset.id, name))
                    .await?;
                Self::apply(&mut variable, record, index as i64);
                match variable.validate() {
                    Ok(()) => variables.push(variable),
                    Err(e) => {
                        warn!(study = %study.name, entity = "datasets.json", variable = name, error = %e, "Variable rejected");
                        report.failed += 1;
                    }
                }
            }
            dataset.validate()?;
            datasets.push(dataset);
        }

        let mut batch = WriteBatch::new();
        batch.upsert(Dataset::table(), to_records(&datasets)?);
        batch.upsert(Variable::table(), to_records(&variables)?);
        ctx.store.write(batch).await?;

        for dataset in &datasets {
            ctx.changed(dataset);
        }
        for variable in &variables {
            ctx.changed(variable);
        }

        report.imported = variables.len();
        info!(
            study = %study.name,
            entity = "datasets.json",
            datasets = datasets.len(),
            imported = report.imported,
            failed = report.failed,
            "Import finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primary_key_split() {
        assert_eq!(primary_key("pid, syear hid"), serde_json::json!(["pid", "syear", "hid"]));
        assert_eq!(primary_key(""), serde_json::json!([]));
    }
}
