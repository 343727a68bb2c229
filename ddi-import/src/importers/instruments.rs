//! Instruments with their questions, items and answers (`instruments/*.json`)
//!
//! One file holds one instrument. The whole instrument is built in memory
//! and written as a single batch, so a reader never sees half an
//! instrument. Answers are shared between items by content.

use super::{ImportReport, Importer};
use crate::context::ImportContext;
use crate::tabular::{json_records, json_str, json_text, read_json_object, rename_json_keys};
use crate::ImportError;
use async_trait::async_trait;
use ddi_common::db::repository::to_records;
use ddi_common::db::WriteBatch;
use ddi_common::models::{Answer, Entity, Instrument, Question, QuestionItem, QuestionItemAnswer, Study};
use ddi_common::IdDeriver;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Distinct answers of one batch, keyed by their content id
pub struct AnswerDeduplicator {
    ids: Arc<IdDeriver>,
    answers: IndexMap<Uuid, Answer>,
}

impl AnswerDeduplicator {
    pub fn new(ids: Arc<IdDeriver>) -> Self {
        Self {
            ids,
            answers: IndexMap::new(),
        }
    }

    /// Id of the answer with this content, registering it on first sight
    pub fn intern(&mut self, value: &str, label: &str, label_de: &str) -> Uuid {
        let id = self.ids.answer(value, label, label_de);
        self.answers
            .entry(id)
            .or_insert_with(|| Answer::new(&self.ids, value, label, label_de));
        id
    }

    pub fn len(&self) -> usize {
        self.answers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }

    pub fn into_answers(self) -> Vec<Answer> {
        self.answers.into_values().collect()
    }
}

/// Rows of one instrument file
#[derive(Default)]
struct InstrumentBuild {
    questions: Vec<Question>,
    items: Vec<QuestionItem>,
    links: Vec<QuestionItemAnswer>,
}

pub struct InstrumentImport;

impl InstrumentImport {
    fn question(
        ids: &IdDeriver,
        instrument_id: Uuid,
        record: &Map<String, Value>,
        sort_id: i64,
        answers: &mut AnswerDeduplicator,
        build: &mut InstrumentBuild,
    ) -> Result<(), ImportError> {
        let name = json_str(record, &["question", "name"])
            .ok_or_else(|| ImportError::missing_field("questions", "question"))?;
        let mut question = Question::new(ids, instrument_id, name);
        question.label = json_str(record, &["label", "text"]).unwrap_or_default().to_string();
        question.label_de = json_str(record, &["label_de", "text_de"]).unwrap_or_default().to_string();
        question.description = json_str(record, &["description"]).unwrap_or_default().to_string();
        question.instruction = json_str(record, &["instruction"]).unwrap_or_default().to_string();
        question.sort_id = sort_id;
        question.validate()?;

        let mut items = Vec::new();
        let mut links = Vec::new();
        let raw_items = match record.get("items") {
            None | Some(Value::Null) => Vec::new(),
            Some(value) => json_records(value.clone())
                .ok_or_else(|| ImportError::row("questions", format!("items of '{}' are not objects", name)))?,
        };

        for (index, item_record) in raw_items.iter().enumerate() {
            let item_name = json_str(item_record, &["item", "name"])
                .map(str::to_string)
                .unwrap_or_else(|| format!("item{}", index));
            let mut item = QuestionItem::new(ids, question.id, &item_name);
            item.label = json_str(item_record, &["text", "label"]).unwrap_or_default().to_string();
            item.label_de = json_str(item_record, &["text_de", "label_de"]).unwrap_or_default().to_string();
            item.scale = json_str(item_record, &["scale"]).unwrap_or_default().to_string();
            item.sort_id = index as i64;

            if let Some(Value::Array(raw_answers)) = item_record.get("answers") {
                for (position, answer) in raw_answers.iter().enumerate() {
                    let Some(answer) = answer.as_object() else {
                        continue;
                    };
                    let value = json_text(answer, &["value"]).unwrap_or_default();
                    let label = json_str(answer, &["label"]).unwrap_or_default();
                    let label_de = json_str(answer, &["label_de"]).unwrap_or_default();
                    let answer_id = answers.intern(&value, label, label_de);
                    links.push(QuestionItemAnswer::new(ids, item.id, answer_id, position as i64));
                }
            }
            items.push(item);
        }

        build.questions.push(question);
        build.items.extend(items);
        build.links.extend(links);
        Ok(())
    }
}

#[async_trait]
impl Importer for InstrumentImport {
    fn entity(&self) -> &'static str {
        "instruments"
    }

    async fn import(&self, ctx: &ImportContext, study: &Study, path: &Path) -> Result<ImportReport, ImportError> {
        let mut record = read_json_object(path)?;
        rename_json_keys(&mut record);

        let name = json_str(&record, &["instrument", "name"])
            .map(str::to_string)
            .or_else(|| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .ok_or_else(|| ImportError::missing_field("instruments", "instrument"))?;

        let id = ctx.ids.child(study.id, &name);
        let mut instrument = ctx
            .existing_or(id, || Instrument::new(&ctx.ids, study.id, &name))
            .await?;
        if let Some(v) = json_str(&record, &["label"]) {
            instrument.label = v.to_string();
        }
        if let Some(v) = json_str(&record, &["label_de"]) {
            instrument.label_de = v.to_string();
        }
        if let Some(v) = json_str(&record, &["description"]) {
            instrument.description = v.to_string();
        }
        if let Some(v) = json_str(&record, &["type", "kind"]) {
            instrument.kind = v.to_string();
        }
        if let Some(v) = json_str(&record, &["mode"]) {
            instrument.mode = v.to_string();
        }
        instrument.period_id = Some(ctx.period(study, json_str(&record, &["period"])).await?);
        instrument.analysis_unit_id = Some(ctx.analysis_unit(study, json_str(&record, &["analysis_unit"])).await?);
        instrument.validate()?;

        let questions = match record.get("questions") {
            None | Some(Value::Null) => Vec::new(),
            Some(value) => json_records(value.clone()).ok_or_else(|| {
                ImportError::row("instruments", format!("questions of '{}' are not objects", name))
            })?,
        };

        let mut report = ImportReport::default();
        let mut answers = AnswerDeduplicator::new(ctx.ids.clone());
        let mut build = InstrumentBuild::default();
        for (index, question) in questions.iter().enumerate() {
            if let Err(e) = Self::question(&ctx.ids, instrument.id, question, index as i64, &mut answers, &mut build) {
                let record = Value::Object(question.clone());
                warn!(
                    study = %study.name,
                    entity = "instruments",
                    instrument = %name,
                    record = %record,
                    error = %e,
                    "Question import failed"
                );
                report.failed += 1;
            }
        }

        debug!(instrument = %name, answers = answers.len(), items = build.items.len(), "Instrument built");

        let mut batch = WriteBatch::new();
        batch.upsert(Instrument::table(), to_records(std::slice::from_ref(&instrument))?);
        batch.upsert(Question::table(), to_records(&build.questions)?);
        batch.upsert(QuestionItem::table(), to_records(&build.items)?);
        batch.upsert(Answer::table(), to_records(&answers.into_answers())?);
        batch.upsert(QuestionItemAnswer::table(), to_records(&build.links)?);
        ctx.store.write(batch).await?;

        ctx.changed(&instrument);
        for question in &build.questions {
            ctx.changed(question);
        }

        report.imported = 1 + build.questions.len();
        info!(
            study = %study.name,
            entity = "instruments",
            instrument = %name,
            questions = build.questions.len(),
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
    fn test_answers_shared_by_content() {
        let ids = Arc::new(IdDeriver::new(Uuid::nil()));
        let mut answers = AnswerDeduplicator::new(ids.clone());

        let yes = answers.intern("1", "yes", "ja");
        let again = answers.intern("1", "yes", "ja");
        let other = answers.intern("1", "yes", "");

        assert_eq!(yes, again);
        assert_ne!(yes, other);
        assert_eq!(answers.len(), 2);
        assert_eq!(yes, ids.answer("1", "yes", "ja"));
    }
}
