//! Table definitions for every catalog entity
//!
//! [`all_tables`] lists them parents first; table creation follows that
//! order and cascade deletes run it backwards.

use super::schema::{Column, Table};
use once_cell::sync::Lazy;

// ============================================================================
// Studies and repositories
// ============================================================================

pub static STUDIES: Lazy<Table> = Lazy::new(|| {
    Table::new("studies")
        .column(Column::text("name"))
        .column(Column::text("label"))
        .column(Column::text("label_de"))
        .column(Column::text("description"))
        .column(Column::text("doi"))
        .column(Column::text("repo"))
        .column(Column::optional_text("current_commit"))
        .column(Column::json("config"))
        .natural_key(&["name"])
});

/// Singleton row tracking the system repository
pub static SYSTEM: Lazy<Table> = Lazy::new(|| {
    Table::new("system")
        .column(Column::text("name"))
        .column(Column::text("repo"))
        .column(Column::optional_text("current_commit"))
        .natural_key(&["name"])
});

// ============================================================================
// Vocabulary
// ============================================================================

pub static TOPICS: Lazy<Table> = Lazy::new(|| {
    Table::new("topics")
        .column(Column::uuid("study_id").not_null().references("studies"))
        .column(Column::text("name"))
        .column(Column::text("label"))
        .column(Column::text("label_de"))
        .column(Column::text("description"))
        .column(Column::text("description_de"))
        .column(Column::uuid("parent_id").references("topics"))
        .natural_key(&["study_id", "name"])
});

pub static CONCEPTS: Lazy<Table> = Lazy::new(|| {
    Table::new("concepts")
        .column(Column::text("name"))
        .column(Column::text("label"))
        .column(Column::text("label_de"))
        .column(Column::text("description"))
        .column(Column::text("description_de"))
        .natural_key(&["name"])
});

pub static CONCEPT_TOPICS: Lazy<Table> = Lazy::new(|| {
    Table::new("concept_topics")
        .column(Column::uuid("concept_id").not_null().references("concepts"))
        .column(Column::uuid("topic_id").not_null().references("topics"))
        .natural_key(&["concept_id", "topic_id"])
});

pub static PERIODS: Lazy<Table> = Lazy::new(|| {
    Table::new("periods")
        .column(Column::uuid("study_id").not_null().references("studies"))
        .column(Column::text("name"))
        .column(Column::text("label"))
        .column(Column::text("label_de"))
        .column(Column::text("description"))
        .column(Column::text("definition"))
        .natural_key(&["study_id", "name"])
});

pub static ANALYSIS_UNITS: Lazy<Table> = Lazy::new(|| {
    Table::new("analysis_units")
        .column(Column::uuid("study_id").not_null().references("studies"))
        .column(Column::text("name"))
        .column(Column::text("label"))
        .column(Column::text("label_de"))
        .column(Column::text("description"))
        .natural_key(&["study_id", "name"])
});

pub static CONCEPTUAL_DATASETS: Lazy<Table> = Lazy::new(|| {
    Table::new("conceptual_datasets")
        .column(Column::text("name"))
        .column(Column::text("label"))
        .column(Column::text("label_de"))
        .column(Column::text("description"))
        .natural_key(&["name"])
});

// ============================================================================
// Data
// ============================================================================

pub static DATASETS: Lazy<Table> = Lazy::new(|| {
    Table::new("datasets")
        .column(Column::uuid("study_id").not_null().references("studies"))
        .column(Column::text("name"))
        .column(Column::text("label"))
        .column(Column::text("label_de"))
        .column(Column::text("description"))
        .column(Column::text("folder"))
        .column(Column::json("primary_key"))
        .column(Column::uuid("period_id").references("periods"))
        .column(Column::uuid("analysis_unit_id").references("analysis_units"))
        .column(Column::uuid("conceptual_dataset_id").references("conceptual_datasets"))
        .natural_key(&["study_id", "name"])
});

pub static VARIABLES: Lazy<Table> = Lazy::new(|| {
    Table::new("variables")
        .column(Column::uuid("dataset_id").not_null().references("datasets"))
        .column(Column::text("name"))
        .column(Column::text("label"))
        .column(Column::text("label_de"))
        .column(Column::text("description"))
        .column(Column::text("description_long"))
        .column(Column::uuid("concept_id").references("concepts"))
        .column(Column::uuid("period_id").references("periods"))
        .column(Column::json("categories"))
        .column(Column::json("statistics"))
        .column(Column::text("scale"))
        .column(Column::integer("sort_id").not_null().default("0"))
        .column(Column::optional_text("image_url"))
        .natural_key(&["dataset_id", "name"])
});

pub static TRANSFORMATIONS: Lazy<Table> = Lazy::new(|| {
    Table::new("transformations")
        .column(Column::uuid("origin_id").not_null().references("variables"))
        .column(Column::uuid("target_id").not_null().references("variables"))
        .natural_key(&["origin_id", "target_id"])
});

// ============================================================================
// Instruments
// ============================================================================

pub static INSTRUMENTS: Lazy<Table> = Lazy::new(|| {
    Table::new("instruments")
        .column(Column::uuid("study_id").not_null().references("studies"))
        .column(Column::text("name"))
        .column(Column::text("label"))
        .column(Column::text("label_de"))
        .column(Column::text("description"))
        .column(Column::text("kind"))
        .column(Column::text("mode"))
        .column(Column::uuid("period_id").references("periods"))
        .column(Column::uuid("analysis_unit_id").references("analysis_units"))
        .natural_key(&["study_id", "name"])
});

pub static QUESTIONS: Lazy<Table> = Lazy::new(|| {
    Table::new("questions")
        .column(Column::uuid("instrument_id").not_null().references("instruments"))
        .column(Column::text("name"))
        .column(Column::text("label"))
        .column(Column::text("label_de"))
        .column(Column::text("description"))
        .column(Column::text("instruction"))
        .column(Column::integer("sort_id").not_null().default("0"))
        .natural_key(&["instrument_id", "name"])
});

pub static QUESTION_ITEMS: Lazy<Table> = Lazy::new(|| {
    Table::new("question_items")
        .column(Column::uuid("question_id").not_null().references("questions"))
        .column(Column::text("name"))
        .column(Column::text("label"))
        .column(Column::text("label_de"))
        .column(Column::text("scale"))
        .column(Column::integer("sort_id").not_null().default("0"))
        .natural_key(&["question_id", "name"])
});

pub static ANSWERS: Lazy<Table> = Lazy::new(|| {
    Table::new("answers")
        .column(Column::text("value"))
        .column(Column::text("label"))
        .column(Column::text("label_de"))
        .natural_key(&["value", "label", "label_de"])
});

pub static QUESTION_ITEM_ANSWERS: Lazy<Table> = Lazy::new(|| {
    Table::new("question_item_answers")
        .column(Column::uuid("question_item_id").not_null().references("question_items"))
        .column(Column::uuid("answer_id").not_null().references("answers"))
        .column(Column::integer("sort_id").not_null().default("0"))
        .natural_key(&["question_item_id", "answer_id"])
});

pub static QUESTIONS_VARIABLES: Lazy<Table> = Lazy::new(|| {
    Table::new("questions_variables")
        .column(Column::uuid("question_id").not_null().references("questions"))
        .column(Column::uuid("variable_id").not_null().references("variables"))
        .natural_key(&["question_id", "variable_id"])
});

pub static CONCEPTS_QUESTIONS: Lazy<Table> = Lazy::new(|| {
    Table::new("concepts_questions")
        .column(Column::uuid("concept_id").not_null().references("concepts"))
        .column(Column::uuid("question_id").not_null().references("questions"))
        .natural_key(&["concept_id", "question_id"])
});

// ============================================================================
// Publications
// ============================================================================

pub static PUBLICATIONS: Lazy<Table> = Lazy::new(|| {
    Table::new("publications")
        .column(Column::uuid("study_id").not_null().references("studies"))
        .column(Column::text("name"))
        .column(Column::text("sub_type"))
        .column(Column::text("title"))
        .column(Column::text("author"))
        .column(Column::integer("year"))
        .column(Column::text("abstract_text"))
        .column(Column::text("cite"))
        .column(Column::text("url"))
        .column(Column::text("doi"))
        .column(Column::text("studies"))
        .natural_key(&["study_id", "name"])
});

/// Generic link from a study context to any entity; `target_id` is untyped
pub static ATTACHMENTS: Lazy<Table> = Lazy::new(|| {
    Table::new("attachments")
        .column(Column::uuid("context_study_id").not_null().references("studies"))
        .column(Column::text("target_type"))
        .column(Column::uuid("target_id"))
        .column(Column::text("url"))
        .column(Column::text("url_text"))
});

// ============================================================================
// Workspace
// ============================================================================

pub static USERS: Lazy<Table> = Lazy::new(|| {
    Table::new("users")
        .column(Column::text("username"))
        .natural_key(&["username"])
});

pub static BASKETS: Lazy<Table> = Lazy::new(|| {
    Table::new("baskets")
        .column(Column::uuid("user_id").not_null().references("users"))
        .column(Column::uuid("study_id").not_null().references("studies"))
        .column(Column::text("name"))
        .column(Column::text("label"))
        .column(Column::text("description"))
        .natural_key(&["user_id", "name"])
});

pub static BASKET_VARIABLES: Lazy<Table> = Lazy::new(|| {
    Table::new("basket_variables")
        .column(Column::uuid("basket_id").not_null().references("baskets"))
        .column(Column::uuid("variable_id").not_null().references("variables"))
        .natural_key(&["basket_id", "variable_id"])
});

pub static SCRIPTS: Lazy<Table> = Lazy::new(|| {
    Table::new("scripts")
        .column(Column::uuid("basket_id").not_null().references("baskets"))
        .column(Column::text("name"))
        .column(Column::text("label"))
        .column(Column::text("generator_name"))
        .column(Column::json("settings"))
        .natural_key(&["basket_id", "name"])
});

// ============================================================================
// Import bookkeeping
// ============================================================================

pub static IMPORT_RUNS: Lazy<Table> = Lazy::new(|| {
    Table::new("import_runs")
        .column(Column::uuid("study_id").references("studies"))
        .column(Column::text("study_name"))
        .column(Column::text("state"))
        .column(Column::json("jobs"))
        .column(Column::optional_text("commit_hash"))
        .column(Column::timestamp("started_at").not_null())
        .column(Column::timestamp("finished_at"))
});

/// Every table, parents before children
pub fn all_tables() -> Vec<&'static Table> {
    vec![
        &*STUDIES,
        &*SYSTEM,
        &*TOPICS,
        &*CONCEPTS,
        &*CONCEPT_TOPICS,
        &*PERIODS,
        &*ANALYSIS_UNITS,
        &*CONCEPTUAL_DATASETS,
        &*DATASETS,
        &*VARIABLES,
        &*TRANSFORMATIONS,
        &*INSTRUMENTS,
        &*QUESTIONS,
        &*QUESTION_ITEMS,
        &*ANSWERS,
        &*QUESTION_ITEM_ANSWERS,
        &*QUESTIONS_VARIABLES,
        &*CONCEPTS_QUESTIONS,
        &*PUBLICATIONS,
        &*ATTACHMENTS,
        &*USERS,
        &*BASKETS,
        &*BASKET_VARIABLES,
        &*SCRIPTS,
        &*IMPORT_RUNS,
    ]
}

/// Look up a table definition by name
pub fn table_by_name(name: &str) -> Option<&'static Table> {
    all_tables().into_iter().find(|t| t.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parents_precede_children() {
        let tables = all_tables();
        for (position, table) in tables.iter().enumerate() {
            for (column, fk) in table.foreign_keys() {
                if fk.table == table.name {
                    continue;
                }
                let parent = tables
                    .iter()
                    .position(|t| t.name == fk.table)
                    .unwrap_or_else(|| panic!("{}.{} references unknown table", table.name, column.name));
                assert!(parent < position, "{} must follow {}", table.name, fk.table);
            }
        }
    }

    #[test]
    fn test_table_lookup() {
        assert_eq!(table_by_name("variables").map(|t| t.name), Some("variables"));
        assert!(table_by_name("passages").is_none());
    }
}
