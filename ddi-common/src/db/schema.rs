//! Declarative table definitions
//!
//! Every entity table is described once by a [`Table`]: its columns with
//! their storage kind, the natural key, extra unique keys and foreign keys.
//! The same definition drives `CREATE TABLE`, schema synchronization,
//! generic upserts and filters in both storage backends, and the cascade
//! walk on study removal.
//!
//! Every table has a `id` UUID primary key, added by [`Table::new`].

/// Storage kind of a column
///
/// Records carry values as JSON: UUIDs and timestamps as strings, JSON
/// columns as arbitrary values (stored serialized in SQLite).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Uuid,
    Text,
    Integer,
    Real,
    Boolean,
    Json,
    Timestamp,
}

impl ColumnKind {
    /// SQLite declared type
    pub fn sql_type(self) -> &'static str {
        match self {
            ColumnKind::Uuid | ColumnKind::Text | ColumnKind::Json | ColumnKind::Timestamp => "TEXT",
            ColumnKind::Integer | ColumnKind::Boolean => "INTEGER",
            ColumnKind::Real => "REAL",
        }
    }
}

/// Foreign key target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    /// Referenced table (always by its `id` column)
    pub table: &'static str,
}

/// One column of a table
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: &'static str,
    pub kind: ColumnKind,
    pub nullable: bool,
    pub default: Option<&'static str>,
    pub references: Option<ForeignKey>,
}

impl Column {
    fn new(name: &'static str, kind: ColumnKind) -> Self {
        Self {
            name,
            kind,
            nullable: true,
            default: None,
            references: None,
        }
    }

    pub fn uuid(name: &'static str) -> Self {
        Self::new(name, ColumnKind::Uuid)
    }

    /// Text column, `NOT NULL DEFAULT ''`
    pub fn text(name: &'static str) -> Self {
        Self::new(name, ColumnKind::Text).not_null().default("''")
    }

    /// Text column that may be NULL
    pub fn optional_text(name: &'static str) -> Self {
        Self::new(name, ColumnKind::Text)
    }

    pub fn integer(name: &'static str) -> Self {
        Self::new(name, ColumnKind::Integer)
    }

    pub fn real(name: &'static str) -> Self {
        Self::new(name, ColumnKind::Real)
    }

    pub fn boolean(name: &'static str) -> Self {
        Self::new(name, ColumnKind::Boolean).not_null().default("0")
    }

    /// JSON column, `NOT NULL DEFAULT 'null'`
    pub fn json(name: &'static str) -> Self {
        Self::new(name, ColumnKind::Json).not_null().default("'null'")
    }

    pub fn timestamp(name: &'static str) -> Self {
        Self::new(name, ColumnKind::Timestamp)
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn default(mut self, value: &'static str) -> Self {
        self.default = Some(value);
        self
    }

    /// Reference `table(id)`
    pub fn references(mut self, table: &'static str) -> Self {
        self.references = Some(ForeignKey { table });
        self
    }

    fn ddl(&self) -> String {
        let mut sql = format!("{} {}", self.name, self.kind.sql_type());
        if self.name == "id" {
            sql.push_str(" PRIMARY KEY");
        }
        if !self.nullable {
            sql.push_str(" NOT NULL");
        }
        if let Some(default) = self.default {
            sql.push_str(&format!(" DEFAULT {}", default));
        }
        if let Some(fk) = &self.references {
            sql.push_str(&format!(" REFERENCES {}(id)", fk.table));
        }
        sql
    }
}

/// Declarative definition of one entity table
#[derive(Debug, Clone)]
pub struct Table {
    pub name: &'static str,
    pub columns: Vec<Column>,
    /// Human-meaningful unique key the derived id is computed from
    pub natural_key: Vec<&'static str>,
    /// Additional unique constraints
    pub unique_keys: Vec<Vec<&'static str>>,
}

impl Table {
    /// Start a table with its `id` primary key
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            columns: vec![Column::uuid("id").not_null()],
            natural_key: Vec::new(),
            unique_keys: Vec::new(),
        }
    }

    pub fn column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    /// Natural key; also enforced as a unique constraint
    pub fn natural_key(mut self, columns: &[&'static str]) -> Self {
        self.natural_key = columns.to_vec();
        self.unique_keys.push(columns.to_vec());
        self
    }

    pub fn unique(mut self, columns: &[&'static str]) -> Self {
        self.unique_keys.push(columns.to_vec());
        self
    }

    /// Look up a column by name
    pub fn get_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.get_column(name).is_some()
    }

    /// Column names in declaration order
    pub fn column_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.columns.iter().map(|c| c.name)
    }

    /// Columns carrying a foreign key
    pub fn foreign_keys(&self) -> impl Iterator<Item = (&Column, &ForeignKey)> + '_ {
        self.columns
            .iter()
            .filter_map(|c| c.references.as_ref().map(|fk| (c, fk)))
    }

    /// True when some column of this table references `table`
    pub fn references_table(&self, table: &str) -> bool {
        self.foreign_keys().any(|(_, fk)| fk.table == table)
    }

    /// `CREATE TABLE IF NOT EXISTS` statement
    pub fn create_table_sql(&self) -> String {
        let mut parts: Vec<String> = self.columns.iter().map(Column::ddl).collect();
        for key in &self.unique_keys {
            parts.push(format!("UNIQUE ({})", key.join(", ")));
        }
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
            self.name,
            parts.join(",\n    ")
        )
    }

    /// `CREATE INDEX IF NOT EXISTS` statements for every foreign key column
    pub fn create_index_sql(&self) -> Vec<String> {
        self.foreign_keys()
            .map(|(column, _)| {
                format!(
                    "CREATE INDEX IF NOT EXISTS idx_{}_{} ON {}({})",
                    self.name, column.name, self.name, column.name
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        Table::new("variables")
            .column(Column::uuid("dataset_id").not_null().references("datasets"))
            .column(Column::text("name"))
            .column(Column::uuid("concept_id").references("concepts"))
            .column(Column::json("categories"))
            .natural_key(&["dataset_id", "name"])
    }

    #[test]
    fn test_create_table_sql() {
        let sql = sample().create_table_sql();
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS variables"));
        assert!(sql.contains("id TEXT PRIMARY KEY NOT NULL"));
        assert!(sql.contains("dataset_id TEXT NOT NULL REFERENCES datasets(id)"));
        assert!(sql.contains("concept_id TEXT REFERENCES concepts(id)"));
        assert!(sql.contains("categories TEXT NOT NULL DEFAULT 'null'"));
        assert!(sql.contains("UNIQUE (dataset_id, name)"));
    }

    #[test]
    fn test_foreign_key_indexes() {
        let indexes = sample().create_index_sql();
        assert_eq!(indexes.len(), 2);
        assert!(indexes[0].contains("idx_variables_dataset_id"));
    }

    #[test]
    fn test_column_flags() {
        let table = sample();
        assert_eq!(table.columns[0].name, "id");
        assert!(!table.columns[1].nullable);
        assert!(table.columns[3].nullable);
        assert_eq!(table.columns[4].default, Some("'null'"));
        assert!(table.references_table("concepts"));
        assert!(!table.references_table("studies"));
    }
}
