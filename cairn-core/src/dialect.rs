use std::fmt::Debug;

use crate::{
    ColumnDefinition, ConstraintDefinition, ConstraintKind, DeleteDefinition, DialectError,
    ExistsCheck, IndexDefinition, InsertDefinition, SelectDefinition, Statement, TableDefinition,
    UpdateDefinition,
};

/// Translation of schema and data definitions into engine specific SQL.
///
/// Dialects are stateless. Naming, quoting and clustering capability are
/// facts supplied by the dialect, the definitions never hardcode them.
/// Renderers an engine cannot express return [`DialectError::Unsupported`].
pub trait SqlDialect: Send + Sync + Debug {
    fn provider_name(&self) -> &'static str;

    fn supports_clustered_index(&self) -> bool;

    fn max_identifier_length(&self) -> usize {
        63
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// Name used when the constraint does not carry an explicit one.
    fn constraint_name(&self, constraint: &ConstraintDefinition) -> String {
        if let Some(name) = &constraint.name {
            return name.clone();
        }

        let name = match &constraint.kind {
            ConstraintKind::PrimaryKey => format!("PK_{}", constraint.table),
            ConstraintKind::Unique => {
                format!("UQ_{}_{}", constraint.table, constraint.columns.join("_"))
            }
            ConstraintKind::ForeignKey {
                referenced_table,
                referenced_columns,
                ..
            } => format!(
                "FK_{}_{}_{}",
                constraint.table,
                referenced_table,
                referenced_columns.join("_")
            ),
        };

        truncate_identifier(&name, self.max_identifier_length())
    }

    fn index_name(&self, index: &IndexDefinition) -> String {
        match &index.name {
            Some(name) => name.clone(),
            None => truncate_identifier(
                &format!("IX_{}_{}", index.table, index.columns.join("_")),
                self.max_identifier_length(),
            ),
        }
    }

    fn unsupported(&self, operation: &str) -> DialectError {
        DialectError::Unsupported {
            provider: self.provider_name(),
            operation: operation.to_owned(),
        }
    }

    fn create_table(&self, table: &TableDefinition) -> Result<Vec<Statement>, DialectError> {
        let _ = table;
        Err(self.unsupported("create table"))
    }

    fn add_column(
        &self,
        table: &str,
        column: &ColumnDefinition,
    ) -> Result<Vec<Statement>, DialectError> {
        let _ = (table, column);
        Err(self.unsupported("add column"))
    }

    fn create_constraint(
        &self,
        constraint: &ConstraintDefinition,
    ) -> Result<Vec<Statement>, DialectError> {
        let _ = constraint;
        Err(self.unsupported("create constraint"))
    }

    fn create_index(&self, index: &IndexDefinition) -> Result<Vec<Statement>, DialectError> {
        let _ = index;
        Err(self.unsupported("create index"))
    }

    fn drop_table(&self, table: &str, if_exists: bool) -> Result<Statement, DialectError> {
        let _ = (table, if_exists);
        Err(self.unsupported("drop table"))
    }

    /// Always a single statement, whatever the filter.
    fn delete(&self, delete: &DeleteDefinition) -> Result<Statement, DialectError> {
        let _ = delete;
        Err(self.unsupported("delete"))
    }

    fn insert(&self, insert: &InsertDefinition) -> Result<Statement, DialectError> {
        let _ = insert;
        Err(self.unsupported("insert"))
    }

    fn update(&self, update: &UpdateDefinition) -> Result<Statement, DialectError> {
        let _ = update;
        Err(self.unsupported("update"))
    }

    fn select(&self, select: &SelectDefinition) -> Result<Statement, DialectError> {
        let _ = select;
        Err(self.unsupported("select"))
    }

    /// Renders a statement whose first row's first column is a count.
    fn exists(&self, check: &ExistsCheck) -> Result<Statement, DialectError>;
}

/// Cuts `name` down to `max` bytes on a character boundary.
pub fn truncate_identifier(name: &str, max: usize) -> String {
    if name.len() <= max {
        return name.to_owned();
    }

    let mut end = max;
    while !name.is_char_boundary(end) {
        end -= 1;
    }

    name[..end].to_owned()
}
