use cairn_core::{
    ColumnDefinition, ConstraintDefinition, ConstraintKind, DeleteDefinition, DialectError,
    ExistsCheck, IndexDefinition, InsertDefinition, SelectDefinition, SqlDialect, Statement,
    TableDefinition, UpdateDefinition,
};
use sea_query::{ForeignKey, PostgresQueryBuilder, Table};

use super::{alias, build, column_def, foreign_key_action};

/// PostgreSQL supports every definition. Clustering is a one-off physical
/// reorder (`CLUSTER ... USING`) issued after the index exists.
#[derive(Debug, Default, Clone, Copy)]
pub struct PostgresDialect;

impl PostgresDialect {
    fn column_list(&self, columns: &[String]) -> String {
        columns
            .iter()
            .map(|c| self.quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn cluster(&self, table: &str, index: &str) -> Statement {
        Statement::new(format!(
            "CLUSTER {} USING {}",
            self.quote_identifier(table),
            self.quote_identifier(index)
        ))
    }
}

impl SqlDialect for PostgresDialect {
    fn provider_name(&self) -> &'static str {
        "postgres"
    }

    fn supports_clustered_index(&self) -> bool {
        true
    }

    fn create_table(&self, table: &TableDefinition) -> Result<Vec<Statement>, DialectError> {
        let stmt = super::table_create(self, table)?;
        Ok(vec![Statement::new(stmt.to_string(PostgresQueryBuilder))])
    }

    fn add_column(
        &self,
        table: &str,
        column: &ColumnDefinition,
    ) -> Result<Vec<Statement>, DialectError> {
        let mut def = column_def(column, true);
        let stmt = Table::alter()
            .table(alias(table))
            .add_column(&mut def)
            .to_owned();

        Ok(vec![Statement::new(stmt.to_string(PostgresQueryBuilder))])
    }

    fn create_constraint(
        &self,
        constraint: &ConstraintDefinition,
    ) -> Result<Vec<Statement>, DialectError> {
        if constraint.columns.is_empty() {
            return Err(DialectError::Invalid(format!(
                "constraint on {} has no columns",
                constraint.table
            )));
        }

        let name = self.constraint_name(constraint);
        let table = self.quote_identifier(&constraint.table);

        let add = match &constraint.kind {
            ConstraintKind::PrimaryKey => Statement::new(format!(
                "ALTER TABLE {table} ADD CONSTRAINT {} PRIMARY KEY ({})",
                self.quote_identifier(&name),
                self.column_list(&constraint.columns)
            )),
            ConstraintKind::Unique => Statement::new(format!(
                "ALTER TABLE {table} ADD CONSTRAINT {} UNIQUE ({})",
                self.quote_identifier(&name),
                self.column_list(&constraint.columns)
            )),
            ConstraintKind::ForeignKey {
                referenced_table,
                referenced_columns,
                on_delete,
            } => {
                let mut fk = ForeignKey::create();
                fk.name(&name)
                    .from_tbl(alias(&constraint.table))
                    .to_tbl(alias(referenced_table))
                    .on_delete(foreign_key_action(*on_delete));
                for column in &constraint.columns {
                    fk.from_col(alias(column));
                }
                for column in referenced_columns {
                    fk.to_col(alias(column));
                }

                Statement::new(fk.to_string(PostgresQueryBuilder))
            }
        };

        let mut statements = vec![add];
        if constraint.clustered && !matches!(constraint.kind, ConstraintKind::ForeignKey { .. }) {
            statements.push(self.cluster(&constraint.table, &name));
        }

        Ok(statements)
    }

    fn create_index(&self, index: &IndexDefinition) -> Result<Vec<Statement>, DialectError> {
        let stmt = super::index_create(self, index);
        let mut statements = vec![Statement::new(stmt.to_string(PostgresQueryBuilder))];
        if index.clustered {
            statements.push(self.cluster(&index.table, &self.index_name(index)));
        }

        Ok(statements)
    }

    fn drop_table(&self, table: &str, if_exists: bool) -> Result<Statement, DialectError> {
        let mut stmt = Table::drop();
        stmt.table(alias(table));
        if if_exists {
            stmt.if_exists();
        }

        Ok(Statement::new(stmt.to_string(PostgresQueryBuilder)))
    }

    fn delete(&self, delete: &DeleteDefinition) -> Result<Statement, DialectError> {
        build(&super::delete(delete)?, PostgresQueryBuilder)
    }

    fn insert(&self, insert: &InsertDefinition) -> Result<Statement, DialectError> {
        build(&super::insert(insert)?, PostgresQueryBuilder)
    }

    fn update(&self, update: &UpdateDefinition) -> Result<Statement, DialectError> {
        build(&super::update(update)?, PostgresQueryBuilder)
    }

    fn select(&self, select: &SelectDefinition) -> Result<Statement, DialectError> {
        build(&super::select(select), PostgresQueryBuilder)
    }

    fn exists(&self, check: &ExistsCheck) -> Result<Statement, DialectError> {
        Ok(match check {
            ExistsCheck::Table(table) => Statement::new(
                "SELECT COUNT(*) FROM information_schema.tables \
                 WHERE table_schema = current_schema() AND table_name = $1",
            )
            .bind(table.as_str()),
            ExistsCheck::Column { table, column } => Statement::new(
                "SELECT COUNT(*) FROM information_schema.columns \
                 WHERE table_schema = current_schema() AND table_name = $1 AND column_name = $2",
            )
            .bind(table.as_str())
            .bind(column.as_str()),
        })
    }
}
