use cairn_core::{
    ColumnDefinition, ConstraintDefinition, ConstraintKind, DeleteDefinition, DialectError,
    ExistsCheck, IndexDefinition, InsertDefinition, SelectDefinition, SqlDialect, Statement,
    TableDefinition, UpdateDefinition,
};
use sea_query::{SqliteQueryBuilder, Table};

use super::{alias, build, column_def};

/// SQLite has no clustered indexes and cannot add primary or foreign keys
/// to an existing table.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteDialect;

impl SqlDialect for SqliteDialect {
    fn provider_name(&self) -> &'static str {
        "sqlite"
    }

    fn supports_clustered_index(&self) -> bool {
        false
    }

    fn max_identifier_length(&self) -> usize {
        128
    }

    fn create_table(&self, table: &TableDefinition) -> Result<Vec<Statement>, DialectError> {
        let stmt = super::table_create(self, table)?;
        Ok(vec![Statement::new(stmt.to_string(SqliteQueryBuilder))])
    }

    fn add_column(
        &self,
        table: &str,
        column: &ColumnDefinition,
    ) -> Result<Vec<Statement>, DialectError> {
        if column.primary_key || column.unique {
            return Err(self.unsupported("adding a primary key or unique column"));
        }

        let mut def = column_def(column, false);
        let stmt = Table::alter()
            .table(alias(table))
            .add_column(&mut def)
            .to_owned();

        Ok(vec![Statement::new(stmt.to_string(SqliteQueryBuilder))])
    }

    fn create_constraint(
        &self,
        constraint: &ConstraintDefinition,
    ) -> Result<Vec<Statement>, DialectError> {
        match constraint.kind {
            ConstraintKind::Unique => {
                let index = IndexDefinition::new(&constraint.table, constraint.columns.clone())
                    .named(self.constraint_name(constraint))
                    .unique();
                self.create_index(&index)
            }
            ConstraintKind::PrimaryKey => Err(self.unsupported("adding a primary key")),
            ConstraintKind::ForeignKey { .. } => Err(self.unsupported("adding a foreign key")),
        }
    }

    fn create_index(&self, index: &IndexDefinition) -> Result<Vec<Statement>, DialectError> {
        let stmt = super::index_create(self, index);
        Ok(vec![Statement::new(stmt.to_string(SqliteQueryBuilder))])
    }

    fn drop_table(&self, table: &str, if_exists: bool) -> Result<Statement, DialectError> {
        let mut stmt = Table::drop();
        stmt.table(alias(table));
        if if_exists {
            stmt.if_exists();
        }

        Ok(Statement::new(stmt.to_string(SqliteQueryBuilder)))
    }

    fn delete(&self, delete: &DeleteDefinition) -> Result<Statement, DialectError> {
        build(&super::delete(delete)?, SqliteQueryBuilder)
    }

    fn insert(&self, insert: &InsertDefinition) -> Result<Statement, DialectError> {
        build(&super::insert(insert)?, SqliteQueryBuilder)
    }

    fn update(&self, update: &UpdateDefinition) -> Result<Statement, DialectError> {
        build(&super::update(update)?, SqliteQueryBuilder)
    }

    fn select(&self, select: &SelectDefinition) -> Result<Statement, DialectError> {
        build(&super::select(select), SqliteQueryBuilder)
    }

    fn exists(&self, check: &ExistsCheck) -> Result<Statement, DialectError> {
        Ok(match check {
            ExistsCheck::Table(table) => Statement::new(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
            )
            .bind(table.as_str()),
            ExistsCheck::Column { table, column } => {
                Statement::new("SELECT COUNT(*) FROM pragma_table_info(?) WHERE name = ?")
                    .bind(table.as_str())
                    .bind(column.as_str())
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use cairn_core::{ColumnType, DeleteDefinition, ForeignKeyAction, SqlValue};

    use super::*;

    fn group_table() -> TableDefinition {
        TableDefinition::new("cairn_property_type_group")
            .column(
                ColumnDefinition::new("id", ColumnType::Integer)
                    .primary_key()
                    .identity(),
            )
            .column(ColumnDefinition::new("text", ColumnType::Text(Some(255))))
            .column(ColumnDefinition::new("alias", ColumnType::Text(Some(255))).nullable())
    }

    #[test]
    fn create_table_inlines_identity_primary_key() {
        let statements = SqliteDialect.create_table(&group_table()).unwrap();
        assert_eq!(statements.len(), 1);

        let sql = &statements[0].sql;
        assert!(sql.starts_with(r#"CREATE TABLE "cairn_property_type_group""#), "{sql}");
        assert!(sql.contains(r#""id" integer"#), "{sql}");
        assert!(sql.contains("PRIMARY KEY AUTOINCREMENT"), "{sql}");
        assert!(sql.contains(r#""alias" varchar(255) NULL"#), "{sql}");
    }

    #[test]
    fn composite_primary_key_is_named() {
        let table = TableDefinition::new("cairn_node_lock")
            .if_not_exists()
            .column(ColumnDefinition::new("node_id", ColumnType::Integer).primary_key())
            .column(ColumnDefinition::new("user_id", ColumnType::Integer).primary_key());

        let sql = &SqliteDialect.create_table(&table).unwrap()[0].sql;
        assert!(sql.contains("IF NOT EXISTS"), "{sql}");
        assert!(
            sql.contains(r#"CONSTRAINT "PK_cairn_node_lock" PRIMARY KEY ("node_id", "user_id")"#),
            "{sql}"
        );
    }

    #[test]
    fn unique_constraint_becomes_unique_index() {
        let constraint = ConstraintDefinition::unique("cairn_property_type_group", ["alias"]);
        let statements = SqliteDialect.create_constraint(&constraint).unwrap();
        assert_eq!(
            statements[0].sql,
            r#"CREATE UNIQUE INDEX "UQ_cairn_property_type_group_alias" ON "cairn_property_type_group" ("alias")"#
        );
    }

    #[test]
    fn keys_on_existing_tables_are_unsupported() {
        let fk = ConstraintDefinition::foreign_key("doc", ["node_id"], "node", ["id"])
            .on_delete(ForeignKeyAction::Cascade);
        assert!(matches!(
            SqliteDialect.create_constraint(&fk),
            Err(DialectError::Unsupported { provider: "sqlite", .. })
        ));

        let pk = ConstraintDefinition::primary_key("doc", ["id"]).clustered();
        assert!(SqliteDialect.create_constraint(&pk).is_err());
    }

    #[test]
    fn delete_compiles_to_one_statement_per_filter() {
        let all = SqliteDialect
            .delete(&DeleteDefinition::new("cairn_key_value").all_rows())
            .unwrap();
        assert_eq!(all.sql, r#"DELETE FROM "cairn_key_value""#);
        assert!(all.params.is_empty());

        let nulls = SqliteDialect
            .delete(&DeleteDefinition::new("cairn_property_type_group").is_null("alias"))
            .unwrap();
        assert_eq!(
            nulls.sql,
            r#"DELETE FROM "cairn_property_type_group" WHERE "alias" IS NULL"#
        );

        let rows = SqliteDialect
            .delete(
                &DeleteDefinition::new("cairn_key_value")
                    .row([("key", "site:name")])
                    .row([("key", "site:owner")]),
            )
            .unwrap();
        assert!(rows.sql.starts_with(r#"DELETE FROM "cairn_key_value" WHERE"#));
        assert!(rows.sql.contains(" OR "), "{}", rows.sql);
        assert_eq!(rows.sql.matches('?').count(), 2);
        assert_eq!(
            rows.params,
            vec![
                SqlValue::Text("site:name".into()),
                SqlValue::Text("site:owner".into())
            ]
        );

        assert!(SqliteDialect
            .delete(&DeleteDefinition::new("cairn_key_value"))
            .is_err());
    }

    #[test]
    fn update_and_select_are_parameterized() {
        let update = SqliteDialect
            .update(
                &UpdateDefinition::new("cairn_property_type_group")
                    .set("alias", "content")
                    .filter("id", 3),
            )
            .unwrap();
        assert_eq!(
            update.sql,
            r#"UPDATE "cairn_property_type_group" SET "alias" = ? WHERE "id" = ?"#
        );
        assert_eq!(
            update.params,
            vec![SqlValue::Text("content".into()), SqlValue::Int(3)]
        );

        let select = SqliteDialect
            .select(
                &SelectDefinition::new("cairn_property_type_group")
                    .columns(["id", "text"])
                    .order_by("id"),
            )
            .unwrap();
        assert_eq!(
            select.sql,
            r#"SELECT "id", "text" FROM "cairn_property_type_group" ORDER BY "id" ASC"#
        );
    }

    #[test]
    fn exists_checks_the_catalog() {
        let table = SqliteDialect
            .exists(&ExistsCheck::table("cairn_migration"))
            .unwrap();
        assert!(table.sql.contains("sqlite_master"));
        assert_eq!(table.params, vec![SqlValue::Text("cairn_migration".into())]);

        let column = SqliteDialect
            .exists(&ExistsCheck::column("cairn_property_type_group", "alias"))
            .unwrap();
        assert!(column.sql.contains("pragma_table_info"));
        assert_eq!(column.params.len(), 2);
    }
}
