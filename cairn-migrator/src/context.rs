use std::sync::Arc;

use cairn_core::{
    DeleteDefinition, ExistsCheck, Row, Scope, ScopeError, SelectDefinition, SqlDialect,
    SqlValue, Statement,
};

use crate::Expression;

/// What a migration body sees: the scope it runs in, rendering through that
/// scope's dialect.
pub struct MigrationContext<'a> {
    scope: &'a Scope,
    name: &'a str,
}

impl<'a> MigrationContext<'a> {
    pub fn new(scope: &'a Scope, name: &'a str) -> Self {
        Self { scope, name }
    }

    /// The migration being applied.
    pub fn name(&self) -> &str {
        self.name
    }

    pub fn scope(&self) -> &Scope {
        self.scope
    }

    pub fn dialect(&self) -> Arc<dyn SqlDialect> {
        self.scope.dialect()
    }

    /// Renders and runs an expression now. Returns the affected row count.
    pub async fn execute(&self, expression: impl Into<Expression>) -> Result<u64, ScopeError> {
        let expression = expression.into();
        let statements = expression.render(self.dialect().as_ref())?;
        tracing::trace!(migration = self.name, statements = statements.len(), "executing expression");

        self.scope.execute_all(&statements).await
    }

    pub async fn table_exists(&self, table: &str) -> Result<bool, ScopeError> {
        self.scope.exists(&ExistsCheck::table(table)).await
    }

    pub async fn column_exists(&self, table: &str, column: &str) -> Result<bool, ScopeError> {
        self.scope.exists(&ExistsCheck::column(table, column)).await
    }

    pub async fn select(&self, select: &SelectDefinition) -> Result<Vec<Row>, ScopeError> {
        let statement = self.dialect().select(select)?;
        self.scope.fetch_all(&statement).await
    }

    pub async fn fetch_all(&self, statement: &Statement) -> Result<Vec<Row>, ScopeError> {
        self.scope.fetch_all(statement).await
    }

    /// Starts a delete on `table`. The terminal calls run it immediately.
    pub fn delete_data(&self, table: impl Into<String>) -> DeleteData<'_, 'a> {
        DeleteData {
            ctx: self,
            definition: DeleteDefinition::new(table),
        }
    }
}

/// Delete builder bound to a running migration.
#[must_use = "rows are only deleted by all_rows, is_null or execute"]
pub struct DeleteData<'c, 'a> {
    ctx: &'c MigrationContext<'a>,
    definition: DeleteDefinition,
}

impl DeleteData<'_, '_> {
    pub async fn all_rows(self) -> Result<u64, ScopeError> {
        let definition = self.definition.all_rows();
        self.ctx.execute(definition).await
    }

    pub async fn is_null(self, column: impl Into<String>) -> Result<u64, ScopeError> {
        let definition = self.definition.is_null(column);
        self.ctx.execute(definition).await
    }

    pub fn row<I, K, V>(mut self, pattern: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<SqlValue>,
    {
        self.definition = self.definition.row(pattern);
        self
    }

    pub async fn execute(self) -> Result<u64, ScopeError> {
        self.ctx.execute(self.definition).await
    }
}
