//! Declarative schema and data changes.
//!
//! An [`Expression`] is an immutable value built with the definition
//! builders of `cairn-core` and rendered once against a dialect.

use cairn_core::{
    ColumnDefinition, ConstraintDefinition, DeleteDefinition, DialectError, IndexDefinition,
    InsertDefinition, SqlDialect, Statement, TableDefinition, UpdateDefinition,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    CreateTable(TableDefinition),
    AddColumn {
        table: String,
        column: ColumnDefinition,
    },
    CreateConstraint(ConstraintDefinition),
    CreateIndex(IndexDefinition),
    DropTable {
        table: String,
        if_exists: bool,
    },
    DeleteData(DeleteDefinition),
    Insert(InsertDefinition),
    Update(UpdateDefinition),
    /// Hand written SQL, passed through untouched.
    Execute(Statement),
}

impl Expression {
    pub fn add_column(table: impl Into<String>, column: ColumnDefinition) -> Self {
        Expression::AddColumn {
            table: table.into(),
            column,
        }
    }

    pub fn drop_table(table: impl Into<String>) -> Self {
        Expression::DropTable {
            table: table.into(),
            if_exists: false,
        }
    }

    pub fn drop_table_if_exists(table: impl Into<String>) -> Self {
        Expression::DropTable {
            table: table.into(),
            if_exists: true,
        }
    }

    pub fn render(&self, dialect: &dyn SqlDialect) -> Result<Vec<Statement>, DialectError> {
        match self {
            Expression::CreateTable(table) => dialect.create_table(table),
            Expression::AddColumn { table, column } => dialect.add_column(table, column),
            Expression::CreateConstraint(constraint) => dialect.create_constraint(constraint),
            Expression::CreateIndex(index) => dialect.create_index(index),
            Expression::DropTable { table, if_exists } => {
                Ok(vec![dialect.drop_table(table, *if_exists)?])
            }
            Expression::DeleteData(delete) => Ok(vec![dialect.delete(delete)?]),
            Expression::Insert(insert) => Ok(vec![dialect.insert(insert)?]),
            Expression::Update(update) => Ok(vec![dialect.update(update)?]),
            Expression::Execute(statement) => Ok(vec![statement.clone()]),
        }
    }
}

impl From<TableDefinition> for Expression {
    fn from(value: TableDefinition) -> Self {
        Expression::CreateTable(value)
    }
}

impl From<ConstraintDefinition> for Expression {
    fn from(value: ConstraintDefinition) -> Self {
        Expression::CreateConstraint(value)
    }
}

impl From<IndexDefinition> for Expression {
    fn from(value: IndexDefinition) -> Self {
        Expression::CreateIndex(value)
    }
}

impl From<DeleteDefinition> for Expression {
    fn from(value: DeleteDefinition) -> Self {
        Expression::DeleteData(value)
    }
}

impl From<InsertDefinition> for Expression {
    fn from(value: InsertDefinition) -> Self {
        Expression::Insert(value)
    }
}

impl From<UpdateDefinition> for Expression {
    fn from(value: UpdateDefinition) -> Self {
        Expression::Update(value)
    }
}

impl From<Statement> for Expression {
    fn from(value: Statement) -> Self {
        Expression::Execute(value)
    }
}
