//! sea-query backed dialects.
//!
//! The statement shapes are built once here; each engine only picks the
//! builder and fills in what the engine cannot do through sea-query.

mod postgres;
mod sqlite;

pub use postgres::PostgresDialect;
pub use sqlite::SqliteDialect;

use cairn_core::{
    ColumnDefinition, ColumnType, ConstraintDefinition, DeleteDefinition, DeleteFilter,
    DialectError, ForeignKeyAction, IndexDefinition, InsertDefinition, SelectDefinition,
    SqlDialect, SqlValue, Statement, TableDefinition, UpdateDefinition,
};
use sea_query::{
    Alias, Asterisk, ColumnDef, Cond, DeleteStatement, Expr, Index, IndexCreateStatement,
    InsertStatement, Order, Query, QueryBuilder, QueryStatementWriter, SelectStatement,
    SimpleExpr, Table, TableCreateStatement, UpdateStatement, Value, Values,
};

pub(crate) fn alias(name: &str) -> Alias {
    Alias::new(name)
}

pub(crate) fn value(value: &SqlValue) -> SimpleExpr {
    SimpleExpr::Value(match value {
        SqlValue::Null => Value::String(None),
        SqlValue::Int(v) => Value::BigInt(Some(*v)),
        SqlValue::Real(v) => Value::Double(Some(*v)),
        SqlValue::Bool(v) => Value::Bool(Some(*v)),
        SqlValue::Text(v) => Value::String(Some(Box::new(v.clone()))),
        SqlValue::Bytes(v) => Value::Bytes(Some(Box::new(v.clone()))),
    })
}

fn param(value: Value) -> Result<SqlValue, DialectError> {
    let value = match value {
        Value::Bool(v) => v.map(SqlValue::Bool),
        Value::BigInt(v) => v.map(SqlValue::Int),
        Value::Int(v) => v.map(|v| SqlValue::Int(v.into())),
        Value::Double(v) => v.map(SqlValue::Real),
        Value::String(v) => v.map(|v| SqlValue::Text(*v)),
        Value::Bytes(v) => v.map(|v| SqlValue::Bytes(*v)),
        other => {
            return Err(DialectError::Invalid(format!(
                "unsupported parameter {other:?}"
            )))
        }
    };

    Ok(value.unwrap_or(SqlValue::Null))
}

pub(crate) fn statement(sql: String, values: Values) -> Result<Statement, DialectError> {
    let params = values
        .0
        .into_iter()
        .map(param)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Statement::with_params(sql, params))
}

pub(crate) fn build<S, B>(query: &S, builder: B) -> Result<Statement, DialectError>
where
    S: QueryStatementWriter,
    B: QueryBuilder,
{
    let (sql, values) = query.build(builder);
    statement(sql, values)
}

pub(crate) fn column_def(column: &ColumnDefinition, inline_primary_key: bool) -> ColumnDef {
    let mut def = ColumnDef::new(alias(&column.name));

    match column.column_type {
        ColumnType::Integer => def.integer(),
        ColumnType::BigInteger => def.big_integer(),
        ColumnType::Text(Some(len)) => def.string_len(len),
        ColumnType::Text(None) => def.text(),
        ColumnType::Boolean => def.boolean(),
        ColumnType::DateTime => def.timestamp(),
        ColumnType::Double => def.double(),
        ColumnType::Binary => def.binary(),
    };

    if column.nullable {
        def.null();
    } else {
        def.not_null();
    }

    if inline_primary_key && column.primary_key {
        def.primary_key();
        if column.identity {
            def.auto_increment();
        }
    }

    if column.unique {
        def.unique_key();
    }

    if let Some(default) = &column.default {
        def.default(value(default));
    }

    def
}

pub(crate) fn table_create(
    dialect: &dyn SqlDialect,
    table: &TableDefinition,
) -> Result<TableCreateStatement, DialectError> {
    if table.columns.is_empty() {
        return Err(DialectError::Invalid(format!(
            "table {} has no columns",
            table.name
        )));
    }

    let primary_key: Vec<&str> = table
        .primary_key_columns()
        .map(|c| c.name.as_str())
        .collect();
    let inline = primary_key.len() == 1;

    let mut stmt = Table::create();
    stmt.table(alias(&table.name));
    if table.if_not_exists {
        stmt.if_not_exists();
    }

    for column in &table.columns {
        let mut def = column_def(column, inline);
        stmt.col(&mut def);
    }

    if primary_key.len() > 1 {
        let name =
            dialect.constraint_name(&ConstraintDefinition::primary_key(&table.name, primary_key.clone()));
        let mut pk = Index::create();
        pk.name(name);
        for column in primary_key {
            pk.col(alias(column));
        }
        stmt.primary_key(&mut pk);
    }

    Ok(stmt)
}

pub(crate) fn index_create(dialect: &dyn SqlDialect, index: &IndexDefinition) -> IndexCreateStatement {
    let mut stmt = Index::create();
    stmt.name(dialect.index_name(index)).table(alias(&index.table));
    for column in &index.columns {
        stmt.col(alias(column));
    }
    if index.unique {
        stmt.unique();
    }

    stmt
}

fn equals(filter: &[(String, SqlValue)]) -> Cond {
    filter.iter().fold(Cond::all(), |cond, (column, v)| {
        cond.add(Expr::col(alias(column)).eq(value(v)))
    })
}

pub(crate) fn delete(delete: &DeleteDefinition) -> Result<DeleteStatement, DialectError> {
    let mut stmt = Query::delete();
    stmt.from_table(alias(&delete.table));

    match &delete.filter {
        DeleteFilter::All => {}
        DeleteFilter::IsNull(column) => {
            stmt.and_where(Expr::col(alias(column)).is_null());
        }
        DeleteFilter::Rows(rows) if rows.is_empty() => {
            return Err(DialectError::Invalid(format!(
                "delete from {} matches no rows, use all_rows() to empty the table",
                delete.table
            )))
        }
        DeleteFilter::Rows(rows) => {
            let cond = rows
                .iter()
                .fold(Cond::any(), |cond, row| cond.add(equals(row)));
            stmt.cond_where(cond);
        }
    }

    Ok(stmt)
}

pub(crate) fn insert(insert: &InsertDefinition) -> Result<InsertStatement, DialectError> {
    if insert.rows.is_empty() {
        return Err(DialectError::Invalid(format!(
            "insert into {} has no rows",
            insert.table
        )));
    }

    let mut stmt = Query::insert();
    stmt.into_table(alias(&insert.table))
        .columns(insert.columns.iter().map(|c| alias(c)));

    for row in &insert.rows {
        stmt.values(row.iter().map(value))
            .map_err(|err| DialectError::Invalid(format!("insert into {}: {err}", insert.table)))?;
    }

    Ok(stmt)
}

pub(crate) fn update(update: &UpdateDefinition) -> Result<UpdateStatement, DialectError> {
    if update.assignments.is_empty() {
        return Err(DialectError::Invalid(format!(
            "update of {} sets nothing",
            update.table
        )));
    }

    let mut stmt = Query::update();
    stmt.table(alias(&update.table));
    for (column, v) in &update.assignments {
        stmt.value(alias(column), value(v));
    }
    if !update.filter.is_empty() {
        stmt.cond_where(equals(&update.filter));
    }

    Ok(stmt)
}

pub(crate) fn select(select: &SelectDefinition) -> SelectStatement {
    let mut stmt = Query::select();
    if select.columns.is_empty() {
        stmt.column(Asterisk);
    } else {
        stmt.columns(select.columns.iter().map(|c| alias(c)));
    }
    stmt.from(alias(&select.table));
    if !select.filter.is_empty() {
        stmt.cond_where(equals(&select.filter));
    }
    for column in &select.order_by {
        stmt.order_by(alias(column), Order::Asc);
    }

    stmt
}

pub(crate) fn foreign_key_action(action: ForeignKeyAction) -> sea_query::ForeignKeyAction {
    match action {
        ForeignKeyAction::NoAction => sea_query::ForeignKeyAction::NoAction,
        ForeignKeyAction::Cascade => sea_query::ForeignKeyAction::Cascade,
        ForeignKeyAction::SetNull => sea_query::ForeignKeyAction::SetNull,
        ForeignKeyAction::Restrict => sea_query::ForeignKeyAction::Restrict,
    }
}
