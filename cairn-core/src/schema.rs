//! Dialect-neutral descriptions of schema and data changes.
//!
//! Every definition is built by value and handed to a [`SqlDialect`](crate::SqlDialect)
//! renderer once complete:
//!
//! ```rust,ignore
//! let table = TableDefinition::new("cairn_key_value")
//!     .column(ColumnDefinition::new("key", ColumnType::Text(Some(256))).primary_key())
//!     .column(ColumnDefinition::new("value", ColumnType::Text(None)).nullable());
//!
//! let statements = dialect.create_table(&table)?;
//! ```

use crate::SqlValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    BigInteger,
    /// Bounded `varchar` when a length is given, unbounded text otherwise.
    Text(Option<u32>),
    Boolean,
    DateTime,
    Double,
    Binary,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDefinition {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
    pub primary_key: bool,
    pub identity: bool,
    pub unique: bool,
    pub default: Option<SqlValue>,
}

impl ColumnDefinition {
    /// Creates a non-nullable column.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: false,
            primary_key: false,
            identity: false,
            unique: false,
            default: None,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    /// Engine generated values. Only meaningful on a single-column primary key.
    pub fn identity(mut self) -> Self {
        self.identity = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<SqlValue>) -> Self {
        self.default = Some(value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableDefinition {
    pub name: String,
    pub columns: Vec<ColumnDefinition>,
    pub if_not_exists: bool,
}

impl TableDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            if_not_exists: false,
        }
    }

    pub fn column(mut self, column: ColumnDefinition) -> Self {
        self.columns.push(column);
        self
    }

    pub fn if_not_exists(mut self) -> Self {
        self.if_not_exists = true;
        self
    }

    pub fn primary_key_columns(&self) -> impl Iterator<Item = &ColumnDefinition> {
        self.columns.iter().filter(|c| c.primary_key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ForeignKeyAction {
    #[default]
    NoAction,
    Cascade,
    SetNull,
    Restrict,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConstraintKind {
    PrimaryKey,
    Unique,
    ForeignKey {
        referenced_table: String,
        referenced_columns: Vec<String>,
        on_delete: ForeignKeyAction,
    },
}

/// A named table constraint. When `name` is left empty the dialect derives one.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintDefinition {
    pub name: Option<String>,
    pub table: String,
    pub columns: Vec<String>,
    pub kind: ConstraintKind,
    pub clustered: bool,
}

impl ConstraintDefinition {
    fn build(table: impl Into<String>, columns: Vec<String>, kind: ConstraintKind) -> Self {
        Self {
            name: None,
            table: table.into(),
            columns,
            kind,
            clustered: false,
        }
    }

    pub fn primary_key<I, S>(table: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::build(table, collect(columns), ConstraintKind::PrimaryKey)
    }

    pub fn unique<I, S>(table: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::build(table, collect(columns), ConstraintKind::Unique)
    }

    pub fn foreign_key<I, S, J, T>(
        table: impl Into<String>,
        columns: I,
        referenced_table: impl Into<String>,
        referenced_columns: J,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        J: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self::build(
            table,
            collect(columns),
            ConstraintKind::ForeignKey {
                referenced_table: referenced_table.into(),
                referenced_columns: collect(referenced_columns),
                on_delete: ForeignKeyAction::NoAction,
            },
        )
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Requests physical ordering. Ignored by engines without clustered indexes.
    pub fn clustered(mut self) -> Self {
        self.clustered = true;
        self
    }

    pub fn on_delete(mut self, action: ForeignKeyAction) -> Self {
        if let ConstraintKind::ForeignKey { on_delete, .. } = &mut self.kind {
            *on_delete = action;
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexDefinition {
    pub name: Option<String>,
    pub table: String,
    pub columns: Vec<String>,
    pub unique: bool,
    pub clustered: bool,
}

impl IndexDefinition {
    pub fn new<I, S>(table: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: None,
            table: table.into(),
            columns: collect(columns),
            unique: false,
            clustered: false,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn clustered(mut self) -> Self {
        self.clustered = true;
        self
    }
}

/// Which rows a [`DeleteDefinition`] removes.
#[derive(Debug, Clone, PartialEq)]
pub enum DeleteFilter {
    All,
    IsNull(String),
    /// Each pattern is a conjunction of column equalities; patterns are OR'ed.
    Rows(Vec<Vec<(String, SqlValue)>>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteDefinition {
    pub table: String,
    pub filter: DeleteFilter,
}

impl DeleteDefinition {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            filter: DeleteFilter::Rows(Vec::new()),
        }
    }

    pub fn all_rows(mut self) -> Self {
        self.filter = DeleteFilter::All;
        self
    }

    pub fn is_null(mut self, column: impl Into<String>) -> Self {
        self.filter = DeleteFilter::IsNull(column.into());
        self
    }

    /// Adds a row pattern. Switches the filter back to row matching.
    pub fn row<I, K, V>(mut self, pattern: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<SqlValue>,
    {
        let pattern = pattern
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();

        match &mut self.filter {
            DeleteFilter::Rows(rows) => rows.push(pattern),
            _ => self.filter = DeleteFilter::Rows(vec![pattern]),
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertDefinition {
    pub table: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
}

impl InsertDefinition {
    pub fn new<I, S>(table: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            table: table.into(),
            columns: collect(columns),
            rows: Vec::new(),
        }
    }

    pub fn values<I, V>(mut self, row: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<SqlValue>,
    {
        self.rows.push(row.into_iter().map(Into::into).collect());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateDefinition {
    pub table: String,
    pub assignments: Vec<(String, SqlValue)>,
    pub filter: Vec<(String, SqlValue)>,
}

impl UpdateDefinition {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            assignments: Vec::new(),
            filter: Vec::new(),
        }
    }

    pub fn set(mut self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.assignments.push((column.into(), value.into()));
        self
    }

    pub fn filter(mut self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.filter.push((column.into(), value.into()));
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectDefinition {
    pub table: String,
    pub columns: Vec<String>,
    pub filter: Vec<(String, SqlValue)>,
    pub order_by: Vec<String>,
}

impl SelectDefinition {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            filter: Vec::new(),
            order_by: Vec::new(),
        }
    }

    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns.extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn filter(mut self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.filter.push((column.into(), value.into()));
        self
    }

    pub fn order_by(mut self, column: impl Into<String>) -> Self {
        self.order_by.push(column.into());
        self
    }
}

/// Existence checks. Rendered to a statement returning a single count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExistsCheck {
    Table(String),
    Column { table: String, column: String },
}

impl ExistsCheck {
    pub fn table(name: impl Into<String>) -> Self {
        ExistsCheck::Table(name.into())
    }

    pub fn column(table: impl Into<String>, column: impl Into<String>) -> Self {
        ExistsCheck::Column {
            table: table.into(),
            column: column.into(),
        }
    }
}

fn collect<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    items.into_iter().map(Into::into).collect()
}
