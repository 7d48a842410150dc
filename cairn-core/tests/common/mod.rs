#![allow(dead_code)]

use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
};

use cairn_core::{
    BeginOptions, Database, DatabaseError, DatabaseFactory, DialectError,
    DistributedLockingMechanism, ExistsCheck, LockRequest, LockType, Row, ScopeError,
    ScopeProvider, SqlDialect, SqlValue, Statement,
};
use parking_lot::Mutex;

/// Everything the fake engine saw.
#[derive(Default)]
pub struct Journal {
    pub begins: AtomicUsize,
    pub commits: AtomicUsize,
    pub rollbacks: AtomicUsize,
    pub fail_begin: AtomicBool,
    /// Refuse to admit transactions, as an engine whose writer is taken.
    pub busy: AtomicBool,
    pub begun_with: Mutex<Vec<BeginOptions>>,
    pub log: Mutex<Vec<String>>,
    pub tables: Mutex<HashSet<String>>,
}

impl Journal {
    pub fn begins(&self) -> usize {
        self.begins.load(Ordering::SeqCst)
    }

    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> usize {
        self.rollbacks.load(Ordering::SeqCst)
    }

    pub fn begun_with(&self) -> Vec<BeginOptions> {
        self.begun_with.lock().clone()
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    pub fn lock_calls(&self) -> Vec<String> {
        self.log()
            .into_iter()
            .filter(|line| line.starts_with("LOCK "))
            .collect()
    }
}

pub struct FakeFactory {
    pub journal: Arc<Journal>,
}

pub fn provider() -> (ScopeProvider, Arc<Journal>) {
    let journal = Arc::new(Journal::default());
    let factory = FakeFactory {
        journal: journal.clone(),
    };

    (ScopeProvider::new(Arc::new(factory)), journal)
}

#[async_trait::async_trait]
impl DatabaseFactory for FakeFactory {
    fn provider_name(&self) -> &'static str {
        "fake"
    }

    fn dialect(&self) -> Arc<dyn SqlDialect> {
        Arc::new(FakeDialect)
    }

    fn locking(&self) -> Arc<dyn DistributedLockingMechanism> {
        Arc::new(FakeLocking)
    }

    async fn begin(&self, options: BeginOptions) -> Result<Box<dyn Database>, DatabaseError> {
        if self.journal.fail_begin.load(Ordering::SeqCst) {
            return Err(DatabaseError::Connection("unable to open database file".into()));
        }

        if self.journal.busy.load(Ordering::SeqCst) {
            return Err(DatabaseError::Busy(options.wait));
        }

        self.journal.begun_with.lock().push(options);
        self.journal.begins.fetch_add(1, Ordering::SeqCst);
        self.journal.log.lock().push("BEGIN".into());

        Ok(Box::new(FakeDatabase {
            journal: self.journal.clone(),
            created: Vec::new(),
            finished: false,
        }))
    }
}

pub struct FakeDatabase {
    journal: Arc<Journal>,
    created: Vec<String>,
    finished: bool,
}

#[async_trait::async_trait]
impl Database for FakeDatabase {
    async fn execute(&mut self, statement: &Statement) -> Result<u64, DatabaseError> {
        if statement.sql == "FAIL" {
            return Err(DatabaseError::Statement {
                code: Some("1".into()),
                message: "syntax error".into(),
            });
        }

        if let Some(table) = statement.sql.strip_prefix("CREATE TABLE ") {
            self.created.push(table.to_owned());
        }

        self.journal.log.lock().push(statement.sql.clone());
        Ok(1)
    }

    async fn fetch_all(&mut self, statement: &Statement) -> Result<Vec<Row>, DatabaseError> {
        self.journal.log.lock().push(statement.sql.clone());

        let count = match statement.sql.strip_prefix("EXISTS ") {
            Some(table) => {
                let visible = self.created.iter().any(|t| t == table)
                    || self.journal.tables.lock().contains(table);
                i64::from(visible)
            }
            None => 0,
        };

        Ok(vec![Row::new(vec![SqlValue::Int(count)])])
    }

    async fn commit(self: Box<Self>) -> Result<(), DatabaseError> {
        let mut this = self;
        this.finished = true;
        this.journal.commits.fetch_add(1, Ordering::SeqCst);
        this.journal.log.lock().push("COMMIT".into());
        let created = std::mem::take(&mut this.created);
        this.journal.tables.lock().extend(created);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DatabaseError> {
        let mut this = self;
        this.finished = true;
        this.journal.rollbacks.fetch_add(1, Ordering::SeqCst);
        this.journal.log.lock().push("ROLLBACK".into());
        Ok(())
    }
}

impl Drop for FakeDatabase {
    fn drop(&mut self) {
        if !self.finished {
            self.journal.rollbacks.fetch_add(1, Ordering::SeqCst);
            self.journal.log.lock().push("ROLLBACK (dropped)".into());
        }
    }
}

#[derive(Debug)]
pub struct FakeDialect;

impl SqlDialect for FakeDialect {
    fn provider_name(&self) -> &'static str {
        "fake"
    }

    fn supports_clustered_index(&self) -> bool {
        false
    }

    fn exists(&self, check: &ExistsCheck) -> Result<Statement, DialectError> {
        match check {
            ExistsCheck::Table(table) => Ok(Statement::new(format!("EXISTS {table}"))),
            ExistsCheck::Column { .. } => Err(self.unsupported("column check")),
        }
    }
}

/// Grants every lock except names starting with `busy:`, which time out.
pub struct FakeLocking;

#[async_trait::async_trait]
impl DistributedLockingMechanism for FakeLocking {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn acquire(&self, db: &mut dyn Database, request: &LockRequest) -> Result<(), ScopeError> {
        let kind = match request.lock_type {
            LockType::Read => "READ",
            LockType::Write => "WRITE",
        };

        db.execute(&Statement::new(format!("LOCK {kind} {}", request.name)))
            .await?;

        if request.name.starts_with("busy:") {
            return Err(request.timed_out());
        }

        Ok(())
    }
}
