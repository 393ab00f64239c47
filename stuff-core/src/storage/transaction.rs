//! Unit-of-work scope over the SQLite connection
//!
//! `OpContext` is threaded explicitly through every store call. It carries
//! the transaction a call must join (if any), a cancellation token and an
//! optional deadline. `Database::in_transaction` either joins the context's
//! transaction or opens one and owns its commit/rollback:
//!
//! ```ignore
//! db.in_transaction(&OpContext::background(), |ctx, exec| {
//!     let id = assets.create(exec, &asset)?;
//!     ledger.write_file(ctx, upload)?; // joins the same transaction
//!     Ok(id)
//! })?;
//! ```
//!
//! Closures must pass the `ctx` they were handed to nested calls. Starting a
//! fresh context inside a closure would wait on the connection lock held by
//! the outer transaction.

use rusqlite::{Connection, TransactionBehavior};
use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::storage::implementations::sqlite;

/// Per-operation context: joined transaction, cancellation and deadline.
#[derive(Clone, Debug, Default)]
pub struct OpContext<'tx> {
    tx: Option<&'tx Connection>,
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl OpContext<'static> {
    /// A context with no transaction, no deadline and a fresh token.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_cancellation(cancel: CancellationToken) -> Self {
        Self {
            tx: None,
            cancel,
            deadline: None,
        }
    }
}

impl<'tx> OpContext<'tx> {
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Whether calls made with this context join an open transaction.
    pub fn in_transaction(&self) -> bool {
        self.tx.is_some()
    }

    /// Fail if the operation was cancelled or ran past its deadline.
    pub fn check(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(Error::DeadlineExceeded);
            }
        }
        Ok(())
    }

    fn join<'a>(&self, conn: &'a Connection) -> OpContext<'a> {
        OpContext {
            tx: Some(conn),
            cancel: self.cancel.clone(),
            deadline: self.deadline,
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct DatabaseOptions {
    /// Log every statement at debug level under the `stuff_core::sql` target.
    pub debug_sql: bool,
    pub busy_timeout: Option<Duration>,
}

/// Owner of the single SQLite connection.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create a database file and bring its schema up to date.
    pub fn open(path: impl AsRef<Path>, options: DatabaseOptions) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        debug!(path = %path.as_ref().display(), "opened database");
        Self::from_connection(conn, options)
    }

    /// Create an in-memory database (useful for testing)
    pub fn in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?, DatabaseOptions::default())
    }

    fn from_connection(mut conn: Connection, options: DatabaseOptions) -> Result<Self> {
        if options.debug_sql {
            conn.trace(Some(log_sql));
        }
        if let Some(timeout) = options.busy_timeout {
            conn.busy_timeout(timeout)?;
        }
        sqlite::configure(&conn)?;
        sqlite::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run `f` inside a transaction.
    ///
    /// If `ctx` already carries a transaction, `f` runs against it and the
    /// outermost scope decides the outcome. Otherwise a new IMMEDIATE
    /// transaction is opened, committed when `f` succeeds, and rolled back
    /// when `f` fails or the context is cancelled before commit.
    pub fn in_transaction<R, F>(&self, ctx: &OpContext<'_>, f: F) -> Result<R>
    where
        F: FnOnce(&OpContext<'_>, &Connection) -> Result<R>,
    {
        if let Some(conn) = ctx.tx {
            return f(ctx, conn);
        }

        ctx.check()?;
        let mut guard = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let tx = guard.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute_batch("PRAGMA defer_foreign_keys = 1")?;
        debug!("transaction started");

        let scoped = ctx.join(&tx);
        let outcome = f(&scoped, &tx).and_then(|value| scoped.check().map(|()| value));
        drop(scoped);

        match outcome {
            Ok(value) => {
                tx.commit()?;
                debug!("transaction committed");
                Ok(value)
            }
            Err(original) => {
                debug!(error = %original, "rolling back transaction");
                match tx.rollback() {
                    Ok(()) => Err(original),
                    Err(rollback) => {
                        warn!(error = %rollback, "rollback failed");
                        Err(Error::Rollback {
                            original: Box::new(original),
                            rollback,
                        })
                    }
                }
            }
        }
    }

    /// Run a read-only closure, joining the context's transaction if present.
    pub fn read<R, F>(&self, ctx: &OpContext<'_>, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> Result<R>,
    {
        ctx.check()?;
        if let Some(conn) = ctx.tx {
            return f(conn);
        }
        let guard = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        f(&guard)
    }
}

fn log_sql(sql: &str) {
    debug!(target: "stuff_core::sql", "{sql}");
}
