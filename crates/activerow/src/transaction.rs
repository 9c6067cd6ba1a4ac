//! Transaction wrapper.

use activerow_core::{Connection, Result};

use crate::finder::Model;

/// What a unit of work asks the transaction wrapper to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxOutcome {
    Commit,
    Rollback,
}

impl From<bool> for TxOutcome {
    fn from(commit: bool) -> Self {
        if commit { Self::Commit } else { Self::Rollback }
    }
}

impl From<()> for TxOutcome {
    fn from((): ()) -> Self {
        Self::Commit
    }
}

impl Model {
    /// Run `work` inside a transaction on this model's connection.
    ///
    /// - `Ok(Commit)` commits and returns `Ok(true)`.
    /// - `Ok(Rollback)` rolls back and returns `Ok(false)`.
    /// - `Err(e)` rolls back and returns `Err(e)`.
    ///
    /// A failed commit is rolled back and its error returned. A failed
    /// rollback after an error is only logged.
    #[tracing::instrument(level = "debug", skip(self, work), fields(class = %self.class_name()))]
    pub fn transaction<F, R>(&self, work: F) -> Result<bool>
    where
        F: FnOnce(&Model) -> Result<R>,
        R: Into<TxOutcome>,
    {
        let conn = self.table().conn();
        tracing::info!("Beginning transaction");
        conn.begin()?;

        match work(self).map(Into::into) {
            Ok(TxOutcome::Commit) => match conn.commit() {
                Ok(()) => {
                    tracing::info!("Committed transaction");
                    Ok(true)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Commit failed, rolling back transaction");
                    rollback_quietly(&**conn);
                    Err(e)
                }
            },
            Ok(TxOutcome::Rollback) => {
                conn.rollback()?;
                tracing::info!("Rolled back transaction");
                Ok(false)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Rolling back transaction after error");
                rollback_quietly(&**conn);
                Err(e)
            }
        }
    }
}

/// Roll back after a failure. A rollback error is logged so the caller
/// still sees the error that caused it.
fn rollback_quietly(conn: &dyn Connection) {
    if let Err(rb) = conn.rollback() {
        tracing::warn!(error = %rb, "Rollback failed");
    }
}
