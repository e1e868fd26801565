//! Database collaborator for supabase `query` actions.
//!
//! The real database lives outside this process; the core only submits SQL
//! through this trait. `UnconfiguredDatabase` is the default wiring and
//! fails every query with a clear message so the failure surfaces as an
//! action alert instead of a silent no-op.

use anyhow::{bail, Result};

#[async_trait::async_trait]
pub trait DatabaseExecutor: Send + Sync {
    /// Submit SQL for immediate execution.
    async fn execute_query(&self, sql: &str) -> Result<()>;
}

/// Placeholder executor used when no database connection is configured.
pub struct UnconfiguredDatabase;

#[async_trait::async_trait]
impl DatabaseExecutor for UnconfiguredDatabase {
    async fn execute_query(&self, _sql: &str) -> Result<()> {
        bail!("no database connection configured; cannot execute query")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unconfigured_database_rejects_queries() {
        let db = UnconfiguredDatabase;
        let err = db.execute_query("select 1").await.unwrap_err();
        assert!(err.to_string().contains("no database connection"));
    }
}
