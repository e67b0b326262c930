//! Schema and history-trigger management.
//!
//! DDL runs inside the session like any other statement, so a failed
//! initialisation leaves nothing behind.

use crate::error::Result;
use crate::session::Session;
use tracing::instrument;

const TABLE_COUNT: i64 = 5;
const TRIGGER_COUNT: i64 = 2;

impl Session {
    async fn execute_script(&mut self, script: &'static str) -> Result<()> {
        let result = sqlx::raw_sql(script).execute(self.conn()?).await;
        self.check(result).await?;
        Ok(())
    }

    async fn count(&mut self, query: &'static str) -> Result<i64> {
        let result = sqlx::query_scalar(query).fetch_one(self.conn()?).await;
        self.check(result).await
    }

    /// `true` only if every table exists.
    pub async fn tables_exist(&mut self) -> Result<bool> {
        Ok(self.count(include_str!("../queries/count_tables.sql")).await? == TABLE_COUNT)
    }

    /// `true` only if both history triggers exist.
    pub async fn triggers_exist(&mut self) -> Result<bool> {
        Ok(self.count(include_str!("../queries/count_triggers.sql")).await? == TRIGGER_COUNT)
    }

    #[instrument(skip(self))]
    pub async fn create_tables(&mut self) -> Result<()> {
        self.execute_script(include_str!("../schema/create_tables.sql")).await
    }

    #[instrument(skip(self))]
    pub async fn create_triggers(&mut self) -> Result<()> {
        self.execute_script(include_str!("../schema/create_triggers.sql")).await
    }

    #[instrument(skip(self))]
    pub async fn drop_triggers(&mut self) -> Result<()> {
        self.execute_script(include_str!("../schema/drop_triggers.sql")).await
    }

    /// Drop triggers and tables, history included.
    #[instrument(skip(self))]
    pub async fn drop_all(&mut self) -> Result<()> {
        self.execute_script(include_str!("../schema/drop_all.sql")).await
    }

    /// Empty every table, history included.
    #[instrument(skip(self))]
    pub async fn truncate_all(&mut self) -> Result<()> {
        self.execute_script(include_str!("../schema/truncate_all.sql")).await
    }

    /// Tables and triggers, created if missing.
    pub async fn ensure_schema(&mut self) -> Result<()> {
        if !self.tables_exist().await? {
            self.create_tables().await?;
        }
        if !self.triggers_exist().await? {
            self.create_triggers().await?;
        }
        Ok(())
    }
}
