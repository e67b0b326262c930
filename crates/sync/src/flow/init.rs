use crate::error::{ErrorKind, Result};
use crate::flow::{Context, finish};
use crate::local::LocalState;
use exn::ResultExt;
use quill_remote::{Database, Session};
use tracing::instrument;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaAction {
    /// There was no schema; it was created.
    Created,
    /// An existing schema (and all its history) was dropped and created anew.
    Recreated,
    /// An existing schema was kept; missing triggers were restored.
    Kept,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitReport {
    pub schema: SchemaAction,
    /// Version of the rebuilt local index, when one is configured.
    pub index_version: Option<u64>,
}

/// Prepare the store and, if configured, build the local index.
#[instrument(skip_all)]
pub async fn init(ctx: &Context, db: &Database, local: &dyn LocalState) -> Result<InitReport> {
    let mut session = db.begin().await.or_raise(|| ErrorKind::Remote)?;
    let result = prepare_schema(ctx, &mut session).await;
    let schema = finish(session, result).await?;
    tracing::info!(?schema, "remote schema ready");

    let index_version = local.rebuild("init").await?;
    if let Some(version) = index_version {
        tracing::info!(version, "local index built");
    }
    Ok(InitReport { schema, index_version })
}

async fn prepare_schema(ctx: &Context, session: &mut Session) -> Result<SchemaAction> {
    let action = if !session.tables_exist().await.or_raise(|| ErrorKind::Remote)? {
        session.create_tables().await.or_raise(|| ErrorKind::Remote)?;
        SchemaAction::Created
    } else if ctx.confirm("The remote schema already exists. Drop it, with all history, and start over?") {
        session.drop_all().await.or_raise(|| ErrorKind::Remote)?;
        session.create_tables().await.or_raise(|| ErrorKind::Remote)?;
        SchemaAction::Recreated
    } else {
        SchemaAction::Kept
    };
    if !session.triggers_exist().await.or_raise(|| ErrorKind::Remote)? {
        session.create_triggers().await.or_raise(|| ErrorKind::Remote)?;
    }
    session.commit().await.or_raise(|| ErrorKind::Remote)?;
    Ok(action)
}
