//! Table creation from entity definitions

use crate::db::models::*;
use crate::errors::Result;
use sea_orm::{ConnectionTrait, DatabaseConnection, EntityTrait, Schema};
use tracing::info;

/// Create every table that does not exist yet, parents before children
pub async fn create_schema(conn: &DatabaseConnection) -> Result<()> {
    create_table(conn, AccountEntity).await?;
    create_table(conn, SubscriptionEntity).await?;
    create_table(conn, PaymentEventEntity).await?;
    create_table(conn, DocumentEntity).await?;
    create_table(conn, TextEntity).await?;
    create_table(conn, TextDocumentEntity).await?;

    info!("Database schema ready");
    Ok(())
}

async fn create_table<E: EntityTrait>(conn: &DatabaseConnection, entity: E) -> Result<()> {
    let backend = conn.get_database_backend();
    let schema = Schema::new(backend);

    let mut statement = schema.create_table_from_entity(entity);
    statement.if_not_exists();

    conn.execute(backend.build(&statement)).await?;
    Ok(())
}
