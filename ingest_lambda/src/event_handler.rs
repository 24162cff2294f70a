use std::sync::Arc;

use lambda_runtime::{tracing, Error, LambdaEvent};
use serde_json::Value;

use crate::error::IngestError;
use crate::model::{IngestResponse, MovieRow, UploadNotification};
use crate::parser;
use crate::service::db::{Warehouse, WarehouseConnection};
use crate::service::notify::Notifier;
use crate::service::s3::ObjectStore;

/// Collaborators built once per process and shared by every invocation.
#[derive(Clone)]
pub(crate) struct IngestContext {
    pub objects: ObjectStore,
    pub warehouse: Arc<dyn Warehouse>,
    pub notifier: Notifier,
    pub bucket_override: Option<String>,
}

/// Downloads, parses and loads one uploaded file, then announces it.
#[tracing::instrument(skip_all, fields(bucket = %notification.bucket, key = %notification.key))]
async fn process_notification(
    ctx: &IngestContext,
    notification: &UploadNotification,
) -> Result<u64, IngestError> {
    let local = ctx
        .objects
        .download(&notification.bucket, &notification.key)
        .await?;
    let contents = tokio::fs::read(local.path()).await?;
    let rows = parser::parse_rows(contents.as_slice())?;
    // The temp file is removed here, before any database work.
    drop(local);
    tracing::info!(rows = rows.len(), "parsed csv");

    let loaded = load_rows(ctx.warehouse.as_ref(), &rows).await?;
    let delivered = ctx.notifier.file_loaded(&notification.key).await;
    tracing::info!(delivered, "completion signals sent");
    Ok(loaded)
}

/// Replaces the destination table with `rows` over a single connection that is always
/// closed, whether or not the load succeeded.
async fn load_rows(warehouse: &dyn Warehouse, rows: &[MovieRow]) -> Result<u64, IngestError> {
    let mut conn = warehouse.connect().await?;
    let loaded = write_rows(conn.as_mut(), rows).await;
    let closed = conn.close().await;

    let loaded = loaded?;
    if let Err(e) = closed {
        tracing::warn!(error = %e, "unable to close database connection after commit");
    }
    Ok(loaded)
}

async fn write_rows(
    conn: &mut dyn WarehouseConnection,
    rows: &[MovieRow],
) -> Result<u64, IngestError> {
    conn.prepare().await?;
    conn.replace_rows(rows).await
}

pub(crate) async fn function_handler(
    event: LambdaEvent<Value>,
    ctx: &IngestContext,
) -> Result<IngestResponse, Error> {
    let notifications =
        UploadNotification::from_event(event.payload, ctx.bucket_override.as_deref()).map_err(
            |e| {
                tracing::error!(error = %e, "rejecting trigger payload");
                e
            },
        )?;
    if notifications.is_empty() {
        tracing::warn!("No records found in S3 event");
        return Ok(IngestResponse::loaded());
    }

    tracing::info!(record_count = notifications.len(), "processing s3 records");
    for notification in &notifications {
        let loaded = process_notification(ctx, notification)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Error processing file {} from bucket {}", notification.key, notification.bucket);
                e
            })?;
        tracing::info!(rows = loaded, "Successfully processed file {} from bucket {}", notification.key, notification.bucket);
    }

    tracing::info!(file_count = notifications.len(), "batch loaded");
    Ok(IngestResponse::loaded())
}
