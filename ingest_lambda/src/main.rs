use std::sync::Arc;

use anyhow::Context;
use aws_config::BehaviorVersion;
use lambda_runtime::{run, service_fn, tracing, Error};
use tracing_subscriber::EnvFilter;

mod config;
mod error;
mod event_handler;
mod model;
mod parser;
mod service;

use config::Config;
use event_handler::{function_handler, IngestContext};
use service::{db::MySqlWarehouse, notify::Notifier, s3::ObjectStore};

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing::subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::from_default_env())
        .with_current_span(true)
        .without_time()
        .init();

    let config = Config::from_env().context("invalid lambda configuration")?;
    tracing::info!(
        host = %config.database.host,
        database = %config.database.database,
        table = %config.database.table,
        ensure_schema = config.database.ensure_schema,
        "configuration loaded"
    );

    let shared_config = aws_config::load_defaults(BehaviorVersion::latest()).await;
    let ctx = IngestContext {
        objects: ObjectStore::new(aws_sdk_s3::Client::new(&shared_config)),
        warehouse: Arc::new(MySqlWarehouse::new(&config.database)),
        notifier: Notifier::new(
            aws_sdk_sns::Client::new(&shared_config),
            aws_sdk_sqs::Client::new(&shared_config),
            &config.sns_topic_arn,
            &config.sqs_queue_url,
        ),
        bucket_override: config.bucket_override.clone(),
    };

    run(service_fn(|event| function_handler(event, &ctx))).await
}
