use anyhow::Context;

use crate::model::Identifier;

const DEFAULT_TABLE: &str = "movies";
const DEFAULT_PORT: u16 = 3306;

/// Where and how to reach the destination database.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: Identifier,
    pub table: Identifier,
    /// Create the database and table if they are missing before each load.
    pub ensure_schema: bool,
}

/// The configuration parameters for the lambda, read from its environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseConfig,

    /// The SNS topic that is told about every loaded file
    pub sns_topic_arn: String,

    /// The SQS queue that receives a message for every loaded file
    pub sqs_queue_url: String,

    /// Pins the source bucket instead of taking it from each event record.
    pub bucket_override: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from any variable source. Older deployments use
    /// `RDS_ENDPOINT`/`DB_USER` in place of `RDS_HOST`/`DB_USERNAME`.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let either = |primary: &str, fallback: &str| {
            lookup(primary)
                .or_else(|| lookup(fallback))
                .with_context(|| format!("{primary} or {fallback} must be provided"))
        };
        let required = |name: &str| lookup(name).with_context(|| format!("{name} must be provided"));

        let host = either("RDS_HOST", "RDS_ENDPOINT")?;
        let username = either("DB_USERNAME", "DB_USER")?;
        let password = required("DB_PASSWORD")?;
        let database = Identifier::parse(required("DB_NAME")?.trim()).context("DB_NAME")?;
        let table = match lookup("TABLE_NAME") {
            Some(name) => Identifier::parse(name.trim()).context("TABLE_NAME")?,
            None => Identifier::parse(DEFAULT_TABLE)?,
        };
        let port = match lookup("DB_PORT") {
            Some(port) => port
                .trim()
                .parse()
                .with_context(|| format!("DB_PORT {port:?} is not a port number"))?,
            None => DEFAULT_PORT,
        };
        let ensure_schema = match lookup("ENSURE_SCHEMA") {
            Some(flag) => parse_flag(&flag).context("ENSURE_SCHEMA")?,
            None => true,
        };

        Ok(Config {
            database: DatabaseConfig {
                host,
                port,
                username,
                password,
                database,
                table,
                ensure_schema,
            },
            sns_topic_arn: required("SNS_TOPIC_ARN")?,
            sqs_queue_url: required("SQS_QUEUE_URL")?,
            bucket_override: lookup("BUCKET_NAME").filter(|bucket| !bucket.trim().is_empty()),
        })
    }
}

fn parse_flag(value: &str) -> anyhow::Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        other => Err(anyhow::anyhow!("expected a boolean, got {other:?}")),
    }
}
