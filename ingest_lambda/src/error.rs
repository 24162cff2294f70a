use thiserror::Error;

/// Everything that can abort an ingest invocation.
///
/// None of these are recovered locally; the handler logs them and hands them back to
/// the Lambda runtime so the platform's retry / dead-letter settings apply.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The trigger payload is not an S3 event batch.
    #[error("malformed trigger payload: {0}")]
    InputShape(String),

    #[error("could not fetch s3://{bucket}/{key}: {reason}")]
    Transfer {
        bucket: String,
        key: String,
        reason: String,
    },

    #[error("database connection failed: {0}")]
    Connection(String),

    #[error("database query failed: {0}")]
    Query(String),

    /// A CSV line could not be turned into a row. Line numbers are 1-based and count the header.
    #[error("malformed row at line {line}: {reason}")]
    MalformedRow { line: u64, reason: String },

    #[error("invalid SQL identifier {0:?}")]
    InvalidIdentifier(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl IngestError {
    pub(crate) fn transfer(bucket: &str, key: &str, reason: impl ToString) -> Self {
        Self::Transfer {
            bucket: bucket.to_string(),
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }
}
