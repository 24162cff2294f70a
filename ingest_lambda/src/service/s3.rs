use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use tempfile::NamedTempFile;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::IngestError;

/// Downloads uploaded objects into transient local files.
#[derive(Clone, Debug)]
pub struct ObjectStore {
    inner: S3Client,
}

impl ObjectStore {
    pub fn new(inner: S3Client) -> Self {
        Self { inner }
    }

    /// Streams `s3://bucket/key` into a fresh temp file.
    ///
    /// Every call gets its own path, and the file is deleted when the returned handle
    /// is dropped.
    #[tracing::instrument(skip(self))]
    pub async fn download(&self, bucket: &str, key: &str) -> Result<NamedTempFile, IngestError> {
        let resp = self
            .inner
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| IngestError::transfer(bucket, key, e.into_service_error()))?;

        let local = tempfile::Builder::new()
            .prefix("ingest-")
            .suffix(".csv")
            .tempfile()?;
        let mut out = tokio::fs::File::from_std(local.reopen()?);
        let written = copy_body(resp.body, &mut out, bucket, key).await?;

        tracing::info!(path = %local.path().display(), bytes = written, "downloaded object");
        Ok(local)
    }
}

/// Copies the object body into `out`. A failure on either side means the transfer
/// did not complete.
async fn copy_body<W>(
    mut body: ByteStream,
    out: &mut W,
    bucket: &str,
    key: &str,
) -> Result<usize, IngestError>
where
    W: AsyncWrite + Unpin,
{
    let mut written = 0usize;
    while let Some(chunk) = body
        .try_next()
        .await
        .map_err(|e| IngestError::transfer(bucket, key, e))?
    {
        out.write_all(&chunk)
            .await
            .map_err(|e| IngestError::transfer(bucket, key, e))?;
        written += chunk.len();
    }
    out.flush()
        .await
        .map_err(|e| IngestError::transfer(bucket, key, e))?;
    Ok(written)
}
