use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::IngestError;

/// One uploaded object to load, decoded from an S3 event record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadNotification {
    pub bucket: String,
    pub key: String,
}

impl UploadNotification {
    /// Decodes every record of a trigger payload.
    ///
    /// The whole batch is validated up front so that a bad record fails the invocation
    /// before any object is fetched. `bucket_override` replaces the bucket named in the
    /// event when the deployment pins a single source bucket.
    pub fn from_event(
        payload: Value,
        bucket_override: Option<&str>,
    ) -> Result<Vec<Self>, IngestError> {
        if payload.get("Records").is_none() {
            return Err(IngestError::InputShape(
                "no 'Records' found in event".to_string(),
            ));
        }
        let batch: TriggerBatch = serde_json::from_value(payload)
            .map_err(|e| IngestError::InputShape(e.to_string()))?;

        batch
            .records
            .into_iter()
            .enumerate()
            .map(|(index, record)| {
                let raw_key = record.s3.object.key.ok_or_else(|| {
                    IngestError::InputShape(format!("record {index} has no object key"))
                })?;
                let bucket = match bucket_override {
                    Some(bucket) => bucket.to_string(),
                    None => record.s3.bucket.name.ok_or_else(|| {
                        IngestError::InputShape(format!("record {index} has no bucket name"))
                    })?,
                };
                Ok(Self {
                    bucket,
                    key: decode_object_key(&raw_key)?,
                })
            })
            .collect()
    }
}

// Only the fields that are read; the rest of the S3 notification metadata is ignored.
#[derive(Debug, Deserialize)]
struct TriggerBatch {
    #[serde(rename = "Records")]
    records: Vec<TriggerRecord>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TriggerRecord {
    s3: S3Location,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct S3Location {
    bucket: BucketRef,
    object: ObjectRef,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct BucketRef {
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ObjectRef {
    key: Option<String>,
}

/// S3 event keys are form-encoded: spaces arrive as `+`, everything else percent-encoded.
fn decode_object_key(raw: &str) -> Result<String, IngestError> {
    urlencoding::decode(&raw.replace('+', " "))
        .map(|key| key.into_owned())
        .map_err(|e| IngestError::InputShape(format!("object key {raw:?} is not UTF-8: {e}")))
}

/// A row of the destination table: the first three CSV fields of one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovieRow {
    pub id: i32,
    pub title: String,
    pub tagline: String,
}

/// A table or database name that is safe to splice into SQL text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identifier(String);

impl Identifier {
    const MAX_LEN: usize = 64;

    pub fn parse(raw: &str) -> Result<Self, IngestError> {
        let mut chars = raw.chars();
        let valid = match chars.next() {
            Some(first) => {
                (first.is_ascii_alphabetic() || first == '_')
                    && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
                    && raw.len() <= Self::MAX_LEN
            }
            None => false,
        };
        if valid {
            Ok(Self(raw.to_string()))
        } else {
            Err(IngestError::InvalidIdentifier(raw.to_string()))
        }
    }

    /// Backtick-quoted form for MySQL statements.
    pub fn quoted(&self) -> String {
        format!("`{}`", self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Identifier {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the invocation returns to the caller on success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub body: String,
}

impl IngestResponse {
    pub fn loaded() -> Self {
        Self {
            status_code: 200,
            body: "Data loaded successfully".to_string(),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use aws_lambda_events::event::s3::{S3Bucket, S3Entity, S3Event, S3EventRecord, S3Object};
    use serde_json::json;

    pub(crate) fn s3_event(objects: &[(&str, &str)]) -> Value {
        let records = objects
            .iter()
            .map(|(bucket, key)| S3EventRecord {
                s3: S3Entity {
                    bucket: S3Bucket {
                        name: Some(bucket.to_string()),
                        ..Default::default()
                    },
                    object: S3Object {
                        key: Some(key.to_string()),
                        size: Some(64),
                        ..Default::default()
                    },
                    schema_version: Some("1.0".to_string()),
                    configuration_id: Some("csv-upload".to_string()),
                },
                ..Default::default()
            })
            .collect();
        serde_json::to_value(S3Event { records }).unwrap()
    }

    #[test]
    fn missing_records_is_input_shape_error() {
        let err = UploadNotification::from_event(json!({ "detail": {} }), None).unwrap_err();
        assert!(matches!(err, IngestError::InputShape(_)));
    }

    #[test]
    fn records_keep_event_order_and_decode_keys() {
        let payload = s3_event(&[
            ("uploads", "daily/movies+2024%2D01.csv"),
            ("uploads", "movies.csv"),
        ]);
        let notifications = UploadNotification::from_event(payload, None).unwrap();
        assert_eq!(
            notifications,
            vec![
                UploadNotification {
                    bucket: "uploads".to_string(),
                    key: "daily/movies 2024-01.csv".to_string(),
                },
                UploadNotification {
                    bucket: "uploads".to_string(),
                    key: "movies.csv".to_string(),
                },
            ]
        );
    }

    #[test]
    fn minimal_record_needs_only_bucket_and_key() {
        let payload = json!({
            "Records": [{ "s3": { "bucket": { "name": "b" }, "object": { "key": "movies.csv" } } }]
        });
        let notifications = UploadNotification::from_event(payload, None).unwrap();
        assert_eq!(
            notifications,
            vec![UploadNotification {
                bucket: "b".to_string(),
                key: "movies.csv".to_string(),
            }]
        );
    }

    #[test]
    fn record_without_object_key_is_rejected() {
        let payload = json!({
            "Records": [
                { "s3": { "bucket": { "name": "b" }, "object": { "key": "ok.csv" } } },
                { "s3": { "bucket": { "name": "b" }, "object": { "size": 12 } } }
            ]
        });
        match UploadNotification::from_event(payload, None) {
            Err(IngestError::InputShape(reason)) => {
                assert!(reason.contains("record 1 has no object key"), "{reason}")
            }
            other => panic!("expected InputShape, got {other:?}"),
        }
    }

    #[test]
    fn record_without_bucket_needs_override() {
        let payload = json!({ "Records": [{ "s3": { "object": { "key": "movies.csv" } } }] });
        assert!(matches!(
            UploadNotification::from_event(payload.clone(), None),
            Err(IngestError::InputShape(_))
        ));
        let notifications = UploadNotification::from_event(payload, Some("pinned")).unwrap();
        assert_eq!(notifications[0].bucket, "pinned");
    }

    #[test]
    fn bucket_override_wins_over_event_bucket() {
        let payload = s3_event(&[("event-bucket", "movies.csv")]);
        let notifications = UploadNotification::from_event(payload, Some("pinned")).unwrap();
        assert_eq!(notifications[0].bucket, "pinned");
    }

    #[test]
    fn empty_records_decode_to_empty_batch() {
        let notifications =
            UploadNotification::from_event(json!({ "Records": [] }), None).unwrap();
        assert!(notifications.is_empty());
    }

    #[test]
    fn identifiers_reject_sql_fragments() {
        assert_eq!(Identifier::parse("movies").unwrap().quoted(), "`movies`");
        assert!(Identifier::parse("_staging_2").is_ok());
        for bad in ["", "1movies", "movies; DROP TABLE x", "mo`vies", "movies-old"] {
            assert!(
                matches!(Identifier::parse(bad), Err(IngestError::InvalidIdentifier(_))),
                "{bad:?} should be rejected"
            );
        }
        assert!(Identifier::parse(&"a".repeat(65)).is_err());
    }

    #[test]
    fn response_uses_lambda_proxy_field_names() {
        let value = serde_json::to_value(IngestResponse::loaded()).unwrap();
        assert_eq!(
            value,
            json!({ "statusCode": 200, "body": "Data loaded successfully" })
        );
    }
}
