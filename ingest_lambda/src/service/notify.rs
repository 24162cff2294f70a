use aws_sdk_sns::Client as SnsClient;
use aws_sdk_sqs::Client as SqsClient;

/// Announces finished loads on SNS and SQS.
///
/// Delivery is best-effort: the table is already committed when these run, so a
/// failed publish is logged and otherwise ignored.
#[derive(Clone, Debug)]
pub struct Notifier {
    sns: SnsClient,
    sqs: SqsClient,
    topic_arn: String,
    queue_url: String,
}

impl Notifier {
    pub fn new(sns: SnsClient, sqs: SqsClient, topic_arn: &str, queue_url: &str) -> Self {
        Self {
            sns,
            sqs,
            topic_arn: topic_arn.to_string(),
            queue_url: queue_url.to_string(),
        }
    }

    /// Returns how many of the two signals were delivered.
    #[tracing::instrument(skip(self))]
    pub async fn file_loaded(&self, key: &str) -> usize {
        let mut delivered = 0;

        match self
            .sns
            .publish()
            .topic_arn(&self.topic_arn)
            .message(format!(
                "File {key} has been processed and loaded into RDS."
            ))
            .send()
            .await
        {
            Ok(output) => {
                tracing::info!(message_id = ?output.message_id(), "published completion notification");
                delivered += 1;
            }
            Err(e) => {
                tracing::warn!(error = %e.into_service_error(), topic_arn = %self.topic_arn, "unable to publish completion notification");
            }
        }

        match self
            .sqs
            .send_message()
            .queue_url(&self.queue_url)
            .message_body(format!("File {key} processed."))
            .send()
            .await
        {
            Ok(output) => {
                tracing::info!(message_id = ?output.message_id(), "sent completion message");
                delivered += 1;
            }
            Err(e) => {
                tracing::warn!(error = %e.into_service_error(), queue_url = %self.queue_url, "unable to send completion message");
            }
        }

        delivered
    }
}
