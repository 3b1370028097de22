use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_sqs::types::MessageSystemAttributeName;
use aws_sdk_sqs::Client as SqsClient;
use tracing::instrument;

use super::traits::SqsOperations;

/// Parameters of a single long-poll receive call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveRequest {
    pub queue_url: String,
    pub max_number_of_messages: i32,
    pub visibility_timeout: i32,
    pub wait_time_seconds: i32,
}

/// A message as delivered by the queue, before any decoding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboundMessage {
    pub message_id: Option<String>,
    pub body: String,
    /// Lease token for this delivery. Only valid until the visibility timeout
    /// runs out or the message is deleted.
    pub receipt_handle: Option<String>,
    pub attributes: HashMap<String, String>,
}

impl InboundMessage {
    pub fn new(
        message_id: impl Into<String>,
        body: impl Into<String>,
        receipt_handle: impl Into<String>,
    ) -> Self {
        Self {
            message_id: Some(message_id.into()),
            body: body.into(),
            receipt_handle: Some(receipt_handle.into()),
            attributes: HashMap::new(),
        }
    }

    /// Message id for error reports and log lines.
    pub fn display_id(&self) -> &str {
        self.message_id.as_deref().unwrap_or("<unknown>")
    }
}

impl From<&aws_sdk_sqs::types::Message> for InboundMessage {
    fn from(message: &aws_sdk_sqs::types::Message) -> Self {
        let attributes = message
            .attributes()
            .map(|attrs| {
                attrs
                    .iter()
                    .map(|(name, value)| (name.as_str().to_string(), value.clone()))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            message_id: message.message_id().map(str::to_string),
            body: message.body().unwrap_or_default().to_string(),
            receipt_handle: message.receipt_handle().map(str::to_string),
            attributes,
        }
    }
}

pub struct SqsModule {
    client: SqsClient,
}

impl SqsModule {
    pub fn new(client: SqsClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SqsOperations for SqsModule {
    #[instrument(skip(self), fields(queue_url = %request.queue_url))]
    async fn receive_messages(&self, request: &ReceiveRequest) -> Result<Vec<InboundMessage>> {
        let output = self.client
            .receive_message()
            .queue_url(&request.queue_url)
            .max_number_of_messages(request.max_number_of_messages)
            .visibility_timeout(request.visibility_timeout)
            .wait_time_seconds(request.wait_time_seconds)
            .message_system_attribute_names(MessageSystemAttributeName::All)
            .message_attribute_names("All")
            .send()
            .await
            .with_context(|| {
                format!("Failed to receive messages from queue: {}", request.queue_url)
            })?;

        let messages: Vec<InboundMessage> =
            output.messages().iter().map(InboundMessage::from).collect();
        log::debug!("Received {} messages from {}", messages.len(), request.queue_url);

        Ok(messages)
    }

    #[instrument(skip(self, receipt_handle))]
    async fn delete_message(&self, queue_url: &str, receipt_handle: &str) -> Result<()> {
        self.client
            .delete_message()
            .queue_url(queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .with_context(|| format!("Failed to delete message from queue: {}", queue_url))?;

        Ok(())
    }
}
