use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use super::sqs::{InboundMessage, ReceiveRequest};

#[async_trait]
pub trait SqsOperations: Send + Sync {
    async fn receive_messages(&self, request: &ReceiveRequest) -> Result<Vec<InboundMessage>>;
    async fn delete_message(&self, queue_url: &str, receipt_handle: &str) -> Result<()>;
}

#[async_trait]
pub trait SnsOperations: Send + Sync {
    async fn publish(&self, topic_arn: &str, message: &str) -> Result<Option<String>>;
}

/// Lets callers keep a handle on a shared backend after giving one to a
/// `Consumer`.
#[async_trait]
impl<T: SqsOperations + ?Sized> SqsOperations for Arc<T> {
    async fn receive_messages(&self, request: &ReceiveRequest) -> Result<Vec<InboundMessage>> {
        (**self).receive_messages(request).await
    }

    async fn delete_message(&self, queue_url: &str, receipt_handle: &str) -> Result<()> {
        (**self).delete_message(queue_url, receipt_handle).await
    }
}

#[async_trait]
impl<T: SnsOperations + ?Sized> SnsOperations for Arc<T> {
    async fn publish(&self, topic_arn: &str, message: &str) -> Result<Option<String>> {
        (**self).publish(topic_arn, message).await
    }
}
