use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_sns::Client as SnsClient;
use tracing::instrument;

use super::traits::SnsOperations;

pub struct SnsModule {
    client: SnsClient,
}

impl SnsModule {
    pub fn new(client: SnsClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SnsOperations for SnsModule {
    #[instrument(skip(self, message), fields(message_len = message.len()))]
    async fn publish(&self, topic_arn: &str, message: &str) -> Result<Option<String>> {
        let output = self.client
            .publish()
            .topic_arn(topic_arn)
            .message(message)
            .send()
            .await
            .with_context(|| format!("Failed to publish to topic: {}", topic_arn))?;

        Ok(output.message_id().map(str::to_string))
    }
}
