//! Topic publisher.
//!
//! The publisher is an ordinary owned value. Callers that need one shared
//! instance keep it in their own state (an `Arc` or app context) rather than
//! in a process-wide global.

use aws_config::SdkConfig;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::aws::clients::{SnsModule, SnsOperations};
use crate::aws::utils::{parse_endpoint, sns_client};
use crate::error::{ConfigError, PublishError};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PublisherConfig {
    pub topic_arn: String,
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl PublisherConfig {
    pub fn new(topic_arn: impl Into<String>) -> Self {
        Self {
            topic_arn: topic_arn.into(),
            endpoint: None,
        }
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.topic_arn.trim().is_empty() {
            return Err(ConfigError::EmptyTopicArn);
        }
        if let Some(endpoint) = &self.endpoint {
            parse_endpoint(endpoint)?;
        }
        Ok(())
    }
}

pub struct Publisher<C = SnsModule> {
    client: C,
    topic_arn: String,
}

impl Publisher<SnsModule> {
    pub fn new(sdk_config: &SdkConfig, config: PublisherConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let client = sns_client(sdk_config, config.endpoint.as_deref())?;
        Ok(Self {
            client,
            topic_arn: config.topic_arn,
        })
    }
}

impl<C: SnsOperations> Publisher<C> {
    pub fn with_client(client: C, config: PublisherConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            client,
            topic_arn: config.topic_arn,
        })
    }

    pub fn topic_arn(&self) -> &str {
        &self.topic_arn
    }

    /// Publishes `message` to the configured topic and returns the message id
    /// assigned by the backend.
    #[instrument(skip(self, message), fields(topic_arn = %self.topic_arn))]
    pub async fn publish(&self, message: &str) -> Result<String, PublishError> {
        let message_id = self
            .client
            .publish(&self.topic_arn, message)
            .await
            .map_err(|source| PublishError::Publish {
                topic_arn: self.topic_arn.clone(),
                source,
            })?
            .ok_or_else(|| PublishError::MissingMessageId(self.topic_arn.clone()))?;

        debug!(message_id = %message_id, "Published message");
        Ok(message_id)
    }

    pub async fn publish_json<T: Serialize + Sync>(
        &self,
        value: &T,
    ) -> Result<String, PublishError> {
        let message = serde_json::to_string(value)?;
        self.publish(&message).await
    }
}
