use std::time::Duration;

use duration_string::DurationString;
use serde::{Deserialize, Serialize};

use crate::aws::utils::parse_endpoint;
use crate::error::{ConfigError, ErrorKind};

pub const DEFAULT_MAX_NUMBER_OF_MESSAGES: i32 = 10;
pub const DEFAULT_VISIBILITY_TIMEOUT: i32 = 5;
pub const DEFAULT_WAIT_TIME_SECONDS: i32 = 10;

const MAX_VISIBILITY_TIMEOUT: i32 = 43_200;
const MAX_WAIT_TIME_SECONDS: i32 = 20;

/// When a delivered message gets deleted from the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckPolicy {
    /// Delete once the processor has run, whatever it returned. Bodies that
    /// fail to decode never reach the processor and stay on the queue.
    #[default]
    AfterProcessing,
    /// Delete every delivered message, undecodable ones included.
    Always,
    /// Delete only when decoding and processing both succeed, so failures
    /// come back after the visibility timeout.
    OnSuccess,
}

impl AckPolicy {
    /// Whether a message whose handling failed with `kind` is still deleted.
    pub fn acknowledges_failure(self, kind: ErrorKind) -> bool {
        match self {
            AckPolicy::AfterProcessing => kind == ErrorKind::Processing,
            AckPolicy::Always => true,
            AckPolicy::OnSuccess => false,
        }
    }
}

/// Delay applied between consecutive failed polls, doubling up to `max`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    pub initial: DurationString,
    pub max: DurationString,
}

impl BackoffConfig {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial: DurationString::from(initial),
            max: DurationString::from(max),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
}

/// User-facing consumer configuration. Any field left unset falls back to its
/// default when the consumer is built.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsumerConfig {
    pub queue_url: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub max_number_of_messages: Option<i32>,
    #[serde(default)]
    pub visibility_timeout: Option<i32>,
    #[serde(default)]
    pub wait_time_seconds: Option<i32>,
    #[serde(default)]
    pub ack_policy: AckPolicy,
    #[serde(default)]
    pub backoff: Option<BackoffConfig>,
}

impl ConsumerConfig {
    pub fn new(queue_url: impl Into<String>) -> Self {
        Self {
            queue_url: queue_url.into(),
            ..Default::default()
        }
    }

    /// Points the client at a different endpoint, e.g. LocalStack.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn max_number_of_messages(mut self, n: i32) -> Self {
        self.max_number_of_messages = Some(n);
        self
    }

    pub fn visibility_timeout(mut self, seconds: i32) -> Self {
        self.visibility_timeout = Some(seconds);
        self
    }

    pub fn wait_time_seconds(mut self, seconds: i32) -> Self {
        self.wait_time_seconds = Some(seconds);
        self
    }

    pub fn ack_policy(mut self, policy: AckPolicy) -> Self {
        self.ack_policy = policy;
        self
    }

    pub fn backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.backoff = Some(BackoffConfig::new(initial, max));
        self
    }

    /// Validates the configuration and fills in defaults.
    pub fn resolve(self) -> Result<ListenerSettings, ConfigError> {
        let queue_url = self.queue_url.trim().to_string();
        if queue_url.is_empty() {
            return Err(ConfigError::EmptyQueueUrl);
        }

        let endpoint = self.endpoint.as_deref().map(parse_endpoint).transpose()?;

        let max_number_of_messages = self
            .max_number_of_messages
            .unwrap_or(DEFAULT_MAX_NUMBER_OF_MESSAGES);
        if !(1..=10).contains(&max_number_of_messages) {
            return Err(ConfigError::MaxNumberOfMessages(max_number_of_messages));
        }

        let visibility_timeout = self.visibility_timeout.unwrap_or(DEFAULT_VISIBILITY_TIMEOUT);
        if !(0..=MAX_VISIBILITY_TIMEOUT).contains(&visibility_timeout) {
            return Err(ConfigError::VisibilityTimeout(visibility_timeout));
        }

        let wait_time_seconds = self.wait_time_seconds.unwrap_or(DEFAULT_WAIT_TIME_SECONDS);
        if !(0..=MAX_WAIT_TIME_SECONDS).contains(&wait_time_seconds) {
            return Err(ConfigError::WaitTimeSeconds(wait_time_seconds));
        }

        let backoff = match self.backoff {
            Some(BackoffConfig { initial, max }) => {
                let initial: Duration = initial.into();
                let max: Duration = max.into();
                if initial.is_zero() {
                    return Err(ConfigError::Backoff(
                        "initial delay must be greater than zero".to_string(),
                    ));
                }
                if max < initial {
                    return Err(ConfigError::Backoff(format!(
                        "max delay {:?} is shorter than initial delay {:?}",
                        max, initial
                    )));
                }
                Some(Backoff { initial, max })
            }
            None => None,
        };

        Ok(ListenerSettings {
            queue_url,
            endpoint,
            max_number_of_messages,
            visibility_timeout,
            wait_time_seconds,
            ack_policy: self.ack_policy,
            backoff,
        })
    }
}

/// Validated settings. Frozen once the consumer owns them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerSettings {
    pub queue_url: String,
    pub endpoint: Option<String>,
    pub max_number_of_messages: i32,
    pub visibility_timeout: i32,
    pub wait_time_seconds: i32,
    pub ack_policy: AckPolicy,
    pub backoff: Option<Backoff>,
}
