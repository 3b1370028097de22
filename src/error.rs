//! Error types shared by the listener and the publisher.
//!
//! Construction problems surface synchronously as [`ConfigError`]. Everything
//! that goes wrong inside a running listen loop becomes a [`ListenerError`]
//! and is handed to the caller's error sink instead of stopping the loop.
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("queue url must not be empty")]
    EmptyQueueUrl,

    #[error("topic arn must not be empty")]
    EmptyTopicArn,

    #[error("invalid endpoint override '{endpoint}': {source}")]
    InvalidEndpoint {
        endpoint: String,
        #[source]
        source: url::ParseError,
    },

    #[error("max_number_of_messages must be between 1 and 10, got {0}")]
    MaxNumberOfMessages(i32),

    #[error("visibility_timeout must be between 0 and 43200 seconds, got {0}")]
    VisibilityTimeout(i32),

    #[error("wait_time_seconds must be between 0 and 20, got {0}")]
    WaitTimeSeconds(i32),

    #[error("invalid backoff: {0}")]
    Backoff(String),

    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Coarse classification of a [`ListenerError`], handy for metrics or for
/// deciding how loudly to complain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Poll,
    Decode,
    Processing,
    Delete,
    Cancelled,
}

#[derive(Error, Debug)]
pub enum ListenerError {
    /// The receive call failed. The loop polls again straight away unless a
    /// backoff is configured.
    #[error("failed to receive messages: {0:#}")]
    Poll(#[source] anyhow::Error),

    /// The body was not a valid notification envelope.
    #[error("failed to decode message {message_id}: {source}")]
    Decode {
        message_id: String,
        #[source]
        source: serde_json::Error,
    },

    /// Raised by the caller's processor.
    #[error("failed to process message {message_id}: {source:#}")]
    Processing {
        message_id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to delete message {message_id}: {source:#}")]
    Delete {
        message_id: String,
        #[source]
        source: anyhow::Error,
    },

    /// The cancellation token fired while a backend call was in flight.
    #[error("listener cancelled during {0}")]
    Cancelled(&'static str),
}

impl ListenerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ListenerError::Poll(_) => ErrorKind::Poll,
            ListenerError::Decode { .. } => ErrorKind::Decode,
            ListenerError::Processing { .. } => ErrorKind::Processing,
            ListenerError::Delete { .. } => ErrorKind::Delete,
            ListenerError::Cancelled(_) => ErrorKind::Cancelled,
        }
    }

    /// Id of the message the error relates to, when there is one.
    pub fn message_id(&self) -> Option<&str> {
        match self {
            ListenerError::Decode { message_id, .. }
            | ListenerError::Processing { message_id, .. }
            | ListenerError::Delete { message_id, .. } => Some(message_id),
            ListenerError::Poll(_) | ListenerError::Cancelled(_) => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum PublishError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to serialize message: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to publish to {topic_arn}: {source:#}")]
    Publish {
        topic_arn: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("publish to {0} returned no message id")]
    MissingMessageId(String),
}
