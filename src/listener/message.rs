use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Notification envelope carried in the body of a queue message, as written by
/// a topic fan-out. Unknown fields such as signatures are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "Type")]
    pub message_type: String,
    #[serde(rename = "MessageId")]
    pub message_id: String,
    #[serde(rename = "TopicArn")]
    pub topic_arn: String,
    /// The payload text published to the topic.
    #[serde(rename = "Message")]
    pub message: String,
    #[serde(rename = "Timestamp")]
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn decode(body: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(body)
    }
}
