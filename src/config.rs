use core::fmt;
use std::env;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::listener::ConsumerConfig;
use crate::publisher::PublisherConfig;

pub const ENV_QUEUE_URL: &str = "SVCKIT_QUEUE_URL";
pub const ENV_TOPIC_ARN: &str = "SVCKIT_TOPIC_ARN";
pub const ENV_ENDPOINT: &str = "SVCKIT_ENDPOINT";
pub const ENV_REGION: &str = "AWS_REGION";

/// Configuration for the `svckit` binary. Loaded from YAML, then overlaid by
/// environment variables and finally by command line flags.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub region: Option<String>,
    /// Endpoint override shared by both sections. A section's own
    /// `endpoint` takes precedence over this one.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub listener: Option<ConsumerConfig>,
    #[serde(default)]
    pub publisher: Option<PublisherConfig>,
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let queue = self.listener.as_ref().map(|l| l.queue_url.as_str()).unwrap_or("-");
        let topic = self.publisher.as_ref().map(|p| p.topic_arn.as_str()).unwrap_or("-");
        write!(f, "queue {} topic {}", queue, topic)
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Reads the optional file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// The listener section, or defaults when absent, with the shared
    /// endpoint filled in.
    pub fn listener_config(&self) -> ConsumerConfig {
        let mut listener = self.listener.clone().unwrap_or_default();
        if listener.endpoint.is_none() {
            listener.endpoint = self.endpoint.clone();
        }
        listener
    }

    pub fn publisher_config(&self) -> PublisherConfig {
        let mut publisher = self.publisher.clone().unwrap_or_default();
        if publisher.endpoint.is_none() {
            publisher.endpoint = self.endpoint.clone();
        }
        publisher
    }

    pub fn apply_env(&mut self) {
        if let Ok(region) = env::var(ENV_REGION) {
            self.region = Some(region);
        }

        let endpoint = env::var(ENV_ENDPOINT).ok();

        if let Ok(queue_url) = env::var(ENV_QUEUE_URL) {
            self.listener.get_or_insert_with(ConsumerConfig::default).queue_url = queue_url;
        }
        if let Ok(topic_arn) = env::var(ENV_TOPIC_ARN) {
            self.publisher.get_or_insert_with(PublisherConfig::default).topic_arn = topic_arn;
        }

        if let Some(endpoint) = endpoint {
            if let Some(listener) = self.listener.as_mut() {
                listener.endpoint = Some(endpoint.clone());
            }
            if let Some(publisher) = self.publisher.as_mut() {
                publisher.endpoint = Some(endpoint.clone());
            }
            self.endpoint = Some(endpoint);
        }
    }
}
