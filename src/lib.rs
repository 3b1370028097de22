//! Building blocks for queue-driven services: a long-polling queue
//! [`listener`](crate::listener) and a topic [`publisher`](crate::publisher),
//! both thin adapters over the AWS SDK.

pub mod aws;
pub mod config;
pub mod error;
pub mod listener;
pub mod publisher;
pub mod telemetry;

pub use error::{ConfigError, ErrorKind, ListenerError, PublishError};
pub use listener::{Consumer, ConsumerConfig, ErrorSink, Message};
pub use publisher::{Publisher, PublisherConfig};
