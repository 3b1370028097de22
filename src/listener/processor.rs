use std::future::Future;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use super::message::Message;

/// Business logic run for every decoded envelope.
///
/// Implemented for any `Fn(Message) -> impl Future<Output = anyhow::Result<()>>`,
/// so a plain async closure works.
#[async_trait]
pub trait Processor: Send + Sync {
    async fn process(&self, message: Message) -> Result<()>;
}

#[async_trait]
impl<F, Fut> Processor for F
where
    F: Fn(Message) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn process(&self, message: Message) -> Result<()> {
        (self)(message).await
    }
}

/// Business logic run against the undecoded body. Receives the listener's
/// cancellation token so long-running work can stop early.
#[async_trait]
pub trait RawProcessor: Send + Sync {
    async fn process(&self, token: CancellationToken, payload: Bytes) -> Result<()>;
}

#[async_trait]
impl<F, Fut> RawProcessor for F
where
    F: Fn(CancellationToken, Bytes) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn process(&self, token: CancellationToken, payload: Bytes) -> Result<()> {
        (self)(token, payload).await
    }
}
