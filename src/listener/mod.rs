//! Queue consumer.
//!
//! A [`Consumer`] long-polls a queue, hands each message to a caller supplied
//! processor and deletes it afterwards. Nothing that goes wrong at runtime
//! stops the loop: poll, decode, processing and delete failures all land on
//! the caller's [`ErrorSink`] and polling carries on. Delivery is
//! at-least-once, so processors must tolerate duplicates.
//!
//! Messages in a batch are handled one after the other. A batch that takes
//! longer than the visibility timeout can see its tail redelivered to another
//! consumer before it is deleted here.

pub mod config;
pub mod message;
pub mod processor;
pub mod sink;

use std::time::Duration;

use async_trait::async_trait;
use aws_config::SdkConfig;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

use crate::aws::clients::{InboundMessage, ReceiveRequest, SqsModule, SqsOperations};
use crate::aws::utils::sqs_client;
use crate::error::{ConfigError, ListenerError};

pub use config::{AckPolicy, Backoff, BackoffConfig, ConsumerConfig, ListenerSettings};
pub use message::Message;
pub use processor::{Processor, RawProcessor};
pub use sink::ErrorSink;

pub struct Consumer<C = SqsModule> {
    client: C,
    settings: ListenerSettings,
    request: ReceiveRequest,
}

impl Consumer<SqsModule> {
    /// Builds a consumer backed by SQS. No request is made until listening
    /// starts.
    pub fn new(sdk_config: &SdkConfig, config: ConsumerConfig) -> Result<Self, ConfigError> {
        let settings = config.resolve()?;
        let client = sqs_client(sdk_config, settings.endpoint.as_deref())?;
        Ok(Self::from_parts(client, settings))
    }
}

impl<C: SqsOperations> Consumer<C> {
    /// Builds a consumer on top of any backend implementing [`SqsOperations`].
    pub fn with_client(client: C, config: ConsumerConfig) -> Result<Self, ConfigError> {
        Ok(Self::from_parts(client, config.resolve()?))
    }

    fn from_parts(client: C, settings: ListenerSettings) -> Self {
        let request = ReceiveRequest {
            queue_url: settings.queue_url.clone(),
            max_number_of_messages: settings.max_number_of_messages,
            visibility_timeout: settings.visibility_timeout,
            wait_time_seconds: settings.wait_time_seconds,
        };
        Self { client, settings, request }
    }

    pub fn settings(&self) -> &ListenerSettings {
        &self.settings
    }

    /// Decodes every message as a [`Message`] envelope and feeds it to
    /// `processor`. Never returns; run it on its own task.
    pub async fn listen<P: Processor>(&self, processor: P, errors: impl Into<ErrorSink>) {
        self.listen_until(processor, errors, CancellationToken::new()).await
    }

    /// Like [`Consumer::listen`] but returns once `token` is cancelled.
    pub async fn listen_until<P: Processor>(
        &self,
        processor: P,
        errors: impl Into<ErrorSink>,
        token: CancellationToken,
    ) {
        self.run(&Decoded(processor), &errors.into(), &token).await
    }

    /// Feeds the raw body of every message to `processor` without decoding it.
    /// Returns once `token` is cancelled.
    pub async fn listen_raw<P: RawProcessor>(
        &self,
        processor: P,
        errors: impl Into<ErrorSink>,
        token: CancellationToken,
    ) {
        self.run(&Raw(processor), &errors.into(), &token).await
    }

    #[instrument(name = "listen", skip_all, fields(queue_url = %self.settings.queue_url))]
    async fn run<D: Dispatch>(&self, dispatch: &D, errors: &ErrorSink, token: &CancellationToken) {
        info!(
            max_number_of_messages = self.settings.max_number_of_messages,
            visibility_timeout = self.settings.visibility_timeout,
            wait_time_seconds = self.settings.wait_time_seconds,
            "Listening for messages"
        );

        let mut backoff = self.settings.backoff.map(BackoffState::new);

        loop {
            if token.is_cancelled() {
                info!("Listener cancelled, stopping");
                return;
            }

            let received = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    errors.report(ListenerError::Cancelled("receive")).await;
                    return;
                }
                result = self.client.receive_messages(&self.request) => result,
            };

            let messages = match received {
                Ok(messages) => {
                    if let Some(state) = backoff.as_mut() {
                        state.reset();
                    }
                    messages
                }
                Err(e) => {
                    errors.report(ListenerError::Poll(e)).await;
                    if let Some(state) = backoff.as_mut() {
                        let delay = state.next_delay();
                        warn!("Receive failed, polling again in {:?}", delay);
                        tokio::select! {
                            _ = token.cancelled() => {}
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                    continue;
                }
            };

            if messages.is_empty() {
                trace!("No messages received");
                continue;
            }

            debug!("Received batch of {} messages", messages.len());
            for message in &messages {
                if token.is_cancelled() {
                    warn!("Listener cancelled mid-batch, remaining messages will be redelivered");
                    break;
                }
                self.handle(dispatch, message, errors, token).await;
            }
        }
    }

    #[instrument(skip_all, fields(message_id = %message.display_id()))]
    async fn handle<D: Dispatch>(
        &self,
        dispatch: &D,
        message: &InboundMessage,
        errors: &ErrorSink,
        token: &CancellationToken,
    ) {
        let acknowledge = match dispatch.dispatch(message, token).await {
            Ok(()) => true,
            Err(e) => {
                let acknowledge = self.settings.ack_policy.acknowledges_failure(e.kind());
                errors.report(e).await;
                acknowledge
            }
        };

        if acknowledge {
            self.acknowledge(message, errors, token).await;
        } else {
            debug!("Leaving message on the queue for redelivery");
        }
    }

    async fn acknowledge(
        &self,
        message: &InboundMessage,
        errors: &ErrorSink,
        token: &CancellationToken,
    ) {
        let Some(receipt_handle) = message.receipt_handle.as_deref() else {
            errors
                .report(ListenerError::Delete {
                    message_id: message.display_id().to_string(),
                    source: anyhow::anyhow!("message has no receipt handle"),
                })
                .await;
            return;
        };

        let result = tokio::select! {
            biased;
            _ = token.cancelled() => {
                errors.report(ListenerError::Cancelled("delete")).await;
                return;
            }
            result = self.client.delete_message(&self.settings.queue_url, receipt_handle) => result,
        };

        match result {
            Ok(()) => trace!("Deleted message"),
            Err(source) => {
                errors
                    .report(ListenerError::Delete {
                        message_id: message.display_id().to_string(),
                        source,
                    })
                    .await
            }
        }
    }
}

/// Turns an inbound message into a processor call.
#[async_trait]
trait Dispatch: Send + Sync {
    async fn dispatch(
        &self,
        message: &InboundMessage,
        token: &CancellationToken,
    ) -> Result<(), ListenerError>;
}

struct Decoded<P>(P);

#[async_trait]
impl<P: Processor> Dispatch for Decoded<P> {
    async fn dispatch(
        &self,
        message: &InboundMessage,
        _token: &CancellationToken,
    ) -> Result<(), ListenerError> {
        let decoded = Message::decode(&message.body).map_err(|source| ListenerError::Decode {
            message_id: message.display_id().to_string(),
            source,
        })?;

        self.0
            .process(decoded)
            .await
            .map_err(|source| ListenerError::Processing {
                message_id: message.display_id().to_string(),
                source,
            })
    }
}

struct Raw<P>(P);

#[async_trait]
impl<P: RawProcessor> Dispatch for Raw<P> {
    async fn dispatch(
        &self,
        message: &InboundMessage,
        token: &CancellationToken,
    ) -> Result<(), ListenerError> {
        let payload = Bytes::from(message.body.clone());
        self.0
            .process(token.clone(), payload)
            .await
            .map_err(|source| ListenerError::Processing {
                message_id: message.display_id().to_string(),
                source,
            })
    }
}

/// Capped exponential delay between consecutive failed polls.
struct BackoffState {
    policy: Backoff,
    current: Option<Duration>,
}

impl BackoffState {
    fn new(policy: Backoff) -> Self {
        Self { policy, current: None }
    }

    fn next_delay(&mut self) -> Duration {
        let delay = match self.current {
            None => self.policy.initial,
            Some(current) => current.saturating_mul(2).min(self.policy.max),
        };
        self.current = Some(delay);
        delay
    }

    fn reset(&mut self) {
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use anyhow::{anyhow, Result};
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    const QUEUE_URL: &str = "http://localhost:4566/000000000000/orders";

    fn envelope(id: &str, text: &str) -> String {
        format!(
            r#"{{"Type":"Notification","MessageId":"{}","TopicArn":"arn:aws:sns:eu-west-2:000000000000:orders","Message":"{}","Timestamp":"2024-01-01T00:00:00Z"}}"#,
            id, text
        )
    }

    /// Serves scripted poll results, then cancels the token once the script
    /// runs out so the loop under test terminates.
    struct MockSqs {
        polls: Mutex<VecDeque<Result<Vec<InboundMessage>>>>,
        poll_count: Mutex<usize>,
        deleted: Mutex<Vec<String>>,
        failing_deletes: Vec<String>,
        token: CancellationToken,
    }

    impl MockSqs {
        fn new(polls: Vec<Result<Vec<InboundMessage>>>, token: CancellationToken) -> Self {
            Self {
                polls: Mutex::new(polls.into()),
                poll_count: Mutex::new(0),
                deleted: Mutex::new(Vec::new()),
                failing_deletes: Vec::new(),
                token,
            }
        }

        fn deleted(&self) -> Vec<String> {
            self.deleted.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SqsOperations for MockSqs {
        async fn receive_messages(&self, request: &ReceiveRequest) -> Result<Vec<InboundMessage>> {
            assert_eq!(request.queue_url, QUEUE_URL);
            *self.poll_count.lock().unwrap() += 1;
            let next = self.polls.lock().unwrap().pop_front();
            match next {
                Some(result) => result,
                None => {
                    self.token.cancel();
                    Ok(Vec::new())
                }
            }
        }

        async fn delete_message(&self, queue_url: &str, receipt_handle: &str) -> Result<()> {
            assert_eq!(queue_url, QUEUE_URL);
            self.deleted.lock().unwrap().push(receipt_handle.to_string());
            if self.failing_deletes.iter().any(|h| h == receipt_handle) {
                return Err(anyhow!("receipt handle is invalid"));
            }
            Ok(())
        }
    }

    fn drain(rx: &mut tokio::sync::mpsc::UnboundedReceiver<ListenerError>) -> Vec<ListenerError> {
        let mut errors = Vec::new();
        while let Ok(e) = rx.try_recv() {
            errors.push(e);
        }
        errors
    }

    #[tokio::test]
    async fn test_empty_batch_repolls_without_side_effects() {
        let token = CancellationToken::new();
        let mock = Arc::new(MockSqs::new(vec![Ok(vec![]), Ok(vec![])], token.clone()));
        let consumer = Consumer::with_client(mock.clone(), ConsumerConfig::new(QUEUE_URL)).unwrap();
        let calls = Arc::new(Mutex::new(0));
        let (sink, mut rx) = ErrorSink::unbounded();

        let counter = calls.clone();
        consumer
            .listen_until(
                move |_m: Message| {
                    let counter = counter.clone();
                    async move {
                        *counter.lock().unwrap() += 1;
                        anyhow::Ok(())
                    }
                },
                sink,
                token,
            )
            .await;

        assert_eq!(*mock.poll_count.lock().unwrap(), 3);
        assert_eq!(*calls.lock().unwrap(), 0);
        assert!(mock.deleted().is_empty());
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_poll_error_is_reported_and_loop_continues() {
        let token = CancellationToken::new();
        let mock = Arc::new(MockSqs::new(
            vec![
                Err(anyhow!("throttled")),
                Ok(vec![InboundMessage::new("1", envelope("1", "hi"), "rh-1")]),
            ],
            token.clone(),
        ));
        let consumer = Consumer::with_client(mock.clone(), ConsumerConfig::new(QUEUE_URL)).unwrap();
        let (sink, mut rx) = ErrorSink::unbounded();

        consumer
            .listen_until(|_m: Message| async { anyhow::Ok(()) }, sink, token)
            .await;

        let errors = drain(&mut rx);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind(), ErrorKind::Poll);
        assert!(errors[0].to_string().contains("throttled"));
        assert_eq!(mock.deleted(), vec!["rh-1"]);
    }

    #[tokio::test]
    async fn test_processing_failure_still_deletes_whole_batch() {
        let token = CancellationToken::new();
        let batch = vec![
            InboundMessage::new("1", envelope("1", "a"), "rh-1"),
            InboundMessage::new("2", envelope("2", "fail"), "rh-2"),
            InboundMessage::new("3", envelope("3", "c"), "rh-3"),
        ];
        let mock = Arc::new(MockSqs::new(vec![Ok(batch)], token.clone()));
        let consumer = Consumer::with_client(mock.clone(), ConsumerConfig::new(QUEUE_URL)).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (sink, mut rx) = ErrorSink::unbounded();

        let recorder = seen.clone();
        consumer
            .listen_until(
                move |m: Message| {
                    let recorder = recorder.clone();
                    async move {
                        recorder.lock().unwrap().push(m.message.clone());
                        if m.message == "fail" {
                            anyhow::bail!("boom");
                        }
                        anyhow::Ok(())
                    }
                },
                sink,
                token,
            )
            .await;

        assert_eq!(*seen.lock().unwrap(), vec!["a", "fail", "c"]);
        assert_eq!(mock.deleted(), vec!["rh-1", "rh-2", "rh-3"]);

        let errors = drain(&mut rx);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind(), ErrorKind::Processing);
        assert_eq!(errors[0].message_id(), Some("2"));
    }

    #[tokio::test]
    async fn test_on_success_policy_keeps_failed_messages() {
        let token = CancellationToken::new();
        let batch = vec![
            InboundMessage::new("1", envelope("1", "fail"), "rh-1"),
            InboundMessage::new("2", "garbage", "rh-2"),
            InboundMessage::new("3", envelope("3", "ok"), "rh-3"),
        ];
        let mock = Arc::new(MockSqs::new(vec![Ok(batch)], token.clone()));
        let config = ConsumerConfig::new(QUEUE_URL).ack_policy(AckPolicy::OnSuccess);
        let consumer = Consumer::with_client(mock.clone(), config).unwrap();
        let (sink, mut rx) = ErrorSink::unbounded();

        consumer
            .listen_until(
                |m: Message| async move {
                    if m.message == "fail" {
                        anyhow::bail!("boom");
                    }
                    anyhow::Ok(())
                },
                sink,
                token,
            )
            .await;

        assert_eq!(mock.deleted(), vec!["rh-3"]);
        let kinds: Vec<_> = drain(&mut rx).iter().map(|e| e.kind()).collect();
        assert_eq!(kinds, vec![ErrorKind::Processing, ErrorKind::Decode]);
    }

    #[tokio::test]
    async fn test_missing_receipt_handle_is_a_delete_error() {
        let token = CancellationToken::new();
        let message = InboundMessage {
            message_id: Some("1".to_string()),
            body: envelope("1", "hi"),
            receipt_handle: None,
            ..Default::default()
        };
        let mock = Arc::new(MockSqs::new(vec![Ok(vec![message])], token.clone()));
        let consumer = Consumer::with_client(mock.clone(), ConsumerConfig::new(QUEUE_URL)).unwrap();
        let (sink, mut rx) = ErrorSink::unbounded();

        consumer
            .listen_until(|_m: Message| async { anyhow::Ok(()) }, sink, token)
            .await;

        assert!(mock.deleted().is_empty());
        let errors = drain(&mut rx);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind(), ErrorKind::Delete);
    }

    #[tokio::test]
    async fn test_delete_failure_is_not_retried() {
        let token = CancellationToken::new();
        let batch = vec![
            InboundMessage::new("1", envelope("1", "a"), "rh-1"),
            InboundMessage::new("2", envelope("2", "b"), "rh-2"),
        ];
        let mut mock = MockSqs::new(vec![Ok(batch)], token.clone());
        mock.failing_deletes = vec!["rh-1".to_string()];
        let mock = Arc::new(mock);
        let consumer = Consumer::with_client(mock.clone(), ConsumerConfig::new(QUEUE_URL)).unwrap();
        let (sink, mut rx) = ErrorSink::unbounded();

        consumer
            .listen_until(|_m: Message| async { anyhow::Ok(()) }, sink, token)
            .await;

        assert_eq!(mock.deleted(), vec!["rh-1", "rh-2"]);
        let errors = drain(&mut rx);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind(), ErrorKind::Delete);
        assert_eq!(errors[0].message_id(), Some("1"));
    }

    #[tokio::test]
    async fn test_raw_processor_receives_body_and_token() {
        let token = CancellationToken::new();
        let mock = Arc::new(MockSqs::new(
            vec![Ok(vec![InboundMessage::new("1", "plain text", "rh-1")])],
            token.clone(),
        ));
        let consumer = Consumer::with_client(mock.clone(), ConsumerConfig::new(QUEUE_URL)).unwrap();
        let payloads = Arc::new(Mutex::new(Vec::new()));
        let (sink, mut rx) = ErrorSink::unbounded();

        let recorder = payloads.clone();
        consumer
            .listen_raw(
                move |token: CancellationToken, payload: Bytes| {
                    let recorder = recorder.clone();
                    async move {
                        assert!(!token.is_cancelled());
                        recorder.lock().unwrap().push(payload);
                        anyhow::Ok(())
                    }
                },
                sink,
                token,
            )
            .await;

        assert_eq!(*payloads.lock().unwrap(), vec![Bytes::from_static(b"plain text")]);
        assert_eq!(mock.deleted(), vec!["rh-1"]);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_mid_batch_abandons_the_rest() {
        let token = CancellationToken::new();
        let batch = vec![
            InboundMessage::new("1", envelope("1", "stop"), "rh-1"),
            InboundMessage::new("2", envelope("2", "b"), "rh-2"),
        ];
        let mock = Arc::new(MockSqs::new(vec![Ok(batch)], token.clone()));
        let consumer = Consumer::with_client(mock.clone(), ConsumerConfig::new(QUEUE_URL)).unwrap();
        let (sink, mut rx) = ErrorSink::unbounded();

        let canceller = token.clone();
        consumer
            .listen_until(
                move |_m: Message| {
                    let canceller = canceller.clone();
                    async move {
                        canceller.cancel();
                        anyhow::Ok(())
                    }
                },
                sink,
                token,
            )
            .await;

        // The delete for the first message observes the cancellation.
        assert!(mock.deleted().is_empty());
        assert_eq!(*mock.poll_count.lock().unwrap(), 1);
        let errors = drain(&mut rx);
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], ListenerError::Cancelled("delete")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_between_failed_polls() {
        let token = CancellationToken::new();
        let mock = Arc::new(MockSqs::new(
            vec![Err(anyhow!("down")), Err(anyhow!("down")), Err(anyhow!("down"))],
            token.clone(),
        ));
        let config = ConsumerConfig::new(QUEUE_URL)
            .backoff(Duration::from_millis(100), Duration::from_millis(150));
        let consumer = Consumer::with_client(mock.clone(), config).unwrap();
        let (sink, mut rx) = ErrorSink::unbounded();

        let started = tokio::time::Instant::now();
        consumer
            .listen_until(|_m: Message| async { anyhow::Ok(()) }, sink, token)
            .await;

        // 100ms, then 150ms twice once the cap kicks in.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(400), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_millis(500), "elapsed {:?}", elapsed);
        assert_eq!(drain(&mut rx).len(), 3);
    }

    #[test]
    fn test_backoff_state_resets() {
        let mut state = BackoffState::new(Backoff {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(3),
        });
        assert_eq!(state.next_delay(), Duration::from_secs(1));
        assert_eq!(state.next_delay(), Duration::from_secs(2));
        assert_eq!(state.next_delay(), Duration::from_secs(3));
        assert_eq!(state.next_delay(), Duration::from_secs(3));
        state.reset();
        assert_eq!(state.next_delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_backoff_state_saturates_with_unbounded_max() {
        let mut state = BackoffState::new(Backoff {
            initial: Duration::from_secs(1),
            max: Duration::MAX,
        });
        let mut delay = Duration::ZERO;
        for _ in 0..100 {
            let next = state.next_delay();
            assert!(next >= delay);
            delay = next;
        }
        assert_eq!(delay, Duration::MAX);
    }
}
