use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::ListenerError;

/// Where a running listener sends the errors it swallows.
///
/// A bounded sink applies backpressure: once it is full the listen loop waits
/// on the send and stops consuming until the caller drains it. Use the
/// unbounded flavour, or drain from a dedicated task, if that is not wanted.
#[derive(Debug, Clone)]
pub enum ErrorSink {
    Bounded(mpsc::Sender<ListenerError>),
    Unbounded(mpsc::UnboundedSender<ListenerError>),
}

impl ErrorSink {
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<ListenerError>) {
        let (tx, rx) = mpsc::channel(capacity);
        (ErrorSink::Bounded(tx), rx)
    }

    pub fn unbounded() -> (Self, mpsc::UnboundedReceiver<ListenerError>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ErrorSink::Unbounded(tx), rx)
    }

    /// Hands the error to the caller. A closed sink is logged and otherwise
    /// ignored so the loop keeps running.
    pub async fn report(&self, error: ListenerError) {
        debug!(kind = ?error.kind(), error = %error, "Reporting listener error");

        let result = match self {
            ErrorSink::Bounded(tx) => tx.send(error).await.map_err(|e| e.0),
            ErrorSink::Unbounded(tx) => tx.send(error).map_err(|e| e.0),
        };

        if let Err(error) = result {
            warn!(error = %error, "Error sink closed, dropping listener error");
        }
    }
}

impl From<mpsc::Sender<ListenerError>> for ErrorSink {
    fn from(tx: mpsc::Sender<ListenerError>) -> Self {
        ErrorSink::Bounded(tx)
    }
}

impl From<mpsc::UnboundedSender<ListenerError>> for ErrorSink {
    fn from(tx: mpsc::UnboundedSender<ListenerError>) -> Self {
        ErrorSink::Unbounded(tx)
    }
}
