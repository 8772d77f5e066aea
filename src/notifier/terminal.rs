use error_stack::Report;
use futures::future::BoxFuture;

use crate::error::NotifyError;
use crate::notifier::{Ack, Notifier};

/// Writes alerts to the log stream.
pub struct TerminalNotifier;

impl Notifier for TerminalNotifier {
    fn notify(&self, message: &str) -> BoxFuture<'_, Result<Ack, Report<NotifyError>>> {
        tracing::warn!("ALERT: {}", message);
        Box::pin(async { Ok(Ack) })
    }
}
