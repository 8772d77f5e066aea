pub mod terminal;
pub mod webhook;

use error_stack::Report;
use futures::future::BoxFuture;

use crate::error::NotifyError;

/// Delivery receipt from a notifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack;

/// Sink for alert notifications.
///
/// Callers treat delivery as best effort: a failure is logged and never
/// retried within the same poll cycle.
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str) -> BoxFuture<'_, Result<Ack, Report<NotifyError>>>;
}
