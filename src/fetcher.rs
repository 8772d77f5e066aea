pub mod http;

use std::time::Duration;

use error_stack::Report;
use futures::future::BoxFuture;

use crate::error::FetchError;
use crate::model::FetchedPage;

/// Abstraction over whatever turns a product URL into a title and a price.
///
/// Uses `BoxFuture` instead of `async fn` in trait to keep the trait
/// object-safe (`dyn PageFetcher`).
pub trait PageFetcher: Send + Sync {
    /// Fetch and parse the product page at `url`.
    ///
    /// Implementations should give up after roughly `timeout`; callers also
    /// enforce it on their side.
    fn fetch(
        &self,
        url: &str,
        timeout: Duration,
    ) -> BoxFuture<'_, Result<FetchedPage, Report<FetchError>>>;
}
