pub mod sqlite;

use error_stack::Report;
use futures::future::BoxFuture;

use crate::error::StorageError;
use crate::model::{Observation, TargetId};

/// Append-only log of price observations, keyed by target.
pub trait Storage: Send + Sync {
    /// Durably record `observation`. Returns only after the write is committed.
    fn append(
        &self,
        target_id: &TargetId,
        observation: &Observation,
    ) -> BoxFuture<'_, Result<(), Report<StorageError>>>;

    /// The last `limit` observations for `target_id`, oldest first.
    ///
    /// Unknown targets yield an empty list.
    fn recent(
        &self,
        target_id: &TargetId,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<Observation>, Report<StorageError>>>;

    fn count(&self, target_id: &TargetId) -> BoxFuture<'_, Result<usize, Report<StorageError>>>;
}
