//! Price tracking core: per-target pollers that fetch a product page, classify
//! the new price against the last one, persist every sample and send alerts.

pub mod config;
pub mod error;
pub mod fetcher;
pub mod model;
pub mod notifier;
pub mod policy;
pub mod storage;
pub mod supervisor;
#[cfg(test)]
mod testing;
pub mod tracker;
