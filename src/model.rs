use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::policy::AlertDecision;

/// Identifier of a monitored target. Unique within a supervisor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TargetId(String);

impl TargetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Stable id for targets configured without one, so stored history stays
    /// reachable across runs.
    pub fn derive(owner: &str, url: &str) -> Self {
        let name = format!("{owner}\n{url}");
        Self(uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_URL, name.as_bytes()).to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A product page being watched for one owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub id: TargetId,
    pub url: String,
    pub owner: String,
    pub threshold: Decimal,
    /// Overrides the supervisor's default poll interval.
    pub interval: Option<Duration>,
}

/// What a page fetcher extracts from a product page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    pub title: String,
    pub price: Decimal,
}

/// One timestamped price sample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub timestamp: DateTime<Utc>,
    pub title: String,
    pub price: Decimal,
}

impl Observation {
    pub fn from_page(page: FetchedPage, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            title: page.title,
            price: page.price,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackerState {
    Idle,
    Polling,
    Degraded,
    Stopped,
}

impl TrackerState {
    /// `true` while the tracker's poll task is (or should be) running.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Polling | Self::Degraded)
    }
}

impl fmt::Display for TrackerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Polling => write!(f, "polling"),
            Self::Degraded => write!(f, "degraded"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Read-only view of a tracker, handed to presentation layers.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerStatus {
    pub target_id: TargetId,
    pub url: String,
    pub owner: String,
    pub threshold: Decimal,
    pub title: Option<String>,
    pub last_price: Option<Decimal>,
    pub state: TrackerState,
    pub last_error: Option<String>,
    pub last_alert: Option<AlertDecision>,
    pub last_checked: Option<DateTime<Utc>>,
    /// Oldest first.
    pub recent_history: Vec<Observation>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracker_state_display() {
        assert_eq!(TrackerState::Idle.to_string(), "idle");
        assert_eq!(TrackerState::Polling.to_string(), "polling");
        assert_eq!(TrackerState::Degraded.to_string(), "degraded");
        assert_eq!(TrackerState::Stopped.to_string(), "stopped");
    }

    #[test]
    fn only_polling_and_degraded_are_active() {
        assert!(!TrackerState::Idle.is_active());
        assert!(TrackerState::Polling.is_active());
        assert!(TrackerState::Degraded.is_active());
        assert!(!TrackerState::Stopped.is_active());
    }

    #[test]
    fn derived_target_ids_are_stable() {
        let url = "https://example.com/dp/echo";
        assert_eq!(TargetId::derive("alice", url), TargetId::derive("alice", url));
        assert_ne!(TargetId::derive("alice", url), TargetId::derive("bob", url));
    }

    #[test]
    fn observation_serializes_price_as_string() {
        let obs = Observation {
            timestamp: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            title: "Echo Dot".into(),
            price: Decimal::new(299_900, 2),
        };
        let json = serde_json::to_string(&obs).unwrap();
        assert!(json.contains("\"2999.00\""));
        let parsed: Observation = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, obs);
    }
}
