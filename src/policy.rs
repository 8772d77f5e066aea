use std::fmt;

use rust_decimal::Decimal;

/// Classification of a new price sample against the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertDecision {
    /// No previous sample to compare against.
    None,
    Unchanged,
    Dropped(Decimal),
    Rose(Decimal),
    ThresholdCrossed { threshold: Decimal, price: Decimal },
}

impl fmt::Display for AlertDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Unchanged => write!(f, "unchanged"),
            Self::Dropped(delta) => write!(f, "dropped by {delta}"),
            Self::Rose(delta) => write!(f, "rose by {delta}"),
            Self::ThresholdCrossed { threshold, price } => {
                write!(f, "crossed threshold {threshold} at {price}")
            }
        }
    }
}

/// Classify `current` against `previous`.
///
/// A downward crossing of `threshold` wins over a plain drop. Equal prices are
/// always `Unchanged`, whatever the threshold.
pub fn decide(previous: Option<Decimal>, current: Decimal, threshold: Decimal) -> AlertDecision {
    let Some(previous) = previous else {
        return AlertDecision::None;
    };

    if current <= threshold && previous > threshold {
        return AlertDecision::ThresholdCrossed {
            threshold,
            price: current,
        };
    }

    // Deltas past the representable range saturate.
    if current < previous {
        AlertDecision::Dropped(previous.checked_sub(current).unwrap_or(Decimal::MAX))
    } else if current > previous {
        AlertDecision::Rose(current.checked_sub(previous).unwrap_or(Decimal::MAX))
    } else {
        AlertDecision::Unchanged
    }
}

/// Render the notification text for a decision, or `None` when there is
/// nothing to say.
pub fn compose_message(
    title: &str,
    previous: Option<Decimal>,
    current: Decimal,
    decision: &AlertDecision,
    currency: &str,
) -> Option<String> {
    let old = previous.map(|p| format!("{p} {currency}"));
    let new = format!("{current} {currency}");

    let message = match decision {
        AlertDecision::None => return None,
        AlertDecision::Unchanged => format!("No change in price for {title}: {new}"),
        AlertDecision::Dropped(delta) => format!(
            "Price drop! {title}\nOld: {}\nNew: {new} (-{delta})",
            old.unwrap_or_default()
        ),
        AlertDecision::Rose(delta) => format!(
            "Price increased! {title}\nOld: {}\nNew: {new} (+{delta})",
            old.unwrap_or_default()
        ),
        AlertDecision::ThresholdCrossed { threshold, .. } => format!(
            "Price dropped to or below {threshold} {currency}! {title}\nOld: {}\nNew: {new}",
            old.unwrap_or_default()
        ),
    };
    Some(message)
}
