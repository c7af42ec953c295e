//! Products, Subscriptions and Attributions
//!
//! The local subscription table is a projection of gateway state. Status
//! strings are stored exactly as the gateway reports them.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Subscription lifecycle status as reported by the gateway.
///
/// Only `active` produces earnings. Unrecognised values are kept verbatim
/// in `Other` so the projection never rewrites remote state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SubscriptionStatus {
    Active,
    PastDue,
    Canceled,
    Other(String),
}

impl SubscriptionStatus {
    pub fn parse(value: &str) -> Self {
        match value {
            "active" => Self::Active,
            "past_due" => Self::PastDue,
            "canceled" => Self::Canceled,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Active => "active",
            Self::PastDue => "past_due",
            Self::Canceled => "canceled",
            Self::Other(raw) => raw,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

impl From<String> for SubscriptionStatus {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<SubscriptionStatus> for String {
    fn from(status: SubscriptionStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A sellable subscription product owned by one recipient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub recipient_id: String,
    pub name: String,
    /// Price in minor currency units
    pub price_amount: i64,
    pub currency: String,
    /// Billing interval as configured at the gateway (`month`, `year`, ...)
    pub interval: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_price_id: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Product {
    pub fn new(
        recipient_id: impl Into<String>,
        name: impl Into<String>,
        price_amount: i64,
        currency: impl Into<String>,
        interval: impl Into<String>,
    ) -> Self {
        Self {
            id: crate::generate_id(),
            recipient_id: recipient_id.into(),
            name: name.into(),
            price_amount,
            currency: currency.into(),
            interval: interval.into(),
            external_price_id: None,
            active: true,
            created_at: Utc::now(),
        }
    }

    pub fn with_external_price_id(mut self, price_id: impl Into<String>) -> Self {
        self.external_price_id = Some(price_id.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub id: String,
    pub external_id: String,
    pub recipient_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_ref: Option<String>,
    /// Amount per billing period in minor units
    pub amount: i64,
    pub currency: String,
    pub status: SubscriptionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_period_start: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_period_end: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields mirrored from a gateway subscription event, keyed by `external_id`.
///
/// `recipient_id` is `None` when the event's account could not be mapped to
/// a local recipient; such an upsert may only update an existing row.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionUpsert {
    pub external_id: String,
    pub recipient_id: Option<String>,
    pub product_id: Option<String>,
    pub customer_ref: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub status: SubscriptionStatus,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
}

/// Credit link from a subscription to a recipient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attribution {
    pub id: String,
    pub subscription_id: String,
    pub recipient_id: String,
    /// 0-100; `None` means the default percentage applies
    pub percentage: Option<i32>,
    pub created_at: DateTime<Utc>,
}

impl Attribution {
    pub fn new(
        subscription_id: impl Into<String>,
        recipient_id: impl Into<String>,
        percentage: Option<i32>,
    ) -> Self {
        Self {
            id: crate::generate_id(),
            subscription_id: subscription_id.into(),
            recipient_id: recipient_id.into(),
            percentage,
            created_at: Utc::now(),
        }
    }

    pub fn effective_percentage(&self) -> i32 {
        crate::effective_percentage(self.percentage)
    }
}

/// One row of the Attribution x Subscription join read by the aggregator.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributedSubscription {
    pub attribution_id: String,
    pub subscription_id: String,
    pub external_subscription_id: String,
    pub recipient_id: String,
    pub amount: i64,
    pub currency: String,
    pub status: SubscriptionStatus,
    pub percentage: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_preserves_unknown_values() {
        let status = SubscriptionStatus::parse("incomplete_expired");
        assert_eq!(status, SubscriptionStatus::Other("incomplete_expired".to_string()));
        assert_eq!(status.as_str(), "incomplete_expired");
        assert!(!status.is_active());
    }

    #[test]
    fn test_only_active_is_active() {
        assert!(SubscriptionStatus::parse("active").is_active());
        for raw in ["past_due", "canceled", "cancelled", "trialing", "unpaid", "ACTIVE"] {
            assert!(!SubscriptionStatus::parse(raw).is_active(), "{raw}");
        }
    }

    #[test]
    fn test_status_serializes_as_plain_string() {
        let json = serde_json::to_string(&SubscriptionStatus::PastDue).unwrap();
        assert_eq!(json, "\"past_due\"");
        let parsed: SubscriptionStatus = serde_json::from_str("\"paused\"").unwrap();
        assert_eq!(parsed.as_str(), "paused");
    }

    #[test]
    fn test_attribution_default_percentage() {
        let attribution = Attribution::new("sub-1", "rec-1", None);
        assert_eq!(attribution.effective_percentage(), crate::DEFAULT_ATTRIBUTION_PERCENTAGE);
    }
}
