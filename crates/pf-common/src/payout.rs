//! Payout Entity
//!
//! A payout row is written `pending` before any transfer is requested and
//! only ever moves forward to `completed` or `failed`.

use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PayoutStatus {
    Pending,
    Completed,
    Failed,
}

impl PayoutStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Completed and in-flight payouts both reduce the unpaid balance.
    pub fn counts_as_disbursed(&self) -> bool {
        matches!(self, Self::Pending | Self::Completed)
    }
}

impl fmt::Display for PayoutStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stage two of a payout: connected account to the recipient's bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum BankPayoutStatus {
    Pending,
    Paid,
    Failed,
}

impl BankPayoutStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "paid" => Some(Self::Paid),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Whether `current -> next` is a forward move. Terminal states never regress.
    pub fn can_advance(current: Option<Self>, next: Self) -> bool {
        match (current, next) {
            (None, _) => true,
            (Some(Self::Pending), Self::Paid | Self::Failed) => true,
            _ => false,
        }
    }
}

/// Reporting period attached to a payout: the calendar month containing the
/// execution date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl PayoutPeriod {
    pub fn containing(date: NaiveDate) -> Self {
        let start = date.with_day(1).unwrap_or(date);
        let (year, month) = if date.month() == 12 {
            (date.year() + 1, 1)
        } else {
            (date.year(), date.month() + 1)
        };
        let end = NaiveDate::from_ymd_opt(year, month, 1)
            .and_then(|first_of_next| first_of_next.pred_opt())
            .unwrap_or(date);
        Self { start, end }
    }

    pub fn current() -> Self {
        Self::containing(Utc::now().date_naive())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payout {
    pub id: String,
    pub recipient_id: String,
    /// Minor units
    pub amount: i64,
    pub currency: String,
    pub status: PayoutStatus,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_transfer_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bank_payout_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bank_payout_status: Option<BankPayoutStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payout {
    /// A new payout intent, not yet sent to the gateway.
    pub fn pending(
        recipient_id: impl Into<String>,
        amount: i64,
        currency: impl Into<String>,
        period: PayoutPeriod,
        description: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: crate::generate_id(),
            recipient_id: recipient_id.into(),
            amount,
            currency: currency.into(),
            status: PayoutStatus::Pending,
            period_start: period.start,
            period_end: period.end,
            description,
            external_transfer_id: None,
            bank_payout_id: None,
            bank_payout_status: None,
            failure_message: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Bank payout event effect, matched by bank payout id or by the transfer
/// that funded it.
#[derive(Debug, Clone, PartialEq)]
pub struct BankPayoutUpdate {
    pub bank_payout_id: String,
    pub source_transfer_id: Option<String>,
    pub status: BankPayoutStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_period_covers_calendar_month() {
        let period = PayoutPeriod::containing(date(2024, 2, 17));
        assert_eq!(period.start, date(2024, 2, 1));
        assert_eq!(period.end, date(2024, 2, 29));
    }

    #[test]
    fn test_period_december_rolls_year() {
        let period = PayoutPeriod::containing(date(2023, 12, 31));
        assert_eq!(period.start, date(2023, 12, 1));
        assert_eq!(period.end, date(2023, 12, 31));
    }

    #[test]
    fn test_disbursed_statuses() {
        assert!(PayoutStatus::Pending.counts_as_disbursed());
        assert!(PayoutStatus::Completed.counts_as_disbursed());
        assert!(!PayoutStatus::Failed.counts_as_disbursed());
    }

    #[test]
    fn test_bank_status_never_regresses() {
        assert!(BankPayoutStatus::can_advance(None, BankPayoutStatus::Pending));
        assert!(BankPayoutStatus::can_advance(Some(BankPayoutStatus::Pending), BankPayoutStatus::Paid));
        assert!(!BankPayoutStatus::can_advance(Some(BankPayoutStatus::Paid), BankPayoutStatus::Pending));
        assert!(!BankPayoutStatus::can_advance(Some(BankPayoutStatus::Failed), BankPayoutStatus::Paid));
        assert!(!BankPayoutStatus::can_advance(Some(BankPayoutStatus::Paid), BankPayoutStatus::Paid));
    }

    #[test]
    fn test_new_payout_is_pending() {
        let payout = Payout::pending("rec-1", 500, "usd", PayoutPeriod::current(), None);
        assert_eq!(payout.status, PayoutStatus::Pending);
        assert!(payout.external_transfer_id.is_none());
        assert!(payout.period_start <= payout.period_end);
    }
}
