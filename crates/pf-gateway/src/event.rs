//! Gateway Events
//!
//! Inbound events are parsed from the raw envelope
//! `{ id, type, data: { object }, account? }` into `GatewayEvent`. Types the
//! payout engine does not consume become `GatewayEvent::Unknown`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use pf_common::AccountStatus;
use serde::Deserialize;

use crate::{METADATA_PAYOUT_RECORD_ID, METADATA_RECIPIENT_ID};

#[derive(Debug, Deserialize)]
struct EventEnvelope {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: EventData,
    #[serde(default)]
    account: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EventData {
    object: serde_json::Value,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Requirements {
    #[serde(default)]
    pub currently_due: Vec<String>,
}

/// Connected account capability snapshot.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AccountObject {
    pub id: String,
    #[serde(default)]
    pub charges_enabled: bool,
    #[serde(default)]
    pub payouts_enabled: bool,
    #[serde(default)]
    pub details_submitted: bool,
    #[serde(default)]
    pub requirements: Option<Requirements>,
}

impl AccountObject {
    pub fn status(&self) -> AccountStatus {
        AccountStatus {
            charges_enabled: self.charges_enabled,
            payouts_enabled: self.payouts_enabled,
            details_submitted: self.details_submitted,
            requirements_due: self
                .requirements
                .as_ref()
                .map(|r| r.currently_due.clone())
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Price {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub unit_amount: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SubscriptionItem {
    pub price: Price,
    #[serde(default)]
    pub quantity: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SubscriptionItems {
    #[serde(default)]
    pub data: Vec<SubscriptionItem>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SubscriptionObject {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    /// Either a customer id or an expanded customer object
    #[serde(default)]
    pub customer: Option<serde_json::Value>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub items: SubscriptionItems,
    #[serde(default)]
    pub current_period_start: Option<i64>,
    #[serde(default)]
    pub current_period_end: Option<i64>,
}

impl SubscriptionObject {
    fn first_item(&self) -> Option<&SubscriptionItem> {
        self.items.data.first()
    }

    /// Amount per period: unit amount of the first item times its quantity.
    /// `None` when the product overflows.
    pub fn amount(&self) -> Option<i64> {
        match self.first_item() {
            Some(item) => item.price.unit_amount.unwrap_or(0).checked_mul(item.quantity.unwrap_or(1)),
            None => Some(0),
        }
    }

    pub fn currency(&self) -> String {
        self.first_item()
            .and_then(|item| item.price.currency.clone())
            .or_else(|| self.currency.clone())
            .unwrap_or_default()
    }

    pub fn price_id(&self) -> Option<&str> {
        self.first_item().and_then(|item| item.price.id.as_deref())
    }

    pub fn customer_id(&self) -> Option<String> {
        match self.customer.as_ref()? {
            serde_json::Value::String(id) => Some(id.clone()),
            serde_json::Value::Object(obj) => obj.get("id").and_then(|v| v.as_str()).map(String::from),
            _ => None,
        }
    }

    pub fn period_start(&self) -> Option<DateTime<Utc>> {
        self.current_period_start.and_then(|ts| DateTime::from_timestamp(ts, 0))
    }

    pub fn period_end(&self) -> Option<DateTime<Utc>> {
        self.current_period_end.and_then(|ts| DateTime::from_timestamp(ts, 0))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TransferObject {
    pub id: String,
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl TransferObject {
    pub fn payout_record_id(&self) -> Option<&str> {
        self.metadata.get(METADATA_PAYOUT_RECORD_ID).map(String::as_str)
    }

    pub fn recipient_id(&self) -> Option<&str> {
        self.metadata.get(METADATA_RECIPIENT_ID).map(String::as_str)
    }
}

/// Subscription invoice; only the fields needed to find the subscription.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InvoiceObject {
    pub id: String,
    /// Absent for one-off invoices
    #[serde(default)]
    pub subscription: Option<String>,
    #[serde(default)]
    pub amount_paid: i64,
}

/// Payout from a connected account to its bank.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BankPayoutObject {
    pub id: String,
    #[serde(default)]
    pub amount: i64,
    /// Transfer that funded this payout, when the gateway reports it
    #[serde(default)]
    pub source_transaction: Option<String>,
    #[serde(default)]
    pub failure_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEvent {
    AccountUpdated(AccountObject),
    SubscriptionChanged(SubscriptionObject),
    SubscriptionDeleted(SubscriptionObject),
    InvoicePaid(InvoiceObject),
    InvoicePaymentFailed(InvoiceObject),
    TransferCreated(TransferObject),
    TransferFailed(TransferObject),
    BankPayoutCreated(BankPayoutObject),
    BankPayoutPaid(BankPayoutObject),
    BankPayoutFailed(BankPayoutObject),
    Unknown { event_type: String },
}

impl GatewayEvent {
    fn from_parts(event_type: &str, object: serde_json::Value) -> serde_json::Result<Self> {
        let event = match event_type {
            "account.updated" => Self::AccountUpdated(serde_json::from_value(object)?),
            "customer.subscription.created" | "customer.subscription.updated" => {
                Self::SubscriptionChanged(serde_json::from_value(object)?)
            }
            "customer.subscription.deleted" => Self::SubscriptionDeleted(serde_json::from_value(object)?),
            "invoice.payment_succeeded" => Self::InvoicePaid(serde_json::from_value(object)?),
            "invoice.payment_failed" => Self::InvoicePaymentFailed(serde_json::from_value(object)?),
            "transfer.created" => Self::TransferCreated(serde_json::from_value(object)?),
            "transfer.failed" => Self::TransferFailed(serde_json::from_value(object)?),
            "payout.created" => Self::BankPayoutCreated(serde_json::from_value(object)?),
            "payout.paid" => Self::BankPayoutPaid(serde_json::from_value(object)?),
            "payout.failed" => Self::BankPayoutFailed(serde_json::from_value(object)?),
            other => Self::Unknown { event_type: other.to_string() },
        };
        Ok(event)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown { .. })
    }
}

/// A parsed inbound event with its envelope fields.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedEvent {
    pub id: String,
    pub event_type: String,
    /// Connected account the event originated from, if any
    pub account: Option<String>,
    pub event: GatewayEvent,
}

impl ReceivedEvent {
    pub fn parse(payload: &[u8]) -> serde_json::Result<Self> {
        let envelope: EventEnvelope = serde_json::from_slice(payload)?;
        let event = GatewayEvent::from_parts(&envelope.event_type, envelope.data.object)?;
        Ok(Self {
            id: envelope.id,
            event_type: envelope.event_type,
            account: envelope.account,
            event,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(event_type: &str, object: serde_json::Value) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "id": "evt_1",
            "type": event_type,
            "account": "acct_1",
            "data": { "object": object }
        }))
        .unwrap()
    }

    #[test]
    fn test_parse_account_updated() {
        let payload = envelope(
            "account.updated",
            json!({
                "id": "acct_1",
                "charges_enabled": true,
                "payouts_enabled": false,
                "details_submitted": true,
                "requirements": { "currently_due": ["external_account"] }
            }),
        );
        let received = ReceivedEvent::parse(&payload).unwrap();
        assert_eq!(received.id, "evt_1");
        assert_eq!(received.account.as_deref(), Some("acct_1"));
        match received.event {
            GatewayEvent::AccountUpdated(account) => {
                let status = account.status();
                assert!(status.onboarding_complete());
                assert!(!status.payouts_enabled);
                assert_eq!(status.requirements_due, vec!["external_account"]);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_subscription_amount_and_currency() {
        let payload = envelope(
            "customer.subscription.updated",
            json!({
                "id": "sub_1",
                "status": "past_due",
                "customer": { "id": "cus_1", "email": "c@example.com" },
                "items": { "data": [{ "price": { "id": "price_1", "unit_amount": 1500, "currency": "usd" }, "quantity": 2 }] },
                "current_period_start": 1_700_000_000,
                "current_period_end": 1_702_592_000
            }),
        );
        let GatewayEvent::SubscriptionChanged(sub) = ReceivedEvent::parse(&payload).unwrap().event else {
            panic!("expected subscription event");
        };
        assert_eq!(sub.amount(), Some(3000));
        assert_eq!(sub.currency(), "usd");
        assert_eq!(sub.price_id(), Some("price_1"));
        assert_eq!(sub.customer_id().as_deref(), Some("cus_1"));
        assert_eq!(sub.status.as_deref(), Some("past_due"));
        assert!(sub.period_start().unwrap() < sub.period_end().unwrap());
    }

    #[test]
    fn test_subscription_amount_overflow_is_none() {
        let payload = envelope(
            "customer.subscription.updated",
            json!({
                "id": "sub_big",
                "status": "active",
                "items": { "data": [{ "price": { "id": "price_1", "unit_amount": i64::MAX / 2 }, "quantity": 3 }] }
            }),
        );
        let GatewayEvent::SubscriptionChanged(sub) = ReceivedEvent::parse(&payload).unwrap().event else {
            panic!("expected subscription event");
        };
        assert_eq!(sub.amount(), None);
    }

    #[test]
    fn test_transfer_metadata_accessors() {
        let payload = envelope(
            "transfer.created",
            json!({
                "id": "tr_1",
                "amount": 6999,
                "destination": "acct_1",
                "metadata": { "payout_record_id": "p-1", "recipient_id": "rec-1", "type": "recipient_payout" }
            }),
        );
        let GatewayEvent::TransferCreated(transfer) = ReceivedEvent::parse(&payload).unwrap().event else {
            panic!("expected transfer event");
        };
        assert_eq!(transfer.payout_record_id(), Some("p-1"));
        assert_eq!(transfer.recipient_id(), Some("rec-1"));
    }

    #[test]
    fn test_parse_invoice_events() {
        let payload = envelope(
            "invoice.payment_failed",
            json!({ "id": "in_1", "subscription": "sub_1", "amount_paid": 0 }),
        );
        let GatewayEvent::InvoicePaymentFailed(invoice) = ReceivedEvent::parse(&payload).unwrap().event else {
            panic!("expected invoice event");
        };
        assert_eq!(invoice.subscription.as_deref(), Some("sub_1"));

        let payload = envelope("invoice.payment_succeeded", json!({ "id": "in_2", "amount_paid": 1500 }));
        let GatewayEvent::InvoicePaid(invoice) = ReceivedEvent::parse(&payload).unwrap().event else {
            panic!("expected invoice event");
        };
        assert_eq!(invoice.subscription, None);
        assert_eq!(invoice.amount_paid, 1500);
    }

    #[test]
    fn test_unknown_type_is_preserved() {
        let payload = envelope("charge.refunded", json!({ "id": "ch_1" }));
        let received = ReceivedEvent::parse(&payload).unwrap();
        assert!(received.event.is_unknown());
        assert_eq!(
            received.event,
            GatewayEvent::Unknown { event_type: "charge.refunded".to_string() }
        );
    }

    #[test]
    fn test_known_type_with_bad_object_is_error() {
        let payload = envelope("transfer.failed", json!({ "amount": 10 }));
        assert!(ReceivedEvent::parse(&payload).is_err());
    }
}
