use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pf_common::{
    AccountStatus, AttributedSubscription, Attribution, AuditAction, AuditEntry,
    BankPayoutStatus, BankPayoutUpdate, Payout, PayoutStatus, Product, Recipient, Subscription,
    SubscriptionStatus, SubscriptionUpsert,
};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::info;

use crate::{LedgerError, LedgerStore, PayoutTransition, Result};

const RECIPIENT_COLUMNS: &str = "id, email, name, external_account_ref, onboarding_complete, charges_enabled, payouts_enabled, details_submitted, requirements_due, created_at, updated_at";
const SUBSCRIPTION_COLUMNS: &str = "id, external_id, recipient_id, product_id, customer_ref, amount, currency, status, current_period_start, current_period_end, created_at, updated_at";
const PAYOUT_COLUMNS: &str = "id, recipient_id, amount, currency, status, period_start, period_end, description, external_transfer_id, bank_payout_id, bank_payout_status, failure_message, created_at, updated_at";

pub struct PostgresLedger {
    pool: PgPool,
}

impl PostgresLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn init_schema(&self) -> Result<()> {
        // Executed as one simple-protocol batch
        sqlx::raw_sql(
            r#"
            CREATE TABLE IF NOT EXISTS recipients (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL,
                name TEXT,
                external_account_ref TEXT UNIQUE,
                onboarding_complete BOOLEAN NOT NULL DEFAULT FALSE,
                charges_enabled BOOLEAN NOT NULL DEFAULT FALSE,
                payouts_enabled BOOLEAN NOT NULL DEFAULT FALSE,
                details_submitted BOOLEAN NOT NULL DEFAULT FALSE,
                requirements_due TEXT[] NOT NULL DEFAULT '{}',
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            );

            CREATE TABLE IF NOT EXISTS products (
                id TEXT PRIMARY KEY,
                recipient_id TEXT NOT NULL REFERENCES recipients(id),
                name TEXT NOT NULL,
                price_amount BIGINT NOT NULL,
                currency TEXT NOT NULL,
                interval TEXT NOT NULL,
                external_price_id TEXT UNIQUE,
                active BOOLEAN NOT NULL DEFAULT TRUE,
                created_at TIMESTAMPTZ NOT NULL
            );

            CREATE TABLE IF NOT EXISTS subscriptions (
                id TEXT PRIMARY KEY,
                external_id TEXT NOT NULL UNIQUE,
                recipient_id TEXT NOT NULL REFERENCES recipients(id),
                product_id TEXT REFERENCES products(id),
                customer_ref TEXT,
                amount BIGINT NOT NULL,
                currency TEXT NOT NULL,
                status TEXT NOT NULL,
                current_period_start TIMESTAMPTZ,
                current_period_end TIMESTAMPTZ,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_subscriptions_recipient ON subscriptions(recipient_id);

            CREATE TABLE IF NOT EXISTS attributions (
                id TEXT PRIMARY KEY,
                subscription_id TEXT NOT NULL REFERENCES subscriptions(id),
                recipient_id TEXT NOT NULL REFERENCES recipients(id),
                percentage INTEGER CHECK (percentage BETWEEN 0 AND 100),
                created_at TIMESTAMPTZ NOT NULL,
                UNIQUE (subscription_id, recipient_id)
            );
            CREATE INDEX IF NOT EXISTS idx_attributions_recipient ON attributions(recipient_id);

            CREATE TABLE IF NOT EXISTS payouts (
                id TEXT PRIMARY KEY,
                recipient_id TEXT NOT NULL REFERENCES recipients(id) ON DELETE CASCADE,
                amount BIGINT NOT NULL CHECK (amount > 0),
                currency TEXT NOT NULL,
                status TEXT NOT NULL,
                period_start DATE NOT NULL,
                period_end DATE NOT NULL,
                description TEXT,
                external_transfer_id TEXT UNIQUE,
                bank_payout_id TEXT,
                bank_payout_status TEXT,
                failure_message TEXT,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_payouts_recipient_status ON payouts(recipient_id, status);
            CREATE INDEX IF NOT EXISTS idx_payouts_bank_payout ON payouts(bank_payout_id);

            CREATE TABLE IF NOT EXISTS processed_gateway_events (
                event_id TEXT PRIMARY KEY,
                event_type TEXT NOT NULL,
                processed_at TIMESTAMPTZ NOT NULL
            );

            CREATE TABLE IF NOT EXISTS audit_entries (
                id TEXT PRIMARY KEY,
                action TEXT NOT NULL,
                entity_type TEXT NOT NULL,
                entity_id TEXT,
                description TEXT NOT NULL,
                details TEXT,
                created_at TIMESTAMPTZ NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_audit_entity ON audit_entries(entity_id);
            "#,
        )
        .execute(&self.pool)
        .await?;
        info!("Ledger schema initialized");
        Ok(())
    }
}

fn map_unique(err: sqlx::Error, entity_type: &str, field: &str, value: &str) -> LedgerError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            LedgerError::duplicate(entity_type, field, value)
        }
        _ => LedgerError::Database(err),
    }
}

fn recipient_from_row(row: &PgRow) -> Recipient {
    Recipient {
        id: row.get("id"),
        email: row.get("email"),
        name: row.get("name"),
        external_account_ref: row.get("external_account_ref"),
        onboarding_complete: row.get("onboarding_complete"),
        charges_enabled: row.get("charges_enabled"),
        payouts_enabled: row.get("payouts_enabled"),
        details_submitted: row.get("details_submitted"),
        requirements_due: row.get("requirements_due"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn product_from_row(row: &PgRow) -> Product {
    Product {
        id: row.get("id"),
        recipient_id: row.get("recipient_id"),
        name: row.get("name"),
        price_amount: row.get("price_amount"),
        currency: row.get("currency"),
        interval: row.get("interval"),
        external_price_id: row.get("external_price_id"),
        active: row.get("active"),
        created_at: row.get("created_at"),
    }
}

fn subscription_from_row(row: &PgRow) -> Subscription {
    Subscription {
        id: row.get("id"),
        external_id: row.get("external_id"),
        recipient_id: row.get("recipient_id"),
        product_id: row.get("product_id"),
        customer_ref: row.get("customer_ref"),
        amount: row.get("amount"),
        currency: row.get("currency"),
        status: SubscriptionStatus::parse(row.get("status")),
        current_period_start: row.get("current_period_start"),
        current_period_end: row.get("current_period_end"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn payout_from_row(row: &PgRow) -> Result<Payout> {
    let id: String = row.get("id");
    let status_str: String = row.get("status");
    let status = PayoutStatus::parse(&status_str)
        .ok_or_else(|| LedgerError::corrupt("Payout", &id, format!("unknown status {status_str}")))?;
    let bank_payout_status = match row.get::<Option<String>, _>("bank_payout_status") {
        Some(raw) => Some(
            BankPayoutStatus::parse(&raw)
                .ok_or_else(|| LedgerError::corrupt("Payout", &id, format!("unknown bank status {raw}")))?,
        ),
        None => None,
    };

    Ok(Payout {
        id,
        recipient_id: row.get("recipient_id"),
        amount: row.get("amount"),
        currency: row.get("currency"),
        status,
        period_start: row.get("period_start"),
        period_end: row.get("period_end"),
        description: row.get("description"),
        external_transfer_id: row.get("external_transfer_id"),
        bank_payout_id: row.get("bank_payout_id"),
        bank_payout_status,
        failure_message: row.get("failure_message"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn audit_from_row(row: &PgRow) -> Result<AuditEntry> {
    let id: String = row.get("id");
    let action_str: String = row.get("action");
    let action = AuditAction::parse(&action_str)
        .ok_or_else(|| LedgerError::corrupt("AuditEntry", &id, format!("unknown action {action_str}")))?;
    let details = match row.get::<Option<String>, _>("details") {
        Some(raw) => Some(serde_json::from_str(&raw)?),
        None => None,
    };
    Ok(AuditEntry {
        id,
        action,
        entity_type: row.get("entity_type"),
        entity_id: row.get("entity_id"),
        description: row.get("description"),
        details,
        created_at: row.get("created_at"),
    })
}

#[async_trait]
impl LedgerStore for PostgresLedger {
    async fn insert_recipient(&self, recipient: &Recipient) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO recipients ({RECIPIENT_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"
        ))
        .bind(&recipient.id)
        .bind(&recipient.email)
        .bind(&recipient.name)
        .bind(&recipient.external_account_ref)
        .bind(recipient.onboarding_complete)
        .bind(recipient.charges_enabled)
        .bind(recipient.payouts_enabled)
        .bind(recipient.details_submitted)
        .bind(&recipient.requirements_due)
        .bind(recipient.created_at)
        .bind(recipient.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique(e, "Recipient", "id/external_account_ref", &recipient.id))?;
        Ok(())
    }

    async fn get_recipient(&self, id: &str) -> Result<Option<Recipient>> {
        let row = sqlx::query(&format!("SELECT {RECIPIENT_COLUMNS} FROM recipients WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(recipient_from_row))
    }

    async fn find_recipient_by_account(&self, account_ref: &str) -> Result<Option<Recipient>> {
        let row = sqlx::query(&format!(
            "SELECT {RECIPIENT_COLUMNS} FROM recipients WHERE external_account_ref = $1"
        ))
        .bind(account_ref)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(recipient_from_row))
    }

    async fn apply_account_status(&self, account_ref: &str, status: &AccountStatus) -> Result<Option<Recipient>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE recipients
            SET charges_enabled = $2, payouts_enabled = $3, details_submitted = $4,
                onboarding_complete = $5, requirements_due = $6, updated_at = $7
            WHERE external_account_ref = $1
            RETURNING {RECIPIENT_COLUMNS}
            "#
        ))
        .bind(account_ref)
        .bind(status.charges_enabled)
        .bind(status.payouts_enabled)
        .bind(status.details_submitted)
        .bind(status.onboarding_complete())
        .bind(&status.requirements_due)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(recipient_from_row))
    }

    async fn insert_product(&self, product: &Product) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, recipient_id, name, price_amount, currency, interval, external_price_id, active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(&product.id)
        .bind(&product.recipient_id)
        .bind(&product.name)
        .bind(product.price_amount)
        .bind(&product.currency)
        .bind(&product.interval)
        .bind(&product.external_price_id)
        .bind(product.active)
        .bind(product.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique(e, "Product", "id/external_price_id", &product.id))?;
        Ok(())
    }

    async fn find_product_by_price(&self, external_price_id: &str) -> Result<Option<Product>> {
        let row = sqlx::query(
            "SELECT id, recipient_id, name, price_amount, currency, interval, external_price_id, active, created_at FROM products WHERE external_price_id = $1",
        )
        .bind(external_price_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(product_from_row))
    }

    async fn get_subscription(&self, id: &str) -> Result<Option<Subscription>> {
        let row = sqlx::query(&format!("SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(subscription_from_row))
    }

    async fn get_subscription_by_external_id(&self, external_id: &str) -> Result<Option<Subscription>> {
        let row = sqlx::query(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE external_id = $1"
        ))
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(subscription_from_row))
    }

    async fn upsert_subscription(&self, upsert: &SubscriptionUpsert) -> Result<Option<Subscription>> {
        let now = Utc::now();
        let row = match &upsert.recipient_id {
            Some(recipient_id) => {
                sqlx::query(&format!(
                    r#"
                    INSERT INTO subscriptions ({SUBSCRIPTION_COLUMNS})
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11)
                    ON CONFLICT (external_id) DO UPDATE SET
                        recipient_id = EXCLUDED.recipient_id,
                        product_id = COALESCE(EXCLUDED.product_id, subscriptions.product_id),
                        customer_ref = COALESCE(EXCLUDED.customer_ref, subscriptions.customer_ref),
                        amount = EXCLUDED.amount,
                        currency = EXCLUDED.currency,
                        status = EXCLUDED.status,
                        current_period_start = EXCLUDED.current_period_start,
                        current_period_end = EXCLUDED.current_period_end,
                        updated_at = EXCLUDED.updated_at
                    RETURNING {SUBSCRIPTION_COLUMNS}
                    "#
                ))
                .bind(pf_common::generate_id())
                .bind(&upsert.external_id)
                .bind(recipient_id)
                .bind(&upsert.product_id)
                .bind(&upsert.customer_ref)
                .bind(upsert.amount)
                .bind(&upsert.currency)
                .bind(upsert.status.as_str())
                .bind(upsert.current_period_start)
                .bind(upsert.current_period_end)
                .bind(now)
                .fetch_optional(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    r#"
                    UPDATE subscriptions SET
                        product_id = COALESCE($2, product_id),
                        customer_ref = COALESCE($3, customer_ref),
                        amount = $4, currency = $5, status = $6,
                        current_period_start = $7, current_period_end = $8, updated_at = $9
                    WHERE external_id = $1
                    RETURNING {SUBSCRIPTION_COLUMNS}
                    "#
                ))
                .bind(&upsert.external_id)
                .bind(&upsert.product_id)
                .bind(&upsert.customer_ref)
                .bind(upsert.amount)
                .bind(&upsert.currency)
                .bind(upsert.status.as_str())
                .bind(upsert.current_period_start)
                .bind(upsert.current_period_end)
                .bind(now)
                .fetch_optional(&self.pool)
                .await?
            }
        };
        Ok(row.as_ref().map(subscription_from_row))
    }

    async fn set_subscription_status(&self, external_id: &str, status: &SubscriptionStatus) -> Result<bool> {
        let result = sqlx::query("UPDATE subscriptions SET status = $2, updated_at = $3 WHERE external_id = $1")
            .bind(external_id)
            .bind(status.as_str())
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_attribution(&self, attribution: &Attribution) -> Result<()> {
        sqlx::query(
            "INSERT INTO attributions (id, subscription_id, recipient_id, percentage, created_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(&attribution.id)
        .bind(&attribution.subscription_id)
        .bind(&attribution.recipient_id)
        .bind(attribution.percentage)
        .bind(attribution.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            map_unique(
                e,
                "Attribution",
                "subscription_id,recipient_id",
                &format!("{},{}", attribution.subscription_id, attribution.recipient_id),
            )
        })?;
        Ok(())
    }

    async fn attributed_subscriptions(
        &self,
        recipient_id: Option<&str>,
        status: Option<&SubscriptionStatus>,
    ) -> Result<Vec<AttributedSubscription>> {
        let rows = sqlx::query(
            r#"
            SELECT a.id AS attribution_id, s.id AS subscription_id, s.external_id,
                   a.recipient_id, s.amount, s.currency, s.status, a.percentage
            FROM attributions a
            JOIN subscriptions s ON s.id = a.subscription_id
            WHERE ($1::text IS NULL OR a.recipient_id = $1)
              AND ($2::text IS NULL OR s.status = $2)
            ORDER BY a.created_at, a.id
            "#,
        )
        .bind(recipient_id)
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| AttributedSubscription {
                attribution_id: row.get("attribution_id"),
                subscription_id: row.get("subscription_id"),
                external_subscription_id: row.get("external_id"),
                recipient_id: row.get("recipient_id"),
                amount: row.get("amount"),
                currency: row.get("currency"),
                status: SubscriptionStatus::parse(row.get("status")),
                percentage: row.get("percentage"),
            })
            .collect())
    }

    async fn insert_payout(&self, payout: &Payout) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO payouts ({PAYOUT_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)"
        ))
        .bind(&payout.id)
        .bind(&payout.recipient_id)
        .bind(payout.amount)
        .bind(&payout.currency)
        .bind(payout.status.as_str())
        .bind(payout.period_start)
        .bind(payout.period_end)
        .bind(&payout.description)
        .bind(&payout.external_transfer_id)
        .bind(&payout.bank_payout_id)
        .bind(payout.bank_payout_status.map(|s| s.as_str()))
        .bind(&payout.failure_message)
        .bind(payout.created_at)
        .bind(payout.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique(e, "Payout", "id", &payout.id))?;
        Ok(())
    }

    async fn get_payout(&self, id: &str) -> Result<Option<Payout>> {
        let row = sqlx::query(&format!("SELECT {PAYOUT_COLUMNS} FROM payouts WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(payout_from_row).transpose()
    }

    async fn find_payout_by_transfer(&self, transfer_id: &str) -> Result<Option<Payout>> {
        let row = sqlx::query(&format!(
            "SELECT {PAYOUT_COLUMNS} FROM payouts WHERE external_transfer_id = $1"
        ))
        .bind(transfer_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(payout_from_row).transpose()
    }

    async fn disbursed_totals(&self, recipient_id: Option<&str>) -> Result<HashMap<String, i64>> {
        let rows = sqlx::query(
            r#"
            SELECT recipient_id, SUM(amount)::BIGINT AS total
            FROM payouts
            WHERE status IN ('completed', 'pending')
              AND ($1::text IS NULL OR recipient_id = $1)
            GROUP BY recipient_id
            "#,
        )
        .bind(recipient_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| (row.get::<String, _>("recipient_id"), row.get::<i64, _>("total")))
            .collect())
    }

    async fn transition_payout(&self, transition: &PayoutTransition) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE payouts
            SET status = $3,
                external_transfer_id = COALESCE($4, external_transfer_id),
                failure_message = COALESCE($5, failure_message),
                updated_at = $6
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(&transition.payout_id)
        .bind(transition.from.as_str())
        .bind(transition.to.as_str())
        .bind(&transition.transfer_id)
        .bind(&transition.failure_message)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn attach_transfer_id(&self, payout_id: &str, transfer_id: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE payouts SET external_transfer_id = $2, updated_at = $3 WHERE id = $1 AND external_transfer_id IS NULL",
        )
        .bind(payout_id)
        .bind(transfer_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn latest_unlinked_pending(&self, recipient_id: &str) -> Result<Option<Payout>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {PAYOUT_COLUMNS} FROM payouts
            WHERE recipient_id = $1 AND status = 'pending' AND external_transfer_id IS NULL
            ORDER BY created_at DESC
            LIMIT 1
            "#
        ))
        .bind(recipient_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(payout_from_row).transpose()
    }

    async fn update_bank_payout(&self, update: &BankPayoutUpdate) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE payouts
            SET bank_payout_id = $1, bank_payout_status = $2, updated_at = $4
            WHERE (bank_payout_id = $1
                   OR (bank_payout_id IS NULL AND $3::text IS NOT NULL AND external_transfer_id = $3))
              AND (bank_payout_status IS NULL
                   OR (bank_payout_status = 'pending' AND $2 IN ('paid', 'failed')))
            "#,
        )
        .bind(&update.bank_payout_id)
        .bind(update.status.as_str())
        .bind(&update.source_transfer_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_payouts(&self, recipient_id: Option<&str>) -> Result<Vec<Payout>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {PAYOUT_COLUMNS} FROM payouts
            WHERE ($1::text IS NULL OR recipient_id = $1)
            ORDER BY created_at DESC
            "#
        ))
        .bind(recipient_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(payout_from_row).collect()
    }

    async fn stale_pending_payouts(&self, older_than: DateTime<Utc>) -> Result<Vec<Payout>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {PAYOUT_COLUMNS} FROM payouts
            WHERE status = 'pending' AND created_at < $1
            ORDER BY created_at
            "#
        ))
        .bind(older_than)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(payout_from_row).collect()
    }

    async fn mark_event_processed(&self, event_id: &str, event_type: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO processed_gateway_events (event_id, event_type, processed_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(event_id)
        .bind(event_type)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn is_event_processed(&self, event_id: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 AS found FROM processed_gateway_events WHERE event_id = $1")
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn insert_audit(&self, entry: &AuditEntry) -> Result<()> {
        let details = entry.details.as_ref().map(serde_json::to_string).transpose()?;
        sqlx::query(
            r#"
            INSERT INTO audit_entries (id, action, entity_type, entity_id, description, details, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&entry.id)
        .bind(entry.action.as_str())
        .bind(&entry.entity_type)
        .bind(&entry.entity_id)
        .bind(&entry.description)
        .bind(details)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_audit(&self, entity_id: Option<&str>, limit: u32) -> Result<Vec<AuditEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, action, entity_type, entity_id, description, details, created_at
            FROM audit_entries
            WHERE ($1::text IS NULL OR entity_id = $1)
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(entity_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(audit_from_row).collect()
    }
}
