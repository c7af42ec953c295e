//! Product Service

use std::sync::Arc;

use pf_common::{AuditAction, Product};
use pf_ledger::LedgerStore;

use super::audit::AuditService;
use crate::error::{PayoutError, Result};

#[derive(Debug, Clone)]
pub struct NewProduct {
    pub recipient_id: String,
    pub name: String,
    /// Minor units
    pub price_amount: i64,
    pub currency: String,
    pub interval: String,
    /// Gateway price id; subscription events carry it to find the owner
    pub external_price_id: Option<String>,
}

pub struct ProductService {
    ledger: Arc<dyn LedgerStore>,
    audit: Arc<AuditService>,
}

impl ProductService {
    pub fn new(ledger: Arc<dyn LedgerStore>, audit: Arc<AuditService>) -> Self {
        Self { ledger, audit }
    }

    /// Register a product owned by an existing recipient.
    pub async fn create(&self, new: NewProduct) -> Result<Product> {
        if new.name.trim().is_empty() {
            return Err(PayoutError::validation("name is required"));
        }
        if new.price_amount < 0 {
            return Err(PayoutError::validation("priceAmount must not be negative"));
        }
        if new.currency.trim().is_empty() || new.interval.trim().is_empty() {
            return Err(PayoutError::validation("currency and interval are required"));
        }
        if self.ledger.get_recipient(&new.recipient_id).await?.is_none() {
            return Err(PayoutError::RecipientNotFound { id: new.recipient_id });
        }

        let mut product = Product::new(
            &new.recipient_id,
            new.name.trim(),
            new.price_amount,
            new.currency.to_lowercase(),
            new.interval,
        );
        if let Some(price_id) = new.external_price_id.filter(|p| !p.is_empty()) {
            product = product.with_external_price_id(price_id);
        }
        self.ledger.insert_product(&product).await?;

        self.audit
            .log_entity(
                AuditAction::ProductCreated,
                "Product",
                &product.id,
                format!("Product {} created for {}", product.name, product.recipient_id),
            )
            .await;
        Ok(product)
    }
}
