//! OpenAPI Documentation

use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

/// Payout API OpenAPI Documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "PayoutFlow Payout API",
        version = "1.0.0",
        description = "Earnings calculation, payout execution and gateway event reconciliation"
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "payouts", description = "Payout execution and earnings"),
        (name = "attributions", description = "Subscription attribution"),
        (name = "products", description = "Recipient products"),
        (name = "recipients", description = "Payout recipients"),
        (name = "audit", description = "Audit trail"),
        (name = "webhooks", description = "Gateway events")
    ),
    paths(
        super::payouts::execute_payout,
        super::payouts::calculate_all,
        super::payouts::calculate_recipient,
        super::payouts::payout_history,
        super::payouts::stale_payouts,
        super::attributions::create_attribution,
        super::products::create_product,
        super::recipients::register_recipient,
        super::recipients::get_recipient,
        super::recipients::refresh_recipient,
        super::audit::list_audit,
        super::webhooks::receive_gateway_event,
    ),
    modifiers(&SecurityAddon)
)]
pub struct PayoutApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
            );
        }
    }
}
