//! Authenticated billing endpoints. Every call to the provider goes through
//! the payment gateway's breaker, retries and timeout.

use actix_web::{HttpResponse, web};

use stratus_core::domain::{CheckoutRequest, CreateCustomer, Customer};
use stratus_shared::ApiResponse;
use stratus_shared::dto::{CheckoutRequestDto, CheckoutResponse, CreateCustomerRequestDto, CustomerResponse};

use crate::middleware::auth::Identity;
use crate::middleware::error::{AppError, AppResult};
use crate::state::AppState;

/// POST /api/billing/customers
pub async fn create_customer(
    state: web::Data<AppState>,
    identity: Identity,
    body: Option<web::Json<CreateCustomerRequestDto>>,
) -> AppResult<HttpResponse> {
    let name = body.and_then(|b| b.into_inner().name);
    let customer = register_customer(&state, &identity, name).await?;

    Ok(HttpResponse::Created().json(ApiResponse::ok(CustomerResponse {
        id: customer.id,
        email: customer.email,
    })))
}

/// POST /api/billing/checkout
///
/// Registers the caller at the provider first when no customer id is given.
pub async fn create_checkout(
    state: web::Data<AppState>,
    identity: Identity,
    body: web::Json<CheckoutRequestDto>,
) -> AppResult<HttpResponse> {
    let req = body.into_inner();

    if req.price_id.trim().is_empty() {
        return Err(AppError::BadRequest("priceId is required".to_string()));
    }
    for url in [&req.success_url, &req.cancel_url] {
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            return Err(AppError::BadRequest(format!("Invalid redirect URL: {}", url)));
        }
    }

    let customer_id = match req.customer_id.filter(|id| !id.is_empty()) {
        Some(id) => id,
        None => register_customer(&state, &identity, None).await?.id,
    };

    let session = state
        .payments
        .create_checkout_session(&CheckoutRequest {
            customer_id: customer_id.clone(),
            price_id: req.price_id,
            success_url: req.success_url,
            cancel_url: req.cancel_url,
        })
        .await
        .map_err(|e| AppError::upstream(e, state.clock.as_ref()))?;

    tracing::info!(user_id = %identity.user_id, session_id = %session.id, "Checkout session created");

    Ok(HttpResponse::Ok().json(ApiResponse::ok(CheckoutResponse {
        session_id: session.id,
        url: session.url,
        customer_id,
    })))
}

/// POST /api/billing/subscriptions/{id}/cancel
pub async fn cancel_subscription(
    state: web::Data<AppState>,
    identity: Identity,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let subscription_id = path.into_inner();

    state
        .payments
        .cancel_subscription(&subscription_id)
        .await
        .map_err(|e| AppError::upstream(e, state.clock.as_ref()))?;

    tracing::info!(user_id = %identity.user_id, subscription_id = %subscription_id, "Subscription cancelled");
    Ok(HttpResponse::NoContent().finish())
}

async fn register_customer(
    state: &AppState,
    identity: &Identity,
    name: Option<String>,
) -> AppResult<Customer> {
    state
        .payments
        .create_customer(&CreateCustomer {
            email: identity.email.clone(),
            name,
            reference: identity.user_id.to_string(),
        })
        .await
        .map_err(|e| AppError::upstream(e, state.clock.as_ref()))
}
