use serde::{Deserialize, Serialize};

/// An event delivered by the payment provider's webhook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Request to create a customer at the payment provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCustomer {
    pub email: String,
    pub name: Option<String>,
    /// Our own user id, stored as provider metadata.
    pub reference: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    pub email: String,
}

/// Request to open a hosted checkout for a price.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub customer_id: String,
    pub price_id: String,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}
