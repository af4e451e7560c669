//! Checkout sessions
//!
//! The payment provider sits behind [`PaymentGateway`]; the server only
//! assembles the session request for a tour.

use crate::core::error::ApiResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One purchasable item of a checkout session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub name: String,
    pub description: Option<String>,
    pub images: Vec<String>,
    /// Amount in cents
    pub amount: i64,
    pub currency: String,
    pub quantity: u32,
}

/// Everything a provider needs to open a checkout session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub customer_email: Option<String>,
    /// The tour being booked
    pub client_reference_id: String,
    pub success_url: String,
    pub cancel_url: String,
    pub line_items: Vec<LineItem>,
}

/// Provider session handed back to the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_checkout_session(&self, request: CheckoutRequest) -> ApiResult<CheckoutSession>;
}

/// Build the checkout request for booking `tour` as `user`
pub fn checkout_request(
    tour: &Value,
    user: &Value,
    base_url: &str,
    image_base_url: &str,
) -> CheckoutRequest {
    let field = |name: &str| tour.get(name).and_then(Value::as_str).map(String::from);
    let tour_id = field("id").unwrap_or_default();
    let user_id = user.get("id").and_then(Value::as_str).unwrap_or_default();
    let price = tour.get("price").and_then(Value::as_f64).unwrap_or_default();

    CheckoutRequest {
        customer_email: user.get("email").and_then(Value::as_str).map(String::from),
        client_reference_id: tour_id.clone(),
        success_url: format!(
            "{}/my-tours/?tour={}&user={}&price={}",
            base_url, tour_id, user_id, price
        ),
        cancel_url: format!(
            "{}/tour/{}",
            base_url,
            field("slug").unwrap_or_else(|| tour_id.clone())
        ),
        line_items: vec![LineItem {
            name: format!("{} Tour", field("name").unwrap_or_default()),
            description: field("summary"),
            images: field("imageCover")
                .map(|cover| vec![format!("{}/{}", image_base_url, cover)])
                .unwrap_or_default(),
            amount: (price * 100.0).round() as i64,
            currency: "usd".to_string(),
            quantity: 1,
        }],
    }
}
