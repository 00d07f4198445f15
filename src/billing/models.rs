use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

/// One row per completed payment. `payment_session_ref` carries the unique
/// constraint that makes redelivered events a no-op.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Purchase {
    pub id: Uuid,
    pub account_id: Uuid,
    pub payment_intent_ref: Option<String>,
    pub payment_session_ref: String,
    pub package_type: String,
    pub amount_paid: i64,
    pub credits_granted: i64,
    pub status: String,
    pub completed_at: DateTime<Utc>,
}

/// A verified checkout-completion event, normalized from the provider payload.
#[derive(Debug, Clone)]
pub struct CompletedCheckout {
    pub session_ref: String,
    pub payment_intent_ref: Option<String>,
    pub customer_ref: Option<String>,
    pub customer_email: Option<String>,
    pub customer_name: Option<String>,
    pub amount_total_cents: i64,
}

impl CompletedCheckout {
    /// Whole currency units, the granularity the price table is written in.
    pub fn amount_paid(&self) -> i64 {
        self.amount_total_cents / 100
    }
}

/// The event kinds the reconciler recognizes. Everything else lands in the
/// explicit `Ignored` branch instead of falling through silently.
#[derive(Debug, Clone)]
pub enum PaymentEvent {
    CheckoutCompleted(CompletedCheckout),
    PaymentSucceeded { payment_intent_ref: String },
    PaymentFailed { payment_intent_ref: String },
    Ignored { kind: String },
}

impl PaymentEvent {
    pub fn from_value(body: &Value) -> Self {
        let kind = body
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let object = body
            .pointer("/data/object")
            .cloned()
            .unwrap_or(Value::Null);
        match kind.as_str() {
            "checkout.session.completed" => PaymentEvent::CheckoutCompleted(CompletedCheckout {
                session_ref: string_field(&object, "id"),
                payment_intent_ref: optional_field(&object, "payment_intent"),
                customer_ref: optional_field(&object, "customer"),
                customer_email: optional_field(&object, "customer_email").or_else(|| {
                    object
                        .pointer("/customer_details/email")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                }),
                customer_name: object
                    .pointer("/customer_details/name")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                amount_total_cents: object
                    .get("amount_total")
                    .and_then(Value::as_i64)
                    .unwrap_or(0),
            }),
            "payment_intent.succeeded" => PaymentEvent::PaymentSucceeded {
                payment_intent_ref: string_field(&object, "id"),
            },
            "payment_intent.payment_failed" => PaymentEvent::PaymentFailed {
                payment_intent_ref: string_field(&object, "id"),
            },
            _ => PaymentEvent::Ignored { kind },
        }
    }
}

fn string_field(object: &Value, key: &str) -> String {
    object
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn optional_field(object: &Value, key: &str) -> Option<String> {
    object
        .get(key)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn checkout_completed_is_normalized() {
        let body = json!({
            "type": "checkout.session.completed",
            "data": { "object": {
                "id": "cs_123",
                "payment_intent": "pi_456",
                "customer": "cus_789",
                "customer_details": { "email": "buyer@example.com", "name": "Buyer" },
                "amount_total": 2900,
            }}
        });
        let PaymentEvent::CheckoutCompleted(checkout) = PaymentEvent::from_value(&body) else {
            panic!("expected checkout event");
        };
        assert_eq!(checkout.session_ref, "cs_123");
        assert_eq!(checkout.payment_intent_ref.as_deref(), Some("pi_456"));
        assert_eq!(checkout.customer_email.as_deref(), Some("buyer@example.com"));
        assert_eq!(checkout.amount_paid(), 29);
    }

    #[test]
    fn top_level_customer_email_takes_precedence() {
        let body = json!({
            "type": "checkout.session.completed",
            "data": { "object": {
                "id": "cs_1",
                "customer_email": "direct@example.com",
                "customer_details": { "email": "nested@example.com" },
                "amount_total": 900,
            }}
        });
        let PaymentEvent::CheckoutCompleted(checkout) = PaymentEvent::from_value(&body) else {
            panic!("expected checkout event");
        };
        assert_eq!(checkout.customer_email.as_deref(), Some("direct@example.com"));
    }

    #[test]
    fn unknown_kind_lands_in_ignored_branch() {
        let body = json!({ "type": "invoice.paid", "data": { "object": {} } });
        let PaymentEvent::Ignored { kind } = PaymentEvent::from_value(&body) else {
            panic!("expected ignored event");
        };
        assert_eq!(kind, "invoice.paid");
    }
}
