use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde_json::json;

use crate::config;

#[derive(Debug, Clone)]
pub struct OutboundEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// External collaborator that delivers an artifact to an address. A delivery
/// failure never reverts ledger state.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, email: &OutboundEmail) -> Result<()>;
}

pub struct HttpNotifier {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    from: String,
}

impl HttpNotifier {
    pub fn new(endpoint: &str, api_key: &str, from: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            from: from.to_string(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(
            &config::NOTIFIER_ENDPOINT,
            &config::NOTIFIER_API_KEY,
            &config::NOTIFIER_FROM_ADDRESS,
        )
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn deliver(&self, email: &OutboundEmail) -> Result<()> {
        let response = self
            .client
            .post(format!("{}/emails", self.endpoint))
            .bearer_auth(&self.api_key)
            .json(&json!({
                "from": self.from,
                "to": email.to,
                "subject": email.subject,
                "html": email.html,
            }))
            .send()
            .await
            .context("notifier request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("notifier returned {status}: {body}"));
        }
        Ok(())
    }
}

pub fn followup_email(to: &str, client_name: Option<&str>, artifact: &str) -> OutboundEmail {
    let subject = match client_name {
        Some(client) => format!("Your follow-up email is ready for {client}"),
        None => "Your follow-up email is ready".to_string(),
    };
    OutboundEmail {
        to: to.to_string(),
        subject,
        html: format!(
            "<p>Here is your generated follow-up email:</p><pre>{}</pre>",
            artifact
        ),
    }
}

pub fn purchase_confirmation(
    to: &str,
    name: &str,
    package_type: &str,
    credits: i64,
    amount_paid: i64,
    balance: i64,
) -> OutboundEmail {
    OutboundEmail {
        to: to.to_string(),
        subject: format!("Payment confirmed: {credits} credits added"),
        html: format!(
            "<p>Hi {name},</p>\
             <p>Your {package_type} package ({credits} credits, {amount_paid} paid) is active.</p>\
             <p>Current balance: {balance} credits.</p>"
        ),
    }
}
