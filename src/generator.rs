use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config;

/// Everything the generator needs to draft one follow-up email.
#[derive(Debug, Clone)]
pub struct PromptContext {
    pub name: String,
    pub client_name: Option<String>,
    pub client_info: String,
    pub language: String,
    pub business_type: String,
    pub template_type: Option<String>,
}

/// External collaborator that turns a request into artifact text. Failures
/// propagate to the caller; no retry happens here.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, context: &PromptContext) -> Result<String>;
}

pub struct HttpGenerator {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl HttpGenerator {
    pub fn new(endpoint: &str, api_key: &str, model: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(
            &config::GENERATOR_ENDPOINT,
            &config::GENERATOR_API_KEY,
            &config::GENERATOR_MODEL,
        )
    }
}

#[async_trait]
impl Generator for HttpGenerator {
    async fn generate(&self, context: &PromptContext) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/v1/messages", self.endpoint))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&json!({
                "model": self.model,
                "max_tokens": 1024,
                "messages": [{ "role": "user", "content": build_prompt(context) }],
            }))
            .send()
            .await
            .context("generator request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("generator returned {status}: {body}"));
        }

        let body: Value = response
            .json()
            .await
            .context("generator returned unreadable body")?;
        body.pointer("/content/0/text")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| anyhow!("generator response carried no text content"))
    }
}

fn build_prompt(context: &PromptContext) -> String {
    let client = context.client_name.as_deref().unwrap_or("the client");
    let template = context.template_type.as_deref().unwrap_or("generic");
    format!(
        "Write a {template} follow-up email in language '{}' from {} ({} business) to {client}.\n\
         Context about the client and the last interaction:\n{}\n\
         Reply with the email body only.",
        context.language, context.name, context.business_type, context.client_info
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_mentions_context_fields() {
        let prompt = build_prompt(&PromptContext {
            name: "Ana".into(),
            client_name: Some("Bruno".into()),
            client_info: "met at the expo".into(),
            language: "en".into(),
            business_type: "photography".into(),
            template_type: None,
        });
        assert!(prompt.contains("Ana"));
        assert!(prompt.contains("Bruno"));
        assert!(prompt.contains("met at the expo"));
        assert!(prompt.contains("generic"));
    }
}
