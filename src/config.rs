use once_cell::sync::Lazy;

/// Secret used to verify payment webhook signatures. Must be set via the
/// `PAYMENT_WEBHOOK_SECRET` env variable.
pub static PAYMENT_WEBHOOK_SECRET: Lazy<String> = Lazy::new(|| {
    std::env::var("PAYMENT_WEBHOOK_SECRET").expect("PAYMENT_WEBHOOK_SECRET must be set")
});

/// Address the HTTP server should bind to. Defaults to `0.0.0.0`.
pub static BIND_ADDRESS: Lazy<String> =
    Lazy::new(|| std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0".to_string()));

/// Port the HTTP server should listen on. Defaults to `3000`.
pub static BIND_PORT: Lazy<u16> = Lazy::new(|| {
    std::env::var("BIND_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(3000)
});

/// When set to a truthy value, allows the application to continue running even if database
/// migrations fail. Defaults to `false`.
pub static ALLOW_MIGRATION_FAILURE: Lazy<bool> = Lazy::new(|| {
    std::env::var("ALLOW_MIGRATION_FAILURE")
        .ok()
        .map(|value| {
            let normalized = value.trim().to_ascii_lowercase();
            matches!(normalized.as_str(), "1" | "true" | "yes")
        })
        .unwrap_or(false)
});

/// Base URL of the artifact generator API.
pub static GENERATOR_ENDPOINT: Lazy<String> = Lazy::new(|| {
    std::env::var("GENERATOR_ENDPOINT")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| "https://api.anthropic.com".to_string())
});

/// API key presented to the generator. Empty when unset; requests will be rejected upstream.
pub static GENERATOR_API_KEY: Lazy<String> =
    Lazy::new(|| std::env::var("GENERATOR_API_KEY").unwrap_or_default());

/// Model identifier requested from the generator.
pub static GENERATOR_MODEL: Lazy<String> = Lazy::new(|| {
    std::env::var("GENERATOR_MODEL").unwrap_or_else(|_| "claude-sonnet-4-20250514".to_string())
});

/// Base URL of the outbound email delivery API.
pub static NOTIFIER_ENDPOINT: Lazy<String> = Lazy::new(|| {
    std::env::var("NOTIFIER_ENDPOINT")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| "https://api.resend.com".to_string())
});

/// API key presented to the email delivery API.
pub static NOTIFIER_API_KEY: Lazy<String> =
    Lazy::new(|| std::env::var("NOTIFIER_API_KEY").unwrap_or_default());

/// Sender address used for outbound mail.
pub static NOTIFIER_FROM_ADDRESS: Lazy<String> = Lazy::new(|| {
    std::env::var("NOTIFIER_FROM_ADDRESS")
        .unwrap_or_else(|_| "FollowUp <hello@followup.example>".to_string())
});

/// key: catalog-config -> fallback price per credit for unknown amounts
pub static CREDIT_UNIT_PRICE: Lazy<i64> = Lazy::new(|| {
    std::env::var("CREDIT_UNIT_PRICE")
        .ok()
        .and_then(|value| value.parse::<i64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(3)
});

/// key: ledger-config -> bounded retries for serialization conflicts
pub static LEDGER_TX_MAX_RETRIES: Lazy<u32> = Lazy::new(|| {
    std::env::var("LEDGER_TX_MAX_RETRIES")
        .ok()
        .and_then(|value| value.parse::<u32>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(3)
});
