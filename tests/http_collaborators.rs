use httpmock::prelude::*;
use serde_json::json;

use followup_backend::generator::{Generator, HttpGenerator, PromptContext};
use followup_backend::notifier::{HttpNotifier, Notifier, OutboundEmail};

fn context() -> PromptContext {
    PromptContext {
        name: "Ana".to_string(),
        client_name: Some("Bruno".to_string()),
        client_info: "asked for a quote".to_string(),
        language: "en".to_string(),
        business_type: "photography".to_string(),
        template_type: Some("generic".to_string()),
    }
}

#[tokio::test]
async fn generator_extracts_artifact_text() {
    let server = MockServer::start_async().await;
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/v1/messages")
            .header("x-api-key", "test-key");
        then.status(200).json_body(json!({
            "content": [{ "type": "text", "text": "Hi Bruno, following up." }]
        }));
    });

    let generator = HttpGenerator::new(&server.base_url(), "test-key", "test-model");
    let artifact = generator.generate(&context()).await.unwrap();
    assert_eq!(artifact, "Hi Bruno, following up.");
    mock.assert_async().await;
}

#[tokio::test]
async fn generator_error_status_propagates() {
    let server = MockServer::start_async().await;
    server.mock(|when, then| {
        when.method(POST).path("/v1/messages");
        then.status(529).body("overloaded");
    });

    let generator = HttpGenerator::new(&server.base_url(), "test-key", "test-model");
    let err = generator.generate(&context()).await.unwrap_err();
    assert!(err.to_string().contains("529"));
}

#[tokio::test]
async fn notifier_posts_outbound_email() {
    let server = MockServer::start_async().await;
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/emails")
            .json_body_partial(r#"{"to": "user@example.com"}"#);
        then.status(200).json_body(json!({ "id": "email_1" }));
    });

    let notifier = HttpNotifier::new(&server.base_url(), "test-key", "Test <t@example.com>");
    notifier
        .deliver(&OutboundEmail {
            to: "user@example.com".to_string(),
            subject: "Your follow-up email is ready".to_string(),
            html: "<p>hello</p>".to_string(),
        })
        .await
        .unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn notifier_failure_surfaces_as_error() {
    let server = MockServer::start_async().await;
    server.mock(|when, then| {
        when.method(POST).path("/emails");
        then.status(500).body("delivery backend down");
    });

    let notifier = HttpNotifier::new(&server.base_url(), "test-key", "Test <t@example.com>");
    let err = notifier
        .deliver(&OutboundEmail {
            to: "user@example.com".to_string(),
            subject: "subject".to_string(),
            html: "<p>body</p>".to_string(),
        })
        .await
        .unwrap_err();
    assert!(err.to_string().contains("500"));
}
