use axum::{
    routing::{get, post},
    Router,
};

use crate::{accounts, catalog, submissions, webhooks};

pub fn api_routes() -> Router {
    Router::new()
        .route("/api/submissions", post(submissions::submit))
        .route("/api/submissions/:id", get(submissions::get_submission))
        .route("/api/accounts/:email", get(accounts::get_account))
        .route("/api/packages", get(catalog::list_packages))
        .route("/api/webhooks/payment", post(webhooks::payment_webhook))
}
