pub mod accounts;
pub mod billing;
pub mod catalog;
pub mod config;
pub mod entitlement;
pub mod error;
pub mod generator;
pub mod ledger;
pub mod notifier;
pub mod routes;
pub mod submissions;
pub mod webhooks;
