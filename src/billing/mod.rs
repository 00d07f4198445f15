pub mod models;
pub mod reconciliation;

pub use models::{CompletedCheckout, PaymentEvent, Purchase};
pub use reconciliation::{
    reconcile, start_reconciliation_worker, ReconcileOutcome, ReconciliationHandle,
    ReconciliationJob,
};
