//! Hosted checkout and payment reconciliation.
//!
//! A webhook and a client "verify" call can both observe the same paid
//! session; both go through [`services::PaymentReconciliationService`], which
//! completes the payment and schedules the appointment at most once.

pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use router::{payment_routes, PaymentState};
