//! Cases, consultation appointments and their payment records.
//!
//! All appointment status changes go through
//! [`services::AppointmentBookingService`]; storage sits behind
//! [`services::ConsultationStore`] so the same state machine runs against the
//! hosted database or the in-memory store.

pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use router::{appointment_routes, AppointmentState};
