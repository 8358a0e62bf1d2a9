pub mod booking;
pub mod conflict;
pub mod lifecycle;
pub mod memory_store;
pub mod pricing;
pub mod store;
pub mod supabase_store;

pub use booking::{AppointmentBookingService, Clock};
pub use conflict::{has_conflict, ConflictDetectionService};
pub use lifecycle::{AppointmentLifecycleService, TransitionPlan};
pub use memory_store::InMemoryConsultationStore;
pub use pricing::PricingService;
pub use store::{ConsultationStore, StoreProvider};
pub use supabase_store::{SupabaseConsultationStore, SupabaseStoreProvider};
