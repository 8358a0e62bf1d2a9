pub mod supabase;

pub use supabase::{SupabaseAuth, SupabaseClient};
