//! Client-side tooling: the dashboard client and the key generator.

pub mod dashboard;
pub mod keygen;

pub use dashboard::{DashboardClient, DashboardSummary, ServiceStatus};
pub use keygen::{parse_keygen_args, write_key_file, KeygenCommand, KeygenOptions};
