pub mod config;
pub mod core;
pub mod errors;

// Re-export commonly used items for convenience
pub use config::HarnessConfig;
pub use crate::core::*;
pub use errors::{HarnessError, HarnessResult};
