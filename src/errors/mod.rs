pub mod harness_error;

pub use harness_error::{HarnessError, HarnessResult};
