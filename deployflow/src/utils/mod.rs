//! Small shared helpers: timestamps and input validation.

mod timestamps;
mod validation;

pub use timestamps::iso_timestamp;
pub use validation::{find_cycle, validate_run_id, RUN_ID_PATTERN};
