//! Shared utilities: IP arithmetic helpers and parameter name validation.

pub mod ip_utils;
pub mod validation;

pub use ip_utils::{is_valid_ip, IpPrefix};
pub use validation::check_param_name;
