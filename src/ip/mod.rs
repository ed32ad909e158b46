//! IP address allocation and management module.
//!
//! This module discovers the network segments of every layer and assigns
//! segment prefixes, interface addresses, node loopbacks and management
//! addresses from bit-indexed pools.

pub mod allocator;
pub mod pool;
pub mod segment;

// Re-export commonly used types
pub use allocator::{assign_addresses, host_addresses};
pub use pool::IpPool;
pub use segment::{is_aware, search_segments};
