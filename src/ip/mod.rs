//! IP address allocation and management module.
//!
//! Two allocation paths live here:
//! - the positional [`AddressPool`] drawn from while expanding a platform tree
//! - the reconciliation pass that merges learned addresses with addresses
//!   found free by the occupancy probe

pub mod pool;
pub mod probe;
pub mod reconcile;

// Re-export commonly used types
pub use pool::AddressPool;
pub use probe::{FpingProbe, FreeAddresses, OccupancyProbe, ProbeError};
pub use reconcile::{reconcile, ConfigIps, LearnedAddresses, ProbeAnomaly, Reconciliation};
