//! Shared building blocks for the punchgate device gateway.
//!
//! Every other crate in the workspace depends on this one for the domain types
//! that cross component boundaries (serial numbers, device timestamps, punch
//! records), for the protocol-wide constants, and for the common error type.

pub mod constants;
pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::*;

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
