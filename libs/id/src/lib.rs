//! # drover-id
//!
//! Typed identifiers used by the drover reconciliation engine.
//!
//! ## Format
//!
//! Every identifier renders as `{prefix}_{ulid}`:
//!
//! - `net_01HV4Z2WQXKJNM8GPQY6VBKC3D` for a network
//! - `desc_01HV4Z3MXNKPQR9HSTZ7WCLD4E` for a managed descriptor
//! - `scan_01HV4Z4NYPLTRS0JTUA8XDME5F` for an attached scanner
//!
//! Identity inside a network is decided by these ids, never by the
//! host address or the application name, so two descriptors that point at
//! the same host are still distinct members.

mod error;
mod macros;
mod types;

pub use error::IdError;
pub use types::*;

/// Re-export ulid for consumers that need raw ULID operations
pub use ulid::Ulid;
