//! # API Shared
//!
//! Shared definitions for outreach API front-ends.
//!
//! Contains:
//! - Request and response shapes for the REST surface (`messages` module)
//! - Shared services like `HealthService`

pub mod health;
pub mod messages;

pub use health::{HealthRes, HealthService};
pub use messages::*;
