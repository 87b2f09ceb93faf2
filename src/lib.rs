//! Workspace placeholder crate.
//!
//! This crate exists to expose shared feature flags that map to the individual
//! workspace crates (e.g., `core-service`, `provider-firebase`). Host
//! applications can depend on `authsync-workspace` and enable the documented
//! features without needing to wire each crate individually.

#[cfg(any(feature = "desktop-shims", feature = "firebase"))]
pub use core_service::{CoreService, CoreError};
