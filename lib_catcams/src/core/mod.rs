//! # Core Module
//!
//! The composition root of the dashboard. It owns the identity gate and the
//! stream manager and is the only place that connects the two: the gate
//! publishes authentication state, and the dashboard loop turns state changes
//! and host events into stream lifecycle calls.
//!
//! - **`dashboard`**: the [`Dashboard`] event loop and the [`HostEvent`]s the
//!   host feeds it (credentials, visibility changes, sign-out, shutdown).

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Host-event loop wiring authentication to streaming.
pub mod dashboard;

pub use dashboard::{Dashboard, HostEvent};
