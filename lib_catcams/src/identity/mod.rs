//! # Identity Gate Module
//!
//! Restricts the dashboard to verified, allow-listed emails before any
//! stream connects.
//!
//! ## Contained Modules:
//! - **`token`**: reads the claims out of the provider's signed token.
//! - **`allow_list`**: exact-email and `@domain` suffix matching.
//! - **`session`**: the durable session cache.
//! - **`gate`**: ties the above together and publishes the auth state.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Email allow-list matching.
pub mod allow_list;
/// The gate and its published state.
pub mod gate;
/// Durable session cache.
pub mod session;
/// Signed-token payload decoding.
pub mod token;

use thiserror::Error;

pub use allow_list::is_allowed;
pub use gate::{AuthState, IdentityGate, IdentityProvider};
pub use session::{FileSessionStore, MemorySessionStore, SessionError, SessionStore, SessionUser};
pub use token::{verify, IdentityClaim};

/// Why authentication halted.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// The token payload could not be decoded into claims.
    #[error("Malformed identity token: {0}")]
    MalformedToken(String),

    /// The email is not on the allow-list.
    #[error("Access denied. Email {email} is not authorized.")]
    AccessDenied {
        /// The rejected email.
        email: String,
    },
}
