// Declare the modules to re-export
pub mod configs;
pub mod core;
pub mod identity;
pub mod retrieve;
pub mod streams;
pub mod surface;

// Re-export the types binaries and tests reach for
pub use configs::{ConfigError, DashboardConfig, LifecyclePolicy};
pub use crate::core::{Dashboard, HostEvent};
pub use identity::{AuthError, AuthState, FileSessionStore, IdentityGate, IdentityProvider, SessionStore, SessionUser};
pub use streams::headless::HeadlessPlatform;
pub use streams::{CameraId, ConnectionStatus, StreamError, StreamManager, StreamSettings, WhepSignaling};
pub use surface::{DisplaySurface, MediaSource, PageView, StatusLabel};
