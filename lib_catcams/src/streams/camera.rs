use std::fmt;

/// Identifier of a configured camera (`left`, `right`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CameraId(String);

impl CameraId {
    /// The raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CameraId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for CameraId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for CameraId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle state of one camera's connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    /// Never attempted, or released.
    #[default]
    Idle,
    /// An attempt is in flight.
    Connecting,
    /// Media is flowing.
    Connected,
    /// The transport dropped after connecting. Waits for a health sweep.
    Disconnected,
    /// The attempt or transport failed. Waits for the fallback or a health sweep.
    Error,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionStatus::Idle => "idle",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Error => "error",
        };
        f.write_str(name)
    }
}
