//! # Camera Streams
//!
//! Per-camera connection lifecycle over two transports: a negotiated
//! real-time session (primary) and a segmented playlist (fallback).
//!
//! - [`camera`]: identifiers and lifecycle states.
//! - [`endpoints`]: URL layout under the media origin.
//! - [`transport`]: the seams to the host media platform.
//! - [`signaling`]: the offer/answer exchange over HTTP.
//! - [`manager`]: the lifecycle itself.
//! - [`headless`]: a media platform for hosts without a display.

#![forbid(unsafe_code)]

pub mod camera;
pub mod endpoints;
pub mod headless;
pub mod manager;
pub mod signaling;
pub mod transport;

use thiserror::Error;

pub use camera::{CameraId, ConnectionStatus};
pub use endpoints::StreamEndpoints;
pub use manager::{CameraSnapshot, StreamManager, StreamSettings};
pub use signaling::{Signaling, WhepSignaling};
pub use transport::{TransportError, TransportEvent, TransportHandle, TransportKind};

/// Errors raised while bringing a camera up.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// The signaling endpoint answered with a non-success status, or could
    /// not be reached at all (`status` is `None`).
    #[error("WHEP request failed: {}", describe_status(.status, .detail))]
    SignalingFailure {
        /// HTTP status, if a response arrived.
        status: Option<u16>,
        /// Response body or transport error.
        detail: String,
    },

    /// The transport gave up.
    #[error("Transport failure: {0}")]
    TransportFatal(String),

    /// Neither native nor engine-driven playlist playback is available.
    #[error("HLS is not supported on this surface")]
    CapabilityUnsupported,

    /// The camera is not configured.
    #[error("Unknown camera: {0}")]
    UnknownCamera(String),

    /// An endpoint URL could not be built.
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

fn describe_status(status: &Option<u16>, detail: &str) -> String {
    match status {
        Some(code) => format!("{code} {detail}"),
        None => detail.to_string(),
    }
}

impl From<TransportError> for StreamError {
    fn from(err: TransportError) -> Self {
        StreamError::TransportFatal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signaling_failure_message_carries_status() {
        let err = StreamError::SignalingFailure {
            status: Some(500),
            detail: "upstream down".into(),
        };
        assert_eq!(err.to_string(), "WHEP request failed: 500 upstream down");

        let err = StreamError::SignalingFailure {
            status: None,
            detail: "connection refused".into(),
        };
        assert_eq!(err.to_string(), "WHEP request failed: connection refused");
    }

    #[test]
    fn transport_errors_become_fatal() {
        let err: StreamError = TransportError::Negotiation("bad sdp".into()).into();
        assert_eq!(err, StreamError::TransportFatal("Negotiation failed: bad sdp".into()));
    }
}
