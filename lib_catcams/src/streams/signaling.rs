//! Offer/answer exchange with the per-camera signaling endpoint.

use futures_util::future::BoxFuture;
use reqwest::Method;

use super::camera::CameraId;
use super::endpoints::StreamEndpoints;
use super::StreamError;
use crate::retrieve::ky_http::{ApiClient, TextBody};

/// Content type of session descriptions on the wire.
pub const SDP_CONTENT_TYPE: &str = "application/sdp";

/// Trades a local session description for the remote one.
pub trait Signaling: Send + Sync {
    /// One request/response exchange for `camera`.
    fn exchange<'a>(&'a self, camera: &'a CameraId, offer: String) -> BoxFuture<'a, Result<String, StreamError>>;
}

/// WHEP-style signaling: `POST /cam_{camera}/whep` with the offer as body.
pub struct WhepSignaling {
    client: ApiClient,
}

impl WhepSignaling {
    /// Signaling against `endpoints`' origin with `retries` transient retries.
    pub fn new(endpoints: &StreamEndpoints, retries: u32) -> anyhow::Result<Self> {
        Ok(Self {
            client: ApiClient::new(endpoints.base().as_str(), retries)?,
        })
    }
}

impl Signaling for WhepSignaling {
    fn exchange<'a>(&'a self, camera: &'a CameraId, offer: String) -> BoxFuture<'a, Result<String, StreamError>> {
        Box::pin(async move {
            let path = StreamEndpoints::whep_path(camera);
            let body = TextBody {
                content_type: SDP_CONTENT_TYPE,
                text: offer,
            };

            let response = self
                .client
                .request_text(Method::POST, &path, None, Some(body))
                .await
                .map_err(|e| StreamError::SignalingFailure {
                    status: None,
                    detail: e.to_string(),
                })?;

            if !response.success {
                return Err(StreamError::SignalingFailure {
                    status: Some(response.status),
                    detail: response.error_body.unwrap_or_default(),
                });
            }

            response.data.ok_or_else(|| StreamError::SignalingFailure {
                status: Some(response.status),
                detail: "empty answer".to_string(),
            })
        })
    }
}
