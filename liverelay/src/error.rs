use std::fmt;

use axum::response::{IntoResponse, Response};
use axum::Json;
use http::StatusCode;
use relay::RelayError;

#[derive(Debug)]
pub enum AppError {
    Relay(RelayError),
    NegotiationFailed(String),
    CameraControl(String),
    StreamNotFound(String),
    StreamNotActive(String),
    ViewerCapacityExceeded(String),
    InvalidMessage(String),
    KeepaliveExhausted(String),
    InternalServerError(anyhow::Error),
}

impl AppError {
    pub fn camera_control<T>(t: T) -> Self
    where
        T: ToString,
    {
        AppError::CameraControl(t.to_string())
    }

    pub fn stream_not_found<T>(t: T) -> Self
    where
        T: ToString,
    {
        AppError::StreamNotFound(t.to_string())
    }

    pub fn stream_not_active<T>(t: T) -> Self
    where
        T: ToString,
    {
        AppError::StreamNotActive(t.to_string())
    }

    pub fn viewer_capacity_exceeded<T>(t: T) -> Self
    where
        T: ToString,
    {
        AppError::ViewerCapacityExceeded(t.to_string())
    }

    pub fn invalid_message<T>(t: T) -> Self
    where
        T: ToString,
    {
        AppError::InvalidMessage(t.to_string())
    }

    /// Stable identifier carried in error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Relay(RelayError::Unavailable) => "relayUnavailable",
            AppError::Relay(RelayError::Timeout) => "relayTimeout",
            AppError::Relay(_) => "relayError",
            AppError::NegotiationFailed(_) => "negotiationFailed",
            AppError::CameraControl(_) => "cameraControl",
            AppError::StreamNotFound(_) => "streamNotFound",
            AppError::StreamNotActive(_) => "streamNotActive",
            AppError::ViewerCapacityExceeded(_) => "viewerCapacityExceeded",
            AppError::InvalidMessage(_) => "invalidMessage",
            AppError::KeepaliveExhausted(_) => "keepaliveExhausted",
            AppError::InternalServerError(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Relay(RelayError::Unavailable) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Relay(RelayError::Timeout) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Relay(_) => StatusCode::BAD_GATEWAY,
            AppError::NegotiationFailed(_) => StatusCode::BAD_GATEWAY,
            AppError::CameraControl(_) => StatusCode::BAD_GATEWAY,
            AppError::StreamNotFound(_) => StatusCode::NOT_FOUND,
            AppError::StreamNotActive(_) => StatusCode::CONFLICT,
            AppError::ViewerCapacityExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::InvalidMessage(_) => StatusCode::BAD_REQUEST,
            AppError::KeepaliveExhausted(_) => StatusCode::GONE,
            AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Relay(err) => write!(f, "{}", err),
            AppError::NegotiationFailed(err) => write!(f, "negotiation failed: {}", err),
            AppError::CameraControl(err) => write!(f, "camera control: {}", err),
            AppError::StreamNotFound(camera) => write!(f, "no stream for camera {}", camera),
            AppError::StreamNotActive(camera) => write!(f, "stream for camera {} is not active", camera),
            AppError::ViewerCapacityExceeded(camera) => {
                write!(f, "viewer limit reached for camera {}", camera)
            }
            AppError::InvalidMessage(err) => write!(f, "invalid message: {}", err),
            AppError::KeepaliveExhausted(camera) => {
                write!(f, "camera {} stopped answering keepalives", camera)
            }
            AppError::InternalServerError(err) => write!(f, "{}", err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = api::response::ErrorBody {
            error: self.to_string(),
            kind: self.kind().to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        let err = err.into();
        let err = match err.downcast::<RelayError>() {
            Ok(err) => return AppError::Relay(err),
            Err(err) => err,
        };
        match err.downcast::<camsdp::SdpError>() {
            Ok(err) => AppError::NegotiationFailed(err.to_string()),
            Err(err) => AppError::InternalServerError(err),
        }
    }
}
