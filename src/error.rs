//! Error handling for camwatch
//!
//! Variants follow the session error taxonomy: hardware faults end the
//! session, classifier and busy errors are transient, reporting errors are
//! only ever logged.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Camera hardware could not be opened or never became ready
    #[error("Hardware error: {0}")]
    Hardware(String),

    /// Input surface exists but has no usable frame yet
    #[error("Not ready: {0}")]
    NotReady(String),

    /// Frame grab or draw failed on an open stream
    #[error("Capture error: {0}")]
    Capture(String),

    /// Capture surfaces unavailable
    #[error("Surface error: {0}")]
    Surface(String),

    /// Classifier endpoint failed or answered with an unusable payload
    #[error("ML backend error: {0}")]
    Classifier(String),

    /// Reporting endpoint failed
    #[error("Reporting error: {0}")]
    Reporting(String),

    /// Another capture cycle is already in flight
    #[error("Capture already in progress")]
    Busy,

    /// Not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JPEG encoding error
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

impl Error {
    /// Errors a monitoring cycle absorbs without leaving the session
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Classifier(_) | Error::Busy)
    }

    /// Errors that take the session offline
    pub fn is_hardware_fault(&self) -> bool {
        matches!(
            self,
            Error::Hardware(_) | Error::Capture(_) | Error::Image(_)
        )
    }

    /// Short message suitable for display to the operator
    pub fn user_message(&self) -> &'static str {
        match self {
            Error::Hardware(_) => {
                "Impossible d'accéder à la caméra. Vérifiez les permissions et que votre caméra n'est pas utilisée par une autre application."
            }
            Error::NotReady(_) => {
                "La vidéo n'est pas prête. Attendez que la caméra se charge complètement."
            }
            Error::Capture(_) | Error::Image(_) => "Erreur de capture de l'image caméra.",
            Error::Surface(_) => {
                "Impossible d'initialiser les éléments caméra. Rechargez la page."
            }
            Error::Classifier(_) => "Le service d'analyse est indisponible.",
            Error::Reporting(_) => "Le serveur de suivi est indisponible.",
            Error::Busy => "Une capture est déjà en cours.",
            Error::NotFound(_) => "Ressource introuvable.",
            Error::Validation(_) => "Requête invalide.",
            _ => "Erreur inconnue.",
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_code) = match &self {
            Error::Hardware(_) => (StatusCode::SERVICE_UNAVAILABLE, "HARDWARE_ERROR"),
            Error::NotReady(_) => (StatusCode::CONFLICT, "NOT_READY"),
            Error::Capture(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CAPTURE_ERROR"),
            Error::Surface(_) => (StatusCode::SERVICE_UNAVAILABLE, "SURFACE_ERROR"),
            Error::Classifier(_) => (StatusCode::BAD_GATEWAY, "CLASSIFIER_ERROR"),
            Error::Reporting(_) => (StatusCode::BAD_GATEWAY, "REPORTING_ERROR"),
            Error::Busy => (StatusCode::CONFLICT, "BUSY"),
            Error::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Error::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            Error::Http(_) => (StatusCode::BAD_GATEWAY, "HTTP_ERROR"),
            Error::Serialization(_) => (StatusCode::INTERNAL_SERVER_ERROR, "SERIALIZATION_ERROR"),
            Error::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR"),
            Error::Image(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IMAGE_ERROR"),
        };

        tracing::error!(
            status = %status,
            error_code = %error_code,
            error = %self,
            "Request error"
        );

        let body = Json(json!({
            "ok": false,
            "error_code": error_code,
            "error": self.user_message(),
        }));

        (status, body).into_response()
    }
}
