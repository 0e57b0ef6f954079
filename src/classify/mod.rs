//! Maps failures onto the stable external error taxonomy and shapes the JSON
//! bodies callers receive.

use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::correlation::CorrelationId;
use crate::transcript::TranscriptResult;
use crate::{FetchError, ServiceError};

/// Response header carrying the request's correlation id
pub const CORRELATION_HEADER: &str = "x-correlation-id";

/// Closed set of externally visible error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    InvalidVideoId,
    MissingVideoId,
    Unauthorized,
    TranscriptNotAvailable,
    VideoUnavailable,
    RateLimited,
    ConfigurationError,
    InternalError,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 8] = [
        ErrorKind::InvalidVideoId,
        ErrorKind::MissingVideoId,
        ErrorKind::Unauthorized,
        ErrorKind::TranscriptNotAvailable,
        ErrorKind::VideoUnavailable,
        ErrorKind::RateLimited,
        ErrorKind::ConfigurationError,
        ErrorKind::InternalError,
    ];

    /// Wire code callers branch on
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::InvalidVideoId => "INVALID_VIDEO_ID",
            ErrorKind::MissingVideoId => "MISSING_VIDEO_ID",
            ErrorKind::Unauthorized => "UNAUTHORIZED",
            ErrorKind::TranscriptNotAvailable => "TRANSCRIPT_NOT_AVAILABLE",
            ErrorKind::VideoUnavailable => "VIDEO_UNAVAILABLE",
            ErrorKind::RateLimited => "RATE_LIMITED",
            ErrorKind::ConfigurationError => "CONFIGURATION_ERROR",
            ErrorKind::InternalError => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ErrorKind::InvalidVideoId | ErrorKind::MissingVideoId => StatusCode::BAD_REQUEST,
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::TranscriptNotAvailable | ErrorKind::VideoUnavailable => StatusCode::NOT_FOUND,
            ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::ConfigurationError | ErrorKind::InternalError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Caller-facing message; informational only
    fn default_message(&self) -> &'static str {
        match self {
            ErrorKind::InvalidVideoId => "Invalid video ID format",
            ErrorKind::MissingVideoId => "videoId parameter is required",
            ErrorKind::Unauthorized => "Valid API key required in Authorization header",
            ErrorKind::TranscriptNotAvailable => "No transcript available for this video",
            ErrorKind::VideoUnavailable => "Video is unavailable or private",
            ErrorKind::RateLimited => "Too many requests, please try again later",
            ErrorKind::ConfigurationError => "Proxy credentials not configured",
            ErrorKind::InternalError => "An unexpected error occurred",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A classified failure, ready to be sent to the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorOutcome {
    pub kind: ErrorKind,
    pub message: String,
    pub video_id: Option<String>,
    pub correlation_id: Option<CorrelationId>,
}

impl ErrorOutcome {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: kind.default_message().to_string(),
            video_id: None,
            correlation_id: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_video_id(mut self, video_id: impl Into<String>) -> Self {
        self.video_id = Some(video_id.into());
        self
    }

    pub fn with_correlation(mut self, correlation_id: &CorrelationId) -> Self {
        self.correlation_id = Some(correlation_id.clone());
        self
    }

    pub fn status(&self) -> StatusCode {
        self.kind.status()
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            error: self.kind,
            message: self.message.clone(),
            video_id: self.video_id.clone(),
            compaction_id: self
                .correlation_id
                .as_ref()
                .and_then(|c| c.echo())
                .map(str::to_string),
            status_code: self.status().as_u16(),
        }
    }
}

/// Classify a request-boundary failure. `video_id` is the raw identifier the
/// caller sent, echoed on provider failures.
pub fn classify(error: &ServiceError, video_id: Option<&str>) -> ErrorOutcome {
    let outcome = match error {
        ServiceError::MissingVideoId => ErrorOutcome::new(ErrorKind::MissingVideoId),
        ServiceError::Unauthorized(reason) => {
            ErrorOutcome::new(ErrorKind::Unauthorized).with_message(reason.clone())
        }
        ServiceError::Configuration(_) => ErrorOutcome::new(ErrorKind::ConfigurationError),
        ServiceError::Internal(_) => ErrorOutcome::new(ErrorKind::InternalError),
        ServiceError::Fetch(fetch) => {
            let kind = fetch_kind(fetch);
            let outcome = ErrorOutcome::new(kind);
            let echo_id = !matches!(kind, ErrorKind::InvalidVideoId | ErrorKind::InternalError);
            match video_id {
                Some(id) if echo_id => outcome.with_video_id(id),
                _ => outcome,
            }
        }
    };

    log_outcome(&outcome, error);
    outcome
}

fn fetch_kind(error: &FetchError) -> ErrorKind {
    match error {
        FetchError::InvalidVideoId(_) => ErrorKind::InvalidVideoId,
        FetchError::TranscriptsDisabled(_)
        | FetchError::NoTranscriptAvailable(_)
        | FetchError::AgeRestricted(_)
        | FetchError::VideoUnplayable { .. }
        | FetchError::PoTokenRequired(_)
        | FetchError::DataUnparsable(_)
        | FetchError::HttpStatus { .. } => ErrorKind::TranscriptNotAvailable,
        FetchError::VideoUnavailable(_) => ErrorKind::VideoUnavailable,
        FetchError::RequestBlocked(_) => ErrorKind::RateLimited,
        FetchError::ProxySetup(_) | FetchError::Network(_) => ErrorKind::InternalError,
    }
}

fn log_outcome(outcome: &ErrorOutcome, cause: &ServiceError) {
    let code = outcome.kind.code();
    let video_id = outcome.video_id.as_deref().unwrap_or("-");
    match outcome.kind {
        ErrorKind::ConfigurationError => {
            tracing::error!(code, error = %cause, "Service is misconfigured")
        }
        ErrorKind::InternalError => {
            tracing::error!(code, video_id, error = %cause, "Internal error")
        }
        ErrorKind::RateLimited | ErrorKind::Unauthorized => {
            tracing::warn!(code, video_id, error = %cause, "Request rejected")
        }
        _ => tracing::info!(code, video_id, error = %cause, "Request failed"),
    }
}

/// Error response body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorKind,
    pub message: String,
    #[serde(rename = "videoId", skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compaction_id: Option<String>,
    pub status_code: u16,
}

/// Success response body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptBody {
    pub transcript: String,
    pub language: String,
    pub title: String,
    pub channel: String,
    #[serde(rename = "videoId")]
    pub video_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compaction_id: Option<String>,
    pub status_code: u16,
}

impl TranscriptBody {
    pub fn new(result: TranscriptResult, correlation_id: &CorrelationId) -> Self {
        Self {
            transcript: result.text,
            language: result.language_code,
            title: result.title,
            channel: result.channel,
            video_id: result.video_id.into(),
            compaction_id: correlation_id.echo().map(str::to_string),
            status_code: StatusCode::OK.as_u16(),
        }
    }
}

impl IntoResponse for ErrorOutcome {
    fn into_response(self) -> Response {
        let mut response = (self.status(), Json(self.body())).into_response();
        if let Some(value) = self
            .correlation_id
            .as_ref()
            .and_then(|c| HeaderValue::from_str(c.as_str()).ok())
        {
            response.headers_mut().insert(CORRELATION_HEADER, value);
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn fetch(error: FetchError) -> ErrorKind {
        classify(&ServiceError::Fetch(error), Some("dQw4w9WgXcQ")).kind
    }

    #[test]
    fn test_status_table() {
        let expected = [
            (ErrorKind::InvalidVideoId, 400),
            (ErrorKind::MissingVideoId, 400),
            (ErrorKind::Unauthorized, 401),
            (ErrorKind::TranscriptNotAvailable, 404),
            (ErrorKind::VideoUnavailable, 404),
            (ErrorKind::RateLimited, 429),
            (ErrorKind::ConfigurationError, 500),
            (ErrorKind::InternalError, 500),
        ];
        for (kind, status) in expected {
            assert_eq!(kind.status().as_u16(), status, "{}", kind);
        }
    }

    #[test]
    fn test_codes_are_unique_and_match_serde() {
        let codes: HashSet<_> = ErrorKind::ALL.iter().map(|k| k.code()).collect();
        assert_eq!(codes.len(), 8);

        for kind in ErrorKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.code()));
        }
    }

    #[test]
    fn test_provider_failures() {
        assert_eq!(fetch(FetchError::InvalidVideoId("x".into())), ErrorKind::InvalidVideoId);
        assert_eq!(fetch(FetchError::TranscriptsDisabled("v".into())), ErrorKind::TranscriptNotAvailable);
        assert_eq!(fetch(FetchError::NoTranscriptAvailable("v".into())), ErrorKind::TranscriptNotAvailable);
        assert_eq!(fetch(FetchError::HttpStatus { video_id: "v".into(), status: 500 }), ErrorKind::TranscriptNotAvailable);
        assert_eq!(fetch(FetchError::VideoUnavailable("v".into())), ErrorKind::VideoUnavailable);
        assert_eq!(fetch(FetchError::RequestBlocked("v".into())), ErrorKind::RateLimited);
        assert_eq!(fetch(FetchError::ProxySetup("bad".into())), ErrorKind::InternalError);
    }

    #[test]
    fn test_boundary_failures() {
        assert_eq!(classify(&ServiceError::MissingVideoId, None).kind, ErrorKind::MissingVideoId);
        assert_eq!(
            classify(&ServiceError::Configuration("no creds".into()), Some("dQw4w9WgXcQ")).kind,
            ErrorKind::ConfigurationError
        );
        assert_eq!(classify(&ServiceError::Internal("boom".into()), None).kind, ErrorKind::InternalError);

        let unauthorized = classify(&ServiceError::Unauthorized("Invalid API key".into()), None);
        assert_eq!(unauthorized.kind, ErrorKind::Unauthorized);
        assert_eq!(unauthorized.message, "Invalid API key");
    }

    #[test]
    fn test_video_id_is_echoed_on_not_found() {
        let outcome = classify(
            &ServiceError::Fetch(FetchError::VideoUnavailable("aaaaaaaaaaa".into())),
            Some("aaaaaaaaaaa"),
        );
        let body = outcome.body();
        assert_eq!(body.video_id.as_deref(), Some("aaaaaaaaaaa"));
        assert_eq!(body.status_code, 404);

        let internal = classify(&ServiceError::Internal("boom".into()), Some("aaaaaaaaaaa"));
        assert!(internal.body().video_id.is_none());
    }

    #[test]
    fn test_error_body_shape() {
        let cid = CorrelationId::from_caller(Some("trace-7"));
        let outcome = ErrorOutcome::new(ErrorKind::RateLimited)
            .with_video_id("dQw4w9WgXcQ")
            .with_correlation(&cid);

        let json = serde_json::to_value(outcome.body()).unwrap();
        assert_eq!(json["error"], "RATE_LIMITED");
        assert_eq!(json["videoId"], "dQw4w9WgXcQ");
        assert_eq!(json["compaction_id"], "trace-7");
        assert_eq!(json["status_code"], 429);

        let plain = serde_json::to_value(ErrorOutcome::new(ErrorKind::MissingVideoId).body()).unwrap();
        assert!(plain.get("videoId").is_none());
        assert!(plain.get("compaction_id").is_none());
    }

    #[test]
    fn test_generated_correlation_is_not_echoed() {
        let outcome = ErrorOutcome::new(ErrorKind::InternalError).with_correlation(&CorrelationId::generate());
        assert!(outcome.body().compaction_id.is_none());

        let response = outcome.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.headers().contains_key(CORRELATION_HEADER));
    }
}
