//! Transcript Proxy - an HTTP service that returns YouTube caption text
//!
//! This library selects an outbound proxy route, drives the YouTube caption
//! endpoints through it, and maps every failure onto a small, stable set of
//! error codes for callers.

pub mod classify;
pub mod cli;
pub mod config;
pub mod correlation;
pub mod provider;
pub mod proxy;
pub mod server;
pub mod transcript;
pub mod utils;

pub use classify::{ErrorKind, ErrorOutcome};
pub use cli::{Cli, Commands};
pub use config::Config;
pub use correlation::CorrelationId;
pub use proxy::{ProxyCredentials, ProxyEndpointSelector, ProxyRoute};
pub use transcript::{TranscriptFetcher, TranscriptResult, VideoId};

/// Result type used throughout the library
pub type Result<T> = anyhow::Result<T>;

/// Failure conditions raised while validating an identifier or talking to
/// the transcript provider. These know nothing about HTTP status codes.
#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("Invalid video ID format: {0}")]
    InvalidVideoId(String),

    #[error("Subtitles are disabled for video {0}")]
    TranscriptsDisabled(String),

    #[error("No transcript tracks available for video {0}")]
    NoTranscriptAvailable(String),

    #[error("Video {0} is unavailable")]
    VideoUnavailable(String),

    #[error("Request for video {0} was blocked by YouTube")]
    RequestBlocked(String),

    #[error("Video {0} is age restricted")]
    AgeRestricted(String),

    #[error("Video {video_id} is unplayable: {reason}")]
    VideoUnplayable { video_id: String, reason: String },

    #[error("Transcript for video {0} requires a PO token")]
    PoTokenRequired(String),

    #[error("Could not parse YouTube data for video {0}")]
    DataUnparsable(String),

    #[error("Provider returned HTTP {status} for video {video_id}")]
    HttpStatus { video_id: String, status: u16 },

    #[error("Proxy setup failed: {0}")]
    ProxySetup(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

/// Failures seen at the outer request boundary, before classification
#[derive(thiserror::Error, Debug)]
pub enum ServiceError {
    #[error("videoId parameter is required")]
    MissingVideoId,

    #[error("{0}")]
    Unauthorized(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Internal error: {0}")]
    Internal(String),
}
