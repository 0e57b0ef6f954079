use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::Instrument;

use crate::classify::{classify, TranscriptBody, CORRELATION_HEADER};
use crate::config::Config;
use crate::correlation::CorrelationId;
use crate::provider::{ProviderConnector, YoutubeConnector};
use crate::proxy::{EgressIpProbe, ProxyEndpointSelector};
use crate::transcript::TranscriptFetcher;
use crate::utils::{bearer_token, constant_time_eq};
use crate::ServiceError;

/// Process-wide, read-only state shared by every request
pub struct AppState {
    config: Arc<Config>,
    selector: ProxyEndpointSelector,
    fetcher: TranscriptFetcher,
    probe: EgressIpProbe,
    started_at: DateTime<Utc>,
}

impl AppState {
    /// State wired to the real YouTube provider
    pub fn new(config: Config) -> Self {
        let connector = Arc::new(YoutubeConnector::new(&config.transcript));
        Self::with_connector(config, connector)
    }

    pub fn with_connector(config: Config, connector: Arc<dyn ProviderConnector>) -> Self {
        let fetcher =
            TranscriptFetcher::new(connector, config.transcript.preferred_languages.clone());
        Self {
            selector: ProxyEndpointSelector::new(&config.proxy),
            probe: EgressIpProbe::new(&config.probe),
            fetcher,
            config: Arc::new(config),
            started_at: Utc::now(),
        }
    }
}

/// Query string of `GET /get_transcript`
#[derive(Debug, Default, Deserialize)]
pub struct TranscriptQuery {
    #[serde(rename = "videoId")]
    pub video_id: Option<String>,
    pub check: Option<String>,
    pub compaction_id: Option<String>,
}

/// JSON body of `POST /get_transcript`
#[derive(Debug, Default, Deserialize)]
pub struct TranscriptRequest {
    #[serde(rename = "videoId")]
    pub video_id: Option<String>,
    pub compaction_id: Option<String>,
}

/// Build the application router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route(
            "/get_transcript",
            get(get_transcript_get).post(get_transcript_post),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer())
        .with_state(state)
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .expose_headers([HeaderName::from_static(CORRELATION_HEADER)])
}

/// Bind and serve until Ctrl-C
pub async fn serve(config: Config) -> Result<()> {
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = Arc::new(AppState::new(config));

    if state.config.proxy_credentials().is_none() {
        tracing::error!("Proxy credentials are not configured; transcript requests will fail");
    }
    if state.config.api_key.is_none() {
        tracing::error!("API key is not configured; every request will be rejected");
    }

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!(%addr, mode = %state.selector.mode(), "Transcript service listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy", "service": "youtube-transcript-api" }))
}

async fn root(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "service": "YouTube Transcript API",
        "version": env!("CARGO_PKG_VERSION"),
        "started_at": state.started_at.to_rfc3339(),
        "endpoints": {
            "health": "/health",
            "transcript": "/get_transcript"
        }
    }))
}

async fn get_transcript_get(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<TranscriptQuery>,
) -> Response {
    handle_transcript_request(state, headers, query).await
}

async fn get_transcript_post(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    // An unparsable body is treated as one without a videoId
    let request: TranscriptRequest = serde_json::from_slice(&body).unwrap_or_else(|e| {
        tracing::debug!(error = %e, "POST body is not valid JSON");
        TranscriptRequest::default()
    });

    let query = TranscriptQuery {
        video_id: request.video_id,
        check: None,
        compaction_id: request.compaction_id,
    };
    handle_transcript_request(state, headers, query).await
}

async fn handle_transcript_request(
    state: Arc<AppState>,
    headers: HeaderMap,
    query: TranscriptQuery,
) -> Response {
    let correlation_id = CorrelationId::from_caller(query.compaction_id.as_deref());
    let span = tracing::info_span!("request", correlation_id = %correlation_id);

    async move {
        match process(&state, &headers, &query, &correlation_id).await {
            Ok(response) => with_correlation_header(response, &correlation_id),
            Err(e) => classify(&e, query.video_id.as_deref())
                .with_correlation(&correlation_id)
                .into_response(),
        }
    }
    .instrument(span)
    .await
}

async fn process(
    state: &AppState,
    headers: &HeaderMap,
    query: &TranscriptQuery,
    correlation_id: &CorrelationId,
) -> Result<Response, ServiceError> {
    authorize(&state.config, headers)?;

    if query.check.as_deref() == Some("ip") {
        tracing::info!("IP check request received");
        let ip = state.probe.probe(None).await;
        if !ip.is_known() {
            return Err(ServiceError::Internal("Failed to get IP".to_string()));
        }
        return Ok(Json(json!({ "cloud_function_ip": ip.as_str() })).into_response());
    }

    let video_id = query
        .video_id
        .as_deref()
        .filter(|id| !id.is_empty())
        .ok_or(ServiceError::MissingVideoId)?;

    let credentials = state.config.proxy_credentials().ok_or_else(|| {
        ServiceError::Configuration("proxy username/password not set".to_string())
    })?;

    let route = state.selector.select_route(&credentials);

    if state.config.probe.enabled {
        let probe = state.probe.clone();
        let probe_route = route.clone();
        tokio::spawn(
            async move {
                probe.probe(Some(&probe_route)).await;
            }
            .instrument(tracing::Span::current()),
        );
    }

    let result = state.fetcher.fetch(correlation_id, video_id, &route).await?;
    tracing::info!(video_id, "Successfully processed request");

    Ok(Json(TranscriptBody::new(result, correlation_id)).into_response())
}

fn authorize(config: &Config, headers: &HeaderMap) -> Result<(), ServiceError> {
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token)
        .ok_or_else(|| {
            ServiceError::Unauthorized("Missing or invalid Authorization header".to_string())
        })?;

    let Some(expected) = config.api_key.as_deref() else {
        tracing::error!("API key is not configured");
        return Err(ServiceError::Unauthorized("Invalid API key".to_string()));
    };

    if !constant_time_eq(token, expected) {
        return Err(ServiceError::Unauthorized("Invalid API key".to_string()));
    }

    Ok(())
}

fn with_correlation_header(mut response: Response, correlation_id: &CorrelationId) -> Response {
    if let Ok(value) = HeaderValue::from_str(correlation_id.as_str()) {
        response.headers_mut().insert(CORRELATION_HEADER, value);
    }
    response
}
