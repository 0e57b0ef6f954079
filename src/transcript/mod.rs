use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::correlation::CorrelationId;
use crate::provider::{CaptionTrack, ProviderConnector, TrackList};
use crate::proxy::ProxyRoute;
use crate::utils::format_char_count;
use crate::FetchError;

/// Length of every YouTube video identifier
pub const VIDEO_ID_LEN: usize = 11;

/// Channel reported while channel lookup is not implemented
pub const UNKNOWN_CHANNEL: &str = "Unknown Channel";

/// A validated YouTube video identifier: 11 characters of `[A-Za-z0-9_-]`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VideoId(String);

impl VideoId {
    pub fn parse(raw: &str) -> Result<Self, FetchError> {
        let valid = raw.len() == VIDEO_ID_LEN
            && raw
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

        if valid {
            Ok(Self(raw.to_string()))
        } else {
            Err(FetchError::InvalidVideoId(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for VideoId {
    type Error = FetchError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<VideoId> for String {
    fn from(id: VideoId) -> Self {
        id.0
    }
}

/// Flattened transcript of one video.
///
/// `title` and `channel` are placeholders, not authoritative metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptResult {
    pub text: String,
    pub language_code: String,
    pub title: String,
    pub channel: String,
    pub video_id: VideoId,
}

/// Which track the fetch settled on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackChoice {
    Preferred,
    Fallback,
}

/// Drives the transcript provider through a selected proxy route.
///
/// No retries: the only second attempt is the one-shot fallback from the
/// preferred languages to whichever track the provider lists first.
pub struct TranscriptFetcher {
    connector: Arc<dyn ProviderConnector>,
    preferred_languages: Vec<String>,
}

impl TranscriptFetcher {
    pub fn new(connector: Arc<dyn ProviderConnector>, preferred_languages: Vec<String>) -> Self {
        Self {
            connector,
            preferred_languages,
        }
    }

    /// Fetch and flatten the transcript of `raw_video_id` through `route`.
    ///
    /// The identifier is validated before anything touches the network.
    pub async fn fetch(
        &self,
        correlation_id: &CorrelationId,
        raw_video_id: &str,
        route: &ProxyRoute,
    ) -> Result<TranscriptResult, FetchError> {
        let video_id = VideoId::parse(raw_video_id).map_err(|e| {
            tracing::warn!(%correlation_id, video_id = raw_video_id, "Invalid video ID format");
            e
        })?;

        tracing::info!(
            %correlation_id,
            %video_id,
            route = %route.descriptor(),
            "Route selected, connecting provider"
        );
        let provider = self.connector.connect(route)?;

        let tracks = provider.list_tracks(&video_id).await?;
        tracing::info!(
            %correlation_id,
            %video_id,
            provider = provider.provider_name(),
            tracks = tracks.len(),
            "Transcript list retrieved"
        );

        let (track, choice) = self.choose_track(&video_id, &tracks)?;
        match choice {
            TrackChoice::Preferred => {
                tracing::info!(%correlation_id, %video_id, language = %track.language_code, "Found preferred transcript")
            }
            TrackChoice::Fallback => {
                tracing::info!(%correlation_id, %video_id, language = %track.language_code, "No preferred transcript, using first available")
            }
        }

        let snippets = provider.fetch_snippets(&video_id, &track).await?;
        let text = join_snippets(snippets.iter().map(|s| s.text.as_str()));

        tracing::info!(
            %correlation_id,
            %video_id,
            entries = snippets.len(),
            size = %format_char_count(text.chars().count()),
            language = %track.language_code,
            "Transcript retrieved"
        );

        Ok(TranscriptResult {
            text,
            language_code: track.language_code,
            title: placeholder_title(&video_id),
            channel: UNKNOWN_CHANNEL.to_string(),
            video_id,
        })
    }

    fn choose_track(
        &self,
        video_id: &VideoId,
        tracks: &TrackList,
    ) -> Result<(CaptionTrack, TrackChoice), FetchError> {
        if let Some(track) = tracks.find(&self.preferred_languages) {
            return Ok((track.clone(), TrackChoice::Preferred));
        }

        tracks
            .first()
            .map(|track| (track.clone(), TrackChoice::Fallback))
            .ok_or_else(|| FetchError::NoTranscriptAvailable(video_id.to_string()))
    }
}

/// Join snippet texts with single spaces, preserving order
pub fn join_snippets<'a>(texts: impl IntoIterator<Item = &'a str>) -> String {
    texts.into_iter().collect::<Vec<_>>().join(" ")
}

fn placeholder_title(video_id: &VideoId) -> String {
    format!("Video {}", video_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProxyConfig;
    use crate::provider::{CaptionSnippet, MockProviderConnector, MockTranscriptProvider};
    use crate::proxy::{ProxyCredentials, ProxyEndpointSelector};

    fn route() -> ProxyRoute {
        ProxyEndpointSelector::new(&ProxyConfig::default())
            .select_route(&ProxyCredentials::new("user", "pass"))
    }

    fn track(code: &str, generated: bool) -> CaptionTrack {
        CaptionTrack {
            language_code: code.to_string(),
            language_name: code.to_string(),
            is_generated: generated,
            base_url: format!("https://example.com/{}", code),
        }
    }

    fn snippets(texts: &[&str]) -> Vec<CaptionSnippet> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| CaptionSnippet {
                text: t.to_string(),
                start: i as f64,
                duration: 1.0,
            })
            .collect()
    }

    /// Connector whose provider lists `tracks` and serves `texts` for any track
    fn connector_with(tracks: Vec<CaptionTrack>, texts: &'static [&'static str]) -> MockProviderConnector {
        let mut connector = MockProviderConnector::new();
        connector.expect_connect().times(1).returning(move |_| {
            let mut provider = MockTranscriptProvider::new();
            let listed = tracks.clone();
            provider
                .expect_list_tracks()
                .times(1)
                .returning(move |_| Ok(TrackList::new(listed.clone())));
            provider
                .expect_fetch_snippets()
                .returning(move |_, _| Ok(snippets(texts)));
            provider.expect_provider_name().return_const("mock");
            Ok(Box::new(provider))
        });
        connector
    }

    fn fetcher(connector: MockProviderConnector) -> TranscriptFetcher {
        TranscriptFetcher::new(Arc::new(connector), vec!["en".to_string()])
    }

    #[test]
    fn test_video_id_validation() {
        assert!(VideoId::parse("dQw4w9WgXcQ").is_ok());
        assert!(VideoId::parse("a-b_c-d_e-f").is_ok());

        for bad in ["", "invalid123", "dQw4w9WgXcQQ", "dQw4w9WgXc!", "dQw4w9 gXcQ", "dQw4w9WgXcé"] {
            assert!(
                matches!(VideoId::parse(bad), Err(FetchError::InvalidVideoId(_))),
                "{:?} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_video_id_deserialize_validates() {
        assert!(serde_json::from_str::<VideoId>("\"dQw4w9WgXcQ\"").is_ok());
        assert!(serde_json::from_str::<VideoId>("\"short\"").is_err());
    }

    #[test]
    fn test_join_snippets() {
        assert_eq!(join_snippets(["Hello", "world"]), "Hello world");
        assert_eq!(join_snippets(["a", "", "b"]), "a  b");
        assert_eq!(join_snippets(Vec::<&str>::new()), "");
        // No normalisation of the snippet text itself
        assert_eq!(join_snippets(["x &amp; y", " z"]), "x &amp; y  z");
    }

    #[tokio::test]
    async fn test_invalid_id_makes_no_network_call() {
        for bad in ["", "short", "twelve_chars", "has space!!", "dQw4w9WgXc/"] {
            let mut connector = MockProviderConnector::new();
            connector.expect_connect().times(0);

            let err = fetcher(connector)
                .fetch(&CorrelationId::generate(), bad, &route())
                .await
                .unwrap_err();
            assert!(matches!(err, FetchError::InvalidVideoId(_)));
        }
    }

    #[tokio::test]
    async fn test_preferred_language_is_used() {
        let connector = connector_with(vec![track("de", false), track("en", true)], &["Hello", "world"]);

        let result = fetcher(connector)
            .fetch(&CorrelationId::generate(), "dQw4w9WgXcQ", &route())
            .await
            .unwrap();

        assert_eq!(result.language_code, "en");
        assert_eq!(result.text, "Hello world");
        assert_eq!(result.title, "Video dQw4w9WgXcQ");
        assert_eq!(result.channel, "Unknown Channel");
        assert_eq!(result.video_id.as_str(), "dQw4w9WgXcQ");
    }

    #[tokio::test]
    async fn test_falls_back_to_first_listed_track() {
        let connector = connector_with(vec![track("ja", true), track("fr", false)], &["Bonjour"]);

        let result = fetcher(connector)
            .fetch(&CorrelationId::generate(), "dQw4w9WgXcQ", &route())
            .await
            .unwrap();

        // Manual tracks are listed ahead of generated ones
        assert_eq!(result.language_code, "fr");
        assert_ne!(result.language_code, "en");
        assert_eq!(result.text, "Bonjour");
    }

    #[tokio::test]
    async fn test_zero_tracks_is_no_transcript_available() {
        let mut connector = MockProviderConnector::new();
        connector.expect_connect().times(1).returning(|_| {
            let mut provider = MockTranscriptProvider::new();
            provider
                .expect_list_tracks()
                .returning(|_| Ok(TrackList::default()));
            provider.expect_fetch_snippets().times(0);
            provider.expect_provider_name().return_const("mock");
            Ok(Box::new(provider))
        });

        let err = fetcher(connector)
            .fetch(&CorrelationId::generate(), "aaaaaaaaaaa", &route())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::NoTranscriptAvailable(_)));
    }

    #[tokio::test]
    async fn test_listing_failure_is_terminal() {
        let mut connector = MockProviderConnector::new();
        connector.expect_connect().times(1).returning(|_| {
            let mut provider = MockTranscriptProvider::new();
            provider
                .expect_list_tracks()
                .returning(|id| Err(FetchError::VideoUnavailable(id.to_string())));
            provider.expect_fetch_snippets().times(0);
            Ok(Box::new(provider))
        });

        let err = fetcher(connector)
            .fetch(&CorrelationId::generate(), "aaaaaaaaaaa", &route())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::VideoUnavailable(_)));
    }

    #[tokio::test]
    async fn test_snippet_failure_is_not_retried() {
        let mut connector = MockProviderConnector::new();
        connector.expect_connect().times(1).returning(|_| {
            let mut provider = MockTranscriptProvider::new();
            provider
                .expect_list_tracks()
                .returning(|_| Ok(TrackList::new(vec![track("en", false), track("de", false)])));
            provider
                .expect_fetch_snippets()
                .times(1)
                .returning(|id, _| Err(FetchError::RequestBlocked(id.to_string())));
            provider.expect_provider_name().return_const("mock");
            Ok(Box::new(provider))
        });

        let err = fetcher(connector)
            .fetch(&CorrelationId::generate(), "dQw4w9WgXcQ", &route())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::RequestBlocked(_)));
    }

    #[tokio::test]
    async fn test_refetch_is_byte_identical() {
        let tracks = vec![track("en", false)];
        let first = fetcher(connector_with(tracks.clone(), &["same", "captions"]))
            .fetch(&CorrelationId::generate(), "dQw4w9WgXcQ", &route())
            .await
            .unwrap();
        let second = fetcher(connector_with(tracks, &["same", "captions"]))
            .fetch(&CorrelationId::generate(), "dQw4w9WgXcQ", &route())
            .await
            .unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_proxy_setup_failure_propagates() {
        let mut connector = MockProviderConnector::new();
        connector
            .expect_connect()
            .returning(|_| Err(FetchError::ProxySetup("bad proxy".to_string())));

        let err = fetcher(connector)
            .fetch(&CorrelationId::generate(), "dQw4w9WgXcQ", &route())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::ProxySetup(_)));
    }
}
