use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_LANGUAGE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub mod timedtext;
pub mod youtube;

use crate::config::TranscriptConfig;
use crate::proxy::ProxyRoute;
use crate::transcript::VideoId;
use crate::FetchError;

/// One language/version of captions available for a video
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionTrack {
    pub language_code: String,

    /// Display name as reported by the provider (e.g. "English (auto-generated)")
    pub language_name: String,

    /// Produced by speech recognition rather than uploaded
    pub is_generated: bool,

    /// Where the caption payload is fetched from
    pub base_url: String,
}

/// One timed unit of caption text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionSnippet {
    pub text: String,
    pub start: f64,
    pub duration: f64,
}

/// Caption tracks for a video, manually created tracks ahead of generated ones
#[derive(Debug, Clone, Default)]
pub struct TrackList {
    tracks: Vec<CaptionTrack>,
}

impl TrackList {
    /// Order is preserved within the manual and generated groups
    pub fn new(tracks: Vec<CaptionTrack>) -> Self {
        let (manual, generated): (Vec<_>, Vec<_>) =
            tracks.into_iter().partition(|t| !t.is_generated);
        Self {
            tracks: manual.into_iter().chain(generated).collect(),
        }
    }

    /// First track matching the language codes in priority order, manual before generated
    pub fn find(&self, language_codes: &[String]) -> Option<&CaptionTrack> {
        language_codes.iter().find_map(|code| {
            self.tracks
                .iter()
                .find(|t| !t.is_generated && &t.language_code == code)
                .or_else(|| {
                    self.tracks
                        .iter()
                        .find(|t| t.is_generated && &t.language_code == code)
                })
        })
    }

    pub fn first(&self) -> Option<&CaptionTrack> {
        self.tracks.first()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CaptionTrack> {
        self.tracks.iter()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

/// External transcript provider, bound to one outbound route
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TranscriptProvider: Send + Sync {
    /// List the caption tracks available for a video
    async fn list_tracks(&self, video_id: &VideoId) -> Result<TrackList, FetchError>;

    /// Fetch the time-ordered caption snippets of one track
    async fn fetch_snippets(
        &self,
        video_id: &VideoId,
        track: &CaptionTrack,
    ) -> Result<Vec<CaptionSnippet>, FetchError>;

    /// Get the name of this provider
    fn provider_name(&self) -> &'static str;
}

/// Builds a provider client whose traffic goes through a given route
#[cfg_attr(test, mockall::automock)]
pub trait ProviderConnector: Send + Sync {
    fn connect(&self, route: &ProxyRoute) -> Result<Box<dyn TranscriptProvider>, FetchError>;
}

/// Connects [`youtube::YoutubeProvider`] clients through the selected proxy
#[derive(Debug, Clone)]
pub struct YoutubeConnector {
    base_url: String,
    timeout: Duration,
}

impl YoutubeConnector {
    pub fn new(config: &TranscriptConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }

    /// HTTP client with the provider's default headers and timeout
    fn client_builder(&self) -> reqwest::ClientBuilder {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US"));

        Client::builder()
            .default_headers(headers)
            .timeout(self.timeout)
    }
}

impl ProviderConnector for YoutubeConnector {
    fn connect(&self, route: &ProxyRoute) -> Result<Box<dyn TranscriptProvider>, FetchError> {
        let proxy = route
            .to_reqwest_proxy()
            .map_err(|e| FetchError::ProxySetup(format!("{}: {}", route.descriptor(), e)))?;

        let client = self
            .client_builder()
            .proxy(proxy)
            .build()
            .map_err(|e| FetchError::ProxySetup(e.to_string()))?;

        Ok(Box::new(youtube::YoutubeProvider::new(client, &self.base_url)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(code: &str, generated: bool) -> CaptionTrack {
        CaptionTrack {
            language_code: code.to_string(),
            language_name: code.to_uppercase(),
            is_generated: generated,
            base_url: format!("https://example.com/{}", code),
        }
    }

    fn langs(codes: &[&str]) -> Vec<String> {
        codes.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_manual_tracks_sort_first() {
        let list = TrackList::new(vec![
            track("de", true),
            track("fr", false),
            track("en", true),
            track("es", false),
        ]);
        let order: Vec<_> = list.iter().map(|t| t.language_code.as_str()).collect();
        assert_eq!(order, vec!["fr", "es", "de", "en"]);
        assert_eq!(list.first().unwrap().language_code, "fr");
    }

    #[test]
    fn test_find_prefers_manual_over_generated() {
        let list = TrackList::new(vec![track("en", true), track("en", false)]);
        let found = list.find(&langs(&["en"])).unwrap();
        assert!(!found.is_generated);
    }

    #[test]
    fn test_find_respects_language_priority() {
        let list = TrackList::new(vec![track("es", false), track("en", true)]);
        assert_eq!(list.find(&langs(&["en", "es"])).unwrap().language_code, "en");
        assert_eq!(list.find(&langs(&["fr", "es"])).unwrap().language_code, "es");
        assert!(list.find(&langs(&["fr"])).is_none());
    }

    #[test]
    fn test_empty_list() {
        let list = TrackList::default();
        assert!(list.is_empty());
        assert_eq!(list.len(), 0);
        assert!(list.first().is_none());
    }
}
