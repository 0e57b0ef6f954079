use async_trait::async_trait;
use regex::Regex;
use reqwest::header::COOKIE;
use reqwest::{Client, Response, StatusCode};
use serde_json::Value;
use std::sync::OnceLock;

use super::{timedtext, CaptionSnippet, CaptionTrack, TrackList, TranscriptProvider};
use crate::transcript::VideoId;
use crate::FetchError;

const CONSENT_FORM_MARKER: &str = "action=\"https://consent.youtube.com/s\"";
const INNERTUBE_CLIENT_NAME: &str = "ANDROID";
const INNERTUBE_CLIENT_VERSION: &str = "20.10.38";

/// YouTube caption provider using the watch page and the innertube player API
pub struct YoutubeProvider {
    client: Client,
    base_url: String,
}

impl YoutubeProvider {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn watch_url(&self, video_id: &VideoId) -> String {
        format!("{}/watch?v={}", self.base_url, video_id)
    }

    fn innertube_url(&self, api_key: &str) -> String {
        format!("{}/youtubei/v1/player?key={}", self.base_url, api_key)
    }

    /// Fetch the watch page, replaying once with a consent cookie if YouTube
    /// interposes its consent form
    async fn fetch_video_html(&self, video_id: &VideoId) -> Result<String, FetchError> {
        let url = self.watch_url(video_id);
        tracing::debug!(%video_id, "Fetching watch page");

        let response = self.client.get(&url).send().await?;
        let html = check_status(response, video_id)?.text().await?;

        if !html.contains(CONSENT_FORM_MARKER) {
            return Ok(html);
        }

        tracing::debug!(%video_id, "Consent form served, retrying with consent cookie");
        let consent_value = extract_consent_value(&html, video_id)?;

        let response = self
            .client
            .get(&url)
            .header(COOKIE, format!("CONSENT=YES+{}", consent_value))
            .send()
            .await?;
        let html = check_status(response, video_id)?.text().await?;

        if html.contains(CONSENT_FORM_MARKER) {
            return Err(FetchError::DataUnparsable(video_id.to_string()));
        }

        Ok(html)
    }

    async fn fetch_innertube_data(
        &self,
        video_id: &VideoId,
        api_key: &str,
    ) -> Result<Value, FetchError> {
        let body = serde_json::json!({
            "context": {
                "client": {
                    "clientName": INNERTUBE_CLIENT_NAME,
                    "clientVersion": INNERTUBE_CLIENT_VERSION
                }
            },
            "videoId": video_id.as_str()
        });

        let response = self
            .client
            .post(self.innertube_url(api_key))
            .json(&body)
            .send()
            .await?;

        check_status(response, video_id)?
            .json::<Value>()
            .await
            .map_err(|_| FetchError::DataUnparsable(video_id.to_string()))
    }
}

#[async_trait]
impl TranscriptProvider for YoutubeProvider {
    async fn list_tracks(&self, video_id: &VideoId) -> Result<TrackList, FetchError> {
        let html = self.fetch_video_html(video_id).await?;
        let api_key = extract_innertube_api_key(&html, video_id)?;
        let data = self.fetch_innertube_data(video_id, &api_key).await?;
        parse_caption_tracks(video_id, &data)
    }

    async fn fetch_snippets(
        &self,
        video_id: &VideoId,
        track: &CaptionTrack,
    ) -> Result<Vec<CaptionSnippet>, FetchError> {
        if track.base_url.contains("&exp=xpe") {
            return Err(FetchError::PoTokenRequired(video_id.to_string()));
        }

        let response = self.client.get(&track.base_url).send().await?;
        let xml = check_status(response, video_id)?.text().await?;

        timedtext::parse(&xml).map_err(|e| {
            tracing::warn!(%video_id, error = %e, "Caption payload could not be parsed");
            FetchError::DataUnparsable(video_id.to_string())
        })
    }

    fn provider_name(&self) -> &'static str {
        "YouTube"
    }
}

fn check_status(response: Response, video_id: &VideoId) -> Result<Response, FetchError> {
    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(FetchError::RequestBlocked(video_id.to_string()));
    }
    if !status.is_success() {
        return Err(FetchError::HttpStatus {
            video_id: video_id.to_string(),
            status: status.as_u16(),
        });
    }
    Ok(response)
}

fn consent_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r#"name="v" value="(.*?)""#).ok())
        .as_ref()
}

fn api_key_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r#""INNERTUBE_API_KEY":\s*"([a-zA-Z0-9_-]+)""#).ok())
        .as_ref()
}

/// First capture of `pattern` in `html`; a pattern that failed to compile is an error
fn capture_first(
    pattern: Option<&'static Regex>,
    html: &str,
    video_id: &VideoId,
) -> Result<String, FetchError> {
    let Some(re) = pattern else {
        tracing::error!(%video_id, "Watch page pattern failed to compile");
        return Err(FetchError::DataUnparsable(video_id.to_string()));
    };

    re.captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| FetchError::DataUnparsable(video_id.to_string()))
}

fn extract_consent_value(html: &str, video_id: &VideoId) -> Result<String, FetchError> {
    capture_first(consent_pattern(), html, video_id)
}

fn extract_innertube_api_key(html: &str, video_id: &VideoId) -> Result<String, FetchError> {
    if html.contains("class=\"g-recaptcha\"") {
        return Err(FetchError::RequestBlocked(video_id.to_string()));
    }

    capture_first(api_key_pattern(), html, video_id)
}

fn assert_playability(video_id: &VideoId, data: &Value) -> Result<(), FetchError> {
    let Some(playability) = data.get("playabilityStatus") else {
        return Ok(());
    };

    let status = playability.get("status").and_then(Value::as_str).unwrap_or("");
    if status == "OK" {
        return Ok(());
    }

    let reason = playability.get("reason").and_then(Value::as_str).unwrap_or("");

    match status {
        "LOGIN_REQUIRED" if reason.contains("not a bot") => {
            Err(FetchError::RequestBlocked(video_id.to_string()))
        }
        "LOGIN_REQUIRED" if reason.contains("inappropriate for some users") => {
            Err(FetchError::AgeRestricted(video_id.to_string()))
        }
        "ERROR" if reason.contains("unavailable") => {
            Err(FetchError::VideoUnavailable(video_id.to_string()))
        }
        _ => Err(FetchError::VideoUnplayable {
            video_id: video_id.to_string(),
            reason: reason.to_string(),
        }),
    }
}

/// Turn an innertube player response into the video's caption tracks
fn parse_caption_tracks(video_id: &VideoId, data: &Value) -> Result<TrackList, FetchError> {
    assert_playability(video_id, data)?;

    let renderer = data
        .get("captions")
        .and_then(|c| c.get("playerCaptionsTracklistRenderer"))
        .ok_or_else(|| FetchError::TranscriptsDisabled(video_id.to_string()))?;

    let tracks: Vec<CaptionTrack> = renderer
        .get("captionTracks")
        .and_then(Value::as_array)
        .map(|tracks| tracks.iter().filter_map(parse_caption_track).collect())
        .unwrap_or_default();

    if tracks.is_empty() {
        return Err(FetchError::TranscriptsDisabled(video_id.to_string()));
    }

    Ok(TrackList::new(tracks))
}

fn parse_caption_track(caption: &Value) -> Option<CaptionTrack> {
    let language_code = caption.get("languageCode")?.as_str()?.to_string();
    let base_url = caption.get("baseUrl")?.as_str()?.replace("&fmt=srv3", "");

    let language_name = caption
        .get("name")
        .and_then(|n| {
            n.get("simpleText")
                .or_else(|| n.get("runs").and_then(|r| r.get(0)).and_then(|r| r.get("text")))
        })
        .and_then(Value::as_str)
        .unwrap_or(&language_code)
        .to_string();

    let is_generated = caption.get("kind").and_then(Value::as_str) == Some("asr");

    Some(CaptionTrack {
        language_code,
        language_name,
        is_generated,
        base_url,
    })
}
