#![forbid(unsafe_code)]

//! YouTube Data API v3 access: resolving a channel's uploads playlist,
//! listing its most recent entries and turning them into [`NewContent`] rows.
//!
//! Network access sits behind [`VideoPlatform`] so the fetch logic can run
//! against canned responses in tests.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, de::DeserializeOwned};
use tracing::debug;

use crate::config::{ChannelConfig, CollectorConfig};
use crate::duration::{is_short_form, parse_duration};
use crate::store::NewContent;

/// Value written to `content.source_type` for everything collected here.
pub const SOURCE_TYPE: &str = "youtube";

const UPLOADS_PLAYLIST_PREFIX: &str = "UU";
/// Upper bound the API accepts for `maxResults` on playlistItems.list.
const API_MAX_RESULTS: u32 = 50;

/// Maps a channel id (`UC...`) to the id of its "uploads" playlist (`UU...`).
pub fn uploads_playlist_id(channel_id: &str) -> String {
    let rest = channel_id
        .char_indices()
        .nth(2)
        .map_or("", |(index, _)| &channel_id[index..]);
    format!("{UPLOADS_PLAYLIST_PREFIX}{rest}")
}

/// Canonical watch URL; doubles as the dedup key in the store.
pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={video_id}")
}

/// A `video` resource as returned by `videos.list?part=snippet,contentDetails`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawVideo {
    pub id: String,
    pub snippet: VideoSnippet,
    #[serde(default)]
    pub content_details: VideoContentDetails,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoSnippet {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub thumbnails: Thumbnails,
    pub published_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VideoContentDetails {
    #[serde(default)]
    pub duration: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Thumbnails {
    pub default: Option<Thumbnail>,
    pub medium: Option<Thumbnail>,
    pub high: Option<Thumbnail>,
    pub standard: Option<Thumbnail>,
    pub maxres: Option<Thumbnail>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Thumbnail {
    pub url: String,
}

impl Thumbnails {
    /// Highest resolution variant that is present.
    pub fn best_url(&self) -> Option<&str> {
        [
            &self.maxres,
            &self.standard,
            &self.high,
            &self.medium,
            &self.default,
        ]
        .into_iter()
        .flatten()
        .map(|thumbnail| thumbnail.url.as_str())
        .find(|url| !url.is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct PlaylistItemListResponse {
    #[serde(default)]
    items: Vec<PlaylistItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItem {
    content_details: PlaylistItemContentDetails,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItemContentDetails {
    video_id: String,
}

#[derive(Debug, Deserialize)]
struct VideoListResponse {
    #[serde(default)]
    items: Vec<RawVideo>,
}

/// The two API calls the collector needs.
pub trait VideoPlatform {
    /// Most recent video ids of a playlist, newest first.
    fn list_playlist_video_ids(&self, playlist_id: &str, max_results: u32)
    -> Result<Vec<String>>;

    /// Full metadata for `video_ids`, fetched in one request.
    fn fetch_videos(&self, video_ids: &[String]) -> Result<Vec<RawVideo>>;
}

/// Blocking API-key client built on a shared `ureq` agent.
#[derive(Clone)]
pub struct YouTubeClient {
    agent: ureq::Agent,
    api_base: String,
    api_key: String,
}

impl YouTubeClient {
    pub fn new(api_base: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self {
            agent,
            api_base: api_base.into(),
            api_key: api_key.into(),
        }
    }

    pub fn from_config(config: &CollectorConfig) -> Self {
        Self::new(
            config.api_base.clone(),
            config.api_key.clone(),
            config.http_timeout,
        )
    }

    fn get_json<T: DeserializeOwned>(&self, endpoint: &str, query: &[(&str, &str)]) -> Result<T> {
        let url = format!("{}/{endpoint}", self.api_base);
        let mut request = self.agent.get(&url);
        for (key, value) in query {
            request = request.query(key, value);
        }
        request = request.query("key", &self.api_key);

        // Errors are rebuilt by hand: ureq's own messages embed the full URL,
        // which carries the API key.
        let response = match request.call() {
            Ok(response) => response,
            Err(ureq::Error::Status(code, response)) => {
                let body = response.into_string().unwrap_or_default();
                bail!("{endpoint} returned HTTP {code}: {}", body.trim());
            }
            Err(ureq::Error::Transport(transport)) => {
                let detail = transport.message().unwrap_or_default().to_string();
                bail!("{endpoint} request failed: {} {detail}", transport.kind());
            }
        };

        response
            .into_json::<T>()
            .with_context(|| format!("decoding {endpoint} response"))
    }
}

impl VideoPlatform for YouTubeClient {
    fn list_playlist_video_ids(
        &self,
        playlist_id: &str,
        max_results: u32,
    ) -> Result<Vec<String>> {
        let max_results = max_results.clamp(1, API_MAX_RESULTS).to_string();
        let response: PlaylistItemListResponse = self.get_json(
            "playlistItems",
            &[
                ("part", "contentDetails"),
                ("playlistId", playlist_id),
                ("maxResults", max_results.as_str()),
            ],
        )?;
        Ok(response
            .items
            .into_iter()
            .map(|item| item.content_details.video_id)
            .collect())
    }

    fn fetch_videos(&self, video_ids: &[String]) -> Result<Vec<RawVideo>> {
        let ids = video_ids.join(",");
        let response: VideoListResponse = self.get_json(
            "videos",
            &[("part", "snippet,contentDetails"), ("id", ids.as_str())],
        )?;
        Ok(response.items)
    }
}

/// Lists the latest uploads of `channel` and returns the long-form ones as
/// rows ready for insertion, in the order the API returned them.
///
/// API errors propagate unchanged; retrying is left to the next run.
pub fn fetch_channel_videos<P: VideoPlatform + ?Sized>(
    api: &P,
    channel: &ChannelConfig,
    max_results: u32,
) -> Result<Vec<NewContent>> {
    let playlist_id = uploads_playlist_id(&channel.id);
    let video_ids = api
        .list_playlist_video_ids(&playlist_id, max_results)
        .with_context(|| format!("listing uploads playlist {playlist_id}"))?;

    if video_ids.is_empty() {
        debug!(channel = %channel.name, "uploads playlist is empty");
        return Ok(Vec::new());
    }

    let videos = api
        .fetch_videos(&video_ids)
        .with_context(|| format!("fetching metadata for {} videos", video_ids.len()))?;

    let fetched = videos.len();
    let items: Vec<NewContent> = videos
        .into_iter()
        .filter_map(|video| normalize_video(video, &channel.name))
        .collect();
    debug!(
        channel = %channel.name,
        fetched,
        kept = items.len(),
        "filtered short-form videos"
    );
    Ok(items)
}

/// Builds the stored row for `video`, or `None` when it is a Short.
pub fn normalize_video(video: RawVideo, channel_name: &str) -> Option<NewContent> {
    let estimated_duration = parse_duration(video.content_details.duration.as_deref());
    if is_short_form(estimated_duration) {
        return None;
    }

    let thumbnail = video
        .snippet
        .thumbnails
        .best_url()
        .unwrap_or_default()
        .to_string();

    Some(NewContent {
        title: video.snippet.title,
        url: watch_url(&video.id),
        source_type: SOURCE_TYPE.to_string(),
        source_name: channel_name.to_string(),
        description: video.snippet.description.unwrap_or_default(),
        thumbnail,
        published_at: video.snippet.published_at,
        estimated_duration,
    })
}
