use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

use crate::config::ApiSettings;

/// One upload of a channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub video_id: String,
    pub title: String,
    pub published_at: String,
}

/// One page of a playlist listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistPage {
    pub items: Vec<CatalogEntry>,
    pub next_page_token: Option<String>,
}

/// Every video of a channel, in the order the provider listed them
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelCatalog {
    entries: Vec<CatalogEntry>,
    index: HashMap<String, usize>,
}

impl ChannelCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry; a repeated video ID updates the existing entry in place
    pub fn insert(&mut self, entry: CatalogEntry) {
        match self.index.get(&entry.video_id) {
            Some(&position) => self.entries[position] = entry,
            None => {
                self.index.insert(entry.video_id.clone(), self.entries.len());
                self.entries.push(entry);
            }
        }
    }

    pub fn get(&self, video_id: &str) -> Option<&CatalogEntry> {
        self.index.get(video_id).map(|&position| &self.entries[position])
    }

    pub fn contains(&self, video_id: &str) -> bool {
        self.index.contains_key(video_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<CatalogEntry> for ChannelCatalog {
    fn from_iter<I: IntoIterator<Item = CatalogEntry>>(iter: I) -> Self {
        let mut catalog = Self::new();
        for entry in iter {
            catalog.insert(entry);
        }
        catalog
    }
}

/// Paginated source of channel metadata
#[async_trait]
pub trait ChannelMetadataProvider: Send + Sync {
    /// ID of the playlist holding every upload of `channel_id`
    async fn uploads_playlist_id(&self, channel_id: &str) -> Result<String>;

    /// One page of `playlist_id`, continuing from `page_token`
    async fn playlist_page(&self, playlist_id: &str, page_token: Option<&str>) -> Result<PlaylistPage>;
}

/// Enumerate a playlist page by page until no continuation token is returned.
///
/// A continuation token that was already followed ends the enumeration.
pub async fn enumerate_catalog(
    provider: &dyn ChannelMetadataProvider,
    playlist_id: &str,
) -> Result<ChannelCatalog> {
    let mut catalog = ChannelCatalog::new();
    let mut page_token: Option<String> = None;
    let mut seen_tokens = HashSet::new();
    let mut pages = 0usize;

    loop {
        let page = provider
            .playlist_page(playlist_id, page_token.as_deref())
            .await
            .with_context(|| format!("Failed to fetch page {} of playlist {}", pages + 1, playlist_id))?;
        pages += 1;

        for entry in page.items {
            catalog.insert(entry);
        }

        match page.next_page_token {
            Some(token) if seen_tokens.insert(token.clone()) => page_token = Some(token),
            Some(token) => {
                tracing::warn!(
                    "Playlist {} repeated page token {}, stopping enumeration",
                    playlist_id,
                    token
                );
                break;
            }
            None => break,
        }
    }

    tracing::info!(
        "Enumerated {} videos from playlist {} in {} pages",
        catalog.len(),
        playlist_id,
        pages
    );
    Ok(catalog)
}

/// Resolve the uploads playlist of `channel_id` and enumerate it
pub async fn fetch_channel_catalog(
    provider: &dyn ChannelMetadataProvider,
    channel_id: &str,
) -> Result<ChannelCatalog> {
    let playlist_id = provider.uploads_playlist_id(channel_id).await?;
    tracing::debug!("Uploads playlist for {}: {}", channel_id, playlist_id);
    enumerate_catalog(provider, &playlist_id).await
}

#[derive(Debug, Deserialize)]
struct ChannelListResponse {
    #[serde(default)]
    items: Vec<ChannelItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelItem {
    content_details: ContentDetails,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContentDetails {
    related_playlists: RelatedPlaylists,
}

#[derive(Debug, Deserialize)]
struct RelatedPlaylists {
    uploads: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItemListResponse {
    #[serde(default)]
    items: Vec<PlaylistItem>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlaylistItem {
    snippet: PlaylistSnippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistSnippet {
    title: String,
    published_at: String,
    resource_id: ResourceId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceId {
    video_id: String,
}

/// YouTube Data API v3 client for the `channels` and `playlistItems` endpoints
pub struct YouTubeDataApi {
    client: Client,
    base_url: String,
    api_key: String,
    page_size: u32,
}

impl YouTubeDataApi {
    pub fn new(settings: &ApiSettings, api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            page_size: settings.page_size,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let url = format!("{}/{}", self.base_url, endpoint);
        let response = self
            .client
            .get(&url)
            .query(query)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await
            .with_context(|| format!("Request to {} failed", url))?;

        if !response.status().is_success() {
            anyhow::bail!("YouTube Data API {} returned HTTP {}", endpoint, response.status());
        }

        response
            .json::<T>()
            .await
            .with_context(|| format!("Unexpected response from {}", endpoint))
    }
}

#[async_trait]
impl ChannelMetadataProvider for YouTubeDataApi {
    async fn uploads_playlist_id(&self, channel_id: &str) -> Result<String> {
        let response: ChannelListResponse = self
            .get_json("channels", &[("id", channel_id), ("part", "contentDetails")])
            .await
            .context("Error retrieving upload ID")?;

        response
            .items
            .into_iter()
            .next()
            .map(|item| item.content_details.related_playlists.uploads)
            .ok_or_else(|| anyhow::anyhow!("Channel not found: {}", channel_id))
    }

    async fn playlist_page(&self, playlist_id: &str, page_token: Option<&str>) -> Result<PlaylistPage> {
        let page_size = self.page_size.to_string();
        let mut query = vec![
            ("playlistId", playlist_id),
            ("part", "snippet"),
            ("maxResults", page_size.as_str()),
        ];
        if let Some(token) = page_token {
            query.push(("pageToken", token));
        }

        let response: PlaylistItemListResponse = self.get_json("playlistItems", &query).await?;

        Ok(PlaylistPage {
            items: response
                .items
                .into_iter()
                .map(|item| CatalogEntry {
                    video_id: item.snippet.resource_id.video_id,
                    title: item.snippet.title,
                    published_at: item.snippet.published_at,
                })
                .collect(),
            next_page_token: response.next_page_token.filter(|token| !token.is_empty()),
        })
    }
}
