use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{redirect, Client, ClientBuilder};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::cache::BinarySource;
use crate::config::NetworkConfig;
use crate::error::FetchError;

/// Collections exposed by the JSON API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Posts,
    Photos,
    Albums,
    AlbumPhotos(i64),
}

impl Resource {
    /// Path relative to the API base URL.
    pub fn path(&self) -> String {
        match self {
            Resource::Posts => "posts".to_string(),
            Resource::Photos => "photos".to_string(),
            Resource::Albums => "albums".to_string(),
            Resource::AlbumPhotos(album_id) => format!("albums/{album_id}/photos"),
        }
    }
}

/// Single-attempt HTTP fetcher. Any non-success status is a failure; there
/// are no retries.
#[derive(Debug, Clone)]
pub struct NetworkClient {
    client: Client,
    base_url: Url,
}

impl NetworkClient {
    pub fn new(client: Client, base_url: &str) -> Result<Self, FetchError> {
        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self { client, base_url })
    }

    pub fn from_config(config: &NetworkConfig) -> Result<Self, FetchError> {
        let client = ClientBuilder::new()
            .redirect(redirect::Policy::limited(config.max_redirects))
            .timeout(config.request_timeout())
            .user_agent(config.user_agent.as_str())
            .build()?;
        Self::new(client, &config.base_url)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn resolve(&self, resource: &Resource) -> Result<Url, FetchError> {
        Ok(self.base_url.join(&resource.path())?)
    }

    pub async fn fetch_records<R: DeserializeOwned>(
        &self,
        resource: &Resource,
    ) -> Result<Vec<R>, FetchError> {
        let url = self.resolve(resource)?;
        let body = self.get_bytes(&url).await?;
        let records: Vec<R> = serde_json::from_slice(&body)?;
        debug!(url = %url, count = records.len(), "fetched records");
        Ok(records)
    }

    async fn get_bytes(&self, url: &Url) -> Result<Bytes, FetchError> {
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        Ok(response.bytes().await?)
    }
}

#[async_trait]
impl BinarySource for NetworkClient {
    async fn fetch_binary(&self, url: &Url) -> Result<Bytes, FetchError> {
        let body = self.get_bytes(url).await?;
        if body.is_empty() {
            return Err(FetchError::EmptyPayload);
        }
        Ok(body)
    }
}
