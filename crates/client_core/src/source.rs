//! Read-only origins of the catalog and flow documents.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::{header::CACHE_CONTROL, Client};
use serde_json::Value;
use shared::domain::FlowId;
use tracing::debug;
use url::Url;

const FLOWS_DIR: &str = "flows";
const CATALOG_FILE: &str = "index.json";

#[async_trait]
pub trait FlowSource: Send + Sync {
    async fn fetch_catalog(&self) -> Result<Value>;
    async fn fetch_flow(&self, id: &FlowId) -> Result<Value>;
    fn describe(&self) -> String;
}

/// Fetches `flows/index.json` and `flows/<id>.json` relative to a base URL.
pub struct HttpFlowSource {
    http: Client,
    base_url: Url,
}

impl HttpFlowSource {
    pub fn new(base_url: &str) -> Result<Self> {
        let mut base_url =
            Url::parse(base_url).with_context(|| format!("invalid flow source url '{base_url}'"))?;
        if base_url.cannot_be_a_base() {
            bail!("flow source url '{base_url}' cannot carry a path");
        }
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            http: Client::new(),
            base_url,
        })
    }

    pub fn catalog_url(&self) -> Result<Url> {
        Ok(self.base_url.join(&format!("{FLOWS_DIR}/{CATALOG_FILE}"))?)
    }

    pub fn flow_url(&self, id: &FlowId) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("flow source url '{}' cannot carry a path", self.base_url))?
            .pop_if_empty()
            .push(FLOWS_DIR)
            .push(&format!("{}.json", id.as_str()));
        Ok(url)
    }

    async fn get_json(&self, url: Url) -> Result<Value> {
        debug!(%url, "fetching flow resource");
        let res = self
            .http
            .get(url.clone())
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?
            .error_for_status()
            .with_context(|| format!("unsuccessful response from {url}"))?;
        res.json::<Value>()
            .await
            .with_context(|| format!("response from {url} is not valid JSON"))
    }
}

#[async_trait]
impl FlowSource for HttpFlowSource {
    async fn fetch_catalog(&self) -> Result<Value> {
        self.get_json(self.catalog_url()?).await
    }

    async fn fetch_flow(&self, id: &FlowId) -> Result<Value> {
        self.get_json(self.flow_url(id)?).await
    }

    fn describe(&self) -> String {
        self.base_url.to_string()
    }
}

/// Reads the same layout from a local directory.
pub struct DirectoryFlowSource {
    root: PathBuf,
}

impl DirectoryFlowSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn flow_path(&self, id: &FlowId) -> Result<PathBuf> {
        let raw = id.as_str();
        if raw.is_empty()
            || raw == "."
            || raw == ".."
            || raw.contains(|c: char| c == '/' || c == '\\')
            || Path::new(raw).is_absolute()
        {
            bail!("flow id '{raw}' cannot be mapped to a file name");
        }
        Ok(self.root.join(FLOWS_DIR).join(format!("{raw}.json")))
    }

    async fn read_json(path: &Path) -> Result<Value> {
        debug!(path = %path.display(), "reading flow resource");
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("{} is not valid JSON", path.display()))
    }
}

#[async_trait]
impl FlowSource for DirectoryFlowSource {
    async fn fetch_catalog(&self) -> Result<Value> {
        Self::read_json(&self.root.join(FLOWS_DIR).join(CATALOG_FILE)).await
    }

    async fn fetch_flow(&self, id: &FlowId) -> Result<Value> {
        let path = self.flow_path(id)?;
        Self::read_json(&path).await
    }

    fn describe(&self) -> String {
        self.root.display().to_string()
    }
}

/// Picks an HTTP source for `http(s)://` locations and a directory source otherwise.
pub fn source_for_location(location: &str) -> Result<Arc<dyn FlowSource>> {
    let location = location.trim();
    if location.starts_with("http://") || location.starts_with("https://") {
        Ok(Arc::new(HttpFlowSource::new(location)?))
    } else {
        let root = location.strip_prefix("file://").unwrap_or(location);
        Ok(Arc::new(DirectoryFlowSource::new(root)))
    }
}
