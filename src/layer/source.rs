//! Upstream tile rendering.
//!
//! A [`TileSource`] produces the encoded image for one tile on a cache miss.
//! The only networked implementation is [`WmsSource`], which issues a WMS
//! 1.1.1 `GetMap` request covering exactly the tile's bounds.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;
use url::Url;

use crate::error::{ConfigError, SourceError};
use crate::grid::{BoundingBox, Srs};

use super::mime::MimeType;

/// Default timeout for upstream requests.
pub const DEFAULT_SOURCE_TIMEOUT: Duration = Duration::from_secs(30);

/// Everything needed to render one tile.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub layer: String,
    pub srs: Srs,
    pub bounds: BoundingBox,
    pub width: u32,
    pub height: u32,
    pub format: MimeType,

    /// Request parameters after filtering, defaults included
    pub parameters: BTreeMap<String, String>,
}

/// Renders tiles on a cache miss.
#[async_trait]
pub trait TileSource: Send + Sync {
    async fn render(&self, request: &RenderRequest) -> Result<Bytes, SourceError>;
}

/// WMS server used as a tile renderer.
#[derive(Debug, Clone)]
pub struct WmsSource {
    client: reqwest::Client,
    base_url: Url,
    /// Upstream `LAYERS` value
    layers: String,
    styles: String,
    transparent: bool,
    vendor_parameters: BTreeMap<String, String>,
}

impl WmsSource {
    /// Create a source for `layers` served at `base_url`.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidLayer`] when the URL does not parse or the HTTP
    /// client cannot be built.
    pub fn new(base_url: &str, layers: impl Into<String>) -> Result<Self, ConfigError> {
        let layers = layers.into();
        let invalid = |reason: String| ConfigError::InvalidLayer {
            name: layers.clone(),
            reason,
        };

        let base_url = Url::parse(base_url)
            .map_err(|e| invalid(format!("invalid WMS URL {}: {}", base_url, e)))?;
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_SOURCE_TIMEOUT)
            .build()
            .map_err(|e| invalid(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            layers,
            styles: String::new(),
            transparent: true,
            vendor_parameters: BTreeMap::new(),
        })
    }

    pub fn with_styles(mut self, styles: impl Into<String>) -> Self {
        self.styles = styles.into();
        self
    }

    pub fn with_transparent(mut self, transparent: bool) -> Self {
        self.transparent = transparent;
        self
    }

    /// Extra parameters appended to every request.
    pub fn with_vendor_parameters(mut self, parameters: BTreeMap<String, String>) -> Self {
        self.vendor_parameters = parameters;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The `GetMap` URL for `request`.
    ///
    /// Request parameters override the configured styles and vendor
    /// parameters with the same (case-insensitive) name.
    pub fn get_map_url(&self, request: &RenderRequest) -> Url {
        let mut params: BTreeMap<String, String> = BTreeMap::new();
        params.insert("SERVICE".into(), "WMS".into());
        params.insert("REQUEST".into(), "GetMap".into());
        params.insert("VERSION".into(), "1.1.1".into());
        params.insert("LAYERS".into(), self.layers.clone());
        params.insert("STYLES".into(), self.styles.clone());
        params.insert("SRS".into(), request.srs.to_string());
        params.insert("BBOX".into(), request.bounds.to_string());
        params.insert("WIDTH".into(), request.width.to_string());
        params.insert("HEIGHT".into(), request.height.to_string());
        params.insert("FORMAT".into(), request.format.format().to_string());
        params.insert("EXCEPTIONS".into(), "application/vnd.ogc.se_xml".into());
        if request.format.supports_transparency() {
            params.insert("TRANSPARENT".into(), self.transparent.to_string().to_uppercase());
        }
        for (key, value) in self.vendor_parameters.iter().chain(&request.parameters) {
            params.insert(key.to_uppercase(), value.clone());
        }

        let mut url = self.base_url.clone();
        {
            let mut query = url.query_pairs_mut();
            for (key, value) in &params {
                query.append_pair(key, value);
            }
        }
        url
    }
}

#[async_trait]
impl TileSource for WmsSource {
    async fn render(&self, request: &RenderRequest) -> Result<Bytes, SourceError> {
        let url = self.get_map_url(request);
        debug!(url = %url, "Requesting tile from WMS");

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| SourceError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        // Service exceptions come back as 200 with an XML body
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let expected_xml = matches!(request.format, MimeType::Kml);
        if !expected_xml && (content_type.contains("xml") || content_type.starts_with("text/")) {
            return Err(SourceError::UnexpectedContent { content_type });
        }

        response
            .bytes()
            .await
            .map_err(|e| SourceError::Http(e.to_string()))
    }
}
