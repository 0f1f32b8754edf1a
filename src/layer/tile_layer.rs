//! Cached layers.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::TileError;
use crate::grid::{GridSubset, Srs, TileIndex};

use super::mime::MimeType;
use super::source::{RenderRequest, TileSource};

/// Default meta-tiling factors (columns, rows).
pub const DEFAULT_META_FACTORS: [u32; 2] = [4, 4];

/// A request parameter a layer lets clients vary.
///
/// Requests that omit the parameter get the default. When `values` is
/// non-empty only those values are accepted. Matching on the key is
/// case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterFilter {
    pub key: String,
    pub default: String,
    #[serde(default)]
    pub values: Vec<String>,
}

impl ParameterFilter {
    /// Value to use for a request that supplied `given`.
    pub fn apply(&self, given: Option<&str>) -> Result<String, TileError> {
        match given {
            None | Some("") => Ok(self.default.clone()),
            Some(value) if self.values.is_empty() || self.values.iter().any(|v| v == value) => {
                Ok(value.to_string())
            }
            Some(value) => Err(TileError::invalid(format!(
                "value {} is not allowed for parameter {}",
                value, self.key
            ))),
        }
    }
}

/// A named source of tiles available in one or more gridsets.
pub struct TileLayer {
    name: String,
    subsets: BTreeMap<String, Arc<GridSubset>>,
    formats: Vec<MimeType>,
    meta_factors: [u32; 2],
    parameter_filters: Vec<ParameterFilter>,
    max_age: Option<u64>,
    source: Arc<dyn TileSource>,
}

impl fmt::Debug for TileLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TileLayer")
            .field("name", &self.name)
            .field("gridsets", &self.subsets.keys().collect::<Vec<_>>())
            .field("formats", &self.formats)
            .field("meta_factors", &self.meta_factors)
            .finish_non_exhaustive()
    }
}

impl TileLayer {
    /// A layer with PNG output, default meta factors and no parameters.
    pub fn new(name: impl Into<String>, source: Arc<dyn TileSource>) -> Self {
        Self {
            name: name.into(),
            subsets: BTreeMap::new(),
            formats: vec![MimeType::Png],
            meta_factors: DEFAULT_META_FACTORS,
            parameter_filters: Vec::new(),
            max_age: None,
            source,
        }
    }

    /// Make the layer available in the subset's gridset.
    pub fn with_subset(mut self, subset: GridSubset) -> Self {
        self.subsets
            .insert(subset.name().to_string(), Arc::new(subset));
        self
    }

    pub fn with_formats(mut self, formats: Vec<MimeType>) -> Self {
        self.formats = formats;
        self
    }

    pub fn with_meta_factors(mut self, meta_factors: [u32; 2]) -> Self {
        self.meta_factors = [meta_factors[0].max(1), meta_factors[1].max(1)];
        self
    }

    pub fn with_parameter_filters(mut self, filters: Vec<ParameterFilter>) -> Self {
        self.parameter_filters = filters;
        self
    }

    /// Client cache lifetime in seconds for served tiles.
    pub fn with_max_age(mut self, max_age: Option<u64>) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn grid_subset(&self, gridset: &str) -> Option<&Arc<GridSubset>> {
        self.subsets.get(gridset)
    }

    pub fn grid_subsets(&self) -> impl Iterator<Item = &Arc<GridSubset>> {
        self.subsets.values()
    }

    pub fn gridset_names(&self) -> Vec<&str> {
        self.subsets.keys().map(String::as_str).collect()
    }

    /// First subset whose gridset uses `srs`.
    pub fn grid_subset_for_srs(&self, srs: &Srs) -> Option<&Arc<GridSubset>> {
        self.subsets.values().find(|subset| subset.srs() == srs)
    }

    pub fn formats(&self) -> &[MimeType] {
        &self.formats
    }

    pub fn supports_format(&self, format: MimeType) -> bool {
        self.formats.contains(&format)
    }

    /// The first configured format.
    pub fn default_format(&self) -> MimeType {
        self.formats.first().copied().unwrap_or(MimeType::Png)
    }

    pub fn meta_factors(&self) -> [u32; 2] {
        self.meta_factors
    }

    pub fn parameter_filters(&self) -> &[ParameterFilter] {
        &self.parameter_filters
    }

    pub fn max_age(&self) -> Option<u64> {
        self.max_age
    }

    pub fn source(&self) -> &Arc<dyn TileSource> {
        &self.source
    }

    /// Resolve the filtered parameters of a request.
    ///
    /// Only keys with a filter are kept; each gets its default when absent.
    pub fn filter_parameters(
        &self,
        given: &BTreeMap<String, String>,
    ) -> Result<BTreeMap<String, String>, TileError> {
        self.parameter_filters
            .iter()
            .map(|filter| {
                let value = given
                    .iter()
                    .find(|(key, _)| key.eq_ignore_ascii_case(&filter.key))
                    .map(|(_, value)| value.as_str());
                Ok::<_, TileError>((filter.key.clone(), filter.apply(value)?))
            })
            .collect()
    }

    /// Identifier of a filtered parameter set, `None` when every value is the default.
    ///
    /// The identifier is a digest of the sorted `key=value` pairs, so it is
    /// stable across restarts and safe to use in storage paths.
    pub fn parameters_id(&self, filtered: &BTreeMap<String, String>) -> Option<String> {
        let all_default = self
            .parameter_filters
            .iter()
            .all(|filter| filtered.get(&filter.key) == Some(&filter.default));
        if all_default {
            return None;
        }

        let mut hasher = Sha256::new();
        for (key, value) in filtered {
            hasher.update(key.as_bytes());
            hasher.update(b"=");
            hasher.update(value.as_bytes());
            hasher.update(b"&");
        }
        Some(hex::encode(&hasher.finalize()[..20]))
    }

    /// Upstream request rendering `index` of `subset`.
    pub fn render_request(
        &self,
        subset: &GridSubset,
        index: TileIndex,
        format: MimeType,
        parameters: BTreeMap<String, String>,
    ) -> Result<RenderRequest, TileError> {
        Ok(RenderRequest {
            layer: self.name.clone(),
            srs: subset.srs().clone(),
            bounds: subset.bounds_from_index(index)?,
            width: subset.tile_width(),
            height: subset.tile_height(),
            format,
            parameters,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;

    use crate::error::SourceError;
    use crate::grid::{DefaultGridsets, GridSetBroker};

    struct Blank;

    #[async_trait]
    impl TileSource for Blank {
        async fn render(&self, _request: &RenderRequest) -> Result<Bytes, SourceError> {
            Ok(Bytes::new())
        }
    }

    fn layer() -> TileLayer {
        let broker = GridSetBroker::new(DefaultGridsets::default()).unwrap();
        TileLayer::new("states", Arc::new(Blank))
            .with_subset(GridSubset::full(broker.world_epsg4326()).unwrap())
            .with_subset(GridSubset::full(broker.world_epsg3857()).unwrap())
            .with_formats(vec![MimeType::Png, MimeType::Jpeg])
            .with_parameter_filters(vec![ParameterFilter {
                key: "STYLES".into(),
                default: "".into(),
                values: vec!["".into(), "population".into()],
            }])
    }

    #[test]
    fn test_subset_lookup() {
        let layer = layer();
        assert_eq!(layer.gridset_names(), vec!["EPSG:3857", "EPSG:4326"]);
        assert!(layer.grid_subset("EPSG:4326").is_some());
        assert!(layer.grid_subset("EPSG:2163").is_none());

        let mercator = layer.grid_subset_for_srs(&Srs::from_code(900913)).unwrap();
        assert_eq!(mercator.name(), "EPSG:3857");
        assert!(layer.grid_subset_for_srs(&Srs::new(2163)).is_none());
    }

    #[test]
    fn test_formats() {
        let layer = layer();
        assert!(layer.supports_format(MimeType::Jpeg));
        assert!(!layer.supports_format(MimeType::Gif));
        assert_eq!(layer.default_format(), MimeType::Png);
        assert_eq!(layer.meta_factors(), DEFAULT_META_FACTORS);
    }

    #[test]
    fn test_filter_parameters() {
        let layer = layer();

        let none = layer.filter_parameters(&BTreeMap::new()).unwrap();
        assert_eq!(none.get("STYLES"), Some(&String::new()));
        assert_eq!(layer.parameters_id(&none), None);

        let given = BTreeMap::from([
            ("styles".to_string(), "population".to_string()),
            ("ignored".to_string(), "x".to_string()),
        ]);
        let filtered = layer.filter_parameters(&given).unwrap();
        assert_eq!(filtered.len(), 1);
        let id = layer.parameters_id(&filtered).unwrap();
        assert_eq!(id.len(), 40);
        assert_eq!(layer.parameters_id(&filtered), Some(id));

        let bad = BTreeMap::from([("STYLES".to_string(), "other".to_string())]);
        assert!(matches!(
            layer.filter_parameters(&bad),
            Err(TileError::InvalidRequest { .. })
        ));
    }

    #[test]
    fn test_render_request() {
        let layer = layer();
        let subset = layer.grid_subset("EPSG:4326").unwrap().clone();
        let request = layer
            .render_request(&subset, TileIndex::new(0, 0, 0), MimeType::Png, BTreeMap::new())
            .unwrap();

        assert_eq!(request.bounds.to_string(), "-180.0,-90.0,0.0,90.0");
        assert_eq!(request.width, 256);
        assert_eq!(request.srs, Srs::EPSG_4326);
    }
}
