//! Layers: what is cached and where tiles come from on a miss.
//!
//! - [`TileLayer`] binds a name to gridset subsets, formats and a [`TileSource`]
//! - [`TileLayerDispatcher`] is the registry of configured layers
//! - [`WmsSource`] renders tiles through an upstream WMS server

mod dispatcher;
mod mime;
mod source;
mod tile_layer;

pub use dispatcher::TileLayerDispatcher;
pub use mime::MimeType;
pub use source::{RenderRequest, TileSource, WmsSource, DEFAULT_SOURCE_TIMEOUT};
pub use tile_layer::{ParameterFilter, TileLayer, DEFAULT_META_FACTORS};
