//! Storage keys for cached tiles.

use std::fmt;
use std::sync::Arc;

use crate::grid::TileIndex;

/// Identity of one cached tile.
///
/// The index part is only ever built from a [`TileIndex`] that passed a
/// coverage check, so a key always names a tile the layer can produce.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TileKey {
    /// Layer name
    pub layer: Arc<str>,

    /// Gridset name
    pub gridset: Arc<str>,

    /// File extension of the format (`png`, `jpeg`, ...)
    pub format: Arc<str>,

    /// Identifier of the non-default request parameters, if any
    pub parameters_id: Option<Arc<str>>,

    pub x: i64,
    pub y: i64,
    pub z: u32,
}

impl TileKey {
    pub fn new(
        layer: impl Into<Arc<str>>,
        gridset: impl Into<Arc<str>>,
        format: impl Into<Arc<str>>,
        index: TileIndex,
    ) -> Self {
        Self {
            layer: layer.into(),
            gridset: gridset.into(),
            format: format.into(),
            parameters_id: None,
            x: index.x,
            y: index.y,
            z: index.z.max(0) as u32,
        }
    }

    pub fn with_parameters_id(mut self, parameters_id: Option<impl Into<Arc<str>>>) -> Self {
        self.parameters_id = parameters_id.map(Into::into);
        self
    }

    pub fn index(&self) -> TileIndex {
        TileIndex::new(self.x, self.y, self.z as i32)
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}/{}.{}",
            self.layer, self.gridset, self.z, self.x, self.y, self.format
        )?;
        if let Some(params) = &self.parameters_id {
            write!(f, "?{}", params)?;
        }
        Ok(())
    }
}
