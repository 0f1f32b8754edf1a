//! Spatial reference system identifiers.
//!
//! An [`Srs`] is an EPSG code plus a list of codes it is known to be equal
//! to. Web mercator in particular has been published under several codes
//! over the years (900913, 3785, 102100, 102113), all of which must compare
//! equal to `EPSG:3857`.

use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::GridError;

const MERCATOR_ALIASES: &[u32] = &[900913, 102113, 102100, 3785];
const GOOGLE_ALIASES: &[u32] = &[3857, 102113, 102100, 3785];

/// Spatial reference system identified by its EPSG code.
#[derive(Debug, Clone)]
pub struct Srs {
    number: u32,
    aliases: Cow<'static, [u32]>,
}

impl Srs {
    /// Geographic longitude/latitude on WGS84.
    pub const EPSG_4326: Srs = Srs::with_static_aliases(4326, &[]);

    /// Spherical mercator.
    pub const EPSG_3857: Srs = Srs::with_static_aliases(3857, MERCATOR_ALIASES);

    /// Spherical mercator under its unofficial historical code.
    pub const EPSG_900913: Srs = Srs::with_static_aliases(900913, GOOGLE_ALIASES);

    const fn with_static_aliases(number: u32, aliases: &'static [u32]) -> Self {
        Self {
            number,
            aliases: Cow::Borrowed(aliases),
        }
    }

    /// An SRS with no aliases.
    pub fn new(number: u32) -> Self {
        Self::with_aliases(number, Vec::new())
    }

    /// An SRS equal to each of `aliases` in addition to its own code.
    pub fn with_aliases(number: u32, aliases: Vec<u32>) -> Self {
        Self {
            number,
            aliases: Cow::Owned(aliases),
        }
    }

    /// Resolve a code to its canonical constant when it is a known alias.
    pub fn from_code(code: u32) -> Self {
        match code {
            4326 => Srs::EPSG_4326,
            900913 => Srs::EPSG_900913,
            code if code == 3857 || MERCATOR_ALIASES.contains(&code) => Srs::EPSG_3857,
            other => Srs::new(other),
        }
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn aliases(&self) -> &[u32] {
        &self.aliases
    }

    /// Whether this SRS is geographic lon/lat (EPSG:4326).
    pub fn is_geographic(&self) -> bool {
        *self == Srs::EPSG_4326
    }

    /// Whether this SRS is spherical mercator under any of its codes.
    pub fn is_web_mercator(&self) -> bool {
        *self == Srs::EPSG_3857
    }
}

impl PartialEq for Srs {
    fn eq(&self, other: &Self) -> bool {
        self.number == other.number
            || self.aliases.contains(&other.number)
            || other.aliases.contains(&self.number)
    }
}

impl PartialOrd for Srs {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self == other {
            Some(Ordering::Equal)
        } else {
            Some(self.number.cmp(&other.number))
        }
    }
}

impl fmt::Display for Srs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.number)
    }
}

impl FromStr for Srs {
    type Err = GridError;

    /// Accepts `EPSG:nnnn`, `urn:ogc:def:crs:EPSG::nnnn`, `CRS:84` and the OGC CRS84 URN.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();

        if upper == "CRS:84"
            || (upper.starts_with("URN:OGC:DEF:CRS:OGC:") && upper.ends_with("CRS84"))
        {
            return Ok(Srs::EPSG_4326);
        }

        let code = if let Some(rest) = upper.strip_prefix("EPSG:") {
            rest
        } else if upper.starts_with("URN:OGC:DEF:CRS:EPSG:") {
            upper.rsplit(':').next().unwrap_or_default()
        } else {
            return Err(GridError::InvalidSrs(s.to_string()));
        };

        code.parse::<u32>()
            .map(Srs::from_code)
            .map_err(|_| GridError::InvalidSrs(s.to_string()))
    }
}

// =============================================================================
// Tests
// =============================================================================
