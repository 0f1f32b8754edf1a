//! Axis-aligned bounding boxes.
//!
//! A [`BoundingBox`] is a plain value: four coordinates in the units of
//! whatever SRS it is used with. Every transformation returns a new box.
//!
//! # Wire Format
//!
//! The string form is the four coordinates joined with commas, each rendered
//! as a natural decimal with between one and sixteen fraction digits:
//!
//! ```text
//! -180.0,-90.0,180.0,90.0
//! ```
//!
//! This string is embedded in request URLs (WMS `BBOX`), so it must stay
//! stable.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::GridError;

/// Tolerance used by [`BoundingBox::equals_within`] and [`BoundingBox::contains`].
pub const EQUALITY_THRESHOLD: f64 = 0.03;

/// Maximum number of fraction digits in the string form.
const MAX_FRACTION_DIGITS: usize = 16;

/// Axis-aligned rectangle given by its minimum and maximum corners.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    /// The empty box returned by [`BoundingBox::intersection`] for disjoint operands.
    ///
    /// Its maximum lies below its minimum, so it is never sane and never
    /// equal to a zero-area box.
    pub const NULL: BoundingBox = BoundingBox::new(0.0, 0.0, -1.0, -1.0);

    /// Whole world in geographic coordinates.
    pub const WORLD_4326: BoundingBox = BoundingBox::new(-180.0, -90.0, 180.0, 90.0);

    /// Whole world in spherical mercator.
    pub const WORLD_3857: BoundingBox =
        BoundingBox::new(-20037508.34, -20037508.34, 20037508.34, 20037508.34);

    /// Whole world in spherical mercator as published by TMS services.
    pub const WORLD_3857_TMS: BoundingBox = BoundingBox::new(
        -20037508.3427892,
        -20037508.3427892,
        20037508.3427892,
        20037508.3427892,
    );

    pub const fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Parse four separate coordinate strings.
    pub fn from_parts(min_x: &str, min_y: &str, max_x: &str, max_y: &str) -> Result<Self, GridError> {
        let parse = |value: &str| {
            value
                .trim()
                .parse::<f64>()
                .map_err(|_| GridError::InvalidBoundingBox(value.to_string()))
        };
        Ok(Self::new(
            parse(min_x)?,
            parse(min_y)?,
            parse(max_x)?,
            parse(max_y)?,
        ))
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }

    /// Minimum not above maximum on both axes, and no NaN.
    pub fn is_sane(&self) -> bool {
        self.min_x <= self.max_x && self.min_y <= self.max_y
    }

    /// Whether this is an empty intersection result.
    pub fn is_null(&self) -> bool {
        self.min_x > self.max_x || self.min_y > self.max_y
    }

    /// Scale both axes by `factor` around the centre of the box.
    pub fn scale(&self, factor: f64) -> Self {
        self.scale_xy(factor, factor)
    }

    /// Scale each axis independently around the centre of the box.
    pub fn scale_xy(&self, x_factor: f64, y_factor: f64) -> Self {
        let width = self.width();
        let height = self.height();
        let dx = (width * x_factor - width) / 2.0;
        let dy = (height * y_factor - height) / 2.0;

        Self::new(
            self.min_x - dx,
            self.min_y - dy,
            self.max_x + dx,
            self.max_y + dy,
        )
    }

    /// Whether the two boxes share any point. Boxes touching on an edge intersect.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        if !self.is_sane() || !other.is_sane() {
            return false;
        }
        !(other.min_x > self.max_x
            || other.max_x < self.min_x
            || other.min_y > self.max_y
            || other.max_y < self.min_y)
    }

    /// Coordinate-wise intersection of two boxes, or [`BoundingBox::NULL`] when disjoint.
    pub fn intersection(a: &BoundingBox, b: &BoundingBox) -> BoundingBox {
        if !a.intersects(b) {
            return BoundingBox::NULL;
        }
        BoundingBox::new(
            a.min_x.max(b.min_x),
            a.min_y.max(b.min_y),
            a.max_x.min(b.max_x),
            a.max_y.min(b.max_y),
        )
    }

    /// Whether `other` lies inside this box, allowing [`EQUALITY_THRESHOLD`] of slack.
    pub fn contains(&self, other: &BoundingBox) -> bool {
        self.min_x - EQUALITY_THRESHOLD <= other.min_x
            && self.min_y - EQUALITY_THRESHOLD <= other.min_y
            && self.max_x + EQUALITY_THRESHOLD >= other.max_x
            && self.max_y + EQUALITY_THRESHOLD >= other.max_y
    }

    /// Compare minimum corner and extent within `tolerance`.
    pub fn equals_within(&self, other: &BoundingBox, tolerance: f64) -> bool {
        (self.min_x - other.min_x).abs() < tolerance
            && (self.min_y - other.min_y).abs() < tolerance
            && (self.width() - other.width()).abs() < tolerance
            && (self.height() - other.height()).abs() < tolerance
    }

    /// Compare with the default [`EQUALITY_THRESHOLD`].
    pub fn approx_eq(&self, other: &BoundingBox) -> bool {
        self.equals_within(other, EQUALITY_THRESHOLD)
    }

    /// KML `LatLonBox` element.
    pub fn to_kml_lat_lon_box(&self) -> String {
        format!(
            "<LatLonBox><north>{}</north><south>{}</south><east>{}</east><west>{}</west></LatLonBox>",
            format_coordinate(self.max_y),
            format_coordinate(self.min_y),
            format_coordinate(self.max_x),
            format_coordinate(self.min_x),
        )
    }

    /// KML `LatLonAltBox` element, used inside `Region`.
    pub fn to_kml_lat_lon_alt_box(&self) -> String {
        format!(
            "<LatLonAltBox><north>{}</north><south>{}</south><east>{}</east><west>{}</west></LatLonAltBox>",
            format_coordinate(self.max_y),
            format_coordinate(self.min_y),
            format_coordinate(self.max_x),
            format_coordinate(self.min_x),
        )
    }

    pub fn to_array(&self) -> [f64; 4] {
        [self.min_x, self.min_y, self.max_x, self.max_y]
    }
}

impl From<[f64; 4]> for BoundingBox {
    fn from(coords: [f64; 4]) -> Self {
        BoundingBox::new(coords[0], coords[1], coords[2], coords[3])
    }
}

impl From<BoundingBox> for [f64; 4] {
    fn from(bbox: BoundingBox) -> Self {
        bbox.to_array()
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{}",
            format_coordinate(self.min_x),
            format_coordinate(self.min_y),
            format_coordinate(self.max_x),
            format_coordinate(self.max_y)
        )
    }
}

impl FromStr for BoundingBox {
    type Err = GridError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').collect();
        if parts.len() != 4 {
            return Err(GridError::InvalidBoundingBox(s.to_string()));
        }
        BoundingBox::from_parts(parts[0], parts[1], parts[2], parts[3])
    }
}

/// Render a coordinate with at least one and at most sixteen fraction digits.
pub(crate) fn format_coordinate(value: f64) -> String {
    if !value.is_finite() {
        return value.to_string();
    }

    let rendered = value.to_string();
    match rendered.find('.') {
        None => format!("{}.0", rendered),
        Some(dot) if rendered.len() - dot - 1 > MAX_FRACTION_DIGITS => {
            let rounded = format!("{:.*}", MAX_FRACTION_DIGITS, value);
            let trimmed = rounded.trim_end_matches('0');
            if trimmed.ends_with('.') {
                format!("{}0", trimmed)
            } else {
                trimmed.to_string()
            }
        }
        Some(_) => rendered,
    }
}

// =============================================================================
// Tests
// =============================================================================
