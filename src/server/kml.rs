//! KML super-overlay documents.
//!
//! A layer published in EPSG:4326 can be browsed as a region-based KML
//! hierarchy: the root document links to the tile that best fits the
//! layer's coverage, and every overlay links to its four children one level
//! down plus the tile content itself.
//!
//! Grid locations are written as `x{X}y{Y}z{Z}`, the [`TileIndex`] display
//! form, and every `href` is relative to the document that contains it.

use crate::error::TileError;
use crate::grid::{BoundingBox, GridSubset, TileIndex};
use crate::layer::{MimeType, TileLayer};

/// Pixel size below which Google Earth does not load a region.
pub const MIN_LOD_PIXELS: i32 = 128;

/// Pixel size above which a raster overlay hands over to its children.
pub const MAX_LOD_PIXELS: i32 = 385;

const EARTH_RADIUS: f64 = 6_371_000.0;

/// Parse an `x{X}y{Y}z{Z}` grid location.
pub fn parse_grid_location(s: &str) -> Option<TileIndex> {
    let rest = s.strip_prefix('x')?;
    let (x, rest) = rest.split_once('y')?;
    let (y, z) = rest.split_once('z')?;
    Some(TileIndex::new(x.parse().ok()?, y.parse().ok()?, z.parse().ok()?))
}

/// Root document of a layer.
///
/// # Errors
///
/// [`TileError::InvalidRequest`] when the best fitting coverage spans more
/// than one tile below the top level, which happens when the subset starts
/// too deep to be covered by one or two tiles.
pub fn super_overlay(
    layer: &TileLayer,
    subset: &GridSubset,
    format: MimeType,
) -> Result<String, TileError> {
    let best = subset.coverage_best_fit();
    let bounds = subset.coverage_best_fit_bounds()?;
    let suffix = format!(".{}.kml", format.extension());
    let layer_path = urlencoding::encode(layer.name());
    let href = |index: TileIndex| format!("{}/{}{}", layer_path, index, suffix);

    let links = if best.level > 0 && best.tile_count() > 1 {
        return Err(TileError::invalid(format!(
            "{} ({}) is too big for the subset of {}, allow for smaller zoom levels",
            layer.name(),
            bounds,
            subset.name()
        )));
    } else if best.min_x != best.max_x {
        // The top level of a world gridset is one tile per hemisphere
        let west = BoundingBox::new(bounds.min_x, bounds.min_y, 0.0, bounds.max_y);
        let east = BoundingBox::new(0.0, bounds.min_y, bounds.max_x, bounds.max_y);
        let mut links = super_overlay_link(
            &format!("{} West", layer.name()),
            &west,
            &href(TileIndex::new(0, 0, 0)),
        );
        links.push_str(&super_overlay_link(
            &format!("{} East", layer.name()),
            &east,
            &href(TileIndex::new(1, 0, 0)),
        ));
        links
    } else {
        let index = TileIndex::new(best.min_x, best.min_y, best.level as i32);
        super_overlay_link(layer.name(), &bounds, &href(index))
    };

    Ok(format!(
        "{}\n<Folder>{}{}\n</Folder>\n</kml>\n",
        header(),
        look_at(&bounds),
        links
    ))
}

/// Overlay document of one tile: links to its children and its own content.
pub fn overlay(
    layer: &TileLayer,
    subset: &GridSubset,
    index: TileIndex,
    format: MimeType,
) -> Result<String, TileError> {
    let bounds = subset.bounds_from_index(index)?;
    let refresh = refresh_tags(layer.max_age());
    let is_raster = format.is_image();

    let last_level = index.level().is_some_and(|level| level >= subset.zoom_stop());
    let max_lod = if is_raster && !last_level {
        MAX_LOD_PIXELS
    } else {
        -1
    };

    let mut doc = header();
    doc.push_str("<Document>\n<Region>\n");
    doc.push_str(&bounds.to_kml_lat_lon_alt_box());
    doc.push_str(&lod(max_lod));
    doc.push_str("\n</Region>\n");

    doc.push_str("\n<!-- Network links to subtiles -->\n");
    for child in subset.sub_grid(index)? {
        if child.z <= 0 {
            continue;
        }
        let href = format!("{}.{}.kml", child, format.extension());
        doc.push_str(&network_link(
            layer.name(),
            &subset.bounds_from_index(child)?,
            &href,
            -1,
            &refresh,
        ));
    }

    doc.push_str("\n<!-- Network link to actual content -->\n");
    if is_raster {
        doc.push_str(&ground_overlay(index, &bounds, format, &refresh));
    } else {
        let href = format!("{}.{}", index, format.extension());
        doc.push_str(&network_link(layer.name(), &bounds, &href, -1, &refresh));
    }

    doc.push_str("</Document>\n</kml>");
    Ok(doc)
}

fn header() -> String {
    concat!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n",
        "<kml xmlns=\"http://www.opengis.net/kml/2.2\" ",
        "xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\" ",
        "xsi:schemaLocation=\"http://www.opengis.net/kml/2.2 ",
        "http://schemas.opengis.net/kml/2.2.0/ogckml22.xsd\">\n"
    )
    .to_string()
}

fn lod(max_lod: i32) -> String {
    format!(
        "\n<Lod><minLodPixels>{}</minLodPixels><maxLodPixels>{}</maxLodPixels></Lod>",
        MIN_LOD_PIXELS, max_lod
    )
}

fn refresh_tags(max_age: Option<u64>) -> String {
    match max_age {
        Some(seconds) if seconds > 0 => format!(
            "\n<refreshMode>onInterval</refreshMode>\n<refreshInterval>{}</refreshInterval>",
            seconds
        ),
        _ => String::new(),
    }
}

fn super_overlay_link(name: &str, bounds: &BoundingBox, href: &str) -> String {
    format!(
        "\n<NetworkLink><name>Super-overlay: {}</name>\n<Region>\n{}{}\n</Region>\
         \n<Link><href>{}</href>\n<viewRefreshMode>onRegion</viewRefreshMode>\n</Link>\
         \n</NetworkLink>",
        name,
        bounds.to_kml_lat_lon_alt_box(),
        lod(-1),
        href
    )
}

fn network_link(
    name: &str,
    bounds: &BoundingBox,
    href: &str,
    max_lod: i32,
    refresh: &str,
) -> String {
    format!(
        "\n<NetworkLink>\n<name>{}</name>\n<Region>{}{}\n</Region>\
         \n<Link>\n<href>{}</href>{}\n<viewRefreshMode>onRegion</viewRefreshMode>\n</Link>\
         \n</NetworkLink>\n",
        name,
        bounds.to_kml_lat_lon_alt_box(),
        lod(max_lod),
        href,
        refresh
    )
}

fn ground_overlay(index: TileIndex, bounds: &BoundingBox, format: MimeType, refresh: &str) -> String {
    format!(
        "\n<GroundOverlay>\n<drawOrder>{}</drawOrder>\n<Icon>\n<href>{}.{}</href>{}\n</Icon>\n\
         \n<altitudeMode>clampToGround</altitudeMode>{}\n</GroundOverlay>\n",
        index.z,
        index,
        format.extension(),
        refresh,
        bounds.to_kml_lat_lon_box()
    )
}

/// Camera looking straight down at the middle of `bounds`, far enough to see
/// both corners.
fn look_at(bounds: &BoundingBox) -> String {
    let p1 = to_cartesian(bounds.min_x, bounds.min_y);
    let p2 = to_cartesian(bounds.max_x, bounds.max_y);
    let mid = [
        (p1[0] + p2[0]) / 2.0,
        (p1[1] + p2[1]) / 2.0,
        (p1[2] + p2[2]) / 2.0,
    ];
    let latitude = 90.0 - (mid[0].hypot(mid[1])).atan2(mid[2]).to_degrees();
    let longitude = (bounds.min_x + bounds.max_x) / 2.0;
    let range = distance(&p1, &p2);

    format!(
        "<LookAt id=\"superoverlay\">\n<longitude>{}</longitude>\n<latitude>{}</latitude>\
         \n<altitude>0</altitude>\n<heading>0</heading>\n<tilt>0</tilt>\n<range>{}</range>\
         \n<altitudeMode>clampToGround</altitudeMode>\n</LookAt>\n",
        longitude, latitude, range
    )
}

fn to_cartesian(a: f64, b: f64) -> [f64; 3] {
    let theta = (90.0 - a).to_radians();
    let phi = (90.0 - b).to_radians();
    [
        EARTH_RADIUS * phi.sin() * theta.cos(),
        EARTH_RADIUS * phi.sin() * theta.sin(),
        EARTH_RADIUS * phi.cos(),
    ]
}

fn distance(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    let dz = a[2] - b[2];
    (dx * dx + dy * dy + dz * dz).sqrt()
}
