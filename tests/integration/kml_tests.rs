//! KML super-overlay integration tests.
//!
//! Tests verify:
//! - The root document of a world layer links both hemispheres
//! - Overlay documents link their children and their content
//! - Following the links resolves to tiles in EPSG:4326

use axum::http::StatusCode;

use geotile_cache::grid::BoundingBox;

use super::test_utils::{body_string, get, header, test_app, test_app_with, MockTileSource};

#[tokio::test]
async fn test_root_document_links_hemispheres() {
    let app = test_app();
    let response = get(&app.router, "/service/kml/states.png.kml").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        header(&response, "content-type"),
        "application/vnd.google-earth.kml+xml"
    );

    let doc = body_string(response).await;
    assert!(doc.starts_with("<?xml"));
    assert!(doc.contains("<LookAt id=\"superoverlay\">"));
    assert!(doc.contains("<name>Super-overlay: states West</name>"));
    assert!(doc.contains("<href>states/x0y0z0.png.kml</href>"));
    assert!(doc.contains("<name>Super-overlay: states East</name>"));
    assert!(doc.contains("<href>states/x1y0z0.png.kml</href>"));
    assert!(doc.trim_end().ends_with("</kml>"));
}

#[tokio::test]
async fn test_root_document_errors() {
    let app = test_app();

    let response = get(&app.router, "/service/kml/states.gif.kml").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = get(&app.router, "/service/kml/roads.png.kml").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = get(&app.router, "/service/kml/states.kml").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_overlay_document() {
    let app = test_app();
    let response = get(&app.router, "/service/kml/states/x1y0z0.png.kml").await;
    assert_eq!(response.status(), StatusCode::OK);

    let doc = body_string(response).await;
    // not the last level, so the region hands over to the children
    assert!(doc.contains("<maxLodPixels>385</maxLodPixels>"));
    for child in ["x2y0z1", "x3y0z1", "x2y1z1", "x3y1z1"] {
        assert!(
            doc.contains(&format!("<href>{}.png.kml</href>", child)),
            "missing link to {}",
            child
        );
    }
    assert!(!doc.contains("x0y0z1"));
    assert!(doc.contains("<GroundOverlay>"));
    assert!(doc.contains("<href>x1y0z0.png</href>"));
    assert!(!doc.contains("refreshMode"));
}

#[tokio::test]
async fn test_overlay_at_last_level() {
    let app = test_app();
    let response = get(&app.router, "/service/kml/states/x0y0z5.png.kml").await;
    assert_eq!(response.status(), StatusCode::OK);

    let doc = body_string(response).await;
    assert!(!doc.contains("<maxLodPixels>385</maxLodPixels>"));
    assert!(doc.contains("<href>x0y0z5.png</href>"));
}

#[tokio::test]
async fn test_overlay_refresh_interval() {
    let app = test_app_with(MockTileSource::new(), |layer| layer.with_max_age(Some(300)));
    let doc = body_string(get(&app.router, "/service/kml/states/x0y0z0.png.kml").await).await;
    assert!(doc.contains("<refreshInterval>300</refreshInterval>"));
}

#[tokio::test]
async fn test_overlay_errors() {
    let app = test_app();

    let response = get(&app.router, "/service/kml/states/x9y0z0.png.kml").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = get(&app.router, "/service/kml/states/tile.png.kml").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = get(&app.router, "/service/kml/states/x0y0z0.gif.kml").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_overlay_content_is_a_tile() {
    let app = test_app();
    let response = get(&app.router, "/service/kml/states/x1y0z0.png").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "content-type"), "image/png");
    assert_eq!(header(&response, "x-gridset"), "EPSG:4326");

    let requests = app.source.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].bounds,
        BoundingBox::new(0.0, -90.0, 180.0, 90.0)
    );

    // the same tile through TMS is now cached
    let response = get(&app.router, "/service/tms/1.0.0/states@EPSG:4326@png/0/1/0.png").await;
    assert_eq!(header(&response, "x-cache-result"), "HIT");
}
