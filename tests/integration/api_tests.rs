//! API integration tests for tile retrieval and error handling.
//!
//! Tests verify:
//! - TMS, WMTS and tiled WMS addressing of the same tile
//! - Cache hits, misses and parameter variants
//! - Error cases (unknown layer, bad gridset, outside coverage, mismatched WMS)
//! - HTTP response codes and headers

use axum::http::StatusCode;

use super::test_utils::{body_json, body_string, get, header, test_app, test_app_with, MockTileSource};

// level 1 of EPSG:4326 is 4 x 2 tiles of 90 degrees
const TILE_X2_Y1_Z1: &str = "states EPSG:4326 0.0,0.0,90.0,90.0 256x256";

// =============================================================================
// TMS
// =============================================================================

#[tokio::test]
async fn test_tms_tile_miss_then_hit() {
    let app = test_app();
    let uri = "/service/tms/1.0.0/states@EPSG:4326@png/1/2/1.png";

    let response = get(&app.router, uri).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "content-type"), "image/png");
    assert_eq!(header(&response, "cache-control"), "public, max-age=3600");
    assert_eq!(header(&response, "x-cache-result"), "MISS");
    assert_eq!(header(&response, "x-tile-index"), "x2y1z1");
    assert_eq!(header(&response, "x-gridset"), "EPSG:4326");
    assert_eq!(body_string(response).await, TILE_X2_Y1_Z1);

    let response = get(&app.router, uri).await;
    assert_eq!(header(&response, "x-cache-result"), "HIT");
    assert_eq!(body_string(response).await, TILE_X2_Y1_Z1);
    assert_eq!(app.source.render_count(), 1);
}

#[tokio::test]
async fn test_tms_defaults_gridset_and_format() {
    let app = test_app();

    // gridsets in name order: EPSG:3857 comes first
    let response = get(&app.router, "/service/tms/1.0.0/states/0/0/0.jpeg").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "x-gridset"), "EPSG:3857");
    assert_eq!(header(&response, "content-type"), "image/jpeg");

    let response = get(&app.router, "/service/tms/1.0.0/states@EPSG:4326/0/1/0").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "content-type"), "image/png");
}

#[tokio::test]
async fn test_tms_format_conflict() {
    let app = test_app();
    let response = get(&app.router, "/service/tms/1.0.0/states@EPSG:4326@png/0/0/0.jpeg").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.source.render_count(), 0);
}

#[tokio::test]
async fn test_parameter_variants_are_cached_separately() {
    let app = test_app();
    let uri = "/service/tms/1.0.0/states@EPSG:4326@png/1/2/1.png";

    get(&app.router, uri).await;
    let response = get(&app.router, &format!("{}?styles=pophatch", uri)).await;
    assert_eq!(header(&response, "x-cache-result"), "MISS");

    let response = get(&app.router, &format!("{}?STYLES=pophatch", uri)).await;
    assert_eq!(header(&response, "x-cache-result"), "HIT");

    // an empty value means the default
    let response = get(&app.router, &format!("{}?STYLES=", uri)).await;
    assert_eq!(header(&response, "x-cache-result"), "HIT");

    let requests = app.source.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].parameters["STYLES"], "pophatch");

    let response = get(&app.router, &format!("{}?STYLES=unknown", uri)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_layer_max_age() {
    let app = test_app_with(MockTileSource::new(), |layer| layer.with_max_age(Some(60)));
    let response = get(&app.router, "/service/tms/1.0.0/states@EPSG:4326@png/0/0/0.png").await;
    assert_eq!(header(&response, "cache-control"), "public, max-age=60");
}

// =============================================================================
// WMTS and WMS
// =============================================================================

#[tokio::test]
async fn test_wmts_row_counts_from_top() {
    let app = test_app();
    get(&app.router, "/service/tms/1.0.0/states@EPSG:4326@png/1/2/1.png").await;

    let response = get(
        &app.router,
        "/service/wmts?SERVICE=WMTS&REQUEST=GetTile&LAYER=states&TILEMATRIXSET=EPSG:4326\
         &TILEMATRIX=EPSG:4326:1&TILEROW=0&TILECOL=2&FORMAT=image/png",
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "x-tile-index"), "x2y1z1");
    assert_eq!(header(&response, "x-cache-result"), "HIT");
}

#[tokio::test]
async fn test_wmts_errors() {
    let app = test_app();

    let response = get(
        &app.router,
        "/service/wmts?service=wmts&request=GetCapabilities",
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = get(
        &app.router,
        "/service/wmts?REQUEST=GetTile&LAYER=states&TILEMATRIXSET=EPSG:4326\
         &TILEMATRIX=nope&TILEROW=0&TILECOL=0",
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = get(
        &app.router,
        "/service/wmts?REQUEST=GetTile&LAYER=states&TILEMATRIXSET=EPSG:4326\
         &TILEMATRIX=EPSG:4326:1&TILEROW=0&TILECOL=9",
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // the row flip must not overflow
    let response = get(
        &app.router,
        "/service/wmts?REQUEST=GetTile&LAYER=states&TILEMATRIXSET=EPSG:4326\
         &TILEMATRIX=EPSG:4326:1&TILEROW=-9223372036854775808&TILECOL=0",
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "invalid_request");
    assert_eq!(app.source.render_count(), 0);
}

#[tokio::test]
async fn test_wms_tile_matches_tms() {
    let app = test_app();

    let response = get(
        &app.router,
        "/service/wms?SERVICE=WMS&REQUEST=GetMap&LAYERS=states&SRS=EPSG:4326\
         &BBOX=0,0,90,90&WIDTH=256&HEIGHT=256&FORMAT=image/png",
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "x-tile-index"), "x2y1z1");
    assert_eq!(body_string(response).await, TILE_X2_Y1_Z1);

    let response = get(&app.router, "/service/tms/1.0.0/states@EPSG:4326@png/1/2/1.png").await;
    assert_eq!(header(&response, "x-cache-result"), "HIT");
}

#[tokio::test]
async fn test_wms_rejects_non_tile_requests() {
    let app = test_app();
    let base = "/service/wms?REQUEST=GetMap&LAYERS=states&SRS=EPSG:4326&FORMAT=image/png";

    // not a tile of any level
    let response = get(&app.router, &format!("{}&BBOX=0,0,80,90&WIDTH=256&HEIGHT=256", base)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // wrong tile size
    let response = get(&app.router, &format!("{}&BBOX=0,0,90,90&WIDTH=512&HEIGHT=512", base)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // SRS the layer is not cached in
    let response = get(
        &app.router,
        "/service/wms?REQUEST=GetMap&LAYERS=states&SRS=EPSG:2163&BBOX=0,0,90,90&WIDTH=256&HEIGHT=256",
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.source.render_count(), 0);
}

// =============================================================================
// Errors
// =============================================================================

#[tokio::test]
async fn test_unknown_layer() {
    let app = test_app();
    let response = get(&app.router, "/service/tms/1.0.0/roads@EPSG:4326@png/0/0/0.png").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let json = body_json(response).await;
    assert_eq!(json["error"], "not_found");
    assert_eq!(json["status"], 404);
}

#[tokio::test]
async fn test_unsupported_gridset_and_format() {
    let app = test_app();

    let response = get(&app.router, "/service/tms/1.0.0/states@EPSG:2163@png/0/0/0.png").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "gridset_not_supported");

    let response = get(&app.router, "/service/tms/1.0.0/states@EPSG:4326@gif/0/0/0.gif").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "format_not_supported");
}

#[tokio::test]
async fn test_outside_coverage() {
    let app = test_app();

    // level 0 is two tiles wide
    let response = get(&app.router, "/service/tms/1.0.0/states@EPSG:4326@png/0/2/0.png").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error"], "outside_coverage");

    // beyond the subset's last level
    let response = get(&app.router, "/service/tms/1.0.0/states@EPSG:4326@png/6/0/0.png").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(app.source.render_count(), 0);
}

#[tokio::test]
async fn test_upstream_failure() {
    let app = test_app_with(MockTileSource::failing(), |layer| layer);
    let response = get(&app.router, "/service/tms/1.0.0/states@EPSG:4326@png/0/0/0.png").await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(body_json(response).await["error"], "upstream_error");
    assert_eq!(app.store.len().await, 0);
}

// =============================================================================
// Info Endpoints
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let app = test_app();
    let response = get(&app.router, "/health").await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "healthy");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_layers_endpoint() {
    let app = test_app();
    let json = body_json(get(&app.router, "/layers").await).await;

    let layers = json.as_array().unwrap();
    assert_eq!(layers.len(), 1);
    assert_eq!(layers[0]["name"], "states");
    assert_eq!(layers[0]["formats"][1], "image/jpeg");
    assert_eq!(layers[0]["meta_factors"][0], 2);

    let gridsets = layers[0]["gridsets"].as_array().unwrap();
    assert_eq!(gridsets.len(), 2);
    assert_eq!(gridsets[1]["gridset"], "EPSG:4326");
    assert_eq!(gridsets[1]["zoom_stop"], 5);
    assert_eq!(gridsets[1]["bounds"][0], -180.0);
}

#[tokio::test]
async fn test_stats_endpoint() {
    let app = test_app();
    let uri = "/service/tms/1.0.0/states@EPSG:4326@png/0/0/0.png";
    get(&app.router, uri).await;
    get(&app.router, uri).await;
    get(&app.router, "/service/tms/1.0.0/states@EPSG:4326@png/0/2/0.png").await;

    let json = body_json(get(&app.router, "/stats").await).await;
    assert_eq!(json["cache_hits"], 1);
    assert_eq!(json["cache_misses"], 1);
    assert_eq!(json["errors"], 1);
    assert_eq!(json["layers"]["states"]["requests"], 2);
}
