//! Seeding integration tests.
//!
//! Tests verify:
//! - Jobs started over HTTP fill the cache served by the tile endpoints
//! - Truncate jobs empty it again
//! - Job listing, lookup and cancellation

use axum::http::StatusCode;

use geotile_cache::seed::JobStatus;

use super::test_utils::{body_json, get, header, send, test_app};

#[tokio::test]
async fn test_seed_then_serve_from_cache() {
    let app = test_app();

    let response = send(
        &app.router,
        "POST",
        "/seed/states",
        Some(r#"{"gridset": "EPSG:4326", "format": "png", "zoom_stop": 2, "thread_count": 2}"#),
    )
    .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let job = body_json(response).await;
    assert_eq!(job["layer"], "states");
    assert_eq!(job["type"], "seed");
    assert_eq!(job["tiles_total"], 42);
    let id = job["id"].as_u64().unwrap();

    let done = app.breeder.wait(id).await.unwrap();
    assert_eq!(done.status, JobStatus::Done);
    assert_eq!(app.source.render_count(), 42);
    assert_eq!(app.store.len().await, 42);

    let response = get(&app.router, "/service/tms/1.0.0/states@EPSG:4326@png/2/5/3.png").await;
    assert_eq!(header(&response, "x-cache-result"), "HIT");

    let job = body_json(get(&app.router, &format!("/seed/jobs/{}", id)).await).await;
    assert_eq!(job["status"], "done");
    assert_eq!(job["tiles_done"], 42);
}

#[tokio::test]
async fn test_seed_bounds_in_request() {
    let app = test_app();

    let response = send(
        &app.router,
        "POST",
        "/seed/states",
        Some(
            r#"{"gridset": "EPSG:4326", "zoom_start": 2, "zoom_stop": 3,
                "bounds": [0.0, 0.0, 45.0, 45.0]}"#,
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let id = body_json(response).await["id"].as_u64().unwrap();

    let done = app.breeder.wait(id).await.unwrap();
    assert_eq!(done.tiles_done, 5);

    let response = get(&app.router, "/service/tms/1.0.0/states@EPSG:4326@png/3/9/5.png").await;
    assert_eq!(header(&response, "x-cache-result"), "HIT");
    let response = get(&app.router, "/service/tms/1.0.0/states@EPSG:4326@png/3/10/5.png").await;
    assert_eq!(header(&response, "x-cache-result"), "MISS");
}

#[tokio::test]
async fn test_truncate_after_seed() {
    let app = test_app();

    let response = send(
        &app.router,
        "POST",
        "/seed/states",
        Some(r#"{"gridset": "EPSG:4326", "zoom_stop": 1}"#),
    )
    .await;
    let id = body_json(response).await["id"].as_u64().unwrap();
    app.breeder.wait(id).await.unwrap();
    assert_eq!(app.store.len().await, 10);

    let response = send(
        &app.router,
        "POST",
        "/seed/states",
        Some(r#"{"type": "truncate", "gridset": "EPSG:4326", "zoom_start": 1, "zoom_stop": 1}"#),
    )
    .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let id = body_json(response).await["id"].as_u64().unwrap();

    let done = app.breeder.wait(id).await.unwrap();
    assert_eq!(done.status, JobStatus::Done);
    assert_eq!(app.store.len().await, 2);

    let response = get(&app.router, "/service/tms/1.0.0/states@EPSG:4326@png/1/0/0.png").await;
    assert_eq!(header(&response, "x-cache-result"), "MISS");
}

#[tokio::test]
async fn test_seed_request_errors() {
    let app = test_app();

    let response = send(&app.router, "POST", "/seed/roads", Some("{}")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = send(
        &app.router,
        "POST",
        "/seed/states",
        Some(r#"{"gridset": "EPSG:2163"}"#),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "gridset_not_supported");

    let response = send(
        &app.router,
        "POST",
        "/seed/states",
        Some(r#"{"zoom_start": 4, "zoom_stop": 2}"#),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "invalid_range");

    let response = send(&app.router, "POST", "/seed/states", Some(r#"{"type": "grow"}"#)).await;
    assert!(response.status().is_client_error());

    let response = get(&app.router, "/seed/jobs/99").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error"], "job_not_found");
}

#[tokio::test]
async fn test_list_and_cancel_jobs() {
    let app = test_app();

    let response = send(
        &app.router,
        "POST",
        "/seed/states",
        Some(r#"{"gridset": "EPSG:4326"}"#),
    )
    .await;
    let id = body_json(response).await["id"].as_u64().unwrap();

    let jobs = body_json(get(&app.router, "/seed/jobs").await).await;
    let jobs = jobs.as_array().unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0]["id"], id);

    let response = send(&app.router, "DELETE", &format!("/seed/jobs/{}", id), None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let done = app.breeder.wait(id).await.unwrap();
    assert!(done.status.is_finished());

    let response = send(&app.router, "DELETE", "/seed/jobs", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["cancelled"], 0);
}
