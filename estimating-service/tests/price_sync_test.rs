mod common;

use common::{assert_amount, id, TestApp};
use reqwest::StatusCode;
use serde_json::{json, Value};

struct Fixture {
    estimate_id: String,
    library_item_id: String,
    linked_line_id: String,
    manual_line_id: String,
}

/// One line copied from a library item (unit price 40) and one typed by hand.
async fn setup(app: &TestApp) -> Fixture {
    let project_id = app.create_project("Aanbouw").await;
    let estimate_id = app.create_estimate(&project_id, "Aanbouw").await;

    let library = app.create("/libraries", json!({ "name": "Eigen prijzen" })).await;
    let item = app
        .create(
            &format!("/libraries/{}/items", id(&library, "library_id")),
            json!({
                "code": "30.21",
                "description": "Binnendeur stomp",
                "unit": "st",
                "labor_hours": "0.5",
                "labor_rate": "50",
                "material_cost": "15"
            }),
        )
        .await;
    let library_item_id = id(&item, "library_item_id");

    let linked = app
        .add_line(
            &estimate_id,
            json!({ "library_item_id": library_item_id, "quantity": "10" }),
        )
        .await;
    let manual = app
        .add_line(
            &estimate_id,
            json!({ "description": "Kozijn op maat", "quantity": "1", "material_cost": "600" }),
        )
        .await;

    Fixture {
        estimate_id,
        library_item_id,
        linked_line_id: id(&linked["line"], "line_item_id"),
        manual_line_id: id(&manual["line"], "line_item_id"),
    }
}

async fn raise_material_price(app: &TestApp, library_item_id: &str, material: &str) {
    let response = app
        .patch(
            &format!("/library-items/{}", library_item_id),
            json!({ "material_cost": material }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

async fn sync_line(app: &TestApp, line_id: &str) -> Value {
    let response = app
        .post(&format!("/lines/{}/sync-price", line_id), json!({}))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    response.json().await.unwrap()
}

#[tokio::test]
async fn library_edits_do_not_reach_lines_until_synced() {
    let app = TestApp::spawn().await;
    let fixture = setup(&app).await;

    raise_material_price(&app, &fixture.library_item_id, "25").await;

    let tree = app.estimate_tree(&fixture.estimate_id).await;
    assert_amount(&tree["estimate"]["subtotal"], 1000.0);
}

#[tokio::test]
async fn sync_updates_a_stale_line() {
    let app = TestApp::spawn().await;
    let fixture = setup(&app).await;
    raise_material_price(&app, &fixture.library_item_id, "25").await;

    let result = sync_line(&app, &fixture.linked_line_id).await;

    assert_eq!(result["outcome"], "updated");
    assert_amount(&result["line"]["material_cost"], 25.0);
    assert_amount(&result["line"]["unit_price"], 50.0);
    assert_amount(&result["line"]["total_price"], 500.0);
    assert_amount(&result["estimate"]["subtotal"], 1100.0);
}

#[tokio::test]
async fn sync_leaves_matching_line_alone() {
    let app = TestApp::spawn().await;
    let fixture = setup(&app).await;
    let before = app.estimate_tree(&fixture.estimate_id).await;

    let result = sync_line(&app, &fixture.linked_line_id).await;

    assert_eq!(result["outcome"], "unchanged");
    assert!(result["estimate"].is_null());

    let after = app.estimate_tree(&fixture.estimate_id).await;
    assert_eq!(
        before["estimate"]["row_version"],
        after["estimate"]["row_version"]
    );
}

#[tokio::test]
async fn sync_reports_unlinked_lines() {
    let app = TestApp::spawn().await;
    let fixture = setup(&app).await;

    let result = sync_line(&app, &fixture.manual_line_id).await;

    assert_eq!(result["outcome"], "not_linked");
    assert_amount(&result["line"]["material_cost"], 600.0);
}

#[tokio::test]
async fn deleting_the_library_item_unlinks_lines() {
    let app = TestApp::spawn().await;
    let fixture = setup(&app).await;

    let response = app
        .delete(&format!("/library-items/{}", fixture.library_item_id))
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let result = sync_line(&app, &fixture.linked_line_id).await;
    assert_eq!(result["outcome"], "not_linked");
    assert!(result["line"]["library_item_id"].is_null());
    assert_amount(&result["line"]["total_price"], 400.0);
}

#[tokio::test]
async fn estimate_sync_counts_each_outcome() {
    let app = TestApp::spawn().await;
    let fixture = setup(&app).await;

    // A second linked line that will already match after the price change.
    raise_material_price(&app, &fixture.library_item_id, "25").await;
    app.add_line(
        &fixture.estimate_id,
        json!({ "library_item_id": fixture.library_item_id, "quantity": "2" }),
    )
    .await;

    let response = app
        .post(
            &format!("/estimates/{}/sync-prices", fixture.estimate_id),
            json!({}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let report: Value = response.json().await.unwrap();

    assert_eq!(report["updated"], 1);
    assert_eq!(report["unchanged"], 1);
    assert_eq!(report["not_linked"], 1);
    // 10 x 50 + 2 x 50 + 600
    assert_amount(&report["estimate"]["subtotal"], 1200.0);
}

#[tokio::test]
async fn estimate_sync_without_changes_keeps_version() {
    let app = TestApp::spawn().await;
    let fixture = setup(&app).await;
    let before = app.estimate_tree(&fixture.estimate_id).await;

    let response = app
        .post(
            &format!("/estimates/{}/sync-prices", fixture.estimate_id),
            json!({}),
        )
        .await;
    let report: Value = response.json().await.unwrap();

    assert_eq!(report["updated"], 0);
    assert_eq!(
        report["estimate"]["row_version"],
        before["estimate"]["row_version"]
    );
}
