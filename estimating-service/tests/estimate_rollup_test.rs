mod common;

use common::{amount, assert_amount, id, TestApp};
use reqwest::StatusCode;
use serde_json::{json, Value};

/// Ten units at 50 labor + 50 material: subtotal 1000.
fn thousand_line(chapter_id: Option<&str>) -> Value {
    json!({
        "chapter_id": chapter_id,
        "description": "Metselwerk",
        "quantity": "10",
        "unit": "m2",
        "labor_hours": "1",
        "labor_rate": "50",
        "material_cost": "50"
    })
}

#[tokio::test]
async fn markup_compounds_in_order() {
    let app = TestApp::spawn().await;
    let project_id = app.create_project("Uitbouw").await;
    let estimate_id = app.create_estimate(&project_id, "Begroting").await;

    let response = app.add_line(&estimate_id, thousand_line(None)).await;
    let estimate = &response["estimate"];

    assert_amount(&estimate["total_labor"], 500.0);
    assert_amount(&estimate["total_material"], 500.0);
    assert_amount(&estimate["subtotal"], 1000.0);
    assert_amount(&estimate["general_costs_amount"], 50.0);
    assert_amount(&estimate["profit_amount"], 105.0);
    assert_amount(&estimate["risk_amount"], 0.0);
    assert_amount(&estimate["total_excl_vat"], 1155.0);
    assert_amount(&estimate["vat_amount"], 242.55);
    assert_amount(&estimate["total_incl_vat"], 1397.55);

    assert_amount(&response["line"]["unit_price"], 100.0);
    assert_amount(&response["line"]["total_price"], 1000.0);
}

#[tokio::test]
async fn empty_estimate_has_zero_totals() {
    let app = TestApp::spawn().await;
    let project_id = app.create_project("Leeg").await;
    let estimate_id = app.create_estimate(&project_id, "Leeg").await;

    let response = app
        .post(&format!("/estimates/{}/recalculate", estimate_id), json!({}))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let estimate: Value = response.json().await.unwrap();

    assert_amount(&estimate["subtotal"], 0.0);
    assert_amount(&estimate["total_incl_vat"], 0.0);
}

#[tokio::test]
async fn every_line_mutation_rolls_up() {
    let app = TestApp::spawn().await;
    let project_id = app.create_project("Renovatie").await;
    let estimate_id = app.create_estimate(&project_id, "Renovatie").await;
    let chapter_id = app.create_chapter(&estimate_id, "22", "Metselwerk").await;

    let first = app.add_line(&estimate_id, thousand_line(Some(&chapter_id))).await;
    let line_id = id(&first["line"], "line_item_id");
    let version_after_insert = first["estimate"]["row_version"].as_i64().unwrap();

    // Quantity 10 -> 4
    let response = app
        .patch(&format!("/lines/{}", line_id), json!({ "quantity": "4" }))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let updated: Value = response.json().await.unwrap();
    assert_amount(&updated["line"]["total_price"], 400.0);
    assert_amount(&updated["estimate"]["subtotal"], 400.0);
    assert_eq!(
        updated["estimate"]["row_version"].as_i64().unwrap(),
        version_after_insert + 1
    );

    let tree = app.estimate_tree(&estimate_id).await;
    assert_amount(&tree["chapters"][0]["subtotal"], 400.0);

    // Delete the line
    let response = app.delete(&format!("/lines/{}", line_id)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let estimate: Value = response.json().await.unwrap();
    assert_amount(&estimate["subtotal"], 0.0);
    assert_amount(&estimate["total_incl_vat"], 0.0);

    let tree = app.estimate_tree(&estimate_id).await;
    assert_eq!(tree["lines"].as_array().unwrap().len(), 0);
    assert_amount(&tree["chapters"][0]["subtotal"], 0.0);
}

#[tokio::test]
async fn totals_ignore_chapter_assignment() {
    let app = TestApp::spawn().await;
    let project_id = app.create_project("Garage").await;
    let estimate_id = app.create_estimate(&project_id, "Garage").await;
    let chapter_id = app.create_chapter(&estimate_id, "21", "Funderingen").await;

    app.add_line(&estimate_id, thousand_line(Some(&chapter_id))).await;
    let second = app.add_line(&estimate_id, thousand_line(None)).await;

    assert_amount(&second["estimate"]["subtotal"], 2000.0);

    let tree = app.estimate_tree(&estimate_id).await;
    assert_amount(&tree["chapters"][0]["subtotal"], 1000.0);
}

#[tokio::test]
async fn deleting_a_chapter_removes_its_lines() {
    let app = TestApp::spawn().await;
    let project_id = app.create_project("Schuur").await;
    let estimate_id = app.create_estimate(&project_id, "Schuur").await;
    let chapter_id = app.create_chapter(&estimate_id, "30", "Kozijnen").await;

    app.add_line(&estimate_id, thousand_line(Some(&chapter_id))).await;
    app.add_line(&estimate_id, thousand_line(None)).await;

    let response = app.delete(&format!("/chapters/{}", chapter_id)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let estimate: Value = response.json().await.unwrap();
    assert_amount(&estimate["subtotal"], 1000.0);

    let tree = app.estimate_tree(&estimate_id).await;
    assert_eq!(tree["chapters"].as_array().unwrap().len(), 0);
    assert_eq!(tree["lines"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn markup_change_rolls_up() {
    let app = TestApp::spawn().await;
    let project_id = app.create_project("Dak").await;
    let estimate_id = app.create_estimate(&project_id, "Dak").await;
    app.add_line(&estimate_id, thousand_line(None)).await;

    let response = app
        .patch(
            &format!("/estimates/{}", estimate_id),
            json!({ "general_costs_percent": "0", "profit_percent": "0", "vat_percent": "9" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let estimate: Value = response.json().await.unwrap();

    assert_amount(&estimate["total_excl_vat"], 1000.0);
    assert_amount(&estimate["vat_amount"], 90.0);
    assert_amount(&estimate["total_incl_vat"], 1090.0);
}

#[tokio::test]
async fn recalculate_is_idempotent() {
    let app = TestApp::spawn().await;
    let project_id = app.create_project("Keuken").await;
    let estimate_id = app.create_estimate(&project_id, "Keuken").await;
    app.add_line(&estimate_id, thousand_line(None)).await;

    let path = format!("/estimates/{}/recalculate", estimate_id);
    let first: Value = app.post(&path, json!({})).await.json().await.unwrap();
    let second: Value = app.post(&path, json!({})).await.json().await.unwrap();

    for field in ["subtotal", "total_excl_vat", "vat_amount", "total_incl_vat"] {
        assert_eq!(amount(&first[field]), amount(&second[field]), "{}", field);
    }
}

#[tokio::test]
async fn stale_expected_version_conflicts() {
    let app = TestApp::spawn().await;
    let project_id = app.create_project("Badkamer").await;
    let estimate_id = app.create_estimate(&project_id, "Badkamer").await;
    let inserted = app.add_line(&estimate_id, thousand_line(None)).await;
    let current = inserted["estimate"]["row_version"].as_i64().unwrap();

    let stale = app
        .patch(
            &format!("/estimates/{}", estimate_id),
            json!({ "name": "Badkamer v2", "expected_version": current - 1 }),
        )
        .await;
    assert_eq!(stale.status(), StatusCode::CONFLICT);

    let fresh = app
        .patch(
            &format!("/estimates/{}", estimate_id),
            json!({ "name": "Badkamer v2", "expected_version": current }),
        )
        .await;
    assert_eq!(fresh.status(), StatusCode::OK);
    let estimate: Value = fresh.json().await.unwrap();
    assert_eq!(estimate["name"], "Badkamer v2");
    assert_eq!(estimate["row_version"].as_i64().unwrap(), current + 1);
}

#[tokio::test]
async fn missing_estimate_is_not_found() {
    let app = TestApp::spawn().await;

    let response = app
        .post(
            &format!("/estimates/{}/recalculate", uuid::Uuid::new_v4()),
            json!({}),
        )
        .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
