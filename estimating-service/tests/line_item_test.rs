mod common;

use common::{assert_amount, id, TestApp, OTHER_USER_ID};
use reqwest::StatusCode;
use serde_json::{json, Value};

async fn seed_library_item(app: &TestApp) -> Value {
    let library = app
        .create("/libraries", json!({ "name": "NL-SfB basis", "standard": "nl_sfb" }))
        .await;
    let library_id = id(&library, "library_id");
    app.create(
        &format!("/libraries/{}/items", library_id),
        json!({
            "code": "21.11",
            "description": "Kalkzandsteen 100mm",
            "unit": "m2",
            "labor_hours": "0.8",
            "labor_rate": "55",
            "material_cost": "21.50",
            "equipment_cost": "1.50"
        }),
    )
    .await
}

#[tokio::test]
async fn library_line_copies_item_defaults() {
    let app = TestApp::spawn().await;
    let project_id = app.create_project("Woning").await;
    let estimate_id = app.create_estimate(&project_id, "Woning").await;
    let item = seed_library_item(&app).await;

    let response = app
        .add_line(
            &estimate_id,
            json!({ "library_item_id": item["library_item_id"], "quantity": "10" }),
        )
        .await;
    let line = &response["line"];

    assert_eq!(line["code"], "21.11");
    assert_eq!(line["description"], "Kalkzandsteen 100mm");
    assert_eq!(line["unit"], "m2");
    assert_eq!(line["library_item_id"], item["library_item_id"]);
    assert_amount(&line["labor_cost"], 44.0);
    assert_amount(&line["unit_price"], 67.0);
    assert_amount(&line["total_price"], 670.0);
    assert_amount(&response["estimate"]["subtotal"], 670.0);
}

#[tokio::test]
async fn explicit_fields_override_library_values() {
    let app = TestApp::spawn().await;
    let project_id = app.create_project("Woning").await;
    let estimate_id = app.create_estimate(&project_id, "Woning").await;
    let item = seed_library_item(&app).await;

    let response = app
        .add_line(
            &estimate_id,
            json!({
                "library_item_id": item["library_item_id"],
                "description": "Kalkzandsteen, gelijmd",
                "quantity": "2",
                "material_cost": "30"
            }),
        )
        .await;
    let line = &response["line"];

    assert_eq!(line["description"], "Kalkzandsteen, gelijmd");
    assert_amount(&line["material_cost"], 30.0);
    assert_amount(&line["unit_price"], 75.5);
    assert_amount(&line["total_price"], 151.0);
}

#[tokio::test]
async fn line_without_description_is_rejected() {
    let app = TestApp::spawn().await;
    let project_id = app.create_project("Woning").await;
    let estimate_id = app.create_estimate(&project_id, "Woning").await;

    let response = app
        .post(
            &format!("/estimates/{}/lines", estimate_id),
            json!({ "quantity": "1", "material_cost": "10" }),
        )
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("description"));
}

#[tokio::test]
async fn negative_amounts_are_rejected() {
    let app = TestApp::spawn().await;
    let project_id = app.create_project("Woning").await;
    let estimate_id = app.create_estimate(&project_id, "Woning").await;

    let negative_quantity = app
        .post(
            &format!("/estimates/{}/lines", estimate_id),
            json!({ "description": "Tegels", "quantity": "-1" }),
        )
        .await;
    assert_eq!(negative_quantity.status(), StatusCode::BAD_REQUEST);

    let negative_rate = app
        .post(
            &format!("/estimates/{}/lines", estimate_id),
            json!({ "description": "Tegels", "quantity": "1", "labor_rate": "-45" }),
        )
        .await;
    assert_eq!(negative_rate.status(), StatusCode::BAD_REQUEST);

    let tree = app.estimate_tree(&estimate_id).await;
    assert!(tree["lines"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn oversized_amounts_are_rejected_and_totals_stay() {
    let app = TestApp::spawn().await;
    let project_id = app.create_project("Woning").await;
    let estimate_id = app.create_estimate(&project_id, "Woning").await;
    let existing = app
        .add_line(
            &estimate_id,
            json!({ "description": "Kozijn", "quantity": "2", "material_cost": "300" }),
        )
        .await;
    let line_id = id(&existing["line"], "line_item_id");

    let oversized = app
        .post(
            &format!("/estimates/{}/lines", estimate_id),
            json!({
                "description": "x",
                "quantity": "79228162514264337593543950",
                "material_cost": "100000"
            }),
        )
        .await;
    assert_eq!(oversized.status(), StatusCode::BAD_REQUEST);

    let oversized_patch = app
        .patch(
            &format!("/lines/{}", line_id),
            json!({ "labor_rate": "1000000000.5" }),
        )
        .await;
    assert_eq!(oversized_patch.status(), StatusCode::BAD_REQUEST);

    let tree = app.estimate_tree(&estimate_id).await;
    assert_eq!(tree["lines"].as_array().unwrap().len(), 1);
    assert_amount(&tree["estimate"]["subtotal"], 600.0);
    assert_eq!(
        tree["estimate"]["row_version"],
        existing["estimate"]["row_version"]
    );
}

#[tokio::test]
async fn large_bulk_that_overflows_totals_is_rejected_whole() {
    let app = TestApp::spawn().await;
    let project_id = app.create_project("Woning").await;
    let estimate_id = app.create_estimate(&project_id, "Woning").await;

    // Each line fits on its own; their sum does not.
    let line = json!({
        "description": "Maximaal",
        "quantity": "1000000000",
        "labor_hours": "1000000000",
        "labor_rate": "1000000000",
        "material_cost": "1000000000"
    });
    let lines: Vec<Value> = std::iter::repeat(line).take(100).collect();

    let response = app
        .post(
            &format!("/estimates/{}/lines/bulk", estimate_id),
            json!({ "lines": lines }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let tree = app.estimate_tree(&estimate_id).await;
    assert!(tree["lines"].as_array().unwrap().is_empty());
    assert_amount(&tree["estimate"]["subtotal"], 0.0);
}

#[tokio::test]
async fn unknown_library_item_is_not_found() {
    let app = TestApp::spawn().await;
    let project_id = app.create_project("Woning").await;
    let estimate_id = app.create_estimate(&project_id, "Woning").await;

    let response = app
        .post(
            &format!("/estimates/{}/lines", estimate_id),
            json!({ "library_item_id": uuid::Uuid::new_v4(), "quantity": "1" }),
        )
        .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn bulk_insert_rolls_up_once() {
    let app = TestApp::spawn().await;
    let project_id = app.create_project("Woning").await;
    let estimate_id = app.create_estimate(&project_id, "Woning").await;
    let chapter_id = app.create_chapter(&estimate_id, "40", "Stukadoorswerk").await;

    let response = app
        .post(
            &format!("/estimates/{}/lines/bulk", estimate_id),
            json!({
                "lines": [
                    { "chapter_id": chapter_id, "description": "Wanden", "quantity": "40", "unit": "m2", "subcontr_cost": "18" },
                    { "chapter_id": chapter_id, "description": "Plafonds", "quantity": "20", "unit": "m2", "subcontr_cost": "22" },
                    { "description": "Stelpost", "quantity": "1", "material_cost": "250" }
                ]
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body: Value = response.json().await.unwrap();

    let lines = body["lines"].as_array().unwrap();
    assert_eq!(lines.len(), 3);
    let sort_orders: Vec<i64> = lines
        .iter()
        .map(|l| l["sort_order"].as_i64().unwrap())
        .collect();
    assert_eq!(sort_orders, vec![0, 1, 2]);

    assert_amount(&body["estimate"]["total_subcontr"], 1160.0);
    assert_amount(&body["estimate"]["subtotal"], 1410.0);
    assert_eq!(body["estimate"]["row_version"].as_i64().unwrap(), 1);

    let tree = app.estimate_tree(&estimate_id).await;
    assert_amount(&tree["chapters"][0]["subtotal"], 1160.0);
}

#[tokio::test]
async fn bulk_insert_is_all_or_nothing() {
    let app = TestApp::spawn().await;
    let project_id = app.create_project("Woning").await;
    let estimate_id = app.create_estimate(&project_id, "Woning").await;

    let response = app
        .post(
            &format!("/estimates/{}/lines/bulk", estimate_id),
            json!({
                "lines": [
                    { "description": "Goed", "quantity": "1" },
                    { "quantity": "1" }
                ]
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let tree = app.estimate_tree(&estimate_id).await;
    assert!(tree["lines"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn empty_bulk_is_rejected() {
    let app = TestApp::spawn().await;
    let project_id = app.create_project("Woning").await;
    let estimate_id = app.create_estimate(&project_id, "Woning").await;

    let response = app
        .post(
            &format!("/estimates/{}/lines/bulk", estimate_id),
            json!({ "lines": [] }),
        )
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn chapter_from_another_estimate_is_rejected() {
    let app = TestApp::spawn().await;
    let project_id = app.create_project("Woning").await;
    let estimate_id = app.create_estimate(&project_id, "Woning").await;
    let other_estimate = app.create_estimate(&project_id, "Bijgebouw").await;
    let foreign_chapter = app.create_chapter(&other_estimate, "10", "Sloopwerk").await;

    let response = app
        .post(
            &format!("/estimates/{}/lines", estimate_id),
            json!({ "chapter_id": foreign_chapter, "description": "Sloop", "quantity": "1" }),
        )
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn lines_are_invisible_to_other_owners() {
    let app = TestApp::spawn().await;
    let project_id = app.create_project("Woning").await;
    let estimate_id = app.create_estimate(&project_id, "Woning").await;

    let foreign_insert = app
        .post_as(
            &format!("/estimates/{}/lines", estimate_id),
            json!({ "description": "Indringer", "quantity": "1" }),
            OTHER_USER_ID,
        )
        .await;
    assert_eq!(foreign_insert.status(), StatusCode::NOT_FOUND);

    let foreign_read = app
        .get_as(&format!("/estimates/{}", estimate_id), OTHER_USER_ID)
        .await;
    assert_eq!(foreign_read.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn moving_a_line_between_chapters_updates_subtotals() {
    let app = TestApp::spawn().await;
    let project_id = app.create_project("Woning").await;
    let estimate_id = app.create_estimate(&project_id, "Woning").await;
    let first = app.create_chapter(&estimate_id, "10", "Sloopwerk").await;
    let second = app.create_chapter(&estimate_id, "20", "Funderingen").await;

    let inserted = app
        .add_line(
            &estimate_id,
            json!({ "chapter_id": first, "description": "Puin", "quantity": "5", "equipment_cost": "40" }),
        )
        .await;
    let line_id = id(&inserted["line"], "line_item_id");

    let response = app
        .patch(&format!("/lines/{}", line_id), json!({ "chapter_id": second }))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let tree = app.estimate_tree(&estimate_id).await;
    let subtotal_of = |chapter_id: &str| {
        tree["chapters"]
            .as_array()
            .unwrap()
            .iter()
            .find(|c| c["chapter_id"] == chapter_id)
            .map(|c| c["subtotal"].clone())
            .unwrap()
    };
    assert_amount(&subtotal_of(&first), 0.0);
    assert_amount(&subtotal_of(&second), 200.0);
}

#[tokio::test]
async fn null_chapter_moves_a_line_to_unassigned() {
    let app = TestApp::spawn().await;
    let project_id = app.create_project("Woning").await;
    let estimate_id = app.create_estimate(&project_id, "Woning").await;
    let chapter_id = app.create_chapter(&estimate_id, "10", "Sloopwerk").await;

    let inserted = app
        .add_line(
            &estimate_id,
            json!({ "chapter_id": chapter_id, "description": "Puin", "quantity": "5", "equipment_cost": "40" }),
        )
        .await;
    let line_id = id(&inserted["line"], "line_item_id");

    let untouched = app
        .patch(&format!("/lines/{}", line_id), json!({ "quantity": "6" }))
        .await;
    assert_eq!(untouched.status(), StatusCode::OK);
    let body: Value = untouched.json().await.unwrap();
    assert_eq!(body["line"]["chapter_id"], chapter_id.as_str());

    let response = app
        .patch(&format!("/lines/{}", line_id), json!({ "chapter_id": null }))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert!(body["line"]["chapter_id"].is_null());
    assert_amount(&body["estimate"]["subtotal"], 240.0);
    assert_eq!(
        body["estimate"]["row_version"].as_i64().unwrap(),
        inserted["estimate"]["row_version"].as_i64().unwrap() + 2
    );

    let tree = app.estimate_tree(&estimate_id).await;
    assert_amount(&tree["chapters"][0]["subtotal"], 0.0);
    assert_amount(&tree["estimate"]["subtotal"], 240.0);
}
