mod common;

use chrono::{Datelike, Utc};
use common::{assert_amount, id, TestApp, OTHER_USER_ID};
use reqwest::StatusCode;
use serde_json::{json, Value};

async fn list(app: &TestApp, path: &str) -> Vec<Value> {
    let response = app.get(path).await;
    assert_eq!(response.status(), StatusCode::OK, "GET {}", path);
    let body: Value = response.json().await.unwrap();
    body.as_array().cloned().unwrap_or_default()
}

#[tokio::test]
async fn client_lifecycle() {
    let app = TestApp::spawn().await;

    let client = app
        .create(
            "/clients",
            json!({ "name": "De Vries Bouw", "email": "info@devries.nl", "kvk_number": "12345678" }),
        )
        .await;
    let client_id = id(&client, "client_id");
    assert_eq!(client["owner_id"], common::TEST_USER_ID);

    let response = app
        .patch(&format!("/clients/{}", client_id), json!({ "city": "Amersfoort" }))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let updated: Value = response.json().await.unwrap();
    assert_eq!(updated["city"], "Amersfoort");
    assert_eq!(updated["name"], "De Vries Bouw");

    assert_eq!(list(&app, "/clients").await.len(), 1);

    let foreign = app
        .get_as(&format!("/clients/{}", client_id), OTHER_USER_ID)
        .await;
    assert_eq!(foreign.status(), StatusCode::NOT_FOUND);

    let response = app.delete(&format!("/clients/{}", client_id)).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let response = app.get(&format!("/clients/{}", client_id)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_client_email_is_rejected() {
    let app = TestApp::spawn().await;

    let response = app
        .post("/clients", json!({ "name": "Foutief", "email": "geen-adres" }))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn deleting_a_client_keeps_its_projects() {
    let app = TestApp::spawn().await;
    let client = app.create("/clients", json!({ "name": "Bakker BV" })).await;
    let project = app
        .create(
            "/projects",
            json!({ "name": "Loods", "client_id": client["client_id"] }),
        )
        .await;
    let project_id = id(&project, "project_id");

    app.delete(&format!("/clients/{}", id(&client, "client_id")))
        .await;

    let response = app.get(&format!("/projects/{}", project_id)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let project: Value = response.json().await.unwrap();
    assert!(project["client_id"].is_null());
}

#[tokio::test]
async fn null_client_detaches_a_project() {
    let app = TestApp::spawn().await;
    let client = app.create("/clients", json!({ "name": "Bakker BV" })).await;
    let project = app
        .create(
            "/projects",
            json!({ "name": "Loods", "client_id": client["client_id"] }),
        )
        .await;
    let project_id = id(&project, "project_id");

    let response = app
        .patch(&format!("/projects/{}", project_id), json!({ "city": "Ede" }))
        .await;
    let kept: Value = response.json().await.unwrap();
    assert_eq!(kept["client_id"], client["client_id"]);

    let response = app
        .patch(
            &format!("/projects/{}", project_id),
            json!({ "client_id": null }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let detached: Value = response.json().await.unwrap();
    assert!(detached["client_id"].is_null());
    assert_eq!(detached["city"], "Ede");
}

#[tokio::test]
async fn project_lifecycle() {
    let app = TestApp::spawn().await;
    let project_id = app.create_project("Nieuwbouw 12 woningen").await;

    let response = app
        .patch(
            &format!("/projects/{}", project_id),
            json!({ "status": "on_hold", "city": "Zwolle" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let project: Value = response.json().await.unwrap();
    assert_eq!(project["status"], "on_hold");
    assert_eq!(project["city"], "Zwolle");

    assert_eq!(list(&app, "/projects").await.len(), 1);
    let response = app.get_as("/projects", OTHER_USER_ID).await;
    let foreign: Value = response.json().await.unwrap();
    assert!(foreign.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn project_with_unknown_client_is_rejected() {
    let app = TestApp::spawn().await;

    let response = app
        .post(
            "/projects",
            json!({ "name": "Zwevend", "client_id": uuid::Uuid::new_v4() }),
        )
        .await;

    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn deleting_a_project_cascades() {
    let app = TestApp::spawn().await;
    let project_id = app.create_project("Sloop en nieuwbouw").await;
    let estimate_id = app.create_estimate(&project_id, "Sloop").await;
    app.add_line(
        &estimate_id,
        json!({ "description": "Sloopwerk", "quantity": "1", "subcontr_cost": "4500" }),
    )
    .await;
    app.create(
        &format!("/projects/{}/invoices", project_id),
        json!({ "amount_excl_vat": "1000" }),
    )
    .await;

    let response = app.delete(&format!("/projects/{}", project_id)).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let estimate = app.get(&format!("/estimates/{}", estimate_id)).await;
    assert_eq!(estimate.status(), StatusCode::NOT_FOUND);
    let invoices = app
        .get(&format!("/projects/{}/invoices", project_id))
        .await;
    assert_eq!(invoices.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invoices_are_numbered_per_project() {
    let app = TestApp::spawn().await;
    let project_id = app.create_project("Dakkapel").await;
    let path = format!("/projects/{}/invoices", project_id);
    let year = Utc::now().year();

    let first = app.create(&path, json!({ "amount_excl_vat": "1155" })).await;
    let second = app.create(&path, json!({ "amount_excl_vat": "500" })).await;

    assert_eq!(first["invoice_number"], format!("{}-0001", year));
    assert_eq!(second["invoice_number"], format!("{}-0002", year));
    assert_eq!(first["status"], "draft");
    assert_amount(&first["vat_amount"], 242.55);
    assert_amount(&first["amount_incl_vat"], 1397.55);

    let other_project = app.create_project("Carport").await;
    let other = app
        .create(
            &format!("/projects/{}/invoices", other_project),
            json!({ "amount_excl_vat": "100" }),
        )
        .await;
    assert_eq!(other["invoice_number"], format!("{}-0001", year));
}

#[tokio::test]
async fn duplicate_invoice_number_conflicts() {
    let app = TestApp::spawn().await;
    let project_id = app.create_project("Dakkapel").await;
    let path = format!("/projects/{}/invoices", project_id);

    app.create(
        &path,
        json!({ "invoice_number": "F-001", "amount_excl_vat": "10" }),
    )
    .await;
    let response = app
        .post(
            &path,
            json!({ "invoice_number": "F-001", "amount_excl_vat": "20" }),
        )
        .await;

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn paying_an_invoice_stamps_the_date() {
    let app = TestApp::spawn().await;
    let project_id = app.create_project("Dakkapel").await;
    let invoice = app
        .create(
            &format!("/projects/{}/invoices", project_id),
            json!({ "amount_excl_vat": "200", "vat_percent": "9" }),
        )
        .await;

    let response = app
        .patch(
            &format!("/invoices/{}", id(&invoice, "invoice_id")),
            json!({ "status": "paid" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let paid: Value = response.json().await.unwrap();

    assert_eq!(paid["status"], "paid");
    assert!(paid["paid_date"].is_string());
    assert_amount(&paid["amount_incl_vat"], 218.0);
}

#[tokio::test]
async fn invoice_from_estimate_bills_the_excl_vat_total() {
    let app = TestApp::spawn().await;
    let project_id = app.create_project("Dakkapel").await;
    let estimate_id = app.create_estimate(&project_id, "Dakkapel").await;
    app.add_line(
        &estimate_id,
        json!({ "description": "Dakkapel prefab", "quantity": "1", "subcontr_cost": "1000" }),
    )
    .await;

    let invoice = app
        .create(&format!("/estimates/{}/invoice", estimate_id), json!({}))
        .await;

    assert_eq!(invoice["estimate_id"], estimate_id.as_str());
    assert_eq!(invoice["project_id"], project_id.as_str());
    assert_amount(&invoice["amount_excl_vat"], 1155.0);
    assert_amount(&invoice["vat_percent"], 21.0);
    assert_amount(&invoice["amount_incl_vat"], 1397.55);
}

#[tokio::test]
async fn invoice_cannot_reference_another_projects_estimate() {
    let app = TestApp::spawn().await;
    let project_id = app.create_project("Dakkapel").await;
    let other_project = app.create_project("Carport").await;
    let foreign_estimate = app.create_estimate(&other_project, "Carport").await;

    let response = app
        .post(
            &format!("/projects/{}/invoices", project_id),
            json!({ "estimate_id": foreign_estimate, "amount_excl_vat": "10" }),
        )
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn time_entries_derive_cost() {
    let app = TestApp::spawn().await;
    let project_id = app.create_project("Onderhoud").await;
    let path = format!("/projects/{}/time-entries", project_id);

    let entry = app
        .create(
            &path,
            json!({
                "entry_date": "2026-03-02",
                "employee_name": "Piet",
                "hours": "7.5",
                "hourly_rate": "48"
            }),
        )
        .await;
    assert_amount(&entry["cost"], 360.0);

    let response = app
        .patch(
            &format!("/time-entries/{}", id(&entry, "time_entry_id")),
            json!({ "hours": "8" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let updated: Value = response.json().await.unwrap();
    assert_amount(&updated["cost"], 384.0);

    assert_eq!(list(&app, &path).await.len(), 1);

    let response = app
        .delete(&format!("/time-entries/{}", id(&entry, "time_entry_id")))
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(list(&app, &path).await.is_empty());
}

#[tokio::test]
async fn milestones_track_completion() {
    let app = TestApp::spawn().await;
    let project_id = app.create_project("Onderhoud").await;
    let milestone = app
        .create(
            &format!("/projects/{}/milestones", project_id),
            json!({ "name": "Ruwbouw gereed", "due_date": "2026-06-01" }),
        )
        .await;
    assert_eq!(milestone["completed"], false);

    let path = format!("/milestones/{}", id(&milestone, "milestone_id"));
    let done: Value = app
        .patch(&path, json!({ "completed": true }))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(done["completed"], true);
    assert!(done["completed_utc"].is_string());

    let reopened: Value = app
        .patch(&path, json!({ "completed": false }))
        .await
        .json()
        .await
        .unwrap();
    assert!(reopened["completed_utc"].is_null());
}

#[tokio::test]
async fn purchase_orders_follow_status_updates() {
    let app = TestApp::spawn().await;
    let project_id = app.create_project("Onderhoud").await;
    let path = format!("/projects/{}/purchase-orders", project_id);

    let order = app
        .create(
            &path,
            json!({ "order_number": "PO-2026-014", "supplier": "Bouwmaat", "amount": "1840.50" }),
        )
        .await;
    assert_eq!(order["status"], "draft");

    let response = app
        .patch(
            &format!("/purchase-orders/{}", id(&order, "purchase_order_id")),
            json!({ "status": "ordered" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let updated: Value = response.json().await.unwrap();
    assert_eq!(updated["status"], "ordered");
    assert_amount(&updated["amount"], 1840.5);

    assert_eq!(list(&app, &path).await.len(), 1);
}

#[tokio::test]
async fn library_items_can_be_searched() {
    let app = TestApp::spawn().await;
    let library = app.create("/libraries", json!({ "name": "STABU" })).await;
    let items_path = format!("/libraries/{}/items", id(&library, "library_id"));

    for (code, description) in [
        ("21.11", "Kalkzandsteen 100mm"),
        ("21.12", "Kalkzandsteen 150mm"),
        ("30.01", "Houten kozijn"),
    ] {
        app.create(
            &items_path,
            json!({ "code": code, "description": description, "unit": "m2", "material_cost": "10" }),
        )
        .await;
    }

    assert_eq!(list(&app, &items_path).await.len(), 3);
    assert_eq!(
        list(&app, &format!("{}?q=kalkzand", items_path)).await.len(),
        2
    );
    assert_eq!(list(&app, &format!("{}?q=30.", items_path)).await.len(), 1);

    let foreign = app.get_as(&items_path, OTHER_USER_ID).await;
    assert_eq!(foreign.status(), StatusCode::NOT_FOUND);
}
