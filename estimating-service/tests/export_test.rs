mod common;

use common::{id, TestApp};
use estimating_service::config::Edition;
use reqwest::{header, StatusCode};
use serde_json::json;

async fn exportable_estimate(app: &TestApp) -> String {
    let client = app
        .create(
            "/clients",
            json!({ "name": "Bouwbedrijf Jansen & Zn", "city": "Utrecht" }),
        )
        .await;
    let project = app
        .create(
            "/projects",
            json!({ "name": "Kantoor Oost", "client_id": client["client_id"] }),
        )
        .await;
    let estimate_id = app
        .create_estimate(&id(&project, "project_id"), "Casco begroting")
        .await;
    let chapter_id = app.create_chapter(&estimate_id, "22", "Metselwerk").await;
    app.add_line(
        &estimate_id,
        json!({
            "chapter_id": chapter_id,
            "code": "22.10",
            "description": "Gevelmetselwerk",
            "quantity": "85",
            "unit": "m2",
            "labor_hours": "1.2",
            "labor_rate": "52",
            "material_cost": "38"
        }),
    )
    .await;
    estimate_id
}

async fn export(app: &TestApp, estimate_id: &str, format: &str) -> reqwest::Response {
    app.get(&format!("/estimates/{}/export/{}", estimate_id, format))
        .await
}

fn header_value(response: &reqwest::Response, name: header::HeaderName) -> String {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

#[tokio::test]
async fn xlsx_export_is_a_workbook_attachment() {
    let app = TestApp::spawn().await;
    let estimate_id = exportable_estimate(&app).await;

    let response = export(&app, &estimate_id, "xlsx").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        header_value(&response, header::CONTENT_TYPE),
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
    );
    assert_eq!(
        header_value(&response, header::CONTENT_DISPOSITION),
        "attachment; filename=\"Casco_begroting_v1.xlsx\""
    );
    let bytes = response.bytes().await.unwrap();
    assert!(bytes.starts_with(b"PK"));
}

#[tokio::test]
async fn ifc_export_is_a_step_file() {
    let app = TestApp::spawn().await;
    let estimate_id = exportable_estimate(&app).await;

    let response = export(&app, &estimate_id, "ifc").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_value(&response, header::CONTENT_TYPE), "application/x-step");
    let body = response.text().await.unwrap();
    assert!(body.starts_with("ISO-10303-21;"));
    assert!(body.contains("FILE_SCHEMA(('IFC4'))"));
    assert!(body.contains("IFCCOSTSCHEDULE("));
    assert!(body.contains("'Gevelmetselwerk'"));
    assert!(body.trim_end().ends_with("END-ISO-10303-21;"));
}

#[tokio::test]
async fn cuf_export_is_xml() {
    let app = TestApp::spawn().await;
    let estimate_id = exportable_estimate(&app).await;

    let response = export(&app, &estimate_id, "cuf").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_value(&response, header::CONTENT_TYPE), "application/xml");
    assert!(header_value(&response, header::CONTENT_DISPOSITION).ends_with(".xml\""));
    let body = response.text().await.unwrap();
    assert!(body.starts_with("<?xml"));
    assert!(body.contains("Bouwbedrijf Jansen &amp; Zn"));
    assert!(body.contains("<Omschrijving>Gevelmetselwerk</Omschrijving>"));
}

#[tokio::test]
async fn unknown_format_is_rejected() {
    let app = TestApp::spawn().await;
    let estimate_id = exportable_estimate(&app).await;

    let response = export(&app, &estimate_id, "pdf").await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn export_of_missing_estimate_is_not_found() {
    let app = TestApp::spawn().await;

    let response = export(&app, &uuid::Uuid::new_v4().to_string(), "xlsx").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn sbo_edition_cannot_export_ifc() {
    let app = TestApp::spawn_with_edition(Edition::Sbo).await;
    let estimate_id = exportable_estimate(&app).await;

    assert_eq!(
        export(&app, &estimate_id, "ifc").await.status(),
        StatusCode::FORBIDDEN
    );
    assert_eq!(
        export(&app, &estimate_id, "cuf").await.status(),
        StatusCode::FORBIDDEN
    );
    assert_eq!(
        export(&app, &estimate_id, "xlsx").await.status(),
        StatusCode::OK
    );
}
