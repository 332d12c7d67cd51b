use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
};
use service_core::error::AppError;
use uuid::Uuid;

use crate::middleware::OwnerId;
use crate::services::export::{self, ExportDocument, ExportFormat};
use crate::startup::AppState;

pub async fn export_estimate(
    State(state): State<AppState>,
    owner: OwnerId,
    Path((estimate_id, format)): Path<(Uuid, String)>,
) -> Result<impl IntoResponse, AppError> {
    let format: ExportFormat = format.parse()?;
    state.features.require(format.feature())?;

    let tree = state
        .store
        .get_estimate_tree(owner.as_str(), estimate_id)
        .await?
        .ok_or_else(|| AppError::not_found("Estimate"))?;
    let project = state
        .store
        .get_project(owner.as_str(), tree.estimate.project_id)
        .await?
        .ok_or_else(|| AppError::not_found("Project"))?;
    let client = match project.client_id {
        Some(client_id) => state.store.get_client(owner.as_str(), client_id).await?,
        None => None,
    };

    let document = ExportDocument {
        project,
        client,
        tree,
    };
    let bytes = export::render(format, &document)?;
    let file_name = document.file_name(format);

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, format.content_type().to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name),
            ),
        ],
        bytes,
    ))
}
