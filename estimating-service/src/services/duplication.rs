//! Deep copies of estimates: new versions and duplicates.

use std::collections::HashMap;

use chrono::Utc;
use serde::Deserialize;
use service_core::error::AppError;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::models::{EstimateStatus, EstimateTree};
use crate::services::store::EstimatingStore;

/// Where and under which name a copy lands.
#[derive(Debug, Clone, PartialEq)]
pub struct CopyTarget {
    pub project_id: Uuid,
    pub name: String,
    pub version: i32,
}

/// Body of `POST /estimates/{id}/duplicate`.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct DuplicateEstimate {
    #[validate(length(min = 1, max = 200, message = "must be 1-200 characters"))]
    pub name: Option<String>,
    pub project_id: Option<Uuid>,
}

/// Copy `tree` under fresh identities.
///
/// Markup, cached totals, chapters and lines are kept; chapter links are
/// remapped to the new chapters. Status goes back to draft and
/// `row_version` to zero.
pub fn plan_copy(tree: &EstimateTree, target: CopyTarget) -> EstimateTree {
    let now = Utc::now();

    let mut estimate = tree.estimate.clone();
    estimate.estimate_id = Uuid::new_v4();
    estimate.project_id = target.project_id;
    estimate.name = target.name;
    estimate.version = target.version;
    estimate.status = EstimateStatus::Draft.as_str().to_string();
    estimate.row_version = 0;
    estimate.created_utc = now;
    estimate.updated_utc = now;

    let mut chapter_ids: HashMap<Uuid, Uuid> = HashMap::with_capacity(tree.chapters.len());
    let chapters = tree
        .chapters
        .iter()
        .map(|chapter| {
            let mut copy = chapter.clone();
            copy.chapter_id = Uuid::new_v4();
            copy.estimate_id = estimate.estimate_id;
            copy.created_utc = now;
            chapter_ids.insert(chapter.chapter_id, copy.chapter_id);
            copy
        })
        .collect();

    let lines = tree
        .lines
        .iter()
        .map(|line| {
            let mut copy = line.clone();
            copy.line_item_id = Uuid::new_v4();
            copy.estimate_id = estimate.estimate_id;
            copy.chapter_id = line.chapter_id.and_then(|id| chapter_ids.get(&id).copied());
            copy.created_utc = now;
            copy.updated_utc = now;
            copy
        })
        .collect();

    EstimateTree {
        estimate,
        chapters,
        lines,
    }
}

async fn load_tree(
    store: &dyn EstimatingStore,
    owner_id: &str,
    estimate_id: Uuid,
) -> Result<EstimateTree, AppError> {
    store
        .get_estimate_tree(owner_id, estimate_id)
        .await?
        .ok_or_else(|| AppError::not_found("Estimate"))
}

/// Next version of an estimate in the same project under the same name.
#[instrument(skip(store), fields(owner_id = %owner_id, estimate_id = %estimate_id))]
pub async fn new_version(
    store: &dyn EstimatingStore,
    owner_id: &str,
    estimate_id: Uuid,
) -> Result<EstimateTree, AppError> {
    let source = load_tree(store, owner_id, estimate_id).await?;

    let latest = store
        .list_estimates(owner_id, source.estimate.project_id)
        .await?
        .iter()
        .filter(|e| e.name == source.estimate.name)
        .map(|e| e.version)
        .max()
        .unwrap_or(source.estimate.version);

    let copy = plan_copy(
        &source,
        CopyTarget {
            project_id: source.estimate.project_id,
            name: source.estimate.name.clone(),
            version: latest + 1,
        },
    );
    store.insert_estimate_tree(owner_id, &copy).await?;

    info!(
        new_estimate_id = %copy.estimate.estimate_id,
        version = copy.estimate.version,
        "Estimate version created"
    );
    Ok(copy)
}

/// Independent copy, optionally renamed and moved to another project.
#[instrument(skip(store, input), fields(owner_id = %owner_id, estimate_id = %estimate_id))]
pub async fn duplicate(
    store: &dyn EstimatingStore,
    owner_id: &str,
    estimate_id: Uuid,
    input: DuplicateEstimate,
) -> Result<EstimateTree, AppError> {
    let source = load_tree(store, owner_id, estimate_id).await?;

    let project_id = match input.project_id {
        Some(project_id) => {
            store
                .get_project(owner_id, project_id)
                .await?
                .ok_or_else(|| AppError::not_found("Project"))?
                .project_id
        }
        None => source.estimate.project_id,
    };

    let copy = plan_copy(
        &source,
        CopyTarget {
            project_id,
            name: input
                .name
                .unwrap_or_else(|| format!("{} (copy)", source.estimate.name)),
            version: 1,
        },
    );
    store.insert_estimate_tree(owner_id, &copy).await?;

    info!(new_estimate_id = %copy.estimate.estimate_id, "Estimate duplicated");
    Ok(copy)
}
