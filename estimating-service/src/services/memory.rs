//! In-memory store used for local runs and tests.
//!
//! All state sits behind one `RwLock`; every line or markup mutation holds
//! the write lock from the change through the rollup, so concurrent edits
//! of an estimate serialize exactly like the row lock in PostgreSQL.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use service_core::error::AppError;
use tokio::sync::RwLock;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::models::{
    Chapter, Client, CostLibrary, Estimate, EstimateTree, Invoice, LibraryItem, LineCosts,
    LineDraft, LineItem, Milestone, Project, PurchaseOrder, TimeEntry, UpdateChapter,
    UpdateClient, UpdateEstimate, UpdateInvoice, UpdateLibraryItem, UpdateLineItem,
    UpdateMilestone, UpdateProject, UpdatePurchaseOrder, UpdateTimeEntry,
};
use crate::services::metrics::ROLLUPS_TOTAL;
use crate::services::{pricing, rollup};
use crate::services::store::EstimatingStore;

#[derive(Default)]
struct MemoryState {
    clients: HashMap<Uuid, Client>,
    projects: HashMap<Uuid, Project>,
    libraries: HashMap<Uuid, CostLibrary>,
    library_items: HashMap<Uuid, LibraryItem>,
    estimates: HashMap<Uuid, Estimate>,
    chapters: HashMap<Uuid, Chapter>,
    lines: HashMap<Uuid, LineItem>,
    invoices: HashMap<Uuid, Invoice>,
    time_entries: HashMap<Uuid, TimeEntry>,
    milestones: HashMap<Uuid, Milestone>,
    purchase_orders: HashMap<Uuid, PurchaseOrder>,
}

impl MemoryState {
    fn owns_client(&self, owner_id: &str, client_id: Uuid) -> bool {
        self.clients
            .get(&client_id)
            .is_some_and(|c| c.owner_id == owner_id)
    }

    fn owns_project(&self, owner_id: &str, project_id: Uuid) -> bool {
        self.projects
            .get(&project_id)
            .is_some_and(|p| p.owner_id == owner_id)
    }

    fn owns_library(&self, owner_id: &str, library_id: Uuid) -> bool {
        self.libraries
            .get(&library_id)
            .is_some_and(|l| l.owner_id == owner_id)
    }

    fn owns_estimate(&self, owner_id: &str, estimate_id: Uuid) -> bool {
        self.estimates
            .get(&estimate_id)
            .is_some_and(|e| self.owns_project(owner_id, e.project_id))
    }

    fn require_project(&self, owner_id: &str, project_id: Uuid) -> Result<(), AppError> {
        if self.owns_project(owner_id, project_id) {
            Ok(())
        } else {
            Err(AppError::not_found("Project"))
        }
    }

    fn require_estimate(&self, owner_id: &str, estimate_id: Uuid) -> Result<(), AppError> {
        if self.owns_estimate(owner_id, estimate_id) {
            Ok(())
        } else {
            Err(AppError::not_found("Estimate"))
        }
    }

    fn require_client_ref(&self, owner_id: &str, client_id: Option<Uuid>) -> Result<(), AppError> {
        match client_id {
            Some(id) if !self.owns_client(owner_id, id) => Err(AppError::not_found("Client")),
            _ => Ok(()),
        }
    }

    fn require_chapter_in(&self, estimate_id: Uuid, chapter_id: Option<Uuid>) -> Result<(), AppError> {
        match chapter_id {
            Some(id)
                if !self
                    .chapters
                    .get(&id)
                    .is_some_and(|c| c.estimate_id == estimate_id) =>
            {
                Err(AppError::bad_request("chapter_id: chapter does not belong to this estimate"))
            }
            _ => Ok(()),
        }
    }

    fn project_invoice_number_taken(&self, invoice: &Invoice) -> bool {
        self.invoices.values().any(|i| {
            i.project_id == invoice.project_id
                && i.invoice_id != invoice.invoice_id
                && i.invoice_number == invoice.invoice_number
        })
    }

    fn tree(&self, estimate_id: Uuid) -> Option<EstimateTree> {
        let estimate = self.estimates.get(&estimate_id)?.clone();
        let mut chapters: Vec<Chapter> = self
            .chapters
            .values()
            .filter(|c| c.estimate_id == estimate_id)
            .cloned()
            .collect();
        chapters.sort_by_key(|c| (c.sort_order, c.created_utc));
        let mut lines: Vec<LineItem> = self
            .lines
            .values()
            .filter(|l| l.estimate_id == estimate_id)
            .cloned()
            .collect();
        lines.sort_by_key(|l| (l.sort_order, l.created_utc));
        Some(EstimateTree {
            estimate,
            chapters,
            lines,
        })
    }

    /// Recompute totals and chapter subtotals of one estimate from its
    /// stored lines and bump its row version.
    fn roll_up(&mut self, estimate_id: Uuid, trigger: &str) -> Result<Estimate, AppError> {
        let lines: Vec<LineItem> = self
            .lines
            .values()
            .filter(|l| l.estimate_id == estimate_id)
            .cloned()
            .collect();
        let mut chapters: Vec<Chapter> = self
            .chapters
            .values()
            .filter(|c| c.estimate_id == estimate_id)
            .cloned()
            .collect();

        let estimate = self
            .estimates
            .get_mut(&estimate_id)
            .ok_or_else(|| AppError::not_found("Estimate"))?;

        rollup::apply(estimate, &mut chapters, &lines)?;
        estimate.row_version += 1;
        estimate.updated_utc = Utc::now();
        let estimate = estimate.clone();

        for chapter in chapters {
            self.chapters.insert(chapter.chapter_id, chapter);
        }

        ROLLUPS_TOTAL.with_label_values(&[trigger]).inc();
        Ok(estimate)
    }

    /// Run `mutate` and roll the estimate up. When either step fails the
    /// estimate, its chapters and its lines are put back as they were, the
    /// way a rolled-back transaction leaves them in PostgreSQL.
    fn with_rollup<T>(
        &mut self,
        estimate_id: Uuid,
        trigger: &str,
        mutate: impl FnOnce(&mut Self) -> Result<T, AppError>,
    ) -> Result<(T, Estimate), AppError> {
        let snapshot = self
            .tree(estimate_id)
            .ok_or_else(|| AppError::not_found("Estimate"))?;
        let result = mutate(&mut *self)
            .and_then(|value| Ok((value, self.roll_up(estimate_id, trigger)?)));
        if result.is_err() {
            self.restore(snapshot);
        }
        result
    }

    fn restore(&mut self, tree: EstimateTree) {
        let estimate_id = tree.estimate.estimate_id;
        self.chapters.retain(|_, c| c.estimate_id != estimate_id);
        self.lines.retain(|_, l| l.estimate_id != estimate_id);
        self.estimates.insert(estimate_id, tree.estimate);
        for chapter in tree.chapters {
            self.chapters.insert(chapter.chapter_id, chapter);
        }
        for line in tree.lines {
            self.lines.insert(line.line_item_id, line);
        }
    }

    fn remove_estimate(&mut self, estimate_id: Uuid) {
        self.estimates.remove(&estimate_id);
        self.chapters.retain(|_, c| c.estimate_id != estimate_id);
        self.lines.retain(|_, l| l.estimate_id != estimate_id);
        for invoice in self.invoices.values_mut() {
            if invoice.estimate_id == Some(estimate_id) {
                invoice.estimate_id = None;
            }
        }
    }

    fn remove_project(&mut self, project_id: Uuid) {
        let estimate_ids: Vec<Uuid> = self
            .estimates
            .values()
            .filter(|e| e.project_id == project_id)
            .map(|e| e.estimate_id)
            .collect();
        for estimate_id in estimate_ids {
            self.remove_estimate(estimate_id);
        }
        self.projects.remove(&project_id);
        self.invoices.retain(|_, i| i.project_id != project_id);
        self.time_entries.retain(|_, t| t.project_id != project_id);
        self.milestones.retain(|_, m| m.project_id != project_id);
        self.purchase_orders.retain(|_, p| p.project_id != project_id);
    }

    fn unlink_library_item(&mut self, library_item_id: Uuid) {
        for line in self.lines.values_mut() {
            if line.library_item_id == Some(library_item_id) {
                line.library_item_id = None;
            }
        }
    }
}

/// Store keeping everything in process memory.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        info!("Using in-memory store");
        Self::default()
    }
}

#[async_trait]
impl EstimatingStore for MemoryStore {
    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Clients
    // -------------------------------------------------------------------------

    async fn insert_client(&self, client: &Client) -> Result<(), AppError> {
        let mut state = self.state.write().await;
        state.clients.insert(client.client_id, client.clone());
        Ok(())
    }

    async fn get_client(&self, owner_id: &str, client_id: Uuid) -> Result<Option<Client>, AppError> {
        let state = self.state.read().await;
        Ok(state
            .clients
            .get(&client_id)
            .filter(|c| c.owner_id == owner_id)
            .cloned())
    }

    async fn list_clients(&self, owner_id: &str) -> Result<Vec<Client>, AppError> {
        let state = self.state.read().await;
        let mut clients: Vec<Client> = state
            .clients
            .values()
            .filter(|c| c.owner_id == owner_id)
            .cloned()
            .collect();
        clients.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(clients)
    }

    async fn update_client(
        &self,
        owner_id: &str,
        client_id: Uuid,
        input: UpdateClient,
    ) -> Result<Option<Client>, AppError> {
        let mut state = self.state.write().await;
        let Some(client) = state
            .clients
            .get_mut(&client_id)
            .filter(|c| c.owner_id == owner_id)
        else {
            return Ok(None);
        };
        client.apply_update(input);
        Ok(Some(client.clone()))
    }

    async fn delete_client(&self, owner_id: &str, client_id: Uuid) -> Result<bool, AppError> {
        let mut state = self.state.write().await;
        if !state.owns_client(owner_id, client_id) {
            return Ok(false);
        }
        state.clients.remove(&client_id);
        for project in state.projects.values_mut() {
            if project.client_id == Some(client_id) {
                project.client_id = None;
            }
        }
        Ok(true)
    }

    // -------------------------------------------------------------------------
    // Projects
    // -------------------------------------------------------------------------

    async fn insert_project(&self, project: &Project) -> Result<(), AppError> {
        let mut state = self.state.write().await;
        state.require_client_ref(&project.owner_id, project.client_id)?;
        state.projects.insert(project.project_id, project.clone());
        Ok(())
    }

    async fn get_project(
        &self,
        owner_id: &str,
        project_id: Uuid,
    ) -> Result<Option<Project>, AppError> {
        let state = self.state.read().await;
        Ok(state
            .projects
            .get(&project_id)
            .filter(|p| p.owner_id == owner_id)
            .cloned())
    }

    async fn list_projects(&self, owner_id: &str) -> Result<Vec<Project>, AppError> {
        let state = self.state.read().await;
        let mut projects: Vec<Project> = state
            .projects
            .values()
            .filter(|p| p.owner_id == owner_id)
            .cloned()
            .collect();
        projects.sort_by(|a, b| b.created_utc.cmp(&a.created_utc));
        Ok(projects)
    }

    async fn update_project(
        &self,
        owner_id: &str,
        project_id: Uuid,
        input: UpdateProject,
    ) -> Result<Option<Project>, AppError> {
        let mut state = self.state.write().await;
        if !state.owns_project(owner_id, project_id) {
            return Ok(None);
        }
        state.require_client_ref(owner_id, input.client_id.flatten())?;
        let Some(project) = state.projects.get_mut(&project_id) else {
            return Ok(None);
        };
        project.apply_update(input);
        Ok(Some(project.clone()))
    }

    async fn delete_project(&self, owner_id: &str, project_id: Uuid) -> Result<bool, AppError> {
        let mut state = self.state.write().await;
        if !state.owns_project(owner_id, project_id) {
            return Ok(false);
        }
        state.remove_project(project_id);
        Ok(true)
    }

    // -------------------------------------------------------------------------
    // Cost libraries
    // -------------------------------------------------------------------------

    async fn insert_library(&self, library: &CostLibrary) -> Result<(), AppError> {
        let mut state = self.state.write().await;
        state.libraries.insert(library.library_id, library.clone());
        Ok(())
    }

    async fn get_library(
        &self,
        owner_id: &str,
        library_id: Uuid,
    ) -> Result<Option<CostLibrary>, AppError> {
        let state = self.state.read().await;
        Ok(state
            .libraries
            .get(&library_id)
            .filter(|l| l.owner_id == owner_id)
            .cloned())
    }

    async fn list_libraries(&self, owner_id: &str) -> Result<Vec<CostLibrary>, AppError> {
        let state = self.state.read().await;
        let mut libraries: Vec<CostLibrary> = state
            .libraries
            .values()
            .filter(|l| l.owner_id == owner_id)
            .cloned()
            .collect();
        libraries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(libraries)
    }

    async fn delete_library(&self, owner_id: &str, library_id: Uuid) -> Result<bool, AppError> {
        let mut state = self.state.write().await;
        if !state.owns_library(owner_id, library_id) {
            return Ok(false);
        }
        state.libraries.remove(&library_id);
        let item_ids: Vec<Uuid> = state
            .library_items
            .values()
            .filter(|i| i.library_id == library_id)
            .map(|i| i.library_item_id)
            .collect();
        for item_id in item_ids {
            state.library_items.remove(&item_id);
            state.unlink_library_item(item_id);
        }
        Ok(true)
    }

    // -------------------------------------------------------------------------
    // Library items
    // -------------------------------------------------------------------------

    async fn insert_library_item(&self, owner_id: &str, item: &LibraryItem) -> Result<(), AppError> {
        let mut state = self.state.write().await;
        if !state.owns_library(owner_id, item.library_id) {
            return Err(AppError::not_found("Library"));
        }
        state.library_items.insert(item.library_item_id, item.clone());
        Ok(())
    }

    async fn get_library_item(
        &self,
        owner_id: &str,
        library_item_id: Uuid,
    ) -> Result<Option<LibraryItem>, AppError> {
        let state = self.state.read().await;
        Ok(state
            .library_items
            .get(&library_item_id)
            .filter(|i| state.owns_library(owner_id, i.library_id))
            .cloned())
    }

    async fn list_library_items(
        &self,
        owner_id: &str,
        library_id: Uuid,
        search: Option<&str>,
    ) -> Result<Vec<LibraryItem>, AppError> {
        let state = self.state.read().await;
        if !state.owns_library(owner_id, library_id) {
            return Err(AppError::not_found("Library"));
        }
        let needle = search.map(str::to_lowercase);
        let mut items: Vec<LibraryItem> = state
            .library_items
            .values()
            .filter(|i| i.library_id == library_id)
            .filter(|i| match &needle {
                Some(q) => {
                    i.code.to_lowercase().contains(q) || i.description.to_lowercase().contains(q)
                }
                None => true,
            })
            .cloned()
            .collect();
        items.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(items)
    }

    async fn update_library_item(
        &self,
        owner_id: &str,
        library_item_id: Uuid,
        input: UpdateLibraryItem,
    ) -> Result<Option<LibraryItem>, AppError> {
        let mut state = self.state.write().await;
        let owned = state
            .library_items
            .get(&library_item_id)
            .is_some_and(|i| state.owns_library(owner_id, i.library_id));
        if !owned {
            return Ok(None);
        }
        let Some(mut item) = state.library_items.get(&library_item_id).cloned() else {
            return Ok(None);
        };
        item.apply_update(input)?;
        state.library_items.insert(library_item_id, item.clone());
        Ok(Some(item))
    }

    async fn delete_library_item(
        &self,
        owner_id: &str,
        library_item_id: Uuid,
    ) -> Result<bool, AppError> {
        let mut state = self.state.write().await;
        let owned = state
            .library_items
            .get(&library_item_id)
            .is_some_and(|i| state.owns_library(owner_id, i.library_id));
        if !owned {
            return Ok(false);
        }
        state.library_items.remove(&library_item_id);
        state.unlink_library_item(library_item_id);
        Ok(true)
    }

    // -------------------------------------------------------------------------
    // Estimates
    // -------------------------------------------------------------------------

    async fn insert_estimate(&self, owner_id: &str, estimate: &Estimate) -> Result<(), AppError> {
        let mut state = self.state.write().await;
        state.require_project(owner_id, estimate.project_id)?;
        state.estimates.insert(estimate.estimate_id, estimate.clone());
        Ok(())
    }

    async fn get_estimate(
        &self,
        owner_id: &str,
        estimate_id: Uuid,
    ) -> Result<Option<Estimate>, AppError> {
        let state = self.state.read().await;
        if !state.owns_estimate(owner_id, estimate_id) {
            return Ok(None);
        }
        Ok(state.estimates.get(&estimate_id).cloned())
    }

    async fn list_estimates(
        &self,
        owner_id: &str,
        project_id: Uuid,
    ) -> Result<Vec<Estimate>, AppError> {
        let state = self.state.read().await;
        state.require_project(owner_id, project_id)?;
        let mut estimates: Vec<Estimate> = state
            .estimates
            .values()
            .filter(|e| e.project_id == project_id)
            .cloned()
            .collect();
        estimates.sort_by(|a, b| {
            a.name
                .cmp(&b.name)
                .then(a.version.cmp(&b.version))
        });
        Ok(estimates)
    }

    async fn get_estimate_tree(
        &self,
        owner_id: &str,
        estimate_id: Uuid,
    ) -> Result<Option<EstimateTree>, AppError> {
        let state = self.state.read().await;
        if !state.owns_estimate(owner_id, estimate_id) {
            return Ok(None);
        }
        Ok(state.tree(estimate_id))
    }

    #[instrument(skip(self, input), fields(owner_id = %owner_id, estimate_id = %estimate_id))]
    async fn update_estimate(
        &self,
        owner_id: &str,
        estimate_id: Uuid,
        input: &UpdateEstimate,
    ) -> Result<Estimate, AppError> {
        let mut state = self.state.write().await;
        state.require_estimate(owner_id, estimate_id)?;
        let estimate = state
            .estimates
            .get(&estimate_id)
            .ok_or_else(|| AppError::not_found("Estimate"))?;

        if let Some(expected) = input.expected_version {
            if expected != estimate.row_version {
                return Err(AppError::Conflict(anyhow::anyhow!(
                    "Estimate was modified concurrently (expected version {}, current {})",
                    expected,
                    estimate.row_version
                )));
            }
        }

        let ((), estimate) = state.with_rollup(estimate_id, "markup", |state| {
            state
                .estimates
                .get_mut(&estimate_id)
                .ok_or_else(|| AppError::not_found("Estimate"))?
                .apply_update(input);
            Ok(())
        })?;
        Ok(estimate)
    }

    async fn delete_estimate(&self, owner_id: &str, estimate_id: Uuid) -> Result<bool, AppError> {
        let mut state = self.state.write().await;
        if !state.owns_estimate(owner_id, estimate_id) {
            return Ok(false);
        }
        state.remove_estimate(estimate_id);
        Ok(true)
    }

    #[instrument(skip(self), fields(owner_id = %owner_id, estimate_id = %estimate_id))]
    async fn recalculate_estimate(
        &self,
        owner_id: &str,
        estimate_id: Uuid,
    ) -> Result<Estimate, AppError> {
        let mut state = self.state.write().await;
        state.require_estimate(owner_id, estimate_id)?;
        state.roll_up(estimate_id, "recalculate")
    }

    async fn insert_estimate_tree(
        &self,
        owner_id: &str,
        tree: &EstimateTree,
    ) -> Result<(), AppError> {
        let mut state = self.state.write().await;
        state.require_project(owner_id, tree.estimate.project_id)?;
        state
            .estimates
            .insert(tree.estimate.estimate_id, tree.estimate.clone());
        for chapter in &tree.chapters {
            state.chapters.insert(chapter.chapter_id, chapter.clone());
        }
        for line in &tree.lines {
            state.lines.insert(line.line_item_id, line.clone());
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Chapters
    // -------------------------------------------------------------------------

    async fn insert_chapter(&self, owner_id: &str, chapter: &Chapter) -> Result<(), AppError> {
        let mut state = self.state.write().await;
        state.require_estimate(owner_id, chapter.estimate_id)?;
        state.chapters.insert(chapter.chapter_id, chapter.clone());
        Ok(())
    }

    async fn update_chapter(
        &self,
        owner_id: &str,
        chapter_id: Uuid,
        input: UpdateChapter,
    ) -> Result<Option<Chapter>, AppError> {
        let mut state = self.state.write().await;
        let owned = state
            .chapters
            .get(&chapter_id)
            .is_some_and(|c| state.owns_estimate(owner_id, c.estimate_id));
        if !owned {
            return Ok(None);
        }
        let Some(chapter) = state.chapters.get_mut(&chapter_id) else {
            return Ok(None);
        };
        chapter.apply_update(input);
        Ok(Some(chapter.clone()))
    }

    #[instrument(skip(self), fields(owner_id = %owner_id, chapter_id = %chapter_id))]
    async fn delete_chapter(
        &self,
        owner_id: &str,
        chapter_id: Uuid,
    ) -> Result<Option<Estimate>, AppError> {
        let mut state = self.state.write().await;
        let Some(estimate_id) = state
            .chapters
            .get(&chapter_id)
            .map(|c| c.estimate_id)
            .filter(|id| state.owns_estimate(owner_id, *id))
        else {
            return Ok(None);
        };
        let ((), estimate) = state.with_rollup(estimate_id, "chapter_delete", |state| {
            state.chapters.remove(&chapter_id);
            state.lines.retain(|_, l| l.chapter_id != Some(chapter_id));
            Ok(())
        })?;
        Ok(Some(estimate))
    }

    // -------------------------------------------------------------------------
    // Lines
    // -------------------------------------------------------------------------

    async fn get_line(
        &self,
        owner_id: &str,
        line_item_id: Uuid,
    ) -> Result<Option<LineItem>, AppError> {
        let state = self.state.read().await;
        Ok(state
            .lines
            .get(&line_item_id)
            .filter(|l| state.owns_estimate(owner_id, l.estimate_id))
            .cloned())
    }

    #[instrument(skip(self, drafts), fields(owner_id = %owner_id, estimate_id = %estimate_id, count = drafts.len()))]
    async fn insert_lines(
        &self,
        owner_id: &str,
        estimate_id: Uuid,
        drafts: Vec<LineDraft>,
    ) -> Result<(Vec<LineItem>, Estimate), AppError> {
        let mut state = self.state.write().await;
        state.require_estimate(owner_id, estimate_id)?;
        for draft in &drafts {
            state.require_chapter_in(estimate_id, draft.chapter_id)?;
        }

        let lines = drafts
            .into_iter()
            .map(|draft| draft.into_line(estimate_id))
            .collect::<Result<Vec<_>, _>>()?;

        state.with_rollup(estimate_id, "line_insert", |state| {
            for line in &lines {
                state.lines.insert(line.line_item_id, line.clone());
            }
            Ok(lines)
        })
    }

    #[instrument(skip(self, input), fields(owner_id = %owner_id, line_item_id = %line_item_id))]
    async fn update_line(
        &self,
        owner_id: &str,
        line_item_id: Uuid,
        input: &UpdateLineItem,
    ) -> Result<(LineItem, Estimate), AppError> {
        let mut state = self.state.write().await;
        let estimate_id = state
            .lines
            .get(&line_item_id)
            .map(|l| l.estimate_id)
            .filter(|id| state.owns_estimate(owner_id, *id))
            .ok_or_else(|| AppError::not_found("Line item"))?;
        state.require_chapter_in(estimate_id, input.chapter_id.flatten())?;

        state.with_rollup(estimate_id, "line_update", |state| {
            let line = state
                .lines
                .get_mut(&line_item_id)
                .ok_or_else(|| AppError::not_found("Line item"))?;
            line.apply_update(input)?;
            Ok(line.clone())
        })
    }

    #[instrument(skip(self), fields(owner_id = %owner_id, line_item_id = %line_item_id))]
    async fn delete_line(&self, owner_id: &str, line_item_id: Uuid) -> Result<Estimate, AppError> {
        let mut state = self.state.write().await;
        let estimate_id = state
            .lines
            .get(&line_item_id)
            .map(|l| l.estimate_id)
            .filter(|id| state.owns_estimate(owner_id, *id))
            .ok_or_else(|| AppError::not_found("Line item"))?;
        let ((), estimate) = state.with_rollup(estimate_id, "line_delete", |state| {
            state.lines.remove(&line_item_id);
            Ok(())
        })?;
        Ok(estimate)
    }

    #[instrument(skip(self, costs), fields(owner_id = %owner_id, estimate_id = %estimate_id, count = costs.len()))]
    async fn apply_line_costs(
        &self,
        owner_id: &str,
        estimate_id: Uuid,
        costs: &[(Uuid, LineCosts)],
    ) -> Result<(usize, Estimate), AppError> {
        let mut state = self.state.write().await;
        state.require_estimate(owner_id, estimate_id)?;

        let mut changed = Vec::new();
        for (line_item_id, line_costs) in costs {
            let line = state
                .lines
                .get(line_item_id)
                .filter(|l| l.estimate_id == estimate_id)
                .ok_or_else(|| AppError::not_found("Line item"))?;
            if let Some(costs) = pricing::diff_costs(line, line_costs) {
                changed.push((*line_item_id, costs));
            }
        }

        if changed.is_empty() {
            let estimate = state
                .estimates
                .get(&estimate_id)
                .cloned()
                .ok_or_else(|| AppError::not_found("Estimate"))?;
            return Ok((0, estimate));
        }

        let now = Utc::now();
        state.with_rollup(estimate_id, "price_sync", |state| {
            for (line_item_id, line_costs) in &changed {
                let line = state
                    .lines
                    .get_mut(line_item_id)
                    .ok_or_else(|| AppError::not_found("Line item"))?;
                line.set_costs(*line_costs)?;
                line.updated_utc = now;
            }
            Ok(changed.len())
        })
    }

    // -------------------------------------------------------------------------
    // Invoices
    // -------------------------------------------------------------------------

    async fn insert_invoice(&self, owner_id: &str, invoice: &Invoice) -> Result<(), AppError> {
        let mut state = self.state.write().await;
        state.require_project(owner_id, invoice.project_id)?;
        if let Some(estimate_id) = invoice.estimate_id {
            let same_project = state
                .estimates
                .get(&estimate_id)
                .is_some_and(|e| e.project_id == invoice.project_id);
            if !same_project {
                return Err(AppError::bad_request(
                    "estimate_id: estimate does not belong to this project",
                ));
            }
        }
        if state.project_invoice_number_taken(invoice) {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Invoice number '{}' already exists for this project",
                invoice.invoice_number
            )));
        }
        state.invoices.insert(invoice.invoice_id, invoice.clone());
        Ok(())
    }

    async fn get_invoice(
        &self,
        owner_id: &str,
        invoice_id: Uuid,
    ) -> Result<Option<Invoice>, AppError> {
        let state = self.state.read().await;
        Ok(state
            .invoices
            .get(&invoice_id)
            .filter(|i| state.owns_project(owner_id, i.project_id))
            .cloned())
    }

    async fn list_invoices(
        &self,
        owner_id: &str,
        project_id: Uuid,
    ) -> Result<Vec<Invoice>, AppError> {
        let state = self.state.read().await;
        state.require_project(owner_id, project_id)?;
        let mut invoices: Vec<Invoice> = state
            .invoices
            .values()
            .filter(|i| i.project_id == project_id)
            .cloned()
            .collect();
        invoices.sort_by(|a, b| a.invoice_number.cmp(&b.invoice_number));
        Ok(invoices)
    }

    async fn update_invoice(
        &self,
        owner_id: &str,
        invoice_id: Uuid,
        input: UpdateInvoice,
    ) -> Result<Option<Invoice>, AppError> {
        let mut state = self.state.write().await;
        let Some(mut invoice) = state
            .invoices
            .get(&invoice_id)
            .filter(|i| state.owns_project(owner_id, i.project_id))
            .cloned()
        else {
            return Ok(None);
        };
        invoice.apply_update(input)?;
        if state.project_invoice_number_taken(&invoice) {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Invoice number '{}' already exists for this project",
                invoice.invoice_number
            )));
        }
        state.invoices.insert(invoice_id, invoice.clone());
        Ok(Some(invoice))
    }

    async fn delete_invoice(&self, owner_id: &str, invoice_id: Uuid) -> Result<bool, AppError> {
        let mut state = self.state.write().await;
        let owned = state
            .invoices
            .get(&invoice_id)
            .is_some_and(|i| state.owns_project(owner_id, i.project_id));
        if owned {
            state.invoices.remove(&invoice_id);
        }
        Ok(owned)
    }

    // -------------------------------------------------------------------------
    // Time entries
    // -------------------------------------------------------------------------

    async fn insert_time_entry(&self, owner_id: &str, entry: &TimeEntry) -> Result<(), AppError> {
        let mut state = self.state.write().await;
        state.require_project(owner_id, entry.project_id)?;
        state.time_entries.insert(entry.time_entry_id, entry.clone());
        Ok(())
    }

    async fn list_time_entries(
        &self,
        owner_id: &str,
        project_id: Uuid,
    ) -> Result<Vec<TimeEntry>, AppError> {
        let state = self.state.read().await;
        state.require_project(owner_id, project_id)?;
        let mut entries: Vec<TimeEntry> = state
            .time_entries
            .values()
            .filter(|t| t.project_id == project_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| {
            b.entry_date
                .cmp(&a.entry_date)
                .then(b.created_utc.cmp(&a.created_utc))
        });
        Ok(entries)
    }

    async fn update_time_entry(
        &self,
        owner_id: &str,
        time_entry_id: Uuid,
        input: UpdateTimeEntry,
    ) -> Result<Option<TimeEntry>, AppError> {
        let mut state = self.state.write().await;
        let owned = state
            .time_entries
            .get(&time_entry_id)
            .is_some_and(|t| state.owns_project(owner_id, t.project_id));
        if !owned {
            return Ok(None);
        }
        let Some(entry) = state.time_entries.get_mut(&time_entry_id) else {
            return Ok(None);
        };
        entry.apply_update(input);
        Ok(Some(entry.clone()))
    }

    async fn delete_time_entry(
        &self,
        owner_id: &str,
        time_entry_id: Uuid,
    ) -> Result<bool, AppError> {
        let mut state = self.state.write().await;
        let owned = state
            .time_entries
            .get(&time_entry_id)
            .is_some_and(|t| state.owns_project(owner_id, t.project_id));
        if owned {
            state.time_entries.remove(&time_entry_id);
        }
        Ok(owned)
    }

    // -------------------------------------------------------------------------
    // Milestones
    // -------------------------------------------------------------------------

    async fn insert_milestone(&self, owner_id: &str, milestone: &Milestone) -> Result<(), AppError> {
        let mut state = self.state.write().await;
        state.require_project(owner_id, milestone.project_id)?;
        state.milestones.insert(milestone.milestone_id, milestone.clone());
        Ok(())
    }

    async fn list_milestones(
        &self,
        owner_id: &str,
        project_id: Uuid,
    ) -> Result<Vec<Milestone>, AppError> {
        let state = self.state.read().await;
        state.require_project(owner_id, project_id)?;
        let mut milestones: Vec<Milestone> = state
            .milestones
            .values()
            .filter(|m| m.project_id == project_id)
            .cloned()
            .collect();
        milestones.sort_by_key(|m| (m.sort_order, m.created_utc));
        Ok(milestones)
    }

    async fn update_milestone(
        &self,
        owner_id: &str,
        milestone_id: Uuid,
        input: UpdateMilestone,
    ) -> Result<Option<Milestone>, AppError> {
        let mut state = self.state.write().await;
        let owned = state
            .milestones
            .get(&milestone_id)
            .is_some_and(|m| state.owns_project(owner_id, m.project_id));
        if !owned {
            return Ok(None);
        }
        let Some(milestone) = state.milestones.get_mut(&milestone_id) else {
            return Ok(None);
        };
        milestone.apply_update(input);
        Ok(Some(milestone.clone()))
    }

    async fn delete_milestone(&self, owner_id: &str, milestone_id: Uuid) -> Result<bool, AppError> {
        let mut state = self.state.write().await;
        let owned = state
            .milestones
            .get(&milestone_id)
            .is_some_and(|m| state.owns_project(owner_id, m.project_id));
        if owned {
            state.milestones.remove(&milestone_id);
        }
        Ok(owned)
    }

    // -------------------------------------------------------------------------
    // Purchase orders
    // -------------------------------------------------------------------------

    async fn insert_purchase_order(
        &self,
        owner_id: &str,
        order: &PurchaseOrder,
    ) -> Result<(), AppError> {
        let mut state = self.state.write().await;
        state.require_project(owner_id, order.project_id)?;
        state
            .purchase_orders
            .insert(order.purchase_order_id, order.clone());
        Ok(())
    }

    async fn list_purchase_orders(
        &self,
        owner_id: &str,
        project_id: Uuid,
    ) -> Result<Vec<PurchaseOrder>, AppError> {
        let state = self.state.read().await;
        state.require_project(owner_id, project_id)?;
        let mut orders: Vec<PurchaseOrder> = state
            .purchase_orders
            .values()
            .filter(|p| p.project_id == project_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| a.order_number.cmp(&b.order_number));
        Ok(orders)
    }

    async fn update_purchase_order(
        &self,
        owner_id: &str,
        purchase_order_id: Uuid,
        input: UpdatePurchaseOrder,
    ) -> Result<Option<PurchaseOrder>, AppError> {
        let mut state = self.state.write().await;
        let owned = state
            .purchase_orders
            .get(&purchase_order_id)
            .is_some_and(|p| state.owns_project(owner_id, p.project_id));
        if !owned {
            return Ok(None);
        }
        let Some(order) = state.purchase_orders.get_mut(&purchase_order_id) else {
            return Ok(None);
        };
        order.apply_update(input);
        Ok(Some(order.clone()))
    }

    async fn delete_purchase_order(
        &self,
        owner_id: &str,
        purchase_order_id: Uuid,
    ) -> Result<bool, AppError> {
        let mut state = self.state.write().await;
        let owned = state
            .purchase_orders
            .get(&purchase_order_id)
            .is_some_and(|p| state.owns_project(owner_id, p.project_id));
        if owned {
            state.purchase_orders.remove(&purchase_order_id);
        }
        Ok(owned)
    }
}
