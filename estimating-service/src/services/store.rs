//! Persistence seam for estimating-service.
//!
//! Every method is scoped by `owner_id`: rows that exist but belong to
//! another owner behave exactly like missing rows. Methods returning
//! `Option`/`bool` report absence that way; methods that mutate an
//! estimate's lines return `AppError::NotFound` instead.
//!
//! Inserting a child whose parent is missing or foreign fails with
//! `AppError::NotFound`.
//!
//! Line and markup mutations are atomic with the estimate rollup: the
//! implementation locks the estimate, applies the change, recomputes the
//! totals and chapter subtotals and bumps `row_version` before anyone else
//! can touch the same estimate.

use async_trait::async_trait;
use service_core::error::AppError;
use uuid::Uuid;

use crate::models::{
    Chapter, Client, CostLibrary, Estimate, EstimateTree, Invoice, LibraryItem, LineCosts,
    LineDraft, LineItem, Milestone, Project, PurchaseOrder, TimeEntry, UpdateChapter,
    UpdateClient, UpdateEstimate, UpdateInvoice, UpdateLibraryItem, UpdateLineItem,
    UpdateMilestone, UpdateProject, UpdatePurchaseOrder, UpdateTimeEntry,
};

#[async_trait]
pub trait EstimatingStore: Send + Sync {
    async fn health_check(&self) -> Result<(), AppError>;

    // Clients
    async fn insert_client(&self, client: &Client) -> Result<(), AppError>;
    async fn get_client(&self, owner_id: &str, client_id: Uuid)
        -> Result<Option<Client>, AppError>;
    async fn list_clients(&self, owner_id: &str) -> Result<Vec<Client>, AppError>;
    async fn update_client(
        &self,
        owner_id: &str,
        client_id: Uuid,
        input: UpdateClient,
    ) -> Result<Option<Client>, AppError>;
    async fn delete_client(&self, owner_id: &str, client_id: Uuid) -> Result<bool, AppError>;

    // Projects
    async fn insert_project(&self, project: &Project) -> Result<(), AppError>;
    async fn get_project(
        &self,
        owner_id: &str,
        project_id: Uuid,
    ) -> Result<Option<Project>, AppError>;
    async fn list_projects(&self, owner_id: &str) -> Result<Vec<Project>, AppError>;
    async fn update_project(
        &self,
        owner_id: &str,
        project_id: Uuid,
        input: UpdateProject,
    ) -> Result<Option<Project>, AppError>;
    async fn delete_project(&self, owner_id: &str, project_id: Uuid) -> Result<bool, AppError>;

    // Cost libraries
    async fn insert_library(&self, library: &CostLibrary) -> Result<(), AppError>;
    async fn get_library(
        &self,
        owner_id: &str,
        library_id: Uuid,
    ) -> Result<Option<CostLibrary>, AppError>;
    async fn list_libraries(&self, owner_id: &str) -> Result<Vec<CostLibrary>, AppError>;
    async fn delete_library(&self, owner_id: &str, library_id: Uuid) -> Result<bool, AppError>;

    // Library items
    async fn insert_library_item(&self, owner_id: &str, item: &LibraryItem)
        -> Result<(), AppError>;
    async fn get_library_item(
        &self,
        owner_id: &str,
        library_item_id: Uuid,
    ) -> Result<Option<LibraryItem>, AppError>;
    /// Items of one library, optionally filtered by a case-insensitive
    /// match on code or description, ordered by code.
    async fn list_library_items(
        &self,
        owner_id: &str,
        library_id: Uuid,
        search: Option<&str>,
    ) -> Result<Vec<LibraryItem>, AppError>;
    async fn update_library_item(
        &self,
        owner_id: &str,
        library_item_id: Uuid,
        input: UpdateLibraryItem,
    ) -> Result<Option<LibraryItem>, AppError>;
    async fn delete_library_item(
        &self,
        owner_id: &str,
        library_item_id: Uuid,
    ) -> Result<bool, AppError>;

    // Estimates
    async fn insert_estimate(&self, owner_id: &str, estimate: &Estimate) -> Result<(), AppError>;
    async fn get_estimate(
        &self,
        owner_id: &str,
        estimate_id: Uuid,
    ) -> Result<Option<Estimate>, AppError>;
    async fn list_estimates(
        &self,
        owner_id: &str,
        project_id: Uuid,
    ) -> Result<Vec<Estimate>, AppError>;
    async fn get_estimate_tree(
        &self,
        owner_id: &str,
        estimate_id: Uuid,
    ) -> Result<Option<EstimateTree>, AppError>;
    /// Apply descriptive/markup changes and roll up. Fails with `Conflict`
    /// when `expected_version` is set and stale.
    async fn update_estimate(
        &self,
        owner_id: &str,
        estimate_id: Uuid,
        input: &UpdateEstimate,
    ) -> Result<Estimate, AppError>;
    async fn delete_estimate(&self, owner_id: &str, estimate_id: Uuid) -> Result<bool, AppError>;
    /// Recompute and persist totals from the stored lines.
    async fn recalculate_estimate(
        &self,
        owner_id: &str,
        estimate_id: Uuid,
    ) -> Result<Estimate, AppError>;
    /// Insert a complete copied tree as-is; no rollup.
    async fn insert_estimate_tree(
        &self,
        owner_id: &str,
        tree: &EstimateTree,
    ) -> Result<(), AppError>;

    // Chapters
    async fn insert_chapter(&self, owner_id: &str, chapter: &Chapter) -> Result<(), AppError>;
    async fn update_chapter(
        &self,
        owner_id: &str,
        chapter_id: Uuid,
        input: UpdateChapter,
    ) -> Result<Option<Chapter>, AppError>;
    /// Delete a chapter and its lines, then roll up.
    async fn delete_chapter(
        &self,
        owner_id: &str,
        chapter_id: Uuid,
    ) -> Result<Option<Estimate>, AppError>;

    // Lines
    async fn get_line(
        &self,
        owner_id: &str,
        line_item_id: Uuid,
    ) -> Result<Option<LineItem>, AppError>;
    /// Insert one or more lines and roll up once.
    async fn insert_lines(
        &self,
        owner_id: &str,
        estimate_id: Uuid,
        drafts: Vec<LineDraft>,
    ) -> Result<(Vec<LineItem>, Estimate), AppError>;
    async fn update_line(
        &self,
        owner_id: &str,
        line_item_id: Uuid,
        input: &UpdateLineItem,
    ) -> Result<(LineItem, Estimate), AppError>;
    async fn delete_line(&self, owner_id: &str, line_item_id: Uuid)
        -> Result<Estimate, AppError>;
    /// Bring several lines to the given cost inputs under the estimate lock.
    ///
    /// Lines are compared against `costs` after locking; only those that
    /// differ are written. Returns how many changed and the estimate, rolled
    /// up once when that count is non-zero. An unknown line fails the whole
    /// call without changing anything.
    async fn apply_line_costs(
        &self,
        owner_id: &str,
        estimate_id: Uuid,
        costs: &[(Uuid, LineCosts)],
    ) -> Result<(usize, Estimate), AppError>;

    // Invoices
    async fn insert_invoice(&self, owner_id: &str, invoice: &Invoice) -> Result<(), AppError>;
    async fn get_invoice(
        &self,
        owner_id: &str,
        invoice_id: Uuid,
    ) -> Result<Option<Invoice>, AppError>;
    async fn list_invoices(
        &self,
        owner_id: &str,
        project_id: Uuid,
    ) -> Result<Vec<Invoice>, AppError>;
    async fn update_invoice(
        &self,
        owner_id: &str,
        invoice_id: Uuid,
        input: UpdateInvoice,
    ) -> Result<Option<Invoice>, AppError>;
    async fn delete_invoice(&self, owner_id: &str, invoice_id: Uuid) -> Result<bool, AppError>;

    // Time entries
    async fn insert_time_entry(&self, owner_id: &str, entry: &TimeEntry) -> Result<(), AppError>;
    async fn list_time_entries(
        &self,
        owner_id: &str,
        project_id: Uuid,
    ) -> Result<Vec<TimeEntry>, AppError>;
    async fn update_time_entry(
        &self,
        owner_id: &str,
        time_entry_id: Uuid,
        input: UpdateTimeEntry,
    ) -> Result<Option<TimeEntry>, AppError>;
    async fn delete_time_entry(
        &self,
        owner_id: &str,
        time_entry_id: Uuid,
    ) -> Result<bool, AppError>;

    // Milestones
    async fn insert_milestone(
        &self,
        owner_id: &str,
        milestone: &Milestone,
    ) -> Result<(), AppError>;
    async fn list_milestones(
        &self,
        owner_id: &str,
        project_id: Uuid,
    ) -> Result<Vec<Milestone>, AppError>;
    async fn update_milestone(
        &self,
        owner_id: &str,
        milestone_id: Uuid,
        input: UpdateMilestone,
    ) -> Result<Option<Milestone>, AppError>;
    async fn delete_milestone(&self, owner_id: &str, milestone_id: Uuid)
        -> Result<bool, AppError>;

    // Purchase orders
    async fn insert_purchase_order(
        &self,
        owner_id: &str,
        order: &PurchaseOrder,
    ) -> Result<(), AppError>;
    async fn list_purchase_orders(
        &self,
        owner_id: &str,
        project_id: Uuid,
    ) -> Result<Vec<PurchaseOrder>, AppError>;
    async fn update_purchase_order(
        &self,
        owner_id: &str,
        purchase_order_id: Uuid,
        input: UpdatePurchaseOrder,
    ) -> Result<Option<PurchaseOrder>, AppError>;
    async fn delete_purchase_order(
        &self,
        owner_id: &str,
        purchase_order_id: Uuid,
    ) -> Result<bool, AppError>;
}
