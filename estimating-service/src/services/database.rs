//! PostgreSQL store for estimating-service.

use async_trait::async_trait;
use chrono::Utc;
use service_core::error::AppError;
use sqlx::postgres::{PgConnection, PgExecutor, PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::models::{
    Chapter, Client, CostLibrary, Estimate, EstimateTree, Invoice, LibraryItem, LineCosts,
    LineDraft, LineItem, Milestone, Project, PurchaseOrder, TimeEntry, UpdateChapter,
    UpdateClient, UpdateEstimate, UpdateInvoice, UpdateLibraryItem, UpdateLineItem,
    UpdateMilestone, UpdateProject, UpdatePurchaseOrder, UpdateTimeEntry,
};
use crate::services::metrics::{DB_QUERY_DURATION, ROLLUPS_TOTAL};
use crate::services::{pricing, rollup};
use crate::services::store::EstimatingStore;

const OWNED_CLIENT: &str =
    "SELECT EXISTS(SELECT 1 FROM clients WHERE client_id = $1 AND owner_id = $2)";
const OWNED_PROJECT: &str =
    "SELECT EXISTS(SELECT 1 FROM projects WHERE project_id = $1 AND owner_id = $2)";
const OWNED_LIBRARY: &str =
    "SELECT EXISTS(SELECT 1 FROM cost_libraries WHERE library_id = $1 AND owner_id = $2)";
const OWNED_ESTIMATE: &str = r#"
    SELECT EXISTS(
        SELECT 1 FROM estimates e
        JOIN projects p ON p.project_id = e.project_id
        WHERE e.estimate_id = $1 AND p.owner_id = $2
    )"#;

fn db_error(action: &str, e: sqlx::Error) -> AppError {
    match e {
        sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
            AppError::Conflict(anyhow::anyhow!("Failed to {}: duplicate value", action))
        }
        _ => AppError::DatabaseError(anyhow::anyhow!("Failed to {}: {}", action, e)),
    }
}

async fn owns<'e, E: PgExecutor<'e>>(
    executor: E,
    query: &str,
    id: Uuid,
    owner_id: &str,
) -> Result<bool, AppError> {
    sqlx::query_scalar::<_, bool>(query)
        .bind(id)
        .bind(owner_id)
        .fetch_one(executor)
        .await
        .map_err(|e| db_error("check ownership", e))
}

/// Lock an owned estimate row for the rest of the transaction.
async fn lock_estimate(
    conn: &mut PgConnection,
    owner_id: &str,
    estimate_id: Uuid,
) -> Result<Estimate, AppError> {
    sqlx::query_as::<_, Estimate>(
        r#"
        SELECT e.* FROM estimates e
        JOIN projects p ON p.project_id = e.project_id
        WHERE e.estimate_id = $1 AND p.owner_id = $2
        FOR UPDATE OF e
        "#,
    )
    .bind(estimate_id)
    .bind(owner_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| db_error("lock estimate", e))?
    .ok_or_else(|| AppError::not_found("Estimate"))
}

async fn require_chapter_in(
    conn: &mut PgConnection,
    estimate_id: Uuid,
    chapter_id: Option<Uuid>,
) -> Result<(), AppError> {
    let Some(chapter_id) = chapter_id else {
        return Ok(());
    };
    let found = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM chapters WHERE chapter_id = $1 AND estimate_id = $2)",
    )
    .bind(chapter_id)
    .bind(estimate_id)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| db_error("check chapter", e))?;
    if found {
        Ok(())
    } else {
        Err(AppError::bad_request(
            "chapter_id: chapter does not belong to this estimate",
        ))
    }
}

async fn write_estimate<'e, E: PgExecutor<'e>>(
    executor: E,
    estimate: &Estimate,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        UPDATE estimates
        SET name = $2, description = $3, version = $4, status = $5, valid_until = $6, notes = $7,
            general_costs_percent = $8, profit_percent = $9, risk_percent = $10, vat_percent = $11,
            total_labor = $12, total_material = $13, total_equipment = $14, total_subcontr = $15,
            subtotal = $16, general_costs_amount = $17, profit_amount = $18, risk_amount = $19,
            total_excl_vat = $20, vat_amount = $21, total_incl_vat = $22,
            row_version = $23, updated_utc = $24
        WHERE estimate_id = $1
        "#,
    )
    .bind(estimate.estimate_id)
    .bind(&estimate.name)
    .bind(&estimate.description)
    .bind(estimate.version)
    .bind(&estimate.status)
    .bind(estimate.valid_until)
    .bind(&estimate.notes)
    .bind(estimate.general_costs_percent)
    .bind(estimate.profit_percent)
    .bind(estimate.risk_percent)
    .bind(estimate.vat_percent)
    .bind(estimate.total_labor)
    .bind(estimate.total_material)
    .bind(estimate.total_equipment)
    .bind(estimate.total_subcontr)
    .bind(estimate.subtotal)
    .bind(estimate.general_costs_amount)
    .bind(estimate.profit_amount)
    .bind(estimate.risk_amount)
    .bind(estimate.total_excl_vat)
    .bind(estimate.vat_amount)
    .bind(estimate.total_incl_vat)
    .bind(estimate.row_version)
    .bind(estimate.updated_utc)
    .execute(executor)
    .await
    .map_err(|e| db_error("update estimate", e))?;
    Ok(())
}

async fn insert_estimate_row<'e, E: PgExecutor<'e>>(
    executor: E,
    estimate: &Estimate,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO estimates (
            estimate_id, project_id, name, description, version, status, valid_until, notes,
            general_costs_percent, profit_percent, risk_percent, vat_percent,
            total_labor, total_material, total_equipment, total_subcontr, subtotal,
            general_costs_amount, profit_amount, risk_amount, total_excl_vat, vat_amount,
            total_incl_vat, row_version, created_utc, updated_utc
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17,
                $18, $19, $20, $21, $22, $23, $24, $25, $26)
        "#,
    )
    .bind(estimate.estimate_id)
    .bind(estimate.project_id)
    .bind(&estimate.name)
    .bind(&estimate.description)
    .bind(estimate.version)
    .bind(&estimate.status)
    .bind(estimate.valid_until)
    .bind(&estimate.notes)
    .bind(estimate.general_costs_percent)
    .bind(estimate.profit_percent)
    .bind(estimate.risk_percent)
    .bind(estimate.vat_percent)
    .bind(estimate.total_labor)
    .bind(estimate.total_material)
    .bind(estimate.total_equipment)
    .bind(estimate.total_subcontr)
    .bind(estimate.subtotal)
    .bind(estimate.general_costs_amount)
    .bind(estimate.profit_amount)
    .bind(estimate.risk_amount)
    .bind(estimate.total_excl_vat)
    .bind(estimate.vat_amount)
    .bind(estimate.total_incl_vat)
    .bind(estimate.row_version)
    .bind(estimate.created_utc)
    .bind(estimate.updated_utc)
    .execute(executor)
    .await
    .map_err(|e| db_error("insert estimate", e))?;
    Ok(())
}

async fn insert_chapter_row<'e, E: PgExecutor<'e>>(
    executor: E,
    chapter: &Chapter,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO chapters (chapter_id, estimate_id, code, name, sort_order, subtotal, created_utc)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(chapter.chapter_id)
    .bind(chapter.estimate_id)
    .bind(&chapter.code)
    .bind(&chapter.name)
    .bind(chapter.sort_order)
    .bind(chapter.subtotal)
    .bind(chapter.created_utc)
    .execute(executor)
    .await
    .map_err(|e| db_error("insert chapter", e))?;
    Ok(())
}

async fn insert_line_row<'e, E: PgExecutor<'e>>(
    executor: E,
    line: &LineItem,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO line_items (
            line_item_id, estimate_id, chapter_id, library_item_id, code, description, quantity,
            unit, labor_hours, labor_rate, labor_cost, material_cost, equipment_cost,
            subcontr_cost, unit_price, total_price, sort_order, created_utc, updated_utc
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
        "#,
    )
    .bind(line.line_item_id)
    .bind(line.estimate_id)
    .bind(line.chapter_id)
    .bind(line.library_item_id)
    .bind(&line.code)
    .bind(&line.description)
    .bind(line.quantity)
    .bind(&line.unit)
    .bind(line.labor_hours)
    .bind(line.labor_rate)
    .bind(line.labor_cost)
    .bind(line.material_cost)
    .bind(line.equipment_cost)
    .bind(line.subcontr_cost)
    .bind(line.unit_price)
    .bind(line.total_price)
    .bind(line.sort_order)
    .bind(line.created_utc)
    .bind(line.updated_utc)
    .execute(executor)
    .await
    .map_err(|e| db_error("insert line item", e))?;
    Ok(())
}

async fn write_line<'e, E: PgExecutor<'e>>(executor: E, line: &LineItem) -> Result<(), AppError> {
    sqlx::query(
        r#"
        UPDATE line_items
        SET chapter_id = $2, code = $3, description = $4, quantity = $5, unit = $6,
            labor_hours = $7, labor_rate = $8, labor_cost = $9, material_cost = $10,
            equipment_cost = $11, subcontr_cost = $12, unit_price = $13, total_price = $14,
            sort_order = $15, updated_utc = $16
        WHERE line_item_id = $1
        "#,
    )
    .bind(line.line_item_id)
    .bind(line.chapter_id)
    .bind(&line.code)
    .bind(&line.description)
    .bind(line.quantity)
    .bind(&line.unit)
    .bind(line.labor_hours)
    .bind(line.labor_rate)
    .bind(line.labor_cost)
    .bind(line.material_cost)
    .bind(line.equipment_cost)
    .bind(line.subcontr_cost)
    .bind(line.unit_price)
    .bind(line.total_price)
    .bind(line.sort_order)
    .bind(line.updated_utc)
    .execute(executor)
    .await
    .map_err(|e| db_error("update line item", e))?;
    Ok(())
}

/// Recompute totals and chapter subtotals of a locked estimate from its
/// stored lines and bump its row version.
async fn roll_up(
    conn: &mut PgConnection,
    mut estimate: Estimate,
    trigger: &str,
) -> Result<Estimate, AppError> {
    let lines = sqlx::query_as::<_, LineItem>("SELECT * FROM line_items WHERE estimate_id = $1")
        .bind(estimate.estimate_id)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| db_error("load line items", e))?;
    let mut chapters =
        sqlx::query_as::<_, Chapter>("SELECT * FROM chapters WHERE estimate_id = $1")
            .bind(estimate.estimate_id)
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| db_error("load chapters", e))?;

    rollup::apply(&mut estimate, &mut chapters, &lines)?;
    estimate.row_version += 1;
    estimate.updated_utc = Utc::now();

    for chapter in &chapters {
        sqlx::query("UPDATE chapters SET subtotal = $2 WHERE chapter_id = $1")
            .bind(chapter.chapter_id)
            .bind(chapter.subtotal)
            .execute(&mut *conn)
            .await
            .map_err(|e| db_error("update chapter subtotal", e))?;
    }
    write_estimate(&mut *conn, &estimate).await?;

    ROLLUPS_TOTAL.with_label_values(&[trigger]).inc();
    Ok(estimate)
}

fn like_pattern(search: &str) -> String {
    let escaped = search
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "estimating-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    async fn begin(&self) -> Result<sqlx::Transaction<'static, sqlx::Postgres>, AppError> {
        self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })
    }

    async fn require_owned(
        &self,
        query: &str,
        id: Uuid,
        owner_id: &str,
        what: &str,
    ) -> Result<(), AppError> {
        if owns(&self.pool, query, id, owner_id).await? {
            Ok(())
        } else {
            Err(AppError::not_found(what))
        }
    }
}

async fn commit(tx: sqlx::Transaction<'_, sqlx::Postgres>) -> Result<(), AppError> {
    tx.commit().await.map_err(|e| {
        AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
    })
}

#[async_trait]
impl EstimatingStore for Database {
    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Client Operations
    // -------------------------------------------------------------------------

    #[instrument(skip(self, client), fields(owner_id = %client.owner_id))]
    async fn insert_client(&self, client: &Client) -> Result<(), AppError> {
        let _timer = DB_QUERY_DURATION
            .with_label_values(&["insert_client"])
            .start_timer();

        sqlx::query(
            r#"
            INSERT INTO clients (
                client_id, owner_id, name, contact_person, email, phone, address, postal_code,
                city, kvk_number, vat_number, notes, created_utc, updated_utc
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(client.client_id)
        .bind(&client.owner_id)
        .bind(&client.name)
        .bind(&client.contact_person)
        .bind(&client.email)
        .bind(&client.phone)
        .bind(&client.address)
        .bind(&client.postal_code)
        .bind(&client.city)
        .bind(&client.kvk_number)
        .bind(&client.vat_number)
        .bind(&client.notes)
        .bind(client.created_utc)
        .bind(client.updated_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("create client", e))?;

        info!(client_id = %client.client_id, "Client created");
        Ok(())
    }

    #[instrument(skip(self), fields(owner_id = %owner_id, client_id = %client_id))]
    async fn get_client(&self, owner_id: &str, client_id: Uuid) -> Result<Option<Client>, AppError> {
        let _timer = DB_QUERY_DURATION
            .with_label_values(&["get_client"])
            .start_timer();

        sqlx::query_as::<_, Client>("SELECT * FROM clients WHERE client_id = $1 AND owner_id = $2")
            .bind(client_id)
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("get client", e))
    }

    #[instrument(skip(self), fields(owner_id = %owner_id))]
    async fn list_clients(&self, owner_id: &str) -> Result<Vec<Client>, AppError> {
        let _timer = DB_QUERY_DURATION
            .with_label_values(&["list_clients"])
            .start_timer();

        sqlx::query_as::<_, Client>("SELECT * FROM clients WHERE owner_id = $1 ORDER BY name")
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("list clients", e))
    }

    #[instrument(skip(self, input), fields(owner_id = %owner_id, client_id = %client_id))]
    async fn update_client(
        &self,
        owner_id: &str,
        client_id: Uuid,
        input: UpdateClient,
    ) -> Result<Option<Client>, AppError> {
        let _timer = DB_QUERY_DURATION
            .with_label_values(&["update_client"])
            .start_timer();

        let Some(mut client) = self.get_client(owner_id, client_id).await? else {
            return Ok(None);
        };
        client.apply_update(input);

        sqlx::query(
            r#"
            UPDATE clients
            SET name = $2, contact_person = $3, email = $4, phone = $5, address = $6,
                postal_code = $7, city = $8, kvk_number = $9, vat_number = $10, notes = $11,
                updated_utc = $12
            WHERE client_id = $1
            "#,
        )
        .bind(client.client_id)
        .bind(&client.name)
        .bind(&client.contact_person)
        .bind(&client.email)
        .bind(&client.phone)
        .bind(&client.address)
        .bind(&client.postal_code)
        .bind(&client.city)
        .bind(&client.kvk_number)
        .bind(&client.vat_number)
        .bind(&client.notes)
        .bind(client.updated_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("update client", e))?;

        Ok(Some(client))
    }

    #[instrument(skip(self), fields(owner_id = %owner_id, client_id = %client_id))]
    async fn delete_client(&self, owner_id: &str, client_id: Uuid) -> Result<bool, AppError> {
        let _timer = DB_QUERY_DURATION
            .with_label_values(&["delete_client"])
            .start_timer();

        let result = sqlx::query("DELETE FROM clients WHERE client_id = $1 AND owner_id = $2")
            .bind(client_id)
            .bind(owner_id)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("delete client", e))?;
        Ok(result.rows_affected() > 0)
    }

    // -------------------------------------------------------------------------
    // Project Operations
    // -------------------------------------------------------------------------

    #[instrument(skip(self, project), fields(owner_id = %project.owner_id))]
    async fn insert_project(&self, project: &Project) -> Result<(), AppError> {
        let _timer = DB_QUERY_DURATION
            .with_label_values(&["insert_project"])
            .start_timer();

        if let Some(client_id) = project.client_id {
            self.require_owned(OWNED_CLIENT, client_id, &project.owner_id, "Client")
                .await?;
        }

        sqlx::query(
            r#"
            INSERT INTO projects (
                project_id, owner_id, client_id, project_number, name, description, address,
                city, status, start_date, end_date, created_utc, updated_utc
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(project.project_id)
        .bind(&project.owner_id)
        .bind(project.client_id)
        .bind(&project.project_number)
        .bind(&project.name)
        .bind(&project.description)
        .bind(&project.address)
        .bind(&project.city)
        .bind(&project.status)
        .bind(project.start_date)
        .bind(project.end_date)
        .bind(project.created_utc)
        .bind(project.updated_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("create project", e))?;

        info!(project_id = %project.project_id, "Project created");
        Ok(())
    }

    #[instrument(skip(self), fields(owner_id = %owner_id, project_id = %project_id))]
    async fn get_project(
        &self,
        owner_id: &str,
        project_id: Uuid,
    ) -> Result<Option<Project>, AppError> {
        let _timer = DB_QUERY_DURATION
            .with_label_values(&["get_project"])
            .start_timer();

        sqlx::query_as::<_, Project>(
            "SELECT * FROM projects WHERE project_id = $1 AND owner_id = $2",
        )
        .bind(project_id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("get project", e))
    }

    #[instrument(skip(self), fields(owner_id = %owner_id))]
    async fn list_projects(&self, owner_id: &str) -> Result<Vec<Project>, AppError> {
        let _timer = DB_QUERY_DURATION
            .with_label_values(&["list_projects"])
            .start_timer();

        sqlx::query_as::<_, Project>(
            "SELECT * FROM projects WHERE owner_id = $1 ORDER BY created_utc DESC",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("list projects", e))
    }

    #[instrument(skip(self, input), fields(owner_id = %owner_id, project_id = %project_id))]
    async fn update_project(
        &self,
        owner_id: &str,
        project_id: Uuid,
        input: UpdateProject,
    ) -> Result<Option<Project>, AppError> {
        let _timer = DB_QUERY_DURATION
            .with_label_values(&["update_project"])
            .start_timer();

        let Some(mut project) = self.get_project(owner_id, project_id).await? else {
            return Ok(None);
        };
        if let Some(client_id) = input.client_id.flatten() {
            self.require_owned(OWNED_CLIENT, client_id, owner_id, "Client")
                .await?;
        }
        project.apply_update(input);

        sqlx::query(
            r#"
            UPDATE projects
            SET client_id = $2, project_number = $3, name = $4, description = $5, address = $6,
                city = $7, status = $8, start_date = $9, end_date = $10, updated_utc = $11
            WHERE project_id = $1
            "#,
        )
        .bind(project.project_id)
        .bind(project.client_id)
        .bind(&project.project_number)
        .bind(&project.name)
        .bind(&project.description)
        .bind(&project.address)
        .bind(&project.city)
        .bind(&project.status)
        .bind(project.start_date)
        .bind(project.end_date)
        .bind(project.updated_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("update project", e))?;

        Ok(Some(project))
    }

    #[instrument(skip(self), fields(owner_id = %owner_id, project_id = %project_id))]
    async fn delete_project(&self, owner_id: &str, project_id: Uuid) -> Result<bool, AppError> {
        let _timer = DB_QUERY_DURATION
            .with_label_values(&["delete_project"])
            .start_timer();

        let result = sqlx::query("DELETE FROM projects WHERE project_id = $1 AND owner_id = $2")
            .bind(project_id)
            .bind(owner_id)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("delete project", e))?;
        Ok(result.rows_affected() > 0)
    }

    // -------------------------------------------------------------------------
    // Cost Library Operations
    // -------------------------------------------------------------------------

    #[instrument(skip(self, library), fields(owner_id = %library.owner_id))]
    async fn insert_library(&self, library: &CostLibrary) -> Result<(), AppError> {
        let _timer = DB_QUERY_DURATION
            .with_label_values(&["insert_library"])
            .start_timer();

        sqlx::query(
            r#"
            INSERT INTO cost_libraries (library_id, owner_id, name, standard, description, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(library.library_id)
        .bind(&library.owner_id)
        .bind(&library.name)
        .bind(&library.standard)
        .bind(&library.description)
        .bind(library.created_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("create cost library", e))?;

        info!(library_id = %library.library_id, "Cost library created");
        Ok(())
    }

    #[instrument(skip(self), fields(owner_id = %owner_id, library_id = %library_id))]
    async fn get_library(
        &self,
        owner_id: &str,
        library_id: Uuid,
    ) -> Result<Option<CostLibrary>, AppError> {
        let _timer = DB_QUERY_DURATION
            .with_label_values(&["get_library"])
            .start_timer();

        sqlx::query_as::<_, CostLibrary>(
            "SELECT * FROM cost_libraries WHERE library_id = $1 AND owner_id = $2",
        )
        .bind(library_id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("get cost library", e))
    }

    #[instrument(skip(self), fields(owner_id = %owner_id))]
    async fn list_libraries(&self, owner_id: &str) -> Result<Vec<CostLibrary>, AppError> {
        let _timer = DB_QUERY_DURATION
            .with_label_values(&["list_libraries"])
            .start_timer();

        sqlx::query_as::<_, CostLibrary>(
            "SELECT * FROM cost_libraries WHERE owner_id = $1 ORDER BY name",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("list cost libraries", e))
    }

    #[instrument(skip(self), fields(owner_id = %owner_id, library_id = %library_id))]
    async fn delete_library(&self, owner_id: &str, library_id: Uuid) -> Result<bool, AppError> {
        let _timer = DB_QUERY_DURATION
            .with_label_values(&["delete_library"])
            .start_timer();

        let result =
            sqlx::query("DELETE FROM cost_libraries WHERE library_id = $1 AND owner_id = $2")
                .bind(library_id)
                .bind(owner_id)
                .execute(&self.pool)
                .await
                .map_err(|e| db_error("delete cost library", e))?;
        Ok(result.rows_affected() > 0)
    }

    // -------------------------------------------------------------------------
    // Library Item Operations
    // -------------------------------------------------------------------------

    #[instrument(skip(self, item), fields(owner_id = %owner_id, library_id = %item.library_id))]
    async fn insert_library_item(&self, owner_id: &str, item: &LibraryItem) -> Result<(), AppError> {
        let _timer = DB_QUERY_DURATION
            .with_label_values(&["insert_library_item"])
            .start_timer();

        self.require_owned(OWNED_LIBRARY, item.library_id, owner_id, "Library")
            .await?;

        sqlx::query(
            r#"
            INSERT INTO library_items (
                library_item_id, library_id, code, description, unit, category, labor_hours,
                labor_rate, material_cost, equipment_cost, subcontr_cost, unit_price,
                created_utc, updated_utc
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(item.library_item_id)
        .bind(item.library_id)
        .bind(&item.code)
        .bind(&item.description)
        .bind(&item.unit)
        .bind(&item.category)
        .bind(item.labor_hours)
        .bind(item.labor_rate)
        .bind(item.material_cost)
        .bind(item.equipment_cost)
        .bind(item.subcontr_cost)
        .bind(item.unit_price)
        .bind(item.created_utc)
        .bind(item.updated_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("create library item", e))?;

        Ok(())
    }

    #[instrument(skip(self), fields(owner_id = %owner_id, library_item_id = %library_item_id))]
    async fn get_library_item(
        &self,
        owner_id: &str,
        library_item_id: Uuid,
    ) -> Result<Option<LibraryItem>, AppError> {
        let _timer = DB_QUERY_DURATION
            .with_label_values(&["get_library_item"])
            .start_timer();

        sqlx::query_as::<_, LibraryItem>(
            r#"
            SELECT i.* FROM library_items i
            JOIN cost_libraries l ON l.library_id = i.library_id
            WHERE i.library_item_id = $1 AND l.owner_id = $2
            "#,
        )
        .bind(library_item_id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("get library item", e))
    }

    #[instrument(skip(self), fields(owner_id = %owner_id, library_id = %library_id))]
    async fn list_library_items(
        &self,
        owner_id: &str,
        library_id: Uuid,
        search: Option<&str>,
    ) -> Result<Vec<LibraryItem>, AppError> {
        let _timer = DB_QUERY_DURATION
            .with_label_values(&["list_library_items"])
            .start_timer();

        self.require_owned(OWNED_LIBRARY, library_id, owner_id, "Library")
            .await?;

        sqlx::query_as::<_, LibraryItem>(
            r#"
            SELECT * FROM library_items
            WHERE library_id = $1
              AND ($2::text IS NULL OR code ILIKE $2 OR description ILIKE $2)
            ORDER BY code
            "#,
        )
        .bind(library_id)
        .bind(search.map(like_pattern))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("list library items", e))
    }

    #[instrument(skip(self, input), fields(owner_id = %owner_id, library_item_id = %library_item_id))]
    async fn update_library_item(
        &self,
        owner_id: &str,
        library_item_id: Uuid,
        input: UpdateLibraryItem,
    ) -> Result<Option<LibraryItem>, AppError> {
        let _timer = DB_QUERY_DURATION
            .with_label_values(&["update_library_item"])
            .start_timer();

        let Some(mut item) = self.get_library_item(owner_id, library_item_id).await? else {
            return Ok(None);
        };
        item.apply_update(input)?;

        sqlx::query(
            r#"
            UPDATE library_items
            SET code = $2, description = $3, unit = $4, category = $5, labor_hours = $6,
                labor_rate = $7, material_cost = $8, equipment_cost = $9, subcontr_cost = $10,
                unit_price = $11, updated_utc = $12
            WHERE library_item_id = $1
            "#,
        )
        .bind(item.library_item_id)
        .bind(&item.code)
        .bind(&item.description)
        .bind(&item.unit)
        .bind(&item.category)
        .bind(item.labor_hours)
        .bind(item.labor_rate)
        .bind(item.material_cost)
        .bind(item.equipment_cost)
        .bind(item.subcontr_cost)
        .bind(item.unit_price)
        .bind(item.updated_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("update library item", e))?;

        Ok(Some(item))
    }

    #[instrument(skip(self), fields(owner_id = %owner_id, library_item_id = %library_item_id))]
    async fn delete_library_item(
        &self,
        owner_id: &str,
        library_item_id: Uuid,
    ) -> Result<bool, AppError> {
        let _timer = DB_QUERY_DURATION
            .with_label_values(&["delete_library_item"])
            .start_timer();

        let result = sqlx::query(
            r#"
            DELETE FROM library_items i
            USING cost_libraries l
            WHERE l.library_id = i.library_id AND i.library_item_id = $1 AND l.owner_id = $2
            "#,
        )
        .bind(library_item_id)
        .bind(owner_id)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("delete library item", e))?;
        Ok(result.rows_affected() > 0)
    }

    // -------------------------------------------------------------------------
    // Estimate Operations
    // -------------------------------------------------------------------------

    #[instrument(skip(self, estimate), fields(owner_id = %owner_id, project_id = %estimate.project_id))]
    async fn insert_estimate(&self, owner_id: &str, estimate: &Estimate) -> Result<(), AppError> {
        let _timer = DB_QUERY_DURATION
            .with_label_values(&["insert_estimate"])
            .start_timer();

        self.require_owned(OWNED_PROJECT, estimate.project_id, owner_id, "Project")
            .await?;
        insert_estimate_row(&self.pool, estimate).await?;

        info!(estimate_id = %estimate.estimate_id, "Estimate created");
        Ok(())
    }

    #[instrument(skip(self), fields(owner_id = %owner_id, estimate_id = %estimate_id))]
    async fn get_estimate(
        &self,
        owner_id: &str,
        estimate_id: Uuid,
    ) -> Result<Option<Estimate>, AppError> {
        let _timer = DB_QUERY_DURATION
            .with_label_values(&["get_estimate"])
            .start_timer();

        sqlx::query_as::<_, Estimate>(
            r#"
            SELECT e.* FROM estimates e
            JOIN projects p ON p.project_id = e.project_id
            WHERE e.estimate_id = $1 AND p.owner_id = $2
            "#,
        )
        .bind(estimate_id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("get estimate", e))
    }

    #[instrument(skip(self), fields(owner_id = %owner_id, project_id = %project_id))]
    async fn list_estimates(
        &self,
        owner_id: &str,
        project_id: Uuid,
    ) -> Result<Vec<Estimate>, AppError> {
        let _timer = DB_QUERY_DURATION
            .with_label_values(&["list_estimates"])
            .start_timer();

        self.require_owned(OWNED_PROJECT, project_id, owner_id, "Project")
            .await?;

        sqlx::query_as::<_, Estimate>(
            "SELECT * FROM estimates WHERE project_id = $1 ORDER BY name, version",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("list estimates", e))
    }

    #[instrument(skip(self), fields(owner_id = %owner_id, estimate_id = %estimate_id))]
    async fn get_estimate_tree(
        &self,
        owner_id: &str,
        estimate_id: Uuid,
    ) -> Result<Option<EstimateTree>, AppError> {
        let _timer = DB_QUERY_DURATION
            .with_label_values(&["get_estimate_tree"])
            .start_timer();

        let Some(estimate) = self.get_estimate(owner_id, estimate_id).await? else {
            return Ok(None);
        };

        let chapters = sqlx::query_as::<_, Chapter>(
            "SELECT * FROM chapters WHERE estimate_id = $1 ORDER BY sort_order, created_utc",
        )
        .bind(estimate_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("load chapters", e))?;

        let lines = sqlx::query_as::<_, LineItem>(
            "SELECT * FROM line_items WHERE estimate_id = $1 ORDER BY sort_order, created_utc",
        )
        .bind(estimate_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("load line items", e))?;

        Ok(Some(EstimateTree {
            estimate,
            chapters,
            lines,
        }))
    }

    #[instrument(skip(self, input), fields(owner_id = %owner_id, estimate_id = %estimate_id))]
    async fn update_estimate(
        &self,
        owner_id: &str,
        estimate_id: Uuid,
        input: &UpdateEstimate,
    ) -> Result<Estimate, AppError> {
        let _timer = DB_QUERY_DURATION
            .with_label_values(&["update_estimate"])
            .start_timer();

        let mut tx = self.begin().await?;
        let mut estimate = lock_estimate(&mut tx, owner_id, estimate_id).await?;

        if let Some(expected) = input.expected_version {
            if expected != estimate.row_version {
                return Err(AppError::Conflict(anyhow::anyhow!(
                    "Estimate was modified concurrently (expected version {}, current {})",
                    expected,
                    estimate.row_version
                )));
            }
        }

        estimate.apply_update(input);
        let estimate = roll_up(&mut tx, estimate, "markup").await?;
        commit(tx).await?;

        Ok(estimate)
    }

    #[instrument(skip(self), fields(owner_id = %owner_id, estimate_id = %estimate_id))]
    async fn delete_estimate(&self, owner_id: &str, estimate_id: Uuid) -> Result<bool, AppError> {
        let _timer = DB_QUERY_DURATION
            .with_label_values(&["delete_estimate"])
            .start_timer();

        let result = sqlx::query(
            r#"
            DELETE FROM estimates e
            USING projects p
            WHERE p.project_id = e.project_id AND e.estimate_id = $1 AND p.owner_id = $2
            "#,
        )
        .bind(estimate_id)
        .bind(owner_id)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("delete estimate", e))?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(owner_id = %owner_id, estimate_id = %estimate_id))]
    async fn recalculate_estimate(
        &self,
        owner_id: &str,
        estimate_id: Uuid,
    ) -> Result<Estimate, AppError> {
        let _timer = DB_QUERY_DURATION
            .with_label_values(&["recalculate_estimate"])
            .start_timer();

        let mut tx = self.begin().await?;
        let estimate = lock_estimate(&mut tx, owner_id, estimate_id).await?;
        let estimate = roll_up(&mut tx, estimate, "recalculate").await?;
        commit(tx).await?;
        Ok(estimate)
    }

    #[instrument(skip(self, tree), fields(owner_id = %owner_id, estimate_id = %tree.estimate.estimate_id))]
    async fn insert_estimate_tree(
        &self,
        owner_id: &str,
        tree: &EstimateTree,
    ) -> Result<(), AppError> {
        let _timer = DB_QUERY_DURATION
            .with_label_values(&["insert_estimate_tree"])
            .start_timer();

        let mut tx = self.begin().await?;
        if !owns(&mut *tx, OWNED_PROJECT, tree.estimate.project_id, owner_id).await? {
            return Err(AppError::not_found("Project"));
        }
        insert_estimate_row(&mut *tx, &tree.estimate).await?;
        for chapter in &tree.chapters {
            insert_chapter_row(&mut *tx, chapter).await?;
        }
        for line in &tree.lines {
            insert_line_row(&mut *tx, line).await?;
        }
        commit(tx).await?;

        info!(
            estimate_id = %tree.estimate.estimate_id,
            chapters = tree.chapters.len(),
            lines = tree.lines.len(),
            "Estimate tree inserted"
        );
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Chapter Operations
    // -------------------------------------------------------------------------

    #[instrument(skip(self, chapter), fields(owner_id = %owner_id, estimate_id = %chapter.estimate_id))]
    async fn insert_chapter(&self, owner_id: &str, chapter: &Chapter) -> Result<(), AppError> {
        let _timer = DB_QUERY_DURATION
            .with_label_values(&["insert_chapter"])
            .start_timer();

        self.require_owned(OWNED_ESTIMATE, chapter.estimate_id, owner_id, "Estimate")
            .await?;
        insert_chapter_row(&self.pool, chapter).await
    }

    #[instrument(skip(self, input), fields(owner_id = %owner_id, chapter_id = %chapter_id))]
    async fn update_chapter(
        &self,
        owner_id: &str,
        chapter_id: Uuid,
        input: UpdateChapter,
    ) -> Result<Option<Chapter>, AppError> {
        let _timer = DB_QUERY_DURATION
            .with_label_values(&["update_chapter"])
            .start_timer();

        let chapter = sqlx::query_as::<_, Chapter>(
            r#"
            SELECT c.* FROM chapters c
            JOIN estimates e ON e.estimate_id = c.estimate_id
            JOIN projects p ON p.project_id = e.project_id
            WHERE c.chapter_id = $1 AND p.owner_id = $2
            "#,
        )
        .bind(chapter_id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("get chapter", e))?;

        let Some(mut chapter) = chapter else {
            return Ok(None);
        };
        chapter.apply_update(input);

        sqlx::query("UPDATE chapters SET code = $2, name = $3, sort_order = $4 WHERE chapter_id = $1")
            .bind(chapter.chapter_id)
            .bind(&chapter.code)
            .bind(&chapter.name)
            .bind(chapter.sort_order)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("update chapter", e))?;

        Ok(Some(chapter))
    }

    #[instrument(skip(self), fields(owner_id = %owner_id, chapter_id = %chapter_id))]
    async fn delete_chapter(
        &self,
        owner_id: &str,
        chapter_id: Uuid,
    ) -> Result<Option<Estimate>, AppError> {
        let _timer = DB_QUERY_DURATION
            .with_label_values(&["delete_chapter"])
            .start_timer();

        let estimate_id = sqlx::query_scalar::<_, Uuid>(
            "SELECT estimate_id FROM chapters WHERE chapter_id = $1",
        )
        .bind(chapter_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("get chapter", e))?;
        let Some(estimate_id) = estimate_id else {
            return Ok(None);
        };

        let mut tx = self.begin().await?;
        let estimate = match lock_estimate(&mut tx, owner_id, estimate_id).await {
            Ok(estimate) => estimate,
            Err(AppError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        sqlx::query("DELETE FROM line_items WHERE chapter_id = $1")
            .bind(chapter_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error("delete chapter lines", e))?;
        let result = sqlx::query("DELETE FROM chapters WHERE chapter_id = $1 AND estimate_id = $2")
            .bind(chapter_id)
            .bind(estimate_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error("delete chapter", e))?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }

        let estimate = roll_up(&mut tx, estimate, "chapter_delete").await?;
        commit(tx).await?;
        Ok(Some(estimate))
    }

    // -------------------------------------------------------------------------
    // Line Item Operations
    // -------------------------------------------------------------------------

    #[instrument(skip(self), fields(owner_id = %owner_id, line_item_id = %line_item_id))]
    async fn get_line(
        &self,
        owner_id: &str,
        line_item_id: Uuid,
    ) -> Result<Option<LineItem>, AppError> {
        let _timer = DB_QUERY_DURATION
            .with_label_values(&["get_line"])
            .start_timer();

        sqlx::query_as::<_, LineItem>(
            r#"
            SELECT l.* FROM line_items l
            JOIN estimates e ON e.estimate_id = l.estimate_id
            JOIN projects p ON p.project_id = e.project_id
            WHERE l.line_item_id = $1 AND p.owner_id = $2
            "#,
        )
        .bind(line_item_id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("get line item", e))
    }

    #[instrument(skip(self, drafts), fields(owner_id = %owner_id, estimate_id = %estimate_id, count = drafts.len()))]
    async fn insert_lines(
        &self,
        owner_id: &str,
        estimate_id: Uuid,
        drafts: Vec<LineDraft>,
    ) -> Result<(Vec<LineItem>, Estimate), AppError> {
        let _timer = DB_QUERY_DURATION
            .with_label_values(&["insert_lines"])
            .start_timer();

        let mut tx = self.begin().await?;
        let estimate = lock_estimate(&mut tx, owner_id, estimate_id).await?;

        let mut lines = Vec::with_capacity(drafts.len());
        for draft in drafts {
            require_chapter_in(&mut tx, estimate_id, draft.chapter_id).await?;
            let line = draft.into_line(estimate_id)?;
            insert_line_row(&mut *tx, &line).await?;
            lines.push(line);
        }

        let estimate = roll_up(&mut tx, estimate, "line_insert").await?;
        commit(tx).await?;

        info!(count = lines.len(), "Line items added");
        Ok((lines, estimate))
    }

    #[instrument(skip(self, input), fields(owner_id = %owner_id, line_item_id = %line_item_id))]
    async fn update_line(
        &self,
        owner_id: &str,
        line_item_id: Uuid,
        input: &UpdateLineItem,
    ) -> Result<(LineItem, Estimate), AppError> {
        let _timer = DB_QUERY_DURATION
            .with_label_values(&["update_line"])
            .start_timer();

        let estimate_id = self
            .get_line(owner_id, line_item_id)
            .await?
            .ok_or_else(|| AppError::not_found("Line item"))?
            .estimate_id;

        let mut tx = self.begin().await?;
        let estimate = lock_estimate(&mut tx, owner_id, estimate_id).await?;
        require_chapter_in(&mut tx, estimate_id, input.chapter_id.flatten()).await?;

        // Re-read under the estimate lock so the edit applies to the latest row.
        let mut line = sqlx::query_as::<_, LineItem>(
            "SELECT * FROM line_items WHERE line_item_id = $1 AND estimate_id = $2",
        )
        .bind(line_item_id)
        .bind(estimate_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| db_error("get line item", e))?
        .ok_or_else(|| AppError::not_found("Line item"))?;

        line.apply_update(input)?;
        write_line(&mut *tx, &line).await?;

        let estimate = roll_up(&mut tx, estimate, "line_update").await?;
        commit(tx).await?;
        Ok((line, estimate))
    }

    #[instrument(skip(self), fields(owner_id = %owner_id, line_item_id = %line_item_id))]
    async fn delete_line(&self, owner_id: &str, line_item_id: Uuid) -> Result<Estimate, AppError> {
        let _timer = DB_QUERY_DURATION
            .with_label_values(&["delete_line"])
            .start_timer();

        let estimate_id = self
            .get_line(owner_id, line_item_id)
            .await?
            .ok_or_else(|| AppError::not_found("Line item"))?
            .estimate_id;

        let mut tx = self.begin().await?;
        let estimate = lock_estimate(&mut tx, owner_id, estimate_id).await?;

        let result = sqlx::query("DELETE FROM line_items WHERE line_item_id = $1 AND estimate_id = $2")
            .bind(line_item_id)
            .bind(estimate_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error("delete line item", e))?;
        if result.rows_affected() == 0 {
            return Err(AppError::not_found("Line item"));
        }

        let estimate = roll_up(&mut tx, estimate, "line_delete").await?;
        commit(tx).await?;
        Ok(estimate)
    }

    #[instrument(skip(self, costs), fields(owner_id = %owner_id, estimate_id = %estimate_id, count = costs.len()))]
    async fn apply_line_costs(
        &self,
        owner_id: &str,
        estimate_id: Uuid,
        costs: &[(Uuid, LineCosts)],
    ) -> Result<(usize, Estimate), AppError> {
        let _timer = DB_QUERY_DURATION
            .with_label_values(&["apply_line_costs"])
            .start_timer();

        let mut tx = self.begin().await?;
        let estimate = lock_estimate(&mut tx, owner_id, estimate_id).await?;
        let now = Utc::now();

        // Lines are compared under the lock; dropping `tx` on error rolls back.
        let mut changed = 0;
        for (line_item_id, line_costs) in costs {
            let mut line = sqlx::query_as::<_, LineItem>(
                "SELECT * FROM line_items WHERE line_item_id = $1 AND estimate_id = $2",
            )
            .bind(line_item_id)
            .bind(estimate_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| db_error("get line item", e))?
            .ok_or_else(|| AppError::not_found("Line item"))?;

            let Some(costs) = pricing::diff_costs(&line, line_costs) else {
                continue;
            };
            line.set_costs(costs)?;
            line.updated_utc = now;
            write_line(&mut *tx, &line).await?;
            changed += 1;
        }

        if changed == 0 {
            commit(tx).await?;
            return Ok((0, estimate));
        }

        let estimate = roll_up(&mut tx, estimate, "price_sync").await?;
        commit(tx).await?;
        Ok((changed, estimate))
    }

    // -------------------------------------------------------------------------
    // Invoice Operations
    // -------------------------------------------------------------------------

    #[instrument(skip(self, invoice), fields(owner_id = %owner_id, project_id = %invoice.project_id))]
    async fn insert_invoice(&self, owner_id: &str, invoice: &Invoice) -> Result<(), AppError> {
        let _timer = DB_QUERY_DURATION
            .with_label_values(&["insert_invoice"])
            .start_timer();

        self.require_owned(OWNED_PROJECT, invoice.project_id, owner_id, "Project")
            .await?;
        if let Some(estimate_id) = invoice.estimate_id {
            let same_project = sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS(SELECT 1 FROM estimates WHERE estimate_id = $1 AND project_id = $2)",
            )
            .bind(estimate_id)
            .bind(invoice.project_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_error("check estimate", e))?;
            if !same_project {
                return Err(AppError::bad_request(
                    "estimate_id: estimate does not belong to this project",
                ));
            }
        }

        sqlx::query(
            r#"
            INSERT INTO invoices (
                invoice_id, project_id, estimate_id, invoice_number, status, description,
                issue_date, due_date, amount_excl_vat, vat_percent, vat_amount, amount_incl_vat,
                paid_date, created_utc, updated_utc
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(invoice.invoice_id)
        .bind(invoice.project_id)
        .bind(invoice.estimate_id)
        .bind(&invoice.invoice_number)
        .bind(&invoice.status)
        .bind(&invoice.description)
        .bind(invoice.issue_date)
        .bind(invoice.due_date)
        .bind(invoice.amount_excl_vat)
        .bind(invoice.vat_percent)
        .bind(invoice.vat_amount)
        .bind(invoice.amount_incl_vat)
        .bind(invoice.paid_date)
        .bind(invoice.created_utc)
        .bind(invoice.updated_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("create invoice", e))?;

        info!(invoice_id = %invoice.invoice_id, invoice_number = %invoice.invoice_number, "Invoice created");
        Ok(())
    }

    #[instrument(skip(self), fields(owner_id = %owner_id, invoice_id = %invoice_id))]
    async fn get_invoice(
        &self,
        owner_id: &str,
        invoice_id: Uuid,
    ) -> Result<Option<Invoice>, AppError> {
        let _timer = DB_QUERY_DURATION
            .with_label_values(&["get_invoice"])
            .start_timer();

        sqlx::query_as::<_, Invoice>(
            r#"
            SELECT i.* FROM invoices i
            JOIN projects p ON p.project_id = i.project_id
            WHERE i.invoice_id = $1 AND p.owner_id = $2
            "#,
        )
        .bind(invoice_id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("get invoice", e))
    }

    #[instrument(skip(self), fields(owner_id = %owner_id, project_id = %project_id))]
    async fn list_invoices(
        &self,
        owner_id: &str,
        project_id: Uuid,
    ) -> Result<Vec<Invoice>, AppError> {
        let _timer = DB_QUERY_DURATION
            .with_label_values(&["list_invoices"])
            .start_timer();

        self.require_owned(OWNED_PROJECT, project_id, owner_id, "Project")
            .await?;

        sqlx::query_as::<_, Invoice>(
            "SELECT * FROM invoices WHERE project_id = $1 ORDER BY invoice_number",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("list invoices", e))
    }

    #[instrument(skip(self, input), fields(owner_id = %owner_id, invoice_id = %invoice_id))]
    async fn update_invoice(
        &self,
        owner_id: &str,
        invoice_id: Uuid,
        input: UpdateInvoice,
    ) -> Result<Option<Invoice>, AppError> {
        let _timer = DB_QUERY_DURATION
            .with_label_values(&["update_invoice"])
            .start_timer();

        let Some(mut invoice) = self.get_invoice(owner_id, invoice_id).await? else {
            return Ok(None);
        };
        invoice.apply_update(input)?;

        sqlx::query(
            r#"
            UPDATE invoices
            SET invoice_number = $2, status = $3, description = $4, issue_date = $5,
                due_date = $6, amount_excl_vat = $7, vat_percent = $8, vat_amount = $9,
                amount_incl_vat = $10, paid_date = $11, updated_utc = $12
            WHERE invoice_id = $1
            "#,
        )
        .bind(invoice.invoice_id)
        .bind(&invoice.invoice_number)
        .bind(&invoice.status)
        .bind(&invoice.description)
        .bind(invoice.issue_date)
        .bind(invoice.due_date)
        .bind(invoice.amount_excl_vat)
        .bind(invoice.vat_percent)
        .bind(invoice.vat_amount)
        .bind(invoice.amount_incl_vat)
        .bind(invoice.paid_date)
        .bind(invoice.updated_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("update invoice", e))?;

        Ok(Some(invoice))
    }

    #[instrument(skip(self), fields(owner_id = %owner_id, invoice_id = %invoice_id))]
    async fn delete_invoice(&self, owner_id: &str, invoice_id: Uuid) -> Result<bool, AppError> {
        let _timer = DB_QUERY_DURATION
            .with_label_values(&["delete_invoice"])
            .start_timer();

        let result = sqlx::query(
            r#"
            DELETE FROM invoices i
            USING projects p
            WHERE p.project_id = i.project_id AND i.invoice_id = $1 AND p.owner_id = $2
            "#,
        )
        .bind(invoice_id)
        .bind(owner_id)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("delete invoice", e))?;
        Ok(result.rows_affected() > 0)
    }

    // -------------------------------------------------------------------------
    // Time Entry Operations
    // -------------------------------------------------------------------------

    #[instrument(skip(self, entry), fields(owner_id = %owner_id, project_id = %entry.project_id))]
    async fn insert_time_entry(&self, owner_id: &str, entry: &TimeEntry) -> Result<(), AppError> {
        let _timer = DB_QUERY_DURATION
            .with_label_values(&["insert_time_entry"])
            .start_timer();

        self.require_owned(OWNED_PROJECT, entry.project_id, owner_id, "Project")
            .await?;

        sqlx::query(
            r#"
            INSERT INTO time_entries (
                time_entry_id, project_id, entry_date, employee_name, description, hours,
                hourly_rate, cost, created_utc
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(entry.time_entry_id)
        .bind(entry.project_id)
        .bind(entry.entry_date)
        .bind(&entry.employee_name)
        .bind(&entry.description)
        .bind(entry.hours)
        .bind(entry.hourly_rate)
        .bind(entry.cost)
        .bind(entry.created_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("create time entry", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(owner_id = %owner_id, project_id = %project_id))]
    async fn list_time_entries(
        &self,
        owner_id: &str,
        project_id: Uuid,
    ) -> Result<Vec<TimeEntry>, AppError> {
        let _timer = DB_QUERY_DURATION
            .with_label_values(&["list_time_entries"])
            .start_timer();

        self.require_owned(OWNED_PROJECT, project_id, owner_id, "Project")
            .await?;

        sqlx::query_as::<_, TimeEntry>(
            "SELECT * FROM time_entries WHERE project_id = $1 ORDER BY entry_date DESC, created_utc DESC",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("list time entries", e))
    }

    #[instrument(skip(self, input), fields(owner_id = %owner_id, time_entry_id = %time_entry_id))]
    async fn update_time_entry(
        &self,
        owner_id: &str,
        time_entry_id: Uuid,
        input: UpdateTimeEntry,
    ) -> Result<Option<TimeEntry>, AppError> {
        let _timer = DB_QUERY_DURATION
            .with_label_values(&["update_time_entry"])
            .start_timer();

        let entry = sqlx::query_as::<_, TimeEntry>(
            r#"
            SELECT t.* FROM time_entries t
            JOIN projects p ON p.project_id = t.project_id
            WHERE t.time_entry_id = $1 AND p.owner_id = $2
            "#,
        )
        .bind(time_entry_id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("get time entry", e))?;

        let Some(mut entry) = entry else {
            return Ok(None);
        };
        entry.apply_update(input);

        sqlx::query(
            r#"
            UPDATE time_entries
            SET entry_date = $2, employee_name = $3, description = $4, hours = $5,
                hourly_rate = $6, cost = $7
            WHERE time_entry_id = $1
            "#,
        )
        .bind(entry.time_entry_id)
        .bind(entry.entry_date)
        .bind(&entry.employee_name)
        .bind(&entry.description)
        .bind(entry.hours)
        .bind(entry.hourly_rate)
        .bind(entry.cost)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("update time entry", e))?;

        Ok(Some(entry))
    }

    #[instrument(skip(self), fields(owner_id = %owner_id, time_entry_id = %time_entry_id))]
    async fn delete_time_entry(
        &self,
        owner_id: &str,
        time_entry_id: Uuid,
    ) -> Result<bool, AppError> {
        let _timer = DB_QUERY_DURATION
            .with_label_values(&["delete_time_entry"])
            .start_timer();

        let result = sqlx::query(
            r#"
            DELETE FROM time_entries t
            USING projects p
            WHERE p.project_id = t.project_id AND t.time_entry_id = $1 AND p.owner_id = $2
            "#,
        )
        .bind(time_entry_id)
        .bind(owner_id)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("delete time entry", e))?;
        Ok(result.rows_affected() > 0)
    }

    // -------------------------------------------------------------------------
    // Milestone Operations
    // -------------------------------------------------------------------------

    #[instrument(skip(self, milestone), fields(owner_id = %owner_id, project_id = %milestone.project_id))]
    async fn insert_milestone(&self, owner_id: &str, milestone: &Milestone) -> Result<(), AppError> {
        let _timer = DB_QUERY_DURATION
            .with_label_values(&["insert_milestone"])
            .start_timer();

        self.require_owned(OWNED_PROJECT, milestone.project_id, owner_id, "Project")
            .await?;

        sqlx::query(
            r#"
            INSERT INTO milestones (
                milestone_id, project_id, name, description, due_date, completed,
                completed_utc, sort_order, created_utc
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(milestone.milestone_id)
        .bind(milestone.project_id)
        .bind(&milestone.name)
        .bind(&milestone.description)
        .bind(milestone.due_date)
        .bind(milestone.completed)
        .bind(milestone.completed_utc)
        .bind(milestone.sort_order)
        .bind(milestone.created_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("create milestone", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(owner_id = %owner_id, project_id = %project_id))]
    async fn list_milestones(
        &self,
        owner_id: &str,
        project_id: Uuid,
    ) -> Result<Vec<Milestone>, AppError> {
        let _timer = DB_QUERY_DURATION
            .with_label_values(&["list_milestones"])
            .start_timer();

        self.require_owned(OWNED_PROJECT, project_id, owner_id, "Project")
            .await?;

        sqlx::query_as::<_, Milestone>(
            "SELECT * FROM milestones WHERE project_id = $1 ORDER BY sort_order, created_utc",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("list milestones", e))
    }

    #[instrument(skip(self, input), fields(owner_id = %owner_id, milestone_id = %milestone_id))]
    async fn update_milestone(
        &self,
        owner_id: &str,
        milestone_id: Uuid,
        input: UpdateMilestone,
    ) -> Result<Option<Milestone>, AppError> {
        let _timer = DB_QUERY_DURATION
            .with_label_values(&["update_milestone"])
            .start_timer();

        let milestone = sqlx::query_as::<_, Milestone>(
            r#"
            SELECT m.* FROM milestones m
            JOIN projects p ON p.project_id = m.project_id
            WHERE m.milestone_id = $1 AND p.owner_id = $2
            "#,
        )
        .bind(milestone_id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("get milestone", e))?;

        let Some(mut milestone) = milestone else {
            return Ok(None);
        };
        milestone.apply_update(input);

        sqlx::query(
            r#"
            UPDATE milestones
            SET name = $2, description = $3, due_date = $4, completed = $5, completed_utc = $6,
                sort_order = $7
            WHERE milestone_id = $1
            "#,
        )
        .bind(milestone.milestone_id)
        .bind(&milestone.name)
        .bind(&milestone.description)
        .bind(milestone.due_date)
        .bind(milestone.completed)
        .bind(milestone.completed_utc)
        .bind(milestone.sort_order)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("update milestone", e))?;

        Ok(Some(milestone))
    }

    #[instrument(skip(self), fields(owner_id = %owner_id, milestone_id = %milestone_id))]
    async fn delete_milestone(&self, owner_id: &str, milestone_id: Uuid) -> Result<bool, AppError> {
        let _timer = DB_QUERY_DURATION
            .with_label_values(&["delete_milestone"])
            .start_timer();

        let result = sqlx::query(
            r#"
            DELETE FROM milestones m
            USING projects p
            WHERE p.project_id = m.project_id AND m.milestone_id = $1 AND p.owner_id = $2
            "#,
        )
        .bind(milestone_id)
        .bind(owner_id)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("delete milestone", e))?;
        Ok(result.rows_affected() > 0)
    }

    // -------------------------------------------------------------------------
    // Purchase Order Operations
    // -------------------------------------------------------------------------

    #[instrument(skip(self, order), fields(owner_id = %owner_id, project_id = %order.project_id))]
    async fn insert_purchase_order(
        &self,
        owner_id: &str,
        order: &PurchaseOrder,
    ) -> Result<(), AppError> {
        let _timer = DB_QUERY_DURATION
            .with_label_values(&["insert_purchase_order"])
            .start_timer();

        self.require_owned(OWNED_PROJECT, order.project_id, owner_id, "Project")
            .await?;

        sqlx::query(
            r#"
            INSERT INTO purchase_orders (
                purchase_order_id, project_id, order_number, supplier, description, order_date,
                expected_date, status, amount, created_utc, updated_utc
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(order.purchase_order_id)
        .bind(order.project_id)
        .bind(&order.order_number)
        .bind(&order.supplier)
        .bind(&order.description)
        .bind(order.order_date)
        .bind(order.expected_date)
        .bind(&order.status)
        .bind(order.amount)
        .bind(order.created_utc)
        .bind(order.updated_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("create purchase order", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(owner_id = %owner_id, project_id = %project_id))]
    async fn list_purchase_orders(
        &self,
        owner_id: &str,
        project_id: Uuid,
    ) -> Result<Vec<PurchaseOrder>, AppError> {
        let _timer = DB_QUERY_DURATION
            .with_label_values(&["list_purchase_orders"])
            .start_timer();

        self.require_owned(OWNED_PROJECT, project_id, owner_id, "Project")
            .await?;

        sqlx::query_as::<_, PurchaseOrder>(
            "SELECT * FROM purchase_orders WHERE project_id = $1 ORDER BY order_number",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("list purchase orders", e))
    }

    #[instrument(skip(self, input), fields(owner_id = %owner_id, purchase_order_id = %purchase_order_id))]
    async fn update_purchase_order(
        &self,
        owner_id: &str,
        purchase_order_id: Uuid,
        input: UpdatePurchaseOrder,
    ) -> Result<Option<PurchaseOrder>, AppError> {
        let _timer = DB_QUERY_DURATION
            .with_label_values(&["update_purchase_order"])
            .start_timer();

        let order = sqlx::query_as::<_, PurchaseOrder>(
            r#"
            SELECT o.* FROM purchase_orders o
            JOIN projects p ON p.project_id = o.project_id
            WHERE o.purchase_order_id = $1 AND p.owner_id = $2
            "#,
        )
        .bind(purchase_order_id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("get purchase order", e))?;

        let Some(mut order) = order else {
            return Ok(None);
        };
        order.apply_update(input);

        sqlx::query(
            r#"
            UPDATE purchase_orders
            SET order_number = $2, supplier = $3, description = $4, order_date = $5,
                expected_date = $6, status = $7, amount = $8, updated_utc = $9
            WHERE purchase_order_id = $1
            "#,
        )
        .bind(order.purchase_order_id)
        .bind(&order.order_number)
        .bind(&order.supplier)
        .bind(&order.description)
        .bind(order.order_date)
        .bind(order.expected_date)
        .bind(&order.status)
        .bind(order.amount)
        .bind(order.updated_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("update purchase order", e))?;

        Ok(Some(order))
    }

    #[instrument(skip(self), fields(owner_id = %owner_id, purchase_order_id = %purchase_order_id))]
    async fn delete_purchase_order(
        &self,
        owner_id: &str,
        purchase_order_id: Uuid,
    ) -> Result<bool, AppError> {
        let _timer = DB_QUERY_DURATION
            .with_label_values(&["delete_purchase_order"])
            .start_timer();

        let result = sqlx::query(
            r#"
            DELETE FROM purchase_orders o
            USING projects p
            WHERE p.project_id = o.project_id AND o.purchase_order_id = $1 AND p.owner_id = $2
            "#,
        )
        .bind(purchase_order_id)
        .bind(owner_id)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("delete purchase order", e))?;
        Ok(result.rows_affected() > 0)
    }
}
