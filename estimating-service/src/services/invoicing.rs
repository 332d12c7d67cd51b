//! Invoice creation, including draft invoices raised from an estimate.

use chrono::{Datelike, Utc};
use service_core::error::AppError;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::models::{next_invoice_number, CreateInvoice, Invoice};
use crate::services::store::EstimatingStore;

/// Create an invoice for a project, numbering it `{year}-{seq:04}` when the
/// caller gave no number.
#[instrument(skip(store, input), fields(owner_id = %owner_id, project_id = %project_id))]
pub async fn create_invoice(
    store: &dyn EstimatingStore,
    owner_id: &str,
    project_id: Uuid,
    mut input: CreateInvoice,
) -> Result<Invoice, AppError> {
    store
        .get_project(owner_id, project_id)
        .await?
        .ok_or_else(|| AppError::not_found("Project"))?;

    let number = match input.invoice_number.take() {
        Some(number) => number,
        None => {
            let existing = store.list_invoices(owner_id, project_id).await?.len();
            next_invoice_number(Utc::now().year(), existing)
        }
    };

    let invoice = Invoice::new(project_id, number, input)?;
    store.insert_invoice(owner_id, &invoice).await?;

    info!(
        invoice_id = %invoice.invoice_id,
        invoice_number = %invoice.invoice_number,
        "Invoice created"
    );
    Ok(invoice)
}

/// Draft invoice billing an estimate's total excluding VAT at its VAT rate.
#[instrument(skip(store), fields(owner_id = %owner_id, estimate_id = %estimate_id))]
pub async fn invoice_from_estimate(
    store: &dyn EstimatingStore,
    owner_id: &str,
    estimate_id: Uuid,
) -> Result<Invoice, AppError> {
    let estimate = store
        .get_estimate(owner_id, estimate_id)
        .await?
        .ok_or_else(|| AppError::not_found("Estimate"))?;

    let input = CreateInvoice {
        estimate_id: Some(estimate.estimate_id),
        description: Some(format!("{} (v{})", estimate.name, estimate.version)),
        issue_date: Some(Utc::now().date_naive()),
        amount_excl_vat: estimate.total_excl_vat,
        vat_percent: Some(estimate.vat_percent),
        ..Default::default()
    };

    create_invoice(store, owner_id, estimate.project_id, input).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CreateEstimate, CreateProject, Estimate, Project};
    use crate::services::memory::MemoryStore;
    use rust_decimal_macros::dec;

    async fn seeded() -> (MemoryStore, Project, Estimate) {
        let store = MemoryStore::new();
        let project = Project::new(
            "owner",
            CreateProject {
                client_id: None,
                project_number: None,
                name: "Dakkapel".to_string(),
                description: None,
                address: None,
                city: None,
                start_date: None,
                end_date: None,
            },
        );
        store.insert_project(&project).await.unwrap();

        let mut estimate = Estimate::new(
            project.project_id,
            CreateEstimate {
                name: "Dakkapel".to_string(),
                description: None,
                valid_until: None,
                notes: None,
                general_costs_percent: None,
                profit_percent: None,
                risk_percent: None,
                vat_percent: Some(dec!(9)),
            },
        );
        estimate.total_excl_vat = dec!(1000);
        store.insert_estimate("owner", &estimate).await.unwrap();
        (store, project, estimate)
    }

    #[tokio::test]
    async fn numbers_are_generated_per_project() {
        let (store, project, _) = seeded().await;
        let year = Utc::now().year();

        let first = create_invoice(&store, "owner", project.project_id, CreateInvoice::default())
            .await
            .unwrap();
        let second = create_invoice(&store, "owner", project.project_id, CreateInvoice::default())
            .await
            .unwrap();

        assert_eq!(first.invoice_number, format!("{}-0001", year));
        assert_eq!(second.invoice_number, format!("{}-0002", year));
    }

    #[tokio::test]
    async fn estimate_invoice_copies_amount_and_vat() {
        let (store, _, estimate) = seeded().await;

        let invoice = invoice_from_estimate(&store, "owner", estimate.estimate_id)
            .await
            .unwrap();

        assert_eq!(invoice.estimate_id, Some(estimate.estimate_id));
        assert_eq!(invoice.status, "draft");
        assert_eq!(invoice.amount_excl_vat, dec!(1000));
        assert_eq!(invoice.vat_percent, dec!(9));
        assert_eq!(invoice.amount_incl_vat, dec!(1090));
    }

    #[tokio::test]
    async fn foreign_project_is_not_found() {
        let (store, project, _) = seeded().await;
        let err = create_invoice(&store, "intruder", project.project_id, CreateInvoice::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
