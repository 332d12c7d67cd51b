//! Domain models for estimating-service.

mod chapter;
mod client;
mod estimate;
mod invoice;
mod library;
mod line_item;
mod milestone;
mod project;
mod purchase_order;
mod time_entry;

pub use chapter::{Chapter, CreateChapter, UpdateChapter};
pub use client::{Client, CreateClient, UpdateClient};
pub use estimate::{
    default_vat_percent, CreateEstimate, Estimate, EstimateStatus, EstimateTotals, EstimateTree,
    Markup, UpdateEstimate,
};
pub use invoice::{next_invoice_number, CreateInvoice, Invoice, InvoiceStatus, UpdateInvoice};
pub use library::{
    CostLibrary, CreateLibrary, CreateLibraryItem, LibraryItem, LibraryStandard,
    UpdateLibraryItem,
};
pub use line_item::{CreateLineItem, LineCosts, LineDraft, LineItem, UpdateLineItem};
pub use milestone::{CreateMilestone, Milestone, UpdateMilestone};
pub use project::{CreateProject, Project, ProjectStatus, UpdateProject};
pub use purchase_order::{
    CreatePurchaseOrder, PurchaseOrder, PurchaseOrderStatus, UpdatePurchaseOrder,
};
pub use time_entry::{CreateTimeEntry, TimeEntry, UpdateTimeEntry};

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use service_core::error::AppError;
use validator::ValidationError;

/// Patch field that tells "absent" (`None`) apart from an explicit `null`
/// (`Some(None)`). Use with `#[serde(default, deserialize_with = "nullable")]`.
pub(crate) fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Upper bound for any single cost, rate, hour count or quantity.
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(1_000_000_000, 0, 0, false, 0);

/// Costs, quantities, hours and rates are never negative and stay below
/// [`MAX_AMOUNT`].
pub(crate) fn bounded_amount(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() && !value.is_zero() {
        let mut err = ValidationError::new("non_negative");
        err.message = Some("must not be negative".into());
        return Err(err);
    }
    if *value > MAX_AMOUNT {
        let mut err = ValidationError::new("amount_range");
        err.message = Some("must not exceed 1000000000".into());
        return Err(err);
    }
    Ok(())
}

/// Error for derived amounts that no longer fit a decimal.
pub(crate) fn amount_overflow() -> AppError {
    AppError::bad_request("amounts: exceed the supported range")
}

/// Markup and VAT percentages live in 0..=100.
pub(crate) fn percentage(value: &Decimal) -> Result<(), ValidationError> {
    if *value < Decimal::ZERO || *value > Decimal::ONE_HUNDRED {
        let mut err = ValidationError::new("percentage");
        err.message = Some("must be between 0 and 100".into());
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn bounded_amount_accepts_zero_and_rejects_negatives() {
        assert!(bounded_amount(&dec!(0)).is_ok());
        assert!(bounded_amount(&dec!(-0.00)).is_ok());
        assert!(bounded_amount(&dec!(12.5)).is_ok());
        assert!(bounded_amount(&dec!(-0.01)).is_err());
    }

    #[test]
    fn bounded_amount_has_an_upper_bound() {
        assert_eq!(MAX_AMOUNT, dec!(1000000000));
        assert!(bounded_amount(&dec!(1000000000)).is_ok());
        assert!(bounded_amount(&dec!(1000000000.01)).is_err());
        assert!(bounded_amount(&dec!(79228162514264337593543950)).is_err());
    }

    #[test]
    fn percentage_bounds() {
        assert!(percentage(&dec!(0)).is_ok());
        assert!(percentage(&dec!(100)).is_ok());
        assert!(percentage(&dec!(21)).is_ok());
        assert!(percentage(&dec!(100.01)).is_err());
        assert!(percentage(&dec!(-1)).is_err());
    }
}
