//! Line pricing: resolving new lines against the cost library and syncing
//! existing lines with their library item's current prices.

use std::collections::HashMap;

use serde::Serialize;
use service_core::error::AppError;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::models::{CreateLineItem, Estimate, LibraryItem, LineCosts, LineDraft, LineItem};
use crate::services::metrics::PRICE_SYNC_TOTAL;
use crate::services::store::EstimatingStore;

const DEFAULT_UNIT: &str = "st";

/// Outcome of syncing one line with its library item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    Updated,
    Unchanged,
    NotLinked,
}

impl SyncOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncOutcome::Updated => "updated",
            SyncOutcome::Unchanged => "unchanged",
            SyncOutcome::NotLinked => "not_linked",
        }
    }
}

/// Result of syncing a single line.
#[derive(Debug, Clone, Serialize)]
pub struct LineSyncResult {
    pub outcome: SyncOutcome,
    pub line: LineItem,
    /// Present only when the line was updated and the estimate rolled up.
    pub estimate: Option<Estimate>,
}

/// Result of syncing every linked line of an estimate.
#[derive(Debug, Clone, Serialize)]
pub struct EstimateSyncReport {
    pub updated: usize,
    pub unchanged: usize,
    pub not_linked: usize,
    pub estimate: Estimate,
}

/// `target` when any of the five cost inputs of `line` differ from it,
/// `None` when they all match.
///
/// Stores call this after taking the estimate lock, with the library
/// item's costs as `target`.
pub fn diff_costs(line: &LineItem, target: &LineCosts) -> Option<LineCosts> {
    (line.costs() != *target).then_some(*target)
}

/// Turn a create request into an insertable draft.
///
/// Fields omitted from the request fall back to the library item when one
/// is given; a description is required one way or the other.
pub fn resolve_draft(
    input: CreateLineItem,
    library_item: Option<&LibraryItem>,
    default_sort_order: i32,
) -> Result<LineDraft, AppError> {
    let library_costs = library_item.map(|item| item.costs()).unwrap_or_default();

    let description = input
        .description
        .or_else(|| library_item.map(|item| item.description.clone()))
        .ok_or_else(|| AppError::bad_request("description: is required"))?;

    Ok(LineDraft {
        chapter_id: input.chapter_id,
        library_item_id: library_item.map(|item| item.library_item_id),
        code: input
            .code
            .or_else(|| library_item.map(|item| item.code.clone())),
        description,
        quantity: input.quantity,
        unit: input
            .unit
            .or_else(|| library_item.map(|item| item.unit.clone()))
            .unwrap_or_else(|| DEFAULT_UNIT.to_string()),
        costs: LineCosts {
            labor_hours: input.labor_hours.unwrap_or(library_costs.labor_hours),
            labor_rate: input.labor_rate.unwrap_or(library_costs.labor_rate),
            material_cost: input.material_cost.unwrap_or(library_costs.material_cost),
            equipment_cost: input.equipment_cost.unwrap_or(library_costs.equipment_cost),
            subcontr_cost: input.subcontr_cost.unwrap_or(library_costs.subcontr_cost),
        },
        sort_order: input.sort_order.unwrap_or(default_sort_order),
    })
}

/// Resolve and insert lines for an estimate, rolling up once.
#[instrument(skip(store, inputs), fields(owner_id = %owner_id, estimate_id = %estimate_id, count = inputs.len()))]
pub async fn add_lines(
    store: &dyn EstimatingStore,
    owner_id: &str,
    estimate_id: Uuid,
    inputs: Vec<CreateLineItem>,
) -> Result<(Vec<LineItem>, Estimate), AppError> {
    let tree = store
        .get_estimate_tree(owner_id, estimate_id)
        .await?
        .ok_or_else(|| AppError::not_found("Estimate"))?;

    let mut next_sort_order = tree
        .lines
        .iter()
        .map(|l| l.sort_order)
        .max()
        .map_or(0, |max| max + 1);

    let mut library_cache: HashMap<Uuid, LibraryItem> = HashMap::new();
    let mut drafts = Vec::with_capacity(inputs.len());

    for input in inputs {
        let library_item = match input.library_item_id {
            Some(id) => {
                if !library_cache.contains_key(&id) {
                    let item = store
                        .get_library_item(owner_id, id)
                        .await?
                        .ok_or_else(|| AppError::not_found("Library item"))?;
                    library_cache.insert(id, item);
                }
                library_cache.get(&id)
            }
            None => None,
        };

        let draft = resolve_draft(input, library_item, next_sort_order)?;
        next_sort_order = next_sort_order.max(draft.sort_order) + 1;
        drafts.push(draft);
    }

    store.insert_lines(owner_id, estimate_id, drafts).await
}

/// Bring one line in line with its library item.
#[instrument(skip(store), fields(owner_id = %owner_id, line_item_id = %line_item_id))]
pub async fn sync_line_price(
    store: &dyn EstimatingStore,
    owner_id: &str,
    line_item_id: Uuid,
) -> Result<LineSyncResult, AppError> {
    let line = store
        .get_line(owner_id, line_item_id)
        .await?
        .ok_or_else(|| AppError::not_found("Line item"))?;

    let item = match line.library_item_id {
        Some(id) => store.get_library_item(owner_id, id).await?,
        None => None,
    };

    let Some(item) = item else {
        PRICE_SYNC_TOTAL
            .with_label_values(&[SyncOutcome::NotLinked.as_str()])
            .inc();
        return Ok(LineSyncResult {
            outcome: SyncOutcome::NotLinked,
            line,
            estimate: None,
        });
    };

    // The store compares against the library under the estimate lock, so an
    // edit made since `line` was read is not overwritten with a stale diff.
    let (changed, estimate) = store
        .apply_line_costs(owner_id, line.estimate_id, &[(line.line_item_id, item.costs())])
        .await?;
    let line = store
        .get_line(owner_id, line_item_id)
        .await?
        .ok_or_else(|| AppError::not_found("Line item"))?;

    if changed == 0 {
        PRICE_SYNC_TOTAL
            .with_label_values(&[SyncOutcome::Unchanged.as_str()])
            .inc();
        return Ok(LineSyncResult {
            outcome: SyncOutcome::Unchanged,
            line,
            estimate: None,
        });
    }

    PRICE_SYNC_TOTAL
        .with_label_values(&[SyncOutcome::Updated.as_str()])
        .inc();
    info!(line_item_id = %line_item_id, "Line price synced from library");

    Ok(LineSyncResult {
        outcome: SyncOutcome::Updated,
        line,
        estimate: Some(estimate),
    })
}

/// Sync every linked line of an estimate in one transaction.
#[instrument(skip(store), fields(owner_id = %owner_id, estimate_id = %estimate_id))]
pub async fn sync_estimate_prices(
    store: &dyn EstimatingStore,
    owner_id: &str,
    estimate_id: Uuid,
) -> Result<EstimateSyncReport, AppError> {
    let tree = store
        .get_estimate_tree(owner_id, estimate_id)
        .await?
        .ok_or_else(|| AppError::not_found("Estimate"))?;

    let mut targets = Vec::new();
    let mut not_linked = 0;
    let mut library_cache: HashMap<Uuid, Option<LibraryItem>> = HashMap::new();

    for line in &tree.lines {
        let Some(item_id) = line.library_item_id else {
            not_linked += 1;
            continue;
        };
        if !library_cache.contains_key(&item_id) {
            let item = store.get_library_item(owner_id, item_id).await?;
            library_cache.insert(item_id, item);
        }
        match library_cache.get(&item_id).and_then(|item| item.as_ref()) {
            None => not_linked += 1,
            Some(item) => targets.push((line.line_item_id, item.costs())),
        }
    }

    let (updated, estimate) = if targets.is_empty() {
        (0, tree.estimate)
    } else {
        store
            .apply_line_costs(owner_id, estimate_id, &targets)
            .await?
    };
    let unchanged = targets.len() - updated;

    PRICE_SYNC_TOTAL
        .with_label_values(&[SyncOutcome::Updated.as_str()])
        .inc_by(updated as f64);
    PRICE_SYNC_TOTAL
        .with_label_values(&[SyncOutcome::Unchanged.as_str()])
        .inc_by(unchanged as f64);
    PRICE_SYNC_TOTAL
        .with_label_values(&[SyncOutcome::NotLinked.as_str()])
        .inc_by(not_linked as f64);

    info!(
        updated = updated,
        unchanged = unchanged,
        not_linked = not_linked,
        "Estimate prices synced from library"
    );

    Ok(EstimateSyncReport {
        updated,
        unchanged,
        not_linked,
        estimate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CreateLibraryItem;
    use rust_decimal_macros::dec;

    fn library_item() -> LibraryItem {
        LibraryItem::new(
            Uuid::new_v4(),
            CreateLibraryItem {
                code: "22.31-10".to_string(),
                description: "Kalkzandsteen wand 100 mm".to_string(),
                unit: "m2".to_string(),
                category: Some("Metselwerk".to_string()),
                labor_hours: Some(dec!(0.8)),
                labor_rate: Some(dec!(52.5)),
                material_cost: Some(dec!(18.2)),
                equipment_cost: Some(dec!(1.1)),
                subcontr_cost: None,
            },
        )
        .unwrap()
    }

    #[test]
    fn resolve_copies_library_fields_when_omitted() {
        let item = library_item();
        let draft = resolve_draft(
            CreateLineItem {
                library_item_id: Some(item.library_item_id),
                quantity: dec!(40),
                ..Default::default()
            },
            Some(&item),
            3,
        )
        .unwrap();

        assert_eq!(draft.code.as_deref(), Some("22.31-10"));
        assert_eq!(draft.description, "Kalkzandsteen wand 100 mm");
        assert_eq!(draft.unit, "m2");
        assert_eq!(draft.costs, item.costs());
        assert_eq!(draft.sort_order, 3);
        assert_eq!(draft.library_item_id, Some(item.library_item_id));
    }

    #[test]
    fn resolve_prefers_explicit_values_over_library() {
        let item = library_item();
        let draft = resolve_draft(
            CreateLineItem {
                library_item_id: Some(item.library_item_id),
                description: Some("Eigen omschrijving".to_string()),
                quantity: dec!(1),
                material_cost: Some(dec!(20)),
                sort_order: Some(9),
                ..Default::default()
            },
            Some(&item),
            0,
        )
        .unwrap();

        assert_eq!(draft.description, "Eigen omschrijving");
        assert_eq!(draft.costs.material_cost, dec!(20));
        assert_eq!(draft.costs.labor_rate, dec!(52.5));
        assert_eq!(draft.sort_order, 9);
    }

    #[test]
    fn resolve_without_library_requires_description() {
        let err = resolve_draft(
            CreateLineItem {
                quantity: dec!(1),
                ..Default::default()
            },
            None,
            0,
        )
        .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn diff_reports_none_when_all_five_fields_match() {
        let item = library_item();
        let line = resolve_draft(
            CreateLineItem {
                library_item_id: Some(item.library_item_id),
                quantity: dec!(2),
                ..Default::default()
            },
            Some(&item),
            0,
        )
        .unwrap()
        .into_line(Uuid::new_v4())
        .unwrap();

        assert_eq!(diff_costs(&line, &item.costs()), None);
    }

    #[test]
    fn diff_returns_library_costs_when_any_field_differs() {
        let mut item = library_item();
        let line = resolve_draft(
            CreateLineItem {
                library_item_id: Some(item.library_item_id),
                quantity: dec!(2),
                ..Default::default()
            },
            Some(&item),
            0,
        )
        .unwrap()
        .into_line(Uuid::new_v4())
        .unwrap();

        item.equipment_cost = dec!(1.25);

        let costs = diff_costs(&line, &item.costs()).unwrap();
        assert_eq!(costs.equipment_cost, dec!(1.25));
        assert_eq!(costs.labor_hours, dec!(0.8));
    }
}
