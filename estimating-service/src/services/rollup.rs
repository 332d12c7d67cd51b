//! Estimate cost rollup.
//!
//! Recomputes an estimate's cached totals from its line items. Markups
//! compound strictly in the order general costs → profit → risk → VAT; each
//! one is taken over the subtotal plus every markup before it.

use std::collections::HashMap;

use rust_decimal::Decimal;
use service_core::error::AppError;
use uuid::Uuid;

use crate::models::{Chapter, Estimate, EstimateTotals, LineItem, Markup};

fn overflow() -> AppError {
    AppError::bad_request("amounts: estimate totals exceed the supported range")
}

fn add(a: Decimal, b: Decimal) -> Result<Decimal, AppError> {
    a.checked_add(b).ok_or_else(overflow)
}

fn mul(a: Decimal, b: Decimal) -> Result<Decimal, AppError> {
    a.checked_mul(b).ok_or_else(overflow)
}

fn percent_of(base: Decimal, percent: Decimal) -> Result<Decimal, AppError> {
    Ok(mul(base, percent)? / Decimal::ONE_HUNDRED)
}

/// Compute the aggregate totals for a set of lines under `markup`.
///
/// Chapter grouping is irrelevant here. Amounts are exact decimals and are
/// not rounded; rounding is a presentation concern. Fails with a 400 when
/// a total no longer fits a decimal.
pub fn compute<'a, I>(markup: &Markup, lines: I) -> Result<EstimateTotals, AppError>
where
    I: IntoIterator<Item = &'a LineItem>,
{
    let mut totals = EstimateTotals::default();

    for line in lines {
        totals.total_labor = add(totals.total_labor, mul(line.labor_cost, line.quantity)?)?;
        totals.total_material =
            add(totals.total_material, mul(line.material_cost, line.quantity)?)?;
        totals.total_equipment =
            add(totals.total_equipment, mul(line.equipment_cost, line.quantity)?)?;
        totals.total_subcontr =
            add(totals.total_subcontr, mul(line.subcontr_cost, line.quantity)?)?;
    }

    totals.subtotal = add(
        add(totals.total_labor, totals.total_material)?,
        add(totals.total_equipment, totals.total_subcontr)?,
    )?;

    totals.general_costs_amount = percent_of(totals.subtotal, markup.general_costs_percent)?;
    let base = add(totals.subtotal, totals.general_costs_amount)?;
    totals.profit_amount = percent_of(base, markup.profit_percent)?;
    let base = add(base, totals.profit_amount)?;
    totals.risk_amount = percent_of(base, markup.risk_percent)?;
    totals.total_excl_vat = add(base, totals.risk_amount)?;
    totals.vat_amount = percent_of(totals.total_excl_vat, markup.vat_percent)?;
    totals.total_incl_vat = add(totals.total_excl_vat, totals.vat_amount)?;

    Ok(totals)
}

/// Sum of `total_price` per chapter. Unassigned lines are skipped.
pub fn chapter_subtotals<'a, I>(lines: I) -> Result<HashMap<Uuid, Decimal>, AppError>
where
    I: IntoIterator<Item = &'a LineItem>,
{
    let mut subtotals: HashMap<Uuid, Decimal> = HashMap::new();
    for line in lines {
        if let Some(chapter_id) = line.chapter_id {
            let subtotal = subtotals.entry(chapter_id).or_default();
            *subtotal = add(*subtotal, line.total_price)?;
        }
    }
    Ok(subtotals)
}

/// Refresh the cached totals of `estimate` and the subtotals of `chapters`
/// from the complete line set of the estimate.
///
/// Everything is computed before anything is written, so on error neither
/// the estimate nor the chapters change.
pub fn apply(
    estimate: &mut Estimate,
    chapters: &mut [Chapter],
    lines: &[LineItem],
) -> Result<(), AppError> {
    let totals = compute(&estimate.markup(), lines)?;
    let subtotals = chapter_subtotals(lines)?;
    estimate.set_totals(totals);
    for chapter in chapters {
        chapter.subtotal = subtotals
            .get(&chapter.chapter_id)
            .copied()
            .unwrap_or_default();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LineCosts, LineDraft};
    use rust_decimal_macros::dec;

    fn line(chapter_id: Option<Uuid>, quantity: Decimal, costs: LineCosts) -> LineItem {
        LineDraft {
            chapter_id,
            library_item_id: None,
            code: None,
            description: "regel".to_string(),
            quantity,
            unit: "st".to_string(),
            costs,
            sort_order: 0,
        }
        .into_line(Uuid::nil())
        .unwrap()
    }

    fn costs(hours: Decimal, rate: Decimal, m: Decimal, e: Decimal, s: Decimal) -> LineCosts {
        LineCosts {
            labor_hours: hours,
            labor_rate: rate,
            material_cost: m,
            equipment_cost: e,
            subcontr_cost: s,
        }
    }

    fn markup(g: Decimal, p: Decimal, r: Decimal, v: Decimal) -> Markup {
        Markup {
            general_costs_percent: g,
            profit_percent: p,
            risk_percent: r,
            vat_percent: v,
        }
    }

    #[test]
    fn subtotal_is_sum_of_unit_costs_times_quantity() {
        let chapter = Uuid::new_v4();
        let lines = vec![
            line(Some(chapter), dec!(10), costs(dec!(2), dec!(45), dec!(12.5), dec!(3), dec!(0))),
            line(None, dec!(3), costs(dec!(0), dec!(0), dec!(100), dec!(0), dec!(250))),
            line(Some(chapter), dec!(0.5), costs(dec!(1), dec!(60), dec!(0), dec!(20), dec!(0))),
        ];

        let totals = compute(&Markup::default(), &lines).unwrap();

        assert_eq!(totals.total_labor, dec!(930));
        assert_eq!(totals.total_material, dec!(425));
        assert_eq!(totals.total_equipment, dec!(40));
        assert_eq!(totals.total_subcontr, dec!(750));
        assert_eq!(totals.subtotal, dec!(2145));

        let expected: Decimal = lines.iter().map(|l| l.unit_price * l.quantity).sum();
        assert_eq!(totals.subtotal, expected);
    }

    #[test]
    fn markups_compound_in_order() {
        let lines = vec![line(
            None,
            dec!(1),
            costs(dec!(0), dec!(0), dec!(1000), dec!(0), dec!(0)),
        )];

        let totals = compute(&markup(dec!(5), dec!(10), dec!(0), dec!(21)), &lines).unwrap();

        assert_eq!(totals.subtotal, dec!(1000));
        assert_eq!(totals.general_costs_amount, dec!(50));
        assert_eq!(totals.profit_amount, dec!(105));
        assert_eq!(totals.risk_amount, dec!(0));
        assert_eq!(totals.total_excl_vat, dec!(1155));
        assert_eq!(totals.vat_amount, dec!(242.55));
        assert_eq!(totals.total_incl_vat, dec!(1397.55));
    }

    #[test]
    fn risk_is_taken_over_subtotal_plus_prior_markups() {
        let lines = vec![line(
            None,
            dec!(4),
            costs(dec!(0), dec!(0), dec!(250), dec!(0), dec!(0)),
        )];

        let totals = compute(&markup(dec!(10), dec!(10), dec!(10), dec!(0)), &lines).unwrap();

        assert_eq!(totals.general_costs_amount, dec!(100));
        assert_eq!(totals.profit_amount, dec!(110));
        assert_eq!(totals.risk_amount, dec!(121));
        assert_eq!(totals.total_incl_vat, dec!(1331));
        // 1000 × 1.1 × 1.1 × 1.1
        assert_eq!(totals.total_incl_vat, dec!(1000) * dec!(1.1) * dec!(1.1) * dec!(1.1));
    }

    #[test]
    fn zero_lines_roll_up_to_zero_regardless_of_markup() {
        let totals =
            compute(&markup(dec!(8), dec!(12), dec!(3), dec!(21)), &Vec::<LineItem>::new()).unwrap();
        assert_eq!(totals.subtotal, Decimal::ZERO);
        assert_eq!(totals.total_excl_vat, Decimal::ZERO);
        assert_eq!(totals.total_incl_vat, Decimal::ZERO);
    }

    #[test]
    fn rollup_is_idempotent() {
        let lines = vec![
            line(None, dec!(7), costs(dec!(1.25), dec!(52), dec!(8.4), dec!(0), dec!(0))),
            line(None, dec!(1), costs(dec!(0), dec!(0), dec!(0), dec!(0), dec!(1999.99))),
        ];
        let m = markup(dec!(6), dec!(8), dec!(2), dec!(21));
        assert_eq!(compute(&m, &lines).unwrap(), compute(&m, &lines).unwrap());
    }

    #[test]
    fn chapter_subtotals_skip_unassigned_lines() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let lines = vec![
            line(Some(a), dec!(2), costs(dec!(0), dec!(0), dec!(10), dec!(0), dec!(0))),
            line(Some(a), dec!(1), costs(dec!(0), dec!(0), dec!(5), dec!(0), dec!(0))),
            line(Some(b), dec!(3), costs(dec!(1), dec!(40), dec!(0), dec!(0), dec!(0))),
            line(None, dec!(100), costs(dec!(0), dec!(0), dec!(1), dec!(0), dec!(0))),
        ];

        let subtotals = chapter_subtotals(&lines).unwrap();

        assert_eq!(subtotals.len(), 2);
        assert_eq!(subtotals[&a], dec!(25));
        assert_eq!(subtotals[&b], dec!(120));
    }

    #[test]
    fn overflowing_sum_is_an_error_not_a_panic() {
        let big = dec!(1000000000);
        let lines: Vec<LineItem> = (0..100)
            .map(|_| line(None, big, costs(big, big, big, big, big)))
            .collect();

        let err = compute(&Markup::default(), &lines).unwrap_err();

        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn failed_apply_leaves_estimate_untouched() {
        let big = dec!(1000000000);
        let mut estimate = Estimate::new(
            Uuid::new_v4(),
            crate::models::CreateEstimate {
                name: "Begroting".to_string(),
                description: None,
                valid_until: None,
                notes: None,
                general_costs_percent: None,
                profit_percent: None,
                risk_percent: None,
                vat_percent: None,
            },
        );
        let lines: Vec<LineItem> = (0..100)
            .map(|_| line(None, big, costs(big, big, big, big, big)))
            .collect();

        assert!(apply(&mut estimate, &mut [], &lines).is_err());
        assert_eq!(estimate.subtotal, Decimal::ZERO);
    }
}
