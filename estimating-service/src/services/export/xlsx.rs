//! Four-sheet workbook: Project, Lines, Summary, Chapters.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};
use service_core::error::AppError;

use super::ExportDocument;

fn xlsx_error(e: XlsxError) -> AppError {
    AppError::InternalError(anyhow::anyhow!("Failed to build workbook: {}", e))
}

fn number(value: Decimal) -> f64 {
    value.to_f64().unwrap_or_default()
}

struct Formats {
    header: Format,
    money: Format,
    money_bold: Format,
    quantity: Format,
}

impl Formats {
    fn new() -> Self {
        Self {
            header: Format::new().set_bold(),
            money: Format::new().set_num_format("#,##0.00"),
            money_bold: Format::new().set_num_format("#,##0.00").set_bold(),
            quantity: Format::new().set_num_format("#,##0.###"),
        }
    }
}

fn write_header(sheet: &mut Worksheet, headers: &[&str], format: &Format) -> Result<(), XlsxError> {
    for (col, title) in headers.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *title, format)?;
    }
    Ok(())
}

fn project_sheet(sheet: &mut Worksheet, doc: &ExportDocument, f: &Formats) -> Result<(), XlsxError> {
    sheet.set_name("Project")?;
    sheet.set_column_width(0, 22)?;
    sheet.set_column_width(1, 48)?;

    let estimate = &doc.tree.estimate;
    let rows: Vec<(&str, String)> = vec![
        ("Project", doc.project.name.clone()),
        (
            "Project number",
            doc.project.project_number.clone().unwrap_or_default(),
        ),
        ("Address", doc.project.address.clone().unwrap_or_default()),
        ("City", doc.project.city.clone().unwrap_or_default()),
        (
            "Client",
            doc.client.as_ref().map(|c| c.name.clone()).unwrap_or_default(),
        ),
        ("Estimate", estimate.name.clone()),
        ("Version", estimate.version.to_string()),
        ("Status", estimate.status.clone()),
        (
            "Valid until",
            estimate
                .valid_until
                .map(|d| d.to_string())
                .unwrap_or_default(),
        ),
        ("Date", estimate.updated_utc.date_naive().to_string()),
    ];

    for (row, (label, value)) in rows.into_iter().enumerate() {
        sheet.write_string_with_format(row as u32, 0, label, &f.header)?;
        sheet.write_string(row as u32, 1, value)?;
    }
    Ok(())
}

fn lines_sheet(sheet: &mut Worksheet, doc: &ExportDocument, f: &Formats) -> Result<(), XlsxError> {
    sheet.set_name("Lines")?;
    write_header(
        sheet,
        &[
            "Chapter",
            "Code",
            "Description",
            "Quantity",
            "Unit",
            "Labor hours",
            "Labor rate",
            "Labor cost",
            "Material",
            "Equipment",
            "Subcontractor",
            "Unit price",
            "Total",
        ],
        &f.header,
    )?;
    sheet.set_column_width(0, 24)?;
    sheet.set_column_width(2, 48)?;

    let mut row: u32 = 1;
    for (chapter, lines) in doc.sections() {
        let chapter_label = chapter.map(|c| c.name.as_str()).unwrap_or("(no chapter)");
        for line in lines {
            sheet.write_string(row, 0, chapter_label)?;
            sheet.write_string(row, 1, line.code.as_deref().unwrap_or(""))?;
            sheet.write_string(row, 2, &line.description)?;
            sheet.write_number_with_format(row, 3, number(line.quantity), &f.quantity)?;
            sheet.write_string(row, 4, &line.unit)?;
            sheet.write_number_with_format(row, 5, number(line.labor_hours), &f.quantity)?;
            sheet.write_number_with_format(row, 6, number(line.labor_rate), &f.money)?;
            sheet.write_number_with_format(row, 7, number(line.labor_cost), &f.money)?;
            sheet.write_number_with_format(row, 8, number(line.material_cost), &f.money)?;
            sheet.write_number_with_format(row, 9, number(line.equipment_cost), &f.money)?;
            sheet.write_number_with_format(row, 10, number(line.subcontr_cost), &f.money)?;
            sheet.write_number_with_format(row, 11, number(line.unit_price), &f.money)?;
            sheet.write_number_with_format(row, 12, number(line.total_price), &f.money)?;
            row += 1;
        }
    }
    Ok(())
}

fn summary_sheet(sheet: &mut Worksheet, doc: &ExportDocument, f: &Formats) -> Result<(), XlsxError> {
    sheet.set_name("Summary")?;
    sheet.set_column_width(0, 28)?;
    sheet.set_column_width(1, 16)?;

    let e = &doc.tree.estimate;
    let rows: [(String, Decimal, bool); 11] = [
        ("Labor".to_string(), e.total_labor, false),
        ("Material".to_string(), e.total_material, false),
        ("Equipment".to_string(), e.total_equipment, false),
        ("Subcontractors".to_string(), e.total_subcontr, false),
        ("Subtotal".to_string(), e.subtotal, true),
        (
            format!("General costs ({}%)", e.general_costs_percent.normalize()),
            e.general_costs_amount,
            false,
        ),
        (
            format!("Profit ({}%)", e.profit_percent.normalize()),
            e.profit_amount,
            false,
        ),
        (
            format!("Risk ({}%)", e.risk_percent.normalize()),
            e.risk_amount,
            false,
        ),
        ("Total excl. VAT".to_string(), e.total_excl_vat, true),
        (
            format!("VAT ({}%)", e.vat_percent.normalize()),
            e.vat_amount,
            false,
        ),
        ("Total incl. VAT".to_string(), e.total_incl_vat, true),
    ];

    for (row, (label, amount, bold)) in rows.iter().enumerate() {
        let row = row as u32;
        if *bold {
            sheet.write_string_with_format(row, 0, label, &f.header)?;
            sheet.write_number_with_format(row, 1, number(*amount), &f.money_bold)?;
        } else {
            sheet.write_string(row, 0, label)?;
            sheet.write_number_with_format(row, 1, number(*amount), &f.money)?;
        }
    }
    Ok(())
}

fn chapters_sheet(sheet: &mut Worksheet, doc: &ExportDocument, f: &Formats) -> Result<(), XlsxError> {
    sheet.set_name("Chapters")?;
    write_header(sheet, &["Code", "Name", "Lines", "Subtotal"], &f.header)?;
    sheet.set_column_width(1, 36)?;

    let mut row: u32 = 1;
    for (chapter, lines) in doc.sections() {
        let subtotal = match chapter {
            Some(c) => c.subtotal,
            None => lines.iter().map(|l| l.total_price).sum(),
        };
        sheet.write_string(row, 0, chapter.and_then(|c| c.code.as_deref()).unwrap_or(""))?;
        sheet.write_string(
            row,
            1,
            chapter.map(|c| c.name.as_str()).unwrap_or("(no chapter)"),
        )?;
        sheet.write_number(row, 2, lines.len() as f64)?;
        sheet.write_number_with_format(row, 3, number(subtotal), &f.money)?;
        row += 1;
    }
    Ok(())
}

pub(super) fn render(doc: &ExportDocument) -> Result<Vec<u8>, AppError> {
    let formats = Formats::new();
    let mut workbook = Workbook::new();

    project_sheet(workbook.add_worksheet(), doc, &formats).map_err(xlsx_error)?;
    lines_sheet(workbook.add_worksheet(), doc, &formats).map_err(xlsx_error)?;
    summary_sheet(workbook.add_worksheet(), doc, &formats).map_err(xlsx_error)?;
    chapters_sheet(workbook.add_worksheet(), doc, &formats).map_err(xlsx_error)?;

    workbook.save_to_buffer().map_err(xlsx_error)
}
