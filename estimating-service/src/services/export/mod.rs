//! Read-only projections of an estimate into external file formats.

mod cuf;
mod ifc;
mod xlsx;

use std::str::FromStr;

use rust_decimal::Decimal;
use service_core::error::AppError;
use tracing::{info, instrument};

use crate::config::Feature;
use crate::models::{Chapter, Client, EstimateTree, LineItem, Project};
use crate::services::metrics::EXPORTS_TOTAL;

pub use ifc::ifc_guid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Xlsx,
    Ifc,
    Cuf,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Xlsx => "xlsx",
            ExportFormat::Ifc => "ifc",
            ExportFormat::Cuf => "cuf",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Xlsx => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
            ExportFormat::Ifc => "application/x-step",
            ExportFormat::Cuf => "application/xml",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Xlsx => "xlsx",
            ExportFormat::Ifc => "ifc",
            ExportFormat::Cuf => "xml",
        }
    }

    /// Edition feature that unlocks this format.
    pub fn feature(&self) -> Feature {
        match self {
            ExportFormat::Xlsx => Feature::ExportXlsx,
            ExportFormat::Ifc => Feature::ExportIfc,
            ExportFormat::Cuf => Feature::ExportCuf,
        }
    }
}

impl FromStr for ExportFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "xlsx" => Ok(ExportFormat::Xlsx),
            "ifc" => Ok(ExportFormat::Ifc),
            "cuf" | "xml" => Ok(ExportFormat::Cuf),
            other => Err(AppError::bad_request(format!(
                "Unknown export format '{}', expected xlsx, ifc or cuf",
                other
            ))),
        }
    }
}

/// Everything an export needs: the estimate tree plus its project context.
#[derive(Debug, Clone)]
pub struct ExportDocument {
    pub project: Project,
    pub client: Option<Client>,
    pub tree: EstimateTree,
}

impl ExportDocument {
    /// Chapters in display order with their lines, then unassigned lines
    /// under `None` when there are any.
    pub fn sections(&self) -> Vec<(Option<&Chapter>, Vec<&LineItem>)> {
        let mut sections: Vec<(Option<&Chapter>, Vec<&LineItem>)> = self
            .tree
            .sorted_chapters()
            .into_iter()
            .map(|chapter| (Some(chapter), self.tree.lines_in(Some(chapter.chapter_id))))
            .collect();
        let unassigned = self.tree.lines_in(None);
        if !unassigned.is_empty() {
            sections.push((None, unassigned));
        }
        sections
    }

    /// Download name such as `Verbouwing_keuken_v2.xlsx`.
    pub fn file_name(&self, format: ExportFormat) -> String {
        let stem: String = self
            .tree
            .estimate
            .name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        format!(
            "{}_v{}.{}",
            stem,
            self.tree.estimate.version,
            format.extension()
        )
    }
}

/// Fixed two-decimal rendering used for money in text formats.
pub(crate) fn money(value: Decimal) -> String {
    format!("{:.2}", value)
}

/// Serialize `doc` into `format`. Never mutates state.
#[instrument(skip(doc), fields(estimate_id = %doc.tree.estimate.estimate_id, format = format.as_str()))]
pub fn render(format: ExportFormat, doc: &ExportDocument) -> Result<Vec<u8>, AppError> {
    let bytes = match format {
        ExportFormat::Xlsx => xlsx::render(doc)?,
        ExportFormat::Ifc => ifc::render(doc).into_bytes(),
        ExportFormat::Cuf => cuf::render(doc)?,
    };

    EXPORTS_TOTAL.with_label_values(&[format.as_str()]).inc();
    info!(bytes = bytes.len(), "Estimate exported");
    Ok(bytes)
}
