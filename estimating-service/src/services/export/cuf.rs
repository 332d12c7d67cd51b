//! CUF-XML: the Dutch calculation exchange layout (`<CUF versie="1.0">`).

use std::fmt::Display;
use std::io::Cursor;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use rust_decimal::Decimal;
use service_core::error::AppError;

use super::{money, ExportDocument};
use crate::models::{Chapter, LineItem};

const CUF_VERSION: &str = "1.0";

fn xml_error<E: Display>(e: E) -> AppError {
    AppError::InternalError(anyhow::anyhow!("Failed to write CUF-XML: {}", e))
}

struct CufWriter {
    inner: Writer<Cursor<Vec<u8>>>,
}

impl CufWriter {
    fn new() -> Self {
        Self {
            inner: Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2),
        }
    }

    fn event(&mut self, event: Event<'_>) -> Result<(), AppError> {
        self.inner.write_event(event).map_err(xml_error)
    }

    fn start(&mut self, name: &str) -> Result<(), AppError> {
        self.event(Event::Start(BytesStart::new(name)))
    }

    fn start_with(&mut self, name: &str, attributes: &[(&str, &str)]) -> Result<(), AppError> {
        let start = BytesStart::new(name).with_attributes(attributes.iter().copied());
        self.event(Event::Start(start))
    }

    fn end(&mut self, name: &str) -> Result<(), AppError> {
        self.event(Event::End(BytesEnd::new(name)))
    }

    /// `<name>value</name>`; skipped entirely when `value` is `None`.
    fn element(&mut self, name: &str, value: Option<&str>) -> Result<(), AppError> {
        let Some(value) = value else {
            return Ok(());
        };
        self.start(name)?;
        self.event(Event::Text(BytesText::new(value)))?;
        self.end(name)
    }

    fn amount(&mut self, name: &str, value: Decimal) -> Result<(), AppError> {
        self.element(name, Some(&money(value)))
    }

    /// `<name percentage="p">amount</name>`
    fn markup(&mut self, name: &str, percent: Decimal, value: Decimal) -> Result<(), AppError> {
        let percent = percent.normalize().to_string();
        self.start_with(name, &[("percentage", percent.as_str())])?;
        self.event(Event::Text(BytesText::new(&money(value))))?;
        self.end(name)
    }

    fn finish(self) -> Vec<u8> {
        self.inner.into_inner().into_inner()
    }
}

fn write_line(w: &mut CufWriter, line: &LineItem) -> Result<(), AppError> {
    w.start("Regel")?;
    w.element("Code", line.code.as_deref())?;
    w.element("Omschrijving", Some(&line.description))?;
    w.element("Hoeveelheid", Some(&line.quantity.normalize().to_string()))?;
    w.element("Eenheid", Some(&line.unit))?;
    w.element("Arbeidsuren", Some(&line.labor_hours.normalize().to_string()))?;
    w.amount("Uurloon", line.labor_rate)?;
    w.amount("Arbeid", line.labor_cost)?;
    w.amount("Materiaal", line.material_cost)?;
    w.amount("Materieel", line.equipment_cost)?;
    w.amount("Onderaanneming", line.subcontr_cost)?;
    w.amount("Eenheidsprijs", line.unit_price)?;
    w.amount("Totaal", line.total_price)?;
    w.end("Regel")
}

fn write_chapter(
    w: &mut CufWriter,
    chapter: Option<&Chapter>,
    lines: &[&LineItem],
) -> Result<(), AppError> {
    let code = chapter.and_then(|c| c.code.as_deref()).unwrap_or("");
    w.start_with("Hoofdstuk", &[("code", code)])?;
    w.element(
        "Naam",
        Some(chapter.map(|c| c.name.as_str()).unwrap_or("Overig")),
    )?;
    w.start("Regels")?;
    for line in lines {
        write_line(w, line)?;
    }
    w.end("Regels")?;
    let subtotal = match chapter {
        Some(c) => c.subtotal,
        None => lines.iter().map(|l| l.total_price).sum(),
    };
    w.amount("Subtotaal", subtotal)?;
    w.end("Hoofdstuk")
}

pub(super) fn render(doc: &ExportDocument) -> Result<Vec<u8>, AppError> {
    let estimate = &doc.tree.estimate;
    let mut w = CufWriter::new();

    w.event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    w.start_with("CUF", &[("versie", CUF_VERSION)])?;

    w.start("Project")?;
    w.element("Nummer", doc.project.project_number.as_deref())?;
    w.element("Naam", Some(&doc.project.name))?;
    w.element("Adres", doc.project.address.as_deref())?;
    w.element("Plaats", doc.project.city.as_deref())?;
    if let Some(client) = &doc.client {
        w.start("Opdrachtgever")?;
        w.element("Naam", Some(&client.name))?;
        w.element("Contactpersoon", client.contact_person.as_deref())?;
        w.element("Adres", client.address.as_deref())?;
        w.element("Postcode", client.postal_code.as_deref())?;
        w.element("Plaats", client.city.as_deref())?;
        w.element("KvK", client.kvk_number.as_deref())?;
        w.element("BTWNummer", client.vat_number.as_deref())?;
        w.end("Opdrachtgever")?;
    }
    w.end("Project")?;

    let version = estimate.version.to_string();
    w.start_with("Begroting", &[("versie", version.as_str())])?;
    w.element("Naam", Some(&estimate.name))?;
    w.element("Omschrijving", estimate.description.as_deref())?;
    w.element("Status", Some(&estimate.status))?;
    w.element(
        "Datum",
        Some(&estimate.updated_utc.date_naive().to_string()),
    )?;
    w.element(
        "GeldigTot",
        estimate.valid_until.map(|d| d.to_string()).as_deref(),
    )?;

    w.start("Hoofdstukken")?;
    for (chapter, lines) in doc.sections() {
        write_chapter(&mut w, chapter, &lines)?;
    }
    w.end("Hoofdstukken")?;

    w.start("Totalen")?;
    w.amount("Arbeid", estimate.total_labor)?;
    w.amount("Materiaal", estimate.total_material)?;
    w.amount("Materieel", estimate.total_equipment)?;
    w.amount("Onderaanneming", estimate.total_subcontr)?;
    w.amount("Subtotaal", estimate.subtotal)?;
    w.markup("AlgemeneKosten", estimate.general_costs_percent, estimate.general_costs_amount)?;
    w.markup("Winst", estimate.profit_percent, estimate.profit_amount)?;
    w.markup("Risico", estimate.risk_percent, estimate.risk_amount)?;
    w.amount("TotaalExclBTW", estimate.total_excl_vat)?;
    w.markup("BTW", estimate.vat_percent, estimate.vat_amount)?;
    w.amount("TotaalInclBTW", estimate.total_incl_vat)?;
    w.end("Totalen")?;

    w.end("Begroting")?;
    w.end("CUF")?;
    Ok(w.finish())
}
