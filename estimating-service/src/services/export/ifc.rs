//! IFC4 cost schedule in STEP physical file form (ISO 10303-21).
//!
//! Layout: one IFCCOSTSCHEDULE controlling a root IFCCOSTITEM that carries
//! the estimate totals. Chapters nest under the root, lines under their
//! chapter; unassigned lines nest directly under the root.

use std::fmt::Write as _;

use rust_decimal::Decimal;
use uuid::Uuid;

use super::{ExportDocument, ExportFormat};
use crate::models::{Chapter, LineItem};

const GUID_ALPHABET: &[u8; 64] =
    b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz_$";

// Salts for objects that have no row of their own.
const SALT_PROJECT: u128 = 0x5052_4f4a_4543_5400_0000_0000_0000_0001;
const SALT_SCHEDULE: u128 = 0x5343_4845_4455_4c45_0000_0000_0000_0002;
const SALT_ROOT_ITEM: u128 = 0x524f_4f54_4954_454d_0000_0000_0000_0003;
const SALT_NESTS: u128 = 0x4e45_5354_5300_0000_0000_0000_0000_0004;
const SALT_ASSIGNS: u128 = 0x4153_5349_474e_5300_0000_0000_0000_0005;
const SALT_DECLARES: u128 = 0x4445_434c_4152_4553_0000_0000_0000_0006;

/// 22-character IFC GlobalId for a UUID.
pub fn ifc_guid(id: Uuid) -> String {
    let n = id.as_u128();
    let mut out = String::with_capacity(22);
    out.push(GUID_ALPHABET[(n >> 126) as usize] as char);
    for i in 1..22 {
        let shift = 126 - 6 * i;
        out.push(GUID_ALPHABET[((n >> shift) & 0x3f) as usize] as char);
    }
    out
}

fn derived_guid(id: Uuid, salt: u128) -> String {
    ifc_guid(Uuid::from_u128(id.as_u128() ^ salt))
}

/// STEP string literal. Non-ASCII is written as `\X2\` UTF-16 hex.
fn text(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        match c {
            '\'' => out.push_str("''"),
            '\\' => out.push_str("\\\\"),
            c if c.is_ascii() && !c.is_ascii_control() => out.push(c),
            c => {
                out.push_str("\\X2\\");
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    let _ = write!(out, "{:04X}", unit);
                }
                out.push_str("\\X0\\");
            }
        }
    }
    out.push('\'');
    out
}

fn opt_text(value: Option<&str>) -> String {
    value.map(text).unwrap_or_else(|| "$".to_string())
}

/// STEP real: always carries a decimal point.
fn real(value: Decimal) -> String {
    let s = value.normalize().to_string();
    if s.contains('.') {
        s
    } else {
        format!("{}.", s)
    }
}

fn refs(ids: &[usize]) -> String {
    let parts: Vec<String> = ids.iter().map(|id| format!("#{}", id)).collect();
    format!("({})", parts.join(","))
}

struct StepWriter {
    data: String,
    next_id: usize,
}

impl StepWriter {
    fn new() -> Self {
        Self {
            data: String::new(),
            next_id: 1,
        }
    }

    fn add(&mut self, entity: String) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        let _ = writeln!(self.data, "#{}={};", id, entity);
        id
    }

    fn cost_value(&mut self, name: &str, amount: Decimal, category: &str) -> usize {
        self.add(format!(
            "IFCCOSTVALUE({},$,IFCMONETARYMEASURE({}),$,$,$,{},$,$,$)",
            text(name),
            real(amount),
            text(category)
        ))
    }

    fn nest(&mut self, guid: String, owner_history: usize, parent: usize, children: &[usize]) {
        if children.is_empty() {
            return;
        }
        self.add(format!(
            "IFCRELNESTS('{}',#{},$,$,#{},{})",
            guid,
            owner_history,
            parent,
            refs(children)
        ));
    }
}

fn line_item(w: &mut StepWriter, oh: usize, line: &LineItem) -> usize {
    let unit_price = w.cost_value("Unit price", line.unit_price, "UnitPrice");
    let total = w.cost_value("Total", line.total_price, "Total");
    let quantity = w.add(format!(
        "IFCQUANTITYCOUNT('Quantity',{},$,{},$)",
        text(&line.unit),
        real(line.quantity)
    ));
    w.add(format!(
        "IFCCOSTITEM('{}',#{},{},$,$,{},.NOTDEFINED.,{},{})",
        ifc_guid(line.line_item_id),
        oh,
        text(&line.description),
        opt_text(line.code.as_deref()),
        refs(&[unit_price, total]),
        refs(&[quantity])
    ))
}

fn chapter_item(w: &mut StepWriter, oh: usize, chapter: &Chapter, lines: &[&LineItem]) -> usize {
    let subtotal = w.cost_value("Subtotal", chapter.subtotal, "Subtotal");
    let id = w.add(format!(
        "IFCCOSTITEM('{}',#{},{},$,$,{},.NOTDEFINED.,{},$)",
        ifc_guid(chapter.chapter_id),
        oh,
        text(&chapter.name),
        opt_text(chapter.code.as_deref()),
        refs(&[subtotal])
    ));
    let children: Vec<usize> = lines.iter().map(|line| line_item(w, oh, line)).collect();
    w.nest(derived_guid(chapter.chapter_id, SALT_NESTS), oh, id, &children);
    id
}

pub(super) fn render(doc: &ExportDocument) -> String {
    let estimate = &doc.tree.estimate;
    let timestamp = estimate.updated_utc;
    let mut w = StepWriter::new();

    let person = w.add("IFCPERSON($,$,'',$,$,$,$,$)".to_string());
    let organization = w.add(format!(
        "IFCORGANIZATION($,{},$,$,$)",
        text(
            doc.client
                .as_ref()
                .map(|c| c.name.as_str())
                .unwrap_or("OpenCalc")
        )
    ));
    let person_org = w.add(format!(
        "IFCPERSONANDORGANIZATION(#{},#{},$)",
        person, organization
    ));
    let application = w.add(format!(
        "IFCAPPLICATION(#{},{},'OpenCalc Estimating','estimating-service')",
        organization,
        text(env!("CARGO_PKG_VERSION"))
    ));
    let oh = w.add(format!(
        "IFCOWNERHISTORY(#{},#{},$,.NOCHANGE.,$,$,$,{})",
        person_org,
        application,
        timestamp.timestamp()
    ));

    let currency = w.add("IFCMONETARYUNIT('EUR')".to_string());
    let units = w.add(format!("IFCUNITASSIGNMENT({})", refs(&[currency])));
    let project = w.add(format!(
        "IFCPROJECT('{}',#{},{},{},$,{},$,$,#{})",
        derived_guid(doc.project.project_id, SALT_PROJECT),
        oh,
        text(&doc.project.name),
        opt_text(doc.project.description.as_deref()),
        opt_text(doc.project.project_number.as_deref()),
        units
    ));

    let schedule = w.add(format!(
        "IFCCOSTSCHEDULE('{}',#{},{},{},$,'v{}',.ESTIMATE.,{},$,'{}')",
        derived_guid(estimate.estimate_id, SALT_SCHEDULE),
        oh,
        text(&estimate.name),
        opt_text(estimate.description.as_deref()),
        estimate.version,
        text(&estimate.status.to_uppercase()),
        timestamp.format("%Y-%m-%dT%H:%M:%S")
    ));
    w.add(format!(
        "IFCRELDECLARES('{}',#{},$,$,#{},(#{}))",
        derived_guid(estimate.estimate_id, SALT_DECLARES),
        oh,
        project,
        schedule
    ));

    let root_values = vec![
        w.cost_value("Subtotal", estimate.subtotal, "Subtotal"),
        w.cost_value("General costs", estimate.general_costs_amount, "GeneralCosts"),
        w.cost_value("Profit", estimate.profit_amount, "Profit"),
        w.cost_value("Risk", estimate.risk_amount, "Risk"),
        w.cost_value("Total excl. VAT", estimate.total_excl_vat, "TotalExclVat"),
        w.cost_value("VAT", estimate.vat_amount, "Vat"),
        w.cost_value("Total incl. VAT", estimate.total_incl_vat, "TotalInclVat"),
    ];
    let root = w.add(format!(
        "IFCCOSTITEM('{}',#{},{},$,$,$,.NOTDEFINED.,{},$)",
        derived_guid(estimate.estimate_id, SALT_ROOT_ITEM),
        oh,
        text(&estimate.name),
        refs(&root_values)
    ));

    let mut children = Vec::new();
    for (chapter, lines) in doc.sections() {
        match chapter {
            Some(chapter) => children.push(chapter_item(&mut w, oh, chapter, &lines)),
            None => children.extend(lines.iter().map(|line| line_item(&mut w, oh, line))),
        }
    }
    w.nest(derived_guid(estimate.estimate_id, SALT_NESTS), oh, root, &children);

    w.add(format!(
        "IFCRELASSIGNSTOCONTROL('{}',#{},$,$,(#{}),$,#{})",
        derived_guid(estimate.estimate_id, SALT_ASSIGNS),
        oh,
        root,
        schedule
    ));

    let mut out = String::with_capacity(w.data.len() + 512);
    out.push_str("ISO-10303-21;\nHEADER;\n");
    out.push_str("FILE_DESCRIPTION(('ViewDefinition [CostScheduleView]'),'2;1');\n");
    let _ = writeln!(
        out,
        "FILE_NAME({},'{}',(''),({}),'estimating-service','OpenCalc Estimating','');",
        text(&doc.file_name(ExportFormat::Ifc)),
        timestamp.format("%Y-%m-%dT%H:%M:%S"),
        text(doc.client.as_ref().map(|c| c.name.as_str()).unwrap_or(""))
    );
    out.push_str("FILE_SCHEMA(('IFC4'));\nENDSEC;\nDATA;\n");
    out.push_str(&w.data);
    out.push_str("ENDSEC;\nEND-ISO-10303-21;\n");
    out
}
