use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::LedesError;
use crate::models::{Invoice, LineItem};

pub const LEDES_MARKER: &str = "LEDES1998B[]";
const RECORD_END: &str = "[]";
const DATE_FORMAT: &str = "%Y%m%d";
const PIPE_SUBSTITUTE: &str = " - ";

pub const FIELDS: [&str; 24] = [
    "INVOICE_DATE",
    "INVOICE_NUMBER",
    "CLIENT_ID",
    "LAW_FIRM_MATTER_ID",
    "INVOICE_TOTAL",
    "BILLING_START_DATE",
    "BILLING_END_DATE",
    "INVOICE_DESCRIPTION",
    "LINE_ITEM_NUMBER",
    "EXP/FEE/INV_ADJ_TYPE",
    "LINE_ITEM_NUMBER_OF_UNITS",
    "LINE_ITEM_ADJUSTMENT_AMOUNT",
    "LINE_ITEM_TOTAL",
    "LINE_ITEM_DATE",
    "LINE_ITEM_TASK_CODE",
    "LINE_ITEM_EXPENSE_CODE",
    "LINE_ITEM_ACTIVITY_CODE",
    "TIMEKEEPER_ID",
    "LINE_ITEM_DESCRIPTION",
    "LAW_FIRM_ID",
    "LINE_ITEM_UNIT_COST",
    "TIMEKEEPER_NAME",
    "TIMEKEEPER_CLASSIFICATION",
    "CLIENT_MATTER_ID",
];

/// The header line, without a trailing newline
pub fn header_line() -> String {
    format!("{}{}", FIELDS.join("|"), RECORD_END)
}

/// Encode an invoice as a LEDES 1998B document.
///
/// Lines that cannot be encoded (non-finite amounts, dates outside the
/// billing period) are logged and left out; line numbers count only the
/// records actually written.
pub fn to_ledes(invoice: &Invoice, invoice_number: &str, matter_id: &str) -> String {
    let mut out = String::new();
    out.push_str(LEDES_MARKER);
    out.push('\n');
    out.push_str(&header_line());
    out.push('\n');

    let mut line_number = 0u32;
    for (index, item) in invoice.line_items.iter().enumerate() {
        if let Err(reason) = check_line(invoice, item) {
            warn!(index, reason, "Skipping malformed line item");
            continue;
        }
        line_number += 1;
        let fields = record_fields(invoice, item, line_number, invoice_number, matter_id);
        out.push_str(&fields.join("|"));
        out.push_str(RECORD_END);
        out.push('\n');
    }

    debug!(records = line_number, "Serialized LEDES document");

    out
}

fn check_line(invoice: &Invoice, item: &LineItem) -> Result<(), &'static str> {
    let (units, rate, total) = match item {
        LineItem::Fee(f) => (f.hours, f.rate, f.total),
        LineItem::Expense(e) => (e.units as f64, e.rate, e.total),
    };
    if !units.is_finite() || !rate.is_finite() || !total.is_finite() {
        return Err("non-numeric amount");
    }
    if !invoice.period.contains(item.date()) {
        return Err("date outside billing period");
    }
    Ok(())
}

fn record_fields(
    invoice: &Invoice,
    item: &LineItem,
    line_number: u32,
    invoice_number: &str,
    matter_id: &str,
) -> Vec<String> {
    let blank = String::new;

    let (kind, units, task, expense, activity, tk_id, tk_name, tk_class) = match item {
        LineItem::Fee(f) => (
            "F",
            format!("{:.1}", f.hours),
            f.task_code.clone(),
            blank(),
            f.activity_code.clone(),
            f.timekeeper.id.clone(),
            f.timekeeper.name.clone(),
            f.timekeeper.classification.clone(),
        ),
        LineItem::Expense(e) => (
            "E",
            e.units.to_string(),
            blank(),
            e.expense_code.clone(),
            blank(),
            blank(),
            blank(),
            blank(),
        ),
    };

    vec![
        invoice.period.end.format(DATE_FORMAT).to_string(),
        clean(invoice_number),
        clean(&invoice.header.client_id),
        clean(matter_id),
        format!("{:.2}", invoice.total),
        invoice.period.start.format(DATE_FORMAT).to_string(),
        invoice.period.end.format(DATE_FORMAT).to_string(),
        clean(&invoice.header.description),
        line_number.to_string(),
        kind.to_string(),
        units,
        "0.00".to_string(),
        format!("{:.2}", item.total()),
        item.date().format(DATE_FORMAT).to_string(),
        clean(&task),
        clean(&expense),
        clean(&activity),
        clean(&tk_id),
        clean(item.description()),
        clean(&invoice.header.law_firm_id),
        format!("{:.2}", item.unit_rate()),
        clean(&tk_name),
        clean(&tk_class),
        clean(matter_id),
    ]
}

/// Keep free text from breaking field or record boundaries
fn clean(text: &str) -> String {
    text.replace('|', PIPE_SUBSTITUTE)
        .replace(['\r', '\n'], " ")
}

/// Fee or expense record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdjustmentType {
    Fee,
    Expense,
}

/// One decoded LEDES record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedesRecord {
    pub invoice_date: NaiveDate,
    pub invoice_number: String,
    pub client_id: String,
    pub law_firm_matter_id: String,
    pub invoice_total: f64,
    pub billing_start: NaiveDate,
    pub billing_end: NaiveDate,
    pub invoice_description: String,
    pub line_number: u32,
    pub adjustment_type: AdjustmentType,
    pub units: f64,
    pub adjustment_amount: f64,
    pub line_total: f64,
    pub line_date: NaiveDate,
    pub task_code: String,
    pub expense_code: String,
    pub activity_code: String,
    pub timekeeper_id: String,
    pub description: String,
    pub law_firm_id: String,
    pub unit_cost: f64,
    pub timekeeper_name: String,
    pub timekeeper_classification: String,
    pub client_matter_id: String,
}

/// Decode a LEDES 1998B document
pub fn parse_ledes(text: &str) -> Result<Vec<LedesRecord>, LedesError> {
    let mut lines = text.lines();

    if lines.next().map(str::trim) != Some(LEDES_MARKER) {
        return Err(LedesError::MissingMarker);
    }
    if lines.next().map(str::trim) != Some(header_line().as_str()) {
        return Err(LedesError::BadHeader);
    }

    lines
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| parse_record(line, i + 3))
        .collect()
}

fn parse_record(line: &str, line_no: usize) -> Result<LedesRecord, LedesError> {
    let body = line
        .trim_end()
        .strip_suffix(RECORD_END)
        .ok_or(LedesError::Unterminated { line: line_no })?;

    let f: Vec<&str> = body.split('|').collect();
    if f.len() != FIELDS.len() {
        return Err(LedesError::FieldCount {
            line: line_no,
            expected: FIELDS.len(),
            found: f.len(),
        });
    }

    let date = |idx: usize| {
        NaiveDate::parse_from_str(f[idx], DATE_FORMAT).map_err(|_| LedesError::InvalidField {
            line: line_no,
            field: FIELDS[idx],
            value: f[idx].to_string(),
        })
    };
    let number = |idx: usize| {
        f[idx]
            .parse::<f64>()
            .map_err(|_| LedesError::InvalidField {
                line: line_no,
                field: FIELDS[idx],
                value: f[idx].to_string(),
            })
    };

    let adjustment_type = match f[9] {
        "F" => AdjustmentType::Fee,
        "E" => AdjustmentType::Expense,
        other => {
            return Err(LedesError::InvalidField {
                line: line_no,
                field: FIELDS[9],
                value: other.to_string(),
            })
        }
    };

    let line_number = f[8].parse::<u32>().map_err(|_| LedesError::InvalidField {
        line: line_no,
        field: FIELDS[8],
        value: f[8].to_string(),
    })?;

    Ok(LedesRecord {
        invoice_date: date(0)?,
        invoice_number: f[1].to_string(),
        client_id: f[2].to_string(),
        law_firm_matter_id: f[3].to_string(),
        invoice_total: number(4)?,
        billing_start: date(5)?,
        billing_end: date(6)?,
        invoice_description: f[7].to_string(),
        line_number,
        adjustment_type,
        units: number(10)?,
        adjustment_amount: number(11)?,
        line_total: number(12)?,
        line_date: date(13)?,
        task_code: f[14].to_string(),
        expense_code: f[15].to_string(),
        activity_code: f[16].to_string(),
        timekeeper_id: f[17].to_string(),
        description: f[18].to_string(),
        law_firm_id: f[19].to_string(),
        unit_cost: number(20)?,
        timekeeper_name: f[21].to_string(),
        timekeeper_classification: f[22].to_string(),
        client_matter_id: f[23].to_string(),
    })
}
