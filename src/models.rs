use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Substring that marks a block-billed description
pub const BLOCK_SEPARATOR: &str = "; ";

/// A billable resource (attorney, paralegal, staff)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timekeeper {
    pub name: String,
    pub classification: String,
    pub id: String,
    pub rate: f64,
}

/// A UTBMS task/activity pair with its description template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskActivity {
    pub task_code: String,
    pub activity_code: String,
    pub description: String,
}

/// Timekeeper attribution carried by a fee line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimekeeperRef {
    pub name: String,
    pub classification: String,
    pub id: String,
}

impl From<&Timekeeper> for TimekeeperRef {
    fn from(tk: &Timekeeper) -> Self {
        Self {
            name: tk.name.clone(),
            classification: tk.classification.clone(),
            id: tk.id.clone(),
        }
    }
}

/// A time entry billed by a timekeeper
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeLine {
    pub date: NaiveDate,
    pub description: String,
    pub hours: f64,
    pub rate: f64,
    pub total: f64,
    pub timekeeper: TimekeeperRef,
    pub task_code: String,
    pub activity_code: String,
}

/// A disbursement billed against an expense code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenseLine {
    pub date: NaiveDate,
    pub description: String,
    pub units: u32,
    pub rate: f64,
    pub total: f64,
    pub expense_code: String,
}

/// An invoice line item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum LineItem {
    Fee(FeeLine),
    Expense(ExpenseLine),
}

impl LineItem {
    pub fn date(&self) -> NaiveDate {
        match self {
            LineItem::Fee(f) => f.date,
            LineItem::Expense(e) => e.date,
        }
    }

    pub fn description(&self) -> &str {
        match self {
            LineItem::Fee(f) => &f.description,
            LineItem::Expense(e) => &e.description,
        }
    }

    pub fn total(&self) -> f64 {
        match self {
            LineItem::Fee(f) => f.total,
            LineItem::Expense(e) => e.total,
        }
    }

    pub fn unit_rate(&self) -> f64 {
        match self {
            LineItem::Fee(f) => f.rate,
            LineItem::Expense(e) => e.rate,
        }
    }

    pub fn is_fee(&self) -> bool {
        matches!(self, LineItem::Fee(_))
    }

    pub fn as_fee(&self) -> Option<&FeeLine> {
        match self {
            LineItem::Fee(f) => Some(f),
            LineItem::Expense(_) => None,
        }
    }

    pub fn as_expense(&self) -> Option<&ExpenseLine> {
        match self {
            LineItem::Expense(e) => Some(e),
            LineItem::Fee(_) => None,
        }
    }

    /// Whether this line is a block-billed entry
    pub fn is_block_billed(&self) -> bool {
        self.description().contains(BLOCK_SEPARATOR)
    }
}

/// Inclusive date range an invoice covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl BillingPeriod {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Number of days in the period, at least one
    pub fn num_days(&self) -> i64 {
        ((self.end - self.start).num_days() + 1).max(1)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    /// The period of equal length immediately preceding this one
    pub fn previous(&self) -> Self {
        let len = chrono::Duration::days(self.num_days());
        Self {
            start: self.start - len,
            end: self.end - len,
        }
    }
}

/// Invoice-level metadata attached to every line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceHeader {
    pub client_id: String,
    pub law_firm_id: String,
    pub description: String,
}

/// A generated invoice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub header: InvoiceHeader,
    pub period: BillingPeriod,
    pub line_items: Vec<LineItem>,
    pub total: f64,
}

impl Invoice {
    pub fn new(header: InvoiceHeader, period: BillingPeriod, line_items: Vec<LineItem>) -> Self {
        let total = sum_totals(&line_items);
        Self {
            header,
            period,
            line_items,
            total,
        }
    }

    pub fn fee_lines(&self) -> impl Iterator<Item = &FeeLine> {
        self.line_items.iter().filter_map(LineItem::as_fee)
    }

    pub fn expense_lines(&self) -> impl Iterator<Item = &ExpenseLine> {
        self.line_items.iter().filter_map(LineItem::as_expense)
    }
}

/// Round half away from zero to the given number of decimal places
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Sum already-rounded line totals, rounded to the cent
pub fn sum_totals(items: &[LineItem]) -> f64 {
    round_to(items.iter().map(LineItem::total).sum(), 2)
}
