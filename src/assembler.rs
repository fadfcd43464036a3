use std::borrow::Cow;

use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{info, warn};

use crate::block_billing::apply_block_billing;
use crate::catalog::default_tasks;
use crate::config::{Config, ExpenseConfig, ForcedAttribution};
use crate::error::GenerationError;
use crate::expenses::generate_expenses;
use crate::fees::{generate_fees, FeePolicy};
use crate::mandatory::{inject_mandatory, MandatoryContext};
use crate::models::{
    BillingPeriod, Invoice, InvoiceHeader, LineItem, TaskActivity, Timekeeper,
};

/// Reference data supplied by the catalog loader
#[derive(Debug, Clone, Default)]
pub struct Catalogs {
    pub timekeepers: Vec<Timekeeper>,
    /// Empty means the built-in task catalog
    pub tasks: Vec<TaskActivity>,
}

/// Policy for generating one invoice
#[derive(Debug, Clone)]
pub struct InvoiceRequest {
    pub header: InvoiceHeader,
    pub period: BillingPeriod,
    pub fee_count: usize,
    pub expense_count: usize,
    pub max_daily_hours: f64,
    pub block_billing: bool,
    pub major_task_codes: Vec<String>,
    pub expenses: ExpenseConfig,
    /// Mandatory item names; empty skips injection
    pub mandatory: Vec<String>,
    pub forced_attributions: Vec<ForcedAttribution>,
    pub today: NaiveDate,
}

impl InvoiceRequest {
    pub fn from_config(
        config: &Config,
        header: InvoiceHeader,
        period: BillingPeriod,
        today: NaiveDate,
    ) -> Self {
        Self {
            header,
            period,
            fee_count: config.generation.fee_count,
            expense_count: config.generation.expense_count,
            max_daily_hours: config.generation.max_daily_hours,
            block_billing: config.generation.block_billing,
            major_task_codes: config.generation.major_task_codes.clone(),
            expenses: config.expenses.clone(),
            mandatory: config.mandatory.selected.clone(),
            forced_attributions: config.mandatory.forced_attributions.clone(),
            today,
        }
    }

    fn validate(&self, catalogs: &Catalogs) -> Result<(), GenerationError> {
        if self.period.start > self.period.end {
            return Err(GenerationError::InvalidBillingPeriod {
                start: self.period.start,
                end: self.period.end,
            });
        }
        if !self.max_daily_hours.is_finite() || self.max_daily_hours <= 0.0 {
            return Err(GenerationError::InvalidMaxDailyHours(self.max_daily_hours));
        }
        if self.fee_count > 0 && catalogs.timekeepers.is_empty() {
            return Err(GenerationError::NoTimekeepers {
                requested: self.fee_count,
            });
        }
        self.expenses.validate()
    }
}

/// Generate, aggregate and total a single invoice
pub fn assemble_invoice<R: Rng + ?Sized>(
    rng: &mut R,
    request: &InvoiceRequest,
    catalogs: &Catalogs,
) -> Result<Invoice, GenerationError> {
    request.validate(catalogs)?;

    let tasks: Cow<'_, [TaskActivity]> = if catalogs.tasks.is_empty() {
        Cow::Owned(default_tasks())
    } else {
        Cow::Borrowed(catalogs.tasks.as_slice())
    };

    let policy = FeePolicy {
        period: request.period,
        max_daily_hours: request.max_daily_hours,
        major_task_codes: &request.major_task_codes,
        today: request.today,
    };

    let fees = generate_fees(rng, request.fee_count, &catalogs.timekeepers, &tasks, &policy);
    let expenses =
        generate_expenses(rng, request.expense_count, &request.period, &request.expenses);

    let mut items: Vec<LineItem> = fees
        .into_iter()
        .map(LineItem::Fee)
        .chain(expenses.into_iter().map(LineItem::Expense))
        .collect();

    items = apply_block_billing(rng, items, request.block_billing, request.max_daily_hours);

    if !request.mandatory.is_empty() {
        let ctx = MandatoryContext {
            selected: &request.mandatory,
            timekeepers: &catalogs.timekeepers,
            period: request.period,
            max_daily_hours: request.max_daily_hours,
            forced_attributions: &request.forced_attributions,
        };
        items = inject_mandatory(rng, items, &ctx)?;
    }

    let invoice = Invoice::new(request.header.clone(), request.period, items);

    info!(
        client = %invoice.header.client_id,
        start = %invoice.period.start,
        end = %invoice.period.end,
        lines = invoice.line_items.len(),
        total = invoice.total,
        "Invoice assembled"
    );

    Ok(invoice)
}

/// Generate `count` independent invoices.
///
/// Invoice `i` uses its own generator seeded with `seed + i` and a billing
/// period shifted back `i` periods, so a failure in one never touches another.
pub fn generate_batch(
    request: &InvoiceRequest,
    catalogs: &Catalogs,
    count: usize,
    seed: u64,
) -> Vec<Result<Invoice, GenerationError>> {
    let mut period = request.period;
    let mut results = Vec::with_capacity(count);

    for i in 0..count {
        let mut rng = StdRng::seed_from_u64(seed.wrapping_add(i as u64));
        let per_invoice = InvoiceRequest {
            period,
            ..request.clone()
        };

        let result = assemble_invoice(&mut rng, &per_invoice, catalogs);
        if let Err(e) = &result {
            warn!(index = i, error = %e, "Invoice generation failed");
        }
        results.push(result);
        period = period.previous();
    }

    results
}
