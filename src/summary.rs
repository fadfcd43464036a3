use std::collections::BTreeMap;

use crate::models::{round_to, Invoice};

/// Generate a markdown summary of an invoice
pub fn generate_summary(invoice: &Invoice, invoice_number: &str) -> String {
    let mut md = String::new();

    md.push_str(&format!("## Invoice {}\n\n", invoice_number));
    md.push_str(&format!(
        "**Client:** `{}` | **Law firm:** `{}`\n\n**Period:** {} to {}\n\n",
        invoice.header.client_id,
        invoice.header.law_firm_id,
        invoice.period.start,
        invoice.period.end
    ));

    if invoice.line_items.is_empty() {
        md.push_str("No line items.\n");
        return md;
    }

    let fee_count = invoice.fee_lines().count();
    let expense_count = invoice.expense_lines().count();
    let fee_total = round_to(invoice.fee_lines().map(|f| f.total).sum(), 2);
    let expense_total = round_to(invoice.expense_lines().map(|e| e.total).sum(), 2);

    md.push_str(&format!(
        "| Type | Lines | Amount |\n|------|-------|--------|\n| Fees | {} | {:.2} |\n| Expenses | {} | {:.2} |\n| **Total** | {} | **{:.2}** |\n\n",
        fee_count,
        fee_total,
        expense_count,
        expense_total,
        invoice.line_items.len(),
        invoice.total
    ));

    // Hours and fees per timekeeper
    let mut by_timekeeper: BTreeMap<&str, (f64, f64)> = BTreeMap::new();
    for fee in invoice.fee_lines() {
        let entry = by_timekeeper.entry(fee.timekeeper.name.as_str()).or_default();
        entry.0 += fee.hours;
        entry.1 += fee.total;
    }

    if !by_timekeeper.is_empty() {
        md.push_str("### Timekeepers\n\n| Name | Hours | Amount |\n|------|-------|--------|\n");
        for (name, (hours, total)) in &by_timekeeper {
            md.push_str(&format!("| {} | {:.1} | {:.2} |\n", name, hours, total));
        }
        md.push('\n');
    }

    let mut by_code: BTreeMap<&str, (u32, f64)> = BTreeMap::new();
    for expense in invoice.expense_lines() {
        let entry = by_code.entry(expense.expense_code.as_str()).or_default();
        entry.0 += 1;
        entry.1 += expense.total;
    }

    if !by_code.is_empty() {
        md.push_str("### Expenses\n\n| Code | Lines | Amount |\n|------|-------|--------|\n");
        for (code, (count, total)) in &by_code {
            md.push_str(&format!("| {} | {} | {:.2} |\n", code, count, total));
        }
        md.push('\n');
    }

    let blocks = invoice
        .line_items
        .iter()
        .filter(|i| i.is_block_billed())
        .count();
    if blocks > 0 {
        md.push_str(&format!("Block-billed lines: {}\n", blocks));
    }

    md
}
