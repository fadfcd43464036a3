use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, info};

use crate::fees::{hours_to_tenths, DailyCapacity};
use crate::models::{round_to, ExpenseLine, FeeLine, LineItem, BLOCK_SEPARATOR};

const MIN_BLOCK_SIZE: usize = 2;
const MAX_BLOCK_SIZE: usize = 5;

/// Add or strip the single block-billed entry on an invoice.
///
/// When disabled, every line whose description contains the block separator
/// is dropped. When enabled and no block-billed line exists, two to five lines
/// of one kind are merged into a line that keeps the first sampled line's
/// attribution, date and position. Fee lines are preferred, and are only
/// merged in if the combined hours still fit the first line's daily ceiling.
/// Expense lines are merged when no fee block can be formed.
pub fn apply_block_billing<R: Rng + ?Sized>(
    rng: &mut R,
    items: Vec<LineItem>,
    enabled: bool,
    max_daily_hours: f64,
) -> Vec<LineItem> {
    if !enabled {
        let before = items.len();
        let kept: Vec<LineItem> = items.into_iter().filter(|i| !i.is_block_billed()).collect();
        if kept.len() < before {
            info!(removed = before - kept.len(), "Removed block-billed lines");
        }
        return kept;
    }

    if items.iter().any(LineItem::is_block_billed) {
        debug!("Invoice already has a block-billed line");
        return items;
    }

    if let Some(chosen) = fee_block(rng, &items, max_daily_hours) {
        let fees: Vec<&FeeLine> = chosen.iter().filter_map(|&idx| items[idx].as_fee()).collect();
        let merged = merge_fees(&fees);
        info!(
            merged = chosen.len(),
            hours = merged.hours,
            total = merged.total,
            "Created block-billed fee line"
        );
        return replace_block(items, &chosen, LineItem::Fee(merged));
    }

    if let Some(chosen) = expense_block(rng, &items) {
        let expenses: Vec<&ExpenseLine> = chosen
            .iter()
            .filter_map(|&idx| items[idx].as_expense())
            .collect();
        let merged = merge_expenses(&expenses);
        info!(
            merged = chosen.len(),
            total = merged.total,
            "Created block-billed expense line"
        );
        return replace_block(items, &chosen, LineItem::Expense(merged));
    }

    debug!("No two lines of one kind can be block billed");
    items
}

fn indices_where(items: &[LineItem], keep: impl Fn(&LineItem) -> bool) -> Vec<usize> {
    items
        .iter()
        .enumerate()
        .filter(|(_, item)| keep(item))
        .map(|(idx, _)| idx)
        .collect()
}

fn block_size<R: Rng + ?Sized>(rng: &mut R, available: usize) -> usize {
    rng.gen_range(MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE.min(available))
}

fn fee_block<R: Rng + ?Sized>(
    rng: &mut R,
    items: &[LineItem],
    max_daily_hours: f64,
) -> Option<Vec<usize>> {
    let mut candidates = indices_where(items, LineItem::is_fee);
    if candidates.len() < MIN_BLOCK_SIZE {
        return None;
    }

    let target = block_size(rng, candidates.len());
    candidates.shuffle(rng);

    let chosen = select_block(items, &candidates, target, max_daily_hours);
    if chosen.len() < MIN_BLOCK_SIZE {
        debug!("No fee lines fit alongside the anchor line");
        return None;
    }
    Some(chosen)
}

fn expense_block<R: Rng + ?Sized>(rng: &mut R, items: &[LineItem]) -> Option<Vec<usize>> {
    let mut candidates = indices_where(items, |i| !i.is_fee());
    if candidates.len() < MIN_BLOCK_SIZE {
        return None;
    }

    let target = block_size(rng, candidates.len());
    candidates.shuffle(rng);
    candidates.truncate(target);
    Some(candidates)
}

/// Swap the anchor (first chosen index) for the merged line and drop the rest
fn replace_block(items: Vec<LineItem>, chosen: &[usize], merged: LineItem) -> Vec<LineItem> {
    let anchor = chosen[0];
    let mut merged = Some(merged);
    items
        .into_iter()
        .enumerate()
        .filter_map(|(idx, item)| {
            if idx == anchor {
                merged.take()
            } else if chosen.contains(&idx) {
                None
            } else {
                Some(item)
            }
        })
        .collect()
}

/// Walk the shuffled candidates, keeping those that fit the anchor's day
fn select_block(
    items: &[LineItem],
    candidates: &[usize],
    target: usize,
    max_daily_hours: f64,
) -> Vec<usize> {
    let Some((&anchor_idx, rest)) = candidates.split_first() else {
        return Vec::new();
    };
    let Some(anchor) = items[anchor_idx].as_fee() else {
        return Vec::new();
    };

    let capacity = DailyCapacity::from_items(max_daily_hours, items);
    let mut remaining = capacity.remaining(anchor.date, &anchor.timekeeper.id);
    let mut chosen = vec![anchor_idx];

    for &idx in rest {
        if chosen.len() == target {
            break;
        }
        let Some(fee) = items[idx].as_fee() else {
            continue;
        };

        // Same timekeeper and day is already counted against the anchor's bucket
        if fee.date == anchor.date && fee.timekeeper.id == anchor.timekeeper.id {
            chosen.push(idx);
            continue;
        }

        let tenths = hours_to_tenths(fee.hours);
        if tenths <= remaining {
            remaining -= tenths;
            chosen.push(idx);
        }
    }

    chosen
}

fn join_descriptions<'a>(descriptions: impl Iterator<Item = &'a str>) -> String {
    descriptions.collect::<Vec<_>>().join(BLOCK_SEPARATOR)
}

fn merge_fees(fees: &[&FeeLine]) -> FeeLine {
    let first = fees[0];

    FeeLine {
        date: first.date,
        description: join_descriptions(fees.iter().map(|f| f.description.as_str())),
        hours: round_to(fees.iter().map(|f| f.hours).sum(), 1),
        rate: first.rate,
        total: round_to(fees.iter().map(|f| f.total).sum(), 2),
        timekeeper: first.timekeeper.clone(),
        task_code: first.task_code.clone(),
        activity_code: first.activity_code.clone(),
    }
}

/// A merged expense bills one unit at the combined amount
fn merge_expenses(expenses: &[&ExpenseLine]) -> ExpenseLine {
    let first = expenses[0];
    let total = round_to(expenses.iter().map(|e| e.total).sum(), 2);

    ExpenseLine {
        date: first.date,
        description: join_descriptions(expenses.iter().map(|e| e.description.as_str())),
        units: 1,
        rate: total,
        total,
        expense_code: first.expense_code.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{sum_totals, TimekeeperRef};
    use chrono::NaiveDate;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn fee(day: u32, tk: &str, hours: f64, description: &str) -> LineItem {
        LineItem::Fee(FeeLine {
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            description: description.to_string(),
            hours,
            rate: 200.0,
            total: round_to(hours * 200.0, 2),
            timekeeper: TimekeeperRef {
                name: tk.to_string(),
                classification: "Associate".to_string(),
                id: tk.to_string(),
            },
            task_code: "L110".to_string(),
            activity_code: "A101".to_string(),
        })
    }

    fn expense(description: &str, total: f64) -> LineItem {
        LineItem::Expense(ExpenseLine {
            date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            description: description.to_string(),
            units: 1,
            rate: total,
            total,
            expense_code: "E108".to_string(),
        })
    }

    fn sample_items() -> Vec<LineItem> {
        vec![
            fee(1, "TK1", 1.0, "Draft letter"),
            fee(2, "TK2", 0.5, "Review file"),
            expense("Postage", 12.5),
            fee(3, "TK1", 1.5, "Research issue"),
            fee(4, "TK3", 2.0, "Call client"),
            fee(5, "TK2", 0.7, "Prepare outline"),
        ]
    }

    #[test]
    fn test_enable_creates_single_block() {
        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let before = sample_items();
            let after = apply_block_billing(&mut rng, before.clone(), true, 10.0);

            let blocks: Vec<_> = after.iter().filter(|i| i.is_block_billed()).collect();
            assert_eq!(blocks.len(), 1);

            let merged_parts = blocks[0].description().split(BLOCK_SEPARATOR).count();
            assert!((2..=5).contains(&merged_parts));
            assert_eq!(after.len(), before.len() - merged_parts + 1);

            // The block's total is exactly what left the invoice
            let others: f64 = after
                .iter()
                .filter(|i| !i.is_block_billed())
                .map(LineItem::total)
                .sum();
            assert_eq!(blocks[0].total(), round_to(sum_totals(&before) - others, 2));
            assert_eq!(sum_totals(&before), sum_totals(&after));
            assert!(after.iter().any(|i| !i.is_fee()));
        }
    }

    fn coded_expense(code: &str, description: &str, total: f64) -> LineItem {
        LineItem::Expense(ExpenseLine {
            expense_code: code.to_string(),
            ..expense(description, total).as_expense().unwrap().clone()
        })
    }

    #[test]
    fn test_enable_respects_daily_ceiling() {
        let mut rng = StdRng::seed_from_u64(3);
        let items = vec![
            fee(1, "TK1", 6.0, "Trial prep"),
            fee(2, "TK1", 6.0, "Trial prep"),
            fee(3, "TK1", 6.0, "Trial prep"),
        ];
        let after = apply_block_billing(&mut rng, items.clone(), true, 8.0);
        assert_eq!(after, items);
    }

    #[test]
    fn test_ceiling_conflict_falls_back_to_expenses() {
        for seed in 0..10 {
            let mut rng = StdRng::seed_from_u64(seed);
            let items = vec![
                fee(1, "TK1", 6.0, "Trial prep"),
                fee(2, "TK1", 6.0, "Trial prep"),
                expense("Postage", 12.5),
                expense("Courier", 30.0),
            ];
            let after = apply_block_billing(&mut rng, items.clone(), true, 8.0);

            assert_eq!(after.len(), 3);
            assert_eq!(after.iter().filter(|i| i.is_fee()).count(), 2);
            let block = after.iter().find(|i| i.is_block_billed()).unwrap();
            assert!(!block.is_fee());
            assert_eq!(block.total(), 42.5);
            assert_eq!(sum_totals(&items), sum_totals(&after));
        }
    }

    #[test]
    fn test_expense_only_invoice_is_block_billed() {
        let before = vec![
            coded_expense("E108", "Postage", 12.5),
            coded_expense("E107", "Courier", 30.0),
            coded_expense("E105", "Conference call", 18.25),
        ];

        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let after = apply_block_billing(&mut rng, before.clone(), true, 10.0);

            let blocks: Vec<_> = after.iter().filter(|i| i.is_block_billed()).collect();
            assert_eq!(blocks.len(), 1);
            let block = blocks[0].as_expense().unwrap();

            let parts: Vec<&str> = block.description.split(BLOCK_SEPARATOR).collect();
            assert!((2..=3).contains(&parts.len()));
            assert_eq!(after.len(), before.len() - parts.len() + 1);

            // Code and date come from the first sampled line
            let anchor = before
                .iter()
                .filter_map(LineItem::as_expense)
                .find(|e| e.description == parts[0])
                .unwrap();
            assert_eq!(block.expense_code, anchor.expense_code);
            assert_eq!(block.date, anchor.date);
            assert_eq!(block.units, 1);
            assert_eq!(block.rate, block.total);
            assert_eq!(sum_totals(&before), sum_totals(&after));
        }
    }

    #[test]
    fn test_disable_strips_blocks() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut items = sample_items();
        items.push(fee(6, "TK1", 2.0, "Draft motion; review exhibits"));

        let after = apply_block_billing(&mut rng, items, false, 10.0);
        assert_eq!(after.len(), 6);
        assert!(after.iter().all(|i| !i.is_block_billed()));
    }

    #[test]
    fn test_existing_block_untouched() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut items = sample_items();
        items.push(fee(6, "TK1", 2.0, "Draft motion; review exhibits"));

        let after = apply_block_billing(&mut rng, items.clone(), true, 10.0);
        assert_eq!(after, items);
    }

    #[test]
    fn test_one_line_of_each_kind_is_noop() {
        let mut rng = StdRng::seed_from_u64(6);
        let items = vec![fee(1, "TK1", 1.0, "Draft letter"), expense("Postage", 5.0)];
        let after = apply_block_billing(&mut rng, items.clone(), true, 10.0);
        assert_eq!(after, items);
    }
}
