use chrono::{Duration, NaiveDate};
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, info, warn};

use crate::config::ForcedAttribution;
use crate::error::GenerationError;
use crate::fees::{hours_to_tenths, random_date, DailyCapacity};
use crate::models::{
    round_to, BillingPeriod, ExpenseLine, FeeLine, LineItem, Timekeeper, TimekeeperRef,
};

/// Rate used when no timekeeper is available at all
pub const DEFAULT_MANDATORY_RATE: f64 = 250.0;
const FEE_HOURS: (f64, f64) = (0.5, 3.0);
const EXPENSE_AMOUNT: (f64, f64) = (25.0, 80.0);

/// Shape of a mandatory line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MandatoryKind {
    Fee {
        task_code: &'static str,
        activity_code: &'static str,
        timekeeper: &'static str,
    },
    Expense {
        expense_code: &'static str,
    },
}

/// A named compliance line forced into an invoice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MandatoryItem {
    pub name: &'static str,
    pub description: &'static str,
    pub kind: MandatoryKind,
}

const MANDATORY_ITEMS: &[MandatoryItem] = &[
    MandatoryItem {
        name: "KBCG",
        description: "Communicate with KBCG regarding litigation hold and document preservation",
        kind: MandatoryKind::Fee {
            task_code: "L140",
            activity_code: "A107",
            timekeeper: "Tom Delaganis",
        },
    },
    MandatoryItem {
        name: "John Doe",
        description: "Telephone conference with John Doe regarding deposition scheduling",
        kind: MandatoryKind::Fee {
            task_code: "L330",
            activity_code: "A106",
            timekeeper: "Ryan Kinsey",
        },
    },
    MandatoryItem {
        name: "Partner: Paralegal Tasks",
        description: "Organize and index case file documents for attorney review",
        kind: MandatoryKind::Fee {
            task_code: "L140",
            activity_code: "A103",
            timekeeper: "Tom Delaganis",
        },
    },
    MandatoryItem {
        name: "Attorney Travel",
        description: "Travel to and from client's office for case strategy meeting",
        kind: MandatoryKind::Fee {
            task_code: "L120",
            activity_code: "A109",
            timekeeper: "Ryan Kinsey",
        },
    },
    MandatoryItem {
        name: "Airfare",
        description: "Airfare for attendance at out-of-town deposition",
        kind: MandatoryKind::Expense {
            expense_code: "E110",
        },
    },
    MandatoryItem {
        name: "Uber",
        description: "Uber ride to courthouse for hearing",
        kind: MandatoryKind::Expense {
            expense_code: "E110",
        },
    },
    MandatoryItem {
        name: "Working Meal",
        description: "Working lunch with client representatives",
        kind: MandatoryKind::Expense {
            expense_code: "E111",
        },
    },
];

/// All mandatory items, in catalog order
pub fn mandatory_items() -> &'static [MandatoryItem] {
    MANDATORY_ITEMS
}

pub fn find_mandatory_item(name: &str) -> Option<&'static MandatoryItem> {
    MANDATORY_ITEMS
        .iter()
        .find(|item| item.name.eq_ignore_ascii_case(name.trim()))
}

/// Everything the injector needs besides the lines themselves
#[derive(Debug, Clone)]
pub struct MandatoryContext<'a> {
    pub selected: &'a [String],
    pub timekeepers: &'a [Timekeeper],
    pub period: BillingPeriod,
    pub max_daily_hours: f64,
    pub forced_attributions: &'a [ForcedAttribution],
}

/// Append the selected mandatory lines, then apply forced attribution to every line
pub fn inject_mandatory<R: Rng + ?Sized>(
    rng: &mut R,
    items: Vec<LineItem>,
    ctx: &MandatoryContext<'_>,
) -> Result<Vec<LineItem>, GenerationError> {
    let selected = ctx
        .selected
        .iter()
        .map(|name| {
            find_mandatory_item(name)
                .ok_or_else(|| GenerationError::UnknownMandatoryItem(name.clone()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut capacity = DailyCapacity::from_items(ctx.max_daily_hours, &items);
    let mut items = items;

    for item in selected {
        let line = match item.kind {
            MandatoryKind::Fee {
                task_code,
                activity_code,
                timekeeper,
            } => {
                let tk = resolve_timekeeper(ctx.timekeepers, timekeeper);
                let drawn = hours_to_tenths(rng.gen_range(FEE_HOURS.0..=FEE_HOURS.1));
                let Some((date, remaining)) = open_day(rng, &ctx.period, &capacity, &tk.id) else {
                    warn!(
                        item = item.name,
                        timekeeper = %tk.name,
                        "No day has capacity for mandatory line, skipping"
                    );
                    continue;
                };
                let tenths = drawn.min(remaining);
                capacity.record(date, &tk.id, tenths);

                let hours = tenths as f64 / 10.0;
                LineItem::Fee(FeeLine {
                    date,
                    description: item.description.to_string(),
                    hours,
                    rate: tk.rate,
                    total: round_to(hours * tk.rate, 2),
                    timekeeper: TimekeeperRef::from(&tk),
                    task_code: task_code.to_string(),
                    activity_code: activity_code.to_string(),
                })
            }
            MandatoryKind::Expense { expense_code } => {
                let amount = round_to(rng.gen_range(EXPENSE_AMOUNT.0..=EXPENSE_AMOUNT.1), 2);
                LineItem::Expense(ExpenseLine {
                    date: random_date(rng, &ctx.period),
                    description: item.description.to_string(),
                    units: 1,
                    rate: amount,
                    total: amount,
                    expense_code: expense_code.to_string(),
                })
            }
        };

        debug!(item = item.name, "Injected mandatory line");
        items.push(line);
    }

    info!(selected = ctx.selected.len(), "Mandatory lines injected");

    Ok(apply_forced_attributions(
        items,
        ctx.forced_attributions,
        ctx.timekeepers,
    ))
}

/// Named timekeeper, else the first in the pool, else a default-rate stand-in
fn resolve_timekeeper(timekeepers: &[Timekeeper], name: &str) -> Timekeeper {
    if let Some(tk) = find_timekeeper(timekeepers, name).or_else(|| timekeepers.first()) {
        return tk.clone();
    }
    Timekeeper {
        name: name.to_string(),
        classification: "Partner".to_string(),
        id: String::new(),
        rate: DEFAULT_MANDATORY_RATE,
    }
}

fn find_timekeeper<'t>(timekeepers: &'t [Timekeeper], name: &str) -> Option<&'t Timekeeper> {
    timekeepers
        .iter()
        .find(|tk| tk.name.eq_ignore_ascii_case(name))
}

/// A random day in the period where the timekeeper has any capacity left,
/// with the tenths still free on it
fn open_day<R: Rng + ?Sized>(
    rng: &mut R,
    period: &BillingPeriod,
    capacity: &DailyCapacity,
    timekeeper_id: &str,
) -> Option<(NaiveDate, u32)> {
    let mut days: Vec<NaiveDate> = (0..period.num_days())
        .map(|d| period.start + Duration::days(d))
        .collect();
    days.shuffle(rng);
    days.into_iter()
        .map(|day| (day, capacity.remaining(day, timekeeper_id)))
        .find(|&(_, remaining)| remaining > 0)
}

/// Re-attribute every fee line whose description matches a rule.
///
/// Matching is a case-insensitive substring test on the description. Expense
/// lines carry no attribution and pass through unchanged, as do lines whose
/// rule names a timekeeper missing from the pool.
pub fn apply_forced_attributions(
    items: Vec<LineItem>,
    rules: &[ForcedAttribution],
    timekeepers: &[Timekeeper],
) -> Vec<LineItem> {
    items
        .into_iter()
        .map(|item| match item {
            LineItem::Fee(fee) => LineItem::Fee(force_attribution(fee, rules, timekeepers)),
            expense => expense,
        })
        .collect()
}

fn force_attribution(
    fee: FeeLine,
    rules: &[ForcedAttribution],
    timekeepers: &[Timekeeper],
) -> FeeLine {
    let description = fee.description.to_lowercase();
    let Some(rule) = rules
        .iter()
        .find(|r| !r.pattern.is_empty() && description.contains(&r.pattern.to_lowercase()))
    else {
        return fee;
    };

    let Some(tk) = find_timekeeper(timekeepers, &rule.timekeeper) else {
        warn!(
            pattern = %rule.pattern,
            timekeeper = %rule.timekeeper,
            "Forced timekeeper not in pool, attribution unchanged"
        );
        return fee;
    };

    debug!(pattern = %rule.pattern, timekeeper = %tk.name, "Forcing attribution");

    FeeLine {
        rate: tk.rate,
        total: round_to(fee.hours * tk.rate, 2),
        timekeeper: TimekeeperRef::from(tk),
        ..fee
    }
}
