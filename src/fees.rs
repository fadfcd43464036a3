use std::collections::HashMap;

use chrono::{Duration, NaiveDate};
use rand::Rng;
use tracing::debug;

use crate::models::{
    round_to, BillingPeriod, FeeLine, LineItem, TaskActivity, Timekeeper, TimekeeperRef,
};
use crate::names::person_name;

/// Placeholder substituted with a synthetic person name
pub const NAME_PLACEHOLDER: &str = "{NAME_PLACEHOLDER}";

/// Probability of drawing from the major task subset
const MAJOR_TASK_PROBABILITY: f64 = 0.7;
const MIN_ENTRY_TENTHS: u32 = 5;
const MAX_ENTRY_TENTHS: u32 = 80;

/// Inputs shaping fee generation
#[derive(Debug, Clone)]
pub struct FeePolicy<'a> {
    pub period: BillingPeriod,
    pub max_daily_hours: f64,
    pub major_task_codes: &'a [String],
    /// Anchor for dates substituted into descriptions
    pub today: NaiveDate,
}

/// Hours booked per (date, timekeeper), tracked in tenths of an hour
#[derive(Debug, Clone)]
pub struct DailyCapacity {
    limit: u32,
    used: HashMap<(NaiveDate, String), u32>,
}

impl DailyCapacity {
    pub fn new(max_daily_hours: f64) -> Self {
        Self {
            limit: ceiling_to_tenths(max_daily_hours),
            used: HashMap::new(),
        }
    }

    /// Seed the ledger with the fee lines already on an invoice
    pub fn from_items(max_daily_hours: f64, items: &[LineItem]) -> Self {
        let mut capacity = Self::new(max_daily_hours);
        for fee in items.iter().filter_map(LineItem::as_fee) {
            capacity.record(fee.date, &fee.timekeeper.id, hours_to_tenths(fee.hours));
        }
        capacity
    }

    /// Remaining tenths of an hour for this timekeeper on this date
    pub fn remaining(&self, date: NaiveDate, timekeeper_id: &str) -> u32 {
        let used = self
            .used
            .get(&(date, timekeeper_id.to_string()))
            .copied()
            .unwrap_or(0);
        self.limit.saturating_sub(used)
    }

    pub fn record(&mut self, date: NaiveDate, timekeeper_id: &str, tenths: u32) {
        *self
            .used
            .entry((date, timekeeper_id.to_string()))
            .or_insert(0) += tenths;
    }
}

/// Whole tenths of an hour that fit under the ceiling, rounded down
pub fn ceiling_to_tenths(max_daily_hours: f64) -> u32 {
    if max_daily_hours.is_finite() && max_daily_hours > 0.0 {
        (max_daily_hours * 10.0 + 1e-9).floor() as u32
    } else {
        0
    }
}

pub fn hours_to_tenths(hours: f64) -> u32 {
    if hours.is_finite() && hours > 0.0 {
        (hours * 10.0).round() as u32
    } else {
        0
    }
}

/// Generate up to `count` fee lines.
///
/// Attempts that land on a timekeeper/day with no remaining capacity, or whose
/// hours round to zero, are skipped, so fewer lines than requested may come
/// back.
pub fn generate_fees<R: Rng + ?Sized>(
    rng: &mut R,
    count: usize,
    timekeepers: &[Timekeeper],
    tasks: &[TaskActivity],
    policy: &FeePolicy<'_>,
) -> Vec<FeeLine> {
    if timekeepers.is_empty() || tasks.is_empty() {
        debug!(
            timekeepers = timekeepers.len(),
            tasks = tasks.len(),
            "No timekeepers or tasks, skipping fee generation"
        );
        return Vec::new();
    }

    let (major, minor): (Vec<&TaskActivity>, Vec<&TaskActivity>) = tasks
        .iter()
        .partition(|t| policy.major_task_codes.contains(&t.task_code));

    let mut capacity = DailyCapacity::new(policy.max_daily_hours);
    let mut fees = Vec::with_capacity(count);
    let mut skipped = 0usize;

    for _ in 0..count {
        let tk = &timekeepers[rng.gen_range(0..timekeepers.len())];
        let task = pick_task(rng, &major, &minor);
        let date = random_date(rng, &policy.period);

        let remaining = capacity.remaining(date, &tk.id);
        if remaining == 0 {
            skipped += 1;
            continue;
        }

        let upper = remaining.min(MAX_ENTRY_TENTHS) as f64 / 10.0;
        let lower = (MIN_ENTRY_TENTHS as f64 / 10.0).min(upper);
        let drawn = rng.gen_range(lower..=upper);
        let tenths = hours_to_tenths(drawn).min(remaining);
        if tenths == 0 {
            skipped += 1;
            continue;
        }
        capacity.record(date, &tk.id, tenths);

        let hours = tenths as f64 / 10.0;
        fees.push(FeeLine {
            date,
            description: render_description(rng, &task.description, policy.today),
            hours,
            rate: tk.rate,
            total: round_to(hours * tk.rate, 2),
            timekeeper: TimekeeperRef::from(tk),
            task_code: task.task_code.clone(),
            activity_code: task.activity_code.clone(),
        });
    }

    debug!(
        requested = count,
        generated = fees.len(),
        skipped,
        "Generated fee lines"
    );

    fees
}

fn pick_task<'t, R: Rng + ?Sized>(
    rng: &mut R,
    major: &[&'t TaskActivity],
    minor: &[&'t TaskActivity],
) -> &'t TaskActivity {
    let use_major =
        !major.is_empty() && (minor.is_empty() || rng.gen_bool(MAJOR_TASK_PROBABILITY));
    let pool = if use_major { major } else { minor };
    // Both subsets come from a non-empty catalog, so the chosen one is non-empty
    pool[rng.gen_range(0..pool.len())]
}

/// Uniform date within the billing period
pub fn random_date<R: Rng + ?Sized>(rng: &mut R, period: &BillingPeriod) -> NaiveDate {
    period.start + Duration::days(rng.gen_range(0..period.num_days()))
}

/// Substitute name and date placeholders in a description template
pub fn render_description<R: Rng + ?Sized>(
    rng: &mut R,
    template: &str,
    today: NaiveDate,
) -> String {
    let text = if template.contains(NAME_PLACEHOLDER) {
        template.replace(NAME_PLACEHOLDER, &person_name(rng))
    } else {
        template.to_string()
    };
    replace_date_tokens(rng, &text, today)
}

/// Replace every MM/DD/YYYY token with a date 15-90 days before `today`
fn replace_date_tokens<R: Rng + ?Sized>(rng: &mut R, text: &str, today: NaiveDate) -> String {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    let mut i = 0;

    while i + 10 <= bytes.len() {
        if is_date_token(&bytes[i..i + 10]) {
            out.push_str(&text[last..i]);
            let back = Duration::days(rng.gen_range(15..=90));
            out.push_str(&(today - back).format("%m/%d/%Y").to_string());
            i += 10;
            last = i;
        } else {
            i += 1;
        }
    }

    out.push_str(&text[last..]);
    out
}

fn is_date_token(bytes: &[u8]) -> bool {
    bytes.iter().enumerate().all(|(i, b)| match i {
        2 | 5 => *b == b'/',
        _ => b.is_ascii_digit(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{default_major_task_codes, default_tasks};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn timekeepers() -> Vec<Timekeeper> {
        vec![
            Timekeeper {
                name: "Tom Delaganis".to_string(),
                classification: "Partner".to_string(),
                id: "TK001".to_string(),
                rate: 450.0,
            },
            Timekeeper {
                name: "Ryan Kinsey".to_string(),
                classification: "Associate".to_string(),
                id: "TK002".to_string(),
                rate: 287.5,
            },
        ]
    }

    #[test]
    fn test_daily_ceiling_respected() {
        let mut rng = StdRng::seed_from_u64(1);
        let codes = default_major_task_codes();
        let policy = FeePolicy {
            period: BillingPeriod::new(date(2024, 1, 1), date(2024, 1, 3)),
            max_daily_hours: 4.0,
            major_task_codes: &codes,
            today: date(2024, 2, 1),
        };

        let fees = generate_fees(&mut rng, 200, &timekeepers(), &default_tasks(), &policy);
        assert!(!fees.is_empty());
        assert!(fees.len() < 200);

        let mut per_day: HashMap<(NaiveDate, String), u32> = HashMap::new();
        for fee in &fees {
            *per_day.entry((fee.date, fee.timekeeper.id.clone())).or_default() +=
                hours_to_tenths(fee.hours);
        }
        assert!(per_day.values().all(|&t| t <= 40));
    }

    #[test]
    fn test_fee_line_shape() {
        let mut rng = StdRng::seed_from_u64(2);
        let codes = default_major_task_codes();
        let period = BillingPeriod::new(date(2024, 3, 1), date(2024, 3, 31));
        let policy = FeePolicy {
            period,
            max_daily_hours: 24.0,
            major_task_codes: &codes,
            today: date(2024, 4, 15),
        };

        let fees = generate_fees(&mut rng, 50, &timekeepers(), &default_tasks(), &policy);
        assert_eq!(fees.len(), 50);
        for fee in &fees {
            assert!(period.contains(fee.date));
            assert!(fee.hours >= 0.5 && fee.hours <= 8.0);
            assert_eq!(fee.total, round_to(fee.hours * fee.rate, 2));
            assert!(!fee.description.contains(NAME_PLACEHOLDER));
        }
    }

    #[test]
    fn test_major_tasks_preferred() {
        let mut rng = StdRng::seed_from_u64(3);
        let codes = default_major_task_codes();
        let policy = FeePolicy {
            period: BillingPeriod::new(date(2024, 1, 1), date(2024, 12, 31)),
            max_daily_hours: 24.0,
            major_task_codes: &codes,
            today: date(2025, 1, 1),
        };

        let fees = generate_fees(&mut rng, 500, &timekeepers(), &default_tasks(), &policy);
        let major = fees.iter().filter(|f| codes.contains(&f.task_code)).count();
        assert!(major * 2 > fees.len());
    }

    #[test]
    fn test_empty_inputs_yield_nothing() {
        let mut rng = StdRng::seed_from_u64(4);
        let policy = FeePolicy {
            period: BillingPeriod::new(date(2024, 1, 1), date(2024, 1, 31)),
            max_daily_hours: 8.0,
            major_task_codes: &[],
            today: date(2024, 2, 1),
        };

        assert!(generate_fees(&mut rng, 10, &[], &default_tasks(), &policy).is_empty());
        assert!(generate_fees(&mut rng, 10, &timekeepers(), &[], &policy).is_empty());
    }

    #[test]
    fn test_render_description_placeholders() {
        let mut rng = StdRng::seed_from_u64(5);
        let today = date(2024, 6, 30);
        let text = render_description(
            &mut rng,
            "Call with {NAME_PLACEHOLDER} about letter dated 01/15/2020",
            today,
        );

        assert!(!text.contains(NAME_PLACEHOLDER));
        assert!(!text.contains("01/15/2020"));

        let token = &text[text.len() - 10..];
        let parsed = NaiveDate::parse_from_str(token, "%m/%d/%Y").unwrap();
        let back = (today - parsed).num_days();
        assert!((15..=90).contains(&back));
    }

    #[test]
    fn test_render_description_without_placeholders() {
        let mut rng = StdRng::seed_from_u64(6);
        let text = render_description(&mut rng, "Draft motion 12/3/2024", date(2024, 6, 30));
        assert_eq!(text, "Draft motion 12/3/2024");
    }

    #[test]
    fn test_capacity_tracking() {
        let day = date(2024, 1, 1);
        let mut capacity = DailyCapacity::new(8.0);
        capacity.record(day, "TK1", 50);
        assert_eq!(capacity.remaining(day, "TK1"), 30);
        capacity.record(day, "TK1", 50);
        assert_eq!(capacity.remaining(day, "TK1"), 0);
        assert_eq!(capacity.remaining(day, "TK2"), 80);
        assert_eq!(capacity.remaining(date(2024, 1, 2), "TK1"), 80);
    }

    #[test]
    fn test_fractional_ceiling_rounds_down() {
        assert_eq!(ceiling_to_tenths(0.75), 7);
        assert_eq!(ceiling_to_tenths(0.7), 7);
        assert_eq!(ceiling_to_tenths(16.0), 160);
        assert_eq!(ceiling_to_tenths(0.05), 0);
        assert_eq!(DailyCapacity::new(0.75).remaining(date(2024, 1, 1), "TK1"), 7);

        let codes = default_major_task_codes();
        let policy = FeePolicy {
            period: BillingPeriod::new(date(2024, 1, 1), date(2024, 1, 1)),
            max_daily_hours: 0.75,
            major_task_codes: &codes,
            today: date(2024, 2, 1),
        };
        let pool = &timekeepers()[..1];

        for seed in 0..50 {
            let mut rng = StdRng::seed_from_u64(seed);
            let fees = generate_fees(&mut rng, 5, pool, &default_tasks(), &policy);
            let day_total: f64 = fees.iter().map(|f| f.hours).sum();
            assert!(day_total <= 0.75 + 1e-9, "seed {}: {}", seed, day_total);
        }
    }
}
