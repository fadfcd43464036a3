use rand::Rng;
use tracing::debug;

use crate::catalog::{ExpenseCatalog, ExpenseCategory, COPYING_CODE, COPYING_DESCRIPTION};
use crate::config::{AmountRange, ExpenseConfig};
use crate::fees::random_date;
use crate::models::{round_to, BillingPeriod, ExpenseLine};

const MAX_COPYING_LINES: usize = 3;
const MIN_MILES: u32 = 5;
const MAX_MILES: u32 = 50;

/// Generate exactly `count` expense lines, between one and three of them Copying
pub fn generate_expenses<R: Rng + ?Sized>(
    rng: &mut R,
    count: usize,
    period: &BillingPeriod,
    settings: &ExpenseConfig,
) -> Vec<ExpenseLine> {
    if count == 0 {
        return Vec::new();
    }

    let copying = rng.gen_range(1..=MAX_COPYING_LINES.min(count));
    let mut expenses = Vec::with_capacity(count);

    for _ in 0..copying {
        let pages = rng.gen_range(1..=settings.copying_max_pages.max(1));
        let rate = round_to(draw(rng, settings.copying_rate), 2);
        expenses.push(ExpenseLine {
            date: random_date(rng, period),
            description: COPYING_DESCRIPTION.to_string(),
            units: pages,
            rate,
            total: round_to(pages as f64 * rate, 2),
            expense_code: COPYING_CODE.to_string(),
        });
    }

    let categories = ExpenseCatalog::optional();
    for _ in copying..count {
        let category = categories[rng.gen_range(0..categories.len())];
        let date = random_date(rng, period);
        let (units, rate, total) = price(rng, category, settings);
        expenses.push(ExpenseLine {
            date,
            description: category.description.to_string(),
            units,
            rate,
            total,
            expense_code: category.code.to_string(),
        });
    }

    debug!(count, copying, "Generated expense lines");

    expenses
}

/// Units, unit rate and total for one expense of this category
fn price<R: Rng + ?Sized>(
    rng: &mut R,
    category: ExpenseCategory,
    settings: &ExpenseConfig,
) -> (u32, f64, f64) {
    let flat = |rng: &mut R, range: AmountRange| {
        let amount = round_to(draw(rng, range), 2);
        (1, amount, amount)
    };

    match category.code {
        "E109" => {
            let miles = rng.gen_range(MIN_MILES..=MAX_MILES);
            let rate = settings.mileage_rate;
            (miles, rate, round_to(miles as f64 * rate, 2))
        }
        "E110" => flat(rng, settings.travel),
        "E105" => flat(rng, settings.telephone),
        "E107" => flat(rng, settings.delivery),
        "E108" => flat(rng, settings.postage),
        "E111" => flat(rng, settings.meals),
        _ => {
            let units = rng.gen_range(1..=settings.other_max_units.max(1));
            let rate = round_to(draw(rng, settings.other_rate), 2);
            (units, rate, round_to(units as f64 * rate, 2))
        }
    }
}

fn draw<R: Rng + ?Sized>(rng: &mut R, range: AmountRange) -> f64 {
    if range.max > range.min {
        rng.gen_range(range.min..=range.max)
    } else {
        range.min
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn period() -> BillingPeriod {
        BillingPeriod::new(
            NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 5, 31).unwrap(),
        )
    }

    #[test]
    fn test_copying_guarantee() {
        let settings = ExpenseConfig::default();
        for seed in 0..50 {
            let mut rng = StdRng::seed_from_u64(seed);
            let expenses = generate_expenses(&mut rng, 5, &period(), &settings);
            assert_eq!(expenses.len(), 5);

            let copying = expenses.iter().filter(|e| e.expense_code == COPYING_CODE).count();
            assert!((1..=3).contains(&copying));
            // Copying lines come first, the rest never use the reserved code
            assert!(expenses[copying..].iter().all(|e| e.expense_code != COPYING_CODE));
        }
    }

    #[test]
    fn test_single_expense_is_copying() {
        let mut rng = StdRng::seed_from_u64(11);
        let expenses = generate_expenses(&mut rng, 1, &period(), &ExpenseConfig::default());
        assert_eq!(expenses.len(), 1);
        assert_eq!(expenses[0].expense_code, COPYING_CODE);
        assert!((1..=200).contains(&expenses[0].units));
        assert!(expenses[0].rate >= 0.14 && expenses[0].rate <= 0.25);
    }

    #[test]
    fn test_zero_count() {
        let mut rng = StdRng::seed_from_u64(12);
        assert!(generate_expenses(&mut rng, 0, &period(), &ExpenseConfig::default()).is_empty());
    }

    #[test]
    fn test_category_pricing() {
        let settings = ExpenseConfig::default();
        let mut rng = StdRng::seed_from_u64(13);
        let expenses = generate_expenses(&mut rng, 400, &period(), &settings);

        for e in &expenses {
            assert!(period().contains(e.date));
            match e.expense_code.as_str() {
                "E109" => {
                    assert!((5..=50).contains(&e.units));
                    assert_eq!(e.rate, 0.65);
                    assert_eq!(e.total, round_to(e.units as f64 * 0.65, 2));
                }
                "E110" => {
                    assert_eq!(e.units, 1);
                    assert!(e.total >= 100.0 && e.total <= 800.0);
                }
                "E105" => {
                    assert_eq!(e.units, 1);
                    assert!(e.total >= 5.0 && e.total <= 40.0);
                }
                "E107" => assert!(e.units == 1 && e.total >= 20.0 && e.total <= 100.0),
                "E108" => assert!(e.units == 1 && e.total >= 5.0 && e.total <= 50.0),
                "E111" => assert!(e.units == 1 && e.total >= 15.0 && e.total <= 150.0),
                COPYING_CODE => {}
                _ => {
                    assert!((1..=5).contains(&e.units));
                    assert_eq!(e.total, round_to(e.units as f64 * e.rate, 2));
                }
            }
        }
    }

    #[test]
    fn test_custom_mileage_rate() {
        let settings = ExpenseConfig {
            mileage_rate: 1.0,
            ..ExpenseConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(14);
        let expenses = generate_expenses(&mut rng, 300, &period(), &settings);
        let mileage: Vec<_> = expenses.iter().filter(|e| e.expense_code == "E109").collect();
        assert!(!mileage.is_empty());
        assert!(mileage.iter().all(|e| e.total == e.units as f64));
    }
}
