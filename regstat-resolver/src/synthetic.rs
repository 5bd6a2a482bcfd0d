//! Deterministic synthetic performance records
//!
//! Terminal tier of the resolver. The output for a given `(region_key, month)`
//! must never change between releases: historical series mix synthetic months
//! with stored ones, so every floor, rounding step and trig call below is part of
//! the contract.

use regstat_common::db::PerformanceRecord;
use regstat_common::Month;

/// Divisor expressing expenditure in crore
pub const CRORE: f64 = 10_000_000.0;

/// Seed used when the key has no usable character after its first `_`
pub const DEFAULT_SEED: u32 = 65;

/// Seed for a region key
///
/// UTF-16 code unit of the first character of the second `_`-separated segment
/// (`"UP_AGRA"` → `'A'` → 65). Missing, empty or NUL segments fall back to
/// [`DEFAULT_SEED`].
pub fn region_seed(region_key: &str) -> u32 {
    region_key
        .split('_')
        .nth(1)
        .and_then(|segment| segment.encode_utf16().next())
        .map(u32::from)
        .filter(|&unit| unit != 0)
        .unwrap_or(DEFAULT_SEED)
}

/// Generate the synthetic record for one region and month
pub fn generate(region_key: &str, month: Month) -> PerformanceRecord {
    let seed = f64::from(region_seed(region_key));
    let month_seed = f64::from(month.index());

    let base_workers = 50000.0 + seed * 1000.0 + month_seed * 5000.0;
    // seed is an angle in radians
    let activity_rate = 0.65 + seed.sin() * 0.15;
    let completion_rate = 70.0 + seed.cos() * 15.0;
    let base_wage = 250.0 + seed % 50.0;

    let total_workers = base_workers.floor();
    let active_workers = (total_workers * activity_rate).floor();
    let job_cards_issued = (total_workers * 1.15).floor();
    let work_completed_pct = round_to_cents(completion_rate);
    let average_wage = round_to_cents(base_wage);
    let person_days_generated = (active_workers * (25.0 + month_seed * 2.0)).floor();
    let total_expenditure = round_to_cents(person_days_generated * average_wage / CRORE);

    PerformanceRecord {
        region_key: region_key.to_string(),
        month,
        total_workers: total_workers as i64,
        active_workers: active_workers as i64,
        job_cards_issued: job_cards_issued as i64,
        work_completed_pct,
        average_wage,
        person_days_generated: person_days_generated as i64,
        total_expenditure,
    }
}

/// Round to two decimal places, deciding on the exact binary value
///
/// Halves go away from zero, so `1.125` becomes `1.13` while `1.005` (stored as
/// 1.00499…) becomes `1.00`. Rust's `{:.2}` rounds exact halves to even and
/// cannot be used here.
pub fn round_to_cents(value: f64) -> f64 {
    if !value.is_finite() || value.abs() >= 1e21 {
        return value;
    }

    // Exact decimal expansion, far past any digit that can matter
    let exact = format!("{:.80}", value.abs());
    let Some((whole, fraction)) = exact.split_once('.') else {
        return value;
    };
    let (cents, rest) = fraction.split_at(2);

    let Ok(mut scaled) = format!("{}{}", whole, cents).parse::<u128>() else {
        return value;
    };
    if rest.as_bytes().first().is_some_and(|digit| *digit >= b'5') {
        scaled += 1;
    }

    let sign = if value.is_sign_negative() { "-" } else { "" };
    format!("{}{}.{:02}", sign, scaled / 100, scaled % 100)
        .parse()
        .unwrap_or(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn month(m: u32) -> Month {
        Month::from_ym(2024, m).unwrap()
    }

    #[test]
    fn test_seed_uses_character_after_first_underscore() {
        assert_eq!(region_seed("UP_AGRA"), 65);
        assert_eq!(region_seed("UP_LUCKNOW"), 76);
        assert_eq!(region_seed("A_B_C"), 66);
    }

    #[test]
    fn test_seed_defaults() {
        assert_eq!(region_seed("NOUNDERSCORE"), DEFAULT_SEED);
        assert_eq!(region_seed("UP_"), DEFAULT_SEED);
        assert_eq!(region_seed(""), DEFAULT_SEED);
        assert_eq!(region_seed("UP_\0X"), DEFAULT_SEED);
    }

    #[test]
    fn test_seed_uses_utf16_code_unit() {
        assert_eq!(region_seed("IN_É"), 0xC9);
        // Astral characters contribute their high surrogate
        assert_eq!(region_seed("IN_😀"), 0xD83D);
    }

    #[test]
    fn test_round_to_cents_halves_away_from_zero() {
        assert_eq!(round_to_cents(1.125), 1.13);
        assert_eq!(round_to_cents(0.125), 0.13);
        assert_eq!(round_to_cents(-1.125), -1.13);
    }

    #[test]
    fn test_round_to_cents_uses_binary_value() {
        assert_eq!(round_to_cents(1.005), 1.0);
        assert_eq!(round_to_cents(2.675), 2.67);
        assert_eq!(round_to_cents(61.56319223142742), 61.56);
        assert_eq!(round_to_cents(82.6617945), 82.66);
        assert_eq!(round_to_cents(265.0), 265.0);
    }

    #[test]
    fn test_agra_march_2024_exact_chain() {
        let record = generate("UP_AGRA", month(3));

        assert_eq!(record.total_workers, 130000);
        assert_eq!(record.active_workers, 100623);
        assert_eq!(record.job_cards_issued, 149500);
        assert_eq!(record.work_completed_pct, 61.56);
        assert_eq!(record.average_wage, 265.0);
        assert_eq!(record.person_days_generated, 3119313);
        assert_eq!(record.total_expenditure, 82.66);
    }

    #[test]
    fn test_december_job_cards_floor_after_float_product() {
        // 175000 * 1.15 is 201249.99999999997 in binary
        let record = generate("UP_AGRA", month(12));

        assert_eq!(record.total_workers, 175000);
        assert_eq!(record.job_cards_issued, 201249);
        assert_eq!(record.active_workers, 135454);
        assert_eq!(record.person_days_generated, 6637246);
        assert_eq!(record.total_expenditure, 175.89);
    }

    #[test]
    fn test_other_regions() {
        let lucknow = generate("UP_LUCKNOW", month(1));
        assert_eq!(lucknow.total_workers, 131000);
        assert_eq!(lucknow.active_workers, 96274);
        assert_eq!(lucknow.work_completed_pct, 82.36);
        assert_eq!(lucknow.average_wage, 276.0);
        assert_eq!(lucknow.total_expenditure, 71.74);

        let bareilly = generate("UP_BAREILLY", month(12));
        assert_eq!(bareilly.active_workers, 113699);
        assert_eq!(bareilly.total_expenditure, 148.2);
    }

    #[test]
    fn test_keys_sharing_a_seed_share_numbers() {
        let pune = generate("MH_PUNE", month(3));
        let patna = generate("BR_PATNA", month(3));

        assert_eq!(pune.region_key, "MH_PUNE");
        assert_eq!(patna.region_key, "BR_PATNA");
        assert_eq!(pune.total_workers, patna.total_workers);
        assert_eq!(pune.total_expenditure, 63.04);
    }

    #[test]
    fn test_generation_is_deterministic() {
        for key in ["UP_AGRA", "UP_VARANASI", "X", "UP_KANPUR"] {
            for m in 1..=12 {
                let a = generate(key, month(m));
                let b = generate(key, month(m));
                assert_eq!(
                    serde_json::to_string(&a).unwrap(),
                    serde_json::to_string(&b).unwrap()
                );
            }
        }
    }

    #[test]
    fn test_modeled_invariants_hold() {
        for key in ["UP_AGRA", "UP_MEERUT", "UP_GORAKHPUR", "UP_zeta", "IN_É"] {
            for m in 1..=12 {
                let r = generate(key, month(m));
                assert!(r.active_workers <= r.total_workers, "{} {}", key, m);
                assert!(r.job_cards_issued >= r.total_workers, "{} {}", key, m);
                assert!(r.average_wage > 0.0);
                assert!(r.total_expenditure >= 0.0);
            }
        }
    }
}
