//! Tax rules and the arithmetic shared by the engine.
//!
//! The `tax` module holds the [`TaxRules`] in force for a run (VAT
//! rate, default PPM rate, input strictness) together with a loader
//! for versioned rule files, and the small pieces of arithmetic that
//! encode tax law: the VAT fallback, the PPM amount, the training
//! credit offset and the determination split.

use anyhow::{Context, Result};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// How the engine treats records that lack required fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strictness {
    /// Missing required fields and unknown line keys are errors.
    #[default]
    Strict,
    /// Missing fields read as zero and unknown lines are skipped.
    Lenient,
}

/// Rules applied to a resolution run.  Rule files are JSON documents
/// with any subset of these fields; absent fields keep their default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaxRules {
    /// Label of the form edition the line tables describe.
    pub form_version: String,
    /// Standard VAT rate as a fraction, `0.19`.
    pub vat_rate: Decimal,
    /// PPM rate (percentage) used when the input does not give one.
    pub default_ppm_rate: Decimal,
    pub strictness: Strictness,
}

impl Default for TaxRules {
    fn default() -> Self {
        Self {
            form_version: "F29-2026".to_string(),
            vat_rate: Decimal::new(19, 2),
            default_ppm_rate: Decimal::new(25, 2),
            strictness: Strictness::Strict,
        }
    }
}

/// Load tax rules from a JSON file.
///
/// A missing file is not an error: the defaults apply and the fact is
/// logged.  A file that exists but cannot be parsed is an error.
pub fn load_tax_rules(path: &Path) -> Result<TaxRules> {
    if !path.is_file() {
        tracing::info!(path = %path.display(), "no rules file, using defaults");
        return Ok(TaxRules::default());
    }
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("reading rules file {}", path.display()))?;
    let rules: TaxRules = serde_json::from_str(&data)
        .with_context(|| format!("parsing rules file {}", path.display()))?;
    tracing::info!(
        path = %path.display(),
        form_version = %rules.form_version,
        vat_rate = %rules.vat_rate,
        strictness = ?rules.strictness,
        "loaded tax rules"
    );
    Ok(rules)
}

/// VAT on a net amount: floor(net × rate).  `None` when the result
/// does not fit an `i64`.
pub fn vat_from_net(net: i64, rate: Decimal) -> Option<i64> {
    Decimal::from(net).checked_mul(rate)?.floor().to_i64()
}

/// PPM on a base: floor(base × rate / 100), with `rate` a percentage.
/// A negative base yields no payment.
pub fn ppm_amount(base: i64, rate: Decimal) -> Option<i64> {
    if base <= 0 {
        return Some(0);
    }
    Decimal::from(base)
        .checked_mul(rate)?
        .checked_div(Decimal::ONE_HUNDRED)?
        .floor()
        .to_i64()
}

/// Outcome of comparing total debits with total credits.  At most one
/// side is nonzero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Determination {
    pub tax_payable: i64,
    pub credit_carried_forward: i64,
}

/// `None` when the difference does not fit in an `i64`.
pub fn split_determination(debits: i64, credits: i64) -> Option<Determination> {
    let determination = if debits > credits {
        Determination {
            tax_payable: debits.checked_sub(credits)?,
            credit_carried_forward: 0,
        }
    } else {
        Determination {
            tax_payable: 0,
            credit_carried_forward: credits.checked_sub(debits)?,
        }
    };
    Some(determination)
}

/// Training credit offset against the PPM amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrainingCreditOffset {
    pub available: i64,
    pub applied: i64,
    pub remainder: i64,
}

/// Apply the current and carried-over training credit to `ppm`.  The
/// applied part never exceeds the PPM amount and
/// `applied + remainder == available`.  `None` when the credits
/// overflow.
pub fn offset_training_credit(current: i64, carried: i64, ppm: i64) -> Option<TrainingCreditOffset> {
    let available = current.checked_add(carried)?;
    let applied = available.min(ppm).max(0);
    Some(TrainingCreditOffset {
        available,
        applied,
        remainder: available.checked_sub(applied)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    #[test]
    fn vat_fallback_truncates() {
        assert_eq!(vat_from_net(8_000_000, dec!(0.19)), Some(1_520_000));
        assert_eq!(vat_from_net(1_001, dec!(0.19)), Some(190));
        assert_eq!(vat_from_net(0, dec!(0.19)), Some(0));
    }

    #[test]
    fn ppm_is_floor_of_base_times_rate() {
        assert_eq!(ppm_amount(13_374_273, dec!(2.5)), Some(334_356));
        assert_eq!(ppm_amount(1_000_000, dec!(0.25)), Some(2_500));
        assert_eq!(ppm_amount(-5_000, dec!(0.25)), Some(0));
    }

    #[test]
    fn determination_split() {
        assert_eq!(
            split_determination(2_541_111, 494_730),
            Some(Determination {
                tax_payable: 2_046_381,
                credit_carried_forward: 0
            })
        );
        assert_eq!(
            split_determination(100, 250),
            Some(Determination {
                tax_payable: 0,
                credit_carried_forward: 150
            })
        );
        assert_eq!(
            split_determination(100, 100),
            Some(Determination {
                tax_payable: 0,
                credit_carried_forward: 0
            })
        );
    }

    #[test]
    fn determination_out_of_range_is_none() {
        assert_eq!(split_determination(i64::MAX, -1), None);
        assert_eq!(split_determination(i64::MIN, 1), None);
        assert!(split_determination(i64::MAX, 0).is_some());
    }

    #[test]
    fn training_credit_is_capped_by_ppm() {
        let offset = offset_training_credit(300_000, 50_000, 200_000).unwrap();
        assert_eq!(offset.applied, 200_000);
        assert_eq!(offset.remainder, 150_000);
        let offset = offset_training_credit(10_000, 0, 200_000).unwrap();
        assert_eq!(offset.applied, 10_000);
        assert_eq!(offset.remainder, 0);
        assert_eq!(offset_training_credit(i64::MAX, 1, 0), None);
    }

    #[test]
    fn load_missing_rules_file_gives_defaults() {
        let path = std::env::temp_dir().join("f29-engine-no-such-rules.json");
        let rules = load_tax_rules(&path).unwrap();
        assert_eq!(rules, TaxRules::default());
        assert_eq!(rules.vat_rate, dec!(0.19));
    }

    #[test]
    fn load_partial_rules_file() {
        let path = std::env::temp_dir().join(format!("f29-engine-rules-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"strictness": "lenient", "default_ppm_rate": 1.5}"#).unwrap();
        let rules = load_tax_rules(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(rules.strictness, Strictness::Lenient);
        assert_eq!(rules.default_ppm_rate, dec!(1.5));
        assert_eq!(rules.vat_rate, dec!(0.19));
    }

    proptest! {
        #[test]
        fn determination_is_exclusive(d in -1_000_000_000i64..1_000_000_000, c in -1_000_000_000i64..1_000_000_000) {
            let det = split_determination(d, c).unwrap();
            if d == c {
                prop_assert_eq!(det.tax_payable, 0);
                prop_assert_eq!(det.credit_carried_forward, 0);
            } else {
                prop_assert!((det.tax_payable == 0) != (det.credit_carried_forward == 0));
            }
            prop_assert_eq!(det.tax_payable - det.credit_carried_forward, d - c);
        }

        #[test]
        fn training_offset_never_exceeds_ppm(current in 0i64..10_000_000, carried in 0i64..10_000_000, ppm in 0i64..10_000_000) {
            let offset = offset_training_credit(current, carried, ppm).unwrap();
            prop_assert!(offset.applied <= ppm);
            prop_assert!(offset.applied >= 0);
            prop_assert_eq!(offset.applied + offset.remainder, current + carried);
        }
    }
}
