//! Code resolution engine.
//!
//! The `engine` module turns an [`InputDocument`] into a [`CodeMap`].
//! Resolution is a pure, single pass over fixed stages: each stage
//! reads codes written by earlier ones and the stage order never
//! changes.  Independent documents can be resolved in parallel with
//! [`resolve_batch`], which uses the [`rayon`] crate; nothing is
//! shared between runs.

use crate::documents::{parse_documents, FieldMapping, ItemizedDocuments};
use crate::error::{ResolveError, Result};
use crate::form::{self, code, AmountBasis, Fallback, LineDef, LineSource, Section};
use crate::models::{CodeMap, InputDocument};
use crate::tax::{self, Strictness, TaxRules};
use rayon::prelude::*;

/// Resolve the complete code map of an input document.
///
/// Documents are parsed first in both modes, so a malformed record
/// fails the run even when pre-computed codes are supplied.  On error
/// no partial map is returned.
pub fn resolve(input: &InputDocument, rules: &TaxRules) -> Result<CodeMap> {
    let _span = tracing::debug_span!(
        "resolve",
        taxpayer = %input.header.taxpayer_id,
        month = input.header.period_month,
        year = input.header.period_year,
    )
    .entered();
    let documents = parse_documents(&input.documents, rules.strictness)?;
    match &input.codes {
        Some(codes) => {
            tracing::debug!(supplied = codes.len(), "direct mode");
            Ok(resolve_direct(codes))
        }
        None => resolve_derived(input, &documents, rules),
    }
}

/// Direct-override mode: keep every supplied code as is and backfill
/// the must-exist codes and every code of the printed form with zero.
pub fn resolve_direct(codes: &CodeMap) -> CodeMap {
    let mut resolved = codes.clone();
    for code in form::MUST_EXIST.into_iter().chain(form::referenced_codes()) {
        resolved.ensure(code);
    }
    resolved
}

/// Resolve many independent documents in parallel.  Results are in
/// input order; one failing document does not affect the others.
pub fn resolve_batch(inputs: &[InputDocument], rules: &TaxRules) -> Vec<Result<CodeMap>> {
    inputs
        .par_iter()
        .map(|input| resolve(input, rules))
        .collect()
}

/// Derived mode: compute every code from aggregates and documents.
pub fn resolve_derived(
    input: &InputDocument,
    documents: &ItemizedDocuments,
    rules: &TaxRules,
) -> Result<CodeMap> {
    check_aggregate_fields(input, rules.strictness)?;

    let mut codes = CodeMap::new();
    for code in form::referenced_codes() {
        codes.ensure(code);
    }

    for source in form::LINE_SOURCES {
        let (quantity, amount) = resolve_line(source, input, documents, rules)?;
        if let (Some(code), Some(quantity)) = (source.quantity_code, quantity) {
            codes.set(code, quantity);
        }
        codes.set(source.amount_code, amount);
    }

    codes.set(
        code::RECEIVED_WITH_RIGHT_COUNT,
        checked_sum(
            [Some(codes.amount(519)), Some(codes.amount(524))],
            code::RECEIVED_WITH_RIGHT_COUNT,
        )?,
    );
    codes.set(
        code::RECEIVED_WITH_RIGHT_VAT,
        checked_sum(
            [Some(codes.amount(520)), Some(codes.amount(525))],
            code::RECEIVED_WITH_RIGHT_VAT,
        )?,
    );
    codes.set(code::PRIOR_CREDIT, input.carried_vat_credit());

    let debits = fold(&codes, form::DEBIT_FOLD, code::TOTAL_DEBITS)?;
    let credits = fold(&codes, form::CREDIT_FOLD, code::TOTAL_CREDITS)?;
    codes.set(code::TOTAL_DEBITS, debits);
    codes.set(code::TOTAL_CREDITS, credits);

    let determination =
        tax::split_determination(debits, credits).ok_or(ResolveError::Overflow {
            code: code::TAX_PAYABLE,
        })?;
    codes.set(code::TAX_PAYABLE, determination.tax_payable);
    codes.set(code::CREDIT_CARRIED_FORWARD, determination.credit_carried_forward);
    tracing::debug!(
        debits,
        credits,
        tax_payable = determination.tax_payable,
        carried_forward = determination.credit_carried_forward,
        "determination"
    );

    let net_ppm = resolve_ppm(&mut codes, input, documents, rules)?;

    let subtotal = checked_sum(
        std::iter::once(Some(determination.tax_payable))
            .chain(form::WITHHOLDINGS.iter().map(|line| Some(codes.amount(line.amount_code))))
            .chain(std::iter::once(Some(net_ppm))),
        code::SUBTOTAL,
    )?;
    codes.set(code::SUBTOTAL, subtotal);

    resolve_subject_change(&mut codes, input)?;

    let total = checked_sum(
        [Some(subtotal), Some(codes.amount(code::SC_NET_RETENTION))],
        code::TOTAL_DETERMINED,
    )?;
    codes.set(code::TOTAL_DETERMINED, total);
    codes.set(code::PAYABLE_IN_TERM, total);
    codes.set(
        code::INFLATION_ADJUSTMENT,
        input.surcharges.inflation_adjustment,
    );
    codes.set(
        code::INTEREST_AND_PENALTIES,
        input.surcharges.interest_and_penalties,
    );
    codes.set(
        code::PAYABLE_WITH_SURCHARGE,
        checked_sum(
            [
                Some(total),
                Some(input.surcharges.inflation_adjustment),
                Some(input.surcharges.interest_and_penalties),
            ],
            code::PAYABLE_WITH_SURCHARGE,
        )?,
    );
    tracing::debug!(total, "resolved");
    Ok(codes)
}

/// Sum of `values`, failing on the first term that is missing or that
/// overflows.  Failures are reported against `code`.
pub(crate) fn checked_sum(values: impl IntoIterator<Item = Option<i64>>, code: u16) -> Result<i64> {
    values
        .into_iter()
        .try_fold(0i64, |acc, value| value.and_then(|v| acc.checked_add(v)))
        .ok_or(ResolveError::Overflow { code })
}

/// Reject aggregate keys no line reads.  Lenient runs only warn.
fn check_aggregate_fields(input: &InputDocument, strictness: Strictness) -> Result<()> {
    for section in Section::ALL {
        for key in input.aggregates(section).keys() {
            if form::known_field(section, key) {
                continue;
            }
            match strictness {
                Strictness::Strict => {
                    return Err(ResolveError::invalid(
                        section.name(),
                        None,
                        format!("unknown field `{key}`"),
                    ));
                }
                Strictness::Lenient => tracing::warn!(
                    section = section.name(),
                    field = key,
                    "ignoring unknown aggregate field"
                ),
            }
        }
    }
    Ok(())
}

/// Aggregate value of `field`, searched through every section the
/// fallback reads from, under each accepted name.
pub(crate) fn fallback_value(
    input: &InputDocument,
    fallback: &Fallback,
    field: &'static str,
) -> Option<i64> {
    fallback
        .sections()
        .find_map(|section| input.aggregates(section).field(section, field))
}

/// Quantity and amount of one line.  Itemized documents take
/// precedence over aggregates whenever the line has any.
fn resolve_line(
    source: &LineSource,
    input: &InputDocument,
    documents: &ItemizedDocuments,
    rules: &TaxRules,
) -> Result<(Option<i64>, i64)> {
    let code = source.amount_code;
    let records = source
        .itemization
        .map(|it| documents.records(it.key))
        .unwrap_or(&[]);

    if !records.is_empty() {
        let nets = || records.iter().map(|r| Some(r.net_amount()));
        let amount = match source.basis {
            AmountBasis::Vat => {
                let vat = checked_sum(records.iter().map(|r| r.vat_amount().or(Some(0))), code)?;
                if vat != 0 {
                    vat
                } else {
                    let net = checked_sum(nets(), code)?;
                    tax::vat_from_net(net, rules.vat_rate).ok_or(ResolveError::Overflow { code })?
                }
            }
            AmountBasis::Net => checked_sum(nets(), code)?,
            AmountBasis::Withheld => {
                checked_sum(records.iter().map(|r| Some(r.withheld_amount())), code)?
            }
            AmountBasis::Direct => 0,
        };
        return Ok((Some(records.len() as i64), amount));
    }

    let fallback = &source.fallback;
    let value = |field: Option<&'static str>| field.and_then(|f| fallback_value(input, fallback, f));
    let quantity = fallback.count.map(|field| value(Some(field)).unwrap_or(0));
    let amount = match source.basis {
        AmountBasis::Vat => match value(fallback.amount) {
            Some(vat) => vat,
            None => {
                let net = value(fallback.net).unwrap_or(0);
                tax::vat_from_net(net, rules.vat_rate).ok_or(ResolveError::Overflow { code })?
            }
        },
        _ => value(fallback.amount).unwrap_or(0),
    };
    Ok((quantity, amount))
}

/// Net amount of a line for the PPM base.
fn line_net(source: &LineSource, input: &InputDocument, documents: &ItemizedDocuments) -> Result<i64> {
    let records = source
        .itemization
        .map(|it| documents.records(it.key))
        .unwrap_or(&[]);
    if !records.is_empty() {
        return checked_sum(records.iter().map(|r| Some(r.net_amount())), code::PPM_BASE);
    }
    Ok(source
        .net_field()
        .and_then(|field| fallback_value(input, &source.fallback, field))
        .unwrap_or(0))
}

/// Signed sum of the amount codes of `tables`, written to `code`.
fn fold(codes: &CodeMap, tables: &[&[LineDef]], code: u16) -> Result<i64> {
    checked_sum(
        tables
            .iter()
            .flat_map(|table| table.iter())
            .map(|line| line.operator.signed(codes.amount(line.amount_code))),
        code,
    )
}

/// Write the PPM codes and return the PPM net of the training credit.
fn resolve_ppm(
    codes: &mut CodeMap,
    input: &InputDocument,
    documents: &ItemizedDocuments,
    rules: &TaxRules,
) -> Result<i64> {
    let ppm = &input.ppm;
    let rate = ppm.rate.unwrap_or(rules.default_ppm_rate);
    codes.set_rate(code::PPM_RATE, rate);

    let base = match ppm.base {
        Some(base) => base,
        None => {
            let mut terms = Vec::with_capacity(form::PPM_BASE_LINES.len());
            for (line, op) in form::PPM_BASE_LINES {
                if let Some(source) = form::source(line) {
                    terms.push(op.signed(line_net(source, input, documents)?));
                }
            }
            checked_sum(terms, code::PPM_BASE)?
        }
    };
    codes.set(code::PPM_BASE, base);
    codes.set(code::PPM_LOSS_OFFSET, 0);
    codes.set(code::PPM_SECOND_CATEGORY, 0);

    let amount = if ppm.suspension {
        codes.set(code::PPM_SUSPENDED, 1);
        0
    } else {
        tax::ppm_amount(base, rate).ok_or(ResolveError::Overflow {
            code: code::PPM_AMOUNT,
        })?
    };
    codes.set(code::PPM_AMOUNT, amount);

    let carried = input.carried_training_credit();
    let offset = tax::offset_training_credit(ppm.training_credit, carried, amount).ok_or(
        ResolveError::Overflow {
            code: code::TRAINING_CREDIT_APPLIED,
        },
    )?;
    codes.set(code::TRAINING_CREDIT, ppm.training_credit);
    codes.set(code::TRAINING_CREDIT_PRIOR, carried);
    codes.set(code::TRAINING_CREDIT_APPLIED, offset.applied);
    codes.set(code::TRAINING_CREDIT_REMAINDER, offset.remainder);
    tracing::debug!(
        base,
        %rate,
        amount,
        suspended = ppm.suspension,
        training_applied = offset.applied,
        "ppm"
    );
    checked_sum([Some(amount), offset.applied.checked_neg()], code::SUBTOTAL)
}

/// Reverse-withholding retention.  The net figure is derived from the
/// four components only when it is not supplied and a total retained
/// figure is.
fn resolve_subject_change(codes: &mut CodeMap, input: &InputDocument) -> Result<()> {
    let sc = &input.subject_change;
    let total_retained = sc.total_retained.unwrap_or(0);
    codes.set(code::SC_TOTAL_RETAINED, total_retained);
    codes.set(code::SC_PARTIAL_RETAINED, sc.partial_retained);
    codes.set(code::SC_CREDIT_NOTE_RETAINED, sc.credit_note_retained);
    codes.set(code::SC_MARGIN_RETENTION, sc.margin_retention);
    let net = match (sc.net_retention, sc.total_retained) {
        (Some(net), _) => net,
        (None, Some(_)) => checked_sum(
            [
                Some(total_retained),
                Some(sc.partial_retained),
                sc.credit_note_retained.checked_neg(),
                Some(sc.margin_retention),
            ],
            code::SC_NET_RETENTION,
        )?,
        (None, None) => 0,
    };
    codes.set(code::SC_NET_RETENTION, net);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CodeValue, PpmInput};
    use proptest::prelude::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> InputDocument {
        serde_json::from_value(value).unwrap()
    }

    fn rules() -> TaxRules {
        TaxRules::default()
    }

    #[test]
    fn direct_codes_pass_through_with_backfill() {
        let input = doc(json!({"codigos": {"538": 2541111, "537": 494730, "115": 2.5}}));
        let codes = resolve(&input, &rules()).unwrap();
        assert_eq!(codes.amount(538), 2_541_111);
        assert_eq!(codes.amount(537), 494_730);
        assert_eq!(codes.get(115), Some(&CodeValue::Rate(dec!(2.5))));
        for code in form::MUST_EXIST {
            assert!(codes.contains(code), "code {code}");
        }
        assert_eq!(codes.amount(89), 0);
        assert_eq!(codes.amount(91), 0);
    }

    #[test]
    fn direct_mode_still_rejects_malformed_documents() {
        let input = doc(json!({"codigos": {"538": 1}, "documentos": {"linea_7": ["oops"]}}));
        assert!(matches!(
            resolve(&input, &rules()),
            Err(ResolveError::InvalidInput { .. })
        ));
    }

    #[test]
    fn itemized_debit_line() {
        let input = doc(json!({
            "documents": {"line_7": [{"number": "1", "net": 8000000, "vat": 1520000}]}
        }));
        let codes = resolve(&input, &rules()).unwrap();
        assert_eq!(codes.amount(503), 1);
        assert_eq!(codes.amount(502), 1_520_000);
        assert_eq!(codes.amount(538), 1_520_000);
        assert_eq!(codes.amount(89), 1_520_000);
        assert_eq!(codes.amount(77), 0);
    }

    #[test]
    fn vat_falls_back_to_net_times_rate_on_the_sum() {
        let input = doc(json!({
            "documents": {"line_7": [
                {"number": "1", "net": 1001},
                {"number": "2", "net": 1001}
            ]}
        }));
        let codes = resolve(&input, &rules()).unwrap();
        // floor(2002 * 0.19) = 380, per-document flooring would give 190 + 190.
        assert_eq!(codes.amount(502), 380);
    }

    #[test]
    fn documents_take_precedence_over_aggregates() {
        let with_agg = doc(json!({
            "sales": {"taxable_invoices_count": 9, "taxable_invoices_net": 5000000},
            "documents": {"line_7": [{"number": "1", "net": 100000, "vat": 19000}]}
        }));
        let without_agg = doc(json!({
            "documents": {"line_7": [{"number": "1", "net": 100000, "vat": 19000}]}
        }));
        let a = resolve(&with_agg, &rules()).unwrap();
        let b = resolve(&without_agg, &rules()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.amount(503), 1);
        assert_eq!(a.amount(563), 100_000);
    }

    #[test]
    fn aggregate_fallback_prefers_vat_over_net() {
        let input = doc(json!({
            "sales": {"taxable_invoices_count": 3, "taxable_invoices_net": 1000000, "receipts_net": 500000},
            "purchases": {"invoices_count": 2, "invoices_vat": 95000}
        }));
        let codes = resolve(&input, &rules()).unwrap();
        assert_eq!(codes.amount(503), 3);
        assert_eq!(codes.amount(502), 190_000);
        assert_eq!(codes.amount(111), 95_000);
        assert_eq!(codes.amount(519), 2);
        assert_eq!(codes.amount(520), 95_000);
        assert_eq!(codes.amount(511), 2);
        assert_eq!(codes.amount(514), 95_000);
        assert_eq!(codes.amount(538), 285_000);
        assert_eq!(codes.amount(537), 95_000);
        assert_eq!(codes.amount(89), 190_000);
    }

    #[test]
    fn credit_notes_subtract_from_debits() {
        let input = doc(json!({
            "sales": {"taxable_invoices_vat": 1000, "credit_notes_vat": 300}
        }));
        let codes = resolve(&input, &rules()).unwrap();
        assert_eq!(codes.amount(538), 700);
    }

    #[test]
    fn determination_carries_excess_credit_forward() {
        let input = doc(json!({
            "sales": {"taxable_invoices_vat": 100000},
            "purchases": {"invoices_vat": 80000},
            "prior-period-carry-over": {"vat-credit": 50000},
            "refunds": {"art_36_exporters": 10000}
        }));
        let codes = resolve(&input, &rules()).unwrap();
        assert_eq!(codes.amount(504), 50_000);
        assert_eq!(codes.amount(537), 120_000);
        assert_eq!(codes.amount(89), 0);
        assert_eq!(codes.amount(77), 20_000);
    }

    #[test]
    fn debits_over_credits_give_tax_payable() {
        let input = doc(json!({
            "sales": {"taxable_invoices_vat": 2541111},
            "purchases": {"invoices_vat": 494730}
        }));
        let codes = resolve(&input, &rules()).unwrap();
        assert_eq!(codes.amount(538), 2_541_111);
        assert_eq!(codes.amount(537), 494_730);
        assert_eq!(codes.amount(89), 2_046_381);
        assert_eq!(codes.amount(77), 0);
        assert_eq!(codes.amount(91), 2_046_381);
    }

    #[test]
    fn suspension_zeroes_ppm() {
        let input = doc(json!({"ppm": {"base": 13374273, "rate": 2.5, "suspension": true}}));
        let codes = resolve(&input, &rules()).unwrap();
        assert_eq!(codes.amount(62), 0);
        assert_eq!(codes.amount(750), 1);
        assert_eq!(codes.amount(563), 13_374_273);
        assert_eq!(codes.get(115), Some(&CodeValue::Rate(dec!(2.5))));
    }

    #[test]
    fn ppm_base_is_signed_sum_of_sales_nets() {
        let input = doc(json!({
            "sales": {
                "taxable_invoices_net": 10000000,
                "exempt_sales_net": 2000000,
                "export_invoices_net": 1000000,
                "receipts_net": 500000,
                "debit_notes_net": 100000,
                "credit_notes_net": 600000
            },
            "ppm": {"rate": 1}
        }));
        let codes = resolve(&input, &rules()).unwrap();
        assert_eq!(codes.amount(563), 13_000_000);
        assert_eq!(codes.amount(62), 130_000);
    }

    #[test]
    fn default_ppm_rate_comes_from_rules() {
        let input = doc(json!({"ppm": {"base": 1000000}}));
        let codes = resolve(&input, &rules()).unwrap();
        assert_eq!(codes.get(115), Some(&CodeValue::Rate(dec!(0.25))));
        assert_eq!(codes.amount(62), 2_500);
    }

    #[test]
    fn training_credit_offsets_ppm_and_carries_remainder() {
        let input = doc(json!({
            "ppm": {"base": 10000000, "rate": 1, "training-credit": 150000},
            "prior-period-carry-over": {"training-credit": 20000}
        }));
        let codes = resolve(&input, &rules()).unwrap();
        assert_eq!(codes.amount(62), 100_000);
        assert_eq!(codes.amount(723), 100_000);
        assert_eq!(codes.amount(724), 70_000);
        assert_eq!(codes.amount(595), 0);
    }

    #[test]
    fn withholdings_from_documents_and_aggregates() {
        let input = doc(json!({
            "withholdings": {"directors_fees": 5000, "first_category": 700, "professional_fees": 999999},
            "documents": {
                "line_60": [{"number": "L1", "gross": 1500000, "income_tax": 12000}],
                "line_61": [
                    {"number": "B1", "gross": 1000000, "withheld": 152500},
                    {"number": "B2", "gross": 200000, "withheld": 30500}
                ]
            }
        }));
        let codes = resolve(&input, &rules()).unwrap();
        assert_eq!(codes.amount(48), 12_000);
        assert_eq!(codes.amount(151), 183_000);
        assert_eq!(codes.amount(153), 5_000);
        assert_eq!(codes.amount(50), 700);
        assert_eq!(codes.amount(595), 200_700);
        assert_eq!(codes.amount(91), 200_700);
    }

    #[test]
    fn subject_change_net_is_derived_from_components() {
        let input = doc(json!({
            "cambio_sujeto": {"iva_retenido_total": 495590, "iva_retenido_nc": 2934}
        }));
        let codes = resolve(&input, &rules()).unwrap();
        assert_eq!(codes.amount(596), 492_656);
        assert_eq!(codes.amount(547), 492_656);
    }

    #[test]
    fn supplied_subject_change_net_wins() {
        let input = doc(json!({
            "subject-change": {"total-retained": 1000, "net-retention": 10}
        }));
        let codes = resolve(&input, &rules()).unwrap();
        assert_eq!(codes.amount(596), 10);
    }

    #[test]
    fn final_totals_add_surcharges() {
        let input = doc(json!({
            "sales": {"taxable_invoices_vat": 100000},
            "surcharges": {"inflation-adjustment": 1200, "interest-and-penalties": 3000}
        }));
        let codes = resolve(&input, &rules()).unwrap();
        assert_eq!(codes.amount(547), 100_000);
        assert_eq!(codes.amount(91), 100_000);
        assert_eq!(codes.amount(92), 1_200);
        assert_eq!(codes.amount(93), 3_000);
        assert_eq!(codes.amount(94), 104_200);
    }

    #[test]
    fn every_referenced_code_is_present() {
        for input in [InputDocument::default(), doc(json!({"codes": {}}))] {
            let codes = resolve(&input, &rules()).unwrap();
            for code in form::referenced_codes() {
                assert!(codes.contains(code), "code {code}");
            }
        }
    }

    #[test]
    fn malformed_record_fails_the_whole_run() {
        let input = doc(json!({
            "sales": {"taxable_invoices_vat": 100},
            "documents": {"line_28": [{"number": "1", "net": 10}, [1, 2]]}
        }));
        let err = resolve(&input, &rules()).unwrap_err();
        assert_eq!(
            err,
            ResolveError::InvalidInput {
                line: "line_28".into(),
                index: Some(1),
                reason: "record is not an object".into(),
            }
        );
    }

    #[test]
    fn lenient_rules_default_missing_fields() {
        let input = doc(json!({"documents": {"line_7": [{"net": 1000}]}}));
        assert!(resolve(&input, &rules()).is_err());
        let lenient = TaxRules {
            strictness: Strictness::Lenient,
            ..TaxRules::default()
        };
        let codes = resolve(&input, &lenient).unwrap();
        assert_eq!(codes.amount(502), 190);
    }

    #[test]
    fn batch_keeps_order_and_isolates_failures() {
        let inputs = vec![
            doc(json!({"sales": {"taxable_invoices_vat": 1}})),
            doc(json!({"documents": {"line_7": [7]}})),
            doc(json!({"sales": {"taxable_invoices_vat": 3}})),
        ];
        let results = resolve_batch(&inputs, &rules());
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().amount(538), 1);
        assert!(results[1].is_err());
        assert_eq!(results[2].as_ref().unwrap().amount(538), 3);
    }

    #[test]
    fn resolution_is_deterministic() {
        let input = InputDocument {
            ppm: PpmInput {
                rate: Some(dec!(0.5)),
                base: Some(777_777),
                ..PpmInput::default()
            },
            ..doc(json!({"sales": {"receipts_net": 123457}}))
        };
        assert_eq!(
            resolve(&input, &rules()).unwrap(),
            resolve(&input, &rules()).unwrap()
        );
    }

    #[test]
    fn spanish_keyed_aggregates_resolve_like_english_ones() {
        let input = doc(json!({
            "ventas": {"facturas_afectas_cant": 14, "facturas_afectas_neto": 13374273},
            "compras": {"facturas_giro_cant": 32, "facturas_giro_iva": 497664},
            "retenciones": {"honorarios_retencion": 152500},
            "remanente_anterior": 50000,
            "ppm": {"tasa": 2.5, "remanente_sence_anterior": 9000}
        }));
        let codes = resolve(&input, &rules()).unwrap();
        assert_eq!(codes.amount(503), 14);
        assert_eq!(codes.amount(502), 2_541_111);
        assert_eq!(codes.amount(519), 32);
        assert_eq!(codes.amount(520), 497_664);
        assert_eq!(codes.amount(511), 32);
        assert_eq!(codes.amount(514), 497_664);
        assert_eq!(codes.amount(151), 152_500);
        assert_eq!(codes.amount(504), 50_000);
        assert_eq!(codes.amount(538), 2_541_111);
        assert_eq!(codes.amount(537), 547_664);
        assert_eq!(codes.amount(89), 1_993_447);
        assert_eq!(codes.amount(563), 13_374_273);
        assert_eq!(codes.amount(62), 334_356);
        assert_eq!(codes.amount(722), 9_000);
        assert_eq!(codes.amount(723), 9_000);
        assert_eq!(codes.amount(724), 0);
        assert_eq!(codes.amount(595), 2_471_303);
        assert_eq!(codes.amount(91), 2_471_303);

        let english = doc(json!({
            "sales": {"taxable_invoices_count": 14, "taxable_invoices_net": 13374273},
            "purchases": {"invoices_count": 32, "invoices_vat": 497664},
            "withholdings": {"professional_fees": 152500},
            "prior-period-carry-over": {"vat-credit": 50000, "training-credit": 9000},
            "ppm": {"rate": 2.5}
        }));
        assert_eq!(resolve(&english, &rules()).unwrap(), codes);
    }

    #[test]
    fn unknown_aggregate_field_fails_strict_runs() {
        let input = doc(json!({"ventas": {"facturas_afectas_netto": 1000}}));
        assert_eq!(
            resolve(&input, &rules()).unwrap_err(),
            ResolveError::InvalidInput {
                line: "sales".into(),
                index: None,
                reason: "unknown field `facturas_afectas_netto`".into(),
            }
        );
        // A purchases field placed under sales is just as unknown.
        let input = doc(json!({"sales": {"invoices_vat": 1000}}));
        let err = resolve(&input, &rules()).unwrap_err();
        assert_eq!(err.to_string(), "invalid input in sales: unknown field `invoices_vat`");
    }

    #[test]
    fn lenient_runs_skip_unknown_aggregate_fields() {
        let input = doc(json!({
            "sales": {"taxable_invoices_vat": 1000, "mystery": 5},
            "refunds": {"unheard_of": 7}
        }));
        let lenient = TaxRules {
            strictness: Strictness::Lenient,
            ..TaxRules::default()
        };
        let codes = resolve(&input, &lenient).unwrap();
        assert_eq!(codes.amount(538), 1_000);
        assert_eq!(codes.amount(89), 1_000);
    }

    #[test]
    fn digital_purchase_invoices_also_read_from_purchases() {
        let input = doc(json!({
            "compras": {"facturas_compra_digital_cant": 2, "facturas_compra_digital_neto": 700000}
        }));
        let codes = resolve(&input, &rules()).unwrap();
        assert_eq!(codes.amount(515), 2);
        assert_eq!(codes.amount(587), 700_000);

        let both = doc(json!({
            "sales": {"purchase_invoices_issued_net": 100},
            "purchases": {"purchase_invoices_issued_net": 700000}
        }));
        assert_eq!(resolve(&both, &rules()).unwrap().amount(587), 100);
    }

    #[test]
    fn overflowing_debits_are_an_error() {
        let input = doc(json!({"sales": {"taxable_invoices_vat": i64::MAX, "receipts_vat": 1}}));
        assert_eq!(
            resolve(&input, &rules()),
            Err(ResolveError::Overflow { code: 538 })
        );
        // Negating the minimum for a subtracted row overflows as well.
        let input = doc(json!({"sales": {"credit_notes_vat": i64::MIN}}));
        assert_eq!(
            resolve(&input, &rules()),
            Err(ResolveError::Overflow { code: 538 })
        );
    }

    #[test]
    fn amounts_at_the_i64_limit_still_resolve() {
        let input = doc(json!({"sales": {"taxable_invoices_vat": i64::MAX}}));
        let codes = resolve(&input, &rules()).unwrap();
        assert_eq!(codes.amount(538), i64::MAX);
        assert_eq!(codes.amount(89), i64::MAX);
        assert_eq!(codes.amount(91), i64::MAX);
    }

    #[test]
    fn overflow_names_the_code_being_computed() {
        let cases = [
            (
                json!({"documents": {"line_7": [
                    {"number": "1", "net": 1, "vat": i64::MAX},
                    {"number": "2", "net": 1, "vat": 1}
                ]}}),
                502,
            ),
            (json!({"withholdings": {"directors_fees": i64::MAX, "first_category": 1}}), 595),
            (
                json!({"cambio_sujeto": {"iva_retenido_total": i64::MAX, "retencion_margen": 1}}),
                596,
            ),
            (
                json!({
                    "sales": {"taxable_invoices_vat": 1},
                    "surcharges": {"inflation-adjustment": i64::MAX}
                }),
                94,
            ),
            (
                json!({"ppm": {"base": 0, "training-credit": i64::MAX},
                       "prior-period-carry-over": {"training-credit": 1}}),
                723,
            ),
        ];
        for (value, code) in cases {
            assert_eq!(
                resolve(&doc(value), &rules()),
                Err(ResolveError::Overflow { code }),
                "code {code}"
            );
        }
    }

    proptest! {
        #[test]
        fn exactly_one_side_of_the_determination(
            sales_vat in 0i64..50_000_000,
            purchase_vat in 0i64..50_000_000,
            prior in 0i64..10_000_000,
        ) {
            let input = doc(json!({
                "sales": {"taxable_invoices_vat": sales_vat},
                "purchases": {"invoices_vat": purchase_vat},
                "prior-period-carry-over": {"vat-credit": prior}
            }));
            let codes = resolve(&input, &rules()).unwrap();
            let (payable, forward) = (codes.amount(89), codes.amount(77));
            if codes.amount(538) == codes.amount(537) {
                prop_assert_eq!((payable, forward), (0, 0));
            } else {
                prop_assert!((payable == 0) != (forward == 0));
            }
        }

        #[test]
        fn ppm_offset_is_capped(
            base in 0i64..100_000_000,
            credit in 0i64..5_000_000,
            carried in 0i64..5_000_000,
        ) {
            let input = doc(json!({
                "ppm": {"base": base, "rate": 2.5, "training-credit": credit},
                "prior-period-carry-over": {"training-credit": carried}
            }));
            let codes = resolve(&input, &rules()).unwrap();
            prop_assert!(codes.amount(723) <= codes.amount(62));
            prop_assert_eq!(codes.amount(723) + codes.amount(724), credit + carried);
        }
    }
}
