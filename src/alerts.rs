//! Advisory alerts attached to a report.
//!
//! Alerts never change the code map.  They flag situations an
//! accountant should look at before filing, echo the caller's notes and
//! always end with the filing deadline and a disclaimer.

use crate::documents::ItemizedDocuments;
use crate::engine::fallback_value;
use crate::form::code;
use crate::models::{CodeMap, InputDocument, Note};
use crate::report::{month_name, pesos};
use serde::Serialize;

/// Kinds shown with a highlighted background.
const HIGHLIGHTED: [&str; 2] = ["REMANENTE", "PRORRATEO"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alert {
    pub kind: String,
    pub message: String,
    pub highlight: bool,
}

impl Alert {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        let kind = kind.into();
        let highlight = HIGHLIGHTED.contains(&kind.as_str());
        Self {
            kind,
            message: message.into(),
            highlight,
        }
    }
}

/// Alerts for a resolved declaration, in display order.
pub fn collect_alerts(
    input: &InputDocument,
    codes: &CodeMap,
    documents: &ItemizedDocuments,
) -> Vec<Alert> {
    let mut alerts = Vec::new();
    let remainder = codes.amount(code::CREDIT_CARRIED_FORWARD);
    let debits = codes.amount(code::TOTAL_DEBITS);

    if remainder > 0 && debits > 0 && remainder > debits.saturating_mul(3) {
        alerts.push(Alert::new(
            "REMANENTE",
            format!(
                "Remanente CF ({}) muy superior al débito. Considerar devolución Art. 36 o Art. 27 bis.",
                pesos(remainder)
            ),
        ));
    }
    if codes.amount(code::EXPORT_COUNT) > 0 {
        alerts.push(Alert::new(
            "EXPORTACIÓN",
            format!(
                "{} facturas de exportación ({} neto). Verificar calificación Aduanas.",
                codes.amount(code::EXPORT_COUNT),
                pesos(codes.amount(code::EXPORT_NET))
            ),
        ));
    }
    if codes.amount(code::SC_NET_RETENTION) > 0 {
        alerts.push(Alert::new(
            "CAMBIO SUJETO",
            format!(
                "Retención cambio de sujeto: {}. Corresponde a IVA retenido por FC de servicios digitales extranjeros.",
                pesos(codes.amount(code::SC_NET_RETENTION))
            ),
        ));
    }
    if codes.amount(code::FEE_WITHHOLDING) > 0 {
        alerts.push(Alert::new(
            "HONORARIOS",
            format!(
                "Retención: {}. Tasa 2026: 15,25%.",
                pesos(codes.amount(code::FEE_WITHHOLDING))
            ),
        ));
    }
    if codes.amount(code::PRIOR_CREDIT) > 0 {
        alerts.push(Alert::new(
            "REMANENTE ANT.",
            format!(
                "Remanente CF arrastrado: {}. Verificar vs código 77 del F29 anterior.",
                pesos(codes.amount(code::PRIOR_CREDIT))
            ),
        ));
    }

    let taxable = codes.amount(code::TAXABLE_INVOICE_COUNT) > 0 || codes.amount(code::RECEIPT_COUNT) > 0;
    let exempt = codes.amount(code::EXPORT_COUNT) > 0 || codes.amount(code::EXEMPT_COUNT) > 0;
    if taxable && exempt {
        alerts.push(Alert::new(
            "PRORRATEO",
            "Ventas afectas + exentas/exportación. Verificar prorrateo de CF de uso común.",
        ));
    }

    alerts.extend(count_mismatches(input, documents));

    for note in &input.notes {
        alerts.push(match note {
            Note::Tagged(kind, message) => Alert::new(kind.as_str(), message.as_str()),
            Note::Plain(message) => Alert::new("NOTA", message.as_str()),
        });
    }

    let header = &input.header;
    let (month, year) = if header.period_month >= 12 {
        (1, header.period_year + 1)
    } else {
        (header.period_month + 1, header.period_year)
    };
    alerts.push(Alert::new(
        "PLAZO",
        format!(
            "Declarar antes del 20 de {} {} (internet).",
            month_name(month),
            year
        ),
    ));
    alerts.push(Alert::new(
        "DISCLAIMER",
        "Herramienta de apoyo administrativo. NO es asesoría tributaria. \
         Debe ser revisado por un contador antes de presentarse al SII.",
    ));
    alerts
}

/// Itemized lines whose aggregate count field disagrees with the number
/// of documents.  Documents win; the aggregate is reported, not used.
fn count_mismatches<'a>(
    input: &'a InputDocument,
    documents: &'a ItemizedDocuments,
) -> impl Iterator<Item = Alert> + 'a {
    documents.iter().filter_map(move |(source, records)| {
        let field = source.fallback.count?;
        let declared = fallback_value(input, &source.fallback, field)?;
        if declared == records.len() as i64 {
            return None;
        }
        tracing::warn!(
            line = source.line,
            declared,
            documents = records.len(),
            "aggregate count disagrees with itemized documents"
        );
        Some(Alert::new(
            "CANTIDAD",
            format!(
                "Línea {}: los totales agregados declaran {} documento(s) ({}) pero se entregaron {}. Se usaron los documentos.",
                source.line,
                declared,
                field,
                records.len()
            ),
        ))
    })
}
