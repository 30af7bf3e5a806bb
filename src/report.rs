//! Printable F29 report.
//!
//! A [`Report`] is a plain data view of a resolved code map: the form
//! as printed, a per-line listing of the itemized documents and the
//! advisory alerts.  It serialises to JSON for API callers and renders
//! to plain text with [`render_text`].  Building a report never
//! changes the code map.

use crate::alerts::{collect_alerts, Alert};
use crate::documents::{parse_documents, FieldMapping, ItemizedDocuments};
use crate::error::{ResolveError, Result};
use crate::form::{self, code, FormSection, LineDef, Operator};
use crate::models::{CodeMap, CodeValue, InputDocument};
use crate::tax::TaxRules;
use anyhow::Context;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

const MONTHS: [&str; 12] = [
    "Enero",
    "Febrero",
    "Marzo",
    "Abril",
    "Mayo",
    "Junio",
    "Julio",
    "Agosto",
    "Septiembre",
    "Octubre",
    "Noviembre",
    "Diciembre",
];

/// Shown in place of the detail listing when no line was itemized.
pub const NO_DOCUMENTS: &str = "Sin documentos individuales. Se usaron totales agregados.";

/// Spanish name of a month, or the number itself when out of range.
pub fn month_name(month: u32) -> String {
    month
        .checked_sub(1)
        .and_then(|i| MONTHS.get(i as usize))
        .map(|name| name.to_string())
        .unwrap_or_else(|| month.to_string())
}

fn grouped(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push('.');
        }
        out.push(ch);
    }
    out
}

/// Form cell formatting: `2.541.111`, with zero shown as an empty cell.
pub fn thousands(value: i64) -> String {
    match value {
        0 => String::new(),
        v if v < 0 => format!("-{}", grouped(v.unsigned_abs())),
        v => grouped(v.unsigned_abs()),
    }
}

/// Peso formatting used in the detail listing and alerts: `$1.000`,
/// `-$1.000`, `$0`.
pub fn pesos(value: i64) -> String {
    if value < 0 {
        format!("-${}", grouped(value.unsigned_abs()))
    } else {
        format!("${}", grouped(value.unsigned_abs()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportHeader {
    pub period: String,
    pub taxpayer_id: String,
    pub legal_name: String,
    pub folio: String,
}

/// One printed row with its values looked up from the code map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportRow {
    pub line: String,
    pub description: String,
    pub quantity_code: Option<u16>,
    pub quantity: Option<i64>,
    pub amount_code: u16,
    pub amount: i64,
    pub operator: Operator,
    pub total: bool,
}

impl ReportRow {
    fn from_line(line: &LineDef, codes: &CodeMap) -> Self {
        Self {
            line: line.number.to_string(),
            description: line.description.to_string(),
            quantity_code: line.quantity_code,
            quantity: line.quantity_code.map(|c| codes.amount(c)),
            amount_code: line.amount_code,
            amount: codes.amount(line.amount_code),
            operator: line.operator,
            total: line.operator == Operator::Total,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportSection {
    pub part: Option<String>,
    pub title: String,
    pub quantity_label: String,
    pub amount_label: String,
    pub rows: Vec<ReportRow>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DetailRow {
    pub index: usize,
    pub text: Vec<String>,
    pub amounts: Vec<i64>,
}

/// Documents of one itemized line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DetailSection {
    pub heading: String,
    pub columns: Vec<String>,
    pub rows: Vec<DetailRow>,
    /// Column totals over the monetary columns.
    pub totals: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub title: String,
    pub form_version: String,
    pub header: ReportHeader,
    pub form: Vec<ReportSection>,
    pub detail: Vec<DetailSection>,
    /// Set when there is no detail listing.
    pub detail_note: Option<String>,
    pub alerts: Vec<Alert>,
}

/// Build the report for a resolved declaration.
///
/// Fails when the input's documents cannot be parsed under `rules`, the
/// same condition that fails resolution, or when a detail total
/// overflows.
pub fn build_report(input: &InputDocument, codes: &CodeMap, rules: &TaxRules) -> Result<Report> {
    let documents = parse_documents(&input.documents, rules.strictness)?;
    let header = &input.header;
    let month = month_name(header.period_month);

    let detail = detail_sections(&documents)?;
    let detail_note = documents.is_empty().then(|| NO_DOCUMENTS.to_string());

    Ok(Report {
        title: format!("F29 — {} {}", month, header.period_year),
        form_version: rules.form_version.clone(),
        header: ReportHeader {
            period: format!("Mes: {}  —  Año: {}", header.period_month, header.period_year),
            taxpayer_id: header.taxpayer_id.clone(),
            legal_name: header.legal_name.clone(),
            folio: header.folio.clone(),
        },
        form: form::FORM
            .iter()
            .filter_map(|section| form_section(section, codes))
            .collect(),
        detail,
        detail_note,
        alerts: collect_alerts(input, codes, &documents),
    })
}

fn form_section(section: &FormSection, codes: &CodeMap) -> Option<ReportSection> {
    let has = |c: u16| section.lines.iter().any(|l| l.amount_code == c);
    if has(code::SC_NET_RETENTION)
        && codes.amount(code::SC_NET_RETENTION) <= 0
        && codes.amount(code::SC_TOTAL_RETAINED) <= 0
    {
        return None;
    }

    let mut rows = Vec::with_capacity(section.lines.len());
    for line in section.lines {
        let mut row = ReportRow::from_line(line, codes);
        match line.amount_code {
            code::CREDIT_CARRIED_FORWARD | code::TRAINING_CREDIT_APPLIED if row.amount <= 0 => {
                continue
            }
            code::TAX_PAYABLE if row.amount <= 0 => continue,
            code::TAX_PAYABLE | code::SC_NET_RETENTION => row.total = true,
            code::PPM_AMOUNT => {
                row.description = format!(
                    "{}  |  Base Imponible: {}  |  Tasa: {}%",
                    line.description,
                    thousands(codes.amount(code::PPM_BASE)),
                    rate_label(codes.get(code::PPM_RATE))
                );
            }
            _ => {}
        }
        rows.push(row);
    }

    if has(code::TAX_PAYABLE) && rows.is_empty() {
        rows.push(ReportRow {
            line: "50".to_string(),
            description: "Sin IVA determinado ni remanente".to_string(),
            quantity_code: None,
            quantity: None,
            amount_code: code::TAX_PAYABLE,
            amount: 0,
            operator: Operator::Add,
            total: false,
        });
    }

    Some(ReportSection {
        part: section.part.map(str::to_string),
        title: section.title.to_string(),
        quantity_label: section.quantity_label.to_string(),
        amount_label: section.amount_label.to_string(),
        rows,
    })
}

fn rate_label(value: Option<&CodeValue>) -> String {
    match value {
        Some(CodeValue::Rate(rate)) => rate.normalize().to_string(),
        Some(CodeValue::Amount(v)) => v.to_string(),
        None => "0".to_string(),
    }
}

fn detail_sections(documents: &ItemizedDocuments) -> Result<Vec<DetailSection>> {
    let mut sections = Vec::new();
    for (source, records) in documents.iter() {
        let Some(itemization) = source.itemization else {
            continue;
        };
        let codes = match source.quantity_code {
            Some(q) => format!("{}/{}", q, source.amount_code),
            None => source.amount_code.to_string(),
        };
        let columns = itemization.kind.columns();
        let rows: Vec<DetailRow> = records
            .iter()
            .enumerate()
            .map(|(i, record)| DetailRow {
                index: i + 1,
                text: record.text_fields().to_vec(),
                amounts: record.amounts(),
            })
            .collect();
        let mut totals = vec![0i64; columns.len().saturating_sub(5)];
        for row in &rows {
            for (total, amount) in totals.iter_mut().zip(&row.amounts) {
                *total = total.checked_add(*amount).ok_or(ResolveError::Overflow {
                    code: source.amount_code,
                })?;
            }
        }
        sections.push(DetailSection {
            heading: format!(
                "LÍNEA {} — {} — Cód. {} — {} documento(s)",
                source.line,
                itemization.name,
                codes,
                records.len()
            ),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows,
            totals,
        });
    }
    Ok(sections)
}

/// Write the plain-text rendering of `report`.
pub fn render_text<W: Write>(report: &Report, out: &mut W) -> std::io::Result<()> {
    writeln!(out, "{}", report.title)?;
    writeln!(out, "Impuestos Mensuales ({})", report.form_version)?;
    writeln!(
        out,
        "Periodo Tributario: {} | Rol Único Tributario: {} | Folio: {}",
        report.header.period, report.header.taxpayer_id, report.header.folio
    )?;
    writeln!(out, "Razón Social: {}", report.header.legal_name)?;

    for section in &report.form {
        writeln!(out)?;
        if let Some(part) = &section.part {
            writeln!(out, "=== {part} ===")?;
        }
        writeln!(out, "--- {} ---", section.title)?;
        if !section.quantity_label.is_empty() {
            writeln!(
                out,
                "{:>4}  {:<72} {:>19} {:>23}",
                "", "", section.quantity_label, section.amount_label
            )?;
        }
        for row in &section.rows {
            let marker = if row.total { "*" } else { " " };
            writeln!(
                out,
                "{:>4}{} {:<72} {:>5} {:>13} {:>5} {:>17} {}",
                row.line,
                marker,
                row.description,
                row.quantity_code.map(|c| c.to_string()).unwrap_or_default(),
                row.quantity.map(thousands).unwrap_or_default(),
                row.amount_code,
                thousands(row.amount),
                row.operator.symbol()
            )?;
        }
    }

    writeln!(out)?;
    writeln!(out, "DETALLE DE DOCUMENTOS POR LÍNEA DEL F29")?;
    if let Some(note) = &report.detail_note {
        writeln!(out, "{note}")?;
    }
    for section in &report.detail {
        writeln!(out)?;
        writeln!(out, "{}", section.heading)?;
        writeln!(out, "# | {}", section.columns.join(" | "))?;
        for row in &section.rows {
            let amounts: Vec<String> = row.amounts.iter().map(|v| pesos(*v)).collect();
            writeln!(
                out,
                "{} | {} | {}",
                row.index,
                row.text.join(" | "),
                amounts.join(" | ")
            )?;
        }
        let totals: Vec<String> = section.totals.iter().map(|v| pesos(*v)).collect();
        writeln!(out, "  | TOTAL |  |  |  |  | {}", totals.join(" | "))?;
    }

    writeln!(out)?;
    writeln!(out, "ALERTAS Y VALIDACIONES")?;
    for alert in &report.alerts {
        let marker = if alert.highlight { "!" } else { " " };
        writeln!(out, "{marker} {:<16} {}", alert.kind, alert.message)?;
    }
    Ok(())
}

/// Render `report` into the file at `path`, replacing it.
pub fn write_report(report: &Report, path: &Path) -> anyhow::Result<()> {
    let file = File::create(path)
        .with_context(|| format!("creating report file {}", path.display()))?;
    let mut out = BufWriter::new(file);
    render_text(report, &mut out)
        .with_context(|| format!("writing report file {}", path.display()))?;
    out.flush()
        .with_context(|| format!("flushing report file {}", path.display()))?;
    tracing::info!(path = %path.display(), "report written");
    Ok(())
}
