//! Itemized document records.
//!
//! Each itemizable line of the form declares the kind of document it
//! carries.  Raw JSON records are parsed into the record type of that
//! kind, and each record type has exactly one mapping from its fields
//! to the taxable base, the VAT and the withheld amount.

use crate::error::{ResolveError, Result};
use crate::form::{self, LineSource};
use crate::tax::Strictness;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// The kind of document a line accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentKind {
    /// Issued invoices, receipts and sales credit/debit notes.
    Sale,
    /// Received invoices, import declarations and received notes.
    Purchase,
    /// Professional-fee receipts (boletas de honorarios).
    FeeReceipt,
    /// Payroll slips (liquidaciones de sueldo).
    PayrollSlip,
}

impl DocumentKind {
    /// Column headers for the detail listing of this kind.  The first
    /// five columns are text, the rest are amounts.
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            DocumentKind::Sale => &[
                "N° Doc", "Fecha", "RUT", "Razón Social", "Descripción", "Neto", "IVA", "Exento",
                "Total",
            ],
            DocumentKind::Purchase => &[
                "N° Doc", "Fecha", "RUT", "Razón Social", "Descripción", "Neto", "IVA", "Total",
            ],
            DocumentKind::FeeReceipt => &[
                "N° Boleta", "Fecha", "RUT", "Razón Social", "Descripción", "Bruto", "Retención",
                "Líquido",
            ],
            DocumentKind::PayrollSlip => &[
                "N° Liquidación", "Fecha", "RUT", "Nombre", "Cargo", "Sueldo Bruto", "IUSC",
                "Líquido",
            ],
        }
    }
}

/// Field mapping shared by every record type.
pub trait FieldMapping {
    /// Fields that must be present for the record to be accepted in
    /// strict mode but are missing.
    fn missing_fields(&self) -> Vec<&'static str>;
    /// Taxable base: net for invoices, gross for fees and payroll.
    fn net_amount(&self) -> i64;
    /// VAT charged, when the record carries it.
    fn vat_amount(&self) -> Option<i64>;
    /// Tax withheld by the taxpayer on this document.
    fn withheld_amount(&self) -> i64;
    /// Number, date, tax id, name and description, in that order.
    fn text_fields(&self) -> [String; 5];
    /// Monetary columns, in the order of [`DocumentKind::columns`].
    fn amounts(&self) -> Vec<i64>;
}

fn identifier<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Identifier {
        Text(String),
        Number(i64),
    }
    Ok(Option::<Identifier>::deserialize(deserializer)?.map(|id| match id {
        Identifier::Text(s) => s,
        Identifier::Number(n) => n.to_string(),
    }))
}

fn text(field: &Option<String>) -> String {
    field.clone().unwrap_or_default()
}

fn require(missing: &mut Vec<&'static str>, present: bool, field: &'static str) {
    if !present {
        missing.push(field);
    }
}

/// An issued invoice, receipt or note.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaleRecord {
    #[serde(alias = "numero", deserialize_with = "identifier")]
    pub number: Option<String>,
    #[serde(alias = "fecha")]
    pub date: Option<String>,
    #[serde(alias = "rut")]
    pub tax_id: Option<String>,
    #[serde(alias = "razon_social")]
    pub name: Option<String>,
    #[serde(alias = "descripcion")]
    pub description: Option<String>,
    #[serde(alias = "neto")]
    pub net: Option<i64>,
    #[serde(alias = "iva")]
    pub vat: Option<i64>,
    #[serde(alias = "exento")]
    pub exempt: Option<i64>,
    pub total: Option<i64>,
}

impl FieldMapping for SaleRecord {
    fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        require(&mut missing, self.number.is_some(), "number");
        require(&mut missing, self.net.is_some(), "net");
        missing
    }

    fn net_amount(&self) -> i64 {
        self.net.unwrap_or(0)
    }

    fn vat_amount(&self) -> Option<i64> {
        self.vat
    }

    fn withheld_amount(&self) -> i64 {
        0
    }

    fn text_fields(&self) -> [String; 5] {
        [
            text(&self.number),
            text(&self.date),
            text(&self.tax_id),
            text(&self.name),
            text(&self.description),
        ]
    }

    fn amounts(&self) -> Vec<i64> {
        vec![
            self.net_amount(),
            self.vat.unwrap_or(0),
            self.exempt.unwrap_or(0),
            self.total.unwrap_or(0),
        ]
    }
}

/// A received invoice, import declaration or note.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PurchaseRecord {
    #[serde(alias = "numero", deserialize_with = "identifier")]
    pub number: Option<String>,
    #[serde(alias = "fecha")]
    pub date: Option<String>,
    #[serde(alias = "rut")]
    pub tax_id: Option<String>,
    #[serde(alias = "razon_social")]
    pub name: Option<String>,
    #[serde(alias = "descripcion")]
    pub description: Option<String>,
    #[serde(alias = "neto")]
    pub net: Option<i64>,
    #[serde(alias = "iva")]
    pub vat: Option<i64>,
    pub total: Option<i64>,
}

impl FieldMapping for PurchaseRecord {
    fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        require(&mut missing, self.number.is_some(), "number");
        require(&mut missing, self.net.is_some(), "net");
        missing
    }

    fn net_amount(&self) -> i64 {
        self.net.unwrap_or(0)
    }

    fn vat_amount(&self) -> Option<i64> {
        self.vat
    }

    fn withheld_amount(&self) -> i64 {
        0
    }

    fn text_fields(&self) -> [String; 5] {
        [
            text(&self.number),
            text(&self.date),
            text(&self.tax_id),
            text(&self.name),
            text(&self.description),
        ]
    }

    fn amounts(&self) -> Vec<i64> {
        vec![
            self.net_amount(),
            self.vat.unwrap_or(0),
            self.total.unwrap_or(0),
        ]
    }
}

/// A professional-fee receipt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeeReceiptRecord {
    #[serde(alias = "numero", deserialize_with = "identifier")]
    pub number: Option<String>,
    #[serde(alias = "fecha")]
    pub date: Option<String>,
    #[serde(alias = "rut")]
    pub tax_id: Option<String>,
    #[serde(alias = "razon_social")]
    pub name: Option<String>,
    #[serde(alias = "descripcion")]
    pub description: Option<String>,
    #[serde(alias = "bruto")]
    pub gross: Option<i64>,
    #[serde(alias = "retencion")]
    pub withheld: Option<i64>,
    #[serde(alias = "liquido")]
    pub net_paid: Option<i64>,
}

impl FieldMapping for FeeReceiptRecord {
    fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        require(&mut missing, self.number.is_some(), "number");
        require(&mut missing, self.gross.is_some(), "gross");
        require(&mut missing, self.withheld.is_some(), "withheld");
        missing
    }

    fn net_amount(&self) -> i64 {
        self.gross.unwrap_or(0)
    }

    fn vat_amount(&self) -> Option<i64> {
        None
    }

    fn withheld_amount(&self) -> i64 {
        self.withheld.unwrap_or(0)
    }

    fn text_fields(&self) -> [String; 5] {
        [
            text(&self.number),
            text(&self.date),
            text(&self.tax_id),
            text(&self.name),
            text(&self.description),
        ]
    }

    fn amounts(&self) -> Vec<i64> {
        vec![
            self.net_amount(),
            self.withheld_amount(),
            self.net_paid.unwrap_or(0),
        ]
    }
}

/// A payroll slip.  `income_tax` is the second-category single tax
/// (impuesto único) withheld from the employee.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PayrollSlipRecord {
    #[serde(alias = "numero", deserialize_with = "identifier")]
    pub number: Option<String>,
    #[serde(alias = "fecha")]
    pub date: Option<String>,
    #[serde(alias = "rut")]
    pub tax_id: Option<String>,
    #[serde(alias = "nombre")]
    pub name: Option<String>,
    #[serde(alias = "cargo")]
    pub position: Option<String>,
    #[serde(alias = "bruto")]
    pub gross: Option<i64>,
    #[serde(alias = "iusc")]
    pub income_tax: Option<i64>,
    #[serde(alias = "liquido")]
    pub net_paid: Option<i64>,
}

impl FieldMapping for PayrollSlipRecord {
    fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        require(&mut missing, self.number.is_some(), "number");
        require(&mut missing, self.gross.is_some(), "gross");
        require(&mut missing, self.income_tax.is_some(), "income_tax");
        missing
    }

    fn net_amount(&self) -> i64 {
        self.gross.unwrap_or(0)
    }

    fn vat_amount(&self) -> Option<i64> {
        None
    }

    fn withheld_amount(&self) -> i64 {
        self.income_tax.unwrap_or(0)
    }

    fn text_fields(&self) -> [String; 5] {
        [
            text(&self.number),
            text(&self.date),
            text(&self.tax_id),
            text(&self.name),
            text(&self.position),
        ]
    }

    fn amounts(&self) -> Vec<i64> {
        vec![
            self.net_amount(),
            self.withheld_amount(),
            self.net_paid.unwrap_or(0),
        ]
    }
}

/// A parsed document, tagged by kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum DocumentRecord {
    Sale(SaleRecord),
    Purchase(PurchaseRecord),
    FeeReceipt(FeeReceiptRecord),
    PayrollSlip(PayrollSlipRecord),
}

impl DocumentRecord {
    /// Parse a raw record as the given kind.  The error string says
    /// why the record was rejected.
    pub fn parse(kind: DocumentKind, raw: &Value) -> std::result::Result<Self, String> {
        if !raw.is_object() {
            return Err("record is not an object".to_string());
        }
        let record = match kind {
            DocumentKind::Sale => serde_json::from_value(raw.clone()).map(DocumentRecord::Sale),
            DocumentKind::Purchase => {
                serde_json::from_value(raw.clone()).map(DocumentRecord::Purchase)
            }
            DocumentKind::FeeReceipt => {
                serde_json::from_value(raw.clone()).map(DocumentRecord::FeeReceipt)
            }
            DocumentKind::PayrollSlip => {
                serde_json::from_value(raw.clone()).map(DocumentRecord::PayrollSlip)
            }
        };
        record.map_err(|err| err.to_string())
    }

    pub fn kind(&self) -> DocumentKind {
        match self {
            DocumentRecord::Sale(_) => DocumentKind::Sale,
            DocumentRecord::Purchase(_) => DocumentKind::Purchase,
            DocumentRecord::FeeReceipt(_) => DocumentKind::FeeReceipt,
            DocumentRecord::PayrollSlip(_) => DocumentKind::PayrollSlip,
        }
    }

    fn mapping(&self) -> &dyn FieldMapping {
        match self {
            DocumentRecord::Sale(r) => r,
            DocumentRecord::Purchase(r) => r,
            DocumentRecord::FeeReceipt(r) => r,
            DocumentRecord::PayrollSlip(r) => r,
        }
    }
}

impl FieldMapping for DocumentRecord {
    fn missing_fields(&self) -> Vec<&'static str> {
        self.mapping().missing_fields()
    }

    fn net_amount(&self) -> i64 {
        self.mapping().net_amount()
    }

    fn vat_amount(&self) -> Option<i64> {
        self.mapping().vat_amount()
    }

    fn withheld_amount(&self) -> i64 {
        self.mapping().withheld_amount()
    }

    fn text_fields(&self) -> [String; 5] {
        self.mapping().text_fields()
    }

    fn amounts(&self) -> Vec<i64> {
        self.mapping().amounts()
    }
}

/// Parsed documents of every itemized line, keyed by canonical line
/// key (`line_7`).  Lines with an empty list are not stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ItemizedDocuments {
    lines: BTreeMap<&'static str, Vec<DocumentRecord>>,
}

impl ItemizedDocuments {
    /// Records of a line, empty when the line has none.
    pub fn records(&self, key: &str) -> &[DocumentRecord] {
        self.lines.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Lines with documents, in form order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static LineSource, &[DocumentRecord])> + '_ {
        form::itemized_sources().filter_map(move |source| {
            let key = source.itemization.as_ref()?.key;
            self.lines
                .get(key)
                .map(|records| (source, records.as_slice()))
        })
    }
}

/// Parse the raw `documents` section of an input document.
///
/// A list entry that is not a record, a record with a field of the
/// wrong type, or (in strict mode) an unknown line key or a record
/// missing a required field fails the whole parse.  In lenient mode
/// unknown lines are skipped and missing fields read as zero.
pub fn parse_documents(
    raw: &BTreeMap<String, Vec<Value>>,
    strictness: Strictness,
) -> Result<ItemizedDocuments> {
    let mut lines: BTreeMap<&'static str, Vec<DocumentRecord>> = BTreeMap::new();
    for (key, entries) in raw {
        let Some(itemization) = form::itemized_source(key).and_then(|s| s.itemization.as_ref())
        else {
            if strictness == Strictness::Strict {
                return Err(ResolveError::invalid(key, None, "unknown line key"));
            }
            tracing::warn!(line = %key, "ignoring documents for unknown line");
            continue;
        };
        for (index, entry) in entries.iter().enumerate() {
            let record = DocumentRecord::parse(itemization.kind, entry)
                .map_err(|reason| ResolveError::invalid(key, Some(index), reason))?;
            if strictness == Strictness::Strict {
                let missing = record.missing_fields();
                if !missing.is_empty() {
                    return Err(ResolveError::invalid(
                        key,
                        Some(index),
                        format!("missing required field(s): {}", missing.join(", ")),
                    ));
                }
            }
            lines.entry(itemization.key).or_default().push(record);
        }
    }
    Ok(ItemizedDocuments { lines })
}
