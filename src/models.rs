//! Data models for the F29 engine.
//!
//! The `models` module defines the serialisable input document handed
//! to the engine and the [`CodeMap`] it produces.  Field names on the
//! wire are kebab-case; snake_case spellings and the Spanish names used
//! by older callers (`codigos`, `ventas`, `compras`, ...) are accepted
//! as aliases.  Every section is optional and an absent section reads
//! as zeros.

use crate::form::{self, Section};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Identity and period of the declaration.  Immutable for a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Header {
    /// Taxpayer RUT, e.g. `"78.033.706-0"`.
    #[serde(alias = "taxpayer_id", alias = "rut")]
    pub taxpayer_id: String,
    /// Registered legal name (razón social).
    #[serde(alias = "legal_name", alias = "razon_social")]
    pub legal_name: String,
    /// Month of the tax period, 1 to 12.
    #[serde(alias = "period_month", alias = "periodo_mes")]
    pub period_month: u32,
    /// Year of the tax period.
    #[serde(alias = "period_year", alias = "periodo_anio")]
    pub period_year: i32,
    /// Filing folio, when the declaration has already been submitted.
    pub folio: String,
}

impl Default for Header {
    fn default() -> Self {
        Self {
            taxpayer_id: String::new(),
            legal_name: String::new(),
            period_month: 1,
            period_year: 2026,
            folio: String::new(),
        }
    }
}

/// A section of named aggregate totals, e.g. `sales` or `purchases`.
///
/// Aggregates are only consulted for a line when that line has no
/// itemized documents.  The field names each line reads are fixed by
/// [`crate::form::LINE_SOURCES`], with the Spanish spellings listed in
/// [`crate::form::FIELD_ALIASES`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Aggregates(pub BTreeMap<String, i64>);

impl Aggregates {
    /// The value of `field`, if the caller supplied it.
    pub fn get(&self, field: &str) -> Option<i64> {
        self.0.get(field).copied()
    }

    /// The value of `field` of `section` under its first supplied name.
    pub fn field(&self, section: Section, field: &'static str) -> Option<i64> {
        form::field_names(section, field).find_map(|name| self.get(name))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

/// Parameters of the provisional monthly payment (PPM).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct PpmInput {
    /// Rate as a percentage, e.g. `0.25` for 0.25%.  When absent the
    /// rules' default rate applies.
    #[serde(alias = "tasa")]
    pub rate: Option<Decimal>,
    /// Explicit taxable base.  When absent the base is derived from the
    /// net amounts of the sales lines.
    #[serde(alias = "base_imponible")]
    pub base: Option<i64>,
    /// Suspension of PPM for the period; forces the PPM amount to zero.
    pub suspension: bool,
    /// Training (SENCE) credit earned this period.
    #[serde(alias = "training_credit", alias = "credito_sence")]
    pub training_credit: i64,
    /// Training credit carried from the previous period, as older
    /// callers place it.
    #[serde(rename = "remanente_sence_anterior", skip_serializing_if = "Option::is_none")]
    pub prior_training_credit: Option<i64>,
}

/// Reverse-withholding amounts declared as retaining agent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SubjectChangeInput {
    #[serde(alias = "total_retained", alias = "iva_retenido_total")]
    pub total_retained: Option<i64>,
    #[serde(alias = "partial_retained", alias = "iva_parcial_retenido")]
    pub partial_retained: i64,
    #[serde(alias = "credit_note_retained", alias = "iva_retenido_nc")]
    pub credit_note_retained: i64,
    #[serde(alias = "margin_retention", alias = "retencion_margen")]
    pub margin_retention: i64,
    /// Net retention.  Derived from the other four when not supplied.
    #[serde(alias = "net_retention", alias = "retencion_neta")]
    pub net_retention: Option<i64>,
}

/// Values carried over from the previous period's declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CarryOver {
    /// Fiscal credit remainder (code 77 of the previous declaration).
    #[serde(alias = "vat_credit", alias = "remanente_anterior")]
    pub vat_credit: i64,
    /// Unused training credit from the previous period.
    #[serde(alias = "training_credit", alias = "remanente_sence_anterior")]
    pub training_credit: i64,
}

/// Late-payment surcharges added on top of the amount due.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Surcharges {
    #[serde(alias = "inflation_adjustment", alias = "ipc")]
    pub inflation_adjustment: i64,
    #[serde(alias = "interest_and_penalties", alias = "intereses_multas")]
    pub interest_and_penalties: i64,
}

/// A caller-supplied advisory note.  Either a plain message or a
/// `[kind, message]` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Note {
    Tagged(String, String),
    Plain(String),
}

/// Input to the resolution engine.
///
/// When `codes` is present the engine runs in direct mode and only
/// backfills missing codes; otherwise every code is derived from the
/// aggregate sections and the itemized `documents`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct InputDocument {
    #[serde(alias = "encabezado")]
    pub header: Header,
    /// Pre-computed codes.  Selects direct mode.
    #[serde(alias = "codigos", skip_serializing_if = "Option::is_none")]
    pub codes: Option<CodeMap>,
    #[serde(alias = "ventas")]
    pub sales: Aggregates,
    #[serde(alias = "compras")]
    pub purchases: Aggregates,
    #[serde(alias = "retenciones")]
    pub withholdings: Aggregates,
    pub ppm: PpmInput,
    #[serde(alias = "devoluciones")]
    pub refunds: Aggregates,
    #[serde(alias = "subject_change", alias = "cambio_sujeto")]
    pub subject_change: SubjectChangeInput,
    #[serde(alias = "prior_period_carry_over")]
    pub prior_period_carry_over: CarryOver,
    pub surcharges: Surcharges,
    /// Fiscal credit remainder given at the top level, as older callers
    /// place it.
    #[serde(rename = "remanente_anterior", skip_serializing_if = "Option::is_none")]
    pub prior_vat_credit: Option<i64>,
    /// Raw document records keyed by line (`line_7`, `linea_28`, ...).
    /// Records are interpreted per line by [`crate::documents`].
    #[serde(alias = "documentos")]
    pub documents: BTreeMap<String, Vec<serde_json::Value>>,
    #[serde(alias = "notas")]
    pub notes: Vec<Note>,
}

impl InputDocument {
    /// The aggregate section named by `section`.
    pub fn aggregates(&self, section: Section) -> &Aggregates {
        match section {
            Section::Sales => &self.sales,
            Section::Purchases => &self.purchases,
            Section::Withholdings => &self.withholdings,
            Section::Refunds => &self.refunds,
        }
    }

    /// Fiscal credit carried from the previous period.  The carry-over
    /// section wins over the top-level field when it is non-zero.
    pub fn carried_vat_credit(&self) -> i64 {
        match self.prior_period_carry_over.vat_credit {
            0 => self.prior_vat_credit.unwrap_or(0),
            credit => credit,
        }
    }

    /// Training credit carried from the previous period.  The carry-over
    /// section wins over the PPM field when it is non-zero.
    pub fn carried_training_credit(&self) -> i64 {
        match self.prior_period_carry_over.training_credit {
            0 => self.ppm.prior_training_credit.unwrap_or(0),
            credit => credit,
        }
    }
}

/// The value stored under one code: a whole-peso amount or, for the
/// PPM rate, a small decimal percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CodeValue {
    Amount(i64),
    Rate(Decimal),
}

impl CodeValue {
    /// Integer view of the value.  Rates truncate toward zero.
    pub fn as_amount(&self) -> i64 {
        match self {
            CodeValue::Amount(v) => *v,
            CodeValue::Rate(r) => r.trunc().to_i64().unwrap_or(0),
        }
    }

    pub fn is_zero(&self) -> bool {
        match self {
            CodeValue::Amount(v) => *v == 0,
            CodeValue::Rate(r) => r.is_zero(),
        }
    }
}

impl From<i64> for CodeValue {
    fn from(v: i64) -> Self {
        CodeValue::Amount(v)
    }
}

/// Mapping from form code to value, ordered by code.
///
/// Reading a code that was never written yields zero, so folds over
/// the form tables never fail on a missing key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CodeMap(BTreeMap<u16, CodeValue>);

impl CodeMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, code: u16) -> Option<&CodeValue> {
        self.0.get(&code)
    }

    /// Integer value of `code`, zero when absent.
    pub fn amount(&self, code: u16) -> i64 {
        self.0.get(&code).map(CodeValue::as_amount).unwrap_or(0)
    }

    pub fn contains(&self, code: u16) -> bool {
        self.0.contains_key(&code)
    }

    pub fn set(&mut self, code: u16, value: i64) {
        self.0.insert(code, CodeValue::Amount(value));
    }

    pub fn set_rate(&mut self, code: u16, rate: Decimal) {
        self.0.insert(code, CodeValue::Rate(rate));
    }

    /// Insert a zero for `code` unless a value is already present.
    pub fn ensure(&mut self, code: u16) {
        self.0.entry(code).or_insert(CodeValue::Amount(0));
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(u16, i64)> for CodeMap {
    fn from_iter<I: IntoIterator<Item = (u16, i64)>>(iter: I) -> Self {
        CodeMap(
            iter.into_iter()
                .map(|(k, v)| (k, CodeValue::Amount(v)))
                .collect(),
        )
    }
}
