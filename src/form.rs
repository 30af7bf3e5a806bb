//! Fixed line tables of Formulario 29.
//!
//! Two kinds of static data live here.  [`LineDef`] tables reproduce
//! the printed rows of the form, with the "+/-" column that drives the
//! total-debit and total-credit folds.  [`LINE_SOURCES`] says where the
//! value of each resolvable line comes from: itemized documents of a
//! given kind, or a named aggregate field.  A change in the form is a
//! change to these tables only.

use crate::documents::DocumentKind;
use serde::Serialize;

/// Form code numbers the engine writes or reads by name.
pub mod code {
    pub const TOTAL_DEBITS: u16 = 538;
    pub const TOTAL_CREDITS: u16 = 537;
    pub const RECEIVED_WITH_RIGHT_COUNT: u16 = 511;
    pub const RECEIVED_WITH_RIGHT_VAT: u16 = 514;
    pub const PRIOR_CREDIT: u16 = 504;
    pub const TAX_PAYABLE: u16 = 89;
    pub const CREDIT_CARRIED_FORWARD: u16 = 77;
    pub const PPM_RATE: u16 = 115;
    pub const PPM_BASE: u16 = 563;
    pub const PPM_AMOUNT: u16 = 62;
    pub const PPM_SUSPENDED: u16 = 750;
    pub const PPM_SECOND_CATEGORY: u16 = 30;
    pub const PPM_LOSS_OFFSET: u16 = 68;
    pub const TRAINING_CREDIT: u16 = 721;
    pub const TRAINING_CREDIT_PRIOR: u16 = 722;
    pub const TRAINING_CREDIT_APPLIED: u16 = 723;
    pub const TRAINING_CREDIT_REMAINDER: u16 = 724;
    pub const SUBTOTAL: u16 = 595;
    pub const SC_TOTAL_RETAINED: u16 = 39;
    pub const SC_PARTIAL_RETAINED: u16 = 554;
    pub const SC_CREDIT_NOTE_RETAINED: u16 = 736;
    pub const SC_MARGIN_RETENTION: u16 = 597;
    pub const SC_NET_RETENTION: u16 = 596;
    pub const TOTAL_DETERMINED: u16 = 547;
    pub const PAYABLE_IN_TERM: u16 = 91;
    pub const INFLATION_ADJUSTMENT: u16 = 92;
    pub const INTEREST_AND_PENALTIES: u16 = 93;
    pub const PAYABLE_WITH_SURCHARGE: u16 = 94;
    pub const EXPORT_COUNT: u16 = 585;
    pub const EXEMPT_COUNT: u16 = 586;
    pub const TAXABLE_INVOICE_COUNT: u16 = 503;
    pub const RECEIPT_COUNT: u16 = 110;
    pub const EXPORT_NET: u16 = 20;
    pub const FEE_WITHHOLDING: u16 = 151;
}

/// Codes that exist in every resolved map, including direct mode.
pub const MUST_EXIST: [u16; 8] = [
    code::TOTAL_DEBITS,
    code::TOTAL_CREDITS,
    code::TAX_PAYABLE,
    code::CREDIT_CARRIED_FORWARD,
    code::SUBTOTAL,
    code::TOTAL_DETERMINED,
    code::PAYABLE_IN_TERM,
    code::PPM_AMOUNT,
];

/// Codes written by the engine that no printed row shows directly.
pub const AUXILIARY_CODES: [u16; 9] = [
    code::PPM_RATE,
    code::PPM_BASE,
    code::PPM_SUSPENDED,
    code::PPM_SECOND_CATEGORY,
    code::PPM_LOSS_OFFSET,
    code::TRAINING_CREDIT,
    code::TRAINING_CREDIT_PRIOR,
    code::TRAINING_CREDIT_REMAINDER,
    code::PRIOR_CREDIT,
];

/// The "+/-" column of a printed row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Operator {
    /// Informational row, excluded from folds.
    None,
    Add,
    Subtract,
    /// A total row.
    Total,
}

impl Operator {
    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::None => "",
            Operator::Add => "+",
            Operator::Subtract => "-",
            Operator::Total => "=",
        }
    }

    /// Signed contribution of `value` to a fold.  `None` only when
    /// `value` cannot be negated.
    pub fn signed(&self, value: i64) -> Option<i64> {
        match self {
            Operator::Add => Some(value),
            Operator::Subtract => value.checked_neg(),
            Operator::None | Operator::Total => Some(0),
        }
    }
}

/// One printed row of the form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LineDef {
    pub number: &'static str,
    pub description: &'static str,
    pub quantity_code: Option<u16>,
    pub amount_code: u16,
    pub operator: Operator,
}

const fn row(
    number: &'static str,
    description: &'static str,
    quantity_code: Option<u16>,
    amount_code: u16,
    operator: Operator,
) -> LineDef {
    LineDef {
        number,
        description,
        quantity_code,
        amount_code,
        operator,
    }
}

use Operator::{Add, None as Info, Subtract, Total};

#[rustfmt::skip]
pub const DEBITS_INFO: &[LineDef] = &[
    row("1", "Exportaciones", Some(585), 20, Info),
    row("2", "Ventas y/o Servicios prestados Exentos o No Gravados del giro", Some(586), 142, Info),
    row("3", "Ventas con retención sobre el margen de comercialización (contribuyentes retenidos)", Some(731), 732, Info),
    row("4", "Ventas y/o Servicios prestados Exentos o No Gravados que no son del giro", Some(714), 715, Info),
    row("5", "Facturas de Compra recibidas con retención total (contribuyentes retenidos) y Factura de Inicio emitida", Some(515), 587, Info),
    row("6", "Facturas de compra recibidas con retención parcial (Total neto)", None, 720, Info),
];

#[rustfmt::skip]
pub const DEBITS_GENERATING: &[LineDef] = &[
    row("7", "Facturas emitidas por ventas y servicios del giro", Some(503), 502, Add),
    row("8", "Facturas emitidas por la venta de bienes inmuebles afectas a IVA", Some(763), 764, Add),
    row("9", "Facturas y Notas de Débitos por ventas y servicios que no son del giro (activo fijo y otros)", Some(716), 717, Add),
    row("10", "Boletas", Some(110), 111, Add),
    row("11", "Comprobantes o Recibos de Pago (transacciones medios electrónicos)", Some(758), 759, Add),
    row("12", "Notas de débito emitidas del giro y ND recibidas por retención parcial cambio de sujeto", Some(512), 513, Add),
    row("13", "Notas de Crédito emitidas por Facturas del giro y NC recibidas por retención parcial cambio de sujeto", Some(509), 510, Subtract),
    row("14", "NC emitidas por Vales de máquinas autorizadas por el Servicio", Some(708), 709, Subtract),
    row("15", "NC emitidas por ventas y servicios que no son del giro (activo fijo y otros)", Some(733), 734, Subtract),
    row("16", "FC recibidas con retención parcial (contribuyentes retenidos)", Some(516), 517, Add),
    row("17", "Liquidación y Liquidación Factura", Some(500), 501, Add),
    row("18", "Adiciones al Débito Fiscal del mes, Art. 27 bis", None, 154, Add),
    row("19", "Restitución Adicional Art. 27 bis, inc. 2° (Ley N° 19.738)", None, 518, Add),
    row("20", "Reintegro Impuesto Timbres y Estampillas, Art 3° Ley N° 20.259", None, 713, Add),
    row("21", "Adiciones al Débito por IEPD Ley 20.765", None, 741, Add),
    row("22", "Restitución Adicional Reembolso Remanente CF IVA (Ley 21.256)", None, 791, Add),
    row("23", "TOTAL DÉBITOS", None, 538, Total),
];

pub const RECEIVED_DOCUMENTS: &[LineDef] = &[row(
    "24",
    "IVA por documentos electrónicos recibidos",
    Some(511),
    514,
    Info,
)];

#[rustfmt::skip]
pub const CREDITS_WITHOUT_RIGHT: &[LineDef] = &[
    row("25", "Internas Afectas", Some(564), 521, Info),
    row("26", "Importaciones", Some(566), 560, Info),
    row("27", "Internas exentas, o no gravadas", Some(584), 562, Info),
];

#[rustfmt::skip]
pub const CREDITS_WITH_RIGHT: &[LineDef] = &[
    row("28", "Facturas recibidas del giro y Facturas de compras emitidas", Some(519), 520, Add),
    row("29", "Facturas recibidas de Proveedores: Supermercados y Comercios similares (Ley Nº20.780)", Some(761), 762, Add),
    row("30", "Facturas recibidas por Adquisición o Construcción de Bienes Inmuebles (Ley Nº20.780)", Some(765), 766, Add),
    row("31", "Facturas activo fijo", Some(524), 525, Add),
    row("32", "Notas de Crédito recibidas y NC emitidas por retención de cambio de sujeto", Some(527), 528, Subtract),
    row("33", "Notas de Débito recibidas y ND emitidas por retención de cambio de sujeto", Some(531), 532, Add),
];

#[rustfmt::skip]
pub const CREDITS_IMPORTS: &[LineDef] = &[
    row("34", "Declaraciones de Ingreso (DIN) importaciones del giro", Some(534), 535, Add),
    row("35", "Declaraciones de Ingreso (DIN) importaciones activo fijo", Some(536), 553, Add),
];

#[rustfmt::skip]
pub const CREDITS_CARRY_OVER: &[LineDef] = &[
    row("36", "Remanente Crédito Fiscal mes anterior", None, 504, Add),
    row("37", "Devolución Solicitud Art.36 (Exportadores)", None, 593, Subtract),
    row("38", "Devolución Solicitud Art.27 bis (Activo fijo)", None, 594, Subtract),
    row("39", "Certificado Imputación Art.27 bis (Activo fijo)", None, 592, Subtract),
    row("40", "Devolución Solicitud Art.3 (Cambio de sujeto)", None, 539, Subtract),
    row("41", "Devolución Solicitud Ley Nº 20.258 (Generadoras Eléctricas)", None, 718, Subtract),
    row("42", "Devolución Solicitud Reembolso Remanente de Crédito Fiscal IVA", None, 790, Subtract),
    row("43", "Monto Reintegrado por Devolución Indebida de Crédito Fiscal D.S. 348 (Exportadores)", None, 164, Add),
];

#[rustfmt::skip]
pub const CREDITS_OTHER: &[LineDef] = &[
    row("46", "Crédito del Art.11 Ley 18.211 (Zona Franca de Extensión)", None, 523, Add),
    row("47", "Crédito por Impuesto de Timbres y Estampillas, Art. 3º Ley Nº 20.259", None, 712, Add),
    row("48", "Crédito por IVA restituido a aportantes sin domicilio ni residencia en Chile", None, 757, Add),
    row("49", "TOTAL CRÉDITOS", None, 537, Total),
];

pub const DETERMINATION: &[LineDef] = &[
    row("50", "Remanente de crédito fiscal para el período siguiente", None, 77, Info),
    row("50", "IVA determinado", None, 89, Add),
];

#[rustfmt::skip]
pub const WITHHOLDINGS: &[LineDef] = &[
    row("59", "Retención Impuesto 1ra Categoría Art. 20 Nº2, según Art. 73 LIR", None, 50, Add),
    row("60", "Retención Impuesto Único a los Trabajadores, según Art. 74 Nº1 LIR", None, 48, Add),
    row("61", "Retención de Impuesto tasa 10% rentas Art. 42 Nº2, según Art. 74 Nº2 LIR", None, 151, Add),
    row("62", "Retención de Impuesto tasa 10% rentas Art. 48, según Art. 74 Nº3 LIR", None, 153, Add),
    row("63", "Retención 3% Art. 42 Nº1 (préstamo tasa 0%)", None, 49, Add),
    row("64", "Retención 3% Art. 42 Nº2 (préstamo tasa 0%)", None, 155, Add),
    row("65", "Retención a Suplementeros (tasa 0,5%)", None, 54, Add),
    row("66", "Retención por compra de productos mineros", None, 56, Add),
    row("67", "Retención seguros dotales (tasa 15%)", None, 588, Add),
    row("68", "Retención APV retiros (tasa 15%)", None, 589, Add),
];

pub const PPM: &[LineDef] = &[
    row("69", "1ra Categoría Art. 84 a)", None, 62, Add),
    row("75", "Crédito Capacitación a Imputar", None, 723, Subtract),
    row("80", "SUB TOTAL IMPUESTO DETERMINADO ANVERSO (Suma líneas 49 a 64)", None, 595, Total),
];

#[rustfmt::skip]
pub const SUBJECT_CHANGE_AGENT: &[LineDef] = &[
    row("118", "IVA total retenido a terceros (tasa Art.14 D.L. 825/74)", None, 39, Add),
    row("119", "IVA parcial retenido a terceros (según tasa)", None, 554, Add),
    row("120", "IVA Retenido por notas de crédito emitidas", None, 736, Subtract),
    row("121", "Retención del margen de comercialización", None, 597, Add),
    row("122", "Retención Anticipo de Cambio de Sujeto / Retención Cambio de Sujeto", None, 596, Add),
];

pub const TOTAL_DETERMINED: &[LineDef] = &[row("140", "Total Determinado", None, 547, Total)];

pub const FINAL_TOTALS: &[LineDef] = &[
    row("147", "TOTAL A PAGAR DENTRO DEL PLAZO LEGAL", None, 91, Total),
    row("148", "Más IPC", None, 92, Add),
    row("149", "Más Intereses y multas", None, 93, Add),
    row("150", "TOTAL A PAGAR CON RECARGO", None, 94, Total),
];

/// Tables folded into total debits (538).
pub const DEBIT_FOLD: &[&[LineDef]] = &[DEBITS_GENERATING];

/// Tables folded into total credits (537).
pub const CREDIT_FOLD: &[&[LineDef]] = &[
    CREDITS_WITH_RIGHT,
    CREDITS_IMPORTS,
    CREDITS_CARRY_OVER,
    CREDITS_OTHER,
];

/// A titled group of rows as it appears on the printed form.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct FormSection {
    /// Main heading opening a new part of the form, if any.
    pub part: Option<&'static str>,
    pub title: &'static str,
    pub quantity_label: &'static str,
    pub amount_label: &'static str,
    pub lines: &'static [LineDef],
}

const fn section(
    part: Option<&'static str>,
    title: &'static str,
    quantity_label: &'static str,
    amount_label: &'static str,
    lines: &'static [LineDef],
) -> FormSection {
    FormSection {
        part,
        title,
        quantity_label,
        amount_label,
        lines,
    }
}

const QTY: &str = "Cantidad de documentos";

/// The whole form, in printed order.
#[rustfmt::skip]
pub const FORM: &[FormSection] = &[
    section(Some("DÉBITOS y VENTAS"), "INFORMACIÓN DE INGRESOS", QTY, "Monto Neto", DEBITS_INFO),
    section(None, "Genera Débito", QTY, "Débitos", DEBITS_GENERATING),
    section(Some("CRÉDITOS Y COMPRAS"), "COMPRAS Y/O SERVICIOS UTILIZADOS", "Con derecho a Crédito", "Sin derecho a Crédito", RECEIVED_DOCUMENTS),
    section(None, "SIN DERECHO A CRÉDITO FISCAL", QTY, "Monto Neto", CREDITS_WITHOUT_RIGHT),
    section(None, "CON DERECHO A CRÉDITO FISCAL — INTERNAS", QTY, "Crédito, Recuperación y Reintegro", CREDITS_WITH_RIGHT),
    section(None, "IMPORTACIONES", QTY, "Crédito, Recuperación y Reintegro", CREDITS_IMPORTS),
    section(None, "REMANENTE Y DEVOLUCIONES", "", "Monto", CREDITS_CARRY_OVER),
    section(None, "OTROS CRÉDITOS", "", "Monto", CREDITS_OTHER),
    section(None, "POSTERGACIÓN DE IVA (Ley 20.780) — IMPUESTO DETERMINADO", "", "Monto", DETERMINATION),
    section(Some("IMPUESTO A LA RENTA D.L. 824/74"), "RETENCIONES", "", "Monto", WITHHOLDINGS),
    section(None, "PPM", "", "Monto", PPM),
    section(Some("CAMBIO DE SUJETO D.L. 825"), "CAMBIO DE SUJETO (AGENTE RETENEDOR)", "", "Monto", SUBJECT_CHANGE_AGENT),
    section(None, "TOTAL DETERMINADO", "", "Monto", TOTAL_DETERMINED),
    section(None, "TOTAL A PAGAR", "", "Monto", FINAL_TOTALS),
];

/// Every code referenced by the printed form or written by the engine.
pub fn referenced_codes() -> impl Iterator<Item = u16> {
    FORM.iter()
        .flat_map(|s| s.lines.iter())
        .flat_map(|l| l.quantity_code.into_iter().chain(std::iter::once(l.amount_code)))
        .chain(AUXILIARY_CODES)
}

// ---------------------------------------------------------------------------
// Line sources
// ---------------------------------------------------------------------------

/// Input section an aggregate field is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Section {
    Sales,
    Purchases,
    Withholdings,
    Refunds,
}

impl Section {
    pub const ALL: [Section; 4] = [
        Section::Sales,
        Section::Purchases,
        Section::Withholdings,
        Section::Refunds,
    ];

    /// Name of the section in the input document.
    pub fn name(&self) -> &'static str {
        match self {
            Section::Sales => "sales",
            Section::Purchases => "purchases",
            Section::Withholdings => "withholdings",
            Section::Refunds => "refunds",
        }
    }
}

/// Which document amount a line totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AmountBasis {
    /// VAT, with net × rate when no VAT figure is available.
    Vat,
    /// Taxable base of the documents.
    Net,
    /// Tax withheld.
    Withheld,
    /// No documents; the aggregate field is the amount.
    Direct,
}

/// Aggregate fields a line falls back to when it has no documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Fallback {
    pub section: Section,
    pub count: Option<&'static str>,
    /// Field holding the amount in the line's basis.
    pub amount: Option<&'static str>,
    /// Net field of a VAT line.
    pub net: Option<&'static str>,
    /// Section consulted when `section` lacks the field.
    pub also: Option<Section>,
}

impl Fallback {
    /// Sections holding the fallback fields, in lookup order.
    pub fn sections(&self) -> impl Iterator<Item = Section> {
        std::iter::once(self.section).chain(self.also)
    }

    fn fields(&self) -> impl Iterator<Item = &'static str> {
        self.count.into_iter().chain(self.amount).chain(self.net)
    }
}

/// How a line accepts itemized documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Itemization {
    /// Canonical key in the `documents` section.
    pub key: &'static str,
    /// Short name used in the detail listing.
    pub name: &'static str,
    pub kind: DocumentKind,
}

/// Where the value of one line comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LineSource {
    pub line: &'static str,
    pub itemization: Option<Itemization>,
    pub quantity_code: Option<u16>,
    pub amount_code: u16,
    pub basis: AmountBasis,
    pub fallback: Fallback,
}

impl LineSource {
    /// Aggregate field holding the line's net amount, used by the PPM
    /// base.
    pub fn net_field(&self) -> Option<&'static str> {
        match self.basis {
            AmountBasis::Vat => self.fallback.net,
            AmountBasis::Net => self.fallback.amount,
            AmountBasis::Withheld | AmountBasis::Direct => None,
        }
    }
}

const fn itemized(
    line: &'static str,
    key: &'static str,
    name: &'static str,
    kind: DocumentKind,
    codes: (Option<u16>, u16),
    basis: AmountBasis,
    fallback: Fallback,
) -> LineSource {
    LineSource {
        line,
        itemization: Some(Itemization { key, name, kind }),
        quantity_code: codes.0,
        amount_code: codes.1,
        basis,
        fallback,
    }
}

const fn aggregate(
    line: &'static str,
    codes: (Option<u16>, u16),
    basis: AmountBasis,
    fallback: Fallback,
) -> LineSource {
    LineSource {
        line,
        itemization: None,
        quantity_code: codes.0,
        amount_code: codes.1,
        basis,
        fallback,
    }
}

const fn vat(section: Section, count: &'static str, vat: &'static str, net: &'static str) -> Fallback {
    Fallback {
        section,
        count: Some(count),
        amount: Some(vat),
        net: Some(net),
        also: None,
    }
}

const fn net(section: Section, count: Option<&'static str>, net: &'static str) -> Fallback {
    Fallback {
        section,
        count,
        amount: Some(net),
        net: None,
        also: None,
    }
}

const fn direct(section: Section, field: &'static str) -> Fallback {
    Fallback {
        section,
        count: None,
        amount: Some(field),
        net: None,
        also: None,
    }
}

/// A fallback that also reads its fields from `purchases`.
const fn or_purchases(fallback: Fallback) -> Fallback {
    Fallback {
        also: Some(Section::Purchases),
        ..fallback
    }
}

use AmountBasis::{Direct, Net, Vat, Withheld};
use DocumentKind::{FeeReceipt, PayrollSlip, Purchase, Sale};
use Section::{Purchases, Refunds, Sales, Withholdings};

/// Resolution table, in form order.
#[rustfmt::skip]
pub const LINE_SOURCES: &[LineSource] = &[
    // Sales, informational.
    itemized("1", "line_1", "Facturas de Exportación", Sale, (Some(585), 20), Net, net(Sales, Some("export_invoices_count"), "export_invoices_net")),
    itemized("2", "line_2", "Ventas/Servicios Exentos del Giro", Sale, (Some(586), 142), Net, net(Sales, Some("exempt_sales_count"), "exempt_sales_net")),
    aggregate("3", (Some(731), 732), Net, net(Sales, Some("margin_retained_sales_count"), "margin_retained_sales_net")),
    aggregate("4", (Some(714), 715), Net, net(Sales, Some("non_business_exempt_sales_count"), "non_business_exempt_sales_net")),
    itemized("5", "line_5", "Facturas de Compra (Serv. Digitales Extranjeros)", Purchase, (Some(515), 587), Net, or_purchases(net(Sales, Some("purchase_invoices_issued_count"), "purchase_invoices_issued_net"))),
    aggregate("6", (None, 720), Net, net(Sales, None, "partial_retention_purchase_invoices_net")),
    // Sales, generating debit.
    itemized("7", "line_7", "Facturas Afectas del Giro", Sale, (Some(503), 502), Vat, vat(Sales, "taxable_invoices_count", "taxable_invoices_vat", "taxable_invoices_net")),
    aggregate("8", (Some(763), 764), Vat, vat(Sales, "real_estate_invoices_count", "real_estate_invoices_vat", "real_estate_invoices_net")),
    itemized("9", "line_9", "Ventas Activo Fijo (No del Giro)", Sale, (Some(716), 717), Vat, vat(Sales, "fixed_asset_sales_count", "fixed_asset_sales_vat", "fixed_asset_sales_net")),
    itemized("10", "line_10", "Boletas", Sale, (Some(110), 111), Vat, vat(Sales, "receipts_count", "receipts_vat", "receipts_net")),
    itemized("11", "line_11", "Boletas Electrónicas / POS", Sale, (Some(758), 759), Vat, vat(Sales, "payment_vouchers_count", "payment_vouchers_vat", "payment_vouchers_net")),
    itemized("12", "line_12", "Notas de Débito Emitidas", Sale, (Some(512), 513), Vat, vat(Sales, "debit_notes_count", "debit_notes_vat", "debit_notes_net")),
    itemized("13", "line_13", "Notas de Crédito Emitidas", Sale, (Some(509), 510), Vat, vat(Sales, "credit_notes_count", "credit_notes_vat", "credit_notes_net")),
    aggregate("14", (Some(708), 709), Vat, vat(Sales, "machine_voucher_credit_notes_count", "machine_voucher_credit_notes_vat", "machine_voucher_credit_notes_net")),
    aggregate("15", (Some(733), 734), Vat, vat(Sales, "non_business_credit_notes_count", "non_business_credit_notes_vat", "non_business_credit_notes_net")),
    aggregate("16", (Some(516), 517), Vat, vat(Sales, "partial_retention_invoices_count", "partial_retention_invoices_vat", "partial_retention_invoices_net")),
    aggregate("17", (Some(500), 501), Vat, vat(Sales, "settlements_count", "settlements_vat", "settlements_net")),
    aggregate("18", (None, 154), Direct, direct(Sales, "debit_additions_art_27_bis")),
    aggregate("19", (None, 518), Direct, direct(Sales, "additional_restitution_art_27_bis")),
    aggregate("20", (None, 713), Direct, direct(Sales, "stamp_tax_reimbursement")),
    aggregate("21", (None, 741), Direct, direct(Sales, "iepd_debit_additions")),
    aggregate("22", (None, 791), Direct, direct(Sales, "credit_refund_restitution")),
    // Purchases without right to credit.
    aggregate("25", (Some(564), 521), Net, net(Purchases, Some("taxable_no_right_count"), "taxable_no_right_net")),
    aggregate("26", (Some(566), 560), Net, net(Purchases, Some("imports_no_right_count"), "imports_no_right_net")),
    aggregate("27", (Some(584), 562), Net, net(Purchases, Some("exempt_no_right_count"), "exempt_no_right_net")),
    // Purchases with right to credit.
    itemized("28", "line_28", "Facturas Recibidas del Giro + FC Emitidas", Purchase, (Some(519), 520), Vat, vat(Purchases, "invoices_count", "invoices_vat", "invoices_net")),
    itemized("29", "line_29", "Facturas Supermercados/Comercios", Purchase, (Some(761), 762), Vat, vat(Purchases, "supermarket_invoices_count", "supermarket_invoices_vat", "supermarket_invoices_net")),
    aggregate("30", (Some(765), 766), Vat, vat(Purchases, "real_estate_invoices_count", "real_estate_invoices_vat", "real_estate_invoices_net")),
    itemized("31", "line_31", "Facturas Activo Fijo", Purchase, (Some(524), 525), Vat, vat(Purchases, "fixed_asset_invoices_count", "fixed_asset_invoices_vat", "fixed_asset_invoices_net")),
    itemized("32", "line_32", "Notas de Crédito Recibidas", Purchase, (Some(527), 528), Vat, vat(Purchases, "credit_notes_count", "credit_notes_vat", "credit_notes_net")),
    itemized("33", "line_33", "Notas de Débito Recibidas", Purchase, (Some(531), 532), Vat, vat(Purchases, "debit_notes_count", "debit_notes_vat", "debit_notes_net")),
    itemized("34", "line_34", "DIN Importaciones del Giro", Purchase, (Some(534), 535), Vat, vat(Purchases, "imports_count", "imports_vat", "imports_net")),
    itemized("35", "line_35", "DIN Importaciones Activo Fijo", Purchase, (Some(536), 553), Vat, vat(Purchases, "fixed_asset_imports_count", "fixed_asset_imports_vat", "fixed_asset_imports_net")),
    // Refunds and other credits.
    aggregate("37", (None, 593), Direct, direct(Refunds, "art_36_exporters")),
    aggregate("38", (None, 594), Direct, direct(Refunds, "art_27_bis")),
    aggregate("39", (None, 592), Direct, direct(Refunds, "art_27_bis_certificate")),
    aggregate("40", (None, 539), Direct, direct(Refunds, "subject_change")),
    aggregate("41", (None, 718), Direct, direct(Refunds, "law_20258_generators")),
    aggregate("42", (None, 790), Direct, direct(Refunds, "vat_credit_refund")),
    aggregate("43", (None, 164), Direct, direct(Purchases, "undue_refund_reimbursement")),
    aggregate("46", (None, 523), Direct, direct(Purchases, "free_zone_credit")),
    aggregate("47", (None, 712), Direct, direct(Purchases, "stamp_tax_credit")),
    aggregate("48", (None, 757), Direct, direct(Purchases, "restituted_vat_credit")),
    // Withholdings.
    aggregate("59", (None, 50), Direct, direct(Withholdings, "first_category")),
    itemized("60", "line_60", "Impuesto Único 2da Categoría (Sueldos)", PayrollSlip, (None, 48), Withheld, direct(Withholdings, "employee_income_tax")),
    itemized("61", "line_61", "Retención Honorarios Art. 42 N°2", FeeReceipt, (None, 151), Withheld, direct(Withholdings, "professional_fees")),
    aggregate("62", (None, 153), Direct, direct(Withholdings, "directors_fees")),
    aggregate("63", (None, 49), Direct, direct(Withholdings, "loan_relief_art_42_1")),
    aggregate("64", (None, 155), Direct, direct(Withholdings, "loan_relief_art_42_2")),
    aggregate("65", (None, 54), Direct, direct(Withholdings, "newspaper_vendors")),
    aggregate("66", (None, 56), Direct, direct(Withholdings, "mining_products")),
    aggregate("67", (None, 588), Direct, direct(Withholdings, "endowment_insurance")),
    aggregate("68", (None, 589), Direct, direct(Withholdings, "apv_withdrawals")),
];

/// Field names of the Spanish-keyed input format, with the field each
/// one stands for.  The English name wins when both are given.
#[rustfmt::skip]
pub const FIELD_ALIASES: &[(Section, &str, &str)] = &[
    (Sales, "export_invoices_count", "facturas_exportacion_cant"),
    (Sales, "export_invoices_net", "facturas_exportacion_neto"),
    (Sales, "exempt_sales_count", "facturas_exentas_giro_cant"),
    (Sales, "exempt_sales_net", "facturas_exentas_giro_neto"),
    (Sales, "purchase_invoices_issued_count", "facturas_compra_digital_cant"),
    (Sales, "purchase_invoices_issued_net", "facturas_compra_digital_neto"),
    (Purchases, "purchase_invoices_issued_count", "facturas_compra_digital_cant"),
    (Purchases, "purchase_invoices_issued_net", "facturas_compra_digital_neto"),
    (Sales, "taxable_invoices_count", "facturas_afectas_cant"),
    (Sales, "taxable_invoices_net", "facturas_afectas_neto"),
    (Sales, "fixed_asset_sales_count", "ventas_activo_fijo_cant"),
    (Sales, "fixed_asset_sales_net", "ventas_activo_fijo_neto"),
    (Sales, "receipts_count", "boletas_cant"),
    (Sales, "receipts_net", "boletas_neto"),
    (Sales, "debit_notes_count", "notas_debito_cant"),
    (Sales, "debit_notes_net", "notas_debito_neto"),
    (Sales, "credit_notes_count", "notas_credito_cant"),
    (Sales, "credit_notes_net", "notas_credito_neto"),
    (Purchases, "invoices_count", "facturas_giro_cant"),
    (Purchases, "invoices_vat", "facturas_giro_iva"),
    (Purchases, "fixed_asset_invoices_count", "facturas_activo_fijo_cant"),
    (Purchases, "fixed_asset_invoices_vat", "facturas_activo_fijo_iva"),
    (Purchases, "credit_notes_count", "notas_credito_recibidas_cant"),
    (Purchases, "credit_notes_vat", "notas_credito_recibidas_iva"),
    (Purchases, "debit_notes_count", "notas_debito_recibidas_cant"),
    (Purchases, "debit_notes_vat", "notas_debito_recibidas_iva"),
    (Purchases, "imports_count", "din_giro_cant"),
    (Purchases, "imports_vat", "din_giro_iva"),
    (Purchases, "fixed_asset_imports_count", "din_activo_fijo_cant"),
    (Purchases, "fixed_asset_imports_vat", "din_activo_fijo_iva"),
    (Purchases, "exempt_no_right_count", "exentas_sin_derecho_cant"),
    (Purchases, "exempt_no_right_net", "exentas_sin_derecho_neto"),
    (Withholdings, "employee_income_tax", "iusc_impuesto"),
    (Withholdings, "professional_fees", "honorarios_retencion"),
    (Withholdings, "directors_fees", "directores_retencion"),
    (Refunds, "art_36_exporters", "art_36_exportador"),
    (Refunds, "art_27_bis_certificate", "certificado_27_bis"),
    (Refunds, "subject_change", "cambio_sujeto"),
];

/// Every name under which `field` of `section` may be supplied, the
/// canonical name first.
pub fn field_names(section: Section, field: &'static str) -> impl Iterator<Item = &'static str> {
    std::iter::once(field).chain(
        FIELD_ALIASES
            .iter()
            .filter(move |(s, canonical, _)| *s == section && *canonical == field)
            .map(|(_, _, alias)| *alias),
    )
}

/// Whether some line reads `key` from `section`.
pub fn known_field(section: Section, key: &str) -> bool {
    LINE_SOURCES
        .iter()
        .filter(|source| source.fallback.sections().any(|s| s == section))
        .flat_map(|source| source.fallback.fields())
        .flat_map(|field| field_names(section, field))
        .any(|name| name == key)
}

/// Lines whose net amounts make up the PPM base, with their sign.
pub const PPM_BASE_LINES: &[(&str, Operator)] = &[
    ("7", Add),
    ("2", Add),
    ("1", Add),
    ("10", Add),
    ("12", Add),
    ("13", Subtract),
];

/// The source of a line by its printed number.
pub fn source(line: &str) -> Option<&'static LineSource> {
    LINE_SOURCES.iter().find(|s| s.line == line)
}

/// Lines that accept itemized documents, in form order.
pub fn itemized_sources() -> impl Iterator<Item = &'static LineSource> {
    LINE_SOURCES.iter().filter(|s| s.itemization.is_some())
}

/// The itemizable line a `documents` key refers to.  Both `line_7`
/// and `linea_7` name line 7.
pub fn itemized_source(key: &str) -> Option<&'static LineSource> {
    let number = key
        .strip_prefix("linea_")
        .or_else(|| key.strip_prefix("line_"))?;
    itemized_sources().find(|s| s.line == number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn folds_follow_the_printed_signs() {
        let debit: Vec<(u16, Operator)> = DEBIT_FOLD
            .iter()
            .flat_map(|t| t.iter())
            .filter(|l| matches!(l.operator, Add | Subtract))
            .map(|l| (l.amount_code, l.operator))
            .collect();
        assert_eq!(debit.len(), 16);
        assert!(debit.contains(&(510, Subtract)));
        assert!(debit.contains(&(502, Add)));
        assert!(!debit.iter().any(|(c, _)| *c == 538));

        let credit: Vec<u16> = CREDIT_FOLD
            .iter()
            .flat_map(|t| t.iter())
            .filter(|l| matches!(l.operator, Add | Subtract))
            .map(|l| l.amount_code)
            .collect();
        assert_eq!(credit.len(), 19);
        assert!(credit.contains(&504));
        assert!(!credit.contains(&537));
    }

    #[test]
    fn every_source_feeds_a_printed_row() {
        let printed: HashSet<u16> = referenced_codes().collect();
        for source in LINE_SOURCES {
            assert!(printed.contains(&source.amount_code), "line {}", source.line);
            if let Some(q) = source.quantity_code {
                assert!(printed.contains(&q), "line {}", source.line);
            }
        }
    }

    #[test]
    fn sources_write_distinct_codes() {
        let mut seen = HashSet::new();
        for source in LINE_SOURCES {
            assert!(seen.insert(source.amount_code), "code {}", source.amount_code);
        }
    }

    #[test]
    fn line_keys_accept_both_prefixes() {
        assert_eq!(itemized_source("linea_7").map(|s| s.amount_code), Some(502));
        assert_eq!(itemized_source("line_61").map(|s| s.amount_code), Some(151));
        assert!(itemized_source("line_8").is_none());
        assert!(itemized_source("7").is_none());
    }

    #[test]
    fn ppm_base_lines_have_net_fields() {
        for (line, _) in PPM_BASE_LINES {
            let source = source(line).expect("ppm base line");
            assert!(source.net_field().is_some(), "line {line}");
        }
    }

    #[test]
    fn aliases_name_fields_some_line_reads() {
        for (section, canonical, alias) in FIELD_ALIASES {
            assert!(known_field(*section, canonical), "{canonical}");
            assert!(known_field(*section, alias), "{alias}");
        }
        assert!(known_field(Purchases, "facturas_compra_digital_neto"));
        assert!(!known_field(Sales, "facturas_giro_iva"));
        assert!(!known_field(Refunds, "taxable_invoices_vat"));
    }

    #[test]
    fn field_names_put_the_canonical_name_first() {
        let names: Vec<_> = field_names(Sales, "taxable_invoices_net").collect();
        assert_eq!(names, vec!["taxable_invoices_net", "facturas_afectas_neto"]);
        let names: Vec<_> = field_names(Purchases, "taxable_invoices_net").collect();
        assert_eq!(names, vec!["taxable_invoices_net"]);
    }

    #[test]
    fn subtracting_the_minimum_cannot_be_negated() {
        assert_eq!(Subtract.signed(5), Some(-5));
        assert_eq!(Subtract.signed(i64::MIN), None);
        assert_eq!(Total.signed(i64::MIN), Some(0));
    }

    #[test]
    fn must_exist_codes_are_printed() {
        let printed: HashSet<u16> = referenced_codes().collect();
        for code in MUST_EXIST {
            assert!(printed.contains(&code));
        }
    }
}
