//! F29 engine library crate.
//!
//! This crate resolves the codes of the Chilean monthly tax declaration
//! (Formulario 29) from aggregate totals and itemized documents, and
//! renders the result as a printable report.  External applications
//! may depend on the `f29_engine` crate and call `engine::resolve`
//! directly or embed the API via `api::build_router`.

pub mod error;
pub mod models;
pub mod documents;
pub mod form;
pub mod tax;
pub mod engine;
pub mod alerts;
pub mod report;
pub mod api;
