//! Core definitions relied upon by all hdt-* crates: the error type, the
//! `Result` alias and a few argument/data verification macros.

pub mod error;
pub mod result;

pub use result::Result;
