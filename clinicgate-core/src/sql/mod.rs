//! SQL text helpers
//!
//! Dynamic SQL in this crate is built from exactly two kinds of fragments:
//! identifiers that passed [`sanitize`], and `?` placeholders bound with
//! [`bind_json`]. Nothing else is ever interpolated.

mod ident;
mod value;

pub use ident::{quote, require, sanitize};
pub use value::{
    bind_all, bind_json, number_value, row_to_json, scalar_number, scalar_text, JsonRow,
    MySqlQuery,
};
