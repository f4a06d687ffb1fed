//! Typed table reading
//!
//! # Design Principles
//!
//! - Tables are streamed, never loaded whole
//! - Values are decoded by declared type only
//! - Undeclared columns pass through untyped
//! - An empty field is null

mod coerce;
mod reader;
mod value;

pub use coerce::{decode_field, parse_boolean, parse_timestamp};
pub use reader::{ErrorCollector, TableReader};
pub use value::{Row, Value};
