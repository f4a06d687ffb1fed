//! Table schemas and header validation
//!
//! # Design Principles
//!
//! - Every table is read against a declared, ordered column schema
//! - Columns are matched by name, never by position
//! - Extension columns are allowed and preserved
//! - A missing required column makes the table unreadable
//! - Coercion is driven by the declared type only

mod types;
mod validator;

pub use types::{ColumnDef, ColumnType, TableSchema};
pub use validator::{ColumnClass, ColumnPlan, PlannedColumn, SchemaValidator};
