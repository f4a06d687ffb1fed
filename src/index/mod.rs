//! Link table indexes
//!
//! Subject, ToolInstance and CodeStates rows are indexed by primary key when
//! the dataset is opened. Events join against these indexes.
//!
//! # Design Principles
//!
//! - Built eagerly, read-only afterwards
//! - In-memory only
//! - Duplicate keys are structural errors
//! - A dangling foreign key is reported, never fatal

mod link;

pub use link::{LinkIndex, LinkRef};
