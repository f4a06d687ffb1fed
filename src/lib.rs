//! progsnap - A streaming reader for Progsnap programming-process datasets
//!
//! Opens a dataset directory or zip archive, validates its metadata and table
//! headers, and yields Main Table events in `Order` sequence, joined with
//! their subject, tool instance and code state.
//!
//! ```ignore
//! let dataset = progsnap::Dataset::open("data/cs1-fall")?;
//! for event in dataset.events()? {
//!     let event = event?;
//!     if let Some(code) = event.code_state_text()? {
//!         println!("{} {} {}", event.order(), event.event_type(), code.len());
//!     }
//! }
//! ```

pub mod codestate;
pub mod config;
pub mod dataset;
pub mod errors;
pub mod events;
pub mod index;
pub mod metadata;
pub mod observability;
pub mod schema;
pub mod source;
pub mod table;

pub use config::{ReaderConfig, RowPolicy};
pub use dataset::Dataset;
pub use errors::{ErrorCode, ProgsnapError, ProgsnapResult, RowDecodeError, Severity};
pub use events::{CodeStateRef, Event, EventFilter, EventStream};
pub use index::LinkRef;
pub use metadata::TableKind;
pub use source::DatasetSource;
pub use table::{ErrorCollector, Row, Value};
