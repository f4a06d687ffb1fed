//! Event stream
//!
//! The primary read surface: Main Table rows in `Order` sequence, each
//! joined with its Subject and ToolInstance rows and carrying a deferred
//! code state handle.
//!
//! # Design Principles
//!
//! - Pull-based: all I/O happens when the consumer asks for the next event
//! - Single pass: a new stream reopens the file
//! - Filters run before joins and before code state I/O
//! - Events are values; they own no file handles

mod event;
mod filter;
mod stream;

pub use event::{CodeStateRef, Event};
pub use filter::EventFilter;
pub use stream::EventStream;

pub(crate) use event::EventJoins;
