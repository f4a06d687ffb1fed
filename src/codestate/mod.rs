//! Code state resolution
//!
//! Maps a code state identifier to its source text. The strategy (inline
//! table column or external files) is chosen once from the dataset metadata.

mod resolver;

pub use resolver::{conventional_path, CacheStats, CodeStateResolver, CodeStateSource};
