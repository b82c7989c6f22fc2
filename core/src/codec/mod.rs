//! Text codecs consumed by the built-in formats.

pub mod edn;
pub mod query;
pub mod transit;
