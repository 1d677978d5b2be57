//! Core data types: market definitions, match results, batches and reports.

pub mod market;
pub mod match_result;
pub mod report;

pub use market::*;
pub use match_result::*;
pub use report::*;
