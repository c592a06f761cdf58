//! Report rendering for human consumption.
//!
//! Machine-readable serialization lives on
//! [`SbcReport`](crate::report::SbcReport) itself (`to_json`,
//! `to_markdown`); this module covers the terminal.

mod terminal;

pub use terminal::{format_report, format_summary_line};
