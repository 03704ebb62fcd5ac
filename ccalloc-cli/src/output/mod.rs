//! Text and JSON rendering of ledgers, summaries and check reports.

mod json;
mod text;

pub use json::JsonFormatter;
pub use text::TextFormatter;

#[cfg(test)]
mod tests;
