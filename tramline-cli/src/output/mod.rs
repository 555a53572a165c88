//! Output formatting for CLI.

mod json;
mod text;

pub use json::{ClassifySummary, FetchSummary, JsonFormatter};
pub use text::TextFormatter;
