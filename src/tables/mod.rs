//! LLM-guided table extraction: prompts, resilient response parsing, and typed rows.

mod extractor;
mod kinds;
pub mod lenient;
mod parse;
mod prompt;
mod record;

pub use extractor::{TableExtraction, TableExtractor, TableMetrics, TablePreview, TableTiming};
pub use kinds::{
    ContractValueRow, ExtractedTable, FixedIncomeRow, InvestmentRow, PartyRow, ProductRow,
    ScheduleRow, TableKind,
};
pub use parse::parse_rows;
pub use prompt::{PROMPT_TEXT_LIMIT, extraction_prompt};
pub use record::{Record, Scalar, union_columns};
