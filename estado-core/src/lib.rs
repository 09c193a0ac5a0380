//! estado-core: statement data model, confidence pairs, and amount/date parsing

pub mod amount;
pub mod confidence;
pub mod dates;
pub mod statement;

pub use amount::{amounts_match, parse_amount, round_cents};
pub use confidence::{Scored, mean, ratio};
pub use dates::{month_number, parse_statement_date};
pub use statement::{
    CategorizationMethod, Category, ExtractionMethod, ExtractionResult, InstallmentPlan,
    PageReport, PageTextSource, StatementMetadata, Transaction, TransactionType, UnknownCategory,
};
