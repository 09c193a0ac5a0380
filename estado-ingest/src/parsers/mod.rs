//! Statement parsers: the CONDUSEF text template and a cell-level parser
//! for extracted tables.

pub mod condusef;
pub mod table_rows;

pub use condusef::{
    BalanceInfo, CustomerInfo, ParsedStatement, PaymentInfo, TemplateParser, TransactionSection,
    Validation, detect_bank,
};
pub use table_rows::TableRowParser;
