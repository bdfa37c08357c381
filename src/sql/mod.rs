pub mod ddl;

pub use ddl::{quote_ident, quote_literal};
