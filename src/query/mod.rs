//! Query language subsystem
//!
//! Three mini-languages share one tokenizer:
//!
//! - `fields`: field selection with nested relation includes
//! - `filters`: boolean expressions over comparisons
//! - `order`: comma-separated `field [asc|desc]` clauses
//!
//! Parsing never partially succeeds. Schema-level checks (unknown fields,
//! relations) belong to the planner.

mod errors;
mod filter;
mod lexer;
mod order;
mod request;
mod selection;

pub use errors::{QueryError, QueryResult};
pub use filter::{parse_filter, FilterExpr, FilterOperator};
pub use lexer::{tokenize, LexError, Token, TokenKind};
pub use order::{parse_order, OrderBy};
pub use request::{QueryRequest, RequestParams};
pub use selection::{parse_selection, IncludeRequest, Selection};

pub(crate) use filter::order_values;
