//! # Expression Model
//!
//! This module defines the expression tree used for `$filter` and for
//! expression-valued query options, plus the static table that maps logical
//! function names onto protocol function names.
//!
//! ## Architecture Overview
//!
//! - **[expressions]** - Expression nodes (references, literals, calls, operations)
//! - **[operators]** - Binary and unary operators with their precedence ranks
//! - **[functions]** - Function mapping table keyed by (name, argument count)
//!
//! ## Quick Start
//!
//! ```
//! use odata_engine::ast::{reference, value};
//!
//! let filter = reference("ProductName")
//!     .contains("ai")
//!     .and(reference("UnitPrice").greater_than(value(20)));
//! ```
//!
//! Formatting the tree into query syntax is the job of
//! [`crate::formatter::ExpressionFormatter`]; nodes carry no resolution state
//! of their own, so one tree can be formatted against any collection.
//!
//! ## Precedence
//!
//! Operators carry a numeric rank where a lower number binds tighter:
//!
//! | Rank | Operators |
//! |---|---|
//! | 1 | `not` |
//! | 2 | `mul` `div` `mod` |
//! | 3 | `add` `sub` |
//! | 4 | `gt` `ge` `lt` `le` |
//! | 5 | `eq` `ne` |
//! | 6 | `and` |
//! | 7 | `or` |
pub mod expressions;
pub mod functions;
pub mod operators;

pub use expressions::{Expr, reference, value};
pub use functions::{ArgumentOrder, FunctionDescriptor};
pub use operators::{BinOp, UnaryOp};
