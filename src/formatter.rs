//! Query-syntax formatting.
//!
//! Two formatters live here:
//!
//! - [`ExpressionFormatter`] turns an [`Expr`] into a filter literal such as
//!   `substringof('ai',ProductName) and UnitPrice gt 20`.
//! - [`CommandFormatter`] turns a [`Command`] into a request path plus query
//!   string such as `Products(1)/Category?$select=CategoryName`.
//!
//! Both are pure over their inputs and the [`MetadataResolver`] they borrow,
//! so the same command always formats to the same bytes and formatters can
//! be used from several threads at once.
mod command;
mod dialect;
mod escape;
mod expression;

use crate::{
    ProtocolVersion, ast::Expr, command::Command,
    metadata::{MetadataResolver, NameNotFound},
};

pub use command::CommandFormatter;
pub use escape::{EscapeMode, escape};
pub use expression::ExpressionFormatter;

/// Errors raised while formatting a command or expression.
///
/// All of them are caller errors detected before any I/O and are never
/// retried.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FormatError {
    /// Mutually exclusive clauses were combined on one command
    #[error("Malformed command: {0}")]
    MalformedCommand(String),

    /// A segment of a property path does not exist in the schema
    #[error("Cannot resolve '{segment}' in reference '{path}'")]
    ReferenceResolution { segment: String, path: String },

    /// The resolver does not know a collection, property or operation name
    #[error(transparent)]
    NameNotFound(#[from] NameNotFound),

    /// Unknown function name or wrong argument count
    #[error("Unsupported function: {name} with {arity} argument(s)")]
    UnsupportedFunction { name: String, arity: usize },

    /// A value has no literal form in the selected dialect
    #[error("Invalid literal: {0}")]
    InvalidLiteral(String),
}

/// Resolution context for a standalone filter.
pub struct FilterContext<'a> {
    pub resolver: &'a dyn MetadataResolver,
    /// Collection references resolve against; `None` emits paths verbatim
    pub collection: Option<&'a str>,
    pub version: ProtocolVersion,
}

/// Formats a command into a request path and query string.
///
/// # Examples
///
/// ```
/// use odata_engine::{Command, ProtocolVersion, formatter::format_command};
/// use odata_engine::metadata::{FieldKind, Schema};
///
/// let schema = Schema::new("NorthwindModel").field("Products", "ProductID", FieldKind::Other);
/// let command = Command::collection("Products").key(1);
///
/// let uri = format_command(&command, ProtocolVersion::V4, &schema).unwrap();
/// assert_eq!(uri, "Products(1)");
/// ```
pub fn format_command(
    command: &Command,
    version: ProtocolVersion,
    resolver: &dyn MetadataResolver,
) -> Result<String, FormatError> {
    CommandFormatter::new(resolver, version).format(command)
}

/// Formats an expression into an unescaped filter literal.
pub fn format_filter(expr: &Expr, context: &FilterContext<'_>) -> Result<String, FormatError> {
    ExpressionFormatter::new(context.resolver, context.version).format(expr, context.collection)
}
