//! Command descriptors.
//!
//! A [`Command`] captures what one request wants: which resource, which key,
//! which filter and projection, paging, casts and operations. It is built
//! with chained methods and stays a plain value until a
//! [`CommandFormatter`](crate::formatter::CommandFormatter) turns it into a
//! URI. Conflicting clauses are accepted here and rejected at format time.
//!
//! # Example
//!
//! ```
//! use odata_engine::Command;
//! use odata_engine::ast::reference;
//!
//! let command = Command::collection("Products")
//!     .filter(reference("UnitPrice").greater_than(20))
//!     .select(["ProductName", "UnitPrice"])
//!     .order_by_descending("UnitPrice")
//!     .top(5);
//! ```

use crate::{ast::Expr, value::Value};

/// Resource a command addresses.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Source {
    /// No resource: unbound functions and actions
    #[default]
    None,
    /// Entity set by name
    Collection(String),
    /// Navigation link reached from another command's resource
    Navigation { parent: Box<Command>, name: String },
}

/// Entity key.
#[derive(Debug, Clone, PartialEq)]
pub enum Key {
    /// Single-part key, rendered `(value)`
    Single(Value),
    /// Named parts in the order supplied, rendered `(A=1,B=2)`
    Composite(Vec<(String, Value)>),
}

/// Sort direction for `$orderby`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Ascending,
    Descending,
}

/// Count request mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CountMode {
    #[default]
    None,
    /// Total count alongside the results
    Inline,
    /// Only the count (`/$count`)
    Only,
}

/// Expanded navigation link with its own options.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Expand {
    /// Navigation path, dotted or slash separated
    pub path: String,
    pub select: Vec<String>,
    pub filter: Option<Expr>,
    pub order_by: Vec<(String, Direction)>,
    pub top: Option<u64>,
    pub expand: Vec<Expand>,
}

impl Expand {
    pub fn new(path: impl Into<String>) -> Self {
        Expand {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn filter(mut self, filter: Expr) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(filter),
            None => filter,
        });
        self
    }

    pub fn order_by(mut self, path: impl Into<String>, direction: Direction) -> Self {
        self.order_by.push((path.into(), direction));
        self
    }

    pub fn top(mut self, top: u64) -> Self {
        self.top = Some(top);
        self
    }

    pub fn expand(mut self, nested: impl Into<Expand>) -> Self {
        self.expand.push(nested.into());
        self
    }
}

impl From<&str> for Expand {
    fn from(path: &str) -> Self {
        Expand::new(path)
    }
}

impl From<String> for Expand {
    fn from(path: String) -> Self {
        Expand::new(path)
    }
}

/// Function or action invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub name: String,
    /// Named arguments in the order supplied
    pub args: Vec<(String, Value)>,
}

/// One request's intent.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Command {
    pub source: Source,
    pub key: Option<Key>,
    pub filter: Option<Expr>,
    pub search: Option<String>,
    pub select: Vec<String>,
    pub expand: Vec<Expand>,
    pub order_by: Vec<(String, Direction)>,
    pub skip: Option<u64>,
    pub top: Option<u64>,
    pub count: CountMode,
    /// Derived type to cast the resource to
    pub derived_type: Option<String>,
    pub function: Option<Invocation>,
    pub action: Option<String>,
    /// Address the media stream (`/$value`)
    pub media: bool,
    /// Raw `name=value` options appended verbatim
    pub query_options: Vec<(String, String)>,
    /// Options whose value is an expression, formatted like a filter
    pub expression_options: Vec<(String, Expr)>,
}

impl Command {
    /// Command over an entity set.
    pub fn collection(name: impl Into<String>) -> Self {
        Command {
            source: Source::Collection(name.into()),
            ..Default::default()
        }
    }

    /// Unbound function call (`GetProductsByRating(rating=3)`).
    pub fn unbound_function(name: impl Into<String>, args: Vec<(String, Value)>) -> Self {
        Command::default().function(name, args)
    }

    /// Unbound action call.
    pub fn unbound_action(name: impl Into<String>) -> Self {
        Command::default().action(name)
    }

    /// Follows a navigation link from this command's resource.
    ///
    /// The current command becomes the parent; only its path (collection,
    /// key, cast, parent chain) contributes to the new command's URI.
    pub fn navigate(self, name: impl Into<String>) -> Self {
        Command {
            source: Source::Navigation {
                parent: Box::new(self),
                name: name.into(),
            },
            ..Default::default()
        }
    }

    pub fn key(mut self, value: impl Into<Value>) -> Self {
        self.key = Some(Key::Single(value.into()));
        self
    }

    pub fn composite_key<I, S, V>(mut self, parts: I) -> Self
    where
        I: IntoIterator<Item = (S, V)>,
        S: Into<String>,
        V: Into<Value>,
    {
        self.key = Some(Key::Composite(
            parts.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        ));
        self
    }

    /// Adds a filter; repeated calls are combined with `and`.
    pub fn filter(mut self, filter: Expr) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(filter),
            None => filter,
        });
        self
    }

    pub fn search(mut self, terms: impl Into<String>) -> Self {
        self.search = Some(terms.into());
        self
    }

    pub fn select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn expand(mut self, expand: impl Into<Expand>) -> Self {
        self.expand.push(expand.into());
        self
    }

    pub fn order_by(mut self, path: impl Into<String>) -> Self {
        self.order_by.push((path.into(), Direction::Ascending));
        self
    }

    pub fn order_by_descending(mut self, path: impl Into<String>) -> Self {
        self.order_by.push((path.into(), Direction::Descending));
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn top(mut self, top: u64) -> Self {
        self.top = Some(top);
        self
    }

    /// Requests the total count alongside the results.
    pub fn count(mut self) -> Self {
        self.count = CountMode::Inline;
        self
    }

    /// Requests only the count.
    pub fn count_only(mut self) -> Self {
        self.count = CountMode::Only;
        self
    }

    pub fn cast(mut self, derived_type: impl Into<String>) -> Self {
        self.derived_type = Some(derived_type.into());
        self
    }

    pub fn function(mut self, name: impl Into<String>, args: Vec<(String, Value)>) -> Self {
        self.function = Some(Invocation {
            name: name.into(),
            args,
        });
        self
    }

    pub fn action(mut self, name: impl Into<String>) -> Self {
        self.action = Some(name.into());
        self
    }

    pub fn media(mut self) -> Self {
        self.media = true;
        self
    }

    pub fn query_option(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_options.push((name.into(), value.into()));
        self
    }

    pub fn expression_option(mut self, name: impl Into<String>, expr: Expr) -> Self {
        self.expression_options.push((name.into(), expr));
        self
    }

    /// Name of the collection or navigation link at the end of the path.
    pub fn resource_name(&self) -> Option<&str> {
        match &self.source {
            Source::None => None,
            Source::Collection(name) => Some(name),
            Source::Navigation { name, .. } => Some(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::reference;

    #[test]
    fn test_repeated_filters_combine_with_and() {
        let command = Command::collection("Products")
            .filter(reference("A").equal(1))
            .filter(reference("B").equal(2));

        assert_eq!(
            command.filter,
            Some(reference("A").equal(1).and(reference("B").equal(2)))
        );
    }

    #[test]
    fn test_navigate_keeps_parent() {
        let command = Command::collection("Categories").key(1).navigate("Products");
        match &command.source {
            Source::Navigation { parent, name } => {
                assert_eq!(name, "Products");
                assert_eq!(parent.key, Some(Key::Single(Value::Int32(1))));
            }
            other => panic!("unexpected source: {:?}", other),
        }
        assert_eq!(command.resource_name(), Some("Products"));
    }
}
