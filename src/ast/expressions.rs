use std::ops;

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{
    ast::{BinOp, UnaryOp},
    value::Value,
};

/// Expression tree node for filters and expression-valued query options.
///
/// Nodes are immutable once built. Every combinator takes its operands by
/// value and returns a new node, so composing `a.and(b)` never touches `a`
/// or `b` in place.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Dotted property path, resolved against the schema when formatted
    ///
    /// # Examples
    /// ```text
    /// ProductName
    /// Category.CategoryName
    /// OrderDate.Year
    /// ```
    Reference(String),

    /// Typed literal
    Value(Value),

    /// Function call on a target
    ///
    /// `name` is the logical function name; `args` excludes the target.
    ///
    /// # Examples
    /// ```text
    /// ProductName.Contains("ai")
    /// ProductName.Substring(1, 2)
    /// ```
    FunctionCall {
        name: String,
        target: Box<Expr>,
        args: Vec<Expr>,
    },

    /// Binary operation (arithmetic, comparison, logical)
    BinaryOp {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },

    /// Unary operation
    UnaryOp { op: UnaryOp, operand: Box<Expr> },
}

/// Builds a property reference.
///
/// # Example
///
/// ```
/// use odata_engine::ast::{Expr, reference};
///
/// let e = reference("Category.CategoryName");
/// assert_eq!(e, Expr::Reference("Category.CategoryName".to_string()));
/// ```
pub fn reference(path: impl Into<String>) -> Expr {
    Expr::Reference(path.into())
}

/// Builds a literal node.
pub fn value(v: impl Into<Value>) -> Expr {
    Expr::Value(v.into())
}

impl Expr {
    fn binary(self, op: BinOp, right: impl Into<Expr>) -> Expr {
        Expr::BinaryOp {
            op,
            left: Box::new(self),
            right: Box::new(right.into()),
        }
    }

    /// `self eq right`
    pub fn equal(self, right: impl Into<Expr>) -> Expr {
        self.binary(BinOp::Equal, right)
    }

    /// `self ne right`
    pub fn not_equal(self, right: impl Into<Expr>) -> Expr {
        self.binary(BinOp::NotEqual, right)
    }

    /// `self gt right`
    pub fn greater_than(self, right: impl Into<Expr>) -> Expr {
        self.binary(BinOp::GreaterThan, right)
    }

    /// `self ge right`
    pub fn greater_or_equal(self, right: impl Into<Expr>) -> Expr {
        self.binary(BinOp::GreaterEqual, right)
    }

    /// `self lt right`
    pub fn less_than(self, right: impl Into<Expr>) -> Expr {
        self.binary(BinOp::LessThan, right)
    }

    /// `self le right`
    pub fn less_or_equal(self, right: impl Into<Expr>) -> Expr {
        self.binary(BinOp::LessEqual, right)
    }

    /// `self eq [low, high]`, formatted as a pair of inclusive bounds.
    pub fn between(self, low: impl Into<Value>, high: impl Into<Value>) -> Expr {
        self.equal(Expr::Value(Value::range(low, high)))
    }

    /// `self and right`
    pub fn and(self, right: impl Into<Expr>) -> Expr {
        self.binary(BinOp::And, right)
    }

    /// `self or right`
    pub fn or(self, right: impl Into<Expr>) -> Expr {
        self.binary(BinOp::Or, right)
    }

    /// Calls a logical function with `self` as the target.
    pub fn call(self, name: impl Into<String>, args: Vec<Expr>) -> Expr {
        Expr::FunctionCall {
            name: name.into(),
            target: Box::new(self),
            args,
        }
    }

    pub fn contains(self, needle: impl Into<Expr>) -> Expr {
        self.call("Contains", vec![needle.into()])
    }

    pub fn starts_with(self, prefix: impl Into<Expr>) -> Expr {
        self.call("StartsWith", vec![prefix.into()])
    }

    pub fn ends_with(self, suffix: impl Into<Expr>) -> Expr {
        self.call("EndsWith", vec![suffix.into()])
    }

    pub fn index_of(self, needle: impl Into<Expr>) -> Expr {
        self.call("IndexOf", vec![needle.into()])
    }

    pub fn substring(self, start: impl Into<Expr>) -> Expr {
        self.call("Substring", vec![start.into()])
    }

    pub fn length(self) -> Expr {
        self.call("Length", vec![])
    }

    pub fn to_lower(self) -> Expr {
        self.call("ToLower", vec![])
    }

    pub fn to_upper(self) -> Expr {
        self.call("ToUpper", vec![])
    }

    pub fn trim(self) -> Expr {
        self.call("Trim", vec![])
    }

    pub fn year(self) -> Expr {
        self.call("Year", vec![])
    }

    pub fn month(self) -> Expr {
        self.call("Month", vec![])
    }

    pub fn day(self) -> Expr {
        self.call("Day", vec![])
    }

    /// Precedence rank of the node's operator, if it has one.
    pub fn rank(&self) -> Option<u8> {
        match self {
            Expr::BinaryOp { op, .. } => Some(op.rank()),
            Expr::UnaryOp { op, .. } => Some(op.rank()),
            _ => None,
        }
    }
}

impl ops::Not for Expr {
    type Output = Expr;

    fn not(self) -> Expr {
        Expr::UnaryOp {
            op: UnaryOp::Not,
            operand: Box::new(self),
        }
    }
}

macro_rules! arithmetic {
    ($($trait:ident :: $method:ident => $op:expr),* $(,)?) => {
        $(
            impl<R: Into<Expr>> ops::$trait<R> for Expr {
                type Output = Expr;

                fn $method(self, right: R) -> Expr {
                    self.binary($op, right)
                }
            }
        )*
    };
}

arithmetic! {
    Add::add => BinOp::Add,
    Sub::sub => BinOp::Subtract,
    Mul::mul => BinOp::Multiply,
    Div::div => BinOp::Divide,
    Rem::rem => BinOp::Modulo,
    BitAnd::bitand => BinOp::And,
    BitOr::bitor => BinOp::Or,
}

macro_rules! literal_into_expr {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Expr {
                fn from(v: $ty) -> Self {
                    Expr::Value(v.into())
                }
            }
        )*
    };
}

literal_into_expr!(Value, bool, i32, i64, f64, Decimal, &str, String, Uuid, NaiveDateTime);
