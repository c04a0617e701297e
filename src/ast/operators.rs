/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    // Comparison
    /// Equal (`eq`)
    Equal,
    /// Not equal (`ne`)
    NotEqual,
    /// Less than (`lt`)
    LessThan,
    /// Greater than (`gt`)
    GreaterThan,
    /// Less than or equal (`le`)
    LessEqual,
    /// Greater than or equal (`ge`)
    GreaterEqual,

    // Arithmetic
    /// Addition (`add`)
    Add,
    /// Subtraction (`sub`)
    Subtract,
    /// Multiplication (`mul`)
    Multiply,
    /// Division (`div`)
    Divide,
    /// Modulo (`mod`)
    Modulo,

    // Logical
    /// Logical AND (`and`)
    And,
    /// Logical OR (`or`)
    Or,
}

impl BinOp {
    /// Every binary operator, in declaration order.
    pub const ALL: [BinOp; 13] = [
        BinOp::Equal,
        BinOp::NotEqual,
        BinOp::LessThan,
        BinOp::GreaterThan,
        BinOp::LessEqual,
        BinOp::GreaterEqual,
        BinOp::Add,
        BinOp::Subtract,
        BinOp::Multiply,
        BinOp::Divide,
        BinOp::Modulo,
        BinOp::And,
        BinOp::Or,
    ];

    /// Query-syntax keyword for the operator
    pub fn keyword(self) -> &'static str {
        match self {
            BinOp::Equal => "eq",
            BinOp::NotEqual => "ne",
            BinOp::LessThan => "lt",
            BinOp::GreaterThan => "gt",
            BinOp::LessEqual => "le",
            BinOp::GreaterEqual => "ge",
            BinOp::Add => "add",
            BinOp::Subtract => "sub",
            BinOp::Multiply => "mul",
            BinOp::Divide => "div",
            BinOp::Modulo => "mod",
            BinOp::And => "and",
            BinOp::Or => "or",
        }
    }

    /// Precedence rank. Lower binds tighter.
    ///
    /// A child expression is parenthesized only when its rank is strictly
    /// greater than its parent's.
    pub fn rank(self) -> u8 {
        match self {
            BinOp::Multiply | BinOp::Divide | BinOp::Modulo => 2,
            BinOp::Add | BinOp::Subtract => 3,
            BinOp::LessThan | BinOp::GreaterThan | BinOp::LessEqual | BinOp::GreaterEqual => 4,
            BinOp::Equal | BinOp::NotEqual => 5,
            BinOp::And => 6,
            BinOp::Or => 7,
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Equal
                | BinOp::NotEqual
                | BinOp::LessThan
                | BinOp::GreaterThan
                | BinOp::LessEqual
                | BinOp::GreaterEqual
        )
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    /// Logical negation (`not`)
    Not,
}

impl UnaryOp {
    pub fn keyword(self) -> &'static str {
        match self {
            UnaryOp::Not => "not",
        }
    }

    /// Precedence rank; unary operators bind tightest.
    pub fn rank(self) -> u8 {
        match self {
            UnaryOp::Not => 1,
        }
    }
}
