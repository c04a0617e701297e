use log::trace;

use crate::{
    ProtocolVersion,
    ast::{ArgumentOrder, BinOp, Expr, UnaryOp, functions},
    literal::{format_literal, quote},
    metadata::MetadataResolver,
    value::Value,
};

use super::FormatError;

/// A property path after schema resolution.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ResolvedReference {
    /// Protocol text, segments joined with `/`
    pub text: String,
    /// Collection and exact name of the structural field the path ends on
    pub field: Option<(String, String)>,
    /// True when a segment function wrapped the path (`year(OrderDate)`)
    pub wrapped: bool,
}

/// Compiles expression trees into filter syntax.
///
/// References are resolved against the collection passed to
/// [`format`](Self::format); literals are encoded for the formatter's
/// protocol version.
///
/// # Examples
///
/// ```
/// use odata_engine::ProtocolVersion;
/// use odata_engine::ast::{reference, value};
/// use odata_engine::formatter::ExpressionFormatter;
/// use odata_engine::metadata::{FieldKind, Schema};
///
/// let schema = Schema::new("NorthwindModel")
///     .field("Products", "ProductName", FieldKind::String);
/// let formatter = ExpressionFormatter::new(&schema, ProtocolVersion::V3);
///
/// let filter = reference("productName").contains(value("ai"));
/// assert_eq!(
///     formatter.format(&filter, Some("Products")).unwrap(),
///     "substringof('ai',ProductName)"
/// );
/// ```
pub struct ExpressionFormatter<'a> {
    resolver: &'a dyn MetadataResolver,
    version: ProtocolVersion,
}

impl<'a> ExpressionFormatter<'a> {
    pub fn new(resolver: &'a dyn MetadataResolver, version: ProtocolVersion) -> Self {
        ExpressionFormatter { resolver, version }
    }

    /// Formats an expression relative to `collection`.
    pub fn format(&self, expr: &Expr, collection: Option<&str>) -> Result<String, FormatError> {
        match expr {
            Expr::Reference(path) => Ok(self.resolve_reference(path, collection)?.text),
            Expr::Value(v) => format_literal(v, self.version),
            Expr::FunctionCall { name, target, args } => {
                self.format_call(name, target, args, collection)
            }
            Expr::BinaryOp { op, left, right } => self.format_binary(*op, left, right, collection),
            Expr::UnaryOp { op, operand } => self.format_unary(*op, operand, collection),
        }
    }

    fn format_call(
        &self,
        name: &str,
        target: &Expr,
        args: &[Expr],
        collection: Option<&str>,
    ) -> Result<String, FormatError> {
        let descriptor = functions::lookup(name, args.len(), self.version).ok_or_else(|| {
            FormatError::UnsupportedFunction {
                name: name.to_string(),
                arity: args.len(),
            }
        })?;

        let target = self.format(target, collection)?;
        let mut formatted = args
            .iter()
            .map(|arg| self.format(arg, collection))
            .collect::<Result<Vec<_>, _>>()?;

        match descriptor.order {
            ArgumentOrder::TargetFirst => formatted.insert(0, target),
            ArgumentOrder::TargetLast => formatted.push(target),
            ArgumentOrder::TargetOnly => formatted = vec![target],
        }

        Ok(format!("{}({})", descriptor.protocol_name, formatted.join(",")))
    }

    fn format_binary(
        &self,
        op: BinOp,
        left: &Expr,
        right: &Expr,
        collection: Option<&str>,
    ) -> Result<String, FormatError> {
        if let Expr::Value(Value::Range { low, high }) = right {
            if op == BinOp::Equal {
                let subject = self.format_operand(left, BinOp::GreaterEqual.rank(), collection)?;
                return Ok(format!(
                    "({subject} ge {} and {subject} le {})",
                    format_literal(low, self.version)?,
                    format_literal(high, self.version)?,
                ));
            }
        }

        if let Some(presence) = self.format_null_check(op, left, right, collection)? {
            return Ok(presence);
        }

        let l = self.format_operand(left, op.rank(), collection)?;
        let r = self.format_operand(right, op.rank(), collection)?;
        Ok(format!("{} {} {}", l, op.keyword(), r))
    }

    /// The legacy dialect cannot compare strings to null, so equality
    /// against null on a string property becomes a presence check.
    fn format_null_check(
        &self,
        op: BinOp,
        left: &Expr,
        right: &Expr,
        collection: Option<&str>,
    ) -> Result<Option<String>, FormatError> {
        if self.version != ProtocolVersion::V3 || !matches!(right, Expr::Value(Value::Null)) {
            return Ok(None);
        }
        let Expr::Reference(path) = left else {
            return Ok(None);
        };

        let resolved = self.resolve_reference(path, collection)?;
        let is_string = match &resolved.field {
            Some((coll, field)) if !resolved.wrapped => self.resolver.is_string_field(coll, field),
            _ => false,
        };
        if !is_string {
            return Ok(None);
        }

        let present = format!("{} ge {}", resolved.text, quote(""));
        match op {
            BinOp::Equal => Ok(Some(format!("not({})", present))),
            BinOp::NotEqual => Ok(Some(format!("({})", present))),
            _ => Ok(None),
        }
    }

    fn format_unary(&self, op: UnaryOp, operand: &Expr, collection: Option<&str>) -> Result<String, FormatError> {
        let inner = self.format(operand, collection)?;
        if operand.rank().is_some_and(|rank| rank > op.rank()) {
            Ok(format!("{}({})", op.keyword(), inner))
        } else {
            Ok(format!("{} {}", op.keyword(), inner))
        }
    }

    /// Formats a child, grouping it when its operator binds looser than the
    /// parent's.
    fn format_operand(&self, child: &Expr, parent_rank: u8, collection: Option<&str>) -> Result<String, FormatError> {
        let text = self.format(child, collection)?;
        match child.rank() {
            Some(rank) if rank > parent_rank => Ok(format!("({})", text)),
            _ => Ok(text),
        }
    }

    /// Resolves a dotted path segment by segment.
    ///
    /// Each segment is tried as a structural field, then as a navigation
    /// link (switching to the link's target collection), then as a
    /// zero-argument function applied to the path so far.
    pub(crate) fn resolve_reference(&self, path: &str, collection: Option<&str>) -> Result<ResolvedReference, FormatError> {
        let mut current = collection.map(str::to_string);
        let mut segments: Vec<String> = Vec::new();
        let mut field: Option<(String, String)> = None;
        let mut wrapped = false;

        for segment in path.split(['.', '/']).filter(|s| !s.is_empty()) {
            if field.is_none() {
                if let Some(coll) = current.as_deref() {
                    if let Ok(name) = self.resolver.exact_field_name(coll, segment) {
                        field = Some((coll.to_string(), name.clone()));
                        segments.push(name);
                        continue;
                    }
                    if let Ok(name) = self.resolver.exact_navigation_name(coll, segment) {
                        let target = self.resolver.navigation_target_collection(coll, &name)?;
                        segments.push(name);
                        current = Some(target);
                        continue;
                    }
                }
            }

            if !segments.is_empty() {
                if let Some(descriptor) = functions::lookup(segment, 0, self.version) {
                    let text = format!("{}({})", descriptor.protocol_name, segments.join("/"));
                    segments = vec![text];
                    wrapped = true;
                    continue;
                }
            }

            // Members of a complex property, or paths formatted without a
            // schema context, pass through as written.
            if field.is_some() || current.is_none() {
                segments.push(segment.to_string());
                continue;
            }

            return Err(FormatError::ReferenceResolution {
                segment: segment.to_string(),
                path: path.to_string(),
            });
        }

        let text = segments.join("/");
        trace!("resolved reference {} -> {}", path, text);
        Ok(ResolvedReference { text, field, wrapped })
    }
}
