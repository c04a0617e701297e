use log::{debug, warn};

use crate::{
    ProtocolVersion,
    command::{Command, CountMode, Direction, Expand, Invocation, Key, Source},
    literal::format_literal,
    metadata::MetadataResolver,
    value::Value,
};

use super::{
    EscapeMode, ExpressionFormatter, FormatError,
    dialect::{ArgumentFormat, Dialect, dialect},
    escape::escape,
};

/// Resource path plus the collection its expressions resolve against.
struct ResourcePath {
    path: String,
    collection: Option<String>,
}

/// Compiles [`Command`]s into request URIs relative to the service root.
///
/// # Examples
///
/// ```
/// use odata_engine::{Command, ProtocolVersion};
/// use odata_engine::formatter::CommandFormatter;
/// use odata_engine::metadata::{FieldKind, Schema};
///
/// let schema = Schema::new("NorthwindModel")
///     .field("Order_Details", "OrderID", FieldKind::Other)
///     .field("Order_Details", "ProductID", FieldKind::Other);
/// let formatter = CommandFormatter::new(&schema, ProtocolVersion::V4);
///
/// let command = Command::collection("Order_Details")
///     .composite_key([("OrderID", 10248), ("ProductID", 11)]);
/// assert_eq!(
///     formatter.format(&command).unwrap(),
///     "Order_Details(OrderID=10248,ProductID=11)"
/// );
/// ```
pub struct CommandFormatter<'a> {
    resolver: &'a dyn MetadataResolver,
    dialect: &'static dyn Dialect,
    escape_mode: EscapeMode,
}

impl<'a> CommandFormatter<'a> {
    pub fn new(resolver: &'a dyn MetadataResolver, version: ProtocolVersion) -> Self {
        CommandFormatter {
            resolver,
            dialect: dialect(version),
            escape_mode: EscapeMode::default(),
        }
    }

    pub fn with_escape_mode(mut self, mode: EscapeMode) -> Self {
        self.escape_mode = mode;
        self
    }

    pub fn version(&self) -> ProtocolVersion {
        self.dialect.version()
    }

    fn expressions(&self) -> ExpressionFormatter<'a> {
        ExpressionFormatter::new(self.resolver, self.version())
    }

    /// Formats the full path and query string.
    pub fn format(&self, command: &Command) -> Result<String, FormatError> {
        validate(command)?;

        let resource = self.format_resource(command)?;
        let mut path = resource.path;
        let mut clauses = Vec::new();

        if let Some(function) = &command.function {
            let (segment, args) = self.format_function(function, command.source != Source::None)?;
            push_segment(&mut path, &segment);
            clauses.extend(args);
        }

        if let Some(action) = &command.action {
            let segment = self.operation_name(action, command.source != Source::None)?;
            push_segment(&mut path, &segment);
        }

        match command.count {
            CountMode::Only => push_segment(&mut path, "$count"),
            _ if command.media => push_segment(&mut path, "$value"),
            _ => {}
        }

        clauses.extend(self.format_clauses(command, resource.collection.as_deref())?);

        let uri = if clauses.is_empty() {
            path
        } else {
            format!("{}?{}", path, clauses.join("&"))
        };

        debug!("formatted command: {}", uri);
        Ok(uri)
    }

    /// Formats only the resource path: collection or navigation chain, key
    /// and cast.
    pub fn format_path(&self, command: &Command) -> Result<String, FormatError> {
        validate(command)?;
        Ok(self.format_resource(command)?.path)
    }

    /// Resource path plus the collection the path lands in.
    pub(crate) fn resolve_resource(&self, command: &Command) -> Result<(String, Option<String>), FormatError> {
        validate(command)?;
        let resource = self.format_resource(command)?;
        Ok((resource.path, resource.collection))
    }

    fn format_resource(&self, command: &Command) -> Result<ResourcePath, FormatError> {
        let (mut path, collection) = match &command.source {
            Source::None => (String::new(), None),
            Source::Collection(name) => {
                let exact = self.resolver.exact_collection_name(name)?;
                (exact.clone(), Some(exact))
            }
            Source::Navigation { parent, name } => {
                let parent = self.format_resource(parent)?;
                let parent_collection = parent.collection.ok_or_else(|| {
                    FormatError::MalformedCommand(format!(
                        "navigation '{}' has no parent collection",
                        name
                    ))
                })?;
                let link = self.resolver.exact_navigation_name(&parent_collection, name)?;
                let target = self
                    .resolver
                    .navigation_target_collection(&parent_collection, &link)?;
                (format!("{}/{}", parent.path, link), Some(target))
            }
        };

        if let Some(key) = &command.key {
            path.push_str(&self.format_key(key, collection.as_deref())?);
        }

        if let Some(derived) = &command.derived_type {
            let qualified = self.resolver.qualified_type_name(derived)?;
            push_segment(&mut path, &qualified);
        }

        Ok(ResourcePath { path, collection })
    }

    /// Formats a key segment, parentheses included.
    pub fn format_key(&self, key: &Key, collection: Option<&str>) -> Result<String, FormatError> {
        let version = self.version();
        match key {
            Key::Single(value) => Ok(format!("({})", format_literal(value, version)?)),
            Key::Composite(parts) if parts.len() == 1 => {
                Ok(format!("({})", format_literal(&parts[0].1, version)?))
            }
            Key::Composite(parts) => {
                let formatted = parts
                    .iter()
                    .map(|(name, value)| {
                        let name = match collection {
                            Some(coll) => self.resolver.exact_field_name(coll, name)?,
                            None => name.clone(),
                        };
                        Ok(format!("{}={}", name, format_literal(value, version)?))
                    })
                    .collect::<Result<Vec<_>, FormatError>>()?;
                Ok(format!("({})", formatted.join(",")))
            }
        }
    }

    fn operation_name(&self, name: &str, bound: bool) -> Result<String, FormatError> {
        let qualified = self.resolver.function_qualified_name(name)?;
        if bound {
            Ok(qualified)
        } else {
            // Unbound operations are addressed through their unqualified
            // import name.
            Ok(qualified.rsplit('.').next().unwrap_or(name).to_string())
        }
    }

    /// Returns the path segment and any query-string arguments.
    fn format_function(&self, function: &Invocation, bound: bool) -> Result<(String, Vec<String>), FormatError> {
        let name = self.operation_name(&function.name, bound)?;
        let version = self.version();

        match self.dialect.argument_format() {
            ArgumentFormat::Query => {
                let args = function
                    .args
                    .iter()
                    .map(|(k, v)| {
                        let literal = format_literal(v, version)?;
                        Ok(format!("{}={}", k, escape(&literal, self.escape_mode)))
                    })
                    .collect::<Result<Vec<_>, FormatError>>()?;
                Ok((name, args))
            }
            ArgumentFormat::Key => {
                let mut inline = Vec::new();
                let mut aliases = Vec::new();
                for (k, v) in &function.args {
                    let literal = format_literal(v, version)?;
                    if matches!(v, Value::Collection(_)) {
                        let alias = format!("@p{}", aliases.len() + 1);
                        inline.push(format!("{}={}", k, alias));
                        aliases.push(format!("{}={}", alias, escape(&literal, self.escape_mode)));
                    } else {
                        inline.push(format!("{}={}", k, literal));
                    }
                }
                Ok((format!("{}({})", name, inline.join(",")), aliases))
            }
        }
    }

    fn format_clauses(&self, command: &Command, collection: Option<&str>) -> Result<Vec<String>, FormatError> {
        let expressions = self.expressions();
        let mut clauses = Vec::new();

        if let Some(filter) = &command.filter {
            let text = expressions.format(filter, collection)?;
            if !text.is_empty() {
                clauses.push(format!("$filter={}", escape(&text, self.escape_mode)));
            }
        }

        if let Some(search) = command.search.as_deref().filter(|s| !s.is_empty()) {
            if self.dialect.supports_search() {
                clauses.push(format!("$search={}", escape(search, self.escape_mode)));
            } else {
                warn!("$search is not supported by the {} dialect; ignoring", self.version());
            }
        }

        for (name, value) in &command.query_options {
            clauses.push(format!("{}={}", name, value));
        }

        for (name, expr) in &command.expression_options {
            let text = expressions.format(expr, collection)?;
            clauses.push(format!("{}={}", name, escape(&text, self.escape_mode)));
        }

        if let Some(skip) = command.skip {
            clauses.push(format!("$skip={}", skip));
        }
        if let Some(top) = command.top {
            clauses.push(format!("$top={}", top));
        }

        let mut select = self.format_paths(&command.select, collection)?;

        if !command.expand.is_empty() {
            let expand = if self.dialect.nests_expand_options() {
                self.format_nested_expands(&command.expand, collection)?
            } else {
                let mut paths = Vec::new();
                self.flatten_expands(&command.expand, collection, "", &mut paths, &mut select)?;
                paths.join(",")
            };
            clauses.push(format!("$expand={}", expand));
        }

        if !select.is_empty() {
            clauses.push(format!("$select={}", select.join(",")));
        }

        if !command.order_by.is_empty() {
            clauses.push(format!("$orderby={}", self.format_order_by(&command.order_by, collection)?));
        }

        if command.count == CountMode::Inline {
            clauses.push(self.dialect.inline_count().to_string());
        }

        Ok(clauses)
    }

    fn format_paths(&self, paths: &[String], collection: Option<&str>) -> Result<Vec<String>, FormatError> {
        let expressions = self.expressions();
        paths
            .iter()
            .map(|path| -> Result<String, FormatError> {
                if path == "*" {
                    Ok(path.clone())
                } else {
                    Ok(expressions.resolve_reference(path, collection)?.text)
                }
            })
            .collect()
    }

    fn format_order_by(&self, order_by: &[(String, Direction)], collection: Option<&str>) -> Result<String, FormatError> {
        let expressions = self.expressions();
        let items = order_by
            .iter()
            .map(|(path, direction)| {
                let text = expressions.resolve_reference(path, collection)?.text;
                Ok(match direction {
                    Direction::Ascending => text,
                    Direction::Descending => format!("{} desc", text),
                })
            })
            .collect::<Result<Vec<_>, FormatError>>()?;
        Ok(items.join(","))
    }

    /// Resolves a navigation path, returning the exact segments and the
    /// collection the last one points at.
    fn resolve_navigation_path(&self, path: &str, collection: Option<&str>) -> Result<(Vec<String>, Option<String>), FormatError> {
        let mut current = collection.map(str::to_string);
        let mut segments = Vec::new();

        for segment in path.split(['.', '/']).filter(|s| !s.is_empty()) {
            match current.as_deref() {
                Some(coll) => {
                    let exact = self.resolver.exact_navigation_name(coll, segment)?;
                    current = Some(self.resolver.navigation_target_collection(coll, &exact)?);
                    segments.push(exact);
                }
                None => segments.push(segment.to_string()),
            }
        }
        Ok((segments, current))
    }

    /// V4: `Nav($select=A;$expand=Inner($top=1))`
    fn format_nested_expands(&self, expands: &[Expand], collection: Option<&str>) -> Result<String, FormatError> {
        let items = expands
            .iter()
            .map(|expand| self.format_nested_expand(expand, collection))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items.join(","))
    }

    fn format_nested_expand(&self, expand: &Expand, collection: Option<&str>) -> Result<String, FormatError> {
        let (segments, target) = self.resolve_navigation_path(&expand.path, collection)?;
        let target = target.as_deref();
        let mut options = Vec::new();

        if !expand.select.is_empty() {
            options.push(format!("$select={}", self.format_paths(&expand.select, target)?.join(",")));
        }
        if let Some(filter) = &expand.filter {
            let text = self.expressions().format(filter, target)?;
            options.push(format!("$filter={}", escape(&text, self.escape_mode)));
        }
        if !expand.order_by.is_empty() {
            options.push(format!("$orderby={}", self.format_order_by(&expand.order_by, target)?));
        }
        if let Some(top) = expand.top {
            options.push(format!("$top={}", top));
        }
        if !expand.expand.is_empty() {
            options.push(format!("$expand={}", self.format_nested_expands(&expand.expand, target)?));
        }

        // A multi-segment path nests each segment inside the previous one.
        let mut text = match segments.last() {
            Some(last) if options.is_empty() => last.clone(),
            Some(last) => format!("{}({})", last, options.join(";")),
            None => return Err(FormatError::MalformedCommand("empty expand path".to_string())),
        };
        for segment in segments.iter().rev().skip(1) {
            text = format!("{}($expand={})", segment, text);
        }
        Ok(text)
    }

    /// V3: nested expands become slash paths and nested selects are folded
    /// into the top-level `$select`.
    fn flatten_expands(
        &self,
        expands: &[Expand],
        collection: Option<&str>,
        prefix: &str,
        paths: &mut Vec<String>,
        select: &mut Vec<String>,
    ) -> Result<(), FormatError> {
        for expand in expands {
            let (segments, target) = self.resolve_navigation_path(&expand.path, collection)?;
            let path = if prefix.is_empty() {
                segments.join("/")
            } else {
                format!("{}/{}", prefix, segments.join("/"))
            };

            if expand.filter.is_some() || !expand.order_by.is_empty() || expand.top.is_some() {
                warn!("expand options on '{}' are not supported by the V3 dialect; ignoring", path);
            }

            for field in self.format_paths(&expand.select, target.as_deref())? {
                select.push(format!("{}/{}", path, field));
            }

            if expand.expand.is_empty() {
                paths.push(path);
            } else {
                self.flatten_expands(&expand.expand, target.as_deref(), &path, paths, select)?;
            }
        }
        Ok(())
    }
}

fn validate(command: &Command) -> Result<(), FormatError> {
    if command.filter.is_some() && command.key.is_some() {
        return Err(FormatError::MalformedCommand(
            "filter and key cannot be combined".to_string(),
        ));
    }
    if command.function.is_some() && command.action.is_some() {
        return Err(FormatError::MalformedCommand(
            "function and action cannot be combined".to_string(),
        ));
    }
    Ok(())
}

fn push_segment(path: &mut String, segment: &str) {
    if !path.is_empty() {
        path.push('/');
    }
    path.push_str(segment);
}
